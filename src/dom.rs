//! HTML inspector – a small recursive-descent parser over rendered documents.
//!
//! Measurement only needs to look at a few things in the rendered HTML: the
//! footer, paragraphs and table cells, and the `class`/`style`/`data-field`
//! attributes on their descendants. The parser is lenient; malformed markup
//! yields a best-effort tree rather than an error.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Tag name of an element, with the ones measurement cares about spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Footer,
    P,
    Td,
    Th,
    Span,
    Div,
    Br,
    Hr,
    /// Any other tag, lowercased.
    Other(String),
}

impl Tag {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "footer" => Tag::Footer,
            "p" => Tag::P,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "div" => Tag::Div,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            other => Tag::Other(other.to_string()),
        }
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        match self {
            Tag::Br | Tag::Hr => true,
            Tag::Other(name) => matches!(
                name.as_str(),
                "img" | "meta" | "link" | "input" | "col" | "area" | "base" | "wbr" | "source"
            ),
            _ => false,
        }
    }

    /// Elements whose content is raw text (never parsed as markup).
    fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Other(name) if name == "style" || name == "script")
    }

    /// Paragraphs and table cells: the scopes manual breaks are counted in.
    pub fn is_break_scope(&self) -> bool {
        matches!(self, Tag::P | Tag::Td | Tag::Th)
    }
}

#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Every descendant element (depth-first, document order) matching `pred`.
    pub fn descendants_where<'a>(
        &'a self,
        pred: &dyn Fn(&ElementNode) -> bool,
    ) -> Vec<&'a ElementNode> {
        let mut found = Vec::new();
        collect_where(&self.children, pred, &mut found);
        found
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

fn collect_where<'a>(
    nodes: &'a [DomNode],
    pred: &dyn Fn(&ElementNode) -> bool,
    found: &mut Vec<&'a ElementNode>,
) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if pred(e) {
                found.push(e);
            }
            collect_where(&e.children, pred, found);
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of top-level nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    Parser::new(html).parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Names of the elements currently being parsed, outermost first.
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            open: Vec::new(),
        }
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() {
            if self.starts_with("</") {
                let name = self.peek_end_tag();
                if self.open.iter().any(|open| *open == name) {
                    // Closes the current element or one of its ancestors.
                    break;
                }
                // Stray end tag.
                self.skip_past(">");
                continue;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // doctype / processing instruction
            self.skip_past(">");
            return None;
        }
        if self.starts_with("<") && self.peek_is_tag_start() {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A stray '<' that does not open a tag is plain text.
        self.advance_char();
        while !self.eof() && !self.at_markup() {
            self.advance_char();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.pos += 1; // '<'
        let name = self.parse_name().to_ascii_lowercase();
        let mut elem = ElementNode::new(Tag::parse(&name));

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                // Unparseable attribute byte; step over it.
                self.advance_char();
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        if elem.tag.is_raw_text() {
            let start = self.pos;
            let close = format!("</{name}");
            let end = self.input[start..]
                .to_ascii_lowercase()
                .find(&close)
                .map_or(self.input.len(), |i| start + i);
            elem.children.push(DomNode::Text(self.input[start..end].to_string()));
            self.pos = end;
        } else {
            self.open.push(name.clone());
            elem.children = self.parse_nodes();
            self.open.pop();
        }

        // An end tag naming an ancestor is left for that ancestor.
        if self.starts_with("</") && self.peek_end_tag() == name {
            self.skip_past(">");
        }
        DomNode::Element(elem)
    }

    /// Lowercased name of the end tag at the cursor.
    fn peek_end_tag(&self) -> String {
        self.input[self.pos + 2..]
            .chars()
            .take_while(|&c| is_name_char(c))
            .collect::<String>()
            .to_ascii_lowercase()
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if is_name_char(c) {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();
        (key, self.parse_attr_value())
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.pos += 1;
                let start = self.pos;
                let end = self.input[start..].find(quote).map_or(self.input.len(), |i| start + i);
                self.pos = (end + 1).min(self.input.len());
                return decode_entities(&self.input[start..end]);
            }
        }
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '>' {
                break;
            }
            self.advance_char();
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn at_markup(&self) -> bool {
        self.starts_with("</") || self.starts_with("<!") || (self.starts_with("<") && self.peek_is_tag_start())
    }

    fn peek_is_tag_start(&self) -> bool {
        self.input[self.pos..]
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn skip_past(&mut self, marker: &str) {
        match self.input[self.pos..].find(marker) {
            Some(i) => self.pos += i + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&#x3D;", "=")
        .replace("&#x60;", "`")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Every element in the forest matching `pred`, in document order.
pub fn find_all<'a>(nodes: &'a [DomNode], pred: &dyn Fn(&ElementNode) -> bool) -> Vec<&'a ElementNode> {
    let mut found = Vec::new();
    collect_where(nodes, pred, &mut found);
    found
}

/// The last `<footer>` element in document order.
pub fn last_footer(nodes: &[DomNode]) -> Option<&ElementNode> {
    find_all(nodes, &|e| e.tag == Tag::Footer).pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(nodes: &[DomNode]) -> &ElementNode {
        nodes
            .iter()
            .find_map(|n| match n {
                DomNode::Element(e) => Some(e),
                DomNode::Text(_) => None,
            })
            .expect("an element")
    }

    #[test]
    fn parse_nested_elements_and_attributes() {
        let nodes = parse_html(r#"<div class="cover page-break"><p>Hello <span data-field="X">world</span>!</p></div>"#);
        let div = first_element(&nodes);
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.classes(), vec!["cover", "page-break"]);
        let spans = div.descendants_where(&|e| e.attr("data-field") == Some("X"));
        assert_eq!(spans.len(), 1);
        assert_eq!(div.text_content(), "Hello world!");
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let nodes = parse_html("<p>one<br>two<hr><img src=a.png>three</p><p>four</p>");
        let paragraphs = find_all(&nodes, &|e| e.tag == Tag::P);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].text_content(), "onetwothree");
    }

    #[test]
    fn style_content_is_not_markup() {
        let nodes = parse_html("<head><style>p > span { color: red }</style></head><body><p>x</p></body>");
        assert_eq!(find_all(&nodes, &|e| e.tag == Tag::P).len(), 1);
    }

    #[test]
    fn last_footer_wins() {
        let html = "<footer>first</footer><main><footer>second</footer></main>";
        let nodes = parse_html(html);
        assert_eq!(last_footer(&nodes).map(|f| f.text_content()), Some("second".to_string()));
    }

    #[test]
    fn entities_are_decoded_once() {
        let nodes = parse_html("<p>a &amp;lt; b &lt; c</p>");
        assert_eq!(first_element(&nodes).text_content(), "a &lt; b < c");
    }

    #[test]
    fn stray_end_tags_do_not_end_the_document() {
        let html = r#"<section><p>intro</span></div></p><p>a</p><footer><span data-field="NUMPAGES">3</span></footer></section>"#;
        let nodes = parse_html(html);
        let section = first_element(&nodes);
        assert_eq!(section.tag, Tag::Other("section".into()));
        assert_eq!(section.descendants_where(&|e| e.tag == Tag::P).len(), 2);
        assert_eq!(last_footer(&nodes).map(|f| f.text_content()), Some("3".to_string()));
    }

    #[test]
    fn end_tag_of_an_ancestor_closes_open_children() {
        let nodes = parse_html("<div><p>one<span>two</div><p>three</p>");
        let paragraphs = find_all(&nodes, &|e| e.tag == Tag::P);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].text_content(), "onetwo");
        assert_eq!(first_element(&nodes).tag, Tag::Div);
        assert_eq!(first_element(&nodes).text_content(), "onetwo");
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        let nodes = parse_html("<td>1 < 2</td>");
        assert_eq!(first_element(&nodes).text_content(), "1 < 2");
    }
}
