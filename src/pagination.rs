//! Page count oracle – measures how many pages a rendered document occupies.
//!
//! Measurement runs an ordered chain of strategies over the same rendered
//! bytes and keeps the first success:
//! 1. [`FooterField`]: the page-number field in the document footer
//! 2. [`ExternalConversion`]: page count of the fixed-layout rendition
//! 3. [`HeuristicBreaks`]: manual page breaks plus one; never fails
//!
//! A strategy reports a miss as a plain value; nothing is retried and no
//! strategy re-renders the document.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::convert::{count_pdf_pages, Converter};
use crate::dom::{self, DomNode, ElementNode};
use crate::error::{ConversionError, MeasurementError};

/// Value of `data-field` marking the total-page-count element.
pub const NUMPAGES_FIELD: &str = "NUMPAGES";

/// Which strategy produced a page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCountSource {
    FooterField,
    ExternalConversion,
    HeuristicBreaks,
}

impl fmt::Display for PageCountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageCountSource::FooterField => "footer-field",
            PageCountSource::ExternalConversion => "external-conversion",
            PageCountSource::HeuristicBreaks => "heuristic-breaks",
        })
    }
}

/// A measured page count and the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCountResult {
    pub value: u32,
    pub source: PageCountSource,
}

/// One way of measuring a rendered document.
pub trait PageCountStrategy: Send + Sync {
    fn source(&self) -> PageCountSource;

    /// Page count of `document`, or the reason this strategy could not tell.
    fn measure(&self, document: &[u8]) -> Result<u32, String>;
}

// ── Footer field ───────────────────────────────────────────────────────────

/// Reads the total page count from the `NUMPAGES` field of the last
/// `<footer>`. The last integer literal in the field text wins; zero or no
/// integer is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct FooterField;

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

impl PageCountStrategy for FooterField {
    fn source(&self) -> PageCountSource {
        PageCountSource::FooterField
    }

    fn measure(&self, document: &[u8]) -> Result<u32, String> {
        let html = std::str::from_utf8(document).map_err(|e| format!("document is not UTF-8: {e}"))?;
        let nodes = dom::parse_html(html);
        let footer = dom::last_footer(&nodes).ok_or("document has no footer")?;

        let fields = footer.descendants_where(&|e| e.attr("data-field") == Some(NUMPAGES_FIELD));
        if fields.is_empty() {
            return Err(format!("footer has no {NUMPAGES_FIELD} field"));
        }
        let text = fields
            .iter()
            .map(|e| e.text_content())
            .collect::<Vec<_>>()
            .join(" ");

        let last = integer_re()
            .find_iter(&text)
            .last()
            .ok_or_else(|| format!("{NUMPAGES_FIELD} field holds no number"))?;
        match last.as_str().parse::<u32>() {
            Ok(0) => Err(format!("{NUMPAGES_FIELD} field holds 0")),
            Ok(value) => Ok(value),
            Err(e) => Err(format!("{NUMPAGES_FIELD} field value {:?}: {e}", last.as_str())),
        }
    }
}

// ── External conversion ────────────────────────────────────────────────────

/// Converts the document through the external service and counts the pages
/// of the result. Misses when no service is configured.
#[derive(Clone, Default)]
pub struct ExternalConversion {
    converter: Option<Arc<dyn Converter>>,
}

impl ExternalConversion {
    pub fn new(converter: Option<Arc<dyn Converter>>) -> Self {
        Self { converter }
    }
}

impl PageCountStrategy for ExternalConversion {
    fn source(&self) -> PageCountSource {
        PageCountSource::ExternalConversion
    }

    fn measure(&self, document: &[u8]) -> Result<u32, String> {
        let converter = self
            .converter
            .as_ref()
            .ok_or_else(|| ConversionError::NotConfigured.to_string())?;
        let pdf = converter.convert(document).map_err(|e| e.to_string())?;
        match count_pdf_pages(&pdf).map_err(|e| e.to_string())? {
            0 => Err("converted document has no pages".to_string()),
            pages => Ok(pages),
        }
    }
}

// ── Heuristic breaks ───────────────────────────────────────────────────────

/// Counts manual page-break directives inside paragraphs and table cells,
/// plus one for the first page.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicBreaks;

impl HeuristicBreaks {
    /// Infallible form of [`PageCountStrategy::measure`].
    pub fn count(&self, document: &[u8]) -> u32 {
        let html = String::from_utf8_lossy(document);
        let nodes = dom::parse_html(&html);
        1 + count_breaks(&nodes, false)
    }
}

impl PageCountStrategy for HeuristicBreaks {
    fn source(&self) -> PageCountSource {
        PageCountSource::HeuristicBreaks
    }

    fn measure(&self, document: &[u8]) -> Result<u32, String> {
        Ok(self.count(document))
    }
}

/// Break directives on elements at or under a paragraph or table cell. Each
/// element contributes at most one "before" and one "after" break.
fn count_breaks(nodes: &[DomNode], in_scope: bool) -> u32 {
    nodes
        .iter()
        .map(|node| match node {
            DomNode::Element(e) => {
                let scoped = in_scope || e.tag.is_break_scope();
                let own = if scoped {
                    let (before, after) = break_directives(e);
                    u32::from(before) + u32::from(after)
                } else {
                    0
                };
                own + count_breaks(&e.children, scoped)
            }
            DomNode::Text(_) => 0,
        })
        .sum()
}

/// (break before, break after) declared by class or inline style.
fn break_directives(e: &ElementNode) -> (bool, bool) {
    let mut before = false;
    let mut after = false;
    for class in e.classes() {
        match class {
            "break-before" => before = true,
            "break-after" | "page-break" => after = true,
            _ => {}
        }
    }
    if let Some(style) = e.inline_style() {
        for decl in style.split(';') {
            let Some((prop, val)) = decl.split_once(':') else {
                continue;
            };
            let val = val.trim().to_ascii_lowercase();
            let forced = val == "always" || val == "page";
            match prop.trim().to_ascii_lowercase().as_str() {
                "page-break-before" | "break-before" => before |= forced,
                "page-break-after" | "break-after" => after |= forced,
                _ => {}
            }
        }
    }
    (before, after)
}

// ── Oracle ─────────────────────────────────────────────────────────────────

/// Ordered strategy chain; the first success wins.
pub struct PageCountOracle {
    strategies: Vec<Box<dyn PageCountStrategy>>,
}

impl PageCountOracle {
    /// Footer field, then external conversion (when a converter is given),
    /// then heuristic breaks.
    pub fn standard(converter: Option<Arc<dyn Converter>>) -> Self {
        Self::with_strategies(vec![
            Box::new(FooterField),
            Box::new(ExternalConversion::new(converter)),
            Box::new(HeuristicBreaks),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn PageCountStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn sources(&self) -> Vec<PageCountSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// Measure `document`. Fails only when every strategy missed.
    pub fn measure(&self, document: &[u8]) -> Result<PageCountResult, MeasurementError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            let source = strategy.source();
            match strategy.measure(document) {
                Ok(value) => {
                    log::info!("page count {value} from {source}");
                    return Ok(PageCountResult { value, source });
                }
                Err(reason) => {
                    log::warn!("{source} strategy missed: {reason}");
                    failures.push((source, reason));
                }
            }
        }
        Err(MeasurementError { failures })
    }
}

impl fmt::Debug for PageCountOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCountOracle")
            .field("strategies", &self.sources())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(AtomicUsize);

    impl Converter for Failing {
        fn convert(&self, _: &[u8]) -> Result<Vec<u8>, ConversionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ConversionError::Status {
                status: 503,
                body: "busy".into(),
            })
        }
    }

    #[test]
    fn footer_takes_last_integer_of_numpages_field() {
        let html = r#"<footer>Page <span data-field="PAGE">1</span> of
            <span data-field="NUMPAGES">total 12 (was 3) 7</span></footer>"#;
        assert_eq!(FooterField.measure(html.as_bytes()), Ok(7));
    }

    #[test]
    fn footer_uses_the_last_footer_only() {
        let html = r#"<footer><span data-field="NUMPAGES">9</span></footer>
            <p>body</p><footer>no field here</footer>"#;
        assert!(FooterField.measure(html.as_bytes()).is_err());
    }

    #[test]
    fn footer_misses() {
        for html in [
            "<p>no footer</p>",
            r#"<footer><span data-field="NUMPAGES"></span></footer>"#,
            r#"<footer><span data-field="NUMPAGES">__PAGE_COUNT__</span></footer>"#,
            r#"<footer><span data-field="NUMPAGES">0</span></footer>"#,
            r#"<footer>Page 4 of 5</footer>"#,
        ] {
            assert!(FooterField.measure(html.as_bytes()).is_err(), "{html}");
        }
    }

    #[test]
    fn heuristic_counts_breaks_in_paragraphs_and_cells_only() {
        let html = r#"
            <div class="page-break"></div>
            <p style="page-break-before: always">a</p>
            <p class="page-break" style="page-break-after: always">b</p>
            <table><tr><td><span style="break-after: page">c</span></td>
                <th class="break-before">d</th></tr></table>
            <p style="page-break-after: auto">e</p>
        "#;
        // before(p) + after(p, counted once) + after(span in td) + before(th)
        assert_eq!(HeuristicBreaks.count(html.as_bytes()), 5);
    }

    #[test]
    fn heuristic_never_fails() {
        assert_eq!(HeuristicBreaks.count(b""), 1);
        assert_eq!(HeuristicBreaks.count(&[0xff, 0xfe, b'<', b'p']), 1);
    }

    #[test]
    fn oracle_short_circuits_on_first_success() {
        let converter = Arc::new(Failing(AtomicUsize::new(0)));
        let oracle = PageCountOracle::standard(Some(converter.clone() as Arc<dyn Converter>));
        let html = r#"<footer><span data-field="NUMPAGES">4</span></footer>"#;
        let result = oracle.measure(html.as_bytes()).unwrap();
        assert_eq!(result, PageCountResult { value: 4, source: PageCountSource::FooterField });
        assert_eq!(converter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn oracle_falls_through_to_heuristics() {
        let converter = Arc::new(Failing(AtomicUsize::new(0)));
        let oracle = PageCountOracle::standard(Some(converter.clone() as Arc<dyn Converter>));
        let result = oracle.measure(br#"<p class="page-break"></p><p>x</p>"#).unwrap();
        assert_eq!(result.source, PageCountSource::HeuristicBreaks);
        assert_eq!(result.value, 2);
        assert_eq!(converter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oracle_fails_only_when_every_strategy_misses() {
        let oracle = PageCountOracle::with_strategies(vec![
            Box::new(FooterField),
            Box::new(ExternalConversion::new(None)),
        ]);
        let err = oracle.measure(b"<p>x</p>").unwrap_err();
        let sources: Vec<_> = err.failures.iter().map(|(s, _)| *s).collect();
        assert_eq!(sources, [PageCountSource::FooterField, PageCountSource::ExternalConversion]);
    }

    #[test]
    fn stray_end_tags_do_not_hide_later_content() {
        let html = concat!(
            "<section><p>intro</span></div></p>",
            r#"<p style="page-break-after: always">a</p>"#,
            r#"<p style="page-break-after: always">b</p>"#,
            r#"<footer><span data-field="NUMPAGES">3</span></footer></section>"#,
        );
        assert_eq!(FooterField.measure(html.as_bytes()), Ok(3));
        assert_eq!(HeuristicBreaks.count(html.as_bytes()), 3);
    }
}
