//! Template render adapter – wraps a Handlebars registry around one template
//! and validates its field references up front.
//!
//! Loading computes the template's static schema: the set of root-scope
//! fields it references. Fields outside the context vocabulary
//! ([`crate::context::FIELDS`]) are rejected at load time, so a misspelled
//! placeholder never reaches a render pass. Rendering checks the schema
//! against the supplied context before handing it to the engine, which runs in
//! strict mode.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use handlebars::Handlebars;
use regex::Regex;

use crate::context::{RenderContext, FIELDS};
use crate::error::RenderError;

/// Root-scope fields referenced by a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSchema {
    fields: BTreeSet<String>,
}

impl TemplateSchema {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed template, ready to render any number of contexts.
pub struct CachedTemplate {
    name: String,
    path: Option<PathBuf>,
    registry: Handlebars<'static>,
    schema: TemplateSchema,
}

impl std::fmt::Debug for CachedTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTemplate")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CachedTemplate {
    /// Read and parse the template at `path`.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let source = fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut template = Self::from_source(&path.display().to_string(), &source)?;
        template.path = Some(path.to_path_buf());
        Ok(template)
    }

    /// Parse a template held in memory. `name` is used in error messages.
    pub fn from_source(name: &str, source: &str) -> Result<Self, RenderError> {
        let schema = scan_schema(name, source)?;
        if let Some(field) = schema.fields().find(|f| !FIELDS.contains(f)) {
            return Err(RenderError::UnknownField {
                template: name.to_string(),
                field: field.to_string(),
            });
        }

        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(name, source)
            .map_err(|e| RenderError::Syntax {
                template: name.to_string(),
                message: e.to_string(),
            })?;

        log::debug!("loaded template {name} ({} root field(s))", schema.len());
        Ok(Self {
            name: name.to_string(),
            path: None,
            registry,
            schema,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema(&self) -> &TemplateSchema {
        &self.schema
    }

    /// Render `context` to document bytes.
    ///
    /// Deterministic: the same context always yields the same bytes.
    pub fn render(&self, context: &RenderContext) -> Result<Vec<u8>, RenderError> {
        if let Some(field) = self.schema.fields().find(|f| !context.contains(f)) {
            return Err(RenderError::MissingField {
                field: field.to_string(),
            });
        }
        let html = self
            .registry
            .render(&self.name, context)
            .map_err(|e| RenderError::Engine(e.to_string()))?;
        Ok(html.into_bytes())
    }
}

// ── Static schema ──────────────────────────────────────────────────────────

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{!--.*?--\}\}|\{\{![^}]*\}\}").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{\{?~?(.*?)~?\}?\}\}").expect("valid regex"))
}

/// One open block helper.
struct Block {
    helper: String,
    /// `each`/`with` (and unknown helpers) change the context object.
    scoped: bool,
}

/// Collect root-scope field references.
///
/// References inside `each`/`with` blocks resolve against the block's own
/// context and are not root fields, except for explicit `@root.` paths.
pub fn scan_schema(name: &str, source: &str) -> Result<TemplateSchema, RenderError> {
    let syntax = |message: String| RenderError::Syntax {
        template: name.to_string(),
        message,
    };

    let stripped = comment_re().replace_all(source, "");
    let mut fields = BTreeSet::new();
    let mut stack: Vec<Block> = Vec::new();

    for cap in tag_re().captures_iter(&stripped) {
        let body = cap[1].trim();
        let at_root = !stack.iter().any(|b| b.scoped);

        if let Some(rest) = body.strip_prefix('#') {
            let mut words = split_words(rest.trim_start_matches('>').trim());
            if words.is_empty() {
                return Err(syntax("block opened without a helper name".into()));
            }
            let helper = words.remove(0);
            collect_refs(&words, at_root, &mut fields);
            let scoped = !matches!(helper.as_str(), "if" | "unless");
            stack.push(Block { helper, scoped });
        } else if let Some(rest) = body.strip_prefix('/') {
            let closing = rest.trim();
            match stack.pop() {
                Some(open) if open.helper == closing => {}
                Some(open) => {
                    return Err(syntax(format!(
                        "`{{{{/{closing}}}}}` closes `{{{{#{}}}}}`",
                        open.helper
                    )))
                }
                None => return Err(syntax(format!("`{{{{/{closing}}}}}` has no matching block"))),
            }
        } else if body.starts_with('^') || body.starts_with('>') || body.starts_with('!') {
            // inverse section, partial, or stray comment
        } else {
            let words = split_words(body);
            match words.first().map(String::as_str) {
                None => {}
                // `else if cond` / `else unless cond`
                Some("else") => collect_refs(words.get(2..).unwrap_or_default(), at_root, &mut fields),
                Some(_) if words.len() == 1 => collect_refs(&words, at_root, &mut fields),
                // `helper arg…`: the helper name is not a field
                Some(_) => collect_refs(&words[1..], at_root, &mut fields),
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(syntax(format!("`{{{{#{}}}}}` is never closed", open.helper)));
    }
    Ok(TemplateSchema { fields })
}

/// Split a tag body into expression words; parentheses and hash keys drop out.
fn split_words(body: &str) -> Vec<String> {
    body.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|w| !w.is_empty())
        .map(|w| match w.split_once('=') {
            Some((_, value)) => value.to_string(),
            None => w.to_string(),
        })
        .collect()
}

fn collect_refs(words: &[String], at_root: bool, fields: &mut BTreeSet<String>) {
    for word in words {
        if let Some(path) = word.strip_prefix("@root.") {
            if let Some(root) = root_segment(path) {
                fields.insert(root);
            }
            continue;
        }
        if !at_root || is_literal(word) || word.starts_with('@') || word.starts_with("..") {
            continue;
        }
        let path = word.strip_prefix("this.").or_else(|| word.strip_prefix("./")).unwrap_or(word);
        if path == "this" || path == "." {
            continue;
        }
        if let Some(root) = root_segment(path) {
            fields.insert(root);
        }
    }
}

fn root_segment(path: &str) -> Option<String> {
    let root = path
        .split(['.', '/'])
        .next()?
        .trim_start_matches('[')
        .trim_end_matches(']');
    (!root.is_empty()).then(|| root.to_string())
}

fn is_literal(word: &str) -> bool {
    word.starts_with('"')
        || word.starts_with('\'')
        || word.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        || matches!(word, "true" | "false" | "null" | "undefined" | "as" | "|")
        || word.starts_with('|')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_of(source: &str) -> Vec<String> {
        scan_schema("t", source)
            .unwrap()
            .fields()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn schema_collects_root_references_only() {
        let source = r#"
            {{! a comment with {{short_id}} }}
            {{!-- and {{email}} in a block comment --}}
            <p>{{applicant_info}} / {{{purpose}}}</p>
            {{#if is_organization}}{{organization_agent_info}}{{else}}-{{/if}}
            {{#each registry_items}}<td>{{number}} {{name}} {{@index}} {{@root.pages_word}}</td>{{/each}}
        "#;
        assert_eq!(
            schema_of(source),
            [
                "applicant_info",
                "is_organization",
                "organization_agent_info",
                "pages_word",
                "purpose",
                "registry_items"
            ]
        );
    }

    #[test]
    fn unbalanced_blocks_are_syntax_errors() {
        for source in ["{{#if is_draft}}x", "x{{/if}}", "{{#each registry_items}}{{/if}}"] {
            assert!(
                matches!(scan_schema("t", source), Err(RenderError::Syntax { .. })),
                "{source}"
            );
        }
    }

    #[test]
    fn unknown_field_is_rejected_at_load() {
        let err = CachedTemplate::from_source("t", "<p>{{applicant_nmae}}</p>").unwrap_err();
        match err {
            RenderError::UnknownField { field, .. } => assert_eq!(field, "applicant_nmae"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_context_field_is_reported_before_rendering() {
        let template = CachedTemplate::from_source("t", "<p>{{applicant_info}} {{pages_display}}</p>").unwrap();
        let ctx = RenderContext::from_pairs([("applicant_info", json!("Geo"))]);
        match template.render(&ctx).unwrap_err() {
            RenderError::MissingField { field } => assert_eq!(field, "pages_display"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn render_escapes_and_is_deterministic() {
        let template = CachedTemplate::from_source(
            "t",
            "{{#each registry_items}}<td>{{name}}</td>{{/each}}<p>{{pages_display}}</p>",
        )
        .unwrap();
        let ctx = RenderContext::from_pairs([
            ("registry_items", json!([{"name": "A & B"}, {"name": "C"}])),
            ("pages_display", json!("2 pages")),
        ]);
        let first = template.render(&ctx).unwrap();
        assert_eq!(first, template.render(&ctx).unwrap());
        assert_eq!(
            String::from_utf8(first).unwrap(),
            "<td>A &amp; B</td><td>C</td><p>2 pages</p>"
        );
    }

    #[test]
    fn bundled_templates_load() {
        for source in [
            crate::templates::registry_extract_template().to_string(),
            crate::templates::minimal_template().to_string(),
            crate::templates::breaks_template(3),
        ] {
            CachedTemplate::from_source("bundled", &source).unwrap();
        }
    }
}
