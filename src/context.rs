//! Render context – the immutable field map handed to the template engine.
//!
//! A fresh context is built for every render pass from the request, its
//! enrichment, and the page-count display values of that pass.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Wording;
use crate::enrich::Enrichment;
use crate::model::{DocumentRequest, RegistryItem};

/// Every field a context carries. Templates may reference any subset.
pub const FIELDS: &[&str] = &[
    "id",
    "short_id",
    "email",
    "phone",
    "creation_date",
    "applicant_info",
    "applicant_name",
    "applicant_agent",
    "is_organization",
    "organization_agent_info",
    "purpose",
    "storage_organization",
    "registry_items",
    "registry_count",
    "pages",
    "pages_count",
    "pages_word",
    "pages_display",
    "is_draft",
];

/// Placeholder text for empty registry cells.
const EMPTY_CELL: &str = "-";

/// Values of the three page-count display fields for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValues {
    pub count: String,
    pub word: String,
    pub display: String,
}

impl DisplayValues {
    /// Placeholder pass: every display field holds the sentinel.
    pub fn sentinel(wording: &Wording) -> Self {
        Self::uniform(&wording.sentinel)
    }

    /// Draft runs: every display field holds the draft placeholder.
    pub fn draft(wording: &Wording) -> Self {
        Self::uniform(&wording.draft_placeholder)
    }

    /// Final pass with a reconciled count.
    pub fn counted(count: u32, plural: bool, wording: &Wording) -> Self {
        let word = if plural { &wording.plural } else { &wording.singular };
        Self {
            count: count.to_string(),
            word: word.clone(),
            display: format!("{count} {word}"),
        }
    }

    fn uniform(value: &str) -> Self {
        Self {
            count: value.to_string(),
            word: value.to_string(),
            display: value.to_string(),
        }
    }
}

/// Immutable field name → value mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    fields: BTreeMap<String, Value>,
}

impl RenderContext {
    /// Build the full context for one pass.
    pub fn build(
        request: &DocumentRequest,
        enrichment: &Enrichment,
        display: &DisplayValues,
        unavailable_note: &str,
    ) -> Self {
        let applicant = &enrichment.applicant;
        let rows = registry_rows(&enrichment.registry_items, unavailable_note);
        let agent_info = if applicant.is_organization && !applicant.agent.is_empty() {
            applicant.agent.clone()
        } else {
            String::new()
        };

        let mut fields = BTreeMap::new();
        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_string(), value);
        };
        put("id", request.id.clone().into());
        put("short_id", enrichment.short_id.clone().into());
        put("email", request.email.clone().into());
        put("phone", request.phone.clone().into());
        put("creation_date", enrichment.creation_date.clone().into());
        put("applicant_info", applicant.info.clone().into());
        put("applicant_name", applicant.name.clone().into());
        put("applicant_agent", applicant.agent.clone().into());
        put("is_organization", applicant.is_organization.into());
        put("organization_agent_info", agent_info.into());
        put("purpose", request.purpose.value.clone().into());
        put("storage_organization", request.storage_organization.value.clone().into());
        put("registry_count", rows.len().into());
        put("registry_items", Value::Array(rows));
        put(
            "pages",
            request.pages.map(|p| p.to_string()).unwrap_or_default().into(),
        );
        put("pages_count", display.count.clone().into());
        put("pages_word", display.word.clone().into());
        put("pages_display", display.display.clone().into());
        put("is_draft", request.is_draft.into());

        Self { fields }
    }

    /// Context from explicit pairs; used for ad-hoc renders and tests.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// String value of `field`, if it is a string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

fn registry_rows(items: &[RegistryItem], unavailable_note: &str) -> Vec<Value> {
    items
        .iter()
        .filter(|item| {
            let unavailable =
                item.name.trim().is_empty() && item.note.as_deref() == Some(unavailable_note);
            if unavailable {
                log::debug!("skipping unavailable registry item {:?}", item.id);
            }
            !unavailable
        })
        .enumerate()
        .map(|(index, item)| {
            let mut row = Map::new();
            for (key, value) in &item.extra {
                row.insert(key.clone(), value.clone());
            }
            row.insert("number".into(), (index + 1).into());
            row.insert(
                "id".into(),
                item.id.map(|id| id.to_string()).unwrap_or_else(|| EMPTY_CELL.into()).into(),
            );
            row.insert("name".into(), or_dash(&item.name).into());
            row.insert("inv_number".into(), or_dash(&item.inv_number).into());
            row.insert(
                "information_date".into(),
                or_dash(item.information_date.as_deref().unwrap_or_default()).into(),
            );
            row.insert(
                "note".into(),
                or_dash(item.note.as_deref().unwrap_or_default()).into(),
            );
            Value::Object(row)
        })
        .collect()
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        EMPTY_CELL.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::enrich;

    fn request(json: &str) -> DocumentRequest {
        DocumentRequest::from_json(json).unwrap()
    }

    #[test]
    fn context_carries_exactly_the_vocabulary() {
        let req = request(r#"{"applicantType":"INDIVIDUAL","individualInfo":{"name":"Ivanov"}}"#);
        let ctx = RenderContext::build(
            &req,
            &enrich(&req, "REQ-"),
            &DisplayValues::sentinel(&Wording::default()),
            "Document unavailable",
        );
        let mut keys: Vec<_> = ctx.keys().collect();
        keys.sort_unstable();
        let mut expected = FIELDS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(ctx.text("pages"), Some(""));
        assert_eq!(ctx.text("pages_display"), Some("__PAGE_COUNT__"));
    }

    #[test]
    fn registry_rows_are_numbered_and_defaulted() {
        let req = request(
            r#"{"applicantType":"ORGANIZATION","organizationInfo":{"name":"Geo","agent":"Smith"},
                "registryItems":[
                    {"id":11,"name":"Survey","invNumber":"A-1","informationDate":"2024-05-01","sheet":"N-37"},
                    {"name":"","note":"Document unavailable"},
                    {"id":13,"name":"Map"}
                ]}"#,
        );
        let ctx = RenderContext::build(
            &req,
            &enrich(&req, "REQ-"),
            &DisplayValues::counted(2, true, &Wording::default()),
            "Document unavailable",
        );
        let rows = ctx.get("registry_items").and_then(Value::as_array).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(ctx.get("registry_count"), Some(&Value::from(2)));
        assert_eq!(rows[0]["number"], 1);
        assert_eq!(rows[0]["information_date"], "01.05.2024");
        assert_eq!(rows[0]["sheet"], "N-37");
        assert_eq!(rows[1]["number"], 2);
        assert_eq!(rows[1]["id"], "13");
        assert_eq!(rows[1]["inv_number"], "-");
        assert_eq!(rows[1]["note"], "-");
        assert_eq!(ctx.text("organization_agent_info"), Some("Smith"));
        assert_eq!(ctx.text("pages_display"), Some("2 pages"));
    }

    #[test]
    fn display_values_follow_wording() {
        let wording = Wording::default();
        assert_eq!(DisplayValues::counted(1, false, &wording).display, "1 page");
        assert_eq!(DisplayValues::counted(5, true, &wording).display, "5 pages");
        assert_eq!(DisplayValues::draft(&wording).count, "[draft]");
    }
}
