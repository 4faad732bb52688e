//! Field enrichment – derives the auxiliary fields a template needs from the
//! raw request.
//!
//! Every field is computed independently and the pieces are fanned out with
//! `rayon::join`; [`enrich`] only returns once all of them are done. Nothing in
//! here fails: a field that cannot be derived falls back to its original value
//! (or to empty) and the problem is logged.

use rayon::prelude::*;

use crate::dates::normalize_date;
use crate::model::{Applicant, DocumentRequest, RegistryItem};

/// Human-readable applicant description plus the parts templates use
/// individually.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicantDescriptor {
    /// `"{name}, {address}, {agent}"` or `"{name} (ID {external_id})"`.
    pub info: String,
    pub name: String,
    /// Always empty for individuals.
    pub agent: String,
    pub is_organization: bool,
}

/// Output of the enrichment stage for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub creation_date: String,
    pub applicant: ApplicantDescriptor,
    pub short_id: String,
    /// Input items in input order with `information_date` normalized.
    pub registry_items: Vec<RegistryItem>,
}

/// Run every enrichment for `request`.
///
/// Sub-tasks run on the current rayon pool; call inside
/// `ThreadPool::install` to bound them.
pub fn enrich(request: &DocumentRequest, id_prefix: &str) -> Enrichment {
    let ((creation_date, registry_items), (applicant, short_id)) = rayon::join(
        || {
            rayon::join(
                || normalize_date(request.creation_date.as_deref()),
                || normalize_items(&request.registry_items),
            )
        },
        || {
            rayon::join(
                || describe_applicant(&request.applicant),
                || short_id(&request.id, id_prefix),
            )
        },
    );

    log::debug!(
        "request {}: enriched (creation_date={creation_date:?}, applicant={:?}, {} item(s))",
        request.id,
        applicant.info,
        registry_items.len()
    );

    Enrichment {
        creation_date,
        applicant,
        short_id,
        registry_items,
    }
}

/// Build the applicant descriptor. A missing sub-record yields an empty
/// descriptor that still carries the variant's organization flag.
pub fn describe_applicant(applicant: &Applicant) -> ApplicantDescriptor {
    match applicant {
        Applicant::Organization(Some(org)) => {
            let info = [&org.name, &org.address, &org.agent]
                .iter()
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            ApplicantDescriptor {
                info,
                name: org.name.trim().to_string(),
                agent: org.agent.trim().to_string(),
                is_organization: true,
            }
        }
        Applicant::Individual(Some(person)) => {
            let name = person.name.trim();
            let external_id = person.external_id.trim();
            let info = if external_id.is_empty() {
                name.to_string()
            } else {
                format!("{name} (ID {external_id})")
            };
            ApplicantDescriptor {
                info,
                name: name.to_string(),
                agent: String::new(),
                is_organization: false,
            }
        }
        Applicant::Organization(None) | Applicant::Individual(None) => {
            log::warn!("applicant sub-record is missing; using an empty descriptor");
            ApplicantDescriptor {
                is_organization: applicant.is_organization(),
                ..ApplicantDescriptor::default()
            }
        }
    }
}

/// Strip `prefix` from `id` when present, else pass the id through.
pub fn short_id(id: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return id.to_string();
    }
    id.strip_prefix(prefix).unwrap_or(id).to_string()
}

fn normalize_items(items: &[RegistryItem]) -> Vec<RegistryItem> {
    items
        .par_iter()
        .map(|item| {
            let mut item = item.clone();
            if let Some(date) = item.information_date.as_deref() {
                item.information_date = Some(normalize_date(Some(date)));
            }
            item
        })
        .collect()
}
