//! Input record – the structured request a document is generated from.
//!
//! The wire shape tags the applicant with a discriminant (`applicantType`)
//! next to two optional sub-records. [`DocumentRequest::from_json`] folds that
//! into the [`Applicant`] enum so exactly one variant is ever populated.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Organization applicant details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrganizationInfo {
    pub name: String,
    pub address: String,
    pub agent: String,
}

/// Individual applicant details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndividualInfo {
    pub name: String,
    /// External identity-provider id; rendered as an `(ID …)` suffix.
    #[serde(alias = "esia")]
    pub external_id: String,
}

/// The applicant, tagged by the request's `applicantType`.
///
/// A variant with a missing sub-record is legal and yields an empty
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicant {
    Organization(Option<OrganizationInfo>),
    Individual(Option<IndividualInfo>),
}

impl Applicant {
    pub fn is_organization(&self) -> bool {
        matches!(self, Applicant::Organization(_))
    }
}

/// Dictionary reference (`{code, value}`); only `value` is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DictionaryValue {
    pub code: String,
    pub value: String,
}

/// One row of the registry table. Order is preserved from the input.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryItem {
    pub id: Option<i64>,
    pub name: String,
    pub information_date: Option<String>,
    pub inv_number: String,
    pub note: Option<String>,
    /// Any further descriptive fields, passed through to the template.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    #[serde(default)]
    id: String,
    applicant_type: Option<String>,
    organization_info: Option<OrganizationInfo>,
    individual_info: Option<IndividualInfo>,
    creation_date: Option<String>,
    #[serde(default)]
    registry_items: Vec<RegistryItem>,
    #[serde(default)]
    is_draft: bool,
    pages: Option<u32>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default, rename = "purposeOfGeoInfoAccessDictionary")]
    purpose: DictionaryValue,
    #[serde(default, rename = "geoInfoStorageOrganization")]
    storage_organization: DictionaryValue,
}

/// A validated generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequest {
    pub id: String,
    pub applicant: Applicant,
    pub creation_date: Option<String>,
    pub registry_items: Vec<RegistryItem>,
    pub is_draft: bool,
    /// Explicit page count. Surfaces in the footer page-number field.
    pub pages: Option<u32>,
    pub email: String,
    pub phone: String,
    pub purpose: DictionaryValue,
    pub storage_organization: DictionaryValue,
}

impl DocumentRequest {
    /// Parse and validate a JSON request record.
    pub fn from_json(input: &str) -> Result<Self, ValidationError> {
        let raw: RawRequest = serde_json::from_str(input)?;
        Self::validate(raw)
    }

    fn validate(raw: RawRequest) -> Result<Self, ValidationError> {
        let kind = raw
            .applicant_type
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ValidationError::MissingField("applicantType"))?;

        let applicant = match kind {
            "ORGANIZATION" => {
                if raw.individual_info.is_some() {
                    log::warn!(
                        "request {}: individualInfo ignored for ORGANIZATION applicant",
                        raw.id
                    );
                }
                Applicant::Organization(raw.organization_info)
            }
            "INDIVIDUAL" => {
                if raw.organization_info.is_some() {
                    log::warn!(
                        "request {}: organizationInfo ignored for INDIVIDUAL applicant",
                        raw.id
                    );
                }
                Applicant::Individual(raw.individual_info)
            }
            other => return Err(ValidationError::UnknownApplicantType(other.to_string())),
        };

        Ok(Self {
            id: raw.id,
            applicant,
            creation_date: raw.creation_date,
            registry_items: raw.registry_items,
            is_draft: raw.is_draft,
            pages: raw.pages,
            email: raw.email,
            phone: raw.phone,
            purpose: raw.purpose,
            storage_organization: raw.storage_organization,
        })
    }
}
