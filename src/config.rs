//! Generator configuration.
//!
//! Defaults cover local use; [`GeneratorConfig::from_env`] applies the
//! deployment overrides.

use std::env;
use std::time::Duration;

/// Hard cap on concurrent reconciliation runs, so the conversion service is
/// never hit by more than this many requests from one process.
pub const MAX_WORKERS: usize = 4;

/// Wording used for the page-count display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wording {
    /// Noun used when the count is exactly one (default: "page").
    pub singular: String,
    /// Noun used for every other count (default: "pages").
    pub plural: String,
    /// Display value for draft runs, which never measure.
    pub draft_placeholder: String,
    /// Display value for the placeholder pass. Must not contain digits.
    pub sentinel: String,
}

impl Default for Wording {
    fn default() -> Self {
        Self {
            singular: "page".to_string(),
            plural: "pages".to_string(),
            draft_placeholder: "[draft]".to_string(),
            sentinel: "__PAGE_COUNT__".to_string(),
        }
    }
}

/// Configuration for the reconciliation pipeline.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Base URL of the fixed-layout conversion service. `None` disables the
    /// external conversion strategy.
    pub conversion_url: Option<String>,
    /// Timeout applied to the whole conversion request (default: 30 s).
    pub conversion_timeout: Duration,
    /// Concurrent runs in batch mode, clamped to [`MAX_WORKERS`].
    pub workers: usize,
    /// Threads available to the enrichment fan-out inside one run.
    pub enrichment_threads: usize,
    /// Pages subtracted from the measured count for the cover sheet.
    pub cover_offset: u32,
    /// Prefix stripped from request ids to form the short id.
    pub id_prefix: String,
    /// Registry items with an empty name and this note are left out.
    pub unavailable_note: String,
    pub wording: Wording,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            conversion_url: None,
            conversion_timeout: Duration::from_secs(30),
            workers: MAX_WORKERS,
            enrichment_threads: 2,
            cover_offset: 1,
            id_prefix: "REQ-".to_string(),
            unavailable_note: "Document unavailable".to_string(),
            wording: Wording::default(),
        }
    }
}

impl GeneratorConfig {
    /// Defaults overridden by `GOTENBERG_URL`, `DOCKET_CONVERSION_TIMEOUT_SECS`,
    /// `DOCKET_WORKERS`, `DOCKET_COVER_OFFSET` and `DOCKET_ID_PREFIX`.
    ///
    /// Unparsable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_string("GOTENBERG_URL") {
            config.conversion_url = Some(url);
        }
        if let Some(secs) = env_number::<u64>("DOCKET_CONVERSION_TIMEOUT_SECS") {
            config.conversion_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = env_number::<usize>("DOCKET_WORKERS") {
            config.workers = workers;
        }
        if let Some(offset) = env_number::<u32>("DOCKET_COVER_OFFSET") {
            config.cover_offset = offset;
        }
        if let Some(prefix) = env_string("DOCKET_ID_PREFIX") {
            config.id_prefix = prefix;
        }
        config
    }

    /// Worker count actually used by the batch pool.
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}
