//! # docket – self-paging document generator
//!
//! Renders a request record into an HTML document whose stated page count
//! ("on N pages", "page X of Y") matches its own layout. The count is only
//! known after layout, so every run renders twice:
//!
//! 1. **Enrich** – derive display fields from the request ([`enrich`], [`dates`])
//! 2. **Render placeholder** – fill the template with a sentinel count ([`render`])
//! 3. **Measure** – ask the page-count oracle how long that document is ([`pagination`])
//! 4. **Render final** – fill the template again with the real count
//! 5. **Persist** – atomically move the result into place ([`pipeline`])
//!
//! Templates come from a shared [`cache`]; many requests can run at once
//! through [`batch`].

pub mod batch;
pub mod cache;
pub mod config;
pub mod context;
pub mod convert;
pub mod dates;
pub mod dom;
pub mod enrich;
pub mod error;
pub mod model;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod templates;
pub mod timings;

// Re-exports for convenience
pub use cache::TemplateCache;
pub use config::GeneratorConfig;
pub use error::{Aborted, Error};
pub use model::DocumentRequest;
pub use pagination::{PageCountOracle, PageCountResult, PageCountSource};
pub use pipeline::{Reconciler, RunOptions, RunReport, RunState};
