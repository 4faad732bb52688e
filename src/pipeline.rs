//! Reconciliation controller – ties enrichment, rendering, measurement and
//! persistence into one run per request.
//!
//! ```text
//! Enriching → PlaceholderRendered → Measuring → FinalRendered → Persisted
//!                    │ (draft)                                      ▲
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! Any state can end in `Aborted`. The output path is only written by the
//! final atomic rename, so an aborted run never leaves a document behind.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::NamedTempFile;

use crate::cache::TemplateCache;
use crate::config::GeneratorConfig;
use crate::context::{DisplayValues, RenderContext};
use crate::convert::{snippet, Converter, GotenbergConverter};
use crate::enrich::enrich;
use crate::error::{Aborted, Error};
use crate::model::DocumentRequest;
use crate::pagination::{PageCountOracle, PageCountResult};
use crate::timings::{StageClock, TimingSummary};

/// Where a run is in the two-pass protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Enriching,
    PlaceholderRendered,
    Measuring,
    FinalRendered,
    Persisted,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Enriching => "enriching",
            RunState::PlaceholderRendered => "placeholder-rendered",
            RunState::Measuring => "measuring",
            RunState::FinalRendered => "final-rendered",
            RunState::Persisted => "persisted",
            RunState::Aborted => "aborted",
        })
    }
}

/// Displayed page count derived from a measurement.
///
/// The cover offset is subtracted first; wording follows that raw value
/// (singular only for exactly one) and the shown number is clamped to at
/// least one. A raw count of zero therefore reads "1 pages".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCountDisplay {
    pub count: u32,
    pub plural: bool,
}

impl PageCountDisplay {
    pub fn reconcile(measured: u32, cover_offset: u32) -> Self {
        let raw = measured.saturating_sub(cover_offset);
        Self {
            count: raw.max(1),
            plural: raw != 1,
        }
    }
}

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Checked at every state boundary.
    pub deadline: Option<Instant>,
    /// Where to write the stage timing summary, if anywhere.
    pub timings_path: Option<PathBuf>,
}

/// Outcome of a run that reached `Persisted`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request_id: String,
    pub output: PathBuf,
    pub state: RunState,
    /// Every state entered, in order.
    pub visited: Vec<RunState>,
    /// `None` for draft runs.
    pub page_count: Option<PageCountResult>,
    /// Value of the `pages_display` field in the persisted document.
    pub display: String,
    pub timings: TimingSummary,
}

/// Runs requests against templates from a shared cache.
pub struct Reconciler {
    config: GeneratorConfig,
    cache: Arc<TemplateCache>,
    oracle: PageCountOracle,
    enrichment_pool: rayon::ThreadPool,
}

impl Reconciler {
    /// Build with the standard strategy chain. The conversion strategy is
    /// backed by the configured service, if any.
    pub fn new(config: GeneratorConfig, cache: Arc<TemplateCache>) -> Result<Self, Error> {
        let converter = match &config.conversion_url {
            Some(url) => {
                let converter = GotenbergConverter::new(url, config.conversion_timeout)
                    .map_err(|e| Error::Setup(e.to_string()))?;
                log::info!("page counts may use conversion service {}", converter.endpoint());
                Some(Arc::new(converter) as Arc<dyn Converter>)
            }
            None => None,
        };
        Self::with_oracle(config, cache, PageCountOracle::standard(converter))
    }

    /// Build with a caller-assembled oracle.
    pub fn with_oracle(
        config: GeneratorConfig,
        cache: Arc<TemplateCache>,
        oracle: PageCountOracle,
    ) -> Result<Self, Error> {
        let enrichment_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.enrichment_threads.max(1))
            .thread_name(|i| format!("docket-enrich-{i}"))
            .build()
            .map_err(|e| Error::Setup(e.to_string()))?;
        Ok(Self {
            config,
            cache,
            oracle,
            enrichment_pool,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Parse `data` as a request record and run it.
    pub fn run_json(
        &self,
        template: &Path,
        data: &str,
        output: &Path,
        options: &RunOptions,
    ) -> Result<RunReport, Aborted> {
        let request = DocumentRequest::from_json(data).map_err(|e| {
            log::error!("invalid request record: {e}; input: {}", snippet(data));
            Aborted {
                from: RunState::Enriching,
                error: e.into(),
            }
        })?;
        self.run(template, &request, output, options)
    }

    /// One reconciliation run: enrich, render with the sentinel, measure,
    /// render with the real count, persist.
    pub fn run(
        &self,
        template_path: &Path,
        request: &DocumentRequest,
        output: &Path,
        options: &RunOptions,
    ) -> Result<RunReport, Aborted> {
        let mut run = Tracker::new(&request.id, options.deadline);
        log::info!(
            "request {}: generating {} from {}",
            request.id,
            output.display(),
            template_path.display()
        );

        // ── Enriching ──
        run.check_deadline()?;
        let template = self.cache.get(template_path).map_err(|e| run.abort(e.into()))?;
        let enrichment = self
            .enrichment_pool
            .install(|| enrich(request, &self.config.id_prefix));
        run.clock.lap("enrich");

        let wording = &self.config.wording;
        let first_display = if request.is_draft {
            DisplayValues::draft(wording)
        } else {
            DisplayValues::sentinel(wording)
        };
        let context = RenderContext::build(request, &enrichment, &first_display, &self.config.unavailable_note);
        let placeholder = template.render(&context).map_err(|e| run.abort(e.into()))?;
        run.clock.lap("render_placeholder");
        run.check_deadline()?;
        run.advance(RunState::PlaceholderRendered);

        let (document, page_count, display) = if request.is_draft {
            log::info!("request {}: draft, skipping measurement", request.id);
            (placeholder, None, first_display.display)
        } else {
            // ── Measuring ──
            run.advance(RunState::Measuring);
            let measured = self.oracle.measure(&placeholder).map_err(|e| run.abort(e.into()))?;
            run.clock.lap("measure");
            run.check_deadline()?;

            let shown = PageCountDisplay::reconcile(measured.value, self.config.cover_offset);
            let display = DisplayValues::counted(shown.count, shown.plural, wording);
            log::info!(
                "request {}: measured {} page(s) via {}, displaying {:?}",
                request.id,
                measured.value,
                measured.source,
                display.display
            );
            let context = RenderContext::build(request, &enrichment, &display, &self.config.unavailable_note);
            let document = template.render(&context).map_err(|e| run.abort(e.into()))?;
            run.clock.lap("render_final");
            run.check_deadline()?;
            run.advance(RunState::FinalRendered);
            (document, Some(measured), display.display)
        };

        // ── Persisting ──
        run.check_deadline()?;
        persist(output, &document).map_err(|e| run.abort(e))?;
        run.clock.lap("persist");
        run.advance(RunState::Persisted);

        let timings = run.clock.summary();
        if let Some(path) = &options.timings_path {
            if let Err(e) = timings.write(path) {
                log::warn!("request {}: could not write timings to {}: {e}", request.id, path.display());
            }
        }
        log::info!(
            "request {}: persisted {} ({} bytes, {:.1} ms)",
            request.id,
            output.display(),
            document.len(),
            timings.total_ms
        );

        Ok(RunReport {
            request_id: request.id.clone(),
            output: output.to_path_buf(),
            state: run.state,
            visited: run.visited,
            page_count,
            display,
            timings,
        })
    }
}

/// State bookkeeping for one run.
struct Tracker<'a> {
    request_id: &'a str,
    state: RunState,
    visited: Vec<RunState>,
    deadline: Option<Instant>,
    clock: StageClock,
}

impl<'a> Tracker<'a> {
    fn new(request_id: &'a str, deadline: Option<Instant>) -> Self {
        Self {
            request_id,
            state: RunState::Enriching,
            visited: vec![RunState::Enriching],
            deadline,
            clock: StageClock::start(request_id),
        }
    }

    fn advance(&mut self, next: RunState) {
        log::debug!("request {}: {} → {next}", self.request_id, self.state);
        self.state = next;
        self.visited.push(next);
    }

    fn check_deadline(&self) -> Result<(), Aborted> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.abort(Error::DeadlineExceeded)),
            _ => Ok(()),
        }
    }

    fn abort(&self, error: Error) -> Aborted {
        log::error!("request {}: aborted in {}: {error}", self.request_id, self.state);
        Aborted {
            from: self.state,
            error,
        }
    }
}

/// Write `bytes` next to `output` and atomically move them into place.
fn persist(output: &Path, bytes: &[u8]) -> Result<(), Error> {
    let io_err = |source: std::io::Error| Error::Persist {
        path: output.to_path_buf(),
        source,
    };
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(bytes).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(output).map_err(|e| io_err(e.error))?;
    Ok(())
}
