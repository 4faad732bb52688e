//! docket – generate documents that state their own page count.
//!
//! Usage:
//!   docket generate <template.html> <request.json> <output.html> [--timings [PATH]]
//!   docket batch <template.html> <out_dir> <request.json>... [--workers N]
//!   docket sample-template [OUTPUT]
//!
//! The conversion service comes from `--conversion-url` or `GOTENBERG_URL`.
//! Without one, page counts fall back to footer fields and page-break markers.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};

use docket::batch::{run_batch, BatchJob};
use docket::templates::registry_extract_template;
use docket::{GeneratorConfig, Reconciler, RunOptions, TemplateCache};

#[derive(Parser, Debug)]
#[command(
    name = "docket",
    version,
    about = "Render documents that state their own page count",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one document
    Generate(GenerateArgs),
    /// Generate one document per request file, in parallel
    Batch(BatchArgs),
    /// Write the bundled sample template
    SampleTemplate {
        /// Output path (default: stdout)
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Base URL of the Gotenberg-compatible conversion service
    #[arg(long, value_name = "URL")]
    conversion_url: Option<String>,

    /// Conversion request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    template: PathBuf,
    data: PathBuf,
    output: PathBuf,

    /// Write the stage timing summary (default: <output>.timings.json)
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    timings: Option<String>,

    /// Abort the run if it takes longer than this many seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    template: PathBuf,
    out_dir: PathBuf,
    #[arg(required = true)]
    data: Vec<PathBuf>,

    /// Concurrent runs (capped at 4)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    #[command(flatten)]
    service: ServiceArgs,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate(args) => generate(args),
        Command::Batch(args) => batch(args),
        Command::SampleTemplate { output } => sample_template(output.as_deref()),
    };
    if let Err(message) = result {
        eprintln!("Error: {message}");
        process::exit(1);
    }
}

fn configure(service: &ServiceArgs) -> GeneratorConfig {
    let mut config = GeneratorConfig::from_env();
    if let Some(url) = &service.conversion_url {
        config.conversion_url = Some(url.clone());
    }
    if let Some(secs) = service.timeout {
        config.conversion_timeout = Duration::from_secs(secs);
    }
    config
}

fn generate(args: GenerateArgs) -> Result<(), String> {
    let config = configure(&args.service);
    let reconciler = Reconciler::new(config, Arc::new(TemplateCache::new())).map_err(|e| e.to_string())?;

    let data = fs::read_to_string(&args.data)
        .map_err(|e| format!("reading '{}': {e}", args.data.display()))?;
    let options = RunOptions {
        deadline: args.deadline.map(|secs| Instant::now() + Duration::from_secs(secs)),
        timings_path: args.timings.map(|path| {
            if path.is_empty() {
                sidecar_path(&args.output)
            } else {
                PathBuf::from(path)
            }
        }),
    };

    let report = reconciler
        .run_json(&args.template, &data, &args.output, &options)
        .map_err(|e| e.to_string())?;
    let source = report
        .page_count
        .map(|p| format!(" via {}", p.source))
        .unwrap_or_default();
    eprintln!(
        "Wrote '{}' ({}{source}, {:.1} ms)",
        report.output.display(),
        report.display,
        report.timings.total_ms
    );
    Ok(())
}

fn batch(args: BatchArgs) -> Result<(), String> {
    let mut config = configure(&args.service);
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let reconciler = Reconciler::new(config, Arc::new(TemplateCache::new())).map_err(|e| e.to_string())?;

    let mut jobs = Vec::with_capacity(args.data.len());
    for path in &args.data {
        let data = fs::read_to_string(path).map_err(|e| format!("reading '{}': {e}", path.display()))?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
        jobs.push(BatchJob {
            template: args.template.clone(),
            data,
            output: args.out_dir.join(format!("{stem}.html")),
            options: RunOptions::default(),
        });
    }

    let results = run_batch(&reconciler, &jobs).map_err(|e| e.to_string())?;
    let mut failed = 0usize;
    for (job, result) in jobs.iter().zip(&results) {
        match result {
            Ok(report) => eprintln!("Wrote '{}' ({})", report.output.display(), report.display),
            Err(e) => {
                failed += 1;
                eprintln!("Failed '{}': {e}", job.output.display());
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} document(s) failed", jobs.len()));
    }
    Ok(())
}

fn sample_template(output: Option<&Path>) -> Result<(), String> {
    let html = registry_extract_template();
    match output {
        Some(path) => {
            fs::write(path, html).map_err(|e| format!("writing '{}': {e}", path.display()))?;
            eprintln!("Wrote '{}'", path.display());
        }
        None => print!("{html}"),
    }
    Ok(())
}

/// `out.html` → `out.html.timings.json`
fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".timings.json");
    PathBuf::from(name)
}
