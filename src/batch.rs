//! Bounded request-level parallelism.
//!
//! Independent runs go through one rayon pool of at most
//! [`crate::config::MAX_WORKERS`] threads, which also bounds concurrent calls
//! to the conversion service. Runs share the reconciler (and so the template
//! cache) but nothing else.

use std::collections::HashSet;
use std::path::PathBuf;

use rayon::prelude::*;

use crate::error::{Aborted, Error};
use crate::pipeline::{Reconciler, RunOptions, RunReport};

/// One request to generate.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub template: PathBuf,
    /// Raw JSON request record.
    pub data: String,
    pub output: PathBuf,
    pub options: RunOptions,
}

/// Run every job; results come back in job order.
///
/// Jobs sharing an output path are rejected before anything runs.
pub fn run_batch(
    reconciler: &Reconciler,
    jobs: &[BatchJob],
) -> Result<Vec<Result<RunReport, Aborted>>, Error> {
    let mut outputs = HashSet::with_capacity(jobs.len());
    if let Some(job) = jobs.iter().find(|job| !outputs.insert(&job.output)) {
        return Err(Error::DuplicateOutput(job.output.clone()));
    }

    let workers = reconciler.config().effective_workers();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("docket-run-{i}"))
        .build()
        .map_err(|e| Error::Setup(e.to_string()))?;

    log::info!("running {} job(s) on {workers} worker(s)", jobs.len());
    let results: Vec<_> = pool.install(|| {
        jobs.par_iter()
            .map(|job| reconciler.run_json(&job.template, &job.data, &job.output, &job.options))
            .collect()
    });

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        log::warn!("{failed} of {} job(s) aborted", jobs.len());
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TemplateCache;
    use crate::config::GeneratorConfig;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn results_keep_job_order_and_share_one_template_load() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.html");
        fs::write(&template, crate::templates::breaks_template(1)).unwrap();

        let jobs: Vec<_> = (0..6)
            .map(|i| BatchJob {
                template: template.clone(),
                data: if i == 3 {
                    "{}".to_string()
                } else {
                    format!(r#"{{"id":"REQ-{i}","applicantType":"INDIVIDUAL","individualInfo":{{"name":"N{i}"}}}}"#)
                },
                output: dir.path().join(format!("out-{i}.html")),
                options: RunOptions::default(),
            })
            .collect();

        let cache = Arc::new(TemplateCache::new());
        let reconciler = Reconciler::new(GeneratorConfig::default(), Arc::clone(&cache)).unwrap();
        let results = run_batch(&reconciler, &jobs).unwrap();

        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            if i == 3 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().request_id, format!("REQ-{i}"));
            }
        }
        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn shared_output_paths_are_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.html");
        fs::write(&template, crate::templates::breaks_template(1)).unwrap();
        let data = r#"{"id":"REQ-1","applicantType":"INDIVIDUAL","individualInfo":{"name":"N"}}"#;
        let out = dir.path().join("req.html");
        let jobs: Vec<_> = (0..2)
            .map(|_| BatchJob {
                template: template.clone(),
                data: data.to_string(),
                output: out.clone(),
                options: RunOptions::default(),
            })
            .collect();

        let cache = Arc::new(TemplateCache::new());
        let reconciler = Reconciler::new(GeneratorConfig::default(), Arc::clone(&cache)).unwrap();
        let err = run_batch(&reconciler, &jobs).unwrap_err();
        assert!(matches!(err, Error::DuplicateOutput(ref p) if *p == out));
        assert!(!out.exists());
        assert_eq!(cache.load_count(), 0);
    }
}
