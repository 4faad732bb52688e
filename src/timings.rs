//! Stage timing summary – the side artifact written next to a generated
//! document.
//!
//! ```json
//! {"request_id":"REQ-1","stages":[{"stage":"enrich","elapsed_ms":0.8}],"total_ms":0.8}
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: f64,
}

/// Per-stage wall-clock times of one run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub request_id: String,
    pub stages: Vec<StageTiming>,
    pub total_ms: f64,
}

impl TimingSummary {
    pub fn stage(&self, name: &str) -> Option<&StageTiming> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Write the summary as pretty JSON to `path`.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_json())
    }
}

/// Lap timer producing a [`TimingSummary`].
#[derive(Debug)]
pub struct StageClock {
    request_id: String,
    started: Instant,
    last: Instant,
    stages: Vec<StageTiming>,
}

impl StageClock {
    pub fn start(request_id: &str) -> Self {
        let now = Instant::now();
        Self {
            request_id: request_id.to_string(),
            started: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Close the current stage under `stage` and start the next one.
    pub fn lap(&mut self, stage: &str) {
        let now = Instant::now();
        let elapsed = now - self.last;
        self.last = now;
        log::debug!("request {}: {stage} took {elapsed:?}", self.request_id);
        self.stages.push(StageTiming {
            stage: stage.to_string(),
            elapsed_ms: millis(elapsed),
        });
    }

    pub fn summary(&self) -> TimingSummary {
        TimingSummary {
            request_id: self.request_id.clone(),
            stages: self.stages.clone(),
            total_ms: millis(self.last - self.started),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_are_recorded_in_order_and_sum_to_total() {
        let mut clock = StageClock::start("REQ-1");
        clock.lap("enrich");
        std::thread::sleep(Duration::from_millis(2));
        clock.lap("render_placeholder");
        let summary = clock.summary();

        let names: Vec<_> = summary.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(names, ["enrich", "render_placeholder"]);
        assert!(summary.stage("render_placeholder").unwrap().elapsed_ms >= 2.0);
        let sum: f64 = summary.stages.iter().map(|s| s.elapsed_ms).sum();
        assert!((sum - summary.total_ms).abs() < 1e-6);
    }

    #[test]
    fn summary_json_shape() {
        let summary = TimingSummary {
            request_id: "REQ-1".into(),
            stages: vec![StageTiming { stage: "persist".into(), elapsed_ms: 1.5 }],
            total_ms: 1.5,
        };
        let value: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(value["request_id"], "REQ-1");
        assert_eq!(value["stages"][0]["stage"], "persist");
        assert_eq!(value["total_ms"], 1.5);
    }
}
