// ABOUTME: Random behaviour of the simulated upstream network: latency, failures, report outcomes
// ABOUTME: Seedable so end-to-end runs can be reproduced

use crate::config::SimulationConfig;
use crate::datatypes::ReportStat;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Probability that a report says DELIVRD; each failure state gets 1%
const DELIVERED_PROBABILITY: f64 = 0.9;
const FAILURE_PROBABILITY: f64 = 0.01;

#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Uniform in `[min-submit-resp-ms, max-submit-resp-ms]`
    pub fn processing_delay(&self) -> Duration {
        let min = self.config.min_submit_resp_ms;
        let max = self.config.max_submit_resp_ms.max(min);
        Duration::from_millis(self.rng.lock().gen_range(min..=max))
    }

    /// Delay between a submission and its report
    pub fn report_delay(&self, processing: Duration) -> Duration {
        processing + self.config.fix_report_delay()
    }

    pub fn roll_success(&self) -> bool {
        self.rng
            .lock()
            .gen_bool(self.config.success_rate.clamp(0.0, 1.0))
    }

    pub fn skip_report(&self) -> bool {
        self.rng
            .lock()
            .gen_bool(self.config.report_skip_rate.clamp(0.0, 1.0))
    }

    pub fn report_stat(&self) -> ReportStat {
        let roll: f64 = self.rng.lock().r#gen();
        if roll < DELIVERED_PROBABILITY {
            return ReportStat::Delivered;
        }
        let index = ((roll - DELIVERED_PROBABILITY) / FAILURE_PROBABILITY) as usize;
        ReportStat::FAILURES[index.min(ReportStat::FAILURES.len() - 1)].clone()
    }
}
