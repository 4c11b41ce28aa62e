/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use super::workload::WorkUnit;
use super::workload::Workload;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HarnessPhase {
    Idle,
    Configuring,
    Settling,
    Measuring,
    Reporting,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HarnessSettings {
    /// Pause between applying a knob and starting the clock.
    pub settle: Duration,
    /// Run one untimed pass before measuring.
    pub warmup: bool,
}

/// How long a workload is timed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Budget {
    Passes(usize),
    Duration(Duration),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub workload: String,
    pub unit: WorkUnit,
    pub granule: u64,
    pub work: u64,
    pub passes: u64,
    pub elapsed: Duration,
    pub warmup: bool,
}

#[derive(Debug)]
pub struct Harness {
    settings: HarnessSettings,
    phase: HarnessPhase,
    stop: StopToken,
}

impl Harness {
    pub fn new(settings: HarnessSettings, stop: StopToken) -> Self {
        Self {
            settings,
            phase: HarnessPhase::Idle,
            stop,
        }
    }

    pub fn phase(&self) -> HarnessPhase {
        self.phase
    }

    pub fn settings(&self) -> HarnessSettings {
        self.settings
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Applies a knob with `configure`, lets it settle and times `workload`.
    pub fn run(
        &mut self,
        configure: impl FnOnce() -> KResult<()>,
        workload: &mut dyn Workload,
        budget: Budget,
    ) -> KResult<Measurement> {
        let result = self.run_phases(configure, workload, budget);
        self.transition(HarnessPhase::Idle);
        result
    }

    pub fn measure_iterations(
        &mut self,
        workload: &mut dyn Workload,
        passes: usize,
    ) -> KResult<Measurement> {
        self.run(|| Ok(()), workload, Budget::Passes(passes))
    }

    pub fn measure_for(
        &mut self,
        workload: &mut dyn Workload,
        duration: Duration,
    ) -> KResult<Measurement> {
        self.run(|| Ok(()), workload, Budget::Duration(duration))
    }

    fn run_phases(
        &mut self,
        configure: impl FnOnce() -> KResult<()>,
        workload: &mut dyn Workload,
        budget: Budget,
    ) -> KResult<Measurement> {
        self.transition(HarnessPhase::Configuring);
        configure()?;

        self.transition(HarnessPhase::Settling);
        workload.prepare();
        if !self.stop.sleep(self.settings.settle) {
            return Err(KnobError::Interrupted);
        }
        if self.settings.warmup {
            workload.pass();
        }

        self.transition(HarnessPhase::Measuring);
        let (work, passes, elapsed) = self.timed_passes(workload, budget)?;

        self.transition(HarnessPhase::Reporting);
        let measurement = Measurement {
            workload: workload.name().to_string(),
            unit: workload.unit(),
            granule: workload.granule(),
            work,
            passes,
            elapsed,
            warmup: self.settings.warmup,
        };
        tracing::debug!(target: "bench", "{measurement}");

        Ok(measurement)
    }

    fn timed_passes(
        &self,
        workload: &mut dyn Workload,
        budget: Budget,
    ) -> KResult<(u64, u64, Duration)> {
        let mut work = 0;
        let mut passes = 0;
        let start = Instant::now();

        loop {
            if self.stop.is_stopped() {
                return Err(KnobError::Interrupted);
            }

            let done = match budget {
                Budget::Passes(count) => passes >= count.max(1) as u64,
                Budget::Duration(duration) => passes > 0 && start.elapsed() >= duration,
            };
            if done {
                break;
            }

            work += workload.pass();
            passes += 1;
        }

        Ok((work, passes, start.elapsed()))
    }

    fn transition(&mut self, next: HarnessPhase) {
        if self.phase != next {
            tracing::trace!(target: "bench", "harness {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

impl Measurement {
    /// Raw work per second.
    pub fn rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.work as f64 / seconds
    }

    /// Rate in the unit shown in reports, e.g. MB/s for byte workloads.
    pub fn scaled_rate(&self) -> f64 {
        self.unit.scale(self.rate())
    }

    /// Average time of one access in nanoseconds.
    pub fn latency_ns(&self) -> Option<f64> {
        let accesses = self.work / self.granule.max(1);
        if accesses == 0 {
            return None;
        }
        Some(self.elapsed.as_nanos() as f64 / accesses as f64)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.1} {} over {} passes in {:?} (warm-up {})",
            self.workload,
            self.scaled_rate(),
            self.unit,
            self.passes,
            self.elapsed,
            if self.warmup { "on" } else { "off" }
        )
    }
}

impl From<&hwk_config::Bench> for HarnessSettings {
    fn from(bench: &hwk_config::Bench) -> Self {
        Self {
            settle: bench.settle,
            warmup: bench.warmup,
        }
    }
}
