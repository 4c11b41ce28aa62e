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

use super::DevfreqDevice;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq)]
pub struct DevfreqSweepRow {
    pub target_hz: u64,
    /// Mean of the `cur_freq` samples.
    pub achieved_hz: Option<f64>,
    pub load_percent: Option<f64>,
    pub samples: usize,
}

impl DevfreqSweepRow {
    pub fn header() -> String {
        format!("{:>12} {:>14} {:>8} {:>8}", "Target MHz", "Achieved MHz", "Load %", "Samples")
    }
}

/// Pins a device to each frequency of its table and records the frequency
/// it actually runs at and its load.
pub struct DevfreqSweep<'d> {
    device: &'d DevfreqDevice,
    settle: Duration,
    dwell: Duration,
    stop: StopToken,
}

impl<'d> DevfreqSweep<'d> {
    pub fn new(device: &'d DevfreqDevice, settle: Duration, dwell: Duration, stop: StopToken) -> Self {
        Self {
            device,
            settle,
            dwell,
            stop,
        }
    }

    /// The frequency table, or just the hardware bounds without one.
    pub fn frequencies(&self) -> KResult<Vec<u64>> {
        let table = self.device.available_frequencies()?;
        if !table.is_empty() {
            return Ok(table);
        }

        let (min, max) = self.device.hardware_range()?;
        let mut bounds = vec![min, max];
        bounds.dedup();
        Ok(bounds)
    }

    /// Runs every frequency and restores governor and limits afterwards.
    pub fn run(&self, mut on_row: impl FnMut(&DevfreqSweepRow)) -> KResult<Vec<DevfreqSweepRow>> {
        let frequencies = self.frequencies()?;
        let state = self.device.state()?;

        let result = frequencies
            .into_iter()
            .map(|hz| {
                let row = self.run_frequency(hz)?;
                on_row(&row);
                Ok(row)
            })
            .collect::<KResult<Vec<_>>>();

        if let Err(error) = self.device.restore(&state) {
            tracing::warn!("failed to restore {}: {error}", self.device.name);
        }
        result
    }

    pub fn run_frequency(&self, hz: u64) -> KResult<DevfreqSweepRow> {
        tracing::info!("{} pinned at {} MHz", self.device.name, hz / 1_000_000);
        self.device.set_range(hz, hz)?;
        if !self.stop.sleep(self.settle) {
            return Err(KnobError::Interrupted);
        }

        let mut frequencies = Vec::new();
        let mut loads = Vec::new();
        let start = Instant::now();
        loop {
            if let Some(current) = self.device.current_hz()? {
                frequencies.push(current as f64);
            }
            if let Some(load) = self.device.load_percent()? {
                loads.push(f64::from(load));
            }

            if start.elapsed() >= self.dwell {
                break;
            }
            if !self.stop.sleep(SAMPLE_INTERVAL) {
                return Err(KnobError::Interrupted);
            }
        }

        let mean = |values: &[f64]| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        Ok(DevfreqSweepRow {
            target_hz: hz,
            achieved_hz: mean(&frequencies),
            load_percent: mean(&loads),
            samples: frequencies.len().max(loads.len()),
        })
    }
}

impl fmt::Display for DevfreqSweepRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let achieved = self
            .achieved_hz
            .map_or("-".to_string(), |hz| format!("{:.0}", hz / 1e6));
        let load = self
            .load_percent
            .map_or("-".to_string(), |load| format!("{load:.1}"));
        write!(
            f,
            "{:>12} {achieved:>14} {load:>8} {:>8}",
            self.target_hz / 1_000_000,
            self.samples
        )
    }
}
