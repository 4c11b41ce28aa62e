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
use std::hint::black_box;
use std::time::Duration;
use std::time::Instant;

use super::CpuFreq;
use crate::bench::AccessPattern;
use crate::bench::Budget;
use crate::bench::ComputeKind;
use crate::bench::Harness;
use crate::bench::LatencyStats;
use crate::rapl::PowerMeter;
use crate::KResult;
use crate::KnobError;

const FREQUENCY_SETTLE: Duration = Duration::from_millis(500);
const LATENCY_SAMPLES: usize = 1000;
/// Points used when the driver publishes no frequency table.
const FALLBACK_STEPS: u64 = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct FreqSweepRow {
    pub target_khz: u64,
    /// `scaling_cur_freq` of the first policy right before measuring.
    pub achieved_khz: Option<u64>,
    pub gflops: f64,
    /// Copy bandwidth in MB/s.
    pub memcpy_mb_s: f64,
    pub median_latency_ns: f64,
    pub power_watts: Option<f64>,
}

impl FreqSweepRow {
    pub fn gflops_per_watt(&self) -> Option<f64> {
        self.power_watts
            .filter(|&watts| watts > 0.0)
            .map(|watts| self.gflops / watts)
    }

    pub fn header() -> String {
        format!(
            "{:>10} {:>10} {:>10} {:>12} {:>12} {:>9} {:>12}",
            "Target MHz", "Cur MHz", "GFLOPS", "Copy MB/s", "Latency ns", "Power W", "GFLOPS/W"
        )
    }
}

/// Pins every policy to each frequency in turn and measures compute, copy
/// bandwidth, single operation latency and package power.
pub struct FreqSweep<'f> {
    cpufreq: &'f CpuFreq,
    harness: Harness,
    meter: Option<PowerMeter>,
    buffer_size: usize,
    passes: usize,
}

impl<'f> FreqSweep<'f> {
    pub fn new(
        cpufreq: &'f CpuFreq,
        harness: Harness,
        meter: Option<PowerMeter>,
        buffer_size: usize,
        passes: usize,
    ) -> Self {
        Self {
            cpufreq,
            harness,
            meter,
            buffer_size,
            passes,
        }
    }

    /// The frequency table of the first policy, or evenly spaced points of
    /// its hardware range.
    pub fn frequencies(&self) -> KResult<Vec<u64>> {
        let policy = self.cpufreq.first();
        let table = policy.available_frequencies()?;
        if !table.is_empty() {
            return Ok(table);
        }

        let limits = policy.limits()?;
        let min = limits.hw_min_khz.unwrap_or(limits.min_khz);
        let max = limits.hw_max_khz.unwrap_or(limits.max_khz);
        if max <= min {
            return Ok(vec![min]);
        }

        let step = (max - min) / (FALLBACK_STEPS - 1);
        let mut points = (0..FALLBACK_STEPS)
            .map(|index| min + step * index)
            .collect::<Vec<_>>();
        if let Some(last) = points.last_mut() {
            *last = max;
        }
        Ok(points)
    }

    /// Runs the sweep and restores governors and limits afterwards.
    pub fn run(
        &mut self,
        frequencies: &[u64],
        mut on_row: impl FnMut(&FreqSweepRow),
    ) -> KResult<Vec<FreqSweepRow>> {
        if frequencies.is_empty() {
            return Err(KnobError::invalid_param("frequency sweep", "no frequencies to test"));
        }
        let snapshot = self.cpufreq.snapshot()?;

        let result = frequencies
            .iter()
            .map(|&khz| {
                let row = self.run_frequency(khz)?;
                on_row(&row);
                Ok(row)
            })
            .collect::<KResult<Vec<_>>>();

        if let Err(error) = self.cpufreq.restore(&snapshot) {
            tracing::warn!("failed to restore the original cpufreq configuration: {error}");
        }
        result
    }

    /// The `userspace` governor when available, otherwise both limits are
    /// pinned to the target.
    fn pin(&self, khz: u64) -> KResult<()> {
        if self.cpufreq.first().supports_userspace()? {
            self.cpufreq.set_speed(khz, None)
        } else {
            self.cpufreq.set_limits(khz, khz, None)
        }
    }

    pub fn run_frequency(&mut self, khz: u64) -> KResult<FreqSweepRow> {
        tracing::info!("benchmarking at {} MHz", khz / 1000);
        self.pin(khz)?;
        if !self.harness.stop_token().sleep(FREQUENCY_SETTLE) {
            return Err(KnobError::Interrupted);
        }
        let achieved_khz = self.cpufreq.first().current_khz()?;

        let energy_start = self.meter.as_ref().map(PowerMeter::read).transpose()?;

        let mut compute = ComputeKind::FloatCompute.workload(self.buffer_size);
        let gflops = self
            .harness
            .run(|| Ok(()), compute.as_mut(), Budget::Passes(self.passes))?
            .scaled_rate();

        let mut copy = AccessPattern::StreamCopy.workload(self.buffer_size);
        let memcpy_mb_s = self
            .harness
            .run(|| Ok(()), copy.as_mut(), Budget::Passes(self.passes))?
            .scaled_rate();

        let median_latency_ns = median_operation_latency(LATENCY_SAMPLES);

        let power_watts = match (&self.meter, &energy_start) {
            (Some(meter), Some(start)) => Some(meter.watts_since(start)?),
            _ => None,
        };

        Ok(FreqSweepRow {
            target_khz: khz,
            achieved_khz,
            gflops,
            memcpy_mb_s,
            median_latency_ns,
            power_watts,
        })
    }
}

/// Median time of a short dependent sqrt chain.
fn median_operation_latency(samples: usize) -> f64 {
    let latencies = (0..samples)
        .map(|sample| {
            let start = Instant::now();
            let mut value = black_box(sample as f64 + 0.5);
            value = value.sqrt();
            value *= value;
            value = value.sqrt();
            black_box(value);
            start.elapsed().as_nanos() as f64
        })
        .collect::<Vec<_>>();

    LatencyStats::from_samples(latencies).map_or(0.0, |stats| stats.p50)
}

/// Rows with the highest GFLOPS and the best GFLOPS per watt.
pub fn summarize(rows: &[FreqSweepRow]) -> (Option<&FreqSweepRow>, Option<&FreqSweepRow>) {
    let peak = rows.iter().max_by(|lhs, rhs| lhs.gflops.total_cmp(&rhs.gflops));
    let efficient = rows
        .iter()
        .filter_map(|row| Some((row, row.gflops_per_watt()?)))
        .max_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))
        .map(|(row, _)| row);
    (peak, efficient)
}

impl fmt::Display for FreqSweepRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optional = |value: Option<f64>| value.map_or("-".to_string(), |value| format!("{value:.2}"));
        write!(
            f,
            "{:>10} {:>10} {:>10.2} {:>12.1} {:>12.1} {:>9} {:>12}",
            self.target_khz / 1000,
            self.achieved_khz.map_or("-".to_string(), |khz| (khz / 1000).to_string()),
            self.gflops,
            self.memcpy_mb_s,
            self.median_latency_ns,
            optional(self.power_watts),
            optional(self.gflops_per_watt())
        )
    }
}
