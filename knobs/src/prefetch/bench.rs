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

use hwk_msr::MSRAccess;

use super::Prefetch;
use super::PrefetchPreset;
use super::PRESETS;
use crate::bench::AccessPattern;
use crate::bench::Budget;
use crate::bench::Harness;
use crate::bench::Measurement;
use crate::KResult;

pub const BENCH_PATTERNS: [AccessPattern; 6] = [
    AccessPattern::SequentialRead,
    AccessPattern::SequentialWrite,
    AccessPattern::RandomRead,
    AccessPattern::StrideRead(2),
    AccessPattern::StrideRead(8),
    AccessPattern::PointerChase,
];

#[derive(Clone, Debug)]
pub struct PrefetchBenchRow {
    pub preset: PrefetchPreset,
    pub measurements: Vec<Measurement>,
}

/// Times every access pattern under every prefetcher preset.
pub struct PrefetchBench<'p, A> {
    prefetch: &'p Prefetch<A>,
    harness: Harness,
    buffer_size: usize,
    passes: usize,
}

impl<'p, A: MSRAccess> PrefetchBench<'p, A> {
    pub fn new(
        prefetch: &'p Prefetch<A>,
        harness: Harness,
        buffer_size: usize,
        passes: usize,
    ) -> Self {
        Self {
            prefetch,
            harness,
            buffer_size,
            passes,
        }
    }

    /// Runs all presets, the register is restored even if a run fails.
    pub fn run(
        &mut self,
        mut on_row: impl FnMut(&PrefetchBenchRow),
    ) -> KResult<Vec<PrefetchBenchRow>> {
        let snapshot = self.prefetch.snapshot()?;

        let result = PRESETS
            .iter()
            .map(|preset| {
                let row = self.run_preset(preset)?;
                on_row(&row);
                Ok(row)
            })
            .collect::<KResult<Vec<_>>>();

        if let Err(error) = self.prefetch.restore(&snapshot) {
            tracing::warn!("failed to restore the original prefetch configuration: {error}");
        }
        result
    }

    pub fn run_preset(&mut self, preset: &PrefetchPreset) -> KResult<PrefetchBenchRow> {
        tracing::info!("benchmarking {}: {}", preset.name, preset.description);

        let mut measurements = Vec::with_capacity(BENCH_PATTERNS.len());
        for pattern in BENCH_PATTERNS {
            let size = match pattern {
                AccessPattern::PointerChase => self.buffer_size / 2,
                _ => self.buffer_size,
            };
            let mut workload = pattern.workload(size);

            let prefetch = self.prefetch;
            let measurement = self.harness.run(
                || prefetch.apply(preset.disable),
                workload.as_mut(),
                Budget::Passes(self.passes),
            )?;
            measurements.push(measurement);
        }

        Ok(PrefetchBenchRow {
            preset: *preset,
            measurements,
        })
    }
}

impl PrefetchBenchRow {
    pub fn header() -> String {
        let mut header = format!("{:<24}", "Config");
        for pattern in BENCH_PATTERNS {
            header.push_str(&format!(" {:>14}", pattern.name()));
        }
        header
    }
}

impl fmt::Display for PrefetchBenchRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24}", self.preset.name)?;
        for (pattern, measurement) in BENCH_PATTERNS.iter().zip(&self.measurements) {
            // pointer chasing is reported as load-to-use latency
            let latency = match pattern {
                AccessPattern::PointerChase => measurement.latency_ns(),
                _ => None,
            };
            match latency {
                Some(latency) => write!(f, " {latency:>11.1} ns")?,
                None => write!(f, " {:>9.1} MB/s", measurement.scaled_rate())?,
            }
        }
        Ok(())
    }
}
