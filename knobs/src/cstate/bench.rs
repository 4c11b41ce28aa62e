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

use hwk_shared::types::LogicalCoreId;

use super::CStates;
use crate::bench::LatencyStats;
use crate::rapl::PowerMeter;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

const CONFIG_SETTLE: Duration = Duration::from_millis(500);
const WAKE_SLEEPS_US: [u64; 4] = [10, 100, 1_000, 10_000];

/// Deepest allowed state per run, `None` enables every state.
pub const BENCH_CONFIGS: [(&str, Option<u32>); 4] = [
    ("All C-states", None),
    ("Max C1", Some(1)),
    ("Max C2", Some(2)),
    ("C0/C1 only", Some(0)),
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntermittentPattern {
    pub name: &'static str,
    pub work: Duration,
    pub idle: Duration,
}

pub const INTERMITTENT_PATTERNS: [IntermittentPattern; 2] = [
    IntermittentPattern {
        name: "short bursts",
        work: Duration::from_micros(100),
        idle: Duration::from_micros(100),
    },
    IntermittentPattern {
        name: "medium idle",
        work: Duration::from_micros(1_000),
        idle: Duration::from_micros(5_000),
    },
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CStateBenchSettings {
    pub wake_iterations: usize,
    pub idle_duration: Duration,
    pub workload_duration: Duration,
}

impl Default for CStateBenchSettings {
    fn default() -> Self {
        Self {
            wake_iterations: 5_000,
            idle_duration: Duration::from_secs(10),
            workload_duration: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntermittentResult {
    pub pattern: IntermittentPattern,
    pub operations: u64,
    /// Operations per second.
    pub throughput: f64,
    pub avg_latency_ms: f64,
    pub power_watts: Option<f64>,
    pub energy_per_op_mj: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CStateBenchRow {
    pub config: &'static str,
    /// `C0:on C1:off ...` as seen on CPU 0 after applying the config.
    pub applied: String,
    /// Microseconds from waking up to finishing a short computation.
    pub wake_latency_us: Option<LatencyStats>,
    pub idle_watts: Option<f64>,
    pub workloads: Vec<IntermittentResult>,
}

/// Wake-up latency, idle power and intermittent workloads under each
/// [`BENCH_CONFIGS`] entry.
pub struct CStateBench<'c> {
    cstates: &'c CStates,
    meter: Option<PowerMeter>,
    settings: CStateBenchSettings,
    stop: StopToken,
}

impl<'c> CStateBench<'c> {
    pub fn new(
        cstates: &'c CStates,
        meter: Option<PowerMeter>,
        settings: CStateBenchSettings,
        stop: StopToken,
    ) -> Self {
        Self {
            cstates,
            meter,
            settings,
            stop,
        }
    }

    /// Runs every config and then writes the saved disable flags back.
    pub fn run(&self, mut on_row: impl FnMut(&CStateBenchRow)) -> KResult<Vec<CStateBenchRow>> {
        if self.meter.is_none() {
            tracing::warn!("no powercap package zone, power won't be reported");
        }
        let snapshot = self.cstates.snapshot()?;

        let result = BENCH_CONFIGS
            .iter()
            .map(|&(config, max_index)| {
                let row = self.run_config(config, max_index)?;
                on_row(&row);
                Ok(row)
            })
            .collect::<KResult<Vec<_>>>();

        if let Err(error) = self.cstates.restore(&snapshot) {
            tracing::warn!("failed to restore the original C-state configuration: {error}");
        }
        result
    }

    pub fn run_config(&self, config: &'static str, max_index: Option<u32>) -> KResult<CStateBenchRow> {
        tracing::info!("benchmarking C-state config: {config}");
        self.cstates.set_max_cstate(max_index.unwrap_or(u32::MAX))?;
        if !self.stop.sleep(CONFIG_SETTLE) {
            return Err(KnobError::Interrupted);
        }

        let applied = self.describe_cpu0()?;
        tracing::debug!("applied: {applied}");

        let wake_latency_us = self.wake_latency(self.settings.wake_iterations)?;
        let idle_watts = self.idle_power(self.settings.idle_duration)?;
        let workloads = INTERMITTENT_PATTERNS
            .iter()
            .map(|pattern| self.intermittent(*pattern, self.settings.workload_duration))
            .collect::<KResult<Vec<_>>>()?;

        Ok(CStateBenchRow {
            config,
            applied,
            wake_latency_us,
            idle_watts,
            workloads,
        })
    }

    fn describe_cpu0(&self) -> KResult<String> {
        let states = self.cstates.states(LogicalCoreId::new(0))?;
        let applied = states
            .iter()
            .map(|state| {
                let enabled = if state.disabled { "off" } else { "on" };
                format!("C{}:{enabled}", state.index)
            })
            .collect::<Vec<_>>();
        Ok(applied.join(" "))
    }

    /// Sleeps for 10us, 100us, 1ms and 10ms in turn and times a short
    /// computation right after each wake-up.
    pub fn wake_latency(&self, iterations: usize) -> KResult<Option<LatencyStats>> {
        let mut samples = Vec::with_capacity(iterations);
        for iteration in 0..iterations {
            if self.stop.is_stopped() {
                return Err(KnobError::Interrupted);
            }

            let sleep = WAKE_SLEEPS_US[iteration % WAKE_SLEEPS_US.len()];
            std::thread::sleep(Duration::from_micros(sleep));

            let wake = Instant::now();
            let sum = (0..100u64).fold(0u64, |sum, value| black_box(sum + value));
            black_box(sum);
            samples.push(wake.elapsed().as_secs_f64() * 1e6);
        }

        Ok(LatencyStats::from_samples(samples))
    }

    /// Package power while the tool itself sleeps, `None` without powercap.
    pub fn idle_power(&self, duration: Duration) -> KResult<Option<f64>> {
        let Some(meter) = &self.meter else {
            return Ok(None);
        };

        let start = meter.read()?;
        if !self.stop.sleep(duration) {
            return Err(KnobError::Interrupted);
        }
        Ok(Some(meter.watts_since(&start)?))
    }

    /// Alternates busy work and sleep for `duration`.
    pub fn intermittent(
        &self,
        pattern: IntermittentPattern,
        duration: Duration,
    ) -> KResult<IntermittentResult> {
        tracing::info!(
            "intermittent workload {}: {:?} work, {:?} idle",
            pattern.name,
            pattern.work,
            pattern.idle
        );

        let energy_start = self.meter.as_ref().map(PowerMeter::read).transpose()?;
        let start = Instant::now();
        let mut operations = 0u64;
        let mut busy = Duration::ZERO;

        while start.elapsed() < duration {
            if self.stop.is_stopped() {
                return Err(KnobError::Interrupted);
            }

            let work_start = Instant::now();
            while work_start.elapsed() < pattern.work {
                let mut result = 0.0f64;
                for i in 0..1000 {
                    let x = f64::from(i);
                    result += x.sqrt() * x.sin();
                }
                black_box(result);
            }
            busy += work_start.elapsed();
            operations += 1;

            std::thread::sleep(pattern.idle);
        }

        let seconds = start.elapsed().as_secs_f64();
        let power_watts = match (&self.meter, &energy_start) {
            (Some(meter), Some(start)) => Some(meter.watts_since(start)?),
            _ => None,
        };

        let throughput = if seconds > 0.0 {
            operations as f64 / seconds
        } else {
            0.0
        };
        let avg_latency_ms = if operations > 0 {
            busy.as_secs_f64() * 1e3 / operations as f64
        } else {
            0.0
        };
        let energy_per_op_mj = power_watts
            .filter(|&watts| watts > 0.0 && throughput > 0.0)
            .map(|watts| watts * 1e3 / throughput);

        Ok(IntermittentResult {
            pattern,
            operations,
            throughput,
            avg_latency_ms,
            power_watts,
            energy_per_op_mj,
        })
    }
}

impl fmt::Display for CStateBenchRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ---", self.config)?;
        writeln!(f, "  config: {}", self.applied)?;
        match &self.wake_latency_us {
            Some(stats) => writeln!(f, "  wake-up latency (us): {stats}")?,
            None => writeln!(f, "  wake-up latency: no samples")?,
        }
        match self.idle_watts {
            Some(watts) => writeln!(f, "  idle power: {watts:.2} W")?,
            None => writeln!(f, "  idle power: unavailable")?,
        }

        for workload in &self.workloads {
            write!(
                f,
                "  {:<13} {:>10.0} ops/s {:>9.3} ms",
                workload.pattern.name, workload.throughput, workload.avg_latency_ms
            )?;
            if let Some(energy) = workload.energy_per_op_mj {
                write!(f, " {energy:>9.3} mJ/op")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
