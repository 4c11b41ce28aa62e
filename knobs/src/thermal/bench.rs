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

use super::apply_policy;
use super::cpu_celsius;
use super::ThermalPolicy;
use super::ThermalZone;
use crate::cpufreq::CpuFreq;
use crate::rapl::EnergyReading;
use crate::rapl::PowerMeter;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

const DUTY_SLICE: Duration = Duration::from_millis(10);
/// A drop of more than this between two samples counts as a throttle event.
const THROTTLE_DROP_MHZ: f64 = 100.0;

pub const LOAD_LEVELS: [f64; 3] = [0.5, 0.75, 1.0];

/// A capping policy under test, `None` thresholds leave frequency alone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThermalStrategy {
    pub name: &'static str,
    pub thresholds: Option<(f64, f64, f64)>,
}

pub const STRATEGIES: [ThermalStrategy; 4] = [
    ThermalStrategy {
        name: "no capping",
        thresholds: None,
    },
    ThermalStrategy {
        name: "conservative",
        thresholds: Some((65.0, 75.0, 85.0)),
    },
    ThermalStrategy {
        name: "aggressive",
        thresholds: Some((60.0, 70.0, 80.0)),
    },
    ThermalStrategy {
        name: "balanced",
        thresholds: Some((70.0, 80.0, 90.0)),
    },
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThermalBenchSettings {
    /// Load runs this long before sampling starts.
    pub warmup: Duration,
    pub duration: Duration,
    /// Idle pause between strategies.
    pub cooldown: Duration,
    pub sample_interval: Duration,
}

impl Default for ThermalBenchSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(10),
            duration: Duration::from_secs(30),
            cooldown: Duration::from_secs(20),
            sample_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThermalPoint {
    pub seconds: f64,
    pub celsius: Option<f64>,
    pub freq_mhz: Option<f64>,
    pub watts: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThermalBenchResult {
    pub strategy: &'static str,
    pub load: f64,
    pub samples: usize,
    pub avg_celsius: Option<f64>,
    pub max_celsius: Option<f64>,
    pub celsius_stddev: Option<f64>,
    pub avg_freq_mhz: Option<f64>,
    /// Mean of frequency share times thermal headroom, 0..1.
    pub avg_performance: Option<f64>,
    pub energy_joules: Option<f64>,
    pub throttle_events: usize,
}

impl ThermalBenchResult {
    pub fn performance_per_joule(&self) -> Option<f64> {
        let energy = self.energy_joules.filter(|&energy| energy > 0.0)?;
        Some(self.avg_performance? / energy)
    }

    pub fn header() -> String {
        format!(
            "{:<14} {:>5} {:>8} {:>8} {:>7} {:>9} {:>6} {:>10} {:>9}",
            "Strategy", "Load", "Avg C", "Max C", "Std C", "Avg MHz", "Perf", "Energy J", "Throttles"
        )
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Summarizes one run. Performance scores frequency against `freq_max_khz`
/// and headroom against `critical_celsius`.
pub fn analyze(
    strategy: &'static str,
    load: f64,
    points: &[ThermalPoint],
    freq_max_khz: u64,
    critical_celsius: f64,
) -> ThermalBenchResult {
    let temperatures = points.iter().filter_map(|point| point.celsius).collect::<Vec<_>>();
    let frequencies = points.iter().filter_map(|point| point.freq_mhz).collect::<Vec<_>>();

    let avg_celsius = mean(&temperatures);
    let celsius_stddev = avg_celsius.map(|avg| {
        let variance = temperatures
            .iter()
            .map(|celsius| (celsius - avg).powi(2))
            .sum::<f64>()
            / temperatures.len() as f64;
        variance.sqrt()
    });

    let max_mhz = freq_max_khz as f64 / 1000.0;
    let scores = points
        .iter()
        .filter_map(|point| {
            let headroom = ((critical_celsius - point.celsius?) / critical_celsius).max(0.0);
            Some(point.freq_mhz? / max_mhz * headroom)
        })
        .filter(|score| score.is_finite())
        .collect::<Vec<_>>();

    let throttle_events = frequencies
        .windows(2)
        .filter(|pair| pair[1] < pair[0] - THROTTLE_DROP_MHZ)
        .count();

    let mut energy_joules = None;
    for pair in points.windows(2) {
        if let (Some(previous), Some(current)) = (pair[0].watts, pair[1].watts) {
            let seconds = pair[1].seconds - pair[0].seconds;
            *energy_joules.get_or_insert(0.0) += (previous + current) / 2.0 * seconds;
        }
    }

    ThermalBenchResult {
        strategy,
        load,
        samples: points.len(),
        avg_celsius,
        max_celsius: temperatures.iter().copied().max_by(f64::total_cmp),
        celsius_stddev,
        avg_freq_mhz: mean(&frequencies),
        avg_performance: mean(&scores),
        energy_joules,
        throttle_events,
    }
}

/// Every [`STRATEGIES`] entry under every [`LOAD_LEVELS`] entry, sampling
/// temperature, frequency and package power.
pub struct ThermalBench<'t> {
    zones: &'t [ThermalZone],
    cpufreq: &'t CpuFreq,
    base: ThermalPolicy,
    meter: Option<PowerMeter>,
    settings: ThermalBenchSettings,
    stop: StopToken,
}

impl<'t> ThermalBench<'t> {
    pub fn new(
        zones: &'t [ThermalZone],
        cpufreq: &'t CpuFreq,
        base: ThermalPolicy,
        meter: Option<PowerMeter>,
        settings: ThermalBenchSettings,
        stop: StopToken,
    ) -> Self {
        Self {
            zones,
            cpufreq,
            base,
            meter,
            settings,
            stop,
        }
    }

    /// Runs the whole matrix and restores every cpufreq policy afterwards.
    pub fn run(
        &self,
        mut on_result: impl FnMut(&ThermalBenchResult),
    ) -> KResult<Vec<ThermalBenchResult>> {
        let snapshot = self.cpufreq.snapshot()?;
        let runs = LOAD_LEVELS
            .iter()
            .flat_map(|&load| STRATEGIES.iter().map(move |strategy| (load, strategy)))
            .collect::<Vec<_>>();

        let mut results = Vec::with_capacity(runs.len());
        let mut outcome = Ok(());
        for (position, (load, strategy)) in runs.iter().enumerate() {
            if position > 0 && !self.stop.sleep(self.settings.cooldown) {
                outcome = Err(KnobError::Interrupted);
                break;
            }

            match self.run_strategy(strategy, *load) {
                Ok(points) => {
                    let result = analyze(
                        strategy.name,
                        *load,
                        &points,
                        self.base.freq_max_khz,
                        self.base.critical_celsius,
                    );
                    on_result(&result);
                    results.push(result);
                }
                Err(error) => {
                    outcome = Err(error);
                    break;
                }
            }
        }

        if let Err(error) = self.cpufreq.restore(&snapshot) {
            tracing::warn!("failed to restore the original cpufreq configuration: {error}");
        }
        outcome.map(|_| results)
    }

    /// Loads the CPU at `load` on a background thread while sampling.
    pub fn run_strategy(&self, strategy: &ThermalStrategy, load: f64) -> KResult<Vec<ThermalPoint>> {
        tracing::info!("thermal strategy {} at {:.0}% load", strategy.name, load * 100.0);
        let policy = strategy
            .thresholds
            .map(|(low, high, critical)| self.base.with_thresholds(low, high, critical))
            .transpose()?;
        self.cpufreq.cap_max_khz(self.base.freq_max_khz)?;

        let generator = StopToken::new();
        let stop = &self.stop;
        let points = std::thread::scope(|scope| {
            scope.spawn(|| duty_cycle(load, &generator, stop));
            let points = self.sample(policy.as_ref());
            generator.stop();
            points
        });

        self.cpufreq.cap_max_khz(self.base.freq_max_khz)?;
        points
    }

    fn sample(&self, policy: Option<&ThermalPolicy>) -> KResult<Vec<ThermalPoint>> {
        if !self.stop.sleep(self.settings.warmup) {
            return Err(KnobError::Interrupted);
        }

        let start = Instant::now();
        let mut previous_energy: Option<EnergyReading> = None;
        let mut points = Vec::new();
        loop {
            let celsius = match policy {
                Some(policy) => apply_policy(self.zones, self.cpufreq, policy)?.0,
                None => cpu_celsius(self.zones),
            };
            let freq_mhz = self
                .cpufreq
                .first()
                .current_khz()?
                .map(|khz| khz as f64 / 1000.0);

            let mut watts = None;
            if let Some(meter) = &self.meter {
                let reading = meter.read()?;
                if let Some(previous) = &previous_energy {
                    watts = Some(meter.watts_between(previous, &reading));
                }
                previous_energy = Some(reading);
            }

            points.push(ThermalPoint {
                seconds: start.elapsed().as_secs_f64(),
                celsius,
                freq_mhz,
                watts,
            });

            if start.elapsed() >= self.settings.duration {
                break;
            }
            if !self.stop.sleep(self.settings.sample_interval) {
                return Err(KnobError::Interrupted);
            }
        }
        Ok(points)
    }
}

/// Busy for `load` of every slice and asleep for the rest.
fn duty_cycle(load: f64, generator: &StopToken, stop: &StopToken) {
    let load = load.clamp(0.0, 1.0);
    let busy = DUTY_SLICE.mul_f64(load);
    let idle = DUTY_SLICE.saturating_sub(busy);

    while !generator.is_stopped() && !stop.is_stopped() {
        let slice = Instant::now();
        let mut value = 0.0f64;
        let mut i = 0u32;
        while slice.elapsed() < busy {
            let x = f64::from(i);
            value += x.sin() * x.cos() * (x + 1.0).sqrt();
            i = i.wrapping_add(1);
        }
        black_box(value);

        if !idle.is_zero() {
            std::thread::sleep(idle);
        }
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or("-".to_string(), |value| format!("{value:.precision$}"))
}

impl fmt::Display for ThermalBenchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<14} {:>4.0}% {:>8} {:>8} {:>7} {:>9} {:>6} {:>10} {:>9}",
            self.strategy,
            self.load * 100.0,
            optional(self.avg_celsius, 1),
            optional(self.max_celsius, 1),
            optional(self.celsius_stddev, 2),
            optional(self.avg_freq_mhz, 0),
            optional(self.avg_performance, 3),
            optional(self.energy_joules, 1),
            self.throttle_events
        )
    }
}
