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

//! Thermal zones, cooling devices and temperature driven CPU frequency
//! capping.

mod bench;
mod policy;
mod zone;

#[cfg(test)]
mod tests;

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use hwk_shared::SysPaths;

pub use bench::analyze;
pub use bench::ThermalBench;
pub use bench::ThermalBenchResult;
pub use bench::ThermalBenchSettings;
pub use bench::ThermalPoint;
pub use bench::ThermalStrategy;
pub use bench::LOAD_LEVELS;
pub use bench::STRATEGIES;
pub use policy::ThermalPolicy;
pub use policy::ThrottleState;
pub use zone::cpu_celsius;
pub use zone::discover_cooling_devices;
pub use zone::discover_zones;
pub use zone::CoolingDevice;
pub use zone::ThermalZone;
pub use zone::TripPoint;
pub use zone::ZoneStatus;

use crate::cpufreq::CpuFreq;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

pub fn check_support(paths: &SysPaths) -> KResult<()> {
    if discover_zones(paths)?.is_empty() {
        return Err(KnobError::not_supported(
            "thermal capping",
            "no thermal zones in sysfs",
        ));
    }
    Ok(())
}

/// Highest frequency any policy can reach, the ceiling of a cap.
pub fn hardware_max_khz(cpufreq: &CpuFreq) -> KResult<u64> {
    let mut max = 0;
    for policy in cpufreq.policies() {
        let limits = policy.limits()?;
        max = max.max(limits.hw_max_khz.unwrap_or(limits.max_khz));
    }
    Ok(max)
}

/// One iteration of the capping loop.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CapSample {
    pub elapsed: Duration,
    pub celsius: Option<f64>,
    pub state: Option<ThrottleState>,
    pub cap_khz: u64,
}

/// Reads the CPU temperature, applies the policy cap to every cpufreq
/// policy and returns what was done. An unreadable temperature leaves the
/// cap at the maximum.
pub fn apply_policy(
    zones: &[ThermalZone],
    cpufreq: &CpuFreq,
    policy: &ThermalPolicy,
) -> KResult<(Option<f64>, Option<ThrottleState>, u64)> {
    let celsius = cpu_celsius(zones);
    let (state, cap_khz) = match celsius {
        Some(celsius) => (Some(policy.state_for(celsius)), policy.cap_for(celsius)),
        None => (None, policy.freq_max_khz),
    };

    cpufreq.cap_max_khz(cap_khz)?;
    Ok((celsius, state, cap_khz))
}

/// Applies the policy every `interval` until `duration` passes, or forever
/// without one, or until a stop is requested. The maximum frequency is put
/// back on the way out.
pub fn auto_cap(
    zones: &[ThermalZone],
    cpufreq: &CpuFreq,
    policy: &ThermalPolicy,
    interval: Duration,
    duration: Option<Duration>,
    stop: &StopToken,
    mut on_sample: impl FnMut(&CapSample),
) -> KResult<usize> {
    tracing::info!("thermal capping with policy: {policy}");
    let start = Instant::now();
    let mut samples = 0;

    let result = loop {
        match apply_policy(zones, cpufreq, policy) {
            Ok((celsius, state, cap_khz)) => {
                on_sample(&CapSample {
                    elapsed: start.elapsed(),
                    celsius,
                    state,
                    cap_khz,
                });
                samples += 1;
            }
            Err(error) => break Err(error),
        }

        if duration.map_or(false, |duration| start.elapsed() >= duration) {
            break Ok(samples);
        }
        if !stop.sleep(interval) {
            tracing::info!("thermal capping stopped after {samples} samples");
            break Ok(samples);
        }
    };

    if let Err(error) = cpufreq.cap_max_khz(policy.freq_max_khz) {
        tracing::warn!("failed to lift the frequency cap: {error}");
    }
    result
}

impl fmt::Display for CapSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let celsius = self
            .celsius
            .map_or("n/a".to_string(), |celsius| format!("{celsius:.1}"));
        let state = self
            .state
            .map_or("unknown".to_string(), |state| state.to_string());
        write!(
            f,
            "{:8.1} {celsius:>8} C {:>8} MHz  {state}",
            self.elapsed.as_secs_f64(),
            self.cap_khz / 1000
        )
    }
}
