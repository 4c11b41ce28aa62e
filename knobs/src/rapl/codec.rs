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

use hwk_msr::registers::pkg_power_info;
use hwk_msr::registers::pkg_power_limit;
use hwk_msr::registers::rapl_power_unit;

use crate::KResult;
use crate::KnobError;

const MAX_TIME_Y: u64 = 31;
const MAX_TIME_Z: u64 = 3;

/// Units of the RAPL registers as reported by `MSR_RAPL_POWER_UNIT`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RaplUnits {
    pub power_watts: f64,
    pub energy_joules: f64,
    pub time_seconds: f64,
}

impl RaplUnits {
    pub fn decode(raw: u64) -> Self {
        Self {
            power_watts: inverse_power_of_two(rapl_power_unit::POWER_UNITS.get(raw)),
            energy_joules: inverse_power_of_two(rapl_power_unit::ENERGY_STATUS_UNITS.get(raw)),
            time_seconds: inverse_power_of_two(rapl_power_unit::TIME_UNITS.get(raw)),
        }
    }
}

fn inverse_power_of_two(exponent: u64) -> f64 {
    1.0 / (1u64 << exponent) as f64
}

/// Decoded PL1 half of `MSR_PKG_POWER_LIMIT`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerLimit {
    pub watts: f64,
    pub enabled: bool,
    pub clamped: bool,
    pub time_window: Duration,
    pub locked: bool,
}

impl PowerLimit {
    pub fn decode(raw: u64, units: &RaplUnits) -> Self {
        let window = decode_time_window(
            pkg_power_limit::PL1_TIME_Y.get(raw),
            pkg_power_limit::PL1_TIME_Z.get(raw),
            units.time_seconds,
        );

        Self {
            watts: pkg_power_limit::PL1_POWER.get(raw) as f64 * units.power_watts,
            enabled: pkg_power_limit::PL1_ENABLE.is_set(raw),
            clamped: pkg_power_limit::PL1_CLAMP.is_set(raw),
            time_window: Duration::from_secs_f64(window),
            locked: pkg_power_limit::LOCK.is_set(raw),
        }
    }

    /// Splices PL1 into `raw`, PL2 and the lock bit are kept as they are.
    pub fn encode(&self, raw: u64, units: &RaplUnits) -> KResult<u64> {
        if !self.watts.is_finite() || self.watts < 0.0 {
            return Err(KnobError::invalid_param(
                "power limit",
                format!("{} W is not a valid power", self.watts),
            ));
        }

        let power = (self.watts / units.power_watts).round() as u64;
        if power > pkg_power_limit::PL1_POWER.max_value() {
            return Err(KnobError::invalid_param(
                "power limit",
                format!("{} W doesn't fit into PL1", self.watts),
            ));
        }
        let (y, z) = encode_time_window(self.time_window.as_secs_f64(), units.time_seconds);

        let mut value = pkg_power_limit::PL1_POWER.set(raw, power);
        value = pkg_power_limit::PL1_ENABLE.set(value, self.enabled as u64);
        value = pkg_power_limit::PL1_CLAMP.set(value, self.clamped as u64);
        value = pkg_power_limit::PL1_TIME_Y.set(value, y);
        value = pkg_power_limit::PL1_TIME_Z.set(value, z);
        Ok(value)
    }
}

/// Window in seconds: `2^y * (1 + z/4) * unit`.
pub fn decode_time_window(y: u64, z: u64, time_unit: f64) -> f64 {
    (1u64 << y.min(MAX_TIME_Y)) as f64 * (1.0 + z as f64 / 4.0) * time_unit
}

/// Closest (y, z) pair for a window of `seconds`.
pub fn encode_time_window(seconds: f64, time_unit: f64) -> (u64, u64) {
    let mut best = (0, 0);
    let mut best_error = f64::INFINITY;

    for y in 0..=MAX_TIME_Y {
        for z in 0..=MAX_TIME_Z {
            let error = (decode_time_window(y, z, time_unit) - seconds).abs();
            if error < best_error {
                best = (y, z);
                best_error = error;
            }
        }
    }

    best
}

/// Difference of two 32-bit energy status readings, the counter wraps around.
pub fn energy_delta(previous: u32, current: u32) -> u64 {
    current.wrapping_sub(previous) as u64
}

/// Thermal design, minimum and maximum power from `MSR_PKG_POWER_INFO`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerInfo {
    pub thermal_spec_watts: f64,
    pub min_watts: f64,
    pub max_watts: f64,
}

impl PowerInfo {
    pub fn decode(raw: u64, units: &RaplUnits) -> Self {
        let watts = |field: hwk_msr::BitField| field.get(raw) as f64 * units.power_watts;
        Self {
            thermal_spec_watts: watts(pkg_power_info::THERMAL_SPEC_POWER),
            min_watts: watts(pkg_power_info::MINIMUM_POWER),
            max_watts: watts(pkg_power_info::MAXIMUM_POWER),
        }
    }
}

impl fmt::Display for RaplUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "power unit {:.6} W, energy unit {:.9} J, time unit {:.6} s",
            self.power_watts, self.energy_joules, self.time_seconds
        )
    }
}

impl fmt::Display for PowerLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PL1 {:.2} W over {:.3} s ({}{}{})",
            self.watts,
            self.time_window.as_secs_f64(),
            if self.enabled { "enabled" } else { "disabled" },
            if self.clamped { ", clamped" } else { "" },
            if self.locked { ", locked" } else { "" }
        )
    }
}
