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

use crate::KResult;
use crate::KnobError;

/// How hard a temperature is throttled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ThrottleState {
    Normal,
    LowThrottle,
    HighThrottle,
    Critical,
}

/// Temperature thresholds and the frequency range a cap moves in.
///
/// Below `low` the cap is the maximum frequency. Between `low` and `high`
/// it falls linearly to half of the maximum, between `high` and `critical`
/// it continues down to the minimum, and above `critical` it stays there.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThermalPolicy {
    pub low_celsius: f64,
    pub high_celsius: f64,
    pub critical_celsius: f64,
    pub freq_min_khz: u64,
    pub freq_max_khz: u64,
}

impl ThermalPolicy {
    pub fn new(
        low_celsius: f64,
        high_celsius: f64,
        critical_celsius: f64,
        freq_min_khz: u64,
        freq_max_khz: u64,
    ) -> KResult<Self> {
        if !(low_celsius < high_celsius && high_celsius < critical_celsius) {
            return Err(KnobError::invalid_param(
                "thermal thresholds",
                format!(
                    "expected low < high < critical, got {low_celsius} / {high_celsius} / {critical_celsius}"
                ),
            ));
        }
        if freq_min_khz > freq_max_khz {
            return Err(KnobError::invalid_param(
                "thermal frequency range",
                format!("min {freq_min_khz} kHz is above max {freq_max_khz} kHz"),
            ));
        }

        Ok(Self {
            low_celsius,
            high_celsius,
            critical_celsius,
            freq_min_khz,
            freq_max_khz,
        })
    }

    /// Thresholds and the floor come from the config, the ceiling is the
    /// hardware maximum of the machine.
    pub fn from_config(config: &hwk_config::Thermal, freq_max_khz: u64) -> KResult<Self> {
        Self::new(
            config.low_celsius,
            config.high_celsius,
            config.critical_celsius,
            config.freq_min_khz.min(freq_max_khz),
            freq_max_khz,
        )
    }

    /// Same frequency range with other thresholds.
    pub fn with_thresholds(&self, low: f64, high: f64, critical: f64) -> KResult<Self> {
        Self::new(low, high, critical, self.freq_min_khz, self.freq_max_khz)
    }

    pub fn state_for(&self, celsius: f64) -> ThrottleState {
        if celsius >= self.critical_celsius {
            ThrottleState::Critical
        } else if celsius >= self.high_celsius {
            ThrottleState::HighThrottle
        } else if celsius >= self.low_celsius {
            ThrottleState::LowThrottle
        } else {
            ThrottleState::Normal
        }
    }

    pub fn cap_for(&self, celsius: f64) -> u64 {
        let max = self.freq_max_khz as f64;
        let min = self.freq_min_khz as f64;
        let half = max * 0.5;

        let cap = match self.state_for(celsius) {
            ThrottleState::Normal => max,
            ThrottleState::LowThrottle => {
                let ratio = (self.high_celsius - celsius) / (self.high_celsius - self.low_celsius);
                half + half * ratio
            }
            ThrottleState::HighThrottle => {
                let ratio =
                    (self.critical_celsius - celsius) / (self.critical_celsius - self.high_celsius);
                min + (half - min) * ratio
            }
            ThrottleState::Critical => min,
        };

        (cap.round() as u64).clamp(self.freq_min_khz, self.freq_max_khz)
    }
}

impl fmt::Display for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThrottleState::Normal => "normal",
            ThrottleState::LowThrottle => "low throttle",
            ThrottleState::HighThrottle => "high throttle",
            ThrottleState::Critical => "CRITICAL",
        };
        f.pad(name)
    }
}

impl fmt::Display for ThermalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "low {:.0}C, high {:.0}C, critical {:.0}C, {}-{} MHz",
            self.low_celsius,
            self.high_celsius,
            self.critical_celsius,
            self.freq_min_khz / 1000,
            self.freq_max_khz / 1000
        )
    }
}
