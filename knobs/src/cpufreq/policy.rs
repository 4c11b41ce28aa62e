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
use std::path::PathBuf;
use std::time::Duration;

use cpu_utils::cpulist::parse_cpu_list;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;
use hwk_sysfs::numbered_entries;
use hwk_sysfs::read_list;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_string;
use hwk_sysfs::read_value;
use hwk_sysfs::write_value;

use crate::KResult;
use crate::KnobError;

/// `time_in_state` counts in units of 10 ms.
const TIME_IN_STATE_UNIT: Duration = Duration::from_millis(10);

pub(super) fn cpufreq_root(paths: &SysPaths) -> PathBuf {
    paths.cpu_root().join("cpufreq")
}

/// One `cpufreq/policyN` directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuFreqPolicy {
    pub id: u32,
    pub path: PathBuf,
}

/// Scaling limits of a policy, all in kHz.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FreqLimits {
    pub min_khz: u64,
    pub max_khz: u64,
    pub current_khz: Option<u64>,
    pub hw_min_khz: Option<u64>,
    pub hw_max_khz: Option<u64>,
}

/// What a tool may change on a policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyState {
    pub governor: String,
    pub min_khz: u64,
    pub max_khz: u64,
}

/// Policies ordered by id, a kernel without cpufreq has none.
pub fn discover_policies(paths: &SysPaths) -> KResult<Vec<CpuFreqPolicy>> {
    let root = cpufreq_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Ok(Vec::new());
    }

    let policies = numbered_entries(&root, "policy")?
        .into_iter()
        .map(|(id, path)| CpuFreqPolicy { id, path })
        .collect::<Vec<_>>();
    tracing::debug!("found {} cpufreq policies", policies.len());
    Ok(policies)
}

impl CpuFreqPolicy {
    pub fn name(&self) -> String {
        format!("policy{}", self.id)
    }

    pub fn related_cpus(&self) -> KResult<Vec<LogicalCoreId>> {
        let list = read_string(self.path.join("related_cpus"))?;
        let cores = parse_cpu_list(&list.replace(' ', ","))?;
        Ok(cores)
    }

    pub fn driver(&self) -> KResult<Option<String>> {
        Ok(read_optional(self.path.join("scaling_driver"))?)
    }

    pub fn governor(&self) -> KResult<String> {
        Ok(read_string(self.path.join("scaling_governor"))?)
    }

    pub fn available_governors(&self) -> KResult<Vec<String>> {
        Ok(read_list(self.path.join("scaling_available_governors"))?)
    }

    pub fn set_governor(&self, governor: &str) -> KResult<()> {
        let available = self.available_governors()?;
        if !available.iter().any(|known| known == governor) {
            return Err(KnobError::invalid_param(
                "cpufreq governor",
                format!(
                    "'{governor}' is not one of {} on {}",
                    available.join(" "),
                    self.name()
                ),
            ));
        }

        write_value(self.path.join("scaling_governor"), governor)?;
        tracing::info!("{} governor set to {governor}", self.name());
        Ok(())
    }

    /// Ascending. Drivers like `intel_pstate` don't publish a table and
    /// return an empty list.
    pub fn available_frequencies(&self) -> KResult<Vec<u64>> {
        let path = self.path.join("scaling_available_frequencies");
        if !hwk_sysfs::path_exists(&path) {
            return Ok(Vec::new());
        }

        let mut frequencies = read_list::<u64>(path)?;
        frequencies.sort_unstable();
        frequencies.dedup();
        Ok(frequencies)
    }

    pub fn min_khz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("scaling_min_freq"))?)
    }

    pub fn max_khz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("scaling_max_freq"))?)
    }

    pub fn current_khz(&self) -> KResult<Option<u64>> {
        Ok(read_optional(self.path.join("scaling_cur_freq"))?)
    }

    pub fn limits(&self) -> KResult<FreqLimits> {
        Ok(FreqLimits {
            min_khz: self.min_khz()?,
            max_khz: self.max_khz()?,
            current_khz: self.current_khz()?,
            hw_min_khz: read_optional(self.path.join("cpuinfo_min_freq"))?,
            hw_max_khz: read_optional(self.path.join("cpuinfo_max_freq"))?,
        })
    }

    pub fn set_max_khz(&self, khz: u64) -> KResult<()> {
        write_value(self.path.join("scaling_max_freq"), khz)?;
        Ok(())
    }

    /// Raises max before min and otherwise lowers min first, so the kernel
    /// never sees min above max.
    pub fn set_limits(&self, min_khz: u64, max_khz: u64) -> KResult<()> {
        if min_khz > max_khz {
            return Err(KnobError::invalid_param(
                "cpufreq limits",
                format!("min {min_khz} kHz is above max {max_khz} kHz"),
            ));
        }

        let min_path = self.path.join("scaling_min_freq");
        let max_path = self.path.join("scaling_max_freq");
        if max_khz > self.max_khz()? {
            write_value(&max_path, max_khz)?;
            write_value(&min_path, min_khz)?;
        } else {
            write_value(&min_path, min_khz)?;
            write_value(&max_path, max_khz)?;
        }

        tracing::info!("{} limited to {min_khz}..{max_khz} kHz", self.name());
        Ok(())
    }

    /// Switches to the `userspace` governor and requests a fixed frequency.
    pub fn set_speed(&self, khz: u64) -> KResult<()> {
        if self.governor()? != "userspace" {
            self.set_governor("userspace")?;
        }
        write_value(self.path.join("scaling_setspeed"), khz)?;
        tracing::info!("{} running at {khz} kHz", self.name());
        Ok(())
    }

    pub fn supports_userspace(&self) -> KResult<bool> {
        let governors = read_optional::<String>(self.path.join("scaling_available_governors"))?;
        Ok(governors.map_or(false, |governors| {
            governors.split_whitespace().any(|governor| governor == "userspace")
        }))
    }

    /// Time spent at each frequency since boot, empty without cpufreq stats.
    pub fn time_in_state(&self) -> KResult<Vec<(u64, Duration)>> {
        let path = self.path.join("stats/time_in_state");
        let Some(content) = read_optional::<String>(&path)? else {
            return Ok(Vec::new());
        };

        let mut residency = Vec::new();
        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let parsed = fields
                .next()
                .zip(fields.next())
                .and_then(|(khz, ticks)| Some((khz.parse::<u64>().ok()?, ticks.parse::<u32>().ok()?)));
            match parsed {
                Some((khz, ticks)) => residency.push((khz, TIME_IN_STATE_UNIT * ticks)),
                None => tracing::debug!("skipping time_in_state line '{line}'"),
            }
        }
        Ok(residency)
    }

    pub fn state(&self) -> KResult<PolicyState> {
        Ok(PolicyState {
            governor: self.governor()?,
            min_khz: self.min_khz()?,
            max_khz: self.max_khz()?,
        })
    }

    pub fn restore(&self, state: &PolicyState) -> KResult<()> {
        if self.governor()? != state.governor {
            write_value(self.path.join("scaling_governor"), &state.governor)?;
        }
        self.set_limits(state.min_khz, state.max_khz)
    }
}

impl fmt::Display for FreqLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} MHz", self.min_khz / 1000, self.max_khz / 1000)?;
        if let (Some(min), Some(max)) = (self.hw_min_khz, self.hw_max_khz) {
            write!(f, " (hardware {}-{} MHz)", min / 1000, max / 1000)?;
        }
        match self.current_khz {
            Some(current) => write!(f, ", current {} MHz", current / 1000),
            None => write!(f, ", current unknown"),
        }
    }
}
