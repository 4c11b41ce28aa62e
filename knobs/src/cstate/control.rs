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
use std::path::Path;
use std::path::PathBuf;

use cpu_utils::cpulist::online_cores;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;
use hwk_sysfs::numbered_entries;
use hwk_sysfs::read_list;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_string;
use hwk_sysfs::write_value;

use crate::KResult;
use crate::KnobError;

/// One `cpuN/cpuidle/stateK` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CState {
    pub index: u32,
    pub name: String,
    pub desc: String,
    /// Exit latency.
    pub latency_us: u64,
    /// Target residency.
    pub residency_us: u64,
    pub usage: u64,
    pub time_us: u64,
    pub disabled: bool,
}

impl CState {
    fn load(index: u32, path: &Path) -> KResult<Self> {
        let optional_u64 = |attribute: &str| -> KResult<u64> {
            Ok(read_optional(path.join(attribute))?.unwrap_or_default())
        };
        let optional_string = |attribute: &str| -> KResult<String> {
            Ok(read_optional(path.join(attribute))?.unwrap_or_default())
        };

        Ok(Self {
            index,
            name: optional_string("name")?,
            desc: optional_string("desc")?,
            latency_us: optional_u64("latency")?,
            residency_us: optional_u64("residency")?,
            usage: optional_u64("usage")?,
            time_us: optional_u64("time")?,
            disabled: optional_u64("disable")? != 0,
        })
    }

    /// Average time spent per entry.
    pub fn average_residency_us(&self) -> f64 {
        if self.usage == 0 {
            return 0.0;
        }
        self.time_us as f64 / self.usage as f64
    }

    pub fn header() -> String {
        format!(
            "{:<6} {:<12} {:<34} {:>12} {:>12} {:>8}",
            "State", "Name", "Description", "Latency(us)", "Target(us)", "Enabled"
        )
    }
}

impl fmt::Display for CState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = self.desc.chars().take(33).collect::<String>();
        write!(
            f,
            "{:<6} {:<12} {:<34} {:>12} {:>12} {:>8}",
            format!("C{}", self.index),
            self.name,
            desc,
            self.latency_us,
            self.residency_us,
            if self.disabled { "No" } else { "Yes" }
        )
    }
}

/// Disable flags of every state on every CPU, taken before a tool changes them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CStateSnapshot {
    entries: Vec<(LogicalCoreId, u32, bool)>,
}

impl CStateSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Idle states and the idle governor through `cpuidle` sysfs.
#[derive(Clone, Debug)]
pub struct CStates {
    paths: SysPaths,
}

impl CStates {
    pub fn new(paths: SysPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &SysPaths {
        &self.paths
    }

    fn cpuidle_dir(&self, core_id: LogicalCoreId) -> PathBuf {
        self.paths.cpu_dir(core_id).join("cpuidle")
    }

    fn governor_dir(&self) -> PathBuf {
        self.paths.cpu_root().join("cpuidle")
    }

    fn disable_path(&self, core_id: LogicalCoreId, index: u32) -> PathBuf {
        self.cpuidle_dir(core_id)
            .join(format!("state{index}"))
            .join("disable")
    }

    pub fn is_available(&self) -> bool {
        hwk_sysfs::path_exists(self.cpuidle_dir(LogicalCoreId::new(0)))
    }

    pub fn cpus(&self) -> KResult<Vec<LogicalCoreId>> {
        let cores = online_cores(&self.paths)?;
        Ok(cores)
    }

    pub fn states(&self, core_id: LogicalCoreId) -> KResult<Vec<CState>> {
        let dir = self.cpuidle_dir(core_id);
        if !hwk_sysfs::path_exists(&dir) {
            return Err(KnobError::not_supported(
                "C-state control",
                format!("CPU {core_id} has no cpuidle interface"),
            ));
        }

        numbered_entries(&dir, "state")?
            .into_iter()
            .map(|(index, path)| CState::load(index, &path))
            .collect()
    }

    /// Enables or disables one state on a single CPU, or on every online CPU
    /// when `core_id` is `None`.
    pub fn set_enabled(
        &self,
        index: u32,
        enable: bool,
        core_id: Option<LogicalCoreId>,
    ) -> KResult<()> {
        let cores = match core_id {
            Some(core_id) => vec![core_id],
            None => self.cpus()?,
        };

        for core_id in &cores {
            write_value(self.disable_path(*core_id, index), u8::from(!enable))?;
        }

        let target = match core_id {
            Some(core_id) => format!("CPU {core_id}"),
            None => "all CPUs".to_string(),
        };
        tracing::info!(
            "{} C{index} on {target}",
            if enable { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Leaves states up to `max_index` enabled and disables the deeper ones.
    pub fn set_max_cstate(&self, max_index: u32) -> KResult<()> {
        for core_id in self.cpus()? {
            for state in self.states(core_id)? {
                let path = self.disable_path(core_id, state.index);
                write_value(path, u8::from(state.index > max_index))?;
            }
        }

        tracing::info!("deepest C-state limited to C{max_index} on all CPUs");
        Ok(())
    }

    pub fn governor(&self) -> KResult<String> {
        Ok(read_string(self.governor_dir().join("current_governor"))?)
    }

    pub fn available_governors(&self) -> KResult<Vec<String>> {
        Ok(read_list(self.governor_dir().join("available_governors"))?)
    }

    /// Kernels without `available_governors` accept the write unchecked.
    pub fn set_governor(&self, governor: &str) -> KResult<()> {
        let available =
            read_optional::<String>(self.governor_dir().join("available_governors"))?;
        if let Some(available) = available {
            if !available.split_whitespace().any(|known| known == governor) {
                return Err(KnobError::invalid_param(
                    "idle governor",
                    format!("'{governor}' is not one of {available}"),
                ));
            }
        }

        write_value(self.governor_dir().join("current_governor"), governor)?;
        tracing::info!("idle governor set to {governor}");
        Ok(())
    }

    pub fn driver(&self) -> KResult<Option<String>> {
        Ok(read_optional(self.governor_dir().join("current_driver"))?)
    }

    pub fn snapshot(&self) -> KResult<CStateSnapshot> {
        let mut entries = Vec::new();
        for core_id in self.cpus()? {
            for state in self.states(core_id)? {
                entries.push((core_id, state.index, state.disabled));
            }
        }

        tracing::debug!("saved {} C-state disable flags", entries.len());
        Ok(CStateSnapshot { entries })
    }

    /// Writes every saved flag back and reports the first failure.
    pub fn restore(&self, snapshot: &CStateSnapshot) -> KResult<()> {
        let mut result = Ok(());
        for &(core_id, index, disabled) in &snapshot.entries {
            let written = write_value(self.disable_path(core_id, index), u8::from(disabled));
            if let Err(error) = written {
                tracing::warn!("failed to restore C{index} on CPU {core_id}: {error}");
                if result.is_ok() {
                    result = Err(error.into());
                }
            }
        }
        result
    }
}
