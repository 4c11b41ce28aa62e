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
use std::str::FromStr;
use std::time::Duration;
use std::time::Instant;

use cpu_utils::CPUTopology;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_string;
use hwk_sysfs::write_value;

use crate::KResult;
use crate::KnobError;

/// Value of `/sys/devices/system/cpu/smt/control`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SmtControl {
    On,
    Off,
    ForceOff,
    NotSupported,
    NotImplemented,
}

impl SmtControl {
    pub fn as_str(self) -> &'static str {
        match self {
            SmtControl::On => "on",
            SmtControl::Off => "off",
            SmtControl::ForceOff => "forceoff",
            SmtControl::NotSupported => "notsupported",
            SmtControl::NotImplemented => "notimplemented",
        }
    }

    /// Only `on`, `off` and `forceoff` can be written back.
    pub fn is_settable(self) -> bool {
        matches!(self, SmtControl::On | SmtControl::Off | SmtControl::ForceOff)
    }
}

impl FromStr for SmtControl {
    type Err = KnobError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "on" => Ok(SmtControl::On),
            "off" => Ok(SmtControl::Off),
            "forceoff" => Ok(SmtControl::ForceOff),
            "notsupported" => Ok(SmtControl::NotSupported),
            "notimplemented" => Ok(SmtControl::NotImplemented),
            other => Err(KnobError::invalid_param(
                "smt control",
                format!("'{other}' is not one of on, off, forceoff, notsupported, notimplemented"),
            )),
        }
    }
}

impl fmt::Display for SmtControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// SMT switch and CPU hotplug through sysfs.
#[derive(Clone, Debug)]
pub struct Smt {
    paths: SysPaths,
}

impl Smt {
    pub fn new(paths: SysPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &SysPaths {
        &self.paths
    }

    fn control_path(&self) -> PathBuf {
        self.paths.cpu_root().join("smt/control")
    }

    fn online_path(&self, core_id: LogicalCoreId) -> PathBuf {
        self.paths.cpu_dir(core_id).join("online")
    }

    pub fn has_control(&self) -> bool {
        hwk_sysfs::path_exists(self.control_path())
    }

    /// A kernel without the control file reports `notsupported`.
    pub fn control(&self) -> KResult<SmtControl> {
        match read_optional::<String>(self.control_path())? {
            Some(value) => value.parse(),
            None => Ok(SmtControl::NotSupported),
        }
    }

    pub fn set_control(&self, control: SmtControl) -> KResult<()> {
        if !control.is_settable() {
            return Err(KnobError::invalid_param(
                "smt control",
                format!("'{control}' can't be written"),
            ));
        }

        write_value(self.control_path(), control)?;
        tracing::info!("SMT control set to {control}");
        Ok(())
    }

    /// Whether sibling threads are currently running.
    pub fn active(&self) -> KResult<bool> {
        let active = read_string(self.paths.cpu_root().join("smt/active"))?;
        Ok(active == "1")
    }

    /// CPUs without an `online` attribute, usually CPU 0, can't be offlined
    /// and are always online.
    pub fn is_online(&self, core_id: LogicalCoreId) -> KResult<bool> {
        let online = read_optional::<u8>(self.online_path(core_id))?;
        Ok(online.map_or(true, |online| online != 0))
    }

    /// Brings a CPU up or down and returns how long the kernel took.
    pub fn set_online(&self, core_id: LogicalCoreId, online: bool) -> KResult<Duration> {
        let start = Instant::now();
        write_value(self.online_path(core_id), u8::from(online))?;
        let latency = start.elapsed();

        tracing::debug!(
            "logical CPU {core_id} {} in {latency:?}",
            if online { "onlined" } else { "offlined" }
        );
        Ok(latency)
    }

    pub fn topology(&self) -> KResult<CPUTopology> {
        let topology = CPUTopology::from_sysfs(&self.paths)?;
        Ok(topology)
    }
}
