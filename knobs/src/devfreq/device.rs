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

use hwk_shared::SysPaths;
use hwk_sysfs::prefixed_entries;
use hwk_sysfs::read_list;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_string;
use hwk_sysfs::read_value;
use hwk_sysfs::write_value;

use crate::KResult;
use crate::KnobError;

pub(super) fn devfreq_root(paths: &SysPaths) -> PathBuf {
    paths.sys("class/devfreq")
}

/// One `/sys/class/devfreq` device. Frequencies are in Hz.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevfreqDevice {
    pub name: String,
    pub path: PathBuf,
}

/// Governor and limits a tool may change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevfreqState {
    pub governor: String,
    pub min_hz: u64,
    pub max_hz: u64,
}

/// Everything `devfreq list` shows for a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevfreqInfo {
    pub name: String,
    pub label: String,
    pub path: PathBuf,
    pub current_hz: Option<u64>,
    pub min_hz: u64,
    pub max_hz: u64,
    pub available_frequencies: Vec<u64>,
    pub governor: String,
    pub available_governors: Vec<String>,
    pub load_percent: Option<u32>,
}

/// Devices ordered by name, no devfreq class is an empty list.
pub fn discover_devices(paths: &SysPaths) -> KResult<Vec<DevfreqDevice>> {
    let root = devfreq_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Ok(Vec::new());
    }

    let devices = prefixed_entries(&root, "")?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some(DevfreqDevice { name, path })
        })
        .collect::<Vec<_>>();
    tracing::debug!("found {} devfreq devices", devices.len());
    Ok(devices)
}

impl DevfreqDevice {
    pub fn is_gpu(&self) -> bool {
        self.name.contains("gpu")
            || self.name.contains("nouveau")
            || hwk_sysfs::path_exists(self.path.join("device/drm"))
    }

    pub fn label(&self) -> String {
        if self.name.contains("amdgpu") {
            "AMD GPU".to_string()
        } else if self.name.contains("nouveau") {
            "NVIDIA GPU (nouveau)".to_string()
        } else if self.is_gpu() {
            format!("GPU {}", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn current_hz(&self) -> KResult<Option<u64>> {
        Ok(read_optional(self.path.join("cur_freq"))?)
    }

    pub fn min_hz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("min_freq"))?)
    }

    pub fn max_hz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("max_freq"))?)
    }

    /// Ascending, empty when the driver publishes no table.
    pub fn available_frequencies(&self) -> KResult<Vec<u64>> {
        let path = self.path.join("available_frequencies");
        if !hwk_sysfs::path_exists(&path) {
            return Ok(Vec::new());
        }

        let mut frequencies = read_list::<u64>(path)?;
        frequencies.sort_unstable();
        frequencies.dedup();
        Ok(frequencies)
    }

    pub fn governor(&self) -> KResult<String> {
        Ok(read_string(self.path.join("governor"))?)
    }

    pub fn available_governors(&self) -> KResult<Vec<String>> {
        match read_optional::<String>(self.path.join("available_governors"))? {
            Some(governors) => Ok(governors.split_whitespace().map(str::to_string).collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn set_governor(&self, governor: &str) -> KResult<()> {
        let available = self.available_governors()?;
        if !available.is_empty() && !available.iter().any(|known| known == governor) {
            return Err(KnobError::invalid_param(
                "devfreq governor",
                format!("'{governor}' is not one of {}", available.join(" ")),
            ));
        }

        write_value(self.path.join("governor"), governor)?;
        tracing::info!("{} governor set to {governor}", self.name);
        Ok(())
    }

    /// Busy percentage from `gpu_load`, which some drivers format as
    /// `<load>@<freq>Hz`.
    pub fn load_percent(&self) -> KResult<Option<u32>> {
        let Some(load) = read_optional::<String>(self.path.join("gpu_load"))? else {
            return Ok(None);
        };

        let digits = load
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>();
        Ok(digits.parse().ok())
    }

    /// Lowest and highest frequency the device can be limited to.
    pub fn hardware_range(&self) -> KResult<(u64, u64)> {
        let table = self.available_frequencies()?;
        match (table.first(), table.last()) {
            (Some(&min), Some(&max)) => Ok((min, max)),
            _ => Ok((self.min_hz()?, self.max_hz()?)),
        }
    }

    /// Clamps the request to the frequency table and writes both limits in
    /// an order that never leaves min above max.
    pub fn set_range(&self, min_hz: u64, max_hz: u64) -> KResult<()> {
        if min_hz > max_hz {
            return Err(KnobError::invalid_param(
                "devfreq range",
                format!("min {min_hz} Hz is above max {max_hz} Hz"),
            ));
        }

        let table = self.available_frequencies()?;
        let (min_hz, max_hz) = match (table.first(), table.last()) {
            (Some(&low), Some(&high)) => (min_hz.clamp(low, high), max_hz.clamp(low, high)),
            _ => (min_hz, max_hz),
        };

        let min_path = self.path.join("min_freq");
        let max_path = self.path.join("max_freq");
        if max_hz > self.max_hz()? {
            write_value(&max_path, max_hz)?;
            write_value(&min_path, min_hz)?;
        } else {
            write_value(&min_path, min_hz)?;
            write_value(&max_path, max_hz)?;
        }

        tracing::info!(
            "{} limited to {}-{} MHz",
            self.name,
            min_hz / 1_000_000,
            max_hz / 1_000_000
        );
        Ok(())
    }

    /// `performance` governor when offered, and both limits at the top.
    pub fn performance(&self) -> KResult<()> {
        if self.available_governors()?.iter().any(|governor| governor == "performance") {
            self.set_governor("performance")?;
        }
        let (_, max) = self.hardware_range()?;
        self.set_range(max, max)
    }

    /// `powersave` governor when offered, and the full range for scaling.
    pub fn powersave(&self) -> KResult<()> {
        if self.available_governors()?.iter().any(|governor| governor == "powersave") {
            self.set_governor("powersave")?;
        }
        let (min, max) = self.hardware_range()?;
        self.set_range(min, max)
    }

    pub fn state(&self) -> KResult<DevfreqState> {
        Ok(DevfreqState {
            governor: self.governor()?,
            min_hz: self.min_hz()?,
            max_hz: self.max_hz()?,
        })
    }

    pub fn restore(&self, state: &DevfreqState) -> KResult<()> {
        if self.governor()? != state.governor {
            write_value(self.path.join("governor"), &state.governor)?;
        }
        self.set_range(state.min_hz, state.max_hz)
    }

    pub fn info(&self) -> KResult<DevfreqInfo> {
        Ok(DevfreqInfo {
            name: self.name.clone(),
            label: self.label(),
            path: self.path.clone(),
            current_hz: self.current_hz()?,
            min_hz: self.min_hz()?,
            max_hz: self.max_hz()?,
            available_frequencies: self.available_frequencies()?,
            governor: self.governor()?,
            available_governors: self.available_governors()?,
            load_percent: self.load_percent()?,
        })
    }
}

fn mhz(hz: u64) -> u64 {
    hz / 1_000_000
}

impl fmt::Display for DevfreqInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.label, self.name)?;
        writeln!(f, "  path: {}", self.path.display())?;
        match self.current_hz {
            Some(current) => writeln!(f, "  current: {} MHz", mhz(current))?,
            None => writeln!(f, "  current: unknown")?,
        }
        writeln!(f, "  range: {}-{} MHz", mhz(self.min_hz), mhz(self.max_hz))?;
        if !self.available_frequencies.is_empty() {
            let frequencies = self
                .available_frequencies
                .iter()
                .map(|&hz| mhz(hz).to_string())
                .collect::<Vec<_>>();
            writeln!(f, "  available: {} MHz", frequencies.join(" "))?;
        }
        writeln!(f, "  governor: {}", self.governor)?;
        if !self.available_governors.is_empty() {
            writeln!(f, "  governors: {}", self.available_governors.join(" "))?;
        }
        if let Some(load) = self.load_percent {
            writeln!(f, "  load: {load}%")?;
        }
        Ok(())
    }
}
