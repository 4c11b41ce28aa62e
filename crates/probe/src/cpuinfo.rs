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

use std::collections::BTreeSet;
use std::path::Path;

use hwk_shared::SysPaths;

use crate::ProbeError;
use crate::ProbeResult;

/// The parts of `/proc/cpuinfo` the tools care about, taken from the first
/// processor block. Flags are identical across processors on supported systems.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuInfo {
    vendor: String,
    model_name: Option<String>,
    flags: BTreeSet<String>,
    logical_cpus: usize,
}

impl CpuInfo {
    pub fn read(paths: &SysPaths) -> ProbeResult<Self> {
        let path = paths.cpuinfo();
        let content = std::fs::read_to_string(&path)
            .map_err(|io_error| ProbeError::unavailable(path.clone(), io_error))?;

        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> ProbeResult<Self> {
        let mut vendor = None;
        let mut model_name = None;
        let mut flags = None;
        let mut logical_cpus = 0;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "processor" => logical_cpus += 1,
                "vendor_id" if vendor.is_none() => vendor = Some(value.to_string()),
                "model name" if model_name.is_none() => model_name = Some(value.to_string()),
                "flags" if flags.is_none() => {
                    flags = Some(value.split_whitespace().map(str::to_string).collect())
                }
                _ => {}
            }
        }

        let vendor = vendor.ok_or_else(|| ProbeError::field_missing(path.to_path_buf(), "vendor_id"))?;

        Ok(Self {
            vendor,
            model_name,
            flags: flags.unwrap_or_default(),
            logical_cpus,
        })
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    /// Number of `processor` entries.
    pub fn logical_cpus(&self) -> usize {
        self.logical_cpus
    }

    pub fn is_intel(&self) -> bool {
        self.vendor == "GenuineIntel"
    }
}
