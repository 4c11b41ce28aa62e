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

use once_cell::sync::OnceCell;

use hwk_shared::SysPaths;

use crate::CpuInfo;
use crate::ProbeResult;

/// Hardware features the tools gate on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    RdtAllocation,
    CacheAllocationL3,
    MemoryBandwidthAllocation,
    CacheMonitoring,
    MbmTotal,
    MbmLocal,
    Avx512,
    HyperThreading,
    Rapl,
}

impl Feature {
    /// Token this feature shows up as in the cpuinfo `flags` line.
    pub fn cpuinfo_flag(self) -> &'static str {
        match self {
            Feature::RdtAllocation => "rdt_a",
            Feature::CacheAllocationL3 => "cat_l3",
            Feature::MemoryBandwidthAllocation => "mba",
            Feature::CacheMonitoring => "cqm",
            Feature::MbmTotal => "cqm_mbm_total",
            Feature::MbmLocal => "cqm_mbm_local",
            Feature::Avx512 => "avx512f",
            Feature::HyperThreading => "ht",
            Feature::Rapl => "rapl",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpuinfo_flag())
    }
}

/// Memoizing probe, cpuinfo is parsed once per process.
#[derive(Debug)]
pub struct Probe {
    paths: SysPaths,
    cpuinfo: OnceCell<CpuInfo>,
}

impl Probe {
    pub fn new(paths: SysPaths) -> Self {
        Self {
            paths,
            cpuinfo: OnceCell::new(),
        }
    }

    pub fn paths(&self) -> &SysPaths {
        &self.paths
    }

    pub fn cpuinfo(&self) -> ProbeResult<&CpuInfo> {
        self.cpuinfo.get_or_try_init(|| CpuInfo::read(&self.paths))
    }

    pub fn vendor(&self) -> ProbeResult<&str> {
        self.cpuinfo().map(CpuInfo::vendor)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.cpuinfo()
            .map(|info| info.has_flag(name))
            .unwrap_or(false)
    }

    pub fn has(&self, feature: Feature) -> bool {
        let present = match feature {
            // intel_rapl exposes a powercap tree even when the flag is hidden
            Feature::Rapl => {
                self.has_flag(feature.cpuinfo_flag())
                    || crate::path_exists(self.paths.sys("class/powercap/intel-rapl"))
            }
            _ => self.has_flag(feature.cpuinfo_flag()),
        };

        tracing::debug!(target: "probe", "feature {feature}: {present}");
        present
    }

    pub fn msr_available(&self) -> bool {
        crate::msr_available(&self.paths)
    }

    pub fn resctrl_mounted(&self) -> bool {
        crate::resctrl_mounted(&self.paths)
    }
}
