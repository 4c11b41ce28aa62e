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

use hwk_probe::Feature;
use hwk_probe::Probe;
use hwk_shared::types::ClosId;

use crate::KResult;
use crate::KnobError;

/// RDT capabilities as reported by `/proc/cpuinfo`, with the number of
/// classes of service taken from CPUID leaf 0x10.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RdtFeatures {
    pub allocation: bool,
    pub cat_l3: bool,
    pub mba: bool,
    pub occupancy: bool,
    pub mbm_total: bool,
    pub mbm_local: bool,
    /// Highest CLOS with an L3 mask register, every CLOS when unknown.
    pub l3_highest_clos: Option<u16>,
    /// Highest CLOS with a throttle register, every CLOS when unknown.
    pub mba_highest_clos: Option<u16>,
}

impl RdtFeatures {
    pub fn detect(probe: &Probe) -> Self {
        let features = Self {
            allocation: probe.has(Feature::RdtAllocation),
            cat_l3: probe.has(Feature::CacheAllocationL3),
            mba: probe.has(Feature::MemoryBandwidthAllocation),
            occupancy: probe.has(Feature::CacheMonitoring),
            mbm_total: probe.has(Feature::MbmTotal),
            mbm_local: probe.has(Feature::MbmLocal),
            ..highest_clos()
        };
        tracing::debug!("detected RDT features: {features:?}");

        features
    }

    /// Every feature present, used for machines probed by other means.
    pub fn all() -> Self {
        Self {
            allocation: true,
            cat_l3: true,
            mba: true,
            occupancy: true,
            mbm_total: true,
            mbm_local: true,
            l3_highest_clos: None,
            mba_highest_clos: None,
        }
    }

    /// Classes of service that have an L3 mask register.
    pub fn l3_classes(&self) -> impl Iterator<Item = ClosId> {
        classes_up_to(self.l3_highest_clos)
    }

    /// Classes of service that have a throttle register, none without MBA.
    pub fn mba_classes(&self) -> impl Iterator<Item = ClosId> {
        let count = if self.mba { usize::MAX } else { 0 };
        classes_up_to(self.mba_highest_clos).take(count)
    }

    pub fn has_allocation(&self) -> bool {
        self.allocation || self.cat_l3
    }

    pub fn has_monitoring(&self) -> bool {
        self.occupancy || self.mbm_total || self.mbm_local
    }

    pub fn require_allocation(&self) -> KResult<()> {
        if !self.has_allocation() {
            return Err(KnobError::not_supported(
                "RDT allocation",
                "the CPU reports neither rdt_a nor cat_l3",
            ));
        }
        Ok(())
    }

    pub fn require_monitoring(&self) -> KResult<()> {
        if !self.has_monitoring() {
            return Err(KnobError::not_supported(
                "RDT monitoring",
                "the CPU reports none of cqm, cqm_mbm_total and cqm_mbm_local",
            ));
        }
        Ok(())
    }
}

fn classes_up_to(highest: Option<u16>) -> impl Iterator<Item = ClosId> {
    let count = highest.map_or(ClosId::MAX_CLOS as usize, |highest| highest as usize + 1);
    ClosId::all().take(count)
}

#[cfg(target_arch = "x86_64")]
fn highest_clos() -> RdtFeatures {
    let allocation = hwk_probe::cpuid::CpuidReport::collect().rdt_allocation;
    RdtFeatures {
        l3_highest_clos: allocation.as_ref().and_then(|info| info.l3_highest_clos),
        mba_highest_clos: allocation.as_ref().and_then(|info| info.mba_highest_clos),
        ..RdtFeatures::default()
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn highest_clos() -> RdtFeatures {
    RdtFeatures::default()
}
