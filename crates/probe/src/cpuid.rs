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

use raw_cpuid::CpuId;
use raw_cpuid::CpuIdReaderNative;

/// Default L3 occupancy scaling when CPUID leaf 0xF reports nothing.
pub const DEFAULT_CONVERSION_FACTOR: u64 = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuidReport {
    pub vendor: Option<String>,
    pub brand: Option<String>,
    pub family: u8,
    pub model: u8,
    pub stepping: u8,
    /// (name, supported) pairs in display order.
    pub features: Vec<(&'static str, bool)>,
    pub rdt_allocation: Option<RdtAllocation>,
    pub rdt_monitoring: Option<RdtMonitoring>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RdtAllocation {
    pub l3_cbm_length: Option<u8>,
    pub l3_highest_clos: Option<u16>,
    pub mba_max_throttle: Option<u16>,
    pub mba_highest_clos: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdtMonitoring {
    pub max_rmid: u32,
    pub conversion_factor: u64,
    pub occupancy: bool,
    pub total_bandwidth: bool,
    pub local_bandwidth: bool,
}

impl CpuidReport {
    pub fn collect() -> Self {
        let cpuid = CpuId::new();

        let mut report = Self {
            vendor: cpuid.get_vendor_info().map(|info| info.as_str().to_string()),
            brand: cpuid
                .get_processor_brand_string()
                .map(|brand| brand.as_str().trim().to_string()),
            ..Self::default()
        };

        if let Some(info) = cpuid.get_feature_info() {
            report.family = info.family_id();
            report.model = info.model_id();
            report.stepping = info.stepping_id();
            report.features.extend([
                ("SSE", info.has_sse()),
                ("SSE2", info.has_sse2()),
                ("SSE3", info.has_sse3()),
                ("SSSE3", info.has_ssse3()),
                ("SSE4.1", info.has_sse41()),
                ("SSE4.2", info.has_sse42()),
                ("POPCNT", info.has_popcnt()),
                ("AES", info.has_aesni()),
                ("AVX", info.has_avx()),
                ("FMA", info.has_fma()),
                ("F16C", info.has_f16c()),
                ("RDRAND", info.has_rdrand()),
                ("TSC", info.has_tsc()),
                ("MSR", info.has_msr()),
                ("HTT", info.has_htt()),
            ]);
        }

        if let Some(info) = cpuid.get_extended_feature_info() {
            report.features.extend([
                ("BMI1", info.has_bmi1()),
                ("BMI2", info.has_bmi2()),
                ("AVX2", info.has_avx2()),
                ("AVX512F", info.has_avx512f()),
                ("SHA", info.has_sha()),
                ("RDT-M", info.has_rdtm()),
                ("RDT-A", info.has_rdta()),
            ]);
        }

        report.rdt_allocation = rdt_allocation(&cpuid);
        report.rdt_monitoring = rdt_monitoring(&cpuid);
        report
    }

    pub fn has(&self, name: &str) -> bool {
        self.features
            .iter()
            .any(|(feature, supported)| *feature == name && *supported)
    }

    pub fn is_intel(&self) -> bool {
        self.vendor.as_deref() == Some("GenuineIntel")
    }
}

fn rdt_allocation(cpuid: &CpuId<CpuIdReaderNative>) -> Option<RdtAllocation> {
    let info = cpuid.get_rdt_allocation_info()?;
    let l3 = info.l3_cat();
    let mba = info.memory_bandwidth_allocation();

    Some(RdtAllocation {
        l3_cbm_length: l3.as_ref().map(|l3| l3.capacity_mask_length()),
        l3_highest_clos: l3.as_ref().map(|l3| l3.highest_cos()),
        mba_max_throttle: mba.as_ref().map(|mba| mba.max_hba_throttling()),
        mba_highest_clos: mba.as_ref().map(|mba| mba.highest_cos()),
    })
}

fn rdt_monitoring(cpuid: &CpuId<CpuIdReaderNative>) -> Option<RdtMonitoring> {
    let info = cpuid.get_rdt_monitoring_info()?;
    let l3 = info.l3_monitoring()?;

    let conversion_factor = match l3.conversion_factor() {
        0 => DEFAULT_CONVERSION_FACTOR,
        factor => factor as u64,
    };

    Some(RdtMonitoring {
        max_rmid: l3.maximum_rmid_range(),
        conversion_factor,
        occupancy: l3.has_occupancy_monitoring(),
        total_bandwidth: l3.has_total_bandwidth_monitoring(),
        local_bandwidth: l3.has_local_bandwidth_monitoring(),
    })
}

/// Occupancy conversion factor of this CPU, or the default when CPUID lacks leaf 0xF.
pub fn conversion_factor() -> u64 {
    rdt_monitoring(&CpuId::new())
        .map(|monitoring| monitoring.conversion_factor)
        .unwrap_or(DEFAULT_CONVERSION_FACTOR)
}
