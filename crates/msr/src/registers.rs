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

//! Register addresses and field layouts, as documented in the Intel SDM vol. 4.

use crate::BitField;

// Resource Director Technology
pub const IA32_QM_EVTSEL: u32 = 0xC8D;
pub const IA32_QM_CTR: u32 = 0xC8E;
pub const IA32_PQR_ASSOC: u32 = 0xC8F;
/// First of the per-CLOS L3 capacity bitmask registers, CLOS `n` lives at `+ n`.
pub const IA32_L3_MASK_0: u32 = 0xC90;
/// First of the per-CLOS memory bandwidth throttle registers.
pub const IA32_MBA_THRTL_0: u32 = 0xD50;

// Hardware prefetchers
pub const MSR_MISC_FEATURE_CONTROL: u32 = 0x1A4;

// RAPL
pub const MSR_RAPL_POWER_UNIT: u32 = 0x606;
pub const MSR_PKG_POWER_LIMIT: u32 = 0x610;
pub const MSR_PKG_ENERGY_STATUS: u32 = 0x611;
pub const MSR_PKG_POWER_INFO: u32 = 0x614;
pub const MSR_DRAM_ENERGY_STATUS: u32 = 0x619;
pub const MSR_PP0_ENERGY_STATUS: u32 = 0x639;
pub const MSR_PP1_ENERGY_STATUS: u32 = 0x641;

// Uncore
pub const MSR_UNCORE_RATIO_LIMIT: u32 = 0x620;
pub const MSR_UNCORE_PERF_STATUS: u32 = 0x621;

pub mod pqr_assoc {
    use super::BitField;

    pub const RMID: BitField = BitField::new(0, 10);
    pub const CLOS: BitField = BitField::new(32, 32);
}

pub mod qm_evtsel {
    use super::BitField;

    pub const RMID: BitField = BitField::new(0, 10);
    pub const EVENT_ID: BitField = BitField::new(32, 8);
}

pub mod qm_ctr {
    use super::BitField;

    pub const DATA: BitField = BitField::new(0, 62);
    pub const UNAVAILABLE: BitField = BitField::bit(62);
    pub const ERROR: BitField = BitField::bit(63);
}

pub mod l3_mask {
    use super::BitField;

    pub const CAPACITY_BITMASK: BitField = BitField::new(0, 32);
}

pub mod mba_thrtl {
    use super::BitField;

    pub const DELAY: BitField = BitField::new(0, 16);
}

pub mod misc_feature_control {
    use super::BitField;

    pub const L2_HW_PREFETCHER_DISABLE: BitField = BitField::bit(0);
    pub const L2_ADJACENT_PREFETCHER_DISABLE: BitField = BitField::bit(1);
    pub const DCU_HW_PREFETCHER_DISABLE: BitField = BitField::bit(2);
    pub const DCU_IP_PREFETCHER_DISABLE: BitField = BitField::bit(3);
    /// All four disable bits together.
    pub const PREFETCHERS: BitField = BitField::new(0, 4);
}

pub mod rapl_power_unit {
    use super::BitField;

    pub const POWER_UNITS: BitField = BitField::new(0, 4);
    pub const ENERGY_STATUS_UNITS: BitField = BitField::new(8, 5);
    pub const TIME_UNITS: BitField = BitField::new(16, 4);
}

pub mod pkg_power_limit {
    use super::BitField;

    pub const PL1_POWER: BitField = BitField::new(0, 15);
    pub const PL1_ENABLE: BitField = BitField::bit(15);
    pub const PL1_CLAMP: BitField = BitField::bit(16);
    /// Exponent `Y` of the time window `2^Y * (1 + Z / 4) * time_unit`.
    pub const PL1_TIME_Y: BitField = BitField::new(17, 5);
    /// Fraction `Z` of the time window.
    pub const PL1_TIME_Z: BitField = BitField::new(22, 2);
    pub const LOCK: BitField = BitField::bit(63);
}

pub mod pkg_power_info {
    use super::BitField;

    pub const THERMAL_SPEC_POWER: BitField = BitField::new(0, 15);
    pub const MINIMUM_POWER: BitField = BitField::new(16, 15);
    pub const MAXIMUM_POWER: BitField = BitField::new(32, 15);
}

pub mod energy_status {
    use super::BitField;

    /// Energy counters are 32 bits wide and wrap around.
    pub const TOTAL_ENERGY: BitField = BitField::new(0, 32);
}

pub mod uncore_ratio_limit {
    use super::BitField;

    pub const MAX_RATIO: BitField = BitField::new(0, 7);
    pub const MIN_RATIO: BitField = BitField::new(8, 7);
}

pub mod uncore_perf_status {
    use super::BitField;

    pub const CURRENT_RATIO: BitField = BitField::new(0, 7);
}
