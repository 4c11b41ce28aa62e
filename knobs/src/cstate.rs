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

//! CPU idle states through `cpuidle` sysfs: listing, enabling and
//! disabling states, the idle governor, residency monitoring and a benchmark
//! of wake-up latency and power per configuration.

mod bench;
mod control;
mod residency;

#[cfg(test)]
mod tests;

pub use bench::CStateBench;
pub use bench::CStateBenchRow;
pub use bench::CStateBenchSettings;
pub use bench::IntermittentPattern;
pub use bench::IntermittentResult;
pub use bench::BENCH_CONFIGS;
pub use bench::INTERMITTENT_PATTERNS;
pub use control::CState;
pub use control::CStateSnapshot;
pub use control::CStates;
pub use residency::monitor;
pub use residency::stats_table;
pub use residency::CoreResidency;
pub use residency::ResidencyReading;
pub use residency::ResidencyShare;

use crate::KResult;
use crate::KnobError;

pub fn check_support(cstates: &CStates) -> KResult<()> {
    if !cstates.is_available() {
        return Err(KnobError::not_supported(
            "C-state control",
            "cpuidle isn't exposed in sysfs",
        ));
    }
    Ok(())
}
