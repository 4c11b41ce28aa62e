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

//! Resource Director Technology: cache allocation and memory bandwidth
//! throttling per class of service, and the monitoring counters behind them.

mod bench;
mod controller;
mod diag;
mod features;
mod monitor;
mod selftest;

#[cfg(test)]
mod tests;

use hwk_shared::types::ClosId;
use hwk_shared::types::ClosIdType;
use hwk_shared::types::Rmid;
use hwk_shared::types::RmidType;

pub use bench::RdtBench;
pub use bench::RdtBenchConfig;
pub use bench::RdtBenchResult;
pub use bench::RdtWorkload;
pub use bench::BENCH_CONFIGS;
pub use controller::Rdt;
pub use controller::RdtSnapshot;
pub use controller::MAX_THROTTLE;
pub use diag::diagnose;
pub use diag::DiagCheck;
pub use diag::RdtDiagnosis;
pub use features::RdtFeatures;
pub use monitor::conversion_factor;
pub use monitor::mbm_delta;
pub use monitor::MonitorEvent;
pub use monitor::MonitorReading;
pub use monitor::MonitorSample;
pub use monitor::RdtMonitor;
pub use monitor::MBM_COUNTER_WIDTH;
pub use selftest::self_test;

use crate::KResult;
use crate::KnobError;

pub fn clos_id(value: ClosIdType) -> KResult<ClosId> {
    ClosId::new(value).map_err(|error| KnobError::invalid_param("CLOS id", error.to_string()))
}

pub fn rmid(value: RmidType) -> KResult<Rmid> {
    Rmid::new(value).map_err(|error| KnobError::invalid_param("RMID", error.to_string()))
}
