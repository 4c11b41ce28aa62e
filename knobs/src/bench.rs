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

//! One benchmark harness shared by every tool. A tool applies its knob in the
//! configuring phase and then times a [`Workload`] for a number of passes or
//! for a fixed duration.

mod compute;
mod harness;
mod patterns;
mod stats;
mod workers;
mod workload;


pub use compute::*;
pub use harness::Budget;
pub use harness::Harness;
pub use harness::HarnessPhase;
pub use harness::HarnessSettings;
pub use harness::Measurement;
pub use patterns::*;
pub use stats::LatencyStats;
pub use workers::aggregate_rate;
pub use workers::WorkerPool;
pub use workers::WorkerReport;
pub use workers::MAX_WORKERS;
pub use workload::WorkUnit;
pub use workload::Workload;

pub(crate) const CACHE_LINE: usize = 64;
#[cfg(test)]
pub(crate) const MIB: usize = 1024 * 1024;
