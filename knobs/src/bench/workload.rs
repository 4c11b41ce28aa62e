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

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkUnit {
    Bytes,
    Operations,
    FloatOps,
}

/// A measurable unit of work. Every workload owns the memory it touches.
pub trait Workload: Send {
    fn name(&self) -> &str;

    fn unit(&self) -> WorkUnit;

    /// Amount of work that corresponds to a single dependent access,
    /// a latency is derived by dividing the elapsed time by `work / granule`.
    fn granule(&self) -> u64 {
        1
    }

    /// Called once, outside of the timed region.
    fn prepare(&mut self) {}

    /// Runs one pass and returns the work done, in [`Workload::unit`].
    fn pass(&mut self) -> u64;
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Bytes => write!(f, "MB/s"),
            WorkUnit::Operations => write!(f, "Mops/s"),
            WorkUnit::FloatOps => write!(f, "GFLOPS"),
        }
    }
}

impl WorkUnit {
    /// Scales a raw per-second rate into the unit shown in reports.
    pub fn scale(self, per_second: f64) -> f64 {
        match self {
            WorkUnit::Bytes => per_second / (1024.0 * 1024.0),
            WorkUnit::Operations => per_second / 1e6,
            WorkUnit::FloatOps => per_second / 1e9,
        }
    }
}
