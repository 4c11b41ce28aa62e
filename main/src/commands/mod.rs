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

mod cpufreq;
mod cpuid;
mod cstate;
mod cxl;
mod devfreq;
mod msr;
mod prefetch;
mod rapl;
mod rdt;
mod smt;
mod thermal;
mod uncore;

use std::time::Duration;

use crate::cli::Sampling;
use crate::cli::Tool;
use crate::context::Context;

/// Runs one tool action and returns the process exit code.
pub fn run(tool: Tool, context: &Context) -> eyre::Result<i32> {
    match tool {
        Tool::Cpuid => cpuid::run(context),
        Tool::Msr(command) => msr::run(command, context),
        Tool::Rdt(command) => rdt::run(command, context),
        Tool::Prefetch(command) => prefetch::run(command, context),
        Tool::Smt(command) => smt::run(command, context),
        Tool::Rapl(command) => rapl::run(command, context),
        Tool::Uncore(command) => uncore::run(command, context),
        Tool::Cstate(command) => cstate::run(command, context),
        Tool::Cpufreq(command) => cpufreq::run(command, context),
        Tool::Devfreq(command) => devfreq::run(command, context),
        Tool::Thermal(command) => thermal::run(command, context),
        Tool::Cxl(command) => cxl::run(command, context),
    }
}

impl Sampling {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

fn mhz(khz: Option<u64>) -> String {
    khz.map_or("n/a".to_string(), |khz| (khz / 1000).to_string())
}
