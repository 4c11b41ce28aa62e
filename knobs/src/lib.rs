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

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

//! Diagnostics and benchmarks for the hardware knobs of x86 servers.
//!
//! Every tool module exposes a controller over its kernel interface, a self-test
//! built on [`TestSuite`] and, where it makes sense, a benchmark built on the
//! shared [`bench::Harness`] or [`bench::WorkerPool`].

pub mod bench;
pub mod cpufreq;
pub mod cstate;
pub mod cxl;
pub mod devfreq;
mod errors;
pub mod prefetch;
pub mod rapl;
pub mod rdt;
mod report;
pub mod smt;
mod stop;
pub mod thermal;
pub mod uncore;

pub use errors::ErrorKind;
pub use errors::KnobError;
pub use report::TestOutcome;
pub use report::TestStatus;
pub use report::TestSuite;
pub use stop::StopToken;

pub type KResult<T> = Result<T, KnobError>;
