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

use std::time::Duration;

use hwk_shared::types::ClosId;
use hwk_shared::SysPaths;

#[derive(Clone, Debug, PartialEq)]
pub struct KnobsConfig {
    pub logs: Logs,
    pub paths: SysPaths,
    pub bench: Bench,
    pub rdt_bench: RdtBench,
    pub smt_bench: SmtBench,
    pub thermal: Thermal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Logs {
    pub log_level: tracing_subscriber::filter::LevelFilter,
}

/// Settings shared by every single-threaded benchmark.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bench {
    pub settle: Duration,
    /// Run one untimed pass before measuring.
    pub warmup: bool,
    pub iterations: usize,
    /// Bytes.
    pub buffer_size: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RdtBench {
    pub duration: Duration,
    pub pause: Duration,
    /// Bytes per worker thread.
    pub buffer_size: usize,
    pub clos: ClosId,
    pub monitor_interval: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SmtBench {
    pub duration: Duration,
    /// Bytes per worker thread.
    pub buffer_size: usize,
    pub max_threads: usize,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Thermal {
    pub low_celsius: f64,
    pub high_celsius: f64,
    pub critical_celsius: f64,
    pub freq_min_khz: u64,
    pub poll_interval: Duration,
}
