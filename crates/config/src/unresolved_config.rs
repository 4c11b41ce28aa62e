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

use std::path::PathBuf;
use std::time::Duration;

use eyre::eyre;
use serde::Deserialize;
use serde::Serialize;

use hwk_shared::types::ClosId;
use hwk_shared::SysPaths;

use super::defaults::*;
use crate::*;

const MAX_WORKER_THREADS: usize = 32;
const MIB: usize = 1024 * 1024;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedKnobsConfig {
    #[serde(default)]
    pub logs: UnresolvedLogs,
    #[serde(default)]
    pub paths: UnresolvedPaths,
    #[serde(default)]
    pub bench: UnresolvedBench,
    #[serde(default)]
    pub rdt_bench: UnresolvedRdtBench,
    #[serde(default)]
    pub smt_bench: UnresolvedSmtBench,
    #[serde(default)]
    pub thermal: UnresolvedThermal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedLogs {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedPaths {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
    #[serde(default = "default_procfs_root")]
    pub procfs_root: String,
    #[serde(default = "default_devfs_root")]
    pub devfs_root: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedBench {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_warmup")]
    pub warmup: bool,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_buffer_size_mb")]
    pub buffer_size_mb: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedRdtBench {
    #[serde(default = "default_rdt_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_rdt_pause_secs")]
    pub pause_secs: u64,
    #[serde(default = "default_rdt_buffer_size_mb")]
    pub buffer_size_mb: usize,
    #[serde(default = "default_rdt_clos")]
    pub clos: u32,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedSmtBench {
    #[serde(default = "default_smt_duration_ms")]
    pub duration_ms: u64,
    #[serde(default = "default_buffer_size_mb")]
    pub buffer_size_mb: usize,
    #[serde(default = "default_smt_max_threads")]
    pub max_threads: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedThermal {
    #[serde(default = "default_low_celsius")]
    pub low_celsius: f64,
    #[serde(default = "default_high_celsius")]
    pub high_celsius: f64,
    #[serde(default = "default_critical_celsius")]
    pub critical_celsius: f64,
    #[serde(default = "default_freq_min_khz")]
    pub freq_min_khz: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for UnresolvedLogs {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for UnresolvedPaths {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            procfs_root: default_procfs_root(),
            devfs_root: default_devfs_root(),
        }
    }
}

impl Default for UnresolvedBench {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            warmup: default_warmup(),
            iterations: default_iterations(),
            buffer_size_mb: default_buffer_size_mb(),
        }
    }
}

impl Default for UnresolvedRdtBench {
    fn default() -> Self {
        Self {
            duration_secs: default_rdt_duration_secs(),
            pause_secs: default_rdt_pause_secs(),
            buffer_size_mb: default_rdt_buffer_size_mb(),
            clos: default_rdt_clos(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl Default for UnresolvedSmtBench {
    fn default() -> Self {
        Self {
            duration_ms: default_smt_duration_ms(),
            buffer_size_mb: default_buffer_size_mb(),
            max_threads: default_smt_max_threads(),
        }
    }
}

impl Default for UnresolvedThermal {
    fn default() -> Self {
        Self {
            low_celsius: default_low_celsius(),
            high_celsius: default_high_celsius(),
            critical_celsius: default_critical_celsius(),
            freq_min_khz: default_freq_min_khz(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl UnresolvedKnobsConfig {
    pub fn resolve(self) -> eyre::Result<KnobsConfig> {
        let config = KnobsConfig {
            logs: self.logs.resolve(),
            paths: self.paths.resolve(),
            bench: self.bench.resolve()?,
            rdt_bench: self.rdt_bench.resolve()?,
            smt_bench: self.smt_bench.resolve()?,
            thermal: self.thermal.resolve()?,
        };
        Ok(config)
    }
}

impl UnresolvedLogs {
    pub fn resolve(self) -> Logs {
        Logs {
            log_level: self.log_level.to_tracing_filter(),
        }
    }
}

impl UnresolvedPaths {
    pub fn resolve(self) -> SysPaths {
        SysPaths::new(
            PathBuf::from(self.sysfs_root),
            PathBuf::from(self.procfs_root),
            PathBuf::from(self.devfs_root),
        )
    }
}

impl UnresolvedBench {
    pub fn resolve(self) -> eyre::Result<Bench> {
        if self.iterations == 0 {
            return Err(eyre!("bench.iterations must be positive"));
        }

        Ok(Bench {
            settle: Duration::from_millis(self.settle_ms),
            warmup: self.warmup,
            iterations: self.iterations,
            buffer_size: buffer_size(self.buffer_size_mb, "bench")?,
        })
    }
}

impl UnresolvedRdtBench {
    pub fn resolve(self) -> eyre::Result<RdtBench> {
        let clos = ClosId::new(self.clos).map_err(|e| eyre!("rdt-bench.clos: {e}"))?;
        if clos == ClosId::DEFAULT {
            return Err(eyre!("rdt-bench.clos must not be the default class 0"));
        }

        Ok(RdtBench {
            duration: Duration::from_secs(self.duration_secs),
            pause: Duration::from_secs(self.pause_secs),
            buffer_size: buffer_size(self.buffer_size_mb, "rdt-bench")?,
            clos,
            monitor_interval: Duration::from_millis(self.monitor_interval_ms.max(1)),
        })
    }
}

impl UnresolvedSmtBench {
    pub fn resolve(self) -> eyre::Result<SmtBench> {
        if self.max_threads == 0 || self.max_threads > MAX_WORKER_THREADS {
            return Err(eyre!(
                "smt-bench.max-threads must be in 1..={MAX_WORKER_THREADS}, got {}",
                self.max_threads
            ));
        }

        Ok(SmtBench {
            duration: Duration::from_millis(self.duration_ms),
            buffer_size: buffer_size(self.buffer_size_mb, "smt-bench")?,
            max_threads: self.max_threads,
        })
    }
}

impl UnresolvedThermal {
    pub fn resolve(self) -> eyre::Result<Thermal> {
        if !(self.low_celsius < self.high_celsius && self.high_celsius < self.critical_celsius) {
            return Err(eyre!(
                "thermal thresholds must satisfy low < high < critical, got {} / {} / {}",
                self.low_celsius,
                self.high_celsius,
                self.critical_celsius
            ));
        }

        Ok(Thermal {
            low_celsius: self.low_celsius,
            high_celsius: self.high_celsius,
            critical_celsius: self.critical_celsius,
            freq_min_khz: self.freq_min_khz,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        })
    }
}

impl LogLevel {
    pub fn to_tracing_filter(&self) -> tracing_subscriber::filter::LevelFilter {
        use tracing_subscriber::filter::LevelFilter;

        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn buffer_size(size_mb: usize, section: &str) -> eyre::Result<usize> {
    if size_mb == 0 {
        return Err(eyre!("{section}.buffer-size-mb must be positive"));
    }

    size_mb
        .checked_mul(MIB)
        .ok_or_else(|| eyre!("{section}.buffer-size-mb is too large: {size_mb}"))
}
