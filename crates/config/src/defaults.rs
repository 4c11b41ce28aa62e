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

use crate::unresolved_config::LogLevel;

pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Info
}

pub(crate) fn default_sysfs_root() -> String {
    "/sys".to_string()
}

pub(crate) fn default_procfs_root() -> String {
    "/proc".to_string()
}

pub(crate) fn default_devfs_root() -> String {
    "/dev".to_string()
}

pub(crate) fn default_settle_ms() -> u64 {
    100
}

pub(crate) fn default_warmup() -> bool {
    false
}

pub(crate) fn default_iterations() -> usize {
    5
}

pub(crate) fn default_buffer_size_mb() -> usize {
    64
}

pub(crate) fn default_rdt_duration_secs() -> u64 {
    30
}

pub(crate) fn default_rdt_pause_secs() -> u64 {
    2
}

pub(crate) fn default_rdt_buffer_size_mb() -> usize {
    32
}

pub(crate) fn default_rdt_clos() -> u32 {
    1
}

pub(crate) fn default_monitor_interval_ms() -> u64 {
    100
}

pub(crate) fn default_smt_duration_ms() -> u64 {
    2000
}

pub(crate) fn default_smt_max_threads() -> usize {
    8
}

pub(crate) fn default_low_celsius() -> f64 {
    70.0
}

pub(crate) fn default_high_celsius() -> f64 {
    85.0
}

pub(crate) fn default_critical_celsius() -> f64 {
    95.0
}

pub(crate) fn default_freq_min_khz() -> u64 {
    800_000
}

pub(crate) fn default_poll_interval_ms() -> u64 {
    1000
}
