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

mod cpuinfo;
#[cfg(target_arch = "x86_64")]
pub mod cpuid;
mod errors;
mod probe;


use std::path::Path;

use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;

pub use cpuinfo::CpuInfo;
pub use errors::ProbeError;
pub use probe::Feature;
pub use probe::Probe;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Reads the `vendor_id` of the first processor from cpuinfo.
pub fn vendor(paths: &SysPaths) -> ProbeResult<String> {
    CpuInfo::read(paths).map(|info| info.vendor().to_string())
}

/// Whether the cpuinfo `flags` line carries `name` as a whole token.
pub fn has_flag(paths: &SysPaths, name: &str) -> bool {
    match CpuInfo::read(paths) {
        Ok(info) => info.has_flag(name),
        Err(error) => {
            tracing::debug!("flag {name} treated as absent: {error}");
            false
        }
    }
}

pub fn path_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Whether the msr driver exposes a device for the first CPU.
pub fn msr_available(paths: &SysPaths) -> bool {
    path_exists(paths.msr_device(LogicalCoreId::new(0)))
}

pub fn resctrl_mounted(paths: &SysPaths) -> bool {
    path_exists(paths.sys("fs/resctrl/info"))
}

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
