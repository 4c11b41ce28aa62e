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

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::types::LogicalCoreId;

/// Roots of the kernel pseudo filesystems every tool reads from.
///
/// All paths are derived from these three roots, so a whole tool can be pointed
/// at a fake tree by changing them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysPaths {
    pub sysfs_root: PathBuf,
    pub procfs_root: PathBuf,
    pub devfs_root: PathBuf,
}

impl SysPaths {
    pub fn new(
        sysfs_root: impl Into<PathBuf>,
        procfs_root: impl Into<PathBuf>,
        devfs_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            procfs_root: procfs_root.into(),
            devfs_root: devfs_root.into(),
        }
    }

    /// Lays out `sys`, `proc` and `dev` under a single directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("sys"), root.join("proc"), root.join("dev"))
    }

    pub fn sys(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.sysfs_root.join(relative)
    }

    pub fn proc(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.procfs_root.join(relative)
    }

    pub fn dev(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.devfs_root.join(relative)
    }

    pub fn cpuinfo(&self) -> PathBuf {
        self.proc("cpuinfo")
    }

    /// `/sys/devices/system/cpu`
    pub fn cpu_root(&self) -> PathBuf {
        self.sys("devices/system/cpu")
    }

    /// `/sys/devices/system/cpu/cpu<N>`
    pub fn cpu_dir(&self, core_id: LogicalCoreId) -> PathBuf {
        self.cpu_root().join(format!("cpu{core_id}"))
    }

    pub fn msr_device(&self, core_id: LogicalCoreId) -> PathBuf {
        self.dev(format!("cpu/{core_id}/msr"))
    }
}

impl Default for SysPaths {
    fn default() -> Self {
        Self::new("/sys", "/proc", "/dev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_point_to_kernel_mounts() {
        let paths = SysPaths::default();

        assert_eq!(paths.cpuinfo(), PathBuf::from("/proc/cpuinfo"));
        assert_eq!(
            paths.msr_device(LogicalCoreId::new(3)),
            PathBuf::from("/dev/cpu/3/msr")
        );
        assert_eq!(
            paths.cpu_dir(LogicalCoreId::new(12)),
            PathBuf::from("/sys/devices/system/cpu/cpu12")
        );
    }

    #[test]
    fn paths_under_root() {
        let paths = SysPaths::under("/tmp/fake");
        assert_eq!(
            paths.cpu_root(),
            PathBuf::from("/tmp/fake/sys/devices/system/cpu")
        );
    }
}
