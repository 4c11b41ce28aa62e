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

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

use hwk_shared::SysPaths;

/// A temporary directory laid out as `sys`, `proc` and `dev`.
///
/// Builder methods panic on I/O errors, it's meant for tests only.
#[derive(Debug)]
pub struct FakeSysfs {
    root: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temporary fake sysfs root");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn paths(&self) -> SysPaths {
        SysPaths::under(self.root.path())
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Writes `content` to `sys/<relative>`, creating parent directories.
    pub fn sys(&self, relative: impl AsRef<Path>, content: impl AsRef<str>) -> &Self {
        self.file(Path::new("sys").join(relative), content)
    }

    pub fn proc(&self, relative: impl AsRef<Path>, content: impl AsRef<str>) -> &Self {
        self.file(Path::new("proc").join(relative), content)
    }

    pub fn sys_dir(&self, relative: impl AsRef<Path>) -> &Self {
        let path = self.path(Path::new("sys").join(relative));
        fs::create_dir_all(&path).expect("create fake sysfs dir");
        self
    }

    pub fn file(&self, relative: impl AsRef<Path>, content: impl AsRef<str>) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fake sysfs parent dir");
        }
        fs::write(&path, content.as_ref()).expect("write fake sysfs file");
        self
    }

    /// Current content of `sys/<relative>`, trimmed.
    pub fn read_sys(&self, relative: impl AsRef<Path>) -> String {
        let path = self.path(Path::new("sys").join(relative));
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read fake sysfs file {path:?}: {e}"))
            .trim()
            .to_string()
    }

    /// Online list plus one `cpu<N>` directory per CPU.
    pub fn cpus(&self, count: usize) -> &Self {
        let online = match count {
            0 => String::new(),
            1 => "0".to_string(),
            n => format!("0-{}", n - 1),
        };
        self.sys("devices/system/cpu/online", format!("{online}\n"));
        for cpu in 0..count {
            self.sys_dir(format!("devices/system/cpu/cpu{cpu}"));
        }
        self
    }

    /// Zero-filled `dev/cpu/<N>/msr` files large enough for any architectural register.
    pub fn msr_devices(&self, count: usize) -> &Self {
        for cpu in 0..count {
            let path = self.path(format!("dev/cpu/{cpu}/msr"));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create fake msr dir");
            }
            let file = fs::File::create(&path).expect("create fake msr device");
            file.set_len(0x1000).expect("size fake msr device");
        }
        self
    }
}

impl Default for FakeSysfs {
    fn default() -> Self {
        Self::new()
    }
}
