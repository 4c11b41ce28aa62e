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

use std::fs::File;
use std::path::PathBuf;

use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;

use super::utils;
use super::utils::MSRFileOpMode;
use crate::MSRAccess;
use crate::MSRError;
use crate::MSRResult;

/// MSR character devices of all logical CPUs.
///
/// Every [`MSRAccess`] call opens the device, does a single positioned access and
/// closes it again. Use [`MsrDevice::open`] to keep a handle for repeated access.
#[derive(Clone, Debug)]
pub struct MsrDevice {
    paths: SysPaths,
    cpu_count: usize,
}

/// An open `/dev/cpu/N/msr`, closed on drop.
#[derive(Debug)]
pub struct MsrHandle {
    file: File,
    core_id: LogicalCoreId,
}

impl MsrDevice {
    pub fn new(paths: SysPaths, cpu_count: usize) -> Self {
        Self { paths, cpu_count }
    }

    pub fn device_path(&self, core_id: LogicalCoreId) -> PathBuf {
        self.paths.msr_device(core_id)
    }

    pub fn open(&self, core_id: LogicalCoreId, mode: MSRFileOpMode) -> MSRResult<MsrHandle> {
        let path = self.device_path(core_id);
        let file = utils::open_msr(&path, mode).map_err(|error| match mode {
            MSRFileOpMode::MSRRead => MSRError::open_for_read(core_id, path.clone(), error),
            MSRFileOpMode::MSRWrite | MSRFileOpMode::MSRReadWrite => {
                MSRError::open_for_write(core_id, path.clone(), error)
            }
        })?;

        Ok(MsrHandle { file, core_id })
    }

    pub fn read_cpu(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64> {
        self.open(core_id, MSRFileOpMode::MSRRead)?.read(register_id)
    }

    pub fn write_cpu(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()> {
        self.open(core_id, MSRFileOpMode::MSRWrite)?
            .write(register_id, value)
    }
}

impl MsrHandle {
    pub fn core_id(&self) -> LogicalCoreId {
        self.core_id
    }

    pub fn read(&self, register_id: u32) -> MSRResult<u64> {
        utils::read_register(&self.file, register_id, self.core_id)
    }

    pub fn write(&self, register_id: u32, value: u64) -> MSRResult<()> {
        utils::write_register(&self.file, register_id, value, self.core_id)
    }
}

impl MSRAccess for MsrDevice {
    fn read(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64> {
        self.read_cpu(core_id, register_id)
    }

    fn write(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()> {
        self.write_cpu(core_id, register_id, value)
    }

    fn cpu_count(&self) -> usize {
        self.cpu_count
    }
}
