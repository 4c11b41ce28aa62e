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

//! This module is an implementation that refuses every access, it allows the code
//! to compile on platforms without MSR devices.

use std::path::PathBuf;

use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;

use crate::MSRAccess;
use crate::MSRError;
use crate::MSRResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MSRFileOpMode {
    MSRRead,
    MSRWrite,
    MSRReadWrite,
}

#[derive(Clone, Debug)]
pub struct MsrDevice {
    paths: SysPaths,
    cpu_count: usize,
}

#[derive(Debug)]
pub struct MsrHandle {
    core_id: LogicalCoreId,
}

impl MsrDevice {
    pub fn new(paths: SysPaths, cpu_count: usize) -> Self {
        Self { paths, cpu_count }
    }

    pub fn device_path(&self, core_id: LogicalCoreId) -> PathBuf {
        self.paths.msr_device(core_id)
    }

    pub fn open(&self, _core_id: LogicalCoreId, _mode: MSRFileOpMode) -> MSRResult<MsrHandle> {
        Err(MSRError::Unsupported)
    }

    pub fn read_cpu(&self, _core_id: LogicalCoreId, _register_id: u32) -> MSRResult<u64> {
        Err(MSRError::Unsupported)
    }

    pub fn write_cpu(&self, _core_id: LogicalCoreId, _register_id: u32, _value: u64) -> MSRResult<()> {
        Err(MSRError::Unsupported)
    }
}

impl MsrHandle {
    pub fn core_id(&self) -> LogicalCoreId {
        self.core_id
    }

    pub fn read(&self, _register_id: u32) -> MSRResult<u64> {
        Err(MSRError::Unsupported)
    }

    pub fn write(&self, _register_id: u32, _value: u64) -> MSRResult<()> {
        Err(MSRError::Unsupported)
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
