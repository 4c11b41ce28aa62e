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

use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use parking_lot::Mutex;

use hwk_msr::MSRAccess;
use hwk_msr::MSRError;
use hwk_msr::MSRResult;
use hwk_shared::types::LogicalCoreId;

type RegisterKey = (LogicalCoreId, u32);

/// In-memory register file. Registers that were never written read as zero.
#[derive(Debug, Default)]
pub struct MockMSR {
    cpu_count: usize,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    registers: HashMap<RegisterKey, u64>,
    denied_cores: HashSet<LogicalCoreId>,
    failing_reads: HashSet<RegisterKey>,
    failing_writes: HashSet<RegisterKey>,
    reads: usize,
    writes: Vec<(LogicalCoreId, u32, u64)>,
}

impl MockMSR {
    pub fn new(cpu_count: usize) -> Self {
        Self {
            cpu_count,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_register(self, core_id: u32, register_id: u32, value: u64) -> Self {
        self.set(LogicalCoreId::new(core_id), register_id, value);
        self
    }

    /// Presets `register_id` to `value` on every CPU.
    pub fn with_register_on_all(self, register_id: u32, value: u64) -> Self {
        for core_id in LogicalCoreId::range(self.cpu_count) {
            self.set(core_id, register_id, value);
        }
        self
    }

    pub fn set(&self, core_id: LogicalCoreId, register_id: u32, value: u64) {
        self.state
            .lock()
            .registers
            .insert((core_id, register_id), value);
    }

    pub fn get(&self, core_id: LogicalCoreId, register_id: u32) -> u64 {
        self.state
            .lock()
            .registers
            .get(&(core_id, register_id))
            .copied()
            .unwrap_or(0)
    }

    /// Every access to `core_id` fails as if the device refused to open.
    pub fn deny_core(&self, core_id: LogicalCoreId) {
        self.state.lock().denied_cores.insert(core_id);
    }

    pub fn fail_read(&self, core_id: LogicalCoreId, register_id: u32) {
        self.state
            .lock()
            .failing_reads
            .insert((core_id, register_id));
    }

    pub fn fail_write(&self, core_id: LogicalCoreId, register_id: u32) {
        self.state
            .lock()
            .failing_writes
            .insert((core_id, register_id));
    }

    pub fn fail_write_on_all(&self, register_id: u32) {
        for core_id in LogicalCoreId::range(self.cpu_count) {
            self.fail_write(core_id, register_id);
        }
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Writes in the order they were issued, including the failed ones.
    pub fn writes(&self) -> Vec<(LogicalCoreId, u32, u64)> {
        self.state.lock().writes.clone()
    }

    pub fn writes_to(&self, register_id: u32) -> Vec<(LogicalCoreId, u64)> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(_, register, _)| *register == register_id)
            .map(|(core_id, _, value)| (*core_id, *value))
            .collect()
    }

    fn device_path(core_id: LogicalCoreId) -> PathBuf {
        PathBuf::from(format!("/dev/cpu/{core_id}/msr"))
    }
}

impl MSRAccess for MockMSR {
    fn read(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64> {
        let mut state = self.state.lock();
        state.reads += 1;

        if state.denied_cores.contains(&core_id) {
            let io_error = io::Error::from(io::ErrorKind::PermissionDenied);
            return Err(MSRError::open_for_read(core_id, Self::device_path(core_id), io_error));
        }
        if state.failing_reads.contains(&(core_id, register_id)) {
            return Err(MSRError::read_w_no_err(register_id, core_id, Errno::EIO));
        }

        Ok(state
            .registers
            .get(&(core_id, register_id))
            .copied()
            .unwrap_or(0))
    }

    fn write(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()> {
        let mut state = self.state.lock();
        state.writes.push((core_id, register_id, value));

        if state.denied_cores.contains(&core_id) {
            let io_error = io::Error::from(io::ErrorKind::PermissionDenied);
            return Err(MSRError::open_for_write(core_id, Self::device_path(core_id), io_error));
        }
        if state.failing_writes.contains(&(core_id, register_id)) {
            return Err(MSRError::write_w_no_err(value, register_id, core_id, Errno::EIO));
        }

        state.registers.insert((core_id, register_id), value);
        Ok(())
    }

    fn cpu_count(&self) -> usize {
        self.cpu_count
    }
}
