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

//! Broadcast operations over logical CPUs `0..min(cpu_count, max)`.
//!
//! All of them are all-or-nothing from the caller's point of view: the first failed
//! CPU aborts the iteration and its error is returned, no partial result is
//! reported. CPUs before the failed one have already been written to.
//!
//! Ids are dense, so an accessor must only report as many CPUs as are online
//! without a gap from CPU 0. Online CPUs after an offline one aren't reached.

use hwk_shared::types::LogicalCoreId;

use crate::MSRAccess;
use crate::MSRItem;
use crate::MSRResult;

/// Pass as `max` to cover every CPU the accessor knows about.
pub const ALL_CPUS: usize = usize::MAX;

pub fn broadcast_cores(access: &impl MSRAccess, max: usize) -> impl Iterator<Item = LogicalCoreId> {
    LogicalCoreId::range(access.cpu_count().min(max))
}

pub fn read_all_cpus(access: &impl MSRAccess, register_id: u32, max: usize) -> MSRResult<Vec<u64>> {
    broadcast_cores(access, max)
        .map(|core_id| access.read(core_id, register_id))
        .collect()
}

pub fn write_all_cpus(
    access: &impl MSRAccess,
    register_id: u32,
    value: u64,
    max: usize,
) -> MSRResult<()> {
    for core_id in broadcast_cores(access, max) {
        access.write(core_id, register_id, value)?;
    }

    Ok(())
}

/// Applies a (possibly masked) item on every CPU.
pub fn modify_all_cpus(access: &impl MSRAccess, item: MSRItem, max: usize) -> MSRResult<()> {
    for core_id in broadcast_cores(access, max) {
        access.write_item(core_id, item)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use nix::errno::Errno;

    use super::*;
    use crate::MSRError;

    struct CountingAccess {
        cpu_count: usize,
        failing_core: Option<LogicalCoreId>,
        calls: Cell<usize>,
        registers: RefCell<HashMap<(LogicalCoreId, u32), u64>>,
    }

    impl CountingAccess {
        fn new(cpu_count: usize, failing_core: Option<u32>) -> Self {
            Self {
                cpu_count,
                failing_core: failing_core.map(LogicalCoreId::new),
                calls: Cell::new(0),
                registers: RefCell::new(HashMap::new()),
            }
        }
    }

    impl MSRAccess for CountingAccess {
        fn read(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64> {
            self.calls.set(self.calls.get() + 1);
            if Some(core_id) == self.failing_core {
                return Err(MSRError::read_w_no_err(register_id, core_id, Errno::EIO));
            }

            let value = self
                .registers
                .borrow()
                .get(&(core_id, register_id))
                .copied()
                .unwrap_or(0);
            Ok(value)
        }

        fn write(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()> {
            self.calls.set(self.calls.get() + 1);
            if Some(core_id) == self.failing_core {
                return Err(MSRError::write_w_no_err(
                    value,
                    register_id,
                    core_id,
                    Errno::EIO,
                ));
            }

            self.registers
                .borrow_mut()
                .insert((core_id, register_id), value);
            Ok(())
        }

        fn cpu_count(&self) -> usize {
            self.cpu_count
        }
    }

    #[test]
    fn read_all_stops_at_first_failure() {
        let access = CountingAccess::new(8, Some(3));

        let result = read_all_cpus(&access, 0x1A4, ALL_CPUS);

        assert!(matches!(
            result,
            Err(MSRError::ReadWNoErr { core_id, .. }) if core_id == LogicalCoreId::new(3)
        ));
        assert_eq!(access.calls.get(), 4);
    }

    #[test]
    fn write_all_stops_at_first_failure() {
        let access = CountingAccess::new(8, Some(0));

        let result = write_all_cpus(&access, 0x1A4, 0xF, ALL_CPUS);

        assert!(result.is_err());
        assert_eq!(access.calls.get(), 1);
        assert!(access.registers.borrow().is_empty());
    }

    #[test]
    fn broadcast_is_bounded_by_max() {
        let access = CountingAccess::new(8, None);

        let values = read_all_cpus(&access, 0x1A4, 2).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(access.calls.get(), 2);
    }

    #[test]
    fn broadcast_is_bounded_by_cpu_count() {
        let access = CountingAccess::new(3, None);

        write_all_cpus(&access, 0xC90, 0xFF, 16).unwrap();
        let values = read_all_cpus(&access, 0xC90, 16).unwrap();

        assert_eq!(values, vec![0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn modify_all_keeps_unmasked_bits() {
        let access = CountingAccess::new(2, None);
        write_all_cpus(&access, 0x1A4, 0xF0, ALL_CPUS).unwrap();

        modify_all_cpus(&access, MSRItem::with_mask(0x1A4, 0x5, 0xF), ALL_CPUS).unwrap();

        let values = read_all_cpus(&access, 0x1A4, ALL_CPUS).unwrap();
        assert_eq!(values, vec![0xF5, 0xF5]);
    }
}
