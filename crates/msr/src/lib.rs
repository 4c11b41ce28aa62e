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

/// This crate gives access to model specific registers through the `/dev/cpu/N/msr`
/// character devices exposed by the Linux `msr` module.
/// On every other platform the device returns `MSRError::Unsupported`.

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
#[path = "linux_x86_64/mod.rs"]
mod msr_impl;
#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
#[path = "other/mod.rs"]
mod msr_impl;

mod batch;
pub mod bitfield;
mod errors;
mod msr_item;
mod msr_snapshot;
pub mod registers;

use hwk_shared::types::LogicalCoreId;

pub use batch::*;
pub use bitfield::BitField;
pub use errors::MSRError;
pub use msr_impl::*;
pub use msr_item::MSRItem;
pub use msr_snapshot::MSRSnapshot;

pub type MSRResult<T> = Result<T, MSRError>;

/// A register file addressed by (logical CPU, register id).
pub trait MSRAccess {
    fn read(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64>;

    fn write(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()>;

    /// Number of logical CPUs the broadcast operations iterate over.
    fn cpu_count(&self) -> usize;

    /// Writes an item, doing a read-modify-write if it's masked.
    fn write_item(&self, core_id: LogicalCoreId, item: MSRItem) -> MSRResult<()> {
        let value_to_write = if item.mask() != MSRItem::NO_MASK {
            let old_value = self.read(core_id, item.register_id())?;
            MSRItem::masked_value(old_value, item.value(), item.mask())
        } else {
            item.value()
        };

        tracing::debug!(
            "Write MSR register_id {:#X} value {:#X} at logical CPU {}",
            item.register_id(),
            value_to_write,
            core_id
        );
        self.write(core_id, item.register_id(), value_to_write)
    }
}

impl<T: MSRAccess + ?Sized> MSRAccess for &T {
    fn read(&self, core_id: LogicalCoreId, register_id: u32) -> MSRResult<u64> {
        (**self).read(core_id, register_id)
    }

    fn write(&self, core_id: LogicalCoreId, register_id: u32, value: u64) -> MSRResult<()> {
        (**self).write(core_id, register_id, value)
    }

    fn cpu_count(&self) -> usize {
        (**self).cpu_count()
    }
}
