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

use serde::Deserialize;
use serde::Serialize;

use crate::BitField;

/// A value to be written into a register, optionally only under a mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MSRItem {
    register_id: u32,
    value: u64,
    mask: u64,
}

impl MSRItem {
    pub const NO_MASK: u64 = u64::MAX;

    pub fn new(register_id: u32, value: u64) -> Self {
        Self {
            register_id,
            value,
            mask: Self::NO_MASK,
        }
    }

    pub fn with_mask(register_id: u32, value: u64, mask: u64) -> Self {
        Self {
            register_id,
            value,
            mask,
        }
    }

    /// An item touching only `field`, `field_value` is placed at the field position.
    pub fn with_field(register_id: u32, field: BitField, field_value: u64) -> Self {
        Self::with_mask(register_id, field.set(0, field_value), field.mask())
    }

    pub fn register_id(&self) -> u32 {
        self.register_id
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn masked_value(old_value: u64, new_value: u64, mask: u64) -> u64 {
        (new_value & mask) | (old_value & !mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_value_keeps_bits_outside_mask() {
        let value = MSRItem::masked_value(0xABCD_0000_0000_00F0, 0x5, 0xF);
        assert_eq!(value, 0xABCD_0000_0000_00F5);
    }

    #[test]
    fn field_item_is_placed_at_field_position() {
        let item = MSRItem::with_field(0xC8F, BitField::new(32, 32), 3);

        assert_eq!(item.value(), 3 << 32);
        assert_eq!(item.mask(), 0xFFFF_FFFF_0000_0000);
    }
}
