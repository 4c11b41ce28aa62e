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

//! Extraction and splicing of bit ranges inside a 64-bit register value.
//!
//! `start + width <= 64` is a precondition of every function here. It's asserted in
//! debug builds only.

/// Mask of `width` low bits, `width == 64` yields all ones.
pub const fn field_mask(width: u32) -> u64 {
    if width >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Returns bits `[start, start + width)` of `value` shifted down to bit 0.
pub const fn get_field(value: u64, start: u32, width: u32) -> u64 {
    debug_assert!(start < u64::BITS && start + width <= u64::BITS);
    (value >> start) & field_mask(width)
}

/// Returns `value` with bits `[start, start + width)` replaced by `field`.
///
/// Bits of `field` above `width` are dropped, a register field simply can't hold them.
pub const fn set_field(value: u64, start: u32, width: u32, field: u64) -> u64 {
    debug_assert!(start < u64::BITS && start + width <= u64::BITS);
    let mask = field_mask(width) << start;
    (value & !mask) | ((field & field_mask(width)) << start)
}

/// Named (start, width) view over a register value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitField {
    start: u32,
    width: u32,
}

impl BitField {
    pub const fn new(start: u32, width: u32) -> Self {
        assert!(start < u64::BITS && start + width <= u64::BITS);
        Self { start, width }
    }

    pub const fn bit(index: u32) -> Self {
        Self::new(index, 1)
    }

    pub const fn start(&self) -> u32 {
        self.start
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask of the field in register position.
    pub const fn mask(&self) -> u64 {
        field_mask(self.width) << self.start
    }

    /// Largest value the field can hold.
    pub const fn max_value(&self) -> u64 {
        field_mask(self.width)
    }

    pub const fn get(&self, value: u64) -> u64 {
        get_field(value, self.start, self.width)
    }

    pub const fn set(&self, value: u64, field: u64) -> u64 {
        set_field(value, self.start, self.width, field)
    }

    pub const fn is_set(&self, value: u64) -> bool {
        self.get(value) != 0
    }
}
