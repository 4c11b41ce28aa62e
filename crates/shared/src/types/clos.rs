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

use newtype_derive::newtype_fmt;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

pub type ClosIdType = u32;
pub type RmidType = u32;

/// Class of service, selects an L3 way mask and a bandwidth throttle pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ClosIdType", into = "ClosIdType")]
pub struct ClosId(ClosIdType);

/// Resource monitoring id used to tag memory traffic of a CPU.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RmidType", into = "RmidType")]
pub struct Rmid(RmidType);

newtype_derive::NewtypeDisplay! { () pub struct ClosId(ClosIdType); }
newtype_derive::NewtypeDisplay! { () pub struct Rmid(RmidType); }

#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{type_name} value {value} is out of range, it must be less than {bound}")]
pub struct TypeRangeError {
    pub type_name: &'static str,
    pub value: u32,
    pub bound: u32,
}

impl ClosId {
    /// Number of classes addressable through the per-class mask registers.
    pub const MAX_CLOS: ClosIdType = 16;

    pub const DEFAULT: ClosId = ClosId(0);

    pub fn new(value: ClosIdType) -> Result<Self, TypeRangeError> {
        if value >= Self::MAX_CLOS {
            return Err(TypeRangeError {
                type_name: "CLOS id",
                value,
                bound: Self::MAX_CLOS,
            });
        }

        Ok(Self(value))
    }

    pub fn all() -> impl Iterator<Item = ClosId> {
        (0..Self::MAX_CLOS).map(ClosId)
    }

    pub const fn get(self) -> ClosIdType {
        self.0
    }
}

impl Rmid {
    /// RMID occupies bits 9:0 of the association register.
    pub const MAX_RMID: RmidType = 1 << 10;

    pub fn new(value: RmidType) -> Result<Self, TypeRangeError> {
        if value >= Self::MAX_RMID {
            return Err(TypeRangeError {
                type_name: "RMID",
                value,
                bound: Self::MAX_RMID,
            });
        }

        Ok(Self(value))
    }

    pub const fn get(self) -> RmidType {
        self.0
    }
}

impl TryFrom<ClosIdType> for ClosId {
    type Error = TypeRangeError;

    fn try_from(value: ClosIdType) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClosId> for ClosIdType {
    fn from(value: ClosId) -> Self {
        value.0
    }
}

impl TryFrom<RmidType> for Rmid {
    type Error = TypeRangeError;

    fn try_from(value: RmidType) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rmid> for RmidType {
    fn from(value: Rmid) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clos_id_bounds() {
        assert!(ClosId::new(0).is_ok());
        assert!(ClosId::new(15).is_ok());

        let error = ClosId::new(16).unwrap_err();
        assert_eq!(error.value, 16);
        assert_eq!(error.bound, 16);
    }

    #[test]
    fn all_clos_ids_are_enumerated() {
        let ids = ClosId::all().map(ClosId::get).collect::<Vec<_>>();
        assert_eq!(ids, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn rmid_bounds() {
        assert!(Rmid::new(1023).is_ok());
        assert!(Rmid::new(1024).is_err());
    }
}
