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

use hwk_shared::types::LogicalCoreId;

use crate::MSRAccess;
use crate::MSRResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotEntry {
    core_id: LogicalCoreId,
    register_id: u32,
    value: u64,
}

/// Original register values captured before a tool changes them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MSRSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl MSRSnapshot {
    /// Reads every register on every given core, fails on the first failed read.
    pub fn capture(
        access: &impl MSRAccess,
        register_ids: &[u32],
        core_ids: impl IntoIterator<Item = LogicalCoreId>,
    ) -> MSRResult<Self> {
        let mut entries = Vec::new();
        for core_id in core_ids {
            for &register_id in register_ids {
                let value = access.read(core_id, register_id)?;
                entries.push(SnapshotEntry {
                    core_id,
                    register_id,
                    value,
                });
            }
        }

        Ok(Self { entries })
    }

    pub fn value(&self, core_id: LogicalCoreId, register_id: u32) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.core_id == core_id && entry.register_id == register_id)
            .map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes all captured values back.
    ///
    /// Unlike the broadcast operations this doesn't stop on a failure: every entry
    /// is attempted and the first error is returned afterwards.
    pub fn restore(&self, access: &impl MSRAccess) -> MSRResult<()> {
        let mut first_error = None;

        for entry in &self.entries {
            if let Err(error) = access.write(entry.core_id, entry.register_id, entry.value) {
                tracing::warn!(
                    "restoring register_id {:#X} at logical CPU {} failed: {error}",
                    entry.register_id,
                    entry.core_id
                );
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
