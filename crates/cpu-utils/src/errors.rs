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

use thiserror::Error as ThisError;

use hwk_sysfs::SysfsError;

use crate::LogicalCoreId;
use crate::PhysicalCoreId;

#[derive(Debug, ThisError)]
pub enum CPUTopologyError {
    #[error(transparent)]
    SysfsError(#[from] SysfsError),

    #[error("'{list}' is not a valid cpu list")]
    InvalidCpuList { list: String },

    #[error("no online logical cores found")]
    OnlineCoresNotFound,

    #[error("physical core with {core_id} id not found")]
    PhysicalCoreNotFound { core_id: PhysicalCoreId },

    #[error("logical core with {core_id} id not found")]
    LogicalCoreNotFound { core_id: LogicalCoreId },
}

impl CPUTopologyError {
    pub fn invalid_cpu_list(list: impl Into<String>) -> Self {
        Self::InvalidCpuList { list: list.into() }
    }

    pub fn physical_core_not_found(core_id: PhysicalCoreId) -> Self {
        Self::PhysicalCoreNotFound { core_id }
    }

    pub fn logical_core_not_found(core_id: LogicalCoreId) -> Self {
        Self::LogicalCoreNotFound { core_id }
    }
}
