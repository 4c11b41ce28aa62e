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

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error as ThisError;

use hwk_shared::types::LogicalCoreId;

#[derive(ThisError, Debug)]
pub enum MSRError {
    #[error("opening MSR file {path:?} for read there is an error: {io_error}")]
    OpenForRead {
        core_id: LogicalCoreId,
        path: PathBuf,
        io_error: io::Error,
    },

    #[error("opening MSR file {path:?} for write there is an error: {io_error}")]
    OpenForWrite {
        core_id: LogicalCoreId,
        path: PathBuf,
        io_error: io::Error,
    },

    #[error("reading register_id {register_id:#X} at logical CPU {core_id} there is an error: {errno}")]
    ReadWNoErr {
        register_id: u32,
        core_id: LogicalCoreId,
        errno: Errno,
    },

    #[error(
        "writing value {value:#X} for register_id {register_id:#X} at logical CPU {core_id} there is an error: {errno}"
    )]
    WriteWNoErr {
        value: u64,
        register_id: u32,
        core_id: LogicalCoreId,
        errno: Errno,
    },

    #[error("reading register_id {register_id:#X} at logical CPU {core_id} returned {bytes} bytes instead of 8")]
    ShortRead {
        register_id: u32,
        core_id: LogicalCoreId,
        bytes: usize,
    },

    #[error("writing register_id {register_id:#X} at logical CPU {core_id} accepted {bytes} bytes instead of 8")]
    ShortWrite {
        register_id: u32,
        core_id: LogicalCoreId,
        bytes: usize,
    },

    #[error("MSR access isn't supported on this platform")]
    Unsupported,
}

impl MSRError {
    pub fn open_for_read(core_id: LogicalCoreId, path: PathBuf, io_error: io::Error) -> Self {
        Self::OpenForRead {
            core_id,
            path,
            io_error,
        }
    }

    pub fn open_for_write(core_id: LogicalCoreId, path: PathBuf, io_error: io::Error) -> Self {
        Self::OpenForWrite {
            core_id,
            path,
            io_error,
        }
    }

    pub fn read_w_no_err(register_id: u32, core_id: LogicalCoreId, errno: Errno) -> Self {
        Self::ReadWNoErr {
            register_id,
            core_id,
            errno,
        }
    }

    pub fn write_w_no_err(
        value: u64,
        register_id: u32,
        core_id: LogicalCoreId,
        errno: Errno,
    ) -> Self {
        Self::WriteWNoErr {
            value,
            register_id,
            core_id,
            errno,
        }
    }

    /// True when the device couldn't be opened at all, as opposed to a failed register access.
    pub fn is_open_error(&self) -> bool {
        matches!(self, Self::OpenForRead { .. } | Self::OpenForWrite { .. })
    }

    /// Kind of the underlying OS error, if there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::OpenForRead { io_error, .. } | Self::OpenForWrite { io_error, .. } => {
                Some(io_error.kind())
            }
            Self::ReadWNoErr { errno, .. } | Self::WriteWNoErr { errno, .. } => {
                Some(io::Error::from_raw_os_error(*errno as i32).kind())
            }
            Self::ShortRead { .. } | Self::ShortWrite { .. } | Self::Unsupported => None,
        }
    }
}
