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

use std::fmt;
use std::io;

use thiserror::Error as ThisError;

use cpu_utils::CPUTopologyError;
use hwk_msr::MSRError;
use hwk_probe::ProbeError;
use hwk_shared::types::LogicalCoreId;
use hwk_sysfs::SysfsError;

/// Coarse classification every tool reports its failures with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Permission,
    NotSupported,
    InvalidParam,
    System,
}

#[derive(ThisError, Debug)]
pub enum KnobError {
    #[error(transparent)]
    MSRError(#[from] MSRError),

    #[error(transparent)]
    SysfsError(#[from] SysfsError),

    #[error(transparent)]
    ProbeError(#[from] ProbeError),

    #[error(transparent)]
    TopologyError(#[from] CPUTopologyError),

    #[error("{action} requires root privileges")]
    Permission { action: String },

    #[error("{feature} is not supported: {reason}")]
    NotSupported { feature: String, reason: String },

    #[error("invalid {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("{what} verification failed: expected {expected:#X}, read back {actual:#X}")]
    VerifyFailed {
        what: String,
        expected: u64,
        actual: u64,
    },

    #[error("worker thread on logical core {core_id} panicked")]
    WorkerPanicked { core_id: LogicalCoreId },

    #[error("interrupted by a stop request")]
    Interrupted,
}

impl KnobError {
    pub fn permission(action: impl Into<String>) -> Self {
        Self::Permission {
            action: action.into(),
        }
    }

    pub fn not_supported(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotSupported {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name,
            reason: reason.into(),
        }
    }

    pub fn verify_failed(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::VerifyFailed {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn worker_panicked(core_id: LogicalCoreId) -> Self {
        Self::WorkerPanicked { core_id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MSRError(MSRError::Unsupported) => ErrorKind::NotSupported,
            Self::MSRError(e) => ErrorKind::from_io(e.io_kind()),
            Self::SysfsError(e) => ErrorKind::from_io(e.io_kind()),
            Self::ProbeError(ProbeError::FieldMissing { .. }) => ErrorKind::NotSupported,
            Self::ProbeError(e) => ErrorKind::from_io(e.io_kind()),
            Self::TopologyError(CPUTopologyError::SysfsError(e)) => ErrorKind::from_io(e.io_kind()),
            Self::TopologyError(_) => ErrorKind::System,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::InvalidParam { .. } => ErrorKind::InvalidParam,
            Self::VerifyFailed { .. } | Self::WorkerPanicked { .. } | Self::Interrupted => {
                ErrorKind::System
            }
        }
    }

    /// Hint for the operator on how to get past this error.
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Permission => Some("run as root, the msr module and sysfs knobs need CAP_SYS_RAWIO"),
            ErrorKind::NotSupported => match self {
                Self::MSRError(_) => Some("load the msr driver with 'modprobe msr'"),
                _ => Some("the kernel doesn't expose this interface on this machine"),
            },
            ErrorKind::InvalidParam | ErrorKind::System => None,
        }
    }
}

impl ErrorKind {
    pub fn from_io(io_kind: Option<io::ErrorKind>) -> Self {
        match io_kind {
            Some(io::ErrorKind::PermissionDenied) => ErrorKind::Permission,
            Some(io::ErrorKind::NotFound) => ErrorKind::NotSupported,
            _ => ErrorKind::System,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Permission => "permission denied",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::System => "system error",
        };
        f.write_str(name)
    }
}
