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

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum SysfsError {
    #[error("reading '{path:?}' there is an error: {io_error}")]
    Read { path: PathBuf, io_error: io::Error },

    #[error("writing '{value}' into '{path:?}' there is an error: {io_error}")]
    Write {
        path: PathBuf,
        value: String,
        io_error: io::Error,
    },

    #[error("listing directory '{path:?}' there is an error: {io_error}")]
    ListDir { path: PathBuf, io_error: io::Error },

    #[error("'{path:?}' contains '{content}' which can't be parsed as {expected}")]
    Parse {
        path: PathBuf,
        content: String,
        expected: &'static str,
    },
}

impl SysfsError {
    pub(crate) fn read(path: impl Into<PathBuf>, io_error: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            io_error,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, value: String, io_error: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            value,
            io_error,
        }
    }

    pub(crate) fn list_dir(path: impl Into<PathBuf>, io_error: io::Error) -> Self {
        Self::ListDir {
            path: path.into(),
            io_error,
        }
    }

    pub(crate) fn parse(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            content: content.into(),
            expected,
        }
    }

    /// Kind of the underlying OS error, if there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Read { io_error, .. }
            | Self::Write { io_error, .. }
            | Self::ListDir { io_error, .. } => Some(io_error.kind()),
            Self::Parse { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::NotFound)
    }
}
