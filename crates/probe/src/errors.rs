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

use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ProbeError {
    #[error("probe source {path:?} is unavailable: {io_error}")]
    Unavailable {
        path: PathBuf,
        io_error: std::io::Error,
    },

    #[error("field '{field}' is missing in {path:?}")]
    FieldMissing { path: PathBuf, field: &'static str },
}

impl ProbeError {
    pub(crate) fn unavailable(path: PathBuf, io_error: std::io::Error) -> Self {
        Self::Unavailable { path, io_error }
    }

    pub(crate) fn field_missing(path: PathBuf, field: &'static str) -> Self {
        Self::FieldMissing { path, field }
    }

    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Unavailable { io_error, .. } => Some(io_error.kind()),
            Self::FieldMissing { .. } => None,
        }
    }
}
