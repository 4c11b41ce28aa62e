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

use std::fs::File;
use std::io;
use std::path::Path;

use hwk_shared::types::LogicalCoreId;

use crate::MSRError;
use crate::MSRResult;

const REGISTER_SIZE: usize = std::mem::size_of::<u64>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MSRFileOpMode {
    MSRRead,
    MSRWrite,
    MSRReadWrite,
}

pub(crate) fn open_msr(path: &Path, mode: MSRFileOpMode) -> io::Result<File> {
    use std::fs::OpenOptions;

    match mode {
        MSRFileOpMode::MSRRead => OpenOptions::new().read(true).open(path),
        MSRFileOpMode::MSRWrite => OpenOptions::new().write(true).open(path),
        MSRFileOpMode::MSRReadWrite => OpenOptions::new().read(true).write(true).open(path),
    }
}

pub(crate) fn read_register(
    file: &File,
    register_id: u32,
    core_id: LogicalCoreId,
) -> MSRResult<u64> {
    use nix::sys::uio::pread;

    let mut value = [0u8; REGISTER_SIZE];
    let bytes = pread(file, &mut value, register_id as i64)
        .map_err(|errno| MSRError::read_w_no_err(register_id, core_id, errno))?;
    if bytes != REGISTER_SIZE {
        return Err(MSRError::ShortRead {
            register_id,
            core_id,
            bytes,
        });
    }

    let result = u64::from_le_bytes(value);
    tracing::debug!("Read MSR register_id {register_id:#X} value {result:#X} at core id {core_id}");

    Ok(result)
}

pub(crate) fn write_register(
    file: &File,
    register_id: u32,
    value: u64,
    core_id: LogicalCoreId,
) -> MSRResult<()> {
    use nix::sys::uio::pwrite;

    let value_as_bytes = value.to_le_bytes();
    let bytes = pwrite(file, &value_as_bytes, register_id as i64)
        .map_err(|errno| MSRError::write_w_no_err(value, register_id, core_id, errno))?;
    if bytes != REGISTER_SIZE {
        return Err(MSRError::ShortWrite {
            register_id,
            core_id,
            bytes,
        });
    }

    tracing::debug!("Wrote MSR register_id {register_id:#X} value {value:#X} at core id {core_id}");

    Ok(())
}
