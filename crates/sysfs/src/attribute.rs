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

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use crate::SysfsError;
use crate::SysfsResult;

/// Reads an attribute and strips the trailing newline.
pub fn read_string(path: impl AsRef<Path>) -> SysfsResult<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|error| SysfsError::read(path, error))?;
    Ok(content.trim().to_string())
}

pub fn read_value<T: FromStr>(path: impl AsRef<Path>) -> SysfsResult<T> {
    let path = path.as_ref();
    let content = read_string(path)?;
    content
        .parse::<T>()
        .map_err(|_| SysfsError::parse(path, content, std::any::type_name::<T>()))
}

/// Same as [`read_value`], but a missing attribute is `None` rather than an error.
pub fn read_optional<T: FromStr>(path: impl AsRef<Path>) -> SysfsResult<Option<T>> {
    match read_value(path) {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error),
    }
}

/// Reads a whitespace separated list, e.g. `scaling_available_governors`.
pub fn read_list<T: FromStr>(path: impl AsRef<Path>) -> SysfsResult<Vec<T>> {
    let path = path.as_ref();
    let content = read_string(path)?;
    content
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| SysfsError::parse(path, token, std::any::type_name::<T>()))
        })
        .collect()
}

pub fn write_value<V: Display>(path: impl AsRef<Path>, value: V) -> SysfsResult<()> {
    let path = path.as_ref();
    let value = value.to_string();

    let write_to_file = || -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
        file.write_all(value.as_bytes())
    };

    write_to_file().map_err(|error| SysfsError::write(path, value.clone(), error))?;
    tracing::debug!("wrote '{value}' into {path:?}");

    Ok(())
}

pub fn path_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Lists `<dir>/<prefix><N>` entries ordered by `N`, e.g. `policy0`, `policy1`, `policy12`.
///
/// Entries with a non numeric suffix (`cpuidle`, `cpufreq`) are skipped.
pub fn numbered_entries(dir: impl AsRef<Path>, prefix: &str) -> SysfsResult<Vec<(u32, PathBuf)>> {
    let mut entries = list_with_prefix(dir, prefix)?
        .into_iter()
        .filter_map(|(name, path)| {
            let index = name.strip_prefix(prefix)?.parse::<u32>().ok()?;
            Some((index, path))
        })
        .collect::<Vec<_>>();

    entries.sort_unstable_by_key(|(index, _)| *index);
    Ok(entries)
}

/// Lists entries whose name starts with `prefix`, ordered by name.
pub fn prefixed_entries(dir: impl AsRef<Path>, prefix: &str) -> SysfsResult<Vec<PathBuf>> {
    let mut entries = list_with_prefix(dir, prefix)?;
    entries.sort_unstable_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

fn list_with_prefix(dir: impl AsRef<Path>, prefix: &str) -> SysfsResult<Vec<(String, PathBuf)>> {
    let dir = dir.as_ref();
    let read_dir = std::fs::read_dir(dir).map_err(|error| SysfsError::list_dir(dir, error))?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|error| SysfsError::list_dir(dir, error))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) {
            entries.push((name, entry.path()));
        }
    }

    Ok(entries)
}
