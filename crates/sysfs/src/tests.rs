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

use crate::*;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn values_are_trimmed_and_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "scaling_max_freq", "3600000\n");

    let value: u64 = read_value(&path).unwrap();
    assert_eq!(value, 3_600_000);
}

#[test]
fn garbage_is_reported_as_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "temp", "hot\n");

    let error = read_value::<i64>(&path).unwrap_err();
    assert!(matches!(error, SysfsError::Parse { ref content, .. } if content == "hot"));
    assert_eq!(error.io_kind(), None);
}

#[test]
fn missing_optional_attribute_is_none() {
    let dir = tempfile::tempdir().unwrap();

    let value: Option<u32> = read_optional(dir.path().join("gpu_load")).unwrap();
    assert_eq!(value, None);
}

#[test]
fn lists_are_split_on_whitespace() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "available", "800000 1600000  2400000 \n");

    let values: Vec<u64> = read_list(&path).unwrap();
    assert_eq!(values, vec![800_000, 1_600_000, 2_400_000]);
}

#[test]
fn write_replaces_whole_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "scaling_max_freq", "3600000\n");

    write_value(&path, 800_000).unwrap();
    assert_eq!(read_string(&path).unwrap(), "800000");
}

#[test]
fn write_does_not_create_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent");

    let error = write_value(&path, 1).unwrap_err();
    assert!(error.is_not_found());
    assert!(!path_exists(&path));
}

#[test]
fn numbered_entries_are_ordered_numerically() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["policy10", "policy2", "policy0", "policyX"] {
        std::fs::create_dir(dir.path().join(name)).unwrap();
    }

    let indices = numbered_entries(dir.path(), "policy")
        .unwrap()
        .into_iter()
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    assert_eq!(indices, vec![0, 2, 10]);
}

#[test]
fn prefixed_entries_are_ordered_by_name() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["intel-rapl:1", "intel-rapl:0", "enabled"] {
        std::fs::create_dir(dir.path().join(name)).unwrap();
    }

    let names = prefixed_entries(dir.path(), "intel-rapl:")
        .unwrap()
        .into_iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["intel-rapl:0", "intel-rapl:1"]);
}
