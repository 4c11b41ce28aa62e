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

use std::time::Duration;

use hwk_test_utils::FakeSysfs;
use test_log::test;

use super::*;
use crate::ErrorKind;

const ROOT: &str = "class/devfreq";

fn device(fake: &FakeSysfs, name: &str, table: Option<&str>) {
    let dir = format!("{ROOT}/{name}");
    fake.sys(format!("{dir}/cur_freq"), "400000000\n")
        .sys(format!("{dir}/min_freq"), "200000000\n")
        .sys(format!("{dir}/max_freq"), "600000000\n")
        .sys(format!("{dir}/governor"), "simple_ondemand\n")
        .sys(
            format!("{dir}/available_governors"),
            "simple_ondemand performance powersave userspace\n",
        );
    if let Some(table) = table {
        fake.sys(format!("{dir}/available_frequencies"), table);
    }
}

fn read(fake: &FakeSysfs, name: &str, attribute: &str) -> String {
    fake.read_sys(format!("{ROOT}/{name}/{attribute}"))
}

#[test]
fn devices_are_discovered_by_name() {
    let fake = FakeSysfs::new();
    device(&fake, "ff9a0000.gpu", None);
    device(&fake, "dmc", None);
    fake.sys_dir(format!("{ROOT}/amdgpu-0/device/drm"));

    let devices = discover_devices(&fake.paths()).unwrap();

    let names = devices.iter().map(|device| device.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["amdgpu-0", "dmc", "ff9a0000.gpu"]);
    assert_eq!(devices[0].label(), "AMD GPU");
    assert!(!devices[1].is_gpu());
    assert_eq!(devices[1].label(), "dmc");
    assert_eq!(devices[2].label(), "GPU ff9a0000.gpu");
}

#[test]
fn missing_class_has_no_devices() {
    let fake = FakeSysfs::new();
    assert!(discover_devices(&fake.paths()).unwrap().is_empty());

    let error = device_at(&fake.paths(), 0).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
}

#[test]
fn device_index_must_exist() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", None);

    assert_eq!(device_at(&fake.paths(), 0).unwrap().name, "gpu0");
    let error = device_at(&fake.paths(), 1).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);
}

#[test]
fn info_reads_every_attribute() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", Some("600000000 200000000 400000000\n"));
    fake.sys(format!("{ROOT}/gpu0/gpu_load"), "37@400000000Hz\n");
    let gpu = device_at(&fake.paths(), 0).unwrap();

    let info = gpu.info().unwrap();

    assert_eq!(info.current_hz, Some(400_000_000));
    assert_eq!(
        info.available_frequencies,
        vec![200_000_000, 400_000_000, 600_000_000]
    );
    assert_eq!(info.load_percent, Some(37));
    assert_eq!(info.available_governors.len(), 4);
    let text = info.to_string();
    assert!(text.contains("range: 200-600 MHz"), "{text}");
    assert!(text.contains("load: 37%"), "{text}");
}

#[test]
fn governor_must_be_offered() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", None);
    let gpu = device_at(&fake.paths(), 0).unwrap();

    assert_eq!(gpu.set_governor("teo").unwrap_err().kind(), ErrorKind::InvalidParam);
    gpu.set_governor("userspace").unwrap();
    assert_eq!(gpu.governor().unwrap(), "userspace");
}

#[test]
fn range_is_clamped_to_the_table() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", Some("200000000 400000000 800000000\n"));
    let gpu = device_at(&fake.paths(), 0).unwrap();

    assert!(gpu.set_range(500_000_000, 300_000_000).is_err());

    gpu.set_range(100_000_000, 1_000_000_000).unwrap();
    assert_eq!(read(&fake, "gpu0", "min_freq"), "200000000");
    assert_eq!(read(&fake, "gpu0", "max_freq"), "800000000");

    gpu.set_range(300_000_000, 400_000_000).unwrap();
    assert_eq!(read(&fake, "gpu0", "min_freq"), "300000000");
    assert_eq!(read(&fake, "gpu0", "max_freq"), "400000000");
}

#[test]
fn performance_and_powersave_modes() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", Some("200000000 400000000 800000000\n"));
    let gpu = device_at(&fake.paths(), 0).unwrap();

    gpu.performance().unwrap();
    assert_eq!(gpu.governor().unwrap(), "performance");
    assert_eq!(read(&fake, "gpu0", "min_freq"), "800000000");
    assert_eq!(read(&fake, "gpu0", "max_freq"), "800000000");

    gpu.powersave().unwrap();
    assert_eq!(gpu.governor().unwrap(), "powersave");
    assert_eq!(read(&fake, "gpu0", "min_freq"), "200000000");
    assert_eq!(read(&fake, "gpu0", "max_freq"), "800000000");
}

#[test]
fn monitor_reads_every_device() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", None);
    device(&fake, "gpu1", None);
    fake.sys(format!("{ROOT}/gpu1/cur_freq"), "garbage\n");
    let devices = discover_devices(&fake.paths()).unwrap();
    let stop = crate::StopToken::new();
    stop.stop();

    let mut seen = Vec::new();
    let samples = monitor(
        &devices,
        Duration::from_millis(10),
        Duration::from_secs(5),
        &stop,
        |_, current| seen.extend_from_slice(current),
    );

    assert_eq!(samples, 1);
    assert_eq!(seen, vec![Some(400_000_000), None]);
}

#[test]
fn sweep_pins_each_frequency_and_restores() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", Some("200000000 600000000\n"));
    fake.sys(format!("{ROOT}/gpu0/gpu_load"), "50\n");
    let gpu = device_at(&fake.paths(), 0).unwrap();
    let sweep = DevfreqSweep::new(&gpu, Duration::ZERO, Duration::ZERO, crate::StopToken::new());

    let mut printed = Vec::new();
    let rows = sweep.run(|row| printed.push(row.to_string())).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].target_hz, 200_000_000);
    assert_eq!(rows[0].achieved_hz, Some(400_000_000.0));
    assert_eq!(rows[0].load_percent, Some(50.0));
    assert_eq!(rows[0].samples, 1);
    assert_eq!(printed.len(), 2);
    assert_eq!(gpu.governor().unwrap(), "simple_ondemand");
    assert_eq!(read(&fake, "gpu0", "min_freq"), "200000000");
    assert_eq!(read(&fake, "gpu0", "max_freq"), "600000000");
}

#[test]
fn sweep_without_table_uses_bounds() {
    let fake = FakeSysfs::new();
    device(&fake, "gpu0", None);
    let gpu = device_at(&fake.paths(), 0).unwrap();
    let sweep = DevfreqSweep::new(&gpu, Duration::ZERO, Duration::ZERO, crate::StopToken::new());

    assert_eq!(sweep.frequencies().unwrap(), vec![200_000_000, 600_000_000]);
}
