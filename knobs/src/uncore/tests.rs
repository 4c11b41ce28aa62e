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

use hwk_msr::registers::MSR_UNCORE_PERF_STATUS;
use hwk_msr::registers::MSR_UNCORE_RATIO_LIMIT;
use hwk_test_utils::FakeSysfs;
use hwk_test_utils::MockMSR;
use test_log::test;

use super::*;
use crate::bench::HarnessSettings;
use crate::ErrorKind;
use crate::StopToken;

const ROOT: &str = "devices/system/cpu/intel_uncore_frequency";

fn domain(fake: &FakeSysfs, name: &str, min: u64, max: u64) {
    let dir = format!("{ROOT}/{name}");
    fake.sys(format!("{dir}/min_freq_khz"), format!("{min}\n"))
        .sys(format!("{dir}/max_freq_khz"), format!("{max}\n"))
        .sys(format!("{dir}/initial_min_freq_khz"), format!("{min}\n"))
        .sys(format!("{dir}/initial_max_freq_khz"), format!("{max}\n"))
        .sys(format!("{dir}/current_freq_khz"), "1800000\n");
}

fn harness() -> Harness {
    let settings = HarnessSettings {
        settle: Duration::ZERO,
        warmup: false,
    };
    Harness::new(settings, StopToken::new())
}

#[test]
fn domains_are_ordered_by_package_and_die() {
    let fake = FakeSysfs::new();
    domain(&fake, "package_01_die_00", 800_000, 2_400_000);
    domain(&fake, "package_00_die_01", 800_000, 2_400_000);
    domain(&fake, "package_00_die_00", 1_200_000, 2_000_000);
    fake.sys_dir(format!("{ROOT}/uncore00"));

    let domains = discover_domains(&fake.paths()).unwrap();

    let names = domains.iter().map(UncoreDomain::name).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["package_00_die_00", "package_00_die_01", "package_01_die_00"]
    );
    assert_eq!(domains[0].initial_min_khz, 1_200_000);
    let limits = domains[0].limits().unwrap();
    assert_eq!(limits.current_khz, Some(1_800_000));
    assert_eq!(limits.to_string(), "min 1200000 kHz, max 2000000 kHz, current 1800000 kHz");
}

#[test]
fn missing_driver_has_no_domains() {
    let fake = FakeSysfs::new();
    assert!(discover_domains(&fake.paths()).unwrap().is_empty());
}

#[test]
fn initial_limits_fall_back_to_current_ones() {
    let fake = FakeSysfs::new();
    let dir = format!("{ROOT}/package_00_die_00");
    fake.sys(format!("{dir}/min_freq_khz"), "900000\n")
        .sys(format!("{dir}/max_freq_khz"), "2100000\n");

    let domains = discover_domains(&fake.paths()).unwrap();

    assert_eq!(domains[0].initial_min_khz, 900_000);
    assert_eq!(domains[0].initial_max_khz, 2_100_000);
    assert_eq!(domains[0].current_khz().unwrap(), None);
}

#[test]
fn range_rejects_inverted_limits() {
    let fake = FakeSysfs::new();
    domain(&fake, "package_00_die_00", 800_000, 2_400_000);
    let domains = discover_domains(&fake.paths()).unwrap();

    let error = domains[0].set_range(2_000_000, 1_000_000).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    domains[0].set_range(1_000_000, 1_600_000).unwrap();
    assert_eq!(domains[0].min_khz().unwrap(), 1_000_000);
    assert_eq!(domains[0].max_khz().unwrap(), 1_600_000);

    domains[0].restore().unwrap();
    assert_eq!(domains[0].max_khz().unwrap(), 2_400_000);
}

#[test]
fn ratio_limit_msr_decodes() {
    let msr = MockMSR::new(1)
        .with_register(0, MSR_UNCORE_RATIO_LIMIT, 0x0818)
        .with_register(0, MSR_UNCORE_PERF_STATUS, 0x14);

    let limit = read_ratio_limit(&msr).unwrap();

    assert_eq!(limit, UncoreRatioLimit { min_ratio: 8, max_ratio: 24 });
    assert_eq!(limit.min_khz(), 800_000);
    assert_eq!(limit.max_khz(), 2_400_000);
    assert_eq!(read_current_khz(&msr).unwrap(), 2_000_000);
}

#[test]
fn self_test_restores_initial_limits() {
    let fake = FakeSysfs::new();
    domain(&fake, "package_00_die_00", 800_000, 2_400_000);
    let domains = discover_domains(&fake.paths()).unwrap();

    let suite = self_test(&domains, &mut harness(), 256 * 1024).unwrap();

    assert_eq!(suite.total(), 3);
    assert!(suite.all_passed(), "{suite}");
    let max = fake.read_sys(format!("{ROOT}/package_00_die_00/max_freq_khz"));
    assert_eq!(max, "2400000");
}

#[test]
fn self_test_needs_a_domain() {
    let error = self_test(&[], &mut harness(), 1024).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
}

#[test]
fn support_needs_driver() {
    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu\n");
    let probe = Probe::new(fake.paths());
    assert!(check_support(&fake.paths(), &probe).is_err());

    domain(&fake, "package_00_die_00", 800_000, 2_400_000);
    assert!(check_support(&fake.paths(), &probe).is_ok());
}
