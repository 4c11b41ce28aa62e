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

use hwk_msr::registers::MSR_PKG_ENERGY_STATUS;
use hwk_msr::registers::MSR_PKG_POWER_LIMIT;
use hwk_msr::registers::MSR_RAPL_POWER_UNIT;
use hwk_shared::types::LogicalCoreId;
use hwk_test_utils::FakeSysfs;
use hwk_test_utils::MockMSR;
use test_log::test;

use super::*;
use crate::ErrorKind;

// 1/8 W, 1/16384 J, 1/1024 s
const UNITS_RAW: u64 = 0xA_0E03;
// PL1 100 W enabled, Y = 10, Z = 0: one second
const LIMIT_RAW: u64 = 0x14_8320;

fn core(id: u32) -> LogicalCoreId {
    LogicalCoreId::new(id)
}

fn units() -> RaplUnits {
    RaplUnits::decode(UNITS_RAW)
}

fn rapl_msr() -> MockMSR {
    MockMSR::new(2)
        .with_register(0, MSR_RAPL_POWER_UNIT, UNITS_RAW)
        .with_register(0, MSR_PKG_POWER_LIMIT, LIMIT_RAW)
}

#[test]
fn units_are_inverse_powers_of_two() {
    let units = units();
    assert_eq!(units.power_watts, 0.125);
    assert_eq!(units.energy_joules, 1.0 / 16384.0);
    assert_eq!(units.time_seconds, 1.0 / 1024.0);
}

#[test]
fn power_limit_decodes_pl1() {
    let limit = PowerLimit::decode(LIMIT_RAW | 1 << 63, &units());

    assert_eq!(limit.watts, 100.0);
    assert!(limit.enabled);
    assert!(!limit.clamped);
    assert!(limit.locked);
    assert_eq!(limit.time_window, Duration::from_secs(1));
}

#[test]
fn time_window_codec() {
    let unit = units().time_seconds;
    assert_eq!(encode_time_window(1.0, unit), (10, 0));
    assert_eq!(encode_time_window(2.5, unit), (11, 1));
    assert_eq!(decode_time_window(11, 1, unit), 2.5);
    assert_eq!(decode_time_window(0, 3, 1.0), 1.75);
}

#[test]
fn encode_keeps_pl2_half() {
    let pl2 = 0x00DE_8000_0000_0000;
    let limit = PowerLimit {
        watts: 90.0,
        enabled: true,
        clamped: false,
        time_window: Duration::from_millis(2500),
        locked: false,
    };

    let raw = limit.encode(pl2, &units()).unwrap();

    assert_eq!(raw & 0xFFFF_FFFF_0000_0000, pl2);
    assert_eq!(raw & 0x7FFF, 720);
    assert_eq!(PowerLimit::decode(raw, &units()).time_window, Duration::from_millis(2500));
}

#[test]
fn encode_rejects_unrepresentable_power() {
    let limit = PowerLimit {
        watts: 5000.0,
        enabled: true,
        clamped: false,
        time_window: Duration::from_secs(1),
        locked: false,
    };
    assert_eq!(limit.encode(0, &units()).unwrap_err().kind(), ErrorKind::InvalidParam);

    let limit = PowerLimit { watts: f64::NAN, ..limit };
    assert!(limit.encode(0, &units()).is_err());
}

#[test]
fn energy_counter_wraps_at_32_bits() {
    assert_eq!(energy_delta(0xFFFF_FFF0, 0x10), 0x20);
    assert_eq!(energy_delta(5, 15), 10);
}

#[test]
fn energy_is_scaled_by_units() {
    let msr = rapl_msr().with_register(0, MSR_PKG_ENERGY_STATUS, 0xFFFF_0000_0000_4000);
    let rapl = Rapl::new(&msr).unwrap();

    assert_eq!(rapl.read_energy_raw(RaplDomain::Package).unwrap(), 0x4000);
    assert_eq!(rapl.read_energy_joules(RaplDomain::Package).unwrap(), 1.0);
}

#[test]
fn set_power_limit_enables_pl1() {
    let msr = MockMSR::new(1)
        .with_register(0, MSR_RAPL_POWER_UNIT, UNITS_RAW)
        .with_register(0, MSR_PKG_POWER_LIMIT, 800);
    let rapl = Rapl::new(&msr).unwrap();

    rapl.set_power_limit(50.0, Duration::from_secs(1)).unwrap();

    let limit = rapl.read_power_limit().unwrap();
    assert_eq!(limit.watts, 50.0);
    assert!(limit.enabled);
    assert_eq!(limit.time_window, Duration::from_secs(1));
}

#[test]
fn locked_limit_is_not_written() {
    let msr = MockMSR::new(1)
        .with_register(0, MSR_RAPL_POWER_UNIT, UNITS_RAW)
        .with_register(0, MSR_PKG_POWER_LIMIT, LIMIT_RAW | 1 << 63);
    let rapl = Rapl::new(&msr).unwrap();

    let error = rapl.set_power_limit(50.0, Duration::from_secs(1)).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotSupported);
    assert!(msr.writes_to(MSR_PKG_POWER_LIMIT).is_empty());
}

#[test]
fn info_reports_missing_domains() {
    let msr = rapl_msr();
    msr.fail_read(core(0), RaplDomain::Dram.energy_register());
    let rapl = Rapl::new(&msr).unwrap();

    let info = rapl.info();

    assert_eq!(info.energy_joules.len(), 4);
    assert_eq!(info.energy_joules[1], (RaplDomain::Dram, None));
    assert!(info.power_limit.is_some());
    assert!(info.to_string().contains("DRAM  energy: unavailable"));
}

#[test]
fn self_test_caps_then_restores_limit() {
    let msr = rapl_msr();
    let rapl = Rapl::new(&msr).unwrap();

    let suite = self_test(&rapl, &StopToken::new()).unwrap();

    assert_eq!(suite.total(), 3);
    assert!(suite.all_passed(), "{suite}");
    let writes = msr.writes_to(MSR_PKG_POWER_LIMIT);
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].1 & 0x7FFF, 720);
    assert_eq!(msr.get(core(0), MSR_PKG_POWER_LIMIT), LIMIT_RAW);
}

#[test]
fn self_test_reports_unreadable_counters() {
    let msr = rapl_msr();
    msr.fail_read(core(0), MSR_PKG_ENERGY_STATUS);
    let rapl = Rapl::new(&msr).unwrap();

    let suite = self_test(&rapl, &StopToken::new()).unwrap();

    assert_eq!(suite.passed(), 1);
    assert_eq!(suite.exit_code(), 1);
}

fn powercap_tree(fake: &FakeSysfs) {
    let package = "class/powercap/intel-rapl/intel-rapl:0";
    fake.sys(format!("{package}/name"), "package-0\n")
        .sys(format!("{package}/energy_uj"), "1000\n")
        .sys(format!("{package}/max_energy_range_uj"), "262143328850\n")
        .sys(format!("{package}/constraint_0_power_limit_uw"), "125000000\n")
        .sys(format!("{package}/intel-rapl:0:0/name"), "core\n")
        .sys(format!("{package}/intel-rapl:0:0/energy_uj"), "10\n")
        .sys("class/powercap/intel-rapl/intel-rapl:1/name", "psys\n")
        .sys("class/powercap/intel-rapl/intel-rapl:1/energy_uj", "0\n");
}

#[test]
fn zones_are_discovered_depth_first() {
    let fake = FakeSysfs::new();
    powercap_tree(&fake);

    let zones = discover_zones(&fake.paths()).unwrap();

    let names = zones
        .iter()
        .map(|zone| (zone.name.as_str(), zone.depth))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![("package-0", 0), ("core", 1), ("psys", 0)]);
    assert_eq!(zones[0].energy_uj().unwrap(), 1000);
    assert_eq!(zones[0].power_limit_uw().unwrap(), Some(125_000_000));
    assert_eq!(zones[1].max_energy_range_uj, None);
    assert!(zones[0].is_package());
    assert!(!zones[2].is_package());
}

#[test]
fn missing_powercap_tree_is_empty() {
    let fake = FakeSysfs::new();
    assert!(discover_zones(&fake.paths()).unwrap().is_empty());
    assert!(PowerMeter::packages(&fake.paths()).unwrap().is_none());
}

#[test]
fn powercap_delta_wraps_at_max_range() {
    assert_eq!(energy_delta_uj(100, 250, Some(1000)), 150);
    assert_eq!(energy_delta_uj(900, 50, Some(1000)), 150);
    assert_eq!(energy_delta_uj(900, 50, None), 0);
}

#[test]
fn power_meter_sums_packages() {
    let fake = FakeSysfs::new();
    powercap_tree(&fake);
    let meter = PowerMeter::packages(&fake.paths()).unwrap().unwrap();
    assert_eq!(meter.zones().len(), 1);

    let start = meter.read().unwrap();
    let end = EnergyReading {
        at: start.at + Duration::from_secs(2),
        energy_uj: vec![start.energy_uj[0] + 50_000_000],
    };
    assert_eq!(meter.watts_between(&start, &end), 25.0);

    let same = EnergyReading {
        at: start.at,
        energy_uj: start.energy_uj.clone(),
    };
    assert_eq!(meter.watts_between(&start, &same), 0.0);
}

#[test]
fn support_needs_rapl_and_msr() {
    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu\n");
    let error = check_support(&Probe::new(fake.paths())).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);

    powercap_tree(&fake);
    fake.msr_devices(1);
    assert!(check_support(&Probe::new(fake.paths())).is_ok());
}
