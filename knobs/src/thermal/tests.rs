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

const POLICY: &str = "devices/system/cpu/cpufreq/policy0";

fn zone(fake: &FakeSysfs, id: u32, kind: &str, millicelsius: i64) {
    let dir = format!("class/thermal/thermal_zone{id}");
    fake.sys(format!("{dir}/type"), format!("{kind}\n"))
        .sys(format!("{dir}/temp"), format!("{millicelsius}\n"));
}

fn cpufreq_policy(fake: &FakeSysfs) {
    fake.sys(format!("{POLICY}/scaling_governor"), "performance\n")
        .sys(format!("{POLICY}/scaling_available_governors"), "performance powersave\n")
        .sys(format!("{POLICY}/scaling_min_freq"), "800000\n")
        .sys(format!("{POLICY}/scaling_max_freq"), "3000000\n")
        .sys(format!("{POLICY}/scaling_cur_freq"), "2400000\n")
        .sys(format!("{POLICY}/cpuinfo_min_freq"), "800000\n")
        .sys(format!("{POLICY}/cpuinfo_max_freq"), "3600000\n");
}

fn policy() -> ThermalPolicy {
    ThermalPolicy::new(70.0, 85.0, 95.0, 800_000, 3_600_000).unwrap()
}

fn close(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() < 1e-9
}

#[test]
fn zones_and_trip_points_are_read() {
    let fake = FakeSysfs::new();
    zone(&fake, 0, "acpitz", 40_000);
    zone(&fake, 1, "x86_pkg_temp", 55_500);
    fake.sys("class/thermal/thermal_zone0/trip_point_0_temp", "95000\n")
        .sys("class/thermal/thermal_zone0/trip_point_0_type", "passive\n")
        .sys("class/thermal/thermal_zone0/trip_point_1_temp", "105000\n")
        .sys("class/thermal/thermal_zone0/trip_point_1_type", "critical\n");

    let zones = discover_zones(&fake.paths()).unwrap();

    assert_eq!(zones.len(), 2);
    assert!(zones[1].is_cpu());
    let trips = zones[0].trip_points().unwrap();
    assert_eq!(trips.len(), 2);
    assert_eq!(trips[1].kind, "critical");
    assert_eq!(trips[1].celsius, 105.0);
    assert_eq!(cpu_celsius(&zones), Some(55.5));

    let status = zones[0].status().unwrap().to_string();
    assert!(status.contains("40.0 C"), "{status}");
    assert!(status.ends_with("passive:95C critical:105C"), "{status}");
}

#[test]
fn hottest_zone_is_used_without_cpu_zone() {
    let fake = FakeSysfs::new();
    zone(&fake, 0, "acpitz", 40_000);
    zone(&fake, 1, "pch_skylake", 62_000);
    zone(&fake, 2, "iwlwifi", 0);
    fake.sys("class/thermal/thermal_zone2/temp", "broken\n");

    let zones = discover_zones(&fake.paths()).unwrap();

    assert_eq!(cpu_celsius(&zones), Some(62.0));
    assert_eq!(zones[2].status().unwrap().celsius, None);
}

#[test]
fn no_thermal_class_is_not_supported() {
    let fake = FakeSysfs::new();
    assert!(discover_zones(&fake.paths()).unwrap().is_empty());
    assert!(discover_cooling_devices(&fake.paths()).unwrap().is_empty());
    assert_eq!(cpu_celsius(&[]), None);

    let error = check_support(&fake.paths()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
}

#[test]
fn cooling_state_is_bounded_by_max() {
    let fake = FakeSysfs::new();
    fake.sys("class/thermal/cooling_device0/type", "Processor\n")
        .sys("class/thermal/cooling_device0/cur_state", "0\n")
        .sys("class/thermal/cooling_device0/max_state", "3\n");
    let devices = discover_cooling_devices(&fake.paths()).unwrap();

    let error = devices[0].set_state(4).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    devices[0].set_state(2).unwrap();
    assert_eq!(devices[0].cur_state().unwrap(), 2);
    assert!(devices[0].to_string().ends_with("state 2/3"));
}

#[test]
fn cap_interpolates_between_thresholds() {
    let policy = policy();

    assert_eq!(policy.cap_for(60.0), 3_600_000);
    assert_eq!(policy.cap_for(70.0), 3_600_000);
    assert_eq!(policy.cap_for(77.5), 2_700_000);
    assert_eq!(policy.cap_for(85.0), 1_800_000);
    assert_eq!(policy.cap_for(90.0), 1_300_000);
    assert_eq!(policy.cap_for(95.0), 800_000);
    assert_eq!(policy.cap_for(120.0), 800_000);
}

#[test]
fn throttle_state_follows_thresholds() {
    let policy = policy();

    assert_eq!(policy.state_for(69.9), ThrottleState::Normal);
    assert_eq!(policy.state_for(70.0), ThrottleState::LowThrottle);
    assert_eq!(policy.state_for(85.0), ThrottleState::HighThrottle);
    assert_eq!(policy.state_for(95.0), ThrottleState::Critical);
    assert_eq!(ThrottleState::Critical.to_string(), "CRITICAL");
}

#[test]
fn cap_never_leaves_the_frequency_range() {
    let policy = ThermalPolicy::new(70.0, 85.0, 95.0, 2_000_000, 3_000_000).unwrap();

    assert_eq!(policy.cap_for(86.0), 2_000_000);
}

#[test]
fn policy_rejects_unordered_thresholds() {
    let error = ThermalPolicy::new(80.0, 70.0, 90.0, 800_000, 3_600_000).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    let error = ThermalPolicy::new(70.0, 80.0, 90.0, 4_000_000, 3_600_000).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    assert!(policy().with_thresholds(60.0, 60.0, 80.0).is_err());
}

#[test]
fn policy_from_config_keeps_floor_below_ceiling() {
    let config = hwk_config::Thermal {
        low_celsius: 65.0,
        high_celsius: 75.0,
        critical_celsius: 85.0,
        freq_min_khz: 800_000,
        poll_interval: Duration::from_secs(1),
    };

    let policy = ThermalPolicy::from_config(&config, 600_000).unwrap();

    assert_eq!(policy.freq_min_khz, 600_000);
    assert_eq!(policy.freq_max_khz, 600_000);
    assert_eq!(policy.critical_celsius, 85.0);
}

#[test]
fn auto_cap_applies_and_lifts_the_cap() {
    let fake = FakeSysfs::new();
    zone(&fake, 0, "x86_pkg_temp", 90_000);
    cpufreq_policy(&fake);
    let zones = discover_zones(&fake.paths()).unwrap();
    let cpufreq = CpuFreq::new(&fake.paths()).unwrap();
    assert_eq!(hardware_max_khz(&cpufreq).unwrap(), 3_600_000);

    let mut samples = Vec::new();
    let count = auto_cap(
        &zones,
        &cpufreq,
        &policy(),
        Duration::from_millis(1),
        Some(Duration::ZERO),
        &StopToken::new(),
        |sample| samples.push(*sample),
    )
    .unwrap();

    assert_eq!(count, 1);
    assert_eq!(samples[0].cap_khz, 1_300_000);
    assert_eq!(samples[0].state, Some(ThrottleState::HighThrottle));
    assert_eq!(samples[0].celsius, Some(90.0));
    let max = fake.read_sys(format!("{POLICY}/scaling_max_freq"));
    assert_eq!(max, "3600000");
}

#[test]
fn unreadable_temperature_keeps_the_maximum() {
    let fake = FakeSysfs::new();
    cpufreq_policy(&fake);
    let cpufreq = CpuFreq::new(&fake.paths()).unwrap();

    let (celsius, state, cap) = apply_policy(&[], &cpufreq, &policy()).unwrap();

    assert_eq!((celsius, state, cap), (None, None, 3_600_000));
}

#[test]
fn analysis_summarizes_points() {
    let points = [
        ThermalPoint {
            seconds: 0.0,
            celsius: Some(60.0),
            freq_mhz: Some(3600.0),
            watts: Some(10.0),
        },
        ThermalPoint {
            seconds: 1.0,
            celsius: Some(70.0),
            freq_mhz: Some(3400.0),
            watts: Some(20.0),
        },
        ThermalPoint {
            seconds: 2.0,
            celsius: Some(80.0),
            freq_mhz: Some(1800.0),
            watts: None,
        },
    ];

    let result = analyze("balanced", 0.5, &points, 3_600_000, 100.0);

    assert_eq!(result.samples, 3);
    assert_eq!(result.avg_celsius, Some(70.0));
    assert_eq!(result.max_celsius, Some(80.0));
    assert!(close(result.celsius_stddev.unwrap(), (200.0f64 / 3.0).sqrt()));
    assert!(close(result.avg_freq_mhz.unwrap(), 8800.0 / 3.0));
    let performance = (0.4 + 3400.0 / 3600.0 * 0.3 + 0.1) / 3.0;
    assert!(close(result.avg_performance.unwrap(), performance));
    assert_eq!(result.throttle_events, 2);
    assert_eq!(result.energy_joules, Some(15.0));
    assert!(close(result.performance_per_joule().unwrap(), performance / 15.0));
}

#[test]
fn analysis_without_samples_is_empty() {
    let result = analyze("no capping", 1.0, &[], 3_600_000, 95.0);

    assert_eq!(result.avg_celsius, None);
    assert_eq!(result.energy_joules, None);
    assert_eq!(result.performance_per_joule(), None);
    assert!(result.to_string().starts_with("no capping"));
}

#[test]
fn bench_runs_every_strategy_and_load() {
    let fake = FakeSysfs::new();
    zone(&fake, 0, "x86_pkg_temp", 80_000);
    cpufreq_policy(&fake);
    let zones = discover_zones(&fake.paths()).unwrap();
    let cpufreq = CpuFreq::new(&fake.paths()).unwrap();
    let settings = ThermalBenchSettings {
        warmup: Duration::ZERO,
        duration: Duration::ZERO,
        cooldown: Duration::ZERO,
        sample_interval: Duration::from_millis(1),
    };
    let bench = ThermalBench::new(&zones, &cpufreq, policy(), None, settings, StopToken::new());

    let mut printed = 0;
    let results = bench.run(|_| printed += 1).unwrap();

    assert_eq!(results.len(), LOAD_LEVELS.len() * STRATEGIES.len());
    assert_eq!(printed, results.len());
    assert_eq!(results[0].strategy, "no capping");
    assert_eq!(results[0].avg_freq_mhz, Some(2400.0));
    assert_eq!(results[0].energy_joules, None);
    let max = fake.read_sys(format!("{POLICY}/scaling_max_freq"));
    assert_eq!(max, "3000000");
}

#[test]
fn stopped_bench_restores_policies() {
    let fake = FakeSysfs::new();
    zone(&fake, 0, "x86_pkg_temp", 80_000);
    cpufreq_policy(&fake);
    let zones = discover_zones(&fake.paths()).unwrap();
    let cpufreq = CpuFreq::new(&fake.paths()).unwrap();
    let stop = StopToken::new();
    stop.stop();
    let bench = ThermalBench::new(
        &zones,
        &cpufreq,
        policy(),
        None,
        ThermalBenchSettings::default(),
        stop,
    );

    let error = bench.run(|_| {}).unwrap_err();

    assert!(matches!(error, KnobError::Interrupted));
    let max = fake.read_sys(format!("{POLICY}/scaling_max_freq"));
    assert_eq!(max, "3000000");
}
