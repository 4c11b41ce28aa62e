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

use hwk_shared::types::LogicalCoreId;
use hwk_test_utils::FakeSysfs;
use test_log::test;

use super::*;
use crate::rapl::PowerMeter;
use crate::ErrorKind;
use crate::StopToken;

const STATES: [(&str, u64); 3] = [("POLL", 0), ("C1", 2), ("C6", 133)];

fn state_dir(cpu: u32, index: u32) -> String {
    format!("devices/system/cpu/cpu{cpu}/cpuidle/state{index}")
}

fn cpuidle(fake: &FakeSysfs, cpus: usize) {
    fake.cpus(cpus);
    for cpu in 0..cpus as u32 {
        for (index, (name, latency)) in STATES.iter().enumerate() {
            let dir = state_dir(cpu, index as u32);
            fake.sys(format!("{dir}/name"), format!("{name}\n"))
                .sys(format!("{dir}/desc"), format!("{name} idle state\n"))
                .sys(format!("{dir}/latency"), format!("{latency}\n"))
                .sys(format!("{dir}/residency"), format!("{}\n", latency * 3))
                .sys(format!("{dir}/usage"), "10\n")
                .sys(format!("{dir}/time"), "1000\n")
                .sys(format!("{dir}/disable"), "0\n");
        }
    }
    fake.sys("devices/system/cpu/cpuidle/current_governor", "menu\n")
        .sys("devices/system/cpu/cpuidle/available_governors", "ladder menu teo\n")
        .sys("devices/system/cpu/cpuidle/current_driver", "intel_idle\n");
}

fn disabled(fake: &FakeSysfs, cpu: u32, index: u32) -> String {
    fake.read_sys(format!("{}/disable", state_dir(cpu, index)))
}

fn quick_settings() -> CStateBenchSettings {
    CStateBenchSettings {
        wake_iterations: 4,
        idle_duration: Duration::from_millis(5),
        workload_duration: Duration::from_millis(5),
    }
}

#[test]
fn states_are_listed_in_index_order() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    fake.sys(format!("{}/usage", state_dir(0, 2)), "4\n");
    fake.sys(format!("{}/disable", state_dir(0, 2)), "1\n");
    let cstates = CStates::new(fake.paths());

    let states = cstates.states(LogicalCoreId::new(0)).unwrap();

    let names = states.iter().map(|state| state.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["POLL", "C1", "C6"]);
    assert_eq!(states[2].latency_us, 133);
    assert_eq!(states[2].residency_us, 399);
    assert!(states[2].disabled);
    assert_eq!(states[2].average_residency_us(), 250.0);
    assert!(states[1].to_string().ends_with("Yes"));
    assert!(states[2].to_string().ends_with("No"));
    assert_eq!(cstates.driver().unwrap().as_deref(), Some("intel_idle"));
}

#[test]
fn cpu_without_cpuidle_is_not_supported() {
    let fake = FakeSysfs::new();
    fake.cpus(1);
    let cstates = CStates::new(fake.paths());

    let error = cstates.states(LogicalCoreId::new(0)).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotSupported);
    assert!(check_support(&cstates).is_err());
}

#[test]
fn state_is_toggled_on_one_or_all_cpus() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 2);
    let cstates = CStates::new(fake.paths());

    cstates.set_enabled(2, false, Some(LogicalCoreId::new(1))).unwrap();
    assert_eq!(disabled(&fake, 0, 2), "0");
    assert_eq!(disabled(&fake, 1, 2), "1");

    cstates.set_enabled(1, false, None).unwrap();
    assert_eq!(disabled(&fake, 0, 1), "1");
    assert_eq!(disabled(&fake, 1, 1), "1");

    cstates.set_enabled(1, true, None).unwrap();
    assert_eq!(disabled(&fake, 0, 1), "0");
}

#[test]
fn max_cstate_disables_deeper_states() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 2);
    let cstates = CStates::new(fake.paths());

    cstates.set_max_cstate(1).unwrap();

    for cpu in 0..2 {
        assert_eq!(disabled(&fake, cpu, 0), "0");
        assert_eq!(disabled(&fake, cpu, 1), "0");
        assert_eq!(disabled(&fake, cpu, 2), "1");
    }

    cstates.set_max_cstate(0).unwrap();
    assert_eq!(disabled(&fake, 1, 1), "1");
}

#[test]
fn governor_must_be_available() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    let cstates = CStates::new(fake.paths());

    assert_eq!(cstates.governor().unwrap(), "menu");
    assert_eq!(cstates.available_governors().unwrap(), vec!["ladder", "menu", "teo"]);

    let error = cstates.set_governor("haltpoll").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    cstates.set_governor("teo").unwrap();
    assert_eq!(cstates.governor().unwrap(), "teo");
}

#[test]
fn snapshot_restores_disable_flags() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 2);
    fake.sys(format!("{}/disable", state_dir(1, 2)), "1\n");
    let cstates = CStates::new(fake.paths());

    let snapshot = cstates.snapshot().unwrap();
    assert_eq!(snapshot.len(), 6);

    cstates.set_max_cstate(0).unwrap();
    cstates.restore(&snapshot).unwrap();

    assert_eq!(disabled(&fake, 0, 1), "0");
    assert_eq!(disabled(&fake, 0, 2), "0");
    assert_eq!(disabled(&fake, 1, 1), "0");
    assert_eq!(disabled(&fake, 1, 2), "1");
}

#[test]
fn residency_is_split_by_time_delta() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    let cstates = CStates::new(fake.paths());
    let cores = [LogicalCoreId::new(0)];

    let before = ResidencyReading::take(&cstates, &cores).unwrap();
    fake.sys(format!("{}/time", state_dir(0, 1)), "1100\n")
        .sys(format!("{}/time", state_dir(0, 2)), "1300\n");
    let after = ResidencyReading::take(&cstates, &cores).unwrap();

    let residency = after.residency_since(&before);

    assert_eq!(residency.len(), 1);
    let percents = residency[0]
        .shares
        .iter()
        .map(|share| share.percent)
        .collect::<Vec<_>>();
    assert_eq!(percents, vec![0.0, 25.0, 75.0]);
    assert_eq!(residency[0].shares[2].delta_us, 300);
    assert_eq!(residency[0].to_string(), "CPU0: C1:25% C2:75%");
}

#[test]
fn monitor_stops_on_request() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    let cstates = CStates::new(fake.paths());
    let stop = StopToken::new();
    stop.stop();

    let samples = monitor(
        &cstates,
        &[LogicalCoreId::new(0)],
        Duration::from_millis(10),
        Duration::from_secs(5),
        &stop,
        |_, _| {},
    )
    .unwrap();

    assert_eq!(samples, 0);
}

#[test]
fn stats_report_average_residency_and_share() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    fake.sys(format!("{}/time", state_dir(0, 0)), "0\n");
    let cstates = CStates::new(fake.paths());
    let states = cstates.states(LogicalCoreId::new(0)).unwrap();

    let lines = stats_table(&states);

    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("State"));
    assert!(lines[1].ends_with("(0.0%)"), "{}", lines[1]);
    assert!(lines[2].ends_with("100.0 (50.0%)"), "{}", lines[2]);
}

#[test]
fn wake_latency_and_intermittent_work_without_powercap() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    let cstates = CStates::new(fake.paths());
    let bench = CStateBench::new(&cstates, None, quick_settings(), StopToken::new());

    let stats = bench.wake_latency(8).unwrap().unwrap();
    assert_eq!(stats.count, 8);
    assert!(stats.min <= stats.max);

    let result = bench
        .intermittent(INTERMITTENT_PATTERNS[0], Duration::from_millis(20))
        .unwrap();
    assert!(result.operations > 0);
    assert!(result.throughput > 0.0);
    assert!(result.avg_latency_ms >= 0.1);
    assert_eq!(result.power_watts, None);
    assert_eq!(result.energy_per_op_mj, None);

    assert_eq!(bench.idle_power(Duration::from_millis(1)).unwrap(), None);
}

#[test]
fn idle_power_reads_package_counters() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    fake.sys("class/powercap/intel-rapl/intel-rapl:0/name", "package-0\n")
        .sys("class/powercap/intel-rapl/intel-rapl:0/energy_uj", "5000\n");
    let meter = PowerMeter::packages(&fake.paths()).unwrap();
    assert!(meter.is_some());
    let cstates = CStates::new(fake.paths());
    let bench = CStateBench::new(&cstates, meter, quick_settings(), StopToken::new());

    let watts = bench.idle_power(Duration::from_millis(5)).unwrap();

    assert_eq!(watts, Some(0.0));
}

#[test]
fn bench_covers_every_config_and_restores_flags() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 2);
    fake.sys(format!("{}/disable", state_dir(1, 1)), "1\n");
    let cstates = CStates::new(fake.paths());
    let bench = CStateBench::new(&cstates, None, quick_settings(), StopToken::new());

    let mut printed = 0;
    let rows = bench.run(|_| printed += 1).unwrap();

    assert_eq!(rows.len(), BENCH_CONFIGS.len());
    assert_eq!(printed, BENCH_CONFIGS.len());
    assert_eq!(rows[0].applied, "C0:on C1:on C2:on");
    assert_eq!(rows[1].applied, "C0:on C1:on C2:off");
    assert_eq!(rows[3].applied, "C0:on C1:off C2:off");
    assert_eq!(rows[1].workloads.len(), INTERMITTENT_PATTERNS.len());
    assert!(rows[0].to_string().contains("idle power: unavailable"));

    assert_eq!(disabled(&fake, 0, 1), "0");
    assert_eq!(disabled(&fake, 0, 2), "0");
    assert_eq!(disabled(&fake, 1, 1), "1");
}

#[test]
fn stopped_bench_still_restores_flags() {
    let fake = FakeSysfs::new();
    cpuidle(&fake, 1);
    let cstates = CStates::new(fake.paths());
    let stop = StopToken::new();
    stop.stop();
    let bench = CStateBench::new(&cstates, None, quick_settings(), stop);

    let error = bench.run(|_| {}).unwrap_err();

    assert!(matches!(error, crate::KnobError::Interrupted));
    assert_eq!(disabled(&fake, 0, 2), "0");
}
