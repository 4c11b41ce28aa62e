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

use cpu_utils::CPUTopology;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;
use hwk_test_utils::FakeSysfs;
use test_log::test;

use super::*;
use crate::ErrorKind;

const CPU: &str = "devices/system/cpu";

fn core(id: u32) -> LogicalCoreId {
    LogicalCoreId::new(id)
}

fn cores(ids: &[u32]) -> Vec<LogicalCoreId> {
    ids.iter().copied().map(core).collect()
}

fn smt_topology() -> CPUTopology {
    CPUTopology::from_groups(cores(&[0, 1, 2, 3]), vec![cores(&[0, 2]), cores(&[1, 3])]).unwrap()
}

fn flat_topology() -> CPUTopology {
    CPUTopology::from_groups(cores(&[0, 1]), vec![cores(&[0]), cores(&[1])]).unwrap()
}

fn bench_settings() -> hwk_config::SmtBench {
    hwk_config::SmtBench {
        duration: Duration::from_millis(20),
        buffer_size: 64 * 1024,
        max_threads: 2,
    }
}

fn smt_tree() -> FakeSysfs {
    let fake = FakeSysfs::new();
    fake.cpus(4)
        .sys(format!("{CPU}/smt/control"), "on\n")
        .sys(format!("{CPU}/smt/active"), "1\n");
    for cpu in 1..4 {
        fake.sys(format!("{CPU}/cpu{cpu}/online"), "1\n");
    }
    fake
}

#[test]
fn control_values_parse() {
    let parsed = ["on", "off", "forceoff", "notsupported", "notimplemented\n"]
        .iter()
        .map(|value| value.parse::<SmtControl>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        parsed,
        vec![
            SmtControl::On,
            SmtControl::Off,
            SmtControl::ForceOff,
            SmtControl::NotSupported,
            SmtControl::NotImplemented,
        ]
    );

    let error = "maybe".parse::<SmtControl>().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);
}

#[test]
fn control_is_read_and_written() {
    let fake = smt_tree();
    let smt = Smt::new(fake.paths());

    assert_eq!(smt.control().unwrap(), SmtControl::On);
    assert!(smt.active().unwrap());

    smt.set_control(SmtControl::ForceOff).unwrap();
    assert_eq!(fake.read_sys(format!("{CPU}/smt/control")), "forceoff");

    let error = smt.set_control(SmtControl::NotImplemented).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);
}

#[test]
fn missing_control_is_not_supported() {
    let fake = FakeSysfs::new();
    fake.cpus(1);
    let smt = Smt::new(fake.paths());

    assert!(!smt.has_control());
    assert_eq!(smt.control().unwrap(), SmtControl::NotSupported);
}

#[test]
fn hotplug_writes_online_attribute() {
    let fake = smt_tree();
    let smt = Smt::new(fake.paths());

    assert!(smt.is_online(core(0)).unwrap());
    smt.set_online(core(2), false).unwrap();
    assert!(!smt.is_online(core(2)).unwrap());
    assert_eq!(fake.read_sys(format!("{CPU}/cpu2/online")), "0");
}

#[test]
fn status_lists_online_cpus() {
    let fake = smt_tree();
    fake.proc("cpuinfo", "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu ht\n");
    fake.sys(format!("{CPU}/cpu3/online"), "0\n");
    let smt = Smt::new(fake.paths());

    let status = smt.status(&Probe::new(fake.paths())).unwrap();

    assert_eq!(status.control, SmtControl::On);
    assert_eq!(status.active, Some(true));
    assert!(status.hyper_threading);
    assert_eq!(status.online.len(), 4);
    assert_eq!(status.online[3], (core(3), false));
    let text = status.to_string();
    assert!(text.contains("SMT control: on"));
    assert!(text.contains("CPU 3: offline"));
}

#[test]
fn support_needs_control_and_ht() {
    let fake = smt_tree();
    fake.proc("cpuinfo", "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu\n");
    let smt = Smt::new(fake.paths());

    let error = check_support(&smt, &Probe::new(fake.paths())).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);

    fake.proc("cpuinfo", "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu ht\n");
    assert!(check_support(&smt, &Probe::new(fake.paths())).is_ok());
}

#[test]
fn cores_are_spread_or_packed() {
    let bench = SmtBench::new(smt_topology(), bench_settings(), StopToken::new());

    assert_eq!(bench.cores_for(4, false), cores(&[0, 1, 0, 1]));
    assert_eq!(bench.cores_for(4, true), cores(&[0, 2, 1, 3]));
    assert_eq!(bench.cores_for(3, true), cores(&[0, 2, 1]));
    assert_eq!(bench.thread_counts(), vec![1, 2]);
}

#[test]
fn bench_compares_siblings() {
    let bench = SmtBench::new(smt_topology(), bench_settings(), StopToken::new());
    let mut reported = 0;

    let rows = bench.run(|_| reported += 1).unwrap();

    assert_eq!(rows.len(), BENCH_WORKLOADS.len() * 2);
    assert_eq!(reported, rows.len());
    assert!(rows.iter().all(|row| row.primary_only > 0.0));
    assert!(rows.iter().all(|row| row.efficiency().is_some()));
    assert!(SmtBenchRow::header().contains("Efficiency"));
}

#[test]
fn bench_without_siblings_skips_smt_runs() {
    let bench = SmtBench::new(flat_topology(), bench_settings(), StopToken::new());

    let rows = bench.run(|_| {}).unwrap();

    assert!(rows.iter().all(|row| row.with_siblings.is_none()));
    assert!(rows[0].to_string().trim_end().ends_with('-'));
}

#[test]
fn stopped_bench_is_interrupted() {
    let stop = StopToken::new();
    stop.stop();
    let bench = SmtBench::new(smt_topology(), bench_settings(), stop);

    assert!(matches!(bench.run(|_| {}), Err(KnobError::Interrupted)));
}

#[test]
fn self_test_restores_smt_and_cpus() {
    let fake = smt_tree();
    let smt = Smt::new(fake.paths());
    let topology = smt.topology().unwrap();
    let settings = hwk_config::SmtBench {
        duration: Duration::from_millis(10),
        ..bench_settings()
    };
    let bench = SmtBench::new(topology, settings, StopToken::new());

    let suite = self_test(&smt, &bench, &StopToken::new()).unwrap();

    assert_eq!(suite.total(), 3);
    assert!(suite.all_passed(), "{suite}");
    assert_eq!(fake.read_sys(format!("{CPU}/smt/control")), "on");
    for cpu in 1..4 {
        assert_eq!(fake.read_sys(format!("{CPU}/cpu{cpu}/online")), "1");
    }
}

#[test]
fn self_test_fails_without_control() {
    let fake = FakeSysfs::new();
    fake.cpus(2);
    let smt = Smt::new(fake.paths());
    let bench = SmtBench::new(flat_topology(), bench_settings(), StopToken::new());

    let suite = self_test(&smt, &bench, &StopToken::new()).unwrap();

    assert_eq!(suite.passed(), 2);
    assert_eq!(suite.exit_code(), 1);
}
