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

use hwk_msr::registers::IA32_L3_MASK_0;
use hwk_msr::registers::IA32_MBA_THRTL_0;
use hwk_msr::registers::IA32_PQR_ASSOC;
use hwk_msr::registers::IA32_QM_CTR;
use hwk_msr::registers::IA32_QM_EVTSEL;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;
use hwk_test_utils::FakeSysfs;
use hwk_test_utils::MockMSR;
use test_log::test;

use super::*;
use crate::ErrorKind;
use crate::StopToken;
use crate::TestStatus;

fn core(id: u32) -> LogicalCoreId {
    LogicalCoreId::new(id)
}

fn clos(id: u32) -> ClosId {
    clos_id(id).unwrap()
}

fn allocation_only() -> RdtFeatures {
    RdtFeatures {
        allocation: true,
        cat_l3: true,
        ..RdtFeatures::default()
    }
}

#[test]
fn clos_assignment_keeps_rmid() {
    let msr = MockMSR::new(4).with_register(1, IA32_PQR_ASSOC, 0x2A);
    let rdt = Rdt::new(&msr, allocation_only());

    rdt.assign_cpu_to_clos(core(1), clos(3)).unwrap();

    assert_eq!(msr.get(core(1), IA32_PQR_ASSOC), (3 << 32) | 0x2A);
    assert_eq!(rdt.read_clos_for_cpu(core(1)).unwrap(), clos(3));
    assert_eq!(rdt.read_rmid(core(1)).unwrap().get(), 0x2A);
}

#[test]
fn rmid_assignment_keeps_clos() {
    let msr = MockMSR::new(2).with_register(0, IA32_PQR_ASSOC, 5 << 32);
    let rdt = Rdt::new(&msr, allocation_only());

    rdt.assign_rmid(core(0), rmid(7).unwrap()).unwrap();

    assert_eq!(msr.get(core(0), IA32_PQR_ASSOC), (5 << 32) | 7);
}

#[test]
fn out_of_range_ids_are_invalid_params() {
    assert_eq!(clos_id(16).unwrap_err().kind(), ErrorKind::InvalidParam);
    assert_eq!(rmid(1024).unwrap_err().kind(), ErrorKind::InvalidParam);
}

#[test]
fn mask_is_written_to_every_cpu_and_throttle_skipped_without_mba() {
    let msr = MockMSR::new(4);
    let rdt = Rdt::new(&msr, allocation_only());

    rdt.configure_clos(clos(1), 0xFF00, Some(50)).unwrap();

    let mask_writes = msr.writes_to(IA32_L3_MASK_0 + 1);
    assert_eq!(mask_writes.len(), 4);
    assert!(mask_writes.iter().all(|&(_, value)| value == 0xFF00));
    assert!(msr.writes_to(IA32_MBA_THRTL_0 + 1).is_empty());
}

#[test]
fn throttle_is_written_with_mba() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, RdtFeatures::all());

    rdt.configure_clos(clos(1), 0xFF, Some(25)).unwrap();
    rdt.configure_clos(clos(2), 0xFF, None).unwrap();
    rdt.configure_clos(clos(3), 0xFF, Some(0)).unwrap();

    assert_eq!(
        msr.writes_to(IA32_MBA_THRTL_0 + 1),
        vec![(core(0), 25), (core(1), 25)]
    );
    assert!(msr.writes_to(IA32_MBA_THRTL_0 + 2).is_empty());
    assert!(msr.writes_to(IA32_MBA_THRTL_0 + 3).is_empty());
    assert_eq!(rdt.read_throttle(clos(1)).unwrap(), 25);
}

#[test]
fn invalid_masks_and_throttles_write_nothing() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, RdtFeatures::all());

    for mask in [0, 0x1_0000_0000, 0b1011] {
        let error = rdt.configure_clos(clos(1), mask, None).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParam, "mask {mask:#X}");
    }
    let error = rdt.configure_clos(clos(1), 0xF, Some(101)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);

    assert_eq!(msr.write_count(), 0);
}

#[test]
fn failed_throttle_leaves_mask_applied() {
    let msr = MockMSR::new(2);
    msr.fail_write_on_all(IA32_MBA_THRTL_0 + 2);
    let rdt = Rdt::new(&msr, RdtFeatures::all());

    let result = rdt.configure_clos(clos(2), 0xF, Some(10));

    assert!(matches!(result, Err(KnobError::MSRError(_))));
    assert_eq!(msr.get(core(0), IA32_L3_MASK_0 + 2), 0xF);
    assert_eq!(msr.get(core(1), IA32_L3_MASK_0 + 2), 0xF);
}

#[test]
fn throttle_read_needs_mba() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, allocation_only());

    let error = rdt.read_throttle(clos(1)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
}

#[test]
fn snapshot_restores_masks_and_assignments() {
    let msr = MockMSR::new(3)
        .with_register_on_all(IA32_L3_MASK_0 + 1, 0xFFFF)
        .with_register(2, IA32_PQR_ASSOC, (1 << 32) | 3);
    let rdt = Rdt::new(&msr, allocation_only());

    let snapshot = rdt.snapshot().unwrap();
    assert_eq!(snapshot.clos_value(IA32_L3_MASK_0 + 1), Some(0xFFFF));
    assert_eq!(snapshot.assignment(core(2)), Some((1 << 32) | 3));

    rdt.configure_clos(clos(1), 0xF0, None).unwrap();
    rdt.assign_cpu_to_clos(core(2), clos(5)).unwrap();
    rdt.restore(&snapshot).unwrap();

    for id in 0..3 {
        assert_eq!(msr.get(core(id), IA32_L3_MASK_0 + 1), 0xFFFF);
    }
    assert_eq!(msr.get(core(2), IA32_PQR_ASSOC), (1 << 32) | 3);
}

/// Eight classes of service, the registers of the other eight don't exist.
fn eight_classes(msr: &MockMSR) -> RdtFeatures {
    for offset in 8..16 {
        msr.fail_read(core(0), IA32_L3_MASK_0 + offset);
        msr.fail_read(core(0), IA32_MBA_THRTL_0 + offset);
    }
    RdtFeatures {
        l3_highest_clos: Some(7),
        mba_highest_clos: Some(7),
        ..RdtFeatures::all()
    }
}

#[test]
fn snapshot_reads_only_implemented_classes() {
    let msr = MockMSR::new(2).with_register_on_all(IA32_MBA_THRTL_0 + 7, 10);
    let rdt = Rdt::new(&msr, eight_classes(&msr));

    let snapshot = rdt.snapshot().unwrap();

    assert_eq!(snapshot.clos_value(IA32_L3_MASK_0 + 7), Some(0));
    assert_eq!(snapshot.clos_value(IA32_MBA_THRTL_0 + 7), Some(10));
    assert_eq!(snapshot.clos_value(IA32_L3_MASK_0 + 8), None);
    assert_eq!(snapshot.clos_value(IA32_MBA_THRTL_0 + 8), None);
}

#[test]
fn class_counts_follow_cpuid_and_mba() {
    let features = RdtFeatures {
        l3_highest_clos: Some(3),
        mba_highest_clos: Some(1),
        ..RdtFeatures::all()
    };
    assert_eq!(features.l3_classes().count(), 4);
    assert_eq!(features.mba_classes().count(), 2);

    assert_eq!(RdtFeatures::all().l3_classes().count(), 16);
    assert_eq!(allocation_only().mba_classes().count(), 0);
}

#[test]
fn self_test_runs_with_fewer_classes() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, eight_classes(&msr));

    let suite = self_test(&rdt, clos(1)).unwrap();

    assert_eq!(suite.total(), 4);
    assert!(suite.all_passed(), "{suite}");
}

#[test]
fn clear_throttle_writes_zero_only_with_mba() {
    let msr = MockMSR::new(2).with_register_on_all(IA32_MBA_THRTL_0 + 1, 25);

    Rdt::new(&msr, allocation_only()).clear_throttle(clos(1)).unwrap();
    assert_eq!(msr.write_count(), 0);

    Rdt::new(&msr, RdtFeatures::all()).clear_throttle(clos(1)).unwrap();
    assert_eq!(
        msr.writes_to(IA32_MBA_THRTL_0 + 1),
        vec![(core(0), 0), (core(1), 0)]
    );
}

#[test]
fn reset_moves_every_cpu_to_default_clos() {
    let msr = MockMSR::new(4).with_register_on_all(IA32_PQR_ASSOC, (4 << 32) | 9);
    let rdt = Rdt::new(&msr, allocation_only());

    rdt.reset_assignments().unwrap();

    for id in 0..4 {
        assert_eq!(msr.get(core(id), IA32_PQR_ASSOC), 9);
    }
}

#[test]
fn event_select_then_counter_read() {
    let msr = MockMSR::new(1).with_register(0, IA32_QM_CTR, 1234);
    let rdt = Rdt::new(&msr, RdtFeatures::all());

    let value = rdt
        .read_event(core(0), rmid(5).unwrap(), MonitorEvent::MbmTotal)
        .unwrap();

    assert_eq!(value, Some(1234));
    assert_eq!(msr.writes_to(IA32_QM_EVTSEL), vec![(core(0), (2 << 32) | 5)]);
}

#[test]
fn counter_flags() {
    let msr = MockMSR::new(1).with_register(0, IA32_QM_CTR, (1 << 62) | 5);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let rmid = rmid(0).unwrap();

    let value = rdt.read_event(core(0), rmid, MonitorEvent::LlcOccupancy).unwrap();
    assert_eq!(value, None);

    msr.set(core(0), IA32_QM_CTR, 1 << 63);
    let error = rdt
        .read_event(core(0), rmid, MonitorEvent::LlcOccupancy)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
}

#[test]
fn bandwidth_delta_wraps_at_24_bits() {
    assert_eq!(mbm_delta(10, 30), 20);
    assert_eq!(mbm_delta(0xFF_FFF0, 0x10), 0x20);
    assert_eq!(mbm_delta(0, (1 << 24) + 5), 5);
}

#[test]
fn monitor_sample_scales_counters() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let monitor = RdtMonitor::new(&rdt, core(0), rmid(0).unwrap(), Duration::from_millis(100))
        .unwrap()
        .with_conversion_factor(64);

    let previous = MonitorReading {
        llc_occupancy: Some(10),
        mbm_total: Some(0xFF_FFF0),
        mbm_local: Some(100),
    };
    let current = MonitorReading {
        llc_occupancy: Some(20),
        mbm_total: Some(0x10),
        mbm_local: None,
    };

    let sample = monitor.sample(&previous, &current, Duration::from_secs(1), Duration::from_secs(3));

    assert_eq!(sample.llc_occupancy_bytes, Some(1280));
    assert_eq!(sample.mbm_total_bytes_per_sec, Some(2048.0));
    assert_eq!(sample.mbm_local_bytes_per_sec, None);
    assert_eq!(sample.elapsed, Duration::from_secs(3));
}

#[test]
fn monitor_needs_monitoring_features() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, allocation_only());

    let result = RdtMonitor::new(&rdt, core(0), rmid(0).unwrap(), Duration::from_millis(10));

    assert!(matches!(result, Err(ref error) if error.kind() == ErrorKind::NotSupported));
}

#[test]
fn monitor_run_produces_samples_until_duration() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let monitor =
        RdtMonitor::new(&rdt, core(0), rmid(0).unwrap(), Duration::from_millis(5)).unwrap();
    let mut samples = Vec::new();

    let count = monitor
        .run(Duration::from_millis(30), &StopToken::new(), |sample| {
            samples.push(*sample)
        })
        .unwrap();

    assert!(count >= 1);
    assert_eq!(count, samples.len());
}

#[test]
fn self_test_passes_and_restores_state() {
    let msr = MockMSR::new(4);
    let rdt = Rdt::new(&msr, RdtFeatures::all());

    let suite = self_test(&rdt, clos(1)).unwrap();

    assert_eq!(suite.total(), 4);
    assert!(suite.all_passed(), "{suite}");
    assert_eq!(suite.exit_code(), 0);
    assert_eq!(msr.get(core(0), IA32_L3_MASK_0 + 1), 0);
    assert_eq!(msr.get(core(0), IA32_PQR_ASSOC), 0);
}

#[test]
fn self_test_skips_monitoring_without_cqm() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, allocation_only());

    let suite = self_test(&rdt, clos(1)).unwrap();

    let monitoring = suite
        .outcomes()
        .iter()
        .find(|outcome| outcome.name == "bandwidth monitoring")
        .unwrap();
    assert!(matches!(monitoring.status, TestStatus::Skipped { .. }));
    assert!(suite.all_passed());
}

#[test]
fn self_test_reports_failed_cache_allocation() {
    let msr = MockMSR::new(2);
    msr.fail_write(core(0), IA32_L3_MASK_0 + 1);
    let rdt = Rdt::new(&msr, allocation_only());

    let suite = self_test(&rdt, clos(1)).unwrap();

    assert_eq!(suite.passed(), 3);
    assert_eq!(suite.exit_code(), 1);
    assert!(suite.to_string().ends_with("3/4 tests passed"));
}

#[test]
fn self_test_refuses_default_clos() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, allocation_only());

    assert!(self_test(&rdt, ClosId::DEFAULT).is_err());
}

fn bench_settings() -> hwk_config::RdtBench {
    hwk_config::RdtBench {
        duration: Duration::from_millis(30),
        pause: Duration::ZERO,
        buffer_size: 64 * 1024,
        clos: clos(1),
        monitor_interval: Duration::from_millis(10),
    }
}

#[test]
fn bench_has_eight_configurations() {
    assert_eq!(BENCH_CONFIGS.len(), 8);
    assert_eq!(BENCH_CONFIGS[0].name, "Baseline - No RDT Control");
    assert_eq!(BENCH_CONFIGS[6].l3_mask, 0xF000);
}

#[test]
fn bench_needs_allocation() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, RdtFeatures::default());

    let result = RdtBench::new(&rdt, bench_settings(), vec![core(0)], StopToken::new());
    assert!(matches!(result, Err(ref error) if error.kind() == ErrorKind::NotSupported));
}

#[test]
fn bench_runs_one_configuration_and_restores() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let bench = RdtBench::new(&rdt, bench_settings(), vec![core(0), core(1)], StopToken::new())
        .unwrap();
    let mut reported = 0;

    let results = bench.run(Some(6), |_| reported += 1).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(reported, 1);
    let result = &results[0];
    assert_eq!(result.workers.len(), 2);
    assert!(result.workers.iter().all(|worker| worker.passes > 0));
    assert!(!result.samples.is_empty());
    assert!(result.to_string().contains("Pointer Chase - Cache Sensitive"));

    assert!(msr
        .writes_to(IA32_L3_MASK_0 + 1)
        .iter()
        .any(|&(_, value)| value == 0xF000));
    assert_eq!(msr.get(core(0), IA32_L3_MASK_0 + 1), 0);
    assert_eq!(msr.get(core(1), IA32_PQR_ASSOC), 0);
}

#[test]
fn unthrottled_configuration_drops_previous_throttle() {
    let msr = MockMSR::new(2);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let bench = RdtBench::new(&rdt, bench_settings(), vec![core(0), core(1)], StopToken::new())
        .unwrap();

    bench.run_config(&BENCH_CONFIGS[4]).unwrap();
    assert_eq!(rdt.read_throttle(clos(1)).unwrap(), 25);

    bench.run_config(&BENCH_CONFIGS[5]).unwrap();
    assert_eq!(BENCH_CONFIGS[5].throttle, 0);
    assert_eq!(rdt.read_throttle(clos(1)).unwrap(), 0);
    assert_eq!(msr.get(core(1), IA32_MBA_THRTL_0 + 1), 0);
}

#[test]
fn bench_rejects_unknown_configuration() {
    let msr = MockMSR::new(1);
    let rdt = Rdt::new(&msr, RdtFeatures::all());
    let bench = RdtBench::new(&rdt, bench_settings(), vec![core(0)], StopToken::new()).unwrap();

    let error = bench.run(Some(8), |_| {}).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidParam);
}

const CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
flags\t\t: fpu msr rdt_a cat_l3
";

#[test]
fn diagnosis_of_partial_setup() {
    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", CPUINFO).msr_devices(1);
    let probe = Probe::new(fake.paths());

    let diagnosis = diagnose(&probe);

    assert_eq!(diagnosis.total(), 4);
    assert!(diagnosis.checks[0].passed);
    assert!(diagnosis.checks[0].detail.contains("rdt_a, cat_l3"));
    assert!(!diagnosis.checks[2].passed);
    assert!(diagnosis.checks[2]
        .advice
        .as_deref()
        .unwrap()
        .contains("mount -t resctrl"));
    assert!(!diagnosis.all_passed());
    assert_eq!(diagnosis.exit_code(), 1);
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
#[test]
fn diagnosis_explains_missing_msr_device() {
    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", CPUINFO).sys_dir("fs/resctrl/info");
    let probe = Probe::new(fake.paths());

    let diagnosis = diagnose(&probe);

    assert!(!diagnosis.checks[1].passed);
    assert!(diagnosis.checks[1]
        .advice
        .as_deref()
        .unwrap()
        .contains("modprobe msr"));
    assert!(diagnosis.checks[2].passed);
}
