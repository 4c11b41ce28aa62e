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

use hwk_msr::registers::MSR_MISC_FEATURE_CONTROL;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;
use hwk_test_utils::FakeSysfs;
use hwk_test_utils::MockMSR;
use test_log::test;

use super::*;
use crate::bench::HarnessSettings;
use crate::ErrorKind;
use crate::StopToken;

fn core(id: u32) -> LogicalCoreId {
    LogicalCoreId::new(id)
}

fn harness() -> Harness {
    let settings = HarnessSettings {
        settle: Duration::ZERO,
        warmup: false,
    };
    Harness::new(settings, StopToken::new())
}

#[test]
fn presets_cover_every_prefetcher() {
    let bits = PRESETS
        .iter()
        .map(|preset| preset.disable.bits())
        .collect::<Vec<_>>();
    assert_eq!(bits, vec![0x0, 0x1, 0x2, 0x4, 0x8, 0xF]);

    assert_eq!(preset("all_disabled").unwrap().disable, PrefetchDisable::all());
    assert!(preset("nothing").is_none());
}

#[test]
fn apply_keeps_unrelated_bits() {
    let msr = MockMSR::new(2).with_register_on_all(MSR_MISC_FEATURE_CONTROL, 0xF0 | 0x3);
    let prefetch = Prefetch::new(&msr);

    prefetch
        .apply(PrefetchDisable::DCU_STREAM | PrefetchDisable::DCU_IP)
        .unwrap();

    assert_eq!(msr.get(core(0), MSR_MISC_FEATURE_CONTROL), 0xFC);
    assert_eq!(msr.get(core(1), MSR_MISC_FEATURE_CONTROL), 0xFC);
    assert_eq!(
        prefetch.read_all().unwrap(),
        vec![PrefetchDisable::DCU_STREAM | PrefetchDisable::DCU_IP; 2]
    );
}

#[test]
fn read_decodes_low_bits_only() {
    let msr = MockMSR::new(1).with_register(0, MSR_MISC_FEATURE_CONTROL, 0x1_0000_0005);
    let prefetch = Prefetch::new(&msr);

    let disabled = prefetch.read().unwrap();
    assert_eq!(disabled, PrefetchDisable::L2_STREAM | PrefetchDisable::DCU_STREAM);
    assert_eq!(disabled.to_string(), "l2_stream, dcu_stream");
    assert_eq!(PrefetchDisable::empty().to_string(), "none");

    let states = describe(disabled);
    assert!(!states[0].1);
    assert!(states[1].1);
}

#[test]
fn self_test_restores_original_configuration() {
    let msr = MockMSR::new(2).with_register_on_all(MSR_MISC_FEATURE_CONTROL, 0x2);
    let prefetch = Prefetch::new(&msr);

    let suite = self_test(&prefetch, &mut harness(), 64 * 1024).unwrap();

    assert_eq!(suite.total(), 2);
    assert!(suite.all_passed(), "{suite}");
    assert_eq!(msr.get(core(0), MSR_MISC_FEATURE_CONTROL), 0x2);
    assert_eq!(msr.get(core(1), MSR_MISC_FEATURE_CONTROL), 0x2);
}

#[test]
fn self_test_reports_failed_write() {
    let msr = MockMSR::new(1);
    msr.fail_write(core(0), MSR_MISC_FEATURE_CONTROL);
    let prefetch = Prefetch::new(&msr);

    let suite = self_test(&prefetch, &mut harness(), 64 * 1024).unwrap();

    assert_eq!(suite.passed(), 0);
    assert_eq!(suite.exit_code(), 1);
}

#[test]
fn bench_runs_every_preset_and_restores() {
    let msr = MockMSR::new(1).with_register_on_all(MSR_MISC_FEATURE_CONTROL, 0x8);
    let prefetch = Prefetch::new(&msr);
    let mut bench = PrefetchBench::new(&prefetch, harness(), 64 * 1024, 1);
    let mut rows = 0;

    let results = bench.run(|_| rows += 1).unwrap();

    assert_eq!(rows, PRESETS.len());
    assert_eq!(results.len(), PRESETS.len());
    assert!(results
        .iter()
        .all(|row| row.measurements.len() == BENCH_PATTERNS.len()));
    assert!(results[5].to_string().starts_with("ALL_DISABLED"));
    assert!(results[5].to_string().contains(" ns"));
    assert!(PrefetchBenchRow::header().contains("stride-8"));

    let written = msr
        .writes_to(MSR_MISC_FEATURE_CONTROL)
        .into_iter()
        .map(|(_, value)| value)
        .collect::<Vec<_>>();
    assert!(written.contains(&0xF));
    assert_eq!(msr.get(core(0), MSR_MISC_FEATURE_CONTROL), 0x8);
}

#[test]
fn bench_stops_on_interrupt_and_still_restores() {
    let msr = MockMSR::new(1).with_register_on_all(MSR_MISC_FEATURE_CONTROL, 0x1);
    let prefetch = Prefetch::new(&msr);
    let stop = StopToken::new();
    stop.stop();
    let settings = HarnessSettings {
        settle: Duration::ZERO,
        warmup: false,
    };
    let mut bench = PrefetchBench::new(&prefetch, Harness::new(settings, stop), 64 * 1024, 1);

    let error = bench.run(|_| {}).unwrap_err();

    assert!(matches!(error, KnobError::Interrupted));
    assert_eq!(msr.get(core(0), MSR_MISC_FEATURE_CONTROL), 0x1);
}

const AMD_CPUINFO: &str = "processor\t: 0
vendor_id\t: AuthenticAMD
flags\t\t: fpu msr
";

const INTEL_CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
flags\t\t: fpu msr
";

#[test]
fn support_needs_intel_and_msr() {
    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", AMD_CPUINFO).msr_devices(1);
    let error = check_support(&Probe::new(fake.paths())).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
    assert!(error.to_string().contains("AuthenticAMD"));

    let fake = FakeSysfs::new();
    fake.proc("cpuinfo", INTEL_CPUINFO);
    assert!(check_support(&Probe::new(fake.paths())).is_err());

    fake.msr_devices(1);
    assert!(check_support(&Probe::new(fake.paths())).is_ok());
}
