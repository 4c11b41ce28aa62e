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

//! Hardware prefetcher control through the four disable bits of
//! `MSR_MISC_FEATURE_CONTROL` (0x1A4).

mod bench;

#[cfg(test)]
mod tests;

use std::fmt;

use bitflags::bitflags;

use hwk_msr::broadcast_cores;
use hwk_msr::modify_all_cpus;
use hwk_msr::read_all_cpus;
use hwk_msr::registers::misc_feature_control;
use hwk_msr::registers::MSR_MISC_FEATURE_CONTROL;
use hwk_msr::MSRAccess;
use hwk_msr::MSRItem;
use hwk_msr::MSRSnapshot;
use hwk_msr::ALL_CPUS;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;

pub use bench::PrefetchBench;
pub use bench::PrefetchBenchRow;
pub use bench::BENCH_PATTERNS;

use crate::bench::AccessPattern;
use crate::bench::Budget;
use crate::bench::Harness;
use crate::KResult;
use crate::KnobError;
use crate::TestSuite;

bitflags! {
    /// A set bit turns the corresponding prefetcher off.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PrefetchDisable: u64 {
        const L2_STREAM = misc_feature_control::L2_HW_PREFETCHER_DISABLE.mask();
        const L2_ADJACENT = misc_feature_control::L2_ADJACENT_PREFETCHER_DISABLE.mask();
        const DCU_STREAM = misc_feature_control::DCU_HW_PREFETCHER_DISABLE.mask();
        const DCU_IP = misc_feature_control::DCU_IP_PREFETCHER_DISABLE.mask();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrefetchPreset {
    pub name: &'static str,
    pub disable: PrefetchDisable,
    pub description: &'static str,
}

pub const PRESETS: [PrefetchPreset; 6] = [
    PrefetchPreset {
        name: "ALL_ENABLED",
        disable: PrefetchDisable::empty(),
        description: "All prefetchers enabled",
    },
    PrefetchPreset {
        name: "L2_STREAM_HW_DISABLED",
        disable: PrefetchDisable::L2_STREAM,
        description: "L2 stream hardware prefetcher disabled",
    },
    PrefetchPreset {
        name: "L2_STREAM_ADJ_DISABLED",
        disable: PrefetchDisable::L2_ADJACENT,
        description: "L2 stream adjacent prefetcher disabled",
    },
    PrefetchPreset {
        name: "DCU_STREAM_DISABLED",
        disable: PrefetchDisable::DCU_STREAM,
        description: "DCU stream prefetcher disabled",
    },
    PrefetchPreset {
        name: "DCU_IP_DISABLED",
        disable: PrefetchDisable::DCU_IP,
        description: "DCU IP prefetcher disabled",
    },
    PrefetchPreset {
        name: "ALL_DISABLED",
        disable: PrefetchDisable::all(),
        description: "All prefetchers disabled",
    },
];

/// Looks a preset up by name, ignoring case.
pub fn preset(name: &str) -> Option<&'static PrefetchPreset> {
    PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

/// Prefetcher control is Intel specific and goes through the MSR driver.
pub fn check_support(probe: &Probe) -> KResult<()> {
    let cpuinfo = probe.cpuinfo()?;
    if !cpuinfo.is_intel() {
        return Err(KnobError::not_supported(
            "prefetcher control",
            format!("it's Intel specific, the CPU vendor is {}", cpuinfo.vendor()),
        ));
    }
    if !probe.msr_available() {
        return Err(KnobError::not_supported(
            "prefetcher control",
            "the msr device isn't available",
        ));
    }

    Ok(())
}

#[derive(Debug)]
pub struct Prefetch<A> {
    access: A,
}

impl<A: MSRAccess> Prefetch<A> {
    pub fn new(access: A) -> Self {
        Self { access }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    /// Disabled prefetchers as seen by logical CPU 0.
    pub fn read(&self) -> KResult<PrefetchDisable> {
        let value = self
            .access
            .read(LogicalCoreId::new(0), MSR_MISC_FEATURE_CONTROL)?;
        Ok(decode(value))
    }

    pub fn read_all(&self) -> KResult<Vec<PrefetchDisable>> {
        let values = read_all_cpus(&self.access, MSR_MISC_FEATURE_CONTROL, ALL_CPUS)?;
        Ok(values.into_iter().map(decode).collect())
    }

    /// Sets the disable bits on every CPU, the other bits of the register are kept.
    pub fn apply(&self, disable: PrefetchDisable) -> KResult<()> {
        let item = MSRItem::with_field(
            MSR_MISC_FEATURE_CONTROL,
            misc_feature_control::PREFETCHERS,
            disable.bits(),
        );
        modify_all_cpus(&self.access, item, ALL_CPUS)?;
        tracing::info!("prefetchers disabled: {disable}");

        Ok(())
    }

    /// Same as [`Prefetch::apply`], then reads CPU 0 back.
    pub fn apply_verified(&self, disable: PrefetchDisable) -> KResult<()> {
        self.apply(disable)?;

        let read_back = self.read()?;
        if read_back != disable {
            return Err(KnobError::verify_failed(
                "prefetch disable bits",
                disable.bits(),
                read_back.bits(),
            ));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> KResult<MSRSnapshot> {
        let snapshot = MSRSnapshot::capture(
            &self.access,
            &[MSR_MISC_FEATURE_CONTROL],
            broadcast_cores(&self.access, ALL_CPUS),
        )?;
        Ok(snapshot)
    }

    pub fn restore(&self, snapshot: &MSRSnapshot) -> KResult<()> {
        snapshot.restore(&self.access)?;
        tracing::info!("prefetch configuration restored");
        Ok(())
    }
}

fn decode(value: u64) -> PrefetchDisable {
    PrefetchDisable::from_bits_truncate(misc_feature_control::PREFETCHERS.get(value))
}

/// Write/readback of every preset, then a short bandwidth comparison.
/// The original register values are restored afterwards.
pub fn self_test<A: MSRAccess>(
    prefetch: &Prefetch<A>,
    harness: &mut Harness,
    buffer_size: usize,
) -> KResult<TestSuite> {
    let snapshot = prefetch.snapshot()?;
    let mut suite = TestSuite::new("Prefetch");

    suite.run("basic functionality", || {
        for preset in &PRESETS {
            tracing::debug!("testing preset {}", preset.name);
            prefetch.apply_verified(preset.disable)?;
        }
        Ok(())
    });

    suite.run("performance impact", || {
        let patterns = [
            AccessPattern::SequentialRead,
            AccessPattern::RandomRead,
            AccessPattern::StrideRead(8),
        ];
        for preset in &PRESETS {
            let mut rates = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let mut workload = pattern.workload(buffer_size);
                let measurement = harness.run(
                    || prefetch.apply(preset.disable),
                    workload.as_mut(),
                    Budget::Passes(1),
                )?;
                rates.push(format!("{:>10.1}", measurement.scaled_rate()));
            }
            tracing::info!("{:<28} {} MB/s", preset.name, rates.join(" "));
        }
        Ok(())
    });

    if let Err(error) = prefetch.restore(&snapshot) {
        tracing::warn!("failed to restore the original prefetch configuration: {error}");
    }
    Ok(suite)
}

impl fmt::Display for PrefetchDisable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let names = self
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect::<Vec<_>>();
        write!(f, "{}", names.join(", "))
    }
}

/// Per-prefetcher state, for `prefetch show`.
pub fn describe(disable: PrefetchDisable) -> Vec<(&'static str, bool)> {
    vec![
        ("L2 hardware prefetcher", !disable.contains(PrefetchDisable::L2_STREAM)),
        ("L2 adjacent cache line prefetcher", !disable.contains(PrefetchDisable::L2_ADJACENT)),
        ("DCU streamer prefetcher", !disable.contains(PrefetchDisable::DCU_STREAM)),
        ("DCU IP prefetcher", !disable.contains(PrefetchDisable::DCU_IP)),
    ]
}
