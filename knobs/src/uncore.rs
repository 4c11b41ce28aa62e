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

//! Uncore (LLC and memory controller) frequency limits through the
//! `intel_uncore_frequency` driver.

mod domain;

#[cfg(test)]
mod tests;

use std::fmt;
use std::time::Duration;

use hwk_msr::registers::uncore_perf_status;
use hwk_msr::registers::uncore_ratio_limit;
use hwk_msr::registers::MSR_UNCORE_PERF_STATUS;
use hwk_msr::registers::MSR_UNCORE_RATIO_LIMIT;
use hwk_msr::MSRAccess;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;

pub use domain::discover_domains;
pub use domain::UncoreDomain;

use crate::bench::AccessPattern;
use crate::bench::Budget;
use crate::bench::Harness;
use crate::KResult;
use crate::KnobError;
use crate::TestSuite;

const RATIO_KHZ: u64 = 100_000;
const SCALING_SETTLE: Duration = Duration::from_millis(100);

pub fn check_support(paths: &SysPaths, probe: &Probe) -> KResult<()> {
    if !hwk_sysfs::path_exists(domain::driver_root(paths)) {
        return Err(KnobError::not_supported(
            "uncore frequency control",
            "intel_uncore_frequency isn't loaded",
        ));
    }
    if !probe.cpuinfo()?.is_intel() {
        return Err(KnobError::not_supported(
            "uncore frequency control",
            "it's Intel specific",
        ));
    }

    Ok(())
}

/// Ratio limits of `MSR_UNCORE_RATIO_LIMIT`, one ratio step is 100 MHz.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UncoreRatioLimit {
    pub min_ratio: u64,
    pub max_ratio: u64,
}

impl UncoreRatioLimit {
    pub fn decode(raw: u64) -> Self {
        Self {
            min_ratio: uncore_ratio_limit::MIN_RATIO.get(raw),
            max_ratio: uncore_ratio_limit::MAX_RATIO.get(raw),
        }
    }

    pub fn min_khz(&self) -> u64 {
        self.min_ratio * RATIO_KHZ
    }

    pub fn max_khz(&self) -> u64 {
        self.max_ratio * RATIO_KHZ
    }
}

pub fn read_ratio_limit(access: &impl MSRAccess) -> KResult<UncoreRatioLimit> {
    let raw = access.read(LogicalCoreId::new(0), MSR_UNCORE_RATIO_LIMIT)?;
    Ok(UncoreRatioLimit::decode(raw))
}

/// Current uncore frequency as reported by `MSR_UNCORE_PERF_STATUS`.
pub fn read_current_khz(access: &impl MSRAccess) -> KResult<u64> {
    let raw = access.read(LogicalCoreId::new(0), MSR_UNCORE_PERF_STATUS)?;
    Ok(uncore_perf_status::CURRENT_RATIO.get(raw) * RATIO_KHZ)
}

/// Reads every domain, scales the first one to its midpoint and measures
/// bandwidth at the low, middle and high limit. Initial limits are restored.
pub fn self_test(
    domains: &[UncoreDomain],
    harness: &mut Harness,
    buffer_size: usize,
) -> KResult<TestSuite> {
    let first = domains.first().ok_or_else(|| {
        KnobError::not_supported("uncore frequency control", "no uncore domains found")
    })?;
    let mut suite = TestSuite::new("Uncore");

    suite.run("basic functionality", || {
        for domain in domains {
            let limits = domain.limits()?;
            tracing::debug!("{}: {limits}", domain.name());
        }
        Ok(())
    });

    suite.run("frequency scaling", || {
        let limits = first.limits()?;
        let midpoint = limits.min_khz + (limits.max_khz - limits.min_khz) / 2;
        tracing::debug!("scaling {} max to {midpoint} kHz", first.name());

        first.set_max_khz(midpoint)?;
        let settled = harness.stop_token().sleep(SCALING_SETTLE);
        let current = first.current_khz();
        first.set_max_khz(limits.max_khz)?;

        if !settled {
            return Err(KnobError::Interrupted);
        }
        match current? {
            Some(current) => tracing::debug!("current frequency after scaling: {current} kHz"),
            None => tracing::debug!("current frequency isn't exposed"),
        }
        Ok(())
    });

    suite.run("performance impact", || {
        let limits = first.limits()?;
        let points = [
            ("Low", limits.min_khz),
            ("Medium", (limits.min_khz + limits.max_khz) / 2),
            ("High", limits.max_khz),
        ];

        let mut result = Ok(());
        for (name, max_khz) in points {
            let mut workload = AccessPattern::SequentialRead.workload(buffer_size);
            let measurement = harness.run(
                || first.set_max_khz(max_khz),
                workload.as_mut(),
                Budget::Passes(1),
            );
            match measurement {
                Ok(measurement) => tracing::info!(
                    "{name:<9} {:>16.1} MB/s {:>12.2} ns",
                    measurement.scaled_rate(),
                    measurement.latency_ns().unwrap_or_default()
                ),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }

        first.set_max_khz(limits.max_khz)?;
        result
    });

    for domain in domains {
        if let Err(error) = domain.restore() {
            tracing::warn!("failed to restore {}: {error}", domain.name());
        }
    }
    Ok(suite)
}

/// Limits and the current frequency of one domain, in kHz.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UncoreLimits {
    pub min_khz: u64,
    pub max_khz: u64,
    pub current_khz: Option<u64>,
}

impl fmt::Display for UncoreLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min {} kHz, max {} kHz", self.min_khz, self.max_khz)?;
        match self.current_khz {
            Some(current) => write!(f, ", current {current} kHz"),
            None => write!(f, ", current unknown"),
        }
    }
}
