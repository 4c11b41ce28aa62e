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

//! Running Average Power Limit: energy counters and the package PL1 limit
//! through MSRs, plus the powercap tree the kernel builds on top of them.

mod codec;
mod controller;
mod powercap;

#[cfg(test)]
mod tests;

use std::time::Duration;

use hwk_msr::MSRAccess;
use hwk_probe::Feature;
use hwk_probe::Probe;

pub use codec::decode_time_window;
pub use codec::encode_time_window;
pub use codec::energy_delta;
pub use codec::PowerInfo;
pub use codec::PowerLimit;
pub use codec::RaplUnits;
pub use controller::Rapl;
pub use controller::RaplDomain;
pub use controller::RaplInfo;
pub use powercap::discover_zones;
pub use powercap::energy_delta_uj;
pub use powercap::EnergyReading;
pub use powercap::PowerMeter;
pub use powercap::PowercapZone;

use crate::bench::ComputeKind;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;
use crate::TestSuite;

const CAPPING_PERCENT: f64 = 90.0;
const CAPPING_WINDOW: Duration = Duration::from_secs(1);
const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

pub fn check_support(probe: &Probe) -> KResult<()> {
    if !probe.has(Feature::Rapl) {
        return Err(KnobError::not_supported(
            "RAPL",
            "neither the rapl cpu flag nor the intel-rapl powercap tree is present",
        ));
    }
    if !probe.cpuinfo()?.is_intel() {
        return Err(KnobError::not_supported("RAPL", "the MSR layout is Intel specific"));
    }
    if !probe.msr_available() {
        return Err(KnobError::not_supported("RAPL", "the msr device isn't available"));
    }

    Ok(())
}

/// Reads the counters, measures power under load and caps the package to 90%
/// of its current limit for a moment.
pub fn self_test<A: MSRAccess>(rapl: &Rapl<A>, stop: &StopToken) -> KResult<TestSuite> {
    let mut suite = TestSuite::new("RAPL");

    suite.run("basic functionality", || {
        let energy = rapl.read_energy_joules(RaplDomain::Package)?;
        tracing::debug!("package energy: {:.0} uJ", energy * 1e6);
        match rapl.read_energy_joules(RaplDomain::Dram) {
            Ok(energy) => tracing::debug!("DRAM energy: {:.0} uJ", energy * 1e6),
            Err(error) => tracing::debug!("DRAM energy unavailable: {error}"),
        }
        let limit = rapl.read_power_limit()?;
        tracing::debug!("current package limit: {limit}");
        Ok(())
    });

    suite.run("energy monitoring", || {
        let start = rapl.read_energy_raw(RaplDomain::Package)?;
        let mut workload = ComputeKind::CpuIntensive.workload(0);
        workload.pass();
        if !stop.sleep(MONITOR_INTERVAL) {
            return Err(KnobError::Interrupted);
        }
        let end = rapl.read_energy_raw(RaplDomain::Package)?;

        let joules = energy_delta(start, end) as f64 * rapl.units().energy_joules;
        tracing::info!("energy consumed during test: {:.0} uJ", joules * 1e6);
        tracing::info!(
            "average power consumption: {:.2} W",
            joules / MONITOR_INTERVAL.as_secs_f64()
        );
        Ok(())
    });

    suite.run("power capping", || {
        let original = rapl.read_power_limit_raw()?;
        let limit = PowerLimit::decode(original, rapl.units());
        let target = limit.watts * CAPPING_PERCENT / 100.0;
        tracing::debug!("original limit {:.2} W, test limit {target:.2} W", limit.watts);

        let capped = rapl
            .set_power_limit(target, CAPPING_WINDOW)
            .and_then(|_| rapl.read_power_limit());
        stop.sleep(MONITOR_INTERVAL);
        rapl.restore_power_limit(original)?;

        let capped = capped?;
        let tolerance = rapl.units().power_watts;
        if (capped.watts - target).abs() > tolerance {
            return Err(KnobError::verify_failed(
                "package power limit (mW)",
                (target * 1e3) as u64,
                (capped.watts * 1e3) as u64,
            ));
        }
        Ok(())
    });

    Ok(suite)
}
