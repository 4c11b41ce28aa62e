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

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use hwk_msr::registers::energy_status;
use hwk_msr::registers::MSR_DRAM_ENERGY_STATUS;
use hwk_msr::registers::MSR_PKG_ENERGY_STATUS;
use hwk_msr::registers::MSR_PKG_POWER_INFO;
use hwk_msr::registers::MSR_PKG_POWER_LIMIT;
use hwk_msr::registers::MSR_PP0_ENERGY_STATUS;
use hwk_msr::registers::MSR_PP1_ENERGY_STATUS;
use hwk_msr::registers::MSR_RAPL_POWER_UNIT;
use hwk_msr::MSRAccess;
use hwk_shared::types::LogicalCoreId;

use super::codec::energy_delta;
use super::codec::PowerInfo;
use super::codec::PowerLimit;
use super::codec::RaplUnits;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RaplDomain {
    Package,
    Dram,
    /// Cores.
    Pp0,
    /// Uncore, usually the integrated GPU.
    Pp1,
}

impl RaplDomain {
    pub const ALL: [RaplDomain; 4] = [
        RaplDomain::Package,
        RaplDomain::Dram,
        RaplDomain::Pp0,
        RaplDomain::Pp1,
    ];

    pub fn energy_register(self) -> u32 {
        match self {
            RaplDomain::Package => MSR_PKG_ENERGY_STATUS,
            RaplDomain::Dram => MSR_DRAM_ENERGY_STATUS,
            RaplDomain::Pp0 => MSR_PP0_ENERGY_STATUS,
            RaplDomain::Pp1 => MSR_PP1_ENERGY_STATUS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RaplDomain::Package => "PKG",
            RaplDomain::Dram => "DRAM",
            RaplDomain::Pp0 => "PP0",
            RaplDomain::Pp1 => "PP1",
        }
    }
}

/// Package scoped RAPL registers, accessed through logical CPU 0.
#[derive(Debug)]
pub struct Rapl<A> {
    access: A,
    units: RaplUnits,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RaplInfo {
    pub units: RaplUnits,
    pub energy_joules: Vec<(RaplDomain, Option<f64>)>,
    pub power_limit: Option<PowerLimit>,
    pub power_info: Option<PowerInfo>,
}

impl<A: MSRAccess> Rapl<A> {
    /// Reads the register units, every later conversion uses them.
    pub fn new(access: A) -> KResult<Self> {
        let raw = access.read(package_core(), MSR_RAPL_POWER_UNIT)?;
        let units = RaplUnits::decode(raw);
        tracing::debug!("RAPL units raw {raw:#X}: {units}");

        Ok(Self { access, units })
    }

    pub fn units(&self) -> &RaplUnits {
        &self.units
    }

    pub fn read_energy_raw(&self, domain: RaplDomain) -> KResult<u32> {
        let raw = self
            .access
            .read(package_core(), domain.energy_register())?;
        Ok(energy_status::TOTAL_ENERGY.get(raw) as u32)
    }

    pub fn read_energy_joules(&self, domain: RaplDomain) -> KResult<f64> {
        let raw = self.read_energy_raw(domain)?;
        Ok(raw as f64 * self.units.energy_joules)
    }

    pub fn read_power_limit_raw(&self) -> KResult<u64> {
        let raw = self.access.read(package_core(), MSR_PKG_POWER_LIMIT)?;
        Ok(raw)
    }

    pub fn read_power_limit(&self) -> KResult<PowerLimit> {
        let raw = self.read_power_limit_raw()?;
        Ok(PowerLimit::decode(raw, &self.units))
    }

    pub fn read_power_info(&self) -> KResult<PowerInfo> {
        let raw = self.access.read(package_core(), MSR_PKG_POWER_INFO)?;
        Ok(PowerInfo::decode(raw, &self.units))
    }

    /// Enables PL1 at `watts` averaged over `time_window`.
    pub fn set_power_limit(&self, watts: f64, time_window: Duration) -> KResult<()> {
        let raw = self.read_power_limit_raw()?;
        let current = PowerLimit::decode(raw, &self.units);
        if current.locked {
            return Err(KnobError::not_supported(
                "package power limit",
                "the register is locked until the next reset",
            ));
        }

        let limit = PowerLimit {
            watts,
            enabled: true,
            time_window,
            ..current
        };
        let value = limit.encode(raw, &self.units)?;
        self.access
            .write(package_core(), MSR_PKG_POWER_LIMIT, value)?;
        tracing::info!("package power limit set to {limit}");

        Ok(())
    }

    /// Writes back a raw value taken by [`Rapl::read_power_limit_raw`].
    pub fn restore_power_limit(&self, raw: u64) -> KResult<()> {
        self.access.write(package_core(), MSR_PKG_POWER_LIMIT, raw)?;
        tracing::debug!("package power limit restored to {raw:#X}");
        Ok(())
    }

    /// Average power of `domain` over `interval`, in watts.
    pub fn measure_power(
        &self,
        domain: RaplDomain,
        interval: Duration,
        stop: &StopToken,
    ) -> KResult<f64> {
        let start_energy = self.read_energy_raw(domain)?;
        let start = Instant::now();
        if !stop.sleep(interval) {
            return Err(KnobError::Interrupted);
        }
        let end_energy = self.read_energy_raw(domain)?;
        let elapsed = start.elapsed().as_secs_f64();

        let joules = energy_delta(start_energy, end_energy) as f64 * self.units.energy_joules;
        Ok(joules / elapsed)
    }

    /// Everything readable, a domain the CPU lacks is reported as `None`.
    pub fn info(&self) -> RaplInfo {
        let energy_joules = RaplDomain::ALL
            .into_iter()
            .map(|domain| {
                let energy = self
                    .read_energy_joules(domain)
                    .map_err(|error| tracing::debug!("{} energy: {error}", domain.name()))
                    .ok();
                (domain, energy)
            })
            .collect();

        RaplInfo {
            units: self.units,
            energy_joules,
            power_limit: self.read_power_limit().ok(),
            power_info: self.read_power_info().ok(),
        }
    }
}

fn package_core() -> LogicalCoreId {
    LogicalCoreId::new(0)
}

impl fmt::Display for RaplDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl fmt::Display for RaplInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RAPL Information:")?;
        writeln!(f, "  {}", self.units)?;
        for (domain, energy) in &self.energy_joules {
            match energy {
                Some(joules) => writeln!(f, "  {domain:<5} energy: {:.0} uJ", joules * 1e6)?,
                None => writeln!(f, "  {domain:<5} energy: unavailable")?,
            }
        }
        if let Some(info) = &self.power_info {
            writeln!(
                f,
                "  TDP {:.2} W, min {:.2} W, max {:.2} W",
                info.thermal_spec_watts, info.min_watts, info.max_watts
            )?;
        }
        match &self.power_limit {
            Some(limit) => write!(f, "  {limit}"),
            None => write!(f, "  power limit unavailable"),
        }
    }
}
