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

use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use hwk_shared::SysPaths;
use hwk_sysfs::path_exists;
use hwk_sysfs::prefixed_entries;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_string;
use hwk_sysfs::read_value;

use crate::KResult;

const CONTROL_TYPE: &str = "class/powercap/intel-rapl";
const ZONE_PREFIX: &str = "intel-rapl:";

/// One `intel-rapl:*` node of the powercap tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowercapZone {
    pub name: String,
    pub path: PathBuf,
    /// 0 for packages, 1 for their subzones.
    pub depth: usize,
    pub max_energy_range_uj: Option<u64>,
}

impl PowercapZone {
    fn load(path: PathBuf, depth: usize) -> KResult<Self> {
        let name = read_string(path.join("name"))?;
        let max_energy_range_uj = read_optional(path.join("max_energy_range_uj"))?;

        Ok(Self {
            name,
            path,
            depth,
            max_energy_range_uj,
        })
    }

    pub fn energy_uj(&self) -> KResult<u64> {
        let energy = read_value(self.path.join("energy_uj"))?;
        Ok(energy)
    }

    pub fn power_limit_uw(&self) -> KResult<Option<u64>> {
        let limit = read_optional(self.path.join("constraint_0_power_limit_uw"))?;
        Ok(limit)
    }

    pub fn is_package(&self) -> bool {
        self.depth == 0 && self.name.starts_with("package")
    }

    /// Energy between two readings of this zone, the counter wraps at
    /// `max_energy_range_uj`.
    pub fn energy_delta_uj(&self, previous: u64, current: u64) -> u64 {
        energy_delta_uj(previous, current, self.max_energy_range_uj)
    }
}

pub fn energy_delta_uj(previous: u64, current: u64, max_range: Option<u64>) -> u64 {
    match (current >= previous, max_range) {
        (true, _) => current - previous,
        (false, Some(range)) => range.saturating_sub(previous) + current,
        (false, None) => 0,
    }
}

/// Walks the powercap tree depth first, no tree at all is an empty list.
pub fn discover_zones(paths: &SysPaths) -> KResult<Vec<PowercapZone>> {
    let root = paths.sys(CONTROL_TYPE);
    let mut zones = Vec::new();
    if !path_exists(&root) {
        tracing::debug!("no powercap tree at {root:?}");
        return Ok(zones);
    }

    collect_zones(&root, 0, &mut zones)?;
    Ok(zones)
}

fn collect_zones(dir: &Path, depth: usize, zones: &mut Vec<PowercapZone>) -> KResult<()> {
    for path in prefixed_entries(dir, ZONE_PREFIX)? {
        zones.push(PowercapZone::load(path.clone(), depth)?);
        collect_zones(&path, depth + 1, zones)?;
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnergyReading {
    pub at: Instant,
    pub energy_uj: Vec<u64>,
}

/// Package power from the powercap energy counters, shared by the benchmarks.
#[derive(Clone, Debug)]
pub struct PowerMeter {
    packages: Vec<PowercapZone>,
}

impl PowerMeter {
    /// `None` if the machine exposes no package zone.
    pub fn packages(paths: &SysPaths) -> KResult<Option<Self>> {
        let packages = discover_zones(paths)?
            .into_iter()
            .filter(PowercapZone::is_package)
            .collect::<Vec<_>>();

        if packages.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { packages }))
    }

    pub fn zones(&self) -> &[PowercapZone] {
        &self.packages
    }

    pub fn read(&self) -> KResult<EnergyReading> {
        let energy_uj = self
            .packages
            .iter()
            .map(PowercapZone::energy_uj)
            .collect::<KResult<Vec<_>>>()?;

        Ok(EnergyReading {
            at: Instant::now(),
            energy_uj,
        })
    }

    /// Summed power of all packages between two readings, in watts.
    pub fn watts_between(&self, start: &EnergyReading, end: &EnergyReading) -> f64 {
        let seconds = end.at.saturating_duration_since(start.at).as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }

        let microjoules = self
            .packages
            .iter()
            .zip(start.energy_uj.iter().zip(&end.energy_uj))
            .map(|(zone, (&previous, &current))| zone.energy_delta_uj(previous, current))
            .sum::<u64>();
        microjoules as f64 / 1e6 / seconds
    }

    pub fn watts_since(&self, start: &EnergyReading) -> KResult<f64> {
        let end = self.read()?;
        Ok(self.watts_between(start, &end))
    }
}
