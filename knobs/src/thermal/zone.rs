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
use std::path::Path;
use std::path::PathBuf;

use hwk_shared::SysPaths;
use hwk_sysfs::numbered_entries;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_value;
use hwk_sysfs::write_value;

use crate::KResult;
use crate::KnobError;

pub(super) fn thermal_root(paths: &SysPaths) -> PathBuf {
    paths.sys("class/thermal")
}

fn millicelsius(value: i64) -> f64 {
    value as f64 / 1000.0
}

#[derive(Clone, Debug, PartialEq)]
pub struct TripPoint {
    pub index: u32,
    pub kind: String,
    pub celsius: f64,
}

/// One `thermal_zoneN` sensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThermalZone {
    pub id: u32,
    pub kind: String,
    pub path: PathBuf,
}

/// One `cooling_deviceN` actuator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoolingDevice {
    pub id: u32,
    pub kind: String,
    pub path: PathBuf,
}

fn read_kind(path: &Path) -> KResult<String> {
    Ok(read_optional(path.join("type"))?.unwrap_or_default())
}

/// Zones ordered by id, no thermal class is an empty list.
pub fn discover_zones(paths: &SysPaths) -> KResult<Vec<ThermalZone>> {
    let root = thermal_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Ok(Vec::new());
    }

    numbered_entries(&root, "thermal_zone")?
        .into_iter()
        .map(|(id, path)| {
            Ok(ThermalZone {
                id,
                kind: read_kind(&path)?,
                path,
            })
        })
        .collect()
}

pub fn discover_cooling_devices(paths: &SysPaths) -> KResult<Vec<CoolingDevice>> {
    let root = thermal_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Ok(Vec::new());
    }

    numbered_entries(&root, "cooling_device")?
        .into_iter()
        .map(|(id, path)| {
            Ok(CoolingDevice {
                id,
                kind: read_kind(&path)?,
                path,
            })
        })
        .collect()
}

impl ThermalZone {
    pub fn celsius(&self) -> KResult<f64> {
        let millicelsius_value = read_value::<i64>(self.path.join("temp"))?;
        Ok(millicelsius(millicelsius_value))
    }

    pub fn is_cpu(&self) -> bool {
        self.kind.contains("cpu") || self.kind.contains("x86_pkg_temp")
    }

    /// Trip points up to the first missing `trip_point_N_temp`.
    pub fn trip_points(&self) -> KResult<Vec<TripPoint>> {
        let mut trips = Vec::new();
        for index in 0.. {
            let temp = self.path.join(format!("trip_point_{index}_temp"));
            let Some(value) = read_optional::<i64>(temp)? else {
                break;
            };

            let kind = read_optional(self.path.join(format!("trip_point_{index}_type")))?
                .unwrap_or_default();
            trips.push(TripPoint {
                index,
                kind,
                celsius: millicelsius(value),
            });
        }
        Ok(trips)
    }

    pub fn status(&self) -> KResult<ZoneStatus> {
        let celsius = self
            .celsius()
            .map_err(|error| tracing::debug!("thermal_zone{}: {error}", self.id))
            .ok();

        Ok(ZoneStatus {
            id: self.id,
            kind: self.kind.clone(),
            celsius,
            trips: self.trip_points()?,
        })
    }
}

/// The CPU package temperature: the first zone of a CPU type, otherwise the
/// hottest readable zone. `None` when nothing can be read.
pub fn cpu_celsius(zones: &[ThermalZone]) -> Option<f64> {
    let readings = zones
        .iter()
        .filter_map(|zone| Some((zone, zone.celsius().ok()?)))
        .collect::<Vec<_>>();

    readings
        .iter()
        .find(|(zone, _)| zone.is_cpu())
        .map(|(_, celsius)| *celsius)
        .or_else(|| {
            readings
                .iter()
                .map(|(_, celsius)| *celsius)
                .max_by(f64::total_cmp)
        })
}

impl CoolingDevice {
    pub fn cur_state(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("cur_state"))?)
    }

    pub fn max_state(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("max_state"))?)
    }

    pub fn set_state(&self, state: u64) -> KResult<()> {
        let max_state = self.max_state()?;
        if state > max_state {
            return Err(KnobError::invalid_param(
                "cooling state",
                format!("{state} is above max state {max_state} of cooling_device{}", self.id),
            ));
        }

        write_value(self.path.join("cur_state"), state)?;
        tracing::info!("cooling_device{} ({}) set to state {state}", self.id, self.kind);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZoneStatus {
    pub id: u32,
    pub kind: String,
    pub celsius: Option<f64>,
    pub trips: Vec<TripPoint>,
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone {:<3} {:<20}", self.id, self.kind)?;
        match self.celsius {
            Some(celsius) => write!(f, " {celsius:>6.1} C")?,
            None => write!(f, " {:>6} C", "n/a")?,
        }
        for trip in &self.trips {
            write!(f, " {}:{:.0}C", trip.kind, trip.celsius)?;
        }
        Ok(())
    }
}

impl fmt::Display for CoolingDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |value: KResult<u64>| value.map_or("?".to_string(), |value| value.to_string());
        write!(
            f,
            "cooling_device{:<3} {:<24} state {}/{}",
            self.id,
            self.kind,
            state(self.cur_state()),
            state(self.max_state())
        )
    }
}

