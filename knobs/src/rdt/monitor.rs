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

use hwk_msr::bitfield::field_mask;
use hwk_msr::registers::qm_ctr;
use hwk_msr::registers::qm_evtsel;
use hwk_msr::registers::IA32_QM_CTR;
use hwk_msr::registers::IA32_QM_EVTSEL;
use hwk_msr::MSRAccess;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::types::Rmid;

use super::controller::Rdt;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

/// Bandwidth counters are only this wide and wrap around.
pub const MBM_COUNTER_WIDTH: u32 = 24;

#[cfg(not(target_arch = "x86_64"))]
const DEFAULT_CONVERSION_FACTOR: u64 = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    LlcOccupancy,
    MbmTotal,
    MbmLocal,
}

/// Raw counter values in hardware units, `None` where the event isn't
/// supported or has no data yet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorReading {
    pub llc_occupancy: Option<u64>,
    pub mbm_total: Option<u64>,
    pub mbm_local: Option<u64>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MonitorSample {
    pub elapsed: Duration,
    pub rmid: Rmid,
    pub llc_occupancy_bytes: Option<u64>,
    pub mbm_total_bytes_per_sec: Option<f64>,
    pub mbm_local_bytes_per_sec: Option<f64>,
}

/// Periodically samples the occupancy and bandwidth counters of one RMID.
#[derive(Debug)]
pub struct RdtMonitor<'rdt, A> {
    rdt: &'rdt Rdt<A>,
    core_id: LogicalCoreId,
    rmid: Rmid,
    interval: Duration,
    conversion_factor: u64,
}

impl MonitorEvent {
    pub fn id(self) -> u64 {
        match self {
            MonitorEvent::LlcOccupancy => 1,
            MonitorEvent::MbmTotal => 2,
            MonitorEvent::MbmLocal => 3,
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::LlcOccupancy => write!(f, "LLC occupancy"),
            MonitorEvent::MbmTotal => write!(f, "total memory bandwidth"),
            MonitorEvent::MbmLocal => write!(f, "local memory bandwidth"),
        }
    }
}

/// Bytes per counter unit, reported by CPUID leaf 0xF.
pub fn conversion_factor() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        hwk_probe::cpuid::conversion_factor()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        DEFAULT_CONVERSION_FACTOR
    }
}

/// Difference between two bandwidth counter values, taking a wrap into account.
pub fn mbm_delta(previous: u64, current: u64) -> u64 {
    current.wrapping_sub(previous) & field_mask(MBM_COUNTER_WIDTH)
}

impl<A: MSRAccess> Rdt<A> {
    /// Selects `event` for `rmid` on `core_id` and reads the counter.
    ///
    /// Returns `None` when the hardware has no data for the event yet.
    pub fn read_event(
        &self,
        core_id: LogicalCoreId,
        rmid: Rmid,
        event: MonitorEvent,
    ) -> KResult<Option<u64>> {
        let select = qm_evtsel::EVENT_ID.set(qm_evtsel::RMID.set(0, rmid.get() as u64), event.id());

        let counter = {
            let _guard = self.qm_lock.lock();
            self.access().write(core_id, IA32_QM_EVTSEL, select)?;
            self.access().read(core_id, IA32_QM_CTR)?
        };

        if qm_ctr::ERROR.is_set(counter) {
            return Err(KnobError::not_supported(
                event.to_string(),
                format!("the counter reports an error for RMID {rmid}"),
            ));
        }
        if qm_ctr::UNAVAILABLE.is_set(counter) {
            tracing::debug!("{event} for RMID {rmid} is unavailable");
            return Ok(None);
        }

        Ok(Some(qm_ctr::DATA.get(counter)))
    }
}

impl<'rdt, A: MSRAccess> RdtMonitor<'rdt, A> {
    pub fn new(
        rdt: &'rdt Rdt<A>,
        core_id: LogicalCoreId,
        rmid: Rmid,
        interval: Duration,
    ) -> KResult<Self> {
        rdt.features().require_monitoring()?;

        Ok(Self {
            rdt,
            core_id,
            rmid,
            interval,
            conversion_factor: conversion_factor(),
        })
    }

    pub fn with_conversion_factor(mut self, conversion_factor: u64) -> Self {
        self.conversion_factor = conversion_factor.max(1);
        self
    }

    /// Reads every supported event once.
    pub fn read(&self) -> KResult<MonitorReading> {
        let features = self.rdt.features();
        let read_if = |supported: bool, event| -> KResult<Option<u64>> {
            if !supported {
                return Ok(None);
            }
            self.rdt.read_event(self.core_id, self.rmid, event)
        };

        Ok(MonitorReading {
            llc_occupancy: read_if(features.occupancy, MonitorEvent::LlcOccupancy)?,
            mbm_total: read_if(features.mbm_total, MonitorEvent::MbmTotal)?,
            mbm_local: read_if(features.mbm_local, MonitorEvent::MbmLocal)?,
        })
    }

    /// Turns two consecutive readings `interval` apart into byte values and rates.
    pub fn sample(
        &self,
        previous: &MonitorReading,
        current: &MonitorReading,
        interval: Duration,
        elapsed: Duration,
    ) -> MonitorSample {
        let seconds = interval.as_secs_f64();
        let rate = |previous: Option<u64>, current: Option<u64>| {
            let delta = mbm_delta(previous?, current?);
            if seconds <= 0.0 {
                return None;
            }
            Some((delta * self.conversion_factor) as f64 / seconds)
        };

        MonitorSample {
            elapsed,
            rmid: self.rmid,
            llc_occupancy_bytes: current
                .llc_occupancy
                .map(|occupancy| occupancy * self.conversion_factor),
            mbm_total_bytes_per_sec: rate(previous.mbm_total, current.mbm_total),
            mbm_local_bytes_per_sec: rate(previous.mbm_local, current.mbm_local),
        }
    }

    /// Samples every interval until `duration` passes or a stop is requested.
    /// Returns the number of samples handed to `on_sample`.
    pub fn run(
        &self,
        duration: Duration,
        stop: &StopToken,
        mut on_sample: impl FnMut(&MonitorSample),
    ) -> KResult<usize> {
        let start = Instant::now();
        let mut previous = self.read()?;
        let mut previous_at = Instant::now();
        let mut samples = 0;

        while start.elapsed() < duration {
            if !stop.sleep(self.interval) {
                tracing::info!("monitoring stopped after {samples} samples");
                break;
            }

            let current = self.read()?;
            let now = Instant::now();
            let sample = self.sample(&previous, &current, now - previous_at, now - start);
            on_sample(&sample);
            samples += 1;

            previous = current;
            previous_at = now;
        }

        Ok(samples)
    }
}

impl fmt::Display for MonitorSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mib_per_sec =
            |rate: Option<f64>| rate.map_or("n/a".to_string(), |rate| format!("{:.1}", rate / 1048576.0));

        write!(
            f,
            "{:7.1}  {:4}  {:>10} KB  {:>10} MB/s  {:>10} MB/s",
            self.elapsed.as_secs_f64(),
            self.rmid,
            self.llc_occupancy_bytes
                .map_or("n/a".to_string(), |bytes| (bytes / 1024).to_string()),
            mib_per_sec(self.mbm_total_bytes_per_sec),
            mib_per_sec(self.mbm_local_bytes_per_sec),
        )
    }
}
