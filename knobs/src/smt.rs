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

//! Simultaneous multi-threading switch, CPU hotplug and a throughput
//! comparison of physical cores against their sibling threads.

mod bench;
mod control;

#[cfg(test)]
mod tests;

use std::fmt;
use std::time::Duration;

use hwk_probe::Feature;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;

pub use bench::SmtBench;
pub use bench::SmtBenchRow;
pub use bench::BENCH_WORKLOADS;
pub use bench::THREAD_COUNTS;
pub use control::Smt;
pub use control::SmtControl;

use crate::bench::ComputeKind;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;
use crate::TestSuite;

const SWITCH_SETTLE: Duration = Duration::from_millis(500);
const HOTPLUG_PAUSE: Duration = Duration::from_millis(100);
const HOTPLUG_TEST_CPUS: usize = 4;
const STATUS_CPUS: usize = 8;

pub fn check_support(smt: &Smt, probe: &Probe) -> KResult<()> {
    if !smt.has_control() {
        return Err(KnobError::not_supported(
            "SMT control",
            "the kernel has no smt/control attribute",
        ));
    }
    if !probe.has(Feature::HyperThreading) {
        return Err(KnobError::not_supported("SMT control", "the CPU has no ht flag"));
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtStatus {
    pub control: SmtControl,
    pub active: Option<bool>,
    pub hyper_threading: bool,
    pub logical_cores: usize,
    pub physical_cores: usize,
    pub online: Vec<(LogicalCoreId, bool)>,
}

impl Smt {
    pub fn status(&self, probe: &Probe) -> KResult<SmtStatus> {
        let control = self.control()?;
        let active = match control {
            SmtControl::NotSupported | SmtControl::NotImplemented => None,
            _ => self.active().ok(),
        };
        let topology = self.topology()?;

        let online = LogicalCoreId::range(STATUS_CPUS)
            .filter(|&core_id| hwk_sysfs::path_exists(self.paths().cpu_dir(core_id)))
            .map(|core_id| Ok((core_id, self.is_online(core_id)?)))
            .collect::<KResult<Vec<_>>>()?;

        Ok(SmtStatus {
            control,
            active,
            hyper_threading: probe.has(Feature::HyperThreading),
            logical_cores: topology.logical_cores_count(),
            physical_cores: topology.physical_cores_count(),
            online,
        })
    }
}

/// Switches SMT off and back on, compares sibling throughput and hotplugs a
/// few CPUs. Everything is put back the way it was.
pub fn self_test(smt: &Smt, bench: &SmtBench, stop: &StopToken) -> KResult<TestSuite> {
    let mut suite = TestSuite::new("SMT");

    suite.run("basic functionality", || {
        let original = smt.control()?;
        if !original.is_settable() {
            return Err(KnobError::not_supported(
                "SMT control",
                format!("the kernel reports '{original}'"),
            ));
        }
        tracing::debug!("original SMT state {original}, active {:?}", smt.active().ok());

        if original != SmtControl::On {
            return Ok(());
        }
        if let Err(error) = smt.set_control(SmtControl::Off) {
            tracing::info!("SMT state change not permitted: {error}");
            return Ok(());
        }

        stop.sleep(SWITCH_SETTLE);
        tracing::debug!(
            "after disable: state {}, active {:?}",
            smt.control()?,
            smt.active().ok()
        );
        smt.set_control(original)?;
        stop.sleep(SWITCH_SETTLE);
        Ok(())
    });

    suite.run("performance impact", || {
        tracing::info!("{}", SmtBenchRow::header());
        for threads in bench.thread_counts() {
            let primary_only = bench.measure(ComputeKind::CpuIntensive, threads, false)?;
            let with_siblings = bench.measure(ComputeKind::CpuIntensive, threads, true)?;
            let row = SmtBenchRow {
                workload: ComputeKind::CpuIntensive,
                threads,
                primary_only,
                with_siblings: Some(with_siblings),
            };
            tracing::info!("{row}");
        }
        Ok(())
    });

    suite.run("dynamic control", || {
        let topology = smt.topology()?;
        let last = topology.logical_cores_count().min(HOTPLUG_TEST_CPUS);

        for core_id in (1..last as u32).map(LogicalCoreId::new) {
            if !smt.is_online(core_id)? {
                continue;
            }

            let offline_latency = match smt.set_online(core_id, false) {
                Ok(latency) => latency,
                Err(error) => {
                    tracing::debug!("logical CPU {core_id} can't be offlined: {error}");
                    continue;
                }
            };
            stop.sleep(HOTPLUG_PAUSE);
            let online_latency = smt.set_online(core_id, true)?;
            tracing::info!(
                "logical CPU {core_id} offline {} us, online {} us",
                offline_latency.as_micros(),
                online_latency.as_micros()
            );

            if !stop.sleep(HOTPLUG_PAUSE) {
                return Err(KnobError::Interrupted);
            }
        }
        Ok(())
    });

    Ok(suite)
}

impl fmt::Display for SmtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SMT control: {}", self.control)?;
        match self.active {
            Some(active) => writeln!(f, "SMT active: {}", if active { "yes" } else { "no" })?,
            None => writeln!(f, "SMT active: unknown")?,
        }
        writeln!(
            f,
            "Hyper-Threading: {}",
            if self.hyper_threading { "supported" } else { "not supported" }
        )?;
        writeln!(
            f,
            "Cores: {} logical, {} physical",
            self.logical_cores, self.physical_cores
        )?;
        write!(f, "CPU online status:")?;
        for (core_id, online) in &self.online {
            write!(f, "\n  CPU {core_id}: {}", if *online { "online" } else { "offline" })?;
        }
        Ok(())
    }
}
