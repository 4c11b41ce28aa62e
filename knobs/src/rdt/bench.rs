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

use itertools::Itertools;

use hwk_msr::MSRAccess;
use hwk_shared::types::ClosId;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::types::Rmid;

use super::controller::Rdt;
use super::monitor::MonitorSample;
use super::monitor::RdtMonitor;
use crate::bench::aggregate_rate;
use crate::bench::AccessPattern;
use crate::bench::ComputeKind;
use crate::bench::WorkerPool;
use crate::bench::WorkerReport;
use crate::bench::Workload;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RdtWorkload {
    CacheIntensive,
    MemoryIntensive,
    Mixed,
    PointerChase,
    StreamCopy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RdtBenchConfig {
    pub name: &'static str,
    pub l3_mask: u64,
    /// Percent, 0 leaves bandwidth unthrottled.
    pub throttle: u8,
    pub threads: usize,
    pub workload: RdtWorkload,
}

pub const BENCH_CONFIGS: [RdtBenchConfig; 8] = [
    RdtBenchConfig {
        name: "Baseline - No RDT Control",
        l3_mask: 0xFFFF,
        throttle: 0,
        threads: 4,
        workload: RdtWorkload::CacheIntensive,
    },
    RdtBenchConfig {
        name: "Cache Isolation - High Priority",
        l3_mask: 0xFF00,
        throttle: 0,
        threads: 2,
        workload: RdtWorkload::CacheIntensive,
    },
    RdtBenchConfig {
        name: "Cache Isolation - Low Priority",
        l3_mask: 0x00FF,
        throttle: 0,
        threads: 2,
        workload: RdtWorkload::CacheIntensive,
    },
    RdtBenchConfig {
        name: "Memory Bandwidth Throttling - 50%",
        l3_mask: 0xFFFF,
        throttle: 50,
        threads: 4,
        workload: RdtWorkload::MemoryIntensive,
    },
    RdtBenchConfig {
        name: "Memory Bandwidth Throttling - 25%",
        l3_mask: 0xFFFF,
        throttle: 25,
        threads: 4,
        workload: RdtWorkload::MemoryIntensive,
    },
    RdtBenchConfig {
        name: "Mixed Workload - Balanced",
        l3_mask: 0xFFFF,
        throttle: 0,
        threads: 8,
        workload: RdtWorkload::Mixed,
    },
    RdtBenchConfig {
        name: "Pointer Chase - Cache Sensitive",
        l3_mask: 0xF000,
        throttle: 0,
        threads: 2,
        workload: RdtWorkload::PointerChase,
    },
    RdtBenchConfig {
        name: "Stream Copy - Bandwidth Sensitive",
        l3_mask: 0xFFFF,
        throttle: 75,
        threads: 4,
        workload: RdtWorkload::StreamCopy,
    },
];

#[derive(Clone, Debug)]
pub struct RdtBenchResult {
    pub config: RdtBenchConfig,
    pub clos: ClosId,
    pub workers: Vec<WorkerReport>,
    pub samples: Vec<MonitorSample>,
}

/// Runs workloads on a dedicated class of service, one configuration at a time.
pub struct RdtBench<'rdt, A> {
    rdt: &'rdt Rdt<A>,
    settings: hwk_config::RdtBench,
    cores: Vec<LogicalCoreId>,
    stop: StopToken,
}

impl RdtWorkload {
    pub fn name(self) -> &'static str {
        match self {
            RdtWorkload::CacheIntensive => "Cache Intensive",
            RdtWorkload::MemoryIntensive => "Memory Intensive",
            RdtWorkload::Mixed => "Mixed Workload",
            RdtWorkload::PointerChase => "Pointer Chase",
            RdtWorkload::StreamCopy => "Stream Copy",
        }
    }

    pub fn workload(self, buffer_size: usize) -> Box<dyn Workload> {
        match self {
            RdtWorkload::CacheIntensive => ComputeKind::CacheIntensive.workload(buffer_size),
            RdtWorkload::MemoryIntensive => ComputeKind::MemoryIntensive.workload(buffer_size),
            RdtWorkload::Mixed => ComputeKind::Mixed.workload(buffer_size),
            RdtWorkload::PointerChase => AccessPattern::PointerChase.workload(buffer_size),
            RdtWorkload::StreamCopy => AccessPattern::StreamCopy.workload(buffer_size),
        }
    }
}

impl<'rdt, A: MSRAccess> RdtBench<'rdt, A> {
    /// Workers are pinned to `cores` round-robin.
    pub fn new(
        rdt: &'rdt Rdt<A>,
        settings: hwk_config::RdtBench,
        cores: Vec<LogicalCoreId>,
        stop: StopToken,
    ) -> KResult<Self> {
        rdt.features().require_allocation()?;
        if cores.is_empty() {
            return Err(KnobError::invalid_param("cores", "no logical cores to run on"));
        }

        Ok(Self {
            rdt,
            settings,
            cores,
            stop,
        })
    }

    pub fn run_config(&self, config: &RdtBenchConfig) -> KResult<RdtBenchResult> {
        let clos = self.settings.clos;
        tracing::info!("=== {} ===", config.name);
        self.rdt
            .configure_clos(clos, config.l3_mask, Some(config.throttle))?;
        if config.throttle == 0 {
            self.rdt.clear_throttle(clos)?;
        }

        let worker_cores = self
            .cores
            .iter()
            .copied()
            .cycle()
            .take(config.threads)
            .collect::<Vec<_>>();
        for &core_id in worker_cores.iter().unique() {
            self.rdt.assign_cpu_to_clos(core_id, clos)?;
        }

        let monitor = worker_cores
            .first()
            .and_then(|&core_id| self.monitor(core_id));
        let mut samples = Vec::new();
        let mut previous = monitor.as_ref().and_then(|monitor| monitor.read().ok());
        let mut previous_elapsed = Duration::ZERO;

        let pool = WorkerPool::new(worker_cores)?;
        let buffer_size = self.settings.buffer_size;
        let workers = pool.run_observed(
            |_| config.workload.workload(buffer_size),
            self.settings.duration,
            &self.stop,
            self.settings.monitor_interval,
            |elapsed| {
                let (Some(monitor), Some(last)) = (monitor.as_ref(), previous.as_ref()) else {
                    return;
                };
                match monitor.read() {
                    Ok(current) => {
                        samples.push(monitor.sample(last, &current, elapsed - previous_elapsed, elapsed));
                        previous = Some(current);
                        previous_elapsed = elapsed;
                    }
                    Err(error) => {
                        tracing::warn!("monitoring during the benchmark stopped: {error}");
                        previous = None;
                    }
                }
            },
        )?;

        Ok(RdtBenchResult {
            config: *config,
            clos,
            workers,
            samples,
        })
    }

    /// Runs the configuration at `index`, or all of them pausing in between.
    /// The RDT state is restored afterwards, also when a run fails.
    pub fn run(
        &self,
        index: Option<usize>,
        mut on_result: impl FnMut(&RdtBenchResult),
    ) -> KResult<Vec<RdtBenchResult>> {
        let configs = match index {
            Some(index) => {
                let config = BENCH_CONFIGS.get(index).ok_or_else(|| {
                    KnobError::invalid_param(
                        "configuration index",
                        format!("{index} is not below {}", BENCH_CONFIGS.len()),
                    )
                })?;
                std::slice::from_ref(config)
            }
            None => &BENCH_CONFIGS[..],
        };

        let snapshot = self.rdt.snapshot()?;
        let results = self.run_configs(configs, &mut on_result);
        let restored = self.rdt.restore(&snapshot);

        let results = results?;
        restored?;
        Ok(results)
    }

    fn run_configs(
        &self,
        configs: &[RdtBenchConfig],
        on_result: &mut impl FnMut(&RdtBenchResult),
    ) -> KResult<Vec<RdtBenchResult>> {
        let mut results = Vec::with_capacity(configs.len());
        for (position, config) in configs.iter().enumerate() {
            if position > 0 && !self.stop.sleep(self.settings.pause) {
                return Err(KnobError::Interrupted);
            }

            let result = self.run_config(config)?;
            on_result(&result);
            results.push(result);
        }

        Ok(results)
    }

    fn monitor(&self, core_id: LogicalCoreId) -> Option<RdtMonitor<'rdt, A>> {
        if !self.rdt.features().has_monitoring() {
            return None;
        }
        RdtMonitor::new(self.rdt, core_id, Rmid::new(0).ok()?, self.settings.monitor_interval).ok()
    }
}

impl RdtBenchResult {
    /// Sum of the per-worker rates, in the workload's report unit.
    pub fn total_rate(&self) -> f64 {
        self.workers
            .first()
            .map_or(0.0, |worker| worker.unit.scale(aggregate_rate(&self.workers)))
    }
}

impl fmt::Display for RdtBenchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Benchmark Results: {} ===", self.config.name)?;
        writeln!(f, "L3 Cache Mask: {:#06X}", self.config.l3_mask)?;
        writeln!(f, "Memory Bandwidth Throttle: {}%", self.config.throttle)?;
        writeln!(f, "Number of Threads: {}", self.workers.len())?;
        writeln!(f, "Benchmark Type: {}", self.config.workload.name())?;
        writeln!(f, "CLOS: {}", self.clos)?;
        writeln!(f)?;
        writeln!(f, "Thread  Core  Throughput        Duration(s)")?;
        writeln!(f, "------  ----  ----------------  -----------")?;
        for (thread, worker) in self.workers.iter().enumerate() {
            writeln!(
                f,
                "{thread:6}  {:4}  {:10.2} {:<6}  {:11.2}",
                worker.core_id,
                worker.unit.scale(worker.rate()),
                worker.unit.to_string(),
                worker.elapsed.as_secs_f64()
            )?;
        }
        writeln!(f, "------  ----  ----------------  -----------")?;
        write!(f, "Total         {:10.2}", self.total_rate())?;

        if !self.samples.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            writeln!(f, "Time(s)  RMID   LLC Occupancy  MBM Total        MBM Local")?;
            for sample in &self.samples {
                writeln!(f, "{sample}")?;
            }
        }

        Ok(())
    }
}

