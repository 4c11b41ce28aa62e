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

use cpu_utils::CPUTopology;
use hwk_shared::types::LogicalCoreId;

use crate::bench::aggregate_rate;
use crate::bench::ComputeKind;
use crate::bench::WorkerPool;
use crate::KResult;
use crate::StopToken;

pub const BENCH_WORKLOADS: [ComputeKind; 3] = [
    ComputeKind::CpuIntensive,
    ComputeKind::MemoryBound,
    ComputeKind::Mixed,
];

pub const THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];

#[derive(Clone, Debug, PartialEq)]
pub struct SmtBenchRow {
    pub workload: ComputeKind,
    pub threads: usize,
    /// Work per second with one thread per physical core.
    pub primary_only: f64,
    /// Same with siblings packed onto shared cores, `None` without SMT.
    pub with_siblings: Option<f64>,
}

impl SmtBenchRow {
    /// Sibling throughput relative to physical cores only.
    pub fn efficiency(&self) -> Option<f64> {
        let with_siblings = self.with_siblings?;
        if self.primary_only <= 0.0 {
            return None;
        }
        Some(with_siblings / self.primary_only)
    }
}

/// Compares throughput of physical cores against sibling threads sharing them.
pub struct SmtBench {
    topology: CPUTopology,
    settings: hwk_config::SmtBench,
    stop: StopToken,
}

impl SmtBench {
    pub fn new(topology: CPUTopology, settings: hwk_config::SmtBench, stop: StopToken) -> Self {
        Self {
            topology,
            settings,
            stop,
        }
    }

    /// Logical cores for `threads` workers, cores are reused when there are too few.
    pub fn cores_for(&self, threads: usize, with_siblings: bool) -> Vec<LogicalCoreId> {
        let candidates = if with_siblings {
            self.sibling_order()
        } else {
            self.topology.primary_threads()
        };

        candidates.into_iter().cycle().take(threads).collect()
    }

    /// Every hardware thread of a physical core before moving to the next one.
    fn sibling_order(&self) -> Vec<LogicalCoreId> {
        self.topology
            .primary_threads()
            .into_iter()
            .flat_map(|primary| {
                let siblings = self.topology.siblings_of(primary).unwrap_or_default();
                std::iter::once(primary).chain(siblings)
            })
            .collect()
    }

    pub fn thread_counts(&self) -> Vec<usize> {
        THREAD_COUNTS
            .into_iter()
            .filter(|&threads| threads <= self.settings.max_threads)
            .collect()
    }

    pub fn measure(
        &self,
        workload: ComputeKind,
        threads: usize,
        with_siblings: bool,
    ) -> KResult<f64> {
        let pool = WorkerPool::new(self.cores_for(threads, with_siblings))?;
        let buffer_size = self.settings.buffer_size;

        let reports = pool.run(
            |_| workload.workload(buffer_size),
            self.settings.duration,
            &self.stop,
        )?;
        Ok(aggregate_rate(&reports))
    }

    pub fn run(&self, mut on_row: impl FnMut(&SmtBenchRow)) -> KResult<Vec<SmtBenchRow>> {
        let smt = self.topology.has_smt_siblings();
        if !smt {
            tracing::warn!("no SMT siblings are online, only physical cores are measured");
        }

        let mut rows = Vec::new();
        for workload in BENCH_WORKLOADS {
            for threads in self.thread_counts() {
                tracing::info!("{} with {threads} threads", workload.name());
                let primary_only = self.measure(workload, threads, false)?;
                let with_siblings = if smt {
                    Some(self.measure(workload, threads, true)?)
                } else {
                    None
                };

                let row = SmtBenchRow {
                    workload,
                    threads,
                    primary_only,
                    with_siblings,
                };
                on_row(&row);
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

impl fmt::Display for SmtBenchRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let primary = self.primary_only / 1e6;
        write!(f, "{:<14} {:>7} {:>16.2}", self.workload.name(), self.threads, primary)?;

        match (self.with_siblings, self.efficiency()) {
            (Some(with_siblings), Some(efficiency)) => write!(
                f,
                " {:>13.2} {:>13.2}% {:>+11.2}",
                with_siblings / 1e6,
                efficiency * 100.0,
                with_siblings / 1e6 - primary
            ),
            _ => write!(f, " {:>13} {:>14} {:>11}", "-", "-", "-"),
        }
    }
}

impl SmtBenchRow {
    pub fn header() -> String {
        format!(
            "{:<14} {:>7} {:>16} {:>13} {:>14} {:>11}",
            "Workload", "Threads", "No SMT (M/s)", "SMT (M/s)", "Efficiency", "Benefit"
        )
    }
}
