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

use std::thread;
use std::time::Duration;
use std::time::Instant;

use hwk_shared::types::LogicalCoreId;

use super::workload::WorkUnit;
use super::workload::Workload;
use crate::KResult;
use crate::KnobError;
use crate::StopToken;

pub const MAX_WORKERS: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerReport {
    pub core_id: LogicalCoreId,
    pub workload: String,
    pub unit: WorkUnit,
    pub work: u64,
    pub passes: u64,
    pub elapsed: Duration,
    pub pinned: bool,
}

/// A bounded set of threads, one per logical core, each pinned to its core and
/// running a workload it builds and owns.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    cores: Vec<LogicalCoreId>,
}

impl WorkerPool {
    pub fn new(cores: Vec<LogicalCoreId>) -> KResult<Self> {
        if cores.is_empty() || cores.len() > MAX_WORKERS {
            return Err(KnobError::invalid_param(
                "worker count",
                format!("{} is not in 1..={MAX_WORKERS}", cores.len()),
            ));
        }

        Ok(Self { cores })
    }

    pub fn cores(&self) -> &[LogicalCoreId] {
        &self.cores
    }

    pub fn run<F>(&self, make_workload: F, duration: Duration, stop: &StopToken) -> KResult<Vec<WorkerReport>>
    where
        F: Fn(usize) -> Box<dyn Workload> + Sync,
    {
        self.run_observed(make_workload, duration, stop, duration, |_| {})
    }

    /// Like [`WorkerPool::run`], but calls `on_tick` on the calling thread every
    /// `tick` while the workers are busy.
    pub fn run_observed<F>(
        &self,
        make_workload: F,
        duration: Duration,
        stop: &StopToken,
        tick: Duration,
        mut on_tick: impl FnMut(Duration),
    ) -> KResult<Vec<WorkerReport>>
    where
        F: Fn(usize) -> Box<dyn Workload> + Sync,
    {
        let workers_stop = StopToken::new();
        let tick = tick.max(Duration::from_millis(1));

        let results = thread::scope(|scope| {
            let handles = self
                .cores
                .iter()
                .enumerate()
                .map(|(worker_id, &core_id)| {
                    let make_workload = &make_workload;
                    let workers_stop = &workers_stop;
                    scope.spawn(move || {
                        worker_loop(worker_id, core_id, make_workload, duration, workers_stop, stop)
                    })
                })
                .collect::<Vec<_>>();

            let start = Instant::now();
            while !stop.is_stopped() {
                let elapsed = start.elapsed();
                if elapsed >= duration {
                    break;
                }
                if stop.sleep(tick.min(duration - elapsed)) {
                    on_tick(start.elapsed());
                }
            }
            workers_stop.stop();

            handles
                .into_iter()
                .zip(&self.cores)
                .map(|(handle, &core_id)| {
                    handle
                        .join()
                        .map_err(|_| KnobError::worker_panicked(core_id))
                })
                .collect::<KResult<Vec<_>>>()
        })?;

        if stop.is_stopped() {
            return Err(KnobError::Interrupted);
        }
        Ok(results)
    }
}

fn worker_loop<F>(
    worker_id: usize,
    core_id: LogicalCoreId,
    make_workload: &F,
    duration: Duration,
    workers_stop: &StopToken,
    stop: &StopToken,
) -> WorkerReport
where
    F: Fn(usize) -> Box<dyn Workload>,
{
    let pinned = cpu_utils::pinning::pin_current_thread_to(core_id);
    if !pinned {
        log::warn!("worker {worker_id}: pinning to logical core {core_id} failed");
    }

    let mut workload = make_workload(worker_id);
    workload.prepare();
    log::trace!("worker {worker_id}: running {} on logical core {core_id}", workload.name());

    let mut work = 0;
    let mut passes = 0;
    let start = Instant::now();
    while !workers_stop.is_stopped() && !stop.is_stopped() && start.elapsed() < duration {
        work += workload.pass();
        passes += 1;
    }
    let elapsed = start.elapsed();
    log::trace!("worker {worker_id}: {passes} passes in {elapsed:?}");

    WorkerReport {
        core_id,
        workload: workload.name().to_string(),
        unit: workload.unit(),
        work,
        passes,
        elapsed,
        pinned,
    }
}

impl WorkerReport {
    pub fn rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.work as f64 / seconds
    }
}

/// Total work of all workers over the longest worker run time.
pub fn aggregate_rate(reports: &[WorkerReport]) -> f64 {
    let total_work = reports.iter().map(|report| report.work).sum::<u64>();
    let longest = reports
        .iter()
        .map(|report| report.elapsed)
        .max()
        .unwrap_or_default()
        .as_secs_f64();

    if longest <= 0.0 {
        return 0.0;
    }
    total_work as f64 / longest
}
