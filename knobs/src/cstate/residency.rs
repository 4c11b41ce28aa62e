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

use hwk_shared::types::LogicalCoreId;

use super::CState;
use super::CStates;
use crate::KResult;
use crate::StopToken;

/// Cumulative idle time of every state on a set of CPUs.
#[derive(Clone, Debug)]
pub struct ResidencyReading {
    pub at: Instant,
    pub cores: Vec<(LogicalCoreId, Vec<CState>)>,
}

/// Share of the idle time one state got between two readings.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidencyShare {
    pub index: u32,
    pub name: String,
    pub delta_us: u64,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoreResidency {
    pub core_id: LogicalCoreId,
    pub shares: Vec<ResidencyShare>,
}

impl ResidencyReading {
    pub fn take(cstates: &CStates, cores: &[LogicalCoreId]) -> KResult<Self> {
        let cores = cores
            .iter()
            .map(|&core_id| Ok((core_id, cstates.states(core_id)?)))
            .collect::<KResult<Vec<_>>>()?;

        Ok(Self {
            at: Instant::now(),
            cores,
        })
    }

    /// Per-core distribution of idle time since `earlier`. States are matched
    /// by index, so one that appeared in between is counted from zero.
    pub fn residency_since(&self, earlier: &ResidencyReading) -> Vec<CoreResidency> {
        self.cores
            .iter()
            .map(|(core_id, states)| {
                let before = earlier
                    .cores
                    .iter()
                    .find(|(earlier_core, _)| earlier_core == core_id)
                    .map(|(_, states)| states.as_slice())
                    .unwrap_or_default();

                let deltas = states
                    .iter()
                    .map(|state| {
                        let previous = before
                            .iter()
                            .find(|previous| previous.index == state.index)
                            .map_or(0, |previous| previous.time_us);
                        (state, state.time_us.saturating_sub(previous))
                    })
                    .collect::<Vec<_>>();
                let total = deltas.iter().map(|(_, delta)| delta).sum::<u64>();

                let shares = deltas
                    .into_iter()
                    .map(|(state, delta_us)| ResidencyShare {
                        index: state.index,
                        name: state.name.clone(),
                        delta_us,
                        percent: if total == 0 {
                            0.0
                        } else {
                            delta_us as f64 * 100.0 / total as f64
                        },
                    })
                    .collect();

                CoreResidency {
                    core_id: *core_id,
                    shares,
                }
            })
            .collect()
    }
}

/// Samples residency every `interval` until `duration` passes or a stop is
/// requested. Each sample covers the time since monitoring started.
pub fn monitor(
    cstates: &CStates,
    cores: &[LogicalCoreId],
    interval: Duration,
    duration: Duration,
    stop: &StopToken,
    mut on_sample: impl FnMut(Duration, &[CoreResidency]),
) -> KResult<usize> {
    let start = ResidencyReading::take(cstates, cores)?;
    let mut samples = 0;

    while start.at.elapsed() < duration {
        if !stop.sleep(interval) {
            tracing::info!("residency monitoring stopped after {samples} samples");
            break;
        }

        let current = ResidencyReading::take(cstates, cores)?;
        let residency = current.residency_since(&start);
        on_sample(current.at - start.at, &residency);
        samples += 1;
    }

    Ok(samples)
}

impl fmt::Display for CoreResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU{}:", self.core_id)?;
        let visible = self.shares.iter().filter(|share| share.percent >= 1.0);
        for share in visible {
            write!(f, " C{}:{:.0}%", share.index, share.percent.floor())?;
        }
        Ok(())
    }
}

/// Lifetime statistics of one CPU: usage, total time, average residency and
/// share of the idle time.
pub fn stats_table(states: &[CState]) -> Vec<String> {
    let total = states.iter().map(|state| state.time_us).sum::<u64>();
    let mut lines = vec![format!(
        "{:<6} {:<12} {:>14} {:>16} {:>18}",
        "State", "Name", "Usage", "Total time(ms)", "Avg residency(us)"
    )];

    for state in states {
        let percent = if total == 0 {
            0.0
        } else {
            state.time_us as f64 * 100.0 / total as f64
        };
        lines.push(format!(
            "{:<6} {:<12} {:>14} {:>16.1} {:>18.1} ({percent:.1}%)",
            format!("C{}", state.index),
            state.name,
            state.usage,
            state.time_us as f64 / 1000.0,
            state.average_residency_us()
        ));
    }
    lines
}
