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

//! CPU frequency scaling through the `cpufreq` policy interface.

mod bench;
mod policy;


use std::time::Duration;
use std::time::Instant;

use hwk_shared::SysPaths;

pub use bench::summarize;
pub use bench::FreqSweep;
pub use bench::FreqSweepRow;
pub use policy::discover_policies;
pub use policy::CpuFreqPolicy;
pub use policy::FreqLimits;
pub use policy::PolicyState;

use crate::KResult;
use crate::KnobError;
use crate::StopToken;

/// Every cpufreq policy of the machine.
#[derive(Clone, Debug)]
pub struct CpuFreq {
    policies: Vec<CpuFreqPolicy>,
}

/// Saved governor and limits of every policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuFreqSnapshot {
    states: Vec<(u32, PolicyState)>,
}

impl CpuFreq {
    /// Fails with `NotSupported` when the kernel exposes no policy.
    pub fn new(paths: &SysPaths) -> KResult<Self> {
        let policies = discover_policies(paths)?;
        if policies.is_empty() {
            return Err(KnobError::not_supported(
                "CPU frequency control",
                "no cpufreq policies in sysfs",
            ));
        }
        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[CpuFreqPolicy] {
        &self.policies
    }

    pub fn first(&self) -> &CpuFreqPolicy {
        // never empty, see `new`
        &self.policies[0]
    }

    pub fn policy(&self, id: u32) -> KResult<&CpuFreqPolicy> {
        self.policies
            .iter()
            .find(|policy| policy.id == id)
            .ok_or_else(|| KnobError::invalid_param("cpufreq policy", format!("policy{id} doesn't exist")))
    }

    /// One policy, or all of them when `id` is `None`.
    pub fn select(&self, id: Option<u32>) -> KResult<Vec<&CpuFreqPolicy>> {
        match id {
            Some(id) => Ok(vec![self.policy(id)?]),
            None => Ok(self.policies.iter().collect()),
        }
    }

    pub fn set_governor(&self, governor: &str, id: Option<u32>) -> KResult<()> {
        for policy in self.select(id)? {
            policy.set_governor(governor)?;
        }
        Ok(())
    }

    pub fn set_limits(&self, min_khz: u64, max_khz: u64, id: Option<u32>) -> KResult<()> {
        for policy in self.select(id)? {
            policy.set_limits(min_khz, max_khz)?;
        }
        Ok(())
    }

    pub fn set_speed(&self, khz: u64, id: Option<u32>) -> KResult<()> {
        for policy in self.select(id)? {
            policy.set_speed(khz)?;
        }
        Ok(())
    }

    /// Lowers or raises `scaling_max_freq` of every policy, clamped to the
    /// policy's hardware range and never below its current minimum.
    pub fn cap_max_khz(&self, khz: u64) -> KResult<()> {
        for policy in &self.policies {
            let limits = policy.limits()?;
            let mut capped = khz;
            if let Some(hw_max) = limits.hw_max_khz {
                capped = capped.min(hw_max);
            }
            if let Some(hw_min) = limits.hw_min_khz {
                capped = capped.max(hw_min);
            }
            policy.set_max_khz(capped.max(limits.min_khz))?;
        }
        tracing::debug!("capped every policy at {khz} kHz");
        Ok(())
    }

    /// Current frequency of every policy, `None` where it can't be read.
    pub fn current_khz(&self) -> Vec<(u32, Option<u64>)> {
        self.policies
            .iter()
            .map(|policy| {
                let current = policy
                    .current_khz()
                    .map_err(|error| tracing::debug!("{}: {error}", policy.name()))
                    .ok()
                    .flatten();
                (policy.id, current)
            })
            .collect()
    }

    pub fn snapshot(&self) -> KResult<CpuFreqSnapshot> {
        let states = self
            .policies
            .iter()
            .map(|policy| Ok((policy.id, policy.state()?)))
            .collect::<KResult<Vec<_>>>()?;
        Ok(CpuFreqSnapshot { states })
    }

    /// Restores every saved policy and reports the first failure.
    pub fn restore(&self, snapshot: &CpuFreqSnapshot) -> KResult<()> {
        let mut result = Ok(());
        for (id, state) in &snapshot.states {
            let restored = self.policy(*id).and_then(|policy| policy.restore(state));
            if let Err(error) = restored {
                tracing::warn!("failed to restore policy{id}: {error}");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    /// Samples current frequencies every `interval` until `duration` passes
    /// or a stop is requested.
    pub fn monitor(
        &self,
        interval: Duration,
        duration: Duration,
        stop: &StopToken,
        mut on_sample: impl FnMut(Duration, &[(u32, Option<u64>)]),
    ) -> usize {
        let start = Instant::now();
        let mut samples = 0;

        while start.elapsed() < duration {
            on_sample(start.elapsed(), &self.current_khz());
            samples += 1;

            if !stop.sleep(interval) {
                tracing::info!("frequency monitoring stopped after {samples} samples");
                break;
            }
        }
        samples
    }
}
