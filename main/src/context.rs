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

use eyre::WrapErr as _;

use hardware_knobs::bench::Harness;
use hardware_knobs::bench::HarnessSettings;
use hardware_knobs::rapl::PowerMeter;
use hardware_knobs::StopToken;
use hardware_knobs::TestSuite;
use hwk_config::KnobsConfig;
use hwk_msr::MsrDevice;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::SysPaths;

/// Everything a tool needs: the resolved config, a memoizing probe and the
/// stop token wired to SIGINT/SIGTERM.
pub struct Context {
    pub config: KnobsConfig,
    pub probe: Probe,
    pub stop: StopToken,
}

impl Context {
    pub fn new(config: KnobsConfig, stop: StopToken) -> Self {
        let probe = Probe::new(config.paths.clone());
        Self {
            config,
            probe,
            stop,
        }
    }

    pub fn paths(&self) -> &SysPaths {
        &self.config.paths
    }

    /// MSR devices of the online logical CPUs that come before the first
    /// offline one, broadcasts walk ids `0..n`.
    pub fn msr(&self) -> eyre::Result<MsrDevice> {
        let cores = cpu_utils::cpulist::online_cores(self.paths())
            .wrap_err("failed to list online CPUs")?;
        let count = leading_online_count(&cores);
        if count < cores.len() {
            tracing::warn!(
                "CPU {count} is offline, register broadcasts skip the {} online CPUs after it",
                cores.len() - count
            );
        }
        Ok(MsrDevice::new(self.paths().clone(), count))
    }

    pub fn harness(&self) -> Harness {
        self.harness_with_warmup(self.config.bench.warmup)
    }

    pub fn harness_with_warmup(&self, warmup: bool) -> Harness {
        let settings = HarnessSettings {
            settle: self.config.bench.settle,
            warmup,
        };
        tracing::info!(
            "benchmark settle {:?}, warm-up {}",
            settings.settle,
            if warmup { "on" } else { "off" }
        );
        Harness::new(settings, self.stop.clone())
    }

    /// Package energy through powercap, `None` when the tree is absent.
    pub fn power_meter(&self) -> eyre::Result<Option<PowerMeter>> {
        let meter = PowerMeter::packages(self.paths()).wrap_err("failed to read powercap zones")?;
        if meter.is_none() {
            tracing::debug!("no powercap package zone found");
        }
        Ok(meter)
    }

    /// Tests and benchmarks touch registers and sysfs knobs reserved to root.
    pub fn warn_unless_root(&self) {
        if !hwk_probe::is_root() {
            tracing::warn!("not running as root, most knobs will be read only");
        }
    }
}

/// Prints the summary and turns it into the process exit code.
pub fn report(suite: &TestSuite) -> i32 {
    println!("{suite}");
    suite.exit_code()
}

/// Number of ids in `cores` (sorted) that run `0, 1, 2, ...` without a gap.
fn leading_online_count(cores: &[LogicalCoreId]) -> usize {
    cores
        .iter()
        .zip(LogicalCoreId::range(cores.len()))
        .take_while(|(core_id, expected)| **core_id == *expected)
        .count()
}

#[cfg(test)]
mod tests {
    use cpu_utils::cpulist::parse_cpu_list;

    use super::*;

    fn count(list: &str) -> usize {
        leading_online_count(&parse_cpu_list(list).unwrap())
    }

    #[test]
    fn every_cpu_online() {
        assert_eq!(count("0-7"), 8);
    }

    #[test]
    fn broadcast_stops_at_first_offline_cpu() {
        assert_eq!(count("0-3,6-7"), 4);
        assert_eq!(count("0,2-15"), 1);
        assert_eq!(count("1-3"), 0);
        assert_eq!(count(""), 0);
    }
}
