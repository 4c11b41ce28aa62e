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

use hardware_knobs::cpufreq::summarize;
use hardware_knobs::cpufreq::CpuFreq;
use hardware_knobs::cpufreq::FreqSweep;
use hardware_knobs::cpufreq::FreqSweepRow;

use super::mhz;
use crate::cli::CpuFreqCommand;
use crate::context::Context;

pub fn run(command: CpuFreqCommand, context: &Context) -> eyre::Result<i32> {
    let cpufreq = CpuFreq::new(context.paths())?;

    match command {
        CpuFreqCommand::Info => {
            for policy in cpufreq.policies() {
                let cpus = policy
                    .related_cpus()?
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                println!("{} (CPUs {})", policy.name(), cpus.join(","));
                println!("  driver: {}", policy.driver()?.as_deref().unwrap_or("unknown"));
                println!("  governor: {}", policy.governor()?);
                println!("  available governors: {}", policy.available_governors()?.join(" "));
                println!("  {}", policy.limits()?);

                let table = policy.available_frequencies()?;
                if !table.is_empty() {
                    let table = table.iter().map(|khz| mhz(Some(*khz))).collect::<Vec<_>>();
                    println!("  frequencies (MHz): {}", table.join(" "));
                }
            }
            Ok(0)
        }
        CpuFreqCommand::Governor { name, policy } => {
            if let Some(name) = name {
                cpufreq.set_governor(&name, policy)?;
            }
            for policy in cpufreq.select(policy)? {
                println!("{}: {}", policy.name(), policy.governor()?);
            }
            Ok(0)
        }
        CpuFreqCommand::Limits {
            min_khz,
            max_khz,
            policy,
        } => {
            cpufreq.set_limits(min_khz, max_khz, policy)?;
            for policy in cpufreq.select(policy)? {
                println!("{}: {}", policy.name(), policy.limits()?);
            }
            Ok(0)
        }
        CpuFreqCommand::Set { khz, policy } => {
            cpufreq.set_speed(khz, policy)?;
            for policy in cpufreq.select(policy)? {
                println!("{}: {}", policy.name(), policy.limits()?);
            }
            Ok(0)
        }
        CpuFreqCommand::Stats { policy } => {
            for policy in cpufreq.select(policy)? {
                let time_in_state = policy.time_in_state()?;
                if time_in_state.is_empty() {
                    println!("{}: no time_in_state statistics", policy.name());
                    continue;
                }

                let total = time_in_state
                    .iter()
                    .map(|(_, time)| time.as_secs_f64())
                    .sum::<f64>();
                println!("{}:", policy.name());
                for (khz, time) in time_in_state {
                    let share = if total > 0.0 {
                        time.as_secs_f64() * 100.0 / total
                    } else {
                        0.0
                    };
                    println!(
                        "  {:>6} MHz {:>12.2} s {share:>6.1}%",
                        mhz(Some(khz)),
                        time.as_secs_f64()
                    );
                }
            }
            Ok(0)
        }
        CpuFreqCommand::Monitor { sampling } => {
            cpufreq.monitor(
                sampling.interval(),
                sampling.duration(),
                &context.stop,
                |elapsed, current| {
                    let current = current
                        .iter()
                        .map(|(id, khz)| format!("policy{id}: {} MHz", mhz(*khz)))
                        .collect::<Vec<_>>();
                    println!("{:8.1}s  {}", elapsed.as_secs_f64(), current.join("  "));
                },
            );
            Ok(0)
        }
        CpuFreqCommand::Bench { khz } => {
            context.warn_unless_root();
            let bench = &context.config.bench;
            let mut sweep = FreqSweep::new(
                &cpufreq,
                context.harness(),
                context.power_meter()?,
                bench.buffer_size,
                bench.iterations,
            );
            let frequencies = if khz.is_empty() {
                sweep.frequencies()?
            } else {
                khz
            };

            println!("{}", FreqSweepRow::header());
            let rows = sweep.run(&frequencies, |row| println!("{row}"))?;

            let (peak, efficient) = summarize(&rows);
            if let Some(peak) = peak {
                println!("peak performance at {} MHz", mhz(Some(peak.target_khz)));
            }
            if let Some(efficient) = efficient {
                println!("best efficiency at {} MHz", mhz(Some(efficient.target_khz)));
            }
            Ok(0)
        }
    }
}
