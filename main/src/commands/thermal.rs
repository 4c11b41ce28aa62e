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

use std::time::Duration;
use std::time::Instant;

use hardware_knobs::cpufreq::CpuFreq;
use hardware_knobs::thermal::auto_cap;
use hardware_knobs::thermal::check_support;
use hardware_knobs::thermal::cpu_celsius;
use hardware_knobs::thermal::discover_cooling_devices;
use hardware_knobs::thermal::discover_zones;
use hardware_knobs::thermal::hardware_max_khz;
use hardware_knobs::thermal::ThermalBench;
use hardware_knobs::thermal::ThermalBenchResult;
use hardware_knobs::thermal::ThermalBenchSettings;
use hardware_knobs::thermal::ThermalPolicy;

use super::mhz;
use crate::cli::ThermalCommand;
use crate::context::Context;

const QUICK_BENCH: ThermalBenchSettings = ThermalBenchSettings {
    warmup: Duration::from_secs(2),
    duration: Duration::from_secs(5),
    cooldown: Duration::from_secs(3),
    sample_interval: Duration::from_millis(200),
};

pub fn run(command: ThermalCommand, context: &Context) -> eyre::Result<i32> {
    let paths = context.paths();
    check_support(paths)?;
    let zones = discover_zones(paths)?;

    match command {
        ThermalCommand::Status => {
            for zone in &zones {
                println!("{}", zone.status()?);
            }
            match cpu_celsius(&zones) {
                Some(celsius) => println!("CPU temperature: {celsius:.1}C"),
                None => println!("CPU temperature: unknown"),
            }
            Ok(0)
        }
        ThermalCommand::Cooling { device, state } => {
            let devices = discover_cooling_devices(paths)?;
            let Some(id) = device else {
                if state.is_some() {
                    eyre::bail!("a cooling device is needed to set a state");
                }
                if devices.is_empty() {
                    println!("no cooling devices");
                }
                for device in &devices {
                    println!("{device}");
                }
                return Ok(0);
            };

            let Some(device) = devices.iter().find(|device| device.id == id) else {
                eyre::bail!("cooling_device{id} not found");
            };
            if let Some(state) = state {
                device.set_state(state)?;
            }
            println!("{device}");
            Ok(0)
        }
        ThermalCommand::Cap { secs } => {
            context.warn_unless_root();
            let cpufreq = CpuFreq::new(paths)?;
            let thermal = &context.config.thermal;
            let policy = ThermalPolicy::from_config(thermal, hardware_max_khz(&cpufreq)?)?;

            auto_cap(
                &zones,
                &cpufreq,
                &policy,
                thermal.poll_interval,
                secs.map(Duration::from_secs),
                &context.stop,
                |sample| println!("{sample}"),
            )?;
            Ok(0)
        }
        ThermalCommand::Monitor { sampling } => {
            let cpufreq = CpuFreq::new(paths)?;
            let start = Instant::now();
            let duration = sampling.duration();

            while start.elapsed() < duration {
                let celsius = cpu_celsius(&zones)
                    .map_or("n/a".to_string(), |celsius| format!("{celsius:.1}C"));
                let khz = cpufreq.first().current_khz()?;
                println!(
                    "{:8.1}s  {celsius:>7}  {:>6} MHz",
                    start.elapsed().as_secs_f64(),
                    mhz(khz)
                );

                if !context.stop.sleep(sampling.interval()) {
                    break;
                }
            }
            Ok(0)
        }
        ThermalCommand::Bench { quick } => {
            context.warn_unless_root();
            let cpufreq = CpuFreq::new(paths)?;
            let policy = ThermalPolicy::from_config(
                &context.config.thermal,
                hardware_max_khz(&cpufreq)?,
            )?;
            let settings = if quick {
                QUICK_BENCH
            } else {
                ThermalBenchSettings::default()
            };

            let bench = ThermalBench::new(
                &zones,
                &cpufreq,
                policy,
                context.power_meter()?,
                settings,
                context.stop.clone(),
            );
            println!("{}", ThermalBenchResult::header());
            bench.run(|result| println!("{result}"))?;
            Ok(0)
        }
    }
}
