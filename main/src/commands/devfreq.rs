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

use hardware_knobs::devfreq::device_at;
use hardware_knobs::devfreq::discover_devices;
use hardware_knobs::devfreq::monitor;
use hardware_knobs::devfreq::DevfreqSweep;
use hardware_knobs::devfreq::DevfreqSweepRow;

use crate::cli::DevfreqCommand;
use crate::context::Context;

pub fn run(command: DevfreqCommand, context: &Context) -> eyre::Result<i32> {
    let paths = context.paths();

    match command {
        DevfreqCommand::List => {
            let devices = discover_devices(paths)?;
            if devices.is_empty() {
                println!("no devfreq devices");
            }
            for (index, device) in devices.iter().enumerate() {
                println!("[{index}] {}", device.info()?);
            }
            Ok(0)
        }
        DevfreqCommand::Governor { name, device } => {
            let device = device_at(paths, device)?;
            if let Some(name) = name {
                device.set_governor(&name)?;
            }
            println!("{}: {}", device.label(), device.governor()?);
            Ok(0)
        }
        DevfreqCommand::Range {
            min_hz,
            max_hz,
            device,
        } => {
            let device = device_at(paths, device)?;
            device.set_range(min_hz, max_hz)?;
            println!("{}", device.info()?);
            Ok(0)
        }
        DevfreqCommand::Performance { device } => {
            let device = device_at(paths, device)?;
            device.performance()?;
            println!("{}", device.info()?);
            Ok(0)
        }
        DevfreqCommand::Powersave { device } => {
            let device = device_at(paths, device)?;
            device.powersave()?;
            println!("{}", device.info()?);
            Ok(0)
        }
        DevfreqCommand::Monitor { sampling } => {
            let devices = discover_devices(paths)?;
            if devices.is_empty() {
                eyre::bail!("no devfreq devices to monitor");
            }
            let names = devices.iter().map(|device| device.name.clone()).collect::<Vec<_>>();
            println!("{:>9}  {}", "time", names.join("  "));

            monitor(
                &devices,
                sampling.interval(),
                sampling.duration(),
                &context.stop,
                |elapsed, current| {
                    let current = current
                        .iter()
                        .map(|hz| hz.map_or("n/a".to_string(), |hz| format!("{} MHz", hz / 1_000_000)))
                        .collect::<Vec<_>>();
                    println!("{:8.1}s  {}", elapsed.as_secs_f64(), current.join("  "));
                },
            );
            Ok(0)
        }
        DevfreqCommand::Bench { device, dwell_ms } => {
            context.warn_unless_root();
            let device = device_at(paths, device)?;
            let sweep = DevfreqSweep::new(
                &device,
                context.config.bench.settle,
                Duration::from_millis(dwell_ms),
                context.stop.clone(),
            );

            println!("{}: {}", device.label(), device.name);
            println!("{}", DevfreqSweepRow::header());
            sweep.run(|row| println!("{row}"))?;
            Ok(0)
        }
    }
}
