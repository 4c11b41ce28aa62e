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

use hardware_knobs::rapl::check_support;
use hardware_knobs::rapl::discover_zones;
use hardware_knobs::rapl::self_test;
use hardware_knobs::rapl::Rapl;

use crate::cli::RaplCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: RaplCommand, context: &Context) -> eyre::Result<i32> {
    match command {
        RaplCommand::Info => {
            let rapl = Rapl::new(context.msr()?)?;
            println!("{}", rapl.info());

            let zones = discover_zones(context.paths())?;
            if !zones.is_empty() {
                println!("Powercap zones:");
            }
            for zone in zones {
                let energy = zone
                    .energy_uj()
                    .map_or("unavailable".to_string(), |energy| format!("{energy} uJ"));
                println!("  {:indent$}{:<12} {energy}", "", zone.name, indent = zone.depth * 2);
            }
            Ok(0)
        }
        RaplCommand::Test => {
            context.warn_unless_root();
            check_support(&context.probe)?;
            let rapl = Rapl::new(context.msr()?)?;
            let suite = self_test(&rapl, &context.stop)?;
            Ok(report(&suite))
        }
        RaplCommand::Limit { watts, window_ms } => {
            let rapl = Rapl::new(context.msr()?)?;
            if let Some(watts) = watts {
                rapl.set_power_limit(watts, Duration::from_millis(window_ms))?;
            }
            println!("{}", rapl.read_power_limit()?);
            Ok(0)
        }
    }
}
