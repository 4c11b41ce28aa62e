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

use cpu_utils::cpulist::parse_cpu_list;
use hardware_knobs::cstate::check_support;
use hardware_knobs::cstate::monitor;
use hardware_knobs::cstate::stats_table;
use hardware_knobs::cstate::CState;
use hardware_knobs::cstate::CStateBench;
use hardware_knobs::cstate::CStateBenchSettings;
use hardware_knobs::cstate::CStates;
use hwk_shared::types::LogicalCoreId;

use crate::cli::CStateCommand;
use crate::context::Context;

pub fn run(command: CStateCommand, context: &Context) -> eyre::Result<i32> {
    let cstates = CStates::new(context.paths().clone());
    check_support(&cstates)?;

    match command {
        CStateCommand::Info { cpu } => {
            let core_id = LogicalCoreId::new(cpu);
            println!("Driver: {}", cstates.driver()?.as_deref().unwrap_or("unknown"));
            println!("Governor: {}", cstates.governor()?);
            println!("Available governors: {}", cstates.available_governors()?.join(" "));

            let states = cstates.states(core_id)?;
            println!("CPU {core_id}:");
            println!("{}", CState::header());
            for state in &states {
                println!("{state}");
            }
            println!();
            for line in stats_table(&states) {
                println!("{line}");
            }
            Ok(0)
        }
        CStateCommand::Enable { state, cpu } => {
            cstates.set_enabled(state, true, cpu.map(LogicalCoreId::new))?;
            Ok(0)
        }
        CStateCommand::Disable { state, cpu } => {
            cstates.set_enabled(state, false, cpu.map(LogicalCoreId::new))?;
            Ok(0)
        }
        CStateCommand::Max { state } => {
            cstates.set_max_cstate(state)?;
            Ok(0)
        }
        CStateCommand::Governor { name } => {
            if let Some(name) = name {
                cstates.set_governor(&name)?;
            }
            println!("Governor: {}", cstates.governor()?);
            Ok(0)
        }
        CStateCommand::Monitor { sampling, cpus } => {
            let cores = match cpus {
                Some(list) => parse_cpu_list(&list)?,
                None => cstates.cpus()?,
            };
            monitor(
                &cstates,
                &cores,
                sampling.interval(),
                sampling.duration(),
                &context.stop,
                |elapsed, residencies| {
                    println!("--- {:.1}s", elapsed.as_secs_f64());
                    for residency in residencies {
                        println!("{residency}");
                    }
                },
            )?;
            Ok(0)
        }
        CStateCommand::Bench => {
            context.warn_unless_root();
            let bench = CStateBench::new(
                &cstates,
                context.power_meter()?,
                CStateBenchSettings::default(),
                context.stop.clone(),
            );
            bench.run(|row| println!("{row}"))?;
            Ok(0)
        }
    }
}
