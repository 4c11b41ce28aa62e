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

use hardware_knobs::rdt::clos_id;
use hardware_knobs::rdt::diagnose;
use hardware_knobs::rdt::self_test;
use hardware_knobs::rdt::Rdt;
use hardware_knobs::rdt::RdtBench;
use hardware_knobs::rdt::RdtFeatures;
use hardware_knobs::rdt::RdtMonitor;
use hwk_msr::MsrDevice;
use hwk_shared::types::LogicalCoreId;

use crate::cli::RdtCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: RdtCommand, context: &Context) -> eyre::Result<i32> {
    match command {
        RdtCommand::Diag => {
            let diagnosis = diagnose(&context.probe);
            println!("{diagnosis}");
            Ok(diagnosis.exit_code())
        }
        RdtCommand::Test { clos } => {
            context.warn_unless_root();
            let rdt = controller(context)?;
            let clos = match clos {
                Some(clos) => clos_id(clos)?,
                None => context.config.rdt_bench.clos,
            };
            let suite = self_test(&rdt, clos)?;
            Ok(report(&suite))
        }
        RdtCommand::Bench { index } => {
            context.warn_unless_root();
            let rdt = controller(context)?;
            let cores = cpu_utils::cpulist::online_cores(context.paths())
                .wrap_err("failed to list online CPUs")?;
            let bench = RdtBench::new(&rdt, context.config.rdt_bench, cores, context.stop.clone())?;
            bench.run(index, |result| println!("{result}"))?;
            Ok(0)
        }
        RdtCommand::Monitor { secs, cpu, rmid } => {
            let rdt = controller(context)?;
            let core_id = LogicalCoreId::new(cpu);
            let rmid = hardware_knobs::rdt::rmid(rmid)?;
            let monitor = RdtMonitor::new(
                &rdt,
                core_id,
                rmid,
                context.config.rdt_bench.monitor_interval,
            )?;

            let original = rdt.read_rmid(core_id)?;
            rdt.assign_rmid(core_id, rmid)?;
            let samples = monitor.run(
                std::time::Duration::from_secs(secs),
                &context.stop,
                |sample| println!("{sample}"),
            );
            if let Err(error) = rdt.assign_rmid(core_id, original) {
                tracing::warn!("failed to restore RMID {original} on CPU {core_id}: {error}");
            }
            tracing::info!("{} samples taken", samples?);
            Ok(0)
        }
        RdtCommand::Configure {
            clos,
            l3_mask,
            throttle,
        } => {
            let rdt = controller(context)?;
            let clos = clos_id(clos)?;
            rdt.configure_clos(clos, l3_mask, throttle)?;
            println!("CLOS {clos}: L3 mask {:#X}", rdt.read_l3_mask(clos)?);
            if throttle.is_some() && rdt.features().mba {
                println!("CLOS {clos}: throttle {}", rdt.read_throttle(clos)?);
            }
            Ok(0)
        }
        RdtCommand::Assign { cpu, clos } => {
            let rdt = controller(context)?;
            let core_id = LogicalCoreId::new(cpu);
            rdt.assign_cpu_to_clos(core_id, clos_id(clos)?)?;
            println!("CPU {core_id} -> CLOS {}", rdt.read_clos_for_cpu(core_id)?);
            Ok(0)
        }
    }
}

fn controller(context: &Context) -> eyre::Result<Rdt<MsrDevice>> {
    let features = RdtFeatures::detect(&context.probe);
    tracing::debug!("RDT features {features:?}");
    Ok(Rdt::new(context.msr()?, features))
}
