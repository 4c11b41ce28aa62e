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

use hwk_msr::read_all_cpus;
use hwk_msr::write_all_cpus;
use hwk_msr::ALL_CPUS;
use hwk_shared::types::LogicalCoreId;

use crate::cli::MsrCommand;
use crate::context::Context;

pub fn run(command: MsrCommand, context: &Context) -> eyre::Result<i32> {
    let device = context.msr()?;

    match command {
        MsrCommand::Read { cpu, register } => {
            let value = device.read_cpu(LogicalCoreId::new(cpu), register)?;
            println!("CPU {cpu} MSR {register:#X} = {value:#018X}");
        }
        MsrCommand::Write {
            cpu,
            register,
            value,
        } => {
            device.write_cpu(LogicalCoreId::new(cpu), register, value)?;
            println!("CPU {cpu} MSR {register:#X} <- {value:#018X}");
        }
        MsrCommand::ReadAll { register, max } => {
            let values = read_all_cpus(&device, register, max.unwrap_or(ALL_CPUS))?;
            for (cpu, value) in values.iter().enumerate() {
                println!("CPU {cpu:<4} MSR {register:#X} = {value:#018X}");
            }
        }
        MsrCommand::WriteAll {
            register,
            value,
            max,
        } => {
            write_all_cpus(&device, register, value, max.unwrap_or(ALL_CPUS))?;
            println!("MSR {register:#X} <- {value:#018X} on every CPU");
        }
    }

    Ok(0)
}
