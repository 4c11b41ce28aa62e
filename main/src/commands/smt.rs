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

use hardware_knobs::smt::check_support;
use hardware_knobs::smt::self_test;
use hardware_knobs::smt::Smt;
use hardware_knobs::smt::SmtBench;
use hardware_knobs::smt::SmtBenchRow;
use hardware_knobs::smt::SmtControl;

use crate::cli::SmtCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: SmtCommand, context: &Context) -> eyre::Result<i32> {
    let smt = Smt::new(context.paths().clone());

    match command {
        SmtCommand::Status => {
            println!("{}", smt.status(&context.probe)?);
            Ok(0)
        }
        SmtCommand::Set { control } => {
            let control = control.parse::<SmtControl>()?;
            smt.set_control(control)?;
            println!("SMT control: {}", smt.control()?);
            Ok(0)
        }
        SmtCommand::Test => {
            context.warn_unless_root();
            check_support(&smt, &context.probe)?;
            let bench = bench(&smt, context)?;
            let suite = self_test(&smt, &bench, &context.stop)?;
            Ok(report(&suite))
        }
        SmtCommand::Bench => {
            let bench = bench(&smt, context)?;
            println!("{}", SmtBenchRow::header());
            bench.run(|row| println!("{row}"))?;
            Ok(0)
        }
    }
}

fn bench(smt: &Smt, context: &Context) -> eyre::Result<SmtBench> {
    Ok(SmtBench::new(
        smt.topology()?,
        context.config.smt_bench,
        context.stop.clone(),
    ))
}
