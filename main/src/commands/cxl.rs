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

use hardware_knobs::cxl::check_support;
use hardware_knobs::cxl::self_test;
use hardware_knobs::cxl::CxlTopology;

use crate::cli::CxlCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: CxlCommand, context: &Context) -> eyre::Result<i32> {
    let paths = context.paths();

    match command {
        CxlCommand::Scan => {
            let topology = CxlTopology::scan(paths)?;
            println!("{topology}");
            Ok(0)
        }
        CxlCommand::Test => {
            check_support(paths)?;
            let topology = CxlTopology::scan(paths)?;
            let mut harness = context.harness();
            let suite = self_test(paths, &topology, &mut harness, context.config.bench.buffer_size)?;
            Ok(report(&suite))
        }
    }
}
