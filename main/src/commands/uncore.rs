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

use hardware_knobs::uncore::check_support;
use hardware_knobs::uncore::discover_domains;
use hardware_knobs::uncore::read_current_khz;
use hardware_knobs::uncore::read_ratio_limit;
use hardware_knobs::uncore::self_test;

use crate::cli::UncoreCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: UncoreCommand, context: &Context) -> eyre::Result<i32> {
    let domains = discover_domains(context.paths())?;

    match command {
        UncoreCommand::Info => {
            if domains.is_empty() {
                println!("no uncore frequency domains, is intel_uncore_frequency loaded?");
            }
            for domain in &domains {
                println!("{domain}: {}", domain.limits()?);
            }

            if context.probe.msr_available() {
                let device = context.msr()?;
                match read_ratio_limit(&device) {
                    Ok(limit) => println!(
                        "MSR ratio limit: {}-{} kHz",
                        limit.min_khz(),
                        limit.max_khz()
                    ),
                    Err(error) => tracing::debug!("uncore ratio limit MSR: {error}"),
                }
                if let Ok(current) = read_current_khz(&device) {
                    println!("MSR current frequency: {current} kHz");
                }
            }
            Ok(0)
        }
        UncoreCommand::Set {
            min_khz,
            max_khz,
            domain,
        } => {
            let selected = match domain {
                Some(index) => match domains.get(index) {
                    Some(domain) => std::slice::from_ref(domain),
                    None => eyre::bail!("domain {index} doesn't exist, {} found", domains.len()),
                },
                None => &domains[..],
            };
            for domain in selected {
                domain.set_range(min_khz, max_khz)?;
                println!("{domain}: {}", domain.limits()?);
            }
            Ok(0)
        }
        UncoreCommand::Test => {
            context.warn_unless_root();
            check_support(context.paths(), &context.probe)?;
            let mut harness = context.harness();
            let suite = self_test(&domains, &mut harness, context.config.bench.buffer_size)?;
            Ok(report(&suite))
        }
    }
}
