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

use hardware_knobs::prefetch::check_support;
use hardware_knobs::prefetch::describe;
use hardware_knobs::prefetch::preset;
use hardware_knobs::prefetch::self_test;
use hardware_knobs::prefetch::Prefetch;
use hardware_knobs::prefetch::PrefetchBench;
use hardware_knobs::prefetch::PrefetchBenchRow;
use hardware_knobs::prefetch::PRESETS;

use crate::cli::PrefetchCommand;
use crate::context::report;
use crate::context::Context;

pub fn run(command: PrefetchCommand, context: &Context) -> eyre::Result<i32> {
    check_support(&context.probe)?;
    let prefetch = Prefetch::new(context.msr()?);
    let bench = &context.config.bench;

    match command {
        PrefetchCommand::Show => {
            let states = prefetch.read_all()?;
            if let Some(first) = states.first() {
                for (name, enabled) in describe(*first) {
                    println!("{name:<36} {}", if enabled { "enabled" } else { "disabled" });
                }
            }
            for (cpu, disable) in states.iter().enumerate() {
                println!("CPU {cpu:<4} disabled: {disable}");
            }
            println!("Presets:");
            for preset in &PRESETS {
                println!("  {:<24} {}", preset.name, preset.description);
            }
            Ok(0)
        }
        PrefetchCommand::Set { preset: name } => {
            let Some(preset) = preset(&name) else {
                let names = PRESETS.iter().map(|preset| preset.name).collect::<Vec<_>>();
                eyre::bail!("unknown preset '{name}', expected one of {}", names.join(", "));
            };
            prefetch.apply_verified(preset.disable)?;
            println!("{}: {}", preset.name, preset.description);
            Ok(0)
        }
        PrefetchCommand::Test => {
            context.warn_unless_root();
            let mut harness = context.harness();
            let suite = self_test(&prefetch, &mut harness, bench.buffer_size)?;
            Ok(report(&suite))
        }
        PrefetchCommand::Bench { warmup } => {
            context.warn_unless_root();
            let harness = context.harness_with_warmup(warmup || bench.warmup);
            let mut prefetch_bench =
                PrefetchBench::new(&prefetch, harness, bench.buffer_size, bench.iterations);

            println!("{}", PrefetchBenchRow::header());
            prefetch_bench.run(|row| println!("{row}"))?;
            Ok(0)
        }
    }
}
