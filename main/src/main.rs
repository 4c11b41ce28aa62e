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

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

mod cli;
mod commands;
mod context;

use std::process::ExitCode;

use clap::Parser;
use eyre::WrapErr as _;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use hardware_knobs::KnobError;
use hardware_knobs::StopToken;
use hwk_config::load_config;

use crate::cli::Args;
use crate::context::Context;

fn main() -> eyre::Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(args.config_path.as_deref())?;

    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .with_default_directive(Directive::from(config.logs.log_level))
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("setting global tracing subscriber failed")?;
    tracing_log::LogTracer::init()?;

    let stop = StopToken::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        tracing::info!("stop requested, finishing the current step");
        handler_stop.stop();
    })
    .wrap_err("installing the SIGINT/SIGTERM handler failed")?;

    tracing::debug!("running with config {config:?}");
    let context = Context::new(config, stop);

    match commands::run(args.tool, &context) {
        Ok(code) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        Err(error) => {
            let hint = error
                .chain()
                .find_map(|cause| cause.downcast_ref::<KnobError>())
                .and_then(KnobError::hint);
            if let Some(hint) = hint {
                tracing::warn!("{hint}");
            }
            Err(error)
        }
    }
}
