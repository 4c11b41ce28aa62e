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

use std::path::PathBuf;
use std::time::Duration;

use hwk_shared::types::ClosId;
use hwk_shared::SysPaths;
use tracing_subscriber::filter::LevelFilter;

use crate::config_loader::load_config;
use crate::unresolved_config::UnresolvedKnobsConfig;
use crate::Bench;
use crate::KnobsConfig;
use crate::Logs;
use crate::RdtBench;
use crate::SmtBench;
use crate::Thermal;

fn test_config_path(name: &str) -> String {
    let mut manifest_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_path.push("src/tests");
    manifest_path.push(name);
    manifest_path.to_string_lossy().into_owned()
}

#[test]
fn parse_basic_config() {
    let actual_config = load_config(Some(&test_config_path("default.toml"))).unwrap();

    let expected_config = KnobsConfig {
        logs: Logs {
            log_level: LevelFilter::DEBUG,
        },
        paths: SysPaths::under("/tmp/fake"),
        bench: Bench {
            settle: Duration::from_millis(250),
            warmup: true,
            iterations: 3,
            buffer_size: 16 * 1024 * 1024,
        },
        rdt_bench: RdtBench {
            duration: Duration::from_secs(5),
            pause: Duration::from_secs(1),
            buffer_size: 8 * 1024 * 1024,
            clos: ClosId::new(2).unwrap(),
            monitor_interval: Duration::from_millis(50),
        },
        smt_bench: SmtBench {
            duration: Duration::from_millis(500),
            buffer_size: 4 * 1024 * 1024,
            max_threads: 4,
        },
        thermal: Thermal {
            low_celsius: 60.0,
            high_celsius: 80.0,
            critical_celsius: 90.0,
            freq_min_khz: 1_200_000,
            poll_interval: Duration::from_millis(500),
        },
    };

    assert_eq!(actual_config, expected_config);
}

#[test]
fn defaults_without_file() {
    let config = UnresolvedKnobsConfig::default().resolve().unwrap();

    assert_eq!(config.logs.log_level, LevelFilter::INFO);
    assert_eq!(config.paths, SysPaths::default());
    assert_eq!(config.bench.settle, Duration::from_millis(100));
    assert!(!config.bench.warmup);
    assert_eq!(config.rdt_bench.clos, ClosId::new(1).unwrap());
    assert_eq!(config.thermal.freq_min_khz, 800_000);
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_config(Some(&test_config_path("absent.toml"))).is_err());
}

#[test]
fn invalid_sections_are_rejected() {
    let mut config = UnresolvedKnobsConfig::default();
    config.rdt_bench.clos = 16;
    assert!(config.resolve().is_err());

    let mut config = UnresolvedKnobsConfig::default();
    config.rdt_bench.clos = 0;
    assert!(config.resolve().is_err());

    let mut config = UnresolvedKnobsConfig::default();
    config.thermal.high_celsius = config.thermal.critical_celsius;
    assert!(config.resolve().is_err());

    let mut config = UnresolvedKnobsConfig::default();
    config.smt_bench.max_threads = 33;
    assert!(config.resolve().is_err());

    let mut config = UnresolvedKnobsConfig::default();
    config.bench.buffer_size_mb = 0;
    assert!(config.resolve().is_err());
}
