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

use clap::Args as ClapArgs;
use clap::Parser;
use clap::Subcommand;

/// Diagnostics and benchmarks for x86 hardware knobs.
#[derive(Parser, Debug)]
#[command(name = "hwknobs", version, about)]
pub struct Args {
    /// Optional TOML config, `HWK_*` environment variables are applied on top.
    #[arg(short, long, global = true)]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub tool: Tool,
}

#[derive(Subcommand, Debug)]
pub enum Tool {
    /// CPUID feature and RDT capability report
    Cpuid,
    /// Raw model specific register access
    #[command(subcommand)]
    Msr(MsrCommand),
    /// Resource Director Technology: cache allocation and bandwidth monitoring
    #[command(subcommand)]
    Rdt(RdtCommand),
    /// Hardware prefetcher control
    #[command(subcommand)]
    Prefetch(PrefetchCommand),
    /// Simultaneous multi-threading control
    #[command(subcommand)]
    Smt(SmtCommand),
    /// Package energy counters and power limits
    #[command(subcommand)]
    Rapl(RaplCommand),
    /// Uncore frequency limits
    #[command(subcommand)]
    Uncore(UncoreCommand),
    /// CPU idle states
    #[command(subcommand)]
    Cstate(CStateCommand),
    /// CPU frequency scaling
    #[command(subcommand)]
    Cpufreq(CpuFreqCommand),
    /// Device (GPU) frequency scaling
    #[command(subcommand)]
    Devfreq(DevfreqCommand),
    /// Thermal zones, cooling devices and frequency capping
    #[command(subcommand)]
    Thermal(ThermalCommand),
    /// CXL memory devices and regions
    #[command(subcommand)]
    Cxl(CxlCommand),
}

#[derive(Subcommand, Debug)]
pub enum MsrCommand {
    Read {
        cpu: u32,
        #[arg(value_parser = parse_u32)]
        register: u32,
    },
    Write {
        cpu: u32,
        #[arg(value_parser = parse_u32)]
        register: u32,
        #[arg(value_parser = parse_u64)]
        value: u64,
    },
    ReadAll {
        #[arg(value_parser = parse_u32)]
        register: u32,
        /// Only the first N logical CPUs.
        #[arg(long)]
        max: Option<usize>,
    },
    WriteAll {
        #[arg(value_parser = parse_u32)]
        register: u32,
        #[arg(value_parser = parse_u64)]
        value: u64,
        #[arg(long)]
        max: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RdtCommand {
    /// Read, allocation, monitoring and CLOS switching sub-tests
    Test {
        /// Scratch CLOS, defaults to `rdt-bench.clos`.
        #[arg(long)]
        clos: Option<u32>,
    },
    /// Multi-threaded bandwidth under every allocation config, or just one
    Bench { index: Option<usize> },
    Monitor {
        #[arg(default_value_t = 10)]
        secs: u64,
        #[arg(long, default_value_t = 0)]
        cpu: u32,
        #[arg(long, default_value_t = 1)]
        rmid: u32,
    },
    /// Explains why RDT may not work here
    Diag,
    Configure {
        clos: u32,
        #[arg(value_parser = parse_u64)]
        l3_mask: u64,
        /// Memory bandwidth throttle, 0-100.
        throttle: Option<u8>,
    },
    Assign { cpu: u32, clos: u32 },
}

#[derive(Subcommand, Debug)]
pub enum PrefetchCommand {
    Show,
    /// Applies a named preset to every CPU
    Set { preset: String },
    Test,
    Bench {
        /// One untimed pass before each measurement.
        #[arg(long)]
        warmup: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SmtCommand {
    Status,
    /// on, off or forceoff
    Set { control: String },
    Test,
    Bench,
}

#[derive(Subcommand, Debug)]
pub enum RaplCommand {
    Info,
    Test,
    /// Shows the package limit, or sets PL1 when watts are given
    Limit {
        watts: Option<f64>,
        #[arg(long, default_value_t = 1000)]
        window_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum UncoreCommand {
    Info,
    Set {
        min_khz: u64,
        max_khz: u64,
        /// Domain index, all domains when absent.
        #[arg(long)]
        domain: Option<usize>,
    },
    Test,
}

#[derive(ClapArgs, Debug)]
pub struct Sampling {
    #[arg(default_value_t = 10)]
    pub secs: u64,
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum CStateCommand {
    Info {
        #[arg(long, default_value_t = 0)]
        cpu: u32,
    },
    Enable {
        state: u32,
        /// A single CPU, every online CPU when absent.
        #[arg(long)]
        cpu: Option<u32>,
    },
    Disable {
        state: u32,
        #[arg(long)]
        cpu: Option<u32>,
    },
    /// Disables every state deeper than the given index
    Max { state: u32 },
    /// Shows the idle governor, or switches to the given one
    Governor { name: Option<String> },
    Monitor {
        #[command(flatten)]
        sampling: Sampling,
        /// CPU list such as `0-3,8`, every online CPU when absent.
        #[arg(long)]
        cpus: Option<String>,
    },
    Bench,
}

#[derive(Subcommand, Debug)]
pub enum CpuFreqCommand {
    Info,
    Governor {
        name: Option<String>,
        #[arg(long)]
        policy: Option<u32>,
    },
    Limits {
        min_khz: u64,
        max_khz: u64,
        #[arg(long)]
        policy: Option<u32>,
    },
    /// Fixed frequency through the userspace governor
    Set {
        khz: u64,
        #[arg(long)]
        policy: Option<u32>,
    },
    /// Time spent at each frequency
    Stats {
        #[arg(long)]
        policy: Option<u32>,
    },
    Monitor {
        #[command(flatten)]
        sampling: Sampling,
    },
    /// Performance and power across frequencies, the frequency table when none are given
    Bench { khz: Vec<u64> },
}

#[derive(Subcommand, Debug)]
pub enum DevfreqCommand {
    List,
    Governor {
        name: Option<String>,
        #[arg(long, default_value_t = 0)]
        device: usize,
    },
    Range {
        min_hz: u64,
        max_hz: u64,
        #[arg(long, default_value_t = 0)]
        device: usize,
    },
    Performance {
        #[arg(long, default_value_t = 0)]
        device: usize,
    },
    Powersave {
        #[arg(long, default_value_t = 0)]
        device: usize,
    },
    Monitor {
        #[command(flatten)]
        sampling: Sampling,
    },
    Bench {
        #[arg(long, default_value_t = 0)]
        device: usize,
        /// Time spent sampling at each frequency.
        #[arg(long, default_value_t = 2000)]
        dwell_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ThermalCommand {
    Status,
    /// Lists cooling devices, or sets the state of one
    Cooling {
        device: Option<u32>,
        state: Option<u64>,
    },
    /// Caps CPU frequency by temperature until stopped or for the given seconds
    Cap { secs: Option<u64> },
    Monitor {
        #[command(flatten)]
        sampling: Sampling,
    },
    Bench {
        /// Shorter warm-up, run and cool-down phases.
        #[arg(long)]
        quick: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CxlCommand {
    Scan,
    Test,
}

/// Accepts `0x` prefixed hex or decimal.
fn parse_u64(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|error| format!("'{value}' is not a number: {error}"))
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = parse_u64(value)?;
    u32::try_from(parsed).map_err(|_| format!("'{value}' doesn't fit into 32 bits"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn registers_accept_hex_and_decimal() {
        assert_eq!(parse_u32("0x1A4"), Ok(0x1A4));
        assert_eq!(parse_u32("420"), Ok(420));
        assert_eq!(parse_u64("0XFF"), Ok(0xFF));
        assert!(parse_u32("0x100000000").is_err());
        assert!(parse_u64("ten").is_err());
    }

    #[test]
    fn nested_subcommands_parse() {
        let args = Args::parse_from(["hwknobs", "msr", "read", "3", "0x1A4"]);
        assert!(matches!(
            args.tool,
            Tool::Msr(MsrCommand::Read {
                cpu: 3,
                register: 0x1A4
            })
        ));

        let args = Args::parse_from(["hwknobs", "cstate", "monitor", "5", "--cpus", "0-3"]);
        match args.tool {
            Tool::Cstate(CStateCommand::Monitor { sampling, cpus }) => {
                assert_eq!(sampling.secs, 5);
                assert_eq!(sampling.interval_ms, 1000);
                assert_eq!(cpus.as_deref(), Some("0-3"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
