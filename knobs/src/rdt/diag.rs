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

use std::fmt;
use std::io;

use hwk_msr::MSRFileOpMode;
use hwk_msr::MsrDevice;
use hwk_probe::Probe;
use hwk_shared::types::LogicalCoreId;

const RDT_FLAGS: [&str; 4] = ["rdt_a", "cat_l3", "mba", "cqm"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    pub advice: Option<String>,
}

/// Why RDT might not work on this machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdtDiagnosis {
    pub checks: Vec<DiagCheck>,
}

pub fn diagnose(probe: &Probe) -> RdtDiagnosis {
    let checks = vec![
        check_cpu_flags(probe),
        check_msr_device(probe),
        check_resctrl(probe),
        check_root(),
    ];

    RdtDiagnosis { checks }
}

fn check_cpu_flags(probe: &Probe) -> DiagCheck {
    let present = RDT_FLAGS
        .iter()
        .copied()
        .filter(|flag| probe.has_flag(flag))
        .collect::<Vec<_>>();

    if present.is_empty() {
        return DiagCheck {
            name: "CPU support",
            passed: false,
            detail: format!("none of {} is reported", RDT_FLAGS.join(", ")),
            advice: Some("this CPU or its hypervisor doesn't expose RDT".to_string()),
        };
    }

    DiagCheck {
        name: "CPU support",
        passed: true,
        detail: format!("reported: {}", present.join(", ")),
        advice: None,
    }
}

fn check_msr_device(probe: &Probe) -> DiagCheck {
    let device = MsrDevice::new(probe.paths().clone(), 1);
    let core_id = LogicalCoreId::new(0);
    let path = device.device_path(core_id);

    let error = match device.open(core_id, MSRFileOpMode::MSRReadWrite) {
        Ok(_) => {
            return DiagCheck {
                name: "MSR device",
                passed: true,
                detail: format!("{path:?} opens for read and write"),
                advice: None,
            }
        }
        Err(error) => error,
    };

    let advice = match error.io_kind() {
        Some(io::ErrorKind::PermissionDenied) => {
            "run as root or with the CAP_SYS_RAWIO capability".to_string()
        }
        Some(io::ErrorKind::NotFound) => "load the msr module: modprobe msr".to_string(),
        _ => "check dmesg for msr driver errors".to_string(),
    };

    DiagCheck {
        name: "MSR device",
        passed: false,
        detail: error.to_string(),
        advice: Some(advice),
    }
}

fn check_resctrl(probe: &Probe) -> DiagCheck {
    let path = probe.paths().sys("fs/resctrl");
    if probe.resctrl_mounted() {
        return DiagCheck {
            name: "resctrl filesystem",
            passed: true,
            detail: format!("mounted at {path:?}"),
            advice: None,
        };
    }

    DiagCheck {
        name: "resctrl filesystem",
        passed: false,
        detail: format!("not mounted at {path:?}"),
        advice: Some(format!(
            "mount it as root: mount -t resctrl resctrl {}; if MSR writes still fail the kernel              may reserve RDT for resctrl (CONFIG_X86_CPU_RESCTRL=y)",
            path.display()
        )),
    }
}

fn check_root() -> DiagCheck {
    let passed = hwk_probe::is_root();
    DiagCheck {
        name: "root privileges",
        passed,
        detail: if passed {
            "running as root".to_string()
        } else {
            "running as an unprivileged user".to_string()
        },
        advice: (!passed).then(|| "rerun with sudo".to_string()),
    }
}

impl RdtDiagnosis {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|check| check.passed).count()
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RdtDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== RDT diagnostics ===")?;
        for check in &self.checks {
            let status = if check.passed { "OK" } else { "FAIL" };
            writeln!(f, "[{status:>4}] {}: {}", check.name, check.detail)?;
            if let Some(advice) = &check.advice {
                writeln!(f, "       {advice}")?;
            }
        }
        write!(f, "Checks passed: {}/{}", self.passed(), self.total())
    }
}
