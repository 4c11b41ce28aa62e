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

use crate::context::Context;

#[cfg(target_arch = "x86_64")]
pub fn run(context: &Context) -> eyre::Result<i32> {
    use hwk_probe::cpuid::CpuidReport;

    let report = CpuidReport::collect();
    println!("Vendor: {}", report.vendor.as_deref().unwrap_or("unknown"));
    println!("Brand: {}", report.brand.as_deref().unwrap_or("unknown"));
    println!(
        "Family {} model {} stepping {}",
        report.family, report.model, report.stepping
    );
    match context.probe.cpuinfo() {
        Ok(cpuinfo) => println!("Logical CPUs: {}", cpuinfo.logical_cpus()),
        Err(error) => tracing::warn!("cpuinfo is unavailable: {error}"),
    }

    println!("Features:");
    for (name, supported) in &report.features {
        println!("  {name:<8} {}", if *supported { "yes" } else { "no" });
    }

    match &report.rdt_allocation {
        Some(allocation) => {
            println!("RDT allocation:");
            if let (Some(length), Some(clos)) = (allocation.l3_cbm_length, allocation.l3_highest_clos) {
                println!("  L3 CAT: {length} bit way mask, highest CLOS {clos}");
            }
            if let (Some(throttle), Some(clos)) =
                (allocation.mba_max_throttle, allocation.mba_highest_clos)
            {
                println!("  MBA: max throttle {throttle}, highest CLOS {clos}");
            }
        }
        None => println!("RDT allocation: not supported"),
    }
    match &report.rdt_monitoring {
        Some(monitoring) => {
            println!("RDT monitoring:");
            println!("  max RMID {}", monitoring.max_rmid);
            println!("  conversion factor {} bytes", monitoring.conversion_factor);
            println!(
                "  LLC occupancy {}, total MBM {}, local MBM {}",
                monitoring.occupancy, monitoring.total_bandwidth, monitoring.local_bandwidth
            );
        }
        None => println!("RDT monitoring: not supported"),
    }

    Ok(0)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn run(_context: &Context) -> eyre::Result<i32> {
    eyre::bail!("CPUID is only available on x86_64")
}
