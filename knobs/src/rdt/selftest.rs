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

use std::time::Duration;
use std::time::Instant;

use hwk_msr::MSRAccess;
use hwk_shared::types::ClosId;
use hwk_shared::types::LogicalCoreId;

use super::controller::Rdt;
use super::monitor::RdtMonitor;
use crate::KResult;
use crate::KnobError;
use crate::TestSuite;

const RESTRICTED_MASK: u64 = 0x3FF;
const SWITCH_ROUNDS: u32 = 1000;

/// Basic read, cache allocation, bandwidth monitoring and CLOS switching on
/// logical CPU 0, using `clos` as the scratch class of service.
///
/// The RDT state is restored from a snapshot afterwards.
pub fn self_test<A: MSRAccess>(rdt: &Rdt<A>, clos: ClosId) -> KResult<TestSuite> {
    if clos == ClosId::DEFAULT {
        return Err(KnobError::invalid_param(
            "CLOS id",
            "the default class of service can't be used as scratch",
        ));
    }

    let snapshot = rdt.snapshot()?;
    let core_id = LogicalCoreId::new(0);
    let mut suite = TestSuite::new("RDT");

    suite.run("basic read", || basic_read(rdt, core_id));
    suite.run("cache allocation", || cache_allocation(rdt, clos));
    if rdt.features().has_monitoring() {
        suite.run("bandwidth monitoring", || bandwidth_monitoring(rdt, core_id));
    } else {
        suite.skip("bandwidth monitoring", "the CPU doesn't support RDT monitoring");
    }
    suite.run("dynamic CLOS switching", || dynamic_switching(rdt, core_id, clos));

    if let Err(error) = rdt.restore(&snapshot) {
        tracing::warn!("restoring RDT state after the self-test failed: {error}");
    }

    Ok(suite)
}

fn basic_read<A: MSRAccess>(rdt: &Rdt<A>, core_id: LogicalCoreId) -> KResult<()> {
    let mask = rdt.read_l3_mask(ClosId::DEFAULT)?;
    tracing::debug!("default L3 mask for CLOS 0: {mask:#X}");

    let clos = rdt.read_clos_for_cpu(core_id)?;
    tracing::debug!("logical CPU {core_id} is in CLOS {clos}");

    Ok(())
}

fn cache_allocation<A: MSRAccess>(rdt: &Rdt<A>, clos: ClosId) -> KResult<()> {
    let original = rdt.read_l3_mask(clos)?;

    let result = rdt
        .configure_clos(clos, RESTRICTED_MASK, None)
        .and_then(|()| rdt.read_l3_mask(clos))
        .and_then(|read_back| {
            if read_back != RESTRICTED_MASK {
                return Err(KnobError::verify_failed(
                    format!("CLOS {clos} L3 mask"),
                    RESTRICTED_MASK,
                    read_back,
                ));
            }
            tracing::debug!("CLOS {clos} L3 mask set to {read_back:#X}");
            Ok(())
        });

    let restored = rdt.restore_l3_mask(clos, original);
    result.and(restored)
}

fn bandwidth_monitoring<A: MSRAccess>(rdt: &Rdt<A>, core_id: LogicalCoreId) -> KResult<()> {
    let rmid = rdt.read_rmid(core_id)?;
    let monitor = RdtMonitor::new(rdt, core_id, rmid, Duration::from_millis(100))?;
    let reading = monitor.read()?;
    tracing::debug!("RMID {rmid} counters: {reading:?}");

    Ok(())
}

fn dynamic_switching<A: MSRAccess>(
    rdt: &Rdt<A>,
    core_id: LogicalCoreId,
    clos: ClosId,
) -> KResult<()> {
    let original = rdt.read_clos_for_cpu(core_id)?;

    let switch = || -> KResult<()> {
        rdt.assign_cpu_to_clos(core_id, clos)?;
        let current = rdt.read_clos_for_cpu(core_id)?;
        if current != clos {
            return Err(KnobError::verify_failed(
                format!("logical CPU {core_id} CLOS"),
                clos.get() as u64,
                current.get() as u64,
            ));
        }

        let start = Instant::now();
        for round in 0..SWITCH_ROUNDS {
            let target = if round % 2 == 0 { ClosId::DEFAULT } else { clos };
            rdt.assign_cpu_to_clos(core_id, target)?;
        }
        let average = start.elapsed() / SWITCH_ROUNDS;
        tracing::info!("average CLOS switching latency: {} us", average.as_micros());

        Ok(())
    };

    let result = switch();
    let restored = rdt.assign_cpu_to_clos(core_id, original);
    result.and(restored)
}
