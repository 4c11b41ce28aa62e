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

use parking_lot::Mutex;

use hwk_msr::broadcast_cores;
use hwk_msr::registers::mba_thrtl;
use hwk_msr::registers::pqr_assoc;
use hwk_msr::registers::IA32_L3_MASK_0;
use hwk_msr::registers::IA32_MBA_THRTL_0;
use hwk_msr::registers::IA32_PQR_ASSOC;
use hwk_msr::write_all_cpus;
use hwk_msr::MSRAccess;
use hwk_msr::MSRItem;
use hwk_msr::MSRSnapshot;
use hwk_msr::ALL_CPUS;
use hwk_shared::types::ClosId;
use hwk_shared::types::LogicalCoreId;
use hwk_shared::types::Rmid;

use super::clos_id;
use super::features::RdtFeatures;
use super::rmid;
use crate::KResult;
use crate::KnobError;

/// Largest memory bandwidth throttle, in percent.
pub const MAX_THROTTLE: u8 = 100;

const L3_MASK_BITS: u32 = 32;

/// Class-of-service controller over the RDT registers.
///
/// Read-modify-write of `IA32_PQR_ASSOC` and the event-select/counter pair are
/// serialized inside the process. Other processes touching the same registers
/// aren't.
#[derive(Debug)]
pub struct Rdt<A> {
    access: A,
    features: RdtFeatures,
    pqr_lock: Mutex<()>,
    pub(super) qm_lock: Mutex<()>,
}

/// CLOS masks, throttles and per-CPU assignments taken before a tool changes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdtSnapshot {
    clos_registers: Vec<(u32, u64)>,
    assignments: MSRSnapshot,
}

impl<A: MSRAccess> Rdt<A> {
    pub fn new(access: A, features: RdtFeatures) -> Self {
        Self {
            access,
            features,
            pqr_lock: Mutex::new(()),
            qm_lock: Mutex::new(()),
        }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn features(&self) -> RdtFeatures {
        self.features
    }

    pub fn cpu_count(&self) -> usize {
        self.access.cpu_count()
    }

    /// Moves a logical CPU into `clos`, the RMID bits of the association are kept.
    pub fn assign_cpu_to_clos(&self, core_id: LogicalCoreId, clos: ClosId) -> KResult<()> {
        let item = MSRItem::with_field(IA32_PQR_ASSOC, pqr_assoc::CLOS, clos.get() as u64);

        let _guard = self.pqr_lock.lock();
        self.access.write_item(core_id, item)?;
        tracing::debug!("logical CPU {core_id} assigned to CLOS {clos}");

        Ok(())
    }

    pub fn read_clos_for_cpu(&self, core_id: LogicalCoreId) -> KResult<ClosId> {
        let value = self.access.read(core_id, IA32_PQR_ASSOC)?;
        clos_id(pqr_assoc::CLOS.get(value) as u32)
    }

    /// Tags a logical CPU with `rmid`, the CLOS bits of the association are kept.
    pub fn assign_rmid(&self, core_id: LogicalCoreId, rmid: Rmid) -> KResult<()> {
        let item = MSRItem::with_field(IA32_PQR_ASSOC, pqr_assoc::RMID, rmid.get() as u64);

        let _guard = self.pqr_lock.lock();
        self.access.write_item(core_id, item)?;
        tracing::debug!("logical CPU {core_id} tagged with RMID {rmid}");

        Ok(())
    }

    pub fn read_rmid(&self, core_id: LogicalCoreId) -> KResult<Rmid> {
        let value = self.access.read(core_id, IA32_PQR_ASSOC)?;
        rmid(pqr_assoc::RMID.get(value) as u32)
    }

    /// Programs the L3 way mask of `clos` on every CPU and, if requested and
    /// supported, its bandwidth throttle.
    ///
    /// A throttle of `None` or `0` leaves the throttle register alone. When the
    /// throttle write fails the mask is already applied.
    pub fn configure_clos(&self, clos: ClosId, l3_mask: u64, throttle: Option<u8>) -> KResult<()> {
        validate_l3_mask(l3_mask)?;
        if let Some(throttle) = throttle {
            validate_throttle(throttle)?;
        }

        write_all_cpus(&self.access, l3_mask_register(clos), l3_mask, ALL_CPUS)?;
        tracing::info!("CLOS {clos}: L3 mask {l3_mask:#X}");

        match throttle {
            None | Some(0) => {}
            Some(throttle) if self.features.mba => {
                write_all_cpus(&self.access, throttle_register(clos), throttle as u64, ALL_CPUS)?;
                tracing::info!("CLOS {clos}: memory bandwidth throttle {throttle}%");
            }
            Some(throttle) => {
                tracing::warn!(
                    "memory bandwidth allocation isn't supported, throttle {throttle}% for CLOS {clos} is skipped"
                );
            }
        }

        Ok(())
    }

    /// Drops the bandwidth throttle of `clos` on every CPU, nothing to do without MBA.
    pub fn clear_throttle(&self, clos: ClosId) -> KResult<()> {
        if !self.features.mba {
            return Ok(());
        }

        write_all_cpus(&self.access, throttle_register(clos), 0, ALL_CPUS)?;
        tracing::info!("CLOS {clos}: memory bandwidth unthrottled");
        Ok(())
    }

    /// L3 way mask of `clos`, as seen by logical CPU 0.
    pub fn read_l3_mask(&self, clos: ClosId) -> KResult<u64> {
        let value = self.access.read(LogicalCoreId::new(0), l3_mask_register(clos))?;
        Ok(value)
    }

    /// Writes a previously read mask back on every CPU, without validating it.
    pub fn restore_l3_mask(&self, clos: ClosId, l3_mask: u64) -> KResult<()> {
        write_all_cpus(&self.access, l3_mask_register(clos), l3_mask, ALL_CPUS)?;
        Ok(())
    }

    pub fn read_throttle(&self, clos: ClosId) -> KResult<u64> {
        if !self.features.mba {
            return Err(KnobError::not_supported(
                "memory bandwidth allocation",
                "the CPU doesn't report mba",
            ));
        }

        let value = self.access.read(LogicalCoreId::new(0), throttle_register(clos))?;
        Ok(mba_thrtl::DELAY.get(value))
    }

    pub fn snapshot(&self) -> KResult<RdtSnapshot> {
        let core_id = LogicalCoreId::new(0);
        let mut clos_registers = Vec::new();
        let registers = self
            .features
            .l3_classes()
            .map(l3_mask_register)
            .chain(self.features.mba_classes().map(throttle_register));
        for register_id in registers {
            clos_registers.push((register_id, self.access.read(core_id, register_id)?));
        }

        let _guard = self.pqr_lock.lock();
        let assignments = MSRSnapshot::capture(
            &self.access,
            &[IA32_PQR_ASSOC],
            broadcast_cores(&self.access, ALL_CPUS),
        )?;

        Ok(RdtSnapshot {
            clos_registers,
            assignments,
        })
    }

    /// Writes everything in `snapshot` back. Every register is attempted, the
    /// first error is returned afterwards.
    pub fn restore(&self, snapshot: &RdtSnapshot) -> KResult<()> {
        let mut first_error = None;

        for &(register_id, value) in &snapshot.clos_registers {
            if let Err(error) = write_all_cpus(&self.access, register_id, value, ALL_CPUS) {
                tracing::warn!("restoring register_id {register_id:#X} failed: {error}");
                first_error.get_or_insert(KnobError::from(error));
            }
        }

        let _guard = self.pqr_lock.lock();
        if let Err(error) = snapshot.assignments.restore(&self.access) {
            first_error.get_or_insert(KnobError::from(error));
        }

        match first_error {
            Some(error) => Err(error),
            None => {
                tracing::info!("RDT configuration restored");
                Ok(())
            }
        }
    }

    /// Puts every CPU back into the default class of service.
    pub fn reset_assignments(&self) -> KResult<()> {
        for core_id in broadcast_cores(&self.access, ALL_CPUS) {
            self.assign_cpu_to_clos(core_id, ClosId::DEFAULT)?;
        }
        Ok(())
    }
}

impl RdtSnapshot {
    pub fn clos_value(&self, register_id: u32) -> Option<u64> {
        self.clos_registers
            .iter()
            .find(|(id, _)| *id == register_id)
            .map(|(_, value)| *value)
    }

    pub fn assignment(&self, core_id: LogicalCoreId) -> Option<u64> {
        self.assignments.value(core_id, IA32_PQR_ASSOC)
    }
}

pub(crate) fn l3_mask_register(clos: ClosId) -> u32 {
    IA32_L3_MASK_0 + clos.get()
}

pub(crate) fn throttle_register(clos: ClosId) -> u32 {
    IA32_MBA_THRTL_0 + clos.get()
}

/// A capacity bitmask must be a single non-empty run of ways.
fn validate_l3_mask(l3_mask: u64) -> KResult<()> {
    if l3_mask == 0 || l3_mask >> L3_MASK_BITS != 0 {
        return Err(KnobError::invalid_param(
            "L3 mask",
            format!("{l3_mask:#X} must be non-zero and fit in {L3_MASK_BITS} bits"),
        ));
    }

    let run = l3_mask >> l3_mask.trailing_zeros();
    if run & (run + 1) != 0 {
        return Err(KnobError::invalid_param(
            "L3 mask",
            format!("{l3_mask:#X} isn't a contiguous run of ways"),
        ));
    }

    Ok(())
}

fn validate_throttle(throttle: u8) -> KResult<()> {
    if throttle > MAX_THROTTLE {
        return Err(KnobError::invalid_param(
            "throttle",
            format!("{throttle}% is above {MAX_THROTTLE}%"),
        ));
    }
    Ok(())
}
