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

//! Device frequency scaling (GPUs and other accelerators) through the
//! kernel devfreq class.

mod bench;
mod device;

#[cfg(test)]
mod tests;

use std::time::Duration;
use std::time::Instant;

use hwk_shared::SysPaths;

pub use bench::DevfreqSweep;
pub use bench::DevfreqSweepRow;
pub use device::discover_devices;
pub use device::DevfreqDevice;
pub use device::DevfreqInfo;
pub use device::DevfreqState;

use crate::KResult;
use crate::KnobError;
use crate::StopToken;

/// Picks a device by position in [`discover_devices`] order.
pub fn device_at(paths: &SysPaths, index: usize) -> KResult<DevfreqDevice> {
    let mut devices = discover_devices(paths)?;
    if devices.is_empty() {
        return Err(KnobError::not_supported(
            "devfreq control",
            "no devfreq devices in sysfs",
        ));
    }
    if index >= devices.len() {
        return Err(KnobError::invalid_param(
            "devfreq device",
            format!("index {index} is out of range, {} devices found", devices.len()),
        ));
    }
    Ok(devices.swap_remove(index))
}

/// Samples the current frequency of every device each `interval` until
/// `duration` passes or a stop is requested.
pub fn monitor(
    devices: &[DevfreqDevice],
    interval: Duration,
    duration: Duration,
    stop: &StopToken,
    mut on_sample: impl FnMut(Duration, &[Option<u64>]),
) -> usize {
    let start = Instant::now();
    let mut samples = 0;

    while start.elapsed() < duration {
        let current = devices
            .iter()
            .map(|device| {
                device
                    .current_hz()
                    .map_err(|error| tracing::debug!("{}: {error}", device.name))
                    .ok()
                    .flatten()
            })
            .collect::<Vec<_>>();
        on_sample(start.elapsed(), &current);
        samples += 1;

        if !stop.sleep(interval) {
            tracing::info!("devfreq monitoring stopped after {samples} samples");
            break;
        }
    }
    samples
}
