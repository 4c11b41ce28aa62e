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
use std::path::PathBuf;

use hwk_shared::SysPaths;
use hwk_sysfs::prefixed_entries;
use hwk_sysfs::read_optional;
use hwk_sysfs::read_value;
use hwk_sysfs::write_value;

use super::UncoreLimits;
use crate::KResult;
use crate::KnobError;

pub(super) fn driver_root(paths: &SysPaths) -> PathBuf {
    paths.cpu_root().join("intel_uncore_frequency")
}

/// One `package_XX_die_YY` directory of the uncore frequency driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncoreDomain {
    pub package: u32,
    pub die: u32,
    pub path: PathBuf,
    /// Limits found at discovery, restored by [`UncoreDomain::restore`].
    pub initial_min_khz: u64,
    pub initial_max_khz: u64,
}

/// Domains ordered by package and die, a missing driver is an empty list.
pub fn discover_domains(paths: &SysPaths) -> KResult<Vec<UncoreDomain>> {
    let root = driver_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Ok(Vec::new());
    }

    let mut domains = Vec::new();
    for path in prefixed_entries(&root, "package_")? {
        if let Some(domain) = UncoreDomain::load(path)? {
            domains.push(domain);
        }
    }

    domains.sort_unstable_by_key(|domain| (domain.package, domain.die));
    tracing::debug!("found {} uncore domains", domains.len());
    Ok(domains)
}

fn parse_domain_name(name: &str) -> Option<(u32, u32)> {
    let (package, die) = name.strip_prefix("package_")?.split_once("_die_")?;
    Some((package.parse().ok()?, die.parse().ok()?))
}

impl UncoreDomain {
    fn load(path: PathBuf) -> KResult<Option<Self>> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some((package, die)) = parse_domain_name(&name) else {
            return Ok(None);
        };

        // older drivers don't expose the initial limits
        let initial_min_khz = match read_optional(path.join("initial_min_freq_khz"))? {
            Some(khz) => khz,
            None => read_value(path.join("min_freq_khz"))?,
        };
        let initial_max_khz = match read_optional(path.join("initial_max_freq_khz"))? {
            Some(khz) => khz,
            None => read_value(path.join("max_freq_khz"))?,
        };

        Ok(Some(Self {
            package,
            die,
            path,
            initial_min_khz,
            initial_max_khz,
        }))
    }

    pub fn name(&self) -> String {
        format!("package_{:02}_die_{:02}", self.package, self.die)
    }

    pub fn min_khz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("min_freq_khz"))?)
    }

    pub fn max_khz(&self) -> KResult<u64> {
        Ok(read_value(self.path.join("max_freq_khz"))?)
    }

    pub fn current_khz(&self) -> KResult<Option<u64>> {
        Ok(read_optional(self.path.join("current_freq_khz"))?)
    }

    pub fn limits(&self) -> KResult<UncoreLimits> {
        Ok(UncoreLimits {
            min_khz: self.min_khz()?,
            max_khz: self.max_khz()?,
            current_khz: self.current_khz()?,
        })
    }

    pub fn set_min_khz(&self, khz: u64) -> KResult<()> {
        write_value(self.path.join("min_freq_khz"), khz)?;
        Ok(())
    }

    pub fn set_max_khz(&self, khz: u64) -> KResult<()> {
        write_value(self.path.join("max_freq_khz"), khz)?;
        Ok(())
    }

    /// Writes both limits in an order that never leaves min above max.
    pub fn set_range(&self, min_khz: u64, max_khz: u64) -> KResult<()> {
        if min_khz > max_khz {
            return Err(KnobError::invalid_param(
                "uncore frequency range",
                format!("min {min_khz} kHz is above max {max_khz} kHz"),
            ));
        }

        if min_khz > self.max_khz()? {
            self.set_max_khz(max_khz)?;
            self.set_min_khz(min_khz)?;
        } else {
            self.set_min_khz(min_khz)?;
            self.set_max_khz(max_khz)?;
        }
        tracing::info!("{} limited to {min_khz}..{max_khz} kHz", self.name());
        Ok(())
    }

    pub fn restore(&self) -> KResult<()> {
        self.set_range(self.initial_min_khz, self.initial_max_khz)
    }
}

impl fmt::Display for UncoreDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (initial {}..{} kHz)",
            self.name(),
            self.initial_min_khz,
            self.initial_max_khz
        )
    }
}
