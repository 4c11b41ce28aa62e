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

//! CXL memory devices and regions as exposed on `/sys/bus/cxl`.


use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use hwk_shared::SysPaths;
use hwk_sysfs::numbered_entries;
use hwk_sysfs::read_optional;

use crate::bench::AccessPattern;
use crate::bench::Budget;
use crate::bench::Harness;
use crate::KResult;
use crate::KnobError;
use crate::TestSuite;

const GIB: f64 = (1u64 << 30) as f64;
const BANDWIDTH_PASSES: usize = 5;

fn bus_root(paths: &SysPaths) -> PathBuf {
    paths.sys("bus/cxl")
}

pub fn check_support(paths: &SysPaths) -> KResult<()> {
    let root = bus_root(paths);
    if !hwk_sysfs::path_exists(&root) {
        return Err(KnobError::not_supported("CXL", "no cxl bus in sysfs"));
    }
    if !hwk_sysfs::path_exists(root.join("devices")) {
        return Err(KnobError::not_supported("CXL", "cxl bus has no devices directory"));
    }
    Ok(())
}

/// A `memN` memory device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CxlMemDevice {
    pub name: String,
    pub numa_node: Option<u32>,
    pub size_bytes: u64,
}

/// A `regionN` interleave set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CxlRegion {
    pub name: String,
    pub uuid: String,
    pub size_bytes: u64,
    pub interleave_ways: u32,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CxlTopology {
    pub devices: Vec<CxlMemDevice>,
    pub regions: Vec<CxlRegion>,
}

/// Sizes are hex (`0x10000000`) on recent kernels and decimal on older ones.
fn parse_size(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn read_size(path: &Path) -> KResult<Option<u64>> {
    let size = read_optional::<String>(path)?;
    Ok(size.as_deref().and_then(parse_size))
}

fn read_text(dir: &Path, name: &str) -> KResult<String> {
    let value = read_optional::<String>(dir.join(name))?
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    Ok(value)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CxlMemDevice {
    fn read(path: &Path) -> KResult<Self> {
        // -1 means the device isn't bound to a node
        let numa_node = read_optional::<i64>(path.join("numa_node"))
            .ok()
            .flatten()
            .and_then(|node| u32::try_from(node).ok());

        let size_bytes = match read_size(&path.join("size"))? {
            Some(size) => size,
            None => read_size(&path.join("ram/size"))?.unwrap_or_default(),
        };

        Ok(Self {
            name: entry_name(path),
            numa_node,
            size_bytes,
        })
    }
}

impl CxlRegion {
    fn read(path: &Path) -> KResult<Self> {
        let interleave_ways = read_optional::<u32>(path.join("interleave_ways"))
            .ok()
            .flatten()
            .unwrap_or(1);

        Ok(Self {
            name: entry_name(path),
            uuid: read_text(path, "uuid")?,
            size_bytes: read_size(&path.join("size"))?.unwrap_or_default(),
            interleave_ways,
            state: read_text(path, "state")?,
        })
    }
}

impl CxlTopology {
    /// Scans memory devices and regions. A system without the cxl bus or
    /// without any device is an empty topology, not an error.
    pub fn scan(paths: &SysPaths) -> KResult<Self> {
        let root = bus_root(paths);
        let devices_dir = root.join("devices");
        if !hwk_sysfs::path_exists(&devices_dir) {
            tracing::debug!("no cxl devices directory at {devices_dir:?}");
            return Ok(Self::default());
        }

        let devices = numbered_entries(&devices_dir, "mem")?
            .into_iter()
            .map(|(_, path)| CxlMemDevice::read(&path))
            .collect::<KResult<Vec<_>>>()?;

        let mut region_paths = numbered_entries(&devices_dir, "region")?;
        let regions_dir = root.join("regions");
        if hwk_sysfs::path_exists(&regions_dir) {
            for (id, path) in numbered_entries(&regions_dir, "region")? {
                if !region_paths.iter().any(|(known, _)| *known == id) {
                    region_paths.push((id, path));
                }
            }
            region_paths.sort_unstable_by_key(|(id, _)| *id);
        }
        let regions = region_paths
            .into_iter()
            .map(|(_, path)| CxlRegion::read(&path))
            .collect::<KResult<Vec<_>>>()?;

        tracing::info!("found {} CXL devices and {} regions", devices.len(), regions.len());
        Ok(Self { devices, regions })
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.regions.is_empty()
    }

    /// NUMA nodes that exist in `/sys/devices/system/node` and back a CXL device.
    pub fn numa_nodes(&self, paths: &SysPaths) -> KResult<Vec<u32>> {
        let node_root = paths.sys("devices/system/node");
        if !hwk_sysfs::path_exists(&node_root) {
            return Err(KnobError::not_supported("CXL", "no NUMA topology in sysfs"));
        }

        let nodes = numbered_entries(&node_root, "node")?
            .into_iter()
            .filter(|(id, _)| self.devices.iter().any(|device| device.numa_node == Some(*id)))
            .map(|(id, path)| {
                if hwk_sysfs::path_exists(path.join("meminfo")) {
                    tracing::debug!("node{id} has memory information");
                }
                id
            })
            .collect();
        Ok(nodes)
    }
}

/// Enumerates the topology, checks which NUMA nodes are CXL backed and
/// measures local memory read bandwidth as a baseline.
pub fn self_test(
    paths: &SysPaths,
    topology: &CxlTopology,
    harness: &mut Harness,
    buffer_size: usize,
) -> KResult<TestSuite> {
    let mut suite = TestSuite::new("CXL");

    if topology.is_empty() {
        suite.skip("basic functionality", "no CXL devices or regions found");
    } else {
        suite.run("basic functionality", || {
            for device in &topology.devices {
                tracing::debug!("{device}");
            }
            for region in &topology.regions {
                tracing::debug!("{region}");
            }
            Ok(())
        });
    }

    suite.run("memory access", || {
        let nodes = topology.numa_nodes(paths)?;
        if nodes.is_empty() {
            tracing::info!("no CXL NUMA nodes detected");
        } else {
            tracing::info!("found {} CXL NUMA nodes: {nodes:?}", nodes.len());
        }
        Ok(())
    });

    suite.run("bandwidth measurement", || {
        let mut workload = AccessPattern::SequentialRead.workload(buffer_size);
        let measurement =
            harness.run(|| Ok(()), workload.as_mut(), Budget::Passes(BANDWIDTH_PASSES))?;
        tracing::info!("local memory bandwidth: {:.1} MB/s", measurement.scaled_rate());
        if !topology.devices.is_empty() {
            tracing::info!("CXL bandwidth needs an allocation bound to a CXL NUMA node");
        }
        Ok(())
    });

    Ok(suite)
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

impl fmt::Display for CxlMemDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8}", self.name)?;
        match self.numa_node {
            Some(node) => write!(f, " node {node:<3}")?,
            None => write!(f, " node {:<3}", "-")?,
        }
        if self.size_bytes > 0 {
            write!(f, " {:.2} GiB", gib(self.size_bytes))?;
        }
        Ok(())
    }
}

impl fmt::Display for CxlRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} uuid {}", self.name, self.uuid)?;
        if self.size_bytes > 0 {
            write!(f, " {:.2} GiB", gib(self.size_bytes))?;
        }
        write!(f, " ways {} state {}", self.interleave_ways, self.state)
    }
}

impl fmt::Display for CxlTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no CXL devices or regions detected");
        }

        if !self.devices.is_empty() {
            writeln!(f, "memory devices:")?;
            for device in &self.devices {
                writeln!(f, "  {device}")?;
            }
        }
        if !self.regions.is_empty() {
            writeln!(f, "regions:")?;
            for region in &self.regions {
                writeln!(f, "  {region}")?;
            }
        }
        Ok(())
    }
}
