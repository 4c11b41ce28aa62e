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

use std::collections::BTreeMap;

use nonempty::NonEmpty;

use hwk_shared::SysPaths;

use crate::cpulist::online_cores;
use crate::cpulist::parse_cpu_list;
use crate::errors::CPUTopologyError;
use crate::CTResult;
use crate::LogicalCoreId;
use crate::PhysicalCoreId;

/// Online logical cores grouped into physical cores by their SMT siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CPUTopology {
    logical_cores: NonEmpty<LogicalCoreId>,
    // indexed by PhysicalCoreId, each group is sorted and non-empty
    physical_cores: Vec<NonEmpty<LogicalCoreId>>,
}

impl CPUTopology {
    pub fn from_sysfs(paths: &SysPaths) -> CTResult<Self> {
        let logical_cores = online_cores(paths)?;

        let mut groups = BTreeMap::<LogicalCoreId, Vec<LogicalCoreId>>::new();
        for &core_id in &logical_cores {
            let siblings_path = paths
                .cpu_dir(core_id)
                .join("topology")
                .join("thread_siblings_list");

            let siblings = match hwk_sysfs::read_optional::<String>(&siblings_path)? {
                Some(list) => parse_cpu_list(&list)?
                    .into_iter()
                    .filter(|sibling| logical_cores.contains(sibling))
                    .collect::<Vec<_>>(),
                None => vec![core_id],
            };

            // a core always belongs to its own group even if the list is odd
            let leader = siblings.first().copied().unwrap_or(core_id).min(core_id);
            let group = groups.entry(leader).or_default();
            if !group.contains(&core_id) {
                group.push(core_id);
            }
        }

        Self::from_groups(logical_cores, groups.into_values())
    }

    /// Builds a topology from explicit sibling groups.
    pub fn from_groups(
        logical_cores: Vec<LogicalCoreId>,
        groups: impl IntoIterator<Item = Vec<LogicalCoreId>>,
    ) -> CTResult<Self> {
        let logical_cores =
            NonEmpty::from_vec(logical_cores).ok_or(CPUTopologyError::OnlineCoresNotFound)?;

        let mut physical_cores = groups
            .into_iter()
            .filter_map(|mut group| {
                group.sort_unstable();
                NonEmpty::from_vec(group)
            })
            .collect::<Vec<_>>();
        physical_cores.sort_unstable_by_key(|group| group.head);

        tracing::debug!(
            target: "topology",
            "{} logical cores in {} physical cores",
            logical_cores.len(),
            physical_cores.len()
        );

        Ok(Self {
            logical_cores,
            physical_cores,
        })
    }

    pub fn logical_cores(&self) -> &NonEmpty<LogicalCoreId> {
        &self.logical_cores
    }

    pub fn logical_cores_count(&self) -> usize {
        self.logical_cores.len()
    }

    pub fn physical_cores_count(&self) -> usize {
        self.physical_cores.len()
    }

    pub fn physical_cores(&self) -> CTResult<NonEmpty<PhysicalCoreId>> {
        let physical_core_ids = (0..self.physical_cores.len() as u32)
            .map(PhysicalCoreId::new)
            .collect::<Vec<_>>();

        NonEmpty::from_vec(physical_core_ids).ok_or(CPUTopologyError::OnlineCoresNotFound)
    }

    pub fn logical_cores_for_physical(
        &self,
        core_id: PhysicalCoreId,
    ) -> CTResult<&NonEmpty<LogicalCoreId>> {
        self.physical_cores
            .get(usize::from(core_id))
            .ok_or(CPUTopologyError::physical_core_not_found(core_id))
    }

    /// The first hardware thread of every physical core.
    pub fn primary_threads(&self) -> Vec<LogicalCoreId> {
        self.physical_cores.iter().map(|group| group.head).collect()
    }

    /// Other hardware threads sharing a physical core with `core_id`.
    pub fn siblings_of(&self, core_id: LogicalCoreId) -> CTResult<Vec<LogicalCoreId>> {
        let group = self
            .physical_cores
            .iter()
            .find(|group| group.contains(&core_id))
            .ok_or(CPUTopologyError::logical_core_not_found(core_id))?;

        Ok(group.iter().copied().filter(|&id| id != core_id).collect())
    }

    pub fn has_smt_siblings(&self) -> bool {
        self.physical_cores.iter().any(|group| group.len() > 1)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fake_smt_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let cpu = "sys/devices/system/cpu";
        write(root.path(), &format!("{cpu}/online"), "0-3\n");
        for (core, siblings) in [(0, "0,2"), (1, "1,3"), (2, "0,2"), (3, "1,3")] {
            write(
                root.path(),
                &format!("{cpu}/cpu{core}/topology/thread_siblings_list"),
                &format!("{siblings}\n"),
            );
        }
        root
    }

    #[test]
    fn groups_siblings_into_physical_cores() {
        let root = fake_smt_tree();
        let topology = CPUTopology::from_sysfs(&SysPaths::under(root.path())).unwrap();

        assert_eq!(topology.logical_cores_count(), 4);
        assert_eq!(topology.physical_cores_count(), 2);
        assert!(topology.has_smt_siblings());

        let second = topology
            .logical_cores_for_physical(PhysicalCoreId::new(1))
            .unwrap();
        assert_eq!(
            second.iter().copied().collect::<Vec<_>>(),
            vec![LogicalCoreId::new(1), LogicalCoreId::new(3)]
        );
        assert_eq!(
            topology.primary_threads(),
            vec![LogicalCoreId::new(0), LogicalCoreId::new(1)]
        );
        assert_eq!(
            topology.siblings_of(LogicalCoreId::new(2)).unwrap(),
            vec![LogicalCoreId::new(0)]
        );
    }

    #[test]
    fn missing_sibling_lists_mean_one_thread_per_core() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "sys/devices/system/cpu/online", "0-2\n");

        let topology = CPUTopology::from_sysfs(&SysPaths::under(root.path())).unwrap();
        assert_eq!(topology.physical_cores_count(), 3);
        assert!(!topology.has_smt_siblings());
        assert!(topology
            .siblings_of(LogicalCoreId::new(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unknown_cores_are_reported() {
        let root = fake_smt_tree();
        let topology = CPUTopology::from_sysfs(&SysPaths::under(root.path())).unwrap();

        assert!(matches!(
            topology.logical_cores_for_physical(PhysicalCoreId::new(7)),
            Err(CPUTopologyError::PhysicalCoreNotFound { .. })
        ));
        assert!(matches!(
            topology.siblings_of(LogicalCoreId::new(9)),
            Err(CPUTopologyError::LogicalCoreNotFound { .. })
        ));
    }

    #[test]
    fn empty_online_list_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "sys/devices/system/cpu/online", "\n");

        let result = CPUTopology::from_sysfs(&SysPaths::under(root.path()));
        assert!(matches!(result, Err(CPUTopologyError::OnlineCoresNotFound)));
    }
}
