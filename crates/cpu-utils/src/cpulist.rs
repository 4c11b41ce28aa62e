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

use hwk_shared::SysPaths;

use crate::CPUTopologyError;
use crate::CTResult;
use crate::LogicalCoreId;

/// Logical cores listed in `/sys/devices/system/cpu/online`.
pub fn online_cores(paths: &SysPaths) -> CTResult<Vec<LogicalCoreId>> {
    let online = hwk_sysfs::read_string(paths.cpu_root().join("online"))?;
    parse_cpu_list(&online)
}

/// Parses the kernel cpu list format, e.g. `0-3,8,10-11`.
pub fn parse_cpu_list(list: &str) -> CTResult<Vec<LogicalCoreId>> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }

    let mut cores = Vec::new();
    for chunk in list.split(',') {
        let chunk = chunk.trim();
        let (first, last) = match chunk.split_once('-') {
            Some((first, last)) => (parse_id(first, list)?, parse_id(last, list)?),
            None => {
                let id = parse_id(chunk, list)?;
                (id, id)
            }
        };

        if first > last {
            return Err(CPUTopologyError::invalid_cpu_list(list));
        }
        cores.extend((first..=last).map(LogicalCoreId::new));
    }

    cores.sort_unstable();
    cores.dedup();
    Ok(cores)
}

fn parse_id(id: &str, list: &str) -> CTResult<u32> {
    id.trim()
        .parse::<u32>()
        .map_err(|_| CPUTopologyError::invalid_cpu_list(list))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &str) -> Vec<u32> {
        parse_cpu_list(list)
            .unwrap()
            .into_iter()
            .map(|id| usize::from(id) as u32)
            .collect()
    }

    #[test]
    fn ranges_and_singles() {
        assert_eq!(ids("0-3,8,10-11\n"), vec![0, 1, 2, 3, 8, 10, 11]);
    }

    #[test]
    fn single_cpu() {
        assert_eq!(ids("0"), vec![0]);
    }

    #[test]
    fn empty_list() {
        assert!(ids("\n").is_empty());
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a-b").is_err());
    }
}
