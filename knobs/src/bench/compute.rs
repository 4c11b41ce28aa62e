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

use std::hint::black_box;

use super::workload::WorkUnit;
use super::workload::Workload;
use super::CACHE_LINE;

const OPS_PER_PASS: u64 = 100_000;
const MIXED_STEPS_PER_PASS: usize = 10_000;
const CACHE_WORKING_SET: usize = 256 * 1024;

/// Kinds of synthetic load used by the SMT, frequency, thermal and C-state tools.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComputeKind {
    CpuIntensive,
    FloatCompute,
    CacheIntensive,
    MemoryIntensive,
    MemoryBound,
    Mixed,
}

impl ComputeKind {
    pub fn name(self) -> &'static str {
        match self {
            ComputeKind::CpuIntensive => "cpu-intensive",
            ComputeKind::FloatCompute => "float-compute",
            ComputeKind::CacheIntensive => "cache-intensive",
            ComputeKind::MemoryIntensive => "memory-intensive",
            ComputeKind::MemoryBound => "memory-bound",
            ComputeKind::Mixed => "mixed",
        }
    }

    /// `buffer_size` is ignored by the kinds that don't touch memory.
    pub fn workload(self, buffer_size: usize) -> Box<dyn Workload> {
        match self {
            ComputeKind::CpuIntensive => Box::new(CpuIntensive::new()),
            ComputeKind::FloatCompute => Box::new(FloatCompute::new(4096)),
            ComputeKind::CacheIntensive => Box::new(CacheIntensive::new(CACHE_WORKING_SET)),
            ComputeKind::MemoryIntensive => Box::new(MemoryIntensive::new(buffer_size)),
            ComputeKind::MemoryBound => Box::new(MemoryBound::new(buffer_size)),
            ComputeKind::Mixed => Box::new(Mixed::new(buffer_size)),
        }
    }
}

fn xorshift(mut state: u64) -> u64 {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;
    state
}

/// Integer multiply and xorshift rounds, no memory traffic.
#[derive(Debug)]
pub struct CpuIntensive {
    state: u64,
}

impl CpuIntensive {
    pub fn new() -> Self {
        Self { state: 1 }
    }
}

impl Default for CpuIntensive {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for CpuIntensive {
    fn name(&self) -> &str {
        "cpu-intensive"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Operations
    }

    fn pass(&mut self) -> u64 {
        let mut state = self.state;
        for _ in 0..OPS_PER_PASS {
            state = state.wrapping_mul(7);
            state = xorshift(state);
            state = state.wrapping_add(0x0123_4567_89AB_CDEF);
        }
        self.state = black_box(state);
        OPS_PER_PASS
    }
}

/// `c = a * b + c` over three small vectors, counted as two flops per element.
#[derive(Debug)]
pub struct FloatCompute {
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
}

impl FloatCompute {
    pub fn new(elements: usize) -> Self {
        let elements = elements.max(1);
        Self {
            a: (0..elements).map(|i| 1.0 + i as f64 * 1e-6).collect(),
            b: vec![0.999_999; elements],
            c: vec![0.0; elements],
        }
    }
}

impl Workload for FloatCompute {
    fn name(&self) -> &str {
        "float-compute"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::FloatOps
    }

    fn pass(&mut self) -> u64 {
        const ROUNDS: usize = 16;
        for _ in 0..ROUNDS {
            for ((c, a), b) in self.c.iter_mut().zip(&self.a).zip(&self.b) {
                *c = a.mul_add(*b, *c);
            }
        }
        black_box(&mut self.c);
        (2 * ROUNDS * self.c.len()) as u64
    }
}

/// Pseudo-random line accesses inside a working set that fits into L2.
#[derive(Debug)]
pub struct CacheIntensive {
    buffer: Vec<u8>,
    state: u64,
}

impl CacheIntensive {
    pub fn new(working_set: usize) -> Self {
        Self {
            buffer: vec![0x55; working_set.max(CACHE_LINE)],
            state: 0x9E37_79B9_7F4A_7C15,
        }
    }
}

impl Workload for CacheIntensive {
    fn name(&self) -> &str {
        "cache-intensive"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Operations
    }

    fn pass(&mut self) -> u64 {
        let lines = (self.buffer.len() / CACHE_LINE) as u64;
        let mut state = self.state;
        for _ in 0..OPS_PER_PASS {
            state = xorshift(state);
            let offset = (state % lines) as usize * CACHE_LINE;
            self.buffer[offset] = self.buffer[offset].wrapping_add(1);
        }
        self.state = black_box(state);
        OPS_PER_PASS
    }
}

/// Writes then reads every line of a large buffer, one operation per line.
#[derive(Debug)]
pub struct MemoryIntensive {
    buffer: Vec<u8>,
}

impl MemoryIntensive {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0x55; size.max(CACHE_LINE)],
        }
    }
}

impl Workload for MemoryIntensive {
    fn name(&self) -> &str {
        "memory-intensive"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Operations
    }

    fn pass(&mut self) -> u64 {
        for (id, line) in self.buffer.chunks_mut(CACHE_LINE).enumerate() {
            line[0] = id as u8;
        }

        let mut sum = 0u8;
        for line in self.buffer.chunks(CACHE_LINE) {
            sum = sum.wrapping_add(black_box(line[0]));
        }
        black_box(sum);
        (self.buffer.len() / CACHE_LINE) as u64
    }
}

/// Streams through a large buffer summing 64-bit words, bound by memory bandwidth.
#[derive(Debug)]
pub struct MemoryBound {
    words: Vec<u64>,
}

impl MemoryBound {
    pub fn new(size: usize) -> Self {
        let words = (size / std::mem::size_of::<u64>()).max(1);
        Self {
            words: (0..words as u64).collect(),
        }
    }
}

impl Workload for MemoryBound {
    fn name(&self) -> &str {
        "memory-bound"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn pass(&mut self) -> u64 {
        let sum = self
            .words
            .iter()
            .fold(0u64, |sum, &word| sum.wrapping_add(word));
        black_box(sum);
        (self.words.len() * std::mem::size_of::<u64>()) as u64
    }
}

/// Interleaves xorshift rounds with dependent stores and loads.
#[derive(Debug)]
pub struct Mixed {
    buffer: Vec<u8>,
    state: u64,
}

impl Mixed {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0x55; size.max(CACHE_LINE)],
            state: 1,
        }
    }
}

impl Workload for Mixed {
    fn name(&self) -> &str {
        "mixed"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Operations
    }

    fn pass(&mut self) -> u64 {
        let lines = self.buffer.len() / CACHE_LINE;
        let mut state = self.state;
        for step in 0..MIXED_STEPS_PER_PASS {
            state = xorshift(state.wrapping_mul(7));

            let offset = (step % lines) * CACHE_LINE;
            self.buffer[offset] = state as u8;
            state = state.wrapping_add(self.buffer[offset] as u64);
        }
        self.state = black_box(state);
        MIXED_STEPS_PER_PASS as u64
    }
}
