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

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;

use super::workload::WorkUnit;
use super::workload::Workload;
use super::CACHE_LINE;

const FILL_BYTE: u8 = 0x55;
const DEFAULT_SEED: u64 = 0x5EED_CAFE;

/// Memory access patterns, all of them touch one byte per cache line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessPattern {
    SequentialRead,
    SequentialWrite,
    RandomRead,
    /// Stride in cache lines.
    StrideRead(usize),
    PointerChase,
    StreamCopy,
}

impl AccessPattern {
    pub fn name(self) -> String {
        match self {
            AccessPattern::SequentialRead => "seq-read".to_string(),
            AccessPattern::SequentialWrite => "seq-write".to_string(),
            AccessPattern::RandomRead => "random-read".to_string(),
            AccessPattern::StrideRead(stride) => format!("stride-{stride}"),
            AccessPattern::PointerChase => "pointer-chase".to_string(),
            AccessPattern::StreamCopy => "stream-copy".to_string(),
        }
    }

    pub fn workload(self, buffer_size: usize) -> Box<dyn Workload> {
        match self {
            AccessPattern::SequentialRead => Box::new(SequentialRead::new(buffer_size)),
            AccessPattern::SequentialWrite => Box::new(SequentialWrite::new(buffer_size)),
            AccessPattern::RandomRead => Box::new(RandomRead::new(buffer_size, DEFAULT_SEED)),
            AccessPattern::StrideRead(stride) => Box::new(StrideRead::new(buffer_size, stride)),
            AccessPattern::PointerChase => Box::new(PointerChase::new(buffer_size, DEFAULT_SEED)),
            AccessPattern::StreamCopy => Box::new(StreamCopy::new(buffer_size)),
        }
    }
}

fn filled_buffer(size: usize) -> Vec<u8> {
    vec![FILL_BYTE; size.max(CACHE_LINE)]
}

#[derive(Debug)]
pub struct SequentialRead {
    buffer: Vec<u8>,
}

impl SequentialRead {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: filled_buffer(size),
        }
    }
}

impl Workload for SequentialRead {
    fn name(&self) -> &str {
        "seq-read"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn pass(&mut self) -> u64 {
        let mut sum = 0u8;
        for line in self.buffer.chunks(CACHE_LINE) {
            sum = sum.wrapping_add(black_box(line[0]));
        }
        black_box(sum);
        self.buffer.len() as u64
    }
}

#[derive(Debug)]
pub struct SequentialWrite {
    buffer: Vec<u8>,
}

impl SequentialWrite {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: filled_buffer(size),
        }
    }
}

impl Workload for SequentialWrite {
    fn name(&self) -> &str {
        "seq-write"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn pass(&mut self) -> u64 {
        for (id, line) in self.buffer.chunks_mut(CACHE_LINE).enumerate() {
            line[0] = id as u8;
        }
        black_box(&mut self.buffer);
        self.buffer.len() as u64
    }
}

/// Reads cache lines at precomputed random offsets, one access per 16 lines of buffer.
#[derive(Debug)]
pub struct RandomRead {
    buffer: Vec<u8>,
    offsets: Vec<usize>,
    seed: u64,
}

impl RandomRead {
    pub fn new(size: usize, seed: u64) -> Self {
        Self {
            buffer: filled_buffer(size),
            offsets: Vec::new(),
            seed,
        }
    }
}

impl Workload for RandomRead {
    fn name(&self) -> &str {
        "random-read"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn granule(&self) -> u64 {
        CACHE_LINE as u64
    }

    fn prepare(&mut self) {
        let lines = self.buffer.len() / CACHE_LINE;
        let accesses = (lines / 16).max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.offsets = (0..accesses)
            .map(|_| rng.gen_range(0..lines) * CACHE_LINE)
            .collect();
    }

    fn pass(&mut self) -> u64 {
        let mut sum = 0u8;
        for &offset in &self.offsets {
            sum = sum.wrapping_add(black_box(self.buffer[offset]));
        }
        black_box(sum);
        (self.offsets.len() * CACHE_LINE) as u64
    }
}

#[derive(Debug)]
pub struct StrideRead {
    buffer: Vec<u8>,
    stride_bytes: usize,
    name: String,
}

impl StrideRead {
    pub fn new(size: usize, stride_lines: usize) -> Self {
        let stride_lines = stride_lines.max(1);
        Self {
            buffer: filled_buffer(size),
            stride_bytes: stride_lines * CACHE_LINE,
            name: format!("stride-{stride_lines}"),
        }
    }
}

impl Workload for StrideRead {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn granule(&self) -> u64 {
        CACHE_LINE as u64
    }

    fn pass(&mut self) -> u64 {
        let mut sum = 0u8;
        let mut touched = 0;
        for offset in (0..self.buffer.len()).step_by(self.stride_bytes) {
            sum = sum.wrapping_add(black_box(self.buffer[offset]));
            touched += 1;
        }
        black_box(sum);
        (touched * CACHE_LINE) as u64
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(C, align(64))]
struct ChaseNode {
    next: usize,
    _pad: [u8; CACHE_LINE - std::mem::size_of::<usize>()],
}

/// Walks a randomly ordered ring of cache-line sized nodes, each load depends on the previous one.
#[derive(Debug)]
pub struct PointerChase {
    nodes: Vec<ChaseNode>,
    seed: u64,
    position: usize,
}

impl PointerChase {
    pub fn new(size: usize, seed: u64) -> Self {
        let count = (size / CACHE_LINE).max(2);
        let node = ChaseNode {
            next: 0,
            _pad: [FILL_BYTE; CACHE_LINE - std::mem::size_of::<usize>()],
        };

        let mut chase = Self {
            nodes: vec![node; count],
            seed,
            position: 0,
        };
        chase.link_ring();
        chase
    }

    /// Links nodes in a shuffled order, the last node points back to the first
    /// one, so the ring is always a single cycle over every node.
    fn link_ring(&mut self) {
        let mut order = (0..self.nodes.len()).collect::<Vec<_>>();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));

        for (position, &node) in order.iter().enumerate() {
            let next = order[(position + 1) % order.len()];
            self.nodes[node].next = next;
        }
        self.position = order[0];
    }

    #[cfg(test)]
    pub(crate) fn cycle_len(&self) -> usize {
        let mut current = self.nodes[self.position].next;
        let mut length = 1;
        while current != self.position && length <= self.nodes.len() {
            current = self.nodes[current].next;
            length += 1;
        }
        length
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Workload for PointerChase {
    fn name(&self) -> &str {
        "pointer-chase"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn granule(&self) -> u64 {
        CACHE_LINE as u64
    }

    fn pass(&mut self) -> u64 {
        let mut current = self.position;
        for _ in 0..self.nodes.len() {
            current = black_box(self.nodes[current].next);
        }
        self.position = current;
        (self.nodes.len() * CACHE_LINE) as u64
    }
}

/// Copies one buffer into another, counts both the read and the written bytes.
#[derive(Debug)]
pub struct StreamCopy {
    source: Vec<u8>,
    destination: Vec<u8>,
}

impl StreamCopy {
    pub fn new(size: usize) -> Self {
        Self {
            source: filled_buffer(size),
            destination: vec![0; size.max(CACHE_LINE)],
        }
    }
}

impl Workload for StreamCopy {
    fn name(&self) -> &str {
        "stream-copy"
    }

    fn unit(&self) -> WorkUnit {
        WorkUnit::Bytes
    }

    fn pass(&mut self) -> u64 {
        self.destination.copy_from_slice(&self.source);
        black_box(&mut self.destination);
        (self.source.len() * 2) as u64
    }
}
