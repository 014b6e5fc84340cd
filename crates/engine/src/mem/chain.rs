//! Pointer-chase chains.
//!
//! A chain is a single cycle of pointers through a data region. The region is
//! divided into chunks of `line * dispersion` bytes; every chunk holds exactly
//! one pointer, at an offset derived from a hash of the chunk index so no table
//! is stored. Chunk 0 keeps its pointer at offset 0, which makes the region
//! base the chain entry.
//!
//! Random chains use Sattolo's algorithm, which produces a uniformly random
//! permutation with exactly one cycle. Streaming chains link each chunk to the
//! next one. Both are written in place: first successor indices, then a second
//! pass turns indices into absolute addresses.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::common::{POINTER_SIZE, Result, round_up};

use super::Region;

/// Inputs of [`Chain::build`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Working set in bytes before dispersion.
    pub footprint: usize,
    /// Cache line size in bytes.
    pub line: usize,
    /// Lines per chunk.
    pub dispersion: usize,
    /// Alignment of each pointer inside its chunk.
    pub alignment: usize,
    /// Bytes reserved from each pointer to the end of its slot.
    pub span: usize,
    /// Link chunks in address order instead of randomly.
    pub streaming: bool,
    /// Request transparent huge pages.
    pub huge_pages: bool,
    /// Seed of the permutation.
    pub seed: u64,
    /// Re-walk the chain after construction.
    pub verify: bool,
}

impl ChainParams {
    /// Chunk size in bytes.
    pub const fn chunk(&self) -> usize {
        self.line * self.dispersion
    }

    /// Region size in bytes (`roundUp(footprint * dispersion, chunk)`).
    pub const fn region_size(&self) -> usize {
        round_up(self.footprint * self.dispersion, self.chunk())
    }

    /// Number of chain nodes.
    pub const fn nodes(&self) -> usize {
        self.region_size() / self.chunk()
    }
}

/// Result of walking a chain once around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Walk {
    /// Pointers followed before returning to the base.
    pub length: usize,
    /// Lowest address visited.
    pub lowest: usize,
    /// Highest address visited.
    pub highest: usize,
}

/// A constructed pointer-chase chain and the region holding it.
#[derive(Debug)]
pub struct Chain {
    region: Region,
    chunk: usize,
    nodes: usize,
    size: usize,
    span: usize,
    alignment: usize,
}

/// Stateless 64-bit mixer (splitmix64 finalizer).
const fn mix(index: u64) -> u64 {
    let mut z = index.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Offset of the pointer of chunk `index` within its chunk.
pub const fn slot_placement(index: usize, chunk: usize, span: usize, alignment: usize) -> usize {
    if index == 0 {
        return 0;
    }
    let slots = ((chunk - span) / alignment + 1) as u64;
    (mix(index as u64) % slots) as usize * alignment
}

impl Chain {
    /// Maps a region and writes a single-cycle chain into it.
    ///
    /// # Arguments
    ///
    /// * `params` - Geometry, ordering and seed of the chain.
    ///
    /// # Returns
    ///
    /// The chain, or [`crate::Error::Map`] if the region could not be mapped.
    ///
    /// # Panics
    ///
    /// Panics if the geometry is inconsistent (callers validate it first) or,
    /// with `verify` set, if the written chain is not one cycle over every node.
    pub fn build(params: &ChainParams) -> Result<Self> {
        let chunk = params.chunk();
        assert!(params.footprint > 0, "empty chain");
        assert!(
            params.alignment >= POINTER_SIZE && params.alignment.is_power_of_two(),
            "pointer alignment {} is not a power of two >= {POINTER_SIZE}",
            params.alignment
        );
        assert!(params.span <= chunk, "slot span {} exceeds chunk {chunk}", params.span);

        let size = params.region_size();
        let nodes = params.nodes();
        let region = Region::map(size)?;
        if params.huge_pages {
            region.advise_huge_pages();
        }
        let mut chain = Self {
            region,
            chunk,
            nodes,
            size,
            span: params.span,
            alignment: params.alignment,
        };

        chain.link(params.streaming, params.seed);
        debug!(
            nodes,
            chunk,
            bytes = size,
            streaming = params.streaming,
            "chain built"
        );

        if params.verify {
            let walk = chain.walk();
            debug!(length = walk.length, "chain verified");
        }
        Ok(chain)
    }

    /// Writes successor indices, then converts them to addresses.
    fn link(&mut self, streaming: bool, seed: u64) {
        let n = self.nodes;
        if streaming {
            for i in 0..n {
                self.write_slot(i, ((i + 1) % n) as u64);
            }
        } else {
            for i in 0..n {
                self.write_slot(i, i as u64);
            }
            let mut rng = StdRng::seed_from_u64(seed);
            for i in (1..n).rev() {
                let j = rng.gen_range(0..i);
                let (a, b) = (self.read_slot(i), self.read_slot(j));
                self.write_slot(i, b);
                self.write_slot(j, a);
            }
        }
        let base = self.base();
        for i in 0..n {
            let next = self.read_slot(i) as usize;
            self.write_slot(i, (base + self.slot_offset(next)) as u64);
        }
    }

    /// Walks the chain from the base until it returns there.
    ///
    /// # Panics
    ///
    /// Panics if a pointer leaves the region or misses its chunk's slot, if
    /// the cycle is shorter than the node count (a sub-cycle) or longer
    /// (cross-linked), or if the visited addresses do not start at the base.
    pub fn walk(&self) -> Walk {
        let base = self.base();
        let end = base + self.size;
        let mut at = base;
        let mut walk = Walk {
            length: 0,
            lowest: base,
            highest: base,
        };
        loop {
            let next = self.region.read_u64(at - base) as usize;
            walk.length += 1;
            assert!(
                (base..end).contains(&next) && next % POINTER_SIZE == 0,
                "chain pointer {next:#x} escapes region [{base:#x}, {end:#x})"
            );
            let slot = base + self.slot_offset((next - base) / self.chunk);
            assert_eq!(next, slot, "chain pointer {next:#x} is not a slot address");
            walk.lowest = walk.lowest.min(next);
            walk.highest = walk.highest.max(next);
            if next == base {
                break;
            }
            assert!(
                walk.length < self.nodes,
                "chain does not return to its base within {} nodes",
                self.nodes
            );
            at = next;
        }
        assert_eq!(walk.length, self.nodes, "chain is a sub-cycle");
        assert_eq!(walk.lowest, base, "chain does not start at the region base");
        assert!(walk.highest < end, "chain reaches past the region end");
        walk
    }

    /// Address of the chain entry (the region base).
    pub fn base(&self) -> usize {
        self.region.addr()
    }

    /// Entry pointer handed to generated code.
    pub const fn entry(&self) -> *mut u8 {
        self.region.as_mut_ptr()
    }

    /// Number of nodes.
    pub const fn nodes(&self) -> usize {
        self.nodes
    }

    /// Chunk size in bytes.
    pub const fn chunk(&self) -> usize {
        self.chunk
    }

    /// Chain bytes (excluding page rounding of the mapping).
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Backing region.
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Offset from the base of the pointer of chunk `index`.
    pub const fn slot_offset(&self, index: usize) -> usize {
        index * self.chunk + slot_placement(index, self.chunk, self.span, self.alignment)
    }

    /// Index of the chunk that `index` points to.
    pub fn successor(&self, index: usize) -> usize {
        let next = self.read_slot(index) as usize - self.base();
        next / self.chunk
    }

    fn read_slot(&self, index: usize) -> u64 {
        self.region.read_u64(self.slot_offset(index))
    }

    fn write_slot(&mut self, index: usize, value: u64) {
        let offset = self.slot_offset(index);
        self.region.write_u64(offset, value);
    }
}
