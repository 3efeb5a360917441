// src/rma/world.rs
//! Per-group symmetric world over a shared memory-mapped file
//!
//! The requesting process creates one world file per bulk-execute call
//! ([`GroupWorld`]); every spawned agent maps it at its assigned rank
//! ([`SymmetricWorld`]). All cross-agent communication runs through this
//! mapping: one-sided reads/writes of heap bytes, and collective barrier /
//! reduce-OR primitives coordinated through atomics in the file header.
//!
//! Collective calls are blocking and must be entered by every rank of the
//! group; an agent that never reaches a barrier stalls the others. There is
//! deliberately no barrier timeout.

use crate::utils::config::CohortConfig;
use crate::utils::errors::{CohortError, Result};
use memmap2::{MmapOptions, MmapRaw};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use ulid::Ulid;

const MAGIC: u64 = 0x434f_484f_5254_3031; // "COHORT01"

// Header layout. The header occupies the first 64 bytes; per-rank reduce
// flags follow, then the heap regions, 64-byte aligned.
const OFF_MAGIC: usize = 0;
const OFF_RANKS: usize = 8;
const OFF_HEAP_SIZE: usize = 16;
const OFF_BARRIER_GEN: usize = 24;
const OFF_BARRIER_ARRIVED: usize = 32;
const OFF_FLAGS: usize = 64;

// Spin this many times before falling back to a sleep poll
const SPIN_LIMIT: u32 = 4096;
const POLL_INTERVAL: Duration = Duration::from_micros(50);

fn align64(value: usize) -> usize {
    (value + 63) & !63
}

fn heap_base(ranks: usize) -> usize {
    align64(OFF_FLAGS + ranks)
}

fn file_len(ranks: usize, heap_size: usize) -> usize {
    heap_base(ranks) + ranks * heap_size
}

/// Everything an agent needs to attach to a group's world.
/// Travels inside the agent command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSpec {
    /// Path of the world file
    pub path: PathBuf,

    /// Number of ranks in the group
    pub ranks: usize,

    /// Heap bytes per rank
    pub heap_size: usize,

    /// Default slot capacity for this group
    pub slot_capacity: usize,
}

/// Requester-side owner of a group's world file.
///
/// Creating the world writes the header; dropping it removes the file. The
/// owner must outlive the group: keep the handle until `wait()` has joined
/// every agent (existing mappings survive the unlink, but an agent that has
/// not yet attached would fail to open the path).
#[derive(Debug)]
pub struct GroupWorld {
    id: Ulid,
    spec: WorldSpec,
}

impl GroupWorld {
    /// Create and format a world file for `ranks` agents
    pub fn create(config: &CohortConfig, ranks: usize) -> Result<Self> {
        if ranks == 0 {
            return Err(CohortError::InvalidGroupSize(0));
        }

        let id = Ulid::new();
        let path = config.world_dir.join(format!("cohort-{}.world", id));
        let len = file_len(ranks, config.heap_size);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(len as u64)?;

        // set_len zero-fills, so the barrier counters and reduce flags start
        // cleared; only the identifying fields need writing.
        file.seek(SeekFrom::Start(OFF_MAGIC as u64))?;
        file.write_all(&MAGIC.to_le_bytes())?;
        file.seek(SeekFrom::Start(OFF_RANKS as u64))?;
        file.write_all(&(ranks as u64).to_le_bytes())?;
        file.seek(SeekFrom::Start(OFF_HEAP_SIZE as u64))?;
        file.write_all(&(config.heap_size as u64).to_le_bytes())?;
        file.sync_all()?;

        debug!("created world {} for {} ranks at {:?}", id, ranks, path);

        Ok(Self {
            id,
            spec: WorldSpec {
                path,
                ranks,
                heap_size: config.heap_size,
                slot_capacity: config.slot_capacity,
            },
        })
    }

    /// Group identifier
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Attachment spec handed to agents
    pub fn spec(&self) -> WorldSpec {
        self.spec.clone()
    }
}

impl Drop for GroupWorld {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.spec.path) {
            warn!("failed to remove world file {:?}: {}", self.spec.path, e);
        }
    }
}

/// One rank's attachment to a group's symmetric world
pub struct SymmetricWorld {
    map: MmapRaw,
    rank: usize,
    ranks: usize,
    heap_size: usize,
    heap_base: usize,
    next_alloc: Cell<usize>,
}

impl SymmetricWorld {
    /// Map the world file and validate it against the spec
    pub fn attach(spec: &WorldSpec, rank: usize) -> Result<Self> {
        if rank >= spec.ranks {
            return Err(CohortError::RankOutOfRange {
                rank,
                ranks: spec.ranks,
            });
        }

        let file = OpenOptions::new().read(true).write(true).open(&spec.path)?;
        let map = MmapOptions::new().map_raw(&file)?;

        let expected = file_len(spec.ranks, spec.heap_size);
        if map.len() != expected {
            return Err(CohortError::WorldCorrupted(format!(
                "world file is {} bytes, expected {}",
                map.len(),
                expected
            )));
        }

        let world = Self {
            map,
            rank,
            ranks: spec.ranks,
            heap_size: spec.heap_size,
            heap_base: heap_base(spec.ranks),
            next_alloc: Cell::new(0),
        };

        if world.header_u64(OFF_MAGIC) != MAGIC {
            return Err(CohortError::WorldCorrupted("bad magic".to_string()));
        }
        if world.header_u64(OFF_RANKS) != spec.ranks as u64
            || world.header_u64(OFF_HEAP_SIZE) != spec.heap_size as u64
        {
            return Err(CohortError::WorldCorrupted(
                "header does not match attachment spec".to_string(),
            ));
        }

        debug!("rank {} attached to world at {:?}", rank, spec.path);
        Ok(world)
    }

    /// This agent's rank
    pub fn my_rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Heap bytes available per rank
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    fn base(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    fn header_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        // SAFETY: offset is a fixed header field inside the validated mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(offset), bytes.as_mut_ptr(), 8);
        }
        u64::from_le_bytes(bytes)
    }

    fn atomic_u64(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset % 8 == 0 && offset + 8 <= OFF_FLAGS);
        // SAFETY: the header lies inside the mapping for the life of `self`,
        // the offset is 8-aligned, and the cell is only ever accessed as an
        // atomic by every attached process.
        unsafe { &*(self.base().add(offset) as *const AtomicU64) }
    }

    fn flag(&self, rank: usize) -> &AtomicU8 {
        debug_assert!(rank < self.ranks);
        // SAFETY: as above; byte atomics have no alignment requirement.
        unsafe { &*(self.base().add(OFF_FLAGS + rank) as *const AtomicU8) }
    }

    /// Reserve `len` bytes of symmetric heap.
    ///
    /// Reservations must be made in identical order on every rank; the
    /// returned offset then denotes the same position in every rank's heap
    /// region.
    pub fn alloc(&self, len: usize) -> Result<usize> {
        let aligned = (len + 7) & !7;
        let offset = self.next_alloc.get();
        if offset + aligned > self.heap_size {
            return Err(CohortError::HeapExhausted {
                need: aligned,
                available: self.heap_size - offset,
            });
        }
        self.next_alloc.set(offset + aligned);
        Ok(offset)
    }

    fn check_access(&self, owner: usize, offset: usize, len: usize) -> Result<usize> {
        if owner >= self.ranks {
            return Err(CohortError::RankOutOfRange {
                rank: owner,
                ranks: self.ranks,
            });
        }
        if offset + len > self.heap_size {
            return Err(CohortError::WorldCorrupted(format!(
                "access of {} bytes at offset {} exceeds heap of {}",
                len, offset, self.heap_size
            )));
        }
        Ok(self.heap_base + owner * self.heap_size + offset)
    }

    /// One-sided read from `owner`'s heap region
    pub fn read_at(&self, owner: usize, offset: usize, buf: &mut [u8]) -> Result<()> {
        let at = self.check_access(owner, offset, buf.len())?;
        // SAFETY: bounds checked against the mapping; racing access is
        // excluded by the collective protocol (readers are barrier-ordered
        // after the writer).
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(at), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// One-sided write into `owner`'s heap region
    pub fn write_at(&self, owner: usize, offset: usize, data: &[u8]) -> Result<()> {
        let at = self.check_access(owner, offset, data.len())?;
        // SAFETY: as for `read_at`.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(at), data.len());
        }
        Ok(())
    }

    /// Block until every rank of the group has entered the barrier
    pub fn barrier_all(&self) {
        let generation = self.atomic_u64(OFF_BARRIER_GEN);
        let arrived = self.atomic_u64(OFF_BARRIER_ARRIVED);

        let entered = generation.load(Ordering::SeqCst);
        if arrived.fetch_add(1, Ordering::SeqCst) + 1 == self.ranks as u64 {
            // last arrival releases the group
            arrived.store(0, Ordering::SeqCst);
            generation.fetch_add(1, Ordering::SeqCst);
        } else {
            let mut spins = 0u32;
            while generation.load(Ordering::SeqCst) == entered {
                spins = spins.saturating_add(1);
                if spins < SPIN_LIMIT {
                    std::hint::spin_loop();
                } else {
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Collective logical-OR over every rank's local flag.
    ///
    /// The rendezvous doubles as a barrier: no rank returns before every
    /// rank has contributed, and the flag bytes are reusable once it does.
    pub fn all_reduce_or(&self, local: bool) -> bool {
        self.flag(self.rank).store(local as u8, Ordering::SeqCst);
        self.barrier_all();

        let mut any = false;
        for rank in 0..self.ranks {
            any |= self.flag(rank).load(Ordering::SeqCst) != 0;
        }

        self.barrier_all();
        any
    }
}

impl std::fmt::Debug for SymmetricWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricWorld")
            .field("rank", &self.rank)
            .field("ranks", &self.ranks)
            .field("heap_size", &self.heap_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn test_config(dir: &std::path::Path) -> CohortConfig {
        CohortConfig {
            world_dir: dir.to_path_buf(),
            heap_size: 16 * 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_attach() {
        let dir = tempfile::tempdir().unwrap();
        let world = GroupWorld::create(&test_config(dir.path()), 3).unwrap();
        let spec = world.spec();

        let attached = SymmetricWorld::attach(&spec, 0).unwrap();
        assert_eq!(attached.ranks(), 3);
        assert_eq!(attached.my_rank(), 0);

        assert!(SymmetricWorld::attach(&spec, 3).is_err());
    }

    #[test]
    fn test_drop_removes_world_file() {
        let dir = tempfile::tempdir().unwrap();
        let world = GroupWorld::create(&test_config(dir.path()), 1).unwrap();
        let path = world.spec().path;
        assert!(path.exists());
        drop(world);
        assert!(!path.exists());
    }

    #[test]
    fn test_barrier_orders_remote_writes() {
        let dir = tempfile::tempdir().unwrap();
        let world = GroupWorld::create(&test_config(dir.path()), 4).unwrap();
        let spec = world.spec();

        let handles: Vec<_> = (0..4)
            .map(|rank| {
                let spec = spec.clone();
                thread::spawn(move || {
                    let world = SymmetricWorld::attach(&spec, rank).unwrap();
                    let offset = world.alloc(8).unwrap();

                    world
                        .write_at(rank, offset, &(rank as u64 * 10).to_le_bytes())
                        .unwrap();
                    world.barrier_all();

                    // every rank's write is visible after the barrier
                    for owner in 0..4 {
                        let mut bytes = [0u8; 8];
                        world.read_at(owner, offset, &mut bytes).unwrap();
                        assert_eq!(u64::from_le_bytes(bytes), owner as u64 * 10);
                    }
                    world.barrier_all();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_reduce_or() {
        let dir = tempfile::tempdir().unwrap();
        let world = GroupWorld::create(&test_config(dir.path()), 3).unwrap();
        let spec = world.spec();

        let handles: Vec<_> = (0..3)
            .map(|rank| {
                let spec = spec.clone();
                thread::spawn(move || {
                    let world = SymmetricWorld::attach(&spec, rank).unwrap();
                    // round one: only rank 2 raises its flag
                    assert!(world.all_reduce_or(rank == 2));
                    // round two: nobody does
                    assert!(!world.all_reduce_or(false));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_alloc_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let world = GroupWorld::create(&test_config(dir.path()), 1).unwrap();
        let attached = SymmetricWorld::attach(&world.spec(), 0).unwrap();

        attached.alloc(16 * 1024 - 8).unwrap();
        assert!(matches!(
            attached.alloc(64),
            Err(CohortError::HeapExhausted { .. })
        ));
    }
}
