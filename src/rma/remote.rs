// src/rma/remote.rs
//! Typed references to remote values
//!
//! A [`RemoteRef`] names a value of type `T` living at a fixed offset in one
//! rank's heap region. `load` decodes a copy of the current contents; `store`
//! replaces them. Neither call synchronizes by itself; the collective
//! protocol (publish → barrier → read) is what makes access well-ordered.

use crate::rma::world::SymmetricWorld;
use crate::utils::errors::{CohortError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encoded values carry a little-endian occupancy prefix holding the encoded
/// length plus one; zero means nothing has been published. The bias matters:
/// zero-sized types encode to zero bytes, which must still read back as
/// published.
const LEN_PREFIX: usize = 4;

/// A typed reference to a value owned by one rank of the group
pub struct RemoteRef<'w, T> {
    world: &'w SymmetricWorld,
    owner: usize,
    offset: usize,
    capacity: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'w, T> RemoteRef<'w, T> {
    pub(crate) fn new(
        world: &'w SymmetricWorld,
        owner: usize,
        offset: usize,
        capacity: usize,
    ) -> Self {
        Self {
            world,
            owner,
            offset,
            capacity,
            _marker: PhantomData,
        }
    }

    /// Rank owning the referenced value
    pub fn owner(&self) -> usize {
        self.owner
    }

    /// Slot capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'w, T: DeserializeOwned> RemoteRef<'w, T> {
    /// Decode a copy of the referenced value
    pub fn load(&self) -> Result<T> {
        let mut prefix = [0u8; LEN_PREFIX];
        self.world.read_at(self.owner, self.offset, &mut prefix)?;
        let marker = u32::from_le_bytes(prefix) as usize;

        if marker == 0 {
            return Err(CohortError::SlotEmpty);
        }
        let len = marker - 1;
        if LEN_PREFIX + len > self.capacity {
            return Err(CohortError::WorldCorrupted(format!(
                "slot claims {} bytes in a {}-byte slot",
                len, self.capacity
            )));
        }

        let mut buf = vec![0u8; len];
        self.world
            .read_at(self.owner, self.offset + LEN_PREFIX, &mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }
}

impl<'w, T: Serialize> RemoteRef<'w, T> {
    /// Replace the referenced value
    pub fn store(&self, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        if LEN_PREFIX + bytes.len() > self.capacity {
            return Err(CohortError::SlotOverflow {
                need: LEN_PREFIX + bytes.len(),
                capacity: self.capacity,
            });
        }

        // payload first, prefix last: a reader never sees an occupancy
        // marker without its bytes
        self.world
            .write_at(self.owner, self.offset + LEN_PREFIX, &bytes)?;
        self.world.write_at(
            self.owner,
            self.offset,
            &(bytes.len() as u32 + 1).to_le_bytes(),
        )
    }
}

impl<T> Clone for RemoteRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RemoteRef<'_, T> {}

impl<T> std::fmt::Debug for RemoteRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRef")
            .field("owner", &self.owner)
            .field("offset", &self.offset)
            .field("capacity", &self.capacity)
            .finish()
    }
}
