// src/rma/slot.rs
//! Symmetric storage slots
//!
//! A [`SymmetricSlot`] is a fixed-capacity cell reserved at the same heap
//! offset on every rank of a group. It starts empty. `publish` constructs the
//! slot's value on the calling rank: the encoded bytes land in that rank's
//! own heap region (visible to remote readers) and the live value is retained
//! locally so its destructor runs where it was built. Remote ranks read
//! through [`RemoteRef`]s and never construct the value themselves.
//!
//! Lifecycle for a broadcast parameter: owner publishes → barrier → readers
//! load / writers store → barrier → owner destroys.

use crate::rma::remote::RemoteRef;
use crate::rma::world::SymmetricWorld;
use crate::utils::errors::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A fixed-capacity symmetric cell holding at most one value of type `T`
pub struct SymmetricSlot<'w, T> {
    world: &'w SymmetricWorld,
    offset: usize,
    capacity: usize,
    local: Option<T>,
}

impl<'w, T> SymmetricSlot<'w, T> {
    /// Reserve a slot of `capacity` bytes.
    ///
    /// Every rank of the group must make the same reservations in the same
    /// order, so the slot denotes one offset group-wide.
    pub fn reserve(world: &'w SymmetricWorld, capacity: usize) -> Result<Self> {
        let offset = world.alloc(capacity)?;
        Ok(Self {
            world,
            offset,
            capacity,
            local: None,
        })
    }

    /// A typed reference to `owner`'s copy of this slot
    pub fn remote_ref(&self, owner: usize) -> RemoteRef<'w, T> {
        RemoteRef::new(self.world, owner, self.offset, self.capacity)
    }

    /// The locally constructed value, if this rank published one
    pub fn local(&self) -> Option<&T> {
        self.local.as_ref()
    }

    /// Drop the locally constructed value.
    ///
    /// For a broadcast parameter this must happen only after a barrier has
    /// confirmed every reader is done. A no-op when nothing was published
    /// here.
    pub fn destroy(&mut self) {
        self.local = None;
    }
}

impl<'w, T: Serialize> SymmetricSlot<'w, T> {
    /// Construct the slot's value on this rank and make it visible to the
    /// group
    pub fn publish(&mut self, value: T) -> Result<()> {
        self.remote_ref(self.world.my_rank()).store(&value)?;
        self.local = Some(value);
        Ok(())
    }
}

impl<'w, T: DeserializeOwned> SymmetricSlot<'w, T> {
    /// Decode the current contents of this rank's own copy and release the
    /// locally retained value.
    ///
    /// The decoded bytes, not the retained value, are authoritative:
    /// remote ranks may have stored into the slot since publication.
    pub fn take(&mut self) -> Result<T> {
        let value = self.remote_ref(self.world.my_rank()).load()?;
        self.local = None;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rma::world::GroupWorld;
    use crate::utils::config::CohortConfig;
    use std::thread;

    fn test_config(dir: &std::path::Path) -> CohortConfig {
        CohortConfig {
            world_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_broadcast_from_rank_zero() {
        let dir = tempfile::tempdir().unwrap();
        let group = GroupWorld::create(&test_config(dir.path()), 4).unwrap();
        let spec = group.spec();

        let handles: Vec<_> = (0..4)
            .map(|rank| {
                let spec = spec.clone();
                thread::spawn(move || {
                    let world = SymmetricWorld::attach(&spec, rank).unwrap();
                    let mut slot = SymmetricSlot::<i32>::reserve(&world, 64).unwrap();

                    if rank == 0 {
                        slot.publish(13).unwrap();
                    }
                    world.barrier_all();

                    assert_eq!(slot.remote_ref(0).load().unwrap(), 13);
                    world.barrier_all();

                    if rank == 0 {
                        slot.destroy();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_remote_store_updates_owner_copy() {
        let dir = tempfile::tempdir().unwrap();
        let group = GroupWorld::create(&test_config(dir.path()), 2).unwrap();
        let spec = group.spec();

        let handles: Vec<_> = (0..2)
            .map(|rank| {
                let spec = spec.clone();
                thread::spawn(move || {
                    let world = SymmetricWorld::attach(&spec, rank).unwrap();
                    let mut slot = SymmetricSlot::<u64>::reserve(&world, 64).unwrap();

                    if rank == 0 {
                        slot.publish(0).unwrap();
                    }
                    world.barrier_all();

                    if rank == 1 {
                        slot.remote_ref(0).store(&7).unwrap();
                    }
                    world.barrier_all();

                    if rank == 0 {
                        // the remote store, not the seed, is what comes back
                        assert_eq!(slot.take().unwrap(), 7);
                        assert!(slot.local().is_none());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_publish_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let group = GroupWorld::create(&test_config(dir.path()), 1).unwrap();
        let world = SymmetricWorld::attach(&group.spec(), 0).unwrap();

        let mut slot = SymmetricSlot::<Vec<u8>>::reserve(&world, 32).unwrap();
        assert!(slot.publish(vec![0u8; 128]).is_err());
        assert!(slot.local().is_none());
    }
}
