//! The writer pool.

use std::collections::HashMap;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::pool::handle::WriterHandle;
use crate::pool::key::PartitionKey;
use crate::pool::proxy::WriterProxy;
use crate::pool::slot::{Resource, Slot, SlotKind, SlotState};
use crate::pool::stats::{PoolStats, PoolStatsSnapshot};
use crate::writer::IndexWriter;

/// Configuration for a [`WriterPool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Run [`WriterPool::clean`] when the pool is dropped.
    pub close_on_drop: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            close_on_drop: true,
        }
    }
}

struct PoolState<W> {
    slots: HashMap<PartitionKey, Slot<W>>,
    next_epoch: u64,
}

impl<W> PoolState<W> {
    /// Install a fresh slot for `key`, returning its epoch and whatever it
    /// displaced.
    fn install(&mut self, key: PartitionKey, state: SlotState<W>) -> (u64, Option<Slot<W>>) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        (epoch, self.slots.insert(key, Slot { epoch, state }))
    }

    fn is_current(&self, key: &PartitionKey, epoch: u64) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.epoch == epoch)
    }
}

/// Keyed pool of exclusive writers.
///
/// All slot transitions happen under one short-lived lock. Materializing a
/// proxy and closing writers happen outside it, so slow storage on one key
/// does not stall the others.
pub struct WriterPool<W: IndexWriter + 'static> {
    state: Mutex<PoolState<W>>,
    stats: PoolStats,
    config: PoolConfig,
}

impl<W: IndexWriter + 'static> WriterPool<W> {
    /// Create an empty pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            state: Mutex::new(PoolState {
                slots: HashMap::new(),
                next_epoch: 0,
            }),
            stats: PoolStats::new(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register a deferred writer for `key`.
    ///
    /// Whatever the slot held before is replaced; a materialized writer it
    /// held is closed, even if it is currently checked out.
    pub fn check_in_proxy<P>(&self, key: &str, proxy: P) -> Result<()>
    where
        P: WriterProxy<W> + 'static,
    {
        let key = PartitionKey::new(key)?;
        debug!("checking in proxy for partition '{key}'");
        self.replace_slot(key, Resource::Proxy(Box::new(proxy)))
    }

    /// Register a closure as the deferred writer for `key`.
    pub fn check_in_fn<F>(&self, key: &str, open: F) -> Result<()>
    where
        F: FnOnce(&PartitionKey) -> Result<W> + Send + 'static,
    {
        self.check_in_proxy(key, open)
    }

    /// Return `handle` to the pool, or install it as a new idle writer.
    ///
    /// Checking in the handle that is checked out just releases the slot.
    /// If the slot held a different materialized writer, that writer is
    /// closed before the new one is installed; the close error, if any, is
    /// returned but the new handle goes in regardless.
    ///
    /// A handle whose writer is already closed is refused and the slot is
    /// left untouched.
    pub fn check_in(&self, key: &str, handle: WriterHandle<W>) -> Result<()> {
        let key = PartitionKey::new(key)?;
        if handle.is_closed() {
            warn!("refusing closed writer for partition '{key}'");
            return Err(QuiverError::index(format!(
                "writer for partition '{key}' is already closed"
            )));
        }
        debug!("checking in writer for partition '{key}'");
        self.replace_slot(key, Resource::Concrete(handle))
    }

    /// Make `resource` the idle content of the slot for `key`.
    ///
    /// A different materialized writer in the slot is closed first. Until
    /// that close finishes the slot reads as checked out, so no check-out can
    /// open a second writer for the partition while the old one still holds
    /// its storage lock.
    fn replace_slot(&self, key: PartitionKey, resource: Resource<W>) -> Result<()> {
        let (epoch, old) = {
            let mut state = self.state.lock();
            let old = state
                .slots
                .get(&key)
                .and_then(Slot::handle)
                .filter(|old| !resource.holds(old))
                .cloned();

            let Some(old) = old else {
                let (_, previous) = state.install(key, SlotState::Idle(resource));
                drop(state);
                // A displaced proxy may own storage; drop it unlocked.
                drop(previous);
                self.stats.record_check_in();
                return Ok(());
            };
            let (epoch, _) = state.install(key.clone(), SlotState::CheckedOut(None));
            (epoch, old)
        };

        debug!("closing displaced writer for partition '{key}'");
        let closed = self.close_handle(&key, &old);
        self.stats.record_check_in();

        let mut state = self.state.lock();
        if state.is_current(&key, epoch)
            && let Some(slot) = state.slots.get_mut(&key)
        {
            slot.state = SlotState::Idle(resource);
            return closed;
        }
        // A concurrent check-in of this very handle already put it back.
        let already_installed = state
            .slots
            .get(&key)
            .and_then(Slot::handle)
            .is_some_and(|current| resource.holds(current));
        drop(state);
        if already_installed {
            return closed;
        }

        // Removed or replaced again while the old writer was closing; the
        // later operation wins and our resource never reaches the slot.
        warn!("partition '{key}' changed while its previous writer was closing");
        match resource {
            Resource::Concrete(handle) => closed.and(self.close_handle(&key, &handle)),
            Resource::Proxy(_) => closed,
        }
    }

    /// Claim `key` exclusively and get its writer.
    ///
    /// Fails with `NotFound` if nothing was checked in for `key` and with
    /// `AlreadyInUse` if someone else holds it. An idle proxy is materialized
    /// here, exactly once; its writer replaces it in the slot.
    pub fn check_out(&self, key: &str) -> Result<WriterHandle<W>> {
        let key = PartitionKey::new(key)?;

        let (proxy, epoch) = {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.get_mut(&key) else {
                self.stats.record_miss();
                return Err(QuiverError::not_found(key.into_inner()));
            };

            match std::mem::replace(&mut slot.state, SlotState::CheckedOut(None)) {
                SlotState::Idle(Resource::Concrete(handle)) => {
                    slot.state = SlotState::CheckedOut(Some(handle.clone()));
                    self.stats.record_check_out();
                    debug!("checked out writer for partition '{key}'");
                    return Ok(handle);
                }
                SlotState::Idle(Resource::Proxy(proxy)) => (proxy, slot.epoch),
                busy @ SlotState::CheckedOut(_) => {
                    slot.state = busy;
                    self.stats.record_conflict();
                    return Err(QuiverError::already_in_use(key.into_inner()));
                }
            }
        };

        // The slot reads as checked out while we materialize, so concurrent
        // check-outs of this key fail fast instead of creating a second writer.
        let mut pending = PendingMaterialization {
            pool: self,
            key: &key,
            epoch,
            armed: true,
        };
        info!("materializing writer for partition '{key}'");
        let created = proxy.materialize(&key);
        pending.armed = false;

        self.finish_materialization(&key, epoch, created)
    }

    fn finish_materialization(
        &self,
        key: &PartitionKey,
        epoch: u64,
        created: Result<W>,
    ) -> Result<WriterHandle<W>> {
        let mut state = self.state.lock();
        let current = state.is_current(key, epoch);

        let writer = match created {
            Ok(writer) => writer,
            Err(e) => {
                if current {
                    state.slots.remove(key);
                }
                drop(state);
                self.stats.record_creation_failure();
                warn!("failed to materialize writer for partition '{key}': {e}");
                return Err(QuiverError::creation_failed(key.as_str(), e));
            }
        };

        let handle = WriterHandle::new(writer);
        if current {
            if let Some(slot) = state.slots.get_mut(key) {
                slot.state = SlotState::CheckedOut(Some(handle.clone()));
            }
            drop(state);
            self.stats.record_materialization();
            self.stats.record_check_out();
            debug!("checked out new writer for partition '{key}'");
            return Ok(handle);
        }
        drop(state);

        // Removed or replaced while we were opening; the new writer has no slot.
        self.stats.record_materialization();
        warn!("partition '{key}' was evicted while its writer was being opened");
        self.close_handle(key, &handle)?;
        Err(QuiverError::not_found(key.as_str()))
    }

    /// Evict `key`, closing its writer if one was materialized.
    ///
    /// Removing an unknown key is a no-op. On a close failure the slot is
    /// still gone.
    pub fn remove(&self, key: &str) -> Result<()> {
        let key = PartitionKey::new(key)?;
        let removed = self.state.lock().slots.remove(&key);

        match removed {
            Some(slot) => {
                info!("removing partition '{key}' ({:?})", slot.kind());
                self.close_slot(&key, slot)
            }
            None => Ok(()),
        }
    }

    /// Evict and close every slot, leaving the pool empty.
    ///
    /// Every writer gets a close attempt; the first failure is returned.
    pub fn clean(&self) -> Result<()> {
        let drained: Vec<(PartitionKey, Slot<W>)> = self.state.lock().slots.drain().collect();
        if drained.is_empty() {
            return Ok(());
        }
        info!("cleaning writer pool ({} partitions)", drained.len());

        let mut first_error = None;
        let mut failures = 0usize;
        for (key, slot) in drained {
            if let Err(e) = self.close_slot(&key, slot) {
                failures += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) if failures == 1 => Err(e),
            Some(e) => Err(QuiverError::close_failed(
                "*",
                format!("{e} (and {} more)", failures - 1),
            )),
        }
    }

    /// Whether a slot exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    /// State of the slot for `key`, `None` if there is none.
    pub fn slot_kind(&self, key: &str) -> Option<SlotKind> {
        self.state.lock().slots.get(key).map(Slot::kind)
    }

    pub fn is_checked_out(&self, key: &str) -> bool {
        self.slot_kind(key) == Some(SlotKind::CheckedOut)
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// All keys with a slot, sorted.
    pub fn keys(&self) -> Vec<PartitionKey> {
        let mut keys: Vec<PartitionKey> = self.state.lock().slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    fn close_slot(&self, key: &PartitionKey, slot: Slot<W>) -> Result<()> {
        match slot.into_handle() {
            Some(handle) => self.close_handle(key, &handle),
            None => Ok(()),
        }
    }

    fn close_handle(&self, key: &PartitionKey, handle: &WriterHandle<W>) -> Result<()> {
        match handle.close() {
            Ok(()) => {
                self.stats.record_close(true);
                Ok(())
            }
            Err(e) => {
                self.stats.record_close(false);
                warn!("failed to close writer for partition '{key}': {e}");
                Err(QuiverError::close_failed(key.as_str(), e))
            }
        }
    }
}

impl<W: IndexWriter + 'static> Default for WriterPool<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: IndexWriter + 'static> Drop for WriterPool<W> {
    fn drop(&mut self) {
        if self.config.close_on_drop
            && let Err(e) = self.clean()
        {
            warn!("writer pool dropped with close failures: {e}");
        }
    }
}

/// Drops the half-built slot if materialization unwinds, so the key does not
/// stay checked out forever.
struct PendingMaterialization<'a, W: IndexWriter + 'static> {
    pool: &'a WriterPool<W>,
    key: &'a PartitionKey,
    epoch: u64,
    armed: bool,
}

impl<W: IndexWriter + 'static> Drop for PendingMaterialization<'_, W> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.pool.state.lock();
        if state.is_current(self.key, self.epoch) {
            state.slots.remove(self.key);
        }
    }
}
