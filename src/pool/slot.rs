//! Per-key slot state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pool::handle::WriterHandle;
use crate::pool::proxy::WriterProxy;

/// What an idle slot holds.
pub(crate) enum Resource<W> {
    /// Deferred initializer, not yet materialized.
    Proxy(Box<dyn WriterProxy<W>>),
    /// Ready writer.
    Concrete(WriterHandle<W>),
}

impl<W> Resource<W> {
    /// Whether this is a concrete resource wrapping the same writer as `handle`.
    pub(crate) fn holds(&self, handle: &WriterHandle<W>) -> bool
    where
        W: crate::writer::IndexWriter,
    {
        matches!(self, Resource::Concrete(own) if own.same_writer(handle))
    }
}

pub(crate) enum SlotState<W> {
    Idle(Resource<W>),
    /// Claimed by one caller. `None` while a proxy is being materialized.
    CheckedOut(Option<WriterHandle<W>>),
}

/// One pool entry. `epoch` is unique per installed slot, so a slot that was
/// replaced or removed and re-added is never mistaken for the original.
pub(crate) struct Slot<W> {
    pub(crate) epoch: u64,
    pub(crate) state: SlotState<W>,
}

impl<W> Slot<W> {
    pub(crate) fn kind(&self) -> SlotKind {
        match &self.state {
            SlotState::Idle(Resource::Proxy(_)) => SlotKind::IdleProxy,
            SlotState::Idle(Resource::Concrete(_)) => SlotKind::IdleConcrete,
            SlotState::CheckedOut(_) => SlotKind::CheckedOut,
        }
    }

    pub(crate) fn handle(&self) -> Option<&WriterHandle<W>> {
        match &self.state {
            SlotState::Idle(Resource::Concrete(handle)) => Some(handle),
            SlotState::CheckedOut(handle) => handle.as_ref(),
            SlotState::Idle(Resource::Proxy(_)) => None,
        }
    }

    /// The materialized writer, if any, regardless of check-out state.
    pub(crate) fn into_handle(self) -> Option<WriterHandle<W>> {
        match self.state {
            SlotState::Idle(Resource::Concrete(handle)) => Some(handle),
            SlotState::CheckedOut(handle) => handle,
            SlotState::Idle(Resource::Proxy(_)) => None,
        }
    }
}

impl<W> fmt::Debug for Slot<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("epoch", &self.epoch)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Observable state of a non-empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// A ready writer, not checked out.
    IdleConcrete,
    /// A proxy that has not produced a writer yet.
    IdleProxy,
    /// Claimed by a caller.
    CheckedOut,
}
