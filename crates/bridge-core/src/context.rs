//! Per-invocation call context.
//!
//! Services never reach for a global store or a global buffering flag. Every
//! invocation receives a [`CallContext`] that owns its own [`MutationBuffer`]
//! and borrows the process's store for the duration of the call.

use crate::buffer::MutationBuffer;
use crate::protocol::Mutation;
use crate::store::StateStore;
use crate::Result;
use serde_json::Value;

pub struct CallContext<'a> {
    store: &'a mut dyn StateStore,
    buffer: MutationBuffer,
}

impl<'a> CallContext<'a> {
    /// A context whose mutations are applied to `store` but not captured.
    pub fn new(store: &'a mut dyn StateStore) -> Self {
        Self {
            store,
            buffer: MutationBuffer::new(),
        }
    }

    /// A context that captures every mutation it applies.
    pub fn capturing(store: &'a mut dyn StateStore) -> Result<Self> {
        let mut ctx = Self::new(store);
        ctx.buffer.arm()?;
        Ok(ctx)
    }

    /// Apply a mutation to the store and, when capturing, record it.
    pub fn commit(&mut self, mutation: Mutation) -> Result<()> {
        self.store.commit(&mutation)?;
        self.buffer.record(&mutation);
        Ok(())
    }

    /// Shorthand for [`CallContext::commit`] with a fresh mutation.
    pub fn emit(&mut self, mutation_type: &str, payload: Value) -> Result<()> {
        self.commit(Mutation::new(mutation_type, payload))
    }

    /// Read a service's state slice.
    pub fn state(&self, slice: &str) -> Option<&Value> {
        self.store.slice(slice)
    }

    pub fn is_capturing(&self) -> bool {
        self.buffer.is_armed()
    }

    pub fn buffer_mut(&mut self) -> &mut MutationBuffer {
        &mut self.buffer
    }

    /// Stop capturing and return the mutations applied so far.
    pub fn finish(mut self) -> Vec<Mutation> {
        self.buffer.drain()
    }
}
