//! Capture of the mutations produced while one call is being dispatched.

use crate::protocol::Mutation;
use crate::{BridgeError, Result};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    #[default]
    Disarmed,
    Armed,
}

/// Armed/disarmed recorder of mutations.
///
/// While armed, every recorded mutation is appended in emission order.
/// `drain` disarms and hands back exactly that sequence. Arming an armed
/// buffer means two call handlings overlap, which is a logic error.
#[derive(Debug, Default)]
pub struct MutationBuffer {
    state: BufferState,
    captured: Vec<Mutation>,
}

impl MutationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == BufferState::Armed
    }

    /// Start capturing. Clears anything left over from a previous capture.
    pub fn arm(&mut self) -> Result<()> {
        if self.is_armed() {
            error!(
                captured = self.captured.len(),
                "Mutation buffer armed while already armed"
            );
            return Err(BridgeError::BufferReentrancy);
        }
        self.captured.clear();
        self.state = BufferState::Armed;
        Ok(())
    }

    /// Append a mutation if armed; returns whether it was captured.
    pub fn record(&mut self, mutation: &Mutation) -> bool {
        if self.is_armed() {
            self.captured.push(mutation.clone());
            true
        } else {
            false
        }
    }

    /// Stop capturing and return the captured mutations in emission order.
    pub fn drain(&mut self) -> Vec<Mutation> {
        self.state = BufferState::Disarmed;
        std::mem::take(&mut self.captured)
    }
}
