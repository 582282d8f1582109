//! Lifecycle bookkeeping for pooled command buffers.
//!
//! Every command buffer allocated from a pool moves through
//! `Free -> Recording -> Executable -> Submitted -> Free`. A submitted command buffer only becomes
//! free again once the serial of the submission it was part of has retired. The recycler never talks to
//! the device itself, it only decides which handle can be handed out next.

/// State of a pooled command buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Available to be handed out.
    Free,
    /// Handed out and accepting commands.
    Recording,
    /// Recording has ended, waiting to be submitted.
    Executable,
    /// Part of a submission that may still be executing.
    Submitted,
}

#[derive(Debug)]
struct Slot<H> {
    handle: H,
    state: CommandBufferState,
    serial: u64,
}

/// Tracks the state of every command buffer allocated from one pool.
#[derive(Debug)]
pub struct CommandBufferRecycler<H> {
    slots: Vec<Slot<H>>,
}

impl<H> Default for CommandBufferRecycler<H> {
    fn default() -> Self {
        Self {
            slots: vec![],
        }
    }
}

impl<H: Copy + Eq + std::fmt::Debug> CommandBufferRecycler<H> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, handle: H) -> &mut Slot<H> {
        match self.slots.iter_mut().find(|slot| slot.handle == handle) {
            Some(slot) => slot,
            None => panic!("command buffer {handle:?} does not belong to this pool"),
        }
    }

    /// Hand out a command buffer for recording. Submissions up to `completed` are retired first, then the first
    /// free command buffer is reused. If there is none, `allocate` is called to create a new one.
    pub fn acquire<E>(&mut self, completed: u64, allocate: impl FnOnce() -> Result<H, E>) -> Result<H, E> {
        self.retire(completed);
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.state == CommandBufferState::Free)
        {
            slot.state = CommandBufferState::Recording;
            return Ok(slot.handle);
        }

        let handle = allocate()?;
        self.slots.push(Slot {
            handle,
            state: CommandBufferState::Recording,
            serial: 0,
        });
        Ok(handle)
    }

    /// Recording ended.
    /// # Panics
    /// Panics if the command buffer was not recording.
    pub fn mark_executable(&mut self, handle: H) {
        let slot = self.slot_mut(handle);
        assert_eq!(
            slot.state,
            CommandBufferState::Recording,
            "command buffer {handle:?} finished while not recording"
        );
        slot.state = CommandBufferState::Executable;
    }

    /// The command buffer was submitted as part of the submission with this serial.
    /// # Panics
    /// Panics if the command buffer was not executable.
    pub fn mark_submitted(&mut self, handle: H, serial: u64) {
        let slot = self.slot_mut(handle);
        assert_eq!(
            slot.state,
            CommandBufferState::Executable,
            "command buffer {handle:?} submitted while not executable"
        );
        slot.state = CommandBufferState::Submitted;
        slot.serial = serial;
    }

    /// Return a command buffer that was never submitted to the free list.
    /// # Panics
    /// Panics if the command buffer is currently submitted.
    pub fn release(&mut self, handle: H) {
        let slot = self.slot_mut(handle);
        assert_ne!(
            slot.state,
            CommandBufferState::Submitted,
            "command buffer {handle:?} released while in flight"
        );
        slot.state = CommandBufferState::Free;
    }

    /// Free every submitted command buffer whose serial is at most `completed`. Returns how many were freed.
    pub fn retire(&mut self, completed: u64) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.state == CommandBufferState::Submitted && slot.serial <= completed {
                slot.state = CommandBufferState::Free;
                count += 1;
            }
        }
        count
    }

    /// Current state of a command buffer, or `None` if it is not part of this pool.
    pub fn state(&self, handle: H) -> Option<CommandBufferState> {
        self.slots
            .iter()
            .find(|slot| slot.handle == handle)
            .map(|slot| slot.state)
    }

    /// Number of command buffers in a given state.
    pub fn count(&self, state: CommandBufferState) -> usize {
        self.slots.iter().filter(|slot| slot.state == state).count()
    }

    /// Total number of command buffers ever allocated through this recycler.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
