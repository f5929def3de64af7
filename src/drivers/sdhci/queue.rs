//! FIFO of submitted commands
//!
//! The head entry is the one on the wire; everything behind it waits for
//! the head to complete.

use heapless::Deque;

use super::command::{Callback, Command};

/// Identifies a submission so a blocking caller can find its command again
pub type Ticket = u32;

/// A queued command and its bookkeeping
#[derive(Debug)]
pub struct InFlight {
    pub cmd: Command,
    pub callback: Option<Callback>,
    pub token: usize,
    pub ticket: Ticket,
    /// Programmed into the controller
    pub issued: bool,
    /// Command complete seen
    pub command_done: bool,
    /// Transfer complete seen
    pub data_done: bool,
    /// Next PIO word to transfer
    pub pio_offset: usize,
}

impl InFlight {
    pub fn new(cmd: Command, callback: Option<Callback>, token: usize, ticket: Ticket) -> Self {
        Self {
            cmd,
            callback,
            token,
            ticket,
            issued: false,
            command_done: false,
            data_done: false,
            pio_offset: 0,
        }
    }
}

/// Bounded command FIFO
pub struct CommandQueue<const N: usize> {
    entries: Deque<InFlight, N>,
    next_ticket: Ticket,
}

impl<const N: usize> CommandQueue<N> {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
            next_ticket: 0,
        }
    }

    /// Append a command; returns its ticket and whether it became the head
    pub fn push(
        &mut self,
        cmd: Command,
        callback: Option<Callback>,
        token: usize,
    ) -> Result<(Ticket, bool), Command> {
        let ticket = self.next_ticket;
        let was_idle = self.entries.is_empty();
        self.entries
            .push_back(InFlight::new(cmd, callback, token, ticket))
            .map_err(|entry| entry.cmd)?;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        Ok((ticket, was_idle))
    }

    pub fn head(&self) -> Option<&InFlight> {
        self.entries.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut InFlight> {
        self.entries.front_mut()
    }

    /// Unlink the head entry
    pub fn pop(&mut self) -> Option<InFlight> {
        self.entries.pop_front()
    }

    pub fn contains(&self, ticket: Ticket) -> bool {
        self.entries.iter().any(|entry| entry.ticket == ticket)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<const N: usize> Default for CommandQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
