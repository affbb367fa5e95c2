//! Counting gates bounding how many sectors run a stage at once.

use crate::{BenchError, BenchResult};

/// Admits at most `capacity` holders; further callers block until a slot frees.
///
/// Waiters are admitted in arrival order.
#[derive(Debug, Clone)]
pub struct StageGate {
    name: &'static str,
    tx: flume::Sender<()>,
    rx: flume::Receiver<()>,
}

/// A held gate slot; released on drop.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a StageGate,
}

impl StageGate {
    pub fn new(name: &'static str, capacity: usize) -> BenchResult<Self> {
        if capacity == 0 {
            return Err(BenchError::Config(format!(
                "{name} parallelism must be at least 1"
            )));
        }
        let (tx, rx) = flume::bounded(capacity);
        Ok(StageGate { name, tx, rx })
    }

    /// Number of slots currently held.
    pub fn holders(&self) -> usize {
        self.tx.len()
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> BenchResult<GatePermit<'_>> {
        // Both ends live in `self`, so the channel cannot disconnect here.
        self.tx
            .send(())
            .map_err(|_| BenchError::Message(format!("{} gate closed", self.name)))?;
        tracing::trace!(gate = self.name, holders = self.holders(), "gate acquired");
        Ok(GatePermit { gate: self })
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        self.tx.try_send(()).ok().map(|_| GatePermit { gate: self })
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.rx.try_recv();
    }
}
