//! Wakeup registrations keyed by open file description.
//!
//! The table is the one structure shared between normal context
//! (subscribe/unsubscribe) and interrupt context (broadcast). It is guarded
//! by a spin lock that the interrupt path may take without sleeping, and it
//! never allocates while the lock is held — entries live in a bounded
//! [`ArrayVec`]. A broadcast racing a concurrent add/remove may miss or
//! double-post that one registration; it can never observe a
//! partially-written entry.
//!
//! Delivery itself goes through the injected [`SignalSink`], which must post
//! and return without blocking.

use alloc::sync::Arc;

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::error::{DriverError, DriverResult};

/// Most registrations a single device accepts.
pub const MAX_SUBSCRIBERS: usize = 16;

/// Identity of the process a wakeup signal is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

/// Host-side delivery of the input-ready signal.
///
/// Called only from interrupt context: implementations must post the signal
/// and return immediately, without blocking or sleeping.
pub trait SignalSink: Send + Sync {
    /// Post one input-ready signal to `owner`.
    fn post_input_ready(&self, owner: ProcessId);
}

/// Add or drop a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Insert, or refresh, the entry for a file description.
    Add,
    /// Delete the entry; absent entries are a no-op.
    Remove,
}

impl SubscribeMode {
    /// Decodes the host's raw mode argument: `0` removes, `1` adds.
    ///
    /// # Errors
    ///
    /// [`DriverError::Subscription`] for any other encoding.
    pub fn from_raw(raw: i32) -> DriverResult<Self> {
        match raw {
            0 => Ok(SubscribeMode::Remove),
            1 => Ok(SubscribeMode::Add),
            _ => Err(DriverError::Subscription),
        }
    }
}

/// One registration: which description, whose process, and whether delivery
/// is currently enabled.
#[derive(Debug, Clone, Copy)]
struct SubscriberEntry {
    fd: u64,
    owner: Option<ProcessId>,
    enabled: bool,
}

/// The subscriber registry.
///
/// `subscribe` runs in normal context; `broadcast` runs in interrupt
/// context. Both go through the same spin lock, which is the entire
/// synchronization story — nothing here blocks or allocates under the lock.
pub struct SubscriberTable {
    entries: Mutex<ArrayVec<SubscriberEntry, MAX_SUBSCRIBERS>>,
    signals: Arc<dyn SignalSink>,
}

impl SubscriberTable {
    /// Creates an empty table delivering through `signals`.
    pub fn new(signals: Arc<dyn SignalSink>) -> Self {
        Self {
            entries: Mutex::new(ArrayVec::new()),
            signals,
        }
    }

    /// Inserts, refreshes, or deletes the entry for `fd`.
    ///
    /// `Add` on an already-registered description refreshes its owner in
    /// place — one description is one entry, so a broadcast still delivers
    /// exactly one signal for it. `Remove` of an absent entry is a no-op.
    ///
    /// # Errors
    ///
    /// [`DriverError::Subscription`] if the table is full.
    pub fn subscribe(
        &self,
        fd: u64,
        owner: Option<ProcessId>,
        mode: SubscribeMode,
    ) -> DriverResult {
        let mut entries = self.entries.lock();
        match mode {
            SubscribeMode::Add => {
                if let Some(entry) = entries.iter_mut().find(|e| e.fd == fd) {
                    entry.owner = owner;
                    entry.enabled = true;
                } else {
                    entries
                        .try_push(SubscriberEntry {
                            fd,
                            owner,
                            enabled: true,
                        })
                        .map_err(|_| DriverError::Subscription)?;
                }
                debug!("fd {fd} subscribed (owner {:?})", owner);
            }
            SubscribeMode::Remove => {
                entries.retain(|e| e.fd != fd);
                debug!("fd {fd} unsubscribed");
            }
        }
        Ok(())
    }

    /// Posts one input-ready signal per enabled, owned registration.
    ///
    /// Interrupt context only. Registrations whose owner was never set are
    /// skipped: there is no process to signal yet.
    pub fn broadcast(&self) {
        let entries = self.entries.lock();
        for entry in entries.iter().filter(|e| e.enabled) {
            if let Some(owner) = entry.owner {
                self.signals.post_input_ready(owner);
            }
        }
    }

    /// Whether `fd` currently holds a registration.
    pub fn subscribed(&self, fd: u64) -> bool {
        self.entries.lock().iter().any(|e| e.fd == fd)
    }

    /// Number of current registrations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table has no registrations.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct RecordingSink {
        delivered: Mutex<Vec<ProcessId>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
            })
        }

        fn drain(&self) -> Vec<ProcessId> {
            core::mem::take(&mut *self.delivered.lock())
        }
    }

    impl SignalSink for RecordingSink {
        fn post_input_ready(&self, owner: ProcessId) {
            self.delivered.lock().push(owner);
        }
    }

    #[test]
    fn test_broadcast_fans_out_once_per_subscriber() {
        let sink = RecordingSink::new();
        let table = SubscriberTable::new(sink.clone());

        table.subscribe(1, Some(ProcessId(100)), SubscribeMode::Add).unwrap();
        table.subscribe(2, Some(ProcessId(200)), SubscribeMode::Add).unwrap();

        table.broadcast();
        let mut got = sink.drain();
        got.sort();
        assert_eq!(got, [ProcessId(100), ProcessId(200)]);
    }

    #[test]
    fn test_double_add_delivers_once() {
        let sink = RecordingSink::new();
        let table = SubscriberTable::new(sink.clone());

        table.subscribe(1, Some(ProcessId(100)), SubscribeMode::Add).unwrap();
        table.subscribe(1, Some(ProcessId(100)), SubscribeMode::Add).unwrap();
        assert_eq!(table.len(), 1);

        table.broadcast();
        assert_eq!(sink.drain(), [ProcessId(100)]);

        // One remove fully unsubscribes.
        table.subscribe(1, None, SubscribeMode::Remove).unwrap();
        table.broadcast();
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let sink = RecordingSink::new();
        let table = SubscriberTable::new(sink);
        assert_eq!(table.subscribe(7, None, SubscribeMode::Remove), Ok(()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_ownerless_entry_gets_no_signal() {
        let sink = RecordingSink::new();
        let table = SubscriberTable::new(sink.clone());

        table.subscribe(1, None, SubscribeMode::Add).unwrap();
        table.broadcast();
        assert!(sink.drain().is_empty());

        // Refreshing the entry with an owner starts delivery.
        table.subscribe(1, Some(ProcessId(5)), SubscribeMode::Add).unwrap();
        table.broadcast();
        assert_eq!(sink.drain(), [ProcessId(5)]);
    }

    #[test]
    fn test_full_table_rejects_add() {
        let sink = RecordingSink::new();
        let table = SubscriberTable::new(sink);
        for fd in 0..MAX_SUBSCRIBERS as u64 {
            table.subscribe(fd, Some(ProcessId(1)), SubscribeMode::Add).unwrap();
        }
        assert_eq!(
            table.subscribe(999, Some(ProcessId(1)), SubscribeMode::Add),
            Err(DriverError::Subscription)
        );
    }

    #[test]
    fn test_mode_decoding() {
        assert_eq!(SubscribeMode::from_raw(0), Ok(SubscribeMode::Remove));
        assert_eq!(SubscribeMode::from_raw(1), Ok(SubscribeMode::Add));
        assert_eq!(SubscribeMode::from_raw(-1), Err(DriverError::Subscription));
        assert_eq!(SubscribeMode::from_raw(2), Err(DriverError::Subscription));
    }
}
