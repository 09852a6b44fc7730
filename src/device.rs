//! The concrete button device behind the file contract.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DriverError, DriverResult};
use crate::fops::{FileDescription, FileOps};
use crate::regs;
use crate::subscribers::{SubscribeMode, SubscriberTable};
use crate::window::RegisterBus;

/// Operation counters, diagnostics only.
#[derive(Debug, Default)]
pub struct DeviceStats {
    reads: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl DeviceStats {
    #[inline]
    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Total successful reads.
    #[inline]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total writes accepted (and discarded).
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total failed operations.
    #[inline]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// The button-pad device.
///
/// Holds the live register bus for sampling and the subscriber table the
/// asynchronous hook feeds. There is no per-call state: every read samples
/// the hardware at call time, and no history of edges is kept anywhere.
pub struct ButtonDevice {
    bus: Arc<dyn RegisterBus>,
    subscribers: Arc<SubscriberTable>,
    stats: DeviceStats,
}

impl ButtonDevice {
    /// Binds the device to its bus and subscriber table.
    pub fn new(bus: Arc<dyn RegisterBus>, subscribers: Arc<SubscriberTable>) -> Self {
        Self {
            bus,
            subscribers,
            stats: DeviceStats::default(),
        }
    }

    /// Operation counters.
    #[inline]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// The subscriber table the device feeds.
    #[inline]
    pub fn subscribers(&self) -> &Arc<SubscriberTable> {
        &self.subscribers
    }
}

impl FileOps for ButtonDevice {
    fn open(&self, fd: &FileDescription) -> DriverResult {
        // Nothing is allocated per open; the log line is the only effect.
        debug!("opened fd {}", fd.id());
        Ok(())
    }

    fn release(&self, fd: &FileDescription) -> DriverResult {
        debug!("released fd {}", fd.id());
        // Withdraw the registration so no signal lands after close.
        self.subscribe(fd, SubscribeMode::Remove)
    }

    fn read(&self, fd: &FileDescription, buf: &mut [u8]) -> DriverResult<usize> {
        if buf.is_empty() {
            self.stats.record_error();
            return Err(DriverError::CopyFault);
        }
        // Live sample; pressed lines read 0 under the pull-ups. Anything
        // beyond the first byte of capacity is ignored.
        let levels = self.bus.load(regs::DIN);
        buf[0] = (levels & 0xFF) as u8;
        self.stats.record_read();
        trace!("fd {} read levels {:#04x}", fd.id(), buf[0]);
        Ok(1)
    }

    fn write(&self, fd: &FileDescription, buf: &[u8]) -> DriverResult<usize> {
        // Input-only device: accept anything, consume nothing.
        self.stats.record_write();
        debug!("fd {} write of {} bytes discarded", fd.id(), buf.len());
        Ok(0)
    }

    fn subscribe(&self, fd: &FileDescription, mode: SubscribeMode) -> DriverResult {
        self.subscribers.subscribe(fd.id(), fd.owner(), mode)
    }
}
