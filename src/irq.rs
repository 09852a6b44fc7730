//! Interrupt vector plumbing and the edge service routine.
//!
//! The port's eight lines are split across two host vectors — even-numbered
//! lines on one, odd-numbered on the other — so the same handler is attached
//! twice. The handler receives its device state as an owned `Arc`, not
//! through file-scope statics, which is what lets tests run several
//! simulated instances side by side.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::DriverResult;
use crate::regs;
use crate::subscribers::SubscriberTable;
use crate::window::RegisterBus;

/// What a handler reports back to the host dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqStatus {
    /// The interrupt belonged to this handler and was acknowledged.
    Handled,
    /// The interrupt was not this handler's to service.
    NotMine,
}

/// A routine the host invokes on a hardware vector.
///
/// Runs in interrupt context: it must complete in bounded, short time and
/// may not block, sleep, or take any primitive that could do either.
pub trait IrqHandler: Send + Sync {
    /// Service one interrupt on `vector`.
    fn handle(&self, vector: u32) -> IrqStatus;
}

/// Host-side vector table the driver attaches its handler to.
pub trait InterruptHost: Send + Sync {
    /// Attach `handler` to `vector`.
    ///
    /// # Errors
    ///
    /// [`DriverError::InterruptRegistration`](crate::DriverError::InterruptRegistration)
    /// if the vector cannot be claimed.
    fn attach(&self, vector: u32, handler: Arc<dyn IrqHandler>) -> DriverResult;

    /// Detach whatever is attached to `vector`.
    fn detach(&self, vector: u32);
}

/// A claimed pair of vectors; detaches both on drop.
pub struct IrqRegistration {
    host: Arc<dyn InterruptHost>,
    vectors: [u32; 2],
}

impl IrqRegistration {
    /// Attaches `handler` to both vectors.
    ///
    /// If the second attach fails, the first is detached again before the
    /// error is returned — a half-claimed pair never escapes.
    pub fn attach_pair(
        host: &Arc<dyn InterruptHost>,
        vectors: [u32; 2],
        handler: Arc<dyn IrqHandler>,
    ) -> DriverResult<Self> {
        host.attach(vectors[0], Arc::clone(&handler))?;
        if let Err(err) = host.attach(vectors[1], handler) {
            host.detach(vectors[0]);
            return Err(err);
        }
        debug!("handler attached to vectors {} and {}", vectors[0], vectors[1]);
        Ok(Self {
            host: Arc::clone(host),
            vectors,
        })
    }

    /// The claimed vectors.
    pub fn vectors(&self) -> [u32; 2] {
        self.vectors
    }
}

impl Drop for IrqRegistration {
    fn drop(&mut self) {
        self.host.detach(self.vectors[1]);
        self.host.detach(self.vectors[0]);
    }
}

/// The edge service routine: a pure edge-to-signal translator.
///
/// On every invocation it writes the clear-all mask to the flag-clear
/// register (the acknowledgment the hardware needs to stop re-asserting the
/// line) and fans a wakeup signal out through the subscriber table. It reads
/// no button state and stores no event; consumers sample the live levels
/// themselves when their signal handler calls read.
///
/// An invocation that finds the flag bits already clear still acknowledges
/// and reports [`IrqStatus::Handled`]; no spurious-delivery filtering is
/// attempted.
pub struct ButtonIsr {
    bus: Arc<dyn RegisterBus>,
    subscribers: Arc<SubscriberTable>,
    serviced: AtomicU64,
}

impl ButtonIsr {
    /// Binds the routine to its register bus and subscriber table.
    pub fn new(bus: Arc<dyn RegisterBus>, subscribers: Arc<SubscriberTable>) -> Self {
        Self {
            bus,
            subscribers,
            serviced: AtomicU64::new(0),
        }
    }

    /// Total edges serviced since load.
    pub fn serviced(&self) -> u64 {
        self.serviced.load(Ordering::Relaxed)
    }
}

impl IrqHandler for ButtonIsr {
    fn handle(&self, vector: u32) -> IrqStatus {
        // Acknowledge first; the line re-asserts until the flags are gone.
        self.bus.store(regs::IFC, regs::IF_CLEAR_ALL);
        self.subscribers.broadcast();
        self.serviced.fetch_add(1, Ordering::Relaxed);
        trace!("edge on vector {vector} acknowledged");
        IrqStatus::Handled
    }
}
