//! Exclusive reservation and mapped access for the register window.
//!
//! Bringing the port's registers into reach is a two-step contract:
//!
//! 1. **Claim** the physical range in the host's [`ReservationTable`]. A
//!    range that overlaps any existing reservation is refused with
//!    [`DriverError::AddressConflict`]; callers treat that as fatal to load.
//! 2. **Map** the claimed range through a [`BusMapper`] into a live
//!    [`RegisterBus`]. Mapping failure releases the claim on the way out.
//!
//! Both steps are undone in reverse order when the [`RegisterWindow`] is
//! dropped: the mapping handle goes first, then the reservation.
//!
//! The [`BusMapper`] seam is what makes the rest of the driver testable: a
//! simulated bus backed by plain memory satisfies the same contract as the
//! volatile [`MmioBus`] over real hardware.

use alloc::sync::Arc;
use alloc::vec::Vec;

use memory_addr::{PhysAddr, PhysAddrRange};
use spin::Mutex;

use crate::error::{DriverError, DriverResult};

/// Ordered, non-cached access to 32-bit device registers.
///
/// Stores are control-plane side effects, not memory: implementations must
/// not buffer, merge, reorder, or elide them, and loads must observe the
/// device's current value rather than any cached copy.
pub trait RegisterBus: Send + Sync {
    /// Load the 32-bit register at `offset` bytes into the window.
    fn load(&self, offset: usize) -> u32;
    /// Store to the 32-bit register at `offset` bytes into the window.
    fn store(&self, offset: usize, value: u32);
}

/// Turns a reserved physical range into a live [`RegisterBus`].
///
/// The production implementation performs the host's device-mapping call;
/// tests return a simulated bus instead.
pub trait BusMapper: Send + Sync {
    /// Map `range` for register access.
    ///
    /// # Errors
    ///
    /// [`DriverError::MapFailure`] if the range cannot be mapped. The caller
    /// owns the reservation and will release it.
    fn map(&self, range: PhysAddrRange) -> DriverResult<Arc<dyn RegisterBus>>;
}

/// [`RegisterBus`] over a raw pointer to an already-mapped device region.
///
/// Accesses are volatile, which keeps the compiler from caching or eliding
/// them; the mapping itself must be configured non-cacheable by whoever
/// created it.
pub struct MmioBus {
    base: *mut u32,
    len: usize,
}

// SAFETY: the bus only ever issues volatile loads/stores of independent
// 32-bit registers through a fixed pointer; no &mut aliasing exists.
unsafe impl Send for MmioBus {}
unsafe impl Sync for MmioBus {}

impl MmioBus {
    /// Wraps a device mapping.
    ///
    /// # Safety
    ///
    /// `base` must point to a live, non-cacheable device mapping of at least
    /// `len` bytes that stays valid for the lifetime of the bus, and nothing
    /// else may create references into it.
    pub unsafe fn new(base: *mut u32, len: usize) -> Self {
        Self { base, len }
    }
}

impl RegisterBus for MmioBus {
    #[inline]
    fn load(&self, offset: usize) -> u32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        unsafe { self.base.byte_add(offset).read_volatile() }
    }

    #[inline]
    fn store(&self, offset: usize, value: u32) {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        unsafe { self.base.byte_add(offset).write_volatile(value) }
    }
}

/// Ledger of physical register ranges currently claimed by loaded drivers.
///
/// Shared (via `Arc`) between every driver instance loaded against the same
/// host, so a second load over the same range is refused.
pub struct ReservationTable {
    ranges: Mutex<Vec<PhysAddrRange>>,
}

impl ReservationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            ranges: Mutex::new(Vec::new()),
        }
    }

    /// Claims `range` exclusively.
    ///
    /// # Errors
    ///
    /// [`DriverError::AddressConflict`] if `range` overlaps any current
    /// reservation.
    pub fn claim(self: &Arc<Self>, range: PhysAddrRange) -> DriverResult<Reservation> {
        let mut ranges = self.ranges.lock();
        if ranges
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
        {
            return Err(DriverError::AddressConflict(range));
        }
        ranges.push(range);
        debug!("reserved register range {:?}", range);
        Ok(Reservation {
            table: Arc::clone(self),
            range,
        })
    }

    fn release(&self, range: PhysAddrRange) {
        self.ranges.lock().retain(|r| *r != range);
        debug!("released register range {:?}", range);
    }

    /// Number of ranges currently reserved.
    pub fn reserved_count(&self) -> usize {
        self.ranges.lock().len()
    }
}

impl Default for ReservationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A claimed range; returns itself to the table on drop.
pub struct Reservation {
    table: Arc<ReservationTable>,
    range: PhysAddrRange,
}

impl Reservation {
    /// The reserved range.
    pub fn range(&self) -> PhysAddrRange {
        self.range
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.table.release(self.range);
    }
}

/// The mapped register window: reservation plus live bus.
///
/// Field order is teardown order: the mapping handle is dropped before the
/// reservation is released.
pub struct RegisterWindow {
    bus: Arc<dyn RegisterBus>,
    reservation: Reservation,
}

impl RegisterWindow {
    /// Claims and maps `len` bytes of registers starting at `base`.
    ///
    /// # Errors
    ///
    /// [`DriverError::AddressConflict`] if the range is already reserved,
    /// [`DriverError::MapFailure`] if mapping fails (the reservation is
    /// released before the error is returned).
    pub fn acquire(
        table: &Arc<ReservationTable>,
        mapper: &dyn BusMapper,
        base: PhysAddr,
        len: usize,
    ) -> DriverResult<Self> {
        let reservation = table.claim(PhysAddrRange::from_start_size(base, len))?;
        let bus = mapper.map(reservation.range())?;
        Ok(Self { bus, reservation })
    }

    /// The live register bus.
    #[inline]
    pub fn bus(&self) -> &Arc<dyn RegisterBus> {
        &self.bus
    }

    /// The physical range behind the window.
    pub fn range(&self) -> PhysAddrRange {
        self.reservation.range()
    }
}
