//! Load/unload sequencing for the driver as a whole.
//!
//! Loading allocates the device identity, claims and maps the register
//! window, configures the port (attaching the service routine to both
//! vectors), and only then publishes the device node. Unloading walks the
//! same steps in reverse. Every failure during load releases everything
//! acquired so far before the error is returned — the identity, the
//! reservation, and the vector pair are all drop-released guards, so a `?`
//! anywhere in the sequence unwinds cleanly.
//!
//! All host facilities are injected through [`Platform`]; two drivers loaded
//! against the same platform model two module loads on one machine, which is
//! how the second load's address conflict is observable.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, Ordering};

use arrayvec::ArrayVec;
use memory_addr::PhysAddr;
use spin::Mutex;

use crate::device::ButtonDevice;
use crate::error::{DriverError, DriverResult};
use crate::fops::DeviceNode;
use crate::gpio;
use crate::irq::{ButtonIsr, InterruptHost, IrqRegistration};
use crate::regs;
use crate::subscribers::{SignalSink, SubscriberTable};
use crate::window::{BusMapper, RegisterWindow, ReservationTable};

/// Stable name the device node is published under.
pub const DEVICE_NAME: &str = "gamepad";

/// Size of the host's device-number pool.
const IDENTITY_POOL: usize = 8;

/// Where the driver is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    /// Nothing allocated.
    Unloaded = 0,
    /// Acquiring resources; not yet visible to consumers.
    Loading = 1,
    /// Device published, interrupts live.
    Loaded = 2,
    /// Tearing down.
    Unloading = 3,
}

/// Atomic holder for the lifecycle state.
struct StateCell(AtomicU8);

impl StateCell {
    const fn new() -> Self {
        Self(AtomicU8::new(DriverState::Unloaded as u8))
    }

    fn get(&self) -> DriverState {
        match self.0.load(Ordering::Acquire) {
            0 => DriverState::Unloaded,
            1 => DriverState::Loading,
            2 => DriverState::Loaded,
            _ => DriverState::Unloading,
        }
    }

    fn set(&self, state: DriverState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: DriverState, to: DriverState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Pool of device numbers the host hands out.
pub struct IdentityAllocator {
    free: Mutex<ArrayVec<u32, IDENTITY_POOL>>,
}

impl IdentityAllocator {
    /// Creates a pool of `count` numbers (capped at the pool size).
    pub fn new(count: usize) -> Self {
        let mut free = ArrayVec::new();
        for number in (0..count.min(IDENTITY_POOL) as u32).rev() {
            free.push(number);
        }
        Self {
            free: Mutex::new(free),
        }
    }

    /// Allocates the lowest free number under `name`.
    ///
    /// # Errors
    ///
    /// [`DriverError::IdentityAllocation`] when the pool is exhausted.
    pub fn allocate(self: &Arc<Self>, name: &'static str) -> DriverResult<DeviceIdentity> {
        let number = self
            .free
            .lock()
            .pop()
            .ok_or(DriverError::IdentityAllocation)?;
        debug!("{name}: allocated device number {number}");
        Ok(DeviceIdentity {
            number,
            name,
            pool: Arc::clone(self),
        })
    }

    /// Numbers still available.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    fn put_back(&self, number: u32) {
        // Pool capacity equals the number of identities ever issued, so the
        // push cannot fail.
        let _ = self.free.lock().try_push(number);
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new(IDENTITY_POOL)
    }
}

/// A held device number plus the stable device name.
///
/// Unique for as long as the driver stays loaded; the number returns to the
/// pool on drop.
pub struct DeviceIdentity {
    number: u32,
    name: &'static str,
    pool: Arc<IdentityAllocator>,
}

impl DeviceIdentity {
    /// The allocated device number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The stable device name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for DeviceIdentity {
    fn drop(&mut self) {
        self.pool.put_back(self.number);
    }
}

/// Host services the driver is loaded against.
///
/// Swapping these for simulated implementations runs the whole driver
/// without hardware.
pub struct Platform {
    /// Device-number pool.
    pub identities: Arc<IdentityAllocator>,
    /// Ledger of claimed register ranges.
    pub reservations: Arc<ReservationTable>,
    /// Maps a claimed range into a live register bus.
    pub mapper: Arc<dyn BusMapper>,
    /// Vector table handlers attach to.
    pub interrupts: Arc<dyn InterruptHost>,
    /// Signal delivery for subscriber wakeups.
    pub signals: Arc<dyn SignalSink>,
}

/// The loaded driver.
///
/// Field order is teardown order: vectors detach first, then the node
/// retires, then the window unmaps and releases its reservation, then the
/// identity returns to the pool — the exact reverse of load.
pub struct Driver {
    state: StateCell,
    irq: IrqRegistration,
    node: DeviceNode,
    device: Arc<ButtonDevice>,
    isr: Arc<ButtonIsr>,
    window: RegisterWindow,
    identity: DeviceIdentity,
}

impl Driver {
    /// Brings the device up.
    ///
    /// # Errors
    ///
    /// Any of the load-time errors in [`DriverError`]; in every case all
    /// resources acquired before the failure have been released again.
    pub fn load(platform: &Platform) -> DriverResult<Self> {
        let state = StateCell::new();
        state.set(DriverState::Loading);

        let identity = platform.identities.allocate(DEVICE_NAME)?;
        let window = RegisterWindow::acquire(
            &platform.reservations,
            platform.mapper.as_ref(),
            PhysAddr::from(regs::PORT_BASE),
            regs::WINDOW_LEN,
        )?;

        let subscribers = Arc::new(SubscriberTable::new(Arc::clone(&platform.signals)));
        let isr = Arc::new(ButtonIsr::new(
            Arc::clone(window.bus()),
            Arc::clone(&subscribers),
        ));
        let irq = gpio::configure(window.bus().as_ref(), &platform.interrupts, Arc::clone(&isr))?;

        let device = Arc::new(ButtonDevice::new(Arc::clone(window.bus()), subscribers));
        let node = DeviceNode::publish(identity.name(), device.clone());

        state.set(DriverState::Loaded);
        info!(
            "{DEVICE_NAME}: loaded as device {} at {:?}",
            identity.number(),
            window.range()
        );
        Ok(Self {
            state,
            irq,
            node,
            device,
            isr,
            window,
            identity,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state.get()
    }

    /// The published endpoint consumers open.
    pub fn node(&self) -> &DeviceNode {
        &self.node
    }

    /// The device implementation (for counters).
    pub fn device(&self) -> &Arc<ButtonDevice> {
        &self.device
    }

    /// The service routine (for counters).
    pub fn isr(&self) -> &Arc<ButtonIsr> {
        &self.isr
    }

    /// Tears the device down, reversing load step by step.
    pub fn unload(self) {
        let Driver {
            state,
            irq,
            node,
            device,
            isr,
            window,
            identity,
        } = self;
        state.transition(DriverState::Loaded, DriverState::Unloading);

        let number = identity.number();
        drop(irq); // vectors detach before anything else goes away
        drop(node); // device no longer reachable by consumers
        drop(isr);
        drop(device);
        drop(window); // unmap, then release the reservation
        drop(identity); // number returns to the pool

        state.set(DriverState::Unloaded);
        info!("{DEVICE_NAME}: device {number} unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::irq::{IrqHandler, IrqStatus};
    use crate::subscribers::ProcessId;
    use crate::window::RegisterBus;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use memory_addr::PhysAddrRange;

    struct SimBus {
        regs: Mutex<[u32; regs::WINDOW_LEN / 4]>,
    }

    impl SimBus {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                regs: Mutex::new([0; regs::WINDOW_LEN / 4]),
            })
        }
    }

    impl RegisterBus for SimBus {
        fn load(&self, offset: usize) -> u32 {
            self.regs.lock()[offset / 4]
        }

        fn store(&self, offset: usize, value: u32) {
            let mut regs_ = self.regs.lock();
            if offset == regs::IFC {
                regs_[regs::IF / 4] &= !value;
            } else {
                regs_[offset / 4] = value;
            }
        }
    }

    struct SimMapper {
        bus: Arc<SimBus>,
        broken: bool,
    }

    impl BusMapper for SimMapper {
        fn map(&self, _range: PhysAddrRange) -> DriverResult<Arc<dyn RegisterBus>> {
            if self.broken {
                return Err(DriverError::MapFailure);
            }
            Ok(self.bus.clone())
        }
    }

    struct SimIrqHost {
        handlers: Mutex<BTreeMap<u32, Arc<dyn IrqHandler>>>,
    }

    impl SimIrqHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handlers: Mutex::new(BTreeMap::new()),
            })
        }

        fn attached(&self) -> usize {
            self.handlers.lock().len()
        }

        fn fire(&self, vector: u32) -> Option<IrqStatus> {
            let handler = self.handlers.lock().get(&vector).cloned();
            handler.map(|h| h.handle(vector))
        }
    }

    impl InterruptHost for SimIrqHost {
        fn attach(&self, vector: u32, handler: Arc<dyn IrqHandler>) -> DriverResult {
            self.handlers.lock().insert(vector, handler);
            Ok(())
        }

        fn detach(&self, vector: u32) {
            self.handlers.lock().remove(&vector);
        }
    }

    struct SimSignals {
        delivered: Mutex<Vec<ProcessId>>,
    }

    impl SimSignals {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    impl SignalSink for SimSignals {
        fn post_input_ready(&self, owner: ProcessId) {
            self.delivered.lock().push(owner);
        }
    }

    fn sim_platform(identities: usize) -> (Platform, Arc<SimBus>, Arc<SimIrqHost>) {
        let bus = SimBus::new();
        let host = SimIrqHost::new();
        let platform = Platform {
            identities: Arc::new(IdentityAllocator::new(identities)),
            reservations: Arc::new(ReservationTable::new()),
            mapper: Arc::new(SimMapper {
                bus: bus.clone(),
                broken: false,
            }),
            interrupts: host.clone(),
            signals: SimSignals::new(),
        };
        (platform, bus, host)
    }

    #[test]
    fn test_state_cell_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), DriverState::Unloaded);
        cell.set(DriverState::Loaded);
        assert!(cell.transition(DriverState::Loaded, DriverState::Unloading));
        assert!(!cell.transition(DriverState::Loaded, DriverState::Unloading));
        assert_eq!(cell.get(), DriverState::Unloading);
    }

    #[test]
    fn test_identity_pool_roundtrip() {
        let pool = Arc::new(IdentityAllocator::new(2));
        let a = pool.allocate(DEVICE_NAME).unwrap();
        let b = pool.allocate(DEVICE_NAME).unwrap();
        assert_ne!(a.number(), b.number());
        assert_eq!(
            pool.allocate(DEVICE_NAME).err(),
            Some(DriverError::IdentityAllocation)
        );

        drop(a);
        assert_eq!(pool.available(), 1);
        let c = pool.allocate(DEVICE_NAME).unwrap();
        assert_eq!(c.number(), 0);
        drop(b);
        drop(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_load_publishes_and_configures() {
        let (platform, bus, host) = sim_platform(4);
        let driver = Driver::load(&platform).unwrap();
        assert_eq!(driver.state(), DriverState::Loaded);
        assert_eq!(driver.node().name(), DEVICE_NAME);
        assert_eq!(host.attached(), 2);
        assert_eq!(platform.reservations.reserved_count(), 1);
        assert_eq!(bus.load(regs::MODEL), regs::MODE_INPUT_FILTER);
        assert_eq!(bus.load(regs::IEN), regs::IRQ_ENABLE_ALL);
    }

    #[test]
    fn test_unload_reverses_everything() {
        let (platform, _bus, host) = sim_platform(4);
        let available = platform.identities.available();
        let driver = Driver::load(&platform).unwrap();
        driver.unload();
        assert_eq!(host.attached(), 0);
        assert_eq!(platform.reservations.reserved_count(), 0);
        assert_eq!(platform.identities.available(), available);

        // A fresh load over the same platform succeeds.
        let again = Driver::load(&platform).unwrap();
        assert_eq!(again.state(), DriverState::Loaded);
    }

    #[test]
    fn test_second_load_conflicts() {
        let (platform, _bus, _host) = sim_platform(4);
        let first = Driver::load(&platform).unwrap();
        assert!(matches!(
            Driver::load(&platform).err(),
            Some(DriverError::AddressConflict(_))
        ));
        // The failed load returned its identity.
        assert_eq!(platform.identities.available(), 3);
        assert_eq!(first.state(), DriverState::Loaded);
    }

    #[test]
    fn test_exhausted_identities_fail_load() {
        let (platform, _bus, _host) = sim_platform(0);
        assert_eq!(
            Driver::load(&platform).err(),
            Some(DriverError::IdentityAllocation)
        );
        assert_eq!(platform.reservations.reserved_count(), 0);
    }

    #[test]
    fn test_map_failure_unwinds_identity_and_reservation() {
        let (mut platform, bus, _host) = sim_platform(2);
        platform.mapper = Arc::new(SimMapper { bus, broken: true });
        assert_eq!(Driver::load(&platform).err(), Some(DriverError::MapFailure));
        assert_eq!(platform.identities.available(), 2);
        assert_eq!(platform.reservations.reserved_count(), 0);
    }

    #[test]
    fn test_fired_vector_reaches_isr() {
        let (platform, bus, host) = sim_platform(4);
        let driver = Driver::load(&platform).unwrap();

        bus.store(regs::IF, 0x01);
        assert_eq!(host.fire(regs::IRQ_EVEN), Some(IrqStatus::Handled));
        assert_eq!(bus.load(regs::IF), 0);
        assert_eq!(driver.isr().serviced(), 1);
    }
}
