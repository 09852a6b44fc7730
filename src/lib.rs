#![no_std]

//! # GPIO Button-Pad Driver Core
//!
//! Digital-input sensing for a row of push buttons wired to a
//! microcontroller-class GPIO block, exposed to consumers as a byte-oriented
//! device with edge-triggered, signal-based asynchronous wakeup.
//!
//! ## Architecture
//!
//! The crate is organized around one shared hardware resource and the three
//! execution contexts that touch it:
//!
//! - [`RegisterWindow`]: an exclusively reserved, mapped view of the port's
//!   control/data/interrupt registers ([`RegisterBus`] for ordered access,
//!   [`BusMapper`] as the seam a simulated backend plugs into)
//! - [`ButtonIsr`]: the interrupt service routine — acknowledges the hardware
//!   and fans a wakeup signal out to subscribers, nothing more
//! - [`SubscriberTable`]: registrations shared between normal context
//!   (subscribe/unsubscribe) and interrupt context (broadcast)
//! - [`FileOps`] / [`DeviceNode`] / [`FileDescription`]: the file-facing
//!   contract a consumer process drives
//! - [`Driver`]: lifecycle manager — brings everything up exactly once at
//!   load and tears it down in reverse at unload
//!
//! ## Data flow
//!
//! ```text
//! electrical edge
//!   └─> vector 17/18 ──> ButtonIsr: clear flags, broadcast
//!          └─> SignalSink: input-ready signal to each subscriber's owner
//!                 └─> owner's handler calls read() ──> live DIN low byte
//! ```
//!
//! A read never reflects *how many* edges occurred, only the instantaneous
//! line levels at call time; the interrupt exists to wake a consumer, not to
//! deliver a value.
//!
//! ## Host services
//!
//! Everything the driver needs from its host — identity numbers, range
//! reservation, register mapping, vector attachment, signal delivery — is
//! injected through [`Platform`]. Tests substitute simulated implementations
//! and drive the whole driver without hardware.

extern crate alloc;
#[macro_use]
extern crate log;

mod device;
mod error;
mod fops;
mod gpio;
mod irq;
mod lifecycle;
pub mod regs;
mod subscribers;
mod window;

pub use device::{ButtonDevice, DeviceStats};
pub use error::{DriverError, DriverResult};
pub use fops::{DeviceNode, FileDescription, FileFlags, FileOps};
pub use irq::{ButtonIsr, InterruptHost, IrqHandler, IrqRegistration, IrqStatus};
pub use lifecycle::{
    DEVICE_NAME, DeviceIdentity, Driver, DriverState, IdentityAllocator, Platform,
};
pub use subscribers::{MAX_SUBSCRIBERS, ProcessId, SignalSink, SubscribeMode, SubscriberTable};
pub use window::{BusMapper, MmioBus, RegisterBus, RegisterWindow, Reservation, ReservationTable};
