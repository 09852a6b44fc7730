//! One-shot hardware setup for the button lines.
//!
//! Runs after the register window is mapped and before the device node is
//! published, so nothing else can observe a half-configured port. Nothing
//! here is revisited at runtime.

use alloc::sync::Arc;

use crate::error::DriverResult;
use crate::irq::{ButtonIsr, InterruptHost, IrqHandler, IrqRegistration};
use crate::regs;
use crate::window::RegisterBus;

/// Programs the port for button input and attaches the service routine.
///
/// Register intents, in order: input-with-filter mode, pull-ups (the buttons
/// pull their line to ground), handler attach on both vectors, interrupt
/// routing to this port, falling-edge select, interrupt enable. Edges cannot
/// be generated until the final enable, so the handler is in place first.
///
/// # Errors
///
/// [`DriverError::InterruptRegistration`](crate::DriverError::InterruptRegistration)
/// if either vector cannot be claimed; the port is left with interrupt
/// generation disabled.
pub(crate) fn configure(
    bus: &dyn RegisterBus,
    host: &Arc<dyn InterruptHost>,
    isr: Arc<ButtonIsr>,
) -> DriverResult<IrqRegistration> {
    bus.store(regs::MODEL, regs::MODE_INPUT_FILTER);
    bus.store(regs::DOUT, regs::PULLUP_ALL);

    let handler: Arc<dyn IrqHandler> = isr;
    let registration = IrqRegistration::attach_pair(host, regs::VECTORS, handler)?;

    bus.store(regs::EXTIPSELL, regs::EXTI_PORT_C);
    bus.store(regs::EXTIFALL, regs::FALLING_EDGE_ALL);
    bus.store(regs::IEN, regs::IRQ_ENABLE_ALL);

    debug!("port configured: {} lines, falling edge", regs::BUTTON_LINES);
    Ok(registration)
}
