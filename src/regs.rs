//! Register layout of the button port.
//!
//! The buttons sit on port C of an EFM32GG-style GPIO block. The driver maps
//! a single window starting at the port's configuration registers and
//! running through the block-wide interrupt registers, so every offset below
//! is relative to [`PORT_BASE`].
//!
//! ```text
//! offset   register    role
//! 0x004    MODEL       pin mode, pins 0-7 (one nibble per pin)
//! 0x00C    DOUT        pull-up enable while a pin is in input mode
//! 0x01C    DIN         live input levels, one bit per line
//! 0x0B8    EXTIPSELL   external-interrupt port routing, lines 0-7
//! 0x0C4    EXTIFALL    falling-edge sensitivity select
//! 0x0C8    IEN         interrupt enable, one bit per line
//! 0x0CC    IF          latched interrupt flags
//! 0x0D4    IFC         write-1-to-clear for IF
//! ```
//!
//! Bit semantics on the data path are a hardware convention: the lines are
//! pulled up and a button shorts its line to ground, so a pressed button
//! reads 0 in `DIN`.

/// Physical base of the mapped window: GPIO block base `0x4000_6000` plus
/// the port C stride.
pub const PORT_BASE: usize = 0x4000_6048;

/// Pin mode register (low pins).
pub const MODEL: usize = 0x004;
/// Data out; doubles as pull-up enable for input-mode pins.
pub const DOUT: usize = 0x00C;
/// Data in: the instantaneous line levels.
pub const DIN: usize = 0x01C;
/// External interrupt port select, lines 0-7.
pub const EXTIPSELL: usize = 0x0B8;
/// Falling-edge sensitivity, one bit per line.
pub const EXTIFALL: usize = 0x0C4;
/// Interrupt enable, one bit per line.
pub const IEN: usize = 0x0C8;
/// Latched interrupt flags.
pub const IF: usize = 0x0CC;
/// Interrupt flag clear (write 1 to clear).
pub const IFC: usize = 0x0D4;

/// Window length: the span from the first configuration register through
/// the flag-clear register, inclusive.
pub const WINDOW_LEN: usize = IFC + 4;

/// Number of button lines on the port.
pub const BUTTON_LINES: u32 = 8;

/// Mode nibble `0x3` (input with glitch filter) replicated across pins 0-7.
pub const MODE_INPUT_FILTER: u32 = 0x3333_3333;
/// Pull-ups on all eight lines.
pub const PULLUP_ALL: u32 = 0xFF;
/// Route external interrupt lines 0-7 to port C (port index 2 per nibble).
pub const EXTI_PORT_C: u32 = 0x2222_2222;
/// Falling edge on all eight lines.
pub const FALLING_EDGE_ALL: u32 = 0xFF;
/// Interrupt generation enabled on all eight lines.
pub const IRQ_ENABLE_ALL: u32 = 0xFF;
/// Clear-all mask for the flag-clear register.
pub const IF_CLEAR_ALL: u32 = 0xFFFF;

/// Vector servicing the even-numbered lines.
pub const IRQ_EVEN: u32 = 17;
/// Vector servicing the odd-numbered lines.
pub const IRQ_ODD: u32 = 18;
/// Both vectors, in attach order.
pub const VECTORS: [u32; 2] = [IRQ_EVEN, IRQ_ODD];
