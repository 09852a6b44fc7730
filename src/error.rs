//! Driver error taxonomy.
//!
//! Load-time failures ([`DriverError::IdentityAllocation`],
//! [`DriverError::AddressConflict`], [`DriverError::MapFailure`],
//! [`DriverError::InterruptRegistration`]) are fatal to
//! [`Driver::load`](crate::Driver::load) and leave no partial state behind.
//! Per-call failures ([`DriverError::CopyFault`],
//! [`DriverError::Subscription`]) are returned to the calling consumer
//! synchronously; nothing is retried internally.
//!
//! A [`From`] conversion into [`axerrno::AxError`] collapses the taxonomy to
//! errno-style codes for file-dispatch layers that speak `AxResult`.

use axerrno::AxError;
use memory_addr::PhysAddrRange;

/// Result alias used throughout the crate.
pub type DriverResult<T = ()> = Result<T, DriverError>;

/// Everything that can go wrong between load and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// No device identity is available from the host pool.
    IdentityAllocation,
    /// The register range overlaps an existing reservation.
    AddressConflict(PhysAddrRange),
    /// The reserved range could not be mapped for register access.
    MapFailure,
    /// The host refused to attach the handler to this vector.
    InterruptRegistration(u32),
    /// The destination buffer cannot take even a single byte.
    CopyFault,
    /// Subscription request rejected: unknown mode encoding, or the
    /// registration table is full.
    Subscription,
}

impl core::fmt::Display for DriverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DriverError::IdentityAllocation => write!(f, "no device identity available"),
            DriverError::AddressConflict(range) => {
                write!(f, "register range {:?} already reserved", range)
            }
            DriverError::MapFailure => write!(f, "register window mapping failed"),
            DriverError::InterruptRegistration(vector) => {
                write!(f, "failed to attach handler to interrupt vector {vector}")
            }
            DriverError::CopyFault => write!(f, "destination buffer is not writable"),
            DriverError::Subscription => write!(f, "subscription request rejected"),
        }
    }
}

impl core::error::Error for DriverError {}

impl From<DriverError> for AxError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::IdentityAllocation => AxError::NoMemory,
            DriverError::AddressConflict(_) => AxError::ResourceBusy,
            DriverError::MapFailure => AxError::NoMemory,
            DriverError::InterruptRegistration(_) => AxError::ResourceBusy,
            DriverError::CopyFault => AxError::BadAddress,
            DriverError::Subscription => AxError::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_addr::PhysAddr;

    #[test]
    fn test_errno_mapping() {
        let range = PhysAddrRange::from_start_size(PhysAddr::from(0x1000), 0x100);
        assert_eq!(AxError::from(DriverError::AddressConflict(range)), AxError::ResourceBusy);
        assert_eq!(AxError::from(DriverError::CopyFault), AxError::BadAddress);
        assert_eq!(AxError::from(DriverError::Subscription), AxError::InvalidInput);
        assert_eq!(AxError::from(DriverError::IdentityAllocation), AxError::NoMemory);
    }
}
