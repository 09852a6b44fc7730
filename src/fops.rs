//! The file-facing contract.
//!
//! [`FileOps`] is the capability surface the host's file-dispatch layer
//! drives; one concrete device implements it. [`DeviceNode`] is the
//! published endpoint consumers open, and [`FileDescription`] is one open
//! description with the owner/flags state behind the asynchronous
//! subscription protocol:
//!
//! 1. [`FileDescription::set_owner`] — bind the description to the process
//!    signals are posted to;
//! 2. [`FileDescription::flags`] — fetch the current status flags;
//! 3. [`FileDescription::set_flags`] with [`FileFlags::ASYNC_NOTIFY`] or'd
//!    in — the flag toggle is forwarded to [`FileOps::subscribe`].
//!
//! Only after all three steps does an edge reach the consumer. Releasing the
//! description withdraws its registration, so no signal is delivered after
//! close.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use crate::error::DriverResult;
use crate::subscribers::{ProcessId, SubscribeMode};

bitflags! {
    /// Per-description status flags manipulated through the host's flag
    /// calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u32 {
        /// Edges post an input-ready signal to the description's owner.
        const ASYNC_NOTIFY = 1 << 0;
    }
}

/// The capability surface of the device: open, release, read, write,
/// subscribe.
///
/// All calls run in normal process context and return synchronously; none
/// of them blocks waiting for an edge.
pub trait FileOps: Send + Sync {
    /// A consumer opened the device.
    fn open(&self, fd: &FileDescription) -> DriverResult;
    /// The description is going away; any registration it holds must be
    /// withdrawn before this returns.
    fn release(&self, fd: &FileDescription) -> DriverResult;
    /// Sample the live input levels into `buf`.
    fn read(&self, fd: &FileDescription, buf: &mut [u8]) -> DriverResult<usize>;
    /// Accept and discard; the device is input-only.
    fn write(&self, fd: &FileDescription, buf: &[u8]) -> DriverResult<usize>;
    /// The asynchronous-registration hook.
    fn subscribe(&self, fd: &FileDescription, mode: SubscribeMode) -> DriverResult;
}

struct FdState {
    owner: Option<ProcessId>,
    flags: FileFlags,
}

/// One open file description.
pub struct FileDescription {
    id: u64,
    ops: Arc<dyn FileOps>,
    state: Mutex<FdState>,
    released: AtomicBool,
}

impl FileDescription {
    fn new(id: u64, ops: Arc<dyn FileOps>) -> Self {
        Self {
            id,
            ops,
            state: Mutex::new(FdState {
                owner: None,
                flags: FileFlags::empty(),
            }),
            released: AtomicBool::new(false),
        }
    }

    /// Identifier unique among descriptions of the same node.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The process currently bound as signal owner, if any.
    pub fn owner(&self) -> Option<ProcessId> {
        self.state.lock().owner
    }

    /// Binds the description to the process wakeup signals go to.
    pub fn set_owner(&self, owner: ProcessId) {
        self.state.lock().owner = Some(owner);
    }

    /// Current status flags.
    pub fn flags(&self) -> FileFlags {
        self.state.lock().flags
    }

    /// Replaces the status flags.
    ///
    /// Toggling [`FileFlags::ASYNC_NOTIFY`] forwards an add or remove to the
    /// device's subscription hook; other flag changes are recorded without
    /// side effects.
    pub fn set_flags(&self, flags: FileFlags) -> DriverResult {
        let forward = {
            let mut state = self.state.lock();
            let was = state.flags.contains(FileFlags::ASYNC_NOTIFY);
            let now = flags.contains(FileFlags::ASYNC_NOTIFY);
            state.flags = flags;
            match (was, now) {
                (false, true) => Some(SubscribeMode::Add),
                (true, false) => Some(SubscribeMode::Remove),
                _ => None,
            }
        };
        if let Some(mode) = forward {
            self.ops.subscribe(self, mode)?;
        }
        Ok(())
    }

    /// Samples the live input levels; see [`FileOps::read`].
    pub fn read(&self, buf: &mut [u8]) -> DriverResult<usize> {
        self.ops.read(self, buf)
    }

    /// Input-only device; see [`FileOps::write`].
    pub fn write(&self, buf: &[u8]) -> DriverResult<usize> {
        self.ops.write(self, buf)
    }

    /// Closes the description and withdraws its registration.
    ///
    /// Idempotent; also runs on drop.
    pub fn release(&self) -> DriverResult {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.ops.release(self)
    }
}

impl Drop for FileDescription {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl core::fmt::Debug for FileDescription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileDescription")
            .field("id", &self.id)
            .field("owner", &state.owner)
            .field("flags", &state.flags)
            .finish()
    }
}

/// The published device endpoint.
pub struct DeviceNode {
    name: &'static str,
    ops: Arc<dyn FileOps>,
    next_fd: AtomicU64,
}

impl DeviceNode {
    pub(crate) fn publish(name: &'static str, ops: Arc<dyn FileOps>) -> Self {
        debug!("{name}: device node published");
        Self {
            name,
            ops,
            next_fd: AtomicU64::new(1),
        }
    }

    /// The stable device name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Opens a fresh description.
    ///
    /// Always succeeds while the driver is loaded; the device allocates
    /// nothing per open beyond the description itself.
    pub fn open(&self) -> DriverResult<FileDescription> {
        let fd = FileDescription::new(
            self.next_fd.fetch_add(1, Ordering::Relaxed),
            Arc::clone(&self.ops),
        );
        self.ops.open(&fd)?;
        Ok(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct CallLog {
        opens: u64,
        releases: u64,
        subscribes: Vec<(u64, SubscribeMode)>,
    }

    #[derive(Default)]
    struct MockOps {
        log: Mutex<CallLog>,
    }

    impl FileOps for MockOps {
        fn open(&self, _fd: &FileDescription) -> DriverResult {
            self.log.lock().opens += 1;
            Ok(())
        }

        fn release(&self, fd: &FileDescription) -> DriverResult {
            self.log.lock().releases += 1;
            self.subscribe(fd, SubscribeMode::Remove)
        }

        fn read(&self, _fd: &FileDescription, buf: &mut [u8]) -> DriverResult<usize> {
            buf[0] = 0xEE;
            Ok(1)
        }

        fn write(&self, _fd: &FileDescription, _buf: &[u8]) -> DriverResult<usize> {
            Ok(0)
        }

        fn subscribe(&self, fd: &FileDescription, mode: SubscribeMode) -> DriverResult {
            self.log.lock().subscribes.push((fd.id(), mode));
            Ok(())
        }
    }

    fn node_with_mock() -> (DeviceNode, Arc<MockOps>) {
        let ops = Arc::new(MockOps::default());
        (DeviceNode::publish("mock", ops.clone()), ops)
    }

    #[test]
    fn test_open_assigns_distinct_ids() {
        let (node, ops) = node_with_mock();
        let a = node.open().unwrap();
        let b = node.open().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(ops.log.lock().opens, 2);
        assert_eq!(node.name(), "mock");
    }

    #[test]
    fn test_async_toggle_forwards_once() {
        let (node, ops) = node_with_mock();
        let fd = node.open().unwrap();
        fd.set_owner(ProcessId(31));

        fd.set_flags(FileFlags::ASYNC_NOTIFY).unwrap();
        // Re-asserting the same flags is not a toggle.
        fd.set_flags(FileFlags::ASYNC_NOTIFY).unwrap();
        fd.set_flags(FileFlags::empty()).unwrap();

        assert_eq!(
            ops.log.lock().subscribes,
            [(fd.id(), SubscribeMode::Add), (fd.id(), SubscribeMode::Remove)]
        );
    }

    #[test]
    fn test_release_is_idempotent_and_runs_on_drop() {
        let (node, ops) = node_with_mock();
        {
            let fd = node.open().unwrap();
            fd.release().unwrap();
            fd.release().unwrap();
            // Drop must not release a second time.
        }
        let log = ops.log.lock();
        assert_eq!(log.releases, 1);
        assert_eq!(log.subscribes.len(), 1);
    }

    #[test]
    fn test_owner_and_flags_roundtrip() {
        let (node, _ops) = node_with_mock();
        let fd = node.open().unwrap();
        assert_eq!(fd.owner(), None);
        assert_eq!(fd.flags(), FileFlags::empty());

        fd.set_owner(ProcessId(9));
        assert_eq!(fd.owner(), Some(ProcessId(9)));

        let flags = fd.flags() | FileFlags::ASYNC_NOTIFY;
        fd.set_flags(flags).unwrap();
        assert!(fd.flags().contains(FileFlags::ASYNC_NOTIFY));
    }
}
