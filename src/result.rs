use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Raw errno value as reported by a failed system call.
pub type Errno = linux_io::result::Error;

pub(crate) const ENOTTY: Errno = linux_io::result::ENOTTY;
pub(crate) const EINVAL: Errno = linux_io::result::EINVAL;
pub(crate) const ENOENT: Errno = linux_io::result::ENOENT;
pub(crate) const EPERM: Errno = linux_io::result::EPERM;
pub(crate) const EACCES: Errno = linux_io::result::EACCES;
pub(crate) const EOPNOTSUPP: Errno = linux_io::result::EOPNOTSUPP;
pub(crate) const EBUSY: Errno = linux_io::result::Error(16);
pub(crate) const EFAULT: Errno = linux_io::result::Error(14);

pub type Result<T> = core::result::Result<T, Error>;

/// The kind of mode-setting object a lookup was made for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Connector,
    Encoder,
    Crtc,
    Plane,
    Framebuffer,
    Property,
    Blob,
    Lessee,
}

#[derive(Debug, Error)]
pub enum Error {
    /// An ioctl or other system call failed in a way that has no more
    /// specific meaning.
    #[error("{op}: {}", std::io::Error::from_raw_os_error(errno_raw(*errno)))]
    Io { op: &'static str, errno: Errno },

    /// The file opened but does not understand the DRM version request.
    #[error("not a DRM graphics device")]
    NotAGraphicsDevice,

    #[error("driver is {found:?}, expected {expected:?}")]
    DriverMismatch { expected: String, found: String },

    #[error("client capability {cap:?} is not supported: {}", std::io::Error::from_raw_os_error(errno_raw(*errno)))]
    CapabilityUnsupported { cap: crate::ClientCap, errno: Errno },

    /// The object graph changed between the sizing and the filling phase
    /// of a query, typically because of a hotplug. Retrying the whole query
    /// is expected to succeed.
    #[error("{query}: object count changed from {expected} to {found} during query")]
    ResourceGraphRace {
        query: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{kind:?} {id} not found")]
    ObjectNotFound { kind: ObjectKind, id: u32 },

    #[error("no writeback connector found")]
    NoWritebackConnector,

    #[error("unable to determine the active CRTC")]
    NoActiveCrtc,

    /// Another client, usually the running compositor, is DRM master.
    #[error("another client holds DRM master: {}", std::io::Error::from_raw_os_error(errno_raw(*errno)))]
    MasterConflict { errno: Errno },

    #[error("no matching devices found in {}", dir.display())]
    NoDevice { dir: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),
}

#[inline(always)]
fn errno_raw(e: Errno) -> i32 {
    e.0 as i32
}

impl Error {
    #[inline]
    pub(crate) fn io(op: &'static str) -> impl FnOnce(Errno) -> Self {
        move |errno| Self::Io { op, errno }
    }

    /// Map a failed detail query, treating `ENOENT` as a missing object.
    #[inline]
    pub(crate) fn lookup(op: &'static str, kind: ObjectKind, id: u32) -> impl FnOnce(Errno) -> Self {
        move |errno| match errno {
            ENOENT => Self::ObjectNotFound { kind, id },
            _ => Self::Io { op, errno },
        }
    }

    pub(crate) fn race(query: &'static str, expected: usize, found: usize) -> Self {
        warn!(query, expected, found, "object count changed between query phases");
        Self::ResourceGraphRace {
            query,
            expected,
            found,
        }
    }

    /// The raw errno behind this error, if it came from a system call.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Io { errno, .. }
            | Self::CapabilityUnsupported { errno, .. }
            | Self::MasterConflict { errno } => Some(errno_raw(*errno)),
            _ => None,
        }
    }

    /// Only two-phase races are worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceGraphRace { .. })
    }

    /// Errors that mean "not the device we're looking for" while scanning
    /// a device directory.
    pub fn is_skippable_during_discovery(&self) -> bool {
        matches!(self, Self::NotAGraphicsDevice | Self::DriverMismatch { .. })
    }
}

/// Check the count reported by the filling phase of a two-phase query
/// against the count the sizing phase reported.
#[inline]
pub(crate) fn check_count(query: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::race(query, expected, found));
    }
    Ok(())
}

/// Run `f` up to `attempts` times, retrying only while it fails with
/// [`Error::ResourceGraphRace`].
pub fn retry_on_race<T>(attempts: usize, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut remaining = attempts.max(1);
    loop {
        remaining -= 1;
        match f() {
            Err(e) if e.is_retryable() && remaining > 0 => continue,
            other => return other,
        }
    }
}
