//! Userspace client for the Linux DRM mode-setting ioctl protocol, aimed at
//! attaching a writeback connector to the active output of a VKMS device.
//!
//! The [`Card`] type wraps an open device and exposes the two-phase object
//! queries in [`modeset`]. [`writeback`] builds the capture topology on top
//! of that and [`vkms`] ties device discovery together.

use core::ffi::c_int as int;
use core::ops::{Deref, DerefMut};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

pub mod config;
pub mod dump;
/// Low-level `ioctl`-based access to DRM devices.
pub mod ioctl;
pub mod modeset;
pub mod result;
pub mod vkms;
pub mod writeback;

#[cfg(test)]
pub(crate) mod testing;

pub use result::{Error, Result};

use result::{Errno, EACCES, EBUSY, EFAULT, EINVAL, ENOTTY, EPERM};

/// An open DRM card device, as used by the real kernel interface.
pub type DrmFile = linux_io::File<ioctl::DrmCardDevice>;

/// Something that can carry DRM ioctl requests to the kernel.
///
/// [`DrmFile`] is the real implementation; other implementations exist so
/// that the mode-setting logic can be exercised without hardware.
pub trait Device {
    /// Issue `request` with `arg` as its payload.
    ///
    /// # Safety
    ///
    /// Any buffer pointers embedded in `arg` must be valid for the sizes
    /// recorded alongside them for the whole duration of the call.
    unsafe fn ioctl<T>(&self, request: ioctl::IoctlRequest<T>, arg: &mut T) -> core::result::Result<int, Errno>;

    /// Issue a request that has no payload.
    fn ioctl_no_arg(&self, request: ioctl::IoctlRequest<()>) -> core::result::Result<int, Errno>;

    fn close(self) -> core::result::Result<(), Errno>
    where
        Self: Sized;
}

impl Device for DrmFile {
    #[inline]
    unsafe fn ioctl<T>(&self, request: ioctl::IoctlRequest<T>, arg: &mut T) -> core::result::Result<int, Errno> {
        // Safety: request carries the size of T, and the caller vouches
        // for any pointers inside arg.
        let req: linux_io::fd::ioctl::IoctlReqWriteRead<ioctl::DrmCardDevice, T, int> =
            unsafe { linux_io::fd::ioctl::ioctl_writeread(request.code() as core::ffi::c_ulong) };
        linux_io::File::ioctl(self, req, arg)
    }

    #[inline]
    fn ioctl_no_arg(&self, request: ioctl::IoctlRequest<()>) -> core::result::Result<int, Errno> {
        // Safety: no-argument requests don't touch userspace memory.
        let req: linux_io::fd::ioctl::IoctlReqNoArgs<ioctl::DrmCardDevice, int> =
            unsafe { linux_io::fd::ioctl::ioctl_no_arg(request.code() as core::ffi::c_ulong) };
        linux_io::File::ioctl(self, req, ())
    }

    fn close(self) -> core::result::Result<(), Errno> {
        linux_io::File::close(self)
    }
}

/// Driver identification returned by [`Card::version`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch_level: i32,
    pub name: String,
    pub date: String,
    pub desc: String,
}

/// Opt-in client capabilities, see [`Card::set_client_cap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCap {
    Stereo3d,
    UniversalPlanes,
    Atomic,
    AspectRatio,
    WritebackConnectors,
    CursorPlaneHotspot,
}

impl From<ClientCap> for ioctl::DrmClientCap {
    fn from(value: ClientCap) -> Self {
        match value {
            ClientCap::Stereo3d => ioctl::DRM_CLIENT_CAP_STEREO_3D,
            ClientCap::UniversalPlanes => ioctl::DRM_CLIENT_CAP_UNIVERSAL_PLANES,
            ClientCap::Atomic => ioctl::DRM_CLIENT_CAP_ATOMIC,
            ClientCap::AspectRatio => ioctl::DRM_CLIENT_CAP_ASPECT_RATIO,
            ClientCap::WritebackConnectors => ioctl::DRM_CLIENT_CAP_WRITEBACK_CONNECTORS,
            ClientCap::CursorPlaneHotspot => ioctl::DRM_CLIENT_CAP_CURSOR_PLANE_HOTSPOT,
        }
    }
}

/// Device capabilities that can be read with [`Card::get_device_cap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCap {
    DumbBuffer,
    DumbPreferredDepth,
    DumbPreferShadow,
    Prime,
    CursorWidth,
    CursorHeight,
}

impl From<DeviceCap> for ioctl::DrmCap {
    fn from(value: DeviceCap) -> Self {
        match value {
            DeviceCap::DumbBuffer => ioctl::DRM_CAP_DUMB_BUFFER,
            DeviceCap::DumbPreferredDepth => ioctl::DRM_CAP_DUMB_PREFERRED_DEPTH,
            DeviceCap::DumbPreferShadow => ioctl::DRM_CAP_DUMB_PREFER_SHADOW,
            DeviceCap::Prime => ioctl::DRM_CAP_PRIME,
            DeviceCap::CursorWidth => ioctl::DRM_CAP_CURSOR_WIDTH,
            DeviceCap::CursorHeight => ioctl::DRM_CAP_CURSOR_HEIGHT,
        }
    }
}

/// The client capabilities a writeback client must enable, in order.
pub const WRITEBACK_CLIENT_CAPS: [ClientCap; 3] = [
    ClientCap::Atomic,
    ClientCap::UniversalPlanes,
    ClientCap::WritebackConnectors,
];

pub struct Card<D: Device = DrmFile> {
    dev: D,
}

impl Card<DrmFile> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::Io {
            op: "open",
            errno: EINVAL,
        })?;
        let f = linux_io::File::open(&cpath, linux_io::OpenOptions::read_write())
            .map_err(Error::io("open"))?;
        Self::from_file(f)
    }

    pub fn from_file<D>(f: linux_io::File<D>) -> Result<Self> {
        // Safety: We'll return this new f only if our ioctl
        // probe is successful, which therefore suggests that
        // this ought to be a DRM card device.
        let f: DrmFile = unsafe { f.to_device(ioctl::DrmCardDevice) };
        Self::from_device(f)
    }
}

impl<D: Device> Card<D> {
    /// Wrap `dev`, using the VERSION ioctl to decide whether it seems to be
    /// a DRM card device at all.
    pub fn from_device(dev: D) -> Result<Self> {
        let mut v = ioctl::DrmVersion::zeroed();
        // Safety: a zeroed version request carries no buffers.
        match unsafe { dev.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v) } {
            Ok(_) => Ok(Self { dev }),
            Err(ENOTTY | EINVAL | EFAULT) => {
                // Not a device that understands DRM requests. The handle
                // is dropped here; nothing else references it.
                let _ = dev.close();
                Err(Error::NotAGraphicsDevice)
            }
            Err(e) => {
                let _ = dev.close();
                Err(Error::Io {
                    op: "version",
                    errno: e,
                })
            }
        }
    }

    /// Wrap `dev` without probing it.
    pub fn from_device_unchecked(dev: D) -> Self {
        Self { dev }
    }

    /// Issue `request` against the underlying device.
    ///
    /// # Safety
    ///
    /// Same contract as [`Device::ioctl`].
    #[inline(always)]
    pub(crate) unsafe fn ioctl<T>(&self, request: ioctl::IoctlRequest<T>, arg: &mut T) -> core::result::Result<int, Errno> {
        unsafe { self.dev.ioctl(request, arg) }
    }

    /// Identify the driver using the two-phase VERSION query.
    pub fn version(&self) -> Result<Version> {
        let mut v = ioctl::DrmVersion::zeroed();
        // Safety: no buffers attached yet.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v) }.map_err(Error::io("version"))?;

        let (name_len, date_len, desc_len) = (v.name_len(), v.date_len(), v.desc_len());
        let mut name = vec![0_u8; name_len];
        let mut date = vec![0_u8; date_len];
        let mut desc = vec![0_u8; desc_len];

        if name_len + date_len + desc_len > 0 {
            let mut v = ioctl::DrmVersion::zeroed();
            // Safety: each buffer outlives the ioctl call below and is
            // exactly as long as the length recorded with it.
            unsafe {
                if name_len > 0 {
                    v.set_name_ptr(name.as_mut_ptr(), name_len);
                }
                if date_len > 0 {
                    v.set_date_ptr(date.as_mut_ptr(), date_len);
                }
                if desc_len > 0 {
                    v.set_desc_ptr(desc.as_mut_ptr(), desc_len);
                }
                self.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v)
            }
            .map_err(Error::io("version"))?;

            result::check_count("version name", name_len, v.name_len())?;
            result::check_count("version date", date_len, v.date_len())?;
            result::check_count("version desc", desc_len, v.desc_len())?;
        }

        Ok(Version {
            major: v.version_major,
            minor: v.version_minor,
            patch_level: v.version_patchlevel,
            name: c_bytes_to_string(&name),
            date: c_bytes_to_string(&date),
            desc: c_bytes_to_string(&desc),
        })
    }

    pub fn driver_name(&self) -> Result<String> {
        self.version().map(|v| v.name)
    }

    pub fn set_client_cap(&self, cap: ClientCap, value: u64) -> Result<()> {
        let mut s = ioctl::DrmSetClientCap {
            capability: cap.into(),
            value,
        };
        // Safety: no buffers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_SET_CLIENT_CAP, &mut s) }
            .map_err(|errno| Error::CapabilityUnsupported { cap, errno })?;
        debug!(?cap, value, "client capability set");
        Ok(())
    }

    pub fn get_device_cap(&self, cap: DeviceCap) -> Result<u64> {
        let mut s = ioctl::DrmGetCap {
            capability: cap.into(),
            value: 0,
        };
        // Safety: no buffers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_GET_CAP, &mut s) }.map_err(Error::io("get cap"))?;
        Ok(s.value)
    }

    /// Claim DRM master for this client.
    ///
    /// Fails with [`Error::MasterConflict`] when another client, typically a
    /// running compositor, already holds it.
    pub fn become_master(&mut self) -> Result<()> {
        self.dev
            .ioctl_no_arg(ioctl::DRM_IOCTL_SET_MASTER)
            .map_err(master_err("set master"))?;
        Ok(())
    }

    pub fn drop_master(&mut self) -> Result<()> {
        self.dev
            .ioctl_no_arg(ioctl::DRM_IOCTL_DROP_MASTER)
            .map_err(master_err("drop master"))?;
        Ok(())
    }

    /// Consuming form of [`Self::become_master`]; on failure the card is
    /// handed back alongside the error.
    pub fn into_master(mut self) -> core::result::Result<CardMaster<D>, (Error, Self)> {
        if let Err(e) = self.become_master() {
            return Err((e, self));
        }
        Ok(CardMaster { card: self })
    }

    pub fn close(self) -> Result<()> {
        self.dev.close().map_err(Error::io("close"))
    }

    pub fn take_device(self) -> D {
        self.dev
    }

    pub fn borrow_device(&self) -> &D {
        &self.dev
    }

    pub fn borrow_device_mut(&mut self) -> &mut D {
        &mut self.dev
    }
}

fn master_err(op: &'static str) -> impl FnOnce(Errno) -> Error {
    move |errno| match errno {
        EBUSY | EACCES | EPERM => Error::MasterConflict { errno },
        _ => Error::Io { op, errno },
    }
}

/// A [`Card`] that is known to hold DRM master.
pub struct CardMaster<D: Device = DrmFile> {
    card: Card<D>,
}

impl<D: Device> CardMaster<D> {
    pub fn drop_master(mut self) -> core::result::Result<Card<D>, (Error, Self)> {
        if let Err(e) = self.card.drop_master() {
            return Err((e, self));
        }
        Ok(self.card)
    }

    pub fn close(self) -> Result<()> {
        self.card.close()
    }
}

impl<D: Device> Deref for CardMaster<D> {
    type Target = Card<D>;

    fn deref(&self) -> &Self::Target {
        &self.card
    }
}

impl<D: Device> DerefMut for CardMaster<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.card
    }
}

impl<D> TryFrom<linux_io::File<D>> for Card {
    type Error = Error;

    #[inline(always)]
    fn try_from(value: linux_io::File<D>) -> Result<Self> {
        Card::from_file(value)
    }
}

/// Decode a fixed-size, NUL-padded C string field.
pub(crate) fn c_bytes_to_string(raw: &[u8]) -> String {
    let raw = raw.split(|c| *c == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).into_owned()
}
