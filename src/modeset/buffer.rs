use serde::Serialize;
use tracing::{debug, info, warn};

use super::FramebufferId;
use crate::result::{Error, ObjectKind, Result};
use crate::{ioctl, Card, Device, DeviceCap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBufferRequest {
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
}

/// A kernel-allocated "dumb" buffer.
///
/// Dropping this value does not free the kernel object; pass it to
/// [`Card::destroy_dumb`] instead. The kernel releases anything left over
/// when the device is closed.
#[derive(Debug, PartialEq, Eq)]
pub struct DumbBuffer {
    pub(crate) handle: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bpp: u32,
    pub(crate) pitch: u32,
    pub(crate) size: u64,
}

impl DumbBuffer {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn bpp(&self) -> u32 {
        self.bpp
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A framebuffer object wrapping a [`DumbBuffer`].
///
/// The framebuffer owns its buffer until [`Card::remove_framebuffer`] hands
/// it back, so a buffer can't be destroyed while a framebuffer still
/// refers to it.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    depth: u32,
    buffer: DumbBuffer,
}

impl Framebuffer {
    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn buffer(&self) -> &DumbBuffer {
        &self.buffer
    }
}

/// What `GETFB` reports about an existing framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FramebufferInfo {
    pub id: FramebufferId,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    /// Zero unless the caller is DRM master or has `CAP_SYS_ADMIN`.
    pub handle: u32,
}

impl<D: Device> Card<D> {
    pub fn create_dumb(&self, req: DumbBufferRequest) -> Result<DumbBuffer> {
        let mut tmp = ioctl::DrmModeCreateDumb {
            height: req.height,
            width: req.width,
            bpp: req.bpp,
            ..ioctl::DrmModeCreateDumb::zeroed()
        };
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_CREATE_DUMB, &mut tmp) }
            .map_err(Error::io("create_dumb"))?;
        debug!(
            handle = tmp.handle,
            pitch = tmp.pitch,
            size = tmp.size,
            "dumb buffer created"
        );
        Ok(DumbBuffer {
            handle: tmp.handle,
            width: req.width,
            height: req.height,
            bpp: req.bpp,
            pitch: tmp.pitch,
            size: tmp.size,
        })
    }

    /// The offset to pass to `mmap` on this card's file descriptor to map
    /// the buffer's memory.
    pub fn map_dumb(&self, buffer: &DumbBuffer) -> Result<u64> {
        let mut tmp = ioctl::DrmModeMapDumb {
            handle: buffer.handle,
            ..ioctl::DrmModeMapDumb::zeroed()
        };
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_MAP_DUMB, &mut tmp) }
            .map_err(Error::io("map_dumb"))?;
        Ok(tmp.offset)
    }

    /// Free `buffer`. On failure it is handed back along with the error.
    pub fn destroy_dumb(
        &self,
        buffer: DumbBuffer,
    ) -> core::result::Result<(), (Error, DumbBuffer)> {
        let mut tmp = ioctl::DrmModeDestroyDumb {
            handle: buffer.handle,
        };
        // Safety: no pointers.
        if let Err(e) = unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_DESTROY_DUMB, &mut tmp) } {
            return Err((Error::io("destroy_dumb")(e), buffer));
        }
        debug!(handle = buffer.handle, "dumb buffer destroyed");
        Ok(())
    }

    /// Wrap `buffer` in a framebuffer object.
    ///
    /// If the kernel refuses, the buffer is returned along with the error so
    /// the caller can still destroy it.
    pub fn add_framebuffer(
        &self,
        buffer: DumbBuffer,
        depth: u32,
    ) -> core::result::Result<Framebuffer, (Error, DumbBuffer)> {
        let mut tmp = ioctl::DrmModeFbCmd {
            fb_id: 0,
            width: buffer.width,
            height: buffer.height,
            pitch: buffer.pitch,
            bpp: buffer.bpp,
            depth,
            handle: buffer.handle,
        };
        // Safety: no pointers.
        if let Err(e) = unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_ADDFB, &mut tmp) } {
            return Err((Error::io("addfb")(e), buffer));
        }
        debug!(fb_id = tmp.fb_id, handle = buffer.handle, "framebuffer added");
        Ok(Framebuffer {
            id: FramebufferId(tmp.fb_id),
            depth,
            buffer,
        })
    }

    /// Remove a framebuffer, handing back the buffer it wrapped.
    pub fn remove_framebuffer(
        &self,
        fb: Framebuffer,
    ) -> core::result::Result<DumbBuffer, (Error, Framebuffer)> {
        let mut id: linux_unsafe::uint = fb.id.0;
        // Safety: no pointers.
        if let Err(e) = unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_RMFB, &mut id) } {
            return Err((Error::lookup("rmfb", ObjectKind::Framebuffer, fb.id.0)(e), fb));
        }
        debug!(fb_id = fb.id.0, "framebuffer removed");
        Ok(fb.buffer)
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Result<FramebufferInfo> {
        let mut tmp = ioctl::DrmModeFbCmd::zeroed();
        tmp.fb_id = id.0;
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETFB, &mut tmp) }
            .map_err(Error::lookup("getfb", ObjectKind::Framebuffer, id.0))?;
        Ok(FramebufferInfo {
            id,
            width: tmp.width,
            height: tmp.height,
            pitch: tmp.pitch,
            bpp: tmp.bpp,
            depth: tmp.depth,
            handle: tmp.handle,
        })
    }
}

/// The buffer a writeback connector writes each captured frame into.
#[derive(Debug)]
pub struct WritebackTarget {
    fb: Framebuffer,
}

impl WritebackTarget {
    /// XRGB8888: 32 bits per pixel, 24 of them significant.
    pub const BPP: u32 = 32;
    pub const DEPTH: u32 = 24;

    pub fn allocate<D: Device>(card: &Card<D>, width: u32, height: u32) -> Result<Self> {
        if card.get_device_cap(DeviceCap::DumbBuffer)? == 0 {
            return Err(Error::Io {
                op: "create_dumb",
                errno: crate::result::EOPNOTSUPP,
            });
        }
        let buffer = card.create_dumb(DumbBufferRequest {
            width,
            height,
            bpp: Self::BPP,
        })?;
        let fb = match card.add_framebuffer(buffer, Self::DEPTH) {
            Ok(fb) => fb,
            Err((e, buffer)) => {
                // The addfb error is the one to report.
                if let Err((cleanup, _)) = card.destroy_dumb(buffer) {
                    warn!(error = %cleanup, "failed to destroy dumb buffer after addfb failure");
                }
                return Err(e);
            }
        };
        info!(fb_id = %fb.id(), width, height, "writeback target allocated");
        Ok(Self { fb })
    }

    pub fn framebuffer_id(&self) -> FramebufferId {
        self.fb.id()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    /// Remove the framebuffer and then destroy the buffer behind it.
    ///
    /// Whatever could not be torn down is handed back with the error, so
    /// the caller can try again.
    pub fn release<D: Device>(
        self,
        card: &Card<D>,
    ) -> core::result::Result<(), (Error, Leftover)> {
        let buffer = card
            .remove_framebuffer(self.fb)
            .map_err(|(e, fb)| (e, Leftover::Target(Self { fb })))?;
        card.destroy_dumb(buffer)
            .map_err(|(e, buffer)| (e, Leftover::Buffer(buffer)))
    }
}

/// The part of a [`WritebackTarget`] that survived a failed
/// [`WritebackTarget::release`].
#[derive(Debug)]
pub enum Leftover {
    /// The framebuffer could not be removed; the target is unchanged.
    Target(WritebackTarget),
    /// The framebuffer is gone but its buffer could not be destroyed.
    Buffer(DumbBuffer),
}

impl Leftover {
    /// Retry whatever teardown remains.
    pub fn release<D: Device>(
        self,
        card: &Card<D>,
    ) -> core::result::Result<(), (Error, Leftover)> {
        match self {
            Self::Target(target) => target.release(card),
            Self::Buffer(buffer) => card
                .destroy_dumb(buffer)
                .map_err(|(e, buffer)| (e, Self::Buffer(buffer))),
        }
    }
}
