use std::os::fd::{FromRawFd, OwnedFd};

use tracing::info;

use super::{LesseeId, ObjectId};
use crate::result::{check_count, Error, ObjectKind, Result};
use crate::{ioctl, Card, Device};

/// A newly-created lease.
///
/// `fd` is a new DRM file descriptor that can only see the leased objects;
/// hand it to the lessee. Closing it does not revoke the lease.
#[derive(Debug)]
pub struct Lease {
    pub lessee_id: LesseeId,
    pub fd: OwnedFd,
}

impl<D: Device> Card<D> {
    /// Lease `objects` (typically a connector, a CRTC and a plane) to a new
    /// lessee. Requires DRM master.
    pub fn create_lease(&self, objects: &[ObjectId], flags: u32) -> Result<Lease> {
        let ids: Vec<u32> = objects
            .iter()
            .map(|o| o.as_raw_type_and_id().1)
            .collect();
        let mut tmp = ioctl::DrmModeCreateLease::zeroed();
        tmp.flags = flags;
        // Safety: ids outlives the call and matches the count.
        unsafe {
            tmp.set_object_ids_ptr(ids.as_ptr(), ids.len() as u32);
            self.ioctl(ioctl::DRM_IOCTL_MODE_CREATE_LEASE, &mut tmp)
        }
        .map_err(Error::io("create_lease"))?;

        // Safety: on success the kernel installed a new descriptor that
        // nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(tmp.fd as i32) };
        info!(lessee = tmp.lessee_id, objects = ids.len(), "lease created");
        Ok(Lease {
            lessee_id: LesseeId(tmp.lessee_id),
            fd,
        })
    }

    /// The lessees of this card's DRM master.
    pub fn list_lessees(&self) -> Result<Vec<LesseeId>> {
        let mut sizes = ioctl::DrmModeListLessees::zeroed();
        // Safety: no buffer attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_LIST_LESSEES, &mut sizes) }
            .map_err(Error::io("list_lessees"))?;

        let count = sizes.count_lessees();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = vec![0_u32; count as usize];
        let mut fill = ioctl::DrmModeListLessees::zeroed();
        // Safety: ids outlives the call and matches the count.
        unsafe {
            fill.set_lessees_ptr(ids.as_mut_ptr(), count);
            self.ioctl(ioctl::DRM_IOCTL_MODE_LIST_LESSEES, &mut fill)
        }
        .map_err(Error::io("list_lessees"))?;
        check_count("lessees", count as usize, fill.count_lessees() as usize)?;
        Ok(ids.into_iter().map(LesseeId).collect())
    }

    /// The raw IDs of the objects leased to this file descriptor. On a
    /// lessor this is every object it can see.
    pub fn get_lease(&self) -> Result<Vec<u32>> {
        let mut sizes = ioctl::DrmModeGetLease::zeroed();
        // Safety: no buffer attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GET_LEASE, &mut sizes) }
            .map_err(Error::io("get_lease"))?;

        let count = sizes.count_objects();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = vec![0_u32; count as usize];
        let mut fill = ioctl::DrmModeGetLease::zeroed();
        // Safety: ids outlives the call and matches the count.
        unsafe {
            fill.set_objects_ptr(ids.as_mut_ptr(), count);
            self.ioctl(ioctl::DRM_IOCTL_MODE_GET_LEASE, &mut fill)
        }
        .map_err(Error::io("get_lease"))?;
        check_count("leased objects", count as usize, fill.count_objects() as usize)?;
        Ok(ids)
    }

    pub fn revoke_lease(&self, lessee: LesseeId) -> Result<()> {
        let mut tmp = ioctl::DrmModeRevokeLease {
            lessee_id: lessee.0,
        };
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_REVOKE_LEASE, &mut tmp) }
            .map_err(Error::lookup("revoke_lease", ObjectKind::Lessee, lessee.0))?;
        info!(%lessee, "lease revoked");
        Ok(())
    }
}
