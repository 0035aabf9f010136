//! An in-memory stand-in for the kernel side of the DRM ioctl interface.
//!
//! Requests are routed by decoding their request code, so the typed request
//! table in [`crate::ioctl`] is exercised the same way it is against a real
//! device. Variable-length results follow the kernel's convention: counts
//! always come back as the real length and items are only copied when the
//! caller's buffer is large enough.

use core::cell::RefCell;
use core::ffi::c_int as int;
use std::collections::{BTreeMap, HashMap};
use std::os::fd::IntoRawFd;

use crate::ioctl::{self, IoctlRequest};
use crate::result::{Errno, EBUSY, EINVAL, ENOENT, ENOTTY, EOPNOTSUPP};
use crate::{Card, ClientCap, Device};

pub(crate) const CRTC_MAIN: u32 = 55;
pub(crate) const PLANE_PRIMARY: u32 = 60;
pub(crate) const FB_SCANOUT: u32 = 70;
pub(crate) const CONN_HDMI: u32 = 31;
pub(crate) const CONN_DP: u32 = 32;
pub(crate) const CONN_WRITEBACK: u32 = 33;
pub(crate) const ENC_HDMI: u32 = 41;
pub(crate) const ENC_DP: u32 = 42;
pub(crate) const ENC_WRITEBACK: u32 = 43;

pub(crate) const PROP_EDID: u32 = 10;
pub(crate) const PROP_CRTC_ID: u32 = 11;
pub(crate) const PROP_DPMS: u32 = 12;
pub(crate) const PROP_WB_FB_ID: u32 = 13;
pub(crate) const PROP_WB_FORMATS: u32 = 14;
pub(crate) const PROP_ACTIVE: u32 = 15;
pub(crate) const PROP_MODE_ID: u32 = 16;
pub(crate) const PROP_PLANE_TYPE: u32 = 17;

pub(crate) const BLOB_WB_FORMATS: u32 = 90;
pub(crate) const BLOB_MODE: u32 = 91;

pub(crate) const PLANE_FORMATS: [u32; 2] = [fourcc(b"XR24"), fourcc(b"AR24")];

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

pub(crate) fn nr<T>(req: IoctlRequest<T>) -> u8 {
    req.parts().nr
}

const NR_VERSION: u8 = ioctl::DRM_IOCTL_VERSION.parts().nr;
const NR_GET_CAP: u8 = ioctl::DRM_IOCTL_GET_CAP.parts().nr;
const NR_SET_CLIENT_CAP: u8 = ioctl::DRM_IOCTL_SET_CLIENT_CAP.parts().nr;
const NR_SET_MASTER: u8 = ioctl::DRM_IOCTL_SET_MASTER.parts().nr;
const NR_DROP_MASTER: u8 = ioctl::DRM_IOCTL_DROP_MASTER.parts().nr;
const NR_GETRESOURCES: u8 = ioctl::DRM_IOCTL_MODE_GETRESOURCES.parts().nr;
const NR_GETCRTC: u8 = ioctl::DRM_IOCTL_MODE_GETCRTC.parts().nr;
const NR_SETCRTC: u8 = ioctl::DRM_IOCTL_MODE_SETCRTC.parts().nr;
const NR_GETENCODER: u8 = ioctl::DRM_IOCTL_MODE_GETENCODER.parts().nr;
const NR_GETCONNECTOR: u8 = ioctl::DRM_IOCTL_MODE_GETCONNECTOR.parts().nr;
const NR_GETPROPERTY: u8 = ioctl::DRM_IOCTL_MODE_GETPROPERTY.parts().nr;
const NR_SETPROPERTY: u8 = ioctl::DRM_IOCTL_MODE_SETPROPERTY.parts().nr;
const NR_GETPROPBLOB: u8 = ioctl::DRM_IOCTL_MODE_GETPROPBLOB.parts().nr;
const NR_GETFB: u8 = ioctl::DRM_IOCTL_MODE_GETFB.parts().nr;
const NR_ADDFB: u8 = ioctl::DRM_IOCTL_MODE_ADDFB.parts().nr;
const NR_RMFB: u8 = ioctl::DRM_IOCTL_MODE_RMFB.parts().nr;
const NR_CREATE_DUMB: u8 = ioctl::DRM_IOCTL_MODE_CREATE_DUMB.parts().nr;
const NR_MAP_DUMB: u8 = ioctl::DRM_IOCTL_MODE_MAP_DUMB.parts().nr;
const NR_DESTROY_DUMB: u8 = ioctl::DRM_IOCTL_MODE_DESTROY_DUMB.parts().nr;
const NR_GETPLANERESOURCES: u8 = ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES.parts().nr;
const NR_GETPLANE: u8 = ioctl::DRM_IOCTL_MODE_GETPLANE.parts().nr;
const NR_OBJ_GETPROPERTIES: u8 = ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES.parts().nr;
const NR_OBJ_SETPROPERTY: u8 = ioctl::DRM_IOCTL_MODE_OBJ_SETPROPERTY.parts().nr;
const NR_CREATE_LEASE: u8 = ioctl::DRM_IOCTL_MODE_CREATE_LEASE.parts().nr;
const NR_LIST_LESSEES: u8 = ioctl::DRM_IOCTL_MODE_LIST_LESSEES.parts().nr;
const NR_GET_LEASE: u8 = ioctl::DRM_IOCTL_MODE_GET_LEASE.parts().nr;
const NR_REVOKE_LEASE: u8 = ioctl::DRM_IOCTL_MODE_REVOKE_LEASE.parts().nr;

type KResult = core::result::Result<int, Errno>;

struct FakeConnector {
    id: u32,
    typ: u32,
    type_id: u32,
    connection: u32,
    encoder_id: u32,
    encoders: Vec<u32>,
    modes: Vec<ioctl::DrmModeInfo>,
}

struct FakeEncoder {
    id: u32,
    typ: u32,
    crtc_id: u32,
}

struct FakeCrtc {
    id: u32,
    fb_id: u32,
    mode: Option<ioctl::DrmModeInfo>,
}

struct FakePlane {
    id: u32,
    crtc_id: u32,
    fb_id: u32,
    formats: Vec<u32>,
}

struct FakeProperty {
    id: u32,
    name: &'static str,
    flags: u32,
    values: Vec<u64>,
    enums: Vec<(u64, &'static str)>,
}

#[derive(Clone, Copy)]
struct FakeDumb {
    pitch: u32,
}

#[derive(Clone, Copy)]
struct FakeFb {
    width: u32,
    height: u32,
    pitch: u32,
    bpp: u32,
    depth: u32,
    handle: u32,
}

/// One SETCRTC request as the kernel saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetCrtcCall {
    pub crtc_id: u32,
    pub fb_id: u32,
    pub connectors: Vec<u32>,
    pub mode_valid: bool,
}

#[derive(Default)]
struct State {
    driver_name: String,
    calls: Vec<u8>,
    race: Option<(u8, Race)>,
    fail_next: HashMap<u8, Errno>,
    rejected_caps: Vec<u64>,
    enabled_caps: Vec<u64>,
    master_elsewhere: bool,
    is_master: bool,
    connectors: Vec<FakeConnector>,
    encoders: Vec<FakeEncoder>,
    crtcs: Vec<FakeCrtc>,
    planes: Vec<FakePlane>,
    properties: Vec<FakeProperty>,
    object_props: HashMap<u32, Vec<(u32, u64)>>,
    blobs: HashMap<u32, Vec<u8>>,
    dumbs: BTreeMap<u32, FakeDumb>,
    fbs: BTreeMap<u32, FakeFb>,
    next_id: u32,
    leases: BTreeMap<u32, Vec<u32>>,
    set_crtc_log: Vec<SetCrtcCall>,
    set_property_log: Vec<(u32, u32, u64)>,
}

/// How the filling call of a raced query disagrees with its sizing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Race {
    /// An object appeared: report one more item and copy nothing.
    Grow,
    /// An object went away: copy and report one item fewer.
    Shrink,
}

pub(crate) struct FakeKernel {
    state: RefCell<State>,
}

fn name32(s: &str) -> [u8; 32] {
    let mut out = [0_u8; 32];
    out[..s.len()].copy_from_slice(s.as_bytes());
    out
}

fn mode(width: u16, height: u16, preferred: bool) -> ioctl::DrmModeInfo {
    let mut m = ioctl::DrmModeInfo::zeroed();
    m.hdisplay = width;
    m.hsync_start = width + 24;
    m.hsync_end = width + 160;
    m.htotal = width + 320;
    m.vdisplay = height;
    m.vsync_start = height + 3;
    m.vsync_end = height + 9;
    m.vtotal = height + 38;
    m.vrefresh = 60;
    m.clock = (m.htotal as u32 * m.vtotal as u32 * 60) / 1000;
    m.typ = ioctl::DRM_MODE_TYPE_DRIVER;
    if preferred {
        m.typ |= ioctl::DRM_MODE_TYPE_PREFERRED;
    }
    m.name = name32(&format!("{width}x{height}"));
    m
}

/// Copy `items` out through a (pointer, count) pair.
unsafe fn copy_out<U: Copy>(ptr: u64, count: &mut u32, items: &[U], race: Option<Race>) {
    let items = match race {
        Some(Race::Grow) => {
            *count = items.len() as u32 + 1;
            return;
        }
        Some(Race::Shrink) => &items[..items.len().saturating_sub(1)],
        None => items,
    };
    if ptr != 0 && *count as usize >= items.len() {
        unsafe { core::ptr::copy_nonoverlapping(items.as_ptr(), ptr as *mut U, items.len()) };
    }
    *count = items.len() as u32;
}

unsafe fn copy_pairs(
    ids_ptr: u64,
    values_ptr: u64,
    count: &mut u32,
    pairs: &[(u32, u64)],
    race: Option<Race>,
) {
    let ids: Vec<u32> = pairs.iter().map(|p| p.0).collect();
    let values: Vec<u64> = pairs.iter().map(|p| p.1).collect();
    let mut values_count = *count;
    unsafe {
        copy_out(ids_ptr, count, &ids, race);
        copy_out(values_ptr, &mut values_count, &values, race);
    }
}

unsafe fn copy_str(ptr: *mut u8, len: &mut usize, data: &[u8], race: Option<Race>) {
    let data = match race {
        Some(Race::Grow) => {
            *len = data.len() + 1;
            return;
        }
        Some(Race::Shrink) => &data[..data.len().saturating_sub(1)],
        None => data,
    };
    if !ptr.is_null() && *len >= data.len() {
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
    }
    *len = data.len();
}

unsafe fn read_ids(ptr: u64, count: u32) -> Vec<u32> {
    if ptr == 0 || count == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(ptr as *const u32, count as usize) }.to_vec()
}

unsafe fn arg<'a, U>(ptr: *mut u8, size: usize) -> &'a mut U {
    assert_eq!(size, core::mem::size_of::<U>(), "payload size doesn't match request");
    unsafe { &mut *(ptr as *mut U) }
}

impl FakeKernel {
    /// A device that reports itself as VKMS but has no mode objects.
    pub(crate) fn empty() -> Self {
        let state = State {
            driver_name: "vkms".to_string(),
            next_id: 100,
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    /// One HDMI output driven by CRTC 55 plus an idle writeback connector.
    pub(crate) fn vkms_single_head() -> Self {
        Self::build(false, true)
    }

    /// Like [`Self::vkms_single_head`], but CRTC 55 drives both an HDMI
    /// and a DisplayPort connector.
    pub(crate) fn cloned_outputs() -> Self {
        Self::build(true, true)
    }

    pub(crate) fn without_writeback() -> Self {
        Self::build(false, false)
    }

    fn build(with_dp: bool, with_writeback: bool) -> Self {
        use crate::ioctl::*;

        let kernel = Self::empty();
        {
            let mut st = kernel.state.borrow_mut();
            let props = [
                (PROP_EDID, "EDID", DRM_MODE_PROP_BLOB | DRM_MODE_PROP_IMMUTABLE, vec![], vec![]),
                (
                    PROP_CRTC_ID,
                    "CRTC_ID",
                    DRM_MODE_PROP_OBJECT | DRM_MODE_PROP_ATOMIC,
                    vec![DRM_MODE_OBJECT_CRTC as u64],
                    vec![],
                ),
                (
                    PROP_DPMS,
                    "DPMS",
                    DRM_MODE_PROP_ENUM,
                    vec![0, 1, 2, 3],
                    vec![(0, "On"), (1, "Standby"), (2, "Suspend"), (3, "Off")],
                ),
                (
                    PROP_WB_FB_ID,
                    "WRITEBACK_FB_ID",
                    DRM_MODE_PROP_OBJECT | DRM_MODE_PROP_ATOMIC,
                    vec![DRM_MODE_OBJECT_FB as u64],
                    vec![],
                ),
                (
                    PROP_WB_FORMATS,
                    "WRITEBACK_PIXEL_FORMATS",
                    DRM_MODE_PROP_BLOB | DRM_MODE_PROP_IMMUTABLE | DRM_MODE_PROP_ATOMIC,
                    vec![],
                    vec![],
                ),
                (
                    PROP_ACTIVE,
                    "ACTIVE",
                    DRM_MODE_PROP_RANGE | DRM_MODE_PROP_ATOMIC,
                    vec![0, 1],
                    vec![],
                ),
                (
                    PROP_MODE_ID,
                    "MODE_ID",
                    DRM_MODE_PROP_BLOB | DRM_MODE_PROP_ATOMIC,
                    vec![],
                    vec![],
                ),
                (
                    PROP_PLANE_TYPE,
                    "type",
                    DRM_MODE_PROP_ENUM | DRM_MODE_PROP_IMMUTABLE,
                    vec![0, 1, 2],
                    vec![(0, "Overlay"), (1, "Primary"), (2, "Cursor")],
                ),
            ];
            for (id, name, flags, values, enums) in props {
                st.properties.push(FakeProperty {
                    id,
                    name,
                    flags,
                    values,
                    enums,
                });
            }

            let scanout_mode = mode(1024, 768, true);
            st.crtcs.push(FakeCrtc {
                id: CRTC_MAIN,
                fb_id: FB_SCANOUT,
                mode: Some(scanout_mode),
            });
            st.object_props.insert(
                CRTC_MAIN,
                vec![(PROP_ACTIVE, 1), (PROP_MODE_ID, BLOB_MODE as u64)],
            );
            st.blobs.insert(BLOB_MODE, vec![0xa5; 68]);
            st.fbs.insert(
                FB_SCANOUT,
                FakeFb {
                    width: 1024,
                    height: 768,
                    pitch: 4096,
                    bpp: 32,
                    depth: 24,
                    handle: 0,
                },
            );
            st.planes.push(FakePlane {
                id: PLANE_PRIMARY,
                crtc_id: CRTC_MAIN,
                fb_id: FB_SCANOUT,
                formats: PLANE_FORMATS.to_vec(),
            });
            st.object_props.insert(
                PLANE_PRIMARY,
                vec![(PROP_PLANE_TYPE, 1), (PROP_CRTC_ID, CRTC_MAIN as u64)],
            );

            st.encoders.push(FakeEncoder {
                id: ENC_HDMI,
                typ: 2,
                crtc_id: CRTC_MAIN,
            });
            st.connectors.push(FakeConnector {
                id: CONN_HDMI,
                typ: 11,
                type_id: 1,
                connection: 1,
                encoder_id: ENC_HDMI,
                encoders: vec![ENC_HDMI],
                modes: vec![scanout_mode, mode(800, 600, false)],
            });
            st.object_props.insert(
                CONN_HDMI,
                vec![
                    (PROP_EDID, 0),
                    (PROP_CRTC_ID, CRTC_MAIN as u64),
                    (PROP_DPMS, 2),
                ],
            );

            if with_dp {
                st.encoders.push(FakeEncoder {
                    id: ENC_DP,
                    typ: 2,
                    crtc_id: CRTC_MAIN,
                });
                st.connectors.push(FakeConnector {
                    id: CONN_DP,
                    typ: 10,
                    type_id: 1,
                    connection: 1,
                    encoder_id: ENC_DP,
                    encoders: vec![ENC_DP],
                    modes: vec![scanout_mode],
                });
                st.object_props.insert(
                    CONN_DP,
                    vec![
                        (PROP_EDID, 0),
                        (PROP_CRTC_ID, CRTC_MAIN as u64),
                        (PROP_DPMS, 0),
                    ],
                );
            }

            if with_writeback {
                st.encoders.push(FakeEncoder {
                    id: ENC_WRITEBACK,
                    typ: 5,
                    crtc_id: 0,
                });
                st.connectors.push(FakeConnector {
                    id: CONN_WRITEBACK,
                    typ: 18,
                    type_id: 1,
                    connection: 1,
                    encoder_id: 0,
                    encoders: vec![ENC_WRITEBACK],
                    modes: vec![],
                });
                st.object_props.insert(
                    CONN_WRITEBACK,
                    vec![
                        (PROP_CRTC_ID, 0),
                        (PROP_WB_FB_ID, 0),
                        (PROP_WB_FORMATS, BLOB_WB_FORMATS as u64),
                    ],
                );
                st.blobs.insert(BLOB_WB_FORMATS, b"XR24AR24".to_vec());
            }
        }
        kernel
    }

    pub(crate) fn into_card(self) -> Card<FakeKernel> {
        match Card::from_device(self) {
            Ok(card) => card,
            Err(e) => panic!("fake kernel rejected version query: {e}"),
        }
    }

    pub(crate) fn add_crtc(&self, id: u32) {
        self.state.borrow_mut().crtcs.push(FakeCrtc {
            id,
            fb_id: 0,
            mode: None,
        });
    }

    pub(crate) fn add_encoder(&self, id: u32, crtc_id: u32) {
        self.state.borrow_mut().encoders.push(FakeEncoder {
            id,
            typ: 2,
            crtc_id,
        });
    }

    pub(crate) fn add_property(
        &self,
        id: u32,
        name: &'static str,
        flags: u32,
        values: Vec<u64>,
        enums: Vec<(u64, &'static str)>,
    ) {
        self.state.borrow_mut().properties.push(FakeProperty {
            id,
            name,
            flags,
            values,
            enums,
        });
    }

    pub(crate) fn set_driver_name(&self, name: &str) {
        self.state.borrow_mut().driver_name = name.to_string();
    }

    /// Make the next filling call of request `nr` report one more item
    /// than its sizing call did.
    pub(crate) fn race_on(&self, nr: u8) {
        self.state.borrow_mut().race = Some((nr, Race::Grow));
    }

    /// Make the next filling call of request `nr` report one item fewer
    /// than its sizing call did.
    pub(crate) fn shrink_on(&self, nr: u8) {
        self.state.borrow_mut().race = Some((nr, Race::Shrink));
    }

    pub(crate) fn fail_next(&self, nr: u8, errno: Errno) {
        self.state.borrow_mut().fail_next.insert(nr, errno);
    }

    pub(crate) fn reject_client_cap(&self, cap: ClientCap) {
        let raw = ioctl::DrmClientCap::from(cap).0;
        self.state.borrow_mut().rejected_caps.push(raw);
    }

    pub(crate) fn master_held_elsewhere(&self, held: bool) {
        self.state.borrow_mut().master_elsewhere = held;
    }

    pub(crate) fn calls(&self) -> Vec<u8> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn calls_to(&self, nr: u8) -> usize {
        self.state.borrow().calls.iter().filter(|c| **c == nr).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.state.borrow().calls.len()
    }

    pub(crate) fn set_crtc_log(&self) -> Vec<SetCrtcCall> {
        self.state.borrow().set_crtc_log.clone()
    }

    pub(crate) fn set_property_log(&self) -> Vec<(u32, u32, u64)> {
        self.state.borrow().set_property_log.clone()
    }

    pub(crate) fn enabled_client_caps(&self) -> Vec<u64> {
        self.state.borrow().enabled_caps.clone()
    }

    pub(crate) fn live_dumb_buffers(&self) -> usize {
        self.state.borrow().dumbs.len()
    }

    pub(crate) fn live_framebuffers(&self) -> usize {
        self.state.borrow().fbs.len()
    }

    pub(crate) fn leased_objects(&self, lessee: u32) -> Vec<u32> {
        self.state
            .borrow()
            .leases
            .get(&lessee)
            .cloned()
            .unwrap_or_default()
    }

    unsafe fn dispatch(&self, nr: u8, size: usize, ptr: *mut u8) -> KResult {
        let mut st = self.state.borrow_mut();
        st.calls.push(nr);
        if let Some(errno) = st.fail_next.remove(&nr) {
            return Err(errno);
        }
        unsafe {
            match nr {
                NR_VERSION => st.version(arg(ptr, size)),
                NR_GET_CAP => st.get_cap(arg(ptr, size)),
                NR_SET_CLIENT_CAP => st.set_client_cap(arg(ptr, size)),
                NR_GETRESOURCES => st.resources(arg(ptr, size)),
                NR_GETCONNECTOR => st.connector(arg(ptr, size)),
                NR_GETENCODER => st.encoder(arg(ptr, size)),
                NR_GETCRTC => st.crtc(arg(ptr, size)),
                NR_SETCRTC => st.set_crtc(arg(ptr, size)),
                NR_GETPLANERESOURCES => st.plane_resources(arg(ptr, size)),
                NR_GETPLANE => st.plane(arg(ptr, size)),
                NR_GETPROPERTY => st.property(arg(ptr, size)),
                NR_GETPROPBLOB => st.blob(arg(ptr, size)),
                NR_OBJ_GETPROPERTIES => st.object_properties(arg(ptr, size)),
                NR_OBJ_SETPROPERTY => {
                    let req: &mut ioctl::DrmModeObjSetProperty = arg(ptr, size);
                    st.set_property(req.obj_id, req.prop_id, req.value)
                }
                NR_SETPROPERTY => {
                    let req: &mut ioctl::DrmModeConnectorSetProperty = arg(ptr, size);
                    st.set_property(req.connector_id, req.prop_id, req.value)
                }
                NR_CREATE_DUMB => st.create_dumb(arg(ptr, size)),
                NR_MAP_DUMB => st.map_dumb(arg(ptr, size)),
                NR_DESTROY_DUMB => st.destroy_dumb(arg(ptr, size)),
                NR_ADDFB => st.add_fb(arg(ptr, size)),
                NR_RMFB => st.rm_fb(arg(ptr, size)),
                NR_GETFB => st.get_fb(arg(ptr, size)),
                NR_CREATE_LEASE => st.create_lease(arg(ptr, size)),
                NR_LIST_LESSEES => st.list_lessees(arg(ptr, size)),
                NR_GET_LEASE => st.get_lease(arg(ptr, size)),
                NR_REVOKE_LEASE => st.revoke_lease(arg(ptr, size)),
                _ => Err(ENOTTY),
            }
        }
    }
}

impl State {
    fn take_race(&mut self, nr: u8, filling: bool) -> Option<Race> {
        match self.race {
            Some((raced, kind)) if filling && raced == nr => {
                self.race = None;
                Some(kind)
            }
            _ => None,
        }
    }

    fn version(&mut self, v: &mut ioctl::DrmVersion) -> KResult {
        let filling = v.name_len + v.date_len + v.desc_len > 0;
        let race = self.take_race(NR_VERSION, filling);
        v.version_major = 1;
        v.version_minor = 0;
        v.version_patchlevel = 0;
        unsafe {
            copy_str(v.name, &mut v.name_len, self.driver_name.as_bytes(), race);
            copy_str(v.date, &mut v.date_len, b"20180514", race);
            copy_str(v.desc, &mut v.desc_len, b"Virtual Kernel Mode Setting", race);
        }
        Ok(0)
    }

    fn get_cap(&mut self, c: &mut ioctl::DrmGetCap) -> KResult {
        c.value = match c.capability {
            ioctl::DRM_CAP_DUMB_BUFFER => 1,
            ioctl::DRM_CAP_DUMB_PREFERRED_DEPTH => 24,
            ioctl::DRM_CAP_DUMB_PREFER_SHADOW => 1,
            _ => return Err(EINVAL),
        };
        Ok(0)
    }

    fn set_client_cap(&mut self, c: &mut ioctl::DrmSetClientCap) -> KResult {
        if self.rejected_caps.contains(&c.capability.0) {
            return Err(EOPNOTSUPP);
        }
        self.enabled_caps.push(c.capability.0);
        Ok(0)
    }

    fn master(&mut self, set: bool) -> KResult {
        if set {
            if self.master_elsewhere {
                return Err(EBUSY);
            }
            self.is_master = true;
        } else {
            if !self.is_master {
                return Err(EINVAL);
            }
            self.is_master = false;
        }
        Ok(0)
    }

    fn resources(&mut self, r: &mut ioctl::DrmModeCardRes) -> KResult {
        let filling =
            r.count_fbs + r.count_crtcs + r.count_connectors + r.count_encoders > 0;
        let race = self.take_race(NR_GETRESOURCES, filling);
        let fbs: Vec<u32> = self.fbs.keys().copied().collect();
        let crtcs: Vec<u32> = self.crtcs.iter().map(|c| c.id).collect();
        let connectors: Vec<u32> = self.connectors.iter().map(|c| c.id).collect();
        let encoders: Vec<u32> = self.encoders.iter().map(|e| e.id).collect();
        unsafe {
            copy_out(r.fb_id_ptr, &mut r.count_fbs, &fbs, race);
            copy_out(r.crtc_id_ptr, &mut r.count_crtcs, &crtcs, race);
            copy_out(r.connector_id_ptr, &mut r.count_connectors, &connectors, race);
            copy_out(r.encoder_id_ptr, &mut r.count_encoders, &encoders, race);
        }
        r.min_width = 1;
        r.max_width = 8192;
        r.min_height = 1;
        r.max_height = 8192;
        Ok(0)
    }

    fn connector(&mut self, g: &mut ioctl::DrmModeGetConnector) -> KResult {
        let filling = g.count_encoders + g.count_modes + g.count_props > 0;
        let race = self.take_race(NR_GETCONNECTOR, filling);
        let Some(c) = self.connectors.iter().find(|c| c.id == g.connector_id) else {
            return Err(ENOENT);
        };
        let props = self.object_props.get(&c.id).cloned().unwrap_or_default();
        unsafe {
            copy_out(g.encoders_ptr, &mut g.count_encoders, &c.encoders, race);
            copy_out(g.modes_ptr, &mut g.count_modes, &c.modes, race);
            copy_pairs(g.props_ptr, g.prop_values_ptr, &mut g.count_props, &props, race);
        }
        g.encoder_id = c.encoder_id;
        g.connector_type = c.typ;
        g.connector_type_id = c.type_id;
        g.connection = c.connection;
        g.mm_width = 520;
        g.mm_height = 320;
        g.subpixel = 1;
        Ok(0)
    }

    fn encoder(&mut self, g: &mut ioctl::DrmModeGetEncoder) -> KResult {
        let Some(e) = self.encoders.iter().find(|e| e.id == g.encoder_id) else {
            return Err(ENOENT);
        };
        g.encoder_type = e.typ;
        g.crtc_id = e.crtc_id;
        g.possible_crtcs = 1;
        g.possible_clones = 0;
        Ok(0)
    }

    fn crtc(&mut self, g: &mut ioctl::DrmModeCrtc) -> KResult {
        let Some(c) = self.crtcs.iter().find(|c| c.id == g.crtc_id) else {
            return Err(ENOENT);
        };
        g.fb_id = c.fb_id;
        g.x = 0;
        g.y = 0;
        g.gamma_size = 256;
        match c.mode {
            Some(mode) => {
                g.mode = mode;
                g.mode_valid = 1;
            }
            None => g.mode_valid = 0,
        }
        Ok(0)
    }

    fn set_crtc(&mut self, s: &mut ioctl::DrmModeCrtc) -> KResult {
        let connectors = unsafe { read_ids(s.set_connectors_ptr, s.count_connectors) };
        let crtc_id = s.crtc_id;
        if !connectors
            .iter()
            .all(|id| self.connectors.iter().any(|c| c.id == *id))
        {
            return Err(ENOENT);
        }
        let Some(crtc) = self.crtcs.iter_mut().find(|c| c.id == crtc_id) else {
            return Err(ENOENT);
        };
        if s.fb_id != u32::MAX {
            crtc.fb_id = s.fb_id;
        }
        if s.mode_valid != 0 {
            crtc.mode = Some(s.mode);
        }
        for conn in &self.connectors {
            let Some(props) = self.object_props.get_mut(&conn.id) else {
                continue;
            };
            for (prop, value) in props.iter_mut() {
                if *prop != PROP_CRTC_ID {
                    continue;
                }
                if connectors.contains(&conn.id) {
                    *value = crtc_id as u64;
                } else if *value == crtc_id as u64 {
                    *value = 0;
                }
            }
        }
        self.set_crtc_log.push(SetCrtcCall {
            crtc_id,
            fb_id: s.fb_id,
            connectors,
            mode_valid: s.mode_valid != 0,
        });
        Ok(0)
    }

    fn plane_resources(&mut self, r: &mut ioctl::DrmModeGetPlaneRes) -> KResult {
        let race = self.take_race(NR_GETPLANERESOURCES, r.count_planes > 0);
        let ids: Vec<u32> = self.planes.iter().map(|p| p.id).collect();
        unsafe { copy_out(r.plane_id_ptr, &mut r.count_planes, &ids, race) };
        Ok(0)
    }

    fn plane(&mut self, g: &mut ioctl::DrmModeGetPlane) -> KResult {
        let race = self.take_race(NR_GETPLANE, g.count_format_types > 0);
        let Some(p) = self.planes.iter().find(|p| p.id == g.plane_id) else {
            return Err(ENOENT);
        };
        g.crtc_id = p.crtc_id;
        g.fb_id = p.fb_id;
        g.possible_crtcs = 1;
        g.gamma_size = 0;
        unsafe { copy_out(g.format_type_ptr, &mut g.count_format_types, &p.formats, race) };
        Ok(0)
    }

    fn property(&mut self, g: &mut ioctl::DrmModeGetProperty) -> KResult {
        let filling = g.count_values + g.count_enum_blobs > 0;
        let race = self.take_race(NR_GETPROPERTY, filling);
        let Some(p) = self.properties.iter().find(|p| p.id == g.prop_id) else {
            return Err(ENOENT);
        };
        g.flags = p.flags;
        g.name = name32(p.name);
        unsafe { copy_out(g.values_ptr, &mut g.count_values, &p.values, race) };
        if p.flags & (ioctl::DRM_MODE_PROP_ENUM | ioctl::DRM_MODE_PROP_BITMASK) != 0 {
            let enums: Vec<ioctl::DrmModePropertyEnum> = p
                .enums
                .iter()
                .map(|(value, name)| ioctl::DrmModePropertyEnum {
                    value: *value,
                    name: name32(name),
                })
                .collect();
            unsafe { copy_out(g.enum_blob_ptr, &mut g.count_enum_blobs, &enums, race) };
        } else {
            g.count_enum_blobs = 0;
        }
        Ok(0)
    }

    fn blob(&mut self, g: &mut ioctl::DrmModeGetBlob) -> KResult {
        let race = self.take_race(NR_GETPROPBLOB, g.length > 0);
        let Some(data) = self.blobs.get(&g.blob_id) else {
            return Err(ENOENT);
        };
        unsafe { copy_out(g.data, &mut g.length, data, race) };
        Ok(0)
    }

    fn object_properties(&mut self, g: &mut ioctl::DrmModeObjGetProperties) -> KResult {
        let race = self.take_race(NR_OBJ_GETPROPERTIES, g.count_props > 0);
        let exists = match g.obj_type {
            ioctl::DRM_MODE_OBJECT_CRTC => self.crtcs.iter().any(|c| c.id == g.obj_id),
            ioctl::DRM_MODE_OBJECT_CONNECTOR => self.connectors.iter().any(|c| c.id == g.obj_id),
            ioctl::DRM_MODE_OBJECT_PLANE => self.planes.iter().any(|p| p.id == g.obj_id),
            _ => false,
        };
        if !exists {
            return Err(ENOENT);
        }
        let props = self.object_props.get(&g.obj_id).cloned().unwrap_or_default();
        unsafe { copy_pairs(g.props_ptr, g.prop_values_ptr, &mut g.count_props, &props, race) };
        Ok(0)
    }

    fn set_property(&mut self, obj_id: u32, prop_id: u32, value: u64) -> KResult {
        let Some(props) = self.object_props.get_mut(&obj_id) else {
            return Err(ENOENT);
        };
        let Some(slot) = props.iter_mut().find(|(id, _)| *id == prop_id) else {
            return Err(EINVAL);
        };
        slot.1 = value;
        self.set_property_log.push((obj_id, prop_id, value));
        Ok(0)
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_dumb(&mut self, c: &mut ioctl::DrmModeCreateDumb) -> KResult {
        if c.width == 0 || c.height == 0 || c.bpp == 0 {
            return Err(EINVAL);
        }
        let handle = self.alloc_id();
        let pitch = c.width * c.bpp.div_ceil(8);
        c.handle = handle;
        c.pitch = pitch;
        c.size = pitch as u64 * c.height as u64;
        self.dumbs.insert(handle, FakeDumb { pitch });
        Ok(0)
    }

    fn map_dumb(&mut self, m: &mut ioctl::DrmModeMapDumb) -> KResult {
        if !self.dumbs.contains_key(&m.handle) {
            return Err(ENOENT);
        }
        m.offset = 0x1000_0000 + ((m.handle as u64) << 12);
        Ok(0)
    }

    fn destroy_dumb(&mut self, d: &mut ioctl::DrmModeDestroyDumb) -> KResult {
        if self.fbs.values().any(|fb| fb.handle == d.handle) {
            // Stricter than the kernel, which keeps the memory alive for the
            // framebuffer; catches teardown in the wrong order.
            return Err(EBUSY);
        }
        match self.dumbs.remove(&d.handle) {
            Some(_) => Ok(0),
            None => Err(ENOENT),
        }
    }

    fn add_fb(&mut self, f: &mut ioctl::DrmModeFbCmd) -> KResult {
        let Some(dumb) = self.dumbs.get(&f.handle).copied() else {
            return Err(ENOENT);
        };
        if f.pitch != dumb.pitch {
            return Err(EINVAL);
        }
        let id = self.alloc_id();
        f.fb_id = id;
        self.fbs.insert(
            id,
            FakeFb {
                width: f.width,
                height: f.height,
                pitch: f.pitch,
                bpp: f.bpp,
                depth: f.depth,
                handle: f.handle,
            },
        );
        Ok(0)
    }

    fn rm_fb(&mut self, id: &mut linux_unsafe::uint) -> KResult {
        match self.fbs.remove(id) {
            Some(_) => Ok(0),
            None => Err(ENOENT),
        }
    }

    fn get_fb(&mut self, f: &mut ioctl::DrmModeFbCmd) -> KResult {
        let Some(fb) = self.fbs.get(&f.fb_id) else {
            return Err(ENOENT);
        };
        f.width = fb.width;
        f.height = fb.height;
        f.pitch = fb.pitch;
        f.bpp = fb.bpp;
        f.depth = fb.depth;
        f.handle = fb.handle;
        Ok(0)
    }

    fn create_lease(&mut self, c: &mut ioctl::DrmModeCreateLease) -> KResult {
        let objects = unsafe { read_ids(c.object_ids, c.object_count) };
        if objects.is_empty() {
            return Err(EINVAL);
        }
        let fd = std::fs::File::open("/dev/null")
            .map_err(|_| EINVAL)?
            .into_raw_fd();
        let lessee = self.alloc_id();
        self.leases.insert(lessee, objects);
        c.lessee_id = lessee;
        c.fd = fd as u32;
        Ok(0)
    }

    fn list_lessees(&mut self, l: &mut ioctl::DrmModeListLessees) -> KResult {
        let race = self.take_race(NR_LIST_LESSEES, l.count_lessees > 0);
        let ids: Vec<u32> = self.leases.keys().copied().collect();
        unsafe { copy_out(l.lessees_ptr, &mut l.count_lessees, &ids, race) };
        Ok(0)
    }

    fn get_lease(&mut self, g: &mut ioctl::DrmModeGetLease) -> KResult {
        let race = self.take_race(NR_GET_LEASE, g.count_objects > 0);
        let mut ids: Vec<u32> = self.crtcs.iter().map(|c| c.id).collect();
        ids.extend(self.connectors.iter().map(|c| c.id));
        ids.extend(self.encoders.iter().map(|e| e.id));
        ids.extend(self.planes.iter().map(|p| p.id));
        unsafe { copy_out(g.objects_ptr, &mut g.count_objects, &ids, race) };
        Ok(0)
    }

    fn revoke_lease(&mut self, r: &mut ioctl::DrmModeRevokeLease) -> KResult {
        match self.leases.remove(&r.lessee_id) {
            Some(_) => Ok(0),
            None => Err(ENOENT),
        }
    }
}

impl Device for FakeKernel {
    unsafe fn ioctl<T>(&self, request: IoctlRequest<T>, arg: &mut T) -> KResult {
        let parts = request.parts();
        assert_eq!(parts.class, ioctl::DRM_IOCTL_BASE);
        assert_eq!(parts.size, core::mem::size_of::<T>());
        unsafe { self.dispatch(parts.nr, parts.size, arg as *mut T as *mut u8) }
    }

    fn ioctl_no_arg(&self, request: IoctlRequest<()>) -> KResult {
        let nr = request.parts().nr;
        let mut st = self.state.borrow_mut();
        st.calls.push(nr);
        if let Some(errno) = st.fail_next.remove(&nr) {
            return Err(errno);
        }
        match nr {
            NR_SET_MASTER => st.master(true),
            NR_DROP_MASTER => st.master(false),
            _ => Err(ENOTTY),
        }
    }

    fn close(self) -> core::result::Result<(), Errno> {
        Ok(())
    }
}

#[test]
fn fake_rejects_unknown_requests() {
    let kernel = FakeKernel::empty();
    let mut junk = 0_u32;
    let req: IoctlRequest<u32> = IoctlRequest::_IOWR(0x7f);
    let got = unsafe { kernel.ioctl(req, &mut junk) };
    assert_eq!(got.err().map(|e| e.0), Some(ENOTTY.0));
}
