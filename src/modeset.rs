use core::fmt;

use serde::Serialize;

use crate::result::{check_count, Error, ObjectKind, Result};
use crate::{ioctl, Card, Device};

mod buffer;
mod lease;
mod props;

pub use buffer::*;
pub use lease::*;
pub use props::*;

macro_rules! object_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

object_id!(FramebufferId);
object_id!(CrtcId);
object_id!(ConnectorId);
object_id!(EncoderId);
object_id!(PlaneId);
object_id!(PropertyId);
object_id!(BlobId);
object_id!(LesseeId);

/// "Keep whatever framebuffer the CRTC is already scanning out."
///
/// The kernel field is unsigned but SETCRTC treats `-1` specially, so this
/// is `u32::MAX`.
pub const FB_ID_RETAIN: FramebufferId = FramebufferId(u32::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectId {
    Crtc(CrtcId),
    Connector(ConnectorId),
    Encoder(EncoderId),
    Mode(u32),
    Property(PropertyId),
    Framebuffer(FramebufferId),
    Blob(BlobId),
    Plane(PlaneId),
}

impl ObjectId {
    pub fn as_raw_type_and_id(self) -> (u32, u32) {
        match self {
            ObjectId::Crtc(id) => (ioctl::DRM_MODE_OBJECT_CRTC, id.0),
            ObjectId::Connector(id) => (ioctl::DRM_MODE_OBJECT_CONNECTOR, id.0),
            ObjectId::Encoder(id) => (ioctl::DRM_MODE_OBJECT_ENCODER, id.0),
            ObjectId::Mode(id) => (ioctl::DRM_MODE_OBJECT_MODE, id),
            ObjectId::Property(id) => (ioctl::DRM_MODE_OBJECT_PROPERTY, id.0),
            ObjectId::Framebuffer(id) => (ioctl::DRM_MODE_OBJECT_FB, id.0),
            ObjectId::Blob(id) => (ioctl::DRM_MODE_OBJECT_BLOB, id.0),
            ObjectId::Plane(id) => (ioctl::DRM_MODE_OBJECT_PLANE, id.0),
        }
    }

    pub(crate) fn kind(self) -> ObjectKind {
        match self {
            ObjectId::Crtc(_) => ObjectKind::Crtc,
            ObjectId::Connector(_) => ObjectKind::Connector,
            ObjectId::Encoder(_) => ObjectKind::Encoder,
            ObjectId::Mode(_) | ObjectId::Property(_) => ObjectKind::Property,
            ObjectId::Framebuffer(_) => ObjectKind::Framebuffer,
            ObjectId::Blob(_) => ObjectKind::Blob,
            ObjectId::Plane(_) => ObjectKind::Plane,
        }
    }
}

impl From<CrtcId> for ObjectId {
    fn from(value: CrtcId) -> Self {
        Self::Crtc(value)
    }
}

impl From<ConnectorId> for ObjectId {
    fn from(value: ConnectorId) -> Self {
        Self::Connector(value)
    }
}

impl From<EncoderId> for ObjectId {
    fn from(value: EncoderId) -> Self {
        Self::Encoder(value)
    }
}

impl From<PropertyId> for ObjectId {
    fn from(value: PropertyId) -> Self {
        Self::Property(value)
    }
}

impl From<FramebufferId> for ObjectId {
    fn from(value: FramebufferId) -> Self {
        Self::Framebuffer(value)
    }
}

impl From<BlobId> for ObjectId {
    fn from(value: BlobId) -> Self {
        Self::Blob(value)
    }
}

impl From<PlaneId> for ObjectId {
    fn from(value: PlaneId) -> Self {
        Self::Plane(value)
    }
}

/// The object IDs and size limits reported by `GETRESOURCES`.
#[derive(Debug, Clone, Serialize)]
pub struct CardResources {
    pub fb_ids: Vec<FramebufferId>,
    pub crtc_ids: Vec<CrtcId>,
    pub connector_ids: Vec<ConnectorId>,
    pub encoder_ids: Vec<EncoderId>,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorState {
    pub id: ConnectorId,
    pub current_encoder_id: EncoderId,
    pub connector_type: ConnectorType,
    pub connector_type_id: u32,
    pub connection_state: ConnectionState,
    pub width_mm: u32,
    pub height_mm: u32,
    pub subpixel_type: SubpixelType,
    pub modes: Vec<ModeInfo>,
    /// Property IDs paired with their current values, in kernel order.
    pub props: Vec<ModeProp>,
    pub available_encoder_ids: Vec<EncoderId>,
}

impl ConnectorState {
    pub fn preferred_mode(&self) -> Option<&ModeInfo> {
        self.modes
            .iter()
            .find(|mode| (mode.typ & ioctl::DRM_MODE_TYPE_PREFERRED) != 0)
    }

    /// The current value of property `id` on this connector, if it has one.
    pub fn prop_value(&self, id: PropertyId) -> Option<u64> {
        self.props.iter().find(|p| p.prop_id == id).map(|p| p.value)
    }

    /// A short name in the style the kernel uses in sysfs, such as
    /// `Writeback-1`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.connector_type.name(), self.connector_type_id)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
#[repr(u32)]
pub enum ConnectionState {
    Connected = 1,
    Disconnected = 2,
    Unknown = 3,
}

impl From<u32> for ConnectionState {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[repr(u32)]
pub enum ConnectorType {
    Unknown = 0,
    Vga = 1,
    DviI = 2,
    DviD = 3,
    DviA = 4,
    Composite = 5,
    SVideo = 6,
    Lvds = 7,
    Component = 8,
    NinePinDin = 9,
    DisplayPort = 10,
    HdmiA = 11,
    HdmiB = 12,
    Tv = 13,
    Edp = 14,
    Virtual = 15,
    Dsi = 16,
    Dpi = 17,
    Writeback = 18,
    Spi = 19,
    Usb = 20,
    Other = !0, // Not used by kernel, but used by us if kernel returns something we don't know
}

impl From<u32> for ConnectorType {
    #[inline]
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Vga,
            2 => Self::DviI,
            3 => Self::DviD,
            4 => Self::DviA,
            5 => Self::Composite,
            6 => Self::SVideo,
            7 => Self::Lvds,
            8 => Self::Component,
            9 => Self::NinePinDin,
            10 => Self::DisplayPort,
            11 => Self::HdmiA,
            12 => Self::HdmiB,
            13 => Self::Tv,
            14 => Self::Edp,
            15 => Self::Virtual,
            16 => Self::Dsi,
            17 => Self::Dpi,
            18 => Self::Writeback,
            19 => Self::Spi,
            20 => Self::Usb,
            _ => Self::Other,
        }
    }
}

impl ConnectorType {
    /// The name the kernel uses for this connector type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Vga => "VGA",
            Self::DviI => "DVI-I",
            Self::DviD => "DVI-D",
            Self::DviA => "DVI-A",
            Self::Composite => "Composite",
            Self::SVideo => "SVIDEO",
            Self::Lvds => "LVDS",
            Self::Component => "Component",
            Self::NinePinDin => "DIN",
            Self::DisplayPort => "DP",
            Self::HdmiA => "HDMI-A",
            Self::HdmiB => "HDMI-B",
            Self::Tv => "TV",
            Self::Edp => "eDP",
            Self::Virtual => "Virtual",
            Self::Dsi => "DSI",
            Self::Dpi => "DPI",
            Self::Writeback => "Writeback",
            Self::Spi => "SPI",
            Self::Usb => "USB",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EncoderState {
    pub encoder_id: EncoderId,
    pub encoder_type: u32,
    /// Zero when the encoder isn't currently driven by any CRTC.
    pub current_crtc_id: CrtcId,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrtcState {
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode: Option<ModeInfo>,
}

impl From<ioctl::DrmModeCrtc> for CrtcState {
    fn from(value: ioctl::DrmModeCrtc) -> Self {
        Self {
            crtc_id: CrtcId(value.crtc_id),
            fb_id: FramebufferId(value.fb_id),
            x: value.x,
            y: value.y,
            gamma_size: value.gamma_size,
            mode: (value.mode_valid != 0).then(|| value.mode.into()),
        }
    }
}

/// A request to reconfigure a CRTC with `SETCRTC`.
///
/// This is only ever sent to the kernel; the connector list is not
/// something the kernel reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCrtc {
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub x: u32,
    pub y: u32,
    pub connectors: Vec<ConnectorId>,
    pub mode: Option<ModeInfo>,
}

impl SetCrtc {
    /// Start from the current state of a CRTC, keeping its framebuffer,
    /// scanout position and mode.
    pub fn from_state(state: &CrtcState) -> Self {
        Self {
            crtc_id: state.crtc_id,
            fb_id: FB_ID_RETAIN,
            x: state.x,
            y: state.y,
            connectors: Vec::new(),
            mode: state.mode.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaneState {
    pub id: PlaneId,
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
    /// Supported pixel formats, as fourcc codes.
    pub formats: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeInfo {
    pub name: String,
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub typ: u32,
}

impl From<ioctl::DrmModeInfo> for ModeInfo {
    fn from(value: ioctl::DrmModeInfo) -> Self {
        Self {
            name: crate::c_bytes_to_string(&value.name),
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
        }
    }
}

impl From<&ModeInfo> for ioctl::DrmModeInfo {
    fn from(value: &ModeInfo) -> Self {
        let mut name = [0_u8; ioctl::DRM_DISPLAY_MODE_LEN];
        // Always leave room for the terminator.
        let len = core::cmp::min(name.len() - 1, value.name.len());
        name[..len].copy_from_slice(&value.name.as_bytes()[..len]);
        Self {
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
            name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum SubpixelType {
    Unknown = 1,
    HorizontalRgb = 2,
    HorizontalBgr = 3,
    VerticalRgb = 4,
    VerticalBgr = 5,
    None = 6,
}

impl From<u32> for SubpixelType {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::HorizontalRgb,
            3 => Self::HorizontalBgr,
            4 => Self::VerticalRgb,
            5 => Self::VerticalBgr,
            6 => Self::None,
            _ => Self::Unknown,
        }
    }
}

impl<D: Device> Card<D> {
    /// Enumerate the framebuffers, CRTCs, connectors and encoders of the
    /// device.
    pub fn resources(&self) -> Result<CardResources> {
        let mut sizes = ioctl::DrmModeCardRes::zeroed();
        // Safety: no buffers attached, so the kernel only fills in counts.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETRESOURCES, &mut sizes) }
            .map_err(Error::io("getresources"))?;

        let (fbs, crtcs, connectors, encoders) = (
            sizes.count_fbs(),
            sizes.count_crtcs(),
            sizes.count_connectors(),
            sizes.count_encoders(),
        );
        let mut fb_ids = vec![0_u32; fbs as usize];
        let mut crtc_ids = vec![0_u32; crtcs as usize];
        let mut connector_ids = vec![0_u32; connectors as usize];
        let mut encoder_ids = vec![0_u32; encoders as usize];

        if fbs != 0 || crtcs != 0 || connectors != 0 || encoders != 0 {
            let mut fill = ioctl::DrmModeCardRes::zeroed();
            // Safety: every pointer refers to a vec that outlives the call
            // and is exactly as long as the count stored beside it.
            unsafe {
                if fbs != 0 {
                    fill.set_fb_id_ptr(fb_ids.as_mut_ptr(), fbs);
                }
                if crtcs != 0 {
                    fill.set_crtc_id_ptr(crtc_ids.as_mut_ptr(), crtcs);
                }
                if connectors != 0 {
                    fill.set_connector_id_ptr(connector_ids.as_mut_ptr(), connectors);
                }
                if encoders != 0 {
                    fill.set_encoder_id_ptr(encoder_ids.as_mut_ptr(), encoders);
                }
                self.ioctl(ioctl::DRM_IOCTL_MODE_GETRESOURCES, &mut fill)
            }
            .map_err(Error::io("getresources"))?;

            check_count("framebuffers", fbs as usize, fill.count_fbs() as usize)?;
            check_count("crtcs", crtcs as usize, fill.count_crtcs() as usize)?;
            check_count(
                "connectors",
                connectors as usize,
                fill.count_connectors() as usize,
            )?;
            check_count("encoders", encoders as usize, fill.count_encoders() as usize)?;
        }

        Ok(CardResources {
            fb_ids: fb_ids.into_iter().map(FramebufferId).collect(),
            crtc_ids: crtc_ids.into_iter().map(CrtcId).collect(),
            connector_ids: connector_ids.into_iter().map(ConnectorId).collect(),
            encoder_ids: encoder_ids.into_iter().map(EncoderId).collect(),
            min_width: sizes.min_width,
            max_width: sizes.max_width,
            min_height: sizes.min_height,
            max_height: sizes.max_height,
        })
    }

    pub fn connector_state(&self, id: ConnectorId) -> Result<ConnectorState> {
        let mut sizes = ioctl::DrmModeGetConnector::zeroed();
        sizes.connector_id = id.0;
        // Safety: no buffers attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETCONNECTOR, &mut sizes) }
            .map_err(Error::lookup("getconnector", ObjectKind::Connector, id.0))?;

        let (n_encoders, n_modes, n_props) =
            (sizes.count_encoders(), sizes.count_modes(), sizes.count_props());
        let mut encoder_ids = vec![0_u32; n_encoders as usize];
        let mut modes = vec![ioctl::DrmModeInfo::zeroed(); n_modes as usize];
        let mut prop_ids = vec![0_u32; n_props as usize];
        let mut prop_values = vec![0_u64; n_props as usize];

        let mut state = sizes;
        if n_encoders != 0 || n_modes != 0 || n_props != 0 {
            let mut fill = ioctl::DrmModeGetConnector::zeroed();
            fill.connector_id = id.0;
            // Safety: as for resources, each buffer outlives the call and
            // matches its count.
            unsafe {
                if n_encoders != 0 {
                    fill.set_encoders_ptr(encoder_ids.as_mut_ptr(), n_encoders);
                }
                if n_modes != 0 {
                    fill.set_modes_ptr(modes.as_mut_ptr(), n_modes);
                }
                if n_props != 0 {
                    fill.set_props_ptrs(prop_ids.as_mut_ptr(), prop_values.as_mut_ptr(), n_props);
                }
                self.ioctl(ioctl::DRM_IOCTL_MODE_GETCONNECTOR, &mut fill)
            }
            .map_err(Error::lookup("getconnector", ObjectKind::Connector, id.0))?;

            check_count(
                "connector encoders",
                n_encoders as usize,
                fill.count_encoders() as usize,
            )?;
            check_count("connector modes", n_modes as usize, fill.count_modes() as usize)?;
            check_count("connector props", n_props as usize, fill.count_props() as usize)?;
            state = fill;
        }

        Ok(ConnectorState {
            id,
            current_encoder_id: EncoderId(state.encoder_id),
            connector_type: state.connector_type.into(),
            connector_type_id: state.connector_type_id,
            connection_state: state.connection.into(),
            width_mm: state.mm_width,
            height_mm: state.mm_height,
            subpixel_type: state.subpixel.into(),
            modes: modes.into_iter().map(ModeInfo::from).collect(),
            props: prop_ids
                .into_iter()
                .zip(prop_values)
                .map(|(prop_id, value)| ModeProp {
                    prop_id: PropertyId(prop_id),
                    value,
                })
                .collect(),
            available_encoder_ids: encoder_ids.into_iter().map(EncoderId).collect(),
        })
    }

    pub fn encoder_state(&self, id: EncoderId) -> Result<EncoderState> {
        let mut tmp = ioctl::DrmModeGetEncoder::zeroed();
        tmp.encoder_id = id.0;
        // Safety: fixed-size payload, no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETENCODER, &mut tmp) }
            .map_err(Error::lookup("getencoder", ObjectKind::Encoder, id.0))?;
        Ok(EncoderState {
            encoder_id: EncoderId(tmp.encoder_id),
            encoder_type: tmp.encoder_type,
            current_crtc_id: CrtcId(tmp.crtc_id),
            possible_crtcs: tmp.possible_crtcs,
            possible_clones: tmp.possible_clones,
        })
    }

    pub fn crtc_state(&self, id: CrtcId) -> Result<CrtcState> {
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = id.0;
        // Safety: GETCRTC ignores the connector pointer.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETCRTC, &mut tmp) }
            .map_err(Error::lookup("getcrtc", ObjectKind::Crtc, id.0))?;
        Ok(tmp.into())
    }

    /// Reconfigure a CRTC.
    ///
    /// This needs DRM master unless the caller's connectors and mode are
    /// exactly what the CRTC already has.
    pub fn set_crtc(&self, req: &SetCrtc) -> Result<()> {
        let connectors: Vec<u32> = req.connectors.iter().map(|c| c.0).collect();
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = req.crtc_id.0;
        tmp.fb_id = req.fb_id.0;
        tmp.x = req.x;
        tmp.y = req.y;
        if let Some(mode) = &req.mode {
            tmp.mode = mode.into();
            tmp.mode_valid = 1;
        }
        // Safety: connectors lives until the end of this function and its
        // length is what we record.
        unsafe {
            if !connectors.is_empty() {
                tmp.set_set_connectors_ptr(connectors.as_ptr(), connectors.len() as u32);
            }
            self.ioctl(ioctl::DRM_IOCTL_MODE_SETCRTC, &mut tmp)
        }
        // ENOENT may name the CRTC, a connector, the framebuffer or the
        // mode's blob, so it is not attributed to any one object.
        .map_err(Error::io("setcrtc"))?;
        Ok(())
    }

    /// The IDs of all planes, including the primary and cursor planes when
    /// [`crate::ClientCap::UniversalPlanes`] is enabled.
    pub fn plane_resources(&self) -> Result<Vec<PlaneId>> {
        let mut sizes = ioctl::DrmModeGetPlaneRes::zeroed();
        // Safety: no buffers attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES, &mut sizes) }
            .map_err(Error::io("getplaneresources"))?;

        let count = sizes.count_planes();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = vec![0_u32; count as usize];
        let mut fill = ioctl::DrmModeGetPlaneRes::zeroed();
        // Safety: ids outlives the call and matches count.
        unsafe {
            fill.set_plane_id_ptr(ids.as_mut_ptr(), count);
            self.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES, &mut fill)
        }
        .map_err(Error::io("getplaneresources"))?;
        check_count("planes", count as usize, fill.count_planes() as usize)?;

        Ok(ids.into_iter().map(PlaneId).collect())
    }

    pub fn plane_state(&self, id: PlaneId) -> Result<PlaneState> {
        let mut sizes = ioctl::DrmModeGetPlane::zeroed();
        sizes.plane_id = id.0;
        // Safety: no buffers attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANE, &mut sizes) }
            .map_err(Error::lookup("getplane", ObjectKind::Plane, id.0))?;

        let count = sizes.count_format_types();
        let mut formats = vec![0_u32; count as usize];
        let mut state = sizes;
        if count != 0 {
            let mut fill = ioctl::DrmModeGetPlane::zeroed();
            fill.plane_id = id.0;
            // Safety: formats outlives the call and matches count.
            unsafe {
                fill.set_format_type_ptr(formats.as_mut_ptr(), count);
                self.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANE, &mut fill)
            }
            .map_err(Error::lookup("getplane", ObjectKind::Plane, id.0))?;
            check_count("plane formats", count as usize, fill.count_format_types() as usize)?;
            state = fill;
        }

        Ok(PlaneState {
            id,
            crtc_id: CrtcId(state.crtc_id),
            fb_id: FramebufferId(state.fb_id),
            possible_crtcs: state.possible_crtcs,
            gamma_size: state.gamma_size,
            formats,
        })
    }
}
