use core::ffi::c_int as int;
use core::marker::PhantomData;

use linux_io::fd::ioctl::IoDevice;

pub struct DrmCardDevice;

impl IoDevice for DrmCardDevice {}

/// The device-class byte shared by every DRM request.
pub const DRM_IOCTL_BASE: u8 = b'd';

pub const IOC_NRBITS: u32 = 8;
pub const IOC_TYPEBITS: u32 = 8;
pub const IOC_SIZEBITS: u32 = 14;
pub const IOC_DIRBITS: u32 = 2;

pub const IOC_NRSHIFT: u32 = 0;
pub const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
pub const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
pub const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_NRMASK: u32 = (1 << IOC_NRBITS) - 1;
const IOC_TYPEMASK: u32 = (1 << IOC_TYPEBITS) - 1;
const IOC_SIZEMASK: u32 = (1 << IOC_SIZEBITS) - 1;
const IOC_DIRMASK: u32 = (1 << IOC_DIRBITS) - 1;

/// Data transfer direction of an ioctl request, from userspace's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IoctlDirection {
    None = 0,
    /// Userspace writes, the kernel reads.
    Write = 1,
    /// The kernel writes, userspace reads.
    Read = 2,
    ReadWrite = 3,
}

impl IoctlDirection {
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & IOC_DIRMASK {
            0 => Self::None,
            1 => Self::Write,
            2 => Self::Read,
            _ => Self::ReadWrite,
        }
    }
}

/// The four fields packed into an ioctl request code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestParts {
    pub direction: IoctlDirection,
    pub size: usize,
    pub class: u8,
    pub nr: u8,
}

/// Pack an ioctl request code using the kernel's generic bit layout:
/// 8 bits of function number, 8 bits of device class, 14 bits of payload
/// size and 2 bits of direction, from least to most significant.
///
/// Panics (at compile time, for the request table below) if `size` does
/// not fit in the size field.
pub const fn request_code(direction: IoctlDirection, size: usize, class: u8, nr: u8) -> u32 {
    assert!(size <= IOC_SIZEMASK as usize, "ioctl payload too large");
    ((direction as u32) << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((class as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

/// Unpack a request code produced by [`request_code`].
pub const fn decode_request(code: u32) -> RequestParts {
    RequestParts {
        direction: IoctlDirection::from_bits(code >> IOC_DIRSHIFT),
        size: ((code >> IOC_SIZESHIFT) & IOC_SIZEMASK) as usize,
        class: ((code >> IOC_TYPESHIFT) & IOC_TYPEMASK) as u8,
        nr: ((code >> IOC_NRSHIFT) & IOC_NRMASK) as u8,
    }
}

/// A DRM request code tied to the payload type it must be issued with.
#[derive(Debug)]
pub struct IoctlRequest<T> {
    code: u32,
    _arg: PhantomData<*mut T>,
}

impl<T> Clone for IoctlRequest<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for IoctlRequest<T> {}

impl<T> IoctlRequest<T> {
    const fn new(direction: IoctlDirection, nr: u8) -> Self {
        Self {
            code: request_code(direction, core::mem::size_of::<T>(), DRM_IOCTL_BASE, nr),
            _arg: PhantomData,
        }
    }

    #[allow(non_snake_case)]
    pub const fn _IOW(nr: u8) -> Self {
        Self::new(IoctlDirection::Write, nr)
    }

    #[allow(non_snake_case)]
    pub const fn _IOR(nr: u8) -> Self {
        Self::new(IoctlDirection::Read, nr)
    }

    #[allow(non_snake_case)]
    pub const fn _IOWR(nr: u8) -> Self {
        Self::new(IoctlDirection::ReadWrite, nr)
    }

    #[inline(always)]
    pub const fn code(self) -> u32 {
        self.code
    }

    #[inline(always)]
    pub const fn parts(self) -> RequestParts {
        decode_request(self.code)
    }
}

impl IoctlRequest<()> {
    #[allow(non_snake_case)]
    pub const fn _IO(nr: u8) -> Self {
        Self::new(IoctlDirection::None, nr)
    }
}

macro_rules! impl_zeroed {
    ($t:ty) => {
        impl $t {
            #[inline(always)]
            pub const fn zeroed() -> Self {
                // Safety: All of the field types in $t must
                // treat all-zeroes as a valid bit pattern.
                unsafe { ::core::mem::zeroed() }
            }
        }

        /// The default value is the result of [`Self::zeroed`].
        impl ::core::default::Default for $t {
            #[inline(always)]
            fn default() -> Self {
                Self::zeroed()
            }
        }
    };
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmVersion {
    pub version_major: int,
    pub version_minor: int,
    pub version_patchlevel: int,
    pub(crate) name_len: usize,
    pub(crate) name: *mut u8,
    pub(crate) date_len: usize,
    pub(crate) date: *mut u8,
    pub(crate) desc_len: usize,
    pub(crate) desc: *mut u8,
}

impl_zeroed!(DrmVersion);

impl DrmVersion {
    #[inline(always)]
    pub unsafe fn set_name_ptr(&mut self, ptr: *mut u8, len: usize) {
        self.name = ptr;
        self.name_len = len;
    }

    #[inline(always)]
    pub fn name_len(&self) -> usize {
        self.name_len
    }

    #[inline(always)]
    pub unsafe fn set_date_ptr(&mut self, ptr: *mut u8, len: usize) {
        self.date = ptr;
        self.date_len = len;
    }

    #[inline(always)]
    pub fn date_len(&self) -> usize {
        self.date_len
    }

    #[inline(always)]
    pub unsafe fn set_desc_ptr(&mut self, ptr: *mut u8, len: usize) {
        self.desc = ptr;
        self.desc_len = len;
    }

    #[inline(always)]
    pub fn desc_len(&self) -> usize {
        self.desc_len
    }
}

pub const DRM_IOCTL_VERSION: IoctlRequest<DrmVersion> = IoctlRequest::_IOWR(0x00);

pub const DRM_IOCTL_SET_MASTER: IoctlRequest<()> = IoctlRequest::_IO(0x1e);

pub const DRM_IOCTL_DROP_MASTER: IoctlRequest<()> = IoctlRequest::_IO(0x1f);

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmGetCap {
    pub capability: DrmCap,
    pub value: u64,
}

impl_zeroed!(DrmGetCap);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct DrmCap(pub u64);

pub const DRM_IOCTL_GET_CAP: IoctlRequest<DrmGetCap> = IoctlRequest::_IOWR(0x0c);

/// If set to 1, the driver supports creating "dumb buffers" via [`DRM_IOCTL_MODE_CREATE_DUMB`].
pub const DRM_CAP_DUMB_BUFFER: DrmCap = DrmCap(0x1);
/// The preferred bit depth for "dumb buffers".
///
/// The bit depth is the number of bits used to indicate the color of a single
/// pixel excluding any padding. This is different from the number of bits per
/// pixel. For instance, XRGB8888 has a bit depth of 24 but has 32 bits per
/// pixel.
pub const DRM_CAP_DUMB_PREFERRED_DEPTH: DrmCap = DrmCap(0x3);
/// If set to 1, the driver prefers userspace to render to a shadow buffer
/// instead of directly rendering to a dumb buffer.
pub const DRM_CAP_DUMB_PREFER_SHADOW: DrmCap = DrmCap(0x4);
/// Bitfield of supported PRIME sharing capabilities.
pub const DRM_CAP_PRIME: DrmCap = DrmCap(0x5);
/// A plane width that is valid to use for a cursor plane.
pub const DRM_CAP_CURSOR_WIDTH: DrmCap = DrmCap(0x8);
/// A plane height that is valid to use for a cursor plane.
pub const DRM_CAP_CURSOR_HEIGHT: DrmCap = DrmCap(0x9);

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmSetClientCap {
    pub capability: DrmClientCap,
    pub value: u64,
}

impl_zeroed!(DrmSetClientCap);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct DrmClientCap(pub u64);

pub const DRM_IOCTL_SET_CLIENT_CAP: IoctlRequest<DrmSetClientCap> = IoctlRequest::_IOW(0x0d);

/// If set to 1, the DRM core will expose the stereo 3D capabilities of the
/// monitor by advertising the supported 3D layouts in the flags of struct
/// drm_mode_modeinfo.
pub const DRM_CLIENT_CAP_STEREO_3D: DrmClientCap = DrmClientCap(1);

/// If set to 1, the DRM core will expose all planes (overlay, primary, and
/// cursor) to userspace.
pub const DRM_CLIENT_CAP_UNIVERSAL_PLANES: DrmClientCap = DrmClientCap(2);

/// If set to 1, the DRM core will expose atomic properties to userspace.
pub const DRM_CLIENT_CAP_ATOMIC: DrmClientCap = DrmClientCap(3);

/// If set to 1, the DRM core will provide aspect ratio information in modes.
pub const DRM_CLIENT_CAP_ASPECT_RATIO: DrmClientCap = DrmClientCap(4);

/// If set to 1, the DRM core will expose special connectors to be used for
/// writing back to memory the scene setup in the commit. Depends on client
/// also supporting DRM_CLIENT_CAP_ATOMIC
pub const DRM_CLIENT_CAP_WRITEBACK_CONNECTORS: DrmClientCap = DrmClientCap(5);

/// Cursor planes on para-virtualized drivers are only exposed to clients
/// that set this, after enabling [`DRM_CLIENT_CAP_ATOMIC`].
pub const DRM_CLIENT_CAP_CURSOR_PLANE_HOTSPOT: DrmClientCap = DrmClientCap(6);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCardRes {
    pub(crate) fb_id_ptr: u64,
    pub(crate) crtc_id_ptr: u64,
    pub(crate) connector_id_ptr: u64,
    pub(crate) encoder_id_ptr: u64,
    pub(crate) count_fbs: u32,
    pub(crate) count_crtcs: u32,
    pub(crate) count_connectors: u32,
    pub(crate) count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl_zeroed!(DrmModeCardRes);

impl DrmModeCardRes {
    #[inline(always)]
    pub unsafe fn set_fb_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.fb_id_ptr = ptr as u64;
        self.count_fbs = len;
    }

    #[inline(always)]
    pub fn count_fbs(&self) -> u32 {
        self.count_fbs
    }

    #[inline(always)]
    pub unsafe fn set_crtc_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.crtc_id_ptr = ptr as u64;
        self.count_crtcs = len;
    }

    #[inline(always)]
    pub fn count_crtcs(&self) -> u32 {
        self.count_crtcs
    }

    #[inline(always)]
    pub unsafe fn set_connector_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.connector_id_ptr = ptr as u64;
        self.count_connectors = len;
    }

    #[inline(always)]
    pub fn count_connectors(&self) -> u32 {
        self.count_connectors
    }

    #[inline(always)]
    pub unsafe fn set_encoder_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.encoder_id_ptr = ptr as u64;
        self.count_encoders = len;
    }

    #[inline(always)]
    pub fn count_encoders(&self) -> u32 {
        self.count_encoders
    }
}

pub const DRM_IOCTL_MODE_GETRESOURCES: IoctlRequest<DrmModeCardRes> = IoctlRequest::_IOWR(0xa0);

pub const DRM_DISPLAY_MODE_LEN: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrmModeInfo {
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
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

impl_zeroed!(DrmModeInfo);

pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;
pub const DRM_MODE_TYPE_USERDEF: u32 = 1 << 5;
pub const DRM_MODE_TYPE_DRIVER: u32 = 1 << 6;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetConnector {
    pub(crate) encoders_ptr: u64,
    pub(crate) modes_ptr: u64,
    pub(crate) props_ptr: u64,
    pub(crate) prop_values_ptr: u64,
    pub(crate) count_modes: u32,
    pub(crate) count_props: u32,
    pub(crate) count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    #[doc(hidden)]
    pub _pad: u32,
}

impl_zeroed!(DrmModeGetConnector);

impl DrmModeGetConnector {
    #[inline(always)]
    pub unsafe fn set_encoders_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.encoders_ptr = ptr as u64;
        self.count_encoders = len;
    }

    #[inline(always)]
    pub fn count_encoders(&self) -> u32 {
        self.count_encoders
    }

    #[inline(always)]
    pub unsafe fn set_modes_ptr(&mut self, ptr: *mut DrmModeInfo, len: u32) {
        self.modes_ptr = ptr as u64;
        self.count_modes = len;
    }

    #[inline(always)]
    pub fn count_modes(&self) -> u32 {
        self.count_modes
    }

    #[inline(always)]
    pub unsafe fn set_props_ptrs(&mut self, ids_ptr: *mut u32, vals_ptr: *mut u64, len: u32) {
        self.props_ptr = ids_ptr as u64;
        self.prop_values_ptr = vals_ptr as u64;
        self.count_props = len;
    }

    #[inline(always)]
    pub fn count_props(&self) -> u32 {
        self.count_props
    }
}

pub const DRM_IOCTL_MODE_GETCONNECTOR: IoctlRequest<DrmModeGetConnector> =
    IoctlRequest::_IOWR(0xa7);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

impl_zeroed!(DrmModeGetEncoder);

pub const DRM_IOCTL_MODE_GETENCODER: IoctlRequest<DrmModeGetEncoder> = IoctlRequest::_IOWR(0xa6);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCrtc {
    pub(crate) set_connectors_ptr: u64,
    pub(crate) count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeInfo,
}

impl_zeroed!(DrmModeCrtc);

impl DrmModeCrtc {
    pub unsafe fn set_set_connectors_ptr(&mut self, ptr: *const u32, len: u32) {
        self.set_connectors_ptr = ptr as u64;
        self.count_connectors = len;
    }

    pub fn count_connectors(&self) -> u32 {
        self.count_connectors
    }
}

pub const DRM_IOCTL_MODE_GETCRTC: IoctlRequest<DrmModeCrtc> = IoctlRequest::_IOWR(0xa1);

pub const DRM_IOCTL_MODE_SETCRTC: IoctlRequest<DrmModeCrtc> = IoctlRequest::_IOWR(0xa2);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

impl_zeroed!(DrmModeCreateDumb);

pub const DRM_IOCTL_MODE_CREATE_DUMB: IoctlRequest<DrmModeCreateDumb> = IoctlRequest::_IOWR(0xb2);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeMapDumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

impl_zeroed!(DrmModeMapDumb);

pub const DRM_IOCTL_MODE_MAP_DUMB: IoctlRequest<DrmModeMapDumb> = IoctlRequest::_IOWR(0xb3);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeDestroyDumb {
    pub handle: u32,
}

impl_zeroed!(DrmModeDestroyDumb);

pub const DRM_IOCTL_MODE_DESTROY_DUMB: IoctlRequest<DrmModeDestroyDumb> =
    IoctlRequest::_IOWR(0xb4);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

impl_zeroed!(DrmModeFbCmd);

pub const DRM_IOCTL_MODE_GETFB: IoctlRequest<DrmModeFbCmd> = IoctlRequest::_IOWR(0xad);

pub const DRM_IOCTL_MODE_ADDFB: IoctlRequest<DrmModeFbCmd> = IoctlRequest::_IOWR(0xae);

pub const DRM_IOCTL_MODE_RMFB: IoctlRequest<linux_unsafe::uint> = IoctlRequest::_IOWR(0xaf);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeObjGetProperties {
    pub(crate) props_ptr: u64,
    pub(crate) prop_values_ptr: u64,
    pub(crate) count_props: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

impl_zeroed!(DrmModeObjGetProperties);

impl DrmModeObjGetProperties {
    pub unsafe fn set_prop_ptrs(&mut self, ids_ptr: *mut u32, values_ptr: *mut u64, len: u32) {
        self.props_ptr = ids_ptr as u64;
        self.prop_values_ptr = values_ptr as u64;
        self.count_props = len;
    }

    pub fn count_props(&self) -> u32 {
        self.count_props
    }
}

pub const DRM_IOCTL_MODE_OBJ_GETPROPERTIES: IoctlRequest<DrmModeObjGetProperties> =
    IoctlRequest::_IOWR(0xb9);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeObjSetProperty {
    pub value: u64,
    pub prop_id: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

impl_zeroed!(DrmModeObjSetProperty);

pub const DRM_IOCTL_MODE_OBJ_SETPROPERTY: IoctlRequest<DrmModeObjSetProperty> =
    IoctlRequest::_IOWR(0xba);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeConnectorSetProperty {
    pub value: u64,
    pub prop_id: u32,
    pub connector_id: u32,
}

impl_zeroed!(DrmModeConnectorSetProperty);

/// Legacy, connector-only form of [`DRM_IOCTL_MODE_OBJ_SETPROPERTY`].
pub const DRM_IOCTL_MODE_SETPROPERTY: IoctlRequest<DrmModeConnectorSetProperty> =
    IoctlRequest::_IOWR(0xab);

pub const DRM_MODE_OBJECT_CRTC: u32 = 0xcccccccc;
pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0c0c0;
pub const DRM_MODE_OBJECT_ENCODER: u32 = 0xe0e0e0e0;
pub const DRM_MODE_OBJECT_MODE: u32 = 0xdededede;
pub const DRM_MODE_OBJECT_PROPERTY: u32 = 0xb0b0b0b0;
pub const DRM_MODE_OBJECT_FB: u32 = 0xfbfbfbfb;
pub const DRM_MODE_OBJECT_BLOB: u32 = 0xbbbbbbbb;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeeeeeee;
pub const DRM_MODE_OBJECT_ANY: u32 = 0;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetPlaneRes {
    pub(crate) plane_id_ptr: u64,
    pub(crate) count_planes: u32,
}

impl_zeroed!(DrmModeGetPlaneRes);

impl DrmModeGetPlaneRes {
    #[inline(always)]
    pub unsafe fn set_plane_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.plane_id_ptr = ptr as u64;
        self.count_planes = len;
    }

    #[inline(always)]
    pub fn count_planes(&self) -> u32 {
        self.count_planes
    }
}

pub const DRM_IOCTL_MODE_GETPLANERESOURCES: IoctlRequest<DrmModeGetPlaneRes> =
    IoctlRequest::_IOWR(0xb5);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetPlane {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
    pub(crate) count_format_types: u32,
    pub(crate) format_type_ptr: u64,
}

impl_zeroed!(DrmModeGetPlane);

impl DrmModeGetPlane {
    #[inline(always)]
    pub unsafe fn set_format_type_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.format_type_ptr = ptr as u64;
        self.count_format_types = len;
    }

    #[inline(always)]
    pub fn count_format_types(&self) -> u32 {
        self.count_format_types
    }
}

pub const DRM_IOCTL_MODE_GETPLANE: IoctlRequest<DrmModeGetPlane> = IoctlRequest::_IOWR(0xb6);

#[repr(C)]
#[derive(Debug, Clone)]
pub struct DrmModeGetProperty {
    pub(crate) values_ptr: u64,
    pub(crate) enum_blob_ptr: u64,
    pub prop_id: u32,
    pub flags: u32,
    pub name: [u8; DRM_PROP_NAME_LEN],
    pub(crate) count_values: u32,
    pub(crate) count_enum_blobs: u32,
}

impl_zeroed!(DrmModeGetProperty);

impl DrmModeGetProperty {
    /// Set the `values_ptr` and `count_values` fields.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an array of `u64` with at least length `len`, and
    /// that pointer must remain valid throughout any subsequent ioctl calls
    /// using this object.
    #[inline(always)]
    pub unsafe fn set_values_ptr(&mut self, ptr: *mut u64, len: u32) {
        self.values_ptr = ptr as u64;
        self.count_values = len;
    }

    #[inline(always)]
    pub fn count_values(&self) -> u32 {
        self.count_values
    }

    /// Set the `enum_blob_ptr` and `count_enum_blobs` fields.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an array of `DrmModePropertyEnum` with at least
    /// length `len`, and that pointer must remain valid throughout any
    /// subsequent ioctl calls using this object.
    #[inline(always)]
    pub unsafe fn set_enum_blob_ptr(&mut self, ptr: *mut DrmModePropertyEnum, len: u32) {
        self.enum_blob_ptr = ptr as u64;
        self.count_enum_blobs = len;
    }

    #[inline(always)]
    pub fn count_enum_blobs(&self) -> u32 {
        self.count_enum_blobs
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrmModePropertyEnum {
    pub value: u64,
    pub name: [u8; DRM_PROP_NAME_LEN],
}

impl_zeroed!(DrmModePropertyEnum);

/// User-space can perform a `GETPROPERTY` request to retrieve information about a
/// property. The same property may be attached to multiple objects.
///
/// [`DrmModeGetProperty::enum_blob_ptr`] and [`DrmModeGetProperty::count_enum_blobs`]
/// are only meaningful when the property has the type [`DRM_MODE_PROP_ENUM`] or
/// [`DRM_MODE_PROP_BITMASK`]. For backwards compatibility, the kernel will always set
/// `count_enum_blobs` to zero when the property has the type [`DRM_MODE_PROP_BLOB`].
///
/// Userspace is expected to retrieve values and enums by performing this request
/// at least twice: the first time to retrieve the number of elements, the
/// second time to retrieve the elements themselves.
pub const DRM_IOCTL_MODE_GETPROPERTY: IoctlRequest<DrmModeGetProperty> =
    IoctlRequest::_IOWR(0xaa);

pub const DRM_PROP_NAME_LEN: usize = 32;

pub const DRM_MODE_PROP_PENDING: u32 = 1 << 0;
pub const DRM_MODE_PROP_RANGE: u32 = 1 << 1;
pub const DRM_MODE_PROP_IMMUTABLE: u32 = 1 << 2;
pub const DRM_MODE_PROP_ENUM: u32 = 1 << 3;
pub const DRM_MODE_PROP_BLOB: u32 = 1 << 4;
pub const DRM_MODE_PROP_BITMASK: u32 = 1 << 5;
pub const DRM_MODE_PROP_LEGACY_TYPE: u32 =
    DRM_MODE_PROP_RANGE | DRM_MODE_PROP_ENUM | DRM_MODE_PROP_BLOB | DRM_MODE_PROP_BITMASK;
pub const DRM_MODE_PROP_EXTENDED_TYPE: u32 = 0x0000ffc0;
pub const DRM_MODE_PROP_OBJECT: u32 = DRM_MODE_PROP_TYPE(1);
pub const DRM_MODE_PROP_SIGNED_RANGE: u32 = DRM_MODE_PROP_TYPE(2);
/// Hides the property from clients that haven't enabled [`DRM_CLIENT_CAP_ATOMIC`].
pub const DRM_MODE_PROP_ATOMIC: u32 = 0x80000000;

#[allow(non_snake_case)]
#[inline(always)]
pub const fn DRM_MODE_PROP_TYPE(n: u32) -> u32 {
    n << 6
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetBlob {
    pub blob_id: u32,
    pub(crate) length: u32,
    pub(crate) data: u64,
}

impl_zeroed!(DrmModeGetBlob);

impl DrmModeGetBlob {
    #[inline(always)]
    pub unsafe fn set_data_ptr(&mut self, ptr: *mut u8, len: u32) {
        self.data = ptr as u64;
        self.length = len;
    }

    #[inline(always)]
    pub fn length(&self) -> u32 {
        self.length
    }
}

pub const DRM_IOCTL_MODE_GETPROPBLOB: IoctlRequest<DrmModeGetBlob> = IoctlRequest::_IOWR(0xac);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCreateLease {
    pub(crate) object_ids: u64,
    pub(crate) object_count: u32,
    pub flags: u32,
    pub lessee_id: u32,
    pub fd: u32,
}

impl_zeroed!(DrmModeCreateLease);

impl DrmModeCreateLease {
    #[inline(always)]
    pub unsafe fn set_object_ids_ptr(&mut self, ptr: *const u32, len: u32) {
        self.object_ids = ptr as u64;
        self.object_count = len;
    }
}

pub const DRM_IOCTL_MODE_CREATE_LEASE: IoctlRequest<DrmModeCreateLease> =
    IoctlRequest::_IOWR(0xc6);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeListLessees {
    pub(crate) count_lessees: u32,
    pub(crate) pad: u32,
    pub(crate) lessees_ptr: u64,
}

impl_zeroed!(DrmModeListLessees);

impl DrmModeListLessees {
    #[inline(always)]
    pub unsafe fn set_lessees_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.lessees_ptr = ptr as u64;
        self.count_lessees = len;
    }

    #[inline(always)]
    pub fn count_lessees(&self) -> u32 {
        self.count_lessees
    }
}

pub const DRM_IOCTL_MODE_LIST_LESSEES: IoctlRequest<DrmModeListLessees> =
    IoctlRequest::_IOWR(0xc7);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetLease {
    pub(crate) count_objects: u32,
    pub(crate) pad: u32,
    pub(crate) objects_ptr: u64,
}

impl_zeroed!(DrmModeGetLease);

impl DrmModeGetLease {
    #[inline(always)]
    pub unsafe fn set_objects_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.objects_ptr = ptr as u64;
        self.count_objects = len;
    }

    #[inline(always)]
    pub fn count_objects(&self) -> u32 {
        self.count_objects
    }
}

pub const DRM_IOCTL_MODE_GET_LEASE: IoctlRequest<DrmModeGetLease> = IoctlRequest::_IOWR(0xc8);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeRevokeLease {
    pub lessee_id: u32,
}

impl_zeroed!(DrmModeRevokeLease);

pub const DRM_IOCTL_MODE_REVOKE_LEASE: IoctlRequest<DrmModeRevokeLease> =
    IoctlRequest::_IOWR(0xc9);
