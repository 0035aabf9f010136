use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::{BlobId, ObjectId, PropertyId};
use crate::result::{check_count, Error, ObjectKind, Result};
use crate::{ioctl, Card, Device};

/// A property ID paired with the value it currently has on some object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeProp {
    pub prop_id: PropertyId,
    pub value: u64,
}

/// The raw flag word of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PropertyFlags(pub u32);

impl PropertyFlags {
    pub const PENDING: Self = Self(ioctl::DRM_MODE_PROP_PENDING);
    pub const RANGE: Self = Self(ioctl::DRM_MODE_PROP_RANGE);
    pub const IMMUTABLE: Self = Self(ioctl::DRM_MODE_PROP_IMMUTABLE);
    pub const ENUM: Self = Self(ioctl::DRM_MODE_PROP_ENUM);
    pub const BLOB: Self = Self(ioctl::DRM_MODE_PROP_BLOB);
    pub const BITMASK: Self = Self(ioctl::DRM_MODE_PROP_BITMASK);
    pub const OBJECT: Self = Self(ioctl::DRM_MODE_PROP_OBJECT);
    pub const SIGNED_RANGE: Self = Self(ioctl::DRM_MODE_PROP_SIGNED_RANGE);
    pub const ATOMIC: Self = Self(ioctl::DRM_MODE_PROP_ATOMIC);

    /// Whether all bits of `other` are set.
    ///
    /// The extended types (object, signed range) are numbered rather than
    /// single bits, so they are compared as a field.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        if (other.0 & ioctl::DRM_MODE_PROP_EXTENDED_TYPE) != 0 {
            return (self.0 & ioctl::DRM_MODE_PROP_EXTENDED_TYPE) == other.0;
        }
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn property_type(self) -> PropertyType {
        PropertyType::from_raw_flags(self.0)
    }

    #[inline]
    pub fn is_immutable(self) -> bool {
        self.contains(Self::IMMUTABLE)
    }

    /// Whether the kernel will report an enum table for this property.
    #[inline]
    pub fn has_enum_table(self) -> bool {
        self.contains(Self::ENUM) || self.contains(Self::BITMASK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
#[repr(u32)]
pub enum PropertyType {
    Unknown = 0,
    Range = ioctl::DRM_MODE_PROP_RANGE,
    Enum = ioctl::DRM_MODE_PROP_ENUM,
    Blob = ioctl::DRM_MODE_PROP_BLOB,
    Bitmask = ioctl::DRM_MODE_PROP_BITMASK,
    Object = ioctl::DRM_MODE_PROP_OBJECT,
    SignedRange = ioctl::DRM_MODE_PROP_SIGNED_RANGE,
}

impl PropertyType {
    pub fn from_raw_flags(flags: u32) -> Self {
        let type_raw =
            flags & (ioctl::DRM_MODE_PROP_LEGACY_TYPE | ioctl::DRM_MODE_PROP_EXTENDED_TYPE);
        match type_raw {
            ioctl::DRM_MODE_PROP_RANGE => Self::Range,
            ioctl::DRM_MODE_PROP_ENUM => Self::Enum,
            ioctl::DRM_MODE_PROP_BLOB => Self::Blob,
            ioctl::DRM_MODE_PROP_BITMASK => Self::Bitmask,
            ioctl::DRM_MODE_PROP_OBJECT => Self::Object,
            ioctl::DRM_MODE_PROP_SIGNED_RANGE => Self::SignedRange,
            _ => Self::Unknown,
        }
    }
}

/// One named member of an enum or bitmask property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyEnumMember {
    pub value: u64,
    pub name: String,
}

impl From<ioctl::DrmModePropertyEnum> for PropertyEnumMember {
    fn from(raw: ioctl::DrmModePropertyEnum) -> Self {
        Self {
            value: raw.value,
            name: crate::c_bytes_to_string(&raw.name),
        }
    }
}

/// Everything `GETPROPERTY` reports about a property.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyMeta {
    pub id: PropertyId,
    pub name: String,
    pub flags: PropertyFlags,
    /// For ranges, the minimum and maximum. For enums and bitmasks, the
    /// valid member values.
    pub values: Vec<u64>,
    /// Only populated for enum and bitmask properties.
    pub enum_members: Vec<PropertyEnumMember>,
}

impl PropertyMeta {
    #[inline]
    pub fn property_type(&self) -> PropertyType {
        self.flags.property_type()
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.flags.is_immutable()
    }

    #[inline]
    pub fn is_blob(&self) -> bool {
        self.flags.contains(PropertyFlags::BLOB)
    }

    /// The name of the enum member with the given value, if any.
    pub fn enum_name(&self, value: u64) -> Option<&str> {
        self.enum_members
            .iter()
            .find(|m| m.value == value)
            .map(|m| m.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blob {
    pub id: BlobId,
    pub data: Vec<u8>,
}

/// The properties attached to one object, as reported by
/// `OBJ_GETPROPERTIES`.
#[derive(Debug, Clone)]
pub struct ObjectProperties {
    pub object: ObjectId,
    pub props: Vec<ModeProp>,
}

impl ObjectProperties {
    pub fn value(&self, id: PropertyId) -> Option<u64> {
        self.props.iter().find(|p| p.prop_id == id).map(|p| p.value)
    }
}

impl<D: Device> Card<D> {
    pub fn property_meta(&self, id: PropertyId) -> Result<PropertyMeta> {
        let mut sizes = ioctl::DrmModeGetProperty::zeroed();
        sizes.prop_id = id.0;
        // Safety: no buffers attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETPROPERTY, &mut sizes) }
            .map_err(Error::lookup("getproperty", ObjectKind::Property, id.0))?;

        let flags = PropertyFlags(sizes.flags);
        let n_values = sizes.count_values();
        let n_enums = if flags.has_enum_table() {
            sizes.count_enum_blobs()
        } else {
            0
        };
        let mut values = vec![0_u64; n_values as usize];
        let mut enums = vec![ioctl::DrmModePropertyEnum::zeroed(); n_enums as usize];

        if n_values != 0 || n_enums != 0 {
            let mut fill = ioctl::DrmModeGetProperty::zeroed();
            fill.prop_id = id.0;
            // Safety: both buffers outlive the call and match their counts.
            unsafe {
                if n_values != 0 {
                    fill.set_values_ptr(values.as_mut_ptr(), n_values);
                }
                if n_enums != 0 {
                    fill.set_enum_blob_ptr(enums.as_mut_ptr(), n_enums);
                }
                self.ioctl(ioctl::DRM_IOCTL_MODE_GETPROPERTY, &mut fill)
            }
            .map_err(Error::lookup("getproperty", ObjectKind::Property, id.0))?;

            check_count("property values", n_values as usize, fill.count_values() as usize)?;
            check_count(
                "property enums",
                n_enums as usize,
                fill.count_enum_blobs() as usize,
            )?;
        }

        Ok(PropertyMeta {
            id,
            name: crate::c_bytes_to_string(&sizes.name),
            flags,
            values,
            enum_members: enums.into_iter().map(PropertyEnumMember::from).collect(),
        })
    }

    /// Fetch the payload of a property blob.
    pub fn blob(&self, id: BlobId) -> Result<Blob> {
        let mut sizes = ioctl::DrmModeGetBlob::zeroed();
        sizes.blob_id = id.0;
        // Safety: no buffer attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_GETPROPBLOB, &mut sizes) }
            .map_err(Error::lookup("getpropblob", ObjectKind::Blob, id.0))?;

        let len = sizes.length();
        let mut data = vec![0_u8; len as usize];
        if len != 0 {
            let mut fill = ioctl::DrmModeGetBlob::zeroed();
            fill.blob_id = id.0;
            // Safety: data outlives the call and is len bytes long.
            unsafe {
                fill.set_data_ptr(data.as_mut_ptr(), len);
                self.ioctl(ioctl::DRM_IOCTL_MODE_GETPROPBLOB, &mut fill)
            }
            .map_err(Error::lookup("getpropblob", ObjectKind::Blob, id.0))?;
            check_count("blob length", len as usize, fill.length() as usize)?;
        }
        Ok(Blob { id, data })
    }

    /// Fetch the blob referenced by `value` if `meta` describes a blob
    /// property.
    ///
    /// A value of zero means "no blob", so this returns `Ok(None)` without
    /// talking to the kernel in that case, as it does for non-blob
    /// properties.
    pub fn property_blob(&self, meta: &PropertyMeta, value: u64) -> Result<Option<Blob>> {
        if !meta.is_blob() || value == 0 {
            return Ok(None);
        }
        let id = u32::try_from(value).map_err(|_| Error::ObjectNotFound {
            kind: ObjectKind::Blob,
            id: u32::MAX,
        })?;
        self.blob(BlobId(id)).map(Some)
    }

    /// The properties attached to any kind of mode object.
    pub fn object_properties(&self, object: impl Into<ObjectId>) -> Result<ObjectProperties> {
        let object = object.into();
        let (obj_type, obj_id) = object.as_raw_type_and_id();

        let mut sizes = ioctl::DrmModeObjGetProperties::zeroed();
        sizes.obj_id = obj_id;
        sizes.obj_type = obj_type;
        // Safety: no buffers attached.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES, &mut sizes) }
            .map_err(Error::lookup("obj_getproperties", object.kind(), obj_id))?;

        let count = sizes.count_props();
        let mut ids = vec![0_u32; count as usize];
        let mut values = vec![0_u64; count as usize];
        if count != 0 {
            let mut fill = ioctl::DrmModeObjGetProperties::zeroed();
            fill.obj_id = obj_id;
            fill.obj_type = obj_type;
            // Safety: both buffers outlive the call and hold count items.
            unsafe {
                fill.set_prop_ptrs(ids.as_mut_ptr(), values.as_mut_ptr(), count);
                self.ioctl(ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES, &mut fill)
            }
            .map_err(Error::lookup("obj_getproperties", object.kind(), obj_id))?;
            check_count("object props", count as usize, fill.count_props() as usize)?;
        }

        Ok(ObjectProperties {
            object,
            props: ids
                .into_iter()
                .zip(values)
                .map(|(id, value)| ModeProp {
                    prop_id: PropertyId(id),
                    value,
                })
                .collect(),
        })
    }

    /// Set a connector property through the legacy connector-only request.
    pub fn set_connector_property(
        &self,
        connector: super::ConnectorId,
        prop: PropertyId,
        value: u64,
    ) -> Result<()> {
        let mut tmp = ioctl::DrmModeConnectorSetProperty {
            value,
            prop_id: prop.0,
            connector_id: connector.0,
        };
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_SETPROPERTY, &mut tmp) }
            .map_err(Error::lookup("setproperty", ObjectKind::Connector, connector.0))?;
        debug!(%connector, %prop, value, "connector property set");
        Ok(())
    }

    pub fn set_object_property(
        &self,
        object: impl Into<ObjectId>,
        prop: PropertyId,
        value: u64,
    ) -> Result<()> {
        let object = object.into();
        let (obj_type, obj_id) = object.as_raw_type_and_id();
        let mut tmp = ioctl::DrmModeObjSetProperty {
            value,
            prop_id: prop.0,
            obj_id,
            obj_type,
        };
        // Safety: no pointers.
        unsafe { self.ioctl(ioctl::DRM_IOCTL_MODE_OBJ_SETPROPERTY, &mut tmp) }
            .map_err(Error::lookup("obj_setproperty", object.kind(), obj_id))?;
        debug!(?object, %prop, value, "object property set");
        Ok(())
    }
}

/// Memoizes [`PropertyMeta`] by ID for one card.
///
/// Property IDs are stable for as long as the device stays open, so a cache
/// must not outlive the card it was filled from.
#[derive(Debug, Default)]
pub struct PropertyCache {
    metas: HashMap<PropertyId, PropertyMeta>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<D: Device>(&mut self, card: &Card<D>, id: PropertyId) -> Result<&PropertyMeta> {
        match self.metas.entry(id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(card.property_meta(id)?)),
        }
    }

    /// Find the property called `name` among `props`, returning its
    /// metadata and current value.
    pub fn find_by_name<D: Device>(
        &mut self,
        card: &Card<D>,
        props: &[ModeProp],
        name: &str,
    ) -> Result<Option<(&PropertyMeta, u64)>> {
        for prop in props {
            self.get(card, prop.prop_id)?;
        }
        Ok(props.iter().find_map(|prop| {
            let meta = self.metas.get(&prop.prop_id)?;
            (meta.name == name).then_some((meta, prop.value))
        }))
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}
