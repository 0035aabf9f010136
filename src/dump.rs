//! A serializable snapshot of a card's whole mode-setting graph, for
//! offline inspection.

use serde::Serialize;
use tracing::debug;

use crate::modeset::{
    Blob, CardResources, ConnectorState, CrtcState, EncoderState, FramebufferInfo, ModeProp,
    ObjectId, PlaneState, PropertyCache, PropertyFlags, PropertyId,
};
use crate::result::{Error, Result};
use crate::{Card, Device, Version};

#[derive(Debug, Clone, Serialize)]
pub struct GraphDump {
    pub version: Version,
    pub resources: CardResources,
    pub connectors: Vec<ObjectDump<ConnectorState>>,
    pub encoders: Vec<EncoderState>,
    pub crtcs: Vec<ObjectDump<CrtcState>>,
    pub planes: Vec<ObjectDump<PlaneState>>,
    pub framebuffers: Vec<FramebufferInfo>,
}

/// An object's state together with its resolved properties.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectDump<T> {
    #[serde(flatten)]
    pub state: T,
    pub properties: Vec<PropertyDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyDump {
    pub id: PropertyId,
    pub name: String,
    pub flags: PropertyFlags,
    pub value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<Blob>,
}

impl GraphDump {
    pub fn collect<D: Device>(card: &Card<D>) -> Result<Self> {
        let mut cache = PropertyCache::new();
        let version = card.version()?;
        let resources = card.resources()?;

        let mut connectors = Vec::with_capacity(resources.connector_ids.len());
        for &id in &resources.connector_ids {
            let state = card.connector_state(id)?;
            let properties = resolve(card, &mut cache, &state.props)?;
            connectors.push(ObjectDump { state, properties });
        }

        let encoders = resources
            .encoder_ids
            .iter()
            .map(|&id| card.encoder_state(id))
            .collect::<Result<Vec<_>>>()?;

        let mut crtcs = Vec::with_capacity(resources.crtc_ids.len());
        for &id in &resources.crtc_ids {
            let state = card.crtc_state(id)?;
            let props = card.object_properties(id)?;
            let properties = resolve(card, &mut cache, &props.props)?;
            crtcs.push(ObjectDump { state, properties });
        }

        let mut planes = Vec::new();
        for id in card.plane_resources()? {
            let state = card.plane_state(id)?;
            let props = card.object_properties(ObjectId::Plane(id))?;
            let properties = resolve(card, &mut cache, &props.props)?;
            planes.push(ObjectDump { state, properties });
        }

        let mut framebuffers = Vec::with_capacity(resources.fb_ids.len());
        for &id in &resources.fb_ids {
            match card.framebuffer(id) {
                Ok(fb) => framebuffers.push(fb),
                // Framebuffers can disappear while we're looking.
                Err(Error::ObjectNotFound { .. }) => debug!(%id, "framebuffer vanished"),
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            version,
            resources,
            connectors,
            encoders,
            crtcs,
            planes,
            framebuffers,
        })
    }
}

fn resolve<D: Device>(
    card: &Card<D>,
    cache: &mut PropertyCache,
    props: &[ModeProp],
) -> Result<Vec<PropertyDump>> {
    let mut out = Vec::with_capacity(props.len());
    for prop in props {
        let meta = cache.get(card, prop.prop_id)?;
        let blob = card.property_blob(meta, prop.value)?;
        out.push(PropertyDump {
            id: meta.id,
            name: meta.name.clone(),
            flags: meta.flags,
            value: prop.value,
            enum_name: meta.enum_name(prop.value).map(str::to_string),
            blob,
        });
    }
    Ok(out)
}
