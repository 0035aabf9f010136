//! Attaching a writeback connector to the CRTC that is already driving a
//! display, so that each composited frame is also written into memory.

use tracing::{debug, info};

use crate::modeset::{
    CardResources, ConnectorId, ConnectorState, ConnectorType, CrtcId, CrtcState, PropertyCache,
    SetCrtc, WritebackTarget, FB_ID_RETAIN,
};
use crate::result::{Error, ObjectKind, Result};
use crate::{Card, Device};

pub const CRTC_ID_PROP: &str = "CRTC_ID";
pub const WRITEBACK_FB_ID_PROP: &str = "WRITEBACK_FB_ID";

/// The first connector, in kernel order, whose type is
/// [`ConnectorType::Writeback`].
pub fn find_writeback_connector<D: Device>(
    card: &Card<D>,
    resources: &CardResources,
) -> Result<ConnectorState> {
    for &id in &resources.connector_ids {
        let connector = card.connector_state(id)?;
        if connector.connector_type == ConnectorType::Writeback {
            debug!(%id, "found writeback connector");
            return Ok(connector);
        }
    }
    Err(Error::NoWritebackConnector)
}

/// Guess which CRTC is currently driving the display.
///
/// This walks the encoders in the order the kernel lists them and picks the
/// CRTC of the first one that is bound to any CRTC at all. With more than one
/// active head the choice is arbitrary; there is no attempt to prefer one
/// output over another.
pub fn find_active_crtc<D: Device>(card: &Card<D>, resources: &CardResources) -> Result<CrtcState> {
    for &id in &resources.encoder_ids {
        let encoder = card.encoder_state(id)?;
        if encoder.current_crtc_id.0 != 0 {
            debug!(encoder = %id, crtc = %encoder.current_crtc_id, "found active crtc");
            return card.crtc_state(encoder.current_crtc_id);
        }
    }
    Err(Error::NoActiveCrtc)
}

/// The CRTC `connector` is bound to according to its `CRTC_ID` property.
/// `CrtcId(0)` means unbound.
pub fn current_crtc<D: Device>(
    card: &Card<D>,
    cache: &mut PropertyCache,
    connector: &ConnectorState,
) -> Result<CrtcId> {
    match cache.find_by_name(card, &connector.props, CRTC_ID_PROP)? {
        Some((_, value)) => Ok(CrtcId(value as u32)),
        None => Err(Error::ObjectNotFound {
            kind: ObjectKind::Property,
            id: 0,
        }),
    }
}

/// What [`WritebackTopology::attach`] would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachPlan {
    AlreadyAttached,
    SetCrtc(SetCrtc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The writeback connector was already driven by the active CRTC; no
    /// request was sent.
    AlreadyAttached,
    Attached,
}

/// A snapshot of the parts of the mode graph that matter for writeback.
#[derive(Debug, Clone)]
pub struct WritebackTopology {
    writeback: ConnectorState,
    crtc: CrtcState,
    bindings: Vec<(ConnectorId, CrtcId)>,
}

impl WritebackTopology {
    pub fn discover<D: Device>(card: &Card<D>, cache: &mut PropertyCache) -> Result<Self> {
        let resources = card.resources()?;
        let writeback = find_writeback_connector(card, &resources)?;
        let crtc = find_active_crtc(card, &resources)?;

        let mut bindings = Vec::with_capacity(resources.connector_ids.len());
        for &id in &resources.connector_ids {
            let connector = if id == writeback.id {
                writeback.clone()
            } else {
                card.connector_state(id)?
            };
            bindings.push((id, current_crtc(card, cache, &connector)?));
        }

        info!(
            writeback = %writeback.id,
            crtc = %crtc.crtc_id,
            connectors = bindings.len(),
            "writeback topology discovered"
        );
        Ok(Self {
            writeback,
            crtc,
            bindings,
        })
    }

    pub fn writeback_connector(&self) -> &ConnectorState {
        &self.writeback
    }

    pub fn active_crtc(&self) -> &CrtcState {
        &self.crtc
    }

    /// Connectors currently bound to the active CRTC, in kernel order.
    pub fn connectors_on_active_crtc(&self) -> Vec<ConnectorId> {
        self.bindings
            .iter()
            .filter(|(_, crtc)| *crtc == self.crtc.crtc_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn plan_attach(&self) -> AttachPlan {
        let mut connectors = self.connectors_on_active_crtc();
        if connectors.contains(&self.writeback.id) {
            return AttachPlan::AlreadyAttached;
        }
        connectors.push(self.writeback.id);

        let mut req = SetCrtc::from_state(&self.crtc);
        req.fb_id = FB_ID_RETAIN;
        req.connectors = connectors;
        AttachPlan::SetCrtc(req)
    }

    /// Add the writeback connector to the active CRTC alongside whatever
    /// connectors it already drives.
    pub fn attach<D: Device>(&self, card: &Card<D>) -> Result<AttachOutcome> {
        match self.plan_attach() {
            AttachPlan::AlreadyAttached => {
                debug!(writeback = %self.writeback.id, "writeback connector already attached");
                Ok(AttachOutcome::AlreadyAttached)
            }
            AttachPlan::SetCrtc(req) => {
                card.set_crtc(&req)?;
                info!(
                    writeback = %self.writeback.id,
                    crtc = %req.crtc_id,
                    connectors = ?req.connectors,
                    "writeback connector attached"
                );
                Ok(AttachOutcome::Attached)
            }
        }
    }

    /// Ask the writeback connector to capture the next frame into `target`.
    ///
    /// The kernel clears `WRITEBACK_FB_ID` after each job, so this has to be
    /// repeated for every frame.
    pub fn trigger<D: Device>(
        &self,
        card: &Card<D>,
        cache: &mut PropertyCache,
        target: &WritebackTarget,
    ) -> Result<()> {
        let prop = match cache.find_by_name(card, &self.writeback.props, WRITEBACK_FB_ID_PROP)? {
            Some((meta, _)) => meta.id,
            None => {
                return Err(Error::ObjectNotFound {
                    kind: ObjectKind::Property,
                    id: 0,
                })
            }
        };
        card.set_object_property(
            self.writeback.id,
            prop,
            target.framebuffer_id().0 as u64,
        )
    }
}
