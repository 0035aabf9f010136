//! Finding and preparing a VKMS device, and keeping track of the virtual
//! displays that were found.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::VkmsConfig;
use crate::modeset::PropertyCache;
use crate::result::{retry_on_race, Error, Result};
use crate::writeback::WritebackTopology;
use crate::{Card, Device, DrmFile, Version, WRITEBACK_CLIENT_CAPS};

/// An open VKMS card with the capabilities needed for writeback enabled.
pub struct VkmsClient<D: Device = DrmFile> {
    card: Card<D>,
    path: PathBuf,
    version: Version,
    race_retries: usize,
}

impl VkmsClient<DrmFile> {
    /// Scan `config.dri_dir` for the first device driven by
    /// `config.driver_name`.
    ///
    /// Entries that aren't character devices, or that turn out not to be
    /// DRM devices or to belong to some other driver, are skipped.
    pub fn find(config: &VkmsConfig) -> Result<Self> {
        let dir = &config.dri_dir;
        let entries = std::fs::read_dir(dir).map_err(|e| Error::Io {
            op: "readdir",
            errno: io_errno(&e),
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Io {
                op: "readdir",
                errno: io_errno(&e),
            })?;
            match entry.file_type() {
                Ok(t) if t.is_char_device() => paths.push(entry.path()),
                Ok(_) => debug!(path = ?entry.path(), "skipping non-device entry"),
                Err(e) => debug!(path = ?entry.path(), error = %e, "skipping unreadable entry"),
            }
        }
        paths.sort();

        for path in paths {
            match Self::open(&path, config) {
                Ok(client) => return Ok(client),
                Err(e) if e.is_skippable_during_discovery() => {
                    debug!(?path, error = %e, "skipping device");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::NoDevice { dir: dir.clone() })
    }

    pub fn open(path: impl AsRef<Path>, config: &VkmsConfig) -> Result<Self> {
        let path = path.as_ref();
        let card = Card::open(path)?;
        Self::from_card(card, path, config)
    }
}

impl<D: Device> VkmsClient<D> {
    /// Check the driver behind `card` and enable the client capabilities
    /// writeback needs.
    pub fn from_card(card: Card<D>, path: impl Into<PathBuf>, config: &VkmsConfig) -> Result<Self> {
        let path = path.into();
        let version = match retry_on_race(config.race_retries, || card.version()) {
            Ok(v) => v,
            Err(e) => {
                let _ = card.close();
                return Err(e);
            }
        };
        if version.name != config.driver_name {
            let _ = card.close();
            return Err(Error::DriverMismatch {
                expected: config.driver_name.clone(),
                found: version.name,
            });
        }
        for cap in WRITEBACK_CLIENT_CAPS {
            if let Err(e) = card.set_client_cap(cap, 1) {
                warn!(?path, error = %e, "device lacks a required capability");
                let _ = card.close();
                return Err(e);
            }
        }
        info!(
            ?path,
            driver = %version.name,
            major = version.major,
            minor = version.minor,
            "using device"
        );
        Ok(Self {
            card,
            path,
            version,
            race_retries: config.race_retries,
        })
    }

    pub fn card(&self) -> &Card<D> {
        &self.card
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Discover the writeback topology, retrying if the object graph changes
    /// underneath the queries.
    pub fn writeback(&self, cache: &mut PropertyCache) -> Result<WritebackTopology> {
        retry_on_race(self.race_retries, || {
            WritebackTopology::discover(&self.card, cache)
        })
    }

    pub fn into_card(self) -> Card<D> {
        self.card
    }

    pub fn close(self) -> Result<()> {
        self.card.close()
    }
}

fn io_errno(e: &std::io::Error) -> crate::result::Errno {
    linux_io::result::Error(e.raw_os_error().unwrap_or(5) as _)
}

/// A way of providing a virtual display.
pub trait VirtualDisplay {
    fn name(&self) -> &str;

    /// Higher is preferred.
    fn priority(&self) -> i32;
}

impl<D: Device> VirtualDisplay for VkmsClient<D> {
    fn name(&self) -> &str {
        "vkms"
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// The virtual displays available to the caller, owned by whoever set up
/// discovery.
#[derive(Default)]
pub struct DisplayRegistry {
    displays: Vec<Box<dyn VirtualDisplay>>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, d: Box<dyn VirtualDisplay>) {
        debug!(name = d.name(), priority = d.priority(), "virtual display registered");
        self.displays.push(d);
    }

    /// Look for a VKMS device and register it if there is one. Failing to
    /// find one is logged, not returned, since other displays may still be
    /// usable.
    pub fn discover_vkms(&mut self, config: &VkmsConfig) -> bool {
        match VkmsClient::find(config) {
            Ok(client) => {
                self.register(Box::new(client));
                true
            }
            Err(e) => {
                info!(error = %e, "no vkms device available");
                false
            }
        }
    }

    /// The highest-priority display; the earliest registered wins ties.
    pub fn best(&self) -> Option<&dyn VirtualDisplay> {
        let mut best: Option<&dyn VirtualDisplay> = None;
        for d in &self.displays {
            if best.map_or(true, |b| d.priority() > b.priority()) {
                best = Some(d.as_ref());
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn VirtualDisplay> + '_ {
        self.displays.iter().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }
}
