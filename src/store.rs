//! Identity store: durable accessory identifiers.
//!
//! Maps a `(VIN, capability)` key to the accessory id (`aid`) the host knows
//! the accessory by, together with cached metadata used to recreate
//! placeholders (category, service names) and per-accessory user settings
//! (configured name, display unit, ...).
//!
//! On disk this is one JSON object keyed by `"{VIN}-{Capability}"`:
//!
//! ```json
//! {
//!   "WVW123-Climatization": {
//!     "aid": 100,
//!     "category": 9,
//!     "services": ["Thermostat", "BatteryService"],
//!     "ConfiguredName": "Car climate",
//!     "TemperatureDisplayUnits": 0
//!   }
//! }
//! ```
//!
//! Identifiers below [`FIRST_DYNAMIC_AID`] are reserved for the bridge
//! itself. Once assigned, an `aid` never changes for its key, and the
//! counter only advances when an `aid` is actually assigned.

use crate::error::{BridgeError, Result};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// First identifier handed out to capability accessories.
pub const FIRST_DYNAMIC_AID: u64 = 100;

/// Record field names with a fixed meaning.
pub const FIELD_AID: &str = "aid";
pub const FIELD_CATEGORY: &str = "category";
pub const FIELD_SERVICES: &str = "services";
pub const FIELD_CONFIGURED_NAME: &str = "ConfiguredName";
/// Temperature display unit chosen in the client (0 Celsius, 1 Fahrenheit).
pub const FIELD_DISPLAY_UNITS: &str = "TemperatureDisplayUnits";

/// Composite key of a store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessoryKey {
    vin: String,
    capability: String,
}

impl AccessoryKey {
    pub fn new(vin: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            capability: capability.into(),
        }
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Parse the on-disk form `"{VIN}-{Capability}"`.
    ///
    /// Capability ids never contain `-`, so the last dash separates the parts.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.rsplit_once('-') {
            Some((vin, capability)) if !vin.is_empty() && !capability.is_empty() => {
                Ok(Self::new(vin, capability))
            }
            _ => Err(BridgeError::InvalidStoreKey(raw.to_string())),
        }
    }
}

impl std::fmt::Display for AccessoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.vin, self.capability)
    }
}

/// One persisted accessory entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(
        rename = "ConfiguredName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub configured_name: Option<String>,
    /// Capability-specific settings such as `TemperatureDisplayUnits`.
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

/// The identity store. Not internally synchronized: the bridge keeps it
/// behind the same lock as its accessory registry.
#[derive(Debug)]
pub struct IdentityStore {
    path: PathBuf,
    entries: BTreeMap<AccessoryKey, AccessoryRecord>,
    next_aid: u64,
}

impl IdentityStore {
    /// Create an empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            next_aid: FIRST_DYNAMIC_AID,
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store. Unreadable or malformed content
    /// is an error: silently starting over would reassign identifiers.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        let bytes = match fs::read(&store.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "[Store] No accessory config at {:?} (first run)",
                    store.path
                );
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };

        let raw: BTreeMap<String, AccessoryRecord> =
            serde_json::from_slice(&bytes).map_err(|source| BridgeError::StoreFormat {
                path: store.path.display().to_string(),
                source,
            })?;
        let mut owners: BTreeMap<u64, String> = BTreeMap::new();
        for (key, record) in raw {
            if let Some(aid) = record.aid
                && let Some(first) = owners.insert(aid, key.clone())
            {
                return Err(BridgeError::DuplicateAid {
                    path: store.path.display().to_string(),
                    aid,
                    first,
                    second: key,
                });
            }
            store.entries.insert(AccessoryKey::parse(&key)?, record);
        }
        store.next_aid = store
            .entries
            .values()
            .filter_map(|record| record.aid)
            .map(|aid| aid + 1)
            .fold(FIRST_DYNAMIC_AID, u64::max);

        info!(
            "[Store] Loaded {} accessories from {:?} (next aid {})",
            store.entries.len(),
            store.path,
            store.next_aid
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_aid(&self) -> u64 {
        self.next_aid
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `aid` for `key`, assigning the next free one if needed.
    ///
    /// A partial entry (settings written before the accessory existed) keeps
    /// its other fields.
    pub fn resolve_or_assign(&mut self, key: &AccessoryKey) -> u64 {
        let record = self.entries.entry(key.clone()).or_default();
        if let Some(aid) = record.aid {
            return aid;
        }
        let aid = self.next_aid;
        record.aid = Some(aid);
        self.next_aid += 1;
        info!("[Store] Assigned aid {} to {}", aid, key);
        aid
    }

    /// Lookup without side effects.
    pub fn get_existing(&self, key: &AccessoryKey) -> Option<u64> {
        self.entries.get(key).and_then(|record| record.aid)
    }

    pub fn record(&self, key: &AccessoryKey) -> Option<&AccessoryRecord> {
        self.entries.get(key)
    }

    /// All entries that already have an `aid`, ordered by key.
    pub fn assigned(&self) -> impl Iterator<Item = (&AccessoryKey, u64, &AccessoryRecord)> {
        self.entries
            .iter()
            .filter_map(|(key, record)| record.aid.map(|aid| (key, aid, record)))
    }

    /// Set a metadata field. Unknown keys get a partial entry.
    ///
    /// `aid` cannot be written this way; use [`IdentityStore::resolve_or_assign`].
    pub fn set_item<V: Serialize>(&mut self, key: &AccessoryKey, field: &str, value: V) -> Result<()> {
        if field == FIELD_AID {
            return Err(BridgeError::ReservedField(field.to_string()));
        }
        let value = serde_json::to_value(value)?;
        let record = self.entries.entry(key.clone()).or_default();
        match field {
            FIELD_CATEGORY => record.category = serde_json::from_value(value)?,
            FIELD_SERVICES => record.services = serde_json::from_value(value)?,
            FIELD_CONFIGURED_NAME => record.configured_name = serde_json::from_value(value)?,
            _ => {
                record.settings.insert(field.to_string(), value);
            }
        }
        Ok(())
    }

    /// Read a metadata field, if present and of the requested type.
    pub fn get_item<V: DeserializeOwned>(&self, key: &AccessoryKey, field: &str) -> Option<V> {
        let record = self.entries.get(key)?;
        let value = match field {
            FIELD_AID => serde_json::to_value(record.aid?).ok()?,
            FIELD_CATEGORY => serde_json::to_value(record.category?).ok()?,
            FIELD_SERVICES => serde_json::to_value(record.services.as_ref()?).ok()?,
            FIELD_CONFIGURED_NAME => serde_json::to_value(record.configured_name.as_ref()?).ok()?,
            _ => record.settings.get(field)?.clone(),
        };
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[Store] Ignoring {}.{}: {}", key, field, e);
                None
            }
        }
    }

    /// Write the store to disk, logging (not returning) failures.
    pub fn persist(&self) {
        if let Err(e) = self.save() {
            error!(
                "[Store] Failed to save accessory config to {:?}: {}",
                self.path, e
            );
        }
    }

    /// Write the store to disk via a temporary file and rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let document: BTreeMap<String, &AccessoryRecord> = self
            .entries
            .iter()
            .map(|(key, record)| (key.to_string(), record))
            .collect();
        let data = serde_json::to_vec_pretty(&document)?;

        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        info!(
            "[Store] Saved {} accessories to {:?}",
            self.entries.len(),
            self.path
        );
        Ok(())
    }
}
