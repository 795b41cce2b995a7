//! User-visible accessory name.
//!
//! The `Name`/`ConfiguredName` pair starts from the persisted configured
//! name, falling back to the generated display name. Renames from a client
//! are persisted immediately; an empty name is ignored.

use super::context::StoreHandle;
use crate::hap::{CharValue, Characteristic, CharacteristicKind};
use crate::store::FIELD_CONFIGURED_NAME;
use log::{info, warn};
use std::sync::Arc;

pub struct NameProvider {
    name: Arc<Characteristic>,
    configured_name: Arc<Characteristic>,
}

impl NameProvider {
    pub fn new(display_name: &str, configured_name: Option<String>, store: StoreHandle) -> Self {
        let initial = configured_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| display_name.to_string());
        let name = Characteristic::with_value(CharacteristicKind::Name, initial.as_str());
        let configured = Characteristic::with_value(CharacteristicKind::ConfiguredName, initial);

        let name_for_write = name.clone();
        let configured_for_write = Arc::downgrade(&configured);
        configured.on_write(Arc::new(move |value: CharValue| match value.as_str() {
            Some(new_name) if !new_name.is_empty() => {
                info!("[Accessory] {} renamed to {:?}", store.key(), new_name);
                store.update(FIELD_CONFIGURED_NAME, new_name);
                name_for_write.set_value(new_name);
            }
            _ => {
                warn!("[Accessory] Ignoring empty name for {}", store.key());
                if let Some(configured) = configured_for_write.upgrade() {
                    configured.set_value(name_for_write.get());
                }
            }
        }));

        Self {
            name,
            configured_name: configured,
        }
    }

    pub fn name(&self) -> &Arc<Characteristic> {
        &self.name
    }

    pub fn configured_name(&self) -> &Arc<Characteristic> {
        &self.configured_name
    }

    pub fn current(&self) -> String {
        self.name.get().as_str().unwrap_or_default().to_string()
    }
}
