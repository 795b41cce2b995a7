//! Stand-in for a known accessory whose vehicle data has not arrived yet.
//!
//! Replays the category and service layout recorded in the identity store
//! and reports itself unavailable, so the paired client keeps the accessory
//! until the live one replaces it.

use crate::hap::{AccessoryInfo, Category, Service, ServiceKind};
use crate::store::{AccessoryKey, AccessoryRecord};
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug)]
pub struct PlaceholderAccessory {
    aid: u64,
    key: AccessoryKey,
    display_name: String,
    category: Category,
    services: Vec<Service>,
}

impl PlaceholderAccessory {
    pub fn new(aid: u64, key: &AccessoryKey, record: &AccessoryRecord) -> Arc<Self> {
        let display_name = record
            .configured_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| key.to_string());
        let category = record
            .category
            .map_or(Category::Other, Category::from_code);

        let info = AccessoryInfo {
            name: display_name.clone(),
            ..AccessoryInfo::default()
        };
        let mut services = vec![info.service()];
        for name in record.services.iter().flatten() {
            match name.parse::<ServiceKind>() {
                Ok(ServiceKind::AccessoryInformation) => {}
                Ok(kind) => services.push(Service::new(kind)),
                Err(_) => warn!("[Placeholder] Skipping unknown service {:?} for {}", name, key),
            }
        }
        debug!(
            "[Placeholder] {} at aid {} ({} services)",
            display_name,
            aid,
            services.len()
        );

        Arc::new(Self {
            aid,
            key: key.clone(),
            display_name,
            category,
            services,
        })
    }

    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn key(&self) -> &AccessoryKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: Option<u16>, services: &[&str], name: Option<&str>) -> AccessoryRecord {
        AccessoryRecord {
            aid: Some(105),
            category,
            services: Some(services.iter().map(|s| s.to_string()).collect()),
            configured_name: name.map(str::to_string),
            ..AccessoryRecord::default()
        }
    }

    #[test]
    fn test_replays_recorded_layout() {
        let key = AccessoryKey::new("WVW123", "Charging");
        let placeholder = PlaceholderAccessory::new(
            105,
            &key,
            &record(Some(7), &["AccessoryInformation", "Outlet", "BatteryService"], None),
        );
        assert_eq!(placeholder.aid(), 105);
        assert_eq!(placeholder.category(), Category::Outlet);
        assert_eq!(placeholder.display_name(), "WVW123-Charging");
        let kinds: Vec<ServiceKind> = placeholder.services().iter().map(Service::kind).collect();
        assert_eq!(
            kinds,
            [
                ServiceKind::AccessoryInformation,
                ServiceKind::Outlet,
                ServiceKind::BatteryService
            ]
        );
    }

    #[test]
    fn test_configured_name_and_unknown_services() {
        let key = AccessoryKey::new("WVW123", "Locking");
        let placeholder = PlaceholderAccessory::new(
            101,
            &key,
            &record(None, &["LockMechanism", "Doorbell"], Some("Front door")),
        );
        assert_eq!(placeholder.display_name(), "Front door");
        assert_eq!(placeholder.category(), Category::Other);
        assert_eq!(placeholder.services().len(), 2);
    }
}
