//! Setup flow for price level sensors
//!
//! A user picks one upstream entity. The flow checks that the entity is
//! known to the host and that no other entry already observes it, then
//! creates a config entry the sensor is built from.

use crate::config::SensorEntryConfig;
use crate::error::{PriceLevelError, Result};
use crate::host::EntityHost;
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DOMAIN: &str = "energy_price_level";
pub const CONF_SOURCE_SENSOR: &str = "source_sensor";

pub const STEP_USER: &str = "user";
pub const ERROR_SENSOR_NOT_FOUND: &str = "sensor_not_found";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Whether `entity_id` looks like `domain.object_id`
pub fn is_valid_entity_id(entity_id: &str) -> bool {
    let Some((domain, object_id)) = entity_id.split_once('.') else {
        return false;
    };
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with('_')
            && !part.ends_with('_')
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    valid_part(domain) && valid_part(object_id)
}

/// Unique id guarding against a second entry for the same upstream entity
pub fn source_unique_id(source_sensor: &str) -> String {
    format!("{}_{}", DOMAIN, source_sensor)
}

/// A configured price level sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub unique_id: String,
    pub title: String,
    pub version: u32,
    pub source_sensor: String,
}

impl ConfigEntry {
    fn for_source(entry_id: String, source_sensor: &str) -> Self {
        Self {
            entry_id,
            unique_id: source_unique_id(source_sensor),
            title: format!("Energy Price Level ({})", source_sensor),
            version: ConfigFlow::VERSION,
            source_sensor: source_sensor.to_string(),
        }
    }

    /// Rebuild an entry from the configuration file
    pub fn from_config(config: &SensorEntryConfig) -> Self {
        Self::for_source(config.entry_id.clone(), &config.source_sensor)
    }

    /// Form in which the entry is stored in the configuration file
    pub fn to_config(&self) -> SensorEntryConfig {
        SensorEntryConfig {
            entry_id: self.entry_id.clone(),
            source_sensor: self.source_sensor.clone(),
        }
    }
}

/// One field of the setup form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub required: bool,
    /// Entity selector restricted to this domain
    pub entity_domain: &'static str,
}

/// Result of a flow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    /// Show (or re-show) the form, with per-field error keys
    ShowForm {
        step_id: &'static str,
        fields: Vec<FormField>,
        errors: BTreeMap<String, String>,
    },
    /// A new entry was created
    CreateEntry(ConfigEntry),
    /// The flow stopped without creating anything
    Abort { reason: &'static str },
}

/// User input of the setup form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub source_sensor: String,
}

/// Setup flow holding the entries configured so far
pub struct ConfigFlow {
    entries: Vec<ConfigEntry>,
    logger: StructuredLogger,
}

impl ConfigFlow {
    pub const VERSION: u32 = 1;

    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self {
            entries,
            logger: get_logger("setup"),
        }
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn form_fields() -> Vec<FormField> {
        vec![FormField {
            name: CONF_SOURCE_SENSOR,
            required: true,
            entity_domain: "sensor",
        }]
    }

    fn show_form(errors: BTreeMap<String, String>) -> FlowResult {
        FlowResult::ShowForm {
            step_id: STEP_USER,
            fields: Self::form_fields(),
            errors,
        }
    }

    /// Handle the user step; without input the empty form is shown
    pub fn step_user(&mut self, host: &dyn EntityHost, input: Option<&UserInput>) -> FlowResult {
        let Some(input) = input else {
            return Self::show_form(BTreeMap::new());
        };

        match self.create_entry(host, &input.source_sensor) {
            Ok(entry) => FlowResult::CreateEntry(entry),
            Err(PriceLevelError::AlreadyConfigured { .. }) => FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            },
            Err(_) => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    CONF_SOURCE_SENSOR.to_string(),
                    ERROR_SENSOR_NOT_FOUND.to_string(),
                );
                Self::show_form(errors)
            }
        }
    }

    /// Validate `source_sensor` and register a new entry for it.
    ///
    /// The entity must be registered or currently have a state.
    pub fn create_entry(
        &mut self,
        host: &dyn EntityHost,
        source_sensor: &str,
    ) -> Result<ConfigEntry> {
        let source_sensor = source_sensor.trim();
        let known = is_valid_entity_id(source_sensor)
            && (host.is_registered(source_sensor) || host.get_entity(source_sensor).is_some());
        if !known {
            self.logger.warn(&format!("Sensor not found: {}", source_sensor));
            return Err(PriceLevelError::sensor_not_found(source_sensor));
        }

        let unique_id = source_unique_id(source_sensor);
        if self.entries.iter().any(|e| e.unique_id == unique_id) {
            return Err(PriceLevelError::already_configured(unique_id));
        }

        let entry_id = uuid::Uuid::new_v4().simple().to_string();
        let entry = ConfigEntry::for_source(entry_id, source_sensor);
        self.logger.info(&format!("Created entry {}", entry.title));
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Remove the entry with the given id
    pub fn remove_entry(&mut self, entry_id: &str) -> Option<ConfigEntry> {
        let pos = self.entries.iter().position(|e| e.entry_id == entry_id)?;
        Some(self.entries.remove(pos))
    }
}
