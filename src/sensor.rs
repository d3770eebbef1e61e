//! Price level sensor
//!
//! Observes one upstream price entity. On every change it reads the daily
//! average from the upstream state and the hourly prices from its
//! attributes, aggregates them, and publishes the level of the current hour
//! together with the full per-hour breakdown.

use crate::aggregate::{PriceLevelResult, SkipReason, aggregate};
use crate::config::HourZone;
use crate::error::{PriceLevelError, Result};
use crate::host::{EntityHost, SensorState, StateChanged, StateStore, Subscription};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::setup::{ConfigEntry, DOMAIN};
use chrono::{Local, Timelike, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;

/// Attribute keys that may carry the hourly price list, in priority order
pub const HOURLY_PRICE_KEYS: [&str; 4] = ["raw_today", "today", "prices_today", "hourly_prices"];

pub const ATTR_SOURCE_SENSOR: &str = "source_sensor";
pub const ATTR_DAILY_AVERAGE: &str = "daily_average";
pub const ATTR_PRICE_LEVELS: &str = "price_levels";
pub const ATTR_CURRENT_HOUR: &str = "current_hour";

/// Display name of every price level sensor
pub const SENSOR_NAME: &str = "Price Level";

/// Source of the wall-clock hour used to pick the current level
pub trait HourSource: Send + Sync {
    fn current_hour(&self) -> u32;
}

impl HourSource for HourZone {
    fn current_hour(&self) -> u32 {
        match self {
            HourZone::Local => Local::now().hour(),
            HourZone::Named(tz) => Utc::now().with_timezone(tz).hour(),
        }
    }
}

/// A clock stuck at one hour
#[derive(Debug, Clone, Copy)]
pub struct FixedHour(pub u32);

impl HourSource for FixedHour {
    fn current_hour(&self) -> u32 {
        self.0
    }
}

/// First recognized hourly price attribute, even when its value is unusable
pub fn find_hourly_prices(attributes: &Map<String, Value>) -> Option<(&'static str, &Value)> {
    HOURLY_PRICE_KEYS
        .iter()
        .find_map(|key| attributes.get(*key).map(|value| (*key, value)))
}

/// Parse an upstream state as the daily average
pub fn parse_daily_average(state: &str) -> Option<f64> {
    state
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Entity id under which the sensor for `source_sensor` is published
pub fn published_entity_id(source_sensor: &str) -> String {
    let object_id = source_sensor
        .split_once('.')
        .map_or(source_sensor, |(_, object_id)| object_id);
    format!("sensor.{}_{}", DOMAIN, object_id)
}

enum Wake {
    Change(Option<StateChanged>),
    Shutdown { closed: bool },
}

/// Reactive price level sensor bound to one upstream entity
pub struct PriceLevelSensor {
    unique_id: String,
    entity_id: String,
    source_sensor: String,
    state: Option<String>,
    attributes: Map<String, Value>,
    host: Arc<dyn EntityHost>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn HourSource>,
    subscription: Option<Subscription>,
    logger: StructuredLogger,
}

impl PriceLevelSensor {
    /// Create the sensor for a config entry
    pub fn new(
        entry: &ConfigEntry,
        host: Arc<dyn EntityHost>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn HourSource>,
    ) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("sensor")
                .with_source_sensor(&entry.source_sensor)
                .with_field("entry_id", entry.entry_id.clone()),
        );
        Self {
            unique_id: format!("{}_{}", DOMAIN, entry.entry_id),
            entity_id: published_entity_id(&entry.source_sensor),
            source_sensor: entry.source_sensor.clone(),
            state: None,
            attributes: Map::new(),
            host,
            store,
            clock,
            subscription: None,
            logger,
        }
    }

    pub fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn source_sensor(&self) -> &str {
        &self.source_sensor
    }

    /// Current level label, `None` while unknown
    pub fn native_value(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn extra_state_attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    fn sensor_state(&self) -> SensorState {
        SensorState {
            state: self.state.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Restore the last persisted value, subscribe to the upstream entity
    /// and run the first update.
    pub fn added_to_host(&mut self) {
        if let Some(last) = self.store.restore_last(&self.unique_id) {
            self.logger.debug(&format!(
                "Restored last state {}",
                last.state.as_deref().unwrap_or("unknown")
            ));
            self.state = last.state;
            self.attributes = last.attributes;
        }

        self.subscription = Some(self.host.on_change(&self.source_sensor));
        self.refresh();
    }

    /// Drop the upstream subscription
    pub fn will_remove_from_host(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            self.logger.debug("Unsubscribed from source sensor");
        }
    }

    /// React to a change notification of the upstream entity
    pub fn handle_change(&mut self, change: &StateChanged) {
        if change.entity_id != self.source_sensor {
            return;
        }
        self.refresh();
    }

    /// Update from the source and log why nothing changed, if so
    pub fn refresh(&mut self) -> Option<PriceLevelResult> {
        match self.update_from_source() {
            Ok(result) => Some(result),
            Err(e) => {
                self.logger.warn(&e.to_string());
                None
            }
        }
    }

    /// Recompute the breakdown from the current upstream state.
    ///
    /// A missing entity, an unparseable state or absent hourly price
    /// attributes abort the update and keep the previous output.
    pub fn update_from_source(&mut self) -> Result<PriceLevelResult> {
        let source = self
            .host
            .get_entity(&self.source_sensor)
            .ok_or_else(|| PriceLevelError::upstream_missing(self.source_sensor.as_str()))?;

        let daily_average = parse_daily_average(&source.state).ok_or_else(|| {
            PriceLevelError::upstream_value_invalid(
                self.source_sensor.as_str(),
                source.state.as_str(),
            )
        })?;

        let (key, hourly_prices) = find_hourly_prices(&source.attributes).ok_or_else(|| {
            PriceLevelError::upstream_attributes_missing(self.source_sensor.as_str())
        })?;

        let entries: &[Value] = match hourly_prices {
            Value::Array(entries) => entries,
            other => {
                self.logger.warn(&format!(
                    "Attribute {} of source sensor is not a list: {}",
                    key, other
                ));
                &[]
            }
        };

        let current_hour = self.clock.current_hour();
        let result = aggregate(daily_average, entries, current_hour);

        for skipped in &result.skipped {
            if skipped.reason == SkipReason::Invalid {
                self.logger.warn(&format!(
                    "Invalid price data at index {}: {}",
                    skipped.index, skipped.raw
                ));
            }
        }

        if let Some(level) = result.current_level {
            self.state = Some(level.as_str().to_string());
        } else {
            self.logger.debug(&format!(
                "No price for hour {}, keeping state {}",
                current_hour,
                self.state.as_deref().unwrap_or("unknown")
            ));
        }

        let mut attributes = Map::new();
        attributes.insert(
            ATTR_SOURCE_SENSOR.to_string(),
            Value::from(self.source_sensor.clone()),
        );
        attributes.insert(ATTR_DAILY_AVERAGE.to_string(), Value::from(daily_average));
        attributes.insert(
            ATTR_PRICE_LEVELS.to_string(),
            Value::Object(result.price_levels()),
        );
        attributes.insert(ATTR_CURRENT_HOUR.to_string(), Value::from(current_hour));
        self.attributes = attributes;

        self.write_state();
        Ok(result)
    }

    fn write_state(&self) {
        let state = self.sensor_state();
        self.host.publish(&self.entity_id, &state);
        if let Err(e) = self.store.persist_last(&self.unique_id, &state) {
            self.logger.warn(&format!("Failed to persist last state: {}", e));
        }
    }

    /// Drive the sensor until the shutdown flag flips or the host goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.added_to_host();
        self.logger.info(&format!("Tracking {}", self.entity_id));

        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                break;
            };
            let wake = tokio::select! {
                change = subscription.recv() => Wake::Change(change),
                changed = shutdown.changed() => Wake::Shutdown {
                    closed: changed.is_err(),
                },
            };
            match wake {
                Wake::Change(Some(change)) => self.handle_change(&change),
                Wake::Change(None) => break,
                Wake::Shutdown { closed } => {
                    if closed || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.will_remove_from_host();
        self.logger.info("Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hourly_key_priority() {
        let attrs = json!({"hourly_prices": [1], "today": [2], "prices_today": [3]});
        let (key, value) = find_hourly_prices(attrs.as_object().unwrap()).unwrap();
        assert_eq!(key, "today");
        assert_eq!(value, &json!([2]));

        let attrs = json!({"raw_today": [], "today": [2]});
        let (key, _) = find_hourly_prices(attrs.as_object().unwrap()).unwrap();
        assert_eq!(key, "raw_today");

        let attrs = json!({"tomorrow": [1]});
        assert!(find_hourly_prices(attrs.as_object().unwrap()).is_none());
    }

    #[test]
    fn daily_average_parsing() {
        assert_eq!(parse_daily_average("0.245"), Some(0.245));
        assert_eq!(parse_daily_average(" 12 "), Some(12.0));
        assert_eq!(parse_daily_average("unavailable"), None);
        assert_eq!(parse_daily_average("nan"), None);
        assert_eq!(parse_daily_average(""), None);
    }

    #[test]
    fn entity_id_derivation() {
        assert_eq!(
            published_entity_id("sensor.nordpool_kwh_nl"),
            "sensor.energy_price_level_nordpool_kwh_nl"
        );
        assert_eq!(published_entity_id("bare"), "sensor.energy_price_level_bare");
    }

    #[test]
    fn fixed_hour_clock() {
        assert_eq!(FixedHour(7).current_hour(), 7);
        assert!(HourZone::Local.current_hour() < 24);
    }
}
