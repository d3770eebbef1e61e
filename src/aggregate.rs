//! Per-hour price level breakdown
//!
//! Turns a daily average and the raw hourly price list reported by an
//! upstream entity into a level for every hour, plus the level of the
//! current hour. Pure: identical input yields identical output.

use crate::level::{PriceLevel, classify};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A normalized hourly price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyEntry {
    pub hour_index: usize,
    pub price: f64,
}

/// Level details recorded for one hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourLevel {
    pub level: PriceLevel,
    pub price: f64,
    /// Percentage of the daily average, rounded to one decimal
    pub percentage: f64,
}

/// Why an hourly entry produced no level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry carried no price at all (null or no price field)
    Missing,
    /// The entry carried something that is not a finite number
    Invalid,
}

/// An hourly entry left out of the breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub index: usize,
    pub reason: SkipReason,
    pub raw: Value,
}

/// Outcome of one aggregation pass
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevelResult {
    /// Levels keyed by hour index, ascending
    pub level_by_hour: BTreeMap<usize, HourLevel>,
    /// Level of the current hour; `None` leaves the published state untouched
    pub current_level: Option<PriceLevel>,
    pub daily_average: f64,
    pub current_hour: u32,
    pub skipped: Vec<SkippedEntry>,
}

impl PriceLevelResult {
    /// Ordered `"HH:00" -> {level, price, percentage}` mapping
    pub fn price_levels(&self) -> Map<String, Value> {
        self.level_by_hour
            .iter()
            .map(|(hour, entry)| {
                let mut detail = Map::new();
                detail.insert("level".to_string(), Value::from(entry.level.as_str()));
                detail.insert("price".to_string(), Value::from(entry.price));
                detail.insert("percentage".to_string(), Value::from(entry.percentage));
                (hour_label(*hour), Value::Object(detail))
            })
            .collect()
    }

    /// Entries that carried data which could not be parsed
    pub fn invalid_entries(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Invalid)
    }
}

/// Zero-padded `HH:00` label for an hour index
pub fn hour_label(hour: usize) -> String {
    format!("{:02}:00", hour)
}

/// Percentage of the daily average; a non-positive average pins it at 100
pub fn percentage_of_average(price: f64, daily_average: f64) -> f64 {
    if daily_average > 0.0 {
        (price / daily_average) * 100.0
    } else {
        100.0
    }
}

/// Round to one decimal on the exact binary value, ties to even
fn round1(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

fn parse_number(value: &Value) -> Result<f64, SkipReason> {
    let parsed = match value {
        Value::Null => return Err(SkipReason::Missing),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(SkipReason::Invalid),
    }
}

/// Extract the price carried by one raw entry.
///
/// Records prefer their `value` field and fall back to `price` when `value`
/// is absent or null; anything else is the price itself. A `value` of zero
/// is a real price: it does not fall back to `price` and the hour is kept.
pub fn extract_price(raw: &Value) -> Result<f64, SkipReason> {
    match raw {
        Value::Object(record) => {
            let field = record
                .get("value")
                .filter(|v| !v.is_null())
                .or_else(|| record.get("price"))
                .unwrap_or(&Value::Null);
            parse_number(field)
        }
        other => parse_number(other),
    }
}

/// Normalize raw entries into hourly prices, dropping unusable ones
pub fn normalize_entries(entries: &[Value]) -> (Vec<HourlyEntry>, Vec<SkippedEntry>) {
    let mut hourly = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for (index, raw) in entries.iter().enumerate() {
        match extract_price(raw) {
            Ok(price) => hourly.push(HourlyEntry {
                hour_index: index,
                price,
            }),
            Err(reason) => skipped.push(SkippedEntry {
                index,
                reason,
                raw: raw.clone(),
            }),
        }
    }
    (hourly, skipped)
}

/// Compute the level of every hour and pick the one for `current_hour`
pub fn aggregate(daily_average: f64, entries: &[Value], current_hour: u32) -> PriceLevelResult {
    let (hourly, mut skipped) = normalize_entries(entries);

    let mut level_by_hour = BTreeMap::new();
    let mut current_level = None;

    for entry in hourly {
        let percentage = percentage_of_average(entry.price, daily_average);
        // Finite prices can still overflow against a tiny average
        let Ok(level) = classify(percentage) else {
            skipped.push(SkippedEntry {
                index: entry.hour_index,
                reason: SkipReason::Invalid,
                raw: entries[entry.hour_index].clone(),
            });
            continue;
        };

        level_by_hour.insert(
            entry.hour_index,
            HourLevel {
                level,
                price: entry.price,
                percentage: round1(percentage),
            },
        );

        if entry.hour_index == current_hour as usize {
            current_level = Some(level);
        }
    }

    skipped.sort_by_key(|s| s.index);

    PriceLevelResult {
        level_by_hour,
        current_level,
        daily_average,
        current_hour,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn degenerate_average_pins_percentage() {
        let result = aggregate(0.0, &[json!(10)], 0);
        let hour = result.level_by_hour[&0];
        assert_eq!(hour.percentage, 100.0);
        assert_eq!(hour.level, PriceLevel::Normal);
        assert_eq!(result.current_level, Some(PriceLevel::Normal));

        let negative = aggregate(-5.0, &[json!(1000)], 0);
        assert_eq!(negative.level_by_hour[&0].percentage, 100.0);
    }

    #[test]
    fn record_field_preference() {
        assert_eq!(extract_price(&json!({"value": 1.5, "price": 9.0})), Ok(1.5));
        assert_eq!(extract_price(&json!({"price": 2.5})), Ok(2.5));
        assert_eq!(extract_price(&json!({"value": null, "price": 3.0})), Ok(3.0));
        assert_eq!(extract_price(&json!({"value": 0.0, "price": 3.0})), Ok(0.0));
        assert_eq!(extract_price(&json!({"start": "x"})), Err(SkipReason::Missing));
        assert_eq!(extract_price(&json!({"value": "abc"})), Err(SkipReason::Invalid));
    }

    #[test]
    fn scalar_forms() {
        assert_eq!(extract_price(&json!("0.25")), Ok(0.25));
        assert_eq!(extract_price(&json!(null)), Err(SkipReason::Missing));
        assert_eq!(extract_price(&json!("NaN")), Err(SkipReason::Invalid));
        assert_eq!(extract_price(&json!("inf")), Err(SkipReason::Invalid));
        assert_eq!(extract_price(&json!(true)), Err(SkipReason::Invalid));
        assert_eq!(extract_price(&json!([1.0])), Err(SkipReason::Invalid));
    }

    #[test]
    fn percentage_rounding() {
        let result = aggregate(3.0, &[json!(1.0)], 5);
        assert_eq!(result.level_by_hour[&0].percentage, 33.3);
        assert_eq!(result.current_level, None);
    }

    #[test]
    fn percentage_rounding_ties() {
        let result = aggregate(100.0, &[json!(0.25)], 0);
        assert_eq!(result.level_by_hour[&0].percentage, 0.2);

        let result = aggregate(100.0, &[json!(0.35)], 0);
        assert_eq!(result.level_by_hour[&0].percentage, 0.3);

        assert_eq!(round1(12.25), 12.2);
        assert_eq!(round1(12.75), 12.8);
    }

    #[test]
    fn overflowing_percentage_is_skipped() {
        let result = aggregate(1e-300, &[json!(1e300), json!(1e-300)], 0);
        assert!(!result.level_by_hour.contains_key(&0));
        assert_eq!(result.level_by_hour[&1].level, PriceLevel::Normal);
        assert_eq!(result.current_level, None);
        assert_eq!(result.invalid_entries().count(), 1);
    }

    #[test]
    fn labels_are_zero_padded_and_ordered() {
        let entries: Vec<Value> = (0..24).map(|h| json!(h as f64 + 1.0)).collect();
        let result = aggregate(12.0, &entries, 9);
        let labels: Vec<String> = result.price_levels().keys().cloned().collect();
        assert_eq!(labels.first().map(String::as_str), Some("00:00"));
        assert_eq!(labels.get(9).map(String::as_str), Some("09:00"));
        assert_eq!(labels.last().map(String::as_str), Some("23:00"));
    }
}
