use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One usage event as stored locally and exchanged in export bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: String,
    pub message_uuid: String,
    pub timestamp: String,
    #[serde(default)]
    pub model: Option<String>,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub date: String,
}

impl UsageRecord {
    /// Calendar date (`YYYY-MM-DD`) of the record, derived from the timestamp
    /// when the stored date is blank.
    pub fn record_date(&self) -> &str {
        if self.date.is_empty() {
            self.timestamp.get(..10).unwrap_or(&self.timestamp)
        } else {
            &self.date
        }
    }

    /// The record's calendar day. Accepts unpadded and slash-separated
    /// dates and falls back to the timestamp's UTC day.
    pub fn canonical_date(&self) -> Option<NaiveDate> {
        parse_loose_date(self.date.trim()).or_else(|| {
            DateTime::parse_from_rfc3339(self.timestamp.trim())
                .map(|ts| ts.with_timezone(&Utc).date_naive())
                .ok()
                .or_else(|| parse_loose_date(self.timestamp.get(..10)?))
        })
    }

    pub fn year(&self) -> &str {
        self.record_date().get(..4).unwrap_or("")
    }

    /// `YYYY-MM` of the record date.
    pub fn year_month(&self) -> &str {
        self.record_date().get(..7).unwrap_or("")
    }
}

fn parse_loose_date(value: &str) -> Option<NaiveDate> {
    let value = value.get(..10).filter(|head| !head.contains('T')).unwrap_or(value);
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRange {
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

impl DataRange {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        Self {
            oldest: records.first().map(|record| record.record_date().to_string()),
            newest: records.last().map(|record| record.record_date().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStatistics {
    pub total_records: u64,
    #[serde(default)]
    pub total_sessions: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
}

impl BundleStatistics {
    /// Aggregates over exactly the given records; cost uses the first price
    /// whose pattern matches each record's model.
    pub fn from_records(records: &[UsageRecord], prices: &[ModelPrice]) -> Self {
        let mut stats = Self::default();
        let mut sessions = HashSet::new();
        let mut cost = 0.0;
        for record in records {
            stats.total_records += 1;
            stats.total_tokens += record.total_tokens;
            stats.input_tokens += record.input_tokens;
            stats.output_tokens += record.output_tokens;
            stats.cache_creation_tokens += record.cache_creation_tokens;
            stats.cache_read_tokens += record.cache_read_tokens;
            sessions.insert(record.session_id.as_str());
            if let Some(price) = record
                .model
                .as_deref()
                .and_then(|model| price_for_model(prices, model))
            {
                cost += compute_record_cost(record, price);
            }
        }
        stats.total_sessions = sessions.len() as u64;
        stats.total_cost = (cost * 100.0).round() / 100.0;
        stats
    }
}

/// A serialized slice of one machine's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub machine_name: String,
    pub export_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    pub data_range: DataRange,
    pub records: Vec<UsageRecord>,
    pub statistics: BundleStatistics,
}

impl ExportBundle {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Per-million-token prices for a model name or wildcard pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub model_pattern: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cache_write_per_1m: f64,
    pub cache_read_per_1m: f64,
}

pub fn model_matches_pattern(model: &str, pattern: &str) -> bool {
    let model = model.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return model == pattern;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut remainder = model.as_str();
    let mut first = true;
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if let Some(index) = remainder.find(part) {
            if first && index != 0 {
                return false;
            }
            remainder = &remainder[index + part.len()..];
            first = false;
        } else {
            return false;
        }
    }
    if pattern.ends_with('*') {
        true
    } else {
        remainder.is_empty()
    }
}

/// Exact names win over wildcard patterns.
pub fn price_for_model<'a>(prices: &'a [ModelPrice], model: &str) -> Option<&'a ModelPrice> {
    prices
        .iter()
        .find(|price| price.model_pattern == model)
        .or_else(|| {
            prices
                .iter()
                .find(|price| model_matches_pattern(model, &price.model_pattern))
        })
}

pub fn compute_record_cost(record: &UsageRecord, price: &ModelPrice) -> f64 {
    let per_token = |tokens: u64, per_1m: f64| (tokens as f64 / 1_000_000.0) * per_1m;
    per_token(record.input_tokens, price.input_per_1m)
        + per_token(record.output_tokens, price.output_per_1m)
        + per_token(record.cache_creation_tokens, price.cache_write_per_1m)
        + per_token(record.cache_read_tokens, price.cache_read_per_1m)
}
