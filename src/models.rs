use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Header mapping with case-insensitive lookup.
///
/// Names are stored lowercased; inserting the same name twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercased header names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// One already-fetched, already-decoded message as handed over by the mailbox layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    pub received_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl RawMessage {
    /// Bare lowercase sender address, with any `Display Name <...>` wrapper removed
    pub fn sender_address(&self) -> String {
        bare_address(&self.sender)
    }
}

pub(crate) fn bare_address(sender: &str) -> String {
    let trimmed = sender.trim();
    if let (Some(start), Some(end)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
        if start < end {
            return trimmed[start + 1..end].trim().to_lowercase();
        }
    }
    trimmed.to_lowercase()
}

/// Historical per-sender aggregates supplied by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderStatistics {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub read_rate: f64,
    #[serde(default)]
    pub reply_rate: f64,
    #[serde(default)]
    pub archive_rate: f64,
    #[serde(default)]
    pub delete_rate: f64,
    #[serde(default = "neutral_priority")]
    pub avg_priority: f64,
}

/// Prior used when nothing is known about how the user ranks a sender
pub const NEUTRAL_PRIORITY: f64 = 0.5;

fn neutral_priority() -> f64 {
    NEUTRAL_PRIORITY
}

impl Default for SenderStatistics {
    fn default() -> Self {
        Self {
            total: 0,
            read_rate: 0.0,
            reply_rate: 0.0,
            archive_rate: 0.0,
            delete_rate: 0.0,
            avg_priority: NEUTRAL_PRIORITY,
        }
    }
}

/// Sender statistics keyed by lowercase sender address
pub type SenderStatsMap = HashMap<String, SenderStatistics>;

/// A single feature value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl FeatureValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FeatureValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            FeatureValue::Int(i) => i as f64,
            FeatureValue::Float(f) => f,
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Int(value)
    }
}

impl From<u32> for FeatureValue {
    fn from(value: u32) -> Self {
        FeatureValue::Int(i64::from(value))
    }
}

impl From<usize> for FeatureValue {
    fn from(value: usize) -> Self {
        FeatureValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<u64> for FeatureValue {
    fn from(value: u64) -> Self {
        FeatureValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

/// Name-ordered feature mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, FeatureValue>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Numeric value of a feature, booleans as 0.0/1.0
    pub fn value(&self, name: &str) -> Option<f64> {
        self.0.get(name).map(FeatureValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Feature names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Positional vector in the given name order; names absent here become 0.0
    pub fn to_dense(&self, order: &[String]) -> Vec<f64> {
        order
            .iter()
            .map(|name| self.value(name).unwrap_or(0.0))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, FeatureValue)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, FeatureValue)>>(iter: I) -> Self {
        FeatureVector(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// User-facing priority classes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Important,
    Normal,
    Low,
    Archive,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::Important,
        Priority::Normal,
        Priority::Low,
        Priority::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::Important => "important",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Archive => "archive",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Priority::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

/// Bot-vs-human origin of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Bot,
    Human,
}

impl MessageOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOrigin::Bot => "bot",
            MessageOrigin::Human => "human",
        }
    }
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageOrigin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bot" => Ok(MessageOrigin::Bot),
            "human" => Ok(MessageOrigin::Human),
            other => Err(format!("unknown message origin '{}'", other)),
        }
    }
}
