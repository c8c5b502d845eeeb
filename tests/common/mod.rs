//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use mail_triage_ml::config::{BoostingConfig, ForestConfig};
use mail_triage_ml::synthetic::SyntheticEmail;
use mail_triage_ml::{
    FeatureExtractor, Headers, ModelConfig, RawMessage, SenderStatsMap, SyntheticEmailGenerator,
};
use ndarray::Array2;

/// Fixed "now" so generated timestamps are reproducible
pub fn anchor_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 5, 12, 0, 0).unwrap()
}

/// Create a test message with default values
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        sender: sender.to_string(),
        recipients: vec!["me@example.com".to_string()],
        subject: subject.to_string(),
        body_text: "Hi, can we talk about the report tomorrow?".to_string(),
        body_html: None,
        headers: [("From", sender), ("Subject", subject)]
            .into_iter()
            .collect::<Headers>(),
        received_at: DateTime::<FixedOffset>::parse_from_rfc3339("2025-03-04T10:30:00+00:00")
            .unwrap(),
        labels: Some(vec!["INBOX".to_string()]),
        thread_id: Some(format!("thread_{}", id)),
    }
}

/// Create a bulk marketing message with unsubscribe headers and links
pub fn create_newsletter_message(id: &str, sender: &str) -> RawMessage {
    let mut message = create_test_message(id, sender, "WEEKLY DEALS - 50% OFF!!!");
    message.headers.insert("List-Unsubscribe", "<mailto:unsub@example.com>");
    message.headers.insert("Precedence", "bulk");
    message.headers.insert("X-Mailer", "MailChimp");
    message.body_text =
        "Shop now: https://bit.ly/abc\nUnsubscribe: https://example.com/unsubscribe".to_string();
    message.body_html = Some(
        "<html><body><table><tr><td>Sale</td></tr></table>\
         <img src=\"https://t.example.com/p.gif\" width=\"1\" height=\"1\"></body></html>"
            .to_string(),
    );
    message.received_at =
        DateTime::<FixedOffset>::parse_from_rfc3339("2025-03-08T22:00:00+00:00").unwrap();
    message.thread_id = None;
    message
}

/// Classifier settings small enough for fast tests
pub fn small_model_config() -> ModelConfig {
    ModelConfig {
        forest: ForestConfig {
            n_estimators: 40,
            max_depth: 10,
            min_samples_split: 4,
            balanced_class_weight: true,
        },
        boosting: BoostingConfig {
            n_estimators: 30,
            learning_rate: 0.2,
            max_depth: 3,
        },
        ..ModelConfig::default()
    }
}

/// Stack extracted feature arrays into one matrix
pub fn feature_matrix(emails: &[SyntheticEmail]) -> Array2<f64> {
    let extractor = FeatureExtractor::default();
    let stats = SenderStatsMap::new();
    let values: Vec<f64> = emails
        .iter()
        .flat_map(|e| extractor.extract(&e.message, &stats).to_array().to_vec())
        .collect();
    Array2::from_shape_vec((emails.len(), extractor.feature_count()), values).unwrap()
}

/// Seeded bot/human dataset as a feature matrix
pub fn synthetic_origin_dataset(
    n: usize,
    seed: u64,
) -> (Vec<SyntheticEmail>, Array2<f64>, Vec<String>) {
    let mut generator = SyntheticEmailGenerator::new(Some(seed)).with_anchor(anchor_time());
    let (emails, labels) = generator.generate_dataset(n, 0.7);
    let x = feature_matrix(&emails);
    (emails, x, labels)
}

/// Seeded priority-labelled dataset as a feature matrix
pub fn synthetic_priority_dataset(
    n: usize,
    seed: u64,
) -> (Vec<SyntheticEmail>, Array2<f64>, Vec<String>) {
    let mut generator = SyntheticEmailGenerator::new(Some(seed)).with_anchor(anchor_time());
    let (emails, labels) = generator.generate_priority_dataset(n);
    let x = feature_matrix(&emails);
    (emails, x, labels)
}
