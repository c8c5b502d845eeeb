//! Multi-account training corpus
//!
//! Messages from several mailboxes are pooled into one training set. Unlabelled
//! accounts get bot/human labels from header heuristics; duplicates across
//! accounts are dropped by message id.

use crate::classifier::EnsembleClassifier;
use crate::config::TrainingConfig;
use crate::error::{Result, TriageError};
use crate::features::FeatureExtractor;
use crate::metrics::TrainingMetrics;
use crate::model_store::TrainingMetadata;
use crate::models::{MessageOrigin, RawMessage, SenderStatsMap};
use ndarray::Array2;
use std::collections::{BTreeMap, HashSet};

const MARKETING_SUBJECT_WORDS: &[&str] = &["unsubscribe", "newsletter", "offer", "deal", "discount"];

/// Score threshold at which a message counts as a bot
const BOT_SCORE_THRESHOLD: u32 = 2;

/// Header-based bot/human guess for unlabelled mail
pub fn heuristic_label(message: &RawMessage) -> MessageOrigin {
    let mut score = 0;

    if message.headers.contains("list-unsubscribe") {
        score += 2;
    }
    if message.headers.contains("auto-submitted") {
        score += 2;
    }

    let sender = message.sender.to_lowercase();
    if sender.contains("no-reply") || sender.contains("noreply") {
        score += 1;
    }

    let subject = message.subject.to_lowercase();
    if MARKETING_SUBJECT_WORDS.iter().any(|w| subject.contains(w)) {
        score += 1;
    }

    if score >= BOT_SCORE_THRESHOLD {
        MessageOrigin::Bot
    } else {
        MessageOrigin::Human
    }
}

/// True once enough new feedback labels have accumulated
pub fn needs_retraining(new_feedback_count: usize, config: &TrainingConfig) -> bool {
    new_feedback_count >= config.retrain_threshold
}

#[derive(Debug, Clone)]
struct AccountSamples {
    name: String,
    messages: Vec<RawMessage>,
    labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    config: TrainingConfig,
    accounts: Vec<AccountSamples>,
    seen_ids: HashSet<String>,
}

/// Feature matrix ready for [`train_unified`]
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Array2<f64>,
    pub labels: Vec<String>,
    pub feature_names: Vec<String>,
    pub metadata: TrainingMetadata,
}

impl TrainingCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrainingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Add one account's messages and return how many were kept.
    ///
    /// At most `max_per_account` messages are considered; messages whose id
    /// was already seen in any account are skipped. Without `labels`, each
    /// message is labelled by [`heuristic_label`].
    pub fn add_account(
        &mut self,
        name: impl Into<String>,
        messages: Vec<RawMessage>,
        labels: Option<Vec<String>>,
    ) -> Result<usize> {
        let name = name.into();

        let labels = match labels {
            Some(labels) => {
                if labels.len() != messages.len() {
                    return Err(TriageError::LabelCountMismatch {
                        samples: messages.len(),
                        labels: labels.len(),
                    });
                }
                labels
            }
            None => messages
                .iter()
                .map(|m| heuristic_label(m).as_str().to_string())
                .collect(),
        };

        let offered = messages.len();
        let mut kept_messages = Vec::new();
        let mut kept_labels = Vec::new();
        for (message, label) in messages
            .into_iter()
            .zip(labels)
            .take(self.config.max_per_account)
        {
            if self.seen_ids.insert(message.id.clone()) {
                kept_messages.push(message);
                kept_labels.push(label);
            }
        }
        let kept = kept_messages.len();

        tracing::info!(
            "Account {}: kept {} of {} messages",
            name,
            kept,
            offered
        );

        match self.accounts.iter_mut().find(|a| a.name == name) {
            Some(account) => {
                account.messages.extend(kept_messages);
                account.labels.extend(kept_labels);
            }
            None => self.accounts.push(AccountSamples {
                name,
                messages: kept_messages,
                labels: kept_labels,
            }),
        }

        Ok(kept)
    }

    pub fn len(&self) -> usize {
        self.accounts.iter().map(|a| a.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn account_names(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn class_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for label in self.accounts.iter().flat_map(|a| &a.labels) {
            *distribution.entry(label.clone()).or_insert(0) += 1;
        }
        distribution
    }

    /// Extract features for every pooled message
    pub fn build(
        &self,
        extractor: &FeatureExtractor,
        sender_stats: &SenderStatsMap,
    ) -> Result<TrainingSet> {
        if self.is_empty() {
            return Err(TriageError::EmptyTrainingSet);
        }

        let feature_names = extractor.feature_names().to_vec();
        let n_features = feature_names.len();
        let total = self.len();

        let mut values = Vec::with_capacity(total * n_features);
        let mut labels = Vec::with_capacity(total);
        let mut samples_per_account = BTreeMap::new();

        for account in &self.accounts {
            for message in &account.messages {
                values.extend(extractor.extract(message, sender_stats).to_array().iter().copied());
            }
            labels.extend(account.labels.iter().cloned());
            samples_per_account.insert(account.name.clone(), account.messages.len());
        }

        let features = Array2::from_shape_vec((total, n_features), values)?;

        let metadata = TrainingMetadata {
            accounts_trained: self.accounts.iter().map(|a| a.name.clone()).collect(),
            training_date: None,
            total_samples: total,
            samples_per_account,
            class_distribution: self.class_distribution(),
            feature_count: n_features,
        };

        tracing::info!(
            "Built training set: {} samples from {} accounts",
            total,
            self.accounts.len()
        );
        for (class, count) in &metadata.class_distribution {
            tracing::info!("  {}: {}", class, count);
        }

        Ok(TrainingSet {
            features,
            labels,
            feature_names,
            metadata,
        })
    }
}

/// Fully refit `classifier` on the pooled set and stamp its training date
pub fn train_unified(
    classifier: &mut EnsembleClassifier,
    set: &mut TrainingSet,
    validation_split: f64,
) -> Result<TrainingMetrics> {
    tracing::info!(
        "Training unified model on {} accounts",
        set.metadata.accounts_trained.len()
    );

    let metrics = classifier.fit(
        set.features.view(),
        &set.labels,
        &set.feature_names,
        validation_split,
    )?;
    set.metadata.training_date = Some(metrics.trained_at);

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Headers;
    use chrono::{DateTime, FixedOffset};

    fn message(id: &str, sender: &str, subject: &str, headers: &[(&str, &str)]) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            sender: sender.to_string(),
            recipients: vec!["me@example.com".to_string()],
            subject: subject.to_string(),
            body_text: "Hello".to_string(),
            body_html: None,
            headers: headers.iter().map(|(k, v)| (*k, *v)).collect::<Headers>(),
            received_at: DateTime::<FixedOffset>::parse_from_rfc3339("2025-03-04T10:00:00+00:00")
                .unwrap(),
            labels: None,
            thread_id: None,
        }
    }

    fn newsletter(id: &str) -> RawMessage {
        message(
            id,
            "noreply@shop.com",
            "Weekly newsletter",
            &[("List-Unsubscribe", "<mailto:u@shop.com>")],
        )
    }

    fn personal(id: &str) -> RawMessage {
        message(id, "alice@example.com", "Lunch?", &[])
    }

    #[test]
    fn test_heuristic_label() {
        assert_eq!(heuristic_label(&newsletter("a")), MessageOrigin::Bot);
        assert_eq!(heuristic_label(&personal("b")), MessageOrigin::Human);

        // Auto-Submitted alone reaches the threshold
        let auto = message("c", "alice@example.com", "Out of office", &[("Auto-Submitted", "auto-replied")]);
        assert_eq!(heuristic_label(&auto), MessageOrigin::Bot);

        // One weak signal each is still enough together
        let weak = message("d", "no-reply@bank.com", "A special offer", &[]);
        assert_eq!(heuristic_label(&weak), MessageOrigin::Bot);

        let single = message("e", "no-reply@bank.com", "Statement ready", &[]);
        assert_eq!(heuristic_label(&single), MessageOrigin::Human);
    }

    #[test]
    fn test_needs_retraining() {
        let config = TrainingConfig::default();
        assert!(!needs_retraining(49, &config));
        assert!(needs_retraining(50, &config));
    }

    #[test]
    fn test_add_account_dedups_across_accounts() {
        let mut corpus = TrainingCorpus::new();
        let kept = corpus
            .add_account("work", vec![newsletter("1"), personal("2")], None)
            .unwrap();
        assert_eq!(kept, 2);

        let kept = corpus
            .add_account("home", vec![personal("2"), personal("3")], None)
            .unwrap();
        assert_eq!(kept, 1);

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.account_names(), vec!["work", "home"]);
        assert_eq!(corpus.class_distribution()["human"], 2);
        assert_eq!(corpus.class_distribution()["bot"], 1);
    }

    #[test]
    fn test_add_account_respects_cap() {
        let mut corpus = TrainingCorpus::with_config(TrainingConfig {
            max_per_account: 2,
            ..TrainingConfig::default()
        });
        let messages = (0..5).map(|i| personal(&i.to_string())).collect();
        assert_eq!(corpus.add_account("a", messages, None).unwrap(), 2);
    }

    #[test]
    fn test_add_account_label_mismatch() {
        let mut corpus = TrainingCorpus::new();
        let result = corpus.add_account("a", vec![personal("1")], Some(vec![]));
        assert!(matches!(
            result,
            Err(TriageError::LabelCountMismatch {
                samples: 1,
                labels: 0
            })
        ));
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_explicit_labels_are_kept() {
        let mut corpus = TrainingCorpus::new();
        corpus
            .add_account(
                "a",
                vec![newsletter("1"), personal("2")],
                Some(vec!["archive".to_string(), "critical".to_string()]),
            )
            .unwrap();
        let distribution = corpus.class_distribution();
        assert_eq!(distribution["archive"], 1);
        assert_eq!(distribution["critical"], 1);
    }

    #[test]
    fn test_build_training_set() {
        let mut corpus = TrainingCorpus::new();
        corpus
            .add_account("work", vec![newsletter("1"), personal("2")], None)
            .unwrap();
        corpus.add_account("home", vec![personal("3")], None).unwrap();

        let extractor = FeatureExtractor::default();
        let set = corpus.build(&extractor, &SenderStatsMap::new()).unwrap();

        assert_eq!(set.features.dim(), (3, extractor.feature_count()));
        assert_eq!(set.labels, vec!["bot", "human", "human"]);
        assert_eq!(set.feature_names, extractor.feature_names());
        assert_eq!(set.metadata.total_samples, 3);
        assert_eq!(set.metadata.samples_per_account["work"], 2);
        assert_eq!(set.metadata.feature_count, extractor.feature_count());
        assert!(set.metadata.training_date.is_none());

        let unsubscribe = set
            .feature_names
            .iter()
            .position(|n| n == "has_list_unsubscribe")
            .unwrap();
        assert_eq!(set.features[[0, unsubscribe]], 1.0);
        assert_eq!(set.features[[1, unsubscribe]], 0.0);
    }

    #[test]
    fn test_build_empty_corpus() {
        let corpus = TrainingCorpus::new();
        assert!(matches!(
            corpus.build(&FeatureExtractor::default(), &SenderStatsMap::new()),
            Err(TriageError::EmptyTrainingSet)
        ));
    }
}
