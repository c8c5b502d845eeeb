//! Feature extraction for the ensemble classifier
//!
//! Each message is turned into an [`EmailFeatures`] record made of six typed
//! groups. The record flattens into a [`FeatureVector`] whose key set is the
//! same for every message, and into a dense row ordered by [`FEATURE_NAMES`].
//!
//! Extraction never fails: missing headers, an absent HTML body, an empty
//! body, or a sender without history all map to fixed defaults.

use crate::config::ExtractionConfig;
use crate::models::{
    bare_address, FeatureVector, Headers, RawMessage, SenderStatistics, SenderStatsMap,
    NEUTRAL_PRIORITY,
};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use ndarray::Array1;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap());

static URL_DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://([^/\s]+)").unwrap());

/// 1x1 image, either dimension set to exactly `1` or `1px`
static TRACKING_PIXEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\b(?:width|height)\s*=\s*["']?1(?:px)?\b[^>]*>"#).unwrap()
});

/// Mail-merge placeholders: `{{name}}`, `[NAME]`, `[FIRSTNAME]`, `[EMAIL]`, `%FIRST_NAME%`
static PERSONALIZATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\{\{[^}]+\}\}|\[(?:NAME|FIRSTNAME|EMAIL)\]|%[A-Z_]+%").unwrap()
});

/// Sorted names of every feature the extractor emits
pub static FEATURE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    EmailFeatures::default()
        .to_feature_vector()
        .names()
        .map(str::to_string)
        .collect()
});

/// Header-derived bot indicators
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFeatures {
    pub has_list_unsubscribe: bool,
    pub has_bulk_precedence: bool,
    pub has_marketing_headers: bool,
    pub has_auto_submitted: bool,
    pub has_autoreply: bool,
    pub sent_via_api: bool,
    pub mailer_is_automated: bool,
    pub spf_pass: bool,
    pub has_dkim: bool,
    pub header_count: usize,
}

impl MetadataFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("has_list_unsubscribe", self.has_list_unsubscribe);
        out.insert("has_bulk_precedence", self.has_bulk_precedence);
        out.insert("has_marketing_headers", self.has_marketing_headers);
        out.insert("has_auto_submitted", self.has_auto_submitted);
        out.insert("has_autoreply", self.has_autoreply);
        out.insert("sent_via_api", self.sent_via_api);
        out.insert("mailer_is_automated", self.mailer_is_automated);
        out.insert("spf_pass", self.spf_pass);
        out.insert("has_dkim", self.has_dkim);
        out.insert("header_count", self.header_count);
    }
}

/// Subject, body and HTML features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFeatures {
    pub subject_length: usize,
    pub subject_has_re: bool,
    pub subject_has_fwd: bool,
    pub subject_all_caps_ratio: f64,
    pub subject_exclamation_count: usize,
    pub body_length: usize,
    pub body_word_count: usize,
    pub avg_sentence_length: f64,
    pub url_count: usize,
    pub unique_domain_count: usize,
    pub shortened_url_count: usize,
    pub url_to_text_ratio: f64,
    pub unsubscribe_link_count: usize,
    pub has_view_in_browser: bool,
    pub tracking_pixel_count: usize,
    pub exclamation_count: usize,
    pub all_caps_word_count: usize,
    pub currency_mention_count: usize,
    pub percentage_mention_count: usize,
    pub urgency_word_count: usize,
    pub bot_keyword_count: usize,
    pub question_count: usize,
    pub has_personalization_tokens: bool,
    pub html_to_text_ratio: f64,
    pub table_count: usize,
    pub image_count: usize,
    pub has_inline_css: bool,
}

impl ContentFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("subject_length", self.subject_length);
        out.insert("subject_has_re", self.subject_has_re);
        out.insert("subject_has_fwd", self.subject_has_fwd);
        out.insert("subject_all_caps_ratio", self.subject_all_caps_ratio);
        out.insert("subject_exclamation_count", self.subject_exclamation_count);
        out.insert("body_length", self.body_length);
        out.insert("body_word_count", self.body_word_count);
        out.insert("avg_sentence_length", self.avg_sentence_length);
        out.insert("url_count", self.url_count);
        out.insert("unique_domain_count", self.unique_domain_count);
        out.insert("shortened_url_count", self.shortened_url_count);
        out.insert("url_to_text_ratio", self.url_to_text_ratio);
        out.insert("unsubscribe_link_count", self.unsubscribe_link_count);
        out.insert("has_view_in_browser", self.has_view_in_browser);
        out.insert("tracking_pixel_count", self.tracking_pixel_count);
        out.insert("exclamation_count", self.exclamation_count);
        out.insert("all_caps_word_count", self.all_caps_word_count);
        out.insert("currency_mention_count", self.currency_mention_count);
        out.insert("percentage_mention_count", self.percentage_mention_count);
        out.insert("urgency_word_count", self.urgency_word_count);
        out.insert("bot_keyword_count", self.bot_keyword_count);
        out.insert("question_count", self.question_count);
        out.insert("has_personalization_tokens", self.has_personalization_tokens);
        out.insert("html_to_text_ratio", self.html_to_text_ratio);
        out.insert("table_count", self.table_count);
        out.insert("image_count", self.image_count);
        out.insert("has_inline_css", self.has_inline_css);
    }
}

/// Address shape plus historical statistics for the sender
#[derive(Debug, Clone, PartialEq)]
pub struct SenderFeatures {
    pub sender_is_noreply: bool,
    pub sender_is_automated: bool,
    pub sender_has_subdomain: bool,
    pub sender_subdomain_depth: usize,
    pub sender_domain_length: usize,
    pub sender_local_has_numbers: bool,
    pub sender_local_length: usize,
    pub sender_email_count: u64,
    pub sender_read_rate: f64,
    pub sender_reply_rate: f64,
    pub sender_archive_rate: f64,
    pub avg_user_priority_from_sender: f64,
}

impl Default for SenderFeatures {
    fn default() -> Self {
        Self {
            sender_is_noreply: false,
            sender_is_automated: false,
            sender_has_subdomain: false,
            sender_subdomain_depth: 0,
            sender_domain_length: 0,
            sender_local_has_numbers: false,
            sender_local_length: 0,
            sender_email_count: 0,
            sender_read_rate: 0.0,
            sender_reply_rate: 0.0,
            sender_archive_rate: 0.0,
            avg_user_priority_from_sender: NEUTRAL_PRIORITY,
        }
    }
}

impl SenderFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("sender_is_noreply", self.sender_is_noreply);
        out.insert("sender_is_automated", self.sender_is_automated);
        out.insert("sender_has_subdomain", self.sender_has_subdomain);
        out.insert("sender_subdomain_depth", self.sender_subdomain_depth);
        out.insert("sender_domain_length", self.sender_domain_length);
        out.insert("sender_local_has_numbers", self.sender_local_has_numbers);
        out.insert("sender_local_length", self.sender_local_length);
        out.insert("sender_email_count", self.sender_email_count);
        out.insert("sender_read_rate", self.sender_read_rate);
        out.insert("sender_reply_rate", self.sender_reply_rate);
        out.insert("sender_archive_rate", self.sender_archive_rate);
        out.insert(
            "avg_user_priority_from_sender",
            self.avg_user_priority_from_sender,
        );
    }
}

/// Night, morning, afternoon or evening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Night = 0,
    Morning = 1,
    Afternoon = 2,
    Evening = 3,
}

impl TimeBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimeBucket::Night,
            6..=11 => TimeBucket::Morning,
            12..=17 => TimeBucket::Afternoon,
            _ => TimeBucket::Evening,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFeatures {
    pub hour_of_day: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub is_business_hours: bool,
    pub is_night_send: bool,
    pub time_bucket: TimeBucket,
}

impl Default for TemporalFeatures {
    fn default() -> Self {
        Self {
            hour_of_day: 0,
            day_of_week: 0,
            is_weekend: false,
            is_business_hours: false,
            is_night_send: true,
            time_bucket: TimeBucket::Night,
        }
    }
}

impl TemporalFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("hour_of_day", self.hour_of_day);
        out.insert("day_of_week", self.day_of_week);
        out.insert("is_weekend", self.is_weekend);
        out.insert("is_business_hours", self.is_business_hours);
        out.insert("is_night_send", self.is_night_send);
        out.insert("time_bucket", self.time_bucket as u32);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuralFeatures {
    pub recipient_count: usize,
    pub is_to_multiple: bool,
    pub cc_count: usize,
    pub is_reply: bool,
    pub is_forward: bool,
    pub has_inbox_label: bool,
    pub has_important_label: bool,
    pub label_count: usize,
    pub has_attachment: bool,
}

impl Default for StructuralFeatures {
    fn default() -> Self {
        Self {
            recipient_count: 0,
            is_to_multiple: false,
            cc_count: 0,
            is_reply: false,
            is_forward: false,
            has_inbox_label: true,
            has_important_label: false,
            label_count: 0,
            has_attachment: false,
        }
    }
}

impl StructuralFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("recipient_count", self.recipient_count);
        out.insert("is_to_multiple", self.is_to_multiple);
        out.insert("cc_count", self.cc_count);
        out.insert("is_reply", self.is_reply);
        out.insert("is_forward", self.is_forward);
        out.insert("has_inbox_label", self.has_inbox_label);
        out.insert("has_important_label", self.has_important_label);
        out.insert("label_count", self.label_count);
        out.insert("has_attachment", self.has_attachment);
    }
}

/// How the user usually treats mail from this sender
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehavioralFeatures {
    pub user_typically_reads: bool,
    pub user_typically_replies: bool,
    pub user_typically_archives: bool,
    pub user_typically_deletes: bool,
}

impl BehavioralFeatures {
    fn write_to(&self, out: &mut FeatureVector) {
        out.insert("user_typically_reads", self.user_typically_reads);
        out.insert("user_typically_replies", self.user_typically_replies);
        out.insert("user_typically_archives", self.user_typically_archives);
        out.insert("user_typically_deletes", self.user_typically_deletes);
    }
}

/// All features extracted from one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailFeatures {
    pub message_id: String,
    pub metadata: MetadataFeatures,
    pub content: ContentFeatures,
    pub sender: SenderFeatures,
    pub temporal: TemporalFeatures,
    pub structural: StructuralFeatures,
    pub behavioral: BehavioralFeatures,
}

impl EmailFeatures {
    /// Flatten into a name-keyed mapping; always yields the [`FEATURE_NAMES`] key set
    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut out = FeatureVector::new();
        self.metadata.write_to(&mut out);
        self.content.write_to(&mut out);
        self.sender.write_to(&mut out);
        self.temporal.write_to(&mut out);
        self.structural.write_to(&mut out);
        self.behavioral.write_to(&mut out);
        out
    }

    /// Dense row in [`FEATURE_NAMES`] order, booleans as 0.0/1.0
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.to_feature_vector().to_dense(&FEATURE_NAMES))
    }
}

/// Stateless extractor over an immutable keyword configuration
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractionConfig,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let lower = |items: Vec<String>| -> Vec<String> {
            items.into_iter().map(|s| s.to_lowercase()).collect()
        };
        Self {
            config: ExtractionConfig {
                bot_keywords: lower(config.bot_keywords),
                urgency_words: lower(config.urgency_words),
                shortener_domains: lower(config.shortener_domains),
                bulk_mailers: lower(config.bulk_mailers),
                noreply_patterns: lower(config.noreply_patterns),
                automated_sender_patterns: lower(config.automated_sender_patterns),
            },
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Feature names in the positional order used by [`EmailFeatures::to_array`]
    pub fn feature_names(&self) -> &'static [String] {
        FEATURE_NAMES.as_slice()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_NAMES.len()
    }

    /// Extract every feature group for one message.
    ///
    /// Statistics are looked up by the bare lowercase sender address; a sender
    /// with no entry gets the neutral defaults.
    pub fn extract(&self, message: &RawMessage, sender_stats: &SenderStatsMap) -> EmailFeatures {
        let address = message.sender_address();
        let stats = sender_stats.get(&address);

        EmailFeatures {
            message_id: message.id.clone(),
            metadata: self.extract_metadata(&message.headers),
            content: self.extract_content(
                &message.subject,
                &message.body_text,
                message.body_html.as_deref(),
            ),
            sender: self.extract_sender(&address, stats),
            temporal: Self::extract_temporal(&message.received_at),
            structural: Self::extract_structural(message),
            behavioral: Self::extract_behavioral(stats),
        }
    }

    pub fn extract_batch(
        &self,
        messages: &[RawMessage],
        sender_stats: &SenderStatsMap,
    ) -> Vec<EmailFeatures> {
        let features: Vec<EmailFeatures> = messages
            .iter()
            .map(|message| self.extract(message, sender_stats))
            .collect();
        tracing::debug!("Extracted features for {} messages", features.len());
        features
    }

    pub fn extract_metadata(&self, headers: &Headers) -> MetadataFeatures {
        let mailer = headers.get("x-mailer").unwrap_or("").to_lowercase();
        let user_agent = headers.get("user-agent").unwrap_or("");

        MetadataFeatures {
            has_list_unsubscribe: headers.contains("list-unsubscribe"),
            has_bulk_precedence: headers
                .get("precedence")
                .map(|v| v.to_lowercase().contains("bulk"))
                .unwrap_or(false),
            has_marketing_headers: headers
                .names()
                .any(|name| name.contains("marketing") || name.contains("campaign")),
            has_auto_submitted: headers.contains("auto-submitted"),
            has_autoreply: headers.contains("x-autoreply"),
            sent_via_api: !mailer.is_empty() && user_agent.is_empty(),
            mailer_is_automated: self
                .config
                .bulk_mailers
                .iter()
                .any(|name| mailer.contains(name.as_str())),
            spf_pass: headers
                .get("received-spf")
                .map(|v| v.to_lowercase().contains("pass"))
                .unwrap_or(false),
            has_dkim: headers
                .get("dkim-signature")
                .map(|v| !v.is_empty())
                .unwrap_or(false),
            header_count: headers.len(),
        }
    }

    pub fn extract_content(
        &self,
        subject: &str,
        body_text: &str,
        body_html: Option<&str>,
    ) -> ContentFeatures {
        let subject_lower = subject.to_lowercase();
        let subject_length = subject.chars().count();
        let subject_upper = subject.chars().filter(|c| c.is_uppercase()).count();

        let body = body_text;
        let body_lower = body.to_lowercase();
        let words: Vec<&str> = body.split_whitespace().collect();
        let word_count = words.len();
        let sentence_marks = body.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();

        let url_count = URL_PATTERN.find_iter(body).count();
        let domains: BTreeSet<String> = URL_DOMAIN_PATTERN
            .captures_iter(body)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect();
        let shortened_url_count = domains
            .iter()
            .filter(|domain| self.is_shortener(domain))
            .count();

        let mut features = ContentFeatures {
            subject_length,
            subject_has_re: subject_lower.starts_with("re:"),
            subject_has_fwd: subject_lower.starts_with("fwd:") || subject_lower.starts_with("fw:"),
            subject_all_caps_ratio: ratio(subject_upper, subject_length),
            subject_exclamation_count: subject.matches('!').count(),
            body_length: body.chars().count(),
            body_word_count: word_count,
            avg_sentence_length: if body.is_empty() {
                0.0
            } else {
                word_count as f64 / sentence_marks.max(1) as f64
            },
            url_count,
            unique_domain_count: domains.len(),
            shortened_url_count,
            url_to_text_ratio: ratio(url_count, word_count),
            unsubscribe_link_count: body_lower.matches("unsubscribe").count(),
            has_view_in_browser: body_lower.contains("view in browser")
                || body_lower.contains("view online"),
            tracking_pixel_count: 0,
            exclamation_count: body.matches('!').count(),
            all_caps_word_count: words.iter().filter(|w| is_all_caps_word(w)).count(),
            currency_mention_count: body
                .chars()
                .filter(|c| matches!(c, '$' | '€' | '£'))
                .count()
                + body_lower.matches("price").count()
                + body_lower.matches("cost").count(),
            percentage_mention_count: body.matches('%').count(),
            urgency_word_count: count_phrases(&body_lower, &self.config.urgency_words),
            bot_keyword_count: count_phrases(&body_lower, &self.config.bot_keywords),
            question_count: body.matches('?').count(),
            has_personalization_tokens: PERSONALIZATION_PATTERN.is_match(body),
            ..ContentFeatures::default()
        };

        if let Some(html) = body_html.filter(|html| !html.is_empty()) {
            let html_lower = html.to_lowercase();
            features.tracking_pixel_count = TRACKING_PIXEL_PATTERN.find_iter(html).count();
            features.html_to_text_ratio = if body.is_empty() {
                0.0
            } else {
                html.chars().count() as f64 / features.body_length.max(1) as f64
            };
            features.table_count = html_lower.matches("<table").count();
            features.image_count = html_lower.matches("<img").count();
            features.has_inline_css = html_lower.contains("style=");
        }

        features
    }

    /// Sender features from an address (display names are stripped)
    pub fn extract_sender(&self, sender: &str, stats: Option<&SenderStatistics>) -> SenderFeatures {
        let address = bare_address(sender);
        let (local, domain) = address.split_once('@').unwrap_or((address.as_str(), ""));
        let domain_parts = domain.split('.').count();

        let sender_is_automated = self.config.automated_sender_patterns.iter().any(|pattern| {
            match pattern.strip_suffix('@') {
                Some(prefix) => local.ends_with(prefix),
                None => local.contains(pattern.as_str()),
            }
        });

        let mut features = SenderFeatures {
            sender_is_noreply: self
                .config
                .noreply_patterns
                .iter()
                .any(|pattern| address.contains(pattern.as_str())),
            sender_is_automated,
            sender_has_subdomain: domain_parts > 2,
            sender_subdomain_depth: domain_parts.saturating_sub(2),
            sender_domain_length: domain.chars().count(),
            sender_local_has_numbers: local.chars().any(|c| c.is_ascii_digit()),
            sender_local_length: local.chars().count(),
            ..SenderFeatures::default()
        };

        if let Some(stats) = stats {
            features.sender_email_count = stats.total;
            features.sender_read_rate = stats.read_rate;
            features.sender_reply_rate = stats.reply_rate;
            features.sender_archive_rate = stats.archive_rate;
            features.avg_user_priority_from_sender = stats.avg_priority;
        }

        features
    }

    pub fn extract_temporal(received_at: &DateTime<FixedOffset>) -> TemporalFeatures {
        let hour = received_at.hour();
        let day = received_at.weekday().num_days_from_monday();

        TemporalFeatures {
            hour_of_day: hour,
            day_of_week: day,
            is_weekend: day >= 5,
            is_business_hours: (9..=17).contains(&hour),
            is_night_send: hour < 6 || hour >= 22,
            time_bucket: TimeBucket::from_hour(hour),
        }
    }

    pub fn extract_structural(message: &RawMessage) -> StructuralFeatures {
        let headers = &message.headers;
        let recipient_count = message.recipients.len();

        let mut features = StructuralFeatures {
            recipient_count,
            is_to_multiple: recipient_count > 1,
            cc_count: headers
                .get("cc")
                .filter(|cc| !cc.is_empty())
                .map(|cc| cc.split(',').count())
                .unwrap_or(0),
            is_reply: headers.contains("in-reply-to"),
            is_forward: headers
                .get("subject")
                .map(|s| s.to_lowercase().contains("fwd:"))
                .unwrap_or(false),
            has_attachment: headers
                .get("content-type")
                .map(|ct| ct.to_lowercase().contains("attachment"))
                .unwrap_or(false)
                || message.body_text.to_lowercase().contains("attached"),
            ..StructuralFeatures::default()
        };

        if let Some(labels) = message.labels.as_ref().filter(|labels| !labels.is_empty()) {
            features.has_inbox_label = labels.iter().any(|l| l == "INBOX");
            features.has_important_label = labels.iter().any(|l| l == "IMPORTANT");
            features.label_count = labels.len();
        }

        features
    }

    pub fn extract_behavioral(stats: Option<&SenderStatistics>) -> BehavioralFeatures {
        match stats {
            Some(stats) => BehavioralFeatures {
                user_typically_reads: stats.read_rate > 0.5,
                user_typically_replies: stats.reply_rate > 0.3,
                user_typically_archives: stats.archive_rate > 0.5,
                user_typically_deletes: stats.delete_rate > 0.3,
            },
            None => BehavioralFeatures::default(),
        }
    }

    fn is_shortener(&self, domain: &str) -> bool {
        self.config.shortener_domains.iter().any(|short| {
            domain == short
                || domain
                    .strip_suffix(short.as_str())
                    .map(|rest| rest.ends_with('.'))
                    .unwrap_or(false)
        })
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn count_phrases(text: &str, phrases: &[String]) -> usize {
    phrases
        .iter()
        .filter(|phrase| text.contains(phrase.as_str()))
        .count()
}

fn is_all_caps_word(word: &str) -> bool {
    word.chars().count() > 2
        && word.chars().any(char::is_uppercase)
        && !word.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_message(sender: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: "msg-1".to_string(),
            sender: sender.to_string(),
            recipients: vec!["me@example.com".to_string()],
            subject: subject.to_string(),
            body_text: body.to_string(),
            body_html: None,
            headers: Headers::new(),
            // Wednesday
            received_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2025, 11, 5, 14, 30, 0)
                .unwrap(),
            labels: None,
            thread_id: None,
        }
    }

    #[test]
    fn test_feature_names_sorted_and_complete() {
        let names = FEATURE_NAMES.as_slice();
        assert_eq!(names.len(), 68);

        let mut sorted = names.to_vec();
        sorted.sort();
        assert_eq!(sorted, names);

        assert!(names.contains(&"has_list_unsubscribe".to_string()));
        assert!(names.contains(&"avg_user_priority_from_sender".to_string()));
        assert!(names.contains(&"user_typically_deletes".to_string()));
    }

    #[test]
    fn test_metadata_bulk_headers() {
        let extractor = FeatureExtractor::default();
        let headers: Headers = vec![
            ("List-Unsubscribe", "<mailto:unsub@shop.com>"),
            ("Precedence", "Bulk"),
            ("X-Campaign-Id", "spring-2025"),
            ("X-Mailer", "MailChimp Mailer"),
            ("Received-SPF", "Pass (sender SPF authorized)"),
            ("DKIM-Signature", "v=1; a=rsa-sha256"),
        ]
        .into_iter()
        .collect();

        let features = extractor.extract_metadata(&headers);

        assert!(features.has_list_unsubscribe);
        assert!(features.has_bulk_precedence);
        assert!(features.has_marketing_headers);
        assert!(features.sent_via_api);
        assert!(features.mailer_is_automated);
        assert!(features.spf_pass);
        assert!(features.has_dkim);
        assert!(!features.has_auto_submitted);
        assert_eq!(features.header_count, 6);
    }

    #[test]
    fn test_metadata_browser_client_is_not_api() {
        let extractor = FeatureExtractor::default();
        let headers: Headers = vec![
            ("X-Mailer", "Apple Mail"),
            ("User-Agent", "Mozilla/5.0 Thunderbird"),
        ]
        .into_iter()
        .collect();

        let features = extractor.extract_metadata(&headers);
        assert!(!features.sent_via_api);
        assert!(!features.mailer_is_automated);
    }

    #[test]
    fn test_content_subject_features() {
        let extractor = FeatureExtractor::default();

        let features = extractor.extract_content("RE: Budget!!", "", None);
        assert_eq!(features.subject_length, 12);
        assert!(features.subject_has_re);
        assert!(!features.subject_has_fwd);
        assert_eq!(features.subject_exclamation_count, 2);
        assert!((features.subject_all_caps_ratio - 3.0 / 12.0).abs() < 1e-12);

        let forwarded = extractor.extract_content("Fw: notes", "", None);
        assert!(forwarded.subject_has_fwd);
    }

    #[test]
    fn test_content_urls_and_shorteners() {
        let extractor = FeatureExtractor::default();
        let body = "See https://bit.ly/abc and https://news.bit.ly/x plus \
                    https://www.target.com/deal and https://www.target.com/other";

        let features = extractor.extract_content("Deals", body, None);

        assert_eq!(features.url_count, 4);
        assert_eq!(features.unique_domain_count, 3);
        // target.com merely contains "t.co"
        assert_eq!(features.shortened_url_count, 2);
        assert!((features.url_to_text_ratio - 4.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_content_body_statistics() {
        let extractor = FeatureExtractor::default();
        let body = "HUGE SALE today! Save 50% on every item. What does it cost? Only $10.";

        let features = extractor.extract_content("", body, None);

        assert_eq!(features.body_word_count, 14);
        // 2 '.', 1 '!', 1 '?'
        assert!((features.avg_sentence_length - 14.0 / 4.0).abs() < 1e-12);
        assert_eq!(features.all_caps_word_count, 2);
        assert_eq!(features.exclamation_count, 1);
        assert_eq!(features.question_count, 1);
        assert_eq!(features.percentage_mention_count, 1);
        assert_eq!(features.currency_mention_count, 2);
        assert_eq!(features.bot_keyword_count, 1);
    }

    #[test]
    fn test_content_keyword_counts_are_distinct_phrases() {
        let extractor = FeatureExtractor::default();
        let body = "URGENT urgent urgent: action required before the deadline. Newsletter.";

        let features = extractor.extract_content("", body, None);

        assert_eq!(features.urgency_word_count, 3);
        assert_eq!(features.bot_keyword_count, 1);
    }

    #[test]
    fn test_content_personalization_tokens() {
        let extractor = FeatureExtractor::default();

        for body in ["Hi {{first_name}},", "Dear [NAME]", "Hello %FIRST_NAME%!", "to [email]"] {
            let features = extractor.extract_content("", body, None);
            assert!(features.has_personalization_tokens, "missed {:?}", body);
        }

        let plain = extractor.extract_content("", "Save 50% now and 20% later", None);
        assert!(!plain.has_personalization_tokens);
    }

    #[test]
    fn test_content_html_features() {
        let extractor = FeatureExtractor::default();
        let html = r#"<table style="width:100%"><tr><td>
            <img src="logo.png" width="120">
            <img src="https://t.example.com/o.gif" width="1" height="1">
            <IMG SRC="p.gif" HEIGHT=1px>
            <img src="wide.gif" width="10">
        </td></tr></table>"#;

        let features = extractor.extract_content("Hi", "short text", Some(html));

        assert_eq!(features.tracking_pixel_count, 2);
        assert_eq!(features.table_count, 1);
        assert_eq!(features.image_count, 4);
        assert!(features.has_inline_css);
        assert!(features.html_to_text_ratio > 1.0);
    }

    #[test]
    fn test_content_html_ratio_zero_without_text() {
        let extractor = FeatureExtractor::default();
        let features = extractor.extract_content("Hi", "", Some("<p>only html</p>"));
        assert_eq!(features.html_to_text_ratio, 0.0);
        assert_eq!(features.avg_sentence_length, 0.0);
    }

    #[test]
    fn test_sender_address_shape() {
        let extractor = FeatureExtractor::default();

        let features = extractor.extract_sender("Shop <no-reply@mail.news.shop.com>", None);
        assert!(features.sender_is_noreply);
        assert!(features.sender_is_automated);
        assert!(features.sender_has_subdomain);
        assert_eq!(features.sender_subdomain_depth, 2);
        assert_eq!(features.sender_domain_length, "mail.news.shop.com".len());

        let person = extractor.extract_sender("alice42@example.com", None);
        assert!(!person.sender_is_noreply);
        assert!(!person.sender_is_automated);
        assert!(!person.sender_has_subdomain);
        assert!(person.sender_local_has_numbers);
        assert_eq!(person.sender_local_length, 7);
        assert_eq!(person.avg_user_priority_from_sender, 0.5);
    }

    #[test]
    fn test_sender_automated_patterns_use_local_part() {
        let extractor = FeatureExtractor::default();

        assert!(extractor.extract_sender("robot@example.com", None).sender_is_automated);
        assert!(extractor.extract_sender("security-alerts@bank.com", None).sender_is_automated);
        // Domain names do not count
        assert!(!extractor.extract_sender("jane@alert-systems.com", None).sender_is_automated);
        assert!(!extractor.extract_sender("bottle@example.com", None).sender_is_automated);
    }

    #[test]
    fn test_sender_statistics_applied() {
        let extractor = FeatureExtractor::default();
        let stats = SenderStatistics {
            total: 40,
            read_rate: 0.9,
            reply_rate: 0.4,
            archive_rate: 0.1,
            delete_rate: 0.0,
            avg_priority: 0.8,
        };

        let features = extractor.extract_sender("boss@work.com", Some(&stats));
        assert_eq!(features.sender_email_count, 40);
        assert_eq!(features.sender_read_rate, 0.9);
        assert_eq!(features.avg_user_priority_from_sender, 0.8);

        let behavior = FeatureExtractor::extract_behavioral(Some(&stats));
        assert!(behavior.user_typically_reads);
        assert!(behavior.user_typically_replies);
        assert!(!behavior.user_typically_archives);
        assert!(!behavior.user_typically_deletes);
    }

    #[test]
    fn test_behavioral_thresholds_are_strict() {
        let stats = SenderStatistics {
            read_rate: 0.5,
            reply_rate: 0.3,
            archive_rate: 0.51,
            delete_rate: 0.31,
            ..SenderStatistics::default()
        };
        let behavior = FeatureExtractor::extract_behavioral(Some(&stats));
        assert!(!behavior.user_typically_reads);
        assert!(!behavior.user_typically_replies);
        assert!(behavior.user_typically_archives);
        assert!(behavior.user_typically_deletes);

        assert_eq!(
            FeatureExtractor::extract_behavioral(None),
            BehavioralFeatures::default()
        );
    }

    #[test]
    fn test_temporal_features() {
        let tz = FixedOffset::east_opt(0).unwrap();

        // Saturday 23:15
        let late = FeatureExtractor::extract_temporal(
            &tz.with_ymd_and_hms(2025, 11, 8, 23, 15, 0).unwrap(),
        );
        assert_eq!(late.hour_of_day, 23);
        assert_eq!(late.day_of_week, 5);
        assert!(late.is_weekend);
        assert!(!late.is_business_hours);
        assert!(late.is_night_send);
        assert_eq!(late.time_bucket, TimeBucket::Evening);

        // Monday 17:59 is still business hours
        let office = FeatureExtractor::extract_temporal(
            &tz.with_ymd_and_hms(2025, 11, 3, 17, 59, 0).unwrap(),
        );
        assert_eq!(office.day_of_week, 0);
        assert!(office.is_business_hours);
        assert!(!office.is_night_send);
        assert_eq!(office.time_bucket, TimeBucket::Afternoon);
    }

    #[test]
    fn test_time_buckets_cover_every_hour() {
        let expected = [
            (0, TimeBucket::Night),
            (5, TimeBucket::Night),
            (6, TimeBucket::Morning),
            (11, TimeBucket::Morning),
            (12, TimeBucket::Afternoon),
            (17, TimeBucket::Afternoon),
            (18, TimeBucket::Evening),
            (23, TimeBucket::Evening),
        ];
        for (hour, bucket) in expected {
            assert_eq!(TimeBucket::from_hour(hour), bucket, "hour {}", hour);
        }
    }

    #[test]
    fn test_structural_defaults_without_labels() {
        let message = create_message("a@b.com", "Hi", "Hello");
        let features = FeatureExtractor::extract_structural(&message);

        assert_eq!(features.recipient_count, 1);
        assert!(!features.is_to_multiple);
        assert_eq!(features.cc_count, 0);
        assert!(features.has_inbox_label);
        assert!(!features.has_important_label);
        assert_eq!(features.label_count, 0);
    }

    #[test]
    fn test_structural_from_headers_and_labels() {
        let mut message = create_message("a@b.com", "Fwd: report", "Report attached.");
        message.recipients.push("you@example.com".to_string());
        message.headers.insert("Cc", "x@a.com, y@a.com, z@a.com");
        message.headers.insert("In-Reply-To", "<abc@mail>");
        message.headers.insert("Subject", "Fwd: report");
        message.labels = Some(vec!["IMPORTANT".to_string(), "CATEGORY_UPDATES".to_string()]);

        let features = FeatureExtractor::extract_structural(&message);

        assert!(features.is_to_multiple);
        assert_eq!(features.cc_count, 3);
        assert!(features.is_reply);
        assert!(features.is_forward);
        assert!(!features.has_inbox_label);
        assert!(features.has_important_label);
        assert_eq!(features.label_count, 2);
        assert!(features.has_attachment);
    }

    #[test]
    fn test_extract_uses_bare_sender_for_stats() {
        let extractor = FeatureExtractor::default();
        let message = create_message("Boss <Boss@Work.com>", "Status", "How is it going?");
        let mut stats = SenderStatsMap::new();
        stats.insert(
            "boss@work.com".to_string(),
            SenderStatistics {
                total: 3,
                read_rate: 1.0,
                ..SenderStatistics::default()
            },
        );

        let features = extractor.extract(&message, &stats);

        assert_eq!(features.message_id, "msg-1");
        assert_eq!(features.sender.sender_email_count, 3);
        assert!(features.behavioral.user_typically_reads);
    }

    #[test]
    fn test_to_array_matches_feature_vector() {
        let extractor = FeatureExtractor::default();
        let message = create_message("news@shop.com", "SALE!", "Huge sale. Unsubscribe here.");
        let features = extractor.extract(&message, &SenderStatsMap::new());

        let vector = features.to_feature_vector();
        let array = features.to_array();

        assert_eq!(array.len(), extractor.feature_count());
        for (i, name) in extractor.feature_names().iter().enumerate() {
            assert_eq!(array[i], vector.value(name).unwrap(), "feature {}", name);
        }
    }

    #[test]
    fn test_custom_keyword_tables() {
        let config = ExtractionConfig {
            bot_keywords: vec!["Webinar".to_string()],
            shortener_domains: vec!["lnkd.in".to_string()],
            ..ExtractionConfig::default()
        };
        let extractor = FeatureExtractor::new(config);

        let features =
            extractor.extract_content("", "Join our webinar https://lnkd.in/xyz", None);
        assert_eq!(features.bot_keyword_count, 1);
        assert_eq!(features.shortened_url_count, 1);
    }
}
