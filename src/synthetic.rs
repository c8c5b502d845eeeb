//! Seeded synthetic email generator
//!
//! Produces "bot" (marketing) and "human" (personal) messages with
//! ground-truth origin and priority labels, so the extractor and classifier
//! can be exercised end to end without a mailbox. The same seed and anchor
//! time always give the same messages.

use crate::models::{Headers, MessageOrigin, Priority, RawMessage};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const BOT_SENDERS: &[&str] = &[
    "noreply@marketing.com",
    "notifications@newsletter.io",
    "deals@promotional-mail.net",
    "auto@system-alerts.com",
    "campaigns@email-service.com",
    "no-reply@shopping-site.com",
    "updates@social-network.com",
    "alerts@bank-system.com",
];

const BOT_SUBJECTS: &[&str] = &[
    "🎉 {percent}% OFF - {urgency}!",
    "Your {item} is waiting - {urgency}",
    "EXCLUSIVE: Special offer just for you",
    "Don't miss out on this amazing deal",
    "[Newsletter] Weekly digest - {topic}",
    "You have {num} new notifications",
    "Your subscription will expire soon",
    "Update your account information",
];

const BOT_BODIES: &[&str] = &[
    "Hi there!\n\n\
     Don't miss our biggest sale of the year! Click here to shop now: {url}\n\n\
     Special offer: {percent}% off everything\n\
     Limited time only - expires {urgency_time}!\n\n\
     Shop now: {url}\n\n\
     Unsubscribe | View in browser\n",
    "Hello,\n\n\
     We noticed you haven't completed your purchase. Your items are still in your cart!\n\n\
     Complete your order now: {url}\n\n\
     This offer expires in {hours} hours.\n\n\
     {multiple_urls}\n\n\
     Unsubscribe from these emails\n",
    "Newsletter: {topic}\n\n\
     Here's what's new this week:\n\
     - Article 1: {topic_detail}\n\
     - Article 2: {topic_detail}\n\
     - Article 3: {topic_detail}\n\n\
     Read more: {url}\n\n\
     You're receiving this because you subscribed to our newsletter.\n\
     Unsubscribe anytime.\n",
];

const BOT_MAILERS: &[&str] = &["MailChimp", "SendGrid", "Constant Contact", "Campaign Monitor"];

const HUMAN_SENDERS: &[&str] = &[
    "john.smith@company.com",
    "sarah.johnson@workplace.org",
    "mike.brown@business.net",
    "emily.davis@enterprise.com",
    "alex.wilson@firm.com",
    "jessica.moore@corp.com",
    "david.taylor@organization.org",
    "amanda.anderson@group.com",
];

const HUMAN_SUBJECTS: &[&str] = &[
    "Re: {topic} - follow up",
    "Quick question about {topic}",
    "Meeting next {day}?",
    "Fwd: {topic} - your input needed",
    "{topic} discussion",
    "Thanks for {action}",
    "Update on {topic}",
    "Can we schedule a call?",
];

const HUMAN_BODIES: &[&str] = &[
    "Hi,\n\n\
     Thanks for your email. I've reviewed the {topic} and have a few questions.\n\n\
     Can we schedule a quick call to discuss? I'm free {time_suggestion}.\n\n\
     Best regards,\n\
     {name}\n",
    "Hey,\n\n\
     Just wanted to follow up on our conversation about {topic}.\n\n\
     Did you get a chance to look at the documents I sent? Let me know if you need anything else.\n\n\
     Thanks!\n\
     {name}\n",
    "Hi there,\n\n\
     Quick question: {question}\n\n\
     Also, are you available for a meeting {day}? We should discuss {topic}.\n\n\
     Let me know what works for you.\n\n\
     {name}\n",
];

const TOPICS: &[&str] = &[
    "project update",
    "budget review",
    "client meeting",
    "proposal",
    "deadline",
    "collaboration",
    "feedback",
    "schedule",
    "presentation",
    "report",
    "analysis",
    "strategy",
];

const NAMES: &[&str] = &["John", "Sarah", "Mike", "Emily", "Alex", "Jessica", "David", "Amanda"];

/// Night and evening hours favoured by bulk senders
const OFF_HOURS: &[u32] = &[0, 1, 2, 3, 4, 5, 20, 21, 22, 23];

/// Default share of bot messages in a generated dataset
pub const DEFAULT_BOT_RATIO: f64 = 0.7;

/// A generated message with its ground truth
#[derive(Debug, Clone)]
pub struct SyntheticEmail {
    pub message: RawMessage,
    pub origin: MessageOrigin,
    pub priority: Priority,
}

pub struct SyntheticEmailGenerator {
    rng: StdRng,
    anchor: DateTime<Utc>,
    next_id: u64,
}

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

fn pick_num<R: Rng>(rng: &mut R, items: &[u32]) -> u32 {
    items[rng.gen_range(0..items.len())]
}

/// Same instant moved to `hour:minute`
fn at_time_of_day(day: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    day - Duration::seconds(i64::from(day.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(day.nanosecond()))
        + Duration::hours(i64::from(hour))
        + Duration::minutes(i64::from(minute))
}

impl SyntheticEmailGenerator {
    /// Seeded generator; `None` draws the seed from entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            anchor: Utc::now(),
            next_id: 0,
        }
    }

    /// Timestamps are generated backwards from `anchor`
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = anchor;
        self
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{:06}", prefix, self.next_id)
    }

    pub fn generate_bot_email(&mut self) -> SyntheticEmail {
        let rng = &mut self.rng;
        let sender = pick(rng, BOT_SENDERS);

        let subject = pick(rng, BOT_SUBJECTS)
            .replace("{percent}", &pick_num(rng, &[10, 20, 30, 40, 50, 60, 70]).to_string())
            .replace(
                "{urgency}",
                pick(rng, &["LIMITED TIME", "ACT NOW", "ENDING SOON", "TODAY ONLY"]),
            )
            .replace("{item}", pick(rng, &["order", "cart", "wishlist", "items"]))
            .replace(
                "{topic}",
                pick(rng, &["Tech News", "Fashion Updates", "Travel Deals", "Food Recipes"]),
            )
            .replace("{num}", &rng.gen_range(1..=99).to_string());

        let multiple_urls = (0..3)
            .map(|i| format!("Product {}: https://shop.example.com/product{}", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let body = pick(rng, BOT_BODIES)
            .replace("{url}", &format!("https://bit.ly/sale{}", rng.gen_range(1000..=9999)))
            .replace("{percent}", &pick_num(rng, &[20, 30, 40, 50]).to_string())
            .replace(
                "{urgency_time}",
                pick(rng, &["tonight", "tomorrow", "this weekend"]),
            )
            .replace("{hours}", &pick_num(rng, &[12, 24, 48]).to_string())
            .replace("{multiple_urls}", &multiple_urls)
            .replace("{topic}", pick(rng, TOPICS))
            .replace("{topic_detail}", pick(rng, TOPICS));

        let domain = sender.split_once('@').map(|(_, d)| d).unwrap_or(sender);
        let mut headers = Headers::new();
        headers.insert("From", sender);
        headers.insert("Subject", subject.as_str());
        headers.insert("List-Unsubscribe", format!("<mailto:unsub@{}>", domain));
        headers.insert(
            "Precedence",
            if rng.gen::<f64>() > 0.3 { "bulk" } else { "normal" },
        );
        headers.insert("X-Mailer", pick(rng, BOT_MAILERS));
        if rng.gen::<f64>() > 0.5 {
            headers.insert("X-Campaign-Id", rng.gen_range(10000..=99999).to_string());
            headers.insert(
                "X-Marketing-Type",
                pick(rng, &["promotional", "newsletter", "transactional"]),
            );
        }

        let hour = if rng.gen::<f64>() > 0.4 {
            pick_num(rng, OFF_HOURS)
        } else {
            rng.gen_range(6..=19)
        };
        let day = self.anchor - Duration::days(rng.gen_range(0..=365));
        let received_at = at_time_of_day(day, hour, rng.gen_range(0..=59));

        let priority = if rng.gen::<bool>() {
            Priority::Low
        } else {
            Priority::Archive
        };
        let html = format!("<html><body><table>{}</table></body></html>", body);

        SyntheticEmail {
            message: RawMessage {
                id: self.next_id("bot"),
                sender: sender.to_string(),
                recipients: vec!["user@example.com".to_string()],
                subject,
                body_text: body,
                body_html: Some(html),
                headers,
                received_at: DateTime::<FixedOffset>::from(received_at),
                labels: Some(vec!["INBOX".to_string()]),
                thread_id: None,
            },
            origin: MessageOrigin::Bot,
            priority,
        }
    }

    pub fn generate_human_email(&mut self) -> SyntheticEmail {
        let rng = &mut self.rng;
        let sender = pick(rng, HUMAN_SENDERS);
        let topic = pick(rng, TOPICS);

        let subject = pick(rng, HUMAN_SUBJECTS)
            .replace("{topic}", topic)
            .replace(
                "{day}",
                pick(rng, &["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]),
            )
            .replace(
                "{action}",
                pick(rng, &["the update", "your help", "the meeting", "the info"]),
            );

        let body = pick(rng, HUMAN_BODIES)
            .replace("{topic}", topic)
            .replace(
                "{time_suggestion}",
                pick(
                    rng,
                    &["tomorrow afternoon", "next Tuesday", "after 2pm", "Wednesday morning"],
                ),
            )
            .replace("{name}", pick(rng, NAMES))
            .replace(
                "{question}",
                pick(
                    rng,
                    &[
                        "Do you have the latest numbers?",
                        "When can we schedule this?",
                        "Did you receive my last email?",
                        "What's the status on this?",
                    ],
                ),
            )
            .replace("{day}", pick(rng, &["next week", "this Friday", "tomorrow"]));

        let mut headers = Headers::new();
        headers.insert("From", sender);
        headers.insert("Subject", subject.as_str());
        headers.insert(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        );
        if rng.gen::<f64>() > 0.5 {
            let reply_to = format!("<msg_{}@example.com>", rng.gen_range(1000..=9999));
            headers.insert("In-Reply-To", reply_to.as_str());
            headers.insert("References", reply_to);
        }

        let mut day = self.anchor - Duration::days(rng.gen_range(0..=90));
        while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            day -= Duration::days(1);
        }
        let received_at = at_time_of_day(day, rng.gen_range(9..=17), rng.gen_range(0..=59));

        let labels = if rng.gen::<f64>() > 0.7 {
            vec!["INBOX".to_string(), "IMPORTANT".to_string()]
        } else {
            vec!["INBOX".to_string()]
        };
        let thread_id = format!("thread_{}", rng.gen_range(1000..=9999));
        let priority = match rng.gen_range(0..3) {
            0 => Priority::Critical,
            1 => Priority::Important,
            _ => Priority::Normal,
        };

        SyntheticEmail {
            message: RawMessage {
                id: self.next_id("human"),
                sender: sender.to_string(),
                recipients: vec!["user@example.com".to_string()],
                subject,
                body_text: body,
                body_html: None,
                headers,
                received_at: DateTime::<FixedOffset>::from(received_at),
                labels: Some(labels),
                thread_id: Some(thread_id),
            },
            origin: MessageOrigin::Human,
            priority,
        }
    }

    /// `floor(n * bot_ratio)` bots and the rest humans, shuffled, with
    /// `"bot"`/`"human"` labels
    pub fn generate_dataset(
        &mut self,
        num_emails: usize,
        bot_ratio: f64,
    ) -> (Vec<SyntheticEmail>, Vec<String>) {
        let num_bots = ((num_emails as f64 * bot_ratio.clamp(0.0, 1.0)).floor() as usize)
            .min(num_emails);
        let num_humans = num_emails - num_bots;

        tracing::info!(
            "Generating {} synthetic emails ({} bots, {} humans)",
            num_emails,
            num_bots,
            num_humans
        );

        let mut emails = Vec::with_capacity(num_emails);
        for _ in 0..num_bots {
            emails.push(self.generate_bot_email());
        }
        for _ in 0..num_humans {
            emails.push(self.generate_human_email());
        }
        emails.shuffle(&mut self.rng);

        let labels = emails
            .iter()
            .map(|email| email.origin.as_str().to_string())
            .collect();
        (emails, labels)
    }

    /// Same mix as [`generate_dataset`](Self::generate_dataset), labelled by priority
    pub fn generate_priority_dataset(
        &mut self,
        num_emails: usize,
    ) -> (Vec<SyntheticEmail>, Vec<String>) {
        let (emails, _) = self.generate_dataset(num_emails, DEFAULT_BOT_RATIO);
        let labels = emails
            .iter()
            .map(|email| email.priority.as_str().to_string())
            .collect();
        (emails, labels)
    }
}

/// Convenience wrapper around a freshly seeded generator
pub fn generate_training_data(
    num_samples: usize,
    bot_ratio: f64,
    seed: Option<u64>,
) -> (Vec<SyntheticEmail>, Vec<String>) {
    SyntheticEmailGenerator::new(seed).generate_dataset(num_samples, bot_ratio)
}
