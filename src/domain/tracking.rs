//! Email-open tracking request model.
//!
//! Everything here is pure: the request is parsed from already-extracted
//! query values and header strings, the email client is picked by an
//! ordered rule table, and tracking ids are derived from a caller-supplied
//! clock reading plus a random source. The HTTP adapter and the dispatch
//! service build on top of these helpers.

use std::fmt;

use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_CAMPAIGN: &str = "general";
pub const UNKNOWN_IP: &str = "unknown";

const SUPPRESSED_AGENT_MARKER: &str = "mailmate";
const TRACKING_ID_PREFIX: &str = "email";
const TRACKING_SUFFIX_LEN: usize = 6;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Raw query string accepted by the pixel endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingQuery {
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub subject: Option<String>,
    pub campaign: Option<String>,
    pub id: Option<String>,
    pub test: Option<String>,
}

impl TrackingQuery {
    /// Builds the query from decoded `key=value` pairs. The first occurrence
    /// of a key wins, later repeats and unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "recipientName" => &mut query.recipient_name,
                "recipientEmail" => &mut query.recipient_email,
                "subject" => &mut query.subject,
                "campaign" => &mut query.campaign,
                "id" => &mut query.id,
                "test" => &mut query.test,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        query
    }
}

/// Header values the pixel endpoint cares about.
#[derive(Debug, Clone, Default)]
pub struct TrackingHeaders {
    pub user_agent: Option<String>,
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub referer: Option<String>,
}

/// A single pixel fetch after defaulting. Every field is untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRequest {
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub subject: Option<String>,
    pub campaign: Option<String>,
    pub custom_id: Option<String>,
    pub test: Option<String>,
    pub user_agent: String,
    pub ip_address: String,
    pub referer: String,
}

impl TrackingRequest {
    pub fn from_parts(query: TrackingQuery, headers: TrackingHeaders) -> Self {
        let ip_address = non_empty(headers.forwarded_for)
            .or_else(|| non_empty(headers.real_ip))
            .unwrap_or_else(|| UNKNOWN_IP.to_string());

        Self {
            recipient_name: non_empty(query.recipient_name),
            recipient_email: non_empty(query.recipient_email),
            subject: non_empty(query.subject),
            campaign: non_empty(query.campaign),
            custom_id: non_empty(query.id),
            test: non_empty(query.test),
            user_agent: headers.user_agent.unwrap_or_default(),
            ip_address,
            referer: headers.referer.unwrap_or_default(),
        }
    }

    /// MailMate prefetches remote images while indexing, which looks like an
    /// open. Requests carrying `test` are never suppressed.
    pub fn is_suppressed(&self) -> bool {
        self.test.is_none()
            && self
                .user_agent
                .to_ascii_lowercase()
                .contains(SUPPRESSED_AGENT_MARKER)
    }

    pub fn campaign_or_default(&self) -> &str {
        self.campaign.as_deref().unwrap_or(DEFAULT_CAMPAIGN)
    }

    /// The id reported as `emailId`: the caller's `id` when supplied, else a
    /// freshly generated one.
    pub fn tracking_id(&self, now: OffsetDateTime) -> String {
        match &self.custom_id {
            Some(id) => id.clone(),
            None => generate_tracking_id(now),
        }
    }
}

/// Analytics identity: the recipient email wins over any tracking id.
pub fn resolve_distinct_id<'a>(request: &'a TrackingRequest, tracking_id: &'a str) -> &'a str {
    request.recipient_email.as_deref().unwrap_or(tracking_id)
}

/// `email-<epoch millis>-<six base36 chars>`.
pub fn generate_tracking_id(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!(
        "{TRACKING_ID_PREFIX}-{millis}-{}",
        base36_suffix(Uuid::new_v4().as_u128())
    )
}

fn base36_suffix(mut entropy: u128) -> String {
    let mut suffix = String::with_capacity(TRACKING_SUFFIX_LEN);
    for _ in 0..TRACKING_SUFFIX_LEN {
        suffix.push(BASE36_DIGITS[(entropy % 36) as usize] as char);
        entropy /= 36;
    }
    suffix
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Email client guessed from request metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailClient {
    Thunderbird,
    Outlook,
    Gmail,
    AppleMail,
    MailMate,
    Unknown,
}

enum Signal {
    UserAgent(&'static str),
    Referer(&'static str),
}

/// Evaluated top to bottom; the first match wins.
const DETECTION_RULES: &[(Signal, EmailClient)] = &[
    (Signal::UserAgent("Thunderbird"), EmailClient::Thunderbird),
    (Signal::UserAgent("Outlook"), EmailClient::Outlook),
    (Signal::Referer("mail.google.com"), EmailClient::Gmail),
    (Signal::UserAgent("Apple-Mail"), EmailClient::AppleMail),
    (Signal::UserAgent("MailMate"), EmailClient::MailMate),
];

impl EmailClient {
    pub fn detect(user_agent: &str, referer: &str) -> Self {
        DETECTION_RULES
            .iter()
            .find(|(signal, _)| match signal {
                Signal::UserAgent(marker) => user_agent.contains(marker),
                Signal::Referer(marker) => referer.contains(marker),
            })
            .map(|(_, client)| *client)
            .unwrap_or(EmailClient::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailClient::Thunderbird => "Thunderbird",
            EmailClient::Outlook => "Outlook",
            EmailClient::Gmail => "Gmail",
            EmailClient::AppleMail => "Apple Mail",
            EmailClient::MailMate => "MailMate",
            EmailClient::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EmailClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
