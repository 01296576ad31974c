//! Privacy-preserving visitor pseudonyms
//!
//! Client addresses are only ever fed through a keyed HMAC; the address
//! itself is never returned or retained.

use anyhow::{anyhow, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

/// Derives pseudonymous identifiers from a client address and user agent
pub trait VisitorIdentity: Send + Sync {
    /// One-way hash of an address
    fn hash_address(&self, ip: &str) -> String;

    /// Pseudonym that changes every UTC day
    fn rotating_visitor_id(&self, ip: &str, user_agent: &str, at: DateTime<Utc>) -> String;

    /// Pseudonym that stays the same across days
    fn stable_visitor_id(&self, ip: &str, user_agent: &str) -> String;

    /// Coarse traffic source of a referer URL
    fn categorize_referer(&self, referer: &str) -> Option<String>;
}

/// HMAC-SHA256 based [`VisitorIdentity`]
#[derive(Clone)]
pub struct HmacVisitorIdentity {
    mac: Hmac<Sha256>,
    /// Host of the application itself, for `internal` referers
    app_host: Option<String>,
}

const SEPARATOR: &[u8] = b"\x1f";
const VISITOR_ID_BYTES: usize = 16;

const EMAIL_HOSTS: &[&str] = &[
    "mail.google.com",
    "outlook.live.com",
    "outlook.office.com",
    "outlook.office365.com",
    "mail.yahoo.com",
    "mail.proton.me",
];
const MESSAGING_HOSTS: &[&str] = &[
    "slack.com",
    "teams.microsoft.com",
    "discord.com",
    "whatsapp.com",
    "wa.me",
    "t.me",
    "telegram.org",
    "messenger.com",
];
const SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "instagram.com",
    "t.co",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "lnkd.in",
    "reddit.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
];
const SEARCH_LABELS: &[&str] = &[
    "google",
    "bing",
    "duckduckgo",
    "yahoo",
    "baidu",
    "yandex",
    "ecosia",
];

impl HmacVisitorIdentity {
    /// Create an identity service keyed by `secret`
    ///
    /// Without a secret a random key is generated. Pseudonyms then change on
    /// every restart, which breaks multi-day recognition.
    pub fn new(secret: Option<&str>, app_host: Option<String>) -> Result<Self> {
        let key: Vec<u8> = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                warn!("VISITOR_ID_SECRET not set, using a random key (visitor ids will not survive restarts)");
                use rand::RngExt;
                let mut rng = rand::rng();
                (0..32).map(|_| rng.random::<u8>()).collect()
            }
        };

        let mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;

        Ok(Self {
            mac,
            app_host: app_host.map(|h| normalize_host(&h)),
        })
    }

    fn digest(&self, parts: &[&str], len: usize) -> String {
        let mut mac = self.mac.clone();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                mac.update(SEPARATOR);
            }
            mac.update(part.as_bytes());
        }
        let bytes = mac.finalize().into_bytes();
        BASE64_URL_SAFE_NO_PAD.encode(&bytes[..len.min(bytes.len())])
    }
}

impl VisitorIdentity for HmacVisitorIdentity {
    fn hash_address(&self, ip: &str) -> String {
        self.digest(&["ip", ip.trim()], usize::MAX)
    }

    fn rotating_visitor_id(&self, ip: &str, user_agent: &str, at: DateTime<Utc>) -> String {
        let day = at.format("%Y-%m-%d").to_string();
        self.digest(&["rot", &day, ip.trim(), user_agent], VISITOR_ID_BYTES)
    }

    fn stable_visitor_id(&self, ip: &str, user_agent: &str) -> String {
        self.digest(&["stable", ip.trim(), user_agent], VISITOR_ID_BYTES)
    }

    fn categorize_referer(&self, referer: &str) -> Option<String> {
        let host = extract_host(referer)?;

        let category = if self.app_host.as_deref() == Some(host.as_str()) {
            "internal"
        } else if host.starts_with("mail.") || matches_any(&host, EMAIL_HOSTS) {
            "email"
        } else if matches_any(&host, MESSAGING_HOSTS) {
            "messaging"
        } else if matches_any(&host, SOCIAL_HOSTS) {
            "social"
        } else if host.split('.').any(|label| SEARCH_LABELS.contains(&label)) {
            "search"
        } else {
            "other"
        };

        Some(category.to_string())
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Host part of a URL, lowercased and without `www.`
fn extract_host(url: &str) -> Option<String> {
    let url = url.trim();
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);

    let authority = without_scheme.split(&['/', '?', '#'][..]).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;

    if host.is_empty() {
        return None;
    }
    Some(normalize_host(host))
}

fn matches_any(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}
