//! Data models for access events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of tracked action on a share link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LinkPreview,
    OpenShare,
    OpenFolder,
    ViewFile,
    ViewFileWatermarked,
    DownloadFile,
    DownloadFolder,
    AccessDenied,
    /// Written by older clients before the event types above existed.
    /// The recorder never persists it.
    View,
    /// Legacy counterpart of `DownloadFile`, read-only like `View`.
    Download,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LinkPreview => "LINK_PREVIEW",
            EventType::OpenShare => "OPEN_SHARE",
            EventType::OpenFolder => "OPEN_FOLDER",
            EventType::ViewFile => "VIEW_FILE",
            EventType::ViewFileWatermarked => "VIEW_FILE_WATERMARKED",
            EventType::DownloadFile => "DOWNLOAD_FILE",
            EventType::DownloadFolder => "DOWNLOAD_FOLDER",
            EventType::AccessDenied => "ACCESS_DENIED",
            EventType::View => "VIEW",
            EventType::Download => "DOWNLOAD",
        }
    }

    /// Counts towards a link's views
    pub fn is_view(&self) -> bool {
        matches!(self, EventType::OpenShare | EventType::View)
    }

    /// Counts towards a link's downloads
    pub fn is_download(&self) -> bool {
        matches!(self, EventType::DownloadFile | EventType::Download)
    }

    /// Maps legacy variants onto the current ones.
    pub fn canonical(self) -> Self {
        match self {
            EventType::View => EventType::OpenShare,
            EventType::Download => EventType::DownloadFile,
            other => other,
        }
    }

    /// `VIEW` / `DOWNLOAD` for the types older dashboards understand,
    /// the event type itself otherwise.
    pub fn legacy_label(&self) -> &'static str {
        if self.is_view() {
            "VIEW"
        } else if self.is_download() {
            "DOWNLOAD"
        } else {
            self.as_str()
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Activity accepted by the legacy tracking facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegacyActivity {
    View,
    Download,
}

impl From<LegacyActivity> for EventType {
    fn from(activity: LegacyActivity) -> Self {
        match activity {
            LegacyActivity::View => EventType::OpenShare,
            LegacyActivity::Download => EventType::DownloadFile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    Expired,
    Revoked,
    QuotaExceeded,
    PasswordIncorrect,
    VpnBlocked,
    AccessDisabled,
    NotFound,
    Other,
}

/// Optional enrichment, context and risk signals of an event.
///
/// Shared by the input and the persisted record: absent fields are omitted
/// when serialized, so a stored record carries exactly the fields the caller
/// supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    // Geo / network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(
        rename = "accuracy_radius_km",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub accuracy_radius_km: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_datacenter: Option<bool>,
    #[serde(rename = "isVPN", default, skip_serializing_if = "Option::is_none")]
    pub is_vpn: Option<bool>,
    #[serde(
        rename = "location_quality",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub location_quality: Option<String>,

    // Request context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    // Risk / session signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_attempt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<DenialReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_changed: Option<bool>,
    /// Only field allowed to hold a raw address; set by callers doing
    /// session-hijack or rate-limit checks.
    #[serde(rename = "previousIP", default, skip_serializing_if = "Option::is_none")]
    pub previous_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reshare: Option<bool>,
    /// 0-100 likelihood that the visitor is a human
    #[serde(
        rename = "visitor_confidence",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub visitor_confidence: Option<u8>,
    /// Whether the client-side confirmation beacon fired
    #[serde(rename = "js_seen", default, skip_serializing_if = "Option::is_none")]
    pub js_seen: Option<bool>,
}

/// An access attempt as reported by a request handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEventInput {
    pub link_id: String,
    pub event_type: EventType,

    /// Raw client address. Only used to derive pseudonyms, never stored.
    #[serde(rename = "clientIP", default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    /// Pre-computed pseudonyms; derived from the address when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id_stable: Option<String>,

    #[serde(flatten)]
    pub details: EventDetails,
}

impl AccessEventInput {
    pub fn new(link_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            link_id: link_id.into(),
            event_type,
            client_ip: None,
            visitor_id: None,
            visitor_id_stable: None,
            details: EventDetails::default(),
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_details(mut self, details: EventDetails) -> Self {
        self.details = details;
        self
    }
}

/// The immutable, persisted form of an access event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEventRecord {
    pub link_id: String,
    /// Absent when the owning link could not be resolved at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub visitor_id: String,
    #[serde(default)]
    pub visitor_id_stable: String,
    #[serde(default)]
    pub ip_hash: String,
    /// Server write time, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub hour: String,
    #[serde(default)]
    pub minute: String,
    #[serde(flatten)]
    pub details: EventDetails,
}

/// Day, hour and minute bucket keys (UTC) for a write time
pub fn bucket_keys(at: DateTime<Utc>) -> (String, String, String) {
    (
        at.format("%Y-%m-%d").to_string(),
        at.format("%Y-%m-%dT%H").to_string(),
        at.format("%Y-%m-%dT%H:%M").to_string(),
    )
}

/// Normalized event for dashboards.
///
/// Every optional attribute is present: strings and numbers as `null`,
/// flags as `false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub id: String,
    pub link_id: String,
    pub owner_id: Option<String>,
    /// `VIEW` / `DOWNLOAD` / the event type, for older dashboards
    #[serde(rename = "type")]
    pub legacy_type: String,
    pub event_type: EventType,
    pub visitor_id: String,
    pub visitor_id_stable: String,
    pub ip_hash: String,
    pub timestamp: DateTime<Utc>,
    pub date: String,
    pub hour: String,
    pub minute: String,

    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub geoname_id: Option<u64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "accuracy_radius_km")]
    pub accuracy_radius_km: Option<u32>,
    pub isp: Option<String>,
    pub asn: Option<u32>,
    pub is_datacenter: bool,
    #[serde(rename = "isVPN")]
    pub is_vpn: bool,
    #[serde(rename = "location_quality")]
    pub location_quality: Option<String>,

    pub referer: Option<String>,
    pub referer_category: Option<String>,
    pub user_agent: Option<String>,
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    pub file_name: Option<String>,

    pub invalid_attempt: bool,
    pub denial_reason: Option<DenialReason>,
    pub ip_changed: bool,
    pub device_changed: bool,
    #[serde(rename = "previousIP")]
    pub previous_ip: Option<String>,
    pub previous_device: Option<String>,
    pub recipient_count: Option<u32>,
    pub is_reshare: bool,
    #[serde(rename = "visitor_confidence")]
    pub visitor_confidence: Option<u8>,
    #[serde(rename = "js_seen")]
    pub js_seen: bool,
}

impl EventDto {
    pub fn from_record(id: String, record: AccessEventRecord) -> Self {
        let d = record.details;
        Self {
            id,
            link_id: record.link_id,
            owner_id: record.owner_id,
            legacy_type: record.event_type.legacy_label().to_string(),
            event_type: record.event_type,
            visitor_id: record.visitor_id,
            visitor_id_stable: record.visitor_id_stable,
            ip_hash: record.ip_hash,
            timestamp: record.timestamp,
            date: record.date,
            hour: record.hour,
            minute: record.minute,

            country: d.country,
            city: d.city,
            region: d.region,
            geoname_id: d.geoname_id,
            latitude: d.latitude,
            longitude: d.longitude,
            accuracy_radius_km: d.accuracy_radius_km,
            isp: d.isp,
            asn: d.asn,
            is_datacenter: d.is_datacenter.unwrap_or(false),
            is_vpn: d.is_vpn.unwrap_or(false),
            location_quality: d.location_quality,

            referer: d.referer,
            referer_category: d.referer_category,
            user_agent: d.user_agent,
            file_id: d.file_id,
            folder_id: d.folder_id,
            file_name: d.file_name,

            invalid_attempt: d.invalid_attempt.unwrap_or(false),
            denial_reason: d.denial_reason,
            ip_changed: d.ip_changed.unwrap_or(false),
            device_changed: d.device_changed.unwrap_or(false),
            previous_ip: d.previous_ip,
            previous_device: d.previous_device,
            recipient_count: d.recipient_count,
            is_reshare: d.is_reshare.unwrap_or(false),
            visitor_confidence: d.visitor_confidence,
            js_seen: d.js_seen.unwrap_or(false),
        }
    }
}

/// Views and downloads of one link on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub views: u64,
    pub downloads: u64,
}
