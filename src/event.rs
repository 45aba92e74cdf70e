// 🏗️ Event Boundary
// Raw loosely-typed records in, closed well-typed events out

use crate::error::{LtvError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// EVENT KIND
// ============================================================================

/// EventKind - the `type` tag of an event record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Customer,
    SiteVisit,
    Image,
    Order,
    /// Any tag we do not score; carried so it can be logged
    Other(String),
}

impl EventKind {
    /// Map a wire tag to its kind. Unknown tags never fail.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "CUSTOMER" => EventKind::Customer,
            "SITE_VISIT" => EventKind::SiteVisit,
            "IMAGE" => EventKind::Image,
            "ORDER" => EventKind::Order,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// Wire tag, as it appears in input files
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Customer => "CUSTOMER",
            EventKind::SiteVisit => "SITE_VISIT",
            EventKind::Image => "IMAGE",
            EventKind::Order => "ORDER",
            EventKind::Other(tag) => tag.as_str(),
        }
    }
}

// ============================================================================
// RAW EVENT (input boundary)
// ============================================================================

/// RawEvent - one record exactly as loaded from JSON or CSV
///
/// Every field is optional here; `Event::from_raw` decides what is required.
/// Unknown fields (`verb`, `last_name`, `tags`, ...) are dropped by serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub customer_id: Option<String>,

    #[serde(default)]
    pub event_time: Option<String>,

    #[serde(default)]
    pub total_amount: Option<String>,
}

impl RawEvent {
    /// Create a record with type, identifier and time set
    pub fn new(event_type: &str, id: &str, event_time: &str) -> Self {
        let mut raw = RawEvent {
            event_type: Some(event_type.to_string()),
            event_time: Some(event_time.to_string()),
            ..Default::default()
        };
        if event_type == "CUSTOMER" {
            raw.key = Some(id.to_string());
        } else {
            raw.customer_id = Some(id.to_string());
        }
        raw
    }

    /// Builder pattern: add order amount
    pub fn with_amount(mut self, total_amount: &str) -> Self {
        self.total_amount = Some(total_amount.to_string());
        self
    }

    /// Build a record from one element of a JSON event array
    ///
    /// Identifier fields accept strings or bare numbers. A non-object element
    /// yields an empty record, which fails validation with "missing type".
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(obj) = value.as_object() else {
            return RawEvent::default();
        };

        let field = |name: &str| match obj.get(name) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(other) => Some(other.to_string()),
        };

        RawEvent {
            event_type: field("type"),
            key: field("key"),
            customer_id: field("customer_id"),
            event_time: field("event_time"),
            total_amount: field("total_amount"),
        }
    }
}

// ============================================================================
// EVENT (well-typed)
// ============================================================================

/// Event - validated record, one variant per known type
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Customer {
        key: String,
        event_time: DateTime<Utc>,
    },
    SiteVisit {
        customer_id: String,
        event_time: DateTime<Utc>,
    },
    Image {
        customer_id: String,
        event_time: DateTime<Utc>,
    },
    Order {
        customer_id: String,
        event_time: DateTime<Utc>,
        amount: f64,
    },
    /// Unscored type; still moves the customer's exit time
    Other {
        tag: String,
        customer_id: String,
        event_time: DateTime<Utc>,
    },
}

impl Event {
    /// Validate a raw record into a typed event
    ///
    /// Fails with `MalformedEvent` when `type`, the identifier, or
    /// `event_time` is missing or unparseable, or when an ORDER's
    /// `total_amount` has no numeric prefix.
    pub fn from_raw(raw: &RawEvent) -> Result<Event> {
        let tag = non_blank(raw.event_type.as_deref())
            .ok_or_else(|| LtvError::malformed("missing type"))?;
        let kind = EventKind::parse(tag);

        let (id_field, id) = match kind {
            EventKind::Customer => ("key", raw.key.as_deref()),
            _ => ("customer_id", raw.customer_id.as_deref()),
        };
        let id = non_blank(id)
            .ok_or_else(|| LtvError::malformed(format!("{} event missing {}", tag, id_field)))?
            .to_string();

        let time_str = non_blank(raw.event_time.as_deref())
            .ok_or_else(|| LtvError::malformed(format!("event for {} missing event_time", id)))?;
        let event_time = parse_event_time(time_str).ok_or_else(|| {
            LtvError::malformed(format!("unparseable event_time '{}' for {}", time_str, id))
        })?;

        let event = match kind {
            EventKind::Customer => Event::Customer { key: id, event_time },
            EventKind::SiteVisit => Event::SiteVisit {
                customer_id: id,
                event_time,
            },
            EventKind::Image => Event::Image {
                customer_id: id,
                event_time,
            },
            EventKind::Order => {
                let amount_str = raw.total_amount.as_deref().ok_or_else(|| {
                    LtvError::malformed(format!("ORDER for {} missing total_amount", id))
                })?;
                let amount = parse_amount(amount_str)?;
                Event::Order {
                    customer_id: id,
                    event_time,
                    amount,
                }
            }
            EventKind::Other(tag) => Event::Other {
                tag,
                customer_id: id,
                event_time,
            },
        };

        Ok(event)
    }

    pub fn customer_id(&self) -> &str {
        match self {
            Event::Customer { key, .. } => key,
            Event::SiteVisit { customer_id, .. }
            | Event::Image { customer_id, .. }
            | Event::Order { customer_id, .. }
            | Event::Other { customer_id, .. } => customer_id,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        match self {
            Event::Customer { event_time, .. }
            | Event::SiteVisit { event_time, .. }
            | Event::Image { event_time, .. }
            | Event::Order { event_time, .. }
            | Event::Other { event_time, .. } => *event_time,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Customer { .. } => EventKind::Customer,
            Event::SiteVisit { .. } => EventKind::SiteVisit,
            Event::Image { .. } => EventKind::Image,
            Event::Order { .. } => EventKind::Order,
            Event::Other { tag, .. } => EventKind::Other(tag.clone()),
        }
    }
}

impl TryFrom<&RawEvent> for Event {
    type Error = LtvError;

    fn try_from(raw: &RawEvent) -> Result<Self> {
        Event::from_raw(raw)
    }
}

/// Whitespace-only counts as missing; present values are kept verbatim
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Parse an event timestamp into UTC
///
/// Supports RFC 3339 (`2017-01-06T12:46:46.384Z`), offsets without a colon,
/// naive date-times with `T` or a space, `YYYY-MM-DD` and `MM/DD/YYYY`.
/// Naive values are taken as UTC.
pub fn parse_event_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

/// Parse the numeric prefix of `"<number> <currency>"`
///
/// Only the first whitespace-separated token is read; the currency code is
/// ignored. NaN and infinities are rejected.
pub fn parse_amount(total_amount: &str) -> Result<f64> {
    let token = total_amount
        .split_whitespace()
        .next()
        .ok_or_else(|| LtvError::malformed("empty total_amount"))?;

    let amount: f64 = token
        .parse()
        .map_err(|_| LtvError::malformed(format!("non-numeric total_amount '{}'", total_amount)))?;

    if !amount.is_finite() {
        return Err(LtvError::malformed(format!(
            "non-finite total_amount '{}'",
            total_amount
        )));
    }

    Ok(amount)
}

// ============================================================================
// TESTS
// ============================================================================
