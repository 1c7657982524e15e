//! Message record types and gateway wire coercion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messages received from parents
    Inbound,
    /// Messages sent by staff
    Outbound,
}

impl Direction {
    /// Both directions, in a fixed order.
    pub const ALL: [Direction; 2] = [Direction::Outbound, Direction::Inbound];

    /// Lowercase name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    /// Value of the gateway's `type` query parameter.
    pub fn gateway_type(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credit cost applied when the gateway omits one.
pub const DEFAULT_CREDIT_COST: u32 = 1;

/// One message event as reported by the gateway.
///
/// For outbound records `phone_number` is the recipient and `timestamp` the
/// send time; for inbound records they are the sender and receive time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessageRecord {
    pub id: String,
    pub direction: Direction,
    pub phone_number: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub credit_cost: u32,
}

impl RawMessageRecord {
    /// Build an outbound record with the default credit cost.
    pub fn outbound(
        id: impl Into<String>,
        phone_number: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            direction: Direction::Outbound,
            phone_number: phone_number.into(),
            body: body.into(),
            timestamp,
            status: status.map(String::from),
            credit_cost: DEFAULT_CREDIT_COST,
        }
    }

    /// Build an inbound record.
    pub fn inbound(
        id: impl Into<String>,
        phone_number: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            direction: Direction::Inbound,
            phone_number: phone_number.into(),
            body: body.into(),
            timestamp,
            status: None,
            credit_cost: 0,
        }
    }

    /// Override the credit cost.
    pub fn with_credit_cost(mut self, cost: u32) -> Self {
        self.credit_cost = cost;
        self
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// Message list body returned by the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessageList {
    #[serde(alias = "messages")]
    pub web_service_messages: Vec<WireMessage>,
}

/// Loose gateway message shape. Every field is optional and several have
/// alternative spellings depending on direction.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    #[serde(default, alias = "id")]
    pub message_id: Option<Value>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default, alias = "toNumber")]
    pub recipient_number: Option<String>,
    #[serde(default, alias = "body")]
    pub message: Option<String>,
    #[serde(default)]
    pub date_time_sent: Option<String>,
    #[serde(default)]
    pub date_time_received: Option<String>,
    #[serde(default, alias = "status")]
    pub message_status: Option<String>,
    #[serde(default)]
    pub credit_cost: Option<Value>,
}

impl WireMessage {
    /// Coerce into a closed record for `direction`.
    ///
    /// Returns `None` when the record has no counterpart number or no
    /// parseable timestamp.
    pub fn into_record(self, direction: Direction) -> Option<RawMessageRecord> {
        let (phone_number, primary_time, fallback_time) = match direction {
            Direction::Outbound => (
                self.recipient_number,
                self.date_time_sent,
                self.date_time_received,
            ),
            Direction::Inbound => (
                self.from_number,
                self.date_time_received,
                self.date_time_sent,
            ),
        };

        let phone_number = phone_number.filter(|n| !n.trim().is_empty())?;
        let timestamp = primary_time
            .as_deref()
            .and_then(parse_gateway_timestamp)
            .or_else(|| fallback_time.as_deref().and_then(parse_gateway_timestamp))?;

        Some(RawMessageRecord {
            id: self.message_id.map(value_to_string).unwrap_or_default(),
            direction,
            phone_number,
            body: self.message.unwrap_or_default(),
            timestamp,
            status: self.message_status.filter(|s| !s.trim().is_empty()),
            credit_cost: self
                .credit_cost
                .as_ref()
                .and_then(credit_from_value)
                .unwrap_or(DEFAULT_CREDIT_COST),
        })
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn credit_from_value(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, u32::MAX as f64) as u32)
}

/// Naive layouts the gateway has been seen to emit. Interpreted as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%d%H%M",
];

/// Parse a gateway timestamp.
pub fn parse_gateway_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wire(json: &str) -> WireMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_outbound_coercion() {
        let record = wire(
            r#"{
                "messageId": 4411,
                "recipientNumber": "+27831112222",
                "message": "Reminder: PTA meeting",
                "dateTimeSent": "2024-03-01T08:30:00Z",
                "messageStatus": "DELIVERED",
                "creditCost": 2
            }"#,
        )
        .into_record(Direction::Outbound)
        .unwrap();

        assert_eq!(record.id, "4411");
        assert_eq!(record.phone_number, "+27831112222");
        assert_eq!(record.status.as_deref(), Some("DELIVERED"));
        assert_eq!(record.credit_cost, 2);
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_inbound_uses_sender_and_receive_time() {
        let record = wire(
            r#"{
                "messageId": "abc",
                "fromNumber": "+27830000001",
                "recipientNumber": "+27839999999",
                "message": "Thanks",
                "dateTimeReceived": "2024-03-02 10:15:00"
            }"#,
        )
        .into_record(Direction::Inbound)
        .unwrap();

        assert_eq!(record.phone_number, "+27830000001");
        assert_eq!(record.direction, Direction::Inbound);
        assert_eq!(record.credit_cost, DEFAULT_CREDIT_COST);
        assert!(record.status.is_none());
    }

    #[test]
    fn test_missing_timestamp_is_dropped() {
        let record = wire(r#"{"recipientNumber": "+27831112222", "message": "hi"}"#)
            .into_record(Direction::Outbound);
        assert!(record.is_none());
    }

    #[test]
    fn test_missing_number_is_dropped() {
        let record = wire(r#"{"message": "hi", "dateTimeSent": "2024-03-01T08:30:00Z"}"#)
            .into_record(Direction::Outbound);
        assert!(record.is_none());
    }

    #[test]
    fn test_credit_cost_variants() {
        assert_eq!(credit_from_value(&serde_json::json!("3")), Some(3));
        assert_eq!(credit_from_value(&serde_json::json!(1.6)), Some(2));
        assert_eq!(credit_from_value(&serde_json::json!(-4)), Some(0));
        assert_eq!(credit_from_value(&serde_json::json!("n/a")), None);
        assert_eq!(credit_from_value(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_timestamp_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_gateway_timestamp("2024-03-01T10:30:00+02:00"), Some(expected));
        assert_eq!(parse_gateway_timestamp("2024-03-01 08:30:00"), Some(expected));
        assert_eq!(parse_gateway_timestamp("202403010830"), Some(expected));
        assert_eq!(
            parse_gateway_timestamp("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_gateway_timestamp("yesterday"), None);
        assert_eq!(parse_gateway_timestamp(""), None);
    }

    #[test]
    fn test_list_alias() {
        let list: WireMessageList = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(list.web_service_messages.is_empty());
        assert!(serde_json::from_str::<WireMessageList>(r#"{"error": "nope"}"#).is_err());
    }
}
