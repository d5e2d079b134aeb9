use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A channel message as far as purging is concerned: an id and a creation time.
///
/// The timestamp is `None` when the listing omitted it or sent something that
/// is not RFC 3339. Such messages are never treated as bulk-eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp: Some(timestamp),
        }
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parses_platform_timestamp() {
        let message: Message = serde_json::from_value(json!({
            "id": "1101",
            "timestamp": "2024-03-01T12:30:00.123000+00:00",
            "content": "ignored",
        }))
        .unwrap();

        assert_eq!(message.id, "1101");
        assert_eq!(
            message.timestamp.map(|t| t.timestamp()),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap().timestamp())
        );
    }

    #[test]
    fn test_bad_timestamp_becomes_none() {
        let message: Message =
            serde_json::from_value(json!({"id": "1", "timestamp": "yesterday"})).unwrap();
        assert_eq!(message.timestamp, None);

        let message: Message = serde_json::from_value(json!({"id": "2", "timestamp": 42})).unwrap();
        assert_eq!(message.timestamp, None);

        let message: Message = serde_json::from_value(json!({"id": "3"})).unwrap();
        assert_eq!(message.timestamp, None);
    }

    #[test]
    fn test_missing_id_is_an_error() {
        assert!(serde_json::from_value::<Message>(json!({"timestamp": null})).is_err());
    }
}
