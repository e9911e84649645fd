//! Wire messages for the presence channel.
//!
//! One enum covers both directions, discriminated by the `type` field.
//! Event names keep the mobile client's wire spelling.

use serde::{Deserialize, Serialize};

use crate::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresenceMessage {
    /// Client enables location tracking for a user.
    #[serde(rename = "location:join")]
    Join {
        #[serde(default)]
        user_id: Option<UserId>,
    },

    /// Client disables location tracking.
    #[serde(rename = "location:leave")]
    Leave {
        #[serde(default)]
        user_id: Option<UserId>,
    },

    /// Streamed position fix. The client stamps these; the server keeps its
    /// own clock and ignores the field.
    #[serde(rename = "location:update")]
    Update {
        #[serde(default)]
        user_id: Option<UserId>,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Server acknowledgment to the caller.
    #[serde(rename = "status")]
    Status { message: String },

    /// Server-reported failure for the triggering event.
    #[serde(rename = "error")]
    Error { message: String },

    /// Current neighbor list for whichever user the receiving connection
    /// belongs to.
    #[serde(rename = "location:nearby-users")]
    NearbyUsers { users: Vec<NearbyUser> },
}

/// One row of a `location:nearby-users` payload. Field names follow the
/// mobile client's `LocationUpdate` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyUser {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
    pub headline: Option<String>,
    pub avatar_data: serde_json::Value,
    pub is_active: bool,
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_update_event() {
        let raw = r#"{
            "type": "location:update",
            "user_id": 12,
            "latitude": 37.7749,
            "longitude": -122.4194,
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        match serde_json::from_str::<PresenceMessage>(raw).unwrap() {
            PresenceMessage::Update {
                user_id,
                latitude,
                longitude,
                ..
            } => {
                assert_eq!(user_id, Some(12));
                assert_eq!(latitude, Some(37.7749));
                assert_eq!(longitude, Some(-122.4194));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn missing_payload_fields_parse_as_none() {
        let raw = r#"{"type": "location:join"}"#;
        match serde_json::from_str::<PresenceMessage>(raw).unwrap() {
            PresenceMessage::Join { user_id } => assert_eq!(user_id, None),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn nearby_users_serializes_client_field_names() {
        let msg = PresenceMessage::NearbyUsers {
            users: vec![NearbyUser {
                user_id: 7,
                username: "JadeStoneGecko32".to_string(),
                headline: Some("hi".to_string()),
                avatar_data: serde_json::json!({"style": "big-smile"}),
                is_active: true,
                latitude: 37.0,
                longitude: -122.0,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"location:nearby-users""#));
        assert!(json.contains(r#""userId":7"#));
        assert!(json.contains(r#""avatar_data""#));
    }
}
