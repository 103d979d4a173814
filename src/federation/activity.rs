//! Activity model
//!
//! Typed representation of an inbound ActivityPub activity and the
//! semantic rules an activity must satisfy before the relay accepts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use super::inbox::InboxRejection;

/// Canonical identifier of the public collection.
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Activity verbs understood by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityType {
    Follow,
    Create,
    Update,
    Delete,
    Announce,
    Undo,
    #[default]
    Unknown,
}

impl std::str::FromStr for ActivityType {
    type Err = std::convert::Infallible;

    /// Anything outside the known set is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Follow" => Self::Follow,
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            "Announce" => Self::Announce,
            "Undo" => Self::Undo,
            _ => Self::Unknown,
        })
    }
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "Follow",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Announce => "Announce",
            Self::Undo => "Undo",
            Self::Unknown => "Unknown",
        }
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        let Ok(activity_type) = value.parse::<Self>();
        Ok(activity_type)
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `object` of an activity
///
/// Either a bare identifier (`Follow`, `Undo`) or an embedded object
/// (`Create`, `Update`, `Delete`, `Announce`). Any other JSON shape is
/// kept as `Other` so that only the admission rules decide its fate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ActivityObject {
    Reference(String),
    Embedded(serde_json::Map<String, serde_json::Value>),
    Other(serde_json::Value),
}

/// Inbound activity
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    /// JSON-LD context (informational)
    #[serde(rename = "@context", default, deserialize_with = "one_or_many")]
    pub context: Vec<serde_json::Value>,
    #[serde(rename = "type", default)]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub object: Option<ActivityObject>,
    /// Advisory only; unparseable values read as `None`
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<String>,
}

/// Reasons a well-formed activity fails the relay's rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} activity must be addressed to the public collection")]
    NotPublic(ActivityType),

    #[error("activity object is not an embedded object")]
    MalformedObject,

    #[error("embedded object type must be Note, got {0:?}")]
    NotNote(Option<String>),

    #[error("Follow activity object must be the public collection")]
    FollowTargetNotPublic,
}

impl Activity {
    /// Decode an activity from raw body bytes.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Whether the public collection appears in `to` or `cc`.
    ///
    /// Exact match only.
    pub fn contains_public_addressing(&self) -> bool {
        self.to
            .iter()
            .chain(self.cc.iter())
            .any(|target| target == PUBLIC_COLLECTION)
    }

    /// The embedded object, for activity types that carry one.
    pub fn object_as_mapping(
        &self,
    ) -> Result<&serde_json::Map<String, serde_json::Value>, ValidationError> {
        match &self.object {
            Some(ActivityObject::Embedded(map)) => Ok(map),
            _ => Err(ValidationError::MalformedObject),
        }
    }

    /// Apply the relay's admission rules.
    pub fn validate(&self) -> Result<(), InboxRejection> {
        match self.activity_type {
            ActivityType::Create
            | ActivityType::Update
            | ActivityType::Delete
            | ActivityType::Announce => {
                if !self.contains_public_addressing() {
                    return Err(ValidationError::NotPublic(self.activity_type).into());
                }

                let object = self.object_as_mapping()?;
                match object.get("type").and_then(serde_json::Value::as_str) {
                    Some("Note") => Ok(()),
                    other => Err(ValidationError::NotNote(other.map(str::to_string)).into()),
                }
            }
            ActivityType::Follow => match &self.object {
                Some(ActivityObject::Reference(target)) if target == PUBLIC_COLLECTION => Ok(()),
                _ => Err(ValidationError::FollowTargetNotPublic.into()),
            },
            ActivityType::Undo => Ok(()),
            ActivityType::Unknown => Err(InboxRejection::UnsupportedActivityType),
        }
    }
}

/// RFC 3339 timestamp, or `None` for anything else.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc)))
}

/// Accept either a single value or an array of values.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(value: serde_json::Value) -> Activity {
        serde_json::from_value(value).expect("test activity should decode")
    }

    fn with_object(activity_type: &str, object: serde_json::Value, to: &[&str]) -> Activity {
        activity(json!({
            "@context": ["https://www.w3.org/ns/activitystreams"],
            "type": activity_type,
            "id": "https://remote.example/alice/8",
            "actor": "https://remote.example/alice",
            "object": object,
            "published": "2024-01-01T00:00:00Z",
            "to": to,
            "cc": to,
        }))
    }

    #[test]
    fn validate_follow_requires_public_collection_object() {
        let accepted = with_object("Follow", json!(PUBLIC_COLLECTION), &[PUBLIC_COLLECTION]);
        assert!(accepted.validate().is_ok());

        let empty = with_object("Follow", json!(""), &[PUBLIC_COLLECTION]);
        assert!(matches!(
            empty.validate(),
            Err(InboxRejection::SemanticValidationFailed(
                ValidationError::FollowTargetNotPublic
            ))
        ));

        let near_miss = with_object(
            "Follow",
            json!(format!("{PUBLIC_COLLECTION}/")),
            &[PUBLIC_COLLECTION],
        );
        assert!(near_miss.validate().is_err());

        let embedded = with_object("Follow", json!({ "id": PUBLIC_COLLECTION }), &[]);
        assert!(embedded.validate().is_err());
    }

    #[test]
    fn validate_public_note_for_object_carrying_types() {
        for activity_type in ["Create", "Update", "Delete", "Announce"] {
            let accepted =
                with_object(activity_type, json!({ "type": "Note" }), &[PUBLIC_COLLECTION]);
            assert!(
                accepted.validate().is_ok(),
                "{activity_type} with public Note should be accepted"
            );
        }
    }

    #[test]
    fn validate_rejects_non_note_object() {
        let create = with_object("Create", json!({ "type": "Unknown" }), &[PUBLIC_COLLECTION]);
        assert!(matches!(
            create.validate(),
            Err(InboxRejection::SemanticValidationFailed(ValidationError::NotNote(Some(t))))
                if t == "Unknown"
        ));

        let untyped = with_object("Create", json!({ "content": "hi" }), &[PUBLIC_COLLECTION]);
        assert!(matches!(
            untyped.validate(),
            Err(InboxRejection::SemanticValidationFailed(ValidationError::NotNote(None)))
        ));
    }

    #[test]
    fn validate_rejects_missing_public_addressing() {
        for expected in [
            ActivityType::Create,
            ActivityType::Update,
            ActivityType::Delete,
            ActivityType::Announce,
        ] {
            let unaddressed = with_object(expected.as_str(), json!({ "type": "Note" }), &[""]);
            assert!(
                matches!(
                    unaddressed.validate(),
                    Err(InboxRejection::SemanticValidationFailed(ValidationError::NotPublic(
                        found
                    ))) if found == expected
                ),
                "{expected} without public addressing should be rejected"
            );
        }
    }

    #[test]
    fn validate_reports_reference_object_as_malformed() {
        let announce = with_object(
            "Announce",
            json!("https://remote.example/notes/1"),
            &[PUBLIC_COLLECTION],
        );
        assert!(matches!(
            announce.validate(),
            Err(InboxRejection::SemanticValidationFailed(
                ValidationError::MalformedObject
            ))
        ));
    }

    #[test]
    fn validate_accepts_any_undo() {
        for object in [
            json!(""),
            json!({ "type": "Follow" }),
            json!(["a", "b"]),
            json!(42),
            json!(true),
            json!(null),
        ] {
            let undo = with_object("Undo", object.clone(), &[]);
            assert!(undo.validate().is_ok(), "Undo of {object} should be accepted");
        }

        let bare = activity(json!({ "type": "Undo" }));
        assert!(bare.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_type_regardless_of_addressing() {
        let unknown = with_object("Unknown", json!(""), &[PUBLIC_COLLECTION]);
        assert!(matches!(
            unknown.validate(),
            Err(InboxRejection::UnsupportedActivityType)
        ));

        let like = with_object("Like", json!({ "type": "Note" }), &[PUBLIC_COLLECTION]);
        assert_eq!(like.activity_type, ActivityType::Unknown);
        assert!(matches!(
            like.validate(),
            Err(InboxRejection::UnsupportedActivityType)
        ));
    }

    #[test]
    fn contains_public_addressing_checks_to_and_cc() {
        let cc_only = activity(json!({
            "type": "Create",
            "to": ["https://remote.example/alice/followers"],
            "cc": PUBLIC_COLLECTION,
        }));
        assert!(cc_only.contains_public_addressing());

        let prefix_only = activity(json!({
            "type": "Create",
            "to": ["https://www.w3.org/ns/activitystreams"],
        }));
        assert!(!prefix_only.contains_public_addressing());
    }

    #[test]
    fn decode_accepts_single_context_and_missing_fields() {
        let decoded = activity(json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Follow",
        }));
        assert_eq!(decoded.context.len(), 1);
        assert_eq!(decoded.activity_type, ActivityType::Follow);
        assert!(decoded.object.is_none());
        assert!(decoded.to.is_empty());
        assert!(decoded.published.is_none());
    }

    #[test]
    fn other_object_shapes_decode_but_fail_typed_rules() {
        let create = Activity::from_slice(
            br#"{"type":"Create","object":42,"to":"https://www.w3.org/ns/activitystreams#Public"}"#,
        )
        .expect("numeric object should decode");
        assert_eq!(create.object, Some(ActivityObject::Other(json!(42))));
        assert!(matches!(
            create.validate(),
            Err(InboxRejection::SemanticValidationFailed(
                ValidationError::MalformedObject
            ))
        ));

        let follow = with_object("Follow", json!([PUBLIC_COLLECTION]), &[]);
        assert!(matches!(
            follow.validate(),
            Err(InboxRejection::SemanticValidationFailed(
                ValidationError::FollowTargetNotPublic
            ))
        ));
    }

    #[test]
    fn published_is_advisory() {
        let parsed = activity(json!({
            "type": "Follow",
            "object": PUBLIC_COLLECTION,
            "published": "2024-01-01T00:00:00Z",
        }));
        assert!(parsed.published.is_some());

        for published in [json!("yesterday"), json!(1704067200), json!({ "at": "now" })] {
            let follow = activity(json!({
                "type": "Follow",
                "object": PUBLIC_COLLECTION,
                "published": published,
            }));
            assert!(follow.published.is_none());
            assert!(follow.validate().is_ok());
        }
    }
}
