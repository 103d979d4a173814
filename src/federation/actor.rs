//! Actor documents
//!
//! The relay's own `Service` actor, and the subset of a remote actor the
//! inbox needs to verify a signature.

use serde::{Deserialize, Serialize};

/// `publicKey` block of an actor document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyDocument {
    pub id: String,
    #[serde(default)]
    pub owner: String,
    pub public_key_pem: String,
}

/// Remote actor, as far as signature verification is concerned
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActor {
    pub id: String,
    #[serde(default)]
    pub inbox: Option<String>,
    pub public_key: PublicKeyDocument,
}

/// Shared inbox endpoint advertised by the relay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorEndpoints {
    pub shared_inbox: String,
}

/// Image attached to the relay actor
#[derive(Debug, Clone, Serialize)]
pub struct ActorImage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
}

impl ActorImage {
    fn new(url: &str) -> Self {
        Self {
            kind: "Image",
            url: url.to_string(),
        }
    }
}

/// The relay's own actor document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDocument {
    #[serde(rename = "@context")]
    pub context: [&'static str; 2],
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub preferred_username: String,
    pub summary: String,
    pub inbox: String,
    pub endpoints: ActorEndpoints,
    pub public_key: PublicKeyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<ActorImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ActorImage>,
}

impl ActorDocument {
    /// Build the relay actor served at `<base_url>/actor`.
    pub fn local(
        base_url: &str,
        actor: &crate::config::ActorConfig,
        public_key_pem: &str,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let actor_url = format!("{}/actor", base_url);
        let inbox_url = format!("{}/inbox", base_url);

        Self {
            context: [
                "https://www.w3.org/ns/activitystreams",
                "https://w3id.org/security/v1",
            ],
            id: actor_url.clone(),
            kind: "Service",
            name: actor.name.clone(),
            preferred_username: actor.username.clone(),
            summary: actor.summary.clone(),
            inbox: inbox_url.clone(),
            endpoints: ActorEndpoints {
                shared_inbox: inbox_url,
            },
            public_key: PublicKeyDocument {
                id: format!("{}#main-key", actor_url),
                owner: actor_url,
                public_key_pem: public_key_pem.to_string(),
            },
            icon: actor.icon.as_deref().map(ActorImage::new),
            image: actor.image.as_deref().map(ActorImage::new),
        }
    }
}
