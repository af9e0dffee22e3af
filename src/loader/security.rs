//! Auth-challenge handling (spec §4.3 "Auth challenges", §6 "SecurityPolicy").
//!
//! `SecurityPolicy` is an external-collaborator contract: the crate does not
//! implement TLS pinning or credential storage, it only defines the seam a host
//! application plugs into. [`BasicAuthSecurity`] is the one concrete instance this
//! crate ships, since HTTP Basic auth is ordinary protocol handling, not a pinning
//! algorithm (spec §1 scopes out "TLS pinning algorithms" specifically).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// A `WWW-Authenticate` challenge presented by the server.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub scheme: String,
    pub realm: Option<String>,
    pub status: u16,
}

/// A credential to answer a challenge with.
#[derive(Debug, Clone)]
pub enum Credential {
    Basic { username: String, password: SecretString },
    Bearer(SecretString),
    None,
}

/// What the loader should do in response to a challenge (spec §4.3).
pub enum Disposition {
    /// Supply a header value for the retried request and continue.
    UseHeader(String),
    /// Spawn an alt-request (e.g. a silent token refresh) before retrying.
    PerformAltRequest,
    /// Give up; surface the challenge as a terminal error.
    Reject,
}

/// Host-pluggable authentication contract (spec §6's "auth challenge" collaborator).
#[async_trait]
pub trait SecurityPolicy: Send + Sync {
    async fn credential_for(&self, challenge: &AuthChallenge) -> Credential;
    async fn disposition_for(&self, challenge: &AuthChallenge) -> Disposition {
        match self.credential_for(challenge).await {
            Credential::None => Disposition::Reject,
            credential => Disposition::UseHeader(encode_credential(&credential)),
        }
    }
}

fn encode_credential(credential: &Credential) -> String {
    match credential {
        Credential::Basic { username, password } => {
            let raw = format!("{username}:{}", password.expose_secret());
            format!("Basic {}", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw))
        }
        Credential::Bearer(token) => format!("Bearer {}", token.expose_secret()),
        Credential::None => String::new(),
    }
}

/// A concrete [`SecurityPolicy`] answering every challenge with the same fixed
/// HTTP Basic credentials.
pub struct BasicAuthSecurity {
    username: String,
    password: SecretString,
}

impl BasicAuthSecurity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[async_trait]
impl SecurityPolicy for BasicAuthSecurity {
    async fn credential_for(&self, _challenge: &AuthChallenge) -> Credential {
        Credential::Basic {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
