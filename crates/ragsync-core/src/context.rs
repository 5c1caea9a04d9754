//! Explicit per-call context: who is asking, and with which credential.
//!
//! Passed into the sync orchestrator and the answer assembler instead of
//! relying on ambient session state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque credential bundle handed to a document source.
///
/// Produced by whatever authorization flow the caller runs; the core never
/// inspects it beyond passing it along.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Free-form kind label (e.g. `"oauth"`, `"none"`).
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Credential {
    pub fn none() -> Self {
        Self {
            kind: "none".to_string(),
            token: None,
            extra: serde_json::Value::Null,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The owner a sync pass or a question runs for.
///
/// The owner key namespaces the vector index and the sync registry, and is
/// the principal used to filter search results.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessContext {
    owner: String,
    credential: Credential,
}

impl AccessContext {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            credential: Credential::none(),
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Principal used to post-filter search results.
    pub fn filter_principal(&self) -> &str {
        &self.owner
    }
}
