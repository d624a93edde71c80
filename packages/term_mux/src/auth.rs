//! Credential injection for the authenticate handshake.

/// Source of the session credential presented at link-open.
///
/// Read fresh on every link-open; the core never caches, persists, or
/// mutates the value. Where the secret actually lives is the embedder's
/// business.
pub trait CredentialProvider: Send + Sync + 'static {
    fn credential(&self) -> String;
}

/// Fixed-secret provider for embedders that hold the credential directly.
#[derive(Clone)]
pub struct StaticCredential {
    secret: String,
}

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> String {
        self.secret.clone()
    }
}
