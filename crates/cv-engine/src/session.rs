//! The active reader: key pair plus the channels derived from its identity.

use cv_crypto::{KeyPair, PublicKey};

/// Explicit per-caller context passed into every engine call.
#[derive(Debug, Clone)]
pub struct Session {
    keys: KeyPair,
}

impl Session {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    pub fn identity(&self) -> &str {
        self.keys.identity()
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn public(&self) -> &PublicKey {
        self.keys.public()
    }

    pub fn files_channel(&self) -> String {
        cv_core::files_channel(self.identity())
    }

    pub fn shares_channel(&self) -> String {
        cv_core::shares_channel(self.identity())
    }

    pub fn tags_channel(&self) -> String {
        cv_core::tags_channel(self.identity())
    }
}
