pub mod client;
pub mod facebook;
pub mod instagram;

pub use client::{
    BusinessIdentity, ContactProfile, ProviderClient, SyncedConversation, SyncedMessage,
};

use serde::{Deserialize, Serialize};

/// Provider enumeration for type-safe provider identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Instagram,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Instagram => "instagram",
            Provider::Facebook => "facebook",
        }
    }

    /// All supported providers, in configuration order.
    pub fn all() -> [Provider; 2] {
        [Provider::Instagram, Provider::Facebook]
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Provider::Instagram),
            "facebook" => Ok(Provider::Facebook),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
