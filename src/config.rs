//! Server configuration.
//!
//! Built from command-line flags in `main.rs`; library users construct it
//! directly.

use clap::ValueEnum;

use crate::tools::{CollisionPolicy, PROVIDER_NAMES};

/// Which provider set is exposed when no explicit list is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Exposure {
    /// Database, collection and document tools.
    #[default]
    Public,
    /// Everything, including analytics.
    All,
}

impl Exposure {
    /// Provider names for this exposure level.
    pub fn providers(self) -> &'static [&'static str] {
        match self {
            Exposure::Public => &PROVIDER_NAMES[..3],
            Exposure::All => PROVIDER_NAMES,
        }
    }
}

/// Configuration shared by registry construction and the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Exposure level
    pub exposure: Exposure,
    /// Explicit provider names; overrides `exposure` when non-empty
    pub providers: Vec<String>,
    /// Reject calls made before `initialize`
    pub require_initialize: bool,
    /// Tool name collision handling
    pub collision: CollisionPolicy,
}

impl ServerConfig {
    /// Provider names to instantiate, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        if self.providers.is_empty() {
            self.exposure
                .providers()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.providers.clone()
        }
    }
}
