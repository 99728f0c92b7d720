use crate::provider::ChainId;
use itertools::Itertools;
use std::fmt;

pub const LOCAL_CHAIN_ID: &str = "1337";
pub const MUMBAI_CHAIN_ID: &str = "80001";

/// One network the application is willing to run against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedNetwork {
    pub id: ChainId,
    pub name: String,
}

impl AllowedNetwork {
    pub fn new(id: impl Into<ChainId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Exact-match allow-list of wallet networks. Adding a network is a data
/// change, not a code change.
#[derive(Clone, Debug)]
pub struct NetworkAllowList {
    entries: Vec<AllowedNetwork>,
}

impl NetworkAllowList {
    pub fn new(entries: Vec<AllowedNetwork>) -> Self {
        Self { entries }
    }

    pub fn validate(&self, network: &ChainId) -> Result<(), UnsupportedNetwork> {
        if self.entries.iter().any(|entry| entry.id == *network) {
            return Ok(());
        }
        Err(UnsupportedNetwork {
            network: network.clone(),
            expected: self.describe(),
        })
    }

    pub fn name_of(&self, network: &ChainId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == *network)
            .map(|entry| entry.name.as_str())
    }

    fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{} ({})", entry.name, entry.id))
            .join(", ")
    }
}

impl Default for NetworkAllowList {
    fn default() -> Self {
        Self::new(vec![
            AllowedNetwork::new(LOCAL_CHAIN_ID, "Localhost 8545"),
            AllowedNetwork::new(MUMBAI_CHAIN_ID, "Matic Mumbai"),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsupportedNetwork {
    pub network: ChainId,
    expected: String,
}

impl UnsupportedNetwork {
    /// Message shown in the network-error banner.
    pub fn user_message(&self) -> String {
        format!("Please connect your wallet to {}", self.expected)
    }
}

impl fmt::Display for UnsupportedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported network {}; expected one of: {}",
            self.network, self.expected
        )
    }
}

impl std::error::Error for UnsupportedNetwork {}
