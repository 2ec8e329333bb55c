//! Registry of well-known payment networks.
//!
//! Payment requirements name their network either by a human-readable name
//! (`"base-sepolia"`) or by a CAIP-2 chain identifier (`"eip155:84532"`).
//! The funding flow only needs to know which chain family a requirement
//! belongs to, so this module maps both spellings to a [`NetworkFamily`].

use std::fmt;
use std::str::FromStr;

/// The chain families a funding link can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkFamily {
    /// EIP-155 (EVM) chains.
    Evm,
    /// Solana clusters.
    Solana,
}

impl NetworkFamily {
    /// Maps a CAIP-2 namespace to a family.
    #[must_use]
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            "eip155" => Some(Self::Evm),
            "solana" => Some(Self::Solana),
            _ => None,
        }
    }
}

/// A CAIP-2 chain identifier (`namespace:reference`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a chain ID from its components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Returns the namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

/// Error returned when parsing an invalid chain ID string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(Self::new(namespace, reference))
            }
            _ => Err(ChainIdFormatError(s.into())),
        }
    }
}

/// A known network definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g. "base-sepolia").
    pub name: &'static str,
    /// CAIP-2 namespace (e.g. "eip155").
    pub namespace: &'static str,
    /// Chain reference (e.g. "84532").
    pub reference: &'static str,
}

impl NetworkInfo {
    /// Returns this network's chain ID.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Networks commonly named in x402 payment requirements.
pub const KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo { name: "ethereum", namespace: "eip155", reference: "1" },
    NetworkInfo { name: "base", namespace: "eip155", reference: "8453" },
    NetworkInfo { name: "base-sepolia", namespace: "eip155", reference: "84532" },
    NetworkInfo { name: "polygon", namespace: "eip155", reference: "137" },
    NetworkInfo { name: "polygon-amoy", namespace: "eip155", reference: "80002" },
    NetworkInfo { name: "avalanche", namespace: "eip155", reference: "43114" },
    NetworkInfo { name: "avalanche-fuji", namespace: "eip155", reference: "43113" },
    NetworkInfo { name: "celo", namespace: "eip155", reference: "42220" },
    NetworkInfo { name: "sei", namespace: "eip155", reference: "1329" },
    NetworkInfo { name: "sei-testnet", namespace: "eip155", reference: "1328" },
    NetworkInfo { name: "iotex", namespace: "eip155", reference: "4689" },
    NetworkInfo { name: "solana", namespace: "solana", reference: "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp" },
    NetworkInfo { name: "solana-devnet", namespace: "solana", reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1" },
];

/// Looks up a known network by its human-readable name (ASCII case-insensitive).
#[must_use]
pub fn network_by_name(name: &str) -> Option<&'static NetworkInfo> {
    KNOWN_NETWORKS
        .iter()
        .find(|info| info.name.eq_ignore_ascii_case(name))
}

/// Classifies a network given either its name or its CAIP-2 identifier.
///
/// ```
/// use mcpay::networks::{network_family, NetworkFamily};
///
/// assert_eq!(network_family("base-sepolia"), Some(NetworkFamily::Evm));
/// assert_eq!(network_family("eip155:8453"), Some(NetworkFamily::Evm));
/// assert_eq!(network_family("solana-devnet"), Some(NetworkFamily::Solana));
/// assert_eq!(network_family("bitcoin"), None);
/// ```
#[must_use]
pub fn network_family(network: &str) -> Option<NetworkFamily> {
    let network = network.trim();
    if let Ok(chain_id) = network.parse::<ChainId>() {
        return NetworkFamily::from_namespace(chain_id.namespace());
    }
    network_by_name(network).and_then(|info| NetworkFamily::from_namespace(info.namespace))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_parse_and_display() {
        let chain_id: ChainId = "eip155:84532".parse().unwrap();
        assert_eq!(chain_id.namespace(), "eip155");
        assert_eq!(chain_id.reference(), "84532");
        assert_eq!(chain_id.to_string(), "eip155:84532");
    }

    #[test]
    fn test_chain_id_rejects_missing_parts() {
        assert!("eip155".parse::<ChainId>().is_err());
        assert!(":1".parse::<ChainId>().is_err());
        assert!("eip155:".parse::<ChainId>().is_err());
    }

    #[test]
    fn test_known_names_resolve_to_chain_ids() {
        let info = network_by_name("Base-Sepolia").unwrap();
        assert_eq!(info.chain_id(), ChainId::new("eip155", "84532"));
    }

    #[test]
    fn test_unknown_namespace_has_no_family() {
        assert_eq!(network_family("cosmos:cosmoshub-4"), None);
        assert_eq!(
            network_family("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
            Some(NetworkFamily::Solana)
        );
    }
}
