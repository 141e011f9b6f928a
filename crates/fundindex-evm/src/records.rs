//! Domain records produced by the crowdfunding pipelines.
//!
//! Addresses are lowercase `0x` hex; uint256 amounts are decimal strings.

use serde::{Deserialize, Serialize};

/// A campaign discovered from the platform's creation event.
/// Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecord {
    pub campaign_address: String,
    pub founder: String,
    pub token: String,
    pub goal: String,
    pub tx_hash: String,
    pub block_number: u64,
    #[serde(default)]
    pub log_index: u64,
    /// Raw `getSummary()` return data, read once at discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A campaign's one-time funds withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsClaimRecord {
    pub campaign_address: String,
    pub recipient: String,
    pub amount: String,
    pub tx_hash: String,
    pub block_number: u64,
    #[serde(default)]
    pub log_index: u64,
}

/// An allow-listed payment token. Flipped in place by later
/// allow/disallow events; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: String,
    pub added_at_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at_block: Option<u64>,
    /// `true` while the token is allowed.
    pub status: bool,
}
