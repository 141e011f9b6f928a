//! Event decoder — maps raw platform and campaign logs to typed events.
//!
//! Event catalogue:
//!
//! | Signature | Emitter |
//! |---|---|
//! | `CampaignCreated(address indexed campaign, address indexed founder, address token, uint256 goal)` | platform |
//! | `FundsClaimed(address indexed recipient, uint256 amount)` | campaign |
//! | `TokenAllowed(address indexed token)` | platform |
//! | `TokenDisallowed(address indexed token)` | platform |
//!
//! Decoding is pure. A log that fails to decode yields a [`DecodeError`]
//! and is skipped by the caller; it never affects other logs.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::keccak256;
use thiserror::Error;

use fundindex_core::types::RawLog;

pub const CAMPAIGN_CREATED: &str = "CampaignCreated(address,address,address,uint256)";
pub const FUNDS_CLAIMED: &str = "FundsClaimed(address,uint256)";
pub const TOKEN_ALLOWED: &str = "TokenAllowed(address)";
pub const TOKEN_DISALLOWED: &str = "TokenDisallowed(address)";
pub const GET_SUMMARY: &str = "getSummary()";

/// Per-log decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,

    #[error("unknown event topic {0}")]
    UnknownEvent(String),

    #[error("missing topic {index}")]
    MissingTopic { index: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("abi decode failed: {0}")]
    Abi(String),

    #[error("decoded value is not {0}")]
    UnexpectedValue(&'static str),

    #[error("invalid quantity {field}: {value}")]
    InvalidQuantity { field: &'static str, value: String },
}

/// `keccak256(signature)` as a `0x`-prefixed hex topic.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// 4-byte function selector for `signature`, as `0x` calldata.
pub fn selector(signature: &str) -> String {
    format!("0x{}", hex::encode(&keccak256(signature.as_bytes())[..4]))
}

/// Position of a log in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub address: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignCreated {
    pub campaign: String,
    pub founder: String,
    pub token: String,
    pub goal: String,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsClaimed {
    /// The emitting campaign contract.
    pub campaign: String,
    pub recipient: String,
    pub amount: String,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChange {
    pub token: String,
    pub allowed: bool,
    pub meta: LogMeta,
}

/// A decoded platform or campaign event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    CampaignCreated(CampaignCreated),
    FundsClaimed(FundsClaimed),
    Token(TokenChange),
}

/// Decoder with the catalogue's topic hashes precomputed.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    campaign_created: String,
    funds_claimed: String,
    token_allowed: String,
    token_disallowed: String,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            campaign_created: event_topic(CAMPAIGN_CREATED),
            funds_claimed: event_topic(FUNDS_CLAIMED),
            token_allowed: event_topic(TOKEN_ALLOWED),
            token_disallowed: event_topic(TOKEN_DISALLOWED),
        }
    }

    pub fn campaign_created_topic(&self) -> &str {
        &self.campaign_created
    }

    pub fn funds_claimed_topic(&self) -> &str {
        &self.funds_claimed
    }

    pub fn token_allowed_topic(&self) -> &str {
        &self.token_allowed
    }

    pub fn token_disallowed_topic(&self) -> &str {
        &self.token_disallowed
    }

    /// Decode any catalogue event.
    pub fn decode(&self, log: &RawLog) -> Result<PlatformEvent, DecodeError> {
        let topic0 = log.topics.first().ok_or(DecodeError::NoTopics)?;
        let meta = meta(log)?;
        if topic0.eq_ignore_ascii_case(&self.campaign_created) {
            let values = decode_data(&log.data, vec![DynSolType::Address, DynSolType::Uint(256)])?;
            Ok(PlatformEvent::CampaignCreated(CampaignCreated {
                campaign: topic_address(log, 1)?,
                founder: topic_address(log, 2)?,
                token: as_address(values.first())?,
                goal: as_uint(values.get(1))?,
                meta,
            }))
        } else if topic0.eq_ignore_ascii_case(&self.funds_claimed) {
            let values = decode_data(&log.data, vec![DynSolType::Uint(256)])?;
            Ok(PlatformEvent::FundsClaimed(FundsClaimed {
                campaign: meta.address.clone(),
                recipient: topic_address(log, 1)?,
                amount: as_uint(values.first())?,
                meta,
            }))
        } else if topic0.eq_ignore_ascii_case(&self.token_allowed)
            || topic0.eq_ignore_ascii_case(&self.token_disallowed)
        {
            Ok(PlatformEvent::Token(TokenChange {
                token: topic_address(log, 1)?,
                allowed: topic0.eq_ignore_ascii_case(&self.token_allowed),
                meta,
            }))
        } else {
            Err(DecodeError::UnknownEvent(topic0.clone()))
        }
    }
}

/// Lowercase `0x` form of an address string.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}

fn meta(log: &RawLog) -> Result<LogMeta, DecodeError> {
    Ok(LogMeta {
        address: normalize_address(&log.address),
        tx_hash: log.tx_hash.to_ascii_lowercase(),
        block_number: log.block_number_u64().ok_or_else(|| DecodeError::InvalidQuantity {
            field: "blockNumber",
            value: log.block_number.clone(),
        })?,
        log_index: log.log_index_u64().ok_or_else(|| DecodeError::InvalidQuantity {
            field: "logIndex",
            value: log.log_index.clone(),
        })?,
    })
}

fn decode_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| DecodeError::InvalidHex(format!("{s}: {e}")))
}

/// ABI-decode the non-indexed parameters.
fn decode_data(data: &str, types: Vec<DynSolType>) -> Result<Vec<DynSolValue>, DecodeError> {
    let bytes = decode_hex(data)?;
    let decoded = DynSolType::Tuple(types)
        .abi_decode(&bytes)
        .map_err(|e| DecodeError::Abi(e.to_string()))?;
    Ok(match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    })
}

fn topic_address(log: &RawLog, index: usize) -> Result<String, DecodeError> {
    let topic = log
        .topics
        .get(index)
        .ok_or(DecodeError::MissingTopic { index })?;
    let value = DynSolType::Address
        .abi_decode(&decode_hex(topic)?)
        .map_err(|e| DecodeError::Abi(format!("topic {index}: {e}")))?;
    as_address(Some(&value))
}

fn as_address(value: Option<&DynSolValue>) -> Result<String, DecodeError> {
    match value {
        Some(DynSolValue::Address(addr)) => Ok(format!("0x{}", hex::encode(addr))),
        _ => Err(DecodeError::UnexpectedValue("an address")),
    }
}

fn as_uint(value: Option<&DynSolValue>) -> Result<String, DecodeError> {
    match value {
        Some(DynSolValue::Uint(v, _)) => Ok(v.to_string()),
        _ => Err(DecodeError::UnexpectedValue("an unsigned integer")),
    }
}
