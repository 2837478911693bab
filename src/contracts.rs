//! Typed adapters over the external contract surface
//!
//! The on-chain collaborators (pool manager, per-round pool, ERC20 token)
//! expose loosely-typed ABI call objects. This module pins that boundary
//! down to narrow traits with explicit raw DTOs, so the untyped data is
//! normalized exactly once, at receipt. Every amount crosses the boundary
//! as a raw base-unit decimal string and goes through `Quantity::from_raw`
//! before anything else touches it.
//!
//! Implementations of these traits own the actual transport (JSON-RPC,
//! injected wallet provider, test double). The aggregators only ever see
//! the traits.

use crate::events::RawEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Zero-address sentinel: "winner not yet determined".
pub const BLANK_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Case-insensitive hex address equality. The chain treats addresses
/// case-insensitively (checksum casing is display-only), so both sides are
/// lowercased before matching.
pub fn address_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

pub fn is_blank_address(address: &str) -> bool {
    address_eq(address, BLANK_ADDRESS)
}

#[derive(Debug)]
pub enum ProviderError {
    /// Transport-level failure (endpoint unreachable, timeout).
    Connection(String),
    /// A read call failed or returned an unusable response.
    Call(String),
    /// A submitted transaction was rejected or failed to mine.
    Transaction(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ProviderError::Call(msg) => write!(f, "Call error: {}", msg),
            ProviderError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Block range + optional event-kind filter for historical log queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub kind: Option<String>,
    pub from_block: u64,
    /// `None` means "latest".
    pub to_block: Option<u64>,
}

impl EventFilter {
    /// The full event history: every kind, from genesis to latest.
    pub fn all() -> Self {
        EventFilter {
            kind: None,
            from_block: 0,
            to_block: None,
        }
    }
}

/// `getInfo()` tuple of a pool round contract, verbatim field shapes.
/// All numeric fields arrive as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPoolInfo {
    pub entry_total: String,
    pub start_block: String,
    pub end_block: String,
    pub pool_state: String,
    pub winner: String,
    pub supply_balance_total: String,
    pub ticket_cost: String,
    pub participant_count: String,
    pub max_pool_size: String,
    pub estimated_interest_fixed_point_18: String,
    pub hash_of_secret: String,
}

/// `getEntry(address)` tuple of a pool round contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntryInfo {
    pub addr: String,
    pub amount: String,
    pub ticket_count: String,
    pub withdrawn: String,
}

/// `getInfo()` tuple of the pool manager contract. The underscore-prefixed
/// names mirror the ABI return parameter names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawManagerInfo {
    #[serde(rename = "_currentPool")]
    pub current_pool: String,
    #[serde(rename = "_openDurationInBlocks")]
    pub open_duration_in_blocks: String,
    #[serde(rename = "_lockDurationInBlocks")]
    pub lock_duration_in_blocks: String,
    #[serde(rename = "_ticketPrice")]
    pub ticket_price: String,
    #[serde(rename = "_feeFractionFixedPoint18")]
    pub fee_fraction_fixed_point_18: String,
    #[serde(rename = "_poolCount")]
    pub pool_count: String,
}

/// One pool round contract deployment.
///
/// Mutating calls submit a transaction from the given account and resolve
/// with the transaction hash once accepted by the provider; confirmation
/// tracking is a separate concern (see `confirm`).
#[async_trait]
pub trait PoolContract: Send + Sync {
    fn address(&self) -> &str;

    async fn get_info(&self) -> Result<RawPoolInfo, ProviderError>;
    async fn get_entry(&self, account: &str) -> Result<RawEntryInfo, ProviderError>;
    /// Gross winnings attributable to `account`, base units.
    async fn winnings(&self, account: &str) -> Result<String, ProviderError>;
    /// Winnings after fee deduction, base units.
    async fn net_winnings(&self) -> Result<String, ProviderError>;
    async fn fee_amount(&self) -> Result<String, ProviderError>;
    async fn owner(&self) -> Result<String, ProviderError>;
    async fn is_owner(&self, account: &str) -> Result<bool, ProviderError>;
    /// Historical logs in log order: ascending block number, then ascending
    /// transaction index within a block.
    async fn past_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, ProviderError>;

    async fn buy_tickets(&self, count: u64, from: &str) -> Result<String, ProviderError>;
    async fn lock(&self, from: &str, secret_hash: &str) -> Result<String, ProviderError>;
    async fn unlock(&self, from: &str) -> Result<String, ProviderError>;
    async fn complete(&self, from: &str, secret: &str) -> Result<String, ProviderError>;
    async fn withdraw(&self, from: &str) -> Result<String, ProviderError>;
}

/// The pool manager contract: round factory and shared configuration.
#[async_trait]
pub trait PoolManagerContract: Send + Sync {
    fn address(&self) -> &str;

    async fn get_info(&self) -> Result<RawManagerInfo, ProviderError>;
    async fn owner(&self) -> Result<String, ProviderError>;
    async fn is_owner(&self, account: &str) -> Result<bool, ProviderError>;
    /// Historical logs in log order; `PoolCreated` entries carry the round
    /// number and the round contract address.
    async fn past_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, ProviderError>;

    async fn create_pool(&self, from: &str) -> Result<String, ProviderError>;

    /// Parameter setters; owner-only, and only apply to subsequent rounds.
    /// Prices and fractions cross the boundary as raw base-unit strings.
    async fn set_ticket_price(&self, price: &str, from: &str) -> Result<String, ProviderError>;
    async fn set_lock_duration(&self, blocks: u64, from: &str) -> Result<String, ProviderError>;
    async fn set_open_duration(&self, blocks: u64, from: &str) -> Result<String, ProviderError>;
    async fn set_fee_fraction(&self, fraction: &str, from: &str) -> Result<String, ProviderError>;
}

/// The ERC20-like token backing ticket purchases.
#[async_trait]
pub trait TokenContract: Send + Sync {
    fn address(&self) -> &str;

    async fn allowance(&self, owner: &str, spender: &str) -> Result<String, ProviderError>;
    async fn balance_of(&self, account: &str) -> Result<String, ProviderError>;

    async fn approve(&self, spender: &str, amount: &str, from: &str)
        -> Result<String, ProviderError>;
    async fn decrease_allowance(
        &self,
        spender: &str,
        amount: &str,
        from: &str,
    ) -> Result<String, ProviderError>;
}

/// Wallet-injected chain access: the active account list and transaction
/// confirmation counts. The active account is an external input, never
/// owned state.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn accounts(&self) -> Result<Vec<String>, ProviderError>;
    /// Confirmation count for a mined transaction (0 while pending).
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ProviderError>;
    /// Handle to the pool round contract deployed at `address`.
    fn pool_at(&self, address: &str) -> Arc<dyn PoolContract>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_eq_is_case_insensitive() {
        assert!(address_eq(
            "0xABCDEF0123456789abcdef0123456789ABCDEF01",
            "0xabcdef0123456789ABCDEF0123456789abcdef01"
        ));
        assert!(!address_eq(
            "0xABCDEF0123456789abcdef0123456789ABCDEF01",
            "0xABCDEF0123456789abcdef0123456789ABCDEF02"
        ));
    }

    #[test]
    fn test_blank_address_sentinel() {
        assert!(is_blank_address(BLANK_ADDRESS));
        assert!(is_blank_address(
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(!is_blank_address(
            "0x0000000000000000000000000000000000000001"
        ));
    }

    #[test]
    fn test_manager_info_deserializes_abi_names() {
        let json = r#"{
            "_currentPool": "0x1111111111111111111111111111111111111111",
            "_openDurationInBlocks": "12",
            "_lockDurationInBlocks": "24",
            "_ticketPrice": "1000000000000000000",
            "_feeFractionFixedPoint18": "50000000000000000",
            "_poolCount": "3"
        }"#;
        let info: RawManagerInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.pool_count, "3");
        assert_eq!(info.ticket_price, "1000000000000000000");
    }
}
