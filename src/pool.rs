//! Pool round state aggregation
//!
//! `load_round` assembles one consistent snapshot of a pool round from
//! seven independent contract reads plus the round's folded event history.
//! The reads are issued concurrently and the snapshot is all-or-nothing:
//! if any read fails, no partial snapshot is ever returned and the caller
//! retries the whole aggregation.

use crate::contracts::{address_eq, is_blank_address, EventFilter, PoolContract, RawEntryInfo, RawPoolInfo};
use crate::error::AggregatorError;
use crate::events::{fold, EventLedger};
use crate::quantity::Quantity;
use serde::Serialize;

/// Round lifecycle. The contract only ever advances this forward:
/// OPEN → LOCKED → UNLOCKED → COMPLETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolState {
    Open,
    Locked,
    Unlocked,
    Complete,
}

impl PoolState {
    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(PoolState::Open),
            1 => Some(PoolState::Locked),
            2 => Some(PoolState::Unlocked),
            3 => Some(PoolState::Complete),
            _ => None,
        }
    }
}

/// Point-in-time configuration and status of one pool round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRoundInfo {
    pub entry_total: Quantity,
    pub start_block: u64,
    pub end_block: u64,
    pub pool_state: PoolState,
    /// Zero-address sentinel until the round completes.
    pub winner: String,
    pub supply_balance_total: Quantity,
    pub ticket_cost: Quantity,
    pub participant_count: u64,
    pub max_pool_size: Quantity,
    pub estimated_interest: Quantity,
    pub hash_of_secret: String,
}

/// One participant's position within a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub address: String,
    pub amount: Quantity,
    pub ticket_count: u64,
    pub withdrawn: Quantity,
}

pub(crate) fn quantity_field(field: &str, raw: &str) -> Result<Quantity, AggregatorError> {
    Quantity::from_raw(raw)
        .map_err(|_| AggregatorError::MalformedQuantity(format!("{}={:?}", field, raw)))
}

pub(crate) fn u64_field(field: &str, raw: &str) -> Result<u64, AggregatorError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AggregatorError::MalformedQuantity(format!("{}={:?}", field, raw)))
}

impl TryFrom<RawPoolInfo> for PoolRoundInfo {
    type Error = AggregatorError;

    fn try_from(raw: RawPoolInfo) -> Result<Self, AggregatorError> {
        let state_index = u64_field("poolState", &raw.pool_state)?;
        let pool_state = PoolState::from_index(state_index).ok_or_else(|| {
            AggregatorError::MalformedQuantity(format!("poolState={}", state_index))
        })?;
        Ok(PoolRoundInfo {
            entry_total: quantity_field("entryTotal", &raw.entry_total)?,
            start_block: u64_field("startBlock", &raw.start_block)?,
            end_block: u64_field("endBlock", &raw.end_block)?,
            pool_state,
            winner: raw.winner,
            supply_balance_total: quantity_field("supplyBalanceTotal", &raw.supply_balance_total)?,
            ticket_cost: quantity_field("ticketCost", &raw.ticket_cost)?,
            participant_count: u64_field("participantCount", &raw.participant_count)?,
            max_pool_size: quantity_field("maxPoolSize", &raw.max_pool_size)?,
            estimated_interest: quantity_field(
                "estimatedInterestFixedPoint18",
                &raw.estimated_interest_fixed_point_18,
            )?,
            hash_of_secret: raw.hash_of_secret,
        })
    }
}

impl TryFrom<RawEntryInfo> for EntryInfo {
    type Error = AggregatorError;

    fn try_from(raw: RawEntryInfo) -> Result<Self, AggregatorError> {
        Ok(EntryInfo {
            address: raw.addr,
            amount: quantity_field("amount", &raw.amount)?,
            ticket_count: u64_field("ticketCount", &raw.ticket_count)?,
            withdrawn: quantity_field("withdrawn", &raw.withdrawn)?,
        })
    }
}

/// One consistent snapshot of a pool round for a specific caller.
///
/// Constructed fresh on every refresh cycle and discarded wholesale; holds
/// no back-references and no interior mutability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRoundSnapshot {
    /// Round contract address.
    pub address: String,
    pub info: PoolRoundInfo,
    pub entry: EntryInfo,
    pub fee: Quantity,
    pub gross_winnings: Quantity,
    pub net_winnings: Quantity,
    /// `gross_winnings - entry.withdrawn`. Guaranteed non-negative by the
    /// `Underflow` check in `load_round`.
    pub balance: Quantity,
    pub owner: String,
    pub is_owner: bool,
    pub is_winner: bool,
    pub events: EventLedger,
}

impl PoolRoundSnapshot {
    pub fn is_open(&self) -> bool {
        self.info.pool_state == PoolState::Open
    }

    pub fn is_locked(&self) -> bool {
        self.info.pool_state == PoolState::Locked
    }

    pub fn is_unlocked(&self) -> bool {
        self.info.pool_state == PoolState::Unlocked
    }

    pub fn is_complete(&self) -> bool {
        self.info.pool_state == PoolState::Complete
    }

    /// Whether the round has a determined winner (only after COMPLETE).
    pub fn has_winner(&self) -> bool {
        !is_blank_address(&self.info.winner)
    }
}

/// Load one round's snapshot for `caller`.
///
/// The seven reads have no ordering dependency and run concurrently; the
/// composition step waits for all of them. A failure in any read aborts
/// the whole call.
pub async fn load_round(
    pool: &dyn PoolContract,
    caller: &str,
) -> Result<PoolRoundSnapshot, AggregatorError> {
    let filter = EventFilter::all();
    let (raw_info, raw_entry, raw_winnings, raw_net, raw_fee, owner, raw_events) = tokio::try_join!(
        pool.get_info(),
        pool.get_entry(caller),
        pool.winnings(caller),
        pool.net_winnings(),
        pool.fee_amount(),
        pool.owner(),
        pool.past_events(&filter),
    )?;

    let info = PoolRoundInfo::try_from(raw_info)?;
    let entry = EntryInfo::try_from(raw_entry)?;
    let gross_winnings = quantity_field("winnings", &raw_winnings)?;
    let net_winnings = quantity_field("netWinnings", &raw_net)?;
    let fee = quantity_field("feeAmount", &raw_fee)?;

    // Withdrawn must never exceed gross winnings; if it does, the chain
    // state and our ledger disagree and the snapshot is unusable.
    let balance = gross_winnings.sub(&entry.withdrawn)?;

    let events = fold(&raw_events);

    log::debug!(
        "Loaded round {} for {}: state {:?}, {} purchases, {} withdrawals",
        pool.address(),
        caller,
        info.pool_state,
        events.purchases.len(),
        events.withdrawals.len(),
    );

    Ok(PoolRoundSnapshot {
        address: pool.address().to_string(),
        is_owner: address_eq(caller, &owner),
        is_winner: address_eq(caller, &info.winner),
        owner,
        info,
        entry,
        fee,
        gross_winnings,
        net_winnings,
        balance,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_info(state: &str) -> RawPoolInfo {
        RawPoolInfo {
            entry_total: "100".to_string(),
            start_block: "10".to_string(),
            end_block: "20".to_string(),
            pool_state: state.to_string(),
            winner: crate::contracts::BLANK_ADDRESS.to_string(),
            supply_balance_total: "100".to_string(),
            ticket_cost: "10".to_string(),
            participant_count: "2".to_string(),
            max_pool_size: "1000".to_string(),
            estimated_interest_fixed_point_18: "50000000000000000".to_string(),
            hash_of_secret: "0xdeadbeef".to_string(),
        }
    }

    #[test]
    fn test_pool_state_from_index() {
        assert_eq!(PoolState::from_index(0), Some(PoolState::Open));
        assert_eq!(PoolState::from_index(3), Some(PoolState::Complete));
        assert_eq!(PoolState::from_index(4), None);
    }

    #[test]
    fn test_info_conversion() {
        let info = PoolRoundInfo::try_from(raw_info("1")).unwrap();
        assert_eq!(info.pool_state, PoolState::Locked);
        assert_eq!(info.start_block, 10);
        assert_eq!(info.ticket_cost, Quantity::from_u64(10));
    }

    #[test]
    fn test_info_conversion_rejects_bad_numeric() {
        let mut raw = raw_info("0");
        raw.ticket_cost = "ten".to_string();
        assert!(matches!(
            PoolRoundInfo::try_from(raw),
            Err(AggregatorError::MalformedQuantity(_))
        ));
    }

    #[test]
    fn test_info_conversion_rejects_unknown_state() {
        assert!(matches!(
            PoolRoundInfo::try_from(raw_info("7")),
            Err(AggregatorError::MalformedQuantity(_))
        ));
    }

    #[test]
    fn test_entry_conversion() {
        let raw = RawEntryInfo {
            addr: "0xAA".to_string(),
            amount: "100".to_string(),
            ticket_count: "5".to_string(),
            withdrawn: "40".to_string(),
        };
        let entry = EntryInfo::try_from(raw).unwrap();
        assert_eq!(entry.amount, Quantity::from_u64(100));
        assert_eq!(entry.ticket_count, 5);
        assert_eq!(entry.withdrawn, Quantity::from_u64(40));
    }
}
