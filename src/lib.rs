//! Poolflow - Pool Contract State Aggregation
//!
//! Read-side aggregation core for a pooled-savings lottery dapp. The
//! contracts own every interesting computation (ticket accounting, fee
//! split, winner selection); this crate owns the one piece of client-side
//! logic with real invariants: reconciling point-in-time contract reads
//! with historical event logs into consistent, immutable snapshots.
//!
//! # Architecture
//!
//! ```text
//! ChainProvider (injected wallet / RPC)
//!     ↓
//! PoolAggregator::load_manager (manager info + PoolCreated history)
//!     ↓ per round, concurrently
//! pool::load_round (7 concurrent reads, all-or-nothing)
//!     ↓
//! events::fold (log history → EventLedger)
//!     ↓
//! ManagerSnapshot { rounds: BTreeMap<round#, PoolRoundSnapshot> }
//! ```
//!
//! Every amount stays a 256-bit base-unit integer (`Quantity`) end to end;
//! every snapshot is rebuilt from scratch on refresh and never mutated.


pub mod config;
pub mod confirm;
pub mod contracts;
pub mod error;
pub mod events;
pub mod manager;
pub mod pool;
pub mod quantity;

pub use config::{AggregatorConfig, ConfigError};
pub use confirm::{CancelHandle, ConfirmOutcome, PendingTx};
pub use contracts::{
    address_eq, is_blank_address, ChainProvider, EventFilter, PoolContract, PoolManagerContract,
    ProviderError, TokenContract, BLANK_ADDRESS,
};
pub use error::AggregatorError;
pub use events::{fold, normalize, DomainEvent, EventKind, EventLedger, Purchase, RawEvent, Withdrawal};
pub use manager::{ManagerSnapshot, PoolAggregator, PoolManagerInfo};
pub use pool::{load_round, EntryInfo, PoolRoundInfo, PoolRoundSnapshot, PoolState};
pub use quantity::{Quantity, QuantityError};
