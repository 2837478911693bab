//! Manager state aggregation
//!
//! `PoolAggregator` is the top-level entry point. It enumerates every
//! historical round from the manager's `PoolCreated` events, loads each
//! round's snapshot concurrently, and assembles a `ManagerSnapshot` keyed
//! by round number. It also owns the thin transaction wrappers (buy, lock,
//! unlock, complete, withdraw, create pool, token approvals), each of
//! which resolves to a `PendingTx` for confirmation tracking.
//!
//! Snapshots are value objects: each `load_manager` call produces a fresh
//! tree from its own reads, so two concurrent refreshes never interfere.
//! Discarding a stale in-flight result is the caller's job (drop the
//! future or ignore the late snapshot).

use crate::config::AggregatorConfig;
use crate::confirm::PendingTx;
use crate::contracts::{
    address_eq, is_blank_address, ChainProvider, EventFilter, PoolContract, PoolManagerContract,
    ProviderError, RawManagerInfo, TokenContract,
};
use crate::error::AggregatorError;
use crate::events::{normalize, EventKind, NormalizeError};
use crate::pool::{load_round, quantity_field, u64_field, PoolRoundSnapshot};
use crate::quantity::Quantity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Manager-level configuration that applies to newly created rounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolManagerInfo {
    /// Address of the most recently created round contract; zero-address
    /// sentinel on a fresh deployment.
    pub current_pool: String,
    pub open_duration_blocks: u64,
    pub lock_duration_blocks: u64,
    pub ticket_price: Quantity,
    /// Owner fee as an 18-decimal fixed-point fraction.
    pub fee_fraction: Quantity,
    pub pool_count: u64,
}

impl TryFrom<RawManagerInfo> for PoolManagerInfo {
    type Error = AggregatorError;

    fn try_from(raw: RawManagerInfo) -> Result<Self, AggregatorError> {
        Ok(PoolManagerInfo {
            current_pool: raw.current_pool,
            open_duration_blocks: u64_field("_openDurationInBlocks", &raw.open_duration_in_blocks)?,
            lock_duration_blocks: u64_field("_lockDurationInBlocks", &raw.lock_duration_in_blocks)?,
            ticket_price: quantity_field("_ticketPrice", &raw.ticket_price)?,
            fee_fraction: quantity_field(
                "_feeFractionFixedPoint18",
                &raw.fee_fraction_fixed_point_18,
            )?,
            pool_count: u64_field("_poolCount", &raw.pool_count)?,
        })
    }
}

/// A historical change to one of the manager's round parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterChange {
    pub transaction_hash: String,
    pub change: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParameterValue {
    LockDuration { blocks: u64 },
    OpenDuration { blocks: u64 },
    TicketPrice { price: Quantity },
    FeeFraction { fraction: Quantity },
    AllowLockAnytime { allowed: bool },
}

/// Composite snapshot of the manager and every historical round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerSnapshot {
    pub info: PoolManagerInfo,
    /// Whether the caller is the manager contract's owner.
    pub is_manager: bool,
    /// Round snapshots keyed by round number, ascending.
    pub rounds: BTreeMap<u64, PoolRoundSnapshot>,
    /// Highest round number seen; `None` on a fresh deployment with no
    /// rounds yet, which is a representable state, not an error.
    pub current_round_id: Option<u64>,
    /// Caller's token allowance granted to the current round contract.
    pub allowance: Quantity,
    /// Caller's token balance.
    pub token_balance: Quantity,
    pub parameter_changes: Vec<ParameterChange>,
}

impl ManagerSnapshot {
    pub fn current_round(&self) -> Option<&PoolRoundSnapshot> {
        self.current_round_id.and_then(|id| self.rounds.get(&id))
    }
}

/// Top-level aggregation entry point over injected contract handles.
pub struct PoolAggregator {
    config: AggregatorConfig,
    provider: Arc<dyn ChainProvider>,
    manager: Arc<dyn PoolManagerContract>,
    token: Arc<dyn TokenContract>,
}

impl PoolAggregator {
    pub fn new(
        config: AggregatorConfig,
        provider: Arc<dyn ChainProvider>,
        manager: Arc<dyn PoolManagerContract>,
        token: Arc<dyn TokenContract>,
    ) -> Self {
        PoolAggregator {
            config,
            provider,
            manager,
            token,
        }
    }

    /// Load the full manager snapshot for the first account in `accounts`.
    ///
    /// Fails fast with `NoAccounts` before issuing any read when the list
    /// is empty. Per-round loads run concurrently; each one is internally
    /// all-or-nothing, and any failure aborts the whole snapshot.
    pub async fn load_manager(
        &self,
        accounts: &[String],
    ) -> Result<ManagerSnapshot, AggregatorError> {
        let caller = accounts
            .first()
            .ok_or(AggregatorError::NoAccounts)?
            .clone();

        let filter = EventFilter::all();
        let (raw_info, owner, manager_events) = tokio::try_join!(
            self.manager.get_info(),
            self.manager.owner(),
            self.manager.past_events(&filter),
        )?;
        let info = PoolManagerInfo::try_from(raw_info)?;
        let is_manager = address_eq(&caller, &owner);

        let mut creations: Vec<(u64, String)> = Vec::new();
        let mut parameter_changes = Vec::new();
        for raw in &manager_events {
            let event = match normalize(raw) {
                Ok(event) => event,
                Err(NormalizeError::UnknownKind(kind)) => {
                    log::debug!("Dropping unrecognized manager event kind {:?}", kind);
                    continue;
                }
                Err(err) => {
                    log::warn!(
                        "Dropping malformed manager event in tx {}: {}",
                        raw.transaction_hash,
                        err
                    );
                    continue;
                }
            };
            let change = match event.kind {
                EventKind::PoolCreated { number, pool } => {
                    creations.push((number, pool));
                    continue;
                }
                EventKind::LockDurationChanged { blocks } => {
                    ParameterValue::LockDuration { blocks }
                }
                EventKind::OpenDurationChanged { blocks } => {
                    ParameterValue::OpenDuration { blocks }
                }
                EventKind::TicketPriceChanged { price } => ParameterValue::TicketPrice { price },
                EventKind::FeeFractionChanged { fraction } => {
                    ParameterValue::FeeFraction { fraction }
                }
                EventKind::AllowLockAnytimeChanged { allowed } => {
                    ParameterValue::AllowLockAnytime { allowed }
                }
                _ => continue,
            };
            parameter_changes.push(ParameterChange {
                transaction_hash: event.transaction_hash,
                change,
            });
        }

        // Round numbers are assigned monotonically by the contract and are
        // the authoritative ordering key, not array index or block order.
        creations.sort_by_key(|(number, _)| *number);

        let mut round_tasks = Vec::with_capacity(creations.len());
        for (number, address) in creations {
            let pool = self.provider.pool_at(&address);
            let round_caller = caller.clone();
            round_tasks.push((
                number,
                tokio::spawn(async move { load_round(pool.as_ref(), &round_caller).await }),
            ));
        }

        let token_balance = quantity_field("balanceOf", &self.token.balance_of(&caller).await?)?;
        let allowance = if is_blank_address(&info.current_pool) {
            Quantity::zero()
        } else {
            quantity_field(
                "allowance",
                &self.token.allowance(&caller, &info.current_pool).await?,
            )?
        };

        let mut rounds = BTreeMap::new();
        for (number, task) in round_tasks {
            let snapshot = task.await.map_err(|err| {
                ProviderError::Call(format!("round {} load task failed: {}", number, err))
            })??;
            rounds.insert(number, snapshot);
        }
        let current_round_id = rounds.keys().next_back().copied();

        log::info!(
            "Loaded manager snapshot for {}: {} rounds, current round {:?}",
            caller,
            rounds.len(),
            current_round_id
        );

        Ok(ManagerSnapshot {
            info,
            is_manager,
            rounds,
            current_round_id,
            allowance,
            token_balance,
            parameter_changes,
        })
    }

    /// Load only the current round's snapshot, or `None` on a fresh
    /// deployment with no rounds yet.
    pub async fn load_current_round(
        &self,
        accounts: &[String],
    ) -> Result<Option<PoolRoundSnapshot>, AggregatorError> {
        let caller = accounts.first().ok_or(AggregatorError::NoAccounts)?;
        let info = PoolManagerInfo::try_from(self.manager.get_info().await?)?;
        if is_blank_address(&info.current_pool) {
            return Ok(None);
        }
        let pool = self.provider.pool_at(&info.current_pool);
        let snapshot = load_round(pool.as_ref(), caller).await?;
        Ok(Some(snapshot))
    }

    fn track(&self, hash: String) -> PendingTx {
        PendingTx::new(
            hash,
            Arc::clone(&self.provider),
            self.config.confirmation_threshold,
            self.config.poll_interval,
        )
    }

    pub async fn buy_tickets(
        &self,
        round: &dyn PoolContract,
        count: u64,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = round.buy_tickets(count, from).await?;
        Ok(self.track(hash))
    }

    pub async fn lock_round(
        &self,
        round: &dyn PoolContract,
        from: &str,
        secret_hash: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = round.lock(from, secret_hash).await?;
        Ok(self.track(hash))
    }

    pub async fn unlock_round(
        &self,
        round: &dyn PoolContract,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = round.unlock(from).await?;
        Ok(self.track(hash))
    }

    pub async fn complete_round(
        &self,
        round: &dyn PoolContract,
        from: &str,
        secret: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = round.complete(from, secret).await?;
        Ok(self.track(hash))
    }

    pub async fn withdraw(
        &self,
        round: &dyn PoolContract,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = round.withdraw(from).await?;
        Ok(self.track(hash))
    }

    /// Owner-only manager calls are prechecked to avoid submitting a
    /// transaction that would revert on-chain.
    async fn require_manager_owner(&self, method: &str, from: &str) -> Result<(), AggregatorError> {
        if !self.manager.is_owner(from).await? {
            return Err(AggregatorError::Provider(ProviderError::Transaction(
                format!("{}: {} is not the manager owner", method, from),
            )));
        }
        Ok(())
    }

    /// Create the next round.
    pub async fn create_pool(&self, from: &str) -> Result<PendingTx, AggregatorError> {
        self.require_manager_owner("create_pool", from).await?;
        let hash = self.manager.create_pool(from).await?;
        Ok(self.track(hash))
    }

    /// Set the ticket price for subsequent rounds.
    pub async fn set_ticket_price(
        &self,
        price: &Quantity,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        self.require_manager_owner("set_ticket_price", from).await?;
        let hash = self.manager.set_ticket_price(&price.to_raw(), from).await?;
        Ok(self.track(hash))
    }

    /// Set the lock duration in blocks for subsequent rounds.
    pub async fn set_lock_duration(
        &self,
        blocks: u64,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        self.require_manager_owner("set_lock_duration", from).await?;
        let hash = self.manager.set_lock_duration(blocks, from).await?;
        Ok(self.track(hash))
    }

    /// Set the open duration in blocks for subsequent rounds.
    pub async fn set_open_duration(
        &self,
        blocks: u64,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        self.require_manager_owner("set_open_duration", from).await?;
        let hash = self.manager.set_open_duration(blocks, from).await?;
        Ok(self.track(hash))
    }

    /// Set the owner fee fraction (18-decimal fixed point) for subsequent
    /// rounds.
    pub async fn set_fee_fraction(
        &self,
        fraction: &Quantity,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        self.require_manager_owner("set_fee_fraction", from).await?;
        let hash = self
            .manager
            .set_fee_fraction(&fraction.to_raw(), from)
            .await?;
        Ok(self.track(hash))
    }

    /// Grant the current round contract an allowance for ticket purchases.
    pub async fn approve(
        &self,
        spender: &str,
        amount: &Quantity,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = self.token.approve(spender, &amount.to_raw(), from).await?;
        Ok(self.track(hash))
    }

    pub async fn decrease_allowance(
        &self,
        spender: &str,
        amount: &Quantity,
        from: &str,
    ) -> Result<PendingTx, AggregatorError> {
        let hash = self
            .token
            .decrease_allowance(spender, &amount.to_raw(), from)
            .await?;
        Ok(self.track(hash))
    }
}
