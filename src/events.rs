//! Event normalization and ledger folding
//!
//! Raw contract logs arrive as loosely-shaped records: a kind discriminant
//! string plus an untyped payload map. `normalize` maps each record onto a
//! closed domain event type, coercing every amount through `Quantity` at
//! the boundary. `fold` then reduces a full log history into an
//! `EventLedger`: per-buyer aggregated purchases, a flat withdrawal list,
//! and flat lifecycle/ownership lists.
//!
//! `fold` is a pure function of its input list and is always re-run from
//! scratch on a fresh fetch. It is never applied incrementally to a
//! previous ledger, because a newer fetch may return a superset, a
//! reordering, or a reorg-corrected history. Per-buyer totals are
//! recomputed as sums over the detail list on every insertion, never
//! drifted incrementally, which keeps duplicate or re-ordered delivery
//! from corrupting the aggregate.

use crate::contracts::address_eq;
use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Pool round event kinds.
pub const TICKETS_BOUGHT: &str = "TicketsBought";
pub const WITHDRAWN: &str = "Withdrawn";
pub const POOL_LOCKED: &str = "PoolLocked";
pub const POOL_UNLOCKED: &str = "PoolUnlocked";
pub const POOL_COMPLETED: &str = "PoolCompleted";
pub const OWNERSHIP_TRANSFERRED: &str = "OwnershipTransferred";

// Pool manager event kinds.
pub const POOL_CREATED: &str = "PoolCreated";
pub const LOCK_DURATION_CHANGED: &str = "LockDurationChanged";
pub const OPEN_DURATION_CHANGED: &str = "OpenDurationChanged";
pub const TICKET_PRICE_CHANGED: &str = "TicketPriceChanged";
pub const FEE_FRACTION_CHANGED: &str = "FeeFractionChanged";
pub const ALLOW_LOCK_ANYTIME_CHANGED: &str = "AllowLockAnytimeChanged";

/// One raw log record as returned by the provider, mirroring a web3
/// `EventData`. Payload fields live in `return_values` untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub event: String,
    pub address: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub transaction_index: u32,
    #[serde(default)]
    pub return_values: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Discriminant not known to this client version. Dropped silently by
    /// `fold` for forward compatibility with future event kinds.
    UnknownKind(String),
    /// A required payload field was absent or of the wrong shape for the
    /// declared kind. Dropped (with a warning) by `fold`; historical logs
    /// from a long-lived contract may carry variants this client does not
    /// fully understand.
    MalformedEvent {
        kind: String,
        field: &'static str,
    },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::UnknownKind(kind) => write!(f, "Unknown event kind: {}", kind),
            NormalizeError::MalformedEvent { kind, field } => {
                write!(f, "Malformed {} event: bad or missing field {:?}", kind, field)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// A normalized event: the common envelope plus the typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    /// Emitting contract address.
    pub address: String,
    pub transaction_hash: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventKind {
    TicketsBought {
        buyer: String,
        count: u64,
        total_price: Quantity,
    },
    Withdrawn {
        destination: String,
        amount: Quantity,
    },
    PoolLocked,
    PoolUnlocked,
    PoolCompleted,
    OwnershipTransferred {
        previous_owner: String,
        new_owner: String,
    },
    PoolCreated {
        number: u64,
        pool: String,
    },
    LockDurationChanged {
        blocks: u64,
    },
    OpenDurationChanged {
        blocks: u64,
    },
    TicketPriceChanged {
        price: Quantity,
    },
    FeeFractionChanged {
        fraction: Quantity,
    },
    AllowLockAnytimeChanged {
        allowed: bool,
    },
}

/// Payload fields arrive as strings or JSON numbers depending on the
/// provider; accept both.
fn field_str(values: &Value, kind: &str, field: &'static str) -> Result<String, NormalizeError> {
    match values.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(NormalizeError::MalformedEvent {
            kind: kind.to_string(),
            field,
        }),
    }
}

fn field_quantity(
    values: &Value,
    kind: &str,
    field: &'static str,
) -> Result<Quantity, NormalizeError> {
    let raw = field_str(values, kind, field)?;
    Quantity::from_raw(&raw).map_err(|_| NormalizeError::MalformedEvent {
        kind: kind.to_string(),
        field,
    })
}

fn field_u64(values: &Value, kind: &str, field: &'static str) -> Result<u64, NormalizeError> {
    let raw = field_str(values, kind, field)?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| NormalizeError::MalformedEvent {
            kind: kind.to_string(),
            field,
        })
}

fn field_bool(values: &Value, kind: &str, field: &'static str) -> Result<bool, NormalizeError> {
    match values.get(field) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s == "true" || s == "false" => Ok(s == "true"),
        _ => Err(NormalizeError::MalformedEvent {
            kind: kind.to_string(),
            field,
        }),
    }
}

/// Map a raw log record onto the closed domain event type, validating
/// required payload fields and coercing amounts through `Quantity`.
pub fn normalize(raw: &RawEvent) -> Result<DomainEvent, NormalizeError> {
    let values = &raw.return_values;
    let kind = match raw.event.as_str() {
        TICKETS_BOUGHT => EventKind::TicketsBought {
            buyer: field_str(values, TICKETS_BOUGHT, "sender")?,
            count: field_u64(values, TICKETS_BOUGHT, "count")?,
            total_price: field_quantity(values, TICKETS_BOUGHT, "totalPrice")?,
        },
        WITHDRAWN => EventKind::Withdrawn {
            destination: field_str(values, WITHDRAWN, "sender")?,
            amount: field_quantity(values, WITHDRAWN, "amount")?,
        },
        POOL_LOCKED => EventKind::PoolLocked,
        POOL_UNLOCKED => EventKind::PoolUnlocked,
        POOL_COMPLETED => EventKind::PoolCompleted,
        OWNERSHIP_TRANSFERRED => EventKind::OwnershipTransferred {
            previous_owner: field_str(values, OWNERSHIP_TRANSFERRED, "previousOwner")?,
            new_owner: field_str(values, OWNERSHIP_TRANSFERRED, "newOwner")?,
        },
        POOL_CREATED => EventKind::PoolCreated {
            number: field_u64(values, POOL_CREATED, "number")?,
            pool: field_str(values, POOL_CREATED, "pool")?,
        },
        LOCK_DURATION_CHANGED => EventKind::LockDurationChanged {
            blocks: field_u64(values, LOCK_DURATION_CHANGED, "durationInBlocks")?,
        },
        OPEN_DURATION_CHANGED => EventKind::OpenDurationChanged {
            blocks: field_u64(values, OPEN_DURATION_CHANGED, "durationInBlocks")?,
        },
        TICKET_PRICE_CHANGED => EventKind::TicketPriceChanged {
            price: field_quantity(values, TICKET_PRICE_CHANGED, "ticketPrice")?,
        },
        FEE_FRACTION_CHANGED => EventKind::FeeFractionChanged {
            fraction: field_quantity(values, FEE_FRACTION_CHANGED, "feeFractionFixedPoint18")?,
        },
        ALLOW_LOCK_ANYTIME_CHANGED => EventKind::AllowLockAnytimeChanged {
            allowed: field_bool(values, ALLOW_LOCK_ANYTIME_CHANGED, "allowLockAnytime")?,
        },
        other => return Err(NormalizeError::UnknownKind(other.to_string())),
    };

    Ok(DomainEvent {
        address: raw.address.clone(),
        transaction_hash: raw.transaction_hash.clone(),
        kind,
    })
}

/// One individual ticket purchase transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseDetail {
    pub hash: String,
    pub tickets: u64,
    pub total: Quantity,
}

/// One buyer's cumulative ticket purchases within a round. `tickets` and
/// `total` always equal the sums over `purchases`; they are recomputed from
/// the detail list whenever a detail is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purchase {
    pub buyer: String,
    /// Emitting round contract; buyers at different rounds never merge.
    pub address: String,
    pub tickets: u64,
    pub total: Quantity,
    pub purchases: Vec<PurchaseDetail>,
}

impl Purchase {
    fn recompute(&mut self) {
        self.tickets = self.purchases.iter().map(|d| d.tickets).sum();
        self.total = self
            .purchases
            .iter()
            .fold(Quantity::zero(), |acc, d| acc + d.total);
    }
}

/// One withdrawal transaction. Withdrawals are never aggregated or
/// de-duplicated; each transaction is distinct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal {
    pub destination: String,
    pub amount: Quantity,
    pub transaction_hash: String,
}

/// Envelope-only record for lock/unlock/complete events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub address: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipTransfer {
    pub address: String,
    pub transaction_hash: String,
    pub previous_owner: String,
    pub new_owner: String,
}

/// The folded, aggregated view of a round's historical events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventLedger {
    pub purchases: Vec<Purchase>,
    pub withdrawals: Vec<Withdrawal>,
    pub locks: Vec<LifecycleEvent>,
    pub unlocks: Vec<LifecycleEvent>,
    pub completions: Vec<LifecycleEvent>,
    pub ownership_transfers: Vec<OwnershipTransfer>,
}

impl EventLedger {
    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty()
            && self.withdrawals.is_empty()
            && self.locks.is_empty()
            && self.unlocks.is_empty()
            && self.completions.is_empty()
            && self.ownership_transfers.is_empty()
    }
}

/// Fold a full event history, in log order, into an `EventLedger`.
///
/// Pure function of the input list: the same list always produces the same
/// ledger. Unknown kinds are dropped silently; malformed events are dropped
/// with a warning. Both drops leave the rest of the fold intact.
pub fn fold(raw_events: &[RawEvent]) -> EventLedger {
    let mut ledger = EventLedger::default();

    for raw in raw_events {
        let event = match normalize(raw) {
            Ok(event) => event,
            Err(NormalizeError::UnknownKind(kind)) => {
                log::debug!("Dropping unrecognized event kind {:?}", kind);
                continue;
            }
            Err(err @ NormalizeError::MalformedEvent { .. }) => {
                log::warn!(
                    "Dropping malformed event in tx {}: {}",
                    raw.transaction_hash,
                    err
                );
                continue;
            }
        };

        apply(&mut ledger, event);
    }

    ledger
}

fn apply(ledger: &mut EventLedger, event: DomainEvent) {
    let DomainEvent {
        address,
        transaction_hash,
        kind,
    } = event;

    match kind {
        EventKind::TicketsBought {
            buyer,
            count,
            total_price,
        } => {
            let detail = PurchaseDetail {
                hash: transaction_hash,
                tickets: count,
                total: total_price,
            };
            let existing = ledger.purchases.iter().position(|p| {
                address_eq(&p.buyer, &buyer) && address_eq(&p.address, &address)
            });
            match existing {
                Some(index) => {
                    let purchase = &mut ledger.purchases[index];
                    purchase.purchases.push(detail);
                    purchase.recompute();
                }
                None => {
                    let mut purchase = Purchase {
                        buyer,
                        address,
                        tickets: 0,
                        total: Quantity::zero(),
                        purchases: vec![detail],
                    };
                    purchase.recompute();
                    ledger.purchases.push(purchase);
                }
            }
        }
        EventKind::Withdrawn {
            destination,
            amount,
        } => ledger.withdrawals.push(Withdrawal {
            destination,
            amount,
            transaction_hash,
        }),
        EventKind::PoolLocked => ledger.locks.push(LifecycleEvent {
            address,
            transaction_hash,
        }),
        EventKind::PoolUnlocked => ledger.unlocks.push(LifecycleEvent {
            address,
            transaction_hash,
        }),
        EventKind::PoolCompleted => ledger.completions.push(LifecycleEvent {
            address,
            transaction_hash,
        }),
        EventKind::OwnershipTransferred {
            previous_owner,
            new_owner,
        } => ledger.ownership_transfers.push(OwnershipTransfer {
            address,
            transaction_hash,
            previous_owner,
            new_owner,
        }),
        // Manager-level events carry no round ledger contribution.
        EventKind::PoolCreated { .. }
        | EventKind::LockDurationChanged { .. }
        | EventKind::OpenDurationChanged { .. }
        | EventKind::TicketPriceChanged { .. }
        | EventKind::FeeFractionChanged { .. }
        | EventKind::AllowLockAnytimeChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POOL: &str = "0x1111111111111111111111111111111111111111";
    const OTHER_POOL: &str = "0x2222222222222222222222222222222222222222";

    fn raw_event(kind: &str, address: &str, hash: &str, values: Value, block: u64) -> RawEvent {
        RawEvent {
            event: kind.to_string(),
            address: address.to_string(),
            transaction_hash: hash.to_string(),
            block_number: block,
            transaction_index: 0,
            return_values: values,
        }
    }

    fn bought(address: &str, hash: &str, buyer: &str, count: u64, total: u64, block: u64) -> RawEvent {
        raw_event(
            TICKETS_BOUGHT,
            address,
            hash,
            json!({ "sender": buyer, "count": count.to_string(), "totalPrice": total.to_string() }),
            block,
        )
    }

    #[test]
    fn test_normalize_tickets_bought() {
        let event = normalize(&bought(POOL, "0xaaa", "0xAA", 3, 30, 1)).unwrap();
        assert_eq!(event.address, POOL);
        assert_eq!(
            event.kind,
            EventKind::TicketsBought {
                buyer: "0xAA".to_string(),
                count: 3,
                total_price: Quantity::from_u64(30),
            }
        );
    }

    #[test]
    fn test_normalize_missing_field_is_malformed() {
        let raw = raw_event(
            TICKETS_BOUGHT,
            POOL,
            "0xaaa",
            json!({ "sender": "0xAA", "totalPrice": "30" }),
            1,
        );
        assert_eq!(
            normalize(&raw),
            Err(NormalizeError::MalformedEvent {
                kind: TICKETS_BOUGHT.to_string(),
                field: "count",
            })
        );
    }

    #[test]
    fn test_normalize_unknown_kind() {
        let raw = raw_event("SomeFutureEvent", POOL, "0xaaa", json!({}), 1);
        assert_eq!(
            normalize(&raw),
            Err(NormalizeError::UnknownKind("SomeFutureEvent".to_string()))
        );
    }

    #[test]
    fn test_normalize_accepts_numeric_payload_fields() {
        let raw = raw_event(
            TICKETS_BOUGHT,
            POOL,
            "0xaaa",
            json!({ "sender": "0xAA", "count": 3, "totalPrice": 30 }),
            1,
        );
        let event = normalize(&raw).unwrap();
        assert!(matches!(
            event.kind,
            EventKind::TicketsBought { count: 3, .. }
        ));
    }

    #[test]
    fn test_normalize_manager_parameter_events() {
        let price = raw_event(
            TICKET_PRICE_CHANGED,
            POOL,
            "0xaaa",
            json!({ "ticketPrice": "2000000000000000000" }),
            1,
        );
        let event = normalize(&price).unwrap();
        assert_eq!(
            event.kind,
            EventKind::TicketPriceChanged {
                price: Quantity::from_raw("2000000000000000000").unwrap(),
            }
        );

        let duration = raw_event(
            LOCK_DURATION_CHANGED,
            POOL,
            "0xbbb",
            json!({ "durationInBlocks": "240" }),
            2,
        );
        let event = normalize(&duration).unwrap();
        assert_eq!(event.kind, EventKind::LockDurationChanged { blocks: 240 });

        let fraction = raw_event(
            FEE_FRACTION_CHANGED,
            POOL,
            "0xccc",
            json!({ "feeFractionFixedPoint18": "50000000000000000" }),
            3,
        );
        let event = normalize(&fraction).unwrap();
        assert_eq!(
            event.kind,
            EventKind::FeeFractionChanged {
                fraction: Quantity::from_raw("50000000000000000").unwrap(),
            }
        );

        let allow = raw_event(
            ALLOW_LOCK_ANYTIME_CHANGED,
            POOL,
            "0xddd",
            json!({ "allowLockAnytime": true }),
            4,
        );
        let event = normalize(&allow).unwrap();
        assert_eq!(
            event.kind,
            EventKind::AllowLockAnytimeChanged { allowed: true }
        );
    }

    #[test]
    fn test_fold_groups_purchases_by_buyer() {
        let events = vec![
            bought(POOL, "0xaaa", "0xAA", 3, 30, 1),
            bought(POOL, "0xbbb", "0xAA", 2, 20, 2),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.purchases.len(), 1);
        let purchase = &ledger.purchases[0];
        assert_eq!(purchase.tickets, 5);
        assert_eq!(purchase.total, Quantity::from_u64(50));
        assert_eq!(purchase.purchases.len(), 2);
        // detail list preserves log order
        assert_eq!(purchase.purchases[0].hash, "0xaaa");
        assert_eq!(purchase.purchases[1].hash, "0xbbb");
    }

    #[test]
    fn test_fold_buyer_match_is_case_insensitive() {
        let events = vec![
            bought(POOL, "0xaaa", "0xAbCd", 1, 10, 1),
            bought(POOL, "0xbbb", "0xABCD", 1, 10, 2),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.purchases.len(), 1);
        assert_eq!(ledger.purchases[0].tickets, 2);
    }

    #[test]
    fn test_fold_never_merges_across_contracts() {
        let events = vec![
            bought(POOL, "0xaaa", "0xAA", 3, 30, 1),
            bought(OTHER_POOL, "0xbbb", "0xAA", 2, 20, 2),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.purchases.len(), 2);
        assert_eq!(ledger.purchases[0].tickets, 3);
        assert_eq!(ledger.purchases[1].tickets, 2);
    }

    #[test]
    fn test_fold_aggregate_is_order_independent() {
        let forward = vec![
            bought(POOL, "0xaaa", "0xAA", 3, 30, 1),
            bought(POOL, "0xbbb", "0xAA", 2, 20, 2),
        ];
        let reversed: Vec<RawEvent> = forward.iter().rev().cloned().collect();

        let a = fold(&forward);
        let b = fold(&reversed);
        assert_eq!(a.purchases[0].tickets, b.purchases[0].tickets);
        assert_eq!(a.purchases[0].total, b.purchases[0].total);
        // the detail lists differ in order, the aggregate does not
        assert_ne!(a.purchases[0].purchases, b.purchases[0].purchases);
    }

    #[test]
    fn test_fold_is_pure() {
        let events = vec![
            bought(POOL, "0xaaa", "0xAA", 3, 30, 1),
            raw_event(WITHDRAWN, POOL, "0xccc", json!({ "sender": "0xAA", "amount": "15" }), 3),
            raw_event(POOL_LOCKED, POOL, "0xddd", json!({}), 4),
        ];
        assert_eq!(fold(&events), fold(&events));
    }

    #[test]
    fn test_fold_duplicated_input_double_counts() {
        // fold trusts its input list; feeding the same history twice is a
        // caller bug and double-counts, which is why ledgers are always
        // rebuilt from a single fresh fetch.
        let events = vec![bought(POOL, "0xaaa", "0xAA", 3, 30, 1)];
        let doubled: Vec<RawEvent> = events.iter().chain(events.iter()).cloned().collect();
        assert_eq!(fold(&events).purchases[0].tickets, 3);
        assert_eq!(fold(&doubled).purchases[0].tickets, 6);
    }

    #[test]
    fn test_fold_withdrawals_are_a_flat_ledger() {
        let withdrawal = raw_event(
            WITHDRAWN,
            POOL,
            "0xccc",
            json!({ "sender": "0xAA", "amount": "15" }),
            3,
        );
        // identical transactions are distinct entries, no de-duplication
        let ledger = fold(&[withdrawal.clone(), withdrawal]);
        assert_eq!(ledger.withdrawals.len(), 2);
        assert_eq!(ledger.withdrawals[0].amount, Quantity::from_u64(15));
    }

    #[test]
    fn test_fold_drops_malformed_and_keeps_valid() {
        let bad = raw_event(
            TICKETS_BOUGHT,
            POOL,
            "0xbad",
            json!({ "sender": "0xAA", "totalPrice": "30" }),
            1,
        );
        let events = vec![
            bad,
            bought(POOL, "0xaaa", "0xAA", 3, 30, 2),
            bought(POOL, "0xbbb", "0xBB", 2, 20, 3),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.purchases.len(), 2);
        assert_eq!(ledger.purchases[0].tickets, 3);
        assert_eq!(ledger.purchases[1].tickets, 2);
    }

    #[test]
    fn test_fold_drops_unknown_kinds_silently() {
        let events = vec![
            raw_event("EventFromTheFuture", POOL, "0xfff", json!({}), 1),
            bought(POOL, "0xaaa", "0xAA", 1, 10, 2),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.purchases.len(), 1);
        assert_eq!(ledger.withdrawals.len(), 0);
    }

    #[test]
    fn test_fold_lifecycle_and_ownership_lists() {
        let events = vec![
            raw_event(POOL_LOCKED, POOL, "0x111", json!({}), 1),
            raw_event(POOL_UNLOCKED, POOL, "0x222", json!({}), 2),
            raw_event(POOL_COMPLETED, POOL, "0x333", json!({}), 3),
            raw_event(
                OWNERSHIP_TRANSFERRED,
                POOL,
                "0x444",
                json!({ "previousOwner": "0xAA", "newOwner": "0xBB" }),
                4,
            ),
        ];
        let ledger = fold(&events);
        assert_eq!(ledger.locks.len(), 1);
        assert_eq!(ledger.unlocks.len(), 1);
        assert_eq!(ledger.completions.len(), 1);
        assert_eq!(ledger.ownership_transfers.len(), 1);
        assert_eq!(ledger.ownership_transfers[0].new_owner, "0xBB");
    }

    #[test]
    fn test_raw_event_deserializes_web3_shape() {
        let json = r#"{
            "event": "Withdrawn",
            "address": "0x1111111111111111111111111111111111111111",
            "transactionHash": "0xccc",
            "blockNumber": 7,
            "transactionIndex": 2,
            "returnValues": { "sender": "0xAA", "amount": "15" }
        }"#;
        let raw: RawEvent = serde_json::from_str(json).unwrap();
        assert_eq!(raw.event, "Withdrawn");
        assert_eq!(raw.block_number, 7);
        let event = normalize(&raw).unwrap();
        assert!(matches!(event.kind, EventKind::Withdrawn { .. }));
    }
}
