//! Reservation Ledger
//!
//! Day-bucketed spend accounting over the shared store. A reservation is
//! the firewall's admission record for value that has been forwarded but
//! possibly not yet anchored; during that window the on-chain
//! `currentSpend` is stale, so this ledger is the sole authority for
//! admission decisions.
//!
//! Writes go through a bounded compare-and-swap loop. The limit check
//! happens inside the loop against the freshly read value, so no
//! interleaving of concurrent reserves can commit a sum above the daily
//! limit. Rollback clamps at zero. Day rollover needs no coordination: a
//! new UTC day reads a fresh key and the old one expires after 72 hours.

use alloy_primitives::U256;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use aegis_core::day::utc_day;
use aegis_core::types::Identity;

use crate::keys::spend_key;
use crate::kv::{KvStore, StoreError};

/// Bounded retries for one CAS loop.
pub const MAX_CAS_RETRIES: u32 = 6;

/// Reservation entries outlive their day by enough for cross-day
/// forensics, then expire on their own.
pub const RESERVATION_TTL: Duration = Duration::from_secs(72 * 3600);

/// Reservation failure
#[derive(Error, Debug)]
pub enum ReserveError {
    /// Admitting `requested` would push the day bucket past the limit
    #[error("limit exceeded: current {current} + requested {requested} > limit {limit}")]
    LimitExceeded {
        current: U256,
        requested: U256,
        limit: U256,
    },

    /// The watched key kept changing under us
    #[error("reservation aborted after {attempts} contended attempts")]
    RetriesExhausted { attempts: u32 },

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Day-bucketed reservation arithmetic over a shared store.
pub struct ReservationLedger<S: KvStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> Clone for ReservationLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: KvStore + ?Sized> ReservationLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reserve `amount` wei against today's bucket.
    ///
    /// Returns the committed bucket total. Fails with `LimitExceeded`
    /// without writing when the bucket cannot absorb the amount, and with
    /// `RetriesExhausted` when the CAS loop loses every attempt.
    pub async fn reserve(
        &self,
        identity: &Identity,
        amount: U256,
        daily_limit: U256,
    ) -> Result<U256, ReserveError> {
        let key = spend_key(identity, &utc_day());

        for attempt in 0..MAX_CAS_RETRIES {
            let current_raw = self.store.get(&key).await?;
            let current = decode_counter(current_raw.as_deref())?;

            let new = current.checked_add(amount).ok_or_else(|| {
                // A sum that overflows U256 exceeds any expressible limit.
                ReserveError::LimitExceeded {
                    current,
                    requested: amount,
                    limit: daily_limit,
                }
            })?;
            if new > daily_limit {
                return Err(ReserveError::LimitExceeded {
                    current,
                    requested: amount,
                    limit: daily_limit,
                });
            }

            let committed = self
                .store
                .compare_and_swap(
                    &key,
                    current_raw.as_deref(),
                    &new.to_string(),
                    Some(RESERVATION_TTL),
                )
                .await?;
            if committed {
                debug!(key = %key, total = %new, "reservation committed");
                return Ok(new);
            }
            debug!(key = %key, attempt, "reservation contended, retrying");
        }

        Err(ReserveError::RetriesExhausted {
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Release `amount` wei from today's bucket, clamping at zero.
    ///
    /// Used on forward failures and upstream errors; the refreshed TTL
    /// keeps the bucket observable for the rest of its window.
    pub async fn rollback(
        &self,
        identity: &Identity,
        amount: U256,
    ) -> Result<U256, ReserveError> {
        let key = spend_key(identity, &utc_day());

        for attempt in 0..MAX_CAS_RETRIES {
            let current_raw = self.store.get(&key).await?;
            let current = decode_counter(current_raw.as_deref())?;
            let new = current.saturating_sub(amount);

            let committed = self
                .store
                .compare_and_swap(
                    &key,
                    current_raw.as_deref(),
                    &new.to_string(),
                    Some(RESERVATION_TTL),
                )
                .await?;
            if committed {
                debug!(key = %key, total = %new, "rollback committed");
                return Ok(new);
            }
            debug!(key = %key, attempt, "rollback contended, retrying");
        }

        // Rollback retries exhausting is survivable: the bucket expires
        // with its day. Logged loudly so operators can reconcile sooner.
        warn!(key = %key, amount = %amount, "rollback abandoned after max retries");
        Err(ReserveError::RetriesExhausted {
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Current reserved total for today's bucket.
    pub async fn reserved_today(&self, identity: &Identity) -> Result<U256, ReserveError> {
        let key = spend_key(identity, &utc_day());
        let raw = self.store.get(&key).await?;
        decode_counter(raw.as_deref())
    }
}

fn decode_counter(raw: Option<&str>) -> Result<U256, ReserveError> {
    match raw {
        None => Ok(U256::ZERO),
        Some(s) => U256::from_str(s).map_err(|e| {
            ReserveError::Store(StoreError::Codec(format!(
                "corrupt spend counter {s:?}: {e}"
            )))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use aegis_core::types::EvmAddress;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    fn identity() -> Identity {
        Identity::new(
            EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
            EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap(),
        )
    }

    fn ledger() -> ReservationLedger<MemoryKv> {
        ReservationLedger::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_reserve_accumulates() {
        let ledger = ledger();
        let id = identity();
        let limit = U256::from(100u64);

        assert_eq!(
            ledger.reserve(&id, U256::from(40u64), limit).await.unwrap(),
            U256::from(40u64)
        );
        assert_eq!(
            ledger.reserve(&id, U256::from(60u64), limit).await.unwrap(),
            U256::from(100u64)
        );
        assert_eq!(
            ledger.reserved_today(&id).await.unwrap(),
            U256::from(100u64)
        );
    }

    #[tokio::test]
    async fn test_exact_quota_admits_one_over_rejects() {
        let ledger = ledger();
        let id = identity();
        let limit = U256::from(100u64);

        // Fill to exactly the limit
        ledger.reserve(&id, U256::from(100u64), limit).await.unwrap();

        // One wei over fails without committing
        let err = ledger.reserve(&id, U256::from(1u64), limit).await;
        assert!(matches!(err, Err(ReserveError::LimitExceeded { .. })));
        assert_eq!(
            ledger.reserved_today(&id).await.unwrap(),
            U256::from(100u64)
        );
    }

    #[tokio::test]
    async fn test_rollback_restores_and_clamps() {
        let ledger = ledger();
        let id = identity();
        let limit = U256::from(1000u64);

        ledger.reserve(&id, U256::from(70u64), limit).await.unwrap();
        assert_eq!(
            ledger.rollback(&id, U256::from(70u64)).await.unwrap(),
            U256::ZERO
        );

        // Unmatched rollbacks clamp instead of underflowing
        assert_eq!(
            ledger.rollback(&id, U256::from(999u64)).await.unwrap(),
            U256::ZERO
        );
        assert_eq!(ledger.reserved_today(&id).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn test_limit_check_uses_raw_u256() {
        let ledger = ledger();
        let id = identity();
        // A limit too precise for f64: 2^64 + 1
        let limit = U256::from(u128::from(u64::MAX) + 2);
        let amount = U256::from(u128::from(u64::MAX) + 2);

        // Bit-exact equality with the limit admits
        assert_eq!(ledger.reserve(&id, amount, limit).await.unwrap(), limit);
        // One more wei is rejected
        assert!(matches!(
            ledger.reserve(&id, U256::from(1u64), limit).await,
            Err(ReserveError::LimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_exceed_limit() {
        let store = Arc::new(MemoryKv::new());
        let id = identity();
        let limit = U256::from(10u64);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let ledger = ReservationLedger::new(store.clone());
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&id, U256::from(1u64), limit).await.is_ok()
            }));
        }

        let mut successes = 0u64;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        let ledger = ReservationLedger::new(store);
        let total = ledger.reserved_today(&id).await.unwrap();
        // Committed sum equals the successes and never exceeds the limit
        assert_eq!(total, U256::from(successes));
        assert!(total <= limit);
    }

    proptest! {
        #[test]
        fn prop_successful_reserves_sum_within_limit(
            amounts in proptest::collection::vec(0u64..2_000, 1..24),
            limit in 1u64..10_000,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let ledger = ledger();
                let id = identity();
                let limit = U256::from(limit);

                let mut expected = U256::ZERO;
                for amount in amounts {
                    let amount = U256::from(amount);
                    match ledger.reserve(&id, amount, limit).await {
                        Ok(total) => {
                            expected += amount;
                            prop_assert_eq!(total, expected);
                            prop_assert!(total <= limit);
                        }
                        Err(ReserveError::LimitExceeded { .. }) => {
                            prop_assert!(expected + amount > limit);
                        }
                        Err(e) => return Err(TestCaseError::fail(e.to_string())),
                    }
                }

                let settled = ledger.reserved_today(&id).await.unwrap();
                prop_assert_eq!(settled, expected);
                Ok(())
            })?;
        }

        #[test]
        fn prop_rollback_is_monotone_inverse(
            amount in 1u64..1_000_000,
            limit_slack in 0u64..1_000_000,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let ledger = ledger();
                let id = identity();
                let amount = U256::from(amount);
                let limit = amount + U256::from(limit_slack);

                let before = ledger.reserved_today(&id).await.unwrap();
                ledger.reserve(&id, amount, limit).await.unwrap();
                ledger.rollback(&id, amount).await.unwrap();
                let after = ledger.reserved_today(&id).await.unwrap();
                prop_assert_eq!(before, after);

                // A second, unmatched rollback still leaves the bucket >= 0
                ledger.rollback(&id, amount).await.unwrap();
                let clamped = ledger.reserved_today(&id).await.unwrap();
                prop_assert_eq!(clamped, U256::ZERO);
                Ok(())
            })?;
        }
    }
}
