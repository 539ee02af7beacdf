use std::{collections::VecDeque, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{Transaction, TransactionId, TransactionKind, User, UserSnapshot, Voucher, VoucherId},
    protocol::SessionEvent,
};
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{
    config::LedgerSettings,
    error::LedgerError,
    tiers::{TierProgress, TierSchedule},
    timer::ScopedTask,
};

pub const MANUAL_CREDIT_DESCRIPTION: &str = "Manual Demo Credit";

/// Single source of truth for the point balance and transaction history.
pub struct LedgerStore {
    settings: LedgerSettings,
    tiers: TierSchedule,
    inner: Mutex<LedgerState>,
    events: broadcast::Sender<SessionEvent>,
}

struct LedgerState {
    user: User,
    /// Most recent first.
    transactions: VecDeque<Transaction>,
    in_flight: Option<InFlightRedemption>,
    closed: bool,
}

struct InFlightRedemption {
    voucher_id: VoucherId,
    task: ScopedTask,
}

/// Handle for a redemption that has passed the balance check and is waiting
/// out the simulated latency.
#[derive(Debug)]
pub struct PendingRedemption {
    voucher_id: VoucherId,
    outcome: oneshot::Receiver<Result<Transaction, LedgerError>>,
}

impl PendingRedemption {
    pub fn voucher_id(&self) -> &VoucherId {
        &self.voucher_id
    }

    /// Resolves with the committed REDEEM transaction, or
    /// [`LedgerError::Cancelled`] if the ledger shut down first.
    pub async fn wait(self) -> Result<Transaction, LedgerError> {
        self.outcome.await.unwrap_or(Err(LedgerError::Cancelled))
    }
}

impl LedgerStore {
    pub fn new(
        settings: LedgerSettings,
        tiers: TierSchedule,
        user: User,
        transactions: Vec<Transaction>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            tiers,
            inner: Mutex::new(LedgerState {
                user,
                transactions: transactions.into(),
                in_flight: None,
                closed: false,
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn tiers(&self) -> &TierSchedule {
        &self.tiers
    }

    pub async fn user(&self) -> UserSnapshot {
        let state = self.inner.lock().await;
        self.snapshot(&state.user)
    }

    pub async fn balance(&self) -> u64 {
        self.inner.lock().await.user.green_points
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        let state = self.inner.lock().await;
        state.transactions.iter().cloned().collect()
    }

    pub async fn tier_progress(&self) -> TierProgress {
        let points = self.balance().await;
        self.tiers.progress(points)
    }

    /// Points credited for `quantity` recycled boxes.
    pub fn points_for_boxes(&self, quantity: u32) -> u64 {
        u64::from(quantity) * self.settings.points_per_box
    }

    /// True while a redemption is waiting to commit.
    pub async fn is_pending(&self) -> bool {
        self.inner.lock().await.in_flight.is_some()
    }

    /// Checks the balance now and commits the deduction after the configured
    /// latency. At most one redemption may be in flight.
    pub async fn redeem(
        self: &Arc<Self>,
        voucher: &Voucher,
    ) -> Result<PendingRedemption, LedgerError> {
        let mut state = self.inner.lock().await;
        if state.closed {
            return Err(LedgerError::Closed);
        }

        if let Some(in_flight) = &state.in_flight {
            warn!(
                "ledger: redeem rejected voucher={} in_flight={}",
                voucher.id, in_flight.voucher_id
            );
            return Err(LedgerError::RedemptionInFlight {
                voucher_id: in_flight.voucher_id.to_string(),
            });
        }

        let amount = i64::try_from(voucher.points_cost)
            .map_err(|_| LedgerError::InvalidAmount(voucher.points_cost))?;
        let available = state.user.green_points;
        if available < voucher.points_cost {
            info!(
                "ledger: redeem rejected voucher={} cost={} balance={}",
                voucher.id, voucher.points_cost, available
            );
            return Err(LedgerError::InsufficientBalance {
                required: voucher.points_cost,
                available,
            });
        }

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let ledger = Arc::clone(self);
        let committed = voucher.clone();
        let task = ScopedTask::spawn_after(self.settings.redeem_latency(), async move {
            let outcome = ledger.commit_redemption(&committed, amount).await;
            let _ = outcome_tx.send(outcome);
        });

        state.in_flight = Some(InFlightRedemption {
            voucher_id: voucher.id.clone(),
            task,
        });
        drop(state);

        debug!(
            "ledger: redeem pending voucher={} cost={}",
            voucher.id, voucher.points_cost
        );
        let _ = self.events.send(SessionEvent::RedemptionStarted {
            voucher_id: voucher.id.clone(),
        });

        Ok(PendingRedemption {
            voucher_id: voucher.id.clone(),
            outcome: outcome_rx,
        })
    }

    async fn commit_redemption(
        &self,
        voucher: &Voucher,
        amount: i64,
    ) -> Result<Transaction, LedgerError> {
        let mut state = self.inner.lock().await;
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.task.disarm();
        }

        let available = state.user.green_points;
        let Some(remaining) = available.checked_sub(voucher.points_cost) else {
            warn!(
                "ledger: redeem aborted at commit voucher={} cost={} balance={}",
                voucher.id, voucher.points_cost, available
            );
            return Err(LedgerError::InsufficientBalance {
                required: voucher.points_cost,
                available,
            });
        };

        state.user.green_points = remaining;
        let transaction = Transaction {
            id: TransactionId::generate(),
            date: Utc::now().date_naive(),
            kind: TransactionKind::Redeem,
            amount: -amount,
            description: format!("Redeemed {}", voucher.title),
        };
        state.transactions.push_front(transaction.clone());
        let user = self.snapshot(&state.user);
        drop(state);

        info!(
            "ledger: redeemed voucher={} cost={} balance={}",
            voucher.id, voucher.points_cost, remaining
        );
        let _ = self.events.send(SessionEvent::VoucherRedeemed {
            transaction: transaction.clone(),
            user,
        });
        Ok(transaction)
    }

    pub async fn earn(&self, amount: u64) -> Result<Transaction, LedgerError> {
        self.earn_with_description(amount, MANUAL_CREDIT_DESCRIPTION)
            .await
    }

    /// Credits `amount` points and the matching box and weight totals.
    pub async fn earn_with_description(
        &self,
        amount: u64,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let signed = i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount(amount))?;

        let boxes = amount as f64 / self.settings.points_per_box as f64;
        let mut state = self.inner.lock().await;
        if state.closed {
            return Err(LedgerError::Closed);
        }
        state.user.green_points = state.user.green_points.saturating_add(amount);
        state.user.boxes_saved += boxes;
        state.user.total_recycled_kg += boxes * self.settings.kg_per_box;

        let transaction = Transaction {
            id: TransactionId::generate(),
            date: Utc::now().date_naive(),
            kind: TransactionKind::Earn,
            amount: signed,
            description: description.into(),
        };
        state.transactions.push_front(transaction.clone());
        let user = self.snapshot(&state.user);
        drop(state);

        info!(
            "ledger: earned amount={} boxes={} balance={}",
            amount, boxes, user.green_points
        );
        let _ = self.events.send(SessionEvent::PointsEarned {
            transaction: transaction.clone(),
            user,
        });
        Ok(transaction)
    }

    /// Aborts an in-flight redemption without touching the balance. Later
    /// `redeem` and `earn` calls fail with [`LedgerError::Closed`].
    pub async fn shutdown(&self) {
        let in_flight = {
            let mut state = self.inner.lock().await;
            state.closed = true;
            state.in_flight.take()
        };
        if let Some(in_flight) = in_flight {
            in_flight.task.cancel();
            info!(
                "ledger: redemption cancelled voucher={}",
                in_flight.voucher_id
            );
            let _ = self.events.send(SessionEvent::RedemptionCancelled {
                voucher_id: in_flight.voucher_id,
            });
        }
    }

    fn snapshot(&self, user: &User) -> UserSnapshot {
        UserSnapshot {
            id: user.id.clone(),
            name: user.name.clone(),
            green_points: user.green_points,
            tier: self.tiers.classify(user.green_points),
            total_recycled_kg: user.total_recycled_kg,
            boxes_saved: user.boxes_saved,
        }
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
