use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use shared::{
    domain::{SavedAddress, Stop, Transaction, UserSnapshot, VoucherId},
    error::ApiError,
    protocol::{RouteStatus, SessionEvent},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pickup;
pub mod route;
pub mod tiers;
pub mod timer;

pub use catalog::VoucherCatalog;
pub use crate::config::{load_settings, Settings};
pub use error::{LedgerError, RewardsError, RouteError, WizardError};
pub use ledger::{LedgerStore, PendingRedemption};
pub use pickup::{PickupRequest, PickupWizard, WizardStep};
pub use route::AgentRoute;
pub use tiers::{TierProgress, TierSchedule};

use crate::timer::ScopedTask;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-process API the presentation layer drives.
#[async_trait]
pub trait RewardsHandle: Send + Sync {
    async fn get_user(&self) -> UserSnapshot;
    async fn get_transactions(&self) -> Vec<Transaction>;
    async fn redeem(&self, voucher_id: &VoucherId) -> Result<PendingRedemption, RewardsError>;
    async fn add_points(&self, amount: u64) -> Result<Transaction, RewardsError>;
    async fn schedule_pickup(
        &self,
        quantity: u32,
        address: SavedAddress,
        date: NaiveDate,
        instructions: String,
    ) -> Result<PickupRequest, RewardsError>;
    async fn agent_queue(&self) -> Vec<Stop>;
    async fn agent_complete_current_stop(&self) -> Result<Stop, RewardsError>;
    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Application state for one demo session. Owns the ledger, the catalog, the
/// agent route and every timer scheduled on the session's behalf.
pub struct Session {
    settings: Settings,
    today: NaiveDate,
    catalog: VoucherCatalog,
    ledger: Arc<LedgerStore>,
    route: Arc<AgentRoute>,
    scheduled_pickups: Mutex<Vec<ScopedTask>>,
    closed: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Starts a session dated today. `settings` is expected to have passed
    /// [`Settings::validate`].
    pub fn start(settings: Settings) -> Arc<Self> {
        Self::start_on(settings, Utc::now().date_naive())
    }

    pub fn start_on(settings: Settings, today: NaiveDate) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let seed = settings.seed.clone();

        let ledger = LedgerStore::new(
            settings.ledger.clone(),
            TierSchedule::new(&settings.tiers),
            seed.user,
            seed.transactions,
            events.clone(),
        );
        let route = AgentRoute::new(settings.route.clone(), seed.stops, events.clone());

        info!(
            "session: started user={} vouchers={} stops={} today={}",
            settings.seed.user.id,
            seed.vouchers.len(),
            settings.seed.stops.len(),
            today
        );

        Arc::new(Self {
            catalog: VoucherCatalog::new(seed.vouchers),
            settings,
            today,
            ledger,
            route,
            scheduled_pickups: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            events,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn catalog(&self) -> &VoucherCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn route(&self) -> &Arc<AgentRoute> {
        &self.route
    }

    /// A fresh wizard. The caller owns it; dropping it cancels its credit.
    pub fn pickup_wizard(&self) -> PickupWizard {
        PickupWizard::new(
            self.settings.pickup.clone(),
            Arc::clone(&self.ledger),
            self.events.clone(),
            self.settings.seed.addresses.clone(),
            self.today,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancels every outstanding timer and closes the session. No mutation
    /// lands after this returns, and later mutating calls fail with a
    /// `SessionClosed` error code.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("session: shutdown already done");
            return;
        }
        let pickups = std::mem::take(&mut *self.scheduled_pickups.lock().await);
        let undelivered = pickups.iter().filter(|task| !task.is_finished()).count();
        for task in pickups {
            task.cancel();
        }

        self.ledger.shutdown().await;
        self.route.shutdown().await;
        info!("session: shutdown cancelled_pickups={undelivered}");
    }

    fn report<T>(&self, result: Result<T, RewardsError>) -> Result<T, RewardsError> {
        if let Err(err) = &result {
            warn!("session: operation failed code={:?} error={err}", err.code());
            let _ = self.events.send(SessionEvent::Error(ApiError::from(err)));
        }
        result
    }

    async fn schedule_pickup_impl(
        &self,
        quantity: u32,
        address: SavedAddress,
        date: NaiveDate,
        instructions: String,
    ) -> Result<PickupRequest, RewardsError> {
        let limits = &self.settings.pickup;
        if !(limits.min_quantity..=limits.max_quantity).contains(&quantity) {
            return Err(WizardError::InvalidQuantity {
                quantity,
                min: limits.min_quantity,
                max: limits.max_quantity,
            }
            .into());
        }

        let points = self.ledger.points_for_boxes(quantity);
        {
            // Shutdown sets the flag before draining this list.
            let mut scheduled = self.scheduled_pickups.lock().await;
            if self.is_closed() {
                return Err(RewardsError::SessionClosed);
            }
            scheduled.retain(|task| !task.is_finished());
            scheduled.push(pickup::schedule_credit(
                Arc::clone(&self.ledger),
                quantity,
                points,
                limits.credit_delay(),
            ));
        }

        info!("session: pickup scheduled quantity={quantity} points={points} date={date}");
        let _ = self.events.send(SessionEvent::PickupScheduled {
            quantity,
            points,
            address: address.line.clone(),
            date,
        });

        Ok(PickupRequest {
            quantity,
            address,
            date,
            instructions,
        })
    }

    async fn complete_current_stop_impl(&self) -> Result<Stop, RewardsError> {
        match self.route.status().await {
            RouteStatus::AllCaughtUp => return Err(RouteError::QueueEmpty.into()),
            RouteStatus::Completed => {
                self.route.dismiss().await?;
                self.route.begin_scan().await?;
            }
            RouteStatus::Idle => self.route.begin_scan().await?,
            RouteStatus::Scanning => {}
        }
        Ok(self.route.complete_scan().await?)
    }
}

#[async_trait]
impl RewardsHandle for Session {
    async fn get_user(&self) -> UserSnapshot {
        self.ledger.user().await
    }

    async fn get_transactions(&self) -> Vec<Transaction> {
        self.ledger.transactions().await
    }

    async fn redeem(&self, voucher_id: &VoucherId) -> Result<PendingRedemption, RewardsError> {
        let result = match self.catalog.get(voucher_id) {
            Some(voucher) => self.ledger.redeem(voucher).await.map_err(RewardsError::from),
            None => Err(LedgerError::UnknownVoucher(voucher_id.to_string()).into()),
        };
        self.report(result)
    }

    async fn add_points(&self, amount: u64) -> Result<Transaction, RewardsError> {
        let result = self.ledger.earn(amount).await.map_err(RewardsError::from);
        self.report(result)
    }

    async fn schedule_pickup(
        &self,
        quantity: u32,
        address: SavedAddress,
        date: NaiveDate,
        instructions: String,
    ) -> Result<PickupRequest, RewardsError> {
        let result = self
            .schedule_pickup_impl(quantity, address, date, instructions)
            .await;
        self.report(result)
    }

    async fn agent_queue(&self) -> Vec<Stop> {
        self.route.queue().await
    }

    async fn agent_complete_current_stop(&self) -> Result<Stop, RewardsError> {
        let result = self.complete_current_stop_impl().await;
        self.report(result)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
