use std::{sync::Arc, time::Duration};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use shared::{domain::SavedAddress, protocol::SessionEvent};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{config::PickupSettings, error::WizardError, ledger::LedgerStore, timer::ScopedTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    SelectItems,
    SelectLocationAndDate,
    Confirmed,
}

impl WizardStep {
    fn name(self) -> &'static str {
        match self {
            WizardStep::SelectItems => "select_items",
            WizardStep::SelectLocationAndDate => "select_location_and_date",
            WizardStep::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupRequest {
    pub quantity: u32,
    pub address: SavedAddress,
    pub date: NaiveDate,
    pub instructions: String,
}

/// The next `count` weekdays strictly after `today`.
pub fn upcoming_pickup_dates(today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    today
        .iter_days()
        .skip(1)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

pub fn pickup_description(quantity: u32) -> String {
    if quantity == 1 {
        "Recycled 1 box".to_string()
    } else {
        format!("Recycled {quantity} boxes")
    }
}

/// Spawns the delayed credit for a confirmed pickup. The credit is applied
/// only if the returned task is still alive when the delay elapses.
pub(crate) fn schedule_credit(
    ledger: Arc<LedgerStore>,
    quantity: u32,
    points: u64,
    delay: Duration,
) -> ScopedTask {
    ScopedTask::spawn_after(delay, async move {
        match ledger
            .earn_with_description(points, pickup_description(quantity))
            .await
        {
            Ok(tx) => info!("pickup: credited quantity={quantity} points={} tx={}", points, tx.id),
            Err(err) => warn!("pickup: credit failed quantity={quantity} error={err}"),
        }
    })
}

/// Three-step scheduling flow. Owns the delayed credit it schedules; dropping
/// the wizard or starting over before the credit lands cancels it.
pub struct PickupWizard {
    settings: PickupSettings,
    ledger: Arc<LedgerStore>,
    events: broadcast::Sender<SessionEvent>,
    addresses: Vec<SavedAddress>,
    dates: Vec<NaiveDate>,
    step: WizardStep,
    quantity: u32,
    address_index: usize,
    date_index: usize,
    instructions: String,
    confirmed: Option<PickupRequest>,
    credit: Option<ScopedTask>,
}

impl PickupWizard {
    pub fn new(
        settings: PickupSettings,
        ledger: Arc<LedgerStore>,
        events: broadcast::Sender<SessionEvent>,
        addresses: Vec<SavedAddress>,
        today: NaiveDate,
    ) -> Self {
        let dates = upcoming_pickup_dates(today, settings.date_options);
        let quantity = settings.default_quantity;
        Self {
            settings,
            ledger,
            events,
            addresses,
            dates,
            step: WizardStep::SelectItems,
            quantity,
            address_index: 0,
            date_index: 0,
            instructions: String::new(),
            confirmed: None,
            credit: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn estimated_points(&self) -> u64 {
        self.ledger.points_for_boxes(self.quantity)
    }

    pub fn addresses(&self) -> &[SavedAddress] {
        &self.addresses
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn selected_address(&self) -> Option<&SavedAddress> {
        self.addresses.get(self.address_index)
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.dates.get(self.date_index).copied()
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// The request produced by the last confirmation, while it is displayed.
    pub fn confirmed_request(&self) -> Option<&PickupRequest> {
        self.confirmed.as_ref()
    }

    pub fn credit_delivered(&self) -> bool {
        self.credit.as_ref().is_some_and(ScopedTask::is_finished)
    }

    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), WizardError> {
        self.require(WizardStep::SelectItems, "set quantity")?;
        let (min, max) = (self.settings.min_quantity, self.settings.max_quantity);
        if !(min..=max).contains(&quantity) {
            return Err(WizardError::InvalidQuantity { quantity, min, max });
        }
        self.quantity = quantity;
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::SelectItems, "continue")?;
        self.step = WizardStep::SelectLocationAndDate;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::SelectLocationAndDate, "go back")?;
        self.step = WizardStep::SelectItems;
        Ok(())
    }

    pub fn select_address(&mut self, index: usize) -> Result<(), WizardError> {
        self.require(WizardStep::SelectLocationAndDate, "select address")?;
        if index >= self.addresses.len() {
            return Err(WizardError::UnknownAddress(index));
        }
        self.address_index = index;
        Ok(())
    }

    pub fn select_date(&mut self, index: usize) -> Result<(), WizardError> {
        self.require(WizardStep::SelectLocationAndDate, "select date")?;
        if index >= self.dates.len() {
            return Err(WizardError::UnknownDate(index));
        }
        self.date_index = index;
        Ok(())
    }

    pub fn set_instructions(&mut self, instructions: impl Into<String>) -> Result<(), WizardError> {
        self.require(WizardStep::SelectLocationAndDate, "edit instructions")?;
        self.instructions = instructions.into();
        Ok(())
    }

    /// Moves to the confirmation display and schedules the single credit of
    /// `quantity * points_per_box`.
    pub fn confirm(&mut self) -> Result<PickupRequest, WizardError> {
        self.require(WizardStep::SelectLocationAndDate, "confirm")?;
        let address = self
            .selected_address()
            .cloned()
            .ok_or(WizardError::UnknownAddress(self.address_index))?;
        let date = self
            .selected_date()
            .ok_or(WizardError::UnknownDate(self.date_index))?;

        let request = PickupRequest {
            quantity: self.quantity,
            address,
            date,
            instructions: self.instructions.clone(),
        };
        let points = self.estimated_points();

        self.credit = Some(schedule_credit(
            Arc::clone(&self.ledger),
            request.quantity,
            points,
            self.settings.credit_delay(),
        ));
        self.step = WizardStep::Confirmed;
        self.confirmed = Some(request.clone());

        info!(
            "pickup: scheduled quantity={} points={} date={} address={}",
            request.quantity, points, request.date, request.address.label
        );
        let _ = self.events.send(SessionEvent::PickupScheduled {
            quantity: request.quantity,
            points,
            address: request.address.line.clone(),
            date: request.date,
        });
        Ok(request)
    }

    /// Starts over from the first step, discarding the confirmed request and
    /// any credit that has not landed yet.
    pub fn schedule_another(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::Confirmed, "schedule another")?;
        self.cancel_undelivered_credit();
        self.step = WizardStep::SelectItems;
        self.quantity = self.settings.default_quantity;
        self.address_index = 0;
        self.date_index = 0;
        self.instructions.clear();
        self.confirmed = None;
        Ok(())
    }

    fn cancel_undelivered_credit(&mut self) {
        let Some(credit) = self.credit.take() else {
            return;
        };
        if credit.is_finished() {
            return;
        }
        credit.cancel();
        let quantity = self.confirmed.as_ref().map(|r| r.quantity).unwrap_or(self.quantity);
        info!("pickup: cancelled undelivered credit quantity={quantity}");
        let _ = self.events.send(SessionEvent::PickupCancelled { quantity });
    }

    fn require(&self, step: WizardStep, action: &'static str) -> Result<(), WizardError> {
        if self.step == step {
            Ok(())
        } else {
            Err(WizardError::InvalidTransition {
                action,
                step: self.step.name(),
            })
        }
    }
}

impl Drop for PickupWizard {
    fn drop(&mut self) {
        self.cancel_undelivered_credit();
    }
}

#[cfg(test)]
#[path = "tests/pickup_tests.rs"]
mod tests;
