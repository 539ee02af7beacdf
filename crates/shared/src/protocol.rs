use serde::{Deserialize, Serialize};

use crate::{
    domain::{Stop, StopId, Transaction, UserSnapshot, VoucherId},
    error::ApiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Idle,
    AllCaughtUp,
    Scanning,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub status: RouteStatus,
    pub queue: Vec<Stop>,
    pub earnings_cents: u64,
    pub completed_stops: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_error: Option<String>,
}

impl RouteSnapshot {
    pub fn current_stop(&self) -> Option<&Stop> {
        self.queue.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    PointsEarned {
        transaction: Transaction,
        user: UserSnapshot,
    },
    RedemptionStarted {
        voucher_id: VoucherId,
    },
    VoucherRedeemed {
        transaction: Transaction,
        user: UserSnapshot,
    },
    RedemptionCancelled {
        voucher_id: VoucherId,
    },
    PickupScheduled {
        quantity: u32,
        points: u64,
        address: String,
        date: chrono::NaiveDate,
    },
    PickupCancelled {
        quantity: u32,
    },
    RouteStatusChanged {
        status: RouteStatus,
    },
    StopCompleted {
        stop_id: StopId,
        earnings_cents: u64,
        remaining: usize,
    },
    Error(ApiError),
}
