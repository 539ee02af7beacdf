use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient balance: need {required} points, have {available}")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("a redemption is already in flight for voucher {voucher_id}")]
    RedemptionInFlight { voucher_id: String },
    #[error("invalid point amount {0}")]
    InvalidAmount(u64),
    #[error("unknown voucher {0}")]
    UnknownVoucher(String),
    #[error("redemption was cancelled before it committed")]
    Cancelled,
    #[error("ledger is shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("quantity {quantity} outside {min}..={max}")]
    InvalidQuantity { quantity: u32, min: u32, max: u32 },
    #[error("cannot {action} from step {step}")]
    InvalidTransition { action: &'static str, step: &'static str },
    #[error("unknown address option {0}")]
    UnknownAddress(usize),
    #[error("unknown date option {0}")]
    UnknownDate(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route queue is empty")]
    QueueEmpty,
    #[error("cannot {action} while {status}")]
    InvalidTransition { action: &'static str, status: &'static str },
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("route is shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardsError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("session is shut down")]
    SessionClosed,
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::RedemptionInFlight { .. } => ErrorCode::OperationInFlight,
            Self::InvalidAmount(_) => ErrorCode::Validation,
            Self::UnknownVoucher(_) => ErrorCode::NotFound,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Closed => ErrorCode::SessionClosed,
        }
    }
}

impl WizardError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidQuantity { .. } => ErrorCode::InvalidQuantity,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::UnknownAddress(_) | Self::UnknownDate(_) => ErrorCode::NotFound,
        }
    }
}

impl RouteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QueueEmpty | Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::CameraUnavailable(_) => ErrorCode::CameraUnavailable,
            Self::Closed => ErrorCode::SessionClosed,
        }
    }
}

impl RewardsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Ledger(err) => err.code(),
            Self::Wizard(err) => err.code(),
            Self::Route(err) => err.code(),
            Self::SessionClosed => ErrorCode::SessionClosed,
        }
    }
}

impl From<&RewardsError> for ApiError {
    fn from(value: &RewardsError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

impl From<RewardsError> for ApiError {
    fn from(value: RewardsError) -> Self {
        ApiError::from(&value)
    }
}
