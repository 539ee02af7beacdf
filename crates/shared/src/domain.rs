use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(TransactionId);
id_newtype!(VoucherId);
id_newtype!(StopId);

impl TransactionId {
    /// Time-ordered id; two ids minted in the same millisecond still differ.
    pub fn generate() -> Self {
        Self(format!("T{}", Uuid::now_v7().simple()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Seed,
    Sprout,
    Bloom,
}

impl Tier {
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Seed => Some(Tier::Sprout),
            Tier::Sprout => Some(Tier::Bloom),
            Tier::Bloom => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Seed => "Seed",
            Tier::Sprout => "Sprout",
            Tier::Bloom => "Bloom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Earn,
    Redeem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherCategory {
    Food,
    Shopping,
    Donation,
}

/// Stored account record. The tier is not stored; see [`UserSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub green_points: u64,
    pub total_recycled_kg: f64,
    /// Fractional: credits that are not a multiple of one box still count.
    pub boxes_saved: f64,
}

/// Read model handed to callers, with the tier derived from the balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub name: String,
    pub green_points: u64,
    pub tier: Tier,
    pub total_recycled_kg: f64,
    pub boxes_saved: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Positive for earn, negative for redeem.
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub title: String,
    pub description: String,
    /// Face value in rupees.
    pub value: u32,
    pub points_cost: u64,
    pub category: VoucherCategory,
    pub expiry_months: u32,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub arrival_time: String,
    pub address: String,
    pub details: String,
    pub distance: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAddress {
    pub label: String,
    pub line: String,
}
