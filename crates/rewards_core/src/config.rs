use std::{path::Path, time::Duration};

use anyhow::{ensure, Context};
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shared::domain::{
    SavedAddress, Stop, StopId, Tier, Transaction, TransactionId, TransactionKind, User, UserId,
    Voucher, VoucherCategory, VoucherId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub ledger: LedgerSettings,
    pub pickup: PickupSettings,
    pub route: RouteSettings,
    pub tiers: TierSettings,
    pub seed: SeedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub redeem_latency_ms: u64,
    pub points_per_box: u64,
    pub kg_per_box: f64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            redeem_latency_ms: 800,
            points_per_box: 10,
            kg_per_box: 0.3,
        }
    }
}

impl LedgerSettings {
    pub fn redeem_latency(&self) -> Duration {
        Duration::from_millis(self.redeem_latency_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupSettings {
    pub credit_delay_ms: u64,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub default_quantity: u32,
    pub date_options: usize,
}

impl Default for PickupSettings {
    fn default() -> Self {
        Self {
            credit_delay_ms: 1500,
            min_quantity: 1,
            max_quantity: 50,
            default_quantity: 5,
            date_options: 5,
        }
    }
}

impl PickupSettings {
    pub fn credit_delay(&self) -> Duration {
        Duration::from_millis(self.credit_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub per_stop_reward_cents: u64,
    pub starting_earnings_cents: u64,
    pub completed_display_ms: u64,
    pub capture_latency_ms: u64,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            per_stop_reward_cents: 250,
            starting_earnings_cents: 4550,
            completed_display_ms: 2200,
            capture_latency_ms: 1500,
        }
    }
}

impl RouteSettings {
    pub fn completed_display(&self) -> Duration {
        Duration::from_millis(self.completed_display_ms)
    }

    pub fn capture_latency(&self) -> Duration {
        Duration::from_millis(self.capture_latency_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBand {
    pub tier: Tier,
    pub min_points: u64,
    pub benefit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSettings {
    pub bands: Vec<TierBand>,
    /// Progress goal shown once the top band is reached.
    pub top_goal_points: u64,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            bands: vec![
                TierBand {
                    tier: Tier::Seed,
                    min_points: 0,
                    benefit: "1% chance at monthly surprise".into(),
                },
                TierBand {
                    tier: Tier::Sprout,
                    min_points: 200,
                    benefit: "5% extra voucher value".into(),
                },
                TierBand {
                    tier: Tier::Bloom,
                    min_points: 500,
                    benefit: "Priority pickup + Exclusive deals".into(),
                },
            ],
            top_goal_points: 1000,
        }
    }
}

/// Demo state injected at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub user: User,
    pub transactions: Vec<Transaction>,
    pub vouchers: Vec<Voucher>,
    pub stops: Vec<Stop>,
    pub addresses: Vec<SavedAddress>,
}

impl Default for SeedData {
    fn default() -> Self {
        Self {
            user: User {
                id: UserId::new("USER_001"),
                name: "Alex Johnson".into(),
                green_points: 420,
                total_recycled_kg: 12.5,
                boxes_saved: 42.0,
            },
            transactions: vec![
                seed_transaction("T1", (2023, 10, 25), TransactionKind::Earn, 30, "Recycled 3 boxes"),
                seed_transaction("T2", (2023, 10, 20), TransactionKind::Earn, 10, "Recycled 1 box"),
                seed_transaction(
                    "T3",
                    (2023, 10, 15),
                    TransactionKind::Redeem,
                    -300,
                    "Redeemed ₹50 Voucher",
                ),
            ],
            vouchers: vec![
                Voucher {
                    id: VoucherId::new("V50"),
                    title: "₹50 Off Food Order".into(),
                    description: "Valid on orders above ₹200".into(),
                    value: 50,
                    points_cost: 300,
                    category: VoucherCategory::Food,
                    expiry_months: 3,
                    icon: "🍔".into(),
                },
                Voucher {
                    id: VoucherId::new("V150"),
                    title: "₹150 Shopping Voucher".into(),
                    description: "Valid at partner eco-stores".into(),
                    value: 150,
                    points_cost: 800,
                    category: VoucherCategory::Shopping,
                    expiry_months: 6,
                    icon: "🛍️".into(),
                },
                Voucher {
                    id: VoucherId::new("D100"),
                    title: "Plant a Tree".into(),
                    description: "Donate points to plant 1 tree".into(),
                    value: 100,
                    points_cost: 500,
                    category: VoucherCategory::Donation,
                    expiry_months: 12,
                    icon: "🌳".into(),
                },
            ],
            stops: vec![
                seed_stop("JOB-8821", "10:30", "123 Green Street", "Apt 4B • ~5 Boxes", "0.2 mi", "Alex Johnson"),
                seed_stop("JOB-8822", "10:45", "88 Eco Lane", "Office • ~20 Boxes", "1.4 mi", "Sarah Smith"),
                seed_stop(
                    "JOB-8823",
                    "11:10",
                    "452 Sustainable Blvd",
                    "House • ~3 Boxes",
                    "3.1 mi",
                    "Mike Ross",
                ),
            ],
            addresses: vec![
                SavedAddress {
                    label: "Home".into(),
                    line: "123 Green Street, Eco City".into(),
                },
                SavedAddress {
                    label: "Office".into(),
                    line: "Tech Park, Building 4".into(),
                },
            ],
        }
    }
}

fn seed_transaction(
    id: &str,
    (year, month, day): (i32, u32, u32),
    kind: TransactionKind,
    amount: i64,
    description: &str,
) -> Transaction {
    Transaction {
        id: TransactionId::new(id),
        date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
        kind,
        amount,
        description: description.into(),
    }
}

fn seed_stop(
    id: &str,
    arrival_time: &str,
    address: &str,
    details: &str,
    distance: &str,
    contact: &str,
) -> Stop {
    Stop {
        id: StopId::new(id),
        arrival_time: arrival_time.into(),
        address: address.into(),
        details: details.into(),
        distance: distance.into(),
        contact: contact.into(),
    }
}

/// Layers built-in defaults, an optional TOML file, then `APP__*` environment
/// variables (`APP__LEDGER__REDEEM_LATENCY_MS=50`).
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let defaults = Config::try_from(&Settings::default()).context("failed to encode default settings")?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let settings: Settings = builder
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read settings sources")?
        .try_deserialize()
        .context("failed to deserialize settings")?;

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.ledger.points_per_box > 0, "ledger.points_per_box must be positive");
        ensure!(
            self.pickup.min_quantity >= 1 && self.pickup.min_quantity <= self.pickup.max_quantity,
            "pickup quantity bounds {}..={} are invalid",
            self.pickup.min_quantity,
            self.pickup.max_quantity
        );
        ensure!(
            (self.pickup.min_quantity..=self.pickup.max_quantity).contains(&self.pickup.default_quantity),
            "pickup.default_quantity {} outside {}..={}",
            self.pickup.default_quantity,
            self.pickup.min_quantity,
            self.pickup.max_quantity
        );
        ensure!(self.pickup.date_options > 0, "pickup.date_options must be positive");

        let bands = &self.tiers.bands;
        ensure!(
            bands.first().map(|band| band.min_points) == Some(0),
            "the first tier band must start at 0 points"
        );
        ensure!(
            bands.windows(2).all(|pair| pair[0].min_points < pair[1].min_points
                && pair[0].tier < pair[1].tier),
            "tier bands must be strictly ascending"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
