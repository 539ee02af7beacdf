use serde::{Deserialize, Serialize};
use shared::domain::Tier;

use crate::config::{TierBand, TierSettings};

/// Where a balance sits relative to the next band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierProgress {
    pub tier: Tier,
    pub next_tier: Option<Tier>,
    pub goal_points: u64,
    pub next_benefit: String,
    pub percent: f64,
}

#[derive(Debug, Clone)]
pub struct TierSchedule {
    bands: Vec<TierBand>,
    top_goal_points: u64,
}

impl TierSchedule {
    pub fn new(settings: &TierSettings) -> Self {
        Self {
            bands: settings.bands.clone(),
            top_goal_points: settings.top_goal_points,
        }
    }

    /// Tier is a pure function of the balance; nothing stores it.
    pub fn classify(&self, points: u64) -> Tier {
        self.band_for(points).map(|band| band.tier).unwrap_or(Tier::Seed)
    }

    pub fn benefit(&self, tier: Tier) -> Option<&str> {
        self.bands
            .iter()
            .find(|band| band.tier == tier)
            .map(|band| band.benefit.as_str())
    }

    pub fn progress(&self, points: u64) -> TierProgress {
        let current = self.band_for(points);
        let tier = current.map(|band| band.tier).unwrap_or(Tier::Seed);
        let next = self.bands.iter().find(|band| band.min_points > points);

        let (next_tier, goal_points, next_benefit) = match next {
            Some(band) => (Some(band.tier), band.min_points, band.benefit.clone()),
            None => (
                None,
                self.top_goal_points,
                current.map(|band| band.benefit.clone()).unwrap_or_default(),
            ),
        };

        let percent = if goal_points == 0 {
            100.0
        } else {
            (points.min(goal_points) as f64 / goal_points as f64) * 100.0
        };

        TierProgress {
            tier,
            next_tier,
            goal_points,
            next_benefit,
            percent,
        }
    }

    fn band_for(&self, points: u64) -> Option<&TierBand> {
        self.bands
            .iter()
            .rev()
            .find(|band| points >= band.min_points)
    }
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self::new(&TierSettings::default())
    }
}
