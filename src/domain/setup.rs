//! Normalized prediction document and setup types.
//!
//! Every schema version is normalized into these types by
//! [`crate::domain::schema`]; nothing downstream inspects the raw JSON.

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::bar::Crossing;
use super::schema::SchemaVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn stop_crossing(self) -> Crossing {
        match self {
            Direction::Long => Crossing::Down,
            Direction::Short => Crossing::Up,
        }
    }

    pub fn target_crossing(self) -> Crossing {
        match self {
            Direction::Long => Crossing::Up,
            Direction::Short => Crossing::Down,
        }
    }
}

/// Declared stance of a setup. `Wait` is an explicit observation-only call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stance {
    Long,
    Short,
    Wait,
}

impl Stance {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "LONG" | "BUY" => Some(Stance::Long),
            "SHORT" | "SELL" => Some(Stance::Short),
            "WAIT" | "NEUTRAL" | "NONE" => Some(Stance::Wait),
            _ => None,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Stance::Long => Some(Direction::Long),
            Stance::Short => Some(Direction::Short),
            Stance::Wait => None,
        }
    }
}

impl From<Direction> for Stance {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Stance::Long,
            Direction::Short => Stance::Short,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetupType {
    PullbackBuy,
    RallySell,
    Breakout,
    Other(String),
}

impl SetupType {
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PULLBACK_BUY" | "DIP_BUY" => SetupType::PullbackBuy,
            "RALLY_SELL" => SetupType::RallySell,
            "BREAKOUT" => SetupType::Breakout,
            _ => SetupType::Other(normalized),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SetupType::PullbackBuy => "PULLBACK_BUY",
            SetupType::RallySell => "RALLY_SELL",
            SetupType::Breakout => "BREAKOUT",
            SetupType::Other(label) => label,
        }
    }

    /// Direction implied by the type alone; `None` when it can go either way.
    pub fn implied_direction(&self) -> Option<Direction> {
        match self {
            SetupType::PullbackBuy => Some(Direction::Long),
            SetupType::RallySell => Some(Direction::Short),
            SetupType::Breakout | SetupType::Other(_) => None,
        }
    }
}

impl fmt::Display for SetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for SetupType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Range,
    Mixed,
}

impl Bias {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "BULLISH" => Some(Bias::Bullish),
            "BEARISH" => Some(Bias::Bearish),
            "RANGE" => Some(Bias::Range),
            "MIXED" => Some(Bias::Mixed),
            _ => None,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Long),
            Bias::Bearish => Some(Direction::Short),
            Bias::Range | Bias::Mixed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolTier {
    Low,
    Medium,
    High,
}

impl VolTier {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "LOW" => Some(VolTier::Low),
            "MEDIUM" | "MID" => Some(VolTier::Medium),
            "HIGH" => Some(VolTier::High),
            _ => None,
        }
    }
}

/// Entry zone. A setup without one is an observation-only "no trade" setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntrySpec {
    pub zone_min: f64,
    pub zone_max: f64,
    pub strict: Option<f64>,
}

impl EntrySpec {
    pub fn midpoint(&self) -> f64 {
        (self.zone_min + self.zone_max) / 2.0
    }

    /// Assumed fill price: the strict price, else the zone midpoint.
    pub fn price(&self) -> f64 {
        self.strict.unwrap_or_else(|| self.midpoint())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExitSpec {
    pub target: Option<f64>,
    pub stop: Option<f64>,
    pub invalidation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub technical: f64,
    pub trend: f64,
    pub proximity: f64,
    pub fundamental: f64,
}

impl ConfidenceBreakdown {
    pub const TECHNICAL_WEIGHT: f64 = 0.40;
    pub const TREND_WEIGHT: f64 = 0.25;
    pub const PROXIMITY_WEIGHT: f64 = 0.20;
    pub const FUNDAMENTAL_WEIGHT: f64 = 0.15;

    pub fn weighted_score(&self) -> f64 {
        Self::TECHNICAL_WEIGHT * self.technical
            + Self::TREND_WEIGHT * self.trend
            + Self::PROXIMITY_WEIGHT * self.proximity
            + Self::FUNDAMENTAL_WEIGHT * self.fundamental
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeScenario {
    pub stance: Option<Stance>,
    pub probability: f64,
    pub reason: Option<String>,
}

/// Kind of human change recorded against a setup before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    RiskReduction,
    AggressiveAdjustment,
    TradeCancellation,
}

impl InterventionType {
    pub fn label(self) -> &'static str {
        match self {
            InterventionType::RiskReduction => "risk_reduction",
            InterventionType::AggressiveAdjustment => "aggressive_adjustment",
            InterventionType::TradeCancellation => "trade_cancellation",
        }
    }

    /// Classifies a free-form modification type by keyword.
    pub fn classify(modification_type: &str) -> Option<Self> {
        let lower = modification_type.to_lowercase();
        if lower.contains("risk") {
            Some(InterventionType::RiskReduction)
        } else if lower.contains("aggressive") {
            Some(InterventionType::AggressiveAdjustment)
        } else if lower.contains("cancellation") || lower.contains("wait") {
            Some(InterventionType::TradeCancellation)
        } else {
            None
        }
    }

    /// The last recognizable modification decides the type.
    pub fn from_modifications<'a>(types: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        types.into_iter().filter_map(Self::classify).last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    pub instrument: String,
    pub rank: u32,
    pub setup_type: SetupType,
    pub stance: Stance,
    pub valid_sessions: Vec<String>,
    pub entry: Option<EntrySpec>,
    pub exit: ExitSpec,
    pub confidence: Option<f64>,
    pub confidence_breakdown: Option<ConfidenceBreakdown>,
    pub stated_risk_reward: Option<f64>,
    pub rationale: Option<String>,
    pub alternative: Option<AlternativeScenario>,
    /// Derived from `hitl_modifications`.
    pub intervention: Option<InterventionType>,
}

impl Setup {
    pub fn is_no_trade(&self) -> bool {
        self.entry.is_none()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.stance.direction()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentAssessment {
    pub bias: Option<Bias>,
    pub vol_expect: Option<VolTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub instrument: String,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    pub top: Vec<RankingEntry>,
    pub bottom: Vec<RankingEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionDocument {
    pub version: SchemaVersion,
    pub generated_at: Option<DateTime<FixedOffset>>,
    pub environment: BTreeMap<String, EnvironmentAssessment>,
    pub ranking: Ranking,
    pub setups: Vec<Setup>,
}

impl PredictionDocument {
    /// Instruments referenced by setups, in first-appearance order.
    pub fn setup_instruments(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for setup in &self.setups {
            if !seen.contains(&setup.instrument.as_str()) {
                seen.push(&setup.instrument);
            }
        }
        seen
    }

    pub fn bias_for(&self, instrument: &str) -> Option<Bias> {
        self.environment.get(instrument).and_then(|env| env.bias)
    }
}
