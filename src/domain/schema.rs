//! Schema adapter: raw prediction JSON to [`PredictionDocument`].
//!
//! Version-dependent rules live here and nowhere else:
//!
//! - every version: unique `(instrument, rank)`, positive rank, consistent
//!   entry zone, stop and target on the correct side of the entry;
//! - before 2.2: direction may be omitted and is inferred from the setup type,
//!   ambiguous types are rejected;
//! - from 2.2: direction is required;
//! - from 2.3: confidence is required, and the confidence breakdown and the
//!   alternative scenario must agree with it arithmetically.
//!
//! All checks run up front, so a malformed document never yields outcomes.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use super::error::EvalError;
use super::setup::{
    AlternativeScenario, Bias, ConfidenceBreakdown, EntrySpec, EnvironmentAssessment, ExitSpec,
    InterventionType, PredictionDocument, Ranking, RankingEntry, SetupType, Setup, Stance, VolTier,
};

/// Tolerance for the confidence arithmetic checks.
pub const CONFIDENCE_TOLERANCE: f64 = 0.01;

/// Absorbs float representation noise at the tolerance boundary.
const TOLERANCE_SLACK: f64 = 1e-9;

pub const SUPPORTED_VERSIONS: [&str; 4] = ["2.0", "2.1", "2.2", "2.3"];

/// Dotted numeric schema version, compared component-wise.
///
/// Trailing zero components are insignificant, so `2.3` equals `2.3.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaVersion {
    parts: Vec<u32>,
}

impl SchemaVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        let mut parts = vec![major, minor];
        trim_zeros(&mut parts);
        Self { parts }
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= SchemaVersion::new(major, minor)
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS
            .iter()
            .filter_map(|v| v.parse::<SchemaVersion>().ok())
            .any(|v| v == *self)
    }
}

fn trim_zeros(parts: &mut Vec<u32>) {
    while parts.last() == Some(&0) {
        parts.pop();
    }
}

impl FromStr for SchemaVersion {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['v', 'V']);
        let unsupported = || EvalError::UnsupportedVersion {
            version: s.to_string(),
        };
        if trimmed.is_empty() {
            return Err(unsupported());
        }
        let mut parts = trimmed
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|_| unsupported()))
            .collect::<Result<Vec<_>, _>>()?;
        trim_zeros(&mut parts);
        Ok(Self { parts })
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.parts.clone();
        while parts.len() < 2 {
            parts.push(0);
        }
        let rendered: Vec<String> = parts.iter().map(u32::to_string).collect();
        f.write_str(&rendered.join("."))
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Raw wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Text(String),
    Number(f64),
}

impl RawVersion {
    fn as_string(&self) -> String {
        match self {
            RawVersion::Text(s) => s.clone(),
            RawVersion::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    schema_version: Option<RawVersion>,
    generated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnvironmentEntry {
    bias: Option<String>,
    vol_expect: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvironment {
    Wrapped {
        data: BTreeMap<String, RawEnvironmentEntry>,
    },
    Flat(BTreeMap<String, RawEnvironmentEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRankingEntry {
    Symbol(String),
    Detailed {
        #[serde(alias = "instrument")]
        pair: String,
        #[serde(default, alias = "rationale")]
        reason: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawRanking {
    #[serde(default, alias = "top")]
    top_3: Vec<RawRankingEntry>,
    #[serde(default, alias = "bottom")]
    bottom_3: Vec<RawRankingEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    zone_min: Option<f64>,
    zone_max: Option<f64>,
    #[serde(alias = "preferred", alias = "strict")]
    strict_limit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExit {
    #[serde(alias = "target", alias = "target_price")]
    take_profit: Option<f64>,
    #[serde(alias = "stop")]
    stop_loss: Option<f64>,
    invalidation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBreakdown {
    technical: Option<f64>,
    trend: Option<f64>,
    proximity: Option<f64>,
    fundamental: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAlternative {
    direction: Option<String>,
    probability: Option<f64>,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSetup {
    #[serde(alias = "instrument", alias = "symbol")]
    pair: Option<String>,
    rank: Option<i64>,
    #[serde(alias = "setup_type")]
    strategy_type: Option<String>,
    direction: Option<String>,
    #[serde(default)]
    valid_sessions: Vec<String>,
    entry: Option<RawEntry>,
    exit: Option<RawExit>,
    confidence_score: Option<f64>,
    confidence_breakdown: Option<RawBreakdown>,
    #[serde(alias = "risk_reward_ratio")]
    risk_reward: Option<f64>,
    #[serde(alias = "reasoning")]
    rationale: Option<String>,
    alternative_scenario: Option<RawAlternative>,
    #[serde(default, alias = "modifications")]
    hitl_modifications: Vec<RawModification>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModification {
    #[serde(alias = "type")]
    modification_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    meta: RawMeta,
    schema_version: Option<RawVersion>,
    generated_at: Option<String>,
    market_environment: Option<RawEnvironment>,
    #[serde(default)]
    ranking: RawRanking,
    #[serde(default, alias = "setups")]
    strategies: Vec<RawSetup>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Parses and normalizes a prediction document.
///
/// `offset` is the reference offset used for naive generation timestamps.
pub fn parse_document(text: &str, offset: FixedOffset) -> Result<PredictionDocument, EvalError> {
    let raw: RawDocument =
        serde_json::from_str(text).map_err(|e| EvalError::MalformedDocument {
            reason: e.to_string(),
        })?;

    let declared = raw
        .meta
        .schema_version
        .as_ref()
        .or(raw.schema_version.as_ref())
        .map(RawVersion::as_string)
        .ok_or_else(|| EvalError::schema("meta.schema_version", "missing"))?;
    let version = check_version(&declared)?;

    let generated_at = raw
        .meta
        .generated_at
        .as_deref()
        .or(raw.generated_at.as_deref())
        .map(|s| {
            parse_timestamp(s, offset)
                .ok_or_else(|| EvalError::schema("meta.generated_at", format!("unparsable {s:?}")))
        })
        .transpose()?;

    let environment = normalize_environment(raw.market_environment)?;
    let ranking = Ranking {
        top: raw.ranking.top_3.into_iter().map(ranking_entry).collect(),
        bottom: raw.ranking.bottom_3.into_iter().map(ranking_entry).collect(),
    };
    let setups = normalize_setups(raw.strategies, &version)?;

    tracing::debug!(
        version = %version,
        setups = setups.len(),
        instruments = environment.len(),
        "normalized prediction document"
    );

    Ok(PredictionDocument {
        version,
        generated_at,
        environment,
        ranking,
        setups,
    })
}

/// Parses a declared version and fails closed on anything unrecognized.
pub fn check_version(declared: &str) -> Result<SchemaVersion, EvalError> {
    let version: SchemaVersion = declared.parse()?;
    if !version.is_supported() {
        return Err(EvalError::UnsupportedVersion {
            version: declared.to_string(),
        });
    }
    Ok(version)
}

/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS` with an optional `JST`/`UTC`
/// suffix; naive times are read in `offset`.
pub fn parse_timestamp(value: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t);
    }

    let (body, zone) = match value.rsplit_once(' ') {
        Some((body, "JST")) => (body, FixedOffset::east_opt(9 * 3600)?),
        Some((body, "UTC")) => (body, FixedOffset::east_opt(0)?),
        _ => (value, offset),
    };

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(zone).single())
}

fn ranking_entry(raw: RawRankingEntry) -> RankingEntry {
    match raw {
        RawRankingEntry::Symbol(s) => RankingEntry {
            instrument: normalize_symbol(&s),
            rationale: None,
        },
        RawRankingEntry::Detailed { pair, reason } => RankingEntry {
            instrument: normalize_symbol(&pair),
            rationale: reason,
        },
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

fn normalize_environment(
    raw: Option<RawEnvironment>,
) -> Result<BTreeMap<String, EnvironmentAssessment>, EvalError> {
    let entries = match raw {
        None => return Ok(BTreeMap::new()),
        Some(RawEnvironment::Wrapped { data }) => data,
        Some(RawEnvironment::Flat(map)) => map,
    };

    let mut environment = BTreeMap::new();
    for (pair, entry) in entries {
        let instrument = normalize_symbol(&pair);
        let field = |name: &str| format!("market_environment.{instrument}.{name}");
        let bias = match entry.bias.as_deref() {
            None => None,
            Some(label) => Some(
                Bias::parse(label)
                    .ok_or_else(|| EvalError::schema(field("bias"), format!("unknown bias {label:?}")))?,
            ),
        };
        let vol_expect = match entry.vol_expect.as_deref() {
            None => None,
            Some(label) => Some(VolTier::parse(label).ok_or_else(|| {
                EvalError::schema(field("vol_expect"), format!("unknown volatility tier {label:?}"))
            })?),
        };
        environment.insert(instrument, EnvironmentAssessment { bias, vol_expect });
    }
    Ok(environment)
}

fn normalize_setups(raw: Vec<RawSetup>, version: &SchemaVersion) -> Result<Vec<Setup>, EvalError> {
    let mut seen = HashSet::new();
    let mut setups = Vec::with_capacity(raw.len());

    for (index, raw_setup) in raw.into_iter().enumerate() {
        let setup = normalize_setup(index, raw_setup, version)?;
        if !seen.insert((setup.instrument.clone(), setup.rank)) {
            return Err(EvalError::schema(
                format!("strategies[{index}].rank"),
                format!("duplicate setup ({}, rank {})", setup.instrument, setup.rank),
            ));
        }
        setups.push(setup);
    }
    Ok(setups)
}

fn normalize_setup(index: usize, raw: RawSetup, version: &SchemaVersion) -> Result<Setup, EvalError> {
    let field = |name: &str| format!("strategies[{index}].{name}");

    let instrument = raw
        .pair
        .as_deref()
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EvalError::schema(field("pair"), "missing"))?;

    let rank = match raw.rank {
        None => return Err(EvalError::schema(field("rank"), "missing")),
        Some(r) if r < 1 => {
            return Err(EvalError::schema(field("rank"), format!("must be positive, got {r}")));
        }
        Some(r) => u32::try_from(r)
            .map_err(|_| EvalError::schema(field("rank"), format!("out of range: {r}")))?,
    };

    let setup_type = raw
        .strategy_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(SetupType::parse)
        .ok_or_else(|| EvalError::schema(field("strategy_type"), "missing"))?;

    let stance = resolve_stance(raw.direction.as_deref(), &setup_type, version, &field)?;

    let entry = normalize_entry(raw.entry.unwrap_or_default(), &field)?;
    if entry.is_some() && stance == Stance::Wait {
        return Err(EvalError::schema(
            field("entry"),
            "WAIT setup must not declare an entry",
        ));
    }

    let raw_exit = raw.exit.unwrap_or_default();
    let exit = ExitSpec {
        target: raw_exit.take_profit,
        stop: raw_exit.stop_loss,
        invalidation: raw_exit.invalidation,
    };
    if let (Some(entry), Some(direction)) = (entry.as_ref(), stance.direction()) {
        check_exit_sides(entry, &exit, direction, &field)?;
    }

    let confidence = raw.confidence_score;
    if let Some(c) = confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(EvalError::schema(
                field("confidence_score"),
                format!("must be within [0, 1], got {c}"),
            ));
        }
    }

    let confidence_breakdown = raw
        .confidence_breakdown
        .map(|b| normalize_breakdown(b, &field))
        .transpose()?;

    let alternative = raw
        .alternative_scenario
        .map(|alt| normalize_alternative(alt, &field))
        .transpose()?;

    if version.at_least(2, 3) {
        let confidence = confidence.ok_or_else(|| {
            EvalError::schema(field("confidence_score"), "missing (required from schema 2.3)")
        })?;
        if let Some(breakdown) = &confidence_breakdown {
            if exceeds_tolerance(breakdown.weighted_score() - confidence) {
                return Err(EvalError::schema(field("confidence_breakdown"), "confidence mismatch"));
            }
        }
        if let Some(alt) = &alternative {
            if exceeds_tolerance(alt.probability + confidence - 1.0) {
                return Err(EvalError::schema(
                    field("alternative_scenario.probability"),
                    "confidence mismatch",
                ));
            }
        }
    }

    Ok(Setup {
        instrument,
        rank,
        setup_type,
        stance,
        valid_sessions: raw
            .valid_sessions
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        entry,
        exit,
        confidence,
        confidence_breakdown,
        stated_risk_reward: raw.risk_reward,
        rationale: raw.rationale,
        alternative,
        intervention: InterventionType::from_modifications(
            raw.hitl_modifications
                .iter()
                .filter_map(|m| m.modification_type.as_deref()),
        ),
    })
}

fn exceeds_tolerance(diff: f64) -> bool {
    diff.abs() > CONFIDENCE_TOLERANCE + TOLERANCE_SLACK
}

fn resolve_stance(
    declared: Option<&str>,
    setup_type: &SetupType,
    version: &SchemaVersion,
    field: &dyn Fn(&str) -> String,
) -> Result<Stance, EvalError> {
    match declared.filter(|d| !d.trim().is_empty()) {
        Some(label) => Stance::parse(label).ok_or_else(|| {
            EvalError::schema(field("direction"), format!("unknown direction {label:?}"))
        }),
        None if version.at_least(2, 2) => Err(EvalError::schema(
            field("direction"),
            "missing (required from schema 2.2)",
        )),
        None => setup_type
            .implied_direction()
            .map(Stance::from)
            .ok_or_else(|| EvalError::schema(field("direction"), "ambiguous direction")),
    }
}

fn normalize_entry(
    raw: RawEntry,
    field: &dyn Fn(&str) -> String,
) -> Result<Option<EntrySpec>, EvalError> {
    let spec = match (raw.zone_min, raw.zone_max, raw.strict_limit) {
        (None, None, None) => return Ok(None),
        (None, None, Some(strict)) => EntrySpec {
            zone_min: strict,
            zone_max: strict,
            strict: Some(strict),
        },
        (Some(zone_min), Some(zone_max), strict) => EntrySpec {
            zone_min,
            zone_max,
            strict,
        },
        (None, Some(_), _) => return Err(EvalError::schema(field("entry.zone_min"), "missing")),
        (Some(_), None, _) => return Err(EvalError::schema(field("entry.zone_max"), "missing")),
    };

    if spec.zone_min > spec.zone_max {
        return Err(EvalError::schema(
            field("entry"),
            format!("zone_min {} above zone_max {}", spec.zone_min, spec.zone_max),
        ));
    }
    if let Some(strict) = spec.strict {
        if strict < spec.zone_min || strict > spec.zone_max {
            return Err(EvalError::schema(
                field("entry.strict_limit"),
                format!("{strict} outside zone [{}, {}]", spec.zone_min, spec.zone_max),
            ));
        }
    }
    Ok(Some(spec))
}

fn check_exit_sides(
    entry: &EntrySpec,
    exit: &ExitSpec,
    direction: super::setup::Direction,
    field: &dyn Fn(&str) -> String,
) -> Result<(), EvalError> {
    use super::setup::Direction;

    let (stop_ok, target_ok) = match direction {
        Direction::Long => (
            exit.stop.is_none_or(|s| s < entry.zone_min),
            exit.target.is_none_or(|t| t > entry.zone_max),
        ),
        Direction::Short => (
            exit.stop.is_none_or(|s| s > entry.zone_max),
            exit.target.is_none_or(|t| t < entry.zone_min),
        ),
    };
    if !stop_ok {
        return Err(EvalError::schema(
            field("exit.stop_loss"),
            "stop on the wrong side of the entry zone",
        ));
    }
    if !target_ok {
        return Err(EvalError::schema(
            field("exit.take_profit"),
            "target on the wrong side of the entry zone",
        ));
    }
    Ok(())
}

fn normalize_breakdown(
    raw: RawBreakdown,
    field: &dyn Fn(&str) -> String,
) -> Result<ConfidenceBreakdown, EvalError> {
    let factor = |value: Option<f64>, name: &str| {
        value.ok_or_else(|| EvalError::schema(field(&format!("confidence_breakdown.{name}")), "missing"))
    };
    Ok(ConfidenceBreakdown {
        technical: factor(raw.technical, "technical")?,
        trend: factor(raw.trend, "trend")?,
        proximity: factor(raw.proximity, "proximity")?,
        fundamental: factor(raw.fundamental, "fundamental")?,
    })
}

fn normalize_alternative(
    raw: RawAlternative,
    field: &dyn Fn(&str) -> String,
) -> Result<AlternativeScenario, EvalError> {
    let probability = raw.probability.ok_or_else(|| {
        EvalError::schema(field("alternative_scenario.probability"), "missing")
    })?;
    if !(0.0..=1.0).contains(&probability) {
        return Err(EvalError::schema(
            field("alternative_scenario.probability"),
            format!("must be within [0, 1], got {probability}"),
        ));
    }
    let stance = match raw.direction.as_deref() {
        None => None,
        Some(label) => Some(Stance::parse(label).ok_or_else(|| {
            EvalError::schema(
                field("alternative_scenario.direction"),
                format!("unknown direction {label:?}"),
            )
        })?),
    };
    Ok(AlternativeScenario {
        stance,
        probability,
        reason: raw.reason,
    })
}
