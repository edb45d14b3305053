//! Entity types, structural levels, and progression-edge conditions.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The entity types managed by the progression engine.
///
/// Attribute-only types (Character, Faction, Race, ...) live outside this
/// crate; only types that participate in progression or containment edges
/// are modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Rank,
    Timeline,
    Location,
    RankSystem,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::Timeline => "timeline",
            Self::Location => "location",
            Self::RankSystem => "rank_system",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rank" => Ok(Self::Rank),
            "timeline" => Ok(Self::Timeline),
            "location" => Ok(Self::Location),
            "rank_system" | "rank-system" => Ok(Self::RankSystem),
            other => bail!(
                "unknown entity type '{other}': expected one of rank, timeline, location, rank_system"
            ),
        }
    }
}

/// Structural level of a Location, ordered from smallest to largest.
///
/// The derive order matters: `Ord` follows declaration order, so
/// `Structure < Complex < ... < World`. Containment requires the parent's
/// level to be greater than or equal to the child's.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LocationLevel {
    Structure,
    Complex,
    Settlement,
    Region,
    Territory,
    World,
}

impl LocationLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Complex => "complex",
            Self::Settlement => "settlement",
            Self::Region => "region",
            Self::Territory => "territory",
            Self::World => "world",
        }
    }
}

impl fmt::Display for LocationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structure" => Ok(Self::Structure),
            "complex" => Ok(Self::Complex),
            "settlement" => Ok(Self::Settlement),
            "region" => Ok(Self::Region),
            "territory" => Ok(Self::Territory),
            "world" => Ok(Self::World),
            other => bail!(
                "unknown structural level '{other}': expected one of structure, complex, settlement, region, territory, world"
            ),
        }
    }
}

/// One reason a progression transition occurs, e.g. `{"trial by combat", ...}`.
///
/// Conditions are carried per edge as an ordered list; re-linking the same
/// pair replaces the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Condition {
    /// Shorthand used mostly by tests.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }
}

/// A persisted entity with its lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Set for Locations only; `None` elsewhere.
    pub level: Option<LocationLevel>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating an entity. The store fills in
/// the timestamps.
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<LocationLevel>,
    pub tags: Vec<String>,
}

/// Partial update for an entity. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<LocationLevel>,
    pub tags: Option<Vec<String>>,
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Rank
    }
}

/// Render a timestamp in the canonical store format (RFC 3339, microsecond
/// precision, UTC). The fixed format keeps lexicographic and chronological
/// order aligned, which the created-at sort clauses rely on.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously written by [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("parse stored timestamp '{raw}'"))
}
