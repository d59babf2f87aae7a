//! Spatial contract types: tile coordinates, hierarchical addresses, and
//! tile events.
//!
//! An `Address` names a place at one of four nesting depths
//! (world → sector → arena → object). The string codec is total and
//! reversible: `parse` accepts exactly what `Display` produces.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// TileCoord
// ---------------------------------------------------------------------------

/// A tile position in the world grid, column-major `x`, row-major `y`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance; enough for ranking, avoids the sqrt.
    pub fn distance_sq(&self, other: &TileCoord) -> u64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        (dx * dx + dy * dy) as u64
    }

    pub fn manhattan(&self, other: &TileCoord) -> u64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        (dx.abs() + dy.abs()) as u64
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Nesting depth of an address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AddressLevel {
    World,
    Sector,
    Arena,
    Object,
}

/// A hierarchical place name. The `world` field is always present; deeper
/// fields are optional and strictly nested — an `object` implies an `arena`,
/// which implies a `sector`. Construction through the typed builders keeps
/// that invariant; the only other way in is `parse`, which enforces it too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    world: String,
    sector: Option<String>,
    arena: Option<String>,
    object: Option<String>,
}

/// Error produced by [`Address::from_str`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// The input was empty or all whitespace.
    Empty,
    /// A segment between colons was blank (which would skip a level).
    BlankSegment { position: usize },
    /// More than four colon-separated segments.
    TooDeep { segments: usize },
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "address is empty"),
            Self::BlankSegment { position } => {
                write!(f, "address segment {position} is blank")
            }
            Self::TooDeep { segments } => {
                write!(f, "address has {segments} segments, maximum is 4")
            }
        }
    }
}

impl std::error::Error for AddressParseError {}

impl Address {
    pub fn world(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            sector: None,
            arena: None,
            object: None,
        }
    }

    pub fn sector(world: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            sector: Some(sector.into()),
            arena: None,
            object: None,
        }
    }

    pub fn arena(
        world: impl Into<String>,
        sector: impl Into<String>,
        arena: impl Into<String>,
    ) -> Self {
        Self {
            world: world.into(),
            sector: Some(sector.into()),
            arena: Some(arena.into()),
            object: None,
        }
    }

    pub fn object(
        world: impl Into<String>,
        sector: impl Into<String>,
        arena: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            world: world.into(),
            sector: Some(sector.into()),
            arena: Some(arena.into()),
            object: Some(object.into()),
        }
    }

    pub fn world_name(&self) -> &str {
        &self.world
    }

    pub fn sector_name(&self) -> Option<&str> {
        self.sector.as_deref()
    }

    pub fn arena_name(&self) -> Option<&str> {
        self.arena.as_deref()
    }

    pub fn object_name(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn level(&self) -> AddressLevel {
        if self.object.is_some() {
            AddressLevel::Object
        } else if self.arena.is_some() {
            AddressLevel::Arena
        } else if self.sector.is_some() {
            AddressLevel::Sector
        } else {
            AddressLevel::World
        }
    }

    /// Truncate to the given level. Truncating to a deeper level than the
    /// address has returns the address unchanged.
    pub fn prefix(&self, level: AddressLevel) -> Address {
        let mut out = self.clone();
        if level < AddressLevel::Object {
            out.object = None;
        }
        if level < AddressLevel::Arena {
            out.arena = None;
        }
        if level < AddressLevel::Sector {
            out.sector = None;
        }
        out
    }

    /// The address one level up, or `None` for a bare world.
    pub fn parent(&self) -> Option<Address> {
        match self.level() {
            AddressLevel::World => None,
            AddressLevel::Sector => Some(self.prefix(AddressLevel::World)),
            AddressLevel::Arena => Some(self.prefix(AddressLevel::Sector)),
            AddressLevel::Object => Some(self.prefix(AddressLevel::Arena)),
        }
    }

    /// Every prefix from the world down to this address, shallowest first.
    pub fn prefixes(&self) -> Vec<Address> {
        let mut out = vec![self.prefix(AddressLevel::World)];
        if self.sector.is_some() {
            out.push(self.prefix(AddressLevel::Sector));
        }
        if self.arena.is_some() {
            out.push(self.prefix(AddressLevel::Arena));
        }
        if self.object.is_some() {
            out.push(self.clone());
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.world)?;
        if let Some(sector) = &self.sector {
            write!(f, ":{sector}")?;
        }
        if let Some(arena) = &self.arena {
            write!(f, ":{arena}")?;
        }
        if let Some(object) = &self.object {
            write!(f, ":{object}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Err(AddressParseError::Empty);
        }
        let segments = input.split(':').collect::<Vec<_>>();
        if segments.len() > 4 {
            return Err(AddressParseError::TooDeep {
                segments: segments.len(),
            });
        }
        for (position, segment) in segments.iter().enumerate() {
            if segment.trim().is_empty() {
                return Err(AddressParseError::BlankSegment { position });
            }
        }
        let mut parts = segments.into_iter().map(|s| s.trim().to_string());
        Ok(Self {
            world: parts.next().unwrap_or_default(),
            sector: parts.next(),
            arena: parts.next(),
            object: parts.next(),
        })
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Address>().map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TileEvent
// ---------------------------------------------------------------------------

/// The idle predicate/object pair every bare subject canonicalizes to.
pub const IDLE_PREDICATE: &str = "is";
pub const IDLE_OBJECT: &str = "idle";

/// One event attached to a tile: a subject-predicate-object triple plus a
/// free-text description. A bare subject (no predicate) is the idle form.
///
/// Set membership on tiles is keyed by [`TileEvent::canonical_key`], so
/// duplicate inserts are idempotent regardless of structural-equality
/// subtleties in optional fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TileEvent {
    pub subject: String,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub description: Option<String>,
}

impl TileEvent {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: Some(predicate.into()),
            object: Some(object.into()),
            description: Some(description.into()),
        }
    }

    /// The idle event for a subject, e.g. a persona standing around or an
    /// object at rest.
    pub fn idle(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: None,
            object: None,
            description: None,
        }
    }

    pub fn effective_predicate(&self) -> &str {
        self.predicate.as_deref().unwrap_or(IDLE_PREDICATE)
    }

    pub fn effective_object(&self) -> &str {
        self.object.as_deref().unwrap_or(IDLE_OBJECT)
    }

    pub fn effective_description(&self) -> &str {
        self.description.as_deref().unwrap_or(IDLE_OBJECT)
    }

    pub fn is_idle(&self) -> bool {
        self.effective_predicate() == IDLE_PREDICATE && self.effective_object() == IDLE_OBJECT
    }

    /// Canonical set-membership key: `subject|predicate|object|description`.
    pub fn canonical_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.subject,
            self.effective_predicate(),
            self.effective_object(),
            self.effective_description()
        )
    }

    /// Dedupe key for perception: `subject|predicate|object`.
    pub fn triple_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.subject,
            self.effective_predicate(),
            self.effective_object()
        )
    }

    /// Keyword set: the trailing path components of subject and object.
    /// `riverbend:market row:cafe:stove` contributes `stove`.
    pub fn keywords(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for raw in [self.subject.as_str(), self.effective_object()] {
            let tail = raw.rsplit(':').next().unwrap_or(raw).trim();
            if !tail.is_empty() && tail != IDLE_OBJECT {
                out.insert(tail.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_codec_round_trips_every_depth() {
        for raw in [
            "riverbend",
            "riverbend:market row",
            "riverbend:market row:cafe",
            "riverbend:market row:cafe:stove",
        ] {
            let parsed = raw.parse::<Address>().expect("valid address");
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn address_parse_rejects_blank_segment() {
        let err = "riverbend::cafe".parse::<Address>().unwrap_err();
        assert_eq!(err, AddressParseError::BlankSegment { position: 1 });
    }

    #[test]
    fn address_parse_rejects_empty_and_too_deep() {
        assert_eq!("  ".parse::<Address>().unwrap_err(), AddressParseError::Empty);
        assert_eq!(
            "a:b:c:d:e".parse::<Address>().unwrap_err(),
            AddressParseError::TooDeep { segments: 5 }
        );
    }

    #[test]
    fn address_levels_never_skip() {
        let object = Address::object("riverbend", "market row", "cafe", "stove");
        assert_eq!(object.level(), AddressLevel::Object);
        let parent = object.parent().expect("object has a parent");
        assert_eq!(parent.level(), AddressLevel::Arena);
        assert_eq!(object.prefixes().len(), 4);
    }

    #[test]
    fn address_serde_uses_string_codec() {
        let address = Address::arena("riverbend", "market row", "cafe");
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, "\"riverbend:market row:cafe\"");
        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, address);
    }

    #[test]
    fn idle_event_canonicalizes_to_is_idle() {
        let event = TileEvent::idle("Ada Reyes");
        assert!(event.is_idle());
        assert_eq!(event.canonical_key(), "Ada Reyes|is|idle|idle");
        assert_eq!(event.triple_key(), "Ada Reyes|is|idle");
    }

    #[test]
    fn keywords_take_address_tails() {
        let event = TileEvent::new(
            "riverbend:market row:cafe:stove",
            "is",
            "heating soup",
            "the stove is heating soup",
        );
        assert!(event.keywords().contains("stove"));
        assert!(event.keywords().contains("heating soup"));
    }

    #[test]
    fn tile_coord_distances() {
        let a = TileCoord::new(0, 0);
        let b = TileCoord::new(3, 4);
        assert_eq!(a.distance_sq(&b), 25);
        assert_eq!(a.manhattan(&b), 7);
    }
}
