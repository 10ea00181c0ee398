//! Route entries: the tagged union stored in the route buffer.
//!
//! Every entry carries an [`EntryId`] assigned by the recorder at insertion
//! time. Asynchronous enrichment (elevation) addresses entries by id, never
//! by coordinate match.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::GpsPoint;

/// Identifier assigned to an entry when it enters the buffer.
///
/// `EntryId(0)` means "not yet assigned"; the recorder replaces it on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const UNASSIGNED: EntryId = EntryId(0);

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

/// Where an elevation value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElevationSource {
    /// Reported by the positioning device with the sample
    Device,
    /// Fresh result of the external lookup
    Api,
    /// Last external result reused between throttled lookups
    ApiCached,
}

/// Elevation attached to a position entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elevation {
    /// Meters above sea level
    pub meters: f64,
    pub source: ElevationSource,
    /// Vertical accuracy in meters, when the device reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// An accepted positioning sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    #[serde(default)]
    pub id: EntryId,
    pub coords: GpsPoint,
    /// Capture time, Unix milliseconds
    pub timestamp: i64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<Elevation>,
}

/// Encoded image bytes. Serialized as a base64 string.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct PhotoPayload(pub Vec<u8>);

impl std::fmt::Debug for PhotoPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhotoPayload({} bytes)", self.0.len())
    }
}

impl Serialize for PhotoPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.0);
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for PhotoPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(PhotoPayload)
            .map_err(serde::de::Error::custom)
    }
}

/// A photo attached at the current location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEntry {
    #[serde(default)]
    pub id: EntryId,
    pub coords: GpsPoint,
    pub data: PhotoPayload,
    pub timestamp: i64,
    /// Size of the image before encoding, in bytes
    pub original_size: u64,
}

/// A free-text annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEntry {
    #[serde(default)]
    pub id: EntryId,
    pub coords: GpsPoint,
    pub text: String,
    pub timestamp: i64,
}

/// One captured unit of route data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RouteEntry {
    Position(PositionEntry),
    Photo(PhotoEntry),
    Note(NoteEntry),
}

impl RouteEntry {
    /// Build an unassigned position entry.
    pub fn position(coords: GpsPoint, timestamp: i64, accuracy: f64) -> Self {
        RouteEntry::Position(PositionEntry {
            id: EntryId::UNASSIGNED,
            coords,
            timestamp,
            accuracy,
            elevation: None,
        })
    }

    /// Build an unassigned photo entry. `original_size` is taken from the payload.
    pub fn photo(coords: GpsPoint, bytes: Vec<u8>, timestamp: i64) -> Self {
        let original_size = bytes.len() as u64;
        RouteEntry::Photo(PhotoEntry {
            id: EntryId::UNASSIGNED,
            coords,
            data: PhotoPayload(bytes),
            timestamp,
            original_size,
        })
    }

    /// Build an unassigned note entry.
    pub fn note(coords: GpsPoint, text: impl Into<String>, timestamp: i64) -> Self {
        RouteEntry::Note(NoteEntry {
            id: EntryId::UNASSIGNED,
            coords,
            text: text.into(),
            timestamp,
        })
    }

    pub fn id(&self) -> EntryId {
        match self {
            RouteEntry::Position(p) => p.id,
            RouteEntry::Photo(p) => p.id,
            RouteEntry::Note(n) => n.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: EntryId) {
        match self {
            RouteEntry::Position(p) => p.id = id,
            RouteEntry::Photo(p) => p.id = id,
            RouteEntry::Note(n) => n.id = id,
        }
    }

    pub fn coords(&self) -> GpsPoint {
        match self {
            RouteEntry::Position(p) => p.coords,
            RouteEntry::Photo(p) => p.coords,
            RouteEntry::Note(n) => n.coords,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            RouteEntry::Position(p) => p.timestamp,
            RouteEntry::Photo(p) => p.timestamp,
            RouteEntry::Note(n) => n.timestamp,
        }
    }

    pub fn as_position(&self) -> Option<&PositionEntry> {
        match self {
            RouteEntry::Position(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_position_mut(&mut self) -> Option<&mut PositionEntry> {
        match self {
            RouteEntry::Position(p) => Some(p),
            _ => None,
        }
    }
}
