//! Core catalog data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known property field names.
///
/// Resolvers and derivation paths agree on these names so that a record
/// assembled from a raw catalog row is interchangeable with one returned
/// by a remote lookup.
pub mod fields {
    /// Right ascension in decimal degrees (J2000).
    pub const RA_DEG: &str = "ra_deg";
    /// Declination in decimal degrees (J2000).
    pub const DEC_DEG: &str = "dec_deg";
    /// Apparent visual magnitude.
    pub const VMAG: &str = "vmag";
    /// Parallax in milliarcseconds.
    pub const PARALLAX_MAS: &str = "parallax_mas";
    /// Spectral classification (e.g. "G2V").
    pub const SPECTRAL_TYPE: &str = "spectral_type";
    /// Object classification (e.g. "star", "open_cluster").
    pub const OBJECT_CLASS: &str = "object_class";
}

/// Unique key naming one catalog object across all stores.
///
/// Identifiers are opaque strings (typically cross-catalog designations
/// such as `HD 48915` or `HIP 32349`) and are immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A typed attribute value inside a [`PropertyRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Free-form text (spectral types, classifications, notes).
    Text(String),
    /// Integer quantity (counts, catalog numbers). Declared before
    /// `Float`: untagged deserialization tries variants in order, and an
    /// integer JSON number must load back as `Int`.
    Int(i64),
    /// Floating-point quantity (coordinates, magnitudes, parallaxes).
    Float(f64),
    /// Boolean flag.
    Bool(bool),
}

impl AttrValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text view of the value, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value carries no information.
    ///
    /// Only the empty string counts as empty; `0`, `0.0` and `false` are
    /// legitimate measurements.
    pub fn is_empty(&self) -> bool {
        matches!(self, AttrValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// Which query or catalog produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Resolved by a remote lookup service.
    Remote {
        /// Name of the remote service that answered.
        source: String,
    },
    /// Resolved from a statically-bundled local catalog.
    LocalCatalog,
    /// Derived from a raw bulk-catalog row.
    RawDerived {
        /// Name of the raw catalog the row came from.
        source: String,
    },
    /// Terminal placeholder: the identifier is resolved-but-unavailable
    /// (remote said not-found, or retries were exhausted).
    Unavailable,
}

/// Enriched description of one catalog object.
///
/// A record is created when a query succeeds or a local catalog resolves
/// the identifier, and is mutated only by re-query. Incoming empty fields
/// never clobber populated ones unless the caller asks for a wholesale
/// refresh (see [`crate::store::MergeMode`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Named attributes and their typed values.
    pub fields: BTreeMap<String, AttrValue>,
    /// Which query or catalog produced this record.
    pub provenance: Provenance,
    /// When the record was last produced or refreshed.
    pub updated_at: DateTime<Utc>,
}

impl PropertyRecord {
    /// Create an empty record with the given provenance, stamped now.
    pub fn new(provenance: Provenance) -> Self {
        Self {
            fields: BTreeMap::new(),
            provenance,
            updated_at: Utc::now(),
        }
    }

    /// Create a record from a resolved field set.
    pub fn from_fields(fields: BTreeMap<String, AttrValue>, provenance: Provenance) -> Self {
        Self {
            fields,
            provenance,
            updated_at: Utc::now(),
        }
    }

    /// Terminal placeholder for an identifier that could not be resolved.
    ///
    /// Keeps the identifier visible to future satisfied-checks so it is
    /// not silently dropped and re-queried forever.
    pub fn terminal() -> Self {
        Self::new(Provenance::Unavailable)
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.fields.get(name)
    }

    /// Whether the named field is present with a non-empty value.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Whether every required field is present with a non-empty value.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|name| self.has_field(name))
    }

    /// Whether the record carries no usable fields.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.is_empty())
    }

    /// Whether this is a terminal resolved-but-unavailable placeholder.
    pub fn is_terminal(&self) -> bool {
        self.provenance == Provenance::Unavailable
    }

    /// Age of the record relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }

    /// Field-wise merge of an incoming record into this one.
    ///
    /// Non-empty incoming fields overwrite; empty incoming fields are
    /// ignored so a failed or partial re-query cannot erase accumulated
    /// data. When anything is absorbed the provenance and timestamp move
    /// to the incoming record's, marking the stored record as refreshed.
    ///
    /// Returns whether the record was refreshed.
    pub fn absorb(&mut self, incoming: &PropertyRecord) -> bool {
        let mut refreshed = false;
        for (name, value) in &incoming.fields {
            if value.is_empty() {
                continue;
            }
            self.fields.insert(name.clone(), value.clone());
            refreshed = true;
        }
        if refreshed {
            self.provenance = incoming.provenance.clone();
            self.updated_at = incoming.updated_at;
        }
        refreshed
    }
}

/// One entry from a bulk catalog source.
///
/// Rows carry a fixed positional/photometric schema and are immutable once
/// ingested; a later ingestion of the same identifier supersedes the prior
/// row rather than appending to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCatalogRow {
    /// Catalog object this row describes.
    pub id: Identifier,
    /// Right ascension in decimal degrees, `[0, 360)`.
    pub ra_deg: f64,
    /// Declination in decimal degrees, `[-90, +90]`.
    pub dec_deg: f64,
    /// Apparent visual magnitude, if the source provides it.
    pub vmag: Option<f64>,
    /// Parallax in milliarcseconds, if the source provides it.
    pub parallax_mas: Option<f64>,
    /// Spectral classification, if the source provides it.
    pub spectral_type: Option<String>,
}

impl RawCatalogRow {
    /// Whether the row passes schema validation.
    pub fn is_valid(&self) -> bool {
        !self.id.as_str().is_empty()
            && self.ra_deg.is_finite()
            && (0.0..360.0).contains(&self.ra_deg)
            && self.dec_deg.is_finite()
            && (-90.0..=90.0).contains(&self.dec_deg)
            && self.vmag.is_none_or(f64::is_finite)
            && self.parallax_mas.is_none_or(f64::is_finite)
    }

    /// Derive a minimal property record from the raw fields alone.
    pub fn to_minimal_record(&self, source: &str) -> PropertyRecord {
        let mut record = PropertyRecord::new(Provenance::RawDerived {
            source: source.to_string(),
        })
        .with_field(fields::RA_DEG, self.ra_deg)
        .with_field(fields::DEC_DEG, self.dec_deg);

        if let Some(vmag) = self.vmag {
            record = record.with_field(fields::VMAG, vmag);
        }
        if let Some(parallax) = self.parallax_mas {
            record = record.with_field(fields::PARALLAX_MAS, parallax);
        }
        if let Some(spectral) = &self.spectral_type {
            record = record.with_field(fields::SPECTRAL_TYPE, spectral.clone());
        }
        record
    }
}
