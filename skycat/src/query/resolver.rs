//! Resolver capabilities: remote lookup and local catalog collaborators.
//!
//! The orchestration core never speaks a concrete catalog protocol; it
//! consumes a [`RemoteResolver`] capability (and optionally a
//! [`LocalCatalog`]) injected by the caller. "Object not found" is a
//! result variant rather than an error, so per-identifier failure
//! handling stays a plain data-driven branch.

use crate::catalog::{fields, AttrValue, Identifier};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Named attribute values returned by a resolution.
pub type FieldSet = BTreeMap<String, AttrValue>;

/// Outcome of one remote lookup attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The service resolved the identifier to a set of fields.
    Found(FieldSet),
    /// The service authoritatively does not know the identifier.
    /// Terminal: not retried.
    NotFound,
    /// A transient problem (timeout, throttling, 5xx-equivalent).
    /// Retried with backoff.
    Transient(String),
}

/// Capability to resolve one identifier against a remote lookup service.
///
/// Implementations are injected into the orchestrator; tests use scripted
/// mocks, production uses [`crate::query::HttpResolver`].
#[async_trait]
pub trait RemoteResolver: Send + Sync {
    /// Resolve a single identifier.
    async fn resolve(&self, id: &Identifier) -> Resolution;

    /// Name of the remote service, recorded as record provenance.
    fn source_name(&self) -> &str;
}

/// Capability to resolve identifiers from a statically-bundled catalog.
///
/// Optional: when absent the coordinator's derivable partition simply
/// shrinks. A local hit costs no rate token, so it takes precedence over
/// a remote query.
pub trait LocalCatalog: Send + Sync {
    /// Look up an identifier; `None` when the catalog does not carry it.
    fn lookup(&self, id: &Identifier) -> Option<FieldSet>;

    /// Catalog name for logs.
    fn name(&self) -> &str {
        "local"
    }
}

/// Statically-bundled reference catalog of well-known bright stars.
///
/// Covers a handful of objects every sky view needs, so sessions that only
/// touch famous stars never pay a remote query.
pub struct BundledCatalog;

/// (identifier, ra_deg, dec_deg, vmag, spectral type)
const BRIGHT_STARS: &[(&str, f64, f64, f64, &str)] = &[
    ("HD 48915", 101.287, -16.716, -1.46, "A1Vm"),
    ("HD 172167", 279.235, 38.784, 0.03, "A0V"),
    ("HD 39801", 88.793, 7.407, 0.50, "M1-2Ia-Iab"),
    ("HD 34085", 78.634, -8.202, 0.13, "B8Ia"),
    ("HD 61421", 114.825, 5.225, 0.34, "F5IV-V"),
    ("HD 124897", 213.915, 19.182, -0.05, "K1.5III"),
    ("HD 187642", 297.696, 8.868, 0.76, "A7V"),
];

impl LocalCatalog for BundledCatalog {
    fn lookup(&self, id: &Identifier) -> Option<FieldSet> {
        BRIGHT_STARS
            .iter()
            .find(|(name, ..)| *name == id.as_str())
            .map(|(_, ra, dec, vmag, spectral)| {
                BTreeMap::from([
                    (fields::RA_DEG.to_string(), AttrValue::Float(*ra)),
                    (fields::DEC_DEG.to_string(), AttrValue::Float(*dec)),
                    (fields::VMAG.to_string(), AttrValue::Float(*vmag)),
                    (
                        fields::SPECTRAL_TYPE.to_string(),
                        AttrValue::Text((*spectral).to_string()),
                    ),
                    (
                        fields::OBJECT_CLASS.to_string(),
                        AttrValue::Text("star".to_string()),
                    ),
                ])
            })
    }

    fn name(&self) -> &str {
        "bundled-bright-stars"
    }
}
