//! Catalog domain types shared across stores, planning and orchestration.
//!
//! An [`Identifier`] names one catalog object across every store. Enriched
//! knowledge about an object lives in a [`PropertyRecord`]; bulk positional
//! data ingested from upstream catalogs lives in [`RawCatalogRow`]s.

mod types;

pub use types::{fields, AttrValue, Identifier, PropertyRecord, Provenance, RawCatalogRow};
