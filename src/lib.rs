//! FHIR bundle reference resolution
//!
//! Denormalizes a self-contained FHIR bundle into a fully materialized
//! object graph: starting from a `DiagnosticOrder`, `"Type/id"` references
//! are replaced with embedded deep copies of the records they point to,
//! including the recursive related-observation chain of a report's results.
//!
//! The input bundle is never mutated and resolved output shares no
//! substructure with it, so one bundle can back repeated or concurrent
//! resolutions. Only a fixed set of resource types is supported; see
//! [`resource::ResourceType`].

#![warn(missing_docs)]

pub mod bundle;
pub mod error;
pub mod ranges;
pub mod resolver;
pub mod resource;

pub use bundle::Bundle;
pub use error::{ResolveError, Result};
pub use resolver::{BundleResolver, ResolvedBundle, resolve_order_and_report_references};
pub use resource::{Record, ResourceType, referenced_id};
