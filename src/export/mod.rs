//! Domain export and import.
//!
//! A [`GraphSnapshot`] holds a domain's nodes (with tags), edges and
//! outgoing references in canonical order. Exporting, importing into a fresh
//! store and exporting again yields the same bytes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::export::{export_domain, import_domain, ExportFormat};
//!
//! let json = export_domain(&store, &domain, ExportFormat::JsonPretty)?;
//! let report = import_domain(&fresh_store, &json)?;
//! ```

mod exporter;
mod snapshot;

pub use exporter::{export_domain, import_domain, import_snapshot, snapshot_domain, ImportReport};
pub use snapshot::{
    ExportFormat, GraphSnapshot, SnapshotDomain, SnapshotEdge, SnapshotNode, SnapshotReference,
    SNAPSHOT_FORMAT_VERSION,
};
