//! Per-owner storage namespaces.
//!
//! Each storage root (input, output, temp) is shared by all owners; every
//! owner works inside `<root>/<owner>`. Job payloads are rewritten on submit
//! so that output prefixes land inside the submitter's namespace.

pub mod namespace;

pub use namespace::{inject_namespace, NamespaceResolver, StorageKind};
