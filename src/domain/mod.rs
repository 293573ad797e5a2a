//! Plain domain values shared by the rendering pipeline, the provisioner and
//! the export orchestrator. Nothing in here performs I/O.

pub mod slug;
pub mod types;

pub use types::{
    Document, ExportType, ProvisioningPolicy, RenderConfig, UnknownExportType,
    UnknownProvisioningPolicy,
};
