//! Application services: asset resolution, rendering, templating, browser
//! provisioning and export orchestration.

pub mod assets;
pub mod error;
pub mod export;
pub mod provision;
pub mod render;
pub mod template;
