//! Audio device port: responsibility and boundaries
//!
//! This module wraps the platform audio subsystem ONLY: endpoint enumeration,
//! default endpoint lookup, per-endpoint volume and per-process endpoint assignment.
//! Every operation degrades to a logged safe default instead of failing the caller.
//! It MUST NOT know anything about displays, mappings or the reconciliation cache.

mod catalog;
mod dry_run;
#[cfg(windows)]
mod wasapi;
mod r#trait;

pub use self::catalog::DeviceCatalog;
pub use self::dry_run::DryRunAudioPort;
pub use self::r#trait::{create_audio_port, AudioDevicePort};
