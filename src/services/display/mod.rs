//! Display port: responsibility and boundaries
//!
//! This module and its submodules answer ONLY "which displays exist" and
//! "which process owns which window on which display" from live OS state.
//! It is stateless and MUST NOT know about audio devices or the mapping.

mod dry_run;
#[cfg(windows)]
mod win32;
mod r#trait;

pub use self::dry_run::DryRunDisplayPort;
pub use self::r#trait::{create_display_port, DisplayPort};
