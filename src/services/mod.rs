pub mod audio;
pub mod display;
pub mod mapping_store;
pub mod mapping_watcher;
pub mod reconcile;
pub mod router;

pub use audio::{create_audio_port, AudioDevicePort, DeviceCatalog};
pub use display::{create_display_port, DisplayPort};
pub use mapping_store::MappingStore;
pub use mapping_watcher::MappingWatcher;
pub use reconcile::ReconciliationCache;
pub use router::{Router, RouterHandle, RouterSettings};
