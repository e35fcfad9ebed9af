pub mod config;
pub mod platform;

pub use config::{BlobBackend, MirrorConfig};
pub use platform::Platform;
