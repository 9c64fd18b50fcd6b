pub mod artifact;
pub mod config;
pub mod pusher;

pub use artifact::{Artifact, BlobManifest};
pub use config::{BackendConfig, BackendConfigError};
pub use pusher::{PushError, PushRequest, PushResult, Pusher};
