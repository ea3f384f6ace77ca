pub mod chunks;
pub mod config;
pub mod delivery;
pub mod duration;
pub mod error;
pub mod ffprobe;
pub mod library;
pub mod process;
pub mod readable;
pub mod recovery;
pub mod remux;
pub mod routes;
pub mod scan;
pub mod service;
pub mod session;
pub mod thumbnail;

#[cfg(test)]
mod testing;

pub use config::MediaConfig;
pub use delivery::{MediaDeliveryServer, MediaResponse};
pub use duration::DurationResolver;
pub use error::{MediaError, MediaResult};
pub use ffprobe::{FFProbeData, FFProbeFormat, FFProbeStream, MediaProber};
pub use library::{AssetCatalog, AssetStore, MediaAsset, MediaIdRegistry, MediaLibrary};
pub use recovery::CrashRecoveryScanner;
pub use remux::{RemuxCache, Remuxer};
pub use service::{MediaServices, Toolchain};
pub use session::{RecordingSessionManager, SessionConfig};
pub use thumbnail::ThumbnailGenerator;
