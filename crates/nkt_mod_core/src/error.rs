//! Error types for the mod pipeline.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses
//! [`Error`] as the error type. External error types (`std::io::Error`,
//! `serde_json::Error`, ZIP and codec errors) convert automatically via
//! `From` impls.
//!
//! During ingestion, per-bundle errors fall into two buckets: *expected
//! skips* ([`Error::is_skip`] is true) for files that are simply not skin
//! bundles for this platform, and real failures that count against a mod's
//! failed-bundle tally. Neither bucket ever aborts a mod load.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting, caching or patching mods.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (reading mods, writing caches, patching).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (config, mod manifest).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read an archive mod.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The NKAB codec rejected a container.
    #[error("container error: {0}")]
    Nkab(#[from] nkt_nkab::NkabError),

    /// Failed to serialize a bundle to its cache encoding.
    #[error("cache encode error: {0}")]
    CacheEncode(#[from] rmp_serde::encode::Error),

    /// Failed to deserialize a bundle from its cache encoding.
    #[error("cache decode error: {0}")]
    CacheDecode(#[from] rmp_serde::decode::Error),

    /// The asset-extraction collaborator could not parse decrypted bytes.
    #[error("asset extraction failed: {0}")]
    Extract(String),

    /// The container decodes fine but does not hold a usable skin bundle
    /// (unrecognized atlas name, missing payload, or an id the character
    /// table marks as skip). Expected during ingestion; never counted.
    #[error("not a skin bundle: {0}")]
    NotSkin(String),

    /// The bundle targets a platform other than the one we patch.
    /// Expected during ingestion; never counted.
    #[error("unsupported target platform: {0}")]
    PlatformMismatch(String),

    /// The live game directory is missing or unreadable. Fatal for the
    /// operation in progress (load or patch), but never touches persisted
    /// state.
    #[error("unable to find game data in `{0}`")]
    GameDataNotFound(Utf8PathBuf),

    /// Rebuilding the Default mod from the game directory produced no
    /// bundles — the directory does not hold valid game data.
    #[error("game data in `{0}` contains no decodable bundles")]
    EmptyGameData(Utf8PathBuf),

    /// A bundle was enabled whose identity has no baseline to swap from.
    #[error("no enabled baseline for {identifier} ({bundle})")]
    UnknownIdentity { identifier: String, bundle: String },
}

impl Error {
    /// Whether this is an expected per-bundle skip condition: logged
    /// quietly during ingestion and excluded from the failed-bundle count.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::NotSkin(_) | Error::PlatformMismatch(_))
    }
}
