//! Mod ingestion, caching and patching for NIKKE skin mods.
//!
//! This crate is the data core behind the mod manager: it discovers mod
//! sources (directories and zip archives), decodes their NKAB containers
//! into identified skin bundles with a persistent per-bundle cache,
//! guarantees a `Default` mod mirroring the live game files, and applies
//! the enabled selection to the game directory with per-record rollback.
//!
//! The rendering side of the application is a consumer of this crate, not
//! part of it: bundles hand out opaque atlas/texture/skeleton payloads and
//! accept a list of animation names back. Parsing of the game's inner
//! asset-container format is likewise behind the [`AssetExtractor`] seam.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use camino::Utf8PathBuf;
//! use nkt_mod_core::{AppConfig, CharacterTable, DataService, FilenameTable};
//! # struct MyExtractor;
//! # impl nkt_mod_core::AssetExtractor for MyExtractor {
//! #     fn extract(&self, _: &[u8]) -> nkt_mod_core::Result<nkt_mod_core::ExtractedAssets> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! # fn main() -> nkt_mod_core::Result<()> {
//! let config = AppConfig::load_or_init(Utf8PathBuf::from("_config.json").as_path())?;
//! let characters = CharacterTable::load(Utf8PathBuf::from("_nikke_data.csv").as_path())?;
//! let filenames = FilenameTable::load(Utf8PathBuf::from("_file_data.csv").as_path())?;
//!
//! let mut service = DataService::new(config, characters, filenames, Arc::new(MyExtractor));
//! service.load()?;
//!
//! let wanted = service
//!     .bundles()
//!     .find(|(_, b)| b.character_id() == "c102")
//!     .map(|(id, _)| id);
//! if let Some(id) = wanted {
//!     service.enable(id)?;
//!     let report = service.patch()?;
//!     println!("patched {} bundles", report.patched.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod collector;
pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod mod_source;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use bundle::{SkinBundle, DEFAULT_POSE};
pub use collector::{ModCollector, DEFAULT_MOD_NAME};
pub use config::AppConfig;
pub use data::{CharacterTable, FilenameTable, UNKNOWN_CHARACTER};
pub use error::{Error, Result};
pub use extract::{AssetEntry, AssetExtractor, AssetKind, ExtractedAssets, TargetPlatform};
pub use manifest::{ModManifest, MANIFEST_FILE};
pub use mod_source::{Mod, ModKind};
pub use service::{
    BundleId, DataService, EnableOutcome, PatchFailure, PatchReport, ServiceEvent, STATE_FILE,
};
