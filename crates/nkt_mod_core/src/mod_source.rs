//! Mod sources: directory trees and zip archives.
//!
//! A [`Mod`] enumerates the candidate bundle files inside one container —
//! either a directory tree or a `.zip` archive — and decodes each into a
//! [`SkinBundle`]. Sources know nothing about bundle semantics; a candidate
//! is simply any file whose name looks like a content-hash filename (32
//! hex characters), which is how the game names its asset bundles.
//!
//! Decoding is per-file and isolated: expected skips (non-skin containers,
//! foreign platforms) are logged at debug level, unexpected failures are
//! counted and logged, and neither ever aborts the mod's load. Within one
//! mod, bundles decode on a rayon worker pool or sequentially depending on
//! configuration.

use std::io::Read;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use regex::Regex;

use crate::bundle::SkinBundle;
use crate::data::CharacterTable;
use crate::error::Result;
use crate::extract::AssetExtractor;
use crate::manifest::{ModManifest, MANIFEST_FILE};

/// Game asset bundles are named by content hash: 32 hex characters.
fn bundle_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9a-z]{32}(\s|$)").expect("static bundle pattern"))
}

/// How a mod's files are stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModKind {
    Directory,
    Archive,
}

/// One mod: a named collection of decoded bundles plus optional manifest.
///
/// A mod exclusively owns its bundles. Construct with [`Mod::directory`] or
/// [`Mod::archive`], then call [`load`](Mod::load) to decode its contents.
#[derive(Debug)]
pub struct Mod {
    name: String,
    path: Utf8PathBuf,
    kind: ModKind,
    bundles: Vec<SkinBundle>,
    manifest: ModManifest,
    failed_bundles: usize,
}

impl Mod {
    /// A mod backed by a directory tree of bundle files.
    pub fn directory(path: Utf8PathBuf) -> Self {
        Self::new(path, ModKind::Directory)
    }

    /// A mod backed by a zip archive.
    pub fn archive(path: Utf8PathBuf) -> Self {
        Self::new(path, ModKind::Archive)
    }

    fn new(path: Utf8PathBuf, kind: ModKind) -> Self {
        let name = path
            .file_stem()
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string());
        Self {
            name,
            path,
            kind,
            bundles: Vec::new(),
            manifest: ModManifest::default(),
            failed_bundles: 0,
        }
    }

    /// Read and decode all candidate bundle files.
    ///
    /// Prefers `.cache` files under this mod's cache directory over full
    /// container decodes. Per-file failures are bucketed (skip / counted)
    /// and never abort the load; only source-level I/O failures (an
    /// unreadable directory or archive) surface as errors.
    pub fn load(
        &mut self,
        cache_root: &Utf8Path,
        characters: &CharacterTable,
        extractor: &dyn AssetExtractor,
        parallel: bool,
    ) -> Result<()> {
        let (entries, manifest) = match self.kind {
            ModKind::Directory => self.read_directory()?,
            ModKind::Archive => self.read_archive()?,
        };
        if let Some(manifest) = manifest {
            self.manifest = manifest;
        }

        tracing::info!(
            "Loading mod {} ({} candidate files)",
            self.name,
            entries.len()
        );

        let mod_cache_dir = self.cache_dir(cache_root);
        let decode = |(relative_path, data): (Utf8PathBuf, Vec<u8>)| {
            let result = SkinBundle::decode(
                relative_path.clone(),
                data,
                &mod_cache_dir,
                characters,
                extractor,
            );
            (relative_path, result)
        };

        let results: Vec<_> = if parallel {
            entries.into_par_iter().map(decode).collect()
        } else {
            entries.into_iter().map(decode).collect()
        };

        for (relative_path, result) in results {
            match result {
                Ok(bundle) => self.bundles.push(bundle),
                Err(err) if err.is_skip() => {
                    tracing::debug!("Skipping {relative_path} in {}: {err}", self.name);
                }
                Err(err) => {
                    tracing::warn!(
                        "Failed to build bundle {relative_path} in {}: {err}",
                        self.name
                    );
                    self.failed_bundles += 1;
                }
            }
        }

        Ok(())
    }

    fn read_directory(&self) -> Result<SourceEntries> {
        tracing::info!("Scanning directory mod {}", self.path);
        let mut entries = Vec::new();
        let mut manifest = None;

        for entry in walkdir::WalkDir::new(self.path.as_std_path()) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(path) => {
                    tracing::warn!("Skipping non-UTF-8 path: {}", path.display());
                    continue;
                }
            };
            let Some(file_name) = path.file_name() else {
                continue;
            };

            if file_name == MANIFEST_FILE {
                match ModManifest::from_slice(&std::fs::read(path.as_std_path())?) {
                    Ok(parsed) => manifest = Some(parsed),
                    Err(err) => {
                        tracing::warn!("Unable to read mod manifest for {}: {err}", self.name);
                    }
                }
            } else if bundle_name_pattern().is_match(file_name) {
                let relative_path = path
                    .strip_prefix(&self.path)
                    .unwrap_or(&path)
                    .to_path_buf();
                entries.push((relative_path, std::fs::read(path.as_std_path())?));
            }
        }

        Ok((entries, manifest))
    }

    fn read_archive(&self) -> Result<SourceEntries> {
        tracing::info!("Scanning archive mod {}", self.path);
        let file = std::fs::File::open(self.path.as_std_path())?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut entries = Vec::new();
        let mut manifest = None;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let path = match entry
                .enclosed_name()
                .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            {
                Some(path) => path,
                None => {
                    tracing::warn!(
                        "Skipping unsafe or non-UTF-8 archive entry in {}",
                        self.name
                    );
                    continue;
                }
            };
            let Some(file_name) = path.file_name() else {
                continue;
            };

            if file_name == MANIFEST_FILE {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                match ModManifest::from_slice(&buf) {
                    Ok(parsed) => manifest = Some(parsed),
                    Err(err) => {
                        tracing::warn!("Unable to read mod manifest for {}: {err}", self.name);
                    }
                }
            } else if bundle_name_pattern().is_match(file_name) {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                entries.push((path, buf));
            }
        }

        Ok((entries, manifest))
    }

    /// This mod's cache directory under the application cache root.
    pub fn cache_dir(&self, cache_root: &Utf8Path) -> Utf8PathBuf {
        cache_root.join(&self.name)
    }

    /// Export a cache file for every loaded bundle.
    pub fn export_cache(&self, cache_root: &Utf8Path) -> Result<()> {
        let dir = self.cache_dir(cache_root);
        std::fs::create_dir_all(dir.as_std_path())?;
        for bundle in &self.bundles {
            bundle.export_cache(&dir)?;
        }
        Ok(())
    }

    /// Delete this mod's cache directory, if present.
    pub fn delete_cache(&self, cache_root: &Utf8Path) -> Result<()> {
        let dir = self.cache_dir(cache_root);
        if dir.as_std_path().exists() {
            std::fs::remove_dir_all(dir.as_std_path())?;
        }
        Ok(())
    }

    /// Delete this mod's cache directory, then the mod itself.
    pub fn delete(&self, cache_root: &Utf8Path) -> Result<()> {
        self.delete_cache(cache_root)?;
        let path = self.path.as_std_path();
        if path.is_file() {
            std::fs::remove_file(path)?;
        } else if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn kind(&self) -> ModKind {
        self.kind
    }

    pub fn bundles(&self) -> &[SkinBundle] {
        &self.bundles
    }

    pub(crate) fn bundles_mut(&mut self) -> &mut [SkinBundle] {
        &mut self.bundles
    }

    pub fn manifest(&self) -> &ModManifest {
        &self.manifest
    }

    /// Bundles that failed to decode for unexpected reasons. Expected skips
    /// are not counted.
    pub fn failed_bundles(&self) -> usize {
        self.failed_bundles
    }
}

type SourceEntries = (Vec<(Utf8PathBuf, Vec<u8>)>, Option<ModManifest>);
