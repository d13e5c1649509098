//! The data service: registry of loaded bundles, the enabled selection,
//! and the transactional patch to the game directory.
//!
//! The service owns every loaded [`Mod`] and tracks three maps keyed by
//! file identifier:
//!
//! - **installed** — what we believe is currently written to the game
//!   directory; persisted across runs in the state file.
//! - **enabled** — what the user wants installed; initialized from the
//!   installed set.
//! - **pending swap** — for each identity with a changed selection, the
//!   bundle that was displaced. One entry per identity, last enable wins;
//!   this is the revert value when a patch fails for that identity.
//!
//! Bundles are addressed by [`BundleId`], a stable synthetic handle into
//! the loaded mod list, so selections survive serialization and never
//! depend on reference identity.
//!
//! `patch()` applies the changed selection to disk with per-record
//! isolation: a missing target file fails that record in pre-flight, a
//! write error restores the in-memory backup, and in both cases only the
//! failing identity reverts — the rest of the batch proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::bundle::SkinBundle;
use crate::collector::{ModCollector, DEFAULT_MOD_NAME};
use crate::config::AppConfig;
use crate::data::{CharacterTable, FilenameTable};
use crate::error::{Error, Result};
use crate::extract::AssetExtractor;
use crate::mod_source::Mod;

/// File recording the installed selection, one `<Mod>/<relativePath>`
/// unique identifier per line.
pub const STATE_FILE: &str = "_state";

/// Stable handle to one bundle in the loaded mod list.
///
/// Valid until the next [`DataService::load`]; the service hands these out
/// and resolves them back through [`DataService::bundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleId {
    mod_index: usize,
    bundle_index: usize,
}

/// Events emitted to the optional observer. Mirrors the structured return
/// values; UI-style consumers can subscribe instead of polling.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    DataLoaded { mods: usize, bundles: usize },
    BundleEnabled { bundle: BundleId, enabled: bool },
    PatchComplete { patched: Vec<BundleId> },
    Error { message: String },
}

/// Result of enabling a bundle: the record now enabled and the one it
/// displaced (identical when the selection didn't change).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableOutcome {
    pub enabled: BundleId,
    pub disabled: BundleId,
}

/// One record that failed during a patch.
#[derive(Debug, Clone)]
pub struct PatchFailure {
    pub bundle: BundleId,
    pub identifier: String,
    pub reason: String,
}

/// Outcome of a [`DataService::patch`] run.
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    /// Records successfully written to the game directory.
    pub patched: Vec<BundleId>,
    /// Records dropped before writing because their target could not be
    /// resolved; aggregated into a single user-facing report.
    pub preflight_failures: Vec<PatchFailure>,
    /// Records whose write failed and was rolled back.
    pub write_failures: Vec<PatchFailure>,
}

impl PatchReport {
    /// Whether every changed record was written.
    pub fn is_clean(&self) -> bool {
        self.preflight_failures.is_empty() && self.write_failures.is_empty()
    }
}

type Observer = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

/// Owns the loaded mods and the enable/patch registry.
pub struct DataService {
    config: AppConfig,
    characters: CharacterTable,
    filenames: FilenameTable,
    extractor: Arc<dyn AssetExtractor>,
    state_path: Utf8PathBuf,

    mods: Vec<Mod>,
    installed: HashMap<String, BundleId>,
    enabled: HashMap<String, BundleId>,
    pending_swap: HashMap<String, BundleId>,

    observer: Option<Observer>,
}

impl DataService {
    pub fn new(
        config: AppConfig,
        characters: CharacterTable,
        filenames: FilenameTable,
        extractor: Arc<dyn AssetExtractor>,
    ) -> Self {
        Self {
            config,
            characters,
            filenames,
            extractor,
            state_path: Utf8PathBuf::from(STATE_FILE),
            mods: Vec::new(),
            installed: HashMap::new(),
            enabled: HashMap::new(),
            pending_swap: HashMap::new(),
            observer: None,
        }
    }

    /// Override where the installed-state file lives (default: `_state`
    /// in the working directory).
    pub fn with_state_path(mut self, path: Utf8PathBuf) -> Self {
        self.state_path = path;
        self
    }

    /// Register an observer for service events.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Collect and decode all mods, then restore the installed selection.
    ///
    /// Replaces any previously loaded data; all previously issued
    /// [`BundleId`]s are invalidated.
    pub fn load(&mut self) -> Result<()> {
        let collector = ModCollector::new(&self.characters, &*self.extractor)
            .with_parallel(self.config.parallel_load);
        let mods = collector.collect(
            &self.config.cache_dir,
            &self.config.mod_dir,
            &self.config.game_dir,
            &mut self.filenames,
        )?;
        self.mods = mods;
        self.load_installed_state()?;

        let bundles = self.mods.iter().map(|m| m.bundles().len()).sum();
        self.emit(&ServiceEvent::DataLoaded {
            mods: self.mods.len(),
            bundles,
        });
        Ok(())
    }

    /// Whether the configured game directory exists.
    pub fn game_data_present(&self) -> bool {
        self.config.game_dir.as_std_path().is_dir()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mods(&self) -> &[Mod] {
        &self.mods
    }

    /// Resolve a handle to its bundle. `None` for handles from a previous
    /// load.
    pub fn bundle(&self, id: BundleId) -> Option<&SkinBundle> {
        self.mods
            .get(id.mod_index)
            .and_then(|m| m.bundles().get(id.bundle_index))
    }

    /// The mod that owns a bundle.
    pub fn bundle_source(&self, id: BundleId) -> Option<&Mod> {
        self.mods.get(id.mod_index)
    }

    /// All loaded bundles with their handles.
    pub fn bundles(&self) -> impl Iterator<Item = (BundleId, &SkinBundle)> {
        self.mods.iter().enumerate().flat_map(|(mod_index, m)| {
            m.bundles()
                .iter()
                .enumerate()
                .map(move |(bundle_index, bundle)| {
                    (
                        BundleId {
                            mod_index,
                            bundle_index,
                        },
                        bundle,
                    )
                })
        })
    }

    /// Unique identifier for a bundle: `<ModName>/<relativePath>`. This is
    /// the line format of the state file.
    pub fn unique_identifier(&self, id: BundleId) -> Option<String> {
        let source = self.bundle_source(id)?;
        let bundle = self.bundle(id)?;
        Some(format!("{}/{}", source.name(), bundle.relative_path()))
    }

    /// Display name for a character id, from the character table.
    pub fn character_name(&self, character_id: &str) -> &str {
        self.characters.display_name(character_id)
    }

    /// Game filename recorded for an identity.
    pub fn filename_for(&self, identifier: &str) -> Option<&str> {
        self.filenames.get(identifier)
    }

    /// Distinct character ids across all loaded bundles, sorted.
    pub fn character_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bundles()
            .map(|(_, b)| b.character_id().to_string())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Distinct skin indices for a character, sorted.
    pub fn skins(&self, character_id: &str) -> Vec<u32> {
        let mut skins: Vec<u32> = self
            .bundles()
            .filter(|(_, b)| b.character_id() == character_id)
            .map(|(_, b)| b.skin_index())
            .collect();
        skins.sort_unstable();
        skins.dedup();
        skins
    }

    /// Distinct poses for a character and skin, sorted. Usually some
    /// subset of `aim`, `cover`, `idle`.
    pub fn poses(&self, character_id: &str, skin_index: u32) -> Vec<String> {
        let mut poses: Vec<String> = self
            .bundles()
            .filter(|(_, b)| b.character_id() == character_id && b.skin_index() == skin_index)
            .map(|(_, b)| b.pose().to_string())
            .collect();
        poses.sort();
        poses.dedup();
        poses
    }

    /// All bundles competing for one (character, skin, pose) identity.
    pub fn find_bundles(&self, character_id: &str, skin_index: u32, pose: &str) -> Vec<BundleId> {
        self.bundles()
            .filter(|(_, b)| {
                b.character_id() == character_id
                    && b.skin_index() == skin_index
                    && b.pose() == pose
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether this bundle is the enabled selection for its identity.
    pub fn is_enabled(&self, id: BundleId) -> bool {
        self.enabled.values().any(|&enabled| enabled == id)
    }

    /// The enabled selection.
    pub fn enabled_bundles(&self) -> Vec<BundleId> {
        self.enabled.values().copied().collect()
    }

    /// Enabled records whose identity is not already installed — what the
    /// next [`patch`](Self::patch) will write.
    pub fn changed_bundles(&self) -> Vec<BundleId> {
        self.enabled
            .iter()
            .filter(|&(identifier, id)| self.installed.get(identifier.as_str()) != Some(id))
            .map(|(_, &id)| id)
            .collect()
    }

    /// Record the animation names the preview surface found for a bundle.
    pub fn notify_animations<I, S>(&mut self, id: BundleId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(bundle) = self
            .mods
            .get_mut(id.mod_index)
            .and_then(|m| m.bundles_mut().get_mut(id.bundle_index))
        {
            bundle.notify_animations(names);
        }
    }

    /// Mark a bundle to be installed by the next patch, displacing the
    /// currently enabled record with the same identity.
    ///
    /// Fails with [`Error::UnknownIdentity`] when no record with that
    /// identity is currently enabled — there is no baseline to swap from,
    /// which means the mod was built against files this game installation
    /// does not have.
    pub fn enable(&mut self, id: BundleId) -> Result<EnableOutcome> {
        let identifier = match self.bundle(id) {
            Some(bundle) => bundle.file_identifier(),
            None => {
                return Err(Error::UnknownIdentity {
                    identifier: "<stale handle>".into(),
                    bundle: format!("{id:?}"),
                })
            }
        };

        let Some(&current) = self.enabled.get(&identifier) else {
            let err = Error::UnknownIdentity {
                identifier,
                bundle: self.unique_identifier(id).unwrap_or_default(),
            };
            self.emit(&ServiceEvent::Error {
                message: err.to_string(),
            });
            return Err(err);
        };

        if current == id {
            return Ok(EnableOutcome {
                enabled: id,
                disabled: current,
            });
        }

        self.enabled.insert(identifier.clone(), id);
        self.pending_swap.insert(identifier, current);
        self.emit(&ServiceEvent::BundleEnabled {
            bundle: current,
            enabled: false,
        });
        self.emit(&ServiceEvent::BundleEnabled {
            bundle: id,
            enabled: true,
        });
        Ok(EnableOutcome {
            enabled: id,
            disabled: current,
        })
    }

    /// Write every changed record's encrypted bytes over its game file.
    ///
    /// Pre-flight failures (unmapped identity, target file missing) and
    /// write failures each revert only their own identity via the pending
    /// swap; everything else proceeds. On completion the installed set is
    /// updated to the surviving enabled set and persisted.
    pub fn patch(&mut self) -> Result<PatchReport> {
        if !self.game_data_present() {
            return Err(Error::GameDataNotFound(self.config.game_dir.clone()));
        }

        let changed = self.changed_bundles();
        tracing::info!("Patching game with {} changed bundles", changed.len());

        let mut report = PatchReport::default();
        let mut to_install: Vec<(BundleId, String, Utf8PathBuf)> = Vec::new();

        for id in changed {
            let Some(bundle) = self.bundle(id) else {
                continue;
            };
            let identifier = bundle.file_identifier();
            let target = self
                .filenames
                .get(&identifier)
                .map(|filename| self.config.game_dir.join(filename));
            match target {
                Some(path) if path.as_std_path().exists() => {
                    to_install.push((id, identifier, path));
                }
                Some(path) => {
                    self.revert_enabled(&identifier);
                    report.preflight_failures.push(PatchFailure {
                        bundle: id,
                        identifier,
                        reason: format!("target file {path} missing from game directory"),
                    });
                }
                None => {
                    self.revert_enabled(&identifier);
                    report.preflight_failures.push(PatchFailure {
                        bundle: id,
                        identifier,
                        reason: "no filename mapping for identity".into(),
                    });
                }
            }
        }

        if !report.preflight_failures.is_empty() {
            // One aggregated report: these files were either built with an
            // invalid identity or the filename table is out of date.
            let mut message = String::from(
                "The following mod files have no corresponding game file to overwrite:",
            );
            for failure in &report.preflight_failures {
                let unique = self.unique_identifier(failure.bundle).unwrap_or_default();
                message.push_str(&format!(
                    "\n\t{} {} ({})",
                    failure.identifier, unique, failure.reason
                ));
            }
            tracing::warn!("{message}");
            self.emit(&ServiceEvent::Error { message });
        }

        for (id, identifier, path) in to_install {
            let Some(bundle) = self.bundle(id) else {
                continue;
            };
            match install_record(bundle, &path) {
                Ok(()) => report.patched.push(id),
                Err(reason) => {
                    let message = format!(
                        "Unable to write mod file \"{}\": {reason}",
                        bundle.file_name()
                    );
                    tracing::warn!("{message}");
                    self.revert_enabled(&identifier);
                    report.write_failures.push(PatchFailure {
                        bundle: id,
                        identifier,
                        reason,
                    });
                    self.emit(&ServiceEvent::Error { message });
                }
            }
        }

        self.installed = self.enabled.clone();
        self.pending_swap.clear();
        self.save_state()?;
        self.emit(&ServiceEvent::PatchComplete {
            patched: report.patched.clone(),
        });
        Ok(report)
    }

    /// Delete every mod's cache directory.
    pub fn delete_all_caches(&self) -> Result<()> {
        for source in &self.mods {
            source.delete_cache(&self.config.cache_dir)?;
        }
        Ok(())
    }

    /// Delete the Default mod (files and cache). Loaded data is cleared;
    /// call [`load`](Self::load) to rebuild it from game data.
    pub fn delete_default_mod(&mut self) -> Result<()> {
        if let Some(default_mod) = self.mods.iter().find(|m| m.name() == DEFAULT_MOD_NAME) {
            default_mod.delete(&self.config.cache_dir)?;
        }
        self.reset_runtime();
        Ok(())
    }

    /// Delete the Default mod's bundle files from the live game directory,
    /// then the Default mod itself. Used to force the game to re-download
    /// clean files. Loaded data is cleared; call [`load`](Self::load)
    /// afterwards.
    pub fn delete_game_bundles(&mut self) -> Result<()> {
        let Some(default_mod) = self.mods.iter().find(|m| m.name() == DEFAULT_MOD_NAME) else {
            return Ok(());
        };

        tracing::info!(
            "Deleting {} bundle files from {}",
            default_mod.bundles().len(),
            self.config.game_dir
        );
        for bundle in default_mod.bundles() {
            let path = self.config.game_dir.join(bundle.relative_path());
            if path.as_std_path().exists() {
                std::fs::remove_file(path.as_std_path())?;
                tracing::debug!("Deleted {path}");
            } else {
                tracing::debug!("Not found in game directory: {path}");
            }
        }
        default_mod.delete(&self.config.cache_dir)?;
        self.reset_runtime();
        Ok(())
    }

    /// Restore the enabled entry for an identity to its pending-swap
    /// value (falling back to the installed record).
    fn revert_enabled(&mut self, identifier: &str) {
        let revert = self
            .pending_swap
            .get(identifier)
            .or_else(|| self.installed.get(identifier))
            .copied();
        match revert {
            Some(previous) => {
                self.enabled.insert(identifier.to_string(), previous);
            }
            None => {
                self.enabled.remove(identifier);
            }
        }
    }

    /// Rebuild the installed selection from the state file, defaulting any
    /// identity without persisted state to its Default-mod record.
    fn load_installed_state(&mut self) -> Result<()> {
        let mut by_unique: HashMap<String, BundleId> = HashMap::new();
        for (id, _) in self.bundles() {
            if let Some(unique) = self.unique_identifier(id) {
                by_unique.insert(unique, id);
            }
        }

        let mut installed: HashMap<String, BundleId> = HashMap::new();
        if self.state_path.as_std_path().exists() {
            let contents = std::fs::read_to_string(self.state_path.as_std_path())?;
            for line in contents.lines().filter(|line| !line.trim().is_empty()) {
                match by_unique.get(line) {
                    Some(&id) => {
                        if let Some(bundle) = self.bundle(id) {
                            installed.insert(bundle.file_identifier(), id);
                        }
                    }
                    None => tracing::warn!("Installed bundle no longer present: {line}"),
                }
            }
        }

        // Every identity known to the Default mod has an installed entry;
        // the Default record is the fallback when no state was persisted.
        if let Some(mod_index) = self.mods.iter().position(|m| m.name() == DEFAULT_MOD_NAME) {
            for (bundle_index, bundle) in self.mods[mod_index].bundles().iter().enumerate() {
                installed
                    .entry(bundle.file_identifier())
                    .or_insert(BundleId {
                        mod_index,
                        bundle_index,
                    });
            }
        }

        self.installed = installed;
        self.enabled = self.installed.clone();
        self.pending_swap.clear();
        Ok(())
    }

    /// Persist the installed selection, sorted for stable output.
    fn save_state(&self) -> Result<()> {
        let mut lines: Vec<String> = self
            .installed
            .values()
            .filter_map(|&id| self.unique_identifier(id))
            .collect();
        lines.sort();
        std::fs::write(self.state_path.as_std_path(), lines.join("\n"))?;
        Ok(())
    }

    fn emit(&self, event: &ServiceEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    fn reset_runtime(&mut self) {
        self.mods.clear();
        self.installed.clear();
        self.enabled.clear();
        self.pending_swap.clear();
    }
}

/// Replace one game file with a bundle's encrypted bytes, restoring the
/// in-memory backup if the write leaves the target missing.
fn install_record(bundle: &SkinBundle, path: &Utf8Path) -> std::result::Result<(), String> {
    let backup = std::fs::read(path.as_std_path()).map_err(|err| err.to_string())?;

    let write_result: std::io::Result<()> = (|| {
        std::fs::remove_file(path.as_std_path())?;
        std::fs::write(path.as_std_path(), bundle.encrypted_data())?;
        Ok(())
    })();

    if let Err(err) = write_result {
        if !path.as_std_path().exists() {
            if let Err(restore_err) = std::fs::write(path.as_std_path(), &backup) {
                tracing::error!("Failed to restore backup for {path}: {restore_err}");
            }
        }
        return Err(err.to_string());
    }
    Ok(())
}
