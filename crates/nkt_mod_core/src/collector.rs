//! Mod discovery and the Default-mod guarantee.
//!
//! [`ModCollector`] assembles the full set of mods for a run:
//!
//! 1. If no `Default` mod directory exists under the mods root, build one
//!    from the live game directory.
//! 2. Enumerate every directory and `.zip` under the mods root as a mod
//!    source and load it.
//! 3. Validate the Default mod against the filename table and the live
//!    game directory; on any mismatch discard it, rebuild it from game
//!    data, and reload it.
//! 4. Export every mod's bundle cache so the next run takes the fast path.
//!
//! The Default mod is the rollback target and the source of the
//! identity → filename mapping; it must stay internally consistent with
//! the live game directory or every later filename lookup is unreliable.

use camino::Utf8Path;

use crate::data::{CharacterTable, FilenameTable};
use crate::error::{Error, Result};
use crate::extract::AssetExtractor;
use crate::mod_source::Mod;

/// Name reserved for the synthetic mod mirroring the live game files.
pub const DEFAULT_MOD_NAME: &str = "Default";

/// Discovers and loads all mods for one run.
pub struct ModCollector<'a> {
    characters: &'a CharacterTable,
    extractor: &'a dyn AssetExtractor,
    parallel: bool,
}

impl<'a> ModCollector<'a> {
    pub fn new(characters: &'a CharacterTable, extractor: &'a dyn AssetExtractor) -> Self {
        Self {
            characters,
            extractor,
            parallel: true,
        }
    }

    /// Select worker-pool or sequential bundle decoding.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Collect every mod under `mods_root`, guaranteeing a valid Default
    /// mod built from `game_dir`.
    ///
    /// The filename table is repopulated and saved whenever the Default
    /// mod is (re)built. Fails with [`Error::GameDataNotFound`] /
    /// [`Error::EmptyGameData`] when a needed rebuild is impossible.
    pub fn collect(
        &self,
        cache_root: &Utf8Path,
        mods_root: &Utf8Path,
        game_dir: &Utf8Path,
        filenames: &mut FilenameTable,
    ) -> Result<Vec<Mod>> {
        tracing::info!("Searching for mods in {mods_root}");
        if cache_root.as_std_path().exists() {
            tracing::info!("Loading from cache directory at {cache_root}");
        } else {
            std::fs::create_dir_all(cache_root.as_std_path())?;
            tracing::info!("Created cache directory at {cache_root}");
        }
        if !mods_root.as_std_path().exists() {
            std::fs::create_dir_all(mods_root.as_std_path())?;
        }

        let default_dir = mods_root.join(DEFAULT_MOD_NAME);
        if !default_dir.as_std_path().exists() {
            tracing::info!("Creating Default mod from game data");
            self.build_default_mod(cache_root, &default_dir, game_dir, filenames)?;
        }

        let mut mods = Vec::new();
        for entry in std::fs::read_dir(mods_root.as_std_path())? {
            let entry = entry?;
            let path = match camino::Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(path) => path,
                Err(path) => {
                    tracing::warn!("Skipping non-UTF-8 path: {}", path.display());
                    continue;
                }
            };
            if path.as_std_path().is_dir() {
                mods.push(Mod::directory(path));
            } else if path.extension() == Some("zip") {
                mods.push(Mod::archive(path));
            }
        }

        let mut loaded = Vec::new();
        for mut source in mods {
            match source.load(cache_root, self.characters, self.extractor, self.parallel) {
                Ok(()) => loaded.push(source),
                Err(err) => tracing::warn!("Skipping unreadable mod {}: {err}", source.name()),
            }
        }

        let bundle_count: usize = loaded.iter().map(|m| m.bundles().len()).sum();
        tracing::info!("Found {bundle_count} bundles in {} mods", loaded.len());

        let default_valid = loaded
            .iter()
            .find(|m| m.name() == DEFAULT_MOD_NAME)
            .map(|m| self.validate_default(m, game_dir, filenames))
            .unwrap_or(false);

        if default_valid {
            tracing::info!("Successfully validated all file mappings");
        } else {
            tracing::info!("Default mod has invalid or missing mappings, rebuilding");
            loaded.retain(|m| m.name() != DEFAULT_MOD_NAME);
            self.build_default_mod(cache_root, &default_dir, game_dir, filenames)?;
            let mut default_mod = Mod::directory(default_dir);
            default_mod.load(cache_root, self.characters, self.extractor, self.parallel)?;
            loaded.push(default_mod);
        }

        tracing::info!("Exporting bundle cache files");
        for source in &loaded {
            source.export_cache(cache_root)?;
        }

        Ok(loaded)
    }

    /// A Default mod is valid when every bundle's identity maps to its own
    /// filename in the table and that file still exists in the game
    /// directory.
    fn validate_default(
        &self,
        default_mod: &Mod,
        game_dir: &Utf8Path,
        filenames: &FilenameTable,
    ) -> bool {
        tracing::info!("Validating Default mod");
        let mut valid = true;

        if default_mod.bundles().is_empty() {
            valid = false;
            tracing::warn!("Default mod contains no bundles");
        }

        for bundle in default_mod.bundles() {
            let identifier = bundle.file_identifier();
            match filenames.get(&identifier) {
                None => {
                    valid = false;
                    tracing::warn!(
                        "No cached filename for {identifier} - {}",
                        bundle.file_name()
                    );
                }
                Some(filename) => {
                    if filename != bundle.file_name() {
                        valid = false;
                        tracing::warn!(
                            "Filename mismatch for {identifier}: {filename} in table, {} in mod",
                            bundle.file_name()
                        );
                    }
                    if !game_dir.join(filename).as_std_path().exists() {
                        valid = false;
                        tracing::warn!(
                            "Mapped file for {identifier} ({filename}) missing from {game_dir}"
                        );
                    }
                }
            }
        }

        valid
    }

    /// Load the live game directory as a mod and export every bundle's
    /// encrypted bytes into the Default mod directory, recording the
    /// identity → filename mapping as we go.
    fn build_default_mod(
        &self,
        cache_root: &Utf8Path,
        default_dir: &Utf8Path,
        game_dir: &Utf8Path,
        filenames: &mut FilenameTable,
    ) -> Result<()> {
        if !game_dir.as_std_path().is_dir() {
            return Err(Error::GameDataNotFound(game_dir.to_path_buf()));
        }

        let mut game_mod = Mod::directory(game_dir.to_path_buf());
        game_mod.load(cache_root, self.characters, self.extractor, self.parallel)?;
        if game_mod.bundles().is_empty() {
            return Err(Error::EmptyGameData(game_dir.to_path_buf()));
        }

        if default_dir.as_std_path().exists() {
            std::fs::remove_dir_all(default_dir.as_std_path())?;
        }
        std::fs::create_dir_all(default_dir.as_std_path())?;

        for bundle in game_mod.bundles() {
            bundle.export_encrypted(default_dir, false)?;
            filenames.set(bundle.file_identifier(), bundle.file_name());
        }
        filenames.save()?;

        tracing::info!("Default mod built with {} bundles", game_mod.bundles().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{character_table, skin_container, StubExtractor};
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    const GAME_A: &str = "3168a2ef1fdda40ce79f004916cc5b17";
    const GAME_B: &str = "ab5783c5bd8b74c99d3c9e4bd62cfa17";

    struct Fixture {
        _tmp: tempfile::TempDir,
        cache: Utf8PathBuf,
        mods: Utf8PathBuf,
        game: Utf8PathBuf,
        filenames_path: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let fixture = Fixture {
            cache: root.join("cache"),
            mods: root.join("mods"),
            game: root.join("game_data"),
            filenames_path: root.join("_file_data.csv"),
            _tmp: tmp,
        };
        std::fs::create_dir_all(fixture.game.as_std_path()).unwrap();
        std::fs::write(
            fixture.game.join(GAME_A).as_std_path(),
            skin_container("c001", None, 0),
        )
        .unwrap();
        std::fs::write(
            fixture.game.join(GAME_B).as_std_path(),
            skin_container("c002", Some("aim"), 1),
        )
        .unwrap();
        fixture
    }

    fn collect(fixture: &Fixture, filenames: &mut FilenameTable) -> Result<Vec<Mod>> {
        let characters = character_table();
        ModCollector::new(&characters, &StubExtractor)
            .with_parallel(false)
            .collect(&fixture.cache, &fixture.mods, &fixture.game, filenames)
    }

    #[test]
    fn builds_default_mod_from_game_data() {
        let fixture = fixture();
        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();

        let mods = collect(&fixture, &mut filenames).unwrap();
        let default_mod = mods.iter().find(|m| m.name() == DEFAULT_MOD_NAME).unwrap();
        assert_eq!(default_mod.bundles().len(), 2);

        // Every table entry resolves back to an existing game file.
        assert_eq!(filenames.len(), 2);
        for bundle in default_mod.bundles() {
            let filename = filenames.get(&bundle.file_identifier()).unwrap();
            assert_eq!(filename, bundle.file_name());
            assert!(fixture.game.join(filename).as_std_path().exists());
        }
    }

    #[test]
    fn second_collect_validates_without_rebuilding() {
        let fixture = fixture();
        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();
        collect(&fixture, &mut filenames).unwrap();

        // Marker survives only if the Default directory is not wiped.
        let marker = fixture.mods.join(DEFAULT_MOD_NAME).join("marker.txt");
        std::fs::write(marker.as_std_path(), b"untouched").unwrap();

        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();
        let mods = collect(&fixture, &mut filenames).unwrap();
        assert!(marker.as_std_path().exists());
        assert!(mods.iter().any(|m| m.name() == DEFAULT_MOD_NAME));
    }

    #[test]
    fn bad_mapping_triggers_rebuild() {
        let fixture = fixture();
        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();
        collect(&fixture, &mut filenames).unwrap();

        // Poison one mapping; the next collect must detect and rebuild.
        filenames.set("c001_0_idle", "0000000000000000000000000000dead");
        filenames.save().unwrap();

        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();
        let mods = collect(&fixture, &mut filenames).unwrap();

        let default_mod = mods.iter().find(|m| m.name() == DEFAULT_MOD_NAME).unwrap();
        assert_eq!(default_mod.bundles().len(), 2);
        assert_eq!(filenames.get("c001_0_idle"), Some(GAME_A));
    }

    #[test]
    fn missing_game_dir_is_fatal() {
        let fixture = fixture();
        std::fs::remove_dir_all(fixture.game.as_std_path()).unwrap();
        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();

        let err = collect(&fixture, &mut filenames).unwrap_err();
        assert!(matches!(err, Error::GameDataNotFound(_)), "got {err:?}");
    }

    #[test]
    fn empty_game_dir_is_fatal() {
        let fixture = fixture();
        for entry in std::fs::read_dir(fixture.game.as_std_path()).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }
        let mut filenames = FilenameTable::load(&fixture.filenames_path).unwrap();

        let err = collect(&fixture, &mut filenames).unwrap_err();
        assert!(matches!(err, Error::EmptyGameData(_)), "got {err:?}");
    }
}
