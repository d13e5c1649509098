//! Skin bundle decoding, identity resolution and caching.
//!
//! A [`SkinBundle`] is the decoded form of one NKAB container: a logical
//! identity (character, skin, pose) plus the three payloads the preview
//! surface renders (atlas descriptor, texture image, skeleton data), and
//! the original still-encrypted bytes that patching writes back over game
//! files.
//!
//! Decoding prefers a per-mod cache file keyed by the bundle's relative
//! path. On a cache hit the identity and payloads are deserialized
//! directly and decryption is skipped entirely; on a miss the container is
//! decrypted, handed to the asset-extraction collaborator, and classified
//! by payload naming. Either way the encrypted bytes are retained verbatim
//! — patching relocates them, it never re-encrypts.

use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::data::CharacterTable;
use crate::error::{Error, Result};
use crate::extract::{AssetExtractor, AssetKind};

/// Pose assumed when an atlas name carries no pose segment.
pub const DEFAULT_POSE: &str = "idle";

/// Atlas payload names look like `c102_0.atlas` or `c102_aim_3.atlas`:
/// character id, optional pose, skin index.
fn atlas_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9a-z]+)_(?:([a-z]+)_)?([0-9]+)\.atlas").expect("static atlas pattern")
    })
}

/// One decoded asset bundle, owned by the mod it was read from.
///
/// Immutable after construction except for the animation-name list, which
/// the preview surface reports back once after the first successful
/// render-side load.
#[derive(Debug)]
pub struct SkinBundle {
    file_name: String,
    relative_path: Utf8PathBuf,

    character_id: String,
    skin_index: u32,
    pose: String,

    atlas_data: Vec<u8>,
    texture_data: Vec<u8>,
    skeleton_data: Vec<u8>,
    encrypted_data: Vec<u8>,

    loaded_from_cache: bool,
    animations: Vec<String>,
}

/// Cache encoding: identity plus the three decoded payloads. The encrypted
/// bytes are *not* cached — they are always taken from the source file.
/// Field order is the wire format; keep the two structs in sync.
#[derive(Serialize)]
struct CacheWrite<'a> {
    character_id: &'a str,
    pose: &'a str,
    skin_index: u32,
    atlas_data: &'a [u8],
    texture_data: &'a [u8],
    skeleton_data: &'a [u8],
}

#[derive(Deserialize)]
struct CacheRead {
    character_id: String,
    pose: String,
    skin_index: u32,
    atlas_data: Vec<u8>,
    texture_data: Vec<u8>,
    skeleton_data: Vec<u8>,
}

impl SkinBundle {
    /// Decode a bundle from the raw (encrypted) bytes of a mod file.
    ///
    /// Consults the cache file under `mod_cache_dir` first; on a miss runs
    /// the full decrypt → extract → classify pipeline. `NotSkin` and
    /// platform-mismatch errors mean "this file is not a bundle we ingest"
    /// and are expected for some files in every mod.
    pub fn decode(
        relative_path: Utf8PathBuf,
        data: Vec<u8>,
        mod_cache_dir: &Utf8Path,
        characters: &CharacterTable,
        extractor: &dyn AssetExtractor,
    ) -> Result<Self> {
        let file_name = relative_path
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| relative_path.to_string());

        let cache_path = Self::cache_path(mod_cache_dir, &relative_path);
        if cache_path.as_std_path().exists() {
            let cache: CacheRead = rmp_serde::from_slice(&std::fs::read(cache_path.as_std_path())?)?;
            return Ok(Self {
                file_name,
                relative_path,
                character_id: cache.character_id,
                skin_index: cache.skin_index,
                pose: cache.pose,
                atlas_data: cache.atlas_data,
                texture_data: cache.texture_data,
                skeleton_data: cache.skeleton_data,
                encrypted_data: data,
                loaded_from_cache: true,
                animations: Vec::new(),
            });
        }

        let plain = nkt_nkab::decrypt(&data)?;
        let extracted = extractor.extract(&plain)?;
        if !extracted.platform.is_supported() {
            return Err(Error::PlatformMismatch(extracted.platform.to_string()));
        }

        let mut identity: Option<(String, String, u32)> = None;
        let mut atlas_data = None;
        let mut texture_data = None;
        let mut skeleton_data = None;

        for entry in extracted.entries {
            match entry.kind {
                AssetKind::Text if entry.name.contains(".skel") => {
                    skeleton_data = Some(entry.data);
                }
                AssetKind::Text if entry.name.contains(".atlas") => {
                    let caps = atlas_name_pattern().captures(&entry.name).ok_or_else(|| {
                        Error::NotSkin(format!("unrecognized atlas name `{}`", entry.name))
                    })?;
                    let character_id = caps[1].to_string();
                    let pose = caps
                        .get(2)
                        .map_or(DEFAULT_POSE, |m| m.as_str())
                        .to_string();
                    let skin_index: u32 = caps[3].parse().map_err(|_| {
                        Error::NotSkin(format!("invalid skin index in `{}`", entry.name))
                    })?;
                    if characters.should_skip(&character_id) {
                        return Err(Error::NotSkin(format!(
                            "{character_id} is listed as a non-skin id"
                        )));
                    }
                    identity = Some((character_id, pose, skin_index));
                    atlas_data = Some(entry.data);
                }
                AssetKind::Text => {}
                AssetKind::Texture => texture_data = Some(entry.data),
            }
        }

        let (character_id, pose, skin_index) =
            identity.ok_or_else(|| Error::NotSkin("missing atlas payload".into()))?;
        let atlas_data =
            atlas_data.ok_or_else(|| Error::NotSkin("missing atlas payload".into()))?;
        let texture_data =
            texture_data.ok_or_else(|| Error::NotSkin("missing texture payload".into()))?;
        let skeleton_data =
            skeleton_data.ok_or_else(|| Error::NotSkin("missing skeleton payload".into()))?;

        tracing::debug!("Decoded {file_name}: {character_id} skin {skin_index} pose {pose}");

        Ok(Self {
            file_name,
            relative_path,
            character_id,
            skin_index,
            pose,
            atlas_data,
            texture_data,
            skeleton_data,
            encrypted_data: data,
            loaded_from_cache: false,
            animations: Vec::new(),
        })
    }

    /// Cache file path for a bundle at `relative_path` within a mod.
    pub fn cache_path(mod_cache_dir: &Utf8Path, relative_path: &Utf8Path) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.cache", mod_cache_dir.join(relative_path)))
    }

    /// Serialize identity and decoded payloads to the bundle's cache file,
    /// replacing any previous cache at that path.
    pub fn export_cache(&self, mod_cache_dir: &Utf8Path) -> Result<()> {
        let cache_path = Self::cache_path(mod_cache_dir, &self.relative_path);
        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        let encoded = rmp_serde::to_vec(&CacheWrite {
            character_id: &self.character_id,
            pose: &self.pose,
            skin_index: self.skin_index,
            atlas_data: &self.atlas_data,
            texture_data: &self.texture_data,
            skeleton_data: &self.skeleton_data,
        })?;
        std::fs::write(cache_path.as_std_path(), encoded)?;
        Ok(())
    }

    /// Write the original encrypted container bytes into `dir` under this
    /// bundle's file name. With `overwrite` unset, an existing file is left
    /// alone with a warning.
    pub fn export_encrypted(&self, dir: &Utf8Path, overwrite: bool) -> Result<()> {
        let path = dir.join(&self.file_name);
        if path.as_std_path().exists() && !overwrite {
            tracing::warn!("Not exporting {} to {path}: file already exists", self.file_name);
            return Ok(());
        }
        std::fs::write(path.as_std_path(), &self.encrypted_data)?;
        Ok(())
    }

    /// Record the animation names the preview surface found in this
    /// bundle's skeleton data.
    pub fn notify_animations<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.animations.extend(names.into_iter().map(Into::into));
        tracing::debug!(
            "{} reported {} animations",
            self.file_identifier(),
            self.animations.len()
        );
    }

    /// Cross-mod join key: bundles sharing this string are variants of the
    /// same logical asset, of which exactly one can be enabled.
    pub fn file_identifier(&self) -> String {
        format!("{}_{}_{}", self.character_id, self.skin_index, self.pose)
    }

    /// The animation the preview should start with for this bundle's pose,
    /// when the bundle has one.
    pub fn default_animation(&self) -> Option<&'static str> {
        match self.pose.as_str() {
            "idle" => Some("idle"),
            "cover" => Some("cover_idle"),
            "aim" => Some("aim_idle"),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn relative_path(&self) -> &Utf8Path {
        &self.relative_path
    }

    pub fn character_id(&self) -> &str {
        &self.character_id
    }

    pub fn skin_index(&self) -> u32 {
        self.skin_index
    }

    pub fn pose(&self) -> &str {
        &self.pose
    }

    pub fn atlas_data(&self) -> &[u8] {
        &self.atlas_data
    }

    pub fn texture_data(&self) -> &[u8] {
        &self.texture_data
    }

    pub fn skeleton_data(&self) -> &[u8] {
        &self.skeleton_data
    }

    pub fn encrypted_data(&self) -> &[u8] {
        &self.encrypted_data
    }

    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }

    pub fn animations(&self) -> &[String] {
        &self.animations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        character_table, payload, skin_container, skin_payload, StubExtractor, KIND_TEXT,
        KIND_TEXTURE,
    };
    use tempfile::tempdir;

    fn cache_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("cache").join("TestMod")).unwrap();
        (dir, path)
    }

    fn decode(container: Vec<u8>, cache: &Utf8Path) -> Result<SkinBundle> {
        SkinBundle::decode(
            Utf8PathBuf::from("3168a2ef1fdda40ce79f004916cc5b17"),
            container,
            cache,
            &character_table(),
            &StubExtractor,
        )
    }

    #[test]
    fn decodes_identity_and_payloads() {
        let (_tmp, cache) = cache_dir();
        let container = skin_container("c001", None, 0);
        let bundle = decode(container.clone(), &cache).unwrap();

        assert_eq!(bundle.file_name(), "3168a2ef1fdda40ce79f004916cc5b17");
        assert!(!bundle.loaded_from_cache());
        assert_eq!(bundle.character_id(), "c001");
        assert_eq!(bundle.skin_index(), 0);
        assert_eq!(bundle.pose(), DEFAULT_POSE);
        assert_eq!(bundle.file_identifier(), "c001_0_idle");
        assert_eq!(bundle.atlas_data(), b"atlas contents");
        assert_eq!(bundle.texture_data(), b"texture contents");
        assert_eq!(bundle.skeleton_data(), b"skeleton contents");
        assert_eq!(bundle.encrypted_data(), container.as_slice());
        assert_eq!(bundle.default_animation(), Some("idle"));
    }

    #[test]
    fn explicit_pose_segment_is_used() {
        let (_tmp, cache) = cache_dir();
        let bundle = decode(skin_container("c001", Some("aim"), 3), &cache).unwrap();
        assert_eq!(bundle.pose(), "aim");
        assert_eq!(bundle.skin_index(), 3);
        assert_eq!(bundle.file_identifier(), "c001_3_aim");
        assert_eq!(bundle.default_animation(), Some("aim_idle"));
    }

    #[test]
    fn cache_round_trip_is_identical() {
        let (_tmp, cache) = cache_dir();
        let container = skin_container("c001", Some("cover"), 2);

        let first = decode(container.clone(), &cache).unwrap();
        first.export_cache(&cache).unwrap();

        let second = decode(container.clone(), &cache).unwrap();
        assert!(second.loaded_from_cache());
        assert_eq!(second.file_identifier(), first.file_identifier());
        assert_eq!(second.atlas_data(), first.atlas_data());
        assert_eq!(second.texture_data(), first.texture_data());
        assert_eq!(second.skeleton_data(), first.skeleton_data());
        // The encrypted bytes always come from the source file, cache or not.
        assert_eq!(second.encrypted_data(), container.as_slice());
    }

    #[test]
    fn skip_listed_character_is_not_skin() {
        let (_tmp, cache) = cache_dir();
        let err = decode(skin_container("c900", None, 0), &cache).unwrap_err();
        assert!(matches!(err, Error::NotSkin(_)), "got {err:?}");
        assert!(err.is_skip());
    }

    #[test]
    fn unknown_character_is_not_skin() {
        let (_tmp, cache) = cache_dir();
        let err = decode(skin_container("c777", None, 0), &cache).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn missing_skeleton_is_incomplete() {
        let (_tmp, cache) = cache_dir();
        let body = payload(
            0,
            &[
                (KIND_TEXT, "c001_0.atlas", b"atlas"),
                (KIND_TEXTURE, "sprite", b"texture"),
            ],
        );
        let container = nkt_nkab::encrypt_v1(&body).unwrap();
        let err = decode(container, &cache).unwrap_err();
        assert!(matches!(err, Error::NotSkin(_)), "got {err:?}");
    }

    #[test]
    fn malformed_atlas_name_is_not_skin() {
        let (_tmp, cache) = cache_dir();
        let body = payload(
            0,
            &[
                (KIND_TEXT, "NotAnAtlasName.atlas", b"atlas"),
                (KIND_TEXTURE, "sprite", b"texture"),
                (KIND_TEXT, "c001_0.skel", b"skel"),
            ],
        );
        let container = nkt_nkab::encrypt_v1(&body).unwrap();
        let err = decode(container, &cache).unwrap_err();
        assert!(matches!(err, Error::NotSkin(_)), "got {err:?}");
    }

    #[test]
    fn foreign_platform_is_a_distinct_skip() {
        let (_tmp, cache) = cache_dir();
        let body = skin_payload("c001", None, 0);
        let mut foreign = body;
        foreign[0] = 13;
        let container = nkt_nkab::encrypt_v1(&foreign).unwrap();
        let err = decode(container, &cache).unwrap_err();
        assert!(matches!(err, Error::PlatformMismatch(_)), "got {err:?}");
        assert!(err.is_skip());
    }

    #[test]
    fn non_nkab_data_is_a_codec_error() {
        let (_tmp, cache) = cache_dir();
        let err = decode(b"definitely not a container".to_vec(), &cache).unwrap_err();
        assert!(matches!(err, Error::Nkab(_)), "got {err:?}");
        assert!(!err.is_skip());
    }

    #[test]
    fn notify_animations_fills_the_list() {
        let (_tmp, cache) = cache_dir();
        let mut bundle = decode(skin_container("c001", None, 0), &cache).unwrap();
        assert!(bundle.animations().is_empty());
        bundle.notify_animations(["idle", "attack"]);
        assert_eq!(bundle.animations(), ["idle", "attack"]);
    }
}
