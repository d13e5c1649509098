//! Shared fixtures for unit tests: a stub asset extractor and builders for
//! the containers it understands.
//!
//! The stub payload format is deliberately tiny: one platform byte, one
//! entry-count byte, then `[kind][name_len][name][data_len u16][data]` per
//! entry. Trailing padding is ignored, which lets fixtures satisfy the
//! codec's minimum encrypted-region size.

use crate::error::{Error, Result};
use crate::extract::{AssetEntry, AssetExtractor, AssetKind, ExtractedAssets, TargetPlatform};

pub const KIND_TEXT: u8 = 0;
pub const KIND_TEXTURE: u8 = 1;

/// Route tracing output to the test harness, honouring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Parses the stub payload format described in the module docs.
pub struct StubExtractor;

impl AssetExtractor for StubExtractor {
    fn extract(&self, data: &[u8]) -> Result<ExtractedAssets> {
        let overrun = || Error::Extract("stub payload ended mid-entry".into());

        let [platform, count, rest @ ..] = data else {
            return Err(Error::Extract("stub payload shorter than header".into()));
        };
        let platform = match platform {
            0 => TargetPlatform::Windows64,
            other => TargetPlatform::Other(format!("platform-{other}")),
        };

        let mut entries = Vec::new();
        let mut rest = rest;
        for _ in 0..*count {
            let [kind, name_len, tail @ ..] = rest else {
                return Err(overrun());
            };
            let name_len = *name_len as usize;
            if tail.len() < name_len + 2 {
                return Err(overrun());
            }
            let name = String::from_utf8(tail[..name_len].to_vec())
                .map_err(|_| Error::Extract("non-utf8 payload name".into()))?;
            let data_len =
                u16::from_le_bytes([tail[name_len], tail[name_len + 1]]) as usize;
            if tail.len() < name_len + 2 + data_len {
                return Err(overrun());
            }
            entries.push(AssetEntry {
                name,
                kind: if *kind == KIND_TEXTURE {
                    AssetKind::Texture
                } else {
                    AssetKind::Text
                },
                data: tail[name_len + 2..name_len + 2 + data_len].to_vec(),
            });
            rest = &tail[name_len + 2 + data_len..];
        }

        Ok(ExtractedAssets { platform, entries })
    }
}

/// Build a stub payload, padded past the codec's encrypted-region minimum.
pub fn payload(platform: u8, entries: &[(u8, &str, &[u8])]) -> Vec<u8> {
    let mut out = vec![platform, entries.len() as u8];
    for (kind, name, data) in entries {
        out.push(*kind);
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
    }
    if out.len() < 160 {
        out.resize(160, 0);
    }
    out
}

/// Payload for a complete skin bundle with the given identity.
pub fn skin_payload(character_id: &str, pose: Option<&str>, skin_index: u32) -> Vec<u8> {
    skin_payload_flavored(character_id, pose, skin_index, "contents")
}

/// Like [`skin_payload`], with distinguishable blob contents. Encryption
/// is deterministic, so fixtures competing for the same identity need
/// different payloads to produce different containers.
pub fn skin_payload_flavored(
    character_id: &str,
    pose: Option<&str>,
    skin_index: u32,
    flavor: &str,
) -> Vec<u8> {
    let atlas_name = match pose {
        Some(pose) => format!("{character_id}_{pose}_{skin_index}.atlas"),
        None => format!("{character_id}_{skin_index}.atlas"),
    };
    let skeleton_name = format!("{character_id}_{skin_index}.skel");
    let atlas_blob = format!("atlas {flavor}");
    let texture_blob = format!("texture {flavor}");
    let skeleton_blob = format!("skeleton {flavor}");
    payload(
        0,
        &[
            (KIND_TEXT, &atlas_name, atlas_blob.as_bytes()),
            (KIND_TEXTURE, "sprite", texture_blob.as_bytes()),
            (KIND_TEXT, &skeleton_name, skeleton_blob.as_bytes()),
        ],
    )
}

/// Encrypted container for a complete skin bundle.
pub fn skin_container(character_id: &str, pose: Option<&str>, skin_index: u32) -> Vec<u8> {
    nkt_nkab::encrypt_v1(&skin_payload(character_id, pose, skin_index))
        .expect("fixture payload large enough")
}

/// Encrypted container with distinguishable blob contents.
pub fn skin_container_flavored(
    character_id: &str,
    pose: Option<&str>,
    skin_index: u32,
    flavor: &str,
) -> Vec<u8> {
    nkt_nkab::encrypt_v1(&skin_payload_flavored(character_id, pose, skin_index, flavor))
        .expect("fixture payload large enough")
}

/// A character table with two real characters and one skip-flagged id.
pub fn character_table() -> crate::data::CharacterTable {
    crate::data::CharacterTable::from_rows([
        ("c001", "Rapi", false),
        ("c002", "Anis", false),
        ("c900", "EventProp", true),
    ])
}
