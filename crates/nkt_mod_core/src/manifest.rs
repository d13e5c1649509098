//! Mod manifest parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Filename a mod may include to describe itself. Optional; a mod without
/// one gets a default manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Author-provided metadata for one mod.
///
/// Field names are PascalCase on disk, matching the manifests mod authors
/// already ship. Unknown keys land in the free-form `data` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModManifest {
    pub author: String,
    pub link: String,
    pub game_version: String,
    pub mod_version: String,

    /// Free-form extension values the manager displays but does not
    /// interpret.
    pub data: HashMap<String, String>,
}

impl ModManifest {
    /// Parse a manifest from raw `manifest.json` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pascal_case_fields() {
        let manifest = ModManifest::from_slice(
            br#"{
                "Author": "someone",
                "Link": "https://example.com/mod",
                "GameVersion": "121.8.15",
                "ModVersion": "2",
                "Data": { "note": "recolour only" }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.author, "someone");
        assert_eq!(manifest.link, "https://example.com/mod");
        assert_eq!(manifest.game_version, "121.8.15");
        assert_eq!(manifest.mod_version, "2");
        assert_eq!(manifest.data.get("note").map(String::as_str), Some("recolour only"));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let manifest = ModManifest::from_slice(br#"{ "Author": "a" }"#).unwrap();
        assert_eq!(manifest.author, "a");
        assert!(manifest.link.is_empty());
        assert!(manifest.data.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ModManifest::from_slice(b"{ not json }").is_err());
    }
}
