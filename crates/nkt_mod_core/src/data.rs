//! Lookup tables backing identity resolution and patching.
//!
//! Two flat-text tables travel with the application:
//!
//! - The **character table** (`id,name,skip` per line) maps internal
//!   character ids to display names and flags ids that are not skinnable
//!   characters at all. It is shipped as a data file and never written.
//! - The **filename table** (`identifier,filename` per line) records, for
//!   every identity in the Default mod, which game file carries it. It is
//!   rebuilt whenever the Default mod is rebuilt and is the only way to
//!   resolve an identity back to a patch target.
//!
//! Both are plain values handed to the components that need them; nothing
//! in this crate reads them through globals.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Result;

/// Display value returned for character ids the table does not know.
pub const UNKNOWN_CHARACTER: &str = "Entry Not Found";

#[derive(Debug, Clone)]
struct CharacterRow {
    name: String,
    skip: bool,
}

/// Character id → display name / skip flag lookup.
#[derive(Debug, Clone, Default)]
pub struct CharacterTable {
    rows: HashMap<String, CharacterRow>,
}

impl CharacterTable {
    /// Load the table from its CSV-style data file.
    ///
    /// Lines with fewer than three fields are skipped with a warning; a
    /// non-empty third field marks the id as skip.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_std_path())?;
        let mut rows = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split(',');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(name), Some(skip)) => {
                    rows.insert(
                        id.to_string(),
                        CharacterRow {
                            name: name.to_string(),
                            skip: !skip.is_empty(),
                        },
                    );
                }
                _ => tracing::warn!("Malformed character table line: {line}"),
            }
        }
        let skipped = rows.values().filter(|row| row.skip).count();
        tracing::info!(
            "Loaded {} character rows, {} flagged as skip",
            rows.len(),
            skipped
        );
        Ok(Self { rows })
    }

    /// Build a table from `(id, name, skip)` rows. Used by tests and by
    /// callers that source the data elsewhere.
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, S, bool)>,
        S: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|(id, name, skip)| {
                    (
                        id.into(),
                        CharacterRow {
                            name: name.into(),
                            skip,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Display name for a character id, or [`UNKNOWN_CHARACTER`] when the
    /// id is not in the table. Never fails.
    pub fn display_name(&self, character_id: &str) -> &str {
        self.rows
            .get(character_id)
            .map_or(UNKNOWN_CHARACTER, |row| row.name.as_str())
    }

    /// Whether bundles for this id should be rejected during classification.
    /// Unknown ids are skipped too — only listed characters are skinnable.
    pub fn should_skip(&self, character_id: &str) -> bool {
        self.rows.get(character_id).map_or(true, |row| row.skip)
    }
}

/// Identity → game filename lookup, persisted next to the mods directory.
#[derive(Debug, Clone, Default)]
pub struct FilenameTable {
    path: Utf8PathBuf,
    rows: HashMap<String, String>,
}

impl FilenameTable {
    /// Load the table from `path`. A missing file yields an empty table
    /// (the Default mod rebuild will repopulate it), not an error.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let mut rows = HashMap::new();
        if path.as_std_path().exists() {
            let contents = std::fs::read_to_string(path.as_std_path())?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match line.split_once(',') {
                    Some((identifier, filename)) => {
                        rows.insert(identifier.to_string(), filename.to_string());
                    }
                    None => tracing::warn!("Malformed filename table line: {line}"),
                }
            }
            tracing::info!("Loaded {} filename mappings", rows.len());
        } else {
            tracing::info!("No filename table at {path}, starting empty");
        }
        Ok(Self {
            path: path.to_path_buf(),
            rows,
        })
    }

    /// The game filename recorded for an identity, if any.
    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.rows.get(identifier).map(String::as_str)
    }

    /// Record (or replace) the filename for an identity.
    pub fn set(&mut self, identifier: impl Into<String>, filename: impl Into<String>) {
        self.rows.insert(identifier.into(), filename.into());
    }

    /// Number of recorded mappings.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table back to the path it was loaded from. Lines are
    /// sorted so repeated saves of the same table are byte-identical.
    pub fn save(&self) -> Result<()> {
        let mut lines: Vec<String> = self
            .rows
            .iter()
            .map(|(identifier, filename)| format!("{identifier},{filename}"))
            .collect();
        lines.sort();
        std::fs::write(self.path.as_std_path(), lines.join("\n"))?;
        Ok(())
    }
}
