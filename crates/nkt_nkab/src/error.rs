use thiserror::Error;

/// Errors produced while decoding or encoding an NKAB container.
///
/// [`NotNkab`](NkabError::NotNkab) and
/// [`UnsupportedVersion`](NkabError::UnsupportedVersion) mean "this is not a
/// container we handle" rather than "this container is broken" — callers
/// ingesting arbitrary files should treat both the same way and skip the file.
#[derive(Error, Debug)]
pub enum NkabError {
    /// The first four bytes are not the `NKAB` magic tag.
    #[error("data does not start with the NKAB magic tag")]
    NotNkab,

    /// The version field names a container revision this crate doesn't know.
    #[error("unsupported NKAB container version {0}")]
    UnsupportedVersion(u32),

    /// The data ended before the header or payload could be read in full.
    #[error("truncated container: {0}")]
    Truncated(&'static str),

    /// A length field decoded to a negative value after bias correction.
    #[error("invalid {field} field: {value}")]
    InvalidLength { field: &'static str, value: i32 },

    /// The stored IV is not the 16 bytes AES-CBC requires.
    #[error("invalid IV length {0}, expected 16")]
    InvalidIv(usize),

    /// The encrypted region is not a whole number of cipher blocks.
    #[error("encrypted region of {0} bytes is not block aligned")]
    Misaligned(usize),

    /// The plaintext handed to the encoder is too short to hold the
    /// fixed-size encrypted region.
    #[error("plaintext of {len} bytes is shorter than the {required}-byte encrypted region")]
    PlaintextTooShort { len: usize, required: usize },
}

impl NkabError {
    /// Whether this error means "not our format" as opposed to "our format,
    /// but damaged". Both are non-fatal to a bulk ingest, but only the latter
    /// is worth surfacing loudly.
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::NotNkab | Self::UnsupportedVersion(_))
    }
}
