//! Reader/writer for the NKAB encrypted asset-bundle container.
//!
//! An NKAB file wraps one game asset bundle in a thin encryption envelope:
//! a 4-byte `NKAB` magic tag, a `u32` version, a version-specific header, an
//! AES-256-CBC encrypted region, and a plaintext remainder that belongs to
//! the wrapped bundle format (this crate passes it through untouched).
//!
//! Two container revisions exist in the wild:
//!
//! - **Version 1**: four `i16` header fields (header size, encryption mode,
//!   key length, encrypted length), each stored with a constant `-100` bias.
//!   Key and IV follow in the clear; the cipher key is `SHA-256(stored key)`.
//! - **Version 2**: the bias is no longer constant — it is read from the
//!   first two bytes of the file's final 32 bytes, and that same 32-byte
//!   trailer is the raw cipher key. A 16-byte IV follows the header fields
//!   inline. The trailer is stripped from the decoded output.
//!
//! All operations are pure transforms over byte slices; the crate does no
//! I/O and keeps no state.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

mod error;

pub use error::NkabError;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// The 4-byte magic tag at the start of every NKAB container.
pub const MAGIC: [u8; 4] = [0x4e, 0x4b, 0x41, 0x42];

/// The fixed field bias used by version 1 containers.
const V1_BIAS: i16 = 100;

/// Size of the version 2 key trailer at the end of the file.
const V2_TRAILER_LEN: usize = 32;

/// Key used for the supported re-encryption path. SHA-256 of this value is
/// the actual cipher key, matching the version 1 scheme.
const ENCRYPT_KEY: &[u8; 16] = b"ModdedNIKKEAsset";

/// Size of the encrypted region written by [`encrypt_v1`].
const ENCRYPT_REGION: usize = 128;

/// Check whether `data` starts with the NKAB magic tag.
pub fn is_nkab(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == MAGIC
}

/// Decrypt an NKAB container, returning the plaintext bundle bytes.
///
/// The output is the decrypted region followed by the container's trailing
/// bytes (minus the key trailer for version 2 files). Returns
/// [`NkabError::NotNkab`] / [`NkabError::UnsupportedVersion`] for data that
/// isn't a container this crate handles — callers scanning arbitrary files
/// should skip on those rather than report corruption.
pub fn decrypt(data: &[u8]) -> Result<Vec<u8>, NkabError> {
    let mut reader = Cursor::new(data);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| NkabError::Truncated("magic"))?;
    if magic != MAGIC {
        return Err(NkabError::NotNkab);
    }

    let version = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| NkabError::Truncated("version"))?;
    match version {
        1 => decrypt_v1(data, reader),
        2 => decrypt_v2(data, reader),
        other => Err(NkabError::UnsupportedVersion(other)),
    }
}

/// Wrap plaintext bundle bytes in a version 1 NKAB envelope.
///
/// This is the one supported re-encryption path: a fixed key, an IV derived
/// from the plaintext hash, and a fixed 128-byte encrypted region. Decrypting
/// the result yields the input unchanged.
pub fn encrypt_v1(plain: &[u8]) -> Result<Vec<u8>, NkabError> {
    if plain.len() < ENCRYPT_REGION {
        return Err(NkabError::PlaintextTooShort {
            len: plain.len(),
            required: ENCRYPT_REGION,
        });
    }

    let digest: [u8; 32] = Sha256::digest(plain).into();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);

    let key: [u8; 32] = Sha256::digest(ENCRYPT_KEY).into();
    let mut region = plain[..ENCRYPT_REGION].to_vec();
    aes_cbc_encrypt(&key, &iv, &mut region)?;

    let mut out = Vec::with_capacity(plain.len() + 48);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&1u32.to_le_bytes());
    for field in [48i16, 0, ENCRYPT_KEY.len() as i16, ENCRYPT_REGION as i16] {
        out.extend_from_slice(&(field - V1_BIAS).to_le_bytes());
    }
    out.extend_from_slice(ENCRYPT_KEY);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&region);
    out.extend_from_slice(&plain[ENCRYPT_REGION..]);
    Ok(out)
}

/// Read the four biased `i16` header fields, returning them corrected.
///
/// Order: header size, encryption mode, key length, encrypted length. Only
/// the key and encrypted lengths drive parsing, but all four must be present
/// and non-negative after correction.
fn read_header_fields(
    reader: &mut Cursor<&[u8]>,
    bias: i16,
) -> Result<[usize; 4], NkabError> {
    const NAMES: [&str; 4] = ["header size", "encryption mode", "key length", "encrypted length"];

    let mut fields = [0usize; 4];
    for (i, name) in NAMES.into_iter().enumerate() {
        let raw = reader
            .read_i16::<LittleEndian>()
            .map_err(|_| NkabError::Truncated("header fields"))?;
        let value = raw as i32 + bias as i32;
        if value < 0 {
            return Err(NkabError::InvalidLength { field: name, value });
        }
        fields[i] = value as usize;
    }
    Ok(fields)
}

fn decrypt_v1(data: &[u8], mut reader: Cursor<&[u8]>) -> Result<Vec<u8>, NkabError> {
    let [_, _, key_len, enc_len] = read_header_fields(&mut reader, V1_BIAS)?;

    let mut stored_key = vec![0u8; key_len];
    reader
        .read_exact(&mut stored_key)
        .map_err(|_| NkabError::Truncated("key"))?;
    // The IV is stored with the key length, not a fixed 16. Real containers
    // always use 16-byte keys, so reject anything AES-CBC can't take.
    let mut iv_bytes = vec![0u8; key_len];
    reader
        .read_exact(&mut iv_bytes)
        .map_err(|_| NkabError::Truncated("iv"))?;
    let iv: [u8; 16] = iv_bytes
        .as_slice()
        .try_into()
        .map_err(|_| NkabError::InvalidIv(iv_bytes.len()))?;

    let key: [u8; 32] = Sha256::digest(&stored_key).into();

    let mut region = vec![0u8; enc_len];
    reader
        .read_exact(&mut region)
        .map_err(|_| NkabError::Truncated("encrypted region"))?;
    aes_cbc_decrypt(&key, &iv, &mut region)?;

    let remainder = &data[reader.position() as usize..];
    let mut out = region;
    out.extend_from_slice(remainder);
    Ok(out)
}

fn decrypt_v2(data: &[u8], mut reader: Cursor<&[u8]>) -> Result<Vec<u8>, NkabError> {
    if data.len() < reader.position() as usize + V2_TRAILER_LEN {
        return Err(NkabError::Truncated("key trailer"));
    }
    let trailer = &data[data.len() - V2_TRAILER_LEN..];
    let mut key = [0u8; 32];
    key.copy_from_slice(trailer);

    // The first two bytes of the trailer double as the header field bias.
    let bias = i16::from_le_bytes([trailer[0], trailer[1]]);
    let [_, _, _, enc_len] = read_header_fields(&mut reader, bias)?;

    let mut iv = [0u8; 16];
    reader
        .read_exact(&mut iv)
        .map_err(|_| NkabError::Truncated("iv"))?;

    let mut region = vec![0u8; enc_len];
    reader
        .read_exact(&mut region)
        .map_err(|_| NkabError::Truncated("encrypted region"))?;
    aes_cbc_decrypt(&key, &iv, &mut region)?;

    let tail_start = reader.position() as usize;
    let tail_end = data.len() - V2_TRAILER_LEN;
    if tail_start > tail_end {
        return Err(NkabError::Truncated("remainder"));
    }

    let mut out = region;
    out.extend_from_slice(&data[tail_start..tail_end]);
    Ok(out)
}

fn aes_cbc_decrypt(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) -> Result<(), NkabError> {
    let len = data.len();
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| NkabError::Misaligned(len))?;
    Ok(())
}

fn aes_cbc_encrypt(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) -> Result<(), NkabError> {
    let len = data.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| NkabError::Misaligned(len))?;
    Ok(())
}
