//! Typed construction parameters (spec §6, "Construction parameters").
//!
//! The textual positional/legacy-dialect parser stays an external
//! collaborator (spec.md §1's out-of-scope list): this module only owns the
//! struct that parser is expected to produce, plus the pure, allocation-free
//! `error_behavior`/mode-string parsing spec §9 calls out as "a pure parser
//! returning the mode enum" (re-exported from [`crate::policy::Mode::parse`]).

use std::collections::BTreeMap;

use verity_hashes::FormatVersion;

use crate::policy::Mode;

/// The optional flags block (spec §6). FEC-specific and root-hash-signature
/// flags are opaque to this core and forwarded verbatim as key/value pairs
/// to whichever collaborator owns them.
#[derive(Debug, Clone, Default)]
pub struct VerityOptions {
    pub ignore_zero_blocks: bool,
    pub check_at_most_once: bool,
    /// Set when an explicit mode flag or `error_behavior <int>` was given;
    /// `None` means "use the global default mode".
    pub mode_override: Option<Mode>,
    /// Opaque FEC flags, forwarded verbatim (e.g. `fec_device`, `fec_roots`).
    pub fec_flags: BTreeMap<String, String>,
    /// Opaque root-hash-signature flags (e.g. `root_hash_sig_key_desc`).
    pub signature_flags: BTreeMap<String, String>,
}

/// The typed construction parameters a verifier is built from — the
/// product of the out-of-scope textual parser, not something this crate
/// parses itself.
#[derive(Debug, Clone)]
pub struct VerityParams {
    pub version: FormatVersion,
    pub data_device: String,
    pub hash_device: String,
    pub data_block_size: u32,
    pub hash_block_size: u32,
    pub data_blocks: u64,
    pub hash_start_block: u64,
    pub algorithm_name: String,
    pub root_digest_hex: String,
    /// `None` for the positional dialect's `-` (no salt).
    pub salt_hex: Option<String>,
    pub options: VerityOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("invalid version {0}, expected 0 or 1")]
    InvalidVersion(u8),
    #[error("block size must be a power of two in [sector, page] range, got {0}")]
    InvalidBlockSize(u32),
    #[error("unknown digest algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("root digest is not valid hex: {0}")]
    InvalidRootDigestHex(String),
    #[error("salt is not valid hex: {0}")]
    InvalidSaltHex(String),
    #[error("check_at_most_once requires data_blocks <= i32::MAX, got {0}")]
    TooManyBlocksForBitmap(u64),
}

impl VerityParams {
    pub fn root_digest_bytes(&self) -> Result<Vec<u8>, ParamsError> {
        decode_hex(&self.root_digest_hex).map_err(|_| ParamsError::InvalidRootDigestHex(self.root_digest_hex.clone()))
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>, ParamsError> {
        match &self.salt_hex {
            None => Ok(Vec::new()),
            Some(s) if s == "-" => Ok(Vec::new()),
            Some(s) => decode_hex(s).map_err(|_| ParamsError::InvalidSaltHex(s.clone())),
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.data_block_size.is_power_of_two() {
            return Err(ParamsError::InvalidBlockSize(self.data_block_size));
        }
        if !self.hash_block_size.is_power_of_two() {
            return Err(ParamsError::InvalidBlockSize(self.hash_block_size));
        }
        if self.options.check_at_most_once && self.data_blocks > i32::MAX as u64 {
            return Err(ParamsError::TooManyBlocksForBitmap(self.data_blocks));
        }
        Ok(())
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, faster_hex::Error> {
    let mut out = vec![0u8; s.len() / 2];
    faster_hex::hex_decode(s.as_bytes(), &mut out)?;
    Ok(out)
}

/// Lowercase hex encoding, matching `DMEMIT("%02x", ...)` in
/// `verity_status`'s table emitter.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = vec![0u8; bytes.len() * 2];
    faster_hex::hex_encode(bytes, &mut out).expect("buffer sized exactly for hex_encode");
    String::from_utf8(out).expect("hex output is ASCII")
}
