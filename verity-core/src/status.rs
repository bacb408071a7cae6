//! Status output (spec §6): the two `dm_target_type::status` callback
//! modes, info and table. Grounded directly on `verity_status` in
//! `examples/original_source/drivers/md/dm-verity-target.c` — pure data
//! formatting, no device-mapper glue.

use crate::params::{encode_hex, VerityParams};
use crate::policy::Mode;

/// Single-character info status: `'V'` while clean, `'C'` once any
/// corruption has ever been observed.
pub fn info_char(hash_failed: bool) -> char {
    if hash_failed {
        'C'
    } else {
        'V'
    }
}

/// Renders the construction parameters in the canonical table form
/// `verity_status(STATUSTYPE_TABLE, ...)` emits: the positional fields
/// followed by the optional-flags block in a fixed canonical order
/// (mode flag, then `ignore_zero_blocks`, then `check_at_most_once`).
pub fn table_line(params: &VerityParams, root_digest: &[u8], salt: &[u8], effective_mode: Mode) -> String {
    let mut out = format!(
        "{} {} {} {} {} {} {} {}",
        params.version.as_u8(),
        params.data_device,
        params.hash_device,
        params.data_block_size,
        params.hash_block_size,
        params.data_blocks,
        params.hash_start_block,
        params.algorithm_name,
    );
    out.push(' ');
    out.push_str(&encode_hex(root_digest));
    out.push(' ');
    if salt.is_empty() {
        out.push('-');
    } else {
        out.push_str(&encode_hex(salt));
    }

    let mut flags = Vec::new();
    match effective_mode {
        Mode::Logging => flags.push("ignore_corruption".to_string()),
        Mode::Restart => flags.push("restart_on_corruption".to_string()),
        _ => {}
    }
    if params.options.ignore_zero_blocks {
        flags.push("ignore_zero_blocks".to_string());
    }
    if params.options.check_at_most_once {
        flags.push("check_at_most_once".to_string());
    }
    for (k, v) in &params.options.fec_flags {
        flags.push(format!("{k} {v}"));
    }
    for (k, v) in &params.options.signature_flags {
        flags.push(format!("{k} {v}"));
    }

    if !flags.is_empty() {
        out.push_str(&format!(" {}", flags.len()));
        for flag in flags {
            out.push(' ');
            out.push_str(&flag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VerityOptions;
    use verity_hashes::FormatVersion;

    fn params(options: VerityOptions) -> VerityParams {
        VerityParams {
            version: FormatVersion::V1,
            data_device: "/dev/data".into(),
            hash_device: "/dev/hash".into(),
            data_block_size: 4096,
            hash_block_size: 4096,
            data_blocks: 8,
            hash_start_block: 0,
            algorithm_name: "sha256".into(),
            root_digest_hex: "00".repeat(32),
            salt_hex: None,
            options,
        }
    }

    #[test]
    fn info_char_reflects_hash_failed() {
        assert_eq!(info_char(false), 'V');
        assert_eq!(info_char(true), 'C');
    }

    #[test]
    fn table_line_omits_flag_block_when_no_flags_set() {
        let p = params(VerityOptions::default());
        let line = table_line(&p, &[0u8; 32], &[], Mode::Eio);
        assert!(line.ends_with('-'), "expected no trailing flag count, got: {line:?}");
    }

    #[test]
    fn table_line_includes_logging_and_zero_block_flags() {
        let mut opts = VerityOptions::default();
        opts.ignore_zero_blocks = true;
        let p = params(opts);
        let line = table_line(&p, &[0u8; 32], &[], Mode::Logging);
        assert!(line.contains("2 ignore_corruption ignore_zero_blocks"));
    }

    #[test]
    fn empty_salt_renders_as_dash() {
        let p = params(VerityOptions::default());
        let line = table_line(&p, &[0u8; 32], &[], Mode::Eio);
        assert!(line.contains(&format!("{} -", "00".repeat(32))));
    }
}
