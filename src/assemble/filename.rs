//! Output filename derivation from a job's name.

/// Fallback used when a name sanitizes to nothing.
pub const FALLBACK_NAME: &str = "download_job";

/// Longest stem kept, in bytes. Leaves room for the extension and a
/// reserved-name prefix under the common 255-byte file name limit.
pub const MAX_STEM_BYTES: usize = 200;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitizes a job name for use as an output file stem.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) with `_`, trims surrounding
/// whitespace and trailing dots, caps the result at [`MAX_STEM_BYTES`] on a
/// character boundary, substitutes [`FALLBACK_NAME`] for an empty result,
/// and prefixes Windows device names (`CON`, `LPT1`, ...) with `_`.
#[must_use]
pub fn sanitize_job_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = trim_end(truncate_to_bytes(replaced.trim_start(), MAX_STEM_BYTES));

    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    if is_reserved_device_name(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn trim_end(name: &str) -> &str {
    name.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

fn truncate_to_bytes(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Windows treats `CON`, `con.txt` and `Con.tar.gz` alike: only the part
/// before the first dot matters.
fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_invalid_chars() {
        assert_eq!(sanitize_job_name("My:Comic/Title"), "My_Comic_Title");
        assert_eq!(sanitize_job_name("a\\b*c?d\"e<f>g|h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_job_name("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_trims_whitespace_and_trailing_dots() {
        assert_eq!(sanitize_job_name("  Saga #1  "), "Saga #1");
        assert_eq!(sanitize_job_name("Vol. 2..."), "Vol. 2");
        assert_eq!(sanitize_job_name("Ends . . "), "Ends");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_job_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_job_name("   "), FALLBACK_NAME);
        assert_eq!(sanitize_job_name(".."), FALLBACK_NAME);
    }

    #[test]
    fn test_sanitize_caps_long_names_by_bytes() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_job_name(&long).len(), MAX_STEM_BYTES);

        // 3-byte characters: the cut must land on a char boundary.
        let cjk = "漫".repeat(100);
        let capped = sanitize_job_name(&cjk);
        assert!(capped.len() <= MAX_STEM_BYTES);
        assert_eq!(capped.chars().count(), MAX_STEM_BYTES / 3);
        assert!(capped.chars().all(|c| c == '漫'));
    }

    #[test]
    fn test_sanitize_retrims_after_capping() {
        let name = format!("{}  . tail", "a".repeat(MAX_STEM_BYTES - 2));
        assert_eq!(sanitize_job_name(&name), "a".repeat(MAX_STEM_BYTES - 2));
    }

    #[test]
    fn test_sanitize_prefixes_reserved_device_names() {
        assert_eq!(sanitize_job_name("CON"), "_CON");
        assert_eq!(sanitize_job_name("con"), "_con");
        assert_eq!(sanitize_job_name("lpt9"), "_lpt9");
        assert_eq!(sanitize_job_name("Aux.part"), "_Aux.part");
        assert_eq!(sanitize_job_name(" NUL "), "_NUL");
    }

    #[test]
    fn test_sanitize_keeps_names_that_merely_contain_device_names() {
        assert_eq!(sanitize_job_name("CONAN"), "CONAN");
        assert_eq!(sanitize_job_name("COM10"), "COM10");
        assert_eq!(sanitize_job_name("Console Wars"), "Console Wars");
    }
}
