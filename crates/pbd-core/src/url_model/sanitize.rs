//! Filename sanitization for payloads written to the output directory.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a candidate filename so it is safe on Linux and on the Windows
/// shares output directories often live on.
///
/// - Replaces NUL, path separators, `<>:"|?*`, whitespace and control characters with `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores
/// - Limits length to 255 bytes without splitting a character
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let unsafe_char = matches!(c, '\0' | '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*')
            || c.is_control()
            || c.is_whitespace();
        let replacement = if unsafe_char { '_' } else { c };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    truncate_at_char_boundary(out.trim_matches(|c| c == '.' || c == '_'), NAME_MAX).to_string()
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a char boundary.
pub(crate) fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut take = max_bytes;
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    &s[..take]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_separators_and_reserved_chars() {
        assert_eq!(sanitize_filename("a/b\\c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_filename("what? <now>: \"x\"|y*.mp4"), "what_now_x_y_.mp4");
    }

    #[test]
    fn trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  ..  clip.mp4  ..  "), "clip.mp4");
    }

    #[test]
    fn collapses_underscores_and_control_chars() {
        assert_eq!(sanitize_filename("clip___name\x00.mp4"), "clip_name_.mp4");
    }

    #[test]
    fn truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let out = sanitize_filename(&long);
        assert!(out.len() <= 255);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
