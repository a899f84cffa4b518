//! URL list input: one URL per line, `#` comments and blank lines skipped.

use std::path::Path;

use crate::config::ConfigError;

/// Parses list text into URLs in file order. Lines are trimmed; duplicates are kept.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses the list at `path`. An unreadable file is a configuration failure.
pub fn read_url_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::InputList {
        path: path.to_path_buf(),
        source,
    })?;
    let urls = parse_url_list(&text);
    tracing::debug!(path = %path.display(), count = urls.len(), "read URL list");
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# batch 1\nhttps://a.example/1.mp4\n\n   \n  https://a.example/2.mp4  \r\n#https://skipped\n";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.example/1.mp4", "https://a.example/2.mp4"]
        );
    }

    #[test]
    fn indented_comment_is_skipped() {
        assert!(parse_url_list("   # note\n").is_empty());
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "https://a.example/1.mp4\nhttps://a.example/1.mp4\n").unwrap();
        let urls = read_url_list(&path).unwrap();
        assert_eq!(urls.len(), 2, "duplicates are not removed");
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_url_list(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::InputList { .. }));
        assert!(err.to_string().contains("absent.txt"));
    }
}
