//! Filename hints from the source URL path.

/// Derives a filename stem hint from a URL path.
///
/// Creator-style paths (`/@alice/video/7123`) become `alice_7123`; otherwise
/// the last non-empty path segment is used. Returns `None` when the URL cannot
/// be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<String> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();

    if let Some(author) = segments.iter().find_map(|s| s.strip_prefix('@')) {
        if let Some(id) = segments
            .windows(2)
            .find(|w| w[0] == "video" || w[0] == "photo")
            .map(|w| w[1].as_str())
        {
            return Some(format!("{}_{}", author, id));
        }
    }

    let last = segments.last()?;
    if last == "." || last == ".." {
        return None;
    }
    Some(last.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment() {
        assert_eq!(
            filename_from_url_path("https://cdn.example.com/media/clip-01.mp4?sig=abc"),
            Some("clip-01.mp4".to_string())
        );
        assert_eq!(
            filename_from_url_path("https://cdn.example.com/a%20b.mp4"),
            Some("a b.mp4".to_string())
        );
    }

    #[test]
    fn creator_path() {
        assert_eq!(
            filename_from_url_path("https://www.example.com/@alice/video/7123?lang=en"),
            Some("alice_7123".to_string())
        );
    }

    #[test]
    fn root_or_invalid() {
        assert_eq!(filename_from_url_path("https://example.com/"), None);
        assert_eq!(filename_from_url_path("not a url"), None);
    }
}
