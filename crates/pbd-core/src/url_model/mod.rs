//! Output filename derivation.
//!
//! Names come from resolver metadata when available, otherwise from the
//! source URL path; an extension is added from the content type when the
//! name has none. Everything passes through [`sanitize_filename`].

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default stem when neither metadata nor the URL path yield anything usable.
const DEFAULT_STEM: &str = "download";
/// Maximum bytes of the description used as a title.
const TITLE_MAX: usize = 40;

/// Derives a safe output filename for a payload fetched from `url`.
///
/// # Examples
///
/// - `derive_filename("https://cdn.example.com/a/clip.mp4", None)` → `"clip.mp4"`
/// - `derive_filename("https://example.com/@alice/video/42", Some("video/mp4"))` → `"alice_42.mp4"`
pub fn derive_filename(url: &str, content_type: Option<&str>) -> String {
    let stem = filename_from_url_path(url)
        .map(|s| sanitize_filename(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STEM.to_string());

    if has_extension(&stem) {
        return stem;
    }
    match content_type.and_then(extension_for_content_type) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// `{author}_{title}_{id}.mp4` for resolved media; the title is the description
/// cut to 40 bytes.
pub fn media_filename(author: Option<&str>, description: Option<&str>, id: Option<&str>) -> String {
    let author = author.filter(|s| !s.is_empty()).unwrap_or("unknown");
    let title = description
        .map(|d| sanitize::truncate_at_char_boundary(d, TITLE_MAX))
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());
    let id = id.filter(|s| !s.is_empty()).unwrap_or("unknown");
    sanitize_filename(&format!("{}_{}_{}.mp4", author, title, id))
}

fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let ext = match essence.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_filename_from_url_path() {
        assert_eq!(
            derive_filename("https://cdn.example.com/path/to/clip.mp4", None),
            "clip.mp4"
        );
    }

    #[test]
    fn derive_filename_adds_extension_from_content_type() {
        assert_eq!(
            derive_filename("https://www.example.com/@alice/video/42", Some("video/mp4")),
            "alice_42.mp4"
        );
        assert_eq!(
            derive_filename("https://img.example.com/i/abc123", Some("image/jpeg; q=1")),
            "abc123.jpg"
        );
        assert_eq!(
            derive_filename("https://img.example.com/i/abc123", Some("text/plain")),
            "abc123"
        );
    }

    #[test]
    fn derive_filename_fallback() {
        assert_eq!(derive_filename("https://example.com/", None), "download");
        assert_eq!(
            derive_filename("https://example.com/..", Some("video/webm")),
            "download.webm"
        );
    }

    #[test]
    fn media_filename_uses_metadata() {
        assert_eq!(
            media_filename(Some("alice"), Some("Sunset at the pier"), Some("7123")),
            "alice_Sunset_at_the_pier_7123.mp4"
        );
        assert_eq!(media_filename(None, None, None), "unknown_video_unknown.mp4");
        let long = "x".repeat(100);
        let name = media_filename(Some("a"), Some(&long), Some("1"));
        assert_eq!(name, format!("a_{}_1.mp4", "x".repeat(40)));
    }
}
