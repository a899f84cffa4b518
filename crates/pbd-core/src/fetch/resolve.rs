//! Media address extraction from pages that embed their state as JSON.
//!
//! Short-video pages ship a `<script id="__UNIVERSAL_DATA_FOR_REHYDRATION__">`
//! blob; the playable address lives under
//! `__DEFAULT_SCOPE__["webapp.video-detail"].itemInfo.itemStruct.video`.

use serde_json::Value;

const STATE_SCRIPT_MARKER: &str = "<script id=\"__UNIVERSAL_DATA_FOR_REHYDRATION__\"";

/// Media address and descriptive metadata found in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedMedia {
    pub media_url: String,
    pub author: Option<String>,
    pub video_id: Option<String>,
    pub description: Option<String>,
}

impl EmbeddedMedia {
    /// Output name `{author}_{title}_{id}.mp4`, fields falling back to placeholders.
    pub fn file_name(&self) -> String {
        crate::url_model::media_filename(
            self.author.as_deref(),
            self.description.as_deref(),
            self.video_id.as_deref(),
        )
    }
}

/// Extracts the media address from `html`, preferring `downloadAddr` over `playAddr`.
///
/// Author and id fall back to the `/@author/video/<id>` shape of `page_url`.
/// Returns `None` if the page has no state blob or the blob has no address.
pub fn extract_embedded_media(html: &str, page_url: &str) -> Option<EmbeddedMedia> {
    let (url_author, url_id) = author_and_id_from_url(page_url);

    let start = html.find(STATE_SCRIPT_MARKER)?;
    let body_start = start + html[start..].find('>')? + 1;
    let body_len = html[body_start..].find("</script>")?;
    let state: Value = serde_json::from_str(&html[body_start..body_start + body_len]).ok()?;

    let item = state
        .get("__DEFAULT_SCOPE__")?
        .get("webapp.video-detail")?
        .get("itemInfo")?
        .get("itemStruct")?;
    let video = item.get("video")?;

    let address = ["downloadAddr", "playAddr"]
        .iter()
        .filter_map(|key| video.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())?;
    let media_url = urlencoding::decode(address)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| address.to_string());

    let author = item
        .get("author")
        .and_then(|a| a.get("uniqueId"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or(url_author);
    let description = item
        .get("desc")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(EmbeddedMedia {
        media_url,
        author,
        video_id: url_id,
        description,
    })
}

/// `https://host/@alice/video/123` → (`alice`, `123`).
fn author_and_id_from_url(page_url: &str) -> (Option<String>, Option<String>) {
    let Ok(parsed) = url::Url::parse(page_url) else {
        return (None, None);
    };
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let author = segments
        .iter()
        .find_map(|s| s.strip_prefix('@'))
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let id = segments
        .windows(2)
        .find(|w| w[0] == "video" && !w[1].is_empty() && w[1].bytes().all(|b| b.is_ascii_digit()))
        .map(|w| w[1].to_string());
    (author, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(video: &str) -> String {
        format!(
            r#"<html><head></head><body>
<script id="__UNIVERSAL_DATA_FOR_REHYDRATION__" type="application/json">{{"__DEFAULT_SCOPE__":{{"webapp.video-detail":{{"itemInfo":{{"itemStruct":{{"desc":"Sunset at the pier","author":{{"uniqueId":"alice"}},"video":{video}}}}}}}}}}}</script>
</body></html>"#
        )
    }

    #[test]
    fn prefers_download_addr() {
        let html = page(
            r#"{"downloadAddr":"https://v.example/dl%3Fid%3D7","playAddr":"https://v.example/play"}"#,
        );
        let media =
            extract_embedded_media(&html, "https://www.example.com/@alice/video/7123").unwrap();
        assert_eq!(media.media_url, "https://v.example/dl?id=7");
        assert_eq!(media.author.as_deref(), Some("alice"));
        assert_eq!(media.video_id.as_deref(), Some("7123"));
        assert_eq!(media.description.as_deref(), Some("Sunset at the pier"));
    }

    #[test]
    fn falls_back_to_play_addr() {
        let html = page(r#"{"downloadAddr":"","playAddr":"https://v.example/play"}"#);
        let media = extract_embedded_media(&html, "https://www.example.com/x").unwrap();
        assert_eq!(media.media_url, "https://v.example/play");
        assert!(media.video_id.is_none());
    }

    #[test]
    fn no_state_blob_or_address() {
        assert!(extract_embedded_media("<html>captcha</html>", "https://e.com/").is_none());
        let html = page(r#"{"duration":12}"#);
        assert!(extract_embedded_media(&html, "https://e.com/").is_none());
    }

    #[test]
    fn author_from_url_when_missing_in_state() {
        let html = r#"<script id="__UNIVERSAL_DATA_FOR_REHYDRATION__">{"__DEFAULT_SCOPE__":{"webapp.video-detail":{"itemInfo":{"itemStruct":{"video":{"playAddr":"https://v/p"}}}}}}</script>"#;
        let media = extract_embedded_media(html, "https://e.com/@bob/video/99").unwrap();
        assert_eq!(media.author.as_deref(), Some("bob"));
        assert_eq!(media.file_name(), "bob_video_99.mp4");
    }
}
