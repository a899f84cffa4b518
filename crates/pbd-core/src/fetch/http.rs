//! libcurl-backed fetcher: every request of an attempt goes through the
//! attempt's proxy session.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use curl::easy::{Easy, List};

use super::classify::{classify_curl_error, classify_http_status};
use super::resolve::extract_embedded_media;
use super::{FailureReason, Fetcher, Outcome};
use crate::config::FetchConfig;
use crate::identity::ProxyIdentity;
use crate::sink::{Payload, PayloadSink};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Response of one GET: status, content type and the whole body.
#[derive(Debug)]
pub(super) struct Response {
    pub(super) code: u32,
    pub(super) content_type: Option<String>,
    pub(super) body: Vec<u8>,
}

/// Builds an Easy handle for `url` routed through `identity`, bounded by `timeout`.
pub(super) fn proxied_easy(
    url: &str,
    identity: &ProxyIdentity,
    timeout: Duration,
    insecure_tls: bool,
) -> Result<Easy, curl::Error> {
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.proxy(&identity.proxy_url())?;
    easy.proxy_username(identity.username())?;
    easy.proxy_password(identity.password())?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.useragent(USER_AGENT)?;
    easy.accept_encoding("gzip, deflate")?;
    easy.connect_timeout(timeout.min(Duration::from_secs(30)))?;
    easy.timeout(timeout)?;
    if insecure_tls {
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
    }
    Ok(easy)
}

/// Performs a GET on a prepared handle, collecting the body in memory.
pub(super) fn perform_get(mut easy: Easy, headers: &[String]) -> Result<Response, curl::Error> {
    let mut list = List::new();
    list.append("Accept-Language: en-US,en;q=0.5")?;
    list.append("Cache-Control: no-cache")?;
    for h in headers {
        list.append(h)?;
    }
    easy.http_headers(list)?;

    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    let content_type = easy.content_type()?.map(str::to_string);
    Ok(Response {
        code,
        content_type,
        body,
    })
}

/// Production [`Fetcher`]: downloads through the proxy and hands the payload to a sink.
pub struct CurlFetcher<S> {
    settings: Arc<FetchConfig>,
    sink: Arc<S>,
}

impl<S: PayloadSink> CurlFetcher<S> {
    pub fn new(settings: FetchConfig, sink: Arc<S>) -> Self {
        Self {
            settings: Arc::new(settings),
            sink,
        }
    }
}

impl<S: PayloadSink> Fetcher for CurlFetcher<S> {
    fn fetch(
        &self,
        url: &str,
        identity: &ProxyIdentity,
        timeout: Duration,
    ) -> impl Future<Output = Outcome> + Send {
        let url = url.to_string();
        let identity = identity.clone();
        let settings = Arc::clone(&self.settings);
        let sink = Arc::clone(&self.sink);
        async move {
            // Runs in the blocking pool; curl's own timeout bounds the thread.
            let joined = tokio::task::spawn_blocking(move || {
                fetch_blocking(&url, &identity, timeout, &settings, sink.as_ref())
            })
            .await;
            match joined {
                Ok(outcome) => outcome,
                Err(e) => Outcome::Retryable(FailureReason::Other(format!("fetch task: {}", e))),
            }
        }
    }
}

/// One attempt: optional page resolution, media GET, validation, hand-off to the sink.
/// Every request of the attempt shares the same identity and one overall deadline.
fn fetch_blocking<S: PayloadSink + ?Sized>(
    url: &str,
    identity: &ProxyIdentity,
    timeout: Duration,
    settings: &FetchConfig,
    sink: &S,
) -> Outcome {
    match url::Url::parse(url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
        Ok(u) => {
            return Outcome::Fatal(FailureReason::InvalidUrl(format!(
                "unsupported scheme {}",
                u.scheme()
            )))
        }
        Err(e) => return Outcome::Fatal(FailureReason::InvalidUrl(e.to_string())),
    }

    let deadline = Instant::now() + timeout;
    let remaining = || deadline.saturating_duration_since(Instant::now());

    let mut media_url = url.to_string();
    let mut name_hint = None;
    let mut extra_headers = vec!["Accept: */*".to_string()];

    if settings.resolve_embedded {
        let accept_html =
            "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string();
        let page = match get(url, identity, remaining(), settings, &[accept_html]) {
            Ok(resp) => resp,
            Err(outcome) => return outcome,
        };
        let html = String::from_utf8_lossy(&page.body);
        let Some(media) = extract_embedded_media(&html, url) else {
            return Outcome::Retryable(FailureReason::NoMediaAddress);
        };
        tracing::debug!(page = url, media = %media.media_url, "resolved embedded media");
        name_hint = Some(media.file_name());
        media_url = media.media_url;
        extra_headers.push(format!("Referer: {}", url));
        if let Ok(page_url) = url::Url::parse(url) {
            let origin = page_url.origin().ascii_serialization();
            extra_headers.push(format!("Origin: {}", origin));
        }
    }

    let resp = match get(&media_url, identity, remaining(), settings, &extra_headers) {
        Ok(resp) => resp,
        Err(outcome) => return outcome,
    };

    if let Some(ct) = resp.content_type.as_deref() {
        if !content_type_accepted(ct, &settings.accepted_content_types) {
            return Outcome::Retryable(FailureReason::ContentType(ct.to_string()));
        }
    }
    let received = resp.body.len() as u64;
    if received < settings.min_payload_bytes {
        return Outcome::Retryable(FailureReason::PayloadTooSmall {
            received,
            minimum: settings.min_payload_bytes,
        });
    }

    let payload = Payload {
        bytes: resp.body,
        content_type: resp.content_type,
        name_hint,
    };
    hand_off(url, &payload, deadline, sink)
}

/// Writes a validated payload unless the attempt deadline has already passed.
/// Once past the deadline the attempt counts as timed out and nothing reaches disk.
fn hand_off<S: PayloadSink + ?Sized>(
    url: &str,
    payload: &Payload,
    deadline: Instant,
    sink: &S,
) -> Outcome {
    if Instant::now() >= deadline {
        tracing::debug!(url, "deadline passed before write; payload discarded");
        return Outcome::Retryable(FailureReason::Timeout);
    }
    match sink.write(url, payload) {
        Ok(path) => {
            tracing::debug!(
                url,
                path = %path.display(),
                bytes = payload.bytes.len(),
                "payload written"
            );
            Outcome::Success
        }
        Err(e) => Outcome::Retryable(FailureReason::Write(format!("{:#}", e))),
    }
}

/// GET through the identity; non-2xx statuses and transport errors come back classified.
fn get(
    url: &str,
    identity: &ProxyIdentity,
    timeout: Duration,
    settings: &FetchConfig,
    headers: &[String],
) -> Result<Response, Outcome> {
    if timeout.is_zero() {
        return Err(Outcome::Retryable(FailureReason::Timeout));
    }
    let resp = proxied_easy(url, identity, timeout, settings.insecure_tls)
        .and_then(|easy| perform_get(easy, headers))
        .map_err(|e| classify_curl_error(&e))?;
    match classify_http_status(resp.code) {
        Outcome::Success => Ok(resp),
        failed => Err(failed),
    }
}

/// Case-insensitive prefix match; an empty list accepts everything.
fn content_type_accepted(content_type: &str, accepted: &[String]) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let ct = content_type.trim().to_ascii_lowercase();
    accepted
        .iter()
        .any(|prefix| ct.starts_with(&prefix.trim().to_ascii_lowercase()))
}
