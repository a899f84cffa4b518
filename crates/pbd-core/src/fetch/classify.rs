//! Classify HTTP status and curl errors into attempt outcomes.

use super::{FailureReason, Outcome};

/// libcurl's `CURLE_PROXY` (proxy handshake failed, e.g. 407 on CONNECT).
const CURLE_PROXY: u32 = 97;

/// Classify an HTTP status code of the final response.
///
/// 2xx is `Success`; 404/410 mean the resource is gone; everything else is
/// retryable because a different exit address may get a different answer.
pub fn classify_http_status(code: u32) -> Outcome {
    let status = u16::try_from(code).unwrap_or(u16::MAX);
    match code {
        200..=299 => Outcome::Success,
        404 | 410 => Outcome::Fatal(FailureReason::Gone(status)),
        407 => Outcome::Retryable(FailureReason::ProxySession(
            "proxy authentication required (HTTP 407)".to_string(),
        )),
        429 | 503 => Outcome::Retryable(FailureReason::Throttled(status)),
        _ => Outcome::Retryable(FailureReason::Http(status)),
    }
}

/// Classify a curl error raised by `perform()`.
pub fn classify_curl_error(e: &curl::Error) -> Outcome {
    if e.is_operation_timedout() {
        return Outcome::Retryable(FailureReason::Timeout);
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return Outcome::Fatal(FailureReason::InvalidUrl(e.description().to_string()));
    }
    if e.is_couldnt_resolve_proxy() || e.code() == CURLE_PROXY {
        return Outcome::Retryable(FailureReason::ProxySession(e.description().to_string()));
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_ssl_connect_error()
        || e.is_partial_file()
    {
        return Outcome::Retryable(FailureReason::Connection(e.description().to_string()));
    }
    Outcome::Retryable(FailureReason::Other(e.to_string()))
}
