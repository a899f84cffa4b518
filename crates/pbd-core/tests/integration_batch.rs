//! Integration test: a whole batch through `BatchScheduler` + `CurlFetcher` + `DirectorySink`.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::media_server::{self, Route};
use pbd_core::concurrency::ConcurrencyController;
use pbd_core::config::ConcurrencyConfig;
use pbd_core::fetch::CurlFetcher;
use pbd_core::identity::SessionIdentityProvider;
use pbd_core::retry::RetryPolicy;
use pbd_core::scheduler::{BatchScheduler, ItemStatus};
use pbd_core::sink::DirectorySink;
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_downloads_retries_and_reports() {
    let body = common::media_body(4_000);
    let server = media_server::start(vec![
        ("/a.mp4", Route::ok("video/mp4", body.clone())),
        ("/b.mp4", Route::ok("video/mp4", body.clone()).failing_first(2)),
        ("/c.mp4", Route::ok("application/octet-stream", body.clone())),
    ]);
    let dir = tempdir().unwrap();
    let sink = Arc::new(DirectorySink::create(dir.path()).unwrap());
    let fetcher = Arc::new(CurlFetcher::new(common::fetch_config(), sink));
    let identities =
        SessionIdentityProvider::with_run_tag(&common::proxy_config(server.port()), "batch").unwrap();
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        jitter: true,
    };
    let controller = ConcurrencyController::new(&ConcurrencyConfig {
        min: 1,
        max: 4,
        initial: Some(2),
        ..ConcurrencyConfig::default()
    });

    let urls = vec![
        "http://media.test/a.mp4".to_string(),
        "http://media.test/b.mp4".to_string(),
        "http://media.test/gone.mp4".to_string(),
        "http://media.test/c.mp4".to_string(),
    ];
    let report = BatchScheduler::new(fetcher, identities, retry, controller, Duration::from_secs(5))
        .run(urls)
        .await
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    assert!(report.meets_threshold(0.75));

    let gone = &report.items[2];
    assert_eq!(gone.status, ItemStatus::Failed);
    assert_eq!(gone.attempts, 1);
    assert!(gone.failure.as_deref().unwrap().contains("404"));
    assert_eq!(report.items[1].status, ItemStatus::Succeeded);
    assert_eq!(report.items[1].attempts, 3);

    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), body, "{}", name);
    }
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());

    // One fresh session per attempt: every request carried different proxy credentials.
    let seen = server.requests();
    assert_eq!(seen.len(), 6);
    let sessions: HashSet<_> = seen.iter().filter_map(|s| s.proxy_auth.clone()).collect();
    assert_eq!(sessions.len(), 6);
    assert_eq!(report.stats.sessions_created, 6);
    assert_eq!(server.hits("/b.mp4"), 3);
}
