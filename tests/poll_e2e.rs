use chrono::Utc;
use release_watch::github::GitHubClient;
use release_watch::model::NewWatchedRepo;
use release_watch::notify::BarkNotifier;
use release_watch::poll::{ErrorPolicy, PollError, Poller};
use release_watch::store::{SqliteStore, WatchlistStore};
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let url = format!("sqlite://{}/watch.db", dir.path().display());
    let store = SqliteStore::connect(&url).await.unwrap();
    store.run_migrations().await.unwrap();
    Arc::new(store)
}

async fn watch(store: &SqliteStore, owner: &str, repo: &str, seen: Option<&str>) {
    let row = store
        .insert(&NewWatchedRepo {
            owner: owner.into(),
            repo: repo.into(),
        })
        .await
        .unwrap();
    if let Some(tag) = seen {
        store.update_tag(&row.id, tag, Utc::now()).await.unwrap();
    }
}

async fn mount_release(server: &MockServer, full: &str, tag: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{full}/releases/latest")))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": tag,
            "name": format!("{full} {tag}"),
            "body": "notes"
        })))
        .mount(server)
        .await;
}

fn poller(
    store: Arc<SqliteStore>,
    github: &MockServer,
    bark: &MockServer,
    policy: ErrorPolicy,
) -> Poller {
    let source = GitHubClient::with_base_url(
        "gh-token".into(),
        "release-watch",
        Url::parse(&github.uri()).unwrap(),
    )
    .unwrap();
    let notifier = BarkNotifier::new(Url::parse(&bark.uri()).unwrap(), "dev-key".into()).unwrap();
    Poller::new(store, Arc::new(source), Arc::new(notifier), policy)
}

#[tokio::test]
async fn poll_notifies_only_new_releases() {
    let dir = tempfile::tempdir().unwrap();
    let store = setup_store(&dir).await;
    watch(&store, "foo", "bar", Some("v1.0")).await;
    watch(&store, "foo", "quiet", Some("v2.0")).await;
    watch(&store, "foo", "norelease", None).await;

    let github = MockServer::start().await;
    mount_release(&github, "foo/bar", "v1.1").await;
    mount_release(&github, "foo/quiet", "v2.0").await;
    Mock::given(method("GET"))
        .and(path("/repos/foo/norelease/releases/latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&github)
        .await;

    let bark = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/dev-key/foo%2Fbar%20a%20new%20version%20v1\.1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .expect(1)
        .mount(&bark)
        .await;

    let p = poller(store.clone(), &github, &bark, ErrorPolicy::Abort);
    let report = p.run().await.unwrap();
    assert_eq!(report.checked, 3);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.no_release, 1);

    let rows = store.list().await.unwrap();
    let tags: Vec<_> = rows.iter().map(|r| r.latest_tag.as_deref()).collect();
    assert_eq!(tags, vec![Some("v1.1"), Some("v2.0"), None]);

    // Nothing new on the second pass; the Bark expectation stays at one call.
    let report = p.run().await.unwrap();
    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 2);
}

#[tokio::test]
async fn bark_failure_does_not_block_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = setup_store(&dir).await;
    watch(&store, "foo", "bar", Some("v1.0")).await;

    let github = MockServer::start().await;
    mount_release(&github, "foo/bar", "v1.1").await;
    let bark = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&bark)
        .await;

    let report = poller(store.clone(), &github, &bark, ErrorPolicy::Abort)
        .run()
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    let rows = store.list().await.unwrap();
    assert_eq!(rows[0].latest_tag.as_deref(), Some("v1.1"));
}

#[tokio::test]
async fn github_error_aborts_or_skips_by_policy() {
    let dir = tempfile::tempdir().unwrap();
    let store = setup_store(&dir).await;
    watch(&store, "broken", "repo", None).await;
    watch(&store, "foo", "bar", Some("v1.0")).await;

    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/broken/repo/releases/latest"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&github)
        .await;
    mount_release(&github, "foo/bar", "v1.1").await;
    let bark = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&bark)
        .await;

    let err = poller(store.clone(), &github, &bark, ErrorPolicy::Abort)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Row { .. }));
    assert!(err.to_string().contains("broken/repo"));
    assert_eq!(store.list().await.unwrap()[1].latest_tag.as_deref(), Some("v1.0"));

    let report = poller(store.clone(), &github, &bark, ErrorPolicy::SkipRow)
        .run()
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(store.list().await.unwrap()[1].latest_tag.as_deref(), Some("v1.1"));
}
