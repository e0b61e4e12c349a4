use std::sync::Arc;

use animap_core::Config;
use animap_web::{AppState, build_app};
use serde_json::{Value, json};
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERIES_RECORD: &str = r#"[{"thetvdb url":"https://www.thetvdb.com/dereferrer/series/361957","myanimelist":5,"thetvdb":361957},{"season":"1","thetvdb url":"https://www.thetvdb.com/dereferrer/season/12","myanimelist":5,"thetvdb":12},{"season":"2","thetvdb url":"https://www.thetvdb.com/dereferrer/season/13","myanimelist":7,"thetvdb":13}]"#;

struct TestApp {
    base: String,
    client: reqwest::Client,
    origin: MockServer,
    mapping: MockServer,
}

impl TestApp {
    async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path_and_query))
            .send()
            .await
            .unwrap()
    }
}

fn config_for(origin: &MockServer, mapping: &MockServer) -> Config {
    Config {
        dataset_owner: Some("animap.github.io".into()),
        dataset_repo: Some("dataset".into()),
        origin_url: Some(origin.uri()),
        mapping_url: mapping.uri(),
        origin_timeout_secs: 2,
        crossref_timeout_secs: 2,
        ..Config::default()
    }
}

async fn serve(config: &Config) -> String {
    let state = Arc::new(AppState::from_config(config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_app(state)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_app() -> TestApp {
    let origin = MockServer::start().await;
    let mapping = MockServer::start().await;
    let base = serve(&config_for(&origin, &mapping)).await;
    TestApp {
        base,
        client: reqwest::Client::new(),
        origin,
        mapping,
    }
}

async fn mount_series(app: &TestApp, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/api/thetvdb-series/361957.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SERIES_RECORD, "application/json"))
        .expect(expected_fetches)
        .mount(&app.origin)
        .await;
}

async fn mount_mapping(app: &TestApp, mal_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/myanimelist/{mal_id}")))
        .respond_with(response)
        .expect(1)
        .mount(&app.mapping)
        .await;
}

/// Fails the test on drop if either upstream receives a request.
async fn forbid_network(app: &TestApp) {
    for server in [&app.origin, &app.mapping] {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn root_serves_usage_text() {
    let app = spawn_app().await;
    let resp = app.get("/").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    assert!(resp.text().await.unwrap().contains("/thetvdb-series?id="));
}

#[tokio::test]
async fn unknown_path_is_rejected_without_network() {
    let app = spawn_app().await;
    forbid_network(&app).await;

    let resp = app.get("/foo?id=1").await;
    assert_eq!(resp.status(), 400);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(resp.text().await.unwrap(), "Invalid path: /foo");
}

#[tokio::test]
async fn missing_id_is_rejected_without_network() {
    let app = spawn_app().await;
    forbid_network(&app).await;

    for query in ["/thetvdb-series", "/thetvdb-series?id=", "/thetvdb-series?crossIDs"] {
        let resp = app.get(query).await;
        assert_eq!(resp.status(), 400, "{query}");
        assert_eq!(
            resp.text().await.unwrap(),
            "Missing required query parameter: id"
        );
    }
}

#[tokio::test]
async fn non_json_origin_is_not_found_and_not_cached() {
    let app = spawn_app().await;
    Mock::given(method("GET"))
        .and(path("/api/thetvdb-series/999999.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>missing</html>", "text/html"))
        .expect(2)
        .mount(&app.origin)
        .await;

    for _ in 0..2 {
        let resp = app.get("/thetvdb-series?id=999999").await;
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.headers()["content-type"], "application/json");
        assert_eq!(
            resp.text().await.unwrap(),
            r#"{"message":"Data not found for thetvdb-series/999999"}"#
        );
    }
}

#[tokio::test]
async fn repeat_request_is_byte_identical_and_served_from_cache() {
    let app = spawn_app().await;
    mount_series(&app, 1).await;

    let first = app.get("/thetvdb-series?id=361957").await;
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["cache-control"], "no-store");
    assert_eq!(first.headers()["content-type"], "application/json");
    let first_body = first.text().await.unwrap();
    assert_eq!(first_body, SERIES_RECORD);

    let second = app.get("/thetvdb-series?id=361957").await;
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()["cache-control"], "no-store");
    assert_eq!(second.text().await.unwrap(), first_body);
}

#[tokio::test]
async fn cross_ids_resolve_each_mal_id_once() {
    let app = spawn_app().await;
    mount_series(&app, 1).await;
    mount_mapping(
        &app,
        "5",
        ResponseTemplate::new(200).set_body_json(json!({"myanimelist": 5, "anilist": 21})),
    )
    .await;
    mount_mapping(
        &app,
        "7",
        ResponseTemplate::new(200).set_body_json(json!({"myanimelist": 7, "anilist": 99})),
    )
    .await;

    let resp = app.get("/thetvdb-series?id=361957&crossIDs").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "MISS");
    let body: Value = resp.json().await.unwrap();
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["thetvdb"], json!("361957"));
    assert_eq!(items[0]["anilist"], json!(21));
    assert_eq!(items[1]["thetvdb"], json!("12"));
    assert_eq!(items[1]["anilist"], json!(21));
    assert_eq!(items[2]["thetvdb"], json!("13"));
    assert_eq!(items[2]["anilist"], json!(99));

    // Cross-references are cached too: a second enriched request stays local.
    let again = app.get("/thetvdb-series?id=361957&crossIDs").await;
    assert_eq!(again.headers()["x-cache"], "HIT");
    let again: Value = again.json().await.unwrap();
    assert_eq!(again, body);
}

#[tokio::test]
async fn failing_cross_ref_degrades_only_its_items() {
    let app = spawn_app().await;
    mount_series(&app, 1).await;
    mount_mapping(
        &app,
        "5",
        ResponseTemplate::new(200).set_body_json(json!({"anilist": 21})),
    )
    .await;
    mount_mapping(&app, "7", ResponseTemplate::new(500)).await;

    let resp = app.get("/thetvdb-series?id=361957&crossIDs").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body[0]["anilist"], json!(21));
    assert_eq!(body[2]["thetvdb"], json!("13"));
    assert_eq!(body[2]["myanimelist"], json!(7));
    assert!(body[2].get("anilist").is_none());
}

#[tokio::test]
async fn missing_identity_fails_every_request_before_network() {
    let origin = MockServer::start().await;
    let mapping = MockServer::start().await;
    for server in [&origin, &mapping] {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }

    let config = Config {
        dataset_repo: None,
        ..config_for(&origin, &mapping)
    };
    let base = serve(&config).await;
    let client = reqwest::Client::new();

    for uri in ["/", "/foo", "/thetvdb-series?id=361957"] {
        let resp = client.get(format!("{base}{uri}")).send().await.unwrap();
        assert_eq!(resp.status(), 500, "{uri}");
        assert_eq!(
            resp.text().await.unwrap(),
            "Server misconfigured: dataset repo is not set"
        );
    }
}
