use hfmd_core::{HfmdError, HubClient};
use hfmd_types::{RepoKind, RepoRef, SearchQuery};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn list_tree_follows_pages_and_directories() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/main"))
        .and(query_param("cursor", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "oid": "c1", "size": 12, "path": "config.json"}
        ])))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/main"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "link",
                    format!(
                        "<{}/api/models/org/model/tree/main?cursor=page2>; rel=\"next\"",
                        server.uri()
                    )
                    .as_str(),
                )
                .set_body_json(json!([
                    {"type": "file", "oid": "r1", "size": 30, "path": "README.md"},
                    {"type": "directory", "oid": "d1", "size": 0, "path": "onnx"}
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/main/onnx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "type": "file",
                "oid": "pointer",
                "size": 134,
                "lfs": {"oid": "sha-onnx", "size": 900000, "pointerSize": 134},
                "path": "onnx/model.onnx"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), None).unwrap();
    let files = hub.list_tree(&RepoRef::model("org/model")).await.unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "config.json", "onnx/model.onnx"]);
    assert!(files.iter().all(|f| f.is_file()));

    let onnx = &files[2];
    assert_eq!(onnx.size, Some(900000));
    assert_eq!(onnx.content_id, "sha-onnx");
}

#[tokio::test]
async fn dataset_listing_uses_dataset_routes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/datasets/org/data/tree/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "oid": "x", "size": 3, "path": "train.csv"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), None).unwrap();
    let repo = RepoRef::new(RepoKind::Dataset, "org/data", "v1");
    let files = hub.list_tree(&repo).await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(
        hub.content_url(&repo, "train.csv").unwrap().path(),
        "/datasets/org/data/resolve/v1/train.csv"
    );
}

#[tokio::test]
async fn missing_repository_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), None).unwrap();
    let result = hub.list_tree(&RepoRef::model("nobody/nothing")).await;

    match result {
        Err(e @ HfmdError::Status { status: 404, .. }) => assert!(e.is_permanent()),
        other => panic!("expected 404 status error, got {other:?}"),
    }
}

#[tokio::test]
async fn search_sends_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/models"))
        .and(query_param("search", "bert"))
        .and(query_param("author", "google"))
        .and(query_param("sort", "downloads"))
        .and(query_param("direction", "-1"))
        .and(query_param("limit", "5"))
        .and(query_param("full", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "google/bert-base-uncased",
                "author": "google",
                "downloads": 1000,
                "likes": 10,
                "lastModified": "2024-02-19T11:06:12.000Z",
                "pipeline_tag": "fill-mask",
                "tags": ["transformers"]
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), None).unwrap();
    let query = SearchQuery {
        search: Some("bert".to_string()),
        author: Some("google".to_string()),
        sort: Some("downloads".to_string()),
        descending: true,
        limit: Some(5),
    };
    let results = hub.search(RepoKind::Model, &query).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "google/bert-base-uncased");
    assert_eq!(results[0].downloads, Some(1000));
    assert_eq!(results[0].pipeline_tag.as_deref(), Some("fill-mask"));
    assert!(results[0].last_modified.is_some());
}

#[tokio::test]
async fn card_is_none_when_readme_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/org/with-card/resolve/main/README.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Model card"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/org/no-card/resolve/main/README.md"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), None).unwrap();

    let card = hub.fetch_card(&RepoRef::model("org/with-card")).await.unwrap();
    assert_eq!(card.as_deref(), Some("# Model card"));

    let none = hub.fetch_card(&RepoRef::model("org/no-card")).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn token_is_sent_as_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/models/org/gated/tree/main"))
        .and(header("authorization", "Bearer hf_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let hub = HubClient::with_endpoint(&server.uri(), Some("hf_secret")).unwrap();
    let files = hub.list_tree(&RepoRef::model("org/gated")).await.unwrap();

    assert!(files.is_empty());
}
