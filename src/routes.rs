use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::composer::DigestComposer;
use crate::converter::{ConverterResponse, FeedConverter};
use crate::db::Database;
use crate::models::DigestRequest;
use crate::pipeline::DigestPipeline;

pub struct AppState {
    pub db: Arc<Database>,
    pub pipeline: Arc<DigestPipeline>,
    pub composer: Arc<DigestComposer>,
    pub converter: Arc<FeedConverter>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users/:email/digest", get(digest))
        .route("/api/generate-digest", post(generate_digest))
        .route("/sources", get(sources))
        .route("/api/v1/convert", get(convert))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

pub async fn digest(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> impl IntoResponse {
    Json(state.pipeline.run(&email).await)
}

/// Digest for newsletters posted by the caller. Other methods get 405.
pub async fn generate_digest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request = match serde_json::from_value::<DigestRequest>(body) {
        Ok(request) if !request.user_name.trim().is_empty() => request,
        _ => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid input" })))
                .into_response()
        }
    };

    match state
        .composer
        .compose_requested(&request.user_name, &request.newsletters)
        .await
    {
        Ok(digest) => Json(json!({ "digest": digest })).into_response(),
        Err(e) => {
            warn!("Error generating digest: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to generate digest" })),
            )
                .into_response()
        }
    }
}

pub async fn sources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let sources = state.db.get_all_sources().await?;
    Ok(Json(sources))
}

#[derive(Deserialize)]
pub struct ConvertQuery {
    #[serde(default)]
    pub rss_url: String,
}

pub async fn convert(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConvertQuery>,
) -> impl IntoResponse {
    if query.rss_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ConverterResponse::error("rss_url parameter is required")),
        );
    }

    let response = state.converter.convert(&query.rss_url).await;
    let status = if response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(response))
}

pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, TextGenerator};
    use crate::composer::DigestComposer;
    use crate::config::SourceConfig;
    use crate::fetcher::FeedSource;
    use crate::models::NormalizedFeed;
    use crate::pipeline::FALLBACK_DIGEST;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoFeeds;

    #[async_trait]
    impl FeedSource for NoFeeds {
        async fn fetch_feed(&self, _url: &str, _source_id: i64) -> Option<NormalizedFeed> {
            None
        }
    }

    struct NoText;

    #[async_trait]
    impl TextGenerator for NoText {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, CompletionError> {
            Err(CompletionError::Empty)
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, CompletionError> {
            Ok(prompt.lines().next().unwrap_or_default().to_string())
        }
    }

    async fn create_test_app(initialize: bool) -> (Router, Arc<Database>) {
        create_test_app_with(initialize, Arc::new(NoText)).await
    }

    async fn create_test_app_with(
        initialize: bool,
        generator: Arc<dyn TextGenerator>,
    ) -> (Router, Arc<Database>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        if initialize {
            db.initialize().await.unwrap();
        }
        let db = Arc::new(db);

        let composer = DigestComposer::new(generator);
        let pipeline = DigestPipeline::new(db.clone(), Arc::new(NoFeeds), composer.clone());
        let converter = FeedConverter::new(Duration::from_secs(5), "test-agent").unwrap();

        let state = Arc::new(AppState {
            db: db.clone(),
            pipeline: Arc::new(pipeline),
            composer: Arc::new(composer),
            converter: Arc::new(converter),
        });

        (router(state), db)
    }

    async fn body_string(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _db) = create_test_app(true).await;

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "OK");
        }
    }

    mod digest_tests {
        use super::*;

        #[tokio::test]
        async fn test_digest_for_unknown_user() {
            let (app, _db) = create_test_app(true).await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/users/nobody@example.com/digest")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["newsletters"], serde_json::json!([]));
            assert!(json["digest"].as_str().unwrap().starts_with("👋 Hey there!"));
        }

        #[tokio::test]
        async fn test_digest_storage_failure_is_still_ok() {
            let (app, _db) = create_test_app(false).await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/users/ada@example.com/digest")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["digest"], FALLBACK_DIGEST);
        }
    }

    mod generate_digest_tests {
        use super::*;

        fn post_json(body: serde_json::Value) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri("/api/generate-digest")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        fn valid_body() -> serde_json::Value {
            serde_json::json!({
                "userName": "Ada",
                "newsletters": [{
                    "title": "Money Matters",
                    "category": "Finance",
                    "articles": [{"title": "Rates", "author": "Ada", "pubDate": "2024-12-09"}]
                }]
            })
        }

        #[tokio::test]
        async fn test_generated_digest_is_returned() {
            let (app, _db) = create_test_app_with(true, Arc::new(Echo)).await;

            let response = app.oneshot(post_json(valid_body())).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(
                json["digest"],
                "Generate a personalized newsletter digest for Ada. Here are the newsletters:"
            );
        }

        #[tokio::test]
        async fn test_invalid_input_is_rejected() {
            let bodies = [
                serde_json::json!({"newsletters": []}),
                serde_json::json!({"userName": "", "newsletters": []}),
                serde_json::json!({"userName": "Ada"}),
                serde_json::json!({"userName": "Ada", "newsletters": {"title": "x"}}),
            ];

            for body in bodies {
                let (app, _db) = create_test_app_with(true, Arc::new(Echo)).await;
                let response = app.oneshot(post_json(body)).await.unwrap();

                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                let json: serde_json::Value =
                    serde_json::from_str(&body_string(response).await).unwrap();
                assert_eq!(json["error"], "Invalid input");
            }
        }

        #[tokio::test]
        async fn test_generator_failure_is_server_error() {
            let (app, _db) = create_test_app(true).await;

            let response = app.oneshot(post_json(valid_body())).await.unwrap();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["error"], "Failed to generate digest");
        }

        #[tokio::test]
        async fn test_get_is_not_allowed() {
            let (app, _db) = create_test_app(true).await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/generate-digest")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    mod sources_tests {
        use super::*;

        #[tokio::test]
        async fn test_sources_lists_catalog() {
            let (app, db) = create_test_app(true).await;
            db.sync_sources(&[SourceConfig {
                title: "Money".to_string(),
                url: "https://money.example.com".to_string(),
                category: "Finance".to_string(),
            }])
            .await
            .unwrap();

            let response = app
                .oneshot(Request::builder().uri("/sources").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_string(response).await.contains("Money"));
        }

        #[tokio::test]
        async fn test_sources_storage_failure() {
            let (app, _db) = create_test_app(false).await;

            let response = app
                .oneshot(Request::builder().uri("/sources").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    mod convert_tests {
        use super::*;

        const RSS: &str = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
                <title>Served Feed</title>
                <link>https://served.example.com</link>
                <description>d</description>
                <item>
                    <title>One</title>
                    <link>https://served.example.com/1</link>
                    <description>Body</description>
                </item>
            </channel></rss>"#;

        #[tokio::test]
        async fn test_convert_serves_parsed_feed() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/feed"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
                .mount(&server)
                .await;

            let (app, _db) = create_test_app(true).await;
            let uri = format!("/api/v1/convert?rss_url={}/feed", server.uri());

            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["status"], "ok");
            assert_eq!(json["feed"]["title"], "Served Feed");
            assert_eq!(json["items"][0]["title"], "One");
        }

        #[tokio::test]
        async fn test_convert_upstream_failure() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let (app, _db) = create_test_app(true).await;
            let uri = format!("/api/v1/convert?rss_url={}/missing", server.uri());

            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["status"], "error");
        }

        #[tokio::test]
        async fn test_convert_requires_url() {
            let (app, _db) = create_test_app(true).await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/v1/convert")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[test]
        fn test_convert_query_parsing() {
            let query: ConvertQuery =
                serde_urlencoded::from_str("rss_url=https%3A%2F%2Fa.example.com%2Ffeed").unwrap();
            assert_eq!(query.rss_url, "https://a.example.com/feed");

            let empty: ConvertQuery = serde_urlencoded::from_str("").unwrap();
            assert!(empty.rss_url.is_empty());
        }
    }
}
