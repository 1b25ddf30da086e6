mod identity;
mod papers;
mod reviews;
mod users;

pub use identity::Requester;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/users", post(users::register))
        .route("/users/me", get(users::me))
        .route("/users/:id", get(users::get_user))
        .route("/papers", get(papers::list_papers).post(papers::create_paper))
        .route("/papers/mine", get(papers::my_papers))
        .route(
            "/papers/:id",
            get(papers::get_paper)
                .put(papers::update_paper)
                .delete(papers::delete_paper),
        )
        .route("/papers/:id/submit", post(papers::submit_paper))
        .route("/papers/:id/reviews", get(reviews::paper_reviews))
        .route("/papers/:id/score", get(reviews::paper_score))
        .route("/papers/:id/eligibility", get(reviews::eligibility))
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/mine", get(reviews::my_reviews))
        .route("/reviews/pending", get(reviews::pending_reviews))
        .route(
            "/reviews/:id",
            get(reviews::get_review)
                .put(reviews::update_review)
                .delete(reviews::delete_review),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "refereed",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.config.storage.as_str(),
    }))
}

async fn not_found() -> AppError {
    AppError::NotFound("Route".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageBackend};
    use super::identity::USER_ID_HEADER;
    use crate::db::Repositories;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const ABSTRACT: &str = "We study how reviewers converge on a verdict when several independent reports disagree.";

    fn test_router() -> Router {
        let config = Arc::new(Config {
            database_url: String::new(),
            max_connections: 1,
            storage: StorageBackend::Memory,
            host: "127.0.0.1".into(),
            port: 0,
        });
        let state = Arc::new(AppState::new(config, Repositories::in_memory()));
        router(state)
    }

    /// Sends a request and returns (status, parsed JSON body). Empty bodies
    /// come back as `Value::Null`.
    async fn send(
        router: &Router,
        method: &str,
        path: &str,
        user: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(path);
        if let Some(id) = user {
            req = req.header(USER_ID_HEADER, id.to_string());
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(router: &Router, email: &str, role: &str) -> i64 {
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/users",
            None,
            Some(json!({ "email": email, "name": "Test User", "role": role })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    async fn create_paper(router: &Router, owner: i64, title: &str) -> i64 {
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/papers",
            Some(owner),
            Some(json!({
                "title": title,
                "abstract": ABSTRACT,
                "authors": ["A. Author"],
                "keywords": ["peer review"],
                "category": "methods",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    async fn submitted_paper(router: &Router, owner: i64) -> i64 {
        let id = create_paper(router, owner, "Consensus among referees").await;
        let (status, _) = send(
            router,
            "POST",
            &format!("/api/v1/papers/{}/submit", id),
            Some(owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    fn review_body(paper_id: i64, score: i64, recommendation: &str) -> Value {
        json!({
            "paper_id": paper_id,
            "comment": "Solid methodology, the evaluation could be broader.",
            "score": score,
            "recommendation": recommendation,
        })
    }

    #[tokio::test]
    async fn health_reports_storage_backend() {
        let app = test_router();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn unknown_route_uses_error_envelope() {
        let app = test_router();
        let (status, body) = send(&app, "GET", "/api/v1/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn register_and_read_back_identity() {
        let app = test_router();
        let id = register(&app, "Ada@Example.org", "researcher").await;

        let (status, body) = send(&app, "GET", "/api/v1/users/me", Some(id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["email"], "ada@example.org");
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let app = test_router();
        register(&app, "ada@example.org", "researcher").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/users",
            None,
            Some(json!({ "email": "ada@example.org", "name": "Ada again" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn missing_identity_is_unauthenticated() {
        let app = test_router();
        let (status, body) = send(&app, "GET", "/api/v1/papers/mine", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

        let (status, _) = send(&app, "GET", "/api/v1/papers/mine", Some(999), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_paper_reports_field_errors() {
        let app = test_router();
        let owner = register(&app, "ada@example.org", "researcher").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/papers",
            Some(owner),
            Some(json!({
                "title": "Hi",
                "abstract": "too short",
                "authors": [],
                "category": "methods",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        let fields: Vec<&str> = body["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"title"));
        assert!(fields.contains(&"abstract"));
        assert!(fields.contains(&"authors"));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = test_router();
        let owner = register(&app, "ada@example.org", "researcher").await;
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/papers")
            .header(USER_ID_HEADER, owner.to_string())
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request() {
        let app = test_router();
        let user = register(&app, "ada@example.org", "researcher").await;
        let (status, body) = send(&app, "GET", "/api/v1/papers/abc", Some(user), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn full_review_flow() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let reviewer = register(&app, "reviewer@example.org", "reviewer").await;
        let paper = submitted_paper(&app, author).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/papers/{}/eligibility", paper),
            Some(reviewer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["eligible"], true);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/reviews",
            Some(reviewer),
            Some(review_body(paper, 8, "accept")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["score"], 8);
        assert_eq!(body["data"]["metadata"]["review_type"], "peer_review");

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/v1/papers/{}", paper),
            Some(reviewer),
            None,
        )
        .await;
        assert_eq!(body["data"]["status"], "under_review");
        assert_eq!(body["data"]["reviews"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["owner"]["id"], author);

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/v1/papers/{}/score", paper),
            Some(reviewer),
            None,
        )
        .await;
        assert_eq!(body["data"]["average_score"], 8.0);

        let (_, body) = send(&app, "GET", "/api/v1/reviews/pending", Some(reviewer), None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
        assert_eq!(body["meta"]["pagination"]["page"], 1);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/reviews",
            Some(reviewer),
            Some(review_body(paper, 5, "revision")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn authors_cannot_review_their_own_paper() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let paper = submitted_paper(&app, author).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/reviews",
            Some(author),
            Some(review_body(paper, 9, "accept")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn draft_papers_are_not_reviewable() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let reviewer = register(&app, "reviewer@example.org", "reviewer").await;
        let paper = create_paper(&app, author, "Still in draft form").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/reviews",
            Some(reviewer),
            Some(review_body(paper, 6, "revision")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn only_owner_may_submit_or_delete() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let other = register(&app, "other@example.org", "researcher").await;
        let paper = create_paper(&app, author, "Ownership matters here").await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/papers/{}/submit", paper),
            Some(other),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/api/v1/papers/{}", paper),
            Some(author),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/papers/{}", paper),
            Some(author),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_search() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        create_paper(&app, author, "Graph neural networks revisited").await;
        submitted_paper(&app, author).await;

        let (_, body) = send(&app, "GET", "/api/v1/papers?status=submitted", Some(author), None).await;
        let papers = body["data"].as_array().unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0]["status"], "submitted");

        let (_, body) = send(&app, "GET", "/api/v1/papers?search=GRAPH", Some(author), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, "GET", "/api/v1/papers?limit=1&page=2", Some(author), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["meta"]["pagination"]["page_size"], 1);

        let (status, body) = send(&app, "GET", "/api/v1/papers?status=archived", Some(author), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"][0]["field"], "status");
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let paper = create_paper(&app, author, "Original working title").await;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/papers/{}", paper),
            Some(author),
            Some(json!({ "title": "Revised working title" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Revised working title");
        assert_eq!(body["data"]["abstract"], ABSTRACT);
        assert_eq!(body["data"]["status"], "draft");
    }

    #[tokio::test]
    async fn unparseable_paging_falls_back_to_defaults() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        create_paper(&app, author, "Paging with bad input").await;

        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/papers?page=-1&limit=abc",
            Some(author),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["pagination"]["page"], 1);
        assert_eq!(body["meta"]["pagination"]["page_size"], 10);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_update_values_are_ignored() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let paper = create_paper(&app, author, "Original working title").await;
        let abstract_text = "An updated abstract that is comfortably past fifty characters.";

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/papers/{}", paper),
            Some(author),
            Some(json!({
                "title": "",
                "category": "",
                "keywords": [],
                "abstract": abstract_text,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["abstract"], abstract_text);
        assert_eq!(body["data"]["title"], "Original working title");
        assert_eq!(body["data"]["category"], "methods");
        assert_eq!(body["data"]["keywords"], json!(["peer review"]));
    }

    #[tokio::test]
    async fn paper_and_review_reads_require_identity() {
        let app = test_router();
        let author = register(&app, "author@example.org", "researcher").await;
        let paper = create_paper(&app, author, "Visible to members only").await;

        for path in [
            "/api/v1/papers".to_string(),
            format!("/api/v1/papers/{}", paper),
            format!("/api/v1/papers/{}/reviews", paper),
            format!("/api/v1/papers/{}/score", paper),
            "/api/v1/reviews/1".to_string(),
        ] {
            let (status, body) = send(&app, "GET", &path, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
            assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
        }

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/papers/{}/reviews", paper),
            Some(author),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
