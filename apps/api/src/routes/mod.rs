pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

use crate::admin::handlers as admin;
use crate::ocr::handlers as ocr;
use crate::recommendation::handlers as recommendation;
use crate::records::handlers as records;
use crate::session::handlers as auth;
use crate::state::AppState;
use crate::storage::MAX_IMAGE_BYTES;
use crate::wizard::handlers as wizard;

/// Image limit plus room for the other multipart fields.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Sign-in
        .route("/api/v1/auth/sign-in", post(auth::handle_sign_in))
        .route("/api/v1/auth/password", put(auth::handle_update_password))
        // Profile and records
        .route("/api/v1/me", get(records::handle_me))
        .route("/api/v1/profile", put(records::handle_update_profile))
        .route(
            "/api/v1/records",
            get(records::handle_list_records).post(records::handle_create_record),
        )
        .route("/api/v1/portfolio", get(records::handle_portfolio))
        // Registration wizard
        .route("/api/v1/wizard", post(wizard::handle_start_wizard))
        .route("/api/v1/wizard/:id", get(wizard::handle_get_wizard))
        .route("/api/v1/wizard/:id/continue", post(wizard::handle_continue))
        .route("/api/v1/wizard/:id/back", post(wizard::handle_back))
        .route("/api/v1/wizard/:id/skip", post(wizard::handle_skip))
        .route(
            "/api/v1/wizard/:id/report/score",
            put(wizard::handle_set_score),
        )
        .route(
            "/api/v1/wizard/:id/report/subjects",
            post(wizard::handle_add_subject).delete(wizard::handle_remove_subject),
        )
        .route(
            "/api/v1/wizard/:id/report/ocr",
            post(wizard::handle_report_ocr),
        )
        .route(
            "/api/v1/wizard/:id/achievements",
            post(wizard::handle_add_achievement),
        )
        .route(
            "/api/v1/wizard/:id/achievements/:index",
            delete(wizard::handle_remove_achievement),
        )
        // OCR and recommendation
        .route("/api/v1/ocr", post(ocr::handle_ocr))
        .route(
            "/api/v1/recommendation",
            get(recommendation::handle_get_recommendation),
        )
        .route(
            "/api/v1/recommendation/refresh",
            post(recommendation::handle_refresh_recommendation),
        )
        // Admin
        .route("/api/v1/admin/register", post(admin::handle_register_admin))
        .route("/api/v1/admin/students", get(admin::handle_list_students))
        .route("/api/v1/admin/editor/edit", post(admin::handle_begin_edit))
        .route(
            "/api/v1/admin/editor/scratch",
            put(admin::handle_update_scratch),
        )
        .route("/api/v1/admin/editor/save", post(admin::handle_save_edit))
        .route("/api/v1/admin/editor/cancel", post(admin::handle_cancel_edit))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::data::DataService;
    use crate::models::profile::Track;
    use crate::testing::{
        admin_profile, student_profile, test_state, FakeIdentity, InMemoryData, ADMIN_SECRET,
    };

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        json: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match json {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn call(router: Router, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(router, method, uri, token, None).await
    }

    #[tokio::test]
    async fn test_health_counts_wizards() {
        let router = build_router(test_state(Arc::default(), FakeIdentity::default()));

        let (status, body) = call(router.clone(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_wizards"], 0);

        let (status, body) = call(router.clone(), "POST", "/api/v1/wizard", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["wizard"]["step"], "account");
        assert_eq!(body["wizard"]["total"], 6);

        let (_, body) = call(router, "GET", "/health", None).await;
        assert_eq!(body["active_wizards"], 1);
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_token() {
        let router = build_router(test_state(Arc::default(), FakeIdentity::default()));
        let (status, body) = call(router.clone(), "GET", "/api/v1/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = call(router, "GET", "/api/v1/me", Some("unknown")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_roster_is_admin_only() {
        let data = Arc::new(InMemoryData::default());
        let (student_id, admin_id) = (Uuid::new_v4(), Uuid::new_v4());
        data.upsert_profile(&student_profile(student_id, Track::Science))
            .await
            .unwrap();
        data.upsert_profile(&admin_profile(admin_id, "SMA Negeri 1"))
            .await
            .unwrap();
        let identity = FakeIdentity::default()
            .with_token("student", student_id, "budi@example.com")
            .with_token("admin", admin_id, "guru@example.com");
        let router = build_router(test_state(data, identity));

        let (status, _) = call(router.clone(), "GET", "/api/v1/admin/students", Some("student")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(router, "GET", "/api/v1/admin/students", Some("admin")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["school_name"], "SMA Negeri 1");
        assert_eq!(body["students"][0]["student"]["id"], student_id.to_string());
    }

    #[tokio::test]
    async fn test_account_step_waits_for_email_confirmation() {
        let identity =
            FakeIdentity::default().with_token("taken", Uuid::new_v4(), "budi@example.com");
        let router = build_router(test_state(Arc::default(), identity));
        let (_, started) = call(router.clone(), "POST", "/api/v1/wizard", None).await;
        let uri = format!("/api/v1/wizard/{}/continue", started["id"].as_str().unwrap());

        let (status, body) = send(
            router.clone(),
            "POST",
            &uri,
            None,
            Some(json!({"step": "account", "email": "budi@example.com", "password": "rahasia"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "User already registered");

        let (status, body) = send(
            router,
            "POST",
            &uri,
            None,
            Some(json!({"step": "account", "email": "citra@example.com", "password": "rahasia"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "confirm_email");
        assert_eq!(body["wizard"]["step"], "account");
    }

    #[tokio::test]
    async fn test_admin_registration_needs_the_secret() {
        let data = Arc::new(InMemoryData::default());
        let identity =
            FakeIdentity::default().with_token("guru", Uuid::new_v4(), "guru@example.com");
        let router = build_router(test_state(data, identity));
        let uri = "/api/v1/admin/register";

        let (status, body) = send(
            router.clone(),
            "POST",
            uri,
            Some("guru"),
            Some(json!({"school_name": "SMA Negeri 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = send(
            router.clone(),
            "POST",
            uri,
            Some("guru"),
            Some(json!({"school_name": "SMA Negeri 1", "registration_password": "tebakan"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            router.clone(),
            "POST",
            uri,
            Some("guru"),
            Some(json!({"school_name": "a", "registration_password": ADMIN_SECRET})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            router.clone(),
            "POST",
            uri,
            Some("guru"),
            Some(json!({"school_name": "SMA Negeri 1", "registration_password": ADMIN_SECRET})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["school_name"], "SMA Negeri 1");
        assert_eq!(body["user_type"], "admin");

        let (status, body) = send(
            router,
            "POST",
            uri,
            Some("guru"),
            Some(json!({"school_name": "SMA Negeri 2", "registration_password": ADMIN_SECRET})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_students_cannot_register_as_admin() {
        let data = Arc::new(InMemoryData::default());
        let student_id = Uuid::new_v4();
        data.upsert_profile(&student_profile(student_id, Track::Science))
            .await
            .unwrap();
        let identity =
            FakeIdentity::default().with_token("student", student_id, "budi@example.com");
        let router = build_router(test_state(data.clone(), identity));

        let (status, _) = send(
            router,
            "POST",
            "/api/v1/admin/register",
            Some("student"),
            Some(json!({"school_name": "SMA Negeri 1", "registration_password": ADMIN_SECRET})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let profile = data.get_profile(student_id).await.unwrap().unwrap();
        assert!(!profile.is_admin());
    }

    #[tokio::test]
    async fn test_sign_in_then_change_password() {
        let identity =
            FakeIdentity::default().with_account("budi@example.com", "rahasia", Uuid::new_v4());
        let identity = Arc::new(identity);
        let mut state = test_state(Arc::default(), FakeIdentity::default());
        state.identity = identity.clone();
        let router = build_router(state);

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/v1/auth/sign-in",
            None,
            Some(json!({"email": "budi@example.com", "password": "salah"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid login credentials");

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/v1/auth/sign-in",
            None,
            Some(json!({"email": " budi@example.com ", "password": "rahasia"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identity"]["email"], "budi@example.com");
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) = send(
            router.clone(),
            "PUT",
            "/api/v1/auth/password",
            Some(&token),
            Some(json!({"password": "baru123", "confirm_password": "baru124"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Passwords do not match");

        let (status, _) = send(
            router.clone(),
            "PUT",
            "/api/v1/auth/password",
            None,
            Some(json!({"password": "baru123", "confirm_password": "baru123"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            router,
            "PUT",
            "/api/v1/auth/password",
            Some(&token),
            Some(json!({"password": "baru123", "confirm_password": "baru123"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(identity.password_of("budi@example.com").as_deref(), Some("baru123"));
    }

    #[tokio::test]
    async fn test_wizard_start_refused_when_store_full() {
        let mut state = test_state(Arc::default(), FakeIdentity::default());
        state.wizards = crate::wizard::store::WizardStore::with_capacity(1);
        let router = build_router(state);

        let (status, _) = call(router.clone(), "POST", "/api/v1/wizard", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(router, "POST", "/api/v1/wizard", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "BUSY");
    }
}
