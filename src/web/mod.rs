//! HTTP interface - routes, shared state and error responses.
//!
//! Public routes list items and serve documents; everything that mutates the
//! registry sits behind [`session::AdminSession`].

mod documents;
mod items;
mod prefixes;
pub mod session;
mod views;

use crate::{
    config::AppConfig,
    core::lifecycle::ItemManager,
    errors::{Error, Result},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use session::SessionStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Resolved application settings
    pub config: Arc<AppConfig>,
    /// Item lifecycle and registry access
    pub items: Arc<ItemManager>,
    /// Admin sessions
    pub sessions: SessionStore,
}

impl AppState {
    /// Bundles the configuration and item manager with a fresh session store.
    pub fn new(config: AppConfig, items: ItemManager) -> Self {
        let sessions = SessionStore::new(&config.session_secret, config.session_ttl, !config.debug);
        Self {
            config: Arc::new(config),
            items: Arc::new(items),
            sessions,
        }
    }
}

/// HTTP status for an error.
pub fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::Validation { .. } | Error::UnknownPrefix { .. } | Error::MalformedCode { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::DuplicateKey { .. } => StatusCode::CONFLICT,
        Error::Database(_) | Error::Storage(_) | Error::Config { .. } | Error::Render { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// User-facing text for a rejected request.
pub fn notice(err: &Error) -> String {
    match err {
        Error::Validation { message } => message.clone(),
        Error::NotFound { entity: "item", .. } => "Item not found".to_string(),
        Error::NotFound { .. } => "Prefix not found".to_string(),
        Error::UnknownPrefix { prefix } => format!("Prefix {prefix} is not registered"),
        Error::DuplicateKey { .. } => "That code is already taken, please retry".to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
            return (status, "Internal server error").into_response();
        }
        (status, notice(&self)).into_response()
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    let photos = ServeDir::new(&state.config.upload_dir);
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    let sessions = state.sessions.clone();

    Router::new()
        .route("/", get(items::index))
        .route("/login_admin", post(items::login))
        .route("/logout", get(items::logout))
        .route("/item/:code", get(items::item_detail))
        .route("/admin", get(items::admin_page).post(items::admin_submit))
        .route("/delete/:id", get(items::delete_item))
        .route("/delete_image/:id", get(items::delete_image))
        .route(
            "/admin_prefijos",
            get(prefixes::prefixes_page).post(prefixes::prefixes_submit),
        )
        .route("/delete_prefijo/:id", get(prefixes::delete_prefix))
        .route("/qr/:code", get(documents::tagged_code))
        .route("/responsiva/:code", get(documents::custody_receipt))
        .nest_service("/static/images", photos)
        .layer(body_limit)
        .layer(middleware::from_fn_with_state(sessions, session::track_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the application on the configured address until Ctrl-C.
///
/// # Errors
/// Returns `Error::Storage` if the listener cannot be bound.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Inventory registry listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        config::settings::FileConfig,
        core::{item as item_store, prefix as prefix_store},
        test_utils::*,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use tower::ServiceExt;

    const PASSWORD: &str = "correct horse";

    async fn test_state() -> Result<(AppState, Arc<RecordingPhotoStore>)> {
        let config = AppConfig::from_sources(FileConfig::default(), |key| match key {
            "INVENTORY_ADMIN_PASSWORD" => Some(PASSWORD.to_string()),
            "INVENTORY_SESSION_SECRET" => Some("s".repeat(32)),
            "INVENTORY_DEBUG" => Some("true".to_string()),
            _ => None,
        })?;
        let (manager, photos) = setup_manager().await?;
        prefix_store::register_prefix(manager.db(), "MON", "Monitores").await?;
        Ok((AppState::new(config, manager), photos))
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// `name=value` part of the response's session cookie.
    fn session_cookie(response: &Response) -> String {
        let raw = response.headers()[header::SET_COOKIE].to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn login(state: &AppState, password: &str) -> Response {
        build_router(state.clone())
            .oneshot(
                Request::post("/login_admin")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!("password={}", password.replace(' ', "+"))))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn admin_cookie(state: &AppState) -> String {
        let response = login(state, PASSWORD).await;
        assert_eq!(location(&response), "/admin");
        session_cookie(&response)
    }

    #[tokio::test]
    async fn test_anonymous_page_views_hold_no_session() -> Result<()> {
        let (state, _) = test_state().await?;
        state.items.create_item("MON", sample_fields(), None).await?;

        for _ in 0..50 {
            for uri in ["/", "/item/MON001", "/item/MON404", "/qr/MON001"] {
                let response = build_router(state.clone()).oneshot(get(uri, None)).await.unwrap();
                assert!(!response.headers().contains_key(header::SET_COOKIE), "{uri}");
            }
        }
        assert_eq!(state.sessions.active_sessions(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_cookie_without_notice_gets_no_session() -> Result<()> {
        let (state, _) = test_state().await?;
        let stale = format!("inventory_session={}", state.sessions.sign("gone"));

        let response = build_router(state.clone()).oneshot(get("/", Some(&stale))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::SET_COOKIE));
        assert_eq!(state.sessions.active_sessions(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_items_without_photo_render_no_placeholder_image() -> Result<()> {
        let (state, _) = test_state().await?;
        state.items.create_item("MON", sample_fields(), None).await?;
        let cookie = admin_cookie(&state).await;
        let placeholder = state.items.placeholder().to_string();

        for (uri, cookie) in [("/", None), ("/item/MON001", None), ("/admin", Some(cookie.as_str()))] {
            let page = build_router(state.clone()).oneshot(get(uri, cookie)).await.unwrap();
            assert_eq!(page.status(), StatusCode::OK, "{uri}");
            let body = body_text(page).await;
            assert!(body.contains("MON001"), "{uri}");
            assert!(!body.contains(&placeholder), "{uri}");
            assert!(body.contains("Sin foto"), "{uri}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_routes_redirect_anonymous_visitors() -> Result<()> {
        let (state, _) = test_state().await?;
        for uri in ["/admin", "/admin_prefijos", "/delete/1", "/delete_image/1", "/delete_prefijo/1"] {
            let response = build_router(state.clone()).oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&response), "/", "{uri}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_password_flashes_notice() -> Result<()> {
        let (state, _) = test_state().await?;
        let response = login(&state, "nope").await;
        assert_eq!(location(&response), "/");
        let cookie = session_cookie(&response);
        assert_eq!(state.sessions.active_sessions(), 1);

        let page = build_router(state.clone())
            .oneshot(get("/", Some(&cookie)))
            .await
            .unwrap();
        assert!(body_text(page).await.contains("Contraseña incorrecta"));

        let admin = build_router(state).oneshot(get("/admin", Some(&cookie))).await.unwrap();
        assert_eq!(admin.status(), StatusCode::SEE_OTHER);
        Ok(())
    }

    #[tokio::test]
    async fn test_login_then_logout() -> Result<()> {
        let (state, _) = test_state().await?;
        let cookie = admin_cookie(&state).await;

        let admin = build_router(state.clone())
            .oneshot(get("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::OK);
        assert!(body_text(admin).await.contains("MON - Monitores"));

        let out = build_router(state.clone())
            .oneshot(get("/logout", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&out), "/");

        let admin = build_router(state).oneshot(get("/admin", Some(&cookie))).await.unwrap();
        assert_eq!(admin.status(), StatusCode::SEE_OTHER);
        Ok(())
    }

    #[tokio::test]
    async fn test_forged_cookie_gets_fresh_session() -> Result<()> {
        let (state, _) = test_state().await?;
        let cookie = admin_cookie(&state).await;
        let forged = format!("{cookie}ff");

        let response = build_router(state.clone()).oneshot(get("/admin", Some(&forged))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_ne!(session_cookie(&response), cookie);
        // The admin session plus the one holding the access notice.
        assert_eq!(state.sessions.active_sessions(), 2);
        Ok(())
    }

    fn multipart_request(uri: &str, cookie: &str, fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Request<Body> {
        let boundary = "XINVENTORYBOUNDARY";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = photo {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::post(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_form_creates_and_updates_items() -> Result<()> {
        let (state, photos) = test_state().await?;
        let cookie = admin_cookie(&state).await;
        let fields = [
            ("prefix", "MON"),
            ("description", "Dell 24in"),
            ("identifier", ""),
            ("owner", "Ana"),
            ("department", "IT"),
            ("notes", ""),
        ];

        let response = build_router(state.clone())
            .oneshot(multipart_request("/admin", &cookie, &fields, Some(("foto.JPG", b"jpeg".as_slice()))))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin");

        let item = item_store::get_item_by_code(state.items.db(), "MON001").await?.unwrap();
        assert_eq!(item.photo, "MON001.jpg");
        assert_eq!(item.identifier, None);
        assert_eq!(photos.renamed().len(), 1);
        assert_eq!(photos.renamed()[0].1, "MON001.jpg");

        let id = item.id.to_string();
        let edit = [
            ("id", id.as_str()),
            ("description", "Dell 27in"),
            ("owner", "Luis"),
            ("department", "IT"),
        ];
        build_router(state.clone())
            .oneshot(multipart_request("/admin", &cookie, &edit, Some(("", b"".as_slice()))))
            .await
            .unwrap();

        let updated = item_store::get_item_by_id(state.items.db(), item.id).await?.unwrap();
        assert_eq!(updated.code, "MON001");
        assert_eq!(updated.owner, "Luis");
        assert_eq!(updated.photo, "MON001.jpg");
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_form_rejection_is_flashed() -> Result<()> {
        let (state, _) = test_state().await?;
        let cookie = admin_cookie(&state).await;
        let fields = [
            ("prefix", "ZZZ"),
            ("description", "Mesa"),
            ("owner", "Ana"),
            ("department", "IT"),
        ];

        let response = build_router(state.clone())
            .oneshot(multipart_request("/admin", &cookie, &fields, None))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin");

        let page = build_router(state.clone())
            .oneshot(get("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert!(body_text(page).await.contains("Prefix ZZZ is not registered"));
        assert!(item_store::get_all_items(state.items.db()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_prefix_form_registers_once() -> Result<()> {
        let (state, _) = test_state().await?;
        let cookie = admin_cookie(&state).await;

        for _ in 0..2 {
            let response = build_router(state.clone())
                .oneshot(
                    Request::post("/admin_prefijos")
                        .header(header::COOKIE, &cookie)
                        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(Body::from("prefix=nev&description=Neveras"))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(location(&response), "/admin_prefijos");
        }

        let tags: Vec<String> = prefix_store::list_prefixes(state.items.db())
            .await?
            .into_iter()
            .map(|p| p.prefix)
            .collect();
        assert_eq!(tags, vec!["MON", "NEV"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_item_documents_are_not_found() -> Result<()> {
        let (state, _) = test_state().await?;
        for uri in ["/item/MON404", "/qr/MON404", "/responsiva/MON404"] {
            let response = build_router(state.clone()).oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body_text(response).await, "Item not found");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_documents_download() -> Result<()> {
        let (state, _) = test_state().await?;
        state.items.create_item("MON", sample_fields(), None).await?;

        let qr = build_router(state.clone()).oneshot(get("/qr/MON001", None)).await.unwrap();
        assert_eq!(qr.status(), StatusCode::OK);
        assert_eq!(qr.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            qr.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"MON001.png\""
        );

        let pdf = build_router(state).oneshot(get("/responsiva/MON001", None)).await.unwrap();
        assert_eq!(pdf.status(), StatusCode::OK);
        assert_eq!(pdf.headers()[header::CONTENT_TYPE], "application/pdf");
        assert!(body_text(pdf).await.starts_with("%PDF"));
        Ok(())
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(status_of(&Error::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&Error::item_not_found(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(&Error::DuplicateKey { message: String::new() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&Error::Render { message: String::new() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
