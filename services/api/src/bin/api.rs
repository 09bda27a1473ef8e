//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{tts::parse_voice, DbAdapter, OpenAiSstAdapter, OpenAiTtsAdapter},
    config::{Config, ConfigError},
    error::ApiError,
    web::{
        auth::{
            bootstrap_admin, create_user_handler, login_handler, logout_handler, me_handler,
        },
        contact::whatsapp_link_handler,
        documents::{
            issue_token_handler, list_reviews_handler, list_versions_handler,
            partner_documents_handler, partnership_documents_handler, redeem_token_handler,
            review_document_handler, unlock_document_handler, upload_version_handler,
        },
        middleware::require_auth,
        orders::{
            add_measurement_handler, assign_tailor_handler, create_order_handler,
            get_order_handler, list_customers_handler, list_measurements_handler,
            list_orders_handler, request_order_handler, tailor_orders_handler,
            tailor_status_handler, update_status_handler,
        },
        partners::{
            apply_handler, approve_partnership_handler, generate_credentials_handler,
            list_partnerships_handler, reject_partnership_handler,
        },
        rest::{health_handler, ApiDoc},
        speech::{synthesize_handler, transcribe_handler},
        state::AppState,
    },
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_lazy(&config.database_url)?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    db_adapter
        .ping_with_backoff(config.db_connect_attempts, Duration::from_millis(500))
        .await?;
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    match &config.bootstrap_admin {
        Some(admin) => bootstrap_admin(db_adapter.as_ref(), admin).await?,
        None => info!("ADMIN_USERNAME not set; skipping administrator bootstrap"),
    }

    // --- 3. Build the Shared AppState ---
    let mut app_state = AppState::new(db_adapter, config.clone());

    // --- 4. Initialize Speech Adapters (optional) ---
    match &config.openai_api_key {
        Some(api_key) => {
            let voice = parse_voice(&config.tts_voice).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TTS_VOICE".to_string(),
                    format!("'{}' is not a known voice", config.tts_voice),
                )
            })?;
            let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            let sst_adapter = Arc::new(OpenAiSstAdapter::new(
                openai_client.clone(),
                config.stt_model.clone(),
            ));
            let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
                openai_client,
                SpeechModel::Tts1Hd,
                voice,
            ));
            app_state = app_state.with_speech(sst_adapter, tts_adapter);
        }
        None => warn!("OPENAI_API_KEY not set; speech endpoints will answer 503"),
    }
    let app_state = Arc::new(app_state);

    // --- 5. CORS ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/partnerships/apply", post(apply_handler))
        .route("/orders/request", post(request_order_handler))
        .route("/contact/whatsapp", get(whatsapp_link_handler))
        .route("/documents/access/{token}", get(redeem_token_handler));

    // Protected routes (auth required, roles checked per handler)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        // Administration
        .route("/admin/users", post(create_user_handler))
        .route("/admin/partnerships", get(list_partnerships_handler))
        .route("/admin/partnerships/{id}/approve", post(approve_partnership_handler))
        .route("/admin/partnerships/{id}/reject", post(reject_partnership_handler))
        .route(
            "/admin/partnerships/{id}/credentials",
            post(generate_credentials_handler),
        )
        .route(
            "/admin/partnerships/{id}/documents",
            get(partnership_documents_handler),
        )
        .route("/admin/documents/{id}/review", post(review_document_handler))
        .route("/admin/documents/{id}/unlock", post(unlock_document_handler))
        // Partner dashboard
        .route("/partner/documents", get(partner_documents_handler))
        .route(
            "/partner/documents/{id}/versions",
            post(upload_version_handler),
        )
        // Shared document history and access
        .route("/documents/{id}/versions", get(list_versions_handler))
        .route("/documents/{id}/reviews", get(list_reviews_handler))
        .route("/documents/{id}/access-tokens", post(issue_token_handler))
        // Orders
        .route("/orders", get(list_orders_handler).post(create_order_handler))
        .route("/orders/{id}", get(get_order_handler))
        .route("/orders/{id}/status", post(update_status_handler))
        .route("/orders/{id}/assign", post(assign_tailor_handler))
        .route("/customers", get(list_customers_handler))
        .route(
            "/customers/{id}/measurements",
            get(list_measurements_handler).post(add_measurement_handler),
        )
        .route("/tailor/orders", get(tailor_orders_handler))
        .route("/tailor/orders/{id}/status", post(tailor_status_handler))
        // Speech
        .route("/speech/synthesize", post(synthesize_handler))
        .route("/speech/transcribe", post(transcribe_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
