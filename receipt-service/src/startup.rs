use crate::config::ReceiptConfig;
use crate::handlers;
use crate::services::{build_extractor, BillExtractor, BillRepository, ImageStore, IMAGES_URL_PREFIX};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ReceiptConfig,
    pub bills: BillRepository,
    pub images: ImageStore,
    pub extractor: Arc<dyn BillExtractor>,
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    /// Build with the extractor selected by `AI_SERVICE`.
    pub async fn build(config: ReceiptConfig) -> Result<Self, AppError> {
        let extractor = build_extractor(&config.extraction).map_err(|e| {
            tracing::error!("Failed to initialize extraction provider: {}", e);
            e
        })?;
        Self::build_with_extractor(config, extractor).await
    }

    pub async fn build_with_extractor(
        config: ReceiptConfig,
        extractor: Arc<dyn BillExtractor>,
    ) -> Result<Self, AppError> {
        let bills = BillRepository::connect(&config.database.url, config.database.max_connections)
            .await
            .map_err(|e| {
                tracing::error!("Failed to open bill database: {}", e);
                e
            })?;
        bills.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;

        let images = ImageStore::new(&config.storage.images_dir, config.storage.max_image_bytes)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to initialize image directory at {}: {}",
                    config.storage.images_dir,
                    e
                );
                e
            })?;

        let state = AppState {
            config: config.clone(),
            bills,
            images,
            extractor,
        };

        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            provider = state.extractor.name(),
            images_dir = %config.storage.images_dir,
            "Receipt service listening"
        );

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bills(&self) -> &BillRepository {
        &self.state.bills
    }

    pub fn images(&self) -> &ImageStore {
        &self.state.images
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_body_bytes;
    let images_dir = state.images.root().to_path_buf();

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/upload-image", post(handlers::upload_image))
        .route("/api/extract-bill", post(handlers::extract_bill))
        .route(
            "/api/bills",
            get(handlers::list_bills).post(handlers::save_bill),
        )
        .route(
            "/api/bills/:id",
            get(handlers::get_bill).delete(handlers::delete_bill),
        )
        .route(
            "/api/delete-image/:bill_id",
            delete(handlers::delete_orphan_image),
        )
        .route("/api/stats", get(handlers::bill_stats))
        .nest_service(IMAGES_URL_PREFIX, ServeDir::new(images_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
