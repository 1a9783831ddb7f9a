//! WebFS server binary.
//!
//! Exposes the host filesystem over HTTP: directory listings with sorting,
//! ranged and compressed file streaming, and basic mutations. The main entry
//! point builds the Axum router from the CLI configuration and serves it
//! until a termination signal arrives.

mod config;
mod envelope;
mod error;
mod files;
mod http;
mod listing;
mod logging;
mod mutation;
mod resolver;
mod sort;
mod streaming;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::response::Redirect;
use axum::routing::{MethodRouter, get, post};
use axum::{Router, middleware};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::{Args, ServerConfig};
use crate::http::{build_cors_layer, client_ip};
use crate::resolver::PathResolver;

/// Starts the WebFS server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let config = Arc::new(Args::parse().into_config());
    let resolver = Arc::new(PathResolver::new());

    let host = config
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, config.port);
    let app = build_router(config.clone(), resolver);

    let listener = TcpListener::bind(addr).await?;
    info!(
        prefix = config.prefix.as_str(),
        first_dir = config.first_dir.as_str(),
        "🚀 Listening on {}",
        addr
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

/// Builds the full router, nested under the configured prefix.
fn build_router(config: Arc<ServerConfig>, resolver: Arc<PathResolver>) -> Router {
    let body_limit = match config.upload_max_size {
        0 => DefaultBodyLimit::disable(),
        limit => DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX)),
    };

    let routes = Router::new()
        .route("/", redirect_to(config.route("/fs/")))
        .route("/fs", redirect_to(config.route("/fs/")))
        .route("/fs/", redirect_to(config.route("/fs/list/")))
        .route("/fs/list", redirect_to(config.route("/fs/list/")))
        .route("/fs/list/", get(files::index))
        .route("/fs/list/{*path}", get(files::simple_list))
        .route("/fs/listup/{*path}", get(files::list_up))
        // `/fs/list/<orderBy>/<isAsc>/<path>` clashes with the catch-all above;
        // web clients must request sorted listings under `/fs/listby/` instead.
        .route(
            "/fs/listby/{order_by}/{is_asc}/{*path}",
            get(files::sorted_list),
        )
        .route("/fs/mkdirs/{*path}", post(files::make_dirs))
        .route(
            "/fs/delete/{*path}",
            get(files::remove).post(files::remove).delete(files::remove),
        )
        .route("/fs/rename/{*path}", post(files::rename))
        .route("/fs/info/{*path}", get(files::info))
        .route("/fs/download/{*path}", get(files::download))
        .route("/fs/view/{*path}", get(files::view))
        .route("/fs/onedit/{*path}", get(files::on_edit))
        .route(
            "/fs/save/{*path}",
            post(files::save).layer(body_limit.clone()),
        )
        .route("/fs/upload/{*path}", post(files::upload).layer(body_limit));

    let mut app = if config.prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&config.prefix, routes)
    };

    app = app
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = client_ip(request.headers(), connect_ip);

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(resolver))
        .layer(Extension(config.clone()));

    if let Some(cors_layer) = build_cors_layer(config.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }
    app
}

fn redirect_to(location: String) -> MethodRouter {
    get(move || async move { Redirect::to(&location) })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
}
