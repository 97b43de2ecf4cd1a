mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use reel_api::auth::{AppState, AppStateInner};
use reel_api::ingest::{IngestConfig, VideoIngestionPipeline};
use reel_api::media::MediaStore;
use reel_api::routes;
use reel_api::thumbnail::ThumbnailExtractor;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reel=debug,reel_api=debug,tower_http=debug".into()),
        )
        .init();

    let db = Arc::new(reel_db::Database::open(&config.db_path)?);
    let media = MediaStore::new(config.media_root.clone()).await?;
    let pipeline = VideoIngestionPipeline::new(
        db.clone(),
        media,
        ThumbnailExtractor::new(config.ffmpeg_path.clone(), config.thumbnail_timeout),
        IngestConfig {
            public_url: config.public_url.clone(),
            feed_page_size: config.feed_page_size,
        },
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        pipeline,
    });

    let app = routes::router(state, config.max_upload_bytes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address().parse()?;
    info!("Reel server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
