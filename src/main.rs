use clap::Parser;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use fault_inspector::{
    adapters::{
        backend::fault_client::HttpFaultClient,
        http::{router, state::HttpState},
        memory::session_store::InMemorySessionStore,
        onnx::{detector::OnnxDetector, model_catalog::OnnxModelCatalog},
        render::annotate::BoxAnnotator,
        video::ffmpeg::FfmpegVideoCodec,
    },
    application::{
        ports::{AnnotatorPort, FaultSinkPort},
        services::{DetectionService, DetectionSettings, ReportService, SessionService},
    },
    config::AppConfig,
    domain::model::ClassNames,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logs (RUST_LOG=info by default)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = AppConfig::parse();
    cfg.validate()?;

    tracing::info!("🔧 Initializing adapters...");

    // 2. Model: a bad model file is reported, the server still starts.
    let model_id = cfg.model_id();
    let catalog = OnnxModelCatalog::new();
    let fallback_names = match &cfg.labels {
        Some(path) => ClassNames::from_lines(&std::fs::read_to_string(path)?),
        None => ClassNames::default(),
    };
    let detector = Arc::new(OnnxDetector::load(model_id.clone(), fallback_names));

    let annotator: Arc<dyn AnnotatorPort> = match &cfg.font {
        Some(path) => Arc::new(BoxAnnotator::from_font_file(path)?),
        None => Arc::new(BoxAnnotator::new(None)),
    };
    let video = Arc::new(FfmpegVideoCodec::new(cfg.ffmpeg.clone(), cfg.ffprobe.clone()));
    let store = Arc::new(InMemorySessionStore::new());

    let sink: Option<Arc<dyn FaultSinkPort>> = cfg.backend_url().map(|url| {
        tracing::info!("📡 Fault backend: {}", url);
        Arc::new(HttpFaultClient::new(url, std::time::Duration::from_secs(cfg.backend_timeout_secs)))
            as Arc<dyn FaultSinkPort>
    });

    // 3. Services (use cases)
    let output_dir = cfg.output_dir();
    tokio::fs::create_dir_all(&output_dir).await?;

    let sessions = Arc::new(SessionService::new(store.clone(), cfg.conf));
    let detection = Arc::new(DetectionService::new(
        detector,
        annotator,
        video,
        store,
        ReportService::new(sink),
        DetectionSettings {
            model: model_id,
            params: cfg.yolo_params(),
            output_dir,
            public_url: cfg.public_url.clone(),
        },
    ));

    if let Err(e) = detection.validate_model(&catalog).await {
        tracing::error!("⚠️ Model check failed: {}", e);
    }
    if !detection.model_loaded() {
        tracing::warn!("⚠️ Failed to load the model; uploads will be rejected until it is fixed");
    }

    // Idle sessions (closed tabs) are dropped together with their videos.
    let sweeper = sessions.clone();
    let ttl = cfg.session_ttl();
    let mut ticker = tokio::time::interval(cfg.sweep_interval());
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_idle(ttl).await {
                tracing::warn!("⚠️ Session sweep failed: {}", e);
            }
        }
    });

    // 4. HTTP state, router and static page
    let state = HttpState {
        sessions,
        detection,
        max_upload_bytes: cfg.max_upload_bytes(),
    };
    let app = router(state).fallback_service(ServeDir::new(&cfg.static_dir));

    // 5. Serve
    tracing::info!("🚀 Fault inspector listening on http://{}", cfg.bind);
    tracing::info!("📂 Static files served from {}", cfg.static_dir.display());

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
