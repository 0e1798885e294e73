use chrono::Utc;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{
    application::ports::{
        AnnotatorPort, DetectorPort, FaultSinkPort, ModelCatalogPort, SessionStorePort, VideoCodecPort,
    },
    domain::{
        detection::{summarize_detections, Detection},
        errors::{DomainError, DomainResult},
        fault::{FaultReport, NotifyOutcome},
        model::{ModelId, YoloParams},
        session::{InputMode, SessionId, SessionView},
    },
};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];
pub const PROCESSED_VIDEO_NAME: &str = "processed_video.mp4";

/// Runs blocking work (image codecs, file I/O) off the async executor.
async fn blocking<T, F>(f: F) -> DomainResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DomainResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::OperationFailed(format!("worker task failed: {e}")))?
}

/// Decodes an uploaded jpg/jpeg/png into RGB.
pub fn decode_upload(bytes: &[u8]) -> DomainResult<RgbImage> {
    if bytes.is_empty() {
        return Err(DomainError::InvalidInput("empty upload".into()));
    }
    let format = image::guess_format(bytes)
        .map_err(|_| DomainError::InvalidInput("unrecognized image format".into()))?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(DomainError::InvalidInput(format!(
            "unsupported image format {format:?}; expected one of {}",
            IMAGE_EXTENSIONS.join(", ")
        )));
    }
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DomainError::InvalidInput(format!("cannot decode image: {e}")))?;
    Ok(img.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> DomainResult<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| DomainError::OperationFailed(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

/// Normalizes and checks a video file extension.
pub fn video_extension(filename: &str) -> DomainResult<String> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(DomainError::InvalidInput(format!(
            "unsupported video type '{filename}'; expected one of {}",
            VIDEO_EXTENSIONS.join(", ")
        )))
    }
}

/// Deletes a processed video and, once empty, its per-session directory.
async fn remove_video(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not remove processed video {}: {}", path.display(), e);
    }
    if let Some(dir) = path.parent() {
        let _ = tokio::fs::remove_dir(dir).await;
    }
}

/// Session bookkeeping: input type selection, confidence and reset.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStorePort>,
    default_confidence: f32,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStorePort>, default_confidence: f32) -> Self {
        Self { store, default_confidence }
    }

    pub fn create(&self) -> DomainResult<SessionView> {
        let session = self.store.create(self.default_confidence)?;
        info!("Session {} created", session.id);
        Ok(session.snapshot())
    }

    pub fn view(&self, id: SessionId) -> DomainResult<SessionView> {
        Ok(self.store.get(id)?.snapshot())
    }

    pub fn select_mode(&self, id: SessionId, mode: InputMode) -> DomainResult<SessionView> {
        let session = self.store.update(id, &mut |s| s.select_mode(mode))?;
        Ok(session.snapshot())
    }

    pub fn set_confidence(&self, id: SessionId, confidence: f32) -> DomainResult<SessionView> {
        let session = self.store.update(id, &mut |s| s.set_confidence(confidence))?;
        Ok(session.snapshot())
    }

    /// "Choose a different input type": drops results and removes the stored video.
    pub async fn reset(&self, id: SessionId) -> DomainResult<SessionView> {
        let mut stale_video: Option<PathBuf> = None;
        let session = self.store.update(id, &mut |s| {
            stale_video = s.reset();
            Ok(())
        })?;

        if let Some(path) = stale_video {
            remove_video(&path).await;
        }
        Ok(session.snapshot())
    }

    /// Drops the session entirely, removing its stored video.
    pub async fn close(&self, id: SessionId) -> DomainResult<()> {
        let session = self.store.remove(id)?;
        if let Some(path) = session.processed_video() {
            remove_video(path).await;
        }
        info!("Session {} closed", id);
        Ok(())
    }

    /// Closes every session idle for at least `ttl`; returns how many were dropped.
    pub async fn sweep_idle(&self, ttl: Duration) -> DomainResult<usize> {
        let mut closed = 0;
        for id in self.store.idle_sessions(ttl)? {
            match self.close(id).await {
                Ok(()) => closed += 1,
                // Closed concurrently by its page.
                Err(DomainError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if closed > 0 {
            info!("Expired {} idle session(s)", closed);
        }
        Ok(closed)
    }

    pub fn processed_image(&self, id: SessionId) -> DomainResult<Vec<u8>> {
        let session = self.store.get(id)?;
        session
            .processed_image()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| DomainError::NotFound(format!("no processed image for session {id}")))
    }

    pub fn processed_video(&self, id: SessionId) -> DomainResult<PathBuf> {
        let session = self.store.get(id)?;
        session
            .processed_video()
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("no processed video for session {id}")))
    }
}

/// Forwards fault records to the external backend, if one is configured.
#[derive(Clone)]
pub struct ReportService {
    sink: Option<Arc<dyn FaultSinkPort>>,
}

impl ReportService {
    pub fn new(sink: Option<Arc<dyn FaultSinkPort>>) -> Self {
        Self { sink }
    }

    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    /// Single attempt; failures become an outcome for the page, never an error.
    pub async fn notify(&self, report: &FaultReport) -> NotifyOutcome {
        let Some(sink) = &self.sink else {
            return NotifyOutcome::Skipped { reason: "backend not configured".into() };
        };
        match sink.submit(report).await {
            Ok(http_status) => {
                info!(
                    "Fault sent: product={} type={} conf={:.2}",
                    report.product_id, report.fault_type, report.confidence
                );
                NotifyOutcome::Sent { http_status }
            }
            Err(e) => {
                warn!("Fault notification failed: {}", e);
                NotifyOutcome::Failed { message: e.to_string() }
            }
        }
    }

    pub async fn fetch_fault(&self, id: &str) -> DomainResult<serde_json::Value> {
        match &self.sink {
            Some(sink) => sink.fetch(id).await,
            None => Err(DomainError::Backend("backend not configured".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictOutput {
    pub detections: Vec<Detection>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub detections: Vec<Detection>,
    pub elapsed: Duration,
    pub png: Vec<u8>,
    pub notification: Option<NotifyOutcome>,
}

#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub detection_count: usize,
    pub total_detections: usize,
    pub frames: usize,
    pub fps: f32,
    pub elapsed: Duration,
    pub output: PathBuf,
}

/// Settings shared by every detection request.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub model: ModelId,
    pub params: YoloParams,
    pub output_dir: PathBuf,
    pub public_url: String,
}

/// Orchestrates upload → model → plot → session update → optional notification.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn DetectorPort>,
    annotator: Arc<dyn AnnotatorPort>,
    video: Arc<dyn VideoCodecPort>,
    store: Arc<dyn SessionStorePort>,
    reports: ReportService,
    settings: DetectionSettings,
}

impl DetectionService {
    pub fn new(
        detector: Arc<dyn DetectorPort>,
        annotator: Arc<dyn AnnotatorPort>,
        video: Arc<dyn VideoCodecPort>,
        store: Arc<dyn SessionStorePort>,
        reports: ReportService,
        settings: DetectionSettings,
    ) -> Self {
        Self { detector, annotator, video, store, reports, settings }
    }

    /// Checks the configured model before anything is loaded.
    pub async fn validate_model(&self, catalog: &dyn ModelCatalogPort) -> DomainResult<()> {
        self.settings.params.validate()?;
        catalog.validate_model(&self.settings.model).await
    }

    pub fn model_loaded(&self) -> bool {
        self.detector.is_loaded()
    }

    pub fn model_name(&self) -> String {
        self.detector.model_name()
    }

    pub fn model_path(&self) -> &str {
        &self.settings.model.onnx_path
    }

    pub fn params(&self) -> &YoloParams {
        &self.settings.params
    }

    pub fn class_names(&self) -> Vec<String> {
        self.detector.class_names().as_slice().to_vec()
    }

    pub fn backend_configured(&self) -> bool {
        self.reports.is_configured()
    }

    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    async fn detect_and_plot(
        &self,
        rgb: RgbImage,
        params: &YoloParams,
    ) -> DomainResult<(Vec<Detection>, Vec<u8>)> {
        let detections = self.detector.detect(rgb.clone(), params).await?;
        let annotator = self.annotator.clone();
        let dets = detections.clone();
        let png = blocking(move || encode_png(&annotator.annotate(&rgb, &dets))).await?;
        Ok((detections, png))
    }

    /// Stateless: detections for an uploaded image.
    pub async fn predict_json(&self, bytes: Vec<u8>) -> DomainResult<PredictOutput> {
        let start = Instant::now();
        let rgb = blocking(move || decode_upload(&bytes)).await?;
        let detections = self.detector.detect(rgb, &self.settings.params).await?;
        Ok(PredictOutput { detections, elapsed: start.elapsed() })
    }

    /// Stateless: annotated PNG for an uploaded image.
    pub async fn predict_image(&self, bytes: Vec<u8>) -> DomainResult<Vec<u8>> {
        let rgb = blocking(move || decode_upload(&bytes)).await?;
        let (_, png) = self.detect_and_plot(rgb, &self.settings.params).await?;
        Ok(png)
    }

    pub async fn process_image(
        &self,
        id: SessionId,
        bytes: Vec<u8>,
        notify_product: Option<String>,
    ) -> DomainResult<ImageOutcome> {
        let session = self.store.get(id)?;
        session.require_mode(InputMode::Image)?;
        let params = self.settings.params.with_confidence(session.confidence);

        let start = Instant::now();
        let rgb = blocking(move || decode_upload(&bytes)).await?;
        let (w, h) = rgb.dimensions();
        let (detections, png) = self.detect_and_plot(rgb, &params).await?;
        let elapsed = start.elapsed();

        info!(
            "Session {}: image {}x{} -> {} detections [{}] in {:.2}s",
            id,
            w,
            h,
            detections.len(),
            summarize_detections(&detections),
            elapsed.as_secs_f64()
        );

        let stored_png = png.clone();
        let stored_dets = detections.clone();
        let mut payload = Some((stored_png, stored_dets));
        self.store.update(id, &mut |s| {
            s.require_mode(InputMode::Image)?;
            if let Some((png, dets)) = payload.take() {
                s.record_image(png, dets, elapsed);
            }
            Ok(())
        })?;

        let notification = match notify_product {
            Some(product_id) => Some(self.notify_fault(id, &product_id, &detections, elapsed).await),
            None => None,
        };

        Ok(ImageOutcome { detections, elapsed, png, notification })
    }

    async fn notify_fault(
        &self,
        id: SessionId,
        product_id: &str,
        detections: &[Detection],
        elapsed: Duration,
    ) -> NotifyOutcome {
        if product_id.trim().is_empty() {
            return NotifyOutcome::Skipped { reason: "product id is empty".into() };
        }
        let image_url = format!(
            "{}/api/sessions/{}/image",
            self.settings.public_url.trim_end_matches('/'),
            id
        );
        match FaultReport::from_detections(product_id.trim(), detections, elapsed, image_url, Utc::now()) {
            Some(report) => self.reports.notify(&report).await,
            None => NotifyOutcome::Skipped { reason: "no faults detected".into() },
        }
    }

    pub async fn process_video(
        &self,
        id: SessionId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> DomainResult<VideoOutcome> {
        let ext = video_extension(filename)?;
        if bytes.is_empty() {
            return Err(DomainError::InvalidInput("empty upload".into()));
        }
        let session = self.store.get(id)?;
        session.require_mode(InputMode::Video)?;
        let params = self.settings.params.with_confidence(session.confidence);

        // Upload and frames live in a scratch dir removed on drop.
        let work = tempfile::Builder::new().prefix("fault-inspector-").tempdir()?;
        let input = work.path().join(format!("upload.{ext}"));
        tokio::fs::write(&input, &bytes).await?;

        let start = Instant::now();
        let info = self.video.probe(&input).await?;
        let raw_dir = work.path().join("frames");
        let plotted_dir = work.path().join("plotted");
        tokio::fs::create_dir_all(&raw_dir).await?;
        tokio::fs::create_dir_all(&plotted_dir).await?;

        let frames = self.video.decode_frames(&input, &raw_dir).await?;
        if frames.is_empty() {
            return Err(DomainError::OperationFailed(
                "failed to process the video; try a different video file".into(),
            ));
        }
        info!(
            "Session {}: video {}x{} @ {:.2} fps, {} frames",
            id,
            info.width,
            info.height,
            info.fps,
            frames.len()
        );

        let mut first_frame: Vec<Detection> = Vec::new();
        let mut total_detections = 0usize;
        for (idx, frame_path) in frames.iter().enumerate() {
            let path = frame_path.clone();
            let rgb = blocking(move || {
                image::open(&path)
                    .map(|img| img.to_rgb8())
                    .map_err(|e| DomainError::OperationFailed(format!("bad frame {}: {e}", path.display())))
            })
            .await?;

            let detections = self.detector.detect(rgb.clone(), &params).await?;
            total_detections += detections.len();
            if idx == 0 {
                first_frame = detections.clone();
            }

            let annotator = self.annotator.clone();
            let out = plotted_dir.join(format!("frame_{:06}.png", idx + 1));
            blocking(move || {
                annotator
                    .annotate(&rgb, &detections)
                    .save(&out)
                    .map_err(|e| DomainError::OperationFailed(format!("cannot write frame: {e}")))
            })
            .await?;
        }

        let session_dir = self.settings.output_dir.join(id.to_string());
        tokio::fs::create_dir_all(&session_dir).await?;
        let output = session_dir.join(PROCESSED_VIDEO_NAME);
        self.video.encode_frames(&plotted_dir, info.fps, &output).await?;
        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(DomainError::OperationFailed(
                "failed to process the video; try a different video file".into(),
            ));
        }
        let elapsed = start.elapsed();

        let detection_count = first_frame.len();
        let mut payload = Some((output.clone(), first_frame));
        let recorded = self.store.update(id, &mut |s| {
            s.require_mode(InputMode::Video)?;
            if let Some((path, dets)) = payload.take() {
                s.record_video(path, detection_count, dets, elapsed);
            }
            Ok(())
        });
        if let Err(e) = recorded {
            // Reset or closed while encoding: nobody owns the file any more.
            remove_video(&output).await;
            return Err(e);
        }

        info!(
            "Session {}: video done in {:.2}s, first frame {} detections, {} total",
            id,
            elapsed.as_secs_f64(),
            detection_count,
            total_detections
        );

        Ok(VideoOutcome {
            detection_count,
            total_detections,
            frames: frames.len(),
            fps: info.fps,
            elapsed,
            output,
        })
    }
}
