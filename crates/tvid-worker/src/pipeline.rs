//! One render job, from script and narration to a delivered video.
//!
//! Stages run in a fixed order: `Aligning` (fetch inputs, decode narration,
//! align the script), `Compositing` (caption layout, background),
//! `Assembling` (frames streamed into the encoder, verification, upload),
//! then `Done`. Every exit path removes the job's scratch directory before
//! the outcome is reported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, warn, Instrument, Span};
use tvid_media::{
    open_background, AlignmentEngine, AudioTrack, CancelToken, CaptionCanvas, CaptionLayout,
    Compositor, EncodedArtifact, FfmpegSink, FontCache, FrameSink, MediaAssembler, MediaError,
};
use tvid_models::{AssetRef, BackgroundSpec, JobId, JobStatus, RenderJob};
use tvid_storage::ArtifactStore;

use crate::config::WorkerConfig;
use crate::error::{JobFailure, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

const SUBTITLE_CONTENT_TYPE: &str = "application/x-subrip";

/// Scratch directory owned by one job, removed on drop.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(parent: &Path, job_id: &JobId) -> WorkerResult<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(parent)?;
        debug!(job_id = %job_id, path = %dir.path().display(), "Created job workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Subdirectory for downloaded inputs.
    pub fn inputs(&self) -> PathBuf {
        self.dir.path().join("inputs")
    }
}

/// Publishes validated status transitions for one job.
#[derive(Debug)]
pub struct StageTracker {
    status: watch::Sender<JobStatus>,
    logger: JobLogger,
    entered: Mutex<Instant>,
}

impl StageTracker {
    pub fn new(status: watch::Sender<JobStatus>, logger: JobLogger) -> Self {
        Self {
            status,
            logger,
            entered: Mutex::new(Instant::now()),
        }
    }

    pub fn current(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    /// Move to `next`; illegal transitions are rejected.
    pub fn advance(&self, next: JobStatus) -> WorkerResult<()> {
        let current = self.current();
        let next = current.transition(next)?;
        if let Ok(mut entered) = self.entered.lock() {
            if current != JobStatus::Pending {
                metrics::record_stage(current, entered.elapsed().as_secs_f64());
            }
            *entered = Instant::now();
        }
        self.status.send_replace(next);
        self.logger.log_stage(next);
        Ok(())
    }

    /// Mark the job failed unless it already finished.
    fn fail(&self, failure: &JobFailure) {
        let failed = JobStatus::Failed(failure.kind);
        if self.current().can_transition_to(failed) {
            self.status.send_replace(failed);
        }
    }
}

/// What the compositor and assembler produced for one job.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub artifact: EncodedArtifact,
    /// Captions as SRT
    pub subtitles: String,
    pub fragments: usize,
    pub low_confidence_fragments: usize,
    pub captions: usize,
}

/// Summary of a delivered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub output: AssetRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<AssetRef>,
    pub frame_count: u64,
    /// Seconds of video delivered
    pub duration: f64,
    pub fragments: usize,
    pub low_confidence_fragments: usize,
    pub captions: usize,
    pub finished_at: DateTime<Utc>,
}

/// Shared, immutable context every job renders with.
#[derive(Clone)]
pub struct Pipeline {
    fonts: Arc<FontCache>,
    store: Arc<dyn ArtifactStore>,
    config: Arc<WorkerConfig>,
}

impl Pipeline {
    pub fn new(fonts: Arc<FontCache>, store: Arc<dyn ArtifactStore>, config: WorkerConfig) -> Self {
        Self {
            fonts,
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run `job` to completion, publishing each stage on `status`.
    pub async fn run(
        &self,
        job: RenderJob,
        cancel: CancelToken,
        status: watch::Sender<JobStatus>,
    ) -> Result<JobOutcome, JobFailure> {
        let job_id = job.id.clone();
        let logger = JobLogger::new(&job_id, "render");
        let span = logger.create_span();
        let tracker = Arc::new(StageTracker::new(status, logger.clone()));
        let started = Instant::now();

        metrics::record_job_started();
        logger.log_start(&format!("{} segments, audio {}", job.segments.len(), job.audio));

        // The workspace lives inside `execute`, so it is gone by the time a
        // failure is published.
        let result = self.execute(job, cancel, &tracker).instrument(span).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                metrics::record_job_completed(elapsed);
                logger.log_completion(&format!(
                    "{} frames delivered to {} in {:.1}s",
                    outcome.frame_count, outcome.output, elapsed
                ));
                Ok(outcome)
            }
            Err(e) => {
                let failure = JobFailure::new(job_id, tracker.current(), &e);
                tracker.fail(&failure);
                metrics::record_job_failed(failure.kind, elapsed);
                logger.log_error(&failure.to_string());
                Err(failure)
            }
        }
    }

    async fn execute(
        &self,
        job: RenderJob,
        cancel: CancelToken,
        tracker: &Arc<StageTracker>,
    ) -> WorkerResult<JobOutcome> {
        job.validate()?;
        let target = self.output_target(&job)?;
        cancel.check()?;

        let workspace = JobWorkspace::create(&self.config.work_dir, &job.id)?;
        let inputs = workspace.inputs();

        tracker.advance(JobStatus::Aligning)?;
        let audio_path = self.store.fetch(&job.audio, &inputs).await?;
        let audio = AudioTrack::load(&audio_path, &cancel).await?;
        cancel.check()?;

        let mut render_job = job.clone();
        self.resolve_background(&mut render_job.background, &inputs)
            .await?;
        cancel.check()?;

        let output_path = workspace
            .path()
            .join(format!("output.{}", job.output_spec.container.extension()));
        let report = {
            let pipeline = self.clone();
            let tracker = Arc::clone(tracker);
            let cancel = cancel.clone();
            let span = Span::current();
            tokio::task::spawn_blocking(move || {
                let _guard = span.enter();
                let mut sink = FfmpegSink::new(output_path);
                pipeline.render(&render_job, &audio, &mut sink, &cancel, &tracker)
            })
            .await??
        };

        if self.config.verify_output {
            MediaAssembler::new(job.output_spec.clone(), job.max_av_drift)?
                .verify_artifact(&report.artifact)
                .await?;
        }
        cancel.check()?;

        let artifact_path = report
            .artifact
            .path()
            .cloned()
            .ok_or_else(|| MediaError::encode("encoder produced no file"))?;

        let subtitles = job.output_spec.subtitles.then_some(report.subtitles.as_str());
        let (output, subtitles) = self
            .deliver(
                workspace.path(),
                &artifact_path,
                report.artifact.content_type,
                subtitles,
                &target,
            )
            .await?;

        tracker.advance(JobStatus::Done)?;
        drop(workspace);

        Ok(JobOutcome {
            job_id: job.id,
            output,
            subtitles,
            frame_count: report.artifact.frame_count,
            duration: report.artifact.video_duration,
            fragments: report.fragments,
            low_confidence_fragments: report.low_confidence_fragments,
            captions: report.captions,
            finished_at: Utc::now(),
        })
    }

    /// Align, lay out, composite and assemble into `sink`.
    ///
    /// Blocking: runs on the blocking pool. Expects the tracker in `Aligning`
    /// and every background asset already local.
    pub fn render(
        &self,
        job: &RenderJob,
        audio: &AudioTrack,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
        tracker: &StageTracker,
    ) -> WorkerResult<RenderReport> {
        let engine = AlignmentEngine::new(job.alignment_config())?;
        let fragments = match &job.timepoints {
            Some(timepoints) => engine.align_with_timepoints(audio, &job.segments, timepoints)?,
            None => engine.align(audio, &job.segments)?,
        };
        let low_confidence = fragments.iter().filter(|f| f.low_confidence).count();
        if low_confidence > 0 {
            tracker.logger().log_warning(&format!(
                "{low_confidence} of {} fragments fell back to proportional timing",
                fragments.len()
            ));
        }
        cancel.check()?;

        tracker.advance(JobStatus::Compositing)?;
        let spec = &job.output_spec;
        let caption_config = job.caption_config();
        let measure = self.fonts.measure(&caption_config.font.family);
        let captions = CaptionLayout::new(
            &fragments,
            caption_config,
            CaptionCanvas::new(spec.resolution, spec.frame_rate),
            measure,
        )?
        .with_time_limit(audio.duration());
        let caption_count = captions.frames().count();
        let subtitles = captions.to_srt();
        tracker
            .logger()
            .log_progress(&format!("{} fragments, {caption_count} captions", fragments.len()));

        let background = open_background(&job.background, spec.resolution, spec.frame_rate)?;
        let mut compositor = Compositor::new(
            captions,
            background,
            Arc::clone(&self.fonts),
            spec.frame_rate,
            audio.duration(),
            spec.resolution,
        )?
        .with_fit(job.background_fit);
        if let Some(card) = &job.card {
            compositor = compositor.with_card(card)?;
        }
        let assembler =
            MediaAssembler::new(spec.clone(), job.max_av_drift)?.with_cancel(cancel.clone());
        cancel.check()?;

        tracker.advance(JobStatus::Assembling)?;
        let artifact = assembler.assemble(compositor.frames()?, audio, sink)?;

        Ok(RenderReport {
            artifact,
            subtitles,
            fragments: fragments.len(),
            low_confidence_fragments: low_confidence,
            captions: caption_count,
        })
    }

    /// Upload the video, then its SRT sidecar. A failed sidecar upload
    /// removes the video again, so a failed job leaves nothing under the
    /// output key.
    async fn deliver(
        &self,
        scratch: &Path,
        artifact_path: &Path,
        content_type: &str,
        subtitles: Option<&str>,
        target: &AssetRef,
    ) -> WorkerResult<(AssetRef, Option<AssetRef>)> {
        let started = Instant::now();
        let output = self.store.put(artifact_path, target, content_type).await?;

        let sidecar = match subtitles {
            Some(srt) => match self.put_sidecar(scratch, srt, target).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    if let Err(cleanup) = self.store.delete(&output).await {
                        warn!(output = %output, error = %cleanup, "Failed to remove video after sidecar upload failed");
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        metrics::record_upload(started.elapsed().as_secs_f64());
        Ok((output, sidecar))
    }

    async fn put_sidecar(&self, scratch: &Path, srt: &str, target: &AssetRef) -> WorkerResult<AssetRef> {
        let srt_path = scratch.join("captions.srt");
        tokio::fs::write(&srt_path, srt).await?;
        let stored = self
            .store
            .put(&srt_path, &sidecar_target(target), SUBTITLE_CONTENT_TYPE)
            .await?;
        Ok(stored)
    }

    fn output_target(&self, job: &RenderJob) -> WorkerResult<AssetRef> {
        if let Some(output) = &job.output {
            return Ok(output.clone());
        }
        self.config
            .output_bucket
            .as_ref()
            .map(|bucket| AssetRef::object(bucket, job.default_output_key()))
            .ok_or_else(|| {
                WorkerError::config_error("job has no output and STORAGE_BUCKET is not set")
            })
    }

    /// Fetch remote background assets and point the background at the local copies.
    async fn resolve_background(
        &self,
        background: &mut BackgroundSpec,
        inputs: &Path,
    ) -> WorkerResult<()> {
        match background {
            BackgroundSpec::Color { .. } => {}
            BackgroundSpec::Image { source } | BackgroundSpec::Video { source } => {
                let dest = inputs.join("background");
                *source = AssetRef::Local(self.store.fetch(source, &dest).await?);
            }
            BackgroundSpec::Slideshow { sources, .. } => {
                for (i, source) in sources.iter_mut().enumerate() {
                    let dest = inputs.join(format!("slide-{i:03}"));
                    *source = AssetRef::Local(self.store.fetch(source, &dest).await?);
                }
            }
        }
        Ok(())
    }
}

/// Where the SRT sidecar of `target` goes: same location, `.srt` extension.
pub fn sidecar_target(target: &AssetRef) -> AssetRef {
    match target {
        AssetRef::Local(path) => AssetRef::Local(path.with_extension("srt")),
        AssetRef::Object {
            scheme,
            bucket,
            key,
        } => AssetRef::object_with_scheme(*scheme, bucket, replace_extension(key, "srt")),
    }
}

fn replace_extension(key: &str, extension: &str) -> String {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{extension}", &key[..name_start + dot]),
        _ => format!("{key}.{extension}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate;
    use tvid_media::MemorySink;
    use tvid_models::{
        AlignmentConfig, AlignmentGranularity, CaptionConfig, CardLayer, Color, ErrorKind, FontSpec,
        OutputSpec, Resolution, ScriptSegment, TextCard,
    };
    use tvid_storage::{MockArtifactStore, StorageError};

    const RATE: u32 = 16_000;

    fn narration(duration: f64, bursts: &[(f64, f64)]) -> AudioTrack {
        let n = (duration * RATE as f64) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f64 / RATE as f64;
                if bursts.iter().any(|&(s, e)| t >= s && t < e) {
                    0.5 * (2.0 * std::f64::consts::PI * 180.0 * t).sin() as f32
                } else {
                    0.0
                }
            })
            .collect();
        AudioTrack::from_pcm(samples, RATE, 1).unwrap()
    }

    fn quiz_job() -> RenderJob {
        let mut job = RenderJob::new(
            ScriptSegment::sequence(["Welcome", "to the quiz", "let's begin"]),
            AssetRef::local("/narration/quiz.wav"),
        )
        .with_output_spec(OutputSpec::new(Resolution::new(320, 180), 30.0))
        .with_captions(CaptionConfig::default().with_budget(20, 1).with_font(FontSpec {
            size: 16.0,
            ..FontSpec::default()
        }))
        .with_background(
            BackgroundSpec::Color {
                color: Color::BLACK,
            },
            Default::default(),
        )
        .with_output(AssetRef::object("videos", "quiz.mp4"));
        job.alignment =
            Some(AlignmentConfig::default().with_granularity(AlignmentGranularity::Segment));
        job
    }

    fn pipeline(store: MockArtifactStore, work_dir: &Path) -> Pipeline {
        let config = WorkerConfig {
            work_dir: work_dir.to_path_buf(),
            ..WorkerConfig::default()
        };
        Pipeline::new(Arc::new(FontCache::headless()), Arc::new(store), config)
    }

    fn tracker(status: watch::Sender<JobStatus>) -> StageTracker {
        StageTracker::new(status, JobLogger::new(&JobId::from_string("test"), "render"))
    }

    #[test]
    fn test_render_quiz_into_memory() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let (tx, rx) = watch::channel(JobStatus::Pending);
        let tracker = tracker(tx);
        tracker.advance(JobStatus::Aligning).unwrap();

        let audio = narration(4.5, &[(0.1, 1.0), (1.4, 2.6), (3.0, 4.3)]);
        let mut sink = MemorySink::new();
        let report = pipeline
            .render(&quiz_job(), &audio, &mut sink, &CancelToken::never(), &tracker)
            .unwrap();

        assert_eq!(report.fragments, 3);
        assert_eq!(report.captions, 3);
        assert_eq!(report.artifact.frame_count, 135);
        assert_eq!(sink.frame_count(), 135);
        assert!(sink.is_finished());
        assert!(report.subtitles.starts_with("1\n"));
        assert_eq!(*rx.borrow(), JobStatus::Assembling);
    }

    #[test]
    fn test_render_quiz_with_card_into_memory() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let (tx, _rx) = watch::channel(JobStatus::Pending);
        let tracker = tracker(tx);
        tracker.advance(JobStatus::Aligning).unwrap();

        let green = FontSpec {
            size: 12.0,
            color: Color::rgb(0, 128, 0),
            outline_color: None,
            ..FontSpec::default()
        };
        let card = TextCard {
            layers: vec![CardLayer::new("A: Berlin\nB: Paris", green, 0.0, 0.4)],
        };
        let job = quiz_job().with_card(card);

        let audio = narration(4.5, &[(0.1, 1.0), (1.4, 2.6), (3.0, 4.3)]);
        let mut sink = MemorySink::retaining_frames();
        let report = pipeline
            .render(&job, &audio, &mut sink, &CancelToken::never(), &tracker)
            .unwrap();

        assert_eq!(report.artifact.frame_count, 135);
        assert_eq!(sink.frames().len(), 135);
        let has_card = |f: &tvid_media::RasterFrame| {
            f.pixels.chunks_exact(4).any(|px| px[..3] == [0, 128, 0])
        };
        assert!(sink.frames().iter().all(has_card));
    }

    #[test]
    fn test_render_stops_when_cancelled() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let (tx, _rx) = watch::channel(JobStatus::Pending);
        let tracker = tracker(tx);
        tracker.advance(JobStatus::Aligning).unwrap();

        let (cancel_tx, cancel) = tvid_media::cancel_pair();
        cancel_tx.send(true).unwrap();
        let audio = narration(4.5, &[(0.1, 1.0), (1.4, 2.6), (3.0, 4.3)]);
        let mut sink = MemorySink::new();
        let err = pipeline
            .render(&quiz_job(), &audio, &mut sink, &cancel, &tracker)
            .unwrap_err();

        assert_eq!(err.kind(tracker.current()), ErrorKind::Cancelled);
        assert_eq!(sink.frame_count(), 0);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let (tx, _rx) = watch::channel(JobStatus::Pending);
        let tracker = tracker(tx);
        assert!(tracker.advance(JobStatus::Assembling).is_err());
        assert_eq!(tracker.current(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_job_fails_before_resources() {
        let work = tempfile::tempdir().unwrap();
        // No expectations: any storage call panics the test.
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let mut job = quiz_job();
        job.segments.clear();

        let (tx, rx) = watch::channel(JobStatus::Pending);
        let failure = pipeline
            .run(job, CancelToken::never(), tx)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Config);
        assert_eq!(failure.stage, JobStatus::Pending);
        assert_eq!(*rx.borrow(), JobStatus::Failed(ErrorKind::Config));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_output_target_is_config_error() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let mut job = quiz_job();
        job.output = None;

        let (tx, _rx) = watch::channel(JobStatus::Pending);
        let failure = pipeline
            .run(job, CancelToken::never(), tx)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_fetch_failure_removes_workspace() {
        let work = tempfile::tempdir().unwrap();
        let mut store = MockArtifactStore::new();
        store
            .expect_fetch()
            .with(
                predicate::eq(AssetRef::local("/narration/quiz.wav")),
                predicate::always(),
            )
            .times(1)
            .returning(|source, _| Err(StorageError::not_found(source.to_string())));
        store.expect_put().never();
        let pipeline = pipeline(store, work.path());

        let (tx, rx) = watch::channel(JobStatus::Pending);
        let failure = pipeline
            .run(quiz_job(), CancelToken::never(), tx)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Storage);
        assert_eq!(failure.stage, JobStatus::Aligning);
        assert_eq!(*rx.borrow(), JobStatus::Failed(ErrorKind::Storage));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    fn stored_video(dir: &Path) -> PathBuf {
        let video = dir.join("output.mp4");
        std::fs::write(&video, b"mp4").unwrap();
        video
    }

    #[tokio::test]
    async fn test_failed_sidecar_upload_removes_video() {
        let work = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let video = stored_video(scratch.path());
        let target = AssetRef::object("videos", "quiz.mp4");

        let mut store = MockArtifactStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_put()
            .with(
                predicate::always(),
                predicate::eq(target.clone()),
                predicate::eq("video/mp4"),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, target, _| Ok(target.clone()));
        store
            .expect_put()
            .with(
                predicate::always(),
                predicate::eq(AssetRef::object("videos", "quiz.srt")),
                predicate::always(),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StorageError::upload_failed("bucket unavailable")));
        store
            .expect_delete()
            .with(predicate::eq(target.clone()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let pipeline = pipeline(store, work.path());

        let err = pipeline
            .deliver(scratch.path(), &video, "video/mp4", Some("1\n"), &target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(JobStatus::Assembling), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_failed_video_upload_skips_sidecar() {
        let work = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let video = stored_video(scratch.path());

        let mut store = MockArtifactStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _| Err(StorageError::upload_failed("quota exceeded")));
        store.expect_delete().never();
        let pipeline = pipeline(store, work.path());

        let target = AssetRef::object("videos", "quiz.mp4");
        let result = pipeline
            .deliver(scratch.path(), &video, "video/mp4", Some("1\n"), &target)
            .await;
        assert!(matches!(result, Err(WorkerError::Storage(_))));
    }

    #[tokio::test]
    async fn test_delivery_without_subtitles() {
        let work = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let video = stored_video(scratch.path());

        let mut store = MockArtifactStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, target, _| Ok(target.clone()));
        let pipeline = pipeline(store, work.path());

        let target = AssetRef::object("videos", "quiz.mp4");
        let (output, sidecar) = pipeline
            .deliver(scratch.path(), &video, "video/mp4", None, &target)
            .await
            .unwrap();
        assert_eq!(output, target);
        assert!(sidecar.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline(MockArtifactStore::new(), work.path());
        let (cancel_tx, cancel) = tvid_media::cancel_pair();
        cancel_tx.send(true).unwrap();

        let (tx, _rx) = watch::channel(JobStatus::Pending);
        let failure = tokio_test::assert_err!(pipeline.run(quiz_job(), cancel, tx).await);
        assert_eq!(failure.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_sidecar_target() {
        assert_eq!(
            sidecar_target(&AssetRef::object("b", "videos/job.mp4")),
            AssetRef::object("b", "videos/job.srt")
        );
        assert_eq!(
            sidecar_target(&AssetRef::object("b", "v1.0/clip")),
            AssetRef::object("b", "v1.0/clip.srt")
        );
        assert_eq!(
            sidecar_target(&"r2://b/job.mp4".parse().unwrap()).to_string(),
            "r2://b/job.srt"
        );
        assert_eq!(
            sidecar_target(&AssetRef::local("/out/quiz.mov")),
            AssetRef::local("/out/quiz.srt")
        );
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let work = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(work.path(), &JobId::from_string("abc")).unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.exists());
        drop(ws);
        assert!(!path.exists());
    }
}
