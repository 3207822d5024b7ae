//! Full jobs through the runner, a local store and a real FFmpeg.
//!
//! Run with: `cargo test -p tvid-worker --test render_job -- --ignored`

use std::path::Path;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tvid_media::FontCache;
use tvid_models::{
    AlignmentConfig, AlignmentGranularity, AssetRef, BackgroundFit, BackgroundSpec, CaptionConfig,
    ErrorKind, JobStatus, OutputSpec, RenderJob, Resolution, ScriptSegment,
};
use tvid_storage::LocalStore;
use tvid_worker::{JobRunner, Pipeline, WorkerConfig};

const RATE: u32 = 16_000;

/// 16-bit mono WAV with a tone during each burst.
fn write_wav(path: &Path, duration: f64, bursts: &[(f64, f64)]) {
    let n = (duration * RATE as f64) as usize;
    let mut data = Vec::with_capacity(n * 2);
    for i in 0..n {
        let t = i as f64 / RATE as f64;
        let v = if bursts.iter().any(|&(s, e)| t >= s && t < e) {
            0.5 * (2.0 * std::f64::consts::PI * 180.0 * t).sin()
        } else {
            0.0
        };
        data.extend_from_slice(&((v * i16::MAX as f64) as i16).to_le_bytes());
    }

    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&RATE.to_le_bytes());
    wav.extend_from_slice(&(RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(&data);

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, wav).unwrap();
}

fn quiz_job() -> RenderJob {
    let mut job = RenderJob::new(
        ScriptSegment::sequence(["Welcome", "to the quiz", "let's begin"]),
        AssetRef::object("inputs", "narration/quiz.wav"),
    )
    .with_background(
        BackgroundSpec::Image {
            source: AssetRef::object("inputs", "backgrounds/quiz.png"),
        },
        BackgroundFit::Hold,
    )
    .with_captions(CaptionConfig::default().with_budget(20, 1))
    .with_output(AssetRef::object("videos", "quiz.mp4"));
    job.output_spec = OutputSpec::new(Resolution::new(1280, 720), 30.0);
    job.output_spec.subtitles = true;
    job.alignment =
        Some(AlignmentConfig::default().with_granularity(AlignmentGranularity::Segment));
    job
}

fn runner(store_root: &Path, work_dir: &Path) -> JobRunner {
    let config = WorkerConfig {
        work_dir: work_dir.to_path_buf(),
        ..WorkerConfig::default()
    };
    let pipeline = Pipeline::new(
        Arc::new(FontCache::headless()),
        Arc::new(LocalStore::new(store_root)),
        config,
    );
    JobRunner::new(pipeline)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_quiz_job_delivers_video_and_subtitles() {
    let store = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    write_wav(
        &store.path().join("inputs/narration/quiz.wav"),
        4.5,
        &[(0.1, 1.0), (1.4, 2.6), (3.0, 4.3)],
    );
    let background = store.path().join("inputs/backgrounds/quiz.png");
    std::fs::create_dir_all(background.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(640, 480, Rgba([30, 60, 90, 255]))
        .save(&background)
        .unwrap();

    let handle = runner(store.path(), work.path()).submit(quiz_job());
    let status = handle.subscribe();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(*status.borrow(), JobStatus::Done);
    assert_eq!(outcome.fragments, 3);
    assert_eq!(outcome.captions, 3);
    assert!(outcome.frame_count.abs_diff(135) <= 1);
    assert_eq!(outcome.output, AssetRef::object("videos", "quiz.mp4"));
    assert_eq!(outcome.subtitles, Some(AssetRef::object("videos", "quiz.srt")));

    assert!(store.path().join("videos/quiz.mp4").exists());
    let srt = std::fs::read_to_string(store.path().join("videos/quiz.srt")).unwrap();
    assert!(srt.contains("Welcome"));
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_implausibly_short_audio_fails_alignment() {
    let store = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    write_wav(&store.path().join("inputs/narration/short.wav"), 0.05, &[(0.0, 0.05)]);
    let job = RenderJob::new(
        ScriptSegment::sequence(["Supercalifragilisticexpialidocious"]),
        AssetRef::object("inputs", "narration/short.wav"),
    )
    .with_output(AssetRef::object("videos", "short.mp4"));

    let failure = runner(store.path(), work.path())
        .submit(job)
        .wait()
        .await
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Alignment);
    assert_eq!(failure.stage, JobStatus::Aligning);
    assert!(!store.path().join("videos/short.mp4").exists());
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}
