use std::path::Path;

use tvid_media::{check_ffmpeg, check_ffprobe, FontCache};
use tvid_storage::StorageConfig;
use tvid_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "tvid-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!("tvid-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    let mut fonts = FontCache::builder();
    for dir in &config.font_dirs {
        fonts = fonts.search_dir(dir);
    }
    for family in &config.font_families {
        fonts = fonts.family(family);
    }
    let fonts = fonts.build()?;
    if fonts.loaded_families() == 0 {
        println!("tvid-selfcheck: warning: no fonts found, captions use block glyphs");
    }

    let storage = StorageConfig::from_env()?;
    if storage.default_bucket.is_none() && !storage.is_local() {
        println!("tvid-selfcheck: warning: STORAGE_BUCKET unset, jobs need explicit outputs");
    }

    println!("tvid-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}
