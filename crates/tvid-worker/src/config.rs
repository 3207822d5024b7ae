//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Parent directory of per-job scratch directories
    pub work_dir: PathBuf,
    /// Font families loaded at startup; the first is the fallback
    pub font_families: Vec<String>,
    /// Directories scanned for font files (system defaults when empty)
    pub font_dirs: Vec<PathBuf>,
    /// Bucket for jobs without an explicit output
    pub output_bucket: Option<String>,
    /// Probe every encoded artifact before upload
    pub verify_output: bool,
    /// Serve Prometheus metrics on this address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(1800), // 30 minutes
            work_dir: std::env::temp_dir().join("tvid"),
            font_families: vec!["DejaVu Sans Bold".to_string()],
            font_dirs: Vec::new(),
            output_bucket: None,
            verify_output: true,
            metrics_addr: None,
        }
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl WorkerConfig {
    /// Create config from `TVID_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("TVID_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: std::env::var("TVID_JOB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            work_dir: std::env::var("TVID_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            font_families: std::env::var("TVID_FONT_FAMILIES")
                .ok()
                .map(|s| split_list(&s, ','))
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.font_families),
            font_dirs: std::env::var("TVID_FONT_DIRS")
                .map(|s| split_list(&s, ':').into_iter().map(PathBuf::from).collect())
                .unwrap_or_default(),
            output_bucket: std::env::var("STORAGE_BUCKET")
                .ok()
                .filter(|s| !s.is_empty()),
            verify_output: std::env::var("TVID_VERIFY_OUTPUT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.verify_output),
            metrics_addr: std::env::var("TVID_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" DejaVu Sans Bold, Noto Sans ,,", ','),
            vec!["DejaVu Sans Bold".to_string(), "Noto Sans".to_string()]
        );
        assert!(split_list("", ':').is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert!(config.verify_output);
        assert_eq!(config.font_families.len(), 1);
    }
}
