use std::path::PathBuf;

use ordertrail_core::{DEFAULT_RETURN_WINDOW_DAYS, REVIEW_THRESHOLD};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub user_id: String,
    pub fixtures_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Structural records at or below this confidence compete with the
    /// plain-text parser.
    pub confidence_threshold: f64,
    pub default_return_days: u32,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("ORDERTRAIL_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            user_id: std::env::var("ORDERTRAIL_USER").unwrap_or_else(|_| "local".to_string()),
            fixtures_dir: std::env::var("ORDERTRAIL_FIXTURES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("fixtures").join("messages")),
            archive_dir: std::env::var("ORDERTRAIL_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("archive")),
            reports_dir: std::env::var("ORDERTRAIL_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("reports")),
            confidence_threshold: std::env::var("ORDERTRAIL_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(REVIEW_THRESHOLD),
            default_return_days: std::env::var("ORDERTRAIL_DEFAULT_RETURN_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(DEFAULT_RETURN_WINDOW_DAYS),
            workspace_root,
        }
    }

    /// Defaults rooted at `workspace_root`, ignoring the environment.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            user_id: "local".to_string(),
            fixtures_dir: workspace_root.join("fixtures").join("messages"),
            archive_dir: workspace_root.join("archive"),
            reports_dir: workspace_root.join("reports"),
            confidence_threshold: REVIEW_THRESHOLD,
            default_return_days: DEFAULT_RETURN_WINDOW_DAYS,
            workspace_root,
        }
    }

    pub fn return_policies_path(&self) -> PathBuf {
        self.workspace_root.join("rules").join("return_policies.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_defaults_hang_off_the_root() {
        let config = PipelineConfig::for_workspace("/srv/ordertrail");
        assert_eq!(config.fixtures_dir, PathBuf::from("/srv/ordertrail/fixtures/messages"));
        assert_eq!(config.reports_dir, PathBuf::from("/srv/ordertrail/reports"));
        assert_eq!(
            config.return_policies_path(),
            PathBuf::from("/srv/ordertrail/rules/return_policies.yaml")
        );
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.default_return_days, 30);
    }
}
