//! Configuration for the extraction pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding the LandingAI API key
pub const LANDING_API_KEY_ENV: &str = "VA_API_KEY";
/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding a ready Drive access token
pub const DRIVE_ACCESS_TOKEN_ENV: &str = "DRIVE_ACCESS_TOKEN";

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where documents come from
    pub source: SourceConfig,
    /// Extraction service configuration
    pub extraction: ExtractionConfig,
    /// Backoff for rate-limited requests
    pub retry: RetryConfig,
    /// Output file configuration
    pub output: OutputConfig,
    /// Processing configuration
    pub processing: ProcessingConfig,
    /// How local sources are marked done
    pub completion: CompletionConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Config file {} unreadable: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Check that the selected options are complete and consistent
    pub fn validate(&self) -> Result<()> {
        match self.source.kind {
            SourceKind::FileList if self.source.file_list.is_none() => {
                return Err(Error::Config(
                    "source.file_list is required for a file_list source".to_string(),
                ))
            }
            SourceKind::Directory if self.source.directory.is_none() => {
                return Err(Error::Config(
                    "source.directory is required for a directory source".to_string(),
                ))
            }
            SourceKind::Drive => {
                if self.source.drive.folder_id.is_none() {
                    return Err(Error::Config(
                        "source.drive.folder_id is required for a drive source".to_string(),
                    ));
                }
                if self.source.drive.done_folder_id.is_none() {
                    return Err(Error::Config(
                        "source.drive.done_folder_id is required for a drive source".to_string(),
                    ));
                }
            }
            _ => {}
        }

        if self.source.kind == SourceKind::Directory && self.source.extensions.is_empty() {
            return Err(Error::Config(
                "source.extensions must not be empty for a directory source".to_string(),
            ));
        }

        if self.completion.local_mode == LocalCompletionMode::Move
            && self.completion.done_dir.is_none()
        {
            return Err(Error::Config(
                "completion.done_dir is required when completion.local_mode = \"move\"".to_string(),
            ));
        }

        if self.processing.parallel_items == 0 {
            return Err(Error::Config(
                "processing.parallel_items must be at least 1".to_string(),
            ));
        }

        if self.extraction.timeout_secs == 0 {
            return Err(Error::Config(
                "extraction.timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Kind of document source
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Newline-delimited list of file paths
    #[default]
    FileList,
    /// Recursive directory scan
    Directory,
    /// Google Drive folder
    Drive,
}

/// Source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source kind
    pub kind: SourceKind,
    /// Path of the newline-delimited file list
    pub file_list: Option<PathBuf>,
    /// Root directory to scan
    pub directory: Option<PathBuf>,
    /// Extensions picked up by a directory scan (default: pdf, docx, html, txt, md)
    pub extensions: Vec<String>,
    /// Drive configuration
    pub drive: DriveConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            file_list: None,
            directory: None,
            extensions: default_extensions(),
            drive: DriveConfig::default(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["pdf", "docx", "html", "txt", "md"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

/// Google Drive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Folder whose files are processed
    pub folder_id: Option<String>,
    /// Folder that completed files are moved into
    pub done_folder_id: Option<String>,
    /// API base URL (default: https://www.googleapis.com)
    pub api_base: String,
    /// Authorized-user token file (client_id, client_secret, refresh_token)
    pub token_file: Option<PathBuf>,
    /// OAuth2 token endpoint used to refresh the token file's credentials
    pub token_uri: String,
    /// Page size of folder listings
    pub page_size: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            done_folder_id: None,
            api_base: "https://www.googleapis.com".to_string(),
            token_file: None,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            page_size: 100,
        }
    }
}

/// Extraction backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionBackend {
    /// LandingAI document parse + extract
    #[default]
    Landing,
    /// OpenAI-compatible chat completions with JSON output
    OpenAi,
}

/// Extraction service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Backend provider
    pub backend: ExtractionBackend,
    /// JSON schema of the extracted records (default: "schema.json")
    pub schema_path: PathBuf,
    /// LandingAI base URL
    pub landing_base_url: String,
    /// LandingAI parse model
    pub parse_model: String,
    /// Send binary documents to the service's parse endpoint instead of
    /// converting them locally (LandingAI only)
    pub remote_parse: bool,
    /// OpenAI-compatible base URL
    pub openai_base_url: String,
    /// Chat model name
    pub openai_model: String,
    /// Per-request timeout in seconds (default: 120)
    pub timeout_secs: u64,
    /// Limit for local PDF text extraction in seconds (default: 60)
    pub pdf_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend: ExtractionBackend::default(),
            schema_path: PathBuf::from("schema.json"),
            landing_base_url: "https://api.va.landing.ai".to_string(),
            parse_model: "dpt-2".to_string(),
            remote_parse: true,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            pdf_timeout_secs: 60,
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_timeout_secs)
    }
}

/// Backoff configuration for rate-limited requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds, doubled on every retry
    /// (default: 2000)
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Explicit output file; appended to if it already exists
    pub path: Option<PathBuf>,
    /// Directory for generated output names (default: current directory)
    pub directory: PathBuf,
    /// Prefix of generated output names: `<prefix>_<uuid>.csv`
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            directory: PathBuf::from("."),
            prefix: "results".to_string(),
        }
    }
}

impl OutputConfig {
    /// Output file for this run
    pub fn resolve_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => self
                .directory
                .join(format!("{}_{}.csv", self.prefix, uuid::Uuid::new_v4())),
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Items fetched, converted and extracted concurrently (default: 1)
    pub parallel_items: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { parallel_items: 1 }
    }
}

/// What happens to a local source file once its row is recorded
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocalCompletionMode {
    /// Delete the file
    #[default]
    Delete,
    /// Move the file into `done_dir`
    Move,
    /// Leave the file in place
    Keep,
}

/// Completion configuration for local sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub local_mode: LocalCompletionMode,
    pub done_dir: Option<PathBuf>,
}

/// Secrets taken from the process environment, never from config files
#[derive(Clone, Default)]
pub struct Credentials {
    pub landing_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub drive_access_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            landing_api_key: read(LANDING_API_KEY_ENV),
            openai_api_key: read(OPENAI_API_KEY_ENV),
            drive_access_token: read(DRIVE_ACCESS_TOKEN_ENV),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("landing_api_key", &redact(&self.landing_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("drive_access_token", &redact(&self.drive_access_token))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.extraction.timeout(), Duration::from_secs(120));
        assert_eq!(config.processing.parallel_items, 1);
        assert_eq!(config.extraction.backend, ExtractionBackend::Landing);
    }

    #[test]
    fn test_parse_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [source]
            kind = "drive"

            [source.drive]
            folder_id = "src"
            done_folder_id = "done"

            [extraction]
            backend = "openai"
            schema_path = "labresult_schema.json"

            [retry]
            base_delay_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.source.kind, SourceKind::Drive);
        assert_eq!(config.source.drive.folder_id.as_deref(), Some("src"));
        assert_eq!(config.extraction.backend, ExtractionBackend::OpenAi);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_incomplete_source() {
        let mut config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.source.file_list = Some(PathBuf::from("files.txt"));
        assert!(config.validate().is_ok());

        config.completion.local_mode = LocalCompletionMode::Move;
        assert!(config.validate().is_err());

        config.completion.done_dir = Some(PathBuf::from("done"));
        config.processing.parallel_items = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_output_name() {
        let output = OutputConfig {
            directory: PathBuf::from("/tmp/out"),
            ..Default::default()
        };
        let path = output.resolve_path();
        assert!(path.starts_with("/tmp/out"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("results_") && name.ends_with(".csv"));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            landing_api_key: Some("secret-key".to_string()),
            ..Default::default()
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret-key"));
        assert!(shown.contains("<redacted>"));
    }
}
