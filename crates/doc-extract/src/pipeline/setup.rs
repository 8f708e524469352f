//! Wiring a driver from configuration

use std::sync::Arc;

use super::driver::{Converter, PipelineDriver};
use crate::config::{
    Credentials, ExtractionBackend, PipelineConfig, SourceKind, DRIVE_ACCESS_TOKEN_ENV,
    LANDING_API_KEY_ENV, OPENAI_API_KEY_ENV,
};
use crate::error::{Error, Result};
use crate::ingestion::LocalConverter;
use crate::providers::http::build_client;
use crate::providers::{
    AccessTokenProvider, AuthorizedUserToken, CompletionMarker, ContentFetcher, DirectorySource,
    DriveStore, ExtractionClient, FileListSource, LandingClient, LocalCompletion, LocalFetcher,
    OpenAiClient, SourceLister, StaticToken,
};
use crate::retry::RetryPolicy;
use crate::sink::CsvFileSink;
use crate::types::ExtractionSchema;

/// Source-side components for one source kind
pub struct SourceParts {
    pub lister: Arc<dyn SourceLister>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub marker: Arc<dyn CompletionMarker>,
}

/// Build the lister, fetcher and completion marker for the configured source
pub fn build_source(
    config: &PipelineConfig,
    credentials: &Credentials,
    http: &reqwest::Client,
) -> Result<SourceParts> {
    let source = &config.source;
    let local_marker = || -> Arc<dyn CompletionMarker> {
        Arc::new(LocalCompletion::new(
            config.completion.local_mode,
            config.completion.done_dir.clone(),
        ))
    };

    match source.kind {
        SourceKind::FileList => {
            let list = source
                .file_list
                .clone()
                .ok_or_else(|| Error::Config("source.file_list is not set".to_string()))?;
            Ok(SourceParts {
                lister: Arc::new(FileListSource::new(list)),
                fetcher: Arc::new(LocalFetcher),
                marker: local_marker(),
            })
        }
        SourceKind::Directory => {
            let root = source
                .directory
                .clone()
                .ok_or_else(|| Error::Config("source.directory is not set".to_string()))?;
            Ok(SourceParts {
                lister: Arc::new(DirectorySource::new(root, &source.extensions)),
                fetcher: Arc::new(LocalFetcher),
                marker: local_marker(),
            })
        }
        SourceKind::Drive => {
            let tokens: Arc<dyn AccessTokenProvider> =
                match (&credentials.drive_access_token, &source.drive.token_file) {
                    (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
                    (None, Some(token_file)) => Arc::new(AuthorizedUserToken::new(
                        token_file,
                        source.drive.token_uri.clone(),
                        http.clone(),
                    )?),
                    (None, None) => {
                        return Err(Error::Config(format!(
                            "Drive source needs {} or source.drive.token_file",
                            DRIVE_ACCESS_TOKEN_ENV
                        )))
                    }
                };
            let store = Arc::new(DriveStore::new(http.clone(), tokens, &source.drive)?);
            Ok(SourceParts {
                lister: store.clone(),
                fetcher: store.clone(),
                marker: store,
            })
        }
    }
}

/// Build a ready-to-run driver and its output sink
///
/// The schema is loaded before anything else so that a missing schema fails
/// the run before any output file exists.
pub fn build_pipeline(
    config: &PipelineConfig,
    credentials: &Credentials,
) -> Result<(PipelineDriver, CsvFileSink)> {
    let schema = Arc::new(ExtractionSchema::load(&config.extraction.schema_path)?);
    config.validate()?;

    let sink = CsvFileSink::new(config.output.resolve_path())?;
    let retry = RetryPolicy::from_config(&config.retry);
    let http = build_client(config.extraction.timeout())?;
    let extraction = &config.extraction;
    let local = || -> Converter {
        Converter::Local(Arc::new(LocalConverter::new(extraction.pdf_timeout())))
    };

    let (extractor, converter): (Arc<dyn ExtractionClient>, Converter) = match extraction.backend
    {
        ExtractionBackend::Landing => {
            let key = credentials.landing_api_key.clone().ok_or_else(|| {
                Error::Config(format!("{} is not set", LANDING_API_KEY_ENV))
            })?;
            let client = Arc::new(LandingClient::new(
                http.clone(),
                extraction.landing_base_url.clone(),
                key,
                extraction.parse_model.clone(),
                retry,
            ));
            let converter = if extraction.remote_parse {
                Converter::Remote(client.clone())
            } else {
                local()
            };
            (client as Arc<dyn ExtractionClient>, converter)
        }
        ExtractionBackend::OpenAi => {
            let key = credentials.openai_api_key.clone().ok_or_else(|| {
                Error::Config(format!("{} is not set", OPENAI_API_KEY_ENV))
            })?;
            let client = Arc::new(OpenAiClient::new(
                http.clone(),
                extraction.openai_base_url.clone(),
                key,
                extraction.openai_model.clone(),
                retry,
            ));
            (client as Arc<dyn ExtractionClient>, local())
        }
    };

    let source = build_source(config, credentials, &http)?;
    let driver = PipelineDriver::new(
        source.lister,
        source.fetcher,
        converter,
        extractor,
        source.marker,
        schema,
    )
    .with_parallel_items(config.processing.parallel_items);

    Ok((driver, sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> PipelineConfig {
        let schema = dir.join("schema.json");
        std::fs::write(
            &schema,
            r#"{"type":"object","properties":{"patient_name":{"type":"string"}},"required":["patient_name"]}"#,
        )
        .unwrap();

        let mut config = PipelineConfig::default();
        config.extraction.schema_path = schema;
        config.source.file_list = Some(dir.join("files.txt"));
        config.output.directory = dir.to_path_buf();
        config
    }

    #[test]
    fn test_missing_schema_fails_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.extraction.schema_path = dir.path().join("missing.json");
        // also invalid otherwise; the schema error wins
        config.source.file_list = None;

        let err = build_pipeline(&config, &Credentials::default()).err().unwrap();
        assert!(matches!(err, Error::Config(ref m) if m.contains("missing.json")));
    }

    #[test]
    fn test_missing_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let err = build_pipeline(&config, &Credentials::default()).err().unwrap();
        assert!(matches!(err, Error::Config(ref m) if m.contains(LANDING_API_KEY_ENV)));

        let mut openai = config.clone();
        openai.extraction.backend = ExtractionBackend::OpenAi;
        let err = build_pipeline(&openai, &Credentials::default()).err().unwrap();
        assert!(matches!(err, Error::Config(ref m) if m.contains(OPENAI_API_KEY_ENV)));
    }

    #[test]
    fn test_builds_local_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let credentials = Credentials {
            landing_api_key: Some("key".to_string()),
            ..Default::default()
        };

        let (driver, sink) = build_pipeline(&config, &credentials).unwrap();
        assert_eq!(driver.lister().name(), "file-list");
        assert!(sink.path().starts_with(dir.path()));
        assert!(!sink.path().exists());
    }

    #[test]
    fn test_drive_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.source.kind = SourceKind::Drive;
        config.source.drive.folder_id = Some("src".to_string());
        config.source.drive.done_folder_id = Some("done".to_string());

        let result = build_source(&config, &Credentials::default(), &reqwest::Client::new());
        assert!(matches!(result, Err(Error::Config(ref m)) if m.contains(DRIVE_ACCESS_TOKEN_ENV)));

        let credentials = Credentials {
            drive_access_token: Some("ya29.token".to_string()),
            ..Default::default()
        };
        let parts = build_source(&config, &credentials, &reqwest::Client::new()).unwrap();
        assert_eq!(parts.lister.name(), "drive");
    }
}
