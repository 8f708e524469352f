//! Provider abstractions for document sources and extraction services
//!
//! This module provides trait-based abstractions that allow switching between
//! local and Google Drive sources, and between LandingAI and OpenAI backends.

pub mod drive;
pub mod extraction;
pub mod http;
pub mod landing;
pub mod local;
pub mod openai;
pub mod source;

pub use drive::{AccessTokenProvider, AuthorizedUserToken, DriveStore, StaticToken};
pub use extraction::{DocumentParser, ExtractionClient};
pub use landing::LandingClient;
pub use local::{DirectorySource, FileListSource, LocalCompletion, LocalFetcher};
pub use openai::OpenAiClient;
pub use source::{CompletionMarker, ContentFetcher, SourceLister};
