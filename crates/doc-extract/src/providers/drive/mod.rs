//! Google Drive source, fetcher and completion marker

pub mod auth;
pub mod store;

pub use auth::{AccessTokenProvider, AuthorizedUserToken, StaticToken};
pub use store::DriveStore;
