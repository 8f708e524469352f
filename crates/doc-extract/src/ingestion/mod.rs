//! Document conversion

pub mod converter;

pub use converter::{FormatConverter, LocalConverter};
