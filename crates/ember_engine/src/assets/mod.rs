//! Asset loading
//!
//! CPU-side asset decoding feeding the GPU upload paths. Parsing of full
//! scene formats lives outside this crate; only image data is handled here.

pub mod image_loader;

pub use image_loader::ImageData;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset could not be loaded or decoded
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),
}
