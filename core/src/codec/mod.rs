//! Image decoding and validation primitives.

pub mod image;

pub use image::{DecodedImage, decode_page};

pub type Result<T> = crate::Result<T>;
