//! Domain models

pub mod image;

pub use image::{ImageKind, ImageOwner, ImageRecord, NewImageRecord};
