//! Shopmedia Storage Library
//!
//! This crate provides the physical layer for the canonical media tree: the
//! [`ImageVault`], which performs all filesystem writes through a
//! temp-then-atomic-rename protocol, and thumbnail derivation.
//!
//! # Path format
//!
//! All vault operations take canonical *relative* paths produced by
//! `shopmedia_core::paths::resolve`. The vault re-rejects traversal
//! sequences (`..`, leading `/`) even though the resolver cannot produce
//! them. Paths must not contain `\`; separators are always `/`.

pub mod thumbnail;
pub mod vault;

// Re-export commonly used types
pub use thumbnail::{derive_thumbnail, extension_for, sniff_format};
pub use vault::{ImageVault, VaultError, VaultResult};
