//! # Formats Module
//!
//! Binary encoding of stored records.
//!
//! This module contains:
//! - The record envelope (magic + format version + postcard body)
//!
//! Note: file and database I/O stays in `storage`. This module only handles
//! format conversion (pure transformations).

mod record;

pub use record::*;
