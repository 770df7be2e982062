//! Core data models for the photo gallery.
//!
//! `photo` holds the JSON shapes served to the front end; `data_url` turns
//! upload payloads into raw image bytes.

pub mod data_url;
pub mod photo;
