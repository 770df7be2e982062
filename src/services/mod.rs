//! Gallery services: photo orchestration, the in-memory metadata store and
//! the pluggable byte storage beneath them.

pub mod metadata_store;
pub mod photo_service;
pub mod storage;
