//! Translation services: storage, locking, content access and the
//! orchestrator that ties them to a provider.

pub mod content_source;
pub mod item_lock;
pub mod orchestrator;
pub mod translation_store;
