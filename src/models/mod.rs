//! Data models for the fieldwork database.
//!
//! Versioned records (forms, collections) split into an identity and a
//! snapshot; the snapshot is what backups store.

mod backup;
mod collection;
mod file;
mod form;
mod form_search;
mod mini;
mod settings;
mod tag;
pub mod time;
mod user;

pub use backup::*;
pub use collection::*;
pub use file::*;
pub use form::*;
pub use form_search::*;
pub use mini::*;
pub use settings::*;
pub use tag::*;
pub use user::*;
