pub mod app;
pub mod cli;
pub mod config;
pub mod history;
pub mod ids;
pub mod journaling;
pub mod model;
pub mod storage;
pub mod store;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::{Draft, Note, NoteField, NoteId};
pub use store::{DraftConflict, NoteStore};
