pub mod ai;
pub mod config;
pub mod extraction;
pub mod feedback;
pub mod history;
pub mod naming;
pub mod organizer;
pub mod processor;
pub mod watcher;

pub use config::{AppConfig, ConfigStore};
pub use processor::{DocumentProcessor, ProcessingResult};
pub use watcher::{FileWatcher, WatcherEvent};
