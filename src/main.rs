//! Headless entry point: wires the watcher, processing pipeline and stores
//! together and runs until interrupted. UI shells (tray, notifications)
//! consume the same library surface.

use parafile::ai::{Categorizer, DocumentAi, OpenAiClient};
use parafile::config::ConfigStore;
use parafile::extraction::TextExtractor;
use parafile::feedback::FeedbackStore;
use parafile::history::LogStore;
use parafile::organizer::FileOrganizer;
use parafile::processor::DocumentProcessor;
use parafile::watcher::{FileWatcher, WatcherEvent};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), String> {
    // Load .env for OPENAI_API_KEY during development
    let _ = dotenvy::dotenv();

    // Initialize tracing with RUST_LOG env filter.
    // Default: warn for most crates, info for our app.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,parafile=info")),
        )
        .init();

    let config_store = ConfigStore::new()?;
    let config = config_store.load();

    if config.watched_folder.is_empty() {
        return Err(
            "No watched folder configured. Set watched_folder in the config file.".to_string(),
        );
    }

    let ai: Arc<dyn DocumentAi> = Arc::new(OpenAiClient::new());
    let feedback = FeedbackStore::new()?;
    let log = Arc::new(LogStore::new()?);

    let (watcher, mut events) = FileWatcher::new(config.watcher.clone());

    let processor = Arc::new(DocumentProcessor::new(
        config_store,
        TextExtractor::new(ai.clone()),
        Categorizer::new(ai),
        feedback,
        log.clone(),
        FileOrganizer::new(Arc::new(watcher.clone())),
    ));

    watcher.start(Path::new(&config.watched_folder))?;

    let dispatcher = {
        let processor = processor.clone();
        let log = log.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    WatcherEvent::Started {
                        root,
                        existing_files,
                    } => {
                        tracing::info!(
                            "Watching {} ({} documents already present)",
                            root.display(),
                            existing_files
                        );
                    }
                    WatcherEvent::FileDetected(file_event) => {
                        // Each file is an independent pipeline; failures stay
                        // contained in their own result record
                        let processor = processor.clone();
                        let log = log.clone();
                        tokio::spawn(async move {
                            let result = processor.process_document(&file_event).await;
                            if let Err(e) = log.add_entry(&result) {
                                tracing::error!("Failed to write log entry: {}", e);
                            }
                        });
                    }
                    WatcherEvent::FileMovedByUser { file_name, .. } => {
                        tracing::info!("{} was moved back by the user; leaving it alone", file_name);
                    }
                    WatcherEvent::Error(message) => {
                        tracing::error!("Watcher error: {}", message);
                    }
                    WatcherEvent::Stopped => break,
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;

    tracing::info!("Shutting down");
    watcher.stop();
    let _ = dispatcher.await;

    Ok(())
}
