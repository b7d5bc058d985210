pub mod ai;
pub mod cache;
pub mod config;
pub mod database;
pub mod detector;
pub mod gateway;
pub mod generator;
pub mod launcher;
pub mod listing;
pub mod scheduler;
pub mod substitution;
mod time;

pub use ai::{
    CloudTranslator, ProviderError, ProviderKind, ProviderOutcome, ProxyTranslator,
    TranslationProvider,
};
pub use cache::{CachedTranslation, TranslationCache};
pub use config::{BatchConfig, ConfigError, GatewaySettings, LogLevel, ProviderSettings, Settings};
pub use database::{DatabaseEntry, DatabaseError, EntryStatus, TranslationDatabase};
pub use detector::{display_name, needs_translation, normalized_base_name};
pub use gateway::{router, run_gateway, GatewayError, GatewayState};
pub use generator::{BulkGenerator, GenerateOptions, GenerationReport, GeneratorError};
pub use launcher::{open_default, open_with, LaunchError};
pub use listing::{collect_files, list_directory, DirectoryEntry};
pub use scheduler::{BatchScheduler, TranslationOutcome};
pub use substitution::{SubstitutionError, SubstitutionTable};
pub use time::now_rfc3339;
