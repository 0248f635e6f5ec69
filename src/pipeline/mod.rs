//! The triplet pipeline: crawlers and the change-log ingester produce
//! semi-triplets, the assembler joins them into full triplets, and the
//! processor decides and executes one action per item under the dependency
//! graph's ordering.

pub mod assembler;
pub mod changelog;
pub mod context;
pub mod deps;
pub mod local_crawler;
pub mod processor;
pub mod remote_crawler;

pub use assembler::{assemble_changelog, assemble_crawled};
pub use changelog::{IngestOutcome, ingest};
pub use context::{Cancelled, PipelineChannels, SyncContext, create_pipeline_channels};
pub use deps::{ItemDependencies, Outcome, Readiness};
pub use local_crawler::spawn_local_crawler;
pub use processor::{SyncReport, run_processor};
pub use remote_crawler::{RemoteBuffer, spawn_remote_crawler};
