//! `open-data-sync` mirrors published statistical tables into Parquet on object storage and exposes
//! them as external tables in an analytical warehouse, re-processing a dataset only when its source
//! changed.
//!
//! One synchronization unit per dataset:
//!
//! 1. [`staleness::decide`] compares the source `Modified` watermark with the one recorded on the
//!    warehouse dataset and skips datasets that are up to date.
//! 2. The [`source::DatasetSource`] downloads the files into a fresh [`staging::StagingDirectory`];
//!    zip archives are extracted.
//! 3. [`convert::convert`] turns every delimited, spreadsheet or fixed-width file into Parquet
//!    (or NDJSON for fixed-width on request), inferring column types.
//! 4. [`upload::ObjectStoreUploader`] copies the artifacts to a [`storage::BlobStore`].
//! 5. [`publish::CatalogPublisher`] replaces the warehouse dataset and links one external table
//!    per object, then records the watermark.
//! 6. The staging directory is released, whatever happened.
//!
//! [`orchestrator::SyncOrchestrator`] runs units for a batch of descriptors on a bounded rayon
//! pool ([`execution::BatchExecutor`]); one dataset's failure never affects another.
//!
//! ## Converting a single file
//!
//! ```no_run
//! use open_data_sync::convert::{convert, DelimitedOptions, FormatOptions, TextEncoding};
//!
//! # fn main() -> Result<(), open_data_sync::ConvertError> {
//! let options = FormatOptions::Delimited(DelimitedOptions {
//!     delimiter: b';',
//!     encoding: TextEncoding::Latin1,
//! });
//! convert("kwb-2019.csv", "kwb-2019.parquet", &options)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a batch
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use open_data_sync::config::SyncConfig;
//! use open_data_sync::model::DatasetDescriptor;
//! use open_data_sync::orchestrator::SyncOrchestrator;
//! use open_data_sync::source::{SourceFile, StaticSource};
//! use open_data_sync::storage::LocalBlobStore;
//! use open_data_sync::warehouse::InMemoryWarehouse;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let kwb = DatasetDescriptor::new("kwb_2019").with_source("cbs");
//! let source = StaticSource::new().with_dataset(&kwb, "2021-05-01", vec![SourceFile::new("kwb-2019.csv")]);
//! let store = Arc::new(LocalBlobStore::new("/var/tmp/bucket", "dataverbinders-dev")?);
//! let warehouse = Arc::new(InMemoryWarehouse::with_store(store.clone()));
//!
//! let orchestrator = SyncOrchestrator::new(&config, "EU", Arc::new(source), store, warehouse);
//! let report = orchestrator.run_batch(&[kwb], false);
//! println!("synced={} skipped={}", report.synced_count(), report.skipped_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`staleness`]: skip/process decision
//! - [`convert`]: source-format conversion, archive extraction, artifact inspection
//! - [`staging`]: per-run working directories
//! - [`storage`] and [`upload`]: blob store seam and uploader
//! - [`warehouse`] and [`publish`]: warehouse seam and dataset (re)publishing
//! - [`orchestrator`] and [`execution`]: per-dataset units and bounded fan-out
//! - [`config`], [`observability`], [`error`]: ambient concerns
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod convert;
pub mod error;
pub mod execution;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod publish;
pub mod source;
pub mod staging;
pub mod staleness;
pub mod storage;
pub mod types;
pub mod upload;
pub mod warehouse;

pub use error::{ConvertError, PublishError, SyncError, SyncResult};
