//! m2settings Core - Shared library for settings template downloaders
//!
//! This library fetches a named settings template from a repository manager
//! and saves it as a local settings file with its `$[token]` placeholders
//! filled in. It is designed to be driven by CLI binaries that supply a
//! `ServerProduct` describing the server they target.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Layer 1: Core Operations** - Version gate, token interpolation, safe file output
//! - **Layer 2: Collaborators** - `Connector`/`Session` for the server, `LineReader` for input
//! - **Layer 3: Workflow Orchestration** - `Downloader` sequencing a single run
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the terminal `ConsoleReader`
//!
//! # Example Usage
//!
//! ```ignore
//! use m2settings_core::{DownloadArgs, DownloadConfig, Downloader, LogReporter, NexusConnector};
//! use m2settings_core::prompt::{ConsoleReader, PromptSession};
//!
//! let config = DownloadConfig::resolve(&product, DownloadArgs::default())?;
//! let connector = NexusConnector::new(product.user_agent());
//! let mut reporter = LogReporter;
//! let prompts = PromptSession::new(ConsoleReader::new()?);
//! let report = Downloader::new(&product, &connector, prompts, &mut reporter)
//!     .run(config)
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod download;
pub mod product;
pub mod prompt;
pub mod templates;
pub mod version;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use client::{Connector, NexusConnector, ServerStatus, Session};
pub use config::{DownloadArgs, DownloadConfig};
pub use download::{DownloadError, DownloadReport, Downloader, Failure, LogReporter, Reporter, Stage};
pub use product::ServerProduct;
pub use templates::{Customizer, CustomizerChain, InterpolationContext, Interpolator};
pub use version::{check_compatible, Version, VersionConstraint};
pub use writer::{OutputTarget, TextEncoding};
