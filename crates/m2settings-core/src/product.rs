//! Server product configuration trait for CLI binaries
//!
//! This trait defines what a binary must supply to download settings from a
//! particular repository manager product.

use crate::templates::CustomizerChain;
use std::path::PathBuf;

/// Configuration trait for the targeted server product
///
/// Each product implements this trait to define:
/// - Product identity (name, display name, user agent)
/// - The compatibility gate (required edition and version constraint)
/// - Where the server URL and output file come from by default
/// - Which customizers contribute template values
pub trait ServerProduct: Clone + Send + Sync + 'static {
    /// Internal product name (used for CLI command, env vars)
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// Short edition name the server must report, compared case-sensitively
    fn required_edition(&self) -> &'static str;

    /// Range of server versions that serve settings templates, e.g. `[2.3,)`
    fn version_constraint(&self) -> &'static str;

    /// Environment variable consulted for the server URL before prompting
    fn url_env(&self) -> &'static str;

    /// Settings file written when no output path is given
    fn default_output_file(&self) -> Option<PathBuf>;

    /// Customizers applied to every template, in order
    fn customizers(&self) -> CustomizerChain {
        CustomizerChain::new()
    }

    /// User agent string for HTTP requests
    fn user_agent(&self) -> &'static str {
        self.name()
    }
}
