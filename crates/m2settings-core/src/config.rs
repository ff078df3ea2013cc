//! Download inputs and their resolved configuration

use crate::product::ServerProduct;
use crate::templates::UnknownTokenPolicy;
use crate::version::{VersionConstraint, VersionError};
use crate::writer::{
    validate_timestamp_format, OutputTarget, TextEncoding, WriteError,
    DEFAULT_BACKUP_TIMESTAMP_FORMAT,
};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No output file given and no home directory to default to")]
    NoOutputFile,

    #[error(transparent)]
    Output(#[from] WriteError),

    #[error("Invalid version constraint '{expr}'")]
    Constraint {
        expr: String,
        #[source]
        source: VersionError,
    },
}

/// Raw inputs for a download; anything missing is defaulted or prompted for
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    /// Server base URL
    pub url: Option<String>,

    /// User to connect as
    pub username: Option<String>,

    /// Password of the user
    pub password: Option<String>,

    /// Template to download
    pub template: Option<String>,

    /// Refuse plaintext http URLs
    pub secure: bool,

    /// File to save content to
    pub output: Option<PathBuf>,

    /// Output text encoding
    pub encoding: Option<String>,

    /// Back up an existing output file before overwriting
    pub backup: bool,

    /// strftime suffix appended to backup file names
    pub backup_timestamp_format: String,

    /// Fail on tokens with no value instead of leaving them in place
    pub strict: bool,
}

impl Default for DownloadArgs {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            template: None,
            secure: true,
            output: None,
            encoding: None,
            backup: true,
            backup_timestamp_format: DEFAULT_BACKUP_TIMESTAMP_FORMAT.to_string(),
            strict: false,
        }
    }
}

/// Validated configuration for one download
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub template: Option<String>,
    pub secure: bool,
    /// Suggested when prompting for the username
    pub default_username: String,
    pub required_edition: String,
    pub constraint: VersionConstraint,
    pub output: OutputTarget,
    pub token_policy: UnknownTokenPolicy,
}

/// Treat blank strings as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Name of the current OS user
pub fn current_username() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| non_blank(std::env::var(var).ok()))
        .unwrap_or_default()
}

/// `<home>/.m2/settings.xml`
pub fn default_settings_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".m2").join("settings.xml"))
}

impl DownloadConfig {
    /// Apply defaults from the product and environment, validating eagerly
    pub fn resolve<P: ServerProduct>(product: &P, args: DownloadArgs) -> Result<Self, ConfigError> {
        let url = non_blank(args.url).or_else(|| non_blank(std::env::var(product.url_env()).ok()));

        let path = args
            .output
            .or_else(|| product.default_output_file())
            .ok_or(ConfigError::NoOutputFile)?;

        let encoding = non_blank(args.encoding)
            .map(|name| name.parse::<TextEncoding>())
            .transpose()?;

        validate_timestamp_format(&args.backup_timestamp_format)?;

        let expr = product.version_constraint();
        let constraint =
            VersionConstraint::parse(expr).map_err(|source| ConfigError::Constraint {
                expr: expr.to_string(),
                source,
            })?;

        Ok(Self {
            url,
            username: non_blank(args.username),
            password: non_blank(args.password),
            template: non_blank(args.template),
            secure: args.secure,
            default_username: current_username(),
            required_edition: product.required_edition().to_string(),
            constraint,
            output: OutputTarget {
                path,
                encoding,
                backup: args.backup,
                backup_timestamp_format: args.backup_timestamp_format,
            },
            token_policy: if args.strict {
                UnknownTokenPolicy::Fail
            } else {
                UnknownTokenPolicy::Keep
            },
        })
    }
}
