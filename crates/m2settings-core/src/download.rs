//! Download workflow
//!
//! Sequences a single run: prompt for missing inputs, connect, verify the
//! server, pick a template, fetch it, back up the old file, interpolate and
//! write. Any failure ends the run in a single `Failure` that records the
//! stage it happened in. The remote session is always closed before `run`
//! returns.

use crate::client::{
    is_insecure, ClientError, ConnectionRequest, Connector, Secret, ServerStatus, Session,
};
use crate::config::{ConfigError, DownloadConfig};
use crate::product::ServerProduct;
use crate::prompt::{LineReader, PromptError, PromptSession};
use crate::templates::{InterpolationContext, InterpolationError, Interpolator};
use crate::version::{check_compatible, Incompatible};
use crate::writer::{self, WriteError};
use chrono::Local;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Steps of a download run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Prompting,
    Connecting,
    Verifying,
    Listing,
    FetchingContent,
    BackingUp,
    Interpolating,
    Writing,
    Done,
    /// Terminal state of a failed run; `Failure::stage` keeps where it failed
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Prompting => "prompting",
            Stage::Connecting => "connecting",
            Stage::Verifying => "verifying",
            Stage::Listing => "listing",
            Stage::FetchingContent => "fetching content",
            Stage::BackingUp => "backing up",
            Stage::Interpolating => "interpolating",
            Stage::Writing => "writing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything that can end a download run
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid configuration")]
    Config(#[source] ConfigError),

    #[error("Input aborted")]
    Prompt(#[source] PromptError),

    #[error("Connection failed")]
    Connection(#[source] ClientError),

    #[error("Insecure protocol: {url}")]
    InsecureProtocol { url: Url },

    #[error(transparent)]
    Incompatible(#[from] Incompatible),

    #[error("Unable to list templates")]
    TemplateList(#[source] ClientError),

    #[error("There are no accessible templates available")]
    EmptyTemplateList,

    #[error("Unable to fetch content for template: {id}")]
    ContentFetch {
        id: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to backup file: {}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: WriteError,
    },

    #[error("Failed to interpolate template: {id}")]
    Interpolation {
        id: String,
        #[source]
        source: InterpolationError,
    },

    #[error("Failed to save content to: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
}

/// Wrappers that only add a path or URL are skipped when looking for a
/// meaningful cause
fn is_wrapper(err: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = err.downcast_ref::<ClientError>() {
        return matches!(err, ClientError::Transport { .. });
    }
    if let Some(err) = err.downcast_ref::<WriteError>() {
        return matches!(err, WriteError::Io { .. } | WriteError::Backup { .. });
    }
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return matches!(err, ConfigError::Constraint { .. });
    }
    err.is::<reqwest::Error>()
}

impl DownloadError {
    /// The most specific underlying cause, looking through at most two
    /// wrapper levels
    pub fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        let mut cause = self.source()?;
        for _ in 0..2 {
            if !is_wrapper(cause) {
                break;
            }
            match cause.source() {
                Some(inner) => cause = inner,
                None => break,
            }
        }
        Some(cause)
    }
}

/// A failed run: where it stopped and why
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub error: DownloadError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(cause) = self.error.cause() {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Failure {
            stage: Stage::Init,
            error: DownloadError::Config(err),
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub status: ServerStatus,
    pub template_id: String,
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    /// Customizers that failed and were skipped
    pub skipped_customizers: Vec<String>,
}

/// Receives progress notifications
pub trait Reporter {
    fn stage(&mut self, stage: Stage) {
        log::debug!("Stage: {}", stage);
    }

    fn info(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn warning(&mut self, message: &str) {
        log::warn!("{}", message);
    }
}

/// Reports progress through the `log` facade only
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {}

/// Runs downloads for a product
pub struct Downloader<'a, P, R> {
    product: &'a P,
    connector: &'a dyn Connector,
    prompts: PromptSession<R>,
    reporter: &'a mut dyn Reporter,
    stage: Stage,
}

impl<'a, P: ServerProduct, R: LineReader> Downloader<'a, P, R> {
    pub fn new(
        product: &'a P,
        connector: &'a dyn Connector,
        prompts: PromptSession<R>,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            product,
            connector,
            prompts,
            reporter,
            stage: Stage::Init,
        }
    }

    /// Stage the last run reached
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn prompts(&self) -> &PromptSession<R> {
        &self.prompts
    }

    /// Execute one download, always releasing the session afterwards
    pub async fn run(&mut self, config: DownloadConfig) -> Result<DownloadReport, Failure> {
        self.stage = Stage::Init;
        let mut session: Option<Box<dyn Session>> = None;

        let result = self.execute(config, &mut session).await;

        if let Some(mut session) = session.take() {
            if let Err(e) = session.close().await {
                log::debug!("Ignoring failure to close session: {}", e);
            }
        }

        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(failure) => {
                log::debug!("Failing at {}: {:?}", failure.stage, failure.error);
                self.enter(Stage::Failed);
            }
        }
        result
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.reporter.stage(stage);
    }

    fn fail(&self, error: DownloadError) -> Failure {
        Failure {
            stage: self.stage,
            error,
        }
    }

    async fn execute(
        &mut self,
        config: DownloadConfig,
        slot: &mut Option<Box<dyn Session>>,
    ) -> Result<DownloadReport, Failure> {
        // Request details from the user for anything missing
        self.enter(Stage::Prompting);
        let request = self.request(&config).map_err(|e| self.fail(DownloadError::Prompt(e)))?;

        self.enter(Stage::Connecting);
        let base_url = request
            .base_url()
            .map_err(|e| self.fail(DownloadError::Connection(e)))?;
        if is_insecure(&base_url) {
            if config.secure {
                return Err(self.fail(DownloadError::InsecureProtocol { url: base_url }));
            }
            self.reporter
                .warning(&format!("Insecure protocol: {}", base_url));
        }
        self.reporter.info(&format!(
            "Connecting to: {} (as {})",
            base_url, request.username
        ));
        let session = slot.insert(
            self.connector
                .connect(&request)
                .await
                .map_err(|e| self.fail(DownloadError::Connection(e)))?,
        );

        self.enter(Stage::Verifying);
        let status = session.status().clone();
        check_compatible(&status, &config.required_edition, &config.constraint)
            .map_err(|e| self.fail(e.into()))?;
        self.reporter
            .info(&format!("Connected: {} {}", status.app_name, status.version));

        self.enter(Stage::Listing);
        let template_id = match &config.template {
            Some(id) => id.clone(),
            None => self.select_template(&**session).await?,
        };

        self.enter(Stage::FetchingContent);
        self.reporter
            .info(&format!("Fetching content for template: {}", template_id));
        let content = session
            .fetch_content(&template_id)
            .await
            .map_err(|source| {
                self.fail(DownloadError::ContentFetch {
                    id: template_id.clone(),
                    source,
                })
            })?;
        log::debug!("Content: {}", content);

        self.enter(Stage::BackingUp);
        let output = &config.output;
        let backup = writer::backup(output, Local::now()).map_err(|source| {
            self.fail(DownloadError::Backup {
                path: output.path.clone(),
                source,
            })
        })?;
        if let Some(backup) = &backup {
            self.reporter.info(&format!(
                "Backed up: {} to: {}",
                output.path.display(),
                backup.display()
            ));
        }

        self.enter(Stage::Interpolating);
        let mut context = InterpolationContext::new();
        let skipped_customizers = self
            .product
            .customizers()
            .apply(&**session, &mut context)
            .await;
        for name in &skipped_customizers {
            self.reporter
                .warning(&format!("Template customization '{}' failed; ignoring", name));
        }
        let rendered = Interpolator::new(context)
            .with_policy(config.token_policy)
            .interpolate(&content)
            .map_err(|source| {
                self.fail(DownloadError::Interpolation {
                    id: template_id.clone(),
                    source,
                })
            })?;

        self.enter(Stage::Writing);
        self.reporter
            .info(&format!("Saving content to: {}", output.path.display()));
        writer::write_content(output, &rendered).map_err(|source| {
            self.fail(DownloadError::Write {
                path: output.path.clone(),
                source,
            })
        })?;

        Ok(DownloadReport {
            status,
            template_id,
            output: output.path.clone(),
            backup,
            skipped_customizers,
        })
    }

    fn request(&mut self, config: &DownloadConfig) -> Result<ConnectionRequest, PromptError> {
        let url = match &config.url {
            Some(url) => url.trim().to_string(),
            None => self.prompts.prompt_required("Server URL")?,
        };
        let username = match &config.username {
            Some(username) => username.trim().to_string(),
            None if config.default_username.is_empty() => {
                self.prompts.prompt_required("Username")?
            }
            None => self
                .prompts
                .prompt_with_default("Username", &config.default_username)?,
        };
        let secret = match &config.password {
            Some(password) => password.clone(),
            None => self.prompts.prompt_masked("Password")?,
        };
        Ok(ConnectionRequest::new(url, username, Secret::new(secret)))
    }

    async fn select_template(&mut self, session: &dyn Session) -> Result<String, Failure> {
        let templates = match session.list_templates().await {
            Ok(templates) if !templates.is_empty() => templates,
            Ok(_) | Err(ClientError::NoTemplates) => {
                return Err(self.fail(DownloadError::EmptyTemplateList))
            }
            Err(e) => return Err(self.fail(DownloadError::TemplateList(e))),
        };

        let ids: Vec<String> = templates.into_iter().map(|t| t.id).collect();
        self.prompts
            .prompt_choice("Available Templates", "Select Template", &ids)
            .map_err(|e| self.fail(DownloadError::Prompt(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadArgs;
    use crate::templates::UnknownTokenPolicy;
    use crate::testing::{FakeConnector, FakeSession, ScriptedReader, TestProduct};
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    const TEMPLATE: &str =
        "<server><username>$[userToken.nameCode]</username><url>$[nexus.baseUrl]</url><x>$[unknown]</x></server>";

    #[derive(Default)]
    struct RecordingReporter {
        stages: Vec<Stage>,
        warnings: Vec<String>,
    }

    impl Reporter for RecordingReporter {
        fn stage(&mut self, stage: Stage) {
            self.stages.push(stage);
        }

        fn info(&mut self, _message: &str) {}

        fn warning(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }
    }

    fn config_in(dir: &TempDir, args: DownloadArgs) -> DownloadConfig {
        let args = DownloadArgs {
            output: Some(dir.path().join("settings.xml")),
            ..args
        };
        let mut config = DownloadConfig::resolve(&TestProduct::default(), args).unwrap();
        config.default_username = "dev".to_string();
        config
    }

    fn full_args() -> DownloadArgs {
        DownloadArgs {
            url: Some("https://repo.example.com/nexus".to_string()),
            username: Some("deployer".to_string()),
            password: Some("secret".to_string()),
            ..DownloadArgs::default()
        }
    }

    struct Run {
        result: Result<DownloadReport, Failure>,
        reader: ScriptedReader,
        reporter: RecordingReporter,
        connector: FakeConnector,
    }

    async fn run(session: FakeSession, answers: &[&str], config: DownloadConfig) -> Run {
        let product = TestProduct::default();
        let connector = FakeConnector::new(session);
        let mut reporter = RecordingReporter::default();
        let mut downloader = Downloader::new(
            &product,
            &connector,
            PromptSession::new(ScriptedReader::new(answers)),
            &mut reporter,
        );
        let result = downloader.run(config).await;
        let reader = downloader.prompts.into_inner();
        Run {
            result,
            reader,
            reporter,
            connector,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_with_backup() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, full_args());
        fs::write(&config.output.path, "old").unwrap();

        let session = FakeSession::pro("2.5")
            .with_template("default", TEMPLATE)
            .with_template("other", "unused")
            .with_user_token("nc", "pc");
        let calls = session.calls();

        let run = run(session, &["0"], config).await;
        let report = run.result.unwrap();

        assert_eq!(report.template_id, "default");
        assert!(report.skipped_customizers.is_empty());
        assert_eq!(
            fs::read_to_string(&report.output).unwrap(),
            "<server><username>nc</username><url>https://repo.example.com/nexus</url><x>$[unknown]</x></server>"
        );
        assert_eq!(fs::read_to_string(report.backup.unwrap()).unwrap(), "old");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.connects, 1);
        assert_eq!(calls.listings, 1);
        assert_eq!(calls.fetched, vec!["default"]);
        assert_eq!(calls.closes, 1);

        assert_eq!(
            run.reporter.stages,
            vec![
                Stage::Prompting,
                Stage::Connecting,
                Stage::Verifying,
                Stage::Listing,
                Stage::FetchingContent,
                Stage::BackingUp,
                Stage::Interpolating,
                Stage::Writing,
                Stage::Done,
            ]
        );
        assert_eq!(run.reader.printed[0], "Available Templates:");
    }

    #[tokio::test]
    async fn test_prompts_for_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, DownloadArgs::default());
        let session = FakeSession::pro("2.3").with_template("default", "plain");

        let run = run(
            session,
            &["", " https://repo.example.com/nexus ", "", "s3cret", "default"],
            config,
        )
        .await;
        run.result.unwrap();

        let requests = run.connector.requests.lock().unwrap();
        assert_eq!(requests[0].server_url, "https://repo.example.com/nexus");
        assert_eq!(requests[0].username, "dev");
        assert_eq!(requests[0].secret.expose(), "s3cret");

        let prompts: Vec<&str> = run.reader.prompts.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            prompts,
            vec![
                "Server URL: ",
                "Server URL: ",
                "Username [dev]: ",
                "Password: ",
                "Select Template: ",
            ]
        );
    }

    #[tokio::test]
    async fn test_wrong_edition_fails_before_fetch() {
        let dir = TempDir::new().unwrap();
        let session = FakeSession::new("OSS", "2.5").with_template("default", TEMPLATE);
        let calls = session.calls();

        let run = run(session, &[], config_in(&dir, full_args())).await;
        let failure = run.result.unwrap_err();

        assert_eq!(failure.stage, Stage::Verifying);
        assert_eq!(run.reporter.stages.last(), Some(&Stage::Failed));
        assert!(matches!(
            &failure.error,
            DownloadError::Incompatible(e) if e.reason() == "edition"
        ));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.listings, 0);
        assert!(calls.fetched.is_empty());
        assert_eq!(calls.closes, 1);
        assert!(!dir.path().join("settings.xml").exists());
    }

    #[tokio::test]
    async fn test_old_version_rejected() {
        let dir = TempDir::new().unwrap();
        let session = FakeSession::pro("2.2.9").with_template("default", TEMPLATE);

        let failure = run(session, &[], config_in(&dir, full_args()))
            .await
            .result
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Verifying);
        assert!(matches!(
            &failure.error,
            DownloadError::Incompatible(e) if e.reason() == "version"
        ));
    }

    #[tokio::test]
    async fn test_insecure_url_refused_when_secure() {
        let dir = TempDir::new().unwrap();
        let args = DownloadArgs {
            url: Some("http://repo.example.com/nexus".to_string()),
            ..full_args()
        };
        let session = FakeSession::pro("2.5").with_template("default", TEMPLATE);
        let calls = session.calls();

        let failure = run(session, &[], config_in(&dir, args))
            .await
            .result
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Connecting);
        assert!(matches!(failure.error, DownloadError::InsecureProtocol { .. }));
        assert_eq!(calls.lock().unwrap().connects, 0);
    }

    #[tokio::test]
    async fn test_insecure_url_warns_when_allowed() {
        let dir = TempDir::new().unwrap();
        let args = DownloadArgs {
            url: Some("http://repo.example.com/nexus".to_string()),
            secure: false,
            template: Some("default".to_string()),
            ..full_args()
        };
        let session = FakeSession::pro("2.5").with_template("default", "x");

        let run = run(session, &[], config_in(&dir, args)).await;

        assert!(run.result.is_ok());
        assert!(run
            .reporter
            .warnings
            .iter()
            .any(|w| w.starts_with("Insecure protocol")));
    }

    #[tokio::test]
    async fn test_given_template_skips_listing() {
        let dir = TempDir::new().unwrap();
        let args = DownloadArgs {
            template: Some("other".to_string()),
            backup: false,
            ..full_args()
        };
        let session = FakeSession::pro("2.5")
            .with_template("default", "a")
            .with_template("other", "b");
        let calls = session.calls();

        let run = run(session, &[], config_in(&dir, args)).await;
        let report = run.result.unwrap();

        assert_eq!(fs::read_to_string(report.output).unwrap(), "b");
        // No token for the user-token customizer; it is skipped, not fatal
        assert_eq!(report.skipped_customizers, vec!["user-token"]);
        assert_eq!(calls.lock().unwrap().listings, 0);
        assert!(run.reader.prompts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_template_list() {
        let dir = TempDir::new().unwrap();
        let session = FakeSession::pro("2.5");
        let calls = session.calls();

        let failure = run(session, &[], config_in(&dir, full_args()))
            .await
            .result
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Listing);
        assert!(matches!(failure.error, DownloadError::EmptyTemplateList));
        assert_eq!(calls.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_missing_template_content() {
        let dir = TempDir::new().unwrap();
        let args = DownloadArgs {
            template: Some("ghost".to_string()),
            ..full_args()
        };
        let session = FakeSession::pro("2.5").with_template("default", "a");

        let failure = run(session, &[], config_in(&dir, args))
            .await
            .result
            .unwrap_err();

        assert_eq!(failure.stage, Stage::FetchingContent);
        assert_eq!(
            failure.to_string(),
            "Unable to fetch content for template: ghost: Template not found: ghost"
        );
    }

    #[tokio::test]
    async fn test_strict_policy_fails_interpolation() {
        let dir = TempDir::new().unwrap();
        let args = DownloadArgs {
            template: Some("default".to_string()),
            ..full_args()
        };
        let mut config = config_in(&dir, args);
        config.token_policy = UnknownTokenPolicy::Fail;
        let session = FakeSession::pro("2.5").with_template("default", TEMPLATE);

        let failure = run(session, &[], config).await.result.unwrap_err();

        assert_eq!(failure.stage, Stage::Interpolating);
        assert!(matches!(failure.error, DownloadError::Interpolation { .. }));
    }

    #[tokio::test]
    async fn test_interrupted_prompt_still_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let session = FakeSession::pro("2.5").with_template("default", "a");
        let calls = session.calls();

        let failure = run(session, &[], config_in(&dir, DownloadArgs::default()))
            .await
            .result
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Prompting);
        assert!(matches!(failure.error, DownloadError::Prompt(_)));
        assert_eq!(calls.lock().unwrap().connects, 0);
    }

    #[test]
    fn test_failure_message_keeps_io_cause() {
        let path = PathBuf::from("/etc/settings.xml");
        let failure = Failure {
            stage: Stage::Writing,
            error: DownloadError::Write {
                path: path.clone(),
                source: WriteError::Io {
                    path: path.clone(),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                },
            },
        };
        let message = failure.to_string();
        assert!(message.starts_with("Failed to save content to: /etc/settings.xml: "));
        assert!(message.to_lowercase().contains("permission denied"), "{}", message);

        let failure = Failure {
            stage: Stage::BackingUp,
            error: DownloadError::Backup {
                path: path.clone(),
                source: WriteError::Backup {
                    from: path.clone(),
                    to: PathBuf::from("/etc/settings.xml-20240309140507"),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                },
            },
        };
        assert!(failure.to_string().to_lowercase().contains("permission denied"));
    }

    #[test]
    fn test_failure_message_uses_specific_cause() {
        let failure = Failure {
            stage: Stage::Connecting,
            error: DownloadError::Connection(ClientError::Unauthorized {
                url: "https://repo.example.com/nexus/service/local/status".to_string(),
                status: 401,
            }),
        };
        assert_eq!(
            failure.to_string(),
            "Connection failed: Authentication rejected by https://repo.example.com/nexus/service/local/status: HTTP 401"
        );
    }
}
