//! Test doubles for the remote client and the line reader

use crate::client::{
    parse_base_url, ClientError, ConnectionRequest, Connector, Secret, ServerStatus, Session,
    TemplateDescriptor, UserToken,
};
use crate::product::ServerProduct;
use crate::prompt::LineReader;
use crate::templates::{CustomizerChain, ServerInfoCustomizer, UserTokenCustomizer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use url::Url;

/// Shared record of what the fake server was asked to do
#[derive(Debug, Default)]
pub struct Calls {
    pub connects: usize,
    pub listings: usize,
    pub fetched: Vec<String>,
    pub closes: usize,
}

/// In-memory session
#[derive(Clone)]
pub struct FakeSession {
    base_url: Url,
    username: String,
    status: ServerStatus,
    templates: Vec<(String, String)>,
    user_token: Option<(String, String)>,
    calls: Arc<Mutex<Calls>>,
}

impl FakeSession {
    pub fn new(edition: &str, version: &str) -> Self {
        Self {
            base_url: parse_base_url("https://repo.example.com/nexus").unwrap(),
            username: "deployer".to_string(),
            status: ServerStatus {
                app_name: "Nexus Repository Manager".to_string(),
                edition: edition.to_string(),
                version: version.to_string(),
            },
            templates: Vec::new(),
            user_token: None,
            calls: Arc::default(),
        }
    }

    pub fn pro(version: &str) -> Self {
        Self::new("PRO", version)
    }

    pub fn with_template(mut self, id: &str, content: &str) -> Self {
        self.templates.push((id.to_string(), content.to_string()));
        self
    }

    pub fn with_user_token(mut self, name_code: &str, pass_code: &str) -> Self {
        self.user_token = Some((name_code.to_string(), pass_code.to_string()));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Calls>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Session for FakeSession {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn status(&self) -> &ServerStatus {
        &self.status
    }

    async fn list_templates(&self) -> Result<Vec<TemplateDescriptor>, ClientError> {
        self.calls.lock().unwrap().listings += 1;
        if self.templates.is_empty() {
            return Err(ClientError::NoTemplates);
        }
        Ok(self
            .templates
            .iter()
            .map(|(id, _)| TemplateDescriptor::new(id.clone()))
            .collect())
    }

    async fn fetch_content(&self, id: &str) -> Result<String, ClientError> {
        self.calls.lock().unwrap().fetched.push(id.to_string());
        self.templates
            .iter()
            .find(|(t, _)| t == id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| ClientError::TemplateNotFound { id: id.to_string() })
    }

    async fn user_token(&self) -> Result<UserToken, ClientError> {
        match &self.user_token {
            Some((name_code, pass_code)) => Ok(UserToken {
                name_code: name_code.clone(),
                pass_code: Secret::new(pass_code.clone()),
            }),
            None => Err(ClientError::UserTokenUnavailable),
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.calls.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Connector handing out a prepared `FakeSession`
pub struct FakeConnector {
    session: FakeSession,
    pub requests: Arc<Mutex<Vec<ConnectionRequest>>>,
}

impl FakeConnector {
    pub fn new(session: FakeSession) -> Self {
        Self {
            session,
            requests: Arc::default(),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, request: &ConnectionRequest) -> Result<Box<dyn Session>, ClientError> {
        request.base_url()?;
        self.session.calls.lock().unwrap().connects += 1;
        self.requests.lock().unwrap().push(request.clone());
        Ok(Box::new(self.session.clone()))
    }
}

/// Line reader fed from a script of answers
#[derive(Debug, Default)]
pub struct ScriptedReader {
    answers: VecDeque<String>,
    pub prompts: Vec<(String, Option<char>)>,
    pub printed: Vec<String>,
    pub completions: Option<Vec<String>>,
    /// Completions seen while each prompt was read
    pub completions_at_prompt: Vec<Option<Vec<String>>>,
}

impl ScriptedReader {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str, mask: Option<char>) -> io::Result<Option<String>> {
        self.prompts.push((prompt.to_string(), mask));
        self.completions_at_prompt.push(self.completions.clone());
        Ok(self.answers.pop_front())
    }

    fn print_line(&mut self, line: &str) -> io::Result<()> {
        self.printed.push(line.to_string());
        Ok(())
    }

    fn set_completions(&mut self, choices: &[String]) {
        self.completions = Some(choices.to_vec());
    }

    fn clear_completions(&mut self) {
        self.completions = None;
    }
}

/// Product requiring PRO 2.3+ with server info and user token customizers
#[derive(Debug, Clone)]
pub struct TestProduct {
    pub output: Option<PathBuf>,
}

impl Default for TestProduct {
    fn default() -> Self {
        Self {
            output: Some(PathBuf::from("/tmp/m2settings-test/settings.xml")),
        }
    }
}

impl ServerProduct for TestProduct {
    fn name(&self) -> &'static str {
        "m2settings-test"
    }

    fn display_name(&self) -> &'static str {
        "Test"
    }

    fn required_edition(&self) -> &'static str {
        "PRO"
    }

    fn version_constraint(&self) -> &'static str {
        "[2.3,)"
    }

    fn url_env(&self) -> &'static str {
        "M2SETTINGS_TEST_URL_NEVER_SET"
    }

    fn default_output_file(&self) -> Option<PathBuf> {
        self.output.clone()
    }

    fn customizers(&self) -> CustomizerChain {
        CustomizerChain::new()
            .with(ServerInfoCustomizer)
            .with(UserTokenCustomizer)
    }
}
