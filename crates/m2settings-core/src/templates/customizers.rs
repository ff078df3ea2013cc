//! Built-in template customizers

use super::interpolate::{Customizer, InterpolationContext};
use crate::client::Session;
use anyhow::Context;
use async_trait::async_trait;

/// Binds process environment variables as `env.<NAME>`
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCustomizer {
    vars: Vec<(String, String)>,
}

impl EnvironmentCustomizer {
    /// Snapshot the current process environment, skipping non-unicode entries
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Use an explicit set of variables
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[async_trait]
impl Customizer for EnvironmentCustomizer {
    fn name(&self) -> &str {
        "environment"
    }

    async fn customize(
        &self,
        _session: &dyn Session,
        context: &mut InterpolationContext,
    ) -> anyhow::Result<()> {
        for (name, value) in &self.vars {
            context.insert(format!("env.{}", name), value.clone());
        }
        Ok(())
    }
}

/// Binds details of the connected server: `nexus.baseUrl`, `nexus.edition`,
/// `nexus.version` and `nexus.username`
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerInfoCustomizer;

#[async_trait]
impl Customizer for ServerInfoCustomizer {
    fn name(&self) -> &str {
        "server-info"
    }

    async fn customize(
        &self,
        session: &dyn Session,
        context: &mut InterpolationContext,
    ) -> anyhow::Result<()> {
        let base_url = session.base_url().as_str().trim_end_matches('/').to_string();
        context.insert("nexus.baseUrl", base_url);
        context.insert("nexus.edition", session.status().edition.clone());
        context.insert("nexus.version", session.status().version.clone());
        context.insert("nexus.username", session.username());
        Ok(())
    }
}

/// Binds the caller's user token: `userToken` (`nameCode:passCode`),
/// `userToken.nameCode` and `userToken.passCode`
#[derive(Debug, Clone, Copy, Default)]
pub struct UserTokenCustomizer;

#[async_trait]
impl Customizer for UserTokenCustomizer {
    fn name(&self) -> &str {
        "user-token"
    }

    async fn customize(
        &self,
        session: &dyn Session,
        context: &mut InterpolationContext,
    ) -> anyhow::Result<()> {
        let token = session
            .user_token()
            .await
            .context("Failed to fetch user token")?;

        context.insert(
            "userToken",
            format!("{}:{}", token.name_code, token.pass_code.expose()),
        );
        context.insert("userToken.nameCode", token.name_code);
        context.insert("userToken.passCode", token.pass_code.expose());
        Ok(())
    }
}
