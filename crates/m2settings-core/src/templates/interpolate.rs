//! Placeholder substitution and the customizer chain

use crate::client::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Opening marker of a placeholder token
pub const START_EXPR: &str = "$[";

/// Closing marker of a placeholder token
pub const END_EXPR: &str = "]";

/// Errors raised while substituting tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("No value bound for token '{token}' at offset {offset}")]
    UnknownToken { token: String, offset: usize },
}

/// What to do with a token that has no binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownTokenPolicy {
    /// Leave the original `$[name]` text in place
    #[default]
    Keep,
    /// Abort the substitution
    Fail,
}

/// Token name to replacement value bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpolationContext {
    values: HashMap<String, String>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a token, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InterpolationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (k, v) in iter {
            context.insert(k, v);
        }
        context
    }
}

/// Substitutes `$[name]` tokens in template content
///
/// Scanning is left to right and non-nested. Substituted values are copied
/// verbatim and never scanned again.
#[derive(Debug, Clone)]
pub struct Interpolator {
    context: InterpolationContext,
    policy: UnknownTokenPolicy,
}

impl Interpolator {
    pub fn new(context: InterpolationContext) -> Self {
        Self {
            context,
            policy: UnknownTokenPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnknownTokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace every bound token in `content`
    pub fn interpolate(&self, content: &str) -> Result<String, InterpolationError> {
        let mut output = String::with_capacity(content.len());
        let mut rest = content;
        let mut offset = 0;

        while let Some(start) = rest.find(START_EXPR) {
            let key_start = start + START_EXPR.len();
            let Some(key_len) = rest[key_start..].find(END_EXPR) else {
                // Unterminated token, nothing more to substitute
                break;
            };
            let key = &rest[key_start..key_start + key_len];
            let token_end = key_start + key_len + END_EXPR.len();

            output.push_str(&rest[..start]);
            match self.context.get(key) {
                Some(value) => output.push_str(value),
                None => match self.policy {
                    UnknownTokenPolicy::Keep => {
                        log::debug!("No value for token '{}'; leaving as-is", key);
                        output.push_str(&rest[start..token_end]);
                    }
                    UnknownTokenPolicy::Fail => {
                        return Err(InterpolationError::UnknownToken {
                            token: key.to_string(),
                            offset: offset + start,
                        });
                    }
                },
            }

            offset += token_end;
            rest = &rest[token_end..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

/// Contributes token bindings before substitution runs
///
/// Customizers are best-effort: a failing customizer is logged and skipped.
#[async_trait]
pub trait Customizer: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    async fn customize(
        &self,
        session: &dyn Session,
        context: &mut InterpolationContext,
    ) -> anyhow::Result<()>;
}

/// Ordered customizers applied with per-item failure isolation
#[derive(Default)]
pub struct CustomizerChain {
    customizers: Vec<Box<dyn Customizer>>,
}

impl CustomizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a customizer; registration order is application order
    pub fn register(&mut self, customizer: impl Customizer + 'static) -> &mut Self {
        self.customizers.push(Box::new(customizer));
        self
    }

    pub fn with(mut self, customizer: impl Customizer + 'static) -> Self {
        self.register(customizer);
        self
    }

    pub fn len(&self) -> usize {
        self.customizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customizers.is_empty()
    }

    /// Run every customizer against `context`
    ///
    /// Each customizer works on a scratch copy that is committed only when it
    /// succeeds. Later customizers overwrite earlier keys. Returns the names of
    /// customizers that failed.
    pub async fn apply(
        &self,
        session: &dyn Session,
        context: &mut InterpolationContext,
    ) -> Vec<String> {
        let mut failed = Vec::new();

        for customizer in &self.customizers {
            log::debug!("Applying customizer: {}", customizer.name());

            let mut scratch = context.clone();
            match customizer.customize(session, &mut scratch).await {
                Ok(()) => *context = scratch,
                Err(e) => {
                    log::warn!(
                        "Template customization '{}' failed; ignoring: {:#}",
                        customizer.name(),
                        e
                    );
                    failed.push(customizer.name().to_string());
                }
            }
        }

        failed
    }
}

impl std::fmt::Debug for CustomizerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.customizers.iter().map(|c| c.name()))
            .finish()
    }
}
