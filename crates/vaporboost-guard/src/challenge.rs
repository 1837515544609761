//! Challenge resolution for accounts that need a one-time code.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vaporboost_core::{AccountId, ErrorKind, traits::ChallengeKind};

use crate::totp::{CodeGenerator, GuardError, SteamGuardTotp};

/// Context handed to a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub account_id: AccountId,
    pub kind: ChallengeKind,
    /// Mail domain the code was sent to, for email challenges.
    pub domain_hint: Option<String>,
    /// Set when the previous code was rejected.
    pub retry_reason: Option<ErrorKind>,
}

impl ChallengeRequest {
    /// Short operator-facing description of where the code comes from.
    #[must_use]
    pub fn source(&self) -> String {
        match (&self.kind, &self.domain_hint) {
            (ChallengeKind::Email, Some(domain)) => format!("Email ({domain})"),
            (ChallengeKind::Email, None) => "Email".to_owned(),
            (ChallengeKind::MobileAuthenticator, _) => "Mobile Authenticator".to_owned(),
        }
    }
}

/// Resolver answer.
#[derive(Debug, Clone)]
pub enum ChallengeResponse {
    /// Submit this code now.
    Code(SecretString),
    /// Wait for an out-of-band approval from the provider.
    Defer,
}

impl ChallengeResponse {
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(SecretString::from(code.into()))
    }
}

/// Challenge resolution error.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("Challenge cancelled")]
    Cancelled,
    #[error("No code available for {0}")]
    Unavailable(AccountId),
    #[error("Code generation failed: {0}")]
    Generator(#[from] GuardError),
    #[error("Prompt failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for supplying one-time codes.
///
/// Implement this to integrate a prompt, an automated generator, or a
/// scripted source. The call may wait indefinitely; the session cancels it
/// by dropping the future.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    async fn resolve(&self, request: ChallengeRequest)
    -> Result<ChallengeResponse, ChallengeError>;
}

/// Resolver that always waits for out-of-band approval.
#[derive(Debug, Default, Clone)]
pub struct DeferResolver;

#[async_trait]
impl ChallengeResolver for DeferResolver {
    async fn resolve(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        tracing::info!(account = %request.account_id, "Waiting for app approval");
        Ok(ChallengeResponse::Defer)
    }
}

/// Resolver that answers every challenge with the same code.
#[derive(Debug, Clone)]
pub struct StaticCodeResolver {
    code: SecretString,
}

impl StaticCodeResolver {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: SecretString::from(code.into()),
        }
    }
}

#[async_trait]
impl ChallengeResolver for StaticCodeResolver {
    async fn resolve(
        &self,
        _request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        Ok(ChallengeResponse::Code(self.code.clone()))
    }
}

/// Resolver that derives codes from per-account seeds it holds itself.
///
/// Useful when seeds live outside the account records.
pub struct GeneratorResolver {
    seeds: HashMap<AccountId, SecretString>,
    generator: Arc<dyn CodeGenerator>,
}

impl GeneratorResolver {
    /// Create a resolver using Steam Guard TOTP.
    #[must_use]
    pub fn new(seeds: HashMap<AccountId, SecretString>) -> Self {
        Self::with_generator(seeds, Arc::new(SteamGuardTotp::new()))
    }

    #[must_use]
    pub fn with_generator(
        seeds: HashMap<AccountId, SecretString>,
        generator: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self { seeds, generator }
    }
}

#[async_trait]
impl ChallengeResolver for GeneratorResolver {
    async fn resolve(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        let seed = self
            .seeds
            .get(&request.account_id)
            .ok_or_else(|| ChallengeError::Unavailable(request.account_id.clone()))?;
        Ok(ChallengeResponse::Code(self.generator.generate(seed)?))
    }
}
