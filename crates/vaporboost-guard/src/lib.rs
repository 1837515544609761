//! Two-factor challenge resolution and one-time code derivation.
//!
//! Provides:
//! - `ChallengeResolver` trait and built-in resolvers
//! - Steam Guard TOTP code generation from a shared secret
//! - Console prompt resolver

pub mod challenge;
pub mod console;
pub mod totp;

pub use challenge::{
    ChallengeError, ChallengeRequest, ChallengeResolver, ChallengeResponse, DeferResolver,
    GeneratorResolver, StaticCodeResolver,
};
pub use console::ConsoleResolver;
pub use totp::{CodeGenerator, GuardError, SteamGuardTotp};
