//! Interactive console prompt for one-time codes.

use std::{
    io::{self, BufRead, Write},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use vaporboost_core::ErrorKind;

use crate::challenge::{
    ChallengeError, ChallengeRequest, ChallengeResolver, ChallengeResponse,
};

/// Answer that defers to app approval instead of typing a code.
const WAIT_KEYWORD: &str = "wait";

struct PromptIo {
    input: Box<dyn BufRead + Send>,
    output: Box<dyn Write + Send>,
}

/// Resolver that asks the operator on the terminal.
///
/// Prompts from concurrent sessions are serialized so they never interleave.
/// Typing `wait` defers to approval in the mobile app.
#[derive(Clone)]
pub struct ConsoleResolver {
    io: Arc<Mutex<PromptIo>>,
}

impl ConsoleResolver {
    /// Prompt on stdin/stdout.
    #[must_use]
    pub fn stdin() -> Self {
        Self::with_io(io::BufReader::new(io::stdin()), io::stdout())
    }

    /// Prompt on arbitrary streams.
    #[must_use]
    pub fn with_io(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            io: Arc::new(Mutex::new(PromptIo {
                input: Box::new(input),
                output: Box::new(output),
            })),
        }
    }

    fn prompt(io: &Mutex<PromptIo>, request: &ChallengeRequest) -> io::Result<String> {
        let mut io = io.lock().unwrap_or_else(PoisonError::into_inner);
        let PromptIo { input, output } = &mut *io;

        if request.retry_reason == Some(ErrorKind::WrongChallengeCode) {
            writeln!(output, "[{}] Wrong code, try again", request.account_id)?;
        }
        writeln!(output, "[{}] {} code required", request.account_id, request.source())?;
        writeln!(output, "  1. Enter code manually")?;
        writeln!(output, "  2. Allow login from the mobile app")?;
        write!(output, "Enter code (or '{WAIT_KEYWORD}' to approve in app): ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_owned())
    }
}

#[async_trait]
impl ChallengeResolver for ConsoleResolver {
    async fn resolve(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        tracing::warn!(account = %request.account_id, source = %request.source(), "Code required");

        let io = Arc::clone(&self.io);
        let answer = tokio::task::spawn_blocking(move || Self::prompt(&io, &request))
            .await
            .map_err(|_| ChallengeError::Cancelled)??;

        if answer.eq_ignore_ascii_case(WAIT_KEYWORD) || answer.is_empty() {
            Ok(ChallengeResponse::Defer)
        } else {
            Ok(ChallengeResponse::code(answer.to_uppercase()))
        }
    }
}
