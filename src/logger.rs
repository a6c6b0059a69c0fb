use std::fmt;

/// Sink for the client's diagnostic messages.
///
/// Only retryable failures and backoff waits are reported. Closures taking
/// [`fmt::Arguments`] implement this trait.
pub trait Logger: Send + Sync {
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Logger that drops every message. Used unless another one is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardLogger;

impl Logger for DiscardLogger {
    fn log(&self, _args: fmt::Arguments<'_>) {}
}

impl<F> Logger for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

/// Forwards messages to `tracing` at info level.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

#[cfg(feature = "tracing")]
impl Logger for TracingLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "wallarm_api", "{}", args);
    }
}

const LOG_BODY_LIMIT: usize = 512;

/// Flattens a response body for a single log line: newlines and tabs are
/// removed and the text is cut at [`LOG_BODY_LIMIT`] characters.
pub(crate) fn sanitize_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out: String = text
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .take(LOG_BODY_LIMIT)
        .collect();
    if text.chars().filter(|c| !matches!(c, '\n' | '\r' | '\t')).nth(LOG_BODY_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}
