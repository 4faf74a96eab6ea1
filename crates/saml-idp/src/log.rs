/// Destination for validator diagnostics.
///
/// Closures implement it directly; anything with a different call shape
/// needs a thin adapter.
pub trait LogSink: Send + Sync {
    fn emit(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}

/// Forwards diagnostics to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, message: &str) {
        tracing::info!(target: "saml_idp", "{message}");
    }
}
