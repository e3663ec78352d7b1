/// Sink for the user-facing `[+]`/`[-]` status lines.
///
/// The core never prints on its own; whoever drives it (CLI, recovery UI)
/// passes a reporter in. Diagnostics that are not meant for the user go
/// through `tracing` instead.
pub trait Reporter {
    fn status(&mut self, msg: &str);
}

/// Discards everything. Handy in tests.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn status(&mut self, _msg: &str) {}
}
