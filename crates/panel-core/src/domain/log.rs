//! Device log lines.
//!
//! The device streams plain log lines over the websocket and serves its
//! stored log as newline-delimited text.  Lines carry their severity as a
//! bare word (`WARN`, `ERROR`, `DEBUG`, `CHECK`) somewhere in the text.

/// Severity inferred from a log line's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSeverity {
    Plain,
    Warn,
    Error,
    Debug,
    Check,
}

impl LineSeverity {
    /// Classifies a line.  When several markers appear, the later entry in
    /// the order `WARN`, `ERROR`, `DEBUG`, `CHECK` wins.
    pub fn classify(line: &str) -> Self {
        let mut severity = Self::Plain;
        for (marker, candidate) in [
            ("WARN", Self::Warn),
            ("ERROR", Self::Error),
            ("DEBUG", Self::Debug),
            ("CHECK", Self::Check),
        ] {
            if line.contains(marker) {
                severity = candidate;
            }
        }
        severity
    }
}

/// Splits a stored log into complete lines.
///
/// Only newline-terminated lines are yielded; a trailing fragment without a
/// newline is still being written by the device and is left out.
pub fn complete_lines(text: &str) -> impl Iterator<Item = &str> {
    let end = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
    text[..end]
        .split_terminator('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}
