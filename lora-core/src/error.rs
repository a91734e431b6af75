//! Failure kinds shared by every network element.

use std::fmt;

/// Class of a failure. Drives the HTTP status a rejection is turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or invalid input (content type, body, address format).
    Structural,
    /// Internal coordination failure (no consumer, delivery timeout).
    Operational,
    /// The recipient explicitly declined.
    NotFound,
    /// The recipient reports a semantic rejection.
    Behavioural,
    /// Feature not supported by the recipient.
    Implementation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Structural => "structural",
            ErrorKind::Operational => "operational",
            ErrorKind::NotFound => "not found",
            ErrorKind::Behavioural => "behavioural",
            ErrorKind::Implementation => "implementation",
        };
        f.write_str(s)
    }
}

/// A classified failure: one variant per [`ErrorKind`], carrying a description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("structural failure: {0}")]
    Structural(String),
    #[error("operational failure: {0}")]
    Operational(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("behavioural failure: {0}")]
    Behavioural(String),
    #[error("implementation failure: {0}")]
    Implementation(String),
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Failure::Structural(_) => ErrorKind::Structural,
            Failure::Operational(_) => ErrorKind::Operational,
            Failure::NotFound(_) => ErrorKind::NotFound,
            Failure::Behavioural(_) => ErrorKind::Behavioural,
            Failure::Implementation(_) => ErrorKind::Implementation,
        }
    }

    /// Build a failure of the given kind.
    pub fn new(kind: ErrorKind, desc: impl Into<String>) -> Self {
        let desc = desc.into();
        match kind {
            ErrorKind::Structural => Failure::Structural(desc),
            ErrorKind::Operational => Failure::Operational(desc),
            ErrorKind::NotFound => Failure::NotFound(desc),
            ErrorKind::Behavioural => Failure::Behavioural(desc),
            ErrorKind::Implementation => Failure::Implementation(desc),
        }
    }

    /// Description without the kind prefix.
    pub fn desc(&self) -> &str {
        match self {
            Failure::Structural(s)
            | Failure::Operational(s)
            | Failure::NotFound(s)
            | Failure::Behavioural(s)
            | Failure::Implementation(s) => s,
        }
    }
}

impl From<bincode::Error> for Failure {
    fn from(e: bincode::Error) -> Self {
        Failure::Structural(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_matches_kind() {
        for kind in [
            ErrorKind::Structural,
            ErrorKind::Operational,
            ErrorKind::NotFound,
            ErrorKind::Behavioural,
            ErrorKind::Implementation,
        ] {
            let f = Failure::new(kind, "x");
            assert_eq!(f.kind(), kind);
            assert_eq!(f.desc(), "x");
        }
    }

    #[test]
    fn display_includes_kind() {
        let f = Failure::NotFound("device unknown".into());
        assert_eq!(f.to_string(), "not found: device unknown");
    }
}
