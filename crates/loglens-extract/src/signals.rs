//! Failure-signal regex family shared by the compressor (C3) and the
//! extractor (C4), so "never elide a failure-signal line" is enforced
//! structurally rather than by convention (SPEC_FULL.md C3 note).

use std::sync::OnceLock;

use regex::Regex;

pub struct FailureSignal {
    pub kind: loglens_domain::model::FailureKind,
    pub regex: Regex,
}

fn signals() -> &'static Vec<FailureSignal> {
    static SIGNALS: OnceLock<Vec<FailureSignal>> = OnceLock::new();
    SIGNALS.get_or_init(|| {
        use loglens_domain::model::FailureKind::*;
        vec![
            FailureSignal {
                kind: Assertion,
                regex: Regex::new(r"(?i)assert(ion)?\s*(error|failed)").unwrap(),
            },
            FailureSignal {
                kind: Syntax,
                regex: Regex::new(r"(?i)(syntax ?error|parse error|unexpected token)").unwrap(),
            },
            FailureSignal {
                kind: Timeout,
                regex: Regex::new(r"(?i)(timed? ?out|deadline exceeded)").unwrap(),
            },
            FailureSignal {
                kind: Dependency,
                regex: Regex::new(
                    r"(?i)(modulenotfounderror|no module named|cannot find module|package .* not found|unresolved import)",
                )
                .unwrap(),
            },
            FailureSignal {
                kind: Permission,
                regex: Regex::new(r"(?i)permission denied").unwrap(),
            },
            FailureSignal {
                kind: Network,
                regex: Regex::new(
                    r"(?i)(connection refused|network is unreachable|could not resolve host|ETIMEDOUT|ECONNRESET)",
                )
                .unwrap(),
            },
            FailureSignal {
                kind: Error,
                regex: Regex::new(r"(?i)\b(error|fatal|exception|failed|failure)\b").unwrap(),
            },
        ]
    })
}

/// True if the line matches any failure-signal regex.
pub fn is_failure_line(line: &str) -> bool {
    signals().iter().any(|s| s.regex.is_match(line))
}

/// The kind of the first matching signal, or `Unknown` if none match.
pub fn classify_line(line: &str) -> loglens_domain::model::FailureKind {
    signals()
        .iter()
        .find(|s| s.regex.is_match(line))
        .map(|s| s.kind)
        .unwrap_or(loglens_domain::model::FailureKind::Unknown)
}

/// True if the line looks like a warning (used for C3's region priority
/// ranking: error > warning > info).
pub fn is_warning_line(line: &str) -> bool {
    static WARNING: OnceLock<Regex> = OnceLock::new();
    let re = WARNING.get_or_init(|| Regex::new(r"(?i)\bwarn(ing)?\b").unwrap());
    re.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_permission_denied() {
        assert!(is_failure_line(
            "permission denied while trying to connect to the Docker daemon socket"
        ));
    }

    #[test]
    fn detects_module_not_found() {
        assert!(is_failure_line(
            "ModuleNotFoundError: No module named 'requests'"
        ));
    }

    #[test]
    fn classifies_network_before_generic_error() {
        assert_eq!(
            classify_line("connection refused: error talking to host"),
            loglens_domain::model::FailureKind::Network
        );
    }

    #[test]
    fn plain_info_line_is_not_a_signal() {
        assert!(!is_failure_line("Running 12 tests"));
        assert!(!is_warning_line("Running 12 tests"));
    }
}
