//! Failure classification for action attempts.
//!
//! Decides whether a failed attempt is worth retrying. Built-in patterns
//! cover the usual network and lock contention messages; steps add their
//! own through `retry.transient_patterns` and `retry.transient_exit_codes`.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::shell::CommandResult;
use crate::steps::RetryPolicy;

/// Exit code for "found but not executable".
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit code for "command not found".
pub const EXIT_NOT_FOUND: i32 = 127;

/// Whether a failure may succeed on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Likely to succeed on retry.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Classification with the reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// The class.
    pub class: FailureClass,
    /// Human-readable reason.
    pub reason: String,
}

impl Classification {
    /// Classification for an attempt cut off by its timeout.
    pub fn timed_out() -> Self {
        Self::transient("timed out")
    }

    fn transient(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            reason: reason.into(),
        }
    }

    fn permanent(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            reason: reason.into(),
        }
    }
}

/// A built-in transient failure pattern.
pub struct TransientPattern {
    /// Pattern name (for logs and reports).
    pub name: &'static str,
    /// Compiled regex matched against combined output.
    pub regex: &'static LazyLock<Regex>,
}

macro_rules! lazy_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).unwrap());
    };
}

lazy_regex!(
    RE_DNS,
    r"(?i)could not resolve host|temporary failure in name resolution|name or service not known|no address associated with hostname"
);
lazy_regex!(RE_CONN_REFUSED, r"(?i)connection refused");
lazy_regex!(RE_CONN_RESET, r"(?i)connection reset( by peer)?");
lazy_regex!(
    RE_CONN_TIMED_OUT,
    r"(?i)connection timed out|operation timed out|timed out while connecting"
);
lazy_regex!(
    RE_NET_UNREACHABLE,
    r"(?i)network is unreachable|no route to host"
);
lazy_regex!(
    RE_RATE_LIMIT,
    r"(?i)HTTP/\S+ 429\b|returned error: 429\b|too many requests|rate[ -]limit(ed)?"
);
lazy_regex!(
    RE_GATEWAY,
    r"(?i)HTTP/\S+ 50[234]\b|returned error: 50[234]\b|bad gateway|service unavailable|gateway time-?out"
);
lazy_regex!(
    RE_PKG_LOCK,
    r"(?i)could not get lock|unable to acquire the dpkg frontend lock|dpkg was interrupted|waiting for cache lock"
);
lazy_regex!(RE_TLS_TIMEOUT, r"(?i)tls handshake timeout|ssl handshake.*timed? ?out");

/// All built-in transient patterns.
pub fn built_in_patterns() -> &'static [TransientPattern] {
    static PATTERNS: [TransientPattern; 9] = [
        TransientPattern {
            name: "dns_resolution",
            regex: &RE_DNS,
        },
        TransientPattern {
            name: "connection_refused",
            regex: &RE_CONN_REFUSED,
        },
        TransientPattern {
            name: "connection_reset",
            regex: &RE_CONN_RESET,
        },
        TransientPattern {
            name: "connection_timed_out",
            regex: &RE_CONN_TIMED_OUT,
        },
        TransientPattern {
            name: "network_unreachable",
            regex: &RE_NET_UNREACHABLE,
        },
        TransientPattern {
            name: "rate_limited",
            regex: &RE_RATE_LIMIT,
        },
        TransientPattern {
            name: "upstream_unavailable",
            regex: &RE_GATEWAY,
        },
        TransientPattern {
            name: "package_lock_held",
            regex: &RE_PKG_LOCK,
        },
        TransientPattern {
            name: "tls_handshake_timeout",
            regex: &RE_TLS_TIMEOUT,
        },
    ];
    &PATTERNS
}

/// Classify a failed attempt.
///
/// Order matters: an unrunnable command is permanent even if its output
/// happens to look like a network error.
pub fn classify(result: &CommandResult, policy: &RetryPolicy) -> Classification {
    if result.timed_out {
        return Classification::timed_out();
    }

    match result.exit_code {
        Some(EXIT_NOT_EXECUTABLE) => {
            return Classification::permanent("command not executable (exit 126)")
        }
        Some(EXIT_NOT_FOUND) => return Classification::permanent("command not found (exit 127)"),
        Some(code) if policy.transient_exit_codes.contains(&code) => {
            return Classification::transient(format!("exit code {} is transient", code))
        }
        _ => {}
    }

    let output = result.combined_output();

    if let Some(pattern) = built_in_patterns().iter().find(|p| p.regex.is_match(&output)) {
        return Classification::transient(format!("output matched {}", pattern.name));
    }

    if let Some(regex) = policy.transient_patterns.iter().find(|r| r.is_match(&output)) {
        return Classification::transient(format!("output matched /{}/", regex.as_str()));
    }

    match result.exit_code {
        Some(code) => Classification::permanent(format!("exit code {}", code)),
        None => Classification::permanent("killed by signal"),
    }
}

/// Classification for a command that could not be started at all.
pub fn classify_spawn_failure(message: &str) -> Classification {
    Classification::permanent(format!("failed to start: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn failed(code: i32, stderr: &str) -> CommandResult {
        CommandResult::failure(Some(code), stderr, Duration::ZERO)
    }

    #[test]
    fn timeout_is_transient() {
        let result = CommandResult::timed_out("", "", Duration::from_secs(1));
        assert_eq!(
            classify(&result, &RetryPolicy::default()).class,
            FailureClass::Transient
        );
    }

    #[test]
    fn missing_or_unexecutable_command_is_permanent() {
        let policy = RetryPolicy::default();
        assert_eq!(
            classify(&failed(127, "sh: certbot: not found"), &policy).class,
            FailureClass::Permanent
        );
        assert_eq!(
            classify(&failed(126, "Permission denied"), &policy).class,
            FailureClass::Permanent
        );
    }

    #[test]
    fn exit_127_is_permanent_even_if_output_looks_transient() {
        let result = failed(127, "connection refused");
        assert_eq!(
            classify(&result, &RetryPolicy::default()).class,
            FailureClass::Permanent
        );
    }

    #[test]
    fn configured_exit_code_is_transient() {
        let policy = RetryPolicy {
            transient_exit_codes: vec![75],
            ..Default::default()
        };
        assert_eq!(
            classify(&failed(75, ""), &policy).class,
            FailureClass::Transient
        );
        assert_eq!(
            classify(&failed(76, ""), &policy).class,
            FailureClass::Permanent
        );
    }

    #[test]
    fn built_in_patterns_match_common_messages() {
        let policy = RetryPolicy::default();
        let messages = [
            "curl: (6) Could not resolve host: github.com",
            "Temporary failure in name resolution",
            "curl: (7) Failed to connect: Connection refused",
            "read: connection reset by peer",
            "ssh: connect to host x port 22: Connection timed out",
            "connect: Network is unreachable",
            "HTTP/1.1 429 Too Many Requests",
            "error: API rate limit exceeded",
            "The requested URL returned error: 503",
            "502 Bad Gateway",
            "E: Could not get lock /var/lib/dpkg/lock-frontend",
            "net/http: TLS handshake timeout",
        ];
        for message in messages {
            assert_eq!(
                classify(&failed(1, message), &policy).class,
                FailureClass::Transient,
                "expected transient: {}",
                message
            );
        }
    }

    #[test]
    fn unrelated_failure_is_permanent() {
        let c = classify(&failed(1, "syntax error near unexpected token"), &RetryPolicy::default());
        assert_eq!(c.class, FailureClass::Permanent);
        assert_eq!(c.reason, "exit code 1");

        for output in [
            "error on line 503 of config",
            "expected 429 entries, found 12",
            "invalid port 502",
        ] {
            let c = classify(&failed(1, output), &RetryPolicy::default());
            assert_eq!(c.class, FailureClass::Permanent, "{}", output);
        }
    }

    #[test]
    fn step_patterns_extend_built_ins() {
        let policy = RetryPolicy {
            transient_patterns: vec![Regex::new("mirror sync in progress").unwrap()],
            ..Default::default()
        };
        let c = classify(&failed(1, "E: mirror sync in progress"), &policy);
        assert_eq!(c.class, FailureClass::Transient);
        assert!(c.reason.contains("mirror sync"));
    }

    #[test]
    fn patterns_match_stdout_too() {
        let result = CommandResult {
            exit_code: Some(1),
            stdout: "Could not resolve host: deb.debian.org".to_string(),
            ..Default::default()
        };
        assert_eq!(
            classify(&result, &RetryPolicy::default()).class,
            FailureClass::Transient
        );
    }

    #[test]
    fn spawn_failure_is_permanent() {
        assert_eq!(
            classify_spawn_failure("No such file").class,
            FailureClass::Permanent
        );
    }

    #[test]
    fn built_in_regexes_compile() {
        for pattern in built_in_patterns() {
            assert!(!pattern.regex.as_str().is_empty(), "{}", pattern.name);
        }
    }
}
