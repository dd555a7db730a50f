use std::fmt;

/// Machine-readable error codes for operators and schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigIncomplete,
    TransientUpstream,
    ItemUnavailable,
    SourceUnavailable,
    PersistenceFailure,
    CorruptBaseline,
    ChannelFailure,
    LockContention,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigIncomplete => "E1002",
            Self::TransientUpstream => "E2001",
            Self::ItemUnavailable => "E2002",
            Self::SourceUnavailable => "E2003",
            Self::PersistenceFailure => "E3001",
            Self::CorruptBaseline => "E3002",
            Self::ChannelFailure => "E4001",
            Self::LockContention => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigIncomplete => "Required configuration missing",
            Self::TransientUpstream => "Upstream rate-limited or unreachable",
            Self::ItemUnavailable => "Item unavailable upstream",
            Self::SourceUnavailable => "Tracked-item source unavailable",
            Self::PersistenceFailure => "Baseline persistence failed",
            Self::CorruptBaseline => "Baseline document is corrupt",
            Self::ChannelFailure => "Notification channel failed",
            Self::LockContention => "Another run holds the state lock",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the wantwatch config.toml and retry."),
            Self::ConfigIncomplete => {
                Some("Set discogs.username and discogs.token (or USER_NAME / DISCOGS_TOKEN).")
            }
            Self::TransientUpstream => Some("Wait for the rate-limit window to pass and rerun."),
            Self::ItemUnavailable => None,
            Self::SourceUnavailable => {
                Some("Check the username, token, and network; the baseline was left unchanged.")
            }
            Self::PersistenceFailure => Some("Check disk space and write permissions on the state dir."),
            Self::CorruptBaseline => {
                Some("Inspect the baseline document, or run `wantwatch baseline reset` to re-bootstrap.")
            }
            Self::ChannelFailure => Some("Check the channel settings; other channels were still tried."),
            Self::LockContention => Some("Retry after the other `wantwatch` process finishes."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 9] = [
        ErrorCode::ConfigParseError,
        ErrorCode::ConfigIncomplete,
        ErrorCode::TransientUpstream,
        ErrorCode::ItemUnavailable,
        ErrorCode::SourceUnavailable,
        ErrorCode::PersistenceFailure,
        ErrorCode::CorruptBaseline,
        ErrorCode::ChannelFailure,
        ErrorCode::LockContention,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn fatal_codes_carry_hints() {
        assert!(ErrorCode::SourceUnavailable.hint().is_some());
        assert!(ErrorCode::PersistenceFailure.hint().is_some());
        assert_eq!(ErrorCode::SourceUnavailable.to_string(), "E2003");
    }
}
