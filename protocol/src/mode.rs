use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

/// Mode requested by the caller for a generation run.
#[derive(
    Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RunMode {
    /// Defer to the configured default (`mock_mode`).
    #[default]
    Auto,
    Mock,
    Live,
}

impl RunMode {
    /// Resolve the requested mode against the configured default.
    pub fn resolve(self, mock_by_default: bool) -> ResolvedMode {
        match self {
            Self::Mock => ResolvedMode::Mock,
            Self::Live => ResolvedMode::Live,
            Self::Auto if mock_by_default => ResolvedMode::Mock,
            Self::Auto => ResolvedMode::Live,
        }
    }
}

/// Mode actually used for a run once `auto` has been resolved.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResolvedMode {
    Mock,
    Live,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn auto_follows_configured_default() {
        assert_eq!(RunMode::Auto.resolve(true), ResolvedMode::Mock);
        assert_eq!(RunMode::Auto.resolve(false), ResolvedMode::Live);
        assert_eq!(RunMode::Live.resolve(true), ResolvedMode::Live);
        assert_eq!(RunMode::Mock.resolve(false), ResolvedMode::Mock);
    }

    #[test]
    fn parses_case_insensitively_and_serializes_lowercase() {
        assert_eq!(RunMode::from_str("LIVE").ok(), Some(RunMode::Live));
        assert!(RunMode::from_str("hybrid").is_err());
        assert_eq!(
            serde_json::to_string(&ResolvedMode::Mock).ok().as_deref(),
            Some("\"mock\"")
        );
        assert_eq!(RunMode::Auto.to_string(), "auto");
    }
}
