//! Human/bot account classification.
//!
//! Classification is a pure function of the login, the account type reported
//! by the forge API, and an immutable [`BotConfig`], so results are
//! reproducible offline without re-querying the forge. The signal that
//! matched is recorded alongside the verdict for auditability.

use serde::{Deserialize, Serialize};

use super::pattern::glob_match;

/// Built-in glob matching the standard bracket-suffixed bot logins.
const DEFAULT_BOT_PATTERNS: &[&str] = &["*[bot]"];

/// Account type string the forge API uses for machine accounts.
const API_BOT_TYPE: &str = "Bot";

/// Friendly display names for well-known bot logins.
const KNOWN_BOT_NAMES: &[(&str, &str)] = &[
    ("cursor[bot]", "cursor"),
    ("github-actions[bot]", "github-actions"),
    ("renovate[bot]", "renovate"),
    ("dependabot[bot]", "dependabot"),
    ("incident-io[bot]", "incident-io"),
    ("aikido-security[bot]", "aikido-security"),
    ("aikido-autofix[bot]", "aikido-autofix"),
    ("linear[bot]", "linear"),
];

/// Configuration for bot detection. Pure data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Glob patterns matched against logins, merged with the built-in list
    /// when `include_defaults` is set.
    pub patterns: Vec<String>,
    /// Exact logins always classified as bots. Highest precedence.
    pub logins: Vec<String>,
    /// When false, only the custom `patterns` apply and the built-in
    /// pattern list and `[bot]` suffix rule are ignored.
    pub include_defaults: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            logins: Vec::new(),
            include_defaults: true,
        }
    }
}

/// Which rule decided an account's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotSignal {
    /// The login appears in the explicit `logins` list.
    ExplicitLogin,
    /// A configured or built-in glob pattern matched the login.
    Pattern,
    /// The login carries the literal `[bot]` suffix.
    Suffix,
    /// The forge API reported the account type as `Bot`.
    ApiType,
    /// No rule matched; the account is human.
    None,
}

impl BotSignal {
    /// Stable string form stored in the users table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitLogin => "explicit_login",
            Self::Pattern => "pattern",
            Self::Suffix => "suffix",
            Self::ApiType => "api_type",
            Self::None => "none",
        }
    }
}

/// Outcome of classifying one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotVerdict {
    /// True when the account is a bot.
    pub is_bot: bool,
    /// The rule that decided the verdict.
    pub signal: BotSignal,
}

/// Compiled bot classifier.
///
/// # Example
///
/// ```
/// use magpie::classify::{BotClassifier, BotConfig};
///
/// let classifier = BotClassifier::new(&BotConfig::default());
/// assert!(classifier.classify_account("renovate[bot]", None).is_bot);
/// assert!(!classifier.classify_account("alice", Some("User")).is_bot);
/// ```
#[derive(Debug, Clone)]
pub struct BotClassifier {
    patterns: Vec<String>,
    logins: Vec<String>,
    include_defaults: bool,
}

impl BotClassifier {
    /// Compiles the configuration into a classifier.
    #[must_use]
    pub fn new(config: &BotConfig) -> Self {
        let mut patterns = Vec::new();
        if config.include_defaults {
            patterns.extend(
                DEFAULT_BOT_PATTERNS
                    .iter()
                    .map(|&pattern| pattern.to_owned()),
            );
        }
        patterns.extend(config.patterns.iter().cloned());

        Self {
            patterns,
            logins: config.logins.clone(),
            include_defaults: config.include_defaults,
        }
    }

    /// Classifies an account. First applicable rule wins: explicit login,
    /// then glob pattern, then the `[bot]` suffix or API-reported type.
    #[must_use]
    pub fn classify_account(&self, login: &str, api_type: Option<&str>) -> BotVerdict {
        if login.is_empty() {
            return BotVerdict {
                is_bot: false,
                signal: BotSignal::None,
            };
        }

        if self.logins.iter().any(|entry| entry == login) {
            return BotVerdict {
                is_bot: true,
                signal: BotSignal::ExplicitLogin,
            };
        }

        if self
            .patterns
            .iter()
            .any(|pattern| glob_match(pattern, login))
        {
            return BotVerdict {
                is_bot: true,
                signal: BotSignal::Pattern,
            };
        }

        if self.include_defaults && login.ends_with("[bot]") {
            return BotVerdict {
                is_bot: true,
                signal: BotSignal::Suffix,
            };
        }

        if api_type == Some(API_BOT_TYPE) {
            return BotVerdict {
                is_bot: true,
                signal: BotSignal::ApiType,
            };
        }

        BotVerdict {
            is_bot: false,
            signal: BotSignal::None,
        }
    }

    /// Friendly bot name for a login, when one can be derived.
    ///
    /// Known logins map to their product name; otherwise the `[bot]` suffix
    /// is stripped. Returns `None` for logins with no recognizable bot form.
    #[must_use]
    pub fn bot_name(login: &str) -> Option<String> {
        KNOWN_BOT_NAMES
            .iter()
            .find(|&&(known, _)| known == login)
            .map(|&(_, name)| name.to_owned())
            .or_else(|| login.strip_suffix("[bot]").map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{BotClassifier, BotConfig, BotSignal};

    #[test]
    fn default_suffix_classifies_bracketed_login_as_bot() {
        let classifier = BotClassifier::new(&BotConfig::default());
        let verdict = classifier.classify_account("renovate[bot]", None);
        assert!(verdict.is_bot);
        // The built-in `*[bot]` glob fires before the bare suffix check.
        assert_eq!(verdict.signal, BotSignal::Pattern);
    }

    #[test]
    fn custom_pattern_classifies_matching_login() {
        let config = BotConfig {
            patterns: vec!["ci-*".to_owned()],
            ..BotConfig::default()
        };
        let classifier = BotClassifier::new(&config);
        let verdict = classifier.classify_account("ci-runner", None);
        assert!(verdict.is_bot);
        assert_eq!(verdict.signal, BotSignal::Pattern);
    }

    #[test]
    fn plain_user_with_user_api_type_is_human() {
        let classifier = BotClassifier::new(&BotConfig::default());
        let verdict = classifier.classify_account("alice", Some("User"));
        assert!(!verdict.is_bot);
        assert_eq!(verdict.signal, BotSignal::None);
    }

    #[test]
    fn explicit_login_overrides_everything() {
        let config = BotConfig {
            logins: vec!["release-automation".to_owned()],
            include_defaults: false,
            ..BotConfig::default()
        };
        let classifier = BotClassifier::new(&config);
        let verdict = classifier.classify_account("release-automation", Some("User"));
        assert!(verdict.is_bot);
        assert_eq!(verdict.signal, BotSignal::ExplicitLogin);
    }

    #[test]
    fn api_bot_type_classifies_even_without_suffix() {
        let classifier = BotClassifier::new(&BotConfig::default());
        let verdict = classifier.classify_account("internal-service", Some("Bot"));
        assert!(verdict.is_bot);
        assert_eq!(verdict.signal, BotSignal::ApiType);
    }

    #[test]
    fn disabling_defaults_ignores_suffix_but_keeps_custom_patterns() {
        let config = BotConfig {
            patterns: vec!["deploy-*".to_owned()],
            include_defaults: false,
            ..BotConfig::default()
        };
        let classifier = BotClassifier::new(&config);
        assert!(!classifier.classify_account("renovate[bot]", None).is_bot);
        assert!(classifier.classify_account("deploy-agent", None).is_bot);
    }

    #[rstest]
    #[case("renovate[bot]", Some("renovate"))]
    #[case("github-actions[bot]", Some("github-actions"))]
    #[case("custom-thing[bot]", Some("custom-thing"))]
    #[case("alice", None)]
    fn bot_name_extraction(#[case] login: &str, #[case] expected: Option<&str>) {
        assert_eq!(BotClassifier::bot_name(login).as_deref(), expected);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = BotClassifier::new(&BotConfig::default());
        let first = classifier.classify_account("dependabot[bot]", Some("Bot"));
        let second = classifier.classify_account("dependabot[bot]", Some("Bot"));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_login_is_human() {
        let classifier = BotClassifier::new(&BotConfig::default());
        assert!(!classifier.classify_account("", Some("Bot")).is_bot);
    }
}
