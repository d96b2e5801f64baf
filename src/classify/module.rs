//! File-to-module classification driven by ordered pattern rules.
//!
//! Each changed file path is assigned a logical module name. Rules are tried
//! in configuration order; when none matches, root-level configuration files
//! collapse into the literal `root` module and everything else falls back to
//! joining the first `default_depth` path segments.
//!
//! A separate predicate flags generated files (lockfiles, protobuf output,
//! snapshots, minified assets) so they can be excluded from substantive-code
//! metrics. It never influences module assignment.

use serde::{Deserialize, Serialize};

use super::pattern::{PatternRule, RuleSet, glob_match};

/// Module reserved for repository-root configuration files.
pub const ROOT_MODULE: &str = "root";

const DEFAULT_DEPTH: usize = 2;

/// Root-level files that belong to the `root` module rather than a directory
/// module: dotfiles, docs, lockfiles, and build manifests.
const DEFAULT_ROOT_PATTERNS: &[&str] = &[
    ".*",
    "*.md",
    "*.txt",
    "*.lock",
    "*.toml",
    "*.yaml",
    "*.yml",
    "*.json",
    "Makefile",
    "Dockerfile*",
    "go.mod",
    "go.sum",
    "WORKSPACE",
    "WORKSPACE.bazel",
    "MODULE.bazel",
    "BUILD",
    "BUILD.bazel",
    "Gemfile",
    "Gemfile.lock",
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "requirements.txt",
    "setup.py",
    "setup.cfg",
    "pyproject.toml",
];

/// Paths that are machine-written churn rather than reviewed code.
const DEFAULT_GENERATED_PATTERNS: &[&str] = &[
    "*/gen/*",
    "*/generated/*",
    "*/__generated__/*",
    "*.pb.go",
    "*.pb.ts",
    "*.pb.js",
    "*.pb.py",
    "*_pb2.py",
    "*_pb2_grpc.py",
    "*.generated.*",
    "*.gen.*",
    "*_generated.*",
    "*_gen.*",
    "*.lock",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "go.sum",
    "*snapshot*",
    "*/__snapshots__/*",
    "*.snap",
    "*.min.js",
    "*.min.css",
    "*.bundle.js",
];

/// Configuration for module assignment and generated-file detection.
///
/// Pure data: the classifier compiles it once and never mutates it, so
/// re-classifying with the same configuration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Ordered pattern rules; first match wins.
    pub rules: Vec<PatternRule>,
    /// Number of leading path segments joined for the fallback module.
    pub default_depth: usize,
    /// Globs identifying root-level configuration files.
    pub root_patterns: Vec<String>,
    /// Additional globs identifying generated files.
    pub generated_patterns: Vec<String>,
    /// When false, only `generated_patterns` apply and the built-in
    /// generated-file globs are ignored.
    pub include_default_generated: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_depth: DEFAULT_DEPTH,
            root_patterns: DEFAULT_ROOT_PATTERNS
                .iter()
                .map(|&pattern| pattern.to_owned())
                .collect(),
            generated_patterns: Vec::new(),
            include_default_generated: true,
        }
    }
}

/// Compiled module classifier.
///
/// # Example
///
/// ```
/// use magpie::classify::{ModuleClassifier, ModuleConfig};
/// use magpie::classify::pattern::PatternRule;
///
/// let config = ModuleConfig {
///     rules: vec![PatternRule {
///         pattern: "backend/py/{name}/**".to_owned(),
///         output: "backend/py/{name}".to_owned(),
///     }],
///     ..ModuleConfig::default()
/// };
/// let classifier = ModuleClassifier::new(&config);
/// assert_eq!(
///     classifier.classify_file("backend/py/billing/handlers.py"),
///     "backend/py/billing"
/// );
/// assert_eq!(classifier.classify_file("README.md"), "root");
/// ```
#[derive(Debug, Clone)]
pub struct ModuleClassifier {
    rules: RuleSet,
    default_depth: usize,
    root_patterns: Vec<String>,
    generated_patterns: Vec<String>,
}

impl ModuleClassifier {
    /// Compiles the configuration into a classifier.
    #[must_use]
    pub fn new(config: &ModuleConfig) -> Self {
        let mut generated_patterns = Vec::new();
        if config.include_default_generated {
            generated_patterns.extend(
                DEFAULT_GENERATED_PATTERNS
                    .iter()
                    .map(|&pattern| pattern.to_owned()),
            );
        }
        generated_patterns.extend(config.generated_patterns.iter().cloned());

        Self {
            rules: RuleSet::compile(&config.rules),
            default_depth: config.default_depth.max(1),
            root_patterns: config.root_patterns.clone(),
            generated_patterns,
        }
    }

    /// Assigns a module name to a changed file path.
    ///
    /// Precedence: configured rules in order, then the root-file glob set
    /// (root-level paths only), then the first `default_depth` path segments.
    #[must_use]
    pub fn classify_file(&self, path: &str) -> String {
        if path.is_empty() {
            return ROOT_MODULE.to_owned();
        }

        if let Some(module) = self.rules.first_match(path) {
            return module;
        }

        if self.is_root_file(path) {
            return ROOT_MODULE.to_owned();
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() <= self.default_depth {
            // A bare filename has no directory to name a module after.
            if segments.len() == 1 {
                return path.to_owned();
            }
            let count = segments.len().saturating_sub(1);
            return segments
                .iter()
                .take(count)
                .copied()
                .collect::<Vec<_>>()
                .join("/");
        }
        segments
            .iter()
            .take(self.default_depth)
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Returns true when the path matches the merged generated-file globs.
    ///
    /// Patterns containing a separator match against the full path; all
    /// others match against the final path segment only.
    #[must_use]
    pub fn is_generated(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let filename = path.rsplit('/').next().unwrap_or(path);

        self.generated_patterns.iter().any(|pattern| {
            if pattern.contains('/') {
                glob_match(pattern, path)
            } else {
                glob_match(pattern, filename)
            }
        })
    }

    fn is_root_file(&self, path: &str) -> bool {
        if path.contains('/') {
            return false;
        }
        self.root_patterns
            .iter()
            .any(|pattern| glob_match(pattern, path))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ModuleClassifier, ModuleConfig, ROOT_MODULE};
    use crate::classify::pattern::PatternRule;

    fn classifier_with_rules(rules: &[(&str, &str)]) -> ModuleClassifier {
        let config = ModuleConfig {
            rules: rules
                .iter()
                .map(|&(pattern, output)| PatternRule {
                    pattern: pattern.to_owned(),
                    output: output.to_owned(),
                })
                .collect(),
            ..ModuleConfig::default()
        };
        ModuleClassifier::new(&config)
    }

    #[test]
    fn rule_capture_yields_module() {
        let classifier = classifier_with_rules(&[("backend/py/{name}/**", "backend/py/{name}")]);
        assert_eq!(
            classifier.classify_file("backend/py/billing/handlers.py"),
            "backend/py/billing"
        );
    }

    #[test]
    fn root_glob_covers_root_level_docs() {
        let classifier = classifier_with_rules(&[]);
        assert_eq!(classifier.classify_file("README.md"), ROOT_MODULE);
    }

    #[test]
    fn root_globs_do_not_apply_below_the_root() {
        let classifier = classifier_with_rules(&[]);
        assert_eq!(classifier.classify_file("docs/README.md"), "docs");
    }

    #[test]
    fn fallback_joins_default_depth_segments() {
        let classifier = classifier_with_rules(&[]);
        assert_eq!(
            classifier.classify_file("src/unmatched/deep/file.go"),
            "src/unmatched"
        );
    }

    #[test]
    fn shallow_path_uses_directory_portion() {
        let classifier = classifier_with_rules(&[]);
        assert_eq!(classifier.classify_file("src/lib.go"), "src");
        assert_eq!(classifier.classify_file("standalone.go"), "standalone.go");
    }

    #[test]
    fn empty_path_is_root() {
        let classifier = classifier_with_rules(&[]);
        assert_eq!(classifier.classify_file(""), ROOT_MODULE);
    }

    #[test]
    fn classification_is_deterministic_and_idempotent() {
        let classifier = classifier_with_rules(&[("src/{name}/**", "src/{name}")]);
        let first = classifier.classify_file("src/core/inner/mod.rs");
        let second = classifier.classify_file("src/core/inner/mod.rs");
        assert_eq!(first, second);
        assert_eq!(first, "src/core");
    }

    #[rstest]
    #[case("Cargo.lock", true)]
    #[case("proto/gen/api.pb.go", true)]
    #[case("web/dist/app.min.js", true)]
    #[case("ui/__snapshots__/view.snap", true)]
    #[case("src/lib.rs", false)]
    #[case("", false)]
    fn generated_detection_uses_default_globs(#[case] path: &str, #[case] expected: bool) {
        let classifier = ModuleClassifier::new(&ModuleConfig::default());
        assert_eq!(classifier.is_generated(path), expected, "{path}");
    }

    #[test]
    fn disabling_defaults_leaves_only_custom_generated_globs() {
        let config = ModuleConfig {
            generated_patterns: vec!["*.autogen.rs".to_owned()],
            include_default_generated: false,
            ..ModuleConfig::default()
        };
        let classifier = ModuleClassifier::new(&config);
        assert!(classifier.is_generated("src/schema.autogen.rs"));
        assert!(!classifier.is_generated("Cargo.lock"));
    }

    #[test]
    fn generated_flag_does_not_change_module_assignment() {
        let classifier = ModuleClassifier::new(&ModuleConfig::default());
        assert_eq!(classifier.classify_file("proto/gen/api.pb.go"), "proto/gen");
        assert!(classifier.is_generated("proto/gen/api.pb.go"));
    }
}
