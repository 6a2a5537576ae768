//! Rule-based input classifier.
//!
//! Maps raw user input to a reply [`Category`] by evaluating an ordered list
//! of pattern rules against the lowercased text. The first rule that
//! matches wins; no match means the caller should fall back.

use std::sync::LazyLock;

use regex::Regex;
use speakpal_core::types::Category;

// =============================================================================
// Rules
// =============================================================================

/// One (predicate, category) pair of the rule list.
///
/// The predicate is a regex evaluated against the lowercased input.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub category: Category,
    pub pattern: Regex,
}

impl PatternRule {
    /// Rule that fires when the input contains any of `phrases` as whole words.
    ///
    /// Phrases are lowercased and escaped, so "learn" does not fire on
    /// "learning" and "ai" does not fire on "explain".
    pub fn phrases(category: Category, phrases: &[&str]) -> Result<Self, regex::Error> {
        let alts: Vec<String> = phrases
            .iter()
            .map(|p| regex::escape(&p.to_lowercase()))
            .collect();
        Self::pattern(category, &format!(r"\b(?:{})\b", alts.join("|")))
    }

    /// Rule that fires when `pattern` matches the lowercased input.
    pub fn pattern(category: Category, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: Regex::new(pattern)?,
        })
    }

    /// `lowered` must already be lowercase.
    pub fn matches(&self, lowered: &str) -> bool {
        self.pattern.is_match(lowered)
    }
}

// Compiled once, cloned into every classifier (Regex clones are cheap).
static DEFAULT_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    let mk = |category: Category, phrases: &[&str]| {
        PatternRule::phrases(category, phrases).expect("Invalid phrase rule")
    };

    vec![
        // Greeting tokens anchored at the start of the input
        PatternRule::pattern(Category::Greeting, r"^(?:hi|hello|hey|greetings)\b")
            .expect("Invalid greeting regex"),
        mk(
            Category::Introduction,
            &["who are you", "what are you", "introduce yourself"],
        ),
        mk(
            Category::Capabilities,
            &["what can you do", "your capabilities", "help me with"],
        ),
        mk(
            Category::Limitations,
            &["limitations", "what can't you do", "unable to"],
        ),
        mk(
            Category::Language,
            &[
                "learn language",
                "language learning",
                "improve english",
                "speak better",
            ],
        ),
        mk(
            Category::Education,
            &["study", "learn", "education", "school", "college"],
        ),
        mk(
            Category::Technology,
            &[
                "ai",
                "artificial intelligence",
                "machine learning",
                "technology",
            ],
        ),
    ]
});

// =============================================================================
// IntentClassifier
// =============================================================================

/// Ordered pattern-rule classifier.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<PatternRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Classifier with the built-in rule list.
    ///
    /// Priority: greeting, introduction, capabilities, limitations,
    /// language, education, technology.
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }

    /// Classifier with a custom rule list, evaluated in the given order.
    pub fn with_rules(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Category of the first matching rule, or `None` when nothing matches.
    pub fn classify(&self, input: &str) -> Option<Category> {
        let lowered = input.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.category)
    }

    /// Every category whose rule matches, in priority order.
    ///
    /// Useful to see which lower-priority rules an input also touches.
    pub fn matching_categories(&self, input: &str) -> Vec<Category> {
        let lowered = input.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.matches(&lowered))
            .map(|rule| rule.category)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
