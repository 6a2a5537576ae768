//! Reply generation from canned category texts.
//!
//! Classifies the input, then picks one variant of the matched category
//! uniformly at random. Inputs that match no rule get a templated fallback
//! quoting the start of what the user wrote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use speakpal_core::types::Category;

use crate::parser::IntentClassifier;

/// Number of input characters quoted by a fallback reply.
pub const FALLBACK_SNIPPET_CHARS: usize = 30;

/// Number of fallback templates.
pub const FALLBACK_TEMPLATE_COUNT: usize = 3;

// =============================================================================
// Category table
// =============================================================================

static GREETING: &[&str] = &[
    "Hello! How can I assist you today?",
    "Hi there! I'm your AI assistant. What can I help you with?",
    "Welcome! Feel free to ask me any questions you have.",
];

static INTRODUCTION: &[&str] = &[
    "I'm an AI assistant designed to help answer your questions and provide information on a wide range of topics. I can explain concepts, provide definitions, assist with problem-solving, and engage in conversations. Feel free to ask me anything!",
];

static CAPABILITIES: &[&str] = &[
    "I can help with answering questions, explaining concepts, providing information on various topics, assisting with language learning, and engaging in conversation. I can also read my responses aloud to help with pronunciation and listening comprehension.",
];

static LIMITATIONS: &[&str] = &[
    "While I aim to be helpful, I may not always have the most up-to-date information. I also can't access the internet or external databases in real-time. For complex or specialized topics, consulting with human experts is recommended.",
];

static LANGUAGE: &[&str] = &[
    "Language learning involves practicing speaking, listening, reading, and writing. Regular practice and immersion are key to improving your skills.",
    "When learning a new language, focus on common vocabulary and phrases first. Then gradually build up to more complex grammar and expressions.",
    "Reading books, watching movies, and listening to music in your target language can significantly improve your comprehension and vocabulary.",
];

static EDUCATION: &[&str] = &[
    "Effective studying often involves active recall, spaced repetition, and teaching concepts to others.",
    "Different learning styles include visual, auditory, reading/writing, and kinesthetic. Understanding your preferred style can help optimize your learning approach.",
    "Critical thinking skills are essential for academic success and involve analyzing information, questioning assumptions, and forming reasoned judgments.",
];

static TECHNOLOGY: &[&str] = &[
    "Artificial intelligence refers to computer systems designed to perform tasks that typically require human intelligence, such as visual perception, speech recognition, and decision-making.",
    "Machine learning is a subset of AI that involves training algorithms to learn patterns from data and make predictions or decisions without being explicitly programmed.",
    "Natural language processing (NLP) is a field of AI focused on enabling computers to understand, interpret, and generate human language.",
];

/// Canned reply variants for `category`. Empty for `Fallback`.
pub fn variants(category: Category) -> &'static [&'static str] {
    match category {
        Category::Greeting => GREETING,
        Category::Introduction => INTRODUCTION,
        Category::Capabilities => CAPABILITIES,
        Category::Limitations => LIMITATIONS,
        Category::Language => LANGUAGE,
        Category::Education => EDUCATION,
        Category::Technology => TECHNOLOGY,
        Category::Fallback => &[],
    }
}

/// Render fallback template `index` around the start of the raw input.
///
/// Quotes the first [`FALLBACK_SNIPPET_CHARS`] characters with
/// their casing unchanged. `index` wraps modulo [`FALLBACK_TEMPLATE_COUNT`].
pub fn fallback_reply(input: &str, index: usize) -> String {
    let snippet: String = input.chars().take(FALLBACK_SNIPPET_CHARS).collect();
    match index % FALLBACK_TEMPLATE_COUNT {
        0 => format!(
            "That's an interesting question about \"{}...\". While I don't have specific information on this topic, I can help you explore it further. Could you provide more details or specify what aspect you're most interested in?",
            snippet
        ),
        1 => format!(
            "Thank you for asking about \"{}...\". This is a topic I'd like to help with. To provide a more accurate response, could you clarify what specific information you're looking for?",
            snippet
        ),
        _ => format!(
            "I understand you're asking about \"{}...\". To give you the most helpful response, could you tell me what you already know about this topic and what you're hoping to learn?",
            snippet
        ),
    }
}

// =============================================================================
// Random sources
// =============================================================================

/// Source of uniform choices among `len` candidates.
pub trait RandomSource: Send + Sync {
    /// Returns an index in `0..len`. `len` is at least 1.
    fn pick(&self, len: usize) -> usize;
}

/// Thread-local RNG from `rand`. The default source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::rng().random_range(0..len)
    }
}

/// Reproducible RNG seeded from a `u64`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..len)
    }
}

/// Scripted choices, replayed in order and cycled. Each pick is reduced
/// modulo the candidate count.
#[derive(Debug, Default)]
pub struct SequenceRandom {
    picks: Vec<usize>,
    next: AtomicUsize,
}

impl SequenceRandom {
    pub fn new(picks: Vec<usize>) -> Self {
        Self {
            picks,
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn pick(&self, len: usize) -> usize {
        if self.picks.is_empty() || len == 0 {
            return 0;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.picks.len();
        self.picks[i] % len
    }
}

// =============================================================================
// ResponseEngine
// =============================================================================

/// A generated reply and the category it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub category: Category,
    pub text: String,
}

/// Turns user input into reply text.
///
/// Pure apart from the random choice; never fails.
#[derive(Clone)]
pub struct ResponseEngine {
    classifier: IntentClassifier,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for ResponseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEngine")
            .field("rules", &self.classifier.rules().len())
            .finish()
    }
}

impl Default for ResponseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseEngine {
    /// Engine with the built-in rules and thread-local randomness.
    pub fn new() -> Self {
        Self {
            classifier: IntentClassifier::new(),
            random: Arc::new(ThreadRandom),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Classify `input` and pick a reply.
    pub fn respond(&self, input: &str) -> Reply {
        let category = self
            .classifier
            .classify(input)
            .filter(|c| !variants(*c).is_empty())
            .unwrap_or(Category::Fallback);

        let text = match category {
            Category::Fallback => {
                fallback_reply(input, self.random.pick(FALLBACK_TEMPLATE_COUNT))
            }
            c => {
                let options = variants(c);
                options[self.random.pick(options.len()).min(options.len() - 1)].to_string()
            }
        };

        tracing::debug!(category = %category, reply_chars = text.chars().count(), "Reply selected");
        Reply { category, text }
    }

    /// Reply text only.
    pub fn generate(&self, input: &str) -> String {
        self.respond(input).text
    }
}

// =============================================================================
// Tests
// =============================================================================
