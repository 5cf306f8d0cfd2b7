//! Pure content analysis: counts, subject domain, complexity tier and
//! key topics. Deterministic by construction — identical text always
//! yields identical output.

use std::collections::{HashMap, HashSet};

use crate::pipeline::types::{ComplexityTier, ContentAnalysis, ContentDomain};

/// Average adult reading speed used for the time estimate.
const WORDS_PER_MINUTE: usize = 200;

/// Number of key topics reported.
const KEY_TOPIC_COUNT: usize = 5;

/// Key topics must be strictly longer than this many characters.
const TOPIC_MIN_LEN: usize = 4;

// Domain keyword sets, scanned in this order; first set with any hit
// wins. Matching is on whole lowercased tokens, never substrings.
const COMPUTER_SCIENCE_KEYWORDS: &[&str] = &[
    "algorithm", "programming", "software", "computer", "compiler", "database",
    "recursion", "variable", "binary", "network", "debugging", "encryption",
];
const MATHEMATICS_KEYWORDS: &[&str] = &[
    "equation", "algebra", "geometry", "calculus", "theorem", "fraction",
    "integer", "polynomial", "derivative", "matrix", "probability",
];
const SCIENCE_KEYWORDS: &[&str] = &[
    "experiment", "hypothesis", "photosynthesis", "molecule", "biology",
    "chemistry", "physics", "organism", "gravity", "ecosystem", "electron",
];
const HISTORY_KEYWORDS: &[&str] = &[
    "ancient", "revolution", "empire", "civilization", "century", "medieval",
    "dynasty", "colonial", "treaty", "monarchy",
];

// Common words excluded from key topics (only entries longer than
// TOPIC_MIN_LEN matter; shorter ones are filtered by length anyway).
const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "against", "because", "before", "being",
    "below", "between", "could", "during", "every", "first", "other",
    "should", "since", "their", "there", "these", "they", "things", "those",
    "through", "under", "until", "where", "which", "while", "would",
];

/// Analyze extracted text. Pure function, no I/O, no shared state.
pub fn analyze(text: &str) -> ContentAnalysis {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len();
    let char_count = text.chars().count();
    let reading_minutes = word_count.div_ceil(WORDS_PER_MINUTE) as u32;

    let tokens = tokenize(&words);
    let domain = detect_domain(&tokens);
    let complexity = complexity_tier(&words);
    let key_topics = key_topics(&words);

    ContentAnalysis {
        word_count,
        char_count,
        reading_minutes,
        domain,
        complexity,
        key_topics,
    }
}

/// Lowercased tokens with surrounding punctuation stripped.
fn tokenize(words: &[&str]) -> HashSet<String> {
    words
        .iter()
        .map(|w| normalize(w))
        .filter(|w| !w.is_empty())
        .collect()
}

fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

fn detect_domain(tokens: &HashSet<String>) -> ContentDomain {
    let sets: [(&[&str], ContentDomain); 4] = [
        (COMPUTER_SCIENCE_KEYWORDS, ContentDomain::ComputerScience),
        (MATHEMATICS_KEYWORDS, ContentDomain::Mathematics),
        (SCIENCE_KEYWORDS, ContentDomain::Science),
        (HISTORY_KEYWORDS, ContentDomain::History),
    ];
    for (keywords, domain) in sets {
        if keywords.iter().any(|k| tokens.contains(*k)) {
            return domain;
        }
    }
    ContentDomain::General
}

/// Mean word length drives the tier: `<4` elementary, `<5.5`
/// intermediate, else advanced.
fn complexity_tier(words: &[&str]) -> ComplexityTier {
    if words.is_empty() {
        return ComplexityTier::Elementary;
    }
    let total: usize = words.iter().map(|w| w.chars().count()).sum();
    let mean = total as f64 / words.len() as f64;
    if mean < 4.0 {
        ComplexityTier::Elementary
    } else if mean < 5.5 {
        ComplexityTier::Intermediate
    } else {
        ComplexityTier::Advanced
    }
}

/// The 5 most frequent alphabetic words longer than 4 characters that
/// are not stop words. Ties break by first-encountered order.
fn key_topics(words: &[&str]) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for word in words {
        let token = normalize(word);
        if token.chars().count() <= TOPIC_MIN_LEN {
            continue;
        }
        if !token.chars().all(|c| c.is_alphabetic()) {
            continue;
        }
        if STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        let entry = counts.entry(token).or_insert_with(|| {
            order += 1;
            (0, order)
        });
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(KEY_TOPIC_COUNT).map(|(w, _)| w).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_is_deterministic() {
        let text = "The photosynthesis experiment tested our hypothesis about light.";
        assert_eq!(analyze(text), analyze(text));
    }

    #[test]
    fn counts_words_and_chars() {
        let analysis = analyze("one two three");
        assert_eq!(analysis.word_count, 3);
        assert_eq!(analysis.char_count, 13);
    }

    #[test]
    fn empty_text_is_safe() {
        let analysis = analyze("");
        assert_eq!(analysis.word_count, 0);
        assert_eq!(analysis.reading_minutes, 0);
        assert_eq!(analysis.domain, ContentDomain::General);
        assert_eq!(analysis.complexity, ComplexityTier::Elementary);
        assert!(analysis.key_topics.is_empty());
    }

    #[test]
    fn reading_time_rounds_up() {
        let text = vec!["word"; 201].join(" ");
        assert_eq!(analyze(&text).reading_minutes, 2);
        let text = vec!["word"; 200].join(" ");
        assert_eq!(analyze(&text).reading_minutes, 1);
    }

    #[test]
    fn science_keywords_detect_science() {
        let analysis = analyze("Our photosynthesis experiment confirmed the hypothesis.");
        assert_eq!(analysis.domain, ContentDomain::Science);
    }

    #[test]
    fn computer_science_has_priority_over_science() {
        // Both sets hit; computer-science is scanned first.
        let analysis = analyze("An algorithm for simulating a biology experiment.");
        assert_eq!(analysis.domain, ContentDomain::ComputerScience);
    }

    #[test]
    fn mathematics_detected() {
        let analysis = analyze("Solve the equation using basic algebra.");
        assert_eq!(analysis.domain, ContentDomain::Mathematics);
    }

    #[test]
    fn history_detected() {
        let analysis = analyze("The empire fell during that turbulent century.");
        assert_eq!(analysis.domain, ContentDomain::History);
    }

    #[test]
    fn no_keywords_means_general() {
        let analysis = analyze("A cat sat on a warm mat all day.");
        assert_eq!(analysis.domain, ContentDomain::General);
    }

    #[test]
    fn keyword_matching_is_whole_token() {
        // "warfare" must not match a keyword by substring.
        let analysis = analyze("Modern warfare documentaries win awards.");
        assert_eq!(analysis.domain, ContentDomain::General);
    }

    #[test]
    fn keyword_matching_ignores_case_and_punctuation() {
        let analysis = analyze("PHOTOSYNTHESIS! That was the topic.");
        assert_eq!(analysis.domain, ContentDomain::Science);
    }

    #[test]
    fn short_words_are_elementary() {
        let analysis = analyze("the cat ran to a big red box");
        assert_eq!(analysis.complexity, ComplexityTier::Elementary);
    }

    #[test]
    fn long_words_are_advanced() {
        let analysis = analyze("thermodynamics equilibrium extraordinary phenomena");
        assert_eq!(analysis.complexity, ComplexityTier::Advanced);
    }

    #[test]
    fn key_topics_ranked_by_frequency() {
        let text = "photosynthesis photosynthesis photosynthesis experiment experiment hypothesis";
        let analysis = analyze(text);
        assert_eq!(
            analysis.key_topics,
            vec!["photosynthesis", "experiment", "hypothesis"]
        );
    }

    #[test]
    fn key_topics_exclude_short_and_stop_words() {
        let text = "which which which apple apple tree tree tree tree";
        let topics = analyze(text).key_topics;
        assert!(!topics.contains(&"which".to_string()), "stop word leaked");
        assert!(!topics.contains(&"tree".to_string()), "4-char word leaked");
        assert!(topics.contains(&"apple".to_string()));
    }

    #[test]
    fn key_topics_exclude_non_alphabetic() {
        let topics = analyze("covid19 covid19 covid19 vaccine vaccine").key_topics;
        assert_eq!(topics, vec!["vaccine"]);
    }

    #[test]
    fn key_topics_capped_at_five() {
        let text = "alphabet bravado charlie deltas foxtrot golfing hotels indigo";
        let topics = analyze(text).key_topics;
        assert_eq!(topics.len(), 5);
    }

    #[test]
    fn key_topic_ties_break_by_first_encounter() {
        let topics = analyze("zebra apple zebra apple mango").key_topics;
        assert_eq!(topics[0], "zebra");
        assert_eq!(topics[1], "apple");
        assert_eq!(topics[2], "mango");
    }
}
