//! Keyword extraction used by both vocabulary building and vector encoding.

use std::collections::HashMap;

/// Splits `content` into lowercase keywords mapped to their relative frequency.
///
/// Two kinds of tokens are counted: every maximal run of alphabetic characters
/// (lowercased), and every whitespace-separated word that contains at least one
/// non-alphabetic character (kept verbatim). The latter captures URLs, version
/// numbers and symbol runs that the letter scan would split apart.
///
/// "Alphabetic" is the Unicode Alphabetic property, so combining vowel signs
/// stay attached to their consonants instead of splitting the word.
///
/// Frequencies are `count / total`, so a non-empty result always sums to 1.0.
pub fn extract_keywords(content: &str) -> HashMap<String, f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    count_letter_runs(content, &mut counts);
    for word in content.split_whitespace() {
        if !is_only_letters(word) {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }

    counts
        .into_iter()
        .map(|(word, count)| (word, count as f64 / total as f64))
        .collect()
}

fn count_letter_runs(content: &str, counts: &mut HashMap<String, usize>) {
    let mut current = String::new();
    for ch in content.chars() {
        if ch.is_alphabetic() {
            current.push(ch);
        } else if !current.is_empty() {
            *counts.entry(current.to_lowercase()).or_insert(0) += 1;
            current.clear();
        }
    }
    if !current.is_empty() {
        *counts.entry(current.to_lowercase()).or_insert(0) += 1;
    }
}

fn is_only_letters(word: &str) -> bool {
    word.chars().all(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_yields_empty_map() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("   \n\t").is_empty());
    }

    #[test]
    fn frequencies_sum_to_one() {
        let inputs = [
            "Show HN: a Rust crawler",
            "v1.2 released at https://example.com today!",
            "über Straße ÜBER",
            "42",
        ];
        for input in inputs {
            let keywords = extract_keywords(input);
            assert!(!keywords.is_empty(), "no tokens for {input:?}");
            let sum: f64 = keywords.values().sum();
            assert!(close(sum, 1.0), "sum {sum} for {input:?}");
            assert!(keywords.values().all(|v| *v > 0.0 && *v <= 1.0));
        }
    }

    #[test]
    fn letter_runs_are_lowercased_and_counted() {
        let keywords = extract_keywords("Rust rust RUST go");
        assert_eq!(keywords.len(), 2);
        assert!(close(keywords["rust"], 0.75));
        assert!(close(keywords["go"], 0.25));
    }

    #[test]
    fn mixed_words_are_also_kept_verbatim() {
        let keywords = extract_keywords("Rust-lang 1.0");
        // letter runs: rust, lang; verbatim words: "Rust-lang", "1.0"
        assert_eq!(keywords.len(), 4);
        assert!(keywords.contains_key("rust"));
        assert!(keywords.contains_key("lang"));
        assert!(keywords.contains_key("Rust-lang"));
        assert!(keywords.contains_key("1.0"));
        assert!(close(keywords["1.0"], 0.25));
    }

    #[test]
    fn combining_vowel_signs_stay_inside_letter_runs() {
        // "हिंदी": consonants plus the vowel signs U+093F, U+0902 and U+0940,
        // which are Alphabetic but not general category L.
        let keywords = extract_keywords("हिंदी");
        assert_eq!(keywords.len(), 1);
        assert!(close(keywords["हिंदी"], 1.0));
    }

    #[test]
    fn tokenization_is_deterministic() {
        let text = "The quick brown fox; the LAZY dog (again) at 10:30.";
        assert_eq!(extract_keywords(text), extract_keywords(text));
    }
}
