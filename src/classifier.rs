//! Script/register classifier.
//!
//! Decides whether a query is written in Devanagari Nepali, Romanized
//! Nepali, or plain Latin-script English. The decision cascades from the
//! strongest signal to the weakest:
//!
//! 1. **Script ratio**: share of Devanagari code points among non-space
//!    characters. At or above `native_ratio` the text is [`ScriptTag::Native`].
//! 2. **Lexicon**: Romanized Nepali function words (pronouns, question
//!    words, copulas, postpositions). Enough hits, or a high enough share of
//!    hits, gives [`ScriptTag::Romanized`].
//! 3. **Mixed signal**: any Devanagari plus at least one lexicon hit is
//!    also Romanized.
//!
//! Everything else, including empty input, is [`ScriptTag::Latin`].
//! Classification is a pure function of the text and the thresholds.

use crate::config::ClassifierConfig;
use crate::models::ScriptTag;

/// Common Romanized Nepali words. Single letters are deliberately absent:
/// they collide with English and with abbreviations.
const ROMANIZED_LEXICON: &[&str] = &[
    // pronouns
    "ma", "malai", "maile", "mero", "meri", "hami", "hamilai", "hamro", "timi", "timilai",
    "timile", "timro", "timiharu", "tapai", "tapain", "tapailai", "tapaile", "tapaiko", "uni",
    "unko", "unle", "usko", "usle", "uslai", "yo", "tyo", "yi", "ti", "yini", "tini",
    // question words
    "ke", "kina", "kaha", "kahile", "kasari", "kati", "kun", "kasko", "kasle", "kaslai", "kohi",
    "kehi", "kasto", "kata",
    // copulas and auxiliaries
    "ho", "hoina", "hun", "cha", "chha", "chhu", "chu", "chau", "chhau", "chan", "chhan",
    "chaina", "chhaina", "thiyo", "thiye", "thie", "hunchha", "huncha", "hunu", "huna", "hola",
    "bhayo", "bhaena", "raicha", "rahechha",
    // common verbs
    "garnu", "garne", "garna", "garchu", "garchhu", "gara", "garnus", "gareko", "garyo",
    "sakchu", "sakchha", "sakinchha", "jane", "janu", "jaau", "aaunu", "aau", "dinu", "dinus",
    "bhannu", "bhanus", "bhane", "bhanda", "bujhe", "bujhina", "thaha", "chahincha",
    "chahinchha", "chahiyo", "parcha", "parchha", "paryo", "lagcha", "lagyo", "khanu", "khana",
    "khayo", "sodhnu",
    // postpositions and particles
    "ko", "ka", "ki", "lai", "lagi", "le", "bata", "dekhi", "samma", "sanga", "sita", "maa", "tira",
    "pani", "ni", "ta", "ra", "tara", "ani", "pheri", "feri", "ajha", "matra", "sabai", "dherai",
    "thorai", "ali", "ekdam",
    // everyday nouns and greetings
    "naam", "kura", "kaam", "ghar", "sathi", "aama", "buwa", "didi", "bahini", "hajur",
    "namaste", "dhanyabad", "aaja", "bholi", "hijo", "ahile", "yaha", "tyaha", "ramro", "naramro",
    "yesto", "testo", "arko",
];

/// Deterministic three-way register classifier.
#[derive(Debug, Clone)]
pub struct ScriptClassifier {
    native_ratio: f64,
    min_lexicon_hits: usize,
    lexicon_ratio: f64,
}

impl Default for ScriptClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl ScriptClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            native_ratio: config.native_ratio,
            min_lexicon_hits: config.min_lexicon_hits,
            lexicon_ratio: config.lexicon_ratio,
        }
    }

    /// Classify `text` into exactly one register. Never fails.
    pub fn classify(&self, text: &str) -> ScriptTag {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ScriptTag::Latin;
        }

        let non_space = trimmed.chars().filter(|c| !c.is_whitespace()).count();
        let native = trimmed.chars().filter(|c| is_native_char(*c)).count();
        if non_space > 0 && native as f64 / non_space as f64 >= self.native_ratio {
            return ScriptTag::Native;
        }

        let tokens = tokenize(trimmed);
        let hits = tokens.iter().filter(|t| is_lexicon_word(t)).count();

        if hits > 0 {
            if tokens.len() >= 3 && hits >= self.min_lexicon_hits {
                return ScriptTag::Romanized;
            }
            if hits as f64 / tokens.len() as f64 >= self.lexicon_ratio {
                return ScriptTag::Romanized;
            }
            if native > 0 {
                return ScriptTag::Romanized;
            }
        }

        ScriptTag::Latin
    }
}

/// Devanagari and its extension blocks.
pub fn is_native_char(c: char) -> bool {
    matches!(c,
        '\u{0900}'..='\u{097F}'
        | '\u{A8E0}'..='\u{A8FF}'
        | '\u{1CD0}'..='\u{1CFF}'
        | '\u{11B00}'..='\u{11B5F}')
}

fn is_word_char(c: char) -> bool {
    // Danda and double danda end sentences.
    if c == '\u{0964}' || c == '\u{0965}' {
        return false;
    }
    c.is_alphanumeric() || is_native_char(c) || c == '\''
}

/// Lowercased word tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn is_lexicon_word(token: &str) -> bool {
    ROMANIZED_LEXICON.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> ScriptTag {
        ScriptClassifier::default().classify(text)
    }

    #[test]
    fn test_empty_and_whitespace_are_latin() {
        assert_eq!(classify(""), ScriptTag::Latin);
        assert_eq!(classify("   \t\n "), ScriptTag::Latin);
    }

    #[test]
    fn test_single_character_is_latin() {
        assert_eq!(classify("a"), ScriptTag::Latin);
        assert_eq!(classify("k"), ScriptTag::Latin);
        assert_eq!(classify("?"), ScriptTag::Latin);
    }

    #[test]
    fn test_devanagari_is_native() {
        assert_eq!(classify("नमस्ते, तपाईंलाई कस्तो छ?"), ScriptTag::Native);
        assert_eq!(classify("प्रधानमन्त्री को हुन्?"), ScriptTag::Native);
    }

    #[test]
    fn test_romanized_question() {
        assert_eq!(classify("timro naam k ho?"), ScriptTag::Romanized);
        assert_eq!(classify("malai ali help garnus na"), ScriptTag::Romanized);
    }

    #[test]
    fn test_english_is_latin() {
        assert_eq!(classify("What is the capital of France?"), ScriptTag::Latin);
        assert_eq!(classify("hello how are you doing today"), ScriptTag::Latin);
    }

    #[test]
    fn test_lexicon_ratio_for_short_input() {
        // 1 hit of 2 tokens clears the 25% ratio without 3 hits.
        assert_eq!(classify("dashain kahile"), ScriptTag::Romanized);
    }

    #[test]
    fn test_mixed_script_fallback() {
        // 4 Devanagari of 54 non-space chars, one lexicon hit in 8 tokens.
        let text = "मलाई Python programming sikna resources suggest garnus please";
        assert_eq!(classify(text), ScriptTag::Romanized);
    }

    #[test]
    fn test_native_ratio_boundary_at_forty_percent() {
        let text = format!("{} {}", "क".repeat(4), "a".repeat(6));
        assert_eq!(classify(&text), ScriptTag::Native);

        let text = format!("{}{}", "क".repeat(40), "b".repeat(60));
        assert_eq!(classify(&text), ScriptTag::Native);
    }

    #[test]
    fn test_native_ratio_below_boundary() {
        let text = format!("{}{}", "क".repeat(39), "b".repeat(61));
        assert_ne!(classify(&text), ScriptTag::Native);
        assert_eq!(classify(&text), ScriptTag::Latin);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = ScriptClassifier::new(&ClassifierConfig {
            native_ratio: 0.60,
            min_lexicon_hits: 3,
            lexicon_ratio: 0.90,
        });
        let text = format!("{} {}", "क".repeat(5), "a".repeat(5));
        assert_eq!(strict.classify(&text), ScriptTag::Latin);
        assert_eq!(classify(&text), ScriptTag::Native);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = ScriptClassifier::default();
        for text in ["timro naam k ho?", "नमस्ते", "What time is it", "", "x"] {
            assert_eq!(classifier.classify(text), classifier.classify(text));
        }
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(tokenize("Timro NAAM, k ho?"), vec!["timro", "naam", "k", "ho"]);
        assert_eq!(tokenize("म ठिक छु। तिमी?"), vec!["म", "ठिक", "छु", "तिमी"]);
    }
}
