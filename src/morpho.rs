//! Rule-based Russian morphology for terminology matching.
//!
//! The pipeline never needs true lemmas, only a normal form that is stable
//! across inflection. Both the dictionary and the input text pass through the
//! same normalizer, so matching reduces to normalized-form equality. The
//! normalizer folds case, ё and Unicode composition, then strips at most one
//! inflectional suffix from a fixed longest-first table, keeping a minimum
//! stem length so short words survive untouched.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Minimum stem length (in chars) left after suffix stripping.
const MIN_STEM: usize = 3;

/// Inflectional suffixes, longest first. Noun case endings, the productive
/// -ние/-ость/-ия abstract-noun paradigms and adjective endings. Verb
/// present-tense endings are deliberately absent: stripping them mangles
/// nouns like "захват", and no dictionary term is a finite verb.
const SUFFIXES: &[&str] = &[
    // -ование paradigm
    "ованиями", "ованием", "ованиях", "ованиям", "ование", "ования", "ованию", "овании",
    // -ение / -ание paradigms
    "ениями", "аниями", "остями", "ением", "ениях", "ениям", "анием", "аниях", "аниям", "остью",
    "остях", "остям", "остей", "ение", "ения", "ению", "ении", "ений", "ание", "ания", "анию",
    "ании", "аний", "ость", "ости", "иями", "ться",
    // 3-char endings
    "ого", "его", "ому", "ему", "ами", "ями", "иях", "иям", "ией", "ием", "тся",
    // 2-char endings
    "ый", "ий", "ой", "ая", "яя", "ое", "ее", "ую", "юю", "ым", "им", "ом", "ем", "ых", "их",
    "ов", "ев", "ей", "ам", "ям", "ах", "ях", "ия", "ие", "ии", "ию", "ть",
    // single-vowel case endings and the soft sign
    "а", "я", "о", "е", "ы", "и", "у", "ю", "ь",
];

/// Stop words excluded from the significant-token count.
const STOPWORDS: &[&str] = &[
    "и", "в", "во", "не", "на", "с", "со", "что", "а", "это", "как", "по", "для", "но", "от",
    "к", "за", "из", "или", "то", "же", "так", "вы", "он", "она", "они", "оно", "мы", "весь",
    "уже", "еще", "бы", "вот", "когда", "может", "быть", "есть", "был", "была", "были", "будет",
    "его", "ее", "их", "нас", "вас", "при", "без", "над", "под", "про", "том", "этом", "этот",
    "эта", "эти", "очень", "если", "чтобы",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Hyphenated compounds are single tokens.
    RE.get_or_init(|| Regex::new(r"[а-яё]+(?:-[а-яё]+)*").unwrap_or_else(|_| unreachable!()))
}

/// Fold a string for matching: NFC, lowercase, ё → е.
pub fn fold(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase().replace('ё', "е")
}

/// Normalize a single word (or a space/hyphen compound, part-wise) to its
/// matching form.
pub fn lemmatize(word: &str) -> String {
    let folded = fold(word);
    if folded.contains(' ') {
        return folded
            .split_whitespace()
            .map(strip_one_suffix)
            .collect::<Vec<_>>()
            .join(" ");
    }
    if folded.contains('-') {
        return folded
            .split('-')
            .map(strip_one_suffix)
            .collect::<Vec<_>>()
            .join("-");
    }
    strip_one_suffix(&folded)
}

fn strip_one_suffix(word: &str) -> String {
    // Stop words keep their surface form: stripping "быть" to "быт" would
    // collide with the noun "бытие", and no dictionary term is a stop word.
    if STOPWORDS.contains(&word) {
        return word.to_string();
    }
    let total = word.chars().count();
    for suffix in SUFFIXES {
        let suffix_len = suffix.chars().count();
        if total >= suffix_len + MIN_STEM && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    word.to_string()
}

/// Extract Cyrillic word tokens from already-folded text.
pub fn tokenize(folded_text: &str) -> Vec<&str> {
    word_regex()
        .find_iter(folded_text)
        .map(|m| m.as_str())
        .collect()
}

/// A token counts toward density when it is not a stop word and is longer
/// than two characters.
pub fn is_significant(folded_word: &str) -> bool {
    folded_word.chars().count() > 2 && !STOPWORDS.contains(&folded_word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_table_is_longest_first() {
        let lengths: Vec<usize> = SUFFIXES.iter().map(|s| s.chars().count()).collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn inflected_forms_share_a_lemma() {
        for (a, b) in [
            ("осознавание", "осознавания"),
            ("метанаблюдение", "метанаблюдением"),
            ("целостность", "целостности"),
            ("идентификация", "идентификации"),
            ("захват", "захватом"),
            ("центрирование", "центрировании"),
        ] {
            assert_eq!(lemmatize(a), lemmatize(b), "{a} vs {b}");
        }
    }

    #[test]
    fn stop_words_keep_their_surface_form() {
        assert_eq!(lemmatize("быть"), "быть");
        assert_ne!(lemmatize("быть"), lemmatize("бытие"));
        assert_eq!(lemmatize("есть"), "есть");
    }

    #[test]
    fn short_words_survive() {
        assert_eq!(lemmatize("эго"), "эго");
        assert_eq!(lemmatize("ума"), "ума");
    }

    #[test]
    fn compounds_normalize_part_wise() {
        assert_eq!(lemmatize("Я-образа"), lemmatize("Я-образ"));
        assert_eq!(lemmatize("поле внимания"), lemmatize("поля внимания"));
        assert_eq!(lemmatize("нейро-сталкинга"), lemmatize("нейро-сталкинг"));
    }

    #[test]
    fn yo_is_folded() {
        assert_eq!(fold("ведёт"), "ведет");
    }

    #[test]
    fn tokenizer_keeps_hyphen_compounds_whole() {
        let folded = fold("Я-образ растворяется, и здесь-и-сейчас остаётся.");
        let tokens = tokenize(&folded);
        assert_eq!(
            tokens,
            vec!["я-образ", "растворяется", "и", "здесь-и-сейчас", "остается"]
        );
    }

    #[test]
    fn significance_rule() {
        assert!(is_significant("осознавание"));
        assert!(is_significant("эго"));
        assert!(!is_significant("и"));
        assert!(!is_significant("это"));
        assert!(!is_significant("ум"));
    }
}
