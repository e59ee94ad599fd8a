//! Rough script-based language hint sent along with each scoring request.

/// Guesses a language code from the scripts present in `text`.
///
/// Checks run in a fixed order and the first match wins, so mixed-script text
/// reports the earliest script in the list. Falls back to `en`.
pub fn detect_language(text: &str) -> &'static str {
    const CHECKS: [(&str, fn(char) -> bool); 7] = [
        ("ar", is_arabic),
        ("he", is_hebrew),
        ("fa", is_persian),
        ("ru", is_cyrillic),
        ("ja", is_japanese),
        ("ko", is_korean),
        ("es", is_spanish_mark),
    ];

    CHECKS
        .iter()
        .find(|(_, matches)| text.chars().any(|c| matches(c)))
        .map_or("en", |(code, _)| *code)
}

fn is_arabic(c: char) -> bool {
    matches!(c, '\u{0621}'..='\u{064A}')
}

fn is_hebrew(c: char) -> bool {
    matches!(c, '\u{05D0}'..='\u{05EA}')
}

// Persian letters outside the core Arabic block, e.g. U+06CC.
fn is_persian(c: char) -> bool {
    matches!(c, '\u{0622}'..='\u{06CC}')
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0410}'..='\u{044F}')
}

fn is_japanese(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{4E00}'..='\u{9FAF}')
}

fn is_korean(c: char) -> bool {
    matches!(c, '\u{3131}'..='\u{314E}' | '\u{AC00}'..='\u{D7A3}')
}

fn is_spanish_mark(c: char) -> bool {
    matches!(
        c,
        'á' | 'é' | 'í' | 'ó' | 'ú' | 'ñ' | '¿' | '¡' | 'Á' | 'É' | 'Í' | 'Ó' | 'Ú' | 'Ñ'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts() {
        assert_eq!(detect_language("مرحبا"), "ar");
        assert_eq!(detect_language("שלום"), "he");
        assert_eq!(detect_language("Привет"), "ru");
        assert_eq!(detect_language("こんにちは"), "ja");
        assert_eq!(detect_language("漢字"), "ja");
        assert_eq!(detect_language("안녕하세요"), "ko");
        assert_eq!(detect_language("¿Qué tal?"), "es");
        assert_eq!(detect_language("hello there"), "en");
        assert_eq!(detect_language(""), "en");
    }

    #[test]
    fn test_persian_only_letters() {
        // U+06CC (Farsi yeh) sits outside the Arabic check.
        assert_eq!(detect_language("\u{06CC}"), "fa");
    }

    #[test]
    fn test_check_order_wins_for_mixed_text() {
        assert_eq!(detect_language("Привет ¿qué?"), "ru");
        assert_eq!(detect_language("שלום مرحبا"), "ar");
    }
}
