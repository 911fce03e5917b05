//! Language detection, applied during the ingestion pipeline's
//! `LANG_DETECT` stage (spec.md §4.2 step 3). Non-fatal: a failure or
//! an unconfident result just leaves `detected_language = None`.

const SAMPLE_CHARS: usize = 2000;

/// Detects the dominant language of `pages` from a sample of their
/// concatenated text, returning an ISO 639-1 code (e.g. `"en"`) or
/// `None` if the sample is too short or no language is confidently
/// detected.
pub fn detect(pages: &[String]) -> Option<String> {
    let sample: String = pages
        .iter()
        .flat_map(|p| p.chars())
        .take(SAMPLE_CHARS)
        .collect();

    if sample.trim().len() < 10 {
        return None;
    }

    whatlang::detect(&sample)
        .filter(|info| info.is_reliable())
        .map(|info| to_iso_639_1(info.lang()).to_string())
}

/// `whatlang::Lang::code()` returns ISO 639-3 (three-letter); the rest of
/// this codebase stores the more familiar ISO 639-1 (two-letter) code, so
/// map the languages whatlang can detect down to their 639-1 equivalent.
/// Falls back to the 639-3 code for the handful of languages that have no
/// 639-1 assignment.
fn to_iso_639_1(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;
    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Nob => "nb",
        Lang::Fin => "fi",
        Lang::Pol => "pl",
        Lang::Ces => "cs",
        Lang::Slk => "sk",
        Lang::Ron => "ro",
        Lang::Hun => "hu",
        Lang::Bul => "bg",
        Lang::Ukr => "uk",
        Lang::Rus => "ru",
        Lang::Ell => "el",
        Lang::Tur => "tr",
        Lang::Heb => "he",
        Lang::Arb => "ar",
        Lang::Fas => "fa",
        Lang::Hin => "hi",
        Lang::Ben => "bn",
        Lang::Tam => "ta",
        Lang::Tel => "te",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Vie => "vi",
        Lang::Tha => "th",
        Lang::Ind => "id",
        other => other.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english() {
        let pages = vec![
            "The quick brown fox jumps over the lazy dog. \
             This is a longer sample of English prose used to give the \
             language detector enough signal to be confident in its guess."
                .to_string(),
        ];
        assert_eq!(detect(&pages), Some("en".to_string()));
    }

    #[test]
    fn returns_none_for_empty_input() {
        assert_eq!(detect(&[]), None);
    }

    #[test]
    fn returns_none_for_too_short_sample() {
        assert_eq!(detect(&["hi".to_string()]), None);
    }
}
