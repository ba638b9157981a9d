use trialmap_protocol::Language;

const DOMINANT_SHARE: f32 = 0.7;

/// Script-based language guess for one text.
///
/// Cyrillic or Latin letters holding at least 70 % of the letters decide the
/// language; a text with both scripts below that share is `Mixed`; a text with no
/// letters inherits `fallback`.
#[must_use]
pub fn detect_language(text: &str, fallback: Language) -> Language {
    let mut cyrillic = 0usize;
    let mut latin = 0usize;
    for ch in text.chars() {
        if !ch.is_alphabetic() {
            continue;
        }
        if is_cyrillic(ch) {
            cyrillic += 1;
        } else if ch.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&ch) {
            latin += 1;
        }
    }

    let total = cyrillic + latin;
    if total == 0 {
        return fallback;
    }

    #[allow(clippy::cast_precision_loss)]
    let cyrillic_share = cyrillic as f32 / total as f32;
    if cyrillic_share >= DOMINANT_SHARE {
        Language::Ru
    } else if 1.0 - cyrillic_share >= DOMINANT_SHARE {
        Language::En
    } else {
        Language::Mixed
    }
}

const fn is_cyrillic(ch: char) -> bool {
    matches!(ch, '\u{0400}'..='\u{04FF}' | '\u{0500}'..='\u{052F}')
}
