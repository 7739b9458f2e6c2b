//! Upload file name checks.

/// Extensions accepted for upload (compared lower-cased)
pub const ALLOWED_EXTENSIONS: &[&str] = &["wav"];

/// Whether an uploaded file name has an accepted extension.
///
/// The extension is whatever follows the last `.`; a name without a dot
/// or with a trailing dot is rejected.
pub fn is_allowed(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_wav() {
        assert!(is_allowed("speech.wav"));
        assert!(is_allowed("speech.WAV"));
        assert!(is_allowed("AUDIO.Wav"));
        assert!(is_allowed("a.b.wav"));
        assert!(is_allowed(".wav"));
    }

    #[test]
    fn test_rejects_other_names() {
        assert!(!is_allowed("speech.mp3"));
        assert!(!is_allowed("speech"));
        assert!(!is_allowed("speech."));
        assert!(!is_allowed("document.pdf"));
        assert!(!is_allowed("speech.wav.mp3"));
        assert!(!is_allowed("speech.wave"));
        assert!(!is_allowed("wav"));
        assert!(!is_allowed(""));
    }

    proptest! {
        #[test]
        fn prop_matches_last_extension(stem in "[a-zA-Z0-9 ._-]{0,20}", ext in "[a-zA-Z0-9]{0,5}") {
            let name = format!("{}.{}", stem, ext);
            prop_assert_eq!(is_allowed(&name), ext.to_lowercase() == "wav");
        }

        #[test]
        fn prop_no_dot_is_rejected(name in "[a-zA-Z0-9 _-]{0,20}") {
            prop_assert!(!is_allowed(&name));
        }
    }
}
