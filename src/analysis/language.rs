//! Language gate in front of the models

use crate::config::UndetectedLanguage;

/// Outcome of checking an item's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageCheck {
    /// Text is in the target language
    Target,
    /// Text is in another language (ISO 639-3 code)
    Other(String),
    /// No reliable detection was possible
    Undetected,
}

/// Language detection behind a seam so tests can pin the result
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-3 code of the detected language, if reliable
    fn detect(&self, text: &str) -> Option<String>;
}

/// whatlang trigram detector; unreliable guesses count as undetected
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        whatlang::detect(text)
            .filter(|info| info.is_reliable())
            .map(|info| info.lang().code().to_string())
    }
}

pub fn check(detector: &dyn LanguageDetector, target: &str, text: &str) -> LanguageCheck {
    match detector.detect(text) {
        Some(code) if code == target => LanguageCheck::Target,
        Some(code) => LanguageCheck::Other(code),
        None => LanguageCheck::Undetected,
    }
}

impl LanguageCheck {
    /// Whether the models should run for this item
    pub fn proceed(&self, policy: UndetectedLanguage) -> bool {
        match self {
            Self::Target => true,
            Self::Other(_) => false,
            Self::Undetected => policy == UndetectedLanguage::Proceed,
        }
    }
}
