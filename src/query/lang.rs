use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Language hint supplied with a query.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    He,
    En,
    #[default]
    Auto,
}

/// Language a response is rendered in, after `auto` has been resolved.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLanguage {
    #[default]
    He,
    En,
}

impl Language {
    pub fn resolve(self, text: &str) -> ResponseLanguage {
        match self {
            Language::He => ResponseLanguage::He,
            Language::En => ResponseLanguage::En,
            Language::Auto => detect(text),
        }
    }
}

impl ResponseLanguage {
    pub fn code(self) -> &'static str {
        match self {
            ResponseLanguage::He => "he",
            ResponseLanguage::En => "en",
        }
    }

    /// Whether a metadata language tag (`he`, `heb`, `en-US`, ...) denotes this language.
    pub fn matches_tag(self, tag: &str) -> bool {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match self {
            ResponseLanguage::He => matches!(primary.as_str(), "he" | "heb" | "iw"),
            ResponseLanguage::En => matches!(primary.as_str(), "en" | "eng"),
        }
    }
}

/// Hebrew when Hebrew letters are at least as frequent as Latin ones.
pub(super) fn detect(text: &str) -> ResponseLanguage {
    let (hebrew, latin) = text.chars().fold((0usize, 0usize), |(h, l), c| {
        if is_hebrew_letter(c) {
            (h + 1, l)
        } else if c.is_alphabetic() && c.is_ascii() {
            (h, l + 1)
        } else {
            (h, l)
        }
    });
    if hebrew > 0 && hebrew >= latin {
        ResponseLanguage::He
    } else {
        ResponseLanguage::En
    }
}

pub(super) fn is_hebrew_letter(c: char) -> bool {
    matches!(c,
        '\u{05D0}'..='\u{05EA}' |
        '\u{05F0}'..='\u{05F2}' |
        '\u{FB1D}'..='\u{FB4F}'
    )
}
