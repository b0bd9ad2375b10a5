//! Bilingual vocabulary mapping surface phrases to catalogue topics.

use super::lang::is_hebrew_letter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Topic {
    /// Value of the `materialType` filter.
    Material(&'static str),
    Period {
        name: &'static str,
        from: i32,
        to: i32,
    },
    /// Archive language code.
    ItemLanguage(&'static str),
    Subject {
        token: &'static str,
        he: &'static str,
        en: &'static str,
    },
    /// `name` is the catalogue authority form.
    Person {
        token: &'static str,
        name: &'static str,
    },
}

impl Topic {
    pub(super) fn label(&self) -> String {
        match self {
            Topic::Material(m) => format!("material:{m}"),
            Topic::Period { name, .. } => format!("period:{name}"),
            Topic::ItemLanguage(code) => format!("language:{code}"),
            Topic::Subject { token, .. } => format!("subject:{token}"),
            Topic::Person { token, .. } => format!("person:{token}"),
        }
    }
}

pub(super) struct Entry {
    pub phrases: &'static [&'static str],
    pub topic: Topic,
}

const fn subject(token: &'static str, he: &'static str, en: &'static str) -> Topic {
    Topic::Subject { token, he, en }
}

const fn person(token: &'static str, name: &'static str) -> Topic {
    Topic::Person { token, name }
}

pub(super) const ENTRIES: &[Entry] = &[
    // material types
    Entry {
        phrases: &["rare books", "ספרים נדירים", "ספרים עתיקים"],
        topic: Topic::Material("rareBooks"),
    },
    Entry {
        phrases: &["books", "book", "ספרים", "ספר", "ספרי"],
        topic: Topic::Material("books"),
    },
    Entry {
        phrases: &["articles", "article", "מאמרים", "מאמר"],
        topic: Topic::Material("articles"),
    },
    Entry {
        phrases: &[
            "images", "image", "photos", "photo", "photographs", "photograph", "pictures",
            "picture", "תמונות", "תמונה", "צילומים", "צילום",
        ],
        topic: Topic::Material("images"),
    },
    Entry {
        phrases: &[
            "audio", "recordings", "recording", "music", "הקלטות", "הקלטה", "מוזיקה",
        ],
        topic: Topic::Material("audio"),
    },
    Entry {
        phrases: &["videos", "video", "films", "film", "סרטים", "סרט"],
        topic: Topic::Material("videos"),
    },
    Entry {
        phrases: &["maps", "map", "מפות", "מפה"],
        topic: Topic::Material("maps"),
    },
    Entry {
        phrases: &[
            "journals", "journal", "newspapers", "newspaper", "periodicals", "עיתונים", "עיתון",
            "כתבי עת", "כתב עת",
        ],
        topic: Topic::Material("journals"),
    },
    Entry {
        phrases: &[
            "manuscripts", "manuscript", "כתבי יד", "כתב יד", "כתבי-יד", "כתב-יד",
        ],
        topic: Topic::Material("manuscripts"),
    },
    // periods
    Entry {
        phrases: &["medieval", "middle ages", "ימי הביניים"],
        topic: Topic::Period {
            name: "medieval",
            from: 500,
            to: 1499,
        },
    },
    Entry {
        phrases: &["renaissance", "רנסנס", "הרנסנס"],
        topic: Topic::Period {
            name: "renaissance",
            from: 1400,
            to: 1600,
        },
    },
    Entry {
        phrases: &["ottoman", "ottoman period", "עות'מאני", "העות'מאנית", "התקופה העות'מאנית"],
        topic: Topic::Period {
            name: "ottoman",
            from: 1517,
            to: 1917,
        },
    },
    Entry {
        phrases: &["british mandate", "mandate", "mandatory palestine", "המנדט", "המנדט הבריטי"],
        topic: Topic::Period {
            name: "mandate",
            from: 1917,
            to: 1948,
        },
    },
    // item languages
    Entry {
        phrases: &["hebrew", "עברית"],
        topic: Topic::ItemLanguage("heb"),
    },
    Entry {
        phrases: &["english", "אנגלית"],
        topic: Topic::ItemLanguage("eng"),
    },
    Entry {
        phrases: &["yiddish", "יידיש", "אידיש"],
        topic: Topic::ItemLanguage("yid"),
    },
    Entry {
        phrases: &["arabic", "ערבית"],
        topic: Topic::ItemLanguage("ara"),
    },
    Entry {
        phrases: &["ladino", "judeo-spanish", "לדינו"],
        topic: Topic::ItemLanguage("lad"),
    },
    Entry {
        phrases: &["aramaic", "ארמית"],
        topic: Topic::ItemLanguage("arc"),
    },
    Entry {
        phrases: &["german", "גרמנית"],
        topic: Topic::ItemLanguage("ger"),
    },
    Entry {
        phrases: &["russian", "רוסית"],
        topic: Topic::ItemLanguage("rus"),
    },
    Entry {
        phrases: &["french", "צרפתית"],
        topic: Topic::ItemLanguage("fre"),
    },
    // subjects
    Entry {
        phrases: &["children", "children's", "kids", "ילדים", "ספרות ילדים"],
        topic: subject("children", "ספרות ילדים", "Children's literature"),
    },
    Entry {
        phrases: &["holocaust", "shoah", "שואה"],
        topic: subject("holocaust", "שואה", "Holocaust"),
    },
    Entry {
        phrases: &["zionism", "zionist", "ציונות", "ציוני", "ציונית"],
        topic: subject("zionism", "ציונות", "Zionism"),
    },
    Entry {
        phrases: &["jerusalem", "ירושלים"],
        topic: subject("jerusalem", "ירושלים", "Jerusalem"),
    },
    Entry {
        phrases: &["kabbalah", "cabala", "קבלה"],
        topic: subject("kabbalah", "קבלה", "Cabala"),
    },
    Entry {
        phrases: &["poetry", "poems", "poem", "שירה", "שירים", "שירי"],
        topic: subject("poetry", "שירה", "Poetry"),
    },
    Entry {
        phrases: &["bible", "tanakh", "תנ\"ך", "מקרא"],
        topic: subject("bible", "תנ\"ך", "Bible"),
    },
    Entry {
        phrases: &["talmud", "תלמוד"],
        topic: subject("talmud", "תלמוד", "Talmud"),
    },
    Entry {
        phrases: &["haggadah", "haggadot", "הגדה", "הגדות", "הגדה של פסח"],
        topic: subject("haggadah", "הגדה של פסח", "Haggadah"),
    },
    Entry {
        phrases: &["ketubah", "ketubot", "ketubbah", "כתובה", "כתובות"],
        topic: subject("ketubah", "כתובה", "Ketubah"),
    },
    Entry {
        phrases: &["folk tales", "fairy tales", "folklore", "מעשיות", "סיפורי עם", "אגדות"],
        topic: subject("folklore", "סיפורי עם", "Folk literature"),
    },
    // people
    Entry {
        phrases: &[
            "bialik", "chaim nachman bialik", "hayim nahman bialik", "ביאליק",
            "חיים נחמן ביאליק", "ח\"נ ביאליק",
        ],
        topic: person("bialik", "חיים נחמן ביאליק"),
    },
    Entry {
        phrases: &[
            "ben gurion", "ben-gurion", "david ben gurion", "david ben-gurion", "בן גוריון",
            "בן-גוריון", "דוד בן גוריון",
        ],
        topic: person("ben-gurion", "דוד בן גוריון"),
    },
    Entry {
        phrases: &["herzl", "theodor herzl", "הרצל", "בנימין זאב הרצל", "תיאודור הרצל"],
        topic: person("herzl", "בנימין זאב הרצל"),
    },
    Entry {
        phrases: &["agnon", "s. y. agnon", "shmuel yosef agnon", "עגנון", "ש\"י עגנון"],
        topic: person("agnon", "ש\"י עגנון"),
    },
    Entry {
        phrases: &["leah goldberg", "lea goldberg", "לאה גולדברג"],
        topic: person("leah-goldberg", "לאה גולדברג"),
    },
    Entry {
        phrases: &["amichai", "yehuda amichai", "עמיחי", "יהודה עמיחי"],
        topic: person("amichai", "יהודה עמיחי"),
    },
    Entry {
        phrases: &["golda meir", "גולדה מאיר"],
        topic: person("golda-meir", "גולדה מאיר"),
    },
    Entry {
        phrases: &["maimonides", "rambam", "רמב\"ם", "הרמב\"ם", "משה בן מימון"],
        topic: person("maimonides", "משה בן מימון"),
    },
    Entry {
        phrases: &["rav kook", "הרב קוק"],
        topic: person("kook", "אברהם יצחק הכהן קוק"),
    },
];

pub(super) const STOP_WORDS: &[&str] = &[
    // English
    "a", "about", "all", "an", "and", "any", "are", "between", "by", "centuries", "century",
    "do", "during", "era", "find", "first", "for", "from", "get", "give", "have", "i", "in",
    "is", "item", "items", "last", "library", "look", "looking", "me", "my", "national", "of",
    "on", "or", "period", "please", "related", "result", "results", "search", "show", "some",
    "the", "there", "to", "top", "until", "want", "what", "which", "who", "with", "work",
    "works", "written", "wrote", "you",
    // Hebrew
    "של", "על", "את", "עם", "או", "גם", "תן", "תני", "לי", "הראה", "הראי", "חפש", "חפשי",
    "מצא", "אני", "רוצה", "מחפש", "מחפשת", "כל", "יש", "מה", "מי", "אודות", "בנושא", "נושא",
    "בין", "עד", "המאה", "מאה", "תקופת", "תקופה", "ספרייה", "הספרייה", "ספריה", "הספריה",
    "הלאומית", "פריטים", "תוצאות", "ראשונים", "הראשונים", "הראשונות", "אחרונים", "האחרונים",
    "שכתב", "שכתבה", "מאת", "כתב", "כתבה", "בבקשה",
];

/// One-letter prefixes (and, the, in, to, from, that, as) fused onto Hebrew words.
const HEBREW_PREFIXES: &[char] = &['ו', 'ה', 'ב', 'ל', 'מ', 'ש', 'כ'];

/// Lowercases and splits text into tokens. Hyphens, apostrophes and double
/// quotes survive inside tokens (`19th-century`, `children's`, `תנ"ך`).
pub(super) fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .chars()
        .map(|c| match c {
            '\u{05BE}' | '\u{2010}' | '\u{2011}' | '\u{2013}' => '-',
            '\u{05F3}' | '\u{2019}' | '`' => '\'',
            '\u{05F4}' | '\u{201C}' | '\u{201D}' => '"',
            c if c.is_alphanumeric() || matches!(c, '-' | '\'' | '"') => c,
            _ => ' ',
        })
        .flat_map(char::to_lowercase)
        .collect();

    normalized
        .split_whitespace()
        .map(|t| t.trim_matches(|c| matches!(c, '-' | '\'' | '"')))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `בירושלים` → `ירושלים`. Only applies when at least two letters remain.
pub(super) fn strip_hebrew_prefix(token: &str) -> Option<&str> {
    let mut chars = token.chars();
    let first = chars.next()?;
    if !HEBREW_PREFIXES.contains(&first) {
        return None;
    }
    let rest = chars.as_str();
    (rest.chars().filter(|c| is_hebrew_letter(*c)).count() >= 2).then_some(rest)
}

fn token_matches(token: &str, word: &str, allow_prefix: bool) -> bool {
    token == word || (allow_prefix && strip_hebrew_prefix(token) == Some(word))
}

/// Longest lexicon phrase starting at `tokens[start]`, as (token count, topic).
pub(super) fn longest_match(tokens: &[String], start: usize) -> Option<(usize, Topic)> {
    let mut best: Option<(usize, Topic)> = None;
    for entry in ENTRIES {
        for phrase in entry.phrases {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            if start + words.len() > tokens.len() {
                continue;
            }
            let matched = words
                .iter()
                .enumerate()
                .all(|(i, w)| token_matches(&tokens[start + i], w, i == 0));
            if matched && best.is_none_or(|(len, _)| words.len() > len) {
                best = Some((words.len(), entry.topic));
            }
        }
    }
    best
}

pub(super) fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}
