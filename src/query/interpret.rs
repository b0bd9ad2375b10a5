use tracing::debug;

use super::lexicon::{self, Topic};
use super::{Field, Filter, Language, Query, ResponseLanguage, StructuredQuerySpec, Variant};
use crate::error::{NliError, Result};

const MAX_CANDIDATES: usize = 8;
/// People beyond this count are kept as topics but get no candidate of their own.
const MAX_PERSON_VARIANTS: usize = 3;
const MAX_REQUESTED_LIMIT: u32 = 500;
const YEARS: std::ops::RangeInclusive<i32> = 1000..=2100;

#[derive(Default, Debug)]
struct Recognised {
    topics: Vec<String>,
    materials: Vec<&'static str>,
    period: Option<(i32, i32)>,
    years: Vec<i32>,
    languages: Vec<&'static str>,
    subjects: Vec<(&'static str, &'static str)>,
    persons: Vec<&'static str>,
    limit: Option<u32>,
    residual: Vec<String>,
}

impl Recognised {
    fn topic(&mut self, label: String) {
        if !self.topics.contains(&label) {
            self.topics.push(label);
        }
    }

    fn add(&mut self, topic: Topic) {
        match topic {
            Topic::Material(m) => push_unique(&mut self.materials, m),
            Topic::Period { from, to, .. } => {
                if self.period.is_some() {
                    return;
                }
                self.period = Some((from, to));
            }
            Topic::ItemLanguage(code) => push_unique(&mut self.languages, code),
            Topic::Subject { he, en, .. } => push_unique(&mut self.subjects, (he, en)),
            Topic::Person { name, .. } => push_unique(&mut self.persons, name),
        }
        self.topic(topic.label());
    }

    fn add_period(&mut self, label: String, from: i32, to: i32) {
        if self.period.is_none() {
            self.period = Some((from, to));
            self.topic(format!("period:{label}"));
        }
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Turns free text into candidate specs, most confident first.
///
/// Pure: no network access. Fails only when the text is blank.
pub fn interpret(raw_text: &str, hint: Language) -> Result<Query> {
    let text = raw_text.trim();
    if text.is_empty() {
        return Err(NliError::EmptyQuery);
    }

    let language = hint.resolve(text);
    let tokens = lexicon::tokenize(text);
    let mut recognised = recognise(&tokens);

    if recognised.period.is_none()
        && let (Some(&from), Some(&to)) =
            (recognised.years.iter().min(), recognised.years.iter().max())
    {
        let label = if from == to {
            from.to_string()
        } else {
            format!("{from}-{to}")
        };
        recognised.add_period(label, from, to);
    }
    if let Some(limit) = recognised.limit {
        recognised.topic(format!("limit:{limit}"));
    }

    let candidate_specs = build_candidates(text, language, &recognised);
    debug!(
        language = language.code(),
        topics = ?recognised.topics,
        candidates = candidate_specs.len(),
        "query interpreted"
    );

    Ok(Query {
        raw_text: text.to_string(),
        language,
        inferred_topics: recognised.topics,
        candidate_specs,
    })
}

fn recognise(tokens: &[String]) -> Recognised {
    let mut rec = Recognised::default();
    let mut i = 0;
    while i < tokens.len() {
        if let Some((consumed, limit)) = count_request(tokens, i) {
            rec.limit.get_or_insert(limit);
            i += consumed;
            continue;
        }
        if let Some((consumed, century)) = century_at(tokens, i) {
            rec.add_period(
                format!("century-{century}"),
                (century - 1) * 100,
                century * 100 - 1,
            );
            i += consumed;
            continue;
        }
        if let Some((from, to)) = year_range(&tokens[i]) {
            rec.years.push(from);
            rec.years.push(to);
            i += 1;
            continue;
        }
        if let Some((consumed, topic)) = lexicon::longest_match(tokens, i) {
            rec.add(topic);
            i += consumed;
            continue;
        }

        let token = &tokens[i];
        if !lexicon::is_stop_word(token) && !token.chars().all(|c| c.is_ascii_digit()) {
            rec.residual.push(token.clone());
        }
        i += 1;
    }
    rec
}

/// "first 10", "top 5", "10 הראשונים". Requests for the last N are not limits.
fn count_request(tokens: &[String], i: usize) -> Option<(usize, u32)> {
    let next = tokens.get(i + 1)?;
    let n = match tokens[i].as_str() {
        "first" | "top" => parse_count(next)?,
        _ if matches!(next.as_str(), "הראשונים" | "הראשונות" | "ראשונים") => {
            parse_count(&tokens[i])?
        }
        _ => return None,
    };
    Some((2, n))
}

fn parse_count(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("ה-")
        .or_else(|| token.strip_prefix('ה'))
        .unwrap_or(token);
    digits
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_REQUESTED_LIMIT).contains(n))
}

/// "15th century", "15th-century", "המאה ה-15".
fn century_at(tokens: &[String], i: usize) -> Option<(usize, i32)> {
    let token = tokens[i].as_str();
    let next = tokens.get(i + 1).map(String::as_str);

    let (consumed, number) = if let Some(ordinal) = token.strip_suffix("-century") {
        (1, ordinal)
    } else if matches!(next, Some("century" | "centuries")) {
        (2, token)
    } else if token == "המאה" || lexicon::strip_hebrew_prefix(token) == Some("המאה") {
        let next = next?;
        (
            2,
            next.strip_prefix("ה-")
                .or_else(|| next.strip_prefix('ה'))
                .unwrap_or(next),
        )
    } else {
        return None;
    };

    let digits = number.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let century: i32 = digits.parse().ok()?;
    (1..=21).contains(&century).then_some((consumed, century))
}

/// "1948" or "1900-1950".
fn year_range(token: &str) -> Option<(i32, i32)> {
    let parse = |s: &str| {
        (s.len() == 4)
            .then(|| s.parse::<i32>().ok())
            .flatten()
            .filter(|y| YEARS.contains(y))
    };
    match token.split_once('-') {
        Some((a, b)) => {
            let (a, b) = (parse(a)?, parse(b)?);
            Some((a.min(b), a.max(b)))
        }
        None => parse(token).map(|y| (y, y)),
    }
}

fn build_candidates(
    text: &str,
    language: ResponseLanguage,
    rec: &Recognised,
) -> Vec<StructuredQuerySpec> {
    let mut base = StructuredQuerySpec {
        limit: rec.limit,
        ..Default::default()
    };

    if let Some((from, to)) = rec.period {
        base.fielded_terms
            .insert(Field::DateStart, format!("{from:04}0101"));
        base.fielded_terms
            .insert(Field::DateEnd, format!("{to:04}1231"));
    }
    if let Some(code) = rec.languages.first() {
        base.fielded_terms.insert(Field::Language, code.to_string());
    }
    if let Some(material) = rec.materials.first() {
        base.filters
            .insert(Filter::MaterialType, material.to_string());
    }

    let mut extra_text = rec.residual.clone();
    let mut subjects = rec.subjects.iter().map(|&(he, en)| match language {
        ResponseLanguage::He => he,
        ResponseLanguage::En => en,
    });
    if let Some(first) = subjects.next() {
        base.fielded_terms.insert(Field::Subject, first.to_string());
    }
    extra_text.extend(subjects.map(str::to_string));

    if !extra_text.is_empty() {
        let joined = extra_text.join(" ");
        if base.fielded_terms.is_empty() && rec.persons.is_empty() {
            base.free_text_fallback = Some(joined);
        } else {
            base.fielded_terms.insert(Field::Any, joined);
        }
    }
    if !base.has_query()
        && rec.persons.is_empty()
        && (!base.filters.is_empty() || !base.fielded_terms.is_empty())
    {
        base.free_text_fallback = Some(text.to_string());
    }

    let persons = &rec.persons[..rec.persons.len().min(MAX_PERSON_VARIANTS)];
    let mut candidates = Vec::new();

    if persons.is_empty() {
        candidates.push(base.clone());
    } else {
        for name in persons {
            candidates.push(base.clone().with_term(Field::Creator, *name));
        }
    }

    if let Some(primary) = candidates.first().cloned() {
        for material in rec.materials.iter().skip(1) {
            let mut alternate = primary.clone().with_filter(Filter::MaterialType, *material);
            alternate.variant = Variant::AlternateMaterial;
            candidates.push(alternate);
        }
    }

    for name in persons {
        let mut about = base.clone();
        about.variant = Variant::PersonAsSubject;
        if let Some(previous) = about.fielded_terms.insert(Field::Subject, name.to_string()) {
            let any = match about.fielded_terms.remove(&Field::Any) {
                Some(existing) => format!("{previous} {existing}"),
                None => previous,
            };
            about.fielded_terms.insert(Field::Any, any);
        }
        candidates.push(about);
    }

    let mut loose = StructuredQuerySpec::free_text(text);
    loose.limit = rec.limit;
    candidates.push(loose);

    let mut ranked: Vec<StructuredQuerySpec> = Vec::new();
    for candidate in candidates {
        if candidate.has_query() && !ranked.iter().any(|c| c.same_search(&candidate)) {
            ranked.push(candidate);
        }
    }
    ranked.truncate(MAX_CANDIDATES);
    ranked
}
