//! Blocking predicates
//!
//! A predicate maps a record to zero or more block-keys. Two records are
//! candidates under a predicate when they share at least one key. Values
//! are lower-cased before keying and missing values yield no keys.

use relink_core::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Block-keys of one record under one predicate
pub type BlockKeys = SmallVec<[String; 4]>;

/// Separator between component keys of a compound predicate.
const COMPOUND_SEPARATOR: char = '\u{1f}';

/// How a single field value is turned into keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// The whole value
    WholeField,
    /// Each word token
    TokenField,
    /// First n characters
    Prefix(usize),
    /// Last n characters
    Suffix(usize),
    /// Each character n-gram, spaces removed
    NGram(usize),
    /// Each run of digits, leading zeros dropped
    CommonInteger,
    /// Each integer and its two neighbours
    NearInteger,
    /// Order of magnitude and first significant digit
    NumericBucket,
}

impl PredicateKind {
    /// Every kind tried for each field, in catalogue order.
    pub const CATALOGUE: [PredicateKind; 12] = [
        PredicateKind::WholeField,
        PredicateKind::TokenField,
        PredicateKind::Prefix(3),
        PredicateKind::Prefix(5),
        PredicateKind::Prefix(7),
        PredicateKind::Suffix(3),
        PredicateKind::Suffix(5),
        PredicateKind::NGram(4),
        PredicateKind::NGram(6),
        PredicateKind::CommonInteger,
        PredicateKind::NearInteger,
        PredicateKind::NumericBucket,
    ];

    fn keys(self, value: &FieldValue) -> BlockKeys {
        if let PredicateKind::NumericBucket = self {
            return value.as_number().map(numeric_bucket).into_iter().collect();
        }
        let Some(text) = value.as_text() else {
            return BlockKeys::new();
        };
        let text = text.to_lowercase();

        let mut keys: BlockKeys = match self {
            PredicateKind::WholeField => std::iter::once(text).collect(),
            PredicateKind::TokenField => tokenize(&text).collect(),
            PredicateKind::Prefix(n) => std::iter::once(text.chars().take(n).collect::<String>()).collect(),
            PredicateKind::Suffix(n) => {
                let count = text.chars().count();
                std::iter::once(text.chars().skip(count.saturating_sub(n)).collect::<String>()).collect()
            }
            PredicateKind::NGram(n) => {
                let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
                chars.windows(n).map(|w| w.iter().collect::<String>()).collect()
            }
            PredicateKind::CommonInteger => integers(&text).collect(),
            PredicateKind::NearInteger => integers(&text)
                .flat_map(|i| match i.parse::<u64>() {
                    Ok(n) => vec![n.saturating_sub(1).to_string(), i, n.saturating_add(1).to_string()],
                    Err(_) => vec![i],
                })
                .collect(),
            PredicateKind::NumericBucket => BlockKeys::new(),
        };
        keys.retain(|k| !k.is_empty());
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

impl std::fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredicateKind::WholeField => write!(f, "whole"),
            PredicateKind::TokenField => write!(f, "token"),
            PredicateKind::Prefix(n) => write!(f, "prefix{}", n),
            PredicateKind::Suffix(n) => write!(f, "suffix{}", n),
            PredicateKind::NGram(n) => write!(f, "ngram{}", n),
            PredicateKind::CommonInteger => write!(f, "integer"),
            PredicateKind::NearInteger => write!(f, "near_integer"),
            PredicateKind::NumericBucket => write!(f, "numeric_bucket"),
        }
    }
}

/// Tokenize text for blocking: split on whitespace and punctuation, drop
/// single characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|s| s.chars().count() > 1)
        .map(str::to_string)
}

fn integers(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let trimmed = s.trim_start_matches('0');
            if trimmed.is_empty() {
                "0".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

fn numeric_bucket(x: f64) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let sign = if x < 0.0 { "-" } else { "" };
    let magnitude = x.abs().log10().floor();
    let digit = (x.abs() / 10f64.powf(magnitude)).floor().clamp(1.0, 9.0);
    format!("{}{}e{}", sign, digit as u8, magnitude as i32)
}

/// One field keyed one way
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimplePredicate {
    pub field: String,
    pub kind: PredicateKind,
}

impl SimplePredicate {
    pub fn new(field: impl Into<String>, kind: PredicateKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn keys(&self, record: &Record) -> BlockKeys {
        self.kind.keys(record.get(&self.field))
    }
}

impl std::fmt::Display for SimplePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.field)
    }
}

/// A blocking rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Simple(SimplePredicate),
    /// Both components must share a key; keys are the cross product
    Compound(SimplePredicate, SimplePredicate),
    /// Every record in one block: the full comparison space
    AlwaysTrue,
}

impl Predicate {
    /// Sorted, de-duplicated block-keys of a record.
    pub fn keys(&self, record: &Record) -> BlockKeys {
        match self {
            Predicate::Simple(p) => p.keys(record),
            Predicate::Compound(a, b) => {
                let right = b.keys(record);
                let mut keys: BlockKeys = a
                    .keys(record)
                    .iter()
                    .flat_map(|x| right.iter().map(move |y| format!("{}{}{}", x, COMPOUND_SEPARATOR, y)))
                    .collect();
                keys.sort_unstable();
                keys
            }
            Predicate::AlwaysTrue => std::iter::once(String::from("*")).collect(),
        }
    }

    /// Fields this predicate reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Predicate::Simple(p) => vec![p.field.as_str()],
            Predicate::Compound(a, b) => vec![a.field.as_str(), b.field.as_str()],
            Predicate::AlwaysTrue => Vec::new(),
        }
    }
}

impl From<SimplePredicate> for Predicate {
    fn from(p: SimplePredicate) -> Self {
        Predicate::Simple(p)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Simple(p) => write!(f, "{}", p),
            Predicate::Compound(a, b) => write!(f, "({} & {})", a, b),
            Predicate::AlwaysTrue => write!(f, "always"),
        }
    }
}

/// The learned predicates; candidates are the union of their blocks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Fallback set covering the full cross product.
    pub fn always_true() -> Self {
        Self::new(vec![Predicate::AlwaysTrue])
    }

    /// True when the set falls back to comparing everything.
    pub fn is_degenerate(&self) -> bool {
        self.predicates.contains(&Predicate::AlwaysTrue)
    }

    #[inline]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.predicates.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// All simple predicates for the given fields, in catalogue order.
pub fn catalogue<'a>(fields: impl IntoIterator<Item = &'a str>) -> Vec<SimplePredicate> {
    fields
        .into_iter()
        .flat_map(|field| {
            PredicateKind::CATALOGUE
                .iter()
                .map(move |&kind| SimplePredicate::new(field, kind))
        })
        .collect()
}
