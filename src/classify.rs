// src/classify.rs
//! Lexical classifier: keyword-frequency scoring against per-category tables.
//!
//! Pure and deterministic. Tables are built once at startup and shared
//! read-only (`Arc<KeywordTables>`); tests inject smaller tables.

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::Category;

pub const ENV_KEYWORDS_PATH: &str = "AGGREGATOR_KEYWORDS_PATH";
pub const DEFAULT_KEYWORDS_PATH: &str = "config/keywords.toml";

/// Minimum distinct hits before a keyword set may tag or re-file an item.
pub const HIT_THRESHOLD: usize = 2;

const EMBEDDED_KEYWORDS: &str = include_str!("../config/keywords.toml");

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
struct KeywordsFile {
    topic: Vec<String>,
    #[serde(default, rename = "category")]
    categories: Vec<CategoryKeywords>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryKeywords {
    name: Category,
    keywords: Vec<String>,
}

/// Immutable keyword tables. Category order is the declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTables {
    topic: Vec<String>,
    categories: Vec<(Category, Vec<String>)>,
}

impl KeywordTables {
    pub fn new(topic: Vec<String>, categories: Vec<(Category, Vec<String>)>) -> Result<Self> {
        let mut seen = Vec::with_capacity(categories.len());
        for (cat, _) in &categories {
            if *cat == Category::Ai {
                bail!("`ai` is the privileged topic and cannot appear as a keyword category");
            }
            if seen.contains(cat) {
                bail!("keyword category `{cat}` declared twice");
            }
            seen.push(*cat);
        }
        Ok(Self {
            topic: clean_keywords(topic),
            categories: categories
                .into_iter()
                .map(|(c, kws)| (c, clean_keywords(kws)))
                .collect(),
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: KeywordsFile = toml::from_str(s).context("parsing keyword tables toml")?;
        Self::new(
            file.topic,
            file.categories
                .into_iter()
                .map(|c| (c.name, c.keywords))
                .collect(),
        )
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading keyword tables from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// $AGGREGATOR_KEYWORDS_PATH, then config/keywords.toml, then embedded.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_KEYWORDS_PATH) {
            return Self::load_from(&PathBuf::from(p));
        }
        let local = PathBuf::from(DEFAULT_KEYWORDS_PATH);
        if local.exists() {
            return Self::load_from(&local);
        }
        Self::embedded()
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_KEYWORDS)
    }

    pub fn topic(&self) -> &[String] {
        &self.topic
    }

    pub fn categories(&self) -> &[(Category, Vec<String>)] {
        &self.categories
    }
}

// Lowercase, fold punctuation like the haystack, drop empties and repeats.
// Inner/outer spaces are kept: they mark word boundaries.
fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let k = fold_punctuation(&it.to_lowercase());
        if k.trim().is_empty() || out.contains(&k) {
            continue;
        }
        out.push(k);
    }
    out
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub topic_tagged: bool,
    /// 1..=10
    pub topic_score: u8,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    tables: Arc<KeywordTables>,
}

impl Classifier {
    pub fn new(tables: Arc<KeywordTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &KeywordTables {
        &self.tables
    }

    pub fn classify(
        &self,
        text: &str,
        default_category: Category,
        force_topic: bool,
    ) -> Classification {
        let haystack = haystack(text);

        let topic_hits = count_hits(&haystack, &self.tables.topic);
        let topic_score = topic_score(topic_hits);
        let topic_tagged = force_topic || topic_hits >= HIT_THRESHOLD;

        let mut best: Option<(Category, usize)> = None;
        for (cat, kws) in &self.tables.categories {
            let hits = count_hits(&haystack, kws);
            // strict `>` keeps the earlier category on ties
            if best.map_or(true, |(_, b)| hits > b) {
                best = Some((*cat, hits));
            }
        }
        let best_hits = best.map_or(0, |(_, h)| h);

        let category = if topic_hits >= HIT_THRESHOLD && topic_hits > best_hits {
            Category::Ai
        } else {
            match best {
                Some((cat, hits)) if hits >= HIT_THRESHOLD => cat,
                _ => default_category,
            }
        };

        Classification {
            category,
            topic_tagged,
            topic_score,
        }
    }
}

/// Lowercased, punctuation folded to spaces, padded with one space each side,
/// so `" ai "` matches "AI," and "AI:" as well as "AI ".
pub fn haystack(text: &str) -> String {
    format!(" {} ", fold_punctuation(&text.to_lowercase()))
}

// Everything but word chars, whitespace, `-` and `+` becomes a space. One
// char in, one char out: no collapsing, so keyword spacing is preserved.
fn fold_punctuation(s: &str) -> String {
    static RE_PUNCT: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_PUNCT.get_or_init(|| regex::Regex::new(r"[^\w\s+\-]").unwrap());
    re.replace_all(s, " ").into_owned()
}

/// Distinct keywords contained in `haystack` (see [`haystack`]).
pub fn count_hits(haystack: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .count()
}

/// `clamp(round(hits / 3 * 10), 1, 10)`
pub fn topic_score(hits: usize) -> u8 {
    let raw = (hits as f64 / 3.0 * 10.0).round();
    raw.clamp(1.0, 10.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Classifier {
        let tables = KeywordTables::new(
            vec!["openai".into(), "transformer".into(), "llm".into()],
            vec![
                (
                    Category::Science,
                    vec!["physics".into(), "quantum".into(), "study".into()],
                ),
                (
                    Category::Hardware,
                    vec!["chip".into(), "quantum".into(), "gpu".into()],
                ),
            ],
        )
        .unwrap();
        Classifier::new(Arc::new(tables))
    }

    #[test]
    fn score_curve() {
        assert_eq!(topic_score(0), 1);
        assert_eq!(topic_score(1), 3);
        assert_eq!(topic_score(2), 7);
        assert_eq!(topic_score(3), 10);
        assert_eq!(topic_score(40), 10);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        let c = small();
        let r = c.classify("openai openai OPENAI", Category::General, false);
        assert!(!r.topic_tagged);
        assert_eq!(r.topic_score, 3);
        assert_eq!(r.category, Category::General);
    }

    #[test]
    fn ties_keep_first_declared_category() {
        let c = small();
        // science: quantum + physics = 2, hardware: quantum + chip = 2
        let r = c.classify("quantum physics on a chip", Category::General, false);
        assert_eq!(r.category, Category::Science);
    }

    #[test]
    fn privileged_category_needs_strict_lead() {
        let c = small();
        let r = c.classify("OpenAI LLM on a quantum chip gpu", Category::General, false);
        // topic 2 hits, hardware 3 hits -> hardware wins
        assert_eq!(r.category, Category::Hardware);
        assert!(r.topic_tagged);

        let r = c.classify("OpenAI transformer llm quantum physics", Category::General, false);
        assert_eq!(r.category, Category::Ai);
        assert_eq!(r.topic_score, 10);
    }

    #[test]
    fn punctuation_counts_as_a_word_boundary() {
        let tables = KeywordTables::new(
            vec![" ai ".into(), " llm".into()],
            vec![(Category::Devops, vec!["ci/cd".into(), "c++".into()])],
        )
        .unwrap();
        let c = Classifier::new(Arc::new(tables));
        for text in [
            "Google's new AI, explained: an LLM for everyone",
            "AI: the LLM era",
            "Why AI. LLMs rule",
            "(AI) \"LLM\"",
        ] {
            let r = c.classify(text, Category::General, false);
            assert!(r.topic_tagged, "{text}");
            assert_eq!(r.category, Category::Ai, "{text}");
        }
        // words that merely contain the letters still miss
        assert_eq!(count_hits(&haystack("Thai said: maid"), c.tables().topic()), 0);
        // keywords carrying punctuation are folded the same way
        assert_eq!(
            count_hits(&haystack("Our CI/CD, in C++"), &c.tables().categories()[0].1),
            2
        );
    }

    #[test]
    fn ai_is_rejected_as_plain_category() {
        let err = KeywordTables::new(vec![], vec![(Category::Ai, vec!["x".into()])]);
        assert!(err.is_err());
    }

    #[test]
    fn embedded_tables_load_in_declared_order() {
        let t = KeywordTables::embedded().unwrap();
        assert!(t.topic().len() >= 40);
        assert_eq!(t.categories()[0].0, Category::Programming);
        assert!(t.categories().iter().all(|(c, _)| *c != Category::Ai));
    }
}
