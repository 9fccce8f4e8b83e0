//! # Source Registry
//!
//! Static descriptors for every content origin the aggregator polls.
//!
//! - Loaded once at startup from TOML (or JSON) and never mutated afterwards.
//! - Declaration order is preserved: dedup "first occurrence wins" is defined
//!   relative to it, so the registry is a `Vec`, never a map.
//! - Validation happens at load time: unknown kinds, empty or duplicate ids and
//!   non-http(s) endpoints are rejected before any fetch runs.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "AGGREGATOR_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

const EMBEDDED_SOURCES: &str = include_str!("../config/sources.toml");

/// Topic categories an item can be filed under. `Ai` is the privileged topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Ai,
    Programming,
    Web,
    Mobile,
    Security,
    Cloud,
    Devops,
    Data,
    Science,
    Hardware,
    Gaming,
    Design,
    Startups,
    Business,
    Crypto,
    OpenSource,
    Space,
    Health,
    Climate,
    Policy,
    General,
}

impl Category {
    pub const ALL: [Category; 21] = [
        Category::Ai,
        Category::Programming,
        Category::Web,
        Category::Mobile,
        Category::Security,
        Category::Cloud,
        Category::Devops,
        Category::Data,
        Category::Science,
        Category::Hardware,
        Category::Gaming,
        Category::Design,
        Category::Startups,
        Category::Business,
        Category::Crypto,
        Category::OpenSource,
        Category::Space,
        Category::Health,
        Category::Climate,
        Category::Policy,
        Category::General,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Category::Ai => "ai",
            Category::Programming => "programming",
            Category::Web => "web",
            Category::Mobile => "mobile",
            Category::Security => "security",
            Category::Cloud => "cloud",
            Category::Devops => "devops",
            Category::Data => "data",
            Category::Science => "science",
            Category::Hardware => "hardware",
            Category::Gaming => "gaming",
            Category::Design => "design",
            Category::Startups => "startups",
            Category::Business => "business",
            Category::Crypto => "crypto",
            Category::OpenSource => "open-source",
            Category::Space => "space",
            Category::Health => "health",
            Category::Climate => "climate",
            Category::Policy => "policy",
            Category::General => "general",
        }
    }

    /// Case-insensitive lookup by slug (`"open-source"`, `"AI"`, ...).
    pub fn from_slug(s: &str) -> Option<Category> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.slug().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Protocol tag carried on every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireKind {
    Feed,
    ForumSearch,
    LinkAggregator,
}

impl WireKind {
    /// Prefix for ids built from a source's native record id.
    pub fn id_prefix(self) -> &'static str {
        match self {
            WireKind::Feed => "feed",
            WireKind::ForumSearch => "forum",
            WireKind::LinkAggregator => "links",
        }
    }
}

/// Wire protocol of a source, with whatever its parser needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceKind {
    Feed,
    ForumSearch,
    LinkAggregator {
        /// Domain whose links count as self-posts. Defaults to the endpoint host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        home_domain: Option<String>,
    },
}

impl SourceKind {
    pub fn wire(&self) -> WireKind {
        match self {
            SourceKind::Feed => WireKind::Feed,
            SourceKind::ForumSearch => WireKind::ForumSearch,
            SourceKind::LinkAggregator { .. } => WireKind::LinkAggregator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub kind: SourceKind,
    pub category: Category,
    /// Every item from this source is topic-tagged regardless of score.
    #[serde(default)]
    pub always_topic: bool,
}

impl SourceDescriptor {
    /// Host that link-aggregator self-posts point back into.
    pub fn home_domain(&self) -> Option<String> {
        if let SourceKind::LinkAggregator {
            home_domain: Some(d),
        } = &self.kind
        {
            return Some(d.trim().to_ascii_lowercase());
        }
        let host = url::Url::parse(&self.endpoint).ok()?.host_str()?.to_ascii_lowercase();
        let bare = host
            .strip_prefix("www.")
            .or_else(|| host.strip_prefix("old."))
            .unwrap_or(&host);
        Some(bare.to_string())
    }
}

/// Ordered, validated set of source descriptors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sources: Vec<SourceDescriptor>,
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "source")]
    sources: Vec<SourceDescriptor>,
}

impl Registry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        validate(&sources)?;
        Ok(Self { sources })
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(s).context("parsing source registry toml")?;
        Self::new(file.sources)
    }

    /// JSON form: either `{"source": [...]}` or a bare array.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let sources = match serde_json::from_str::<Vec<SourceDescriptor>>(s) {
            Ok(v) => v,
            Err(_) => {
                serde_json::from_str::<RegistryFile>(s)
                    .context("parsing source registry json")?
                    .sources
            }
        };
        Self::new(sources)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading source registry from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Resolution order:
    /// 1) $AGGREGATOR_SOURCES_PATH (must exist)
    /// 2) config/sources.toml
    /// 3) embedded table
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let local = PathBuf::from(DEFAULT_SOURCES_PATH);
        if local.exists() {
            return Self::load_from(&local);
        }
        Self::embedded()
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_SOURCES)
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Sources whose default category is `category`, registry order kept.
    pub fn by_category(&self, category: Category) -> Vec<SourceDescriptor> {
        self.sources
            .iter()
            .filter(|s| s.category == category)
            .cloned()
            .collect()
    }
}

fn validate(sources: &[SourceDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for s in sources {
        if s.id.trim().is_empty() {
            bail!("source with endpoint `{}` has an empty id", s.endpoint);
        }
        if !seen.insert(s.id.as_str()) {
            bail!("duplicate source id `{}`", s.id);
        }
        let url = url::Url::parse(&s.endpoint)
            .with_context(|| format!("source `{}` has an invalid endpoint", s.id))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("source `{}` endpoint must be http(s), got `{}`", s.id, url.scheme());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
[[source]]
id = "b-feed"
name = "B Feed"
endpoint = "https://b.example/rss"
kind = "feed"
category = "science"

[[source]]
id = "a-links"
name = "A Links"
endpoint = "https://www.reddit.com/r/rust/hot.json"
kind = "link-aggregator"
category = "programming"
always_topic = true
"#;

    #[test]
    fn keeps_declaration_order() {
        let r = Registry::from_toml_str(SMALL).unwrap();
        let ids: Vec<_> = r.sources().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b-feed", "a-links"]);
        assert!(r.sources()[1].always_topic);
        assert!(!r.sources()[0].always_topic);
    }

    #[test]
    fn unknown_kind_fails_at_load() {
        let bad = r#"
[[source]]
id = "x"
name = "X"
endpoint = "https://x.example"
kind = "carrier-pigeon"
category = "general"
"#;
        assert!(Registry::from_toml_str(bad).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dup = format!("{SMALL}{SMALL}");
        let err = Registry::from_toml_str(&dup).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn home_domain_strips_www_and_honours_override() {
        let r = Registry::from_toml_str(SMALL).unwrap();
        assert_eq!(r.sources()[1].home_domain().as_deref(), Some("reddit.com"));

        let d = SourceDescriptor {
            kind: SourceKind::LinkAggregator {
                home_domain: Some("Lobste.rs".into()),
            },
            ..r.sources()[1].clone()
        };
        assert_eq!(d.home_domain().as_deref(), Some("lobste.rs"));
    }

    #[test]
    fn category_slug_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::from_slug(c.slug()), Some(c));
        }
        assert_eq!(Category::from_slug("OPEN-SOURCE"), Some(Category::OpenSource));
        assert_eq!(Category::from_slug("nope"), None);
    }

    #[test]
    fn embedded_registry_loads() {
        let r = Registry::embedded().unwrap();
        assert!(r.len() >= 80);
        assert!(r
            .sources()
            .iter()
            .any(|s| s.kind.wire() == WireKind::ForumSearch));
        assert!(r
            .sources()
            .iter()
            .any(|s| s.kind.wire() == WireKind::LinkAggregator));
    }
}
