//! Localization lookup.
//!
//! Catalogs are YAML documents, one per language, whose nested mappings are
//! flattened into dotted keys (`marathon.lesson.fallback`). Lookups walk the
//! language fallback chain and end at the bare key, so they never fail.

use crate::session::Language;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::{collections::HashMap, path::Path};
use tracing::{debug, warn};

pub trait Localizer: Send + Sync {
    /// Translates `key` into `lang`, substituting `{name}` placeholders.
    fn t(&self, key: &str, lang: Language, params: &[(&str, &str)]) -> String;
}

/// Languages tried after the requested one, in order.
fn fallback_chain(lang: Language) -> &'static [Language] {
    match lang {
        Language::Es => &[Language::Es, Language::En, Language::Ru],
        Language::En => &[Language::En, Language::Ru],
        Language::Ru => &[Language::Ru],
    }
}

/// An in-memory set of flattened translation tables.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<Language, HashMap<String, String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `<dir>/{ru,en,es}.yaml`. Missing files are skipped with a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();
        for lang in [Language::Ru, Language::En, Language::Es] {
            let path = dir.join(format!("{}.yaml", lang.code()));
            if !path.exists() {
                warn!(path = %path.display(), "Locale file not found, skipping");
                continue;
            }
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read locale file {}", path.display()))?;
            catalog
                .add_yaml(lang, &raw)
                .with_context(|| format!("Failed to parse locale file {}", path.display()))?;
        }
        Ok(catalog)
    }

    /// Merges a YAML document into the table for `lang`.
    pub fn add_yaml(&mut self, lang: Language, raw: &str) -> Result<()> {
        let doc: Value = serde_yaml::from_str(raw)?;
        let table = self.tables.entry(lang).or_default();
        flatten("", &doc, table);
        debug!(lang = lang.code(), keys = table.len(), "Locale loaded");
        Ok(())
    }

    pub fn insert(&mut self, lang: Language, key: &str, value: &str) {
        self.tables
            .entry(lang)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn lookup(&self, key: &str, lang: Language) -> Option<&str> {
        fallback_chain(lang).iter().find_map(|l| {
            self.tables
                .get(l)
                .and_then(|table| table.get(key))
                .map(String::as_str)
        })
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let Some(k) = yaml_key(k) else { continue };
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        _ => {}
    }
}

fn yaml_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Localizer for Catalog {
    fn t(&self, key: &str, lang: Language, params: &[(&str, &str)]) -> String {
        let Some(template) = self.lookup(key, lang) else {
            debug!(key, lang = lang.code(), "Missing translation");
            return key.to_string();
        };
        params
            .iter()
            .fold(template.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .add_yaml(
                Language::Ru,
                "greeting: \"Привет, {name}!\"\nmarathon:\n  day: \"День {day}\"\n  only_ru: \"только\"\n",
            )
            .unwrap();
        catalog
            .add_yaml(Language::En, "greeting: \"Hi, {name}!\"\nmarathon:\n  day: \"Day {day}\"\n")
            .unwrap();
        catalog.add_yaml(Language::Es, "greeting: \"Hola, {name}!\"\n").unwrap();
        catalog
    }

    #[test]
    fn test_nested_keys_are_flattened() {
        let c = catalog();
        assert_eq!(c.t("marathon.day", Language::Ru, &[("day", "3")]), "День 3");
    }

    #[test]
    fn test_fallback_chain() {
        let c = catalog();
        assert_eq!(c.t("greeting", Language::Es, &[("name", "Ana")]), "Hola, Ana!");
        // es -> en
        assert_eq!(c.t("marathon.day", Language::Es, &[("day", "2")]), "Day 2");
        // es -> en -> ru
        assert_eq!(c.t("marathon.only_ru", Language::Es, &[]), "только");
        assert_eq!(c.t("marathon.only_ru", Language::En, &[]), "только");
    }

    #[test]
    fn test_missing_key_returns_key() {
        let c = catalog();
        assert_eq!(c.t("nope.missing", Language::En, &[]), "nope.missing");
    }

    #[test]
    fn test_unused_placeholder_is_left_alone() {
        let c = catalog();
        assert_eq!(c.t("greeting", Language::En, &[]), "Hi, {name}!");
    }
}
