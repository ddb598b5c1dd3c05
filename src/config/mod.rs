//! Conversion configuration.
//!
//! A [`Config`] is assembled once before the pipeline runs and never
//! mutated during conversion. It is layered: compiled-in defaults, then
//! environments and math macros auto-detected from the project preamble,
//! then user overrides from a JSON config file. Environment behavior
//! (styling, numbering, reset scope) is dispatched through this table so
//! new environments are data, not code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ir::EnvKind;

/// How a numbered kind's counter increments and resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberingScheme {
    /// Counter resets whenever a new chapter is entered; numbers render as
    /// `<chapter>.<counter>`.
    #[default]
    PerChapter,
    /// Counter never resets; numbers render as the bare counter.
    Global,
    /// Not numbered at all.
    Unnumbered,
}

/// Behavior descriptor for one environment name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// CSS class the renderer puts on the block.
    #[serde(default = "default_css_class", alias = "css")]
    pub css_class: String,
    /// Human-visible label ("Theorem", "Definition").
    pub label: String,
    #[serde(default)]
    pub numbering: NumberingScheme,
}

fn default_css_class() -> String {
    "env-theorem".to_string()
}

impl EnvSpec {
    fn theorem(label: &str) -> Self {
        EnvSpec {
            css_class: "env-theorem".into(),
            label: label.into(),
            numbering: NumberingScheme::PerChapter,
        }
    }

    fn example(label: &str) -> Self {
        EnvSpec {
            css_class: "env-example".into(),
            label: label.into(),
            numbering: NumberingScheme::PerChapter,
        }
    }

    fn boxed(css: &str, label: &str) -> Self {
        EnvSpec {
            css_class: css.into(),
            label: label.into(),
            numbering: NumberingScheme::Unnumbered,
        }
    }
}

/// A navigation tab in the rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabSpec {
    pub id: String,
    pub label: String,
}

/// Immutable conversion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub title: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub date: Option<String>,
    pub language: String,
    /// Ordered navigation tabs.
    pub tabs: Vec<TabSpec>,
    /// Environment name → behavior descriptor. Ordered so the serialized
    /// configuration snapshot is reproducible.
    pub environments: BTreeMap<String, EnvSpec>,
    /// Math macro substitutions handed to the math typesetter
    /// (`"\\Q"` → `"\\mathbb{Q}"`). Ordered for deterministic output.
    pub math_macros: BTreeMap<String, String>,
    pub proof_label: String,
    /// Fallback text for references the renderer cannot link.
    pub cross_ref_text: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: None,
            author: None,
            version: None,
            date: None,
            language: "en".into(),
            tabs: vec![
                TabSpec {
                    id: "toc".into(),
                    label: "Contents".into(),
                },
                TabSpec {
                    id: "book".into(),
                    label: "Book".into(),
                },
                TabSpec {
                    id: "ref".into(),
                    label: "References".into(),
                },
            ],
            environments: default_environments(),
            math_macros: BTreeMap::new(),
            proof_label: "Proof".into(),
            cross_ref_text: "(see related section)".into(),
        }
    }
}

/// Built-in environment table for common theorem-like names.
fn default_environments() -> BTreeMap<String, EnvSpec> {
    let mut envs = BTreeMap::new();
    for name in [
        "theorem",
        "lemma",
        "proposition",
        "corollary",
        "definition",
        "conjecture",
    ] {
        let mut label: Vec<char> = name.chars().collect();
        label[0] = label[0].to_ascii_uppercase();
        envs.insert(
            name.to_string(),
            EnvSpec::theorem(&label.into_iter().collect::<String>()),
        );
    }
    envs.insert("example".into(), EnvSpec::example("Example"));
    envs.insert("exercise".into(), EnvSpec::example("Exercise"));
    envs.insert("remark".into(), EnvSpec::boxed("box-yellow", "Remark"));
    envs.insert("note".into(), EnvSpec::boxed("box-yellow", "Note"));
    envs
}

impl Config {
    /// Load user configuration from a JSON file, layered over defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        // serde(default) fills unspecified fields; environments given in
        // the file replace same-named defaults but keep the rest.
        #[derive(Deserialize)]
        struct Partial {
            #[serde(flatten)]
            config: Config,
        }
        let partial: Partial = serde_json::from_str(text)?;
        let mut config = Config::default();
        let user = partial.config;
        config.title = user.title.or(config.title);
        config.author = user.author.or(config.author);
        config.version = user.version.or(config.version);
        config.date = user.date.or(config.date);
        if !user.language.is_empty() {
            config.language = user.language;
        }
        if !user.tabs.is_empty() {
            config.tabs = user.tabs;
        }
        config.environments.extend(user.environments);
        config.math_macros.extend(user.math_macros);
        if user.proof_label != Config::default().proof_label {
            config.proof_label = user.proof_label;
        }
        if user.cross_ref_text != Config::default().cross_ref_text {
            config.cross_ref_text = user.cross_ref_text;
        }
        Ok(config)
    }

    /// Layer environments and math macros detected from the project
    /// preamble beneath any explicit entries already present.
    pub fn absorb_detected(
        &mut self,
        environments: BTreeMap<String, EnvSpec>,
        math_macros: BTreeMap<String, String>,
    ) {
        for (name, spec) in environments {
            self.environments.entry(name).or_insert(spec);
        }
        for (name, body) in math_macros {
            self.math_macros.entry(name).or_insert(body);
        }
    }

    pub fn env_spec(&self, name: &str) -> Option<&EnvSpec> {
        self.environments.get(name)
    }

    /// Behavioral class for an environment name; unknown names fall back
    /// to a generic block.
    pub fn env_kind(&self, name: &str) -> EnvKind {
        match name {
            "proof" => EnvKind::Proof,
            "itemize" => EnvKind::List(false),
            "enumerate" => EnvKind::List(true),
            _ => match self.env_spec(name) {
                Some(spec) if spec.numbering != NumberingScheme::Unnumbered => {
                    EnvKind::TheoremLike
                }
                Some(_) => EnvKind::Box,
                None => EnvKind::Unknown,
            },
        }
    }

    /// Numbering scheme for an environment name.
    pub fn env_numbering(&self, name: &str) -> NumberingScheme {
        self.env_spec(name)
            .map(|s| s.numbering)
            .unwrap_or(NumberingScheme::Unnumbered)
    }
}
