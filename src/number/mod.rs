//! Numbering engine.
//!
//! One deterministic preorder pass over the document tree assigns display
//! numbers to headings, theorem-like environments, display equations,
//! tables, figures and listings. Counter behavior comes from the
//! configuration table: per-chapter counters reset whenever a numbered
//! chapter begins, global counters never reset. Environments share a
//! counter when their configured display label matches, so `theorem` and
//! a localized alias labeled "Theorem" number as one sequence.

use std::collections::HashMap;

use crate::config::{Config, NumberingScheme};
use crate::ir::{DocumentTree, NodeKind, SectionLevel};

/// Assign numbers in place.
pub fn number(tree: &mut DocumentTree, config: &Config) {
    let mut state = Counters::default();
    let ids: Vec<_> = tree.walk(tree.root()).collect();
    for id in ids {
        let assigned = match &tree.node(id).kind {
            NodeKind::Heading { level, starred, .. } => {
                if *starred {
                    None
                } else {
                    Some(state.heading(*level))
                }
            }
            NodeKind::Environment { name, .. } => state.environment(name, config),
            NodeKind::MathBlock {
                display: true,
                numbered: true,
                ..
            } => Some(state.scoped(&mut |s| {
                s.equation += 1;
                s.equation
            })),
            NodeKind::Figure { .. } => Some(state.scoped(&mut |s| {
                s.figure += 1;
                s.figure
            })),
            NodeKind::Table { .. } => {
                // Only captioned or labeled tables are floats worth a
                // number; bare tabular layout stays anonymous.
                let is_float = !tree.node(id).labels.is_empty()
                    || tree
                        .children(id)
                        .iter()
                        .any(|&c| matches!(tree.node(c).kind, NodeKind::Caption));
                is_float.then(|| {
                    state.scoped(&mut |s| {
                        s.table += 1;
                        s.table
                    })
                })
            }
            NodeKind::CodeBlock { .. } => Some(state.scoped(&mut |s| {
                s.listing += 1;
                s.listing
            })),
            _ => None,
        };
        if let Some(number) = assigned {
            tree.node_mut(id).number = Some(number);
        }
    }
}

#[derive(Default)]
struct Counters {
    part: u32,
    chapter: u32,
    section: u32,
    subsection: u32,
    equation: u32,
    table: u32,
    figure: u32,
    listing: u32,
    /// Display label → (count, scheme).
    environments: HashMap<String, (u32, NumberingScheme)>,
}

impl Counters {
    fn heading(&mut self, level: SectionLevel) -> String {
        match level {
            SectionLevel::Part => {
                self.part += 1;
                roman(self.part)
            }
            SectionLevel::Chapter => {
                self.chapter += 1;
                self.section = 0;
                self.subsection = 0;
                self.reset_per_chapter();
                self.chapter.to_string()
            }
            SectionLevel::Section => {
                self.section += 1;
                self.subsection = 0;
                join(&[self.chapter, self.section])
            }
            SectionLevel::Subsection => {
                self.subsection += 1;
                join(&[self.chapter, self.section, self.subsection])
            }
        }
    }

    fn environment(&mut self, name: &str, config: &Config) -> Option<String> {
        let spec = config.env_spec(name)?;
        if spec.numbering == NumberingScheme::Unnumbered {
            return None;
        }
        let entry = self
            .environments
            .entry(spec.label.clone())
            .or_insert((0, spec.numbering));
        entry.0 += 1;
        let count = entry.0;
        Some(match spec.numbering {
            NumberingScheme::Global => count.to_string(),
            _ => join(&[self.chapter, count]),
        })
    }

    /// Bump a per-chapter counter and format it in chapter scope.
    fn scoped(&mut self, bump: &mut dyn FnMut(&mut Self) -> u32) -> String {
        let count = bump(self);
        join(&[self.chapter, count])
    }

    fn reset_per_chapter(&mut self) {
        self.equation = 0;
        self.table = 0;
        self.figure = 0;
        self.listing = 0;
        for (count, scheme) in self.environments.values_mut() {
            if *scheme == NumberingScheme::PerChapter {
                *count = 0;
            }
        }
    }
}

/// Dotted join, skipping zero components. In an article there is no
/// chapter counter, so sections number as "1", not "0.1".
fn join(parts: &[u32]) -> String {
    let parts: Vec<String> = parts
        .iter()
        .filter(|&&p| p > 0)
        .map(u32::to_string)
        .collect();
    if parts.is_empty() {
        "0".to_string()
    } else {
        parts.join(".")
    }
}

/// Uppercase Roman numerals for part numbers.
fn roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, digits) in TABLE {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}
