//! Multi-file project loading.
//!
//! Starting from a root `.tex` file, the loader inlines every `\input`,
//! `\include`, `\import` and `\subimport` into one flattened stream,
//! recording per-line origins so later diagnostics cite the real file and
//! line. It then splits the stream at `\begin{document}` and scans the
//! preamble for metadata the rest of the pipeline needs: document class,
//! title block, bibliography resources, graphics paths, and environment /
//! math-macro definitions that seed the configuration table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{EnvSpec, NumberingScheme};
use crate::diag::{DiagKind, Diagnostics};
use crate::error::{Error, Result};
use crate::ir::BookMeta;
use crate::origin::OriginMap;

/// Include nesting bound. Deeper chains are almost certainly a cycle the
/// path canonicalizer failed to detect (symlinks, case-folding).
pub const MAX_INCLUDE_DEPTH: usize = 20;

/// A fully flattened project, split into preamble and body.
#[derive(Debug)]
pub struct LoadedProject {
    pub preamble: Preamble,
    /// Content between `\begin{document}` and `\end{document}`.
    pub body: String,
    /// Origin map for `body` (offset 0 = first body byte).
    pub origins: OriginMap,
    /// Directory of the root file; relative resource paths resolve here.
    pub root_dir: PathBuf,
}

/// Everything extracted from the preamble.
#[derive(Debug, Default)]
pub struct Preamble {
    pub meta: BookMeta,
    /// Environments defined via `\newtheorem` / `\newtcolorbox`.
    pub environments: BTreeMap<String, EnvSpec>,
    /// Zero-argument math macro definitions.
    pub math_macros: BTreeMap<String, String>,
    /// Bibliography databases from `\addbibresource` / `\bibliography`.
    pub bib_files: Vec<PathBuf>,
    /// Search directories from `\graphicspath`.
    pub graphics_paths: Vec<PathBuf>,
}

/// Load and flatten a project rooted at `root`.
pub fn load(root: &Path, diags: &mut Diagnostics) -> Result<LoadedProject> {
    if !root.is_file() {
        return Err(Error::RootNotFound(root.display().to_string()));
    }
    let root_dir = root
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut flattener = Flattener {
        root_dir: root_dir.clone(),
        out: String::new(),
        origins: OriginMap::new(),
        open: Vec::new(),
        diags,
    };
    flattener.include_file(root)?;
    let Flattener { out, origins, .. } = flattener;

    let (preamble_text, body, body_start) = split_document(&out);
    let origins = origins.slice(body_start, body_start + body.len());

    tracing::debug!(
        bytes = out.len(),
        body_bytes = body.len(),
        "flattened project"
    );

    Ok(LoadedProject {
        preamble: scan_preamble(preamble_text, &root_dir),
        body: body.to_string(),
        origins,
        root_dir,
    })
}

/// Split the flattened stream around `\begin{document}`. A stream with no
/// document markers is treated as all body (useful for fragments in tests).
fn split_document(text: &str) -> (&str, &str, usize) {
    const BEGIN: &str = "\\begin{document}";
    const END: &str = "\\end{document}";
    match text.find(BEGIN) {
        Some(idx) => {
            let body_start = idx + BEGIN.len();
            let body_end = text[body_start..]
                .find(END)
                .map(|e| body_start + e)
                .unwrap_or(text.len());
            (&text[..idx], &text[body_start..body_end], body_start)
        }
        None => ("", text, 0),
    }
}

enum IncludeCmd {
    /// `\input{file}`
    Input,
    /// `\include{file}`: forces a page break around the content.
    Include,
    /// `\import{dir}{file}` / `\subimport{dir}{file}`
    Import,
}

struct Flattener<'d> {
    root_dir: PathBuf,
    out: String,
    origins: OriginMap,
    /// Canonical paths of files currently being inlined, outermost first.
    open: Vec<PathBuf>,
    diags: &'d mut Diagnostics,
}

impl Flattener<'_> {
    fn include_file(&mut self, path: &Path) -> Result<()> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.open.contains(&canonical) {
            let mut cycle: Vec<String> = self
                .open
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            cycle.push(canonical.display().to_string());
            return Err(Error::CyclicInclude {
                cycle: cycle.join(" -> "),
            });
        }
        if self.open.len() >= MAX_INCLUDE_DEPTH {
            return Err(Error::IncludeTooDeep {
                max: MAX_INCLUDE_DEPTH,
                origin: self.origins.resolve(self.out.len()),
            });
        }

        let text = std::fs::read_to_string(path)?;
        let file_idx = self.origins.add_file(&path.display().to_string());
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        self.open.push(canonical);
        tracing::debug!(file = %path.display(), depth = self.open.len(), "inlining");
        for (i, line) in text.lines().enumerate() {
            self.push_origin(file_idx, (i + 1) as u32);
            self.emit_line(line, &dir, file_idx, (i + 1) as u32)?;
        }
        self.open.pop();
        Ok(())
    }

    fn push_origin(&mut self, file: u32, line: u32) {
        self.origins.push_line(self.out.len(), file, line);
    }

    /// Emit one line, recursing into any include commands it contains.
    fn emit_line(&mut self, line: &str, dir: &Path, file: u32, lineno: u32) -> Result<()> {
        let mut rest = line;
        while let Some((before, cmd, target, after)) = find_include(rest) {
            self.out.push_str(before);
            if matches!(cmd, IncludeCmd::Include) {
                self.out.push_str("\n\\clearpage\n");
            }
            match self.locate(&target, dir) {
                Some(path) => self.include_file(&path)?,
                None => {
                    let origin = self.origins.resolve(self.out.len().saturating_sub(1));
                    self.diags.warn(
                        DiagKind::MissingInclude,
                        origin,
                        format!("included file '{target}' not found"),
                    );
                }
            }
            if matches!(cmd, IncludeCmd::Include) {
                self.out.push_str("\n\\clearpage\n");
            }
            // Remap the tail of the line back to the including file.
            self.push_origin(file, lineno);
            rest = after;
        }
        self.out.push_str(rest);
        self.out.push('\n');
        Ok(())
    }

    /// Resolve an include target: current file's directory first, then the
    /// project root, trying the name as given and with `.tex` appended.
    fn locate(&self, target: &str, dir: &Path) -> Option<PathBuf> {
        let mut names = vec![target.to_string()];
        if Path::new(target).extension().is_none() {
            names.push(format!("{target}.tex"));
        }
        for base in [dir, self.root_dir.as_path()] {
            for name in &names {
                let candidate = base.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Find the first include command in the non-comment part of a line.
/// Returns (text before, command, target path, text after).
fn find_include(line: &str) -> Option<(&str, IncludeCmd, String, &str)> {
    let visible = strip_comment(line);
    let bytes = visible.as_bytes();
    let mut i = 0;
    while let Some(off) = memchr::memchr(b'\\', &bytes[i..]) {
        let start = i + off;
        let after = &visible[start + 1..];
        let name_len = after
            .bytes()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        let name = &after[..name_len];
        let cmd = match name {
            "input" => Some(IncludeCmd::Input),
            "include" => Some(IncludeCmd::Include),
            "import" | "subimport" => Some(IncludeCmd::Import),
            _ => None,
        };
        if let Some(cmd) = cmd {
            let mut cursor = start + 1 + name_len;
            if let Some((first, end)) = braced_group(visible, cursor) {
                cursor = end;
                let target = if matches!(cmd, IncludeCmd::Import) {
                    let (file, end) = braced_group(visible, cursor)?;
                    cursor = end;
                    format!("{}{}", first, file)
                } else {
                    first.to_string()
                };
                return Some((&line[..start], cmd, target, &line[cursor..]));
            }
        }
        i = start + 1;
    }
    None
}

/// Truncate a line at its first unescaped `%`.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut i = 0;
    while let Some(off) = memchr::memchr(b'%', &bytes[i..]) {
        let pos = i + off;
        if pos == 0 || bytes[pos - 1] != b'\\' {
            return &line[..pos];
        }
        i = pos + 1;
    }
    line
}

/// Read a `{...}`-balanced group starting at or after `from` (skipping
/// spaces). Returns the inner text and the offset just past the `}`.
fn braced_group(s: &str, from: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'{' {
        return None;
    }
    let start = i + 1;
    let mut depth = 1usize;
    let mut j = start;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[start..j], j + 1));
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Read a `[...]` group starting at or after `from`.
fn bracketed_group(s: &str, from: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'[' {
        return None;
    }
    let start = i + 1;
    let end = memchr::memchr(b']', &bytes[start..])? + start;
    Some((&s[start..end], end + 1))
}

/// Every occurrence of `\name` followed by a non-letter, yielding the
/// offset just past the command name.
fn command_sites(text: &str, name: &str) -> Vec<usize> {
    let pat = format!("\\{name}");
    let mut sites = Vec::new();
    for (idx, _) in text.match_indices(&pat) {
        let end = idx + pat.len();
        let next_is_letter = text[end..]
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic());
        if !next_is_letter {
            sites.push(end);
        }
    }
    sites
}

fn first_group_of(text: &str, command: &str) -> Option<String> {
    let at = command_sites(text, command).into_iter().next()?;
    // Skip an optional [...] between the command and its argument.
    let at = bracketed_group(text, at).map(|(_, end)| end).unwrap_or(at);
    braced_group(text, at).map(|(inner, _)| inner.trim().to_string())
}

/// Scan the preamble for metadata, environment definitions, bibliography
/// resources and math macros.
pub fn scan_preamble(preamble: &str, root_dir: &Path) -> Preamble {
    let mut out = Preamble::default();

    out.meta.docclass = first_group_of(preamble, "documentclass").unwrap_or_default();
    out.meta.title = first_group_of(preamble, "title").unwrap_or_default();
    out.meta.author = first_group_of(preamble, "author").unwrap_or_default();
    out.meta.date = first_group_of(preamble, "date").unwrap_or_default();

    for at in command_sites(preamble, "addbibresource") {
        if let Some((name, _)) = braced_group(preamble, at) {
            out.bib_files.push(root_dir.join(name.trim()));
        }
    }
    for at in command_sites(preamble, "bibliography") {
        if let Some((names, _)) = braced_group(preamble, at) {
            for name in names.split(',') {
                let name = name.trim();
                let file = if name.ends_with(".bib") {
                    name.to_string()
                } else {
                    format!("{name}.bib")
                };
                out.bib_files.push(root_dir.join(file));
            }
        }
    }
    for at in command_sites(preamble, "graphicspath") {
        if let Some((inner, _)) = braced_group(preamble, at) {
            // The argument is itself a list of braced directories.
            let mut pos = 0;
            while let Some((dir, end)) = braced_group(inner, pos) {
                out.graphics_paths.push(root_dir.join(dir.trim()));
                pos = end;
            }
        }
    }

    scan_theorem_definitions(preamble, &mut out.environments);
    scan_math_macros(preamble, &mut out.math_macros);
    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn scan_theorem_definitions(preamble: &str, envs: &mut BTreeMap<String, EnvSpec>) {
    for at in command_sites(preamble, "newtheorem") {
        let bytes = preamble.as_bytes();
        let mut cursor = at;
        let starred = bytes.get(cursor) == Some(&b'*');
        if starred {
            cursor += 1;
        }
        let Some((name, end)) = braced_group(preamble, cursor) else {
            continue;
        };
        cursor = end;
        // Optional shared-counter argument: \newtheorem{lem}[thm]{Lemma}.
        if let Some((_, end)) = bracketed_group(preamble, cursor) {
            cursor = end;
        }
        let Some((label, end)) = braced_group(preamble, cursor) else {
            continue;
        };
        cursor = end;
        // Trailing reset scope: \newtheorem{thm}{Theorem}[chapter].
        let reset = bracketed_group(preamble, cursor).map(|(s, _)| s.trim().to_string());
        let numbering = if starred {
            NumberingScheme::Unnumbered
        } else if reset.as_deref() == Some("chapter") || reset.as_deref() == Some("section") {
            NumberingScheme::PerChapter
        } else {
            NumberingScheme::Global
        };
        envs.insert(
            name.trim().to_string(),
            EnvSpec {
                css_class: "env-theorem".into(),
                label: label.trim().to_string(),
                numbering,
            },
        );
    }
    for at in command_sites(preamble, "newtcolorbox") {
        let mut cursor = at;
        // Skip a leading key=value option group.
        if let Some((_, end)) = bracketed_group(preamble, cursor) {
            cursor = end;
        }
        let Some((name, _)) = braced_group(preamble, cursor) else {
            continue;
        };
        let name = name.trim();
        envs.entry(name.to_string()).or_insert(EnvSpec {
            css_class: "box-note".into(),
            label: capitalize(name),
            numbering: NumberingScheme::Unnumbered,
        });
    }
}

fn scan_math_macros(preamble: &str, macros: &mut BTreeMap<String, String>) {
    for command in ["newcommand", "renewcommand"] {
        for at in command_sites(preamble, command) {
            let bytes = preamble.as_bytes();
            let mut cursor = at;
            if bytes.get(cursor) == Some(&b'*') {
                cursor += 1;
            }
            let Some((name, end)) = braced_group(preamble, cursor) else {
                continue;
            };
            let name = name.trim();
            if !name.starts_with('\\') {
                continue;
            }
            cursor = end;
            // Macros with arguments are out of scope for the typesetter
            // substitution table.
            if bracketed_group(preamble, cursor).is_some() {
                continue;
            }
            if let Some((body, _)) = braced_group(preamble, cursor) {
                macros.insert(name.to_string(), body.trim().to_string());
            }
        }
    }
    for at in command_sites(preamble, "DeclareMathOperator") {
        let bytes = preamble.as_bytes();
        let mut cursor = at;
        if bytes.get(cursor) == Some(&b'*') {
            cursor += 1;
        }
        let Some((name, end)) = braced_group(preamble, cursor) else {
            continue;
        };
        if let Some((body, _)) = braced_group(preamble, end) {
            macros.insert(
                name.trim().to_string(),
                format!("\\operatorname{{{}}}", body.trim()),
            );
        }
    }
}
