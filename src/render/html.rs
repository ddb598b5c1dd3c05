//! HTML emission.
//!
//! Produces one self-contained page: a tab bar driven by the configured
//! tab list, a table of contents built from the heading hierarchy, the
//! document body, and a references list from the citation registry. Math
//! is left as delimited LaTeX for KaTeX's auto-render pass, with the
//! configured macro table injected into its options.

use std::fmt::Write;

use crate::config::{Config, NumberingScheme};
use crate::ir::{
    DocumentIr, DocumentTree, EnvKind, InlineKind, NodeId, NodeKind, RefKind, SectionLevel,
};

const KATEX_VERSION: &str = "0.16.11";

/// Render the finished IR as a complete HTML document.
pub fn render_document(ir: &DocumentIr, config: &Config) -> String {
    let mut out = String::with_capacity(64 * 1024);
    let title = if ir.meta.title.is_empty() {
        "Untitled".to_string()
    } else {
        ir.meta.title.clone()
    };

    out.push_str("<!DOCTYPE html>\n");
    let _ = write!(out, "<html lang=\"{}\">\n<head>\n", escape(&config.language));
    out.push_str("<meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = write!(out, "<title>{}</title>\n", escape(&title));
    katex_head(&mut out, config);
    out.push_str(STYLE);
    out.push_str("</head>\n<body>\n");

    header(&mut out, ir, config, &title);
    tab_bar(&mut out, config);

    out.push_str("<main>\n");
    for tab in &config.tabs {
        let _ = write!(
            out,
            "<section class=\"tab-panel\" id=\"tab-{}\">\n",
            escape(&tab.id)
        );
        match tab.id.as_str() {
            "toc" => toc(&mut out, &ir.tree),
            "book" => {
                let mut renderer = Renderer {
                    out: &mut out,
                    tree: &ir.tree,
                    config,
                };
                renderer.children(ir.tree.root());
            }
            "ref" => references(&mut out, ir),
            _ => {}
        }
        out.push_str("</section>\n");
    }
    out.push_str("</main>\n");
    out.push_str(TAB_SCRIPT);
    out.push_str("</body>\n</html>\n");
    out
}

fn header(out: &mut String, ir: &DocumentIr, config: &Config, title: &str) {
    out.push_str("<header>\n");
    let _ = write!(out, "<h1>{}</h1>\n", escape(title));
    let mut byline = Vec::new();
    if !ir.meta.author.is_empty() {
        byline.push(escape(&ir.meta.author));
    }
    if let Some(version) = &config.version {
        byline.push(escape(version));
    }
    if !ir.meta.date.is_empty() {
        byline.push(escape(&ir.meta.date));
    }
    if !byline.is_empty() {
        let _ = write!(out, "<p class=\"byline\">{}</p>\n", byline.join(" · "));
    }
    out.push_str("</header>\n");
}

fn tab_bar(out: &mut String, config: &Config) {
    out.push_str("<nav class=\"tabs\">\n");
    for (i, tab) in config.tabs.iter().enumerate() {
        let _ = write!(
            out,
            "<button class=\"tab{}\" data-tab=\"tab-{}\">{}</button>\n",
            if i == 0 { " active" } else { "" },
            escape(&tab.id),
            escape(&tab.label)
        );
    }
    out.push_str("</nav>\n");
}

fn katex_head(out: &mut String, config: &Config) {
    let _ = write!(
        out,
        "<link rel=\"stylesheet\" href=\"https://cdn.jsdelivr.net/npm/katex@{v}/dist/katex.min.css\">\n\
         <script defer src=\"https://cdn.jsdelivr.net/npm/katex@{v}/dist/katex.min.js\"></script>\n\
         <script defer src=\"https://cdn.jsdelivr.net/npm/katex@{v}/dist/contrib/auto-render.min.js\"></script>\n",
        v = KATEX_VERSION
    );
    let macros = serde_json::to_string(&config.math_macros).unwrap_or_else(|_| "{}".into());
    let _ = write!(
        out,
        "<script>document.addEventListener(\"DOMContentLoaded\", function() {{\n\
         renderMathInElement(document.body, {{\n\
           delimiters: [\n\
             {{left: \"\\\\[\", right: \"\\\\]\", display: true}},\n\
             {{left: \"\\\\(\", right: \"\\\\)\", display: false}}\n\
           ],\n\
           macros: {macros},\n\
           throwOnError: false\n\
         }});\n}});</script>\n"
    );
}

/// Anchor id for a node: its first label key, else a stable synthetic id.
pub fn anchor_for(tree: &DocumentTree, id: NodeId) -> String {
    match tree.node(id).labels.first() {
        Some(decl) => sanitize(&decl.key),
        None => format!("node-{}", id.0),
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn toc(out: &mut String, tree: &DocumentTree) {
    let headings: Vec<NodeId> = tree
        .walk(tree.root())
        .filter(|&id| matches!(tree.node(id).kind, NodeKind::Heading { .. }))
        .collect();
    if headings.is_empty() {
        out.push_str("<p class=\"empty\">No sections.</p>\n");
        return;
    }
    let mut depth = 0usize;
    for id in headings {
        let node = tree.node(id);
        let NodeKind::Heading { level, title, .. } = &node.kind else {
            continue;
        };
        let want = *level as usize + 1;
        while depth < want {
            out.push_str("<ul class=\"toc\">\n");
            depth += 1;
        }
        while depth > want {
            out.push_str("</ul>\n");
            depth -= 1;
        }
        let number = node
            .number
            .as_deref()
            .map(|n| format!("<span class=\"toc-num\">{}</span> ", escape(n)))
            .unwrap_or_default();
        let _ = write!(
            out,
            "<li><a href=\"#{}\">{}{}</a></li>\n",
            anchor_for(tree, id),
            number,
            escape(title)
        );
    }
    while depth > 0 {
        out.push_str("</ul>\n");
        depth -= 1;
    }
}

fn references(out: &mut String, ir: &DocumentIr) {
    if ir.citations.is_empty() {
        out.push_str("<p class=\"empty\">No references.</p>\n");
        return;
    }
    out.push_str("<ol class=\"references\">\n");
    for entry in ir.citations.iter() {
        let _ = write!(out, "<li id=\"cite-{}\">", sanitize(&entry.key));
        let mut parts = Vec::new();
        if let Some(author) = entry.author() {
            parts.push(escape(author));
        }
        if let Some(title) = entry.title() {
            parts.push(format!("<em>{}</em>", escape(title)));
        }
        if let Some(venue) = entry.venue() {
            parts.push(escape(venue));
        }
        if let Some(year) = entry.year() {
            parts.push(escape(year));
        }
        if parts.is_empty() {
            parts.push(escape(&entry.key));
        }
        out.push_str(&parts.join(". "));
        out.push_str(".</li>\n");
    }
    out.push_str("</ol>\n");
}

struct Renderer<'a> {
    out: &'a mut String,
    tree: &'a DocumentTree,
    config: &'a Config,
}

impl Renderer<'_> {
    fn children(&mut self, id: NodeId) {
        for &child in self.tree.children(id) {
            self.node(child);
        }
    }

    fn node(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        let anchor = anchor_for(self.tree, id);
        match &node.kind {
            NodeKind::Root => self.children(id),
            NodeKind::Heading { level, title, .. } => {
                let tag = match level {
                    SectionLevel::Part => "h1",
                    SectionLevel::Chapter => "h2",
                    SectionLevel::Section => "h3",
                    SectionLevel::Subsection => "h4",
                };
                let number = node
                    .number
                    .as_deref()
                    .map(|n| format!("{} ", escape(n)))
                    .unwrap_or_default();
                let _ = write!(
                    self.out,
                    "<{tag} id=\"{anchor}\">{number}{}</{tag}>\n",
                    escape(title)
                );
                self.children(id);
            }
            NodeKind::Paragraph => {
                self.out.push_str("<p>");
                self.children(id);
                self.out.push_str("</p>\n");
            }
            NodeKind::Text(text) => self.out.push_str(&escape(text)),
            NodeKind::Inline(kind) => {
                let (open, close) = match kind {
                    InlineKind::Bold => ("<strong>", "</strong>"),
                    InlineKind::Emph => ("<em>", "</em>"),
                    InlineKind::Code => ("<code>", "</code>"),
                    InlineKind::Underline => ("<u>", "</u>"),
                    InlineKind::SmallCaps => {
                        ("<span class=\"smallcaps\">", "</span>")
                    }
                };
                self.out.push_str(open);
                self.children(id);
                self.out.push_str(close);
            }
            NodeKind::Environment { name, kind, title } => {
                self.environment(id, name, *kind, title.as_deref())
            }
            NodeKind::ListItem => {
                self.out.push_str("<li>");
                self.children(id);
                self.out.push_str("</li>\n");
            }
            NodeKind::MathBlock {
                display, source, ..
            } => {
                if *display {
                    let _ = write!(
                        self.out,
                        "<div class=\"math-display\" id=\"{anchor}\">",
                    );
                    if let Some(number) = &node.number {
                        let _ = write!(
                            self.out,
                            "<span class=\"eq-number\">({})</span>",
                            escape(number)
                        );
                    }
                    let _ = write!(self.out, "\\[{}\\]</div>\n", escape(source));
                } else {
                    let _ = write!(self.out, "\\({}\\)", escape(source));
                }
            }
            NodeKind::Table { .. } => {
                let _ = write!(self.out, "<table id=\"{anchor}\">\n");
                for &child in self.tree.children(id) {
                    if let NodeKind::Caption = self.tree.node(child).kind {
                        self.out.push_str("<caption>");
                        if let Some(number) = &node.number {
                            let _ = write!(self.out, "Table {}: ", escape(number));
                        }
                        self.children(child);
                        self.out.push_str("</caption>\n");
                    } else {
                        self.node(child);
                    }
                }
                self.out.push_str("</table>\n");
            }
            NodeKind::TableRow => {
                self.out.push_str("<tr>");
                self.children(id);
                self.out.push_str("</tr>\n");
            }
            NodeKind::TableCell => {
                self.out.push_str("<td>");
                self.children(id);
                self.out.push_str("</td>");
            }
            NodeKind::Figure { image } => {
                let _ = write!(self.out, "<figure id=\"{anchor}\">\n");
                match image {
                    Some(src) => {
                        let _ = write!(
                            self.out,
                            "<img src=\"{}\" alt=\"\">\n",
                            escape(src)
                        );
                    }
                    None => self
                        .out
                        .push_str("<div class=\"missing-image\">missing image</div>\n"),
                }
                for &child in self.tree.children(id) {
                    if let NodeKind::Caption = self.tree.node(child).kind {
                        self.out.push_str("<figcaption>");
                        if let Some(number) = &node.number {
                            let _ = write!(self.out, "Figure {}: ", escape(number));
                        }
                        self.children(child);
                        self.out.push_str("</figcaption>\n");
                    } else {
                        self.node(child);
                    }
                }
                self.out.push_str("</figure>\n");
            }
            NodeKind::Caption => {
                // Captions under figures and tables render with their host.
                self.out.push_str("<p class=\"caption\">");
                self.children(id);
                self.out.push_str("</p>\n");
            }
            NodeKind::CodeBlock { language, text, .. } => {
                let class = language
                    .as_deref()
                    .map(|l| format!(" class=\"language-{}\"", escape(l)))
                    .unwrap_or_default();
                let _ = write!(
                    self.out,
                    "<pre id=\"{anchor}\"><code{class}>{}</code></pre>\n",
                    escape(text)
                );
            }
            NodeKind::DiagramBlock {
                source,
                image,
                renderer_unavailable,
            } => match image {
                Some(src) => {
                    let _ = write!(
                        self.out,
                        "<figure class=\"diagram\"><img src=\"{}\" alt=\"diagram\"></figure>\n",
                        escape(src)
                    );
                }
                None => {
                    let note = if *renderer_unavailable {
                        "<p class=\"diagram-note\">diagram source (no renderer available)</p>"
                    } else {
                        ""
                    };
                    let _ = write!(
                        self.out,
                        "<div class=\"diagram-source\">{note}<pre><code>{}</code></pre></div>\n",
                        escape(source)
                    );
                }
            },
            NodeKind::ResolvedLink {
                key,
                display,
                target,
                kind,
            } => {
                let href = if *kind == RefKind::Cite {
                    format!("#cite-{}", sanitize(key))
                } else {
                    format!("#{}", anchor_for(self.tree, *target))
                };
                let _ = write!(
                    self.out,
                    "<a class=\"xref\" href=\"{href}\">{}</a>",
                    escape(display)
                );
            }
            NodeKind::UnresolvedPlaceholder { key, .. } => {
                let _ = write!(
                    self.out,
                    "<span class=\"unresolved\" title=\"undefined reference\">[{}?]</span>",
                    escape(key)
                );
            }
            // Left behind only if resolution was skipped.
            NodeKind::CrossRef { key, .. } => {
                let _ = write!(
                    self.out,
                    "<span class=\"unresolved\">[{}?]</span>",
                    escape(key)
                );
            }
        }
    }

    fn environment(&mut self, id: NodeId, name: &str, kind: EnvKind, title: Option<&str>) {
        let anchor = anchor_for(self.tree, id);
        match kind {
            EnvKind::List(ordered) => {
                let tag = if ordered { "ol" } else { "ul" };
                let _ = write!(self.out, "<{tag} id=\"{anchor}\">\n");
                self.children(id);
                let _ = write!(self.out, "</{tag}>\n");
            }
            EnvKind::Proof => {
                let _ = write!(self.out, "<div class=\"env-proof\" id=\"{anchor}\">\n");
                let label = title.unwrap_or(&self.config.proof_label);
                let _ = write!(
                    self.out,
                    "<p class=\"env-head\"><em>{}.</em></p>\n",
                    escape(label)
                );
                self.children(id);
                self.out
                    .push_str("<span class=\"qed\">\u{220e}</span>\n</div>\n");
            }
            _ => {
                let spec = self.config.env_spec(name);
                let css = spec.map(|s| s.css_class.as_str()).unwrap_or("env-plain");
                let _ = write!(
                    self.out,
                    "<div class=\"{} env\" id=\"{anchor}\">\n",
                    escape(css)
                );
                if let Some(spec) = spec {
                    if spec.numbering != NumberingScheme::Unnumbered || !spec.label.is_empty() {
                        let number = self
                            .tree
                            .node(id)
                            .number
                            .as_deref()
                            .map(|n| format!(" {}", escape(n)))
                            .unwrap_or_default();
                        let title = title
                            .map(|t| format!(" ({})", escape(t)))
                            .unwrap_or_default();
                        let _ = write!(
                            self.out,
                            "<p class=\"env-head\"><strong>{}{number}</strong>{title}</p>\n",
                            escape(&spec.label)
                        );
                    }
                }
                self.children(id);
                self.out.push_str("</div>\n");
            }
        }
    }
}

/// Minimal HTML escaping for text and attribute content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = "<style>\n\
body { font-family: Georgia, serif; max-width: 50rem; margin: 0 auto; padding: 0 1rem 4rem; line-height: 1.6; }\n\
header { text-align: center; margin: 2rem 0; }\n\
.byline { color: #666; }\n\
.tabs { display: flex; gap: .5rem; border-bottom: 2px solid #ddd; margin-bottom: 1.5rem; }\n\
.tabs button { border: none; background: none; padding: .5rem 1rem; cursor: pointer; font: inherit; }\n\
.tabs button.active { border-bottom: 2px solid #333; font-weight: bold; margin-bottom: -2px; }\n\
.tab-panel { display: none; }\n\
.tab-panel.visible { display: block; }\n\
ul.toc { list-style: none; padding-left: 1rem; }\n\
.toc-num { color: #888; margin-right: .3rem; }\n\
.env { border-left: 3px solid #ccc; padding: .5rem 1rem; margin: 1rem 0; }\n\
.env-theorem { border-color: #3b6ea5; background: #f4f7fb; }\n\
.env-example { border-color: #4a8f5c; background: #f4faf5; }\n\
.box-yellow, .box-note { border-color: #c9a227; background: #fdf9ec; }\n\
.env-proof { margin: 1rem 0 1rem 1rem; }\n\
.qed { float: right; }\n\
.env-head { margin: 0 0 .5rem; }\n\
.math-display { position: relative; margin: 1rem 0; text-align: center; }\n\
.eq-number { position: absolute; right: 0; top: 50%; color: #666; }\n\
table { border-collapse: collapse; margin: 1rem auto; }\n\
td { border: 1px solid #ccc; padding: .3rem .7rem; }\n\
caption, figcaption { caption-side: bottom; font-size: .9rem; color: #555; margin-top: .5rem; }\n\
figure { text-align: center; margin: 1.5rem 0; }\n\
figure img { max-width: 100%; }\n\
pre { background: #f6f6f6; padding: .8rem; overflow-x: auto; }\n\
.unresolved { color: #b00; background: #fee; padding: 0 .2rem; }\n\
.missing-image { color: #b00; font-style: italic; }\n\
.diagram-note { color: #888; font-size: .85rem; }\n\
.references li { margin-bottom: .5rem; }\n\
</style>\n";

const TAB_SCRIPT: &str = "<script>\n\
document.querySelectorAll('.tabs button').forEach(function (button) {\n\
  button.addEventListener('click', function () {\n\
    document.querySelectorAll('.tabs button').forEach(function (b) { b.classList.remove('active'); });\n\
    document.querySelectorAll('.tab-panel').forEach(function (p) { p.classList.remove('visible'); });\n\
    button.classList.add('active');\n\
    var panel = document.getElementById(button.dataset.tab);\n\
    if (panel) { panel.classList.add('visible'); }\n\
  });\n\
});\n\
var first = document.querySelector('.tab-panel');\n\
if (first) { first.classList.add('visible'); }\n\
// Jumping to an in-document anchor switches to the book tab.\n\
document.addEventListener('click', function (event) {\n\
  var link = event.target.closest('a.xref');\n\
  if (!link) { return; }\n\
  var book = document.getElementById('tab-book');\n\
  if (book) {\n\
    document.querySelectorAll('.tab-panel').forEach(function (p) { p.classList.remove('visible'); });\n\
    book.classList.add('visible');\n\
  }\n\
});\n\
</script>\n";
