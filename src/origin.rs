//! Source origin tracking across file inclusion.
//!
//! The loader flattens a multi-file project into one logical character
//! stream. Downstream diagnostics still need to cite the original file and
//! line, so the loader records, for every line it appends, where that line
//! came from. [`OriginMap::resolve`] answers "which file/line/column does
//! flattened byte offset N correspond to?" with a binary search over those
//! per-line segments.

use std::fmt;
use std::sync::Arc;

/// Byte range into the flattened source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest span covering both inputs.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A resolved source location: file, line, column (all 1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Origin {
    /// Placeholder origin for diagnostics with no source position
    /// (e.g. configuration problems).
    pub fn unknown() -> Self {
        Origin {
            file: Arc::from("<unknown>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One source line's placement in the flattened stream.
#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Flattened byte offset where this line begins.
    flat_start: usize,
    /// Index into `OriginMap::files`.
    file: u32,
    /// 1-based line number within that file.
    line: u32,
}

/// Mapping from flattened byte offsets back to original file/line/column.
#[derive(Debug, Clone, Default)]
pub struct OriginMap {
    files: Vec<Arc<str>>,
    segments: Vec<Segment>,
}

impl OriginMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and get its index for subsequent [`push_line`] calls.
    ///
    /// [`push_line`]: OriginMap::push_line
    pub fn add_file(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.files.iter().position(|f| f.as_ref() == name) {
            return idx as u32;
        }
        self.files.push(Arc::from(name));
        (self.files.len() - 1) as u32
    }

    /// Record that the line `line` of file `file` starts at flattened
    /// offset `flat_start`. Lines must be pushed in flattened order.
    pub fn push_line(&mut self, flat_start: usize, file: u32, line: u32) {
        debug_assert!(
            self.segments
                .last()
                .is_none_or(|s| s.flat_start <= flat_start)
        );
        self.segments.push(Segment {
            flat_start,
            file,
            line,
        });
    }

    /// Resolve a flattened byte offset to its original location.
    pub fn resolve(&self, offset: usize) -> Origin {
        if self.segments.is_empty() {
            return Origin::unknown();
        }
        let idx = self
            .segments
            .partition_point(|s| s.flat_start <= offset)
            .saturating_sub(1);
        let seg = self.segments[idx];
        Origin {
            file: self.files[seg.file as usize].clone(),
            line: seg.line,
            column: (offset - seg.flat_start + 1) as u32,
        }
    }

    /// Resolve the start of a span.
    pub fn resolve_span(&self, span: Span) -> Origin {
        self.resolve(span.start)
    }

    /// Rebase the map onto the byte range `start..end`, so offset 0 of the
    /// sliced stream resolves like offset `start` of the original. Used when
    /// the document body is cut out of the flattened stream.
    pub fn slice(&self, start: usize, end: usize) -> OriginMap {
        let mut out = OriginMap {
            files: self.files.clone(),
            segments: Vec::new(),
        };
        for seg in &self.segments {
            if seg.flat_start >= end {
                break;
            }
            if seg.flat_start >= start {
                out.segments.push(Segment {
                    flat_start: seg.flat_start - start,
                    ..*seg
                });
            }
        }
        // Cover the partial line the slice starts inside, if any.
        if out.segments.first().is_none_or(|s| s.flat_start > 0) {
            let idx = self
                .segments
                .partition_point(|s| s.flat_start <= start)
                .saturating_sub(1);
            if let Some(seg) = self.segments.get(idx) {
                out.segments.insert(
                    0,
                    Segment {
                        flat_start: 0,
                        ..*seg
                    },
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_offsets_to_lines() {
        let mut map = OriginMap::new();
        let main = map.add_file("main.tex");
        let ch1 = map.add_file("ch01.tex");
        map.push_line(0, main, 1); // "abc\n" at 0..4
        map.push_line(4, ch1, 1); // included line at 4..10
        map.push_line(10, main, 2);

        let o = map.resolve(0);
        assert_eq!((o.file.as_ref(), o.line, o.column), ("main.tex", 1, 1));
        let o = map.resolve(5);
        assert_eq!((o.file.as_ref(), o.line, o.column), ("ch01.tex", 1, 2));
        let o = map.resolve(10);
        assert_eq!((o.file.as_ref(), o.line, o.column), ("main.tex", 2, 1));
        // Offsets past the last segment still map to the last line.
        let o = map.resolve(500);
        assert_eq!(o.file.as_ref(), "main.tex");
    }

    #[test]
    fn empty_map_yields_unknown() {
        let map = OriginMap::new();
        assert_eq!(map.resolve(3), Origin::unknown());
    }
}
