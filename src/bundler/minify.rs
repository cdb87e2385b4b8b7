//! Source emission for rewritten script modules.
//!
//! The ES module rewriter never produces text by pattern substitution. It
//! describes every change (a removed `import`, a dropped comment, an inserted
//! binding) as an [`Edit`] over the parsed source, and [`apply`] splices the
//! edits in.
//!
//! With `compact` set, indentation, trailing whitespace and blank lines are
//! dropped on the way out. Newlines between statements are kept so automatic
//! semicolon insertion behaves exactly as in the source. Literal spans
//! (string literals and template chunks, as reported by the parser) are
//! copied untouched.

use oxc_span::Span;

/// Replace `span` of the source with `text`. An empty span inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub text: String,
}

impl Edit {
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }

    pub fn remove(span: Span) -> Self {
        Self::replace(span, String::new())
    }

    pub fn insert(at: u32, text: impl Into<String>) -> Self {
        Self::replace(Span::new(at, at), text)
    }
}

/// Splice `edits` into `source`.
///
/// Edits are applied in source order; an edit starting inside an earlier one
/// is dropped together with the text it would have touched. `literals` must
/// be sorted and non-overlapping.
pub fn apply(source: &str, mut edits: Vec<Edit>, literals: &[Span], compact: bool) -> String {
    edits.sort_by_key(|edit| (edit.span.start, edit.span.end));

    let mut out = Output::new(compact, source.len());
    let mut literals = Literals {
        spans: literals,
        next: 0,
    };
    let mut pos = 0usize;
    for edit in edits {
        let (start, end) = (edit.span.start as usize, edit.span.end as usize);
        if start < pos || end > source.len() {
            continue;
        }
        out.source(source, pos, start, &mut literals);
        out.generated(&edit.text);
        pos = end;
    }
    out.source(source, pos, source.len(), &mut literals);
    out.finish()
}

/// Cursor over sorted literal spans.
struct Literals<'s> {
    spans: &'s [Span],
    next: usize,
}

impl Literals<'_> {
    fn contains(&mut self, offset: usize) -> bool {
        while let Some(span) = self.spans.get(self.next) {
            if (span.end as usize) <= offset {
                self.next += 1;
                continue;
            }
            return (span.start as usize) <= offset;
        }
        false
    }
}

struct Output {
    compact: bool,
    out: String,
    at_line_start: bool,
    /// End of the last literal character written; trimming never crosses it.
    floor: usize,
}

impl Output {
    fn new(compact: bool, capacity: usize) -> Self {
        Self {
            compact,
            out: String::with_capacity(capacity),
            at_line_start: true,
            floor: 0,
        }
    }

    fn source(&mut self, source: &str, from: usize, to: usize, literals: &mut Literals<'_>) {
        if from >= to {
            return;
        }
        for (offset, ch) in source[from..to].char_indices() {
            if literals.contains(from + offset) {
                self.literal(ch);
            } else {
                self.code(ch);
            }
        }
    }

    fn generated(&mut self, text: &str) {
        for ch in text.chars() {
            self.code(ch);
        }
    }

    fn literal(&mut self, ch: char) {
        self.out.push(ch);
        self.at_line_start = false;
        self.floor = self.out.len();
    }

    fn code(&mut self, ch: char) {
        if !self.compact {
            self.out.push(ch);
            return;
        }
        match ch {
            '\n' => {
                self.trim_trailing();
                if !self.out.is_empty() && !self.out[self.floor..].ends_with('\n') {
                    self.out.push('\n');
                }
                self.at_line_start = true;
            }
            '\r' => {}
            ' ' | '\t' if self.at_line_start => {}
            _ => {
                self.out.push(ch);
                self.at_line_start = false;
            }
        }
    }

    fn trim_trailing(&mut self) {
        let kept = self
            .out
            .trim_end_matches([' ', '\t', '\r'])
            .len()
            .max(self.floor);
        self.out.truncate(kept);
    }

    fn finish(mut self) -> String {
        if self.compact {
            self.trim_trailing();
            while self.out.len() > self.floor && self.out.ends_with('\n') {
                self.out.pop();
            }
            return self.out;
        }
        let trimmed = self.out.trim_matches('\n');
        if trimmed.len() == self.out.len() {
            self.out
        } else {
            trimmed.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(source: &str, needle: &str) -> Span {
        let start = source.find(needle).unwrap() as u32;
        Span::new(start, start + needle.len() as u32)
    }

    #[test]
    fn edits_apply_in_source_order() {
        let source = "let a = 1; /* x */ let b = 2;";
        let edits = vec![
            Edit::remove(span(source, "/* x */")),
            Edit::replace(span(source, "let a"), "var a"),
            Edit::insert(source.len() as u32, " done();"),
        ];
        assert_eq!(
            apply(source, edits, &[], false),
            "var a = 1;  let b = 2; done();"
        );
    }

    #[test]
    fn edits_inside_a_replaced_span_are_dropped() {
        let source = "import { a, /* b */ c } from './x';\nrun();";
        let edits = vec![
            Edit::remove(span(source, "import { a, /* b */ c } from './x';")),
            Edit::replace(span(source, "/* b */"), " "),
        ];
        assert_eq!(apply(source, edits, &[], false), "run();");
    }

    #[test]
    fn compaction_drops_indentation_and_blank_lines() {
        let source = "function f() {\n    return 1;   \n\n\n}\n\n  f();\n";
        assert_eq!(
            apply(source, Vec::new(), &[], true),
            "function f() {\nreturn 1;\n}\nf();"
        );
    }

    #[test]
    fn literal_spans_are_copied_verbatim() {
        let source = "const html = `\n  <p>\n    x   \n\n  </p>\n`;\n";
        let literal = span(source, "\n  <p>\n    x   \n\n  </p>\n");
        assert_eq!(
            apply(source, Vec::new(), &[literal], true),
            "const html = `\n  <p>\n    x   \n\n  </p>\n`;"
        );
    }

    #[test]
    fn readable_output_only_trims_outer_newlines() {
        let source = "\n\n  a();\n\n  b();\n\n";
        assert_eq!(apply(source, Vec::new(), &[], false), "  a();\n\n  b();");
    }
}
