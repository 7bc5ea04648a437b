//! Ariadne-based diagnostic rendering for type errors.
//!
//! Each error renders with a stable code, a one-line message, a primary
//! label at the offending location and, where two values were combined,
//! a secondary label at the other value. Spans may point into any file
//! of the [`SourceMap`].

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind};
use gera_common::source::SourceMap;
use gera_common::Span;
use serde::Deserialize;

use crate::error::{AssignmentKind, TypeError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticOptions {
    /// Emit ANSI colours.
    #[serde(default)]
    pub color: bool,
}

// ── Error Codes ────────────────────────────────────────────────────────

pub fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::InvalidType { .. } => "E0001",
        TypeError::Incompatible { .. } => "E0002",
        TypeError::LayoutMismatch { .. } => "E0003",
        TypeError::Uninitialized { .. } => "E0004",
        TypeError::InvalidAssignment { .. } => "E0005",
        TypeError::SelfReference { .. } => "E0006",
        TypeError::UnknownSymbol { .. } => "E0007",
        TypeError::ArgumentCount { .. } => "E0008",
        TypeError::NoViableCandidate { .. } => "E0009",
    }
}

// ── Span Helpers ───────────────────────────────────────────────────────

type FileSpan = (String, Range<usize>);

/// Resolves spans against the source map, clamped to the file's text.
struct Spans<'a> {
    sources: &'a SourceMap,
}

impl Spans<'_> {
    fn resolve(&self, span: Span) -> Option<FileSpan> {
        let file = self.sources.get(span.file)?;
        let len = file.text.len();
        let start = (span.start as usize).min(len);
        let end = (span.end as usize).min(len).max(start);
        // Ariadne needs at least one character to point at.
        let range = if start == end {
            start..(end + 1).min(len)
        } else {
            start..end
        };
        Some((file.name.clone(), range))
    }
}

fn label(span: FileSpan, message: impl ToString, color: Color) -> Label<FileSpan> {
    Label::new(span).with_message(message).with_color(color)
}

/// Render a type error into a formatted diagnostic string using ariadne.
///
/// Errors whose primary span lies outside every known file fall back to a
/// single `error[code]: message` line.
pub fn render_diagnostic(error: &TypeError, sources: &SourceMap, options: &DiagnosticOptions) -> String {
    let code = error_code(error);
    let spans = Spans { sources };
    let Some(primary) = spans.resolve(error.span()) else {
        return format!("error[{}]: {}\n", code, error);
    };
    let config = Config::default().with_color(options.color);

    let mut builder = Report::build(ReportKind::Error, primary.clone())
        .with_code(code)
        .with_message(error.to_string())
        .with_config(config);

    match error {
        TypeError::InvalidType {
            expected,
            found,
            found_span,
            reason,
            ..
        } => {
            builder = builder.with_label(label(primary, format!("expected {}", expected), Color::Red));
            if let Some(other) = found_span.and_then(|s| spans.resolve(s)) {
                builder = builder.with_label(label(other, format!("{} because of this", found), Color::Blue));
            }
            if let Some(reason) = reason {
                builder = builder.with_note(format!("the value must be {} {}", expected, reason));
            }
        }
        TypeError::Incompatible {
            left,
            right,
            left_span,
            right_span,
            path,
            ..
        } => {
            let what = if path.is_empty() {
                "they".to_string()
            } else {
                path.to_string()
            };
            builder = builder.with_label(label(
                primary,
                format!("{} are combined into one type here", what),
                Color::Red,
            ));
            if let Some(span) = left_span.and_then(|s| spans.resolve(s)) {
                builder = builder.with_label(label(span, format!("{} here", left), Color::Blue));
            }
            if let Some(span) = right_span.and_then(|s| spans.resolve(s)) {
                builder = builder.with_label(label(span, format!("{} here", right), Color::Blue));
            }
        }
        TypeError::LayoutMismatch {
            left_span,
            right_span,
            ..
        } => {
            builder = builder.with_label(label(primary, "combined here", Color::Red));
            for span in [left_span, right_span].into_iter().flatten() {
                if let Some(span) = spans.resolve(*span) {
                    builder = builder.with_label(label(span, "layout fixed here", Color::Blue));
                }
            }
            builder = builder.with_help("objects with a fixed layout must list their members in the same order");
        }
        TypeError::Uninitialized { name, .. } => {
            builder = builder
                .with_label(label(primary, format!("`{}` may not have a value yet", name), Color::Red))
                .with_help("assign a value on every path before this point");
        }
        TypeError::InvalidAssignment { kind, .. } => {
            builder = builder.with_label(label(primary, "assigned here", Color::Red));
            match kind {
                AssignmentKind::Immutable => builder = builder.with_help("declare the variable with `mut`"),
                AssignmentKind::ModuleVariable => {
                    builder = builder.with_help("module variables cannot change after initialization")
                }
                AssignmentKind::Procedure | AssignmentKind::NotAssignable => {}
            }
        }
        TypeError::SelfReference { .. } => {
            builder = builder
                .with_label(label(primary, "references itself", Color::Red))
                .with_help("a module variable's value cannot depend on itself");
        }
        TypeError::UnknownSymbol { .. } => {
            builder = builder.with_label(label(primary, "not found", Color::Red));
        }
        TypeError::ArgumentCount {
            expected,
            found,
            declared,
            ..
        } => {
            builder = builder.with_label(label(
                primary,
                format!("{} argument{} provided here", found, if *found == 1 { "" } else { "s" }),
                Color::Red,
            ));
            if let Some(span) = spans.resolve(*declared) {
                builder = builder.with_label(label(
                    span,
                    format!("accepts {} argument{}", expected, if *expected == 1 { "" } else { "s" }),
                    Color::Blue,
                ));
            }
        }
        TypeError::NoViableCandidate { errors, .. } => {
            builder = builder.with_label(label(primary, "no candidate accepts this call", Color::Red));
            for candidate in errors {
                builder = builder.with_note(candidate.to_string());
            }
        }
    }

    let report = builder.finish();
    let files = sources
        .iter()
        .map(|(_, file)| (file.name.clone(), file.text.clone()))
        .collect::<Vec<_>>();
    let mut buf = Vec::new();
    report
        .write(ariadne::sources(files), &mut buf)
        .expect("failed to write diagnostic");
    String::from_utf8(buf).expect("diagnostic output should be valid UTF-8")
}
