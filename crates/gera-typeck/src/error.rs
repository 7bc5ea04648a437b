//! Type checking errors.
//!
//! Errors that reconcile two values carry both values' spans and a
//! [`UnifyPath`] describing where inside the two types the conflict sits.

use std::fmt;

use gera_common::{Path, Span};

/// One step into a pair of types being unified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    Element,
    Member(String),
    Variant(String),
    Argument(usize),
    Returns,
}

/// Steps from the outer types being unified down to the conflict.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct UnifyPath(pub Vec<PathStep>);

impl UnifyPath {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&self, step: PathStep) -> UnifyPath {
        let mut steps = self.0.clone();
        steps.push(step);
        UnifyPath(steps)
    }
}

/// `1` -> `first`, `12` -> `12th`.
pub fn ordinal(n: usize) -> String {
    const NAMES: [&str; 10] = [
        "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth",
        "tenth",
    ];
    match n {
        1..=10 => NAMES[n - 1].to_string(),
        _ => format!("{}th", n),
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Element => write!(f, "the array elements"),
            PathStep::Member(name) => write!(f, "the member `{}`", name),
            PathStep::Variant(name) => write!(f, "the variant `#{}`", name),
            PathStep::Argument(i) => write!(f, "the {} argument", ordinal(i + 1)),
            PathStep::Returns => write!(f, "the return values"),
        }
    }
}

impl fmt::Display for UnifyPath {
    /// Innermost step first: "the member `x` of the array elements".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, " of ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    Immutable,
    Procedure,
    ModuleVariable,
    NotAssignable,
}

/// A type error.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeError {
    /// A value required to be of one kind is of another.
    InvalidType {
        expected: String,
        found: String,
        span: Span,
        found_span: Option<Span>,
        reason: Option<String>,
    },
    /// Two values forced into one type have incompatible kinds.
    Incompatible {
        left: String,
        right: String,
        left_span: Option<Span>,
        right_span: Option<Span>,
        span: Span,
        path: UnifyPath,
    },
    /// Two objects with different fixed member layouts were combined.
    LayoutMismatch {
        left_order: Vec<String>,
        right_order: Vec<String>,
        left_span: Option<Span>,
        right_span: Option<Span>,
        span: Span,
        path: UnifyPath,
    },
    Uninitialized {
        name: String,
        span: Span,
    },
    InvalidAssignment {
        target: String,
        kind: AssignmentKind,
        span: Span,
    },
    /// A module-level variable whose value depends on itself.
    SelfReference {
        path: Path,
        span: Span,
    },
    UnknownSymbol {
        path: Path,
        span: Span,
    },
    ArgumentCount {
        path: Path,
        expected: usize,
        found: usize,
        span: Span,
        declared: Span,
    },
    /// Every candidate of an overloaded call failed.
    NoViableCandidate {
        path: Path,
        span: Span,
        candidates: Vec<Path>,
        errors: Vec<TypeError>,
    },
}

impl TypeError {
    /// The primary location of the error.
    pub fn span(&self) -> Span {
        match self {
            TypeError::InvalidType { span, .. }
            | TypeError::Incompatible { span, .. }
            | TypeError::LayoutMismatch { span, .. }
            | TypeError::Uninitialized { span, .. }
            | TypeError::InvalidAssignment { span, .. }
            | TypeError::SelfReference { span, .. }
            | TypeError::UnknownSymbol { span, .. }
            | TypeError::ArgumentCount { span, .. }
            | TypeError::NoViableCandidate { span, .. } => *span,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::InvalidType {
                expected,
                found,
                reason,
                ..
            } => {
                write!(f, "invalid type: expected {}, found {}", expected, found)?;
                if let Some(reason) = reason {
                    write!(f, " ({})", reason)?;
                }
                Ok(())
            }
            TypeError::Incompatible {
                left, right, path, ..
            } => {
                write!(f, "incompatible types: {} and {}", left, right)?;
                if !path.is_empty() {
                    write!(f, " in {}", path)?;
                }
                Ok(())
            }
            TypeError::LayoutMismatch {
                left_order,
                right_order,
                path,
                ..
            } => {
                write!(
                    f,
                    "objects with different layouts used together: [{}] and [{}]",
                    left_order.join(", "),
                    right_order.join(", ")
                )?;
                if !path.is_empty() {
                    write!(f, " in {}", path)?;
                }
                Ok(())
            }
            TypeError::Uninitialized { name, .. } => {
                write!(f, "usage of possibly uninitialized variable `{}`", name)
            }
            TypeError::InvalidAssignment { target, kind, .. } => match kind {
                AssignmentKind::Immutable => {
                    write!(f, "assignment to immutable variable `{}`", target)
                }
                AssignmentKind::Procedure => write!(f, "assignment to procedure `{}`", target),
                AssignmentKind::ModuleVariable => {
                    write!(f, "assignment to module variable `{}`", target)
                }
                AssignmentKind::NotAssignable => write!(f, "cannot assign to {}", target),
            },
            TypeError::SelfReference { path, .. } => {
                write!(f, "module variable `{}` references itself", path)
            }
            TypeError::UnknownSymbol { path, .. } => write!(f, "unknown symbol `{}`", path),
            TypeError::ArgumentCount {
                path,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{}` expects {} argument{}, but {} {} given",
                path,
                expected,
                if *expected == 1 { "" } else { "s" },
                found,
                if *found == 1 { "was" } else { "were" }
            ),
            TypeError::NoViableCandidate {
                path, candidates, ..
            } => {
                let names: Vec<String> = candidates.iter().map(|c| format!("`{}`", c)).collect();
                write!(
                    f,
                    "no viable candidate for call to `{}` (considered {})",
                    path,
                    names.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for TypeError {}
