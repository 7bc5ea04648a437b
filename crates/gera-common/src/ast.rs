//! Syntax tree shared by the type checker and the IR lowerer.
//!
//! The tree is generic over its annotation `T`. Parsing and name resolution
//! produce `Node<()>`; constraint generation rebuilds the tree as
//! `Node<TyVar>` with every node carrying the type variable of its value.
//! The solver then rewrites the resolved-only kinds (`ProcedureCall`,
//! `GlobalAccess`, `ProcedureRef`, `VariableAccess`) so every module-level
//! reference points at a concrete symbol variant.

use std::collections::BTreeMap;

use crate::path::Path;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Node<T = ()> {
    pub kind: NodeKind<T>,
    pub span: Span,
    pub ty: T,
}

impl Node<()> {
    pub fn new(kind: NodeKind<()>, span: Span) -> Self {
        Node { kind, span, ty: () }
    }
}

impl<T> Node<T> {
    /// Replace this node's span, keeping everything else.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    Equals,
    NotEquals,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::LessThan
                | BinaryOp::GreaterThan
                | BinaryOp::LessThanEqual
                | BinaryOp::GreaterThanEqual
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Equals | BinaryOp::NotEquals)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Where a module-level reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Index of the deferred usage recorded during constraint generation.
    Pending(usize),
    /// A solved symbol variant.
    Resolved { path: Path, variant: usize },
}

/// Signature and captured names of a closure literal, filled in by
/// constraint generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureInfo<T> {
    pub args: Vec<T>,
    pub returns: T,
    /// Captured name to its type in the enclosing scope.
    pub captures: BTreeMap<String, T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantBranch<T = ()> {
    pub variant: String,
    pub binding: Option<String>,
    pub body: Vec<Node<T>>,
    /// Type of the variant's payload.
    pub payload: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind<T = ()> {
    Closure {
        params: Vec<String>,
        body: Vec<Node<T>>,
        info: Option<ClosureInfo<T>>,
    },
    Variable {
        name: String,
        mutable: bool,
        value: Option<Box<Node<T>>>,
    },
    /// Match a value against constant branch values.
    CaseBranching {
        value: Box<Node<T>>,
        branch_values: Vec<Node<T>>,
        branch_bodies: Vec<Vec<Node<T>>>,
        else_body: Vec<Node<T>>,
    },
    /// Boolean if/else.
    CaseConditional {
        condition: Box<Node<T>>,
        if_body: Vec<Node<T>>,
        else_body: Vec<Node<T>>,
    },
    /// Match on the tag of a union value. Without an else body the match is
    /// exhaustive over the listed variants.
    CaseVariant {
        value: Box<Node<T>>,
        branches: Vec<VariantBranch<T>>,
        else_body: Option<Vec<Node<T>>>,
    },
    Assignment {
        target: Box<Node<T>>,
        value: Box<Node<T>>,
    },
    Return(Box<Node<T>>),
    Call {
        called: Box<Node<T>>,
        args: Vec<Node<T>>,
    },
    MethodCall {
        receiver: Box<Node<T>>,
        member: String,
        args: Vec<Node<T>>,
    },
    ObjectLiteral(Vec<(String, Node<T>)>),
    ArrayLiteral(Vec<Node<T>>),
    RepeatingArrayLiteral {
        value: Box<Node<T>>,
        size: Box<Node<T>>,
    },
    ObjectAccess {
        accessed: Box<Node<T>>,
        member: String,
    },
    ArrayAccess {
        accessed: Box<Node<T>>,
        index: Box<Node<T>>,
    },
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Unit,
    Binary {
        op: BinaryOp,
        left: Box<Node<T>>,
        right: Box<Node<T>>,
    },
    Unary {
        op: UnaryOp,
        value: Box<Node<T>>,
    },
    /// A name or path as written in source, not yet resolved.
    ModuleAccess(Path),
    VariantLiteral {
        variant: String,
        value: Box<Node<T>>,
    },
    /// Unwrap `variant` from a union value, returning every other variant
    /// from the enclosing procedure.
    VariantUnwrap {
        value: Box<Node<T>>,
        variant: String,
    },
    /// An expression evaluated at compile time.
    Static(Box<Node<T>>),

    // ── Resolved forms ─────────────────────────────────────────────────
    VariableAccess(String),
    GlobalAccess(Target),
    /// A procedure used as a value. Solving turns it into a forwarding closure.
    ProcedureRef(Target),
    ProcedureCall {
        target: Target,
        args: Vec<Node<T>>,
    },
}
