//! Built-in procedures of the `core` module.
//!
//! Most built-ins have no body. Their signature is a small constraint set
//! over fresh variables, instantiated again for every solve so that each
//! call site gets its own variant. The rest are ordinary procedures whose
//! trees are registered like user code.

use std::collections::BTreeSet;

use gera_common::ast::{BinaryOp, Node};
use gera_common::build::*;
use gera_common::Span;

use crate::constraint::{Constraint, ConstraintKind};
use crate::ctx::TypeContext;
use crate::symbols::{BuiltinContext, BuiltinSignature, Symbols};
use crate::ty::{BaseKind, TyVar};

const BUILTINS: &[(&str, &[&str], BuiltinSignature)] = &[
    ("core::length", &["thing"], length),
    ("core::exhaust", &["iter"], exhaust),
    ("core::addr_eq", &["a", "b"], addr_eq),
    ("core::tag_eq", &["a", "b"], tag_eq),
    ("core::panic", &["reason"], panic),
    ("core::as_str", &["converted"], as_str),
    ("core::as_int", &["converted"], as_int),
    ("core::as_flt", &["converted"], as_flt),
    ("core::substring", &["source", "start", "end"], substring),
    ("core::concat", &["a", "b"], concat),
    ("core::hash", &["thing"], hash),
];

const SOURCES: &[(&str, &[&str], fn() -> Vec<Node>)] = &[
    ("core::range", &["start", "end"], range),
    ("core::range_incl", &["start", "end"], range_incl),
];

/// Register every built-in whose path is not already taken.
pub fn register(symbols: &mut Symbols) {
    for &(path, params, signature) in BUILTINS {
        if symbols.by_path(path).is_none() {
            symbols.add_builtin(path, params, signature);
        }
    }
    for &(path, params, body) in SOURCES {
        if symbols.by_path(path).is_none() {
            symbols.add_procedure(path, Span::default(), params, body());
        }
    }
}

/// Accumulates a built-in's constraints.
struct Signature<'a> {
    ctx: &'a mut TypeContext,
    span: Span,
    constraints: Vec<Constraint>,
}

impl<'a> Signature<'a> {
    fn new(ctx: &'a mut TypeContext, span: Span) -> Self {
        Signature {
            ctx,
            span,
            constraints: Vec::new(),
        }
    }

    fn var(&mut self) -> TyVar {
        self.ctx.fresh()
    }

    fn typed(&mut self, base: BaseKind) -> TyVar {
        let var = self.var();
        self.require(var, ConstraintKind::IsType(base, None));
        var
    }

    fn require(&mut self, target: TyVar, kind: ConstraintKind) {
        self.constraints.push(Constraint::new(target, self.span, kind));
    }

    fn finish(self, args: Vec<TyVar>, returns: TyVar) -> BuiltinContext {
        BuiltinContext {
            args,
            returns,
            constraints: self.constraints,
        }
    }
}

fn length(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let thing = sig.var();
    sig.require(thing, ConstraintKind::IsSequence);
    let returns = sig.typed(BaseKind::Integer);
    sig.finish(vec![thing], returns)
}

/// Calls a zero-argument iterator until it returns `#end`.
fn exhaust(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let step = sig.var();
    let steps: BTreeSet<String> = ["next", "end"].into_iter().map(str::to_string).collect();
    sig.require(step, ConstraintKind::LimitVariants(steps));
    let iter = sig.var();
    sig.require(
        iter,
        ConstraintKind::HasSignature {
            args: Vec::new(),
            returns: step,
        },
    );
    let returns = sig.typed(BaseKind::Unit);
    sig.finish(vec![iter], returns)
}

fn addr_eq(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let a = sig.var();
    let b = sig.var();
    sig.require(a, ConstraintKind::IsReferenced);
    sig.require(a, ConstraintKind::Unify(b));
    let returns = sig.typed(BaseKind::Boolean);
    sig.finish(vec![a, b], returns)
}

fn tag_eq(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let a = sig.typed(BaseKind::Union);
    let b = sig.var();
    sig.require(a, ConstraintKind::Unify(b));
    let returns = sig.typed(BaseKind::Boolean);
    sig.finish(vec![a, b], returns)
}

fn panic(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let reason = sig.typed(BaseKind::String);
    let returns = sig.typed(BaseKind::Unit);
    sig.finish(vec![reason], returns)
}

fn as_str(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let converted = sig.var();
    let returns = sig.typed(BaseKind::String);
    sig.finish(vec![converted], returns)
}

fn as_int(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let converted = sig.var();
    sig.require(converted, ConstraintKind::IsNumeric);
    let returns = sig.typed(BaseKind::Integer);
    sig.finish(vec![converted], returns)
}

fn as_flt(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let converted = sig.var();
    sig.require(converted, ConstraintKind::IsNumeric);
    let returns = sig.typed(BaseKind::Float);
    sig.finish(vec![converted], returns)
}

fn substring(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let source = sig.typed(BaseKind::String);
    let start = sig.typed(BaseKind::Integer);
    let end = sig.typed(BaseKind::Integer);
    let returns = sig.typed(BaseKind::String);
    sig.finish(vec![source, start, end], returns)
}

fn concat(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let a = sig.typed(BaseKind::String);
    let b = sig.typed(BaseKind::String);
    let returns = sig.typed(BaseKind::String);
    sig.finish(vec![a, b], returns)
}

fn hash(ctx: &mut TypeContext, span: Span) -> BuiltinContext {
    let mut sig = Signature::new(ctx, span);
    let thing = sig.var();
    let returns = sig.typed(BaseKind::Integer);
    sig.finish(vec![thing], returns)
}

// ── Source procedures ──────────────────────────────────────────────────

/// ```text
/// mut i = start
/// return || {
///     case i >= end -> return #end unit
///     i = i + 1
///     return #next i - 1
/// }
/// ```
fn range() -> Vec<Node> {
    vec![
        mut_("i", name("start")),
        ret(closure(
            &[],
            vec![
                case_if(
                    binary(BinaryOp::GreaterThanEqual, name("i"), name("end")),
                    vec![ret(variant("end", unit()))],
                    vec![],
                ),
                assign(name("i"), add(name("i"), int(1))),
                ret(variant("next", binary(BinaryOp::Subtract, name("i"), int(1)))),
            ],
        )),
    ]
}

fn range_incl() -> Vec<Node> {
    vec![ret(call_path(
        "range",
        vec![name("start"), add(name("end"), int(1))],
    ))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::ProcedureBody;
    use crate::ty::TyKind;
    use gera_common::Path;

    #[test]
    fn registers_under_core() {
        let mut symbols = Symbols::new();
        register(&mut symbols);
        assert_eq!(symbols.len(), BUILTINS.len() + SOURCES.len());
        let length = symbols.by_path("core::length").unwrap();
        assert_eq!(length.as_procedure().unwrap().params, ["thing"]);
        let range = symbols.by_path("core::range").unwrap();
        assert!(matches!(
            &range.as_procedure().unwrap().body,
            ProcedureBody::Source(body) if body.len() == 2
        ));
    }

    #[test]
    fn keeps_user_definitions() {
        let mut symbols = Symbols::new();
        let mine = symbols.add_procedure("core::hash", Span::default(), &["x", "seed"], vec![]);
        register(&mut symbols);
        assert_eq!(symbols.lookup(&Path::parse("core::hash")), Some(mine));
        assert_eq!(symbols.get(mine).as_procedure().unwrap().params.len(), 2);
    }

    #[test]
    fn signatures_apply_cleanly() {
        let mut ctx = TypeContext::new();
        for &(path, params, signature) in BUILTINS {
            let builtin = signature(&mut ctx, Span::default());
            assert_eq!(builtin.args.len(), params.len(), "{}", path);
            for constraint in &builtin.constraints {
                ctx.apply(constraint).unwrap();
            }
        }
    }

    #[test]
    fn length_returns_integer() {
        let mut ctx = TypeContext::new();
        let builtin = length(&mut ctx, Span::default());
        for constraint in &builtin.constraints {
            ctx.apply(constraint).unwrap();
        }
        assert_eq!(ctx.display(builtin.args[0]), "sequence");
        assert_eq!(ctx.display(builtin.returns), "int");
    }

    #[test]
    fn exhaust_takes_a_stepping_closure() {
        let mut ctx = TypeContext::new();
        let builtin = exhaust(&mut ctx, Span::default());
        for constraint in &builtin.constraints {
            ctx.apply(constraint).unwrap();
        }
        assert_eq!(ctx.display(builtin.returns), "unit");
        let TyKind::Closure(iter) = ctx.kind(builtin.args[0]) else {
            panic!("expected a closure");
        };
        assert!(iter.args.is_empty());
        assert_eq!(ctx.display(iter.returns), "(#end any | #next any)");
    }
}
