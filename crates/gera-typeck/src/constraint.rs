use std::collections::{BTreeMap, BTreeSet};

use gera_common::Span;

use crate::ctx::TypeContext;
use crate::error::{PathStep, TypeError, UnifyPath};
use crate::ty::{BaseKind, ClosureTy, ObjectTy, Ty, TyKind, TyVar, UnionTy};

/// An instruction to the solver about one type variable, generated in
/// tree traversal order and consumed exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub target: TyVar,
    pub span: Span,
    pub kind: ConstraintKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintKind {
    /// Must be exactly this kind. The reason is shown in diagnostics.
    IsType(BaseKind, Option<&'static str>),
    IsNumeric,
    IsIndexed,
    IsReferenced,
    /// A string or an array.
    IsSequence,
    HasElement(TyVar),
    HasMember { name: String, ty: TyVar },
    /// Seals an object to exactly these members.
    LimitMembers(BTreeSet<String>),
    HasSignature { args: Vec<TyVar>, returns: TyVar },
    HasVariant { name: String, ty: TyVar },
    /// Seals a union to at most these variants.
    LimitVariants(BTreeSet<String>),
    /// All variants of `of` except `except`.
    VariantsOfExcept { of: TyVar, except: String },
    Unify(TyVar),
}

impl Constraint {
    pub fn new(target: TyVar, span: Span, kind: ConstraintKind) -> Self {
        Constraint { target, span, kind }
    }
}

// ── Application ────────────────────────────────────────────────────────

fn describe_base(kind: BaseKind) -> String {
    kind.instantiate().describe().to_string()
}

fn invalid(current: &Ty, expected: String, constraint: &Constraint, reason: Option<&str>) -> TypeError {
    TypeError::InvalidType {
        expected,
        found: current.kind.describe().to_string(),
        span: constraint.span,
        found_span: current.origin,
        reason: reason.map(str::to_string),
    }
}

impl TypeContext {
    /// Narrow or unify the target of `constraint`.
    pub fn apply(&mut self, constraint: &Constraint) -> Result<(), TypeError> {
        let target = constraint.target;
        let span = constraint.span;
        let current = self.get(target);
        match &constraint.kind {
            ConstraintKind::IsType(base, reason) => {
                if base.matches(&current.kind) {
                    Ok(())
                } else if base.refines(&current.kind) {
                    self.set(target, Ty::new(base.instantiate(), span));
                    Ok(())
                } else {
                    Err(invalid(&current, describe_base(*base), constraint, *reason))
                }
            }
            ConstraintKind::IsNumeric => match current.kind {
                TyKind::Any => {
                    self.set(target, Ty::new(TyKind::Numeric, span));
                    Ok(())
                }
                ref kind if kind.is_numeric() => Ok(()),
                _ => Err(invalid(&current, "a number".to_string(), constraint, None)),
            },
            ConstraintKind::IsIndexed => match current.kind {
                TyKind::Any | TyKind::Referenced | TyKind::Sequence => {
                    self.set(target, Ty::new(TyKind::Indexed, span));
                    Ok(())
                }
                ref kind if kind.is_indexed() => Ok(()),
                _ => Err(invalid(&current, "an indexable value".to_string(), constraint, None)),
            },
            ConstraintKind::IsReferenced => match current.kind {
                TyKind::Any => {
                    self.set(target, Ty::new(TyKind::Referenced, span));
                    Ok(())
                }
                TyKind::Sequence => {
                    self.set(target, Ty::new(TyKind::Indexed, span));
                    Ok(())
                }
                ref kind if kind.is_referenced() => Ok(()),
                _ => Err(invalid(&current, "a reference value".to_string(), constraint, None)),
            },
            ConstraintKind::IsSequence => match current.kind {
                TyKind::Any => {
                    self.set(target, Ty::new(TyKind::Sequence, span));
                    Ok(())
                }
                TyKind::Referenced => {
                    self.set(target, Ty::new(TyKind::Indexed, span));
                    Ok(())
                }
                ref kind if kind.is_sequence() => Ok(()),
                _ => Err(invalid(&current, "a string or an array".to_string(), constraint, None)),
            },
            ConstraintKind::HasElement(elem) => match current.kind {
                TyKind::Any | TyKind::Referenced | TyKind::Indexed | TyKind::Sequence => {
                    self.set(target, Ty::new(TyKind::Array(*elem), span));
                    Ok(())
                }
                TyKind::Array(existing) => {
                    self.unify_at(existing, *elem, span, UnifyPath(vec![PathStep::Element]))
                }
                _ => Err(invalid(&current, "an array".to_string(), constraint, None)),
            },
            ConstraintKind::HasMember { name, ty } => match current.kind {
                TyKind::Any | TyKind::Referenced => {
                    let mut members = BTreeMap::new();
                    members.insert(name.clone(), *ty);
                    let object = ObjectTy {
                        members,
                        expandable: true,
                        order: None,
                    };
                    self.set(target, Ty::new(TyKind::Object(object), span));
                    Ok(())
                }
                TyKind::Object(mut object) => match object.members.get(name) {
                    Some(&existing) => self.unify_at(
                        existing,
                        *ty,
                        span,
                        UnifyPath(vec![PathStep::Member(name.clone())]),
                    ),
                    None if object.expandable => {
                        object.members.insert(name.clone(), *ty);
                        self.set(target, Ty::new(TyKind::Object(object), span));
                        Ok(())
                    }
                    None => Err(TypeError::InvalidType {
                        expected: format!("an object with a member `{}`", name),
                        found: format!("an object without a member `{}`", name),
                        span,
                        found_span: current.origin,
                        reason: None,
                    }),
                },
                _ => Err(invalid(&current, "an object".to_string(), constraint, None)),
            },
            ConstraintKind::LimitMembers(names) => match current.kind {
                TyKind::Any | TyKind::Referenced => {
                    let members = names.iter().map(|name| (name.clone(), self.fresh())).collect();
                    let object = ObjectTy {
                        members,
                        expandable: false,
                        order: None,
                    };
                    self.set(target, Ty::new(TyKind::Object(object), span));
                    Ok(())
                }
                TyKind::Object(mut object) => {
                    object.expandable = false;
                    self.set(
                        target,
                        Ty {
                            kind: TyKind::Object(object),
                            origin: current.origin,
                        },
                    );
                    Ok(())
                }
                _ => Err(invalid(&current, "an object".to_string(), constraint, None)),
            },
            ConstraintKind::HasSignature { args, returns } => match current.kind {
                TyKind::Any | TyKind::Referenced => {
                    let closure = ClosureTy {
                        args: args.clone(),
                        returns: *returns,
                    };
                    self.set(target, Ty::new(TyKind::Closure(closure), span));
                    Ok(())
                }
                TyKind::Closure(ref closure) if closure.args.len() == args.len() => {
                    for (i, (existing, arg)) in closure.args.iter().zip(args).enumerate() {
                        self.unify_at(*existing, *arg, span, UnifyPath(vec![PathStep::Argument(i)]))?;
                    }
                    self.unify_at(closure.returns, *returns, span, UnifyPath(vec![PathStep::Returns]))
                }
                TyKind::Closure(ref closure) => Err(TypeError::InvalidType {
                    expected: format!("a closure with {} arguments", args.len()),
                    found: format!("a closure with {} arguments", closure.args.len()),
                    span,
                    found_span: current.origin,
                    reason: None,
                }),
                _ => Err(invalid(&current, "a closure".to_string(), constraint, None)),
            },
            ConstraintKind::HasVariant { name, ty } => match current.kind {
                TyKind::Any => {
                    let mut variants = BTreeMap::new();
                    variants.insert(name.clone(), *ty);
                    let union = UnionTy {
                        variants,
                        expandable: true,
                    };
                    self.set(target, Ty::new(TyKind::Union(union), span));
                    Ok(())
                }
                TyKind::Union(mut union) => match union.variants.get(name) {
                    Some(&existing) => self.unify_at(
                        existing,
                        *ty,
                        span,
                        UnifyPath(vec![PathStep::Variant(name.clone())]),
                    ),
                    None if union.expandable => {
                        union.variants.insert(name.clone(), *ty);
                        self.set(target, Ty::new(TyKind::Union(union), span));
                        Ok(())
                    }
                    None => Err(TypeError::InvalidType {
                        expected: format!("a union with a variant `#{}`", name),
                        found: format!("a union without a variant `#{}`", name),
                        span,
                        found_span: current.origin,
                        reason: None,
                    }),
                },
                _ => Err(invalid(&current, "a union".to_string(), constraint, None)),
            },
            ConstraintKind::LimitVariants(names) => match current.kind {
                TyKind::Any => {
                    let variants = names.iter().map(|name| (name.clone(), self.fresh())).collect();
                    let union = UnionTy {
                        variants,
                        expandable: false,
                    };
                    self.set(target, Ty::new(TyKind::Union(union), span));
                    Ok(())
                }
                TyKind::Union(mut union) => {
                    if let Some(extra) = union.variants.keys().find(|name| !names.contains(*name)) {
                        let listed: Vec<String> = names.iter().map(|n| format!("#{}", n)).collect();
                        return Err(TypeError::InvalidType {
                            expected: format!("a union of only {}", listed.join(", ")),
                            found: format!("a union with a variant `#{}`", extra),
                            span,
                            found_span: current.origin,
                            reason: None,
                        });
                    }
                    union.expandable = false;
                    self.set(
                        target,
                        Ty {
                            kind: TyKind::Union(union),
                            origin: current.origin,
                        },
                    );
                    Ok(())
                }
                _ => Err(invalid(&current, "a union".to_string(), constraint, None)),
            },
            ConstraintKind::VariantsOfExcept { of, except } => {
                let source = self.get(*of);
                let source_union = match source.kind {
                    TyKind::Union(union) => union,
                    _ => return Err(invalid(&source, "a union".to_string(), constraint, None)),
                };
                let rest: BTreeMap<String, TyVar> = source_union
                    .variants
                    .into_iter()
                    .filter(|(name, _)| name != except)
                    .collect();
                match current.kind {
                    TyKind::Any => {
                        let union = UnionTy {
                            variants: rest,
                            expandable: true,
                        };
                        self.set(target, Ty::new(TyKind::Union(union), span));
                        Ok(())
                    }
                    TyKind::Union(mut union) => {
                        let mut shared = Vec::new();
                        for (name, payload) in rest {
                            match union.variants.get(&name) {
                                Some(&existing) => shared.push((name, existing, payload)),
                                None if union.expandable => {
                                    union.variants.insert(name, payload);
                                }
                                None => {
                                    return Err(TypeError::InvalidType {
                                        expected: format!("a union with a variant `#{}`", name),
                                        found: format!("a union without a variant `#{}`", name),
                                        span,
                                        found_span: current.origin,
                                        reason: None,
                                    })
                                }
                            }
                        }
                        self.set(
                            target,
                            Ty {
                                kind: TyKind::Union(union),
                                origin: current.origin,
                            },
                        );
                        for (name, existing, payload) in shared {
                            self.unify_at(
                                existing,
                                payload,
                                span,
                                UnifyPath(vec![PathStep::Variant(name)]),
                            )?;
                        }
                        Ok(())
                    }
                    _ => Err(invalid(&current, "a union".to_string(), constraint, None)),
                }
            }
            ConstraintKind::Unify(other) => self.unify(target, *other, span),
        }
    }
}
