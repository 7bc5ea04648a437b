//! Constraint solving and per-call-site specialization.
//!
//! Solving a symbol generates its constraints, applies them to the shared
//! [`TypeContext`], then walks the annotated body binding every deferred
//! usage to a concrete symbol variant. Referenced symbols are solved on
//! demand by ordinary recursion; a symbol already on the solving stack is
//! reused instead of solved again, which is how recursion terminates.

use std::collections::BTreeMap;

use gera_common::ast::{ClosureInfo, Node, NodeKind, Target, VariantBranch};
use gera_common::{Path, Span};

use crate::constraint::Constraint;
use crate::ctx::TypeContext;
use crate::error::{PathStep, TypeError, UnifyPath};
use crate::generate::{self, Generated, ProcedureUsage, Usages, UsageKind};
use crate::symbols::{
    ProcedureBody, ProcedureVariant, SymbolId, SymbolKind, Symbols, VariableValue,
    VariableVariant,
};
use crate::ty::{Ty, TyKind, TyVar};

/// The signature of one solved (or in-progress) symbol variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solved {
    pub variant: usize,
    pub args: Vec<TyVar>,
    pub returns: TyVar,
}

#[derive(Debug)]
struct Scope {
    symbol: SymbolId,
    variant: usize,
    args: Vec<TyVar>,
    returns: TyVar,
}

/// What resolving one body needs to know about its own solve.
struct Pending<'u> {
    usages: &'u Usages,
    from: &'u Path,
    keep: bool,
}

pub struct Solver<'a> {
    symbols: &'a mut Symbols,
    ctx: &'a mut TypeContext,
    scopes: Vec<Scope>,
}

impl<'a> Solver<'a> {
    pub fn new(symbols: &'a mut Symbols, ctx: &'a mut TypeContext) -> Self {
        Solver {
            symbols,
            ctx,
            scopes: Vec::new(),
        }
    }

    /// Solve any symbol. With `keep`, the solved variant is appended to the
    /// symbol and the variants of everything it references are kept too.
    pub fn solve_symbol(&mut self, id: SymbolId, keep: bool) -> Result<Solved, TypeError> {
        if self.symbols.get(id).as_procedure().is_some() {
            self.solve_procedure(id, keep, None)
        } else {
            self.solve_variable(id, keep)
        }
    }

    /// Solve a procedure, or return its in-progress signature if it is
    /// already being solved further up the stack.
    pub fn solve_procedure(
        &mut self,
        id: SymbolId,
        keep: bool,
        usage_span: Option<Span>,
    ) -> Result<Solved, TypeError> {
        if let Some(scope) = self.scopes.iter().find(|scope| scope.symbol == id) {
            return Ok(Solved {
                variant: scope.variant,
                args: scope.args.clone(),
                returns: scope.returns,
            });
        }
        let depth = self.scopes.len();
        let result = self.solve_procedure_fresh(id, keep, usage_span);
        self.scopes.truncate(depth);
        result
    }

    fn solve_procedure_fresh(
        &mut self,
        id: SymbolId,
        keep: bool,
        usage_span: Option<Span>,
    ) -> Result<Solved, TypeError> {
        let symbol = self.symbols.get(id);
        let path = symbol.path.clone();
        let SymbolKind::Procedure(procedure) = &symbol.kind else {
            return Err(TypeError::UnknownSymbol {
                path,
                span: usage_span.unwrap_or_default(),
            });
        };
        let variant = procedure.variants.len();
        let (generated, has_body) = match &procedure.body {
            ProcedureBody::Source(body) => (
                generate::generate_procedure(
                    &*self.symbols,
                    self.ctx,
                    &path,
                    &procedure.params,
                    body,
                    symbol.span,
                )?,
                true,
            ),
            ProcedureBody::Builtin(signature) => {
                let builtin = signature(self.ctx, usage_span.unwrap_or(symbol.span));
                let generated = Generated {
                    args: builtin.args,
                    returns: builtin.returns,
                    constraints: builtin.constraints,
                    usages: Usages::default(),
                    body: Vec::new(),
                };
                (generated, false)
            }
        };

        let Generated {
            args,
            returns,
            constraints,
            usages,
            body,
        } = generated;
        self.scopes.push(Scope {
            symbol: id,
            variant,
            args: args.clone(),
            returns,
        });
        self.apply_all(&constraints)?;
        let pending = Pending {
            usages: &usages,
            from: &path,
            keep,
        };
        let body = self.resolve_nodes(body, &pending)?;
        self.scopes.pop();

        if keep {
            if let SymbolKind::Procedure(procedure) = &mut self.symbols.get_mut(id).kind {
                procedure.variants.push(ProcedureVariant {
                    args: args.clone(),
                    returns,
                    body: has_body.then_some(body),
                });
            }
            tracing::debug!("solved {path} variant {variant}");
        }
        Ok(Solved {
            variant,
            args,
            returns,
        })
    }

    /// Solve a module-level variable. Variables have at most one variant.
    pub fn solve_variable(&mut self, id: SymbolId, keep: bool) -> Result<Solved, TypeError> {
        let depth = self.scopes.len();
        let result = self.solve_variable_fresh(id, keep);
        self.scopes.truncate(depth);
        result
    }

    fn solve_variable_fresh(&mut self, id: SymbolId, keep: bool) -> Result<Solved, TypeError> {
        let symbol = self.symbols.get(id);
        let path = symbol.path.clone();
        let span = symbol.span;
        if self.scopes.iter().any(|scope| scope.symbol == id) {
            return Err(TypeError::SelfReference { path, span });
        }
        let SymbolKind::Variable(variable) = &symbol.kind else {
            return Err(TypeError::UnknownSymbol { path, span });
        };
        if let Some(solved) = variable.variants.first() {
            return Ok(Solved {
                variant: 0,
                args: Vec::new(),
                returns: solved.ty,
            });
        }
        let (ty, value) = match &variable.value {
            VariableValue::External(declared) => (declared(self.ctx, span), None),
            VariableValue::Source(value) => {
                let generated = generate::generate_variable(&*self.symbols, self.ctx, &path, value)?;
                self.scopes.push(Scope {
                    symbol: id,
                    variant: 0,
                    args: Vec::new(),
                    returns: generated.returns,
                });
                self.apply_all(&generated.constraints)?;
                let pending = Pending {
                    usages: &generated.usages,
                    from: &path,
                    keep,
                };
                let value = self.resolve_nodes(generated.body, &pending)?;
                self.scopes.pop();
                (generated.returns, value.into_iter().next())
            }
        };
        if keep {
            if let SymbolKind::Variable(variable) = &mut self.symbols.get_mut(id).kind {
                variable.variants.push(VariableVariant { ty, value });
            }
            tracing::debug!("solved module variable {path}");
        }
        Ok(Solved {
            variant: 0,
            args: Vec::new(),
            returns: ty,
        })
    }

    fn apply_all(&mut self, constraints: &[Constraint]) -> Result<(), TypeError> {
        for constraint in constraints {
            tracing::trace!("apply {:?} to {}", constraint.kind, constraint.target);
            self.ctx.apply(constraint)?;
        }
        Ok(())
    }

    // ── Usages ─────────────────────────────────────────────────────────

    /// Unify a solved signature with the types at a call site.
    fn unify_call(
        &mut self,
        callee_args: &[TyVar],
        callee_returns: TyVar,
        usage: &ProcedureUsage,
        caller_args: &[TyVar],
        caller_returns: TyVar,
    ) -> Result<(), TypeError> {
        for (i, (&callee, &caller)) in callee_args.iter().zip(caller_args).enumerate() {
            let span = usage.arg_spans.get(i).copied().unwrap_or(usage.span);
            self.ctx
                .unify_at(callee, caller, span, UnifyPath(vec![PathStep::Argument(i)]))?;
        }
        self.ctx.unify_at(
            callee_returns,
            caller_returns,
            usage.span,
            UnifyPath(vec![PathStep::Returns]),
        )
    }

    /// Solve one overload candidate, unify it against copies of both
    /// signatures, and only then commit the unification to the originals.
    fn try_candidate(&mut self, id: SymbolId, usage: &ProcedureUsage, keep: bool) -> Result<usize, TypeError> {
        let solved = self.solve_procedure(id, keep, Some(usage.span))?;
        let arity = solved.args.len();
        let mut originals = solved.args.clone();
        originals.push(solved.returns);
        originals.extend(usage.args.iter().copied());
        originals.push(usage.returns);
        let copies = self.ctx.copy_all(&originals);
        let (callee, caller) = copies.split_at(arity + 1);
        self.unify_call(&callee[..arity], callee[arity], usage, &caller[..arity], caller[arity])?;
        self.unify_call(&solved.args, solved.returns, usage, &usage.args, usage.returns)?;
        Ok(solved.variant)
    }

    /// Bind a call to the most specific candidate that accepts it.
    fn resolve_call(&mut self, usage: &ProcedureUsage, pending: &Pending<'_>) -> Result<Target, TypeError> {
        let candidates = match usage.kind {
            UsageKind::Call => self.symbols.expand(&usage.path, pending.from),
            UsageKind::Reference => vec![usage.path.clone()],
        };
        let mut considered = Vec::new();
        let mut errors = Vec::new();
        for candidate in candidates.into_iter().rev() {
            let Some(id) = self.symbols.lookup(&candidate) else {
                continue;
            };
            let symbol = self.symbols.get(id);
            let Some(procedure) = symbol.as_procedure() else {
                continue;
            };
            considered.push(candidate.clone());
            if procedure.params.len() != usage.args.len() {
                errors.push(TypeError::ArgumentCount {
                    path: candidate,
                    expected: procedure.params.len(),
                    found: usage.args.len(),
                    span: usage.span,
                    declared: symbol.span,
                });
                continue;
            }
            let watermark = self.symbols.variant_watermark();
            match self.try_candidate(id, usage, pending.keep) {
                Ok(variant) => {
                    return Ok(Target::Resolved {
                        path: candidate,
                        variant,
                    })
                }
                Err(error) => {
                    self.symbols.rollback(&watermark);
                    tracing::debug!("rejected candidate {candidate}: {error}");
                    errors.push(error);
                }
            }
        }
        match errors.len() {
            0 => Err(TypeError::UnknownSymbol {
                path: usage.path.clone(),
                span: usage.span,
            }),
            1 => Err(errors.remove(0)),
            _ => Err(TypeError::NoViableCandidate {
                path: usage.path.clone(),
                span: usage.span,
                candidates: considered,
                errors,
            }),
        }
    }

    /// `core::math::pow` used as a value becomes `|x, n| return core::math::pow(x, n)`.
    fn forwarding_closure(
        &mut self,
        usage: &ProcedureUsage,
        pending: &Pending<'_>,
        ty: TyVar,
        span: Span,
    ) -> Result<Node<TyVar>, TypeError> {
        let target = self.resolve_call(usage, pending)?;
        let params = self
            .symbols
            .lookup(&usage.path)
            .and_then(|id| self.symbols.get(id).as_procedure())
            .map(|procedure| procedure.params.clone())
            .unwrap_or_default();
        let args = params
            .iter()
            .zip(&usage.args)
            .map(|(name, &arg)| Node {
                kind: NodeKind::VariableAccess(name.clone()),
                span,
                ty: arg,
            })
            .collect();
        let call = Node {
            kind: NodeKind::ProcedureCall { target, args },
            span,
            ty: usage.returns,
        };
        let unit = self.ctx.allocate(Ty::new(TyKind::Unit, span));
        let info = ClosureInfo {
            args: usage.args.clone(),
            returns: usage.returns,
            captures: BTreeMap::new(),
        };
        Ok(Node {
            kind: NodeKind::Closure {
                params,
                body: vec![Node {
                    kind: NodeKind::Return(Box::new(call)),
                    span,
                    ty: unit,
                }],
                info: Some(info),
            },
            span,
            ty,
        })
    }

    fn resolve_variable(&mut self, index: usize, pending: &Pending<'_>) -> Result<Target, TypeError> {
        let usage = &pending.usages.variables[index];
        let id = self
            .symbols
            .lookup(&usage.path)
            .ok_or_else(|| TypeError::UnknownSymbol {
                path: usage.path.clone(),
                span: usage.span,
            })?;
        let solved = self.solve_variable(id, pending.keep)?;
        self.ctx.unify(usage.ty, solved.returns, usage.span)?;
        Ok(Target::Resolved {
            path: usage.path.clone(),
            variant: solved.variant,
        })
    }

    // ── Body rewriting ─────────────────────────────────────────────────

    fn resolve_nodes(&mut self, nodes: Vec<Node<TyVar>>, pending: &Pending<'_>) -> Result<Vec<Node<TyVar>>, TypeError> {
        nodes.into_iter().map(|node| self.resolve(node, pending)).collect()
    }

    fn resolve_boxed(&mut self, node: Box<Node<TyVar>>, pending: &Pending<'_>) -> Result<Box<Node<TyVar>>, TypeError> {
        Ok(Box::new(self.resolve(*node, pending)?))
    }

    fn resolve(&mut self, node: Node<TyVar>, pending: &Pending<'_>) -> Result<Node<TyVar>, TypeError> {
        let Node { kind, span, ty } = node;
        let kind = match kind {
            NodeKind::ProcedureRef(Target::Pending(index)) => {
                let usage = &pending.usages.procedures[index];
                return self.forwarding_closure(usage, pending, ty, span);
            }
            NodeKind::ProcedureCall { target, args } => {
                let target = match target {
                    Target::Pending(index) => self.resolve_call(&pending.usages.procedures[index], pending)?,
                    resolved => resolved,
                };
                NodeKind::ProcedureCall {
                    target,
                    args: self.resolve_nodes(args, pending)?,
                }
            }
            NodeKind::GlobalAccess(Target::Pending(index)) => {
                NodeKind::GlobalAccess(self.resolve_variable(index, pending)?)
            }
            NodeKind::Closure { params, body, info } => NodeKind::Closure {
                params,
                body: self.resolve_nodes(body, pending)?,
                info,
            },
            NodeKind::Variable {
                name,
                mutable,
                value,
            } => NodeKind::Variable {
                name,
                mutable,
                value: value.map(|v| self.resolve_boxed(v, pending)).transpose()?,
            },
            NodeKind::CaseBranching {
                value,
                branch_values,
                branch_bodies,
                else_body,
            } => NodeKind::CaseBranching {
                value: self.resolve_boxed(value, pending)?,
                branch_values: self.resolve_nodes(branch_values, pending)?,
                branch_bodies: branch_bodies
                    .into_iter()
                    .map(|body| self.resolve_nodes(body, pending))
                    .collect::<Result<_, _>>()?,
                else_body: self.resolve_nodes(else_body, pending)?,
            },
            NodeKind::CaseConditional {
                condition,
                if_body,
                else_body,
            } => NodeKind::CaseConditional {
                condition: self.resolve_boxed(condition, pending)?,
                if_body: self.resolve_nodes(if_body, pending)?,
                else_body: self.resolve_nodes(else_body, pending)?,
            },
            NodeKind::CaseVariant {
                value,
                branches,
                else_body,
            } => NodeKind::CaseVariant {
                value: self.resolve_boxed(value, pending)?,
                branches: branches
                    .into_iter()
                    .map(|branch| {
                        Ok(VariantBranch {
                            body: self.resolve_nodes(branch.body, pending)?,
                            ..branch
                        })
                    })
                    .collect::<Result<_, TypeError>>()?,
                else_body: else_body
                    .map(|body| self.resolve_nodes(body, pending))
                    .transpose()?,
            },
            NodeKind::Assignment { target, value } => NodeKind::Assignment {
                target: self.resolve_boxed(target, pending)?,
                value: self.resolve_boxed(value, pending)?,
            },
            NodeKind::Return(value) => NodeKind::Return(self.resolve_boxed(value, pending)?),
            NodeKind::Call { called, args } => NodeKind::Call {
                called: self.resolve_boxed(called, pending)?,
                args: self.resolve_nodes(args, pending)?,
            },
            NodeKind::MethodCall {
                receiver,
                member,
                args,
            } => NodeKind::MethodCall {
                receiver: self.resolve_boxed(receiver, pending)?,
                member,
                args: self.resolve_nodes(args, pending)?,
            },
            NodeKind::ObjectLiteral(members) => NodeKind::ObjectLiteral(
                members
                    .into_iter()
                    .map(|(name, value)| Ok((name, self.resolve(value, pending)?)))
                    .collect::<Result<_, TypeError>>()?,
            ),
            NodeKind::ArrayLiteral(values) => NodeKind::ArrayLiteral(self.resolve_nodes(values, pending)?),
            NodeKind::RepeatingArrayLiteral { value, size } => NodeKind::RepeatingArrayLiteral {
                value: self.resolve_boxed(value, pending)?,
                size: self.resolve_boxed(size, pending)?,
            },
            NodeKind::ObjectAccess { accessed, member } => NodeKind::ObjectAccess {
                accessed: self.resolve_boxed(accessed, pending)?,
                member,
            },
            NodeKind::ArrayAccess { accessed, index } => NodeKind::ArrayAccess {
                accessed: self.resolve_boxed(accessed, pending)?,
                index: self.resolve_boxed(index, pending)?,
            },
            NodeKind::Binary { op, left, right } => NodeKind::Binary {
                op,
                left: self.resolve_boxed(left, pending)?,
                right: self.resolve_boxed(right, pending)?,
            },
            NodeKind::Unary { op, value } => NodeKind::Unary {
                op,
                value: self.resolve_boxed(value, pending)?,
            },
            NodeKind::VariantLiteral { variant, value } => NodeKind::VariantLiteral {
                variant,
                value: self.resolve_boxed(value, pending)?,
            },
            NodeKind::VariantUnwrap { value, variant } => NodeKind::VariantUnwrap {
                value: self.resolve_boxed(value, pending)?,
                variant,
            },
            NodeKind::Static(value) => NodeKind::Static(self.resolve_boxed(value, pending)?),
            kind @ (NodeKind::Boolean(_)
            | NodeKind::Integer(_)
            | NodeKind::Float(_)
            | NodeKind::String(_)
            | NodeKind::Unit
            | NodeKind::ModuleAccess(_)
            | NodeKind::VariableAccess(_)
            | NodeKind::GlobalAccess(Target::Resolved { .. })
            | NodeKind::ProcedureRef(Target::Resolved { .. })) => kind,
        };
        Ok(Node { kind, span, ty })
    }
}
