//! Constraint generation.
//!
//! One walk over a symbol's body allocates a type variable for every
//! expression, emits constraints in traversal order, checks definite
//! assignment and mutability, and records every reference to another
//! symbol as a deferred usage for the solver.
//!
//! Scoping is tracked as a stack of call frames (one per procedure or
//! closure), each holding a stack of lexical blocks.

use std::collections::{BTreeMap, BTreeSet};

use gera_common::ast::{BinaryOp, ClosureInfo, Node, NodeKind, Target, UnaryOp, VariantBranch};
use gera_common::{Path, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::constraint::{Constraint, ConstraintKind};
use crate::ctx::TypeContext;
use crate::error::{AssignmentKind, TypeError};
use crate::symbols::{SymbolKind, Symbols};
use crate::ty::{BaseKind, Ty, TyKind, TyVar};

const CONDITION: &str = "since it's used as a condition";
const ARRAY_SIZE: &str = "since it's used as the size for an array";
const ARRAY_INDEX: &str = "since it's used to index into an array";
const MISSING_RETURN: &str = "because the body does not always return a value";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageKind {
    /// `path(args)`; `path` is as written and may name several overloads.
    Call,
    /// A procedure used as a value; `path` is fully qualified.
    Reference,
}

#[derive(Clone, Debug)]
pub struct ProcedureUsage {
    pub path: Path,
    pub kind: UsageKind,
    pub args: Vec<TyVar>,
    pub arg_spans: Vec<Span>,
    pub returns: TyVar,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct VariableUsage {
    /// Fully qualified.
    pub path: Path,
    pub ty: TyVar,
    pub span: Span,
}

/// Deferred references, indexed by `Target::Pending`.
#[derive(Clone, Debug, Default)]
pub struct Usages {
    pub procedures: Vec<ProcedureUsage>,
    pub variables: Vec<VariableUsage>,
}

/// Everything generation produces for one symbol.
#[derive(Debug)]
pub struct Generated {
    pub args: Vec<TyVar>,
    pub returns: TyVar,
    pub constraints: Vec<Constraint>,
    pub usages: Usages,
    pub body: Vec<Node<TyVar>>,
}

#[derive(Clone, Copy, Debug)]
struct Local {
    ty: TyVar,
    initialized: bool,
    mutable: bool,
}

#[derive(Debug, Default)]
struct Block {
    locals: FxHashMap<String, Local>,
    /// Names declared outside this block that it definitely initializes.
    initializes: FxHashSet<String>,
    always_returns: bool,
}

#[derive(Debug)]
struct Frame {
    returns: TyVar,
    captures: BTreeSet<String>,
    blocks: Vec<Block>,
}

/// Generate constraints for a procedure body.
pub fn generate_procedure(
    symbols: &Symbols,
    ctx: &mut TypeContext,
    path: &Path,
    params: &[String],
    body: &[Node],
    span: Span,
) -> Result<Generated, TypeError> {
    let mut generator = Generator::new(symbols, ctx, path);
    let args: Vec<TyVar> = params.iter().map(|_| generator.ctx.fresh()).collect();
    let returns = generator.ctx.fresh();
    generator.enter_frame(params, &args, returns);
    let body = generator.walk_block(body)?;
    generator.exit_frame(span);
    Ok(generator.finish(args, returns, body))
}

/// Generate constraints for a module-level variable's initializer.
pub fn generate_variable(
    symbols: &Symbols,
    ctx: &mut TypeContext,
    path: &Path,
    value: &Node,
) -> Result<Generated, TypeError> {
    let mut generator = Generator::new(symbols, ctx, path);
    let value = generator.isolated(|g| g.walk(value))?;
    let returns = value.ty;
    Ok(generator.finish(Vec::new(), returns, vec![value]))
}

struct Generator<'a> {
    symbols: &'a Symbols,
    ctx: &'a mut TypeContext,
    /// The symbol being generated, for path expansion.
    path: Path,
    frames: Vec<Frame>,
    constraints: Vec<Constraint>,
    usages: Usages,
}

impl<'a> Generator<'a> {
    fn new(symbols: &'a Symbols, ctx: &'a mut TypeContext, path: &Path) -> Self {
        Generator {
            symbols,
            ctx,
            path: path.clone(),
            frames: Vec::new(),
            constraints: Vec::new(),
            usages: Usages::default(),
        }
    }

    fn finish(self, args: Vec<TyVar>, returns: TyVar, body: Vec<Node<TyVar>>) -> Generated {
        Generated {
            args,
            returns,
            constraints: self.constraints,
            usages: self.usages,
            body,
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn emit(&mut self, target: TyVar, span: Span, kind: ConstraintKind) {
        self.constraints.push(Constraint::new(target, span, kind));
    }

    fn typed(&mut self, base: BaseKind, span: Span) -> TyVar {
        let var = self.ctx.fresh();
        self.emit(var, span, ConstraintKind::IsType(base, None));
        var
    }

    fn unit(&mut self, span: Span) -> TyVar {
        self.ctx.allocate(Ty::new(TyKind::Unit, span))
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("walks always run inside a frame")
    }

    fn block(&mut self) -> &mut Block {
        self.frame()
            .blocks
            .last_mut()
            .expect("frames always have a block")
    }

    fn enter_frame(&mut self, params: &[String], args: &[TyVar], returns: TyVar) {
        let mut block = Block::default();
        for (name, &ty) in params.iter().zip(args) {
            block.locals.insert(
                name.clone(),
                Local {
                    ty,
                    initialized: true,
                    mutable: false,
                },
            );
        }
        self.frames.push(Frame {
            returns,
            captures: BTreeSet::new(),
            blocks: vec![block],
        });
    }

    /// Pop the current frame, returning the names it captures.
    fn exit_frame(&mut self, span: Span) -> BTreeSet<String> {
        let frame = self.frames.pop().expect("exit_frame without a frame");
        let always_returns = frame.blocks.first().is_some_and(|b| b.always_returns);
        if !always_returns {
            self.emit(
                frame.returns,
                span,
                ConstraintKind::IsType(BaseKind::Unit, Some(MISSING_RETURN)),
            );
        }
        frame.captures
    }

    fn enter_block(&mut self) {
        self.frame().blocks.push(Block::default());
    }

    fn exit_block(&mut self) -> Block {
        self.frame().blocks.pop().expect("exit_block without a block")
    }

    /// Run `f` with no enclosing locals visible.
    fn isolated<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, TypeError>) -> Result<R, TypeError> {
        let outer = std::mem::take(&mut self.frames);
        let returns = self.ctx.fresh();
        self.enter_frame(&[], &[], returns);
        let result = f(self);
        self.frames = outer;
        result
    }

    /// Merge the arms of a branch into the current block.
    fn handle_branches(&mut self, arms: Vec<Block>) {
        let mut initializes: Option<FxHashSet<String>> = None;
        let mut always_returns = true;
        for arm in arms {
            always_returns &= arm.always_returns;
            if arm.always_returns {
                continue;
            }
            initializes = Some(match initializes {
                None => arm.initializes,
                Some(current) => current.intersection(&arm.initializes).cloned().collect(),
            });
        }
        let block = self.block();
        for name in initializes.unwrap_or_default() {
            match block.locals.get_mut(&name) {
                Some(local) => local.initialized = true,
                None => {
                    block.initializes.insert(name);
                }
            }
        }
        block.always_returns |= always_returns;
    }

    fn find_local(&self, name: &str) -> Option<TyVar> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.blocks.iter().rev())
            .find_map(|block| block.locals.get(name).map(|local| local.ty))
    }

    /// Look up a local, checking initialization and mutability and
    /// recording captures. `Ok(None)` if no local has that name.
    fn access_local(&mut self, name: &str, span: Span, assigned: bool) -> Result<Option<TyVar>, TypeError> {
        let frame_count = self.frames.len();
        let mut initialized = false;
        for frame_index in (0..frame_count).rev() {
            let block_count = self.frames[frame_index].blocks.len();
            for block_index in (0..block_count).rev() {
                let block = &mut self.frames[frame_index].blocks[block_index];
                initialized |= block.initializes.contains(name);
                let Some(local) = block.locals.get_mut(name) else {
                    continue;
                };
                initialized |= local.initialized;
                if !assigned && !initialized {
                    return Err(TypeError::Uninitialized {
                        name: name.to_string(),
                        span,
                    });
                }
                if assigned && initialized && !local.mutable {
                    return Err(TypeError::InvalidAssignment {
                        target: name.to_string(),
                        kind: AssignmentKind::Immutable,
                        span,
                    });
                }
                let ty = local.ty;
                let is_current = frame_index == frame_count - 1 && block_index == block_count - 1;
                if is_current {
                    if assigned {
                        local.initialized = true;
                    }
                } else {
                    if assigned && !initialized {
                        self.block().initializes.insert(name.to_string());
                    }
                    for frame in &mut self.frames[frame_index + 1..] {
                        frame.captures.insert(name.to_string());
                    }
                }
                return Ok(Some(ty));
            }
        }
        Ok(None)
    }

    // ── Walking ────────────────────────────────────────────────────────

    fn walk_block(&mut self, nodes: &[Node]) -> Result<Vec<Node<TyVar>>, TypeError> {
        nodes.iter().map(|node| self.walk(node)).collect()
    }

    fn walk_boxed(&mut self, node: &Node) -> Result<Box<Node<TyVar>>, TypeError> {
        Ok(Box::new(self.walk(node)?))
    }

    /// Walk the body of one branch arm in its own block.
    fn walk_arm(&mut self, body: &[Node]) -> Result<(Vec<Node<TyVar>>, Block), TypeError> {
        self.enter_block();
        let body = self.walk_block(body)?;
        Ok((body, self.exit_block()))
    }

    fn walk(&mut self, node: &Node) -> Result<Node<TyVar>, TypeError> {
        let span = node.span;
        let (kind, ty) = match &node.kind {
            NodeKind::Closure { params, body, .. } => {
                let args: Vec<TyVar> = params.iter().map(|_| self.ctx.fresh()).collect();
                let returns = self.ctx.fresh();
                self.enter_frame(params, &args, returns);
                let body = self.walk_block(body)?;
                let captured = self.exit_frame(span);
                let captures: BTreeMap<String, TyVar> = captured
                    .into_iter()
                    .filter_map(|name| self.find_local(&name).map(|ty| (name, ty)))
                    .collect();
                let ty = self.ctx.fresh();
                self.emit(
                    ty,
                    span,
                    ConstraintKind::HasSignature {
                        args: args.clone(),
                        returns,
                    },
                );
                let info = ClosureInfo {
                    args,
                    returns,
                    captures,
                };
                (
                    NodeKind::Closure {
                        params: params.clone(),
                        body,
                        info: Some(info),
                    },
                    ty,
                )
            }
            NodeKind::Variable {
                name,
                mutable,
                value,
            } => {
                let value = value.as_deref().map(|v| self.walk_boxed(v)).transpose()?;
                let ty = match &value {
                    Some(value) => value.ty,
                    None => self.ctx.fresh(),
                };
                self.block().locals.insert(
                    name.clone(),
                    Local {
                        ty,
                        initialized: value.is_some(),
                        mutable: *mutable,
                    },
                );
                (
                    NodeKind::Variable {
                        name: name.clone(),
                        mutable: *mutable,
                        value,
                    },
                    ty,
                )
            }
            NodeKind::CaseBranching {
                value,
                branch_values,
                branch_bodies,
                else_body,
            } => {
                let value = self.walk_boxed(value)?;
                let mut values = Vec::with_capacity(branch_values.len());
                for branch_value in branch_values {
                    let branch_value = self.isolated(|g| g.walk(branch_value))?;
                    self.emit(value.ty, branch_value.span, ConstraintKind::Unify(branch_value.ty));
                    values.push(branch_value);
                }
                let mut arms = Vec::with_capacity(branch_bodies.len() + 1);
                let mut bodies = Vec::with_capacity(branch_bodies.len());
                for body in branch_bodies {
                    let (body, block) = self.walk_arm(body)?;
                    bodies.push(body);
                    arms.push(block);
                }
                let (else_body, else_block) = self.walk_arm(else_body)?;
                arms.push(else_block);
                self.handle_branches(arms);
                (
                    NodeKind::CaseBranching {
                        value,
                        branch_values: values,
                        branch_bodies: bodies,
                        else_body,
                    },
                    self.unit(span),
                )
            }
            NodeKind::CaseConditional {
                condition,
                if_body,
                else_body,
            } => {
                let condition = self.walk_boxed(condition)?;
                self.emit(
                    condition.ty,
                    condition.span,
                    ConstraintKind::IsType(BaseKind::Boolean, Some(CONDITION)),
                );
                let (if_body, if_block) = self.walk_arm(if_body)?;
                let (else_body, else_block) = self.walk_arm(else_body)?;
                self.handle_branches(vec![if_block, else_block]);
                (
                    NodeKind::CaseConditional {
                        condition,
                        if_body,
                        else_body,
                    },
                    self.unit(span),
                )
            }
            NodeKind::CaseVariant {
                value,
                branches,
                else_body,
            } => {
                let value = self.walk_boxed(value)?;
                let mut arms = Vec::with_capacity(branches.len() + 1);
                let mut walked = Vec::with_capacity(branches.len());
                for branch in branches {
                    let payload = self.ctx.fresh();
                    self.emit(
                        value.ty,
                        span,
                        ConstraintKind::HasVariant {
                            name: branch.variant.clone(),
                            ty: payload,
                        },
                    );
                    self.enter_block();
                    if let Some(binding) = &branch.binding {
                        self.block().locals.insert(
                            binding.clone(),
                            Local {
                                ty: payload,
                                initialized: true,
                                mutable: false,
                            },
                        );
                    }
                    let body = self.walk_block(&branch.body)?;
                    arms.push(self.exit_block());
                    walked.push(VariantBranch {
                        variant: branch.variant.clone(),
                        binding: branch.binding.clone(),
                        body,
                        payload,
                    });
                }
                let else_body = match else_body {
                    Some(body) => {
                        let (body, block) = self.walk_arm(body)?;
                        arms.push(block);
                        Some(body)
                    }
                    None => {
                        let names = branches.iter().map(|b| b.variant.clone()).collect();
                        self.emit(value.ty, span, ConstraintKind::LimitVariants(names));
                        None
                    }
                };
                self.handle_branches(arms);
                (
                    NodeKind::CaseVariant {
                        value,
                        branches: walked,
                        else_body,
                    },
                    self.unit(span),
                )
            }
            NodeKind::Assignment { target, value } => {
                let value = self.walk_boxed(value)?;
                let target = Box::new(self.walk_target(target)?);
                self.emit(target.ty, span, ConstraintKind::Unify(value.ty));
                (NodeKind::Assignment { target, value }, self.unit(span))
            }
            NodeKind::Return(value) => {
                let value = self.walk_boxed(value)?;
                let returns = self.frame().returns;
                self.emit(returns, value.span, ConstraintKind::Unify(value.ty));
                self.block().always_returns = true;
                (NodeKind::Return(value), self.unit(span))
            }
            NodeKind::Call { called, args } => {
                let procedure = match &called.kind {
                    NodeKind::ModuleAccess(path) => self.is_procedure_call(path).then(|| path.clone()),
                    _ => None,
                };
                match procedure {
                    Some(path) => self.walk_procedure_call(path, args, span)?,
                    None => {
                        let called = self.walk_boxed(called)?;
                        let args = self.walk_block(args)?;
                        let returns = self.ctx.fresh();
                        self.emit(
                            called.ty,
                            span,
                            ConstraintKind::HasSignature {
                                args: args.iter().map(|a| a.ty).collect(),
                                returns,
                            },
                        );
                        (NodeKind::Call { called, args }, returns)
                    }
                }
            }
            NodeKind::MethodCall {
                receiver,
                member,
                args,
            } => {
                let receiver = self.walk_boxed(receiver)?;
                let args = self.walk_block(args)?;
                let called = self.ctx.fresh();
                self.emit(
                    receiver.ty,
                    span,
                    ConstraintKind::HasMember {
                        name: member.clone(),
                        ty: called,
                    },
                );
                let returns = self.ctx.fresh();
                let mut arg_types = vec![receiver.ty];
                arg_types.extend(args.iter().map(|a| a.ty));
                self.emit(
                    called,
                    span,
                    ConstraintKind::HasSignature {
                        args: arg_types,
                        returns,
                    },
                );
                (
                    NodeKind::MethodCall {
                        receiver,
                        member: member.clone(),
                        args,
                    },
                    returns,
                )
            }
            NodeKind::ObjectLiteral(members) => {
                let ty = self.ctx.fresh();
                let mut walked = Vec::with_capacity(members.len());
                for (name, value) in members {
                    let value = self.walk(value)?;
                    self.emit(
                        ty,
                        value.span,
                        ConstraintKind::HasMember {
                            name: name.clone(),
                            ty: value.ty,
                        },
                    );
                    walked.push((name.clone(), value));
                }
                let names = members.iter().map(|(name, _)| name.clone()).collect();
                self.emit(ty, span, ConstraintKind::LimitMembers(names));
                (NodeKind::ObjectLiteral(walked), ty)
            }
            NodeKind::ArrayLiteral(values) => {
                let ty = self.ctx.fresh();
                let elem = self.ctx.fresh();
                self.emit(ty, span, ConstraintKind::HasElement(elem));
                let values = self.walk_block(values)?;
                for value in &values {
                    self.emit(elem, value.span, ConstraintKind::Unify(value.ty));
                }
                (NodeKind::ArrayLiteral(values), ty)
            }
            NodeKind::RepeatingArrayLiteral { value, size } => {
                let value = self.walk_boxed(value)?;
                let size = self.walk_boxed(size)?;
                let ty = self.ctx.fresh();
                self.emit(ty, span, ConstraintKind::HasElement(value.ty));
                self.emit(
                    size.ty,
                    size.span,
                    ConstraintKind::IsType(BaseKind::Integer, Some(ARRAY_SIZE)),
                );
                (NodeKind::RepeatingArrayLiteral { value, size }, ty)
            }
            NodeKind::ObjectAccess { accessed, member } => {
                let accessed = self.walk_boxed(accessed)?;
                let ty = self.ctx.fresh();
                self.emit(
                    accessed.ty,
                    span,
                    ConstraintKind::HasMember {
                        name: member.clone(),
                        ty,
                    },
                );
                (
                    NodeKind::ObjectAccess {
                        accessed,
                        member: member.clone(),
                    },
                    ty,
                )
            }
            NodeKind::ArrayAccess { accessed, index } => {
                let accessed = self.walk_boxed(accessed)?;
                let index = self.walk_boxed(index)?;
                let ty = self.ctx.fresh();
                self.emit(accessed.ty, span, ConstraintKind::HasElement(ty));
                self.emit(
                    index.ty,
                    index.span,
                    ConstraintKind::IsType(BaseKind::Integer, Some(ARRAY_INDEX)),
                );
                (NodeKind::ArrayAccess { accessed, index }, ty)
            }
            NodeKind::Boolean(value) => (NodeKind::Boolean(*value), self.typed(BaseKind::Boolean, span)),
            NodeKind::Integer(value) => (NodeKind::Integer(*value), self.typed(BaseKind::Integer, span)),
            NodeKind::Float(value) => (NodeKind::Float(*value), self.typed(BaseKind::Float, span)),
            NodeKind::String(value) => (NodeKind::String(value.clone()), self.typed(BaseKind::String, span)),
            NodeKind::Unit => (NodeKind::Unit, self.typed(BaseKind::Unit, span)),
            NodeKind::Binary { op, left, right } => {
                let left = self.walk_boxed(left)?;
                let right = self.walk_boxed(right)?;
                let ty = if op.is_arithmetic() {
                    self.emit(left.ty, span, ConstraintKind::IsNumeric);
                    self.emit(left.ty, span, ConstraintKind::Unify(right.ty));
                    left.ty
                } else if op.is_comparison() {
                    self.emit(left.ty, span, ConstraintKind::IsNumeric);
                    self.emit(left.ty, span, ConstraintKind::Unify(right.ty));
                    self.typed(BaseKind::Boolean, span)
                } else if op.is_equality() {
                    self.emit(left.ty, span, ConstraintKind::Unify(right.ty));
                    self.typed(BaseKind::Boolean, span)
                } else {
                    debug_assert!(matches!(op, BinaryOp::And | BinaryOp::Or));
                    self.emit(
                        left.ty,
                        left.span,
                        ConstraintKind::IsType(BaseKind::Boolean, None),
                    );
                    self.emit(left.ty, span, ConstraintKind::Unify(right.ty));
                    left.ty
                };
                (NodeKind::Binary { op: *op, left, right }, ty)
            }
            NodeKind::Unary { op, value } => {
                let value = self.walk_boxed(value)?;
                match op {
                    UnaryOp::Negate => self.emit(value.ty, span, ConstraintKind::IsNumeric),
                    UnaryOp::Not => self.emit(value.ty, span, ConstraintKind::IsType(BaseKind::Boolean, None)),
                }
                let ty = value.ty;
                (NodeKind::Unary { op: *op, value }, ty)
            }
            NodeKind::ModuleAccess(path) => return self.walk_access(path, span, false),
            NodeKind::VariantLiteral { variant, value } => {
                let value = self.walk_boxed(value)?;
                let ty = self.ctx.fresh();
                self.emit(
                    ty,
                    span,
                    ConstraintKind::HasVariant {
                        name: variant.clone(),
                        ty: value.ty,
                    },
                );
                (
                    NodeKind::VariantLiteral {
                        variant: variant.clone(),
                        value,
                    },
                    ty,
                )
            }
            NodeKind::VariantUnwrap { value, variant } => {
                let value = self.walk_boxed(value)?;
                let ty = self.ctx.fresh();
                self.emit(
                    value.ty,
                    span,
                    ConstraintKind::HasVariant {
                        name: variant.clone(),
                        ty,
                    },
                );
                let returns = self.frame().returns;
                self.emit(
                    returns,
                    span,
                    ConstraintKind::VariantsOfExcept {
                        of: value.ty,
                        except: variant.clone(),
                    },
                );
                (
                    NodeKind::VariantUnwrap {
                        value,
                        variant: variant.clone(),
                    },
                    ty,
                )
            }
            NodeKind::Static(value) => {
                let value = self.isolated(|g| g.walk(value))?;
                let ty = value.ty;
                (NodeKind::Static(Box::new(value)), ty)
            }
            NodeKind::VariableAccess(name) => {
                return self.walk_access(&Path::single(name.clone()), span, false)
            }
            NodeKind::GlobalAccess(target) | NodeKind::ProcedureRef(target) => {
                let path = resolved_path(target, span)?;
                return self.walk_access(&path, span, false);
            }
            NodeKind::ProcedureCall { target, args } => {
                let path = resolved_path(target, span)?;
                self.walk_procedure_call(path, args, span)?
            }
        };
        Ok(Node { kind, span, ty })
    }

    /// A call through a path is a procedure call unless a local or a
    /// module-level variable by that name is in scope.
    fn is_procedure_call(&self, path: &Path) -> bool {
        if let Some(name) = path.as_local() {
            if self.find_local(name).is_some() {
                return false;
            }
        }
        match self.symbols.resolve(path, &self.path) {
            Some(id) => !matches!(self.symbols.get(id).kind, SymbolKind::Variable(_)),
            None => true,
        }
    }

    fn walk_procedure_call(
        &mut self,
        path: Path,
        args: &[Node],
        span: Span,
    ) -> Result<(NodeKind<TyVar>, TyVar), TypeError> {
        let args = self.walk_block(args)?;
        let returns = self.ctx.fresh();
        let index = self.usages.procedures.len();
        self.usages.procedures.push(ProcedureUsage {
            path,
            kind: UsageKind::Call,
            args: args.iter().map(|a| a.ty).collect(),
            arg_spans: args.iter().map(|a| a.span).collect(),
            returns,
            span,
        });
        Ok((
            NodeKind::ProcedureCall {
                target: Target::Pending(index),
                args,
            },
            returns,
        ))
    }

    fn walk_target(&mut self, target: &Node) -> Result<Node<TyVar>, TypeError> {
        match &target.kind {
            NodeKind::ModuleAccess(path) => self.walk_access(path, target.span, true),
            NodeKind::VariableAccess(name) => self.walk_access(&Path::single(name.clone()), target.span, true),
            NodeKind::ObjectAccess { .. } | NodeKind::ArrayAccess { .. } => self.walk(target),
            _ => Err(TypeError::InvalidAssignment {
                target: "this expression".to_string(),
                kind: AssignmentKind::NotAssignable,
                span: target.span,
            }),
        }
    }

    /// A name or path, read or (if `assigned`) written.
    fn walk_access(&mut self, path: &Path, span: Span, assigned: bool) -> Result<Node<TyVar>, TypeError> {
        if let Some(name) = path.as_local() {
            if let Some(ty) = self.access_local(name, span, assigned)? {
                return Ok(Node {
                    kind: NodeKind::VariableAccess(name.to_string()),
                    span,
                    ty,
                });
            }
        }
        let id = self
            .symbols
            .resolve(path, &self.path)
            .ok_or_else(|| TypeError::UnknownSymbol {
                path: path.clone(),
                span,
            })?;
        let symbol = self.symbols.get(id);
        let full_path = symbol.path.clone();
        match &symbol.kind {
            SymbolKind::Variable(_) => {
                if assigned {
                    return Err(TypeError::InvalidAssignment {
                        target: full_path.to_string(),
                        kind: AssignmentKind::ModuleVariable,
                        span,
                    });
                }
                let ty = self.ctx.fresh();
                let index = self.usages.variables.len();
                self.usages.variables.push(VariableUsage {
                    path: full_path,
                    ty,
                    span,
                });
                Ok(Node {
                    kind: NodeKind::GlobalAccess(Target::Pending(index)),
                    span,
                    ty,
                })
            }
            SymbolKind::Procedure(procedure) => {
                if assigned {
                    return Err(TypeError::InvalidAssignment {
                        target: full_path.to_string(),
                        kind: AssignmentKind::Procedure,
                        span,
                    });
                }
                let arity = procedure.params.len();
                let args: Vec<TyVar> = (0..arity).map(|_| self.ctx.fresh()).collect();
                let returns = self.ctx.fresh();
                let ty = self.ctx.fresh();
                self.emit(
                    ty,
                    span,
                    ConstraintKind::HasSignature {
                        args: args.clone(),
                        returns,
                    },
                );
                let index = self.usages.procedures.len();
                self.usages.procedures.push(ProcedureUsage {
                    path: full_path,
                    kind: UsageKind::Reference,
                    args,
                    arg_spans: vec![span; arity],
                    returns,
                    span,
                });
                Ok(Node {
                    kind: NodeKind::ProcedureRef(Target::Pending(index)),
                    span,
                    ty,
                })
            }
        }
    }
}

fn resolved_path(target: &Target, span: Span) -> Result<Path, TypeError> {
    match target {
        Target::Resolved { path, .. } => Ok(path.clone()),
        Target::Pending(_) => Err(TypeError::UnknownSymbol {
            path: Path::default(),
            span,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_common::build::*;

    fn generate(params: &[&str], body: Vec<Node>) -> Result<Generated, TypeError> {
        let symbols = Symbols::new();
        let mut ctx = TypeContext::new();
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        generate_procedure(&symbols, &mut ctx, &Path::parse("test::f"), &params, &body, Span::default())
    }

    #[test]
    fn literal_emits_is_type() {
        let generated = generate(&[], vec![ret(int(1))]).unwrap();
        assert!(generated
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::IsType(BaseKind::Integer, None)));
    }

    #[test]
    fn missing_return_constrains_unit() {
        let generated = generate(&[], vec![let_("x", int(1))]).unwrap();
        let last = generated.constraints.last().unwrap();
        assert_eq!(last.target, generated.returns);
        assert_eq!(last.kind, ConstraintKind::IsType(BaseKind::Unit, Some(MISSING_RETURN)));
    }

    #[test]
    fn both_arms_initialize() {
        let body = vec![
            declare("x", true),
            case_if(boolean(true), vec![assign(name("x"), int(1))], vec![assign(name("x"), int(2))]),
            ret(name("x")),
        ];
        assert!(generate(&[], body).is_ok());
    }

    #[test]
    fn one_arm_is_not_enough() {
        let body = vec![
            declare("x", true),
            case_if(boolean(true), vec![assign(name("x"), int(1))], vec![]),
            ret(name("x")),
        ];
        assert!(matches!(generate(&[], body), Err(TypeError::Uninitialized { .. })));
    }

    #[test]
    fn returning_arm_does_not_block_initialization() {
        let body = vec![
            declare("x", false),
            case_if(boolean(true), vec![ret(int(0))], vec![assign(name("x"), int(2))]),
            ret(name("x")),
        ];
        assert!(generate(&[], body).is_ok());
    }

    #[test]
    fn immutable_reassignment_fails() {
        let body = vec![let_("x", int(1)), assign(name("x"), int(2))];
        match generate(&[], body) {
            Err(TypeError::InvalidAssignment { kind, .. }) => assert_eq!(kind, AssignmentKind::Immutable),
            other => panic!("expected InvalidAssignment, got {:?}", other),
        }
    }

    #[test]
    fn deferred_initialization_of_immutable() {
        let body = vec![declare("x", false), assign(name("x"), int(2)), ret(name("x"))];
        assert!(generate(&[], body).is_ok());
    }

    #[test]
    fn closure_records_captures() {
        let body = vec![
            mut_("count", int(0)),
            let_("inc", closure(&[], vec![assign(name("count"), add(name("count"), int(1)))])),
        ];
        let generated = generate(&[], body).unwrap();
        let NodeKind::Variable { value: Some(value), .. } = &generated.body[1].kind else {
            panic!("expected a variable declaration");
        };
        let NodeKind::Closure { info: Some(info), .. } = &value.kind else {
            panic!("expected a closure");
        };
        assert_eq!(info.captures.keys().collect::<Vec<_>>(), ["count"]);
    }

    #[test]
    fn local_shadows_procedure_call() {
        let body = vec![let_("f", closure(&[], vec![])), call_path("f", vec![])];
        let generated = generate(&[], body).unwrap();
        assert!(generated.usages.procedures.is_empty());
        assert!(matches!(generated.body[1].kind, NodeKind::Call { .. }));
    }

    #[test]
    fn procedure_call_is_deferred() {
        let generated = generate(&["n"], vec![ret(call_path("f", vec![name("n")]))]).unwrap();
        assert_eq!(generated.usages.procedures.len(), 1);
        assert_eq!(generated.usages.procedures[0].kind, UsageKind::Call);
    }

    #[test]
    fn unknown_name_fails() {
        assert!(matches!(
            generate(&[], vec![ret(name("nowhere"))]),
            Err(TypeError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn static_cannot_see_locals() {
        let body = vec![let_("x", int(1)), ret(static_(name("x")))];
        assert!(matches!(generate(&[], body), Err(TypeError::UnknownSymbol { .. })));
    }

    #[test]
    fn case_variant_without_else_limits_variants() {
        let body = vec![case_variant(
            name("v"),
            vec![("a", None, vec![]), ("b", None, vec![])],
            None,
        )];
        let generated = generate(&["v"], body).unwrap();
        assert!(generated
            .constraints
            .iter()
            .any(|c| matches!(&c.kind, ConstraintKind::LimitVariants(names) if names.len() == 2)));
    }
}
