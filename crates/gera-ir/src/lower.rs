//! Solved-tree-to-IR lowering.
//!
//! Converts the resolved `Node<TyVar>` bodies kept by the solver into
//! versioned instruction lists. There is no explicit control-flow graph:
//! branches nest their bodies inside the branching instruction and every
//! join is followed by the phis it needs.

use std::collections::BTreeMap;
use std::mem;

use gera_common::ast::{BinaryOp, Node, NodeKind, Target, UnaryOp};
use gera_common::{Path, Span};
use gera_typeck::symbols::SymbolKind;
use gera_typeck::ty::TyKind;
use gera_typeck::{Symbols, TypeContext, TyVar};
use rustc_hash::FxHashMap;

use crate::error::LowerError;
use crate::eval::ConstEvaluator;
use crate::ir::{Instr, InstrKind, IrContext, IrModule, IrVar, LoweredProcedure};
use crate::value::{StaticId, StaticValue, StaticValues};

type Variables = FxHashMap<String, IrVar>;

// ── Lowerer ────────────────────────────────────────────────────────────

pub(crate) struct Lowerer<'a> {
    symbols: &'a Symbols,
    ctx: &'a mut TypeContext,
    evaluator: &'a mut dyn ConstEvaluator,
    static_values: StaticValues,
    /// Hoisted values of module variables, evaluated once per variant.
    globals: FxHashMap<(Path, usize), StaticId>,
    /// Slots of the body being lowered.
    context: IrContext,
    /// Instructions of each open block, innermost last.
    blocks: Vec<Vec<Instr>>,
    /// Current version of every visible local, one map per open block.
    variables: Vec<Variables>,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(
        symbols: &'a Symbols,
        ctx: &'a mut TypeContext,
        evaluator: &'a mut dyn ConstEvaluator,
    ) -> Self {
        Lowerer {
            symbols,
            ctx,
            evaluator,
            static_values: StaticValues::new(),
            globals: FxHashMap::default(),
            context: IrContext::new(),
            blocks: Vec::new(),
            variables: Vec::new(),
        }
    }

    // ── Block management ───────────────────────────────────────────────

    /// Open a block seeded with the enclosing block's variables.
    fn enter_block(&mut self) {
        let seed = self.variables.last().cloned().unwrap_or_default();
        self.blocks.push(Vec::new());
        self.variables.push(seed);
    }

    fn exit_block(&mut self) -> (Vec<Instr>, Variables) {
        let body = self.blocks.pop().unwrap_or_default();
        let variables = self.variables.pop().unwrap_or_default();
        (body, variables)
    }

    fn emit(&mut self, kind: InstrKind, args: Vec<IrVar>, dest: Option<IrVar>) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(Instr::new(kind, args, dest));
        }
    }

    /// Emit an instruction into a fresh slot of type `ty`.
    fn emit_into(&mut self, ty: TyVar, kind: InstrKind, args: Vec<IrVar>) -> IrVar {
        let dest = self.context.allocate(ty);
        self.emit(kind, args, Some(dest));
        dest
    }

    fn bind(&mut self, name: &str, var: IrVar) {
        if let Some(variables) = self.variables.last_mut() {
            variables.insert(name.to_string(), var);
        }
    }

    fn lookup(&self, name: &str) -> Option<IrVar> {
        self.variables.last().and_then(|variables| variables.get(name).copied())
    }

    /// Whether some visible name already lives in `var`'s slot.
    fn is_bound(&self, var: IrVar) -> bool {
        self.variables
            .last()
            .is_some_and(|variables| variables.values().any(|bound| bound.slot == var.slot))
    }

    // ── Procedures ─────────────────────────────────────────────────────

    /// Lower a body into a fresh context, with `params` bound to argument
    /// slots of the given types.
    fn lower_body(
        &mut self,
        params: &[String],
        args: &[TyVar],
        body: &[Node<TyVar>],
    ) -> Result<(IrContext, Vec<Instr>), LowerError> {
        let outer_context = mem::take(&mut self.context);
        let outer_blocks = mem::take(&mut self.blocks);
        let outer_variables = mem::take(&mut self.variables);

        self.enter_block();
        for (name, &ty) in params.iter().zip(args) {
            let var = self.context.allocate_argument(ty);
            self.bind(name, var);
        }
        let lowered = self.lower_nodes(body);
        let (instrs, _) = self.exit_block();

        let context = mem::replace(&mut self.context, outer_context);
        self.blocks = outer_blocks;
        self.variables = outer_variables;
        lowered?;
        Ok((context, instrs))
    }

    fn lower_procedures(&mut self) -> Result<Vec<LoweredProcedure>, LowerError> {
        let symbols = self.symbols;
        let mut lowered = Vec::new();
        for (_, symbol) in symbols.iter() {
            let SymbolKind::Procedure(procedure) = &symbol.kind else {
                continue;
            };
            for (index, variant) in procedure.variants.iter().enumerate() {
                let Some(body) = &variant.body else {
                    continue;
                };
                let (context, body) = self.lower_body(&procedure.params, &variant.args, body)?;
                tracing::debug!(
                    "lowered {} variant {index}: {} slots, {} instructions",
                    symbol.path,
                    context.slots.len(),
                    body.len()
                );
                lowered.push(LoweredProcedure {
                    path: symbol.path.clone(),
                    variant: index,
                    args: variant.args.clone(),
                    returns: variant.returns,
                    context,
                    body,
                });
            }
        }
        Ok(lowered)
    }

    // ── Node lowering ──────────────────────────────────────────────────

    fn lower_nodes(&mut self, nodes: &[Node<TyVar>]) -> Result<(), LowerError> {
        for node in nodes {
            self.lower_node(node)?;
        }
        Ok(())
    }

    /// Lower a node used as a value. Statements evaluate to unit.
    fn lower_value(&mut self, node: &Node<TyVar>) -> Result<IrVar, LowerError> {
        match self.lower_node(node)? {
            Some(var) => Ok(var),
            None => Ok(self.emit_into(node.ty, InstrKind::LoadUnit, vec![])),
        }
    }

    fn lower_all(&mut self, nodes: &[Node<TyVar>]) -> Result<Vec<IrVar>, LowerError> {
        nodes.iter().map(|node| self.lower_value(node)).collect()
    }

    fn lower_node(&mut self, node: &Node<TyVar>) -> Result<Option<IrVar>, LowerError> {
        let ty = node.ty;
        let var = match &node.kind {
            NodeKind::Closure { params, body, info } => {
                let info = info.as_ref().ok_or(LowerError::Unresolved {
                    path: None,
                    span: node.span,
                })?;
                self.lower_closure(ty, params, body, &info.args, info.returns, &info.captures)?
            }
            NodeKind::Variable { name, value, .. } => {
                let var = match value {
                    Some(value) => {
                        let value = self.lower_value(value)?;
                        self.own(ty, value)
                    }
                    // Defined by a later assignment.
                    None => self.context.allocate(ty),
                };
                self.bind(name, var);
                return Ok(None);
            }
            NodeKind::CaseBranching {
                value,
                branch_values,
                branch_bodies,
                else_body,
            } => {
                let value = self.lower_value(value)?;
                let mut values = Vec::with_capacity(branch_values.len());
                for branch_value in branch_values {
                    let folded = self.evaluator.evaluate(branch_value, self.symbols)?;
                    values.push(self.static_values.add(folded));
                }
                let mut branches = Vec::with_capacity(branch_bodies.len());
                let mut arms = Vec::with_capacity(branch_bodies.len() + 1);
                for body in branch_bodies {
                    let (body, variables) = self.lower_arm(body, None)?;
                    branches.push(body);
                    arms.push(variables);
                }
                let (else_branch, variables) = self.lower_arm(else_body, None)?;
                arms.push(variables);
                self.emit(
                    InstrKind::BranchOnValue {
                        values,
                        branches,
                        else_branch,
                    },
                    vec![value],
                    None,
                );
                self.join(&arms);
                return Ok(None);
            }
            NodeKind::CaseConditional {
                condition,
                if_body,
                else_body,
            } => {
                let condition = self.lower_value(condition)?;
                let true_value = self.static_values.add(StaticValue::Boolean(true));
                let (if_branch, if_variables) = self.lower_arm(if_body, None)?;
                let (else_branch, else_variables) = self.lower_arm(else_body, None)?;
                self.emit(
                    InstrKind::BranchOnValue {
                        values: vec![true_value],
                        branches: vec![if_branch],
                        else_branch,
                    },
                    vec![condition],
                    None,
                );
                self.join(&[if_variables, else_variables]);
                return Ok(None);
            }
            NodeKind::CaseVariant {
                value,
                branches,
                else_body,
            } => {
                let value = self.lower_value(value)?;
                let mut variants = Vec::with_capacity(branches.len());
                let mut bindings = Vec::with_capacity(branches.len());
                let mut bodies = Vec::with_capacity(branches.len());
                let mut arms = Vec::with_capacity(branches.len() + 1);
                for branch in branches {
                    let binding = branch
                        .binding
                        .as_ref()
                        .map(|name| (name.as_str(), self.context.allocate(branch.payload)));
                    let (body, variables) = self.lower_arm(&branch.body, binding)?;
                    variants.push(branch.variant.clone());
                    bindings.push(binding.map(|(_, var)| var));
                    bodies.push(body);
                    arms.push(variables);
                }
                // Without an else body the match is exhaustive and the
                // fallback is unreachable.
                let else_branch = match else_body {
                    Some(body) => {
                        let (body, variables) = self.lower_arm(body, None)?;
                        arms.push(variables);
                        body
                    }
                    None => Vec::new(),
                };
                self.emit(
                    InstrKind::BranchOnVariant {
                        variants,
                        bindings,
                        branches: bodies,
                        else_branch,
                    },
                    vec![value],
                    None,
                );
                self.join(&arms);
                return Ok(None);
            }
            NodeKind::Assignment { target, value } => {
                let value = self.lower_value(value)?;
                self.lower_assignment(target, value)?;
                return Ok(None);
            }
            NodeKind::Return(value) => {
                let value = self.lower_value(value)?;
                self.emit(InstrKind::Return, vec![value], None);
                return Ok(None);
            }
            NodeKind::Call { called, args } => {
                let mut operands = vec![self.lower_value(called)?];
                operands.extend(self.lower_all(args)?);
                self.emit_into(ty, InstrKind::CallClosure, operands)
            }
            NodeKind::ProcedureCall { target, args } => {
                let (path, variant) = resolved(target, node.span)?;
                let operands = self.lower_all(args)?;
                self.emit_into(ty, InstrKind::CallProcedure { path, variant }, operands)
            }
            NodeKind::MethodCall {
                receiver,
                member,
                args,
            } => {
                let receiver_var = self.lower_value(receiver)?;
                let member_ty = self.member_type(receiver.ty, member, node.span)?;
                let called = self.emit_into(
                    member_ty,
                    InstrKind::ReadObject {
                        member: member.clone(),
                    },
                    vec![receiver_var],
                );
                let mut operands = vec![called, receiver_var];
                operands.extend(self.lower_all(args)?);
                self.emit_into(ty, InstrKind::CallClosure, operands)
            }
            NodeKind::ObjectLiteral(members) => {
                let mut names = Vec::with_capacity(members.len());
                let mut values = Vec::with_capacity(members.len());
                for (name, value) in members {
                    names.push(name.clone());
                    values.push(self.lower_value(value)?);
                }
                self.emit_into(ty, InstrKind::LoadObject { names }, values)
            }
            NodeKind::ArrayLiteral(values) => {
                let values = self.lower_all(values)?;
                self.emit_into(ty, InstrKind::LoadFixedArray, values)
            }
            NodeKind::RepeatingArrayLiteral { value, size } => {
                let value = self.lower_value(value)?;
                let size = self.lower_value(size)?;
                self.emit_into(ty, InstrKind::LoadRepeatArray, vec![value, size])
            }
            NodeKind::ObjectAccess { accessed, member } => {
                let accessed = self.lower_value(accessed)?;
                self.emit_into(
                    ty,
                    InstrKind::ReadObject {
                        member: member.clone(),
                    },
                    vec![accessed],
                )
            }
            NodeKind::ArrayAccess { accessed, index } => {
                let accessed = self.lower_value(accessed)?;
                let index = self.lower_value(index)?;
                self.emit_into(ty, InstrKind::ReadArray, vec![accessed, index])
            }
            NodeKind::Boolean(b) => self.emit_into(ty, InstrKind::LoadBoolean(*b), vec![]),
            NodeKind::Integer(i) => self.emit_into(ty, InstrKind::LoadInteger(*i), vec![]),
            NodeKind::Float(x) => self.emit_into(ty, InstrKind::LoadFloat(*x), vec![]),
            NodeKind::String(s) => self.emit_into(ty, InstrKind::LoadString(s.clone()), vec![]),
            NodeKind::Unit => self.emit_into(ty, InstrKind::LoadUnit, vec![]),
            NodeKind::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => self.lower_logical(ty, *op == BinaryOp::Or, left, right)?,
                _ => {
                    let left = self.lower_value(left)?;
                    let right = self.lower_value(right)?;
                    self.emit_into(ty, binary_instr(*op), vec![left, right])
                }
            },
            NodeKind::Unary { op, value } => {
                let value = self.lower_value(value)?;
                let kind = match op {
                    UnaryOp::Negate => InstrKind::Negate,
                    UnaryOp::Not => InstrKind::Not,
                };
                self.emit_into(ty, kind, vec![value])
            }
            NodeKind::VariantLiteral { variant, value } => {
                let value = self.lower_value(value)?;
                self.emit_into(
                    ty,
                    InstrKind::LoadVariant {
                        name: variant.clone(),
                    },
                    vec![value],
                )
            }
            NodeKind::VariantUnwrap { value, variant } => self.lower_unwrap(ty, value, variant)?,
            NodeKind::Static(value) => {
                let folded = self.evaluator.evaluate(value, self.symbols)?;
                let id = self.static_values.add(folded);
                self.emit_into(ty, InstrKind::LoadStaticValue(id), vec![])
            }
            NodeKind::VariableAccess(name) => match self.lookup(name) {
                Some(var) => var,
                None => self.emit_into(ty, InstrKind::ReadCapture { name: name.clone() }, vec![]),
            },
            NodeKind::GlobalAccess(target) => {
                let (path, variant) = resolved(target, node.span)?;
                self.lower_global(ty, path, variant, node.span)?
            }
            NodeKind::ModuleAccess(path) => {
                return Err(LowerError::Unresolved {
                    path: Some(path.clone()),
                    span: node.span,
                })
            }
            // The solver replaces procedure references with closures.
            NodeKind::ProcedureRef(target) => {
                return Err(LowerError::Unresolved {
                    path: resolved(target, node.span).ok().map(|(path, _)| path),
                    span: node.span,
                })
            }
        };
        Ok(Some(var))
    }

    /// Give a freshly declared name its own slot unless `value` already
    /// has one nobody else uses.
    fn own(&mut self, ty: TyVar, value: IrVar) -> IrVar {
        if self.is_bound(value) {
            self.emit_into(ty, InstrKind::Copy, vec![value])
        } else {
            value
        }
    }

    // ── Branches ───────────────────────────────────────────────────────

    /// Lower one branch arm in its own block, optionally binding a name to
    /// an already allocated variable first.
    fn lower_arm(
        &mut self,
        body: &[Node<TyVar>],
        binding: Option<(&str, IrVar)>,
    ) -> Result<(Vec<Instr>, Variables), LowerError> {
        self.enter_block();
        if let Some((name, var)) = binding {
            self.bind(name, var);
        }
        let lowered = self.lower_nodes(body);
        let arm = self.exit_block();
        lowered?;
        Ok(arm)
    }

    /// Merge the variables of each arm back into the current block.
    ///
    /// Every visible name that some arm changed gets one phi over the
    /// distinct versions the arms end with. Arms that left the name alone
    /// contribute its pre-branch version, and so do arms that only shadowed
    /// it with a declaration of their own.
    fn join(&mut self, arms: &[Variables]) {
        let Some(before) = self.variables.last() else {
            return;
        };
        let mut names: Vec<(String, IrVar)> = before
            .iter()
            .map(|(name, &var)| (name.clone(), var))
            .collect();
        names.sort();

        for (name, original) in names {
            let mut operands: Vec<IrVar> = Vec::with_capacity(arms.len());
            for arm in arms {
                let version = arm
                    .get(&name)
                    .copied()
                    .filter(|version| version.slot == original.slot)
                    .unwrap_or(original);
                if !operands.contains(&version) {
                    operands.push(version);
                }
            }
            match operands.as_slice() {
                [] => {}
                [only] if *only == original => {}
                [only] => {
                    let only = *only;
                    self.bind(&name, only);
                }
                _ => {
                    let merged = self.context.next_version(original);
                    self.emit(InstrKind::Phi, operands, Some(merged));
                    self.bind(&name, merged);
                }
            }
        }
    }

    /// `and`/`or` as a branch on the left value over a synthetic temporary.
    /// `or` keeps the left value when it is true, `and` when it is false.
    fn lower_logical(
        &mut self,
        ty: TyVar,
        is_or: bool,
        left: &Node<TyVar>,
        right: &Node<TyVar>,
    ) -> Result<IrVar, LowerError> {
        let left = self.lower_value(left)?;
        let result = self.context.allocate(ty);
        let short_circuit = self.static_values.add(StaticValue::Boolean(is_or));

        self.enter_block();
        let right = self.lower_value(right);
        let (mut right_branch, _) = self.exit_block();
        let right = right?;
        right_branch.push(Instr::new(InstrKind::Copy, vec![right], Some(result)));

        let from_left = self.context.next_version(result);
        let left_branch = vec![Instr::new(InstrKind::Copy, vec![left], Some(from_left))];
        self.emit(
            InstrKind::BranchOnValue {
                values: vec![short_circuit],
                branches: vec![left_branch],
                else_branch: right_branch,
            },
            vec![left],
            None,
        );
        let merged = self.context.next_version(result);
        self.emit(InstrKind::Phi, vec![from_left, result], Some(merged));
        Ok(merged)
    }

    /// Bind the payload of `variant`; any other variant is returned as is.
    fn lower_unwrap(&mut self, ty: TyVar, value: &Node<TyVar>, variant: &str) -> Result<IrVar, LowerError> {
        let value = self.lower_value(value)?;
        let payload = self.context.allocate(ty);
        self.emit(
            InstrKind::BranchOnVariant {
                variants: vec![variant.to_string()],
                bindings: vec![Some(payload)],
                branches: vec![Vec::new()],
                else_branch: vec![Instr::new(InstrKind::Return, vec![value], None)],
            },
            vec![value],
            None,
        );
        Ok(payload)
    }

    // ── Assignment ─────────────────────────────────────────────────────

    fn lower_assignment(&mut self, target: &Node<TyVar>, value: IrVar) -> Result<(), LowerError> {
        match &target.kind {
            NodeKind::VariableAccess(name) => match self.lookup(name) {
                Some(current) => {
                    let next = self.context.next_version(current);
                    self.emit(InstrKind::Copy, vec![value], Some(next));
                    self.bind(name, next);
                }
                None => self.emit(InstrKind::WriteCapture { name: name.clone() }, vec![value], None),
            },
            NodeKind::ObjectAccess { accessed, member } => {
                let accessed = self.lower_value(accessed)?;
                self.emit(
                    InstrKind::WriteObject {
                        member: member.clone(),
                    },
                    vec![accessed, value],
                    None,
                );
            }
            NodeKind::ArrayAccess { accessed, index } => {
                let accessed = self.lower_value(accessed)?;
                let index = self.lower_value(index)?;
                self.emit(InstrKind::WriteArray, vec![accessed, index, value], None);
            }
            NodeKind::GlobalAccess(Target::Resolved { path, .. }) | NodeKind::ModuleAccess(path) => {
                return Err(LowerError::Unresolved {
                    path: Some(path.clone()),
                    span: target.span,
                })
            }
            _ => {
                return Err(LowerError::Unresolved {
                    path: None,
                    span: target.span,
                })
            }
        }
        Ok(())
    }

    // ── Closures ───────────────────────────────────────────────────────

    /// Captures are passed as operands: locals of the current body
    /// directly, names the current body itself captured through a
    /// capture read. The closure body gets its own context.
    fn lower_closure(
        &mut self,
        ty: TyVar,
        params: &[String],
        body: &[Node<TyVar>],
        args: &[TyVar],
        returns: TyVar,
        captured: &BTreeMap<String, TyVar>,
    ) -> Result<IrVar, LowerError> {
        let mut captures = Vec::with_capacity(captured.len());
        let mut values = Vec::with_capacity(captured.len());
        for (name, &capture_ty) in captured {
            let value = match self.lookup(name) {
                Some(local) => {
                    self.context.mark_captured(local);
                    local
                }
                None => self.emit_into(capture_ty, InstrKind::ReadCapture { name: name.clone() }, vec![]),
            };
            captures.push(name.clone());
            values.push(value);
        }
        let (context, body) = self.lower_body(params, args, body)?;
        Ok(self.emit_into(
            ty,
            InstrKind::LoadClosure {
                args: args.to_vec(),
                returns,
                captures,
                context,
                body,
            },
            values,
        ))
    }

    // ── Module variables ───────────────────────────────────────────────

    fn lower_global(&mut self, ty: TyVar, path: Path, variant: usize, span: Span) -> Result<IrVar, LowerError> {
        let symbols = self.symbols;
        let value = symbols
            .lookup(&path)
            .and_then(|id| symbols.get(id).as_variable())
            .and_then(|variable| variable.variants.get(variant))
            .ok_or_else(|| LowerError::Unresolved {
                path: Some(path.clone()),
                span,
            })?;
        let Some(node) = &value.value else {
            return Ok(self.emit_into(ty, InstrKind::LoadExternal(path), vec![]));
        };
        let key = (path, variant);
        let id = match self.globals.get(&key) {
            Some(&id) => id,
            None => {
                let folded = self.evaluator.evaluate(node, symbols)?;
                let id = self.static_values.add(folded);
                self.globals.insert(key, id);
                id
            }
        };
        Ok(self.emit_into(ty, InstrKind::LoadStaticValue(id), vec![]))
    }

    // ── Type helpers ───────────────────────────────────────────────────

    fn member_type(&mut self, object: TyVar, member: &str, span: Span) -> Result<TyVar, LowerError> {
        let member = match self.ctx.kind(object) {
            TyKind::Object(object) => object.members.get(member).copied(),
            _ => None,
        };
        member.ok_or(LowerError::Unresolved { path: None, span })
    }
}

fn resolved(target: &Target, span: Span) -> Result<(Path, usize), LowerError> {
    match target {
        Target::Resolved { path, variant } => Ok((path.clone(), *variant)),
        Target::Pending(_) => Err(LowerError::Unresolved { path: None, span }),
    }
}

fn binary_instr(op: BinaryOp) -> InstrKind {
    match op {
        BinaryOp::Add => InstrKind::Add,
        BinaryOp::Subtract => InstrKind::Subtract,
        BinaryOp::Multiply => InstrKind::Multiply,
        BinaryOp::Divide => InstrKind::Divide,
        BinaryOp::Modulo => InstrKind::Modulo,
        BinaryOp::LessThan => InstrKind::LessThan,
        BinaryOp::GreaterThan => InstrKind::GreaterThan,
        BinaryOp::LessThanEqual => InstrKind::LessThanEqual,
        BinaryOp::GreaterThanEqual => InstrKind::GreaterThanEqual,
        BinaryOp::Equals => InstrKind::Equals,
        BinaryOp::NotEquals => InstrKind::NotEquals,
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are lowered as branches"),
    }
}

// ── Public API ─────────────────────────────────────────────────────────

/// Lower every kept procedure variant that has a body.
pub(crate) fn lower_module(lowerer: &mut Lowerer<'_>) -> Result<IrModule, LowerError> {
    let procedures = lowerer.lower_procedures()?;
    Ok(IrModule {
        procedures,
        static_values: mem::take(&mut lowerer.static_values),
    })
}
