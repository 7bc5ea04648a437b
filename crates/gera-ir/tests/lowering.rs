//! Integration tests for IR lowering.
//!
//! Each test builds a program with `gera_common::build`, type checks it
//! with `app::main` as the entry point, lowers it and asserts on the
//! rendered or inspected instruction lists.

use gera_common::ast::{Node, NodeKind, Target};
use gera_common::build::*;
use gera_common::Span;
use gera_ir::ir::{render, visit};
use gera_ir::types::resolve;
use gera_ir::{
    lower_program, lower_program_with, ConstEvaluator, Instr, InstrKind, IrModule, IrType, LowerError, StaticValue,
};
use gera_typeck::symbols::{ProcedureVariant, SymbolKind};
use gera_typeck::{check, CheckConfig, Symbols, Ty, TyKind, TyVar, TypeContext};

// ── Helpers ────────────────────────────────────────────────────────────

struct Program {
    symbols: Symbols,
    ctx: TypeContext,
}

impl Program {
    fn new() -> Self {
        Program {
            symbols: Symbols::new(),
            ctx: TypeContext::new(),
        }
    }

    fn procedure(mut self, path: &str, params: &[&str], body: Vec<Node>) -> Self {
        self.symbols.add_procedure(path, Span::default(), params, body);
        self
    }

    fn variable(mut self, path: &str, value: Node) -> Self {
        self.symbols.add_variable(path, Span::default(), value);
        self
    }

    fn check(&mut self) {
        let result = check(&mut self.symbols, &mut self.ctx, &CheckConfig::with_entry("app::main"));
        assert!(result.is_ok(), "expected no errors, got: {:?}", result.errors);
    }

    fn lower(&mut self) -> IrModule {
        self.check();
        lower_program(&self.symbols, &mut self.ctx).expect("lowering failed")
    }
}

fn main_with(body: Vec<Node>) -> Program {
    Program::new().procedure("app::main", &[], body)
}

fn body_of<'a>(module: &'a IrModule, path: &str) -> &'a [Instr] {
    &module
        .procedure(path, 0)
        .unwrap_or_else(|| panic!("`{}` was not lowered", path))
        .body
}

/// Every instruction of `body` matching `pred`, including nested branches.
fn find<'a>(body: &'a [Instr], pred: impl Fn(&InstrKind) -> bool) -> Vec<&'a Instr> {
    let mut found = Vec::new();
    visit(body, &mut |instr| {
        if pred(&instr.kind) {
            found.push(instr);
        }
    });
    found
}

fn phis(body: &[Instr]) -> Vec<&Instr> {
    find(body, |kind| matches!(kind, InstrKind::Phi))
}

// ── Branch Joins ───────────────────────────────────────────────────────

#[test]
fn test_if_else_yields_one_branch_and_one_phi() {
    let mut program = main_with(vec![
        declare("r", true),
        case_if(
            boolean(true),
            vec![assign(name("r"), int(1))],
            vec![assign(name("r"), int(2))],
        ),
        ret(name("r")),
    ]);
    let module = program.lower();
    let body = body_of(&module, "app::main");

    let branches = find(body, |kind| matches!(kind, InstrKind::BranchOnValue { .. }));
    assert_eq!(branches.len(), 1);
    let InstrKind::BranchOnValue { branches: arms, .. } = &branches[0].kind else {
        unreachable!()
    };
    assert_eq!(arms.len(), 1);

    let phis = phis(body);
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].args.len(), 2);

    insta::assert_snapshot!(render(body), @r"
    v1.0 = load_boolean true
    branch_on_value v1.0
      case s0:
        v2.0 = load_integer 1
        v0.1 = copy v2.0
      else:
        v3.0 = load_integer 2
        v0.2 = copy v3.0
    v0.3 = phi v0.1, v0.2
    return v0.3
    ");
}

#[test]
fn test_one_arm_mutation_merges_with_pre_branch_version() {
    let mut program = main_with(vec![
        mut_("x", int(0)),
        case_if(boolean(true), vec![assign(name("x"), int(1))], vec![]),
        ret(name("x")),
    ]);
    let module = program.lower();
    let body = body_of(&module, "app::main");
    insta::assert_snapshot!(render(body), @r"
    v0.0 = load_integer 0
    v1.0 = load_boolean true
    branch_on_value v1.0
      case s0:
        v2.0 = load_integer 1
        v0.1 = copy v2.0
      else:
    v0.2 = phi v0.1, v0.0
    return v0.2
    ");
}

#[test]
fn test_untouched_names_get_no_phi() {
    let mut program = main_with(vec![
        let_("a", int(1)),
        mut_("b", int(2)),
        case_if(boolean(false), vec![assign(name("b"), int(3))], vec![]),
        ret(add(name("a"), name("b"))),
    ]);
    let module = program.lower();
    let phis = phis(body_of(&module, "app::main"));
    assert_eq!(phis.len(), 1);
    // Only `b` changed; `a` lives in slot 0.
    assert!(phis[0].args.iter().all(|arg| arg.slot == 1));
}

#[test]
fn test_arm_local_shadowing_does_not_leak() {
    let mut program = main_with(vec![
        mut_("x", int(1)),
        case_if(boolean(true), vec![let_("x", string("s"))], vec![]),
        ret(name("x")),
    ]);
    let module = program.lower();
    let body = body_of(&module, "app::main");
    assert_eq!(phis(body).len(), 0);
    insta::assert_snapshot!(render(body), @r#"
    v0.0 = load_integer 1
    v1.0 = load_boolean true
    branch_on_value v1.0
      case s0:
        v2.0 = load_string "s"
      else:
    return v0.0
    "#);
}

#[test]
fn test_shadowing_arm_contributes_pre_branch_version() {
    let mut program = main_with(vec![
        mut_("x", int(1)),
        case_if(
            boolean(true),
            vec![let_("x", string("s"))],
            vec![assign(name("x"), int(2))],
        ),
        ret(name("x")),
    ]);
    let module = program.lower();
    let phis = phis(body_of(&module, "app::main"));
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].args.len(), 2);
    assert!(phis[0].args.iter().all(|arg| arg.slot == 0));
}

#[test]
fn test_exhaustive_variant_match_has_no_fallback_operand() {
    let mut program = main_with(vec![
        declare("r", true),
        case_variant(
            variant("some", int(1)),
            vec![
                ("some", Some("x"), vec![assign(name("r"), name("x"))]),
                ("none", None, vec![assign(name("r"), int(0))]),
            ],
            None,
        ),
        ret(name("r")),
    ]);
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v1.0 = load_integer 1
    v2.0 = load_variant #some v1.0
    branch_on_variant v2.0
      case #some v3.0:
        v0.1 = copy v3.0
      case #none:
        v4.0 = load_integer 0
        v0.2 = copy v4.0
    v0.3 = phi v0.1, v0.2
    return v0.3
    ");
}

#[test]
fn test_variant_match_with_else_includes_fallback() {
    let mut program = main_with(vec![
        mut_("r", int(-1)),
        case_variant(
            variant("some", int(1)),
            vec![("some", Some("x"), vec![assign(name("r"), name("x"))])],
            Some(vec![]),
        ),
        ret(name("r")),
    ]);
    let module = program.lower();
    let phis = phis(body_of(&module, "app::main"));
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].args.len(), 2);
    assert!(phis[0].args.iter().any(|arg| arg.version == 0));
}

#[test]
fn test_value_match_folds_branch_values() {
    let mut program = main_with(vec![
        mut_("r", string("other")),
        case_value(
            int(2),
            vec![
                (int(1), vec![assign(name("r"), string("one"))]),
                (int(2), vec![assign(name("r"), string("two"))]),
            ],
            vec![],
        ),
        ret(name("r")),
    ]);
    let module = program.lower();
    let body = body_of(&module, "app::main");
    let branches = find(body, |kind| matches!(kind, InstrKind::BranchOnValue { .. }));
    let InstrKind::BranchOnValue { values, .. } = &branches[0].kind else {
        unreachable!()
    };
    let folded: Vec<&StaticValue> = values.iter().map(|&id| module.static_values.get(id)).collect();
    assert_eq!(folded, [&StaticValue::Integer(1), &StaticValue::Integer(2)]);
    // Two assigning arms plus the untouched else arm.
    assert_eq!(phis(body)[0].args.len(), 3);
}

// ── Logical Operators ──────────────────────────────────────────────────

#[test]
fn test_or_lowers_to_branch_and_phi() {
    let mut program = main_with(vec![ret(or(boolean(false), boolean(true)))]);
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_boolean false
    branch_on_value v0.0
      case s0:
        v1.1 = copy v0.0
      else:
        v2.0 = load_boolean true
        v1.0 = copy v2.0
    v1.2 = phi v1.1, v1.0
    return v1.2
    ");
    assert_eq!(module.static_values.get(gera_ir::StaticId(0)), &StaticValue::Boolean(true));
}

#[test]
fn test_and_short_circuits_on_false() {
    let mut program = main_with(vec![ret(and(boolean(true), boolean(false)))]);
    let module = program.lower();
    let body = body_of(&module, "app::main");
    let branches = find(body, |kind| matches!(kind, InstrKind::BranchOnValue { .. }));
    let InstrKind::BranchOnValue { values, .. } = &branches[0].kind else {
        unreachable!()
    };
    assert_eq!(module.static_values.get(values[0]), &StaticValue::Boolean(false));
    assert_eq!(phis(body).len(), 1);
}

// ── Closures ───────────────────────────────────────────────────────────

#[test]
fn test_closure_captures_are_read_and_written_by_name() {
    let mut program = main_with(vec![
        mut_("count", int(0)),
        let_(
            "inc",
            closure(&[], vec![assign(name("count"), add(name("count"), int(1)))]),
        ),
        call_path("inc", vec![]),
        ret(name("count")),
    ]);
    let module = program.lower();
    let main = module.procedure("app::main", 0).unwrap();
    insta::assert_snapshot!(render(&main.body), @r"
    v0.0 = load_integer 0
    v1.0 = load_closure [count] v0.0
      v0.0 = read_capture count
      v1.0 = load_integer 1
      v2.0 = add v0.0, v1.0
      write_capture count v2.0
    v2.0 = call_closure v1.0
    return v0.0
    ");
    assert!(main.context.slots[0].captured);
    assert!(!main.context.slots[1].captured);
}

#[test]
fn test_nested_closure_rereads_capture() {
    let mut program = main_with(vec![
        mut_("n", int(0)),
        let_(
            "outer",
            closure(
                &[],
                vec![
                    let_("inner", closure(&[], vec![ret(name("n"))])),
                    ret(call(name("inner"), vec![])),
                ],
            ),
        ),
        ret(call(name("outer"), vec![])),
    ]);
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_integer 0
    v1.0 = load_closure [n] v0.0
      v0.0 = read_capture n
      v1.0 = load_closure [n] v0.0
        v0.0 = read_capture n
        return v0.0
      v2.0 = call_closure v1.0
      return v2.0
    v2.0 = call_closure v1.0
    return v2.0
    ");
}

#[test]
fn test_closure_body_has_its_own_context() {
    let mut program = main_with(vec![
        let_("f", closure(&["a", "b"], vec![ret(add(name("a"), name("b")))])),
        ret(call(name("f"), vec![int(1), int(2)])),
    ]);
    let module = program.lower();
    let body = body_of(&module, "app::main");
    let InstrKind::LoadClosure { context, captures, .. } = &body[0].kind else {
        panic!("expected a closure, got {:?}", body[0].kind);
    };
    assert!(captures.is_empty());
    assert_eq!(context.argument_count(), 2);
    assert_eq!(context.slots.len(), 3);
}

#[test]
fn test_procedure_reference_becomes_forwarding_closure() {
    let mut program = Program::new()
        .procedure("app::inc", &["x"], vec![ret(add(name("x"), int(1)))])
        .procedure(
            "app::main",
            &[],
            vec![let_("f", name("inc")), ret(call(name("f"), vec![int(2)]))],
        );
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_closure []
      v1.0 = call app::inc#0 v0.0
      return v1.0
    v1.0 = load_integer 2
    v2.0 = call_closure v0.0, v1.0
    return v2.0
    ");
}

#[test]
fn test_method_call_reads_member_then_calls() {
    let mut program = main_with(vec![
        let_(
            "o",
            object(vec![(
                "double",
                closure(&["this", "n"], vec![ret(add(name("n"), name("n")))]),
            )]),
        ),
        ret(method(name("o"), "double", vec![int(3)])),
    ]);
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_closure []
      v2.0 = add v1.0, v1.0
      return v2.0
    v1.0 = load_object {double} v0.0
    v2.0 = read_object .double v1.0
    v3.0 = load_integer 3
    v4.0 = call_closure v2.0, v1.0, v3.0
    return v4.0
    ");
}

#[test]
fn test_core_range_captures_its_counter() {
    let mut program = main_with(vec![ret(call_path("range", vec![int(0), int(3)]))]);
    let module = program.lower();
    let range = module.procedure("core::range", 0).expect("`core::range` was not lowered");
    assert_eq!(range.context.argument_count(), 2);
    assert_eq!(range.context.slots.iter().filter(|slot| slot.captured).count(), 2);

    let closures = find(&range.body, |kind| matches!(kind, InstrKind::LoadClosure { .. }));
    assert_eq!(closures.len(), 1);
    let InstrKind::LoadClosure { captures, body, .. } = &closures[0].kind else {
        unreachable!()
    };
    assert_eq!(captures, &["end", "i"]);
    let writes = find(body, |kind| matches!(kind, InstrKind::WriteCapture { name } if name == "i"));
    assert_eq!(writes.len(), 1);
}

// ── Variants and Calls ─────────────────────────────────────────────────

#[test]
fn test_unwrap_returns_other_variants() {
    let mut program = Program::new()
        .procedure(
            "app::get",
            &["v"],
            vec![ret(variant("ok", unwrap(name("v"), "some")))],
        )
        .procedure(
            "app::main",
            &[],
            vec![ret(call_path("get", vec![variant("some", int(1))]))],
        );
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::get")), @r"
    branch_on_variant v0.0
      case #some v1.0:
      else:
        return v0.0
    v2.0 = load_variant #ok v1.0
    return v2.0
    ");
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_integer 1
    v1.0 = load_variant #some v0.0
    v2.0 = call app::get#0 v1.0
    return v2.0
    ");
}

#[test]
fn test_each_variant_is_lowered() {
    let mut program = Program::new()
        .procedure("app::id", &["x"], vec![ret(name("x"))])
        .procedure(
            "app::main",
            &[],
            vec![
                let_("a", call_path("id", vec![int(1)])),
                ret(call_path("id", vec![string("s")])),
            ],
        );
    let module = program.lower();
    let first = module.procedure("app::id", 0).unwrap();
    let second = module.procedure("app::id", 1).unwrap();
    assert_eq!(resolve(&mut program.ctx, first.context.slots[0].ty), IrType::Integer);
    assert_eq!(resolve(&mut program.ctx, second.context.slots[0].ty), IrType::String);
    assert!(module.procedure("app::id", 2).is_none());
}

#[test]
fn test_builtins_are_not_lowered() {
    let mut program = main_with(vec![ret(call_path("length", vec![array(vec![int(1)])]))]);
    let module = program.lower();
    assert!(module.procedure("core::length", 0).is_none());
    let calls = find(body_of(&module, "app::main"), |kind| {
        matches!(kind, InstrKind::CallProcedure { path, .. } if path.to_string() == "core::length")
    });
    assert_eq!(calls.len(), 1);
}

// ── Static Values ──────────────────────────────────────────────────────

#[test]
fn test_module_variable_is_hoisted_once() {
    let mut program = main_with(vec![ret(add(name("limit"), name("limit")))]).variable("app::limit", int(10));
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_static s0
    v1.0 = load_static s0
    v2.0 = add v0.0, v1.0
    return v2.0
    ");
    assert_eq!(module.static_values.len(), 1);
    assert_eq!(module.static_values.get(gera_ir::StaticId(0)), &StaticValue::Integer(10));
}

#[test]
fn test_mutable_statics_are_not_shared() {
    let mut program = main_with(vec![
        let_("a", static_(array(vec![int(1)]))),
        let_("b", static_(array(vec![int(1)]))),
        let_("c", static_(int(7))),
        let_("d", static_(int(7))),
        ret(name("a")),
    ]);
    let module = program.lower();
    let loads: Vec<_> = find(body_of(&module, "app::main"), |kind| {
        matches!(kind, InstrKind::LoadStaticValue(_))
    })
    .into_iter()
    .map(|instr| match instr.kind {
        InstrKind::LoadStaticValue(id) => id.0,
        _ => unreachable!(),
    })
    .collect();
    assert_eq!(loads, [0, 1, 2, 2]);
}

fn declared_string(ctx: &mut TypeContext, span: Span) -> TyVar {
    ctx.allocate(Ty::new(TyKind::String, span))
}

#[test]
fn test_external_variable_loads_by_path() {
    let mut program = main_with(vec![ret(name("env"))]);
    program.symbols.add_external("app::env", Span::default(), declared_string);
    let module = program.lower();
    insta::assert_snapshot!(render(body_of(&module, "app::main")), @r"
    v0.0 = load_external app::env
    return v0.0
    ");
}

// ── Errors and Output ──────────────────────────────────────────────────

struct RefuseAll;

impl ConstEvaluator for RefuseAll {
    fn evaluate(&mut self, node: &Node<TyVar>, _symbols: &Symbols) -> Result<StaticValue, LowerError> {
        Err(LowerError::NotConstant {
            what: "anything".to_string(),
            span: node.span,
        })
    }
}

#[test]
fn test_custom_evaluator_errors_propagate() {
    let mut program = main_with(vec![ret(name("limit"))]).variable("app::limit", int(1));
    program.check();
    let err = lower_program_with(&program.symbols, &mut program.ctx, &mut RefuseAll).unwrap_err();
    assert!(matches!(err, LowerError::NotConstant { .. }));
}

#[test]
fn test_oversized_static_array_is_rejected() {
    let mut program = main_with(vec![ret(static_(repeat(int(0), int(i64::MAX))))]);
    program.check();
    let err = lower_program(&program.symbols, &mut program.ctx).unwrap_err();
    assert!(matches!(err, LowerError::NotConstant { .. }), "{:?}", err);
}

#[test]
fn test_unresolved_call_is_an_error() {
    let mut ctx = TypeContext::new();
    let mut symbols = Symbols::new();
    let id = symbols.add_procedure("app::main", Span::default(), &[], vec![]);
    let call = Node {
        kind: NodeKind::ProcedureCall {
            target: Target::Pending(0),
            args: vec![],
        },
        span: Span::default(),
        ty: ctx.fresh(),
    };
    let returns = ctx.fresh();
    if let SymbolKind::Procedure(procedure) = &mut symbols.get_mut(id).kind {
        procedure.variants.push(ProcedureVariant {
            args: vec![],
            returns,
            body: Some(vec![call]),
        });
    }
    let err = lower_program(&symbols, &mut ctx).unwrap_err();
    assert!(matches!(err, LowerError::Unresolved { path: None, .. }));
}

#[test]
fn test_module_serializes_to_json() {
    let mut program = main_with(vec![ret(int(1))]);
    let module = program.lower();
    let json = module.to_json().unwrap();
    assert!(json.contains("\"LoadInteger\": 1"), "{}", json);
    assert!(json.contains("\"Return\""), "{}", json);
}

#[test]
fn test_return_type_resolves_for_codegen() {
    let mut program = main_with(vec![ret(object(vec![("x", int(1)), ("y", boolean(true))]))]);
    let module = program.lower();
    let main = module.procedure("app::main", 0).unwrap();
    assert_eq!(
        resolve(&mut program.ctx, main.returns),
        IrType::Object(vec![
            ("x".to_string(), IrType::Integer),
            ("y".to_string(), IrType::Boolean),
        ])
    );
}
