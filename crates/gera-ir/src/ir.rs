//! IR definitions: variable slots and versions, instructions, and the
//! lowered module handed to code generators.
//!
//! Every local of a procedure variant lives in a slot of its
//! [`IrContext`]. Each assignment to a slot produces a new version, so an
//! [`IrVar`] names exactly one definition. Captured names are the one
//! exception: inside a closure they are read and written by name through
//! [`InstrKind::ReadCapture`] and [`InstrKind::WriteCapture`].

use std::fmt;

use gera_common::Path;
use gera_typeck::TyVar;
use serde::Serialize;

use crate::value::{StaticId, StaticValues};

// ── Variables ──────────────────────────────────────────────────────────

/// One version of one slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IrVar {
    pub slot: usize,
    pub version: usize,
}

impl fmt::Display for IrVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.slot, self.version)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Slot {
    pub ty: TyVar,
    pub is_argument: bool,
    /// Read by a nested closure, so its storage must be shared.
    pub captured: bool,
    /// Number of versions handed out so far.
    versions: usize,
}

/// The slots of one procedure or closure body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IrContext {
    pub slots: Vec<Slot>,
}

impl IrContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, ty: TyVar) -> IrVar {
        self.push_slot(ty, false)
    }

    pub fn allocate_argument(&mut self, ty: TyVar) -> IrVar {
        self.push_slot(ty, true)
    }

    fn push_slot(&mut self, ty: TyVar, is_argument: bool) -> IrVar {
        self.slots.push(Slot {
            ty,
            is_argument,
            captured: false,
            versions: 1,
        });
        IrVar {
            slot: self.slots.len() - 1,
            version: 0,
        }
    }

    /// The next unused version of `var`'s slot.
    pub fn next_version(&mut self, var: IrVar) -> IrVar {
        let slot = &mut self.slots[var.slot];
        let version = slot.versions;
        slot.versions += 1;
        IrVar {
            slot: var.slot,
            version,
        }
    }

    pub fn mark_captured(&mut self, var: IrVar) {
        self.slots[var.slot].captured = true;
    }

    pub fn argument_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_argument).count()
    }
}

// ── Instructions ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Instr {
    pub kind: InstrKind,
    pub args: Vec<IrVar>,
    pub dest: Option<IrVar>,
}

impl Instr {
    pub fn new(kind: InstrKind, args: Vec<IrVar>, dest: Option<IrVar>) -> Self {
        Instr { kind, args, dest }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum InstrKind {
    LoadBoolean(bool),
    LoadInteger(i64),
    LoadFloat(f64),
    LoadString(String),
    LoadUnit,
    /// Members are listed in the order of `args`.
    LoadObject {
        names: Vec<String>,
    },
    LoadFixedArray,
    /// `args` are the repeated value and the size.
    LoadRepeatArray,
    LoadVariant {
        name: String,
    },
    /// `args` hold the captured values, named by `captures`.
    LoadClosure {
        args: Vec<TyVar>,
        returns: TyVar,
        captures: Vec<String>,
        context: IrContext,
        body: Vec<Instr>,
    },
    LoadStaticValue(StaticId),
    LoadExternal(Path),

    ReadObject {
        member: String,
    },
    /// `args` are the object and the new value.
    WriteObject {
        member: String,
    },
    ReadArray,
    /// `args` are the array, the index and the new value.
    WriteArray,
    ReadCapture {
        name: String,
    },
    WriteCapture {
        name: String,
    },

    Copy,
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
    Not,
    Negate,

    /// Runs the branch whose static value equals `args[0]`, or the else
    /// branch.
    BranchOnValue {
        values: Vec<StaticId>,
        branches: Vec<Vec<Instr>>,
        else_branch: Vec<Instr>,
    },
    /// Runs the branch whose variant tag matches `args[0]`, binding the
    /// payload to the branch's variable if it has one.
    BranchOnVariant {
        variants: Vec<String>,
        bindings: Vec<Option<IrVar>>,
        branches: Vec<Vec<Instr>>,
        else_branch: Vec<Instr>,
    },
    CallProcedure {
        path: Path,
        variant: usize,
    },
    /// `args[0]` is the closure, the rest are its arguments.
    CallClosure,
    Return,
    Phi,
}

// ── Module ─────────────────────────────────────────────────────────────

/// One lowered procedure variant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoweredProcedure {
    pub path: Path,
    pub variant: usize,
    pub args: Vec<TyVar>,
    pub returns: TyVar,
    pub context: IrContext,
    pub body: Vec<Instr>,
}

#[derive(Debug, Default, Serialize)]
pub struct IrModule {
    pub procedures: Vec<LoweredProcedure>,
    pub static_values: StaticValues,
}

impl IrModule {
    pub fn procedure(&self, path: &str, variant: usize) -> Option<&LoweredProcedure> {
        let path = Path::parse(path);
        self.procedures
            .iter()
            .find(|procedure| procedure.path == path && procedure.variant == variant)
    }

    /// Dump the module as JSON for an external code generator.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ── Printing ───────────────────────────────────────────────────────────

/// Render a body as text, one instruction per line, nested bodies
/// indented below their instruction.
pub fn render(body: &[Instr]) -> String {
    let mut out = String::new();
    render_into(&mut out, body, 0);
    out
}

fn render_into(out: &mut String, body: &[Instr], depth: usize) {
    let indent = "  ".repeat(depth);
    for instr in body {
        out.push_str(&indent);
        if let Some(dest) = instr.dest {
            out.push_str(&format!("{} = ", dest));
        }
        out.push_str(&mnemonic(&instr.kind));
        if !instr.args.is_empty() {
            let args: Vec<String> = instr.args.iter().map(IrVar::to_string).collect();
            out.push(' ');
            out.push_str(&args.join(", "));
        }
        out.push('\n');
        match &instr.kind {
            InstrKind::BranchOnValue {
                values,
                branches,
                else_branch,
            } => {
                for (value, branch) in values.iter().zip(branches) {
                    out.push_str(&format!("{}  case s{}:\n", indent, value.0));
                    render_into(out, branch, depth + 2);
                }
                out.push_str(&format!("{}  else:\n", indent));
                render_into(out, else_branch, depth + 2);
            }
            InstrKind::BranchOnVariant {
                variants,
                bindings,
                branches,
                else_branch,
            } => {
                for ((variant, binding), branch) in variants.iter().zip(bindings).zip(branches) {
                    match binding {
                        Some(binding) => out.push_str(&format!("{}  case #{} {}:\n", indent, variant, binding)),
                        None => out.push_str(&format!("{}  case #{}:\n", indent, variant)),
                    }
                    render_into(out, branch, depth + 2);
                }
                if !else_branch.is_empty() {
                    out.push_str(&format!("{}  else:\n", indent));
                    render_into(out, else_branch, depth + 2);
                }
            }
            InstrKind::LoadClosure { body, .. } => render_into(out, body, depth + 1),
            _ => {}
        }
    }
}

fn mnemonic(kind: &InstrKind) -> String {
    match kind {
        InstrKind::LoadBoolean(b) => format!("load_boolean {}", b),
        InstrKind::LoadInteger(i) => format!("load_integer {}", i),
        InstrKind::LoadFloat(x) => format!("load_float {:?}", x),
        InstrKind::LoadString(s) => format!("load_string {:?}", s),
        InstrKind::LoadUnit => "load_unit".to_string(),
        InstrKind::LoadObject { names } => format!("load_object {{{}}}", names.join(", ")),
        InstrKind::LoadFixedArray => "load_fixed_array".to_string(),
        InstrKind::LoadRepeatArray => "load_repeat_array".to_string(),
        InstrKind::LoadVariant { name } => format!("load_variant #{}", name),
        InstrKind::LoadClosure { captures, .. } => format!("load_closure [{}]", captures.join(", ")),
        InstrKind::LoadStaticValue(id) => format!("load_static s{}", id.0),
        InstrKind::LoadExternal(path) => format!("load_external {}", path),
        InstrKind::ReadObject { member } => format!("read_object .{}", member),
        InstrKind::WriteObject { member } => format!("write_object .{}", member),
        InstrKind::ReadArray => "read_array".to_string(),
        InstrKind::WriteArray => "write_array".to_string(),
        InstrKind::ReadCapture { name } => format!("read_capture {}", name),
        InstrKind::WriteCapture { name } => format!("write_capture {}", name),
        InstrKind::Copy => "copy".to_string(),
        InstrKind::Add => "add".to_string(),
        InstrKind::Subtract => "subtract".to_string(),
        InstrKind::Multiply => "multiply".to_string(),
        InstrKind::Divide => "divide".to_string(),
        InstrKind::Modulo => "modulo".to_string(),
        InstrKind::LessThan => "less_than".to_string(),
        InstrKind::GreaterThan => "greater_than".to_string(),
        InstrKind::LessThanEqual => "less_than_equal".to_string(),
        InstrKind::GreaterThanEqual => "greater_than_equal".to_string(),
        InstrKind::Equals => "equals".to_string(),
        InstrKind::NotEquals => "not_equals".to_string(),
        InstrKind::Not => "not".to_string(),
        InstrKind::Negate => "negate".to_string(),
        InstrKind::BranchOnValue { .. } => "branch_on_value".to_string(),
        InstrKind::BranchOnVariant { .. } => "branch_on_variant".to_string(),
        InstrKind::CallProcedure { path, variant } => format!("call {}#{}", path, variant),
        InstrKind::CallClosure => "call_closure".to_string(),
        InstrKind::Return => "return".to_string(),
        InstrKind::Phi => "phi".to_string(),
    }
}

/// Walk `body` and every nested branch body, not descending into closures.
pub fn visit<'a>(body: &'a [Instr], f: &mut impl FnMut(&'a Instr)) {
    for instr in body {
        f(instr);
        match &instr.kind {
            InstrKind::BranchOnValue {
                branches,
                else_branch,
                ..
            }
            | InstrKind::BranchOnVariant {
                branches,
                else_branch,
                ..
            } => {
                for branch in branches {
                    visit(branch, f);
                }
                visit(else_branch, f);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_unique_per_slot() {
        let mut ctx = IrContext::new();
        let a = ctx.allocate(TyVar(0));
        let b = ctx.allocate(TyVar(1));
        let a1 = ctx.next_version(a);
        let a2 = ctx.next_version(a);
        assert_eq!((a1.slot, a1.version), (0, 1));
        assert_eq!((a2.slot, a2.version), (0, 2));
        assert_eq!(ctx.next_version(b).version, 1);
    }

    #[test]
    fn arguments_are_tracked() {
        let mut ctx = IrContext::new();
        ctx.allocate_argument(TyVar(0));
        let local = ctx.allocate(TyVar(1));
        ctx.mark_captured(local);
        assert_eq!(ctx.argument_count(), 1);
        assert!(ctx.slots[1].captured);
        assert!(!ctx.slots[0].captured);
    }

    #[test]
    fn var_display() {
        assert_eq!(IrVar { slot: 3, version: 1 }.to_string(), "v3.1");
    }
}
