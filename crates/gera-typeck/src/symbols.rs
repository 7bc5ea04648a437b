//! The symbol table: every procedure and module-level variable by path,
//! together with the variants solving has produced for it.

use std::fmt;

use gera_common::ast::Node;
use gera_common::{Path, Span};
use rustc_hash::FxHashMap;

use crate::constraint::Constraint;
use crate::ctx::TypeContext;
use crate::ty::TyVar;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Argument and return variables of a built-in, plus the constraints
/// relating them.
pub struct BuiltinContext {
    pub args: Vec<TyVar>,
    pub returns: TyVar,
    pub constraints: Vec<Constraint>,
}

/// Instantiates a built-in procedure's signature for one solve.
pub type BuiltinSignature = fn(&mut TypeContext, Span) -> BuiltinContext;

/// Instantiates the declared type of an external variable.
pub type ExternalType = fn(&mut TypeContext, Span) -> TyVar;

pub enum ProcedureBody {
    Source(Vec<Node>),
    Builtin(BuiltinSignature),
}

/// One solved instantiation of a procedure.
#[derive(Debug, Clone)]
pub struct ProcedureVariant {
    pub args: Vec<TyVar>,
    pub returns: TyVar,
    /// The resolved body. `None` for built-ins.
    pub body: Option<Vec<Node<TyVar>>>,
}

pub struct Procedure {
    pub params: Vec<String>,
    pub body: ProcedureBody,
    pub variants: Vec<ProcedureVariant>,
}

pub enum VariableValue {
    Source(Node),
    External(ExternalType),
}

#[derive(Debug, Clone)]
pub struct VariableVariant {
    pub ty: TyVar,
    /// The resolved initializer. `None` for external variables.
    pub value: Option<Node<TyVar>>,
}

pub struct Variable {
    pub value: VariableValue,
    pub variants: Vec<VariableVariant>,
}

pub enum SymbolKind {
    Procedure(Procedure),
    Variable(Variable),
}

pub struct Symbol {
    pub path: Path,
    pub span: Span,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn variant_count(&self) -> usize {
        match &self.kind {
            SymbolKind::Procedure(procedure) => procedure.variants.len(),
            SymbolKind::Variable(variable) => variable.variants.len(),
        }
    }

    fn truncate_variants(&mut self, len: usize) {
        match &mut self.kind {
            SymbolKind::Procedure(procedure) => procedure.variants.truncate(len),
            SymbolKind::Variable(variable) => variable.variants.truncate(len),
        }
    }

    pub fn as_procedure(&self) -> Option<&Procedure> {
        match &self.kind {
            SymbolKind::Procedure(procedure) => Some(procedure),
            SymbolKind::Variable(_) => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            SymbolKind::Variable(variable) => Some(variable),
            SymbolKind::Procedure(_) => None,
        }
    }
}

// ── Path expansion ─────────────────────────────────────────────────────

/// Expands a path as written in source into fully qualified candidates.
pub trait PathExpansion {
    /// Candidates for `short` referenced from inside the symbol `from`,
    /// least specific first.
    fn expand(&self, short: &Path, from: &Path) -> Vec<Path>;
}

/// `core::short`, then `short` as written, then `short` relative to the
/// module of the referencing symbol.
pub struct ModuleExpansion;

impl PathExpansion for ModuleExpansion {
    fn expand(&self, short: &Path, from: &Path) -> Vec<Path> {
        let mut candidates: Vec<Path> = Vec::with_capacity(3);
        for candidate in [
            Path::single("core").join(short),
            short.clone(),
            from.module().join(short),
        ] {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

// ── Symbol table ───────────────────────────────────────────────────────

/// Variant counts of every symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark(Vec<usize>);

pub struct Symbols {
    symbols: Vec<Symbol>,
    by_path: FxHashMap<Path, SymbolId>,
    expansion: Box<dyn PathExpansion>,
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Symbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.symbols.iter().map(|symbol| symbol.path.to_string()))
            .finish()
    }
}

impl Symbols {
    pub fn new() -> Self {
        Self::with_expansion(Box::new(ModuleExpansion))
    }

    pub fn with_expansion(expansion: Box<dyn PathExpansion>) -> Self {
        Symbols {
            symbols: Vec::new(),
            by_path: FxHashMap::default(),
            expansion,
        }
    }

    /// Register a symbol. Registering a path twice replaces the earlier
    /// definition in place.
    pub fn add(&mut self, path: Path, span: Span, kind: SymbolKind) -> SymbolId {
        if let Some(&id) = self.by_path.get(&path) {
            self.symbols[id.0 as usize] = Symbol { path, span, kind };
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.by_path.insert(path.clone(), id);
        self.symbols.push(Symbol { path, span, kind });
        id
    }

    pub fn add_procedure(&mut self, path: &str, span: Span, params: &[&str], body: Vec<Node>) -> SymbolId {
        self.add(
            Path::parse(path),
            span,
            SymbolKind::Procedure(Procedure {
                params: params.iter().map(|p| p.to_string()).collect(),
                body: ProcedureBody::Source(body),
                variants: Vec::new(),
            }),
        )
    }

    pub fn add_builtin(&mut self, path: &str, params: &[&str], signature: BuiltinSignature) -> SymbolId {
        self.add(
            Path::parse(path),
            Span::default(),
            SymbolKind::Procedure(Procedure {
                params: params.iter().map(|p| p.to_string()).collect(),
                body: ProcedureBody::Builtin(signature),
                variants: Vec::new(),
            }),
        )
    }

    pub fn add_variable(&mut self, path: &str, span: Span, value: Node) -> SymbolId {
        self.add(
            Path::parse(path),
            span,
            SymbolKind::Variable(Variable {
                value: VariableValue::Source(value),
                variants: Vec::new(),
            }),
        )
    }

    pub fn add_external(&mut self, path: &str, span: Span, ty: ExternalType) -> SymbolId {
        self.add(
            Path::parse(path),
            span,
            SymbolKind::Variable(Variable {
                value: VariableValue::External(ty),
                variants: Vec::new(),
            }),
        )
    }

    pub fn lookup(&self, path: &Path) -> Option<SymbolId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Look up a symbol by path text.
    pub fn by_path(&self, path: &str) -> Option<&Symbol> {
        self.lookup(&Path::parse(path)).map(|id| self.get(id))
    }

    /// Symbols in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| (SymbolId(i as u32), symbol))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn expand(&self, short: &Path, from: &Path) -> Vec<Path> {
        self.expansion.expand(short, from)
    }

    /// The most specific expansion of `short` that names a symbol.
    pub fn resolve(&self, short: &Path, from: &Path) -> Option<SymbolId> {
        self.expand(short, from)
            .iter()
            .rev()
            .find_map(|candidate| self.lookup(candidate))
    }

    pub fn variant_watermark(&self) -> Watermark {
        Watermark(self.symbols.iter().map(Symbol::variant_count).collect())
    }

    /// Drop every variant appended since `watermark` was taken.
    pub fn rollback(&mut self, watermark: &Watermark) {
        for (symbol, &len) in self.symbols.iter_mut().zip(&watermark.0) {
            if symbol.variant_count() > len {
                symbol.truncate_variants(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_common::build::*;

    #[test]
    fn default_expansion_order() {
        let candidates = ModuleExpansion.expand(&Path::parse("length"), &Path::parse("app::main"));
        let names: Vec<String> = candidates.iter().map(Path::to_string).collect();
        assert_eq!(names, ["core::length", "length", "app::length"]);
    }

    #[test]
    fn expansion_dedups_top_level() {
        let candidates = ModuleExpansion.expand(&Path::parse("f"), &Path::parse("main"));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn resolve_prefers_most_specific() {
        let mut symbols = Symbols::new();
        symbols.add_variable("core::limit", Span::default(), int(1));
        let local = symbols.add_variable("app::limit", Span::default(), int(2));
        assert_eq!(
            symbols.resolve(&Path::parse("limit"), &Path::parse("app::main")),
            Some(local)
        );
    }

    #[test]
    fn re_adding_replaces_in_place() {
        let mut symbols = Symbols::new();
        let first = symbols.add_variable("app::x", Span::default(), int(1));
        let second = symbols.add_procedure("app::x", Span::default(), &[], vec![]);
        assert_eq!(first, second);
        assert_eq!(symbols.len(), 1);
        assert!(symbols.get(first).as_procedure().is_some());
    }

    #[test]
    fn rollback_truncates_new_variants() {
        let mut ctx = TypeContext::new();
        let mut symbols = Symbols::new();
        let id = symbols.add_procedure("app::f", Span::default(), &[], vec![]);
        let mark = symbols.variant_watermark();
        if let SymbolKind::Procedure(procedure) = &mut symbols.get_mut(id).kind {
            procedure.variants.push(ProcedureVariant {
                args: vec![],
                returns: ctx.fresh(),
                body: None,
            });
        }
        assert_eq!(symbols.get(id).variant_count(), 1);
        symbols.rollback(&mark);
        assert_eq!(symbols.get(id).variant_count(), 0);
    }
}
