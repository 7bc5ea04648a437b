//! Gera type checker: constraint-based structural inference with
//! per-call-site procedure specialization.
//!
//! There are no type annotations. Every expression gets a type variable,
//! constraints over those variables are generated in one walk per symbol,
//! and the solver narrows them in a shared union-find arena. Procedures
//! are never generalized: each call shape solves the callee again and
//! appends a new variant to its symbol.
//!
//! # Architecture
//!
//! - [`ty`]: Structural types and placeholder categories
//! - [`ctx`]: The Type Context (union-find arena over [`ena`])
//! - [`unify`]: Work-queue unification
//! - [`constraint`]: Constraint kinds and their application
//! - [`generate`]: Constraint generation with definite-assignment checking
//! - [`solve`]: Constraint solving, overload trials and variant creation
//! - [`symbols`]: Symbol table and path expansion
//! - [`builtins`]: The `core` built-in procedures
//! - [`error`]: Type errors with unification paths
//! - [`diagnostics`]: Ariadne rendering of type errors
//! - [`config`]: TOML configuration

pub mod builtins;
pub mod config;
pub mod constraint;
pub mod ctx;
pub mod diagnostics;
pub mod error;
pub mod generate;
pub mod solve;
pub mod symbols;
pub mod ty;
pub mod unify;

pub use config::CheckConfig;
pub use ctx::TypeContext;
pub use error::TypeError;
pub use solve::{Solved, Solver};
pub use symbols::{SymbolId, Symbols};
pub use ty::{Ty, TyKind, TyVar};

use tracing::instrument;

/// The result of checking a symbol table.
#[derive(Debug, Default)]
pub struct CheckResult {
    /// One error per failing top-level symbol, without duplicates.
    pub errors: Vec<TypeError>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Type-check every symbol of the table.
///
/// Symbols are solved in registration order. Entry points are solved with
/// their variants kept, and so is everything they reach; every other
/// symbol is solved only to report its errors. A failing symbol has all
/// variants appended during its solve discarded.
#[instrument(skip_all, fields(symbols = symbols.len()))]
pub fn check(symbols: &mut Symbols, ctx: &mut TypeContext, config: &CheckConfig) -> CheckResult {
    if config.check.builtins {
        builtins::register(symbols);
    }
    let entries = config.entry_points();
    let mut result = CheckResult::default();
    for entry in &entries {
        if symbols.lookup(entry).is_none() {
            result.errors.push(TypeError::UnknownSymbol {
                path: entry.clone(),
                span: Default::default(),
            });
        }
    }

    let ids: Vec<SymbolId> = symbols.iter().map(|(id, _)| id).collect();
    for id in ids {
        let keep = entries.contains(&symbols.get(id).path);
        let watermark = symbols.variant_watermark();
        let solved = Solver::new(symbols, ctx).solve_symbol(id, keep);
        if let Err(error) = solved {
            symbols.rollback(&watermark);
            tracing::debug!("{} failed: {error}", symbols.get(id).path);
            if !result.errors.contains(&error) {
                result.errors.push(error);
            }
        }
    }
    result
}
