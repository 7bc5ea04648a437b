//! Gera IR: SSA-form lowering of solved procedure variants.
//!
//! Takes the symbol table after type checking and lowers every kept
//! procedure variant with a body into a flat, versioned instruction list
//! with phis at every branch join, ready for syntax-directed code
//! emission.
//!
//! ## Architecture
//!
//! - [`ir`]: Slots, versions, instructions and the lowered module
//! - `lower`: Tree-to-IR lowering with phi insertion and closure captures
//! - [`value`]: Compile-time values and the deduplicated static-value table
//! - [`eval`]: The constant evaluator seam and the default [`LiteralFolder`]
//! - [`types`]: Full resolution of type variables for code generators
//! - [`error`]: Lowering errors

pub mod error;
pub mod eval;
pub mod ir;
mod lower;
pub mod types;
pub mod value;

pub use error::LowerError;
pub use eval::{ConstEvaluator, LiteralFolder};
pub use ir::{Instr, InstrKind, IrContext, IrModule, IrVar, LoweredProcedure};
pub use types::IrType;
pub use value::{StaticId, StaticValue, StaticValues};

use gera_typeck::{Symbols, TypeContext};
use tracing::instrument;

use crate::lower::Lowerer;

/// Lower every kept procedure variant, folding constants with
/// [`LiteralFolder`].
pub fn lower_program(symbols: &Symbols, ctx: &mut TypeContext) -> Result<IrModule, LowerError> {
    lower_program_with(symbols, ctx, &mut LiteralFolder)
}

/// Lower every kept procedure variant with a custom constant evaluator.
#[instrument(skip_all, fields(symbols = symbols.len()))]
pub fn lower_program_with(
    symbols: &Symbols,
    ctx: &mut TypeContext,
    evaluator: &mut dyn ConstEvaluator,
) -> Result<IrModule, LowerError> {
    let mut lowerer = Lowerer::new(symbols, ctx, evaluator);
    lower::lower_module(&mut lowerer)
}
