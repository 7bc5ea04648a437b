//! Type resolution: `TyVar` -> `IrType` conversion for code generators.
//!
//! After solving, the type graph may still contain placeholder categories
//! where nothing forced a concrete kind, and may be cyclic. Both are
//! resolved here into a finite tree.

use gera_typeck::ty::TyKind;
use gera_typeck::{TypeContext, TyVar};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum IrType {
    /// Never constrained; any representation will do.
    Unknown,
    Unit,
    Boolean,
    Integer,
    Float,
    String,
    Array(Box<IrType>),
    /// Members in layout order.
    Object(Vec<(String, IrType)>),
    Union(Vec<(String, IrType)>),
    Closure { args: Vec<IrType>, returns: Box<IrType> },
    /// A reference back to the enclosing type `depth` levels up.
    Recursive(usize),
}

/// Fully resolve `var`. A numeric placeholder resolves to `Integer`.
pub fn resolve(ctx: &mut TypeContext, var: TyVar) -> IrType {
    let mut visiting = Vec::new();
    resolve_in(ctx, var, &mut visiting)
}

fn resolve_in(ctx: &mut TypeContext, var: TyVar, visiting: &mut Vec<TyVar>) -> IrType {
    let root = ctx.find(var);
    if let Some(pos) = visiting.iter().position(|&v| v == root) {
        return IrType::Recursive(visiting.len() - pos);
    }
    visiting.push(root);
    let resolved = match ctx.kind(root) {
        TyKind::Any | TyKind::Referenced | TyKind::Sequence => IrType::Unknown,
        TyKind::Numeric | TyKind::Integer => IrType::Integer,
        TyKind::Indexed => IrType::Array(Box::new(IrType::Unknown)),
        TyKind::Unit => IrType::Unit,
        TyKind::Boolean => IrType::Boolean,
        TyKind::Float => IrType::Float,
        TyKind::String => IrType::String,
        TyKind::Array(element) => IrType::Array(Box::new(resolve_in(ctx, element, visiting))),
        TyKind::Object(object) => {
            let names: Vec<String> = match &object.order {
                Some(order) => order.clone(),
                None => object.members.keys().cloned().collect(),
            };
            let mut members = Vec::with_capacity(names.len());
            for name in names {
                if let Some(&member) = object.members.get(&name) {
                    members.push((name, resolve_in(ctx, member, visiting)));
                }
            }
            IrType::Object(members)
        }
        TyKind::Union(union) => {
            let mut variants = Vec::with_capacity(union.variants.len());
            for (name, payload) in union.variants {
                variants.push((name, resolve_in(ctx, payload, visiting)));
            }
            IrType::Union(variants)
        }
        TyKind::Closure(closure) => {
            let args = closure
                .args
                .iter()
                .map(|&arg| resolve_in(ctx, arg, visiting))
                .collect();
            let returns = Box::new(resolve_in(ctx, closure.returns, visiting));
            IrType::Closure { args, returns }
        }
    };
    visiting.pop();
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_typeck::ty::{ObjectTy, UnionTy};
    use gera_typeck::Ty;
    use std::collections::BTreeMap;

    fn alloc(ctx: &mut TypeContext, kind: TyKind) -> TyVar {
        ctx.allocate(Ty { kind, origin: None })
    }

    #[test]
    fn placeholders_resolve() {
        let mut ctx = TypeContext::new();
        let numeric = alloc(&mut ctx, TyKind::Numeric);
        let any = ctx.fresh();
        assert_eq!(resolve(&mut ctx, numeric), IrType::Integer);
        assert_eq!(resolve(&mut ctx, any), IrType::Unknown);
    }

    #[test]
    fn object_follows_fixed_order() {
        let mut ctx = TypeContext::new();
        let x = alloc(&mut ctx, TyKind::Integer);
        let y = alloc(&mut ctx, TyKind::Boolean);
        let object = alloc(
            &mut ctx,
            TyKind::Object(ObjectTy {
                members: BTreeMap::from([("x".to_string(), x), ("y".to_string(), y)]),
                expandable: false,
                order: Some(vec!["y".to_string(), "x".to_string()]),
            }),
        );
        assert_eq!(
            resolve(&mut ctx, object),
            IrType::Object(vec![
                ("y".to_string(), IrType::Boolean),
                ("x".to_string(), IrType::Integer),
            ])
        );
    }

    #[test]
    fn cycles_become_back_references() {
        // list = (#cons { head = int, tail = list } | #nil unit)
        let mut ctx = TypeContext::new();
        let list = ctx.fresh();
        let head = alloc(&mut ctx, TyKind::Integer);
        let unit = alloc(&mut ctx, TyKind::Unit);
        let cell = alloc(
            &mut ctx,
            TyKind::Object(ObjectTy {
                members: BTreeMap::from([("head".to_string(), head), ("tail".to_string(), list)]),
                expandable: false,
                order: None,
            }),
        );
        ctx.set(
            list,
            Ty {
                kind: TyKind::Union(UnionTy {
                    variants: BTreeMap::from([("cons".to_string(), cell), ("nil".to_string(), unit)]),
                    expandable: false,
                }),
                origin: None,
            },
        );
        let resolved = resolve(&mut ctx, list);
        assert_eq!(
            resolved,
            IrType::Union(vec![
                (
                    "cons".to_string(),
                    IrType::Object(vec![
                        ("head".to_string(), IrType::Integer),
                        ("tail".to_string(), IrType::Recursive(2)),
                    ])
                ),
                ("nil".to_string(), IrType::Unit),
            ])
        );
    }
}
