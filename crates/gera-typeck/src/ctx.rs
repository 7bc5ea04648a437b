//! The type context: an arena of type variables over `ena`'s union-find.
//!
//! Only `find`, `get`, `set`, `union`, allocation and copying are exposed;
//! callers never see parent links.

use ena::unify::InPlaceUnificationTable;
use rustc_hash::FxHashMap;

use crate::ty::{Ty, TyKind, TyVar};

pub struct TypeContext {
    table: InPlaceUnificationTable<TyVar>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        TypeContext {
            table: InPlaceUnificationTable::new(),
        }
    }

    // ── Allocation ─────────────────────────────────────────────────────

    pub fn allocate(&mut self, ty: Ty) -> TyVar {
        self.table.new_key(ty)
    }

    /// A fresh variable of type `Any`.
    pub fn fresh(&mut self) -> TyVar {
        self.allocate(Ty::any())
    }

    /// Number of variables ever allocated.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    // ── Union-find ─────────────────────────────────────────────────────

    pub fn find(&mut self, var: TyVar) -> TyVar {
        self.table.find(var)
    }

    /// The type stored on `var`'s representative.
    pub fn get(&mut self, var: TyVar) -> Ty {
        self.table.probe_value(var)
    }

    pub fn kind(&mut self, var: TyVar) -> TyKind {
        self.get(var).kind
    }

    /// Overwrite the type stored on `var`'s representative.
    pub fn set(&mut self, var: TyVar, ty: Ty) {
        self.table.union_value(var, ty);
    }

    /// Merge the sets of `a` and `b`. The merged set keeps `b`'s type
    /// until the caller sets a new one.
    pub fn union(&mut self, a: TyVar, b: TyVar) {
        self.table.union(a, b);
    }

    pub fn same(&mut self, a: TyVar, b: TyVar) -> bool {
        self.table.unioned(a, b)
    }

    // ── Copying ────────────────────────────────────────────────────────

    /// Allocate an independent copy of the type graph reachable from `var`.
    pub fn copy(&mut self, var: TyVar) -> TyVar {
        self.copy_all(&[var])[0]
    }

    /// Copy several variables at once. Sharing between them is preserved:
    /// two inputs in the same set map to the same copy, and cycles are
    /// copied as cycles.
    pub fn copy_all(&mut self, vars: &[TyVar]) -> Vec<TyVar> {
        let mut memo: FxHashMap<TyVar, TyVar> = FxHashMap::default();
        let mut pending: Vec<(TyVar, TyVar)> = Vec::new();
        let copies = vars
            .iter()
            .map(|&var| self.copy_var(var, &mut memo, &mut pending))
            .collect();
        while let Some((original, copy)) = pending.pop() {
            let ty = self.get(original);
            let kind = ty
                .kind
                .map_vars(|child| self.copy_var(child, &mut memo, &mut pending));
            self.set(
                copy,
                Ty {
                    kind,
                    origin: ty.origin,
                },
            );
        }
        copies
    }

    fn copy_var(
        &mut self,
        var: TyVar,
        memo: &mut FxHashMap<TyVar, TyVar>,
        pending: &mut Vec<(TyVar, TyVar)>,
    ) -> TyVar {
        let root = self.find(var);
        if let Some(&copy) = memo.get(&root) {
            return copy;
        }
        let copy = self.fresh();
        memo.insert(root, copy);
        pending.push((root, copy));
        copy
    }

    // ── Display ────────────────────────────────────────────────────────

    /// Render the fully expanded type of `var`. Recursive references are
    /// shown as `...`.
    pub fn display(&mut self, var: TyVar) -> String {
        let mut out = String::new();
        let mut visiting = Vec::new();
        self.write_ty(var, &mut visiting, &mut out);
        out
    }

    fn write_ty(&mut self, var: TyVar, visiting: &mut Vec<TyVar>, out: &mut String) {
        let root = self.find(var);
        if visiting.contains(&root) {
            out.push_str("...");
            return;
        }
        visiting.push(root);
        match self.kind(root) {
            TyKind::Array(elem) => {
                out.push('[');
                self.write_ty(elem, visiting, out);
                out.push(']');
            }
            TyKind::Object(object) => {
                if object.members.is_empty() {
                    out.push_str(if object.expandable { "{ .. }" } else { "{}" });
                } else {
                    out.push_str("{ ");
                    for (i, (name, member)) in object.members.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(name);
                        out.push_str(" = ");
                        self.write_ty(*member, visiting, out);
                    }
                    out.push_str(if object.expandable { ", .. }" } else { " }" });
                }
            }
            TyKind::Union(union) => {
                out.push('(');
                for (i, (name, payload)) in union.variants.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    out.push('#');
                    out.push_str(name);
                    out.push(' ');
                    self.write_ty(*payload, visiting, out);
                }
                if union.expandable {
                    out.push_str(if union.variants.is_empty() { ".." } else { " | .." });
                }
                out.push(')');
            }
            TyKind::Closure(closure) => {
                out.push('|');
                for (i, arg) in closure.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_ty(*arg, visiting, out);
                }
                out.push_str("| -> ");
                self.write_ty(closure.returns, visiting, out);
            }
            simple => out.push_str(&simple.to_string()),
        }
        visiting.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{ClosureTy, ObjectTy};
    use gera_common::Span;
    use std::collections::BTreeMap;

    fn concrete(kind: TyKind) -> Ty {
        Ty::new(kind, Span::default())
    }

    #[test]
    fn set_and_get_through_union() {
        let mut ctx = TypeContext::new();
        let a = ctx.fresh();
        let b = ctx.fresh();
        ctx.union(a, b);
        ctx.set(a, concrete(TyKind::Integer));
        assert_eq!(ctx.kind(b), TyKind::Integer);
        assert_eq!(ctx.find(a), ctx.find(b));
    }

    #[test]
    fn copy_is_independent() {
        let mut ctx = TypeContext::new();
        let elem = ctx.fresh();
        let array = ctx.allocate(concrete(TyKind::Array(elem)));
        let copy = ctx.copy(array);
        let TyKind::Array(copied_elem) = ctx.kind(copy) else {
            panic!("copy should be an array");
        };
        assert!(!ctx.same(elem, copied_elem));
        ctx.set(copied_elem, concrete(TyKind::String));
        assert_eq!(ctx.kind(elem), TyKind::Any);
    }

    #[test]
    fn copy_all_preserves_sharing() {
        let mut ctx = TypeContext::new();
        let shared = ctx.fresh();
        let closure = ctx.allocate(concrete(TyKind::Closure(ClosureTy {
            args: vec![shared],
            returns: shared,
        })));
        let copies = ctx.copy_all(&[closure, shared]);
        let TyKind::Closure(copied) = ctx.kind(copies[0]) else {
            panic!("copy should be a closure");
        };
        assert!(ctx.same(copied.args[0], copied.returns));
        assert!(ctx.same(copied.args[0], copies[1]));
    }

    #[test]
    fn copy_handles_cycles() {
        let mut ctx = TypeContext::new();
        let node = ctx.fresh();
        let mut members = BTreeMap::new();
        members.insert("next".to_string(), node);
        ctx.set(
            node,
            concrete(TyKind::Object(ObjectTy {
                members,
                expandable: false,
                order: None,
            })),
        );
        let copy = ctx.copy(node);
        let TyKind::Object(object) = ctx.kind(copy) else {
            panic!("copy should be an object");
        };
        assert!(ctx.same(object.members["next"], copy));
        assert_eq!(ctx.display(copy), "{ next = ... }");
    }

    #[test]
    fn display_nested() {
        let mut ctx = TypeContext::new();
        let int = ctx.allocate(concrete(TyKind::Integer));
        let array = ctx.allocate(concrete(TyKind::Array(int)));
        let ret = ctx.allocate(concrete(TyKind::Boolean));
        let closure = ctx.allocate(concrete(TyKind::Closure(ClosureTy {
            args: vec![array, int],
            returns: ret,
        })));
        assert_eq!(ctx.display(closure), "|[int], int| -> bool");
    }
}
