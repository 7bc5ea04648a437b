//! Structural unification over the type context.
//!
//! Nested types are reconciled through a work queue rather than recursion.
//! Each pair is merged into one union-find set *before* its children are
//! processed, so cyclic types terminate.

use std::collections::VecDeque;

use gera_common::Span;

use crate::ctx::TypeContext;
use crate::error::{PathStep, TypeError, UnifyPath};
use crate::ty::{ObjectTy, Ty, TyKind, TyVar, UnionTy};

type Queue = VecDeque<(TyVar, TyVar, UnifyPath)>;

impl TypeContext {
    /// Unify `a` and `b`, demanded at `span`.
    pub fn unify(&mut self, a: TyVar, b: TyVar, span: Span) -> Result<(), TypeError> {
        self.unify_at(a, b, span, UnifyPath::default())
    }

    /// Unify `a` and `b`, describing the pair as `path` in errors.
    pub fn unify_at(
        &mut self,
        a: TyVar,
        b: TyVar,
        span: Span,
        path: UnifyPath,
    ) -> Result<(), TypeError> {
        let mut queue: Queue = VecDeque::new();
        queue.push_back((a, b, path));
        while let Some((a, b, path)) = queue.pop_front() {
            let root_a = self.find(a);
            let root_b = self.find(b);
            if root_a == root_b {
                continue;
            }
            let ty_a = self.get(root_a);
            let ty_b = self.get(root_b);
            let merged = merge(&ty_a, &ty_b, span, &path, &mut queue)?;
            self.union(root_a, root_b);
            self.set(root_a, merged);
        }
        Ok(())
    }
}

fn incompatible(a: &Ty, b: &Ty, left: String, right: String, span: Span, path: &UnifyPath) -> TypeError {
    TypeError::Incompatible {
        left,
        right,
        left_span: a.origin,
        right_span: b.origin,
        span,
        path: path.clone(),
    }
}

/// Compute the reconciled type of `a` and `b`, queueing nested pairs.
fn merge(a: &Ty, b: &Ty, span: Span, path: &UnifyPath, queue: &mut Queue) -> Result<Ty, TypeError> {
    use TyKind::*;
    let kind = match (&a.kind, &b.kind) {
        (Any, _) => return Ok(b.clone()),
        (_, Any) => return Ok(a.clone()),
        (Numeric, other) if other.is_numeric() => return Ok(b.clone()),
        (other, Numeric) if other.is_numeric() => return Ok(a.clone()),
        (Indexed, other) if other.is_indexed() => return Ok(b.clone()),
        (other, Indexed) if other.is_indexed() => return Ok(a.clone()),
        (Referenced, other) if other.is_referenced() => return Ok(b.clone()),
        (other, Referenced) if other.is_referenced() => return Ok(a.clone()),
        (Sequence, Referenced) | (Referenced, Sequence) => Indexed,
        (Sequence, other) if other.is_sequence() => return Ok(b.clone()),
        (other, Sequence) if other.is_sequence() => return Ok(a.clone()),
        (Unit, Unit) | (Boolean, Boolean) | (Integer, Integer) | (Float, Float) | (String, String) => {
            return Ok(a.clone())
        }
        (Array(elem_a), Array(elem_b)) => {
            queue.push_back((*elem_a, *elem_b, path.push(PathStep::Element)));
            Array(*elem_a)
        }
        (Closure(closure_a), Closure(closure_b)) => {
            if closure_a.args.len() != closure_b.args.len() {
                return Err(incompatible(
                    a,
                    b,
                    format!("a closure with {} arguments", closure_a.args.len()),
                    format!("a closure with {} arguments", closure_b.args.len()),
                    span,
                    path,
                ));
            }
            for (i, (arg_a, arg_b)) in closure_a.args.iter().zip(&closure_b.args).enumerate() {
                queue.push_back((*arg_a, *arg_b, path.push(PathStep::Argument(i))));
            }
            queue.push_back((closure_a.returns, closure_b.returns, path.push(PathStep::Returns)));
            Closure(closure_a.clone())
        }
        (Object(object_a), Object(object_b)) => {
            Object(merge_objects(a, b, object_a, object_b, span, path, queue)?)
        }
        (Union(union_a), Union(union_b)) => {
            Union(merge_unions(a, b, union_a, union_b, span, path, queue)?)
        }
        (kind_a, kind_b) => {
            return Err(incompatible(
                a,
                b,
                kind_a.describe().to_string(),
                kind_b.describe().to_string(),
                span,
                path,
            ))
        }
    };
    Ok(Ty {
        kind,
        origin: a.origin.or(b.origin),
    })
}

fn merge_objects(
    a: &Ty,
    b: &Ty,
    object_a: &ObjectTy,
    object_b: &ObjectTy,
    span: Span,
    path: &UnifyPath,
    queue: &mut Queue,
) -> Result<ObjectTy, TypeError> {
    if let (Some(order_a), Some(order_b)) = (&object_a.order, &object_b.order) {
        if order_a != order_b {
            return Err(TypeError::LayoutMismatch {
                left_order: order_a.clone(),
                right_order: order_b.clone(),
                left_span: a.origin,
                right_span: b.origin,
                span,
                path: path.clone(),
            });
        }
    }
    let missing = |name: &str| {
        (
            format!("an object without a member `{}`", name),
            format!("an object with a member `{}`", name),
        )
    };
    for name in object_b.members.keys() {
        if !object_a.members.contains_key(name) && !object_a.expandable {
            let (left, right) = missing(name);
            return Err(incompatible(a, b, left, right, span, path));
        }
    }
    for name in object_a.members.keys() {
        if !object_b.members.contains_key(name) && !object_b.expandable {
            let (right, left) = missing(name);
            return Err(incompatible(a, b, left, right, span, path));
        }
    }
    let mut members = object_a.members.clone();
    for (name, member_b) in &object_b.members {
        match object_a.members.get(name) {
            Some(member_a) => queue.push_back((
                *member_a,
                *member_b,
                path.push(PathStep::Member(name.clone())),
            )),
            None => {
                members.insert(name.clone(), *member_b);
            }
        }
    }
    Ok(ObjectTy {
        members,
        expandable: object_a.expandable && object_b.expandable,
        order: object_a.order.clone().or_else(|| object_b.order.clone()),
    })
}

fn merge_unions(
    a: &Ty,
    b: &Ty,
    union_a: &UnionTy,
    union_b: &UnionTy,
    span: Span,
    path: &UnifyPath,
    queue: &mut Queue,
) -> Result<UnionTy, TypeError> {
    let missing = |name: &str| {
        (
            format!("a union without a variant `#{}`", name),
            format!("a union with a variant `#{}`", name),
        )
    };
    for name in union_b.variants.keys() {
        if !union_a.variants.contains_key(name) && !union_a.expandable {
            let (left, right) = missing(name);
            return Err(incompatible(a, b, left, right, span, path));
        }
    }
    for name in union_a.variants.keys() {
        if !union_b.variants.contains_key(name) && !union_b.expandable {
            let (right, left) = missing(name);
            return Err(incompatible(a, b, left, right, span, path));
        }
    }
    let mut variants = union_a.variants.clone();
    for (name, payload_b) in &union_b.variants {
        match union_a.variants.get(name) {
            Some(payload_a) => queue.push_back((
                *payload_a,
                *payload_b,
                path.push(PathStep::Variant(name.clone())),
            )),
            None => {
                variants.insert(name.clone(), *payload_b);
            }
        }
    }
    Ok(UnionTy {
        variants,
        expandable: union_a.expandable && union_b.expandable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ty(kind: TyKind) -> Ty {
        Ty::new(kind, Span::default())
    }

    fn object(ctx: &mut TypeContext, members: &[(&str, TyKind)], expandable: bool) -> TyVar {
        let members: BTreeMap<String, TyVar> = members
            .iter()
            .map(|(name, kind)| (name.to_string(), ctx.allocate(ty(kind.clone()))))
            .collect();
        ctx.allocate(ty(TyKind::Object(ObjectTy {
            members,
            expandable,
            order: None,
        })))
    }

    fn unify(ctx: &mut TypeContext, a: TyVar, b: TyVar) -> Result<(), TypeError> {
        ctx.unify(a, b, Span::default())
    }

    #[test]
    fn any_takes_the_other_side() {
        for kind in [TyKind::Unit, TyKind::Boolean, TyKind::Integer, TyKind::Float, TyKind::String] {
            let mut ctx = TypeContext::new();
            let any = ctx.fresh();
            let concrete = ctx.allocate(ty(kind.clone()));
            unify(&mut ctx, any, concrete).unwrap();
            assert_eq!(ctx.kind(any), kind);
        }
    }

    #[test]
    fn numeric_narrows_to_integer() {
        let mut ctx = TypeContext::new();
        let numeric = ctx.allocate(ty(TyKind::Numeric));
        let int = ctx.allocate(ty(TyKind::Integer));
        unify(&mut ctx, numeric, int).unwrap();
        assert_eq!(ctx.kind(numeric), TyKind::Integer);
    }

    #[test]
    fn numeric_rejects_string() {
        let mut ctx = TypeContext::new();
        let numeric = ctx.allocate(ty(TyKind::Numeric));
        let string = ctx.allocate(ty(TyKind::String));
        match unify(&mut ctx, numeric, string).unwrap_err() {
            TypeError::Incompatible { left, right, .. } => {
                assert_eq!(left, "a number");
                assert_eq!(right, "a string");
            }
            other => panic!("expected Incompatible, got {:?}", other),
        }
    }

    #[test]
    fn referenced_narrows_to_array() {
        let mut ctx = TypeContext::new();
        let referenced = ctx.allocate(ty(TyKind::Referenced));
        let elem = ctx.allocate(ty(TyKind::Integer));
        let array = ctx.allocate(ty(TyKind::Array(elem)));
        unify(&mut ctx, array, referenced).unwrap();
        assert_eq!(ctx.display(referenced), "[int]");
    }

    #[test]
    fn sequence_meets_string_and_reference() {
        let mut ctx = TypeContext::new();
        let sequence = ctx.allocate(ty(TyKind::Sequence));
        let string = ctx.allocate(ty(TyKind::String));
        unify(&mut ctx, sequence, string).unwrap();
        assert_eq!(ctx.kind(sequence), TyKind::String);

        let sequence = ctx.allocate(ty(TyKind::Sequence));
        let referenced = ctx.allocate(ty(TyKind::Referenced));
        unify(&mut ctx, referenced, sequence).unwrap();
        assert_eq!(ctx.kind(sequence), TyKind::Indexed);

        let sequence = ctx.allocate(ty(TyKind::Sequence));
        let open = object(&mut ctx, &[], true);
        assert!(unify(&mut ctx, sequence, open).is_err());
    }

    #[test]
    fn unification_is_order_independent() {
        let mut forward = TypeContext::new();
        let a = object(&mut forward, &[("x", TyKind::Integer)], true);
        let b = object(&mut forward, &[("y", TyKind::Boolean)], true);
        unify(&mut forward, a, b).unwrap();

        let mut backward = TypeContext::new();
        let c = object(&mut backward, &[("x", TyKind::Integer)], true);
        let d = object(&mut backward, &[("y", TyKind::Boolean)], true);
        unify(&mut backward, d, c).unwrap();

        assert_eq!(forward.display(a), backward.display(c));
        assert_eq!(forward.display(b), backward.display(d));
        assert_eq!(forward.display(a), forward.display(b));
    }

    #[test]
    fn open_objects_merge_members() {
        let mut ctx = TypeContext::new();
        let a = object(&mut ctx, &[("x", TyKind::Integer)], true);
        let b = object(&mut ctx, &[("x", TyKind::Integer), ("y", TyKind::Boolean)], true);
        unify(&mut ctx, a, b).unwrap();
        assert_eq!(ctx.display(a), "{ x = int, y = bool, .. }");
    }

    #[test]
    fn closed_objects_with_different_members_fail() {
        let mut ctx = TypeContext::new();
        let a = object(&mut ctx, &[("x", TyKind::Integer)], false);
        let b = object(&mut ctx, &[("y", TyKind::Boolean)], false);
        assert!(matches!(
            unify(&mut ctx, a, b),
            Err(TypeError::Incompatible { .. })
        ));
    }

    #[test]
    fn closed_object_accepts_open_subset() {
        let mut ctx = TypeContext::new();
        let closed = object(&mut ctx, &[("x", TyKind::Integer), ("y", TyKind::Boolean)], false);
        let open = object(&mut ctx, &[("x", TyKind::Integer)], true);
        unify(&mut ctx, open, closed).unwrap();
        assert_eq!(ctx.display(open), "{ x = int, y = bool }");
    }

    #[test]
    fn member_conflict_reports_path() {
        let mut ctx = TypeContext::new();
        let a = object(&mut ctx, &[("x", TyKind::Integer)], true);
        let b = object(&mut ctx, &[("x", TyKind::String)], true);
        match unify(&mut ctx, a, b).unwrap_err() {
            TypeError::Incompatible { path, .. } => {
                assert_eq!(path.to_string(), "the member `x`");
            }
            other => panic!("expected Incompatible, got {:?}", other),
        }
    }

    #[test]
    fn fixed_layouts_must_agree() {
        let mut ctx = TypeContext::new();
        let a = object(&mut ctx, &[("x", TyKind::Integer), ("y", TyKind::Integer)], false);
        let b = object(&mut ctx, &[("x", TyKind::Integer), ("y", TyKind::Integer)], false);
        for (var, order) in [(a, ["x", "y"]), (b, ["y", "x"])] {
            let mut current = ctx.get(var);
            if let TyKind::Object(object) = &mut current.kind {
                object.order = Some(order.iter().map(|s| s.to_string()).collect());
            }
            ctx.set(var, current);
        }
        assert!(matches!(
            unify(&mut ctx, a, b),
            Err(TypeError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn closure_arity_mismatch() {
        let mut ctx = TypeContext::new();
        let (x, y, r1, r2) = (ctx.fresh(), ctx.fresh(), ctx.fresh(), ctx.fresh());
        let one = ctx.allocate(ty(TyKind::Closure(crate::ty::ClosureTy {
            args: vec![x],
            returns: r1,
        })));
        let two = ctx.allocate(ty(TyKind::Closure(crate::ty::ClosureTy {
            args: vec![x, y],
            returns: r2,
        })));
        assert!(unify(&mut ctx, one, two).is_err());
    }

    #[test]
    fn deeply_nested_arrays_unify() {
        let mut ctx = TypeContext::new();
        let mut a = ctx.allocate(ty(TyKind::Integer));
        let mut b = ctx.fresh();
        for _ in 0..10_000 {
            a = ctx.allocate(ty(TyKind::Array(a)));
            b = ctx.allocate(ty(TyKind::Array(b)));
        }
        unify(&mut ctx, a, b).unwrap();
        assert!(ctx.same(a, b));
    }

    #[test]
    fn cyclic_types_terminate() {
        let mut ctx = TypeContext::new();
        let a = ctx.fresh();
        let b = ctx.fresh();
        ctx.set(a, ty(TyKind::Array(a)));
        ctx.set(b, ty(TyKind::Array(b)));
        unify(&mut ctx, a, b).unwrap();
        assert_eq!(ctx.display(a), "[...]");
    }
}
