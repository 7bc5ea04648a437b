//! Shorthand constructors for syntax trees.
//!
//! Front ends and tests use these to assemble `Node<()>` trees without
//! spelling out every `Box` and span. All nodes get the default span; use
//! [`Node::at`] to attach a real one.

use crate::ast::{BinaryOp, Node, NodeKind, UnaryOp, VariantBranch};
use crate::path::Path;
use crate::span::Span;

fn node(kind: NodeKind) -> Node {
    Node::new(kind, Span::default())
}

pub fn int(value: i64) -> Node {
    node(NodeKind::Integer(value))
}

pub fn float(value: f64) -> Node {
    node(NodeKind::Float(value))
}

pub fn boolean(value: bool) -> Node {
    node(NodeKind::Boolean(value))
}

pub fn string(value: &str) -> Node {
    node(NodeKind::String(value.to_string()))
}

pub fn unit() -> Node {
    node(NodeKind::Unit)
}

/// A reference to `path`, which may be a local name or a module path.
pub fn name(path: &str) -> Node {
    node(NodeKind::ModuleAccess(Path::parse(path)))
}

/// `name = value` for an immutable binding.
pub fn let_(name: &str, value: Node) -> Node {
    node(NodeKind::Variable {
        name: name.to_string(),
        mutable: false,
        value: Some(Box::new(value)),
    })
}

/// `mut name = value`.
pub fn mut_(name: &str, value: Node) -> Node {
    node(NodeKind::Variable {
        name: name.to_string(),
        mutable: true,
        value: Some(Box::new(value)),
    })
}

/// A declaration without an initial value.
pub fn declare(name: &str, mutable: bool) -> Node {
    node(NodeKind::Variable {
        name: name.to_string(),
        mutable,
        value: None,
    })
}

pub fn assign(target: Node, value: Node) -> Node {
    node(NodeKind::Assignment {
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn ret(value: Node) -> Node {
    node(NodeKind::Return(Box::new(value)))
}

pub fn call(called: Node, args: Vec<Node>) -> Node {
    node(NodeKind::Call {
        called: Box::new(called),
        args,
    })
}

/// `callee(args)` where the callee is written as a path.
pub fn call_path(callee: &str, args: Vec<Node>) -> Node {
    call(name(callee), args)
}

pub fn method(receiver: Node, member: &str, args: Vec<Node>) -> Node {
    node(NodeKind::MethodCall {
        receiver: Box::new(receiver),
        member: member.to_string(),
        args,
    })
}

pub fn object(members: Vec<(&str, Node)>) -> Node {
    node(NodeKind::ObjectLiteral(
        members
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    ))
}

pub fn array(values: Vec<Node>) -> Node {
    node(NodeKind::ArrayLiteral(values))
}

pub fn repeat(value: Node, size: Node) -> Node {
    node(NodeKind::RepeatingArrayLiteral {
        value: Box::new(value),
        size: Box::new(size),
    })
}

pub fn member(accessed: Node, member: &str) -> Node {
    node(NodeKind::ObjectAccess {
        accessed: Box::new(accessed),
        member: member.to_string(),
    })
}

pub fn index(accessed: Node, index: Node) -> Node {
    node(NodeKind::ArrayAccess {
        accessed: Box::new(accessed),
        index: Box::new(index),
    })
}

pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
    node(NodeKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn add(left: Node, right: Node) -> Node {
    binary(BinaryOp::Add, left, right)
}

pub fn less_than(left: Node, right: Node) -> Node {
    binary(BinaryOp::LessThan, left, right)
}

pub fn equals(left: Node, right: Node) -> Node {
    binary(BinaryOp::Equals, left, right)
}

pub fn and(left: Node, right: Node) -> Node {
    binary(BinaryOp::And, left, right)
}

pub fn or(left: Node, right: Node) -> Node {
    binary(BinaryOp::Or, left, right)
}

pub fn not(value: Node) -> Node {
    node(NodeKind::Unary {
        op: UnaryOp::Not,
        value: Box::new(value),
    })
}

pub fn negate(value: Node) -> Node {
    node(NodeKind::Unary {
        op: UnaryOp::Negate,
        value: Box::new(value),
    })
}

pub fn closure(params: &[&str], body: Vec<Node>) -> Node {
    node(NodeKind::Closure {
        params: params.iter().map(|p| p.to_string()).collect(),
        body,
        info: None,
    })
}

/// `case value { b0 -> ... b1 -> ... } else { ... }`.
pub fn case_value(value: Node, branches: Vec<(Node, Vec<Node>)>, else_body: Vec<Node>) -> Node {
    let (branch_values, branch_bodies): (Vec<Node>, Vec<Vec<Node>>) = branches.into_iter().unzip();
    node(NodeKind::CaseBranching {
        value: Box::new(value),
        branch_values,
        branch_bodies,
        else_body,
    })
}

/// `case condition { ... } else { ... }`. An empty else body means no else.
pub fn case_if(condition: Node, if_body: Vec<Node>, else_body: Vec<Node>) -> Node {
    node(NodeKind::CaseConditional {
        condition: Box::new(condition),
        if_body,
        else_body,
    })
}

/// `case value { #variant binding -> ... }` with an optional else body.
pub fn case_variant(
    value: Node,
    branches: Vec<(&str, Option<&str>, Vec<Node>)>,
    else_body: Option<Vec<Node>>,
) -> Node {
    node(NodeKind::CaseVariant {
        value: Box::new(value),
        branches: branches
            .into_iter()
            .map(|(variant, binding, body)| VariantBranch {
                variant: variant.to_string(),
                binding: binding.map(str::to_string),
                body,
                payload: (),
            })
            .collect(),
        else_body,
    })
}

/// `#variant value`.
pub fn variant(name: &str, value: Node) -> Node {
    node(NodeKind::VariantLiteral {
        variant: name.to_string(),
        value: Box::new(value),
    })
}

pub fn unwrap(value: Node, variant: &str) -> Node {
    node(NodeKind::VariantUnwrap {
        value: Box::new(value),
        variant: variant.to_string(),
    })
}

pub fn static_(value: Node) -> Node {
    node(NodeKind::Static(Box::new(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn builds_nested_call() {
        let tree = call_path("core::length", vec![array(vec![int(1), int(2)])]);
        match tree.kind {
            NodeKind::Call { called, args } => {
                assert_eq!(called.kind, NodeKind::ModuleAccess(Path::parse("core::length")));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn at_overrides_span() {
        let span = Span::new(FileId(1), 4, 9);
        assert_eq!(int(3).at(span).span, span);
    }
}
