//! Structural type representation.
//!
//! A [`TyVar`] is a handle into the [`TypeContext`](crate::ctx::TypeContext)
//! arena. The arena stores one [`Ty`] per union-find set: a [`TyKind`] plus
//! the span of the expression that most recently justified it.

use std::collections::BTreeMap;
use std::fmt;

use gera_common::Span;
use serde::Serialize;

/// A type variable, the key of one union-find slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TyVar(pub u32);

impl fmt::Display for TyVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ty {
    pub kind: TyKind,
    pub origin: Option<Span>,
}

impl Ty {
    pub fn new(kind: TyKind, origin: Span) -> Self {
        Ty {
            kind,
            origin: Some(origin),
        }
    }

    pub fn any() -> Self {
        Ty {
            kind: TyKind::Any,
            origin: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TyKind {
    // Placeholder categories.
    Any,
    Numeric,
    Indexed,
    Referenced,
    /// A string or an array, whichever a later use demands.
    Sequence,
    // Concrete kinds.
    Unit,
    Boolean,
    Integer,
    Float,
    String,
    Array(TyVar),
    Object(ObjectTy),
    Union(UnionTy),
    Closure(ClosureTy),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ObjectTy {
    pub members: BTreeMap<String, TyVar>,
    pub expandable: bool,
    /// Fixed member layout. Only the declared types of external variables
    /// set one; inference itself never fixes an order.
    pub order: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct UnionTy {
    pub variants: BTreeMap<String, TyVar>,
    pub expandable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClosureTy {
    pub args: Vec<TyVar>,
    pub returns: TyVar,
}

impl TyKind {
    pub fn open_object() -> Self {
        TyKind::Object(ObjectTy {
            members: BTreeMap::new(),
            expandable: true,
            order: None,
        })
    }

    pub fn open_union() -> Self {
        TyKind::Union(UnionTy {
            variants: BTreeMap::new(),
            expandable: true,
        })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            TyKind::Any | TyKind::Numeric | TyKind::Indexed | TyKind::Referenced | TyKind::Sequence
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TyKind::Numeric | TyKind::Integer | TyKind::Float)
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, TyKind::Indexed | TyKind::Array(_))
    }

    /// Values with a length.
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            TyKind::Sequence | TyKind::String | TyKind::Indexed | TyKind::Array(_)
        )
    }

    /// Indexed values are arrays, which are reference values too.
    pub fn is_referenced(&self) -> bool {
        matches!(
            self,
            TyKind::Referenced
                | TyKind::Indexed
                | TyKind::Array(_)
                | TyKind::Object(_)
                | TyKind::Closure(_)
        )
    }

    /// Type variables directly contained in this type, in a stable order.
    pub fn children(&self) -> Vec<TyVar> {
        match self {
            TyKind::Array(elem) => vec![*elem],
            TyKind::Object(object) => object.members.values().copied().collect(),
            TyKind::Union(union) => union.variants.values().copied().collect(),
            TyKind::Closure(closure) => {
                let mut vars = closure.args.clone();
                vars.push(closure.returns);
                vars
            }
            _ => Vec::new(),
        }
    }

    /// Rebuild this type with every contained variable passed through `f`.
    pub fn map_vars(&self, mut f: impl FnMut(TyVar) -> TyVar) -> TyKind {
        match self {
            TyKind::Array(elem) => TyKind::Array(f(*elem)),
            TyKind::Object(object) => TyKind::Object(ObjectTy {
                members: object
                    .members
                    .iter()
                    .map(|(name, var)| (name.clone(), f(*var)))
                    .collect(),
                expandable: object.expandable,
                order: object.order.clone(),
            }),
            TyKind::Union(union) => TyKind::Union(UnionTy {
                variants: union
                    .variants
                    .iter()
                    .map(|(name, var)| (name.clone(), f(*var)))
                    .collect(),
                expandable: union.expandable,
            }),
            TyKind::Closure(closure) => TyKind::Closure(ClosureTy {
                args: closure.args.iter().map(|arg| f(*arg)).collect(),
                returns: f(closure.returns),
            }),
            other => other.clone(),
        }
    }

    /// Short English description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TyKind::Any => "a value of any type",
            TyKind::Numeric => "a number",
            TyKind::Indexed => "an indexable value",
            TyKind::Referenced => "a reference value",
            TyKind::Sequence => "a string or an array",
            TyKind::Unit => "the unit value",
            TyKind::Boolean => "a boolean",
            TyKind::Integer => "an integer",
            TyKind::Float => "a float",
            TyKind::String => "a string",
            TyKind::Array(_) => "an array",
            TyKind::Object(_) => "an object",
            TyKind::Union(_) => "a union",
            TyKind::Closure(_) => "a closure",
        }
    }
}

impl fmt::Display for TyKind {
    /// Shallow rendering; nested types are shown as variables.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TyKind::Any => write!(f, "any"),
            TyKind::Numeric => write!(f, "numeric"),
            TyKind::Indexed => write!(f, "indexed"),
            TyKind::Referenced => write!(f, "referenced"),
            TyKind::Sequence => write!(f, "sequence"),
            TyKind::Unit => write!(f, "unit"),
            TyKind::Boolean => write!(f, "bool"),
            TyKind::Integer => write!(f, "int"),
            TyKind::Float => write!(f, "float"),
            TyKind::String => write!(f, "str"),
            TyKind::Array(elem) => write!(f, "[{}]", elem),
            TyKind::Object(_) => write!(f, "object"),
            TyKind::Union(_) => write!(f, "union"),
            TyKind::Closure(closure) => write!(f, "closure/{}", closure.args.len()),
        }
    }
}

/// The kinds an `IsType` constraint can demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Unit,
    Boolean,
    Integer,
    Float,
    String,
    Object,
    Union,
}

impl BaseKind {
    /// The empty instance a placeholder becomes under `IsType`.
    pub fn instantiate(self) -> TyKind {
        match self {
            BaseKind::Unit => TyKind::Unit,
            BaseKind::Boolean => TyKind::Boolean,
            BaseKind::Integer => TyKind::Integer,
            BaseKind::Float => TyKind::Float,
            BaseKind::String => TyKind::String,
            BaseKind::Object => TyKind::open_object(),
            BaseKind::Union => TyKind::open_union(),
        }
    }

    pub fn matches(self, kind: &TyKind) -> bool {
        matches!(
            (self, kind),
            (BaseKind::Unit, TyKind::Unit)
                | (BaseKind::Boolean, TyKind::Boolean)
                | (BaseKind::Integer, TyKind::Integer)
                | (BaseKind::Float, TyKind::Float)
                | (BaseKind::String, TyKind::String)
                | (BaseKind::Object, TyKind::Object(_))
                | (BaseKind::Union, TyKind::Union(_))
        )
    }

    /// Whether a placeholder of kind `placeholder` may narrow to this kind.
    pub fn refines(self, placeholder: &TyKind) -> bool {
        match placeholder {
            TyKind::Any => true,
            TyKind::Numeric => matches!(self, BaseKind::Integer | BaseKind::Float),
            TyKind::Referenced => matches!(self, BaseKind::Object),
            TyKind::Sequence => matches!(self, BaseKind::String),
            _ => false,
        }
    }
}

// ── ena integration ────────────────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Ty;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

/// Merging two sets in the table keeps the second value. The context
/// always installs the reconciled type on the merged root right after,
/// so the table never has to compute types itself.
impl ena::unify::UnifyValue for Ty {
    type Error = ena::unify::NoError;

    fn unify_values(_old: &Self, new: &Self) -> Result<Self, Self::Error> {
        Ok(new.clone())
    }
}
