//! Value expressions resolved against a frame.
//!
//! Output clauses and query inputs are built from expressions: literals,
//! variable references, and records or lists of further expressions.
//! Unlike patterns there is no wildcard: every position must produce a
//! concrete value.

use std::fmt;

use syncline_foundation::{Error, Fields, Name, Result, Value};

use crate::frame::{Frame, Variable};

/// An expression producing one value from a frame.
#[derive(Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// The value bound to a variable.
    Var(Variable),
    /// A record built field by field.
    Record(Vec<(Name, Expr)>),
    /// A list built item by item.
    List(Vec<Expr>),
}

impl Expr {
    /// Builds a record expression.
    pub fn record<N, E, I>(fields: I) -> Self
    where
        N: Into<Name>,
        E: Into<Expr>,
        I: IntoIterator<Item = (N, E)>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(n, e)| (n.into(), e.into()))
                .collect(),
        )
    }

    /// Builds a list expression.
    pub fn list<E, I>(items: I) -> Self
    where
        E: Into<Expr>,
        I: IntoIterator<Item = E>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Resolves the expression against a frame.
    ///
    /// # Errors
    ///
    /// Returns `UnboundVariable` if a referenced variable is not bound.
    pub fn resolve(&self, frame: &Frame) -> Result<Value> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Var(v) => frame
                .get(v)
                .cloned()
                .ok_or_else(|| Error::unbound_variable(v.name())),
            Self::Record(fields) => Ok(Value::Record(resolve_fields(fields, frame)?)),
            Self::List(items) => items
                .iter()
                .map(|item| item.resolve(frame))
                .collect::<Result<Vec<_>>>()
                .map(Value::from),
        }
    }

    /// Collects every variable referenced, in order.
    pub fn variables_into(&self, out: &mut Vec<Variable>) {
        match self {
            Self::Literal(_) => {}
            Self::Var(v) => out.push(v.clone()),
            Self::Record(fields) => {
                for (_, e) in fields {
                    e.variables_into(out);
                }
            }
            Self::List(items) => {
                for e in items {
                    e.variables_into(out);
                }
            }
        }
    }
}

/// Resolves named expressions into a record's fields.
///
/// # Errors
///
/// Returns `UnboundVariable` for the first unbound reference.
pub fn resolve_fields(fields: &[(Name, Expr)], frame: &Frame) -> Result<Fields> {
    fields
        .iter()
        .map(|(name, e)| Ok((name.clone(), e.resolve(frame)?)))
        .collect()
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Var(v) => write!(f, "{v}"),
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {e:?}")?;
                }
                write!(f, "}}")
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{e:?}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        Self::Var(v)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

macro_rules! literal_exprs {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Self::Literal(Value::from(v))
                }
            }
        )*
    };
}

literal_exprs!(bool, i64, i32, f64, &str, String);
