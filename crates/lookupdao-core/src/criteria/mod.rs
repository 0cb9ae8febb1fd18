//! Declarative query specification
//!
//! A [`Criteria`] is a conjunction of [`Restriction`]s plus an optional
//! ordering, expressed in attribute names. It is rendered to a parameterised
//! SQL fragment against an entity descriptor (see [`render`]), so filtering
//! always happens in the engine.

pub mod render;

pub use render::RenderedSql;

use rusqlite::types::Value;

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// One filter condition, naming attributes rather than columns
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    Compare {
        attribute: String,
        op: CompareOp,
        value: Value,
    },
    In {
        attribute: String,
        values: Vec<Value>,
    },
    Like {
        attribute: String,
        pattern: String,
    },
    IsNull(String),
    IsNotNull(String),
    /// True when any member holds; an empty group matches nothing
    Or(Vec<Restriction>),
    /// True when every member holds; an empty group matches everything
    And(Vec<Restriction>),
    Not(Box<Restriction>),
}

impl Restriction {
    pub fn compare(attribute: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Restriction::Compare {
            attribute: attribute.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Eq, value)
    }

    pub fn ne(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ne, value)
    }

    pub fn gt(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Gt, value)
    }

    pub fn ge(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ge, value)
    }

    pub fn lt(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Lt, value)
    }

    pub fn le(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Le, value)
    }

    pub fn is_in<V: Into<Value>>(attribute: &str, values: impl IntoIterator<Item = V>) -> Self {
        Restriction::In {
            attribute: attribute.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like(attribute: &str, pattern: impl Into<String>) -> Self {
        Restriction::Like {
            attribute: attribute.to_string(),
            pattern: pattern.into(),
        }
    }

    pub fn is_null(attribute: &str) -> Self {
        Restriction::IsNull(attribute.to_string())
    }

    pub fn is_not_null(attribute: &str) -> Self {
        Restriction::IsNotNull(attribute.to_string())
    }

    pub fn or(members: Vec<Restriction>) -> Self {
        Restriction::Or(members)
    }

    pub fn and(members: Vec<Restriction>) -> Self {
        Restriction::And(members)
    }

    pub fn negate(self) -> Self {
        Restriction::Not(Box::new(self))
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub attribute: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            ascending: true,
        }
    }

    pub fn desc(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            ascending: false,
        }
    }
}

/// Conjunction of restrictions with ordering
///
/// # Example
///
/// ```
/// use lookupdao_core::{Criteria, Order, Restriction};
///
/// let criteria = Criteria::new()
///     .eq("text", "1".to_string())
///     .add(Restriction::or(vec![
///         Restriction::is_null("amount"),
///         Restriction::gt("amount", 10.0),
///     ]))
///     .order_by(Order::desc("id"));
/// assert_eq!(criteria.restrictions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    restrictions: Vec<Restriction>,
    orders: Vec<Order>,
}

impl Criteria {
    /// Criteria matching every row
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    pub fn eq(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::eq(attribute, value))
    }

    pub fn ne(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::ne(attribute, value))
    }

    pub fn gt(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::gt(attribute, value))
    }

    pub fn ge(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::ge(attribute, value))
    }

    pub fn lt(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::lt(attribute, value))
    }

    pub fn le(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.add(Restriction::le(attribute, value))
    }

    pub fn is_in<V: Into<Value>>(self, attribute: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.add(Restriction::is_in(attribute, values))
    }

    pub fn like(self, attribute: &str, pattern: impl Into<String>) -> Self {
        self.add(Restriction::like(attribute, pattern))
    }

    pub fn is_null(self, attribute: &str) -> Self {
        self.add(Restriction::is_null(attribute))
    }

    pub fn is_not_null(self, attribute: &str) -> Self {
        self.add(Restriction::is_not_null(attribute))
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn has_order(&self) -> bool {
        !self.orders.is_empty()
    }
}
