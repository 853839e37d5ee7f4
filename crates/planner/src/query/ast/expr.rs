//! Expression nodes used in WHERE clauses and projections.

use model::core::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub qualifier: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Gt,
    GtEq,
    LtEq,
    And,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    pub left: Expr,
    pub op: BinaryOperator,
    pub right: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(Ident),
    /// Bound as a query parameter.
    Value(Value),
    BinaryOp(Box<BinaryOp>),
    FunctionCall { name: String, args: Vec<Expr> },
    Alias { expr: Box<Expr>, alias: String },
    /// Dialect-specific fragment rendered verbatim.
    Raw(String),
}

impl Expr {
    pub fn and(self, other: Expr) -> Expr {
        Expr::BinaryOp(Box::new(BinaryOp {
            left: self,
            op: BinaryOperator::And,
            right: other,
        }))
    }

    pub fn alias(self, alias: &str) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.to_string(),
        }
    }
}
