use crate::query::ast::{
    common::{OrderDir, TableRef},
    expr::{BinaryOp, BinaryOperator, Expr},
    select::{OrderByExpr, Select},
};

#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    pub ast: Select,
}

impl SelectBuilder {
    pub fn new(columns: Vec<Expr>) -> Self {
        Self {
            ast: Select {
                columns,
                ..Default::default()
            },
        }
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.ast.from = Some(table);
        self
    }

    /// ANDs `cond` onto any existing WHERE clause.
    pub fn and_where(mut self, cond: Expr) -> Self {
        self.ast.where_clause = Some(match self.ast.where_clause.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    pub fn compare(self, column: Expr, op: BinaryOperator, value: Expr) -> Self {
        self.and_where(Expr::BinaryOp(Box::new(BinaryOp {
            left: column,
            op,
            right: value,
        })))
    }

    pub fn order_by(mut self, expr: Expr, direction: Option<OrderDir>) -> Self {
        self.ast.order_by.push(OrderByExpr { expr, direction });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.ast.limit = Some(limit);
        self
    }

    pub fn build(self) -> Select {
        self.ast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ident, value};
    use model::core::value::Value;

    #[test]
    fn chains_where_conditions_with_and() {
        let ast = SelectBuilder::new(vec![ident("id")])
            .from(TableRef::new("t"))
            .compare(ident("id"), BinaryOperator::Gt, value(Value::Int(1)))
            .compare(ident("id"), BinaryOperator::LtEq, value(Value::Int(9)))
            .build();

        match ast.where_clause {
            Some(Expr::BinaryOp(op)) => assert_eq!(op.op, BinaryOperator::And),
            other => panic!("unexpected where clause: {other:?}"),
        }
    }
}
