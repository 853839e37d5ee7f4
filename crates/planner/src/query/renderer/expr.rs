use crate::query::{
    ast::expr::{BinaryOperator, Expr},
    renderer::{Render, Renderer},
};

impl Render for Expr {
    fn render(&self, r: &mut Renderer) {
        match self {
            Expr::Identifier(ident) => {
                if let Some(q) = &ident.qualifier {
                    r.sql.push_str(&r.dialect.quote_identifier(q));
                    r.sql.push('.');
                }
                r.sql.push_str(&r.dialect.quote_identifier(&ident.name));
            }
            Expr::Value(v) => r.add_param(v.clone()),
            Expr::BinaryOp(op) => {
                let wrap = op.op == BinaryOperator::And;
                if wrap {
                    r.sql.push('(');
                }
                op.left.render(r);
                r.sql.push(' ');
                r.sql.push_str(op.op.as_sql());
                r.sql.push(' ');
                op.right.render(r);
                if wrap {
                    r.sql.push(')');
                }
            }
            Expr::FunctionCall { name, args } => {
                r.sql.push_str(name);
                r.sql.push('(');
                r.render_list(args, ", ");
                r.sql.push(')');
            }
            Expr::Alias { expr, alias } => {
                expr.render(r);
                r.sql.push_str(" AS ");
                r.sql.push_str(&r.dialect.quote_identifier(alias));
            }
            Expr::Raw(fragment) => r.sql.push_str(fragment),
        }
    }
}

impl BinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::And => "AND",
        }
    }
}
