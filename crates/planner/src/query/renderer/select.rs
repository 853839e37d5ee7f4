use crate::query::{
    ast::{common::OrderDir, select::Select},
    renderer::{Render, Renderer},
};

impl Render for Select {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("SELECT ");
        r.render_list(&self.columns, ", ");

        if let Some(from) = &self.from {
            r.sql.push_str(" FROM ");
            r.render_table_ref(from);
        }

        if let Some(cond) = &self.where_clause {
            r.sql.push_str(" WHERE ");
            cond.render(r);
        }

        if !self.order_by.is_empty() {
            r.sql.push_str(" ORDER BY ");
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    r.sql.push_str(", ");
                }
                order.expr.render(r);
                match order.direction {
                    Some(OrderDir::Asc) => r.sql.push_str(" ASC"),
                    Some(OrderDir::Desc) => r.sql.push_str(" DESC"),
                    None => {}
                }
            }
        }

        if let Some(limit) = self.limit {
            r.sql.push_str(&format!(" LIMIT {limit}"));
        }
    }
}
