//! Rendering criteria to parameterised SQL
//!
//! Every value is bound through a positional `?` placeholder; attribute
//! names are resolved to quoted columns through the descriptor, so unknown
//! attributes are rejected before any SQL reaches the engine.

use super::{Criteria, Restriction};
use crate::entity::{quote_ident, Entity, EntityDescriptor};
use crate::errors::Result;
use rusqlite::types::Value;

/// SQL fragment with its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Criteria {
    /// Render the restrictions as ` WHERE ...`, or an empty fragment
    pub fn render_where<T: Entity>(&self, descriptor: &EntityDescriptor<T>) -> Result<RenderedSql> {
        let mut out = RenderedSql::default();
        if self.restrictions().is_empty() {
            return Ok(out);
        }

        let mut clauses = Vec::with_capacity(self.restrictions().len());
        for restriction in self.restrictions() {
            clauses.push(render_restriction(restriction, descriptor, &mut out.params)?);
        }
        out.sql = format!(" WHERE {}", clauses.join(" AND "));
        Ok(out)
    }

    /// Render the ordering as ` ORDER BY ...`
    ///
    /// With `fallback_to_id`, criteria without an explicit order are sorted
    /// by identifier so that pages are deterministic.
    pub fn render_order<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        fallback_to_id: bool,
    ) -> Result<String> {
        if !self.has_order() {
            return Ok(if fallback_to_id {
                format!(" ORDER BY {} ASC", descriptor.quoted_id_column())
            } else {
                String::new()
            });
        }

        let mut keys = Vec::with_capacity(self.orders().len());
        for order in self.orders() {
            let column = descriptor.column_for(&order.attribute)?;
            let direction = if order.ascending { "ASC" } else { "DESC" };
            keys.push(format!("{} {}", quote_ident(column), direction));
        }
        // Ties are broken by identifier so pages never overlap
        let id = descriptor.id_attribute().name();
        if fallback_to_id && self.orders().iter().all(|o| o.attribute != id) {
            keys.push(format!("{} ASC", descriptor.quoted_id_column()));
        }
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }
}

fn render_restriction<T: Entity>(
    restriction: &Restriction,
    descriptor: &EntityDescriptor<T>,
    params: &mut Vec<Value>,
) -> Result<String> {
    let column = |attribute: &str| descriptor.column_for(attribute).map(quote_ident);

    let sql = match restriction {
        Restriction::Compare {
            attribute,
            op,
            value,
        } => {
            let col = column(attribute)?;
            params.push(value.clone());
            format!("{} {} ?", col, op.sql())
        }
        Restriction::In { attribute, values } => {
            let col = column(attribute)?;
            if values.is_empty() {
                "0".to_string()
            } else {
                params.extend(values.iter().cloned());
                let marks = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", col, marks)
            }
        }
        Restriction::Like { attribute, pattern } => {
            let col = column(attribute)?;
            params.push(Value::Text(pattern.clone()));
            format!("{} LIKE ?", col)
        }
        Restriction::IsNull(attribute) => format!("{} IS NULL", column(attribute)?),
        Restriction::IsNotNull(attribute) => format!("{} IS NOT NULL", column(attribute)?),
        Restriction::Or(members) => render_group(members, " OR ", "0", descriptor, params)?,
        Restriction::And(members) => render_group(members, " AND ", "1", descriptor, params)?,
        Restriction::Not(inner) => {
            format!("NOT ({})", render_restriction(inner, descriptor, params)?)
        }
    };
    Ok(sql)
}

fn render_group<T: Entity>(
    members: &[Restriction],
    joiner: &str,
    empty: &str,
    descriptor: &EntityDescriptor<T>,
    params: &mut Vec<Value>,
) -> Result<String> {
    if members.is_empty() {
        return Ok(empty.to_string());
    }
    let mut parts = Vec::with_capacity(members.len());
    for member in members {
        parts.push(render_restriction(member, descriptor, params)?);
    }
    Ok(format!("({})", parts.join(joiner)))
}
