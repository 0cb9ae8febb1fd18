//! Schema creation from registered entity descriptors
//!
//! With `create_schema` enabled a store runs in create-drop mode: every
//! registered table is dropped and recreated when the entity is registered,
//! and dropped again when the store is closed.

use crate::errors::{from_rusqlite, Result};
use lookupdao_core::entity::{Entity, EntityDescriptor};
use rusqlite::Connection;

/// DDL for one registered entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub entity: &'static str,
    pub table: &'static str,
    pub create_sql: String,
    pub drop_sql: String,
}

impl TableSchema {
    pub fn of<T: Entity>(descriptor: &EntityDescriptor<T>) -> Self {
        Self {
            entity: T::NAME,
            table: T::TABLE,
            create_sql: descriptor.create_table_sql(),
            drop_sql: descriptor.drop_table_sql(),
        }
    }
}

/// Drop and recreate the table in one transaction
pub fn recreate(conn: &Connection, schema: &TableSchema) -> Result<()> {
    let batch = format!(
        "BEGIN IMMEDIATE; {}; {}; COMMIT;",
        schema.drop_sql, schema.create_sql
    );
    if let Err(err) = conn.execute_batch(&batch) {
        if !conn.is_autocommit() {
            let _ = conn.execute_batch("ROLLBACK");
        }
        return Err(from_rusqlite("schema.recreate")(err));
    }
    tracing::debug!(
        component = module_path!(),
        entity = schema.entity,
        table = schema.table,
        "table recreated"
    );
    Ok(())
}

/// Drop every listed table, in reverse registration order
pub fn drop_all(conn: &Connection, schemas: &[TableSchema]) -> Result<()> {
    for schema in schemas.iter().rev() {
        conn.execute_batch(&schema.drop_sql)
            .map_err(from_rusqlite("schema.drop"))?;
        tracing::debug!(component = module_path!(), table = schema.table, "table dropped");
    }
    Ok(())
}
