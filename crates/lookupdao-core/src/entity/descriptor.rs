//! Entity descriptor discovery
//!
//! Discovery validates an entity's attribute declarations once, when its
//! repository is created, and resolves them into [`BoundAttribute`]s whose
//! accessors are guaranteed present. Everything downstream (row mapping,
//! DDL, criteria rendering, managed queries) works off the descriptor.

use super::{quote_ident, Attribute, Entity, Getter, Marker, Setter, SqlType};
use crate::errors::{DaoError, Result};
use rusqlite::types::Value;
use rusqlite::Row;
use std::collections::HashSet;

/// An attribute whose accessors were verified during discovery
pub struct BoundAttribute<T> {
    name: &'static str,
    column: &'static str,
    sql_type: SqlType,
    nullable: bool,
    unique: bool,
    marker: Option<Marker>,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Clone for BoundAttribute<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BoundAttribute<T> {}

impl<T> std::fmt::Debug for BoundAttribute<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAttribute")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("sql_type", &self.sql_type)
            .finish()
    }
}

impl<T> BoundAttribute<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Read this attribute from an instance
    pub fn get(&self, entity: &T) -> Value {
        (self.get)(entity)
    }

    /// Write a stored value into an instance
    pub fn set(&self, entity: &mut T, value: &Value) -> rusqlite::types::FromSqlResult<()> {
        (self.set)(entity, value)
    }

    /// Column definition for `CREATE TABLE`
    fn column_ddl(&self) -> String {
        let mut ddl = format!("{} {}", quote_ident(self.column), self.sql_type.ddl());
        match self.marker {
            Some(Marker::Identifier) => ddl.push_str(" PRIMARY KEY AUTOINCREMENT"),
            _ => {
                if !self.nullable {
                    ddl.push_str(" NOT NULL");
                }
                if self.unique {
                    ddl.push_str(" UNIQUE");
                }
            }
        }
        ddl
    }
}

/// Validated persistent shape of an entity type
pub struct EntityDescriptor<T> {
    attributes: Vec<BoundAttribute<T>>,
    id_index: usize,
    key_index: usize,
}

impl<T> Clone for EntityDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            id_index: self.id_index,
            key_index: self.key_index,
        }
    }
}

impl<T> std::fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("attributes", &self.attributes)
            .field("id_index", &self.id_index)
            .field("key_index", &self.key_index)
            .finish()
    }
}

impl<T: Entity> EntityDescriptor<T> {
    /// Validate `T::attributes()` and build the descriptor
    ///
    /// # Errors
    ///
    /// `Configuration` when the entity declares no identifier or lookup key,
    /// more than one of either, an identifier that is not integral, a lookup
    /// key that is not a string, an attribute without accessors, or two
    /// attributes sharing a name or column.
    pub fn discover() -> Result<Self> {
        Self::from_attributes(T::attributes())
    }

    pub(crate) fn from_attributes(declared: Vec<Attribute<T>>) -> Result<Self> {
        let fail = |reason: String| Err(DaoError::configuration(T::NAME, reason));

        if T::TABLE.trim().is_empty() {
            return fail("table name is empty".to_string());
        }

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        let mut id_index = None;
        let mut key_index = None;
        let mut attributes = Vec::with_capacity(declared.len());

        for (index, attr) in declared.iter().enumerate() {
            if !names.insert(attr.name()) {
                return fail(format!("attribute '{}' declared twice", attr.name()));
            }
            if !columns.insert(attr.column().to_ascii_lowercase()) {
                return fail(format!("column '{}' mapped twice", attr.column()));
            }

            match attr.marker() {
                Some(Marker::Identifier) => {
                    if id_index.replace(index).is_some() {
                        return fail("More than one identifier attribute found".to_string());
                    }
                    if attr.sql_type() != SqlType::Integer {
                        return fail(format!(
                            "identifier '{}' must be an integer attribute",
                            attr.name()
                        ));
                    }
                }
                Some(Marker::LookupKey) => {
                    if key_index.replace(index).is_some() {
                        return fail("More than one lookup key attribute found".to_string());
                    }
                    if attr.sql_type() != SqlType::Text {
                        return fail(format!(
                            "lookup key '{}' must be a text attribute",
                            attr.name()
                        ));
                    }
                }
                None => {}
            }

            let (Some(get), Some(set)) = (attr.getter(), attr.setter()) else {
                return fail(format!("attribute '{}' has no accessors", attr.name()));
            };

            attributes.push(BoundAttribute {
                name: attr.name(),
                column: attr.column(),
                sql_type: attr.sql_type(),
                nullable: attr.is_nullable(),
                unique: attr.is_unique(),
                marker: attr.marker(),
                get,
                set,
            });
        }

        let Some(id_index) = id_index else {
            return fail("No identifier attribute found".to_string());
        };
        let Some(key_index) = key_index else {
            return fail("No lookup key attribute found".to_string());
        };

        Ok(Self {
            attributes,
            id_index,
            key_index,
        })
    }

    pub fn entity_name(&self) -> &'static str {
        T::NAME
    }

    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    pub fn attributes(&self) -> &[BoundAttribute<T>] {
        &self.attributes
    }

    pub fn id_attribute(&self) -> &BoundAttribute<T> {
        &self.attributes[self.id_index]
    }

    pub fn key_attribute(&self) -> &BoundAttribute<T> {
        &self.attributes[self.key_index]
    }

    /// Find an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&BoundAttribute<T>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Resolve an attribute name, rejecting unknown names
    pub fn require(&self, name: &str) -> Result<&BoundAttribute<T>> {
        self.attribute(name).ok_or_else(|| {
            DaoError::validation(format!("{} has no attribute '{}'", T::NAME, name))
        })
    }

    /// Storage column of an attribute
    pub fn column_for(&self, name: &str) -> Result<&'static str> {
        self.require(name).map(|a| a.column)
    }

    /// Identifier of an instance, `None` while it is unsaved
    pub fn id_of(&self, entity: &T) -> Option<i64> {
        match self.id_attribute().get(entity) {
            Value::Integer(0) | Value::Null => None,
            Value::Integer(id) => Some(id),
            _ => None,
        }
    }

    /// Write a generated identifier back into an instance
    pub fn set_id(&self, entity: &mut T, id: i64) -> Result<()> {
        self.id_attribute()
            .set(entity, &Value::Integer(id))
            .map_err(|e| DaoError::operation("set_id", e))
    }

    /// Lookup key of an instance
    pub fn key_of(&self, entity: &T) -> Option<String> {
        match self.key_attribute().get(entity) {
            Value::Text(key) => Some(key),
            _ => None,
        }
    }

    /// All attribute values, in attribute order
    pub fn values(&self, entity: &T) -> Vec<Value> {
        self.attributes.iter().map(|a| a.get(entity)).collect()
    }

    /// Build an instance from a row carrying every mapped column
    pub fn from_row(&self, row: &Row<'_>) -> rusqlite::Result<T> {
        let mut entity = T::default();
        for (index, attr) in self.attributes.iter().enumerate() {
            let value: Value = row.get(attr.column)?;
            attr.set(&mut entity, &value).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(index, value.data_type(), Box::new(e))
            })?;
        }
        Ok(entity)
    }

    /// Build an instance from stored values in attribute order
    pub fn from_values(&self, values: &[Value]) -> Result<T> {
        let mut entity = T::default();
        for (attr, value) in self.attributes.iter().zip(values) {
            attr.set(&mut entity, value)
                .map_err(|e| DaoError::operation("from_values", e))?;
        }
        Ok(entity)
    }

    /// Quoted column list in attribute order
    pub fn select_list(&self) -> String {
        self.attributes
            .iter()
            .map(|a| quote_ident(a.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn quoted_table(&self) -> String {
        quote_ident(T::TABLE)
    }

    pub fn quoted_id_column(&self) -> String {
        quote_ident(self.id_attribute().column)
    }

    pub fn create_table_sql(&self) -> String {
        let columns = self
            .attributes
            .iter()
            .map(|a| a.column_ddl())
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.quoted_table(), columns)
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quoted_table())
    }
}
