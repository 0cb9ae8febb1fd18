//! Entity declarations
//!
//! An entity type describes its persistent shape once, through
//! [`Entity::attributes`]. Each attribute carries plain function-pointer
//! accessors, so a repository can read and write instances without any
//! runtime reflection. Exactly one attribute is marked as the identifier and
//! exactly one as the lookup key; [`EntityDescriptor::discover`] enforces that.

pub mod descriptor;

pub use descriptor::{BoundAttribute, EntityDescriptor};

use rusqlite::types::{FromSql, FromSqlResult, Value, ValueRef};

/// Reads an attribute out of an instance as a storable value
pub type Getter<T> = fn(&T) -> Value;

/// Writes a stored value back into an instance
pub type Setter<T> = fn(&mut T, &Value) -> FromSqlResult<()>;

/// Storage type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

impl SqlType {
    /// Column type used in generated DDL
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Integer | SqlType::Boolean => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }

    /// Whether sum/min/max make sense over this type
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Real)
    }
}

/// Role an attribute plays for its repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Unique, system-generated integral key
    Identifier,
    /// Caller-meaningful string key used by `lookup`
    LookupKey,
}

/// Declaration of one persistent attribute of `T`
pub struct Attribute<T> {
    name: &'static str,
    column: &'static str,
    sql_type: SqlType,
    nullable: bool,
    unique: bool,
    marker: Option<Marker>,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
}

// Manual impls: deriving would demand `T: Clone`.
impl<T> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Attribute<T> {}

impl<T> std::fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("sql_type", &self.sql_type)
            .field("marker", &self.marker)
            .finish()
    }
}

impl<T> Attribute<T> {
    /// Declare an attribute stored in a column of the same name
    pub fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column: name,
            sql_type,
            nullable: false,
            unique: false,
            marker: None,
            getter: None,
            setter: None,
        }
    }

    /// Store the attribute under a different column name
    pub fn with_column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    /// Mark as the identifier attribute
    pub fn identifier(mut self) -> Self {
        self.marker = Some(Marker::Identifier);
        self
    }

    /// Mark as the lookup key attribute
    pub fn lookup_key(mut self) -> Self {
        self.marker = Some(Marker::LookupKey);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_getter(mut self, getter: Getter<T>) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn with_setter(mut self, setter: Setter<T>) -> Self {
        self.setter = Some(setter);
        self
    }

    /// Bind both accessors at once
    pub fn with_accessors(self, getter: Getter<T>, setter: Setter<T>) -> Self {
        self.with_getter(getter).with_setter(setter)
    }

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

    pub(crate) fn getter(&self) -> Option<Getter<T>> {
        self.getter
    }

    pub(crate) fn setter(&self) -> Option<Setter<T>> {
        self.setter
    }
}

/// A record type managed by one repository
///
/// # Example
///
/// ```
/// use lookupdao_core::entity::{from_value, Attribute, Entity, SqlType};
///
/// #[derive(Clone, Default)]
/// struct Account {
///     id: i64,
///     handle: String,
/// }
///
/// impl Entity for Account {
///     const NAME: &'static str = "Account";
///     const TABLE: &'static str = "accounts";
///
///     fn attributes() -> Vec<Attribute<Self>> {
///         vec![
///             Attribute::<Self>::new("id", SqlType::Integer)
///                 .identifier()
///                 .with_accessors(|e| e.id.into(), |e, v| {
///                     e.id = from_value(v)?;
///                     Ok(())
///                 }),
///             Attribute::<Self>::new("handle", SqlType::Text)
///                 .lookup_key()
///                 .with_accessors(|e| e.handle.clone().into(), |e, v| {
///                     e.handle = from_value(v)?;
///                     Ok(())
///                 }),
///         ]
///     }
/// }
/// ```
pub trait Entity: Clone + Default + Send + Sync + 'static {
    /// Entity name used by managed queries (`update Account a set ...`)
    const NAME: &'static str;
    /// Storage table
    const TABLE: &'static str;

    /// Persistent attributes, in column order
    fn attributes() -> Vec<Attribute<Self>>;

    /// Called right before a new instance is first inserted
    fn pre_persist(&mut self) {}
}

/// Convert a stored value into an attribute's Rust type
pub fn from_value<V: FromSql>(value: &Value) -> FromSqlResult<V> {
    V::column_result(ValueRef::from(value))
}

/// Quote an identifier for SQLite
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
