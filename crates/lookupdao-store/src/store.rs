//! Store entry point
//!
//! A [`DataStore`] owns one validated configuration, the connection pool,
//! the row-lock table and the set of registered entities. Repositories are
//! handed out per entity type and share the store's executor.
//!
//! ```no_run
//! # use lookupdao_core::DbConfig;
//! # use lookupdao_store::DataStore;
//! # fn demo<Account: lookupdao_core::Entity>() -> lookupdao_store::Result<()> {
//! let store = DataStore::builder(DbConfig::sqlite("app.db"))
//!     .entity::<Account>()
//!     .build()?;
//! let accounts = store.lookup_dao::<Account>()?;
//! # Ok(())
//! # }
//! ```

use crate::dao::LookupDao;
use crate::db::ConnectionPool;
use crate::errors::Result;
use crate::locks::RowLockTable;
use crate::schema::{self, TableSchema};
use crate::transaction::TransactionExecutor;
use lookupdao_core::entity::{Entity, EntityDescriptor};
use lookupdao_core::errors::DaoError;
use lookupdao_core::DbConfig;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type Registration = Box<dyn FnOnce() -> Result<(TypeId, Arc<dyn Any + Send + Sync>, TableSchema)>>;

/// Collects configuration and entity registrations for a [`DataStore`]
pub struct DataStoreBuilder {
    config: DbConfig,
    registrations: Vec<Registration>,
}

impl DataStoreBuilder {
    /// Register entity `T`; its descriptor is discovered by [`build`](Self::build)
    pub fn entity<T: Entity>(mut self) -> Self {
        self.registrations.push(Box::new(|| {
            let descriptor = EntityDescriptor::<T>::discover()?;
            let schema = TableSchema::of(&descriptor);
            let shared: Arc<dyn Any + Send + Sync> = Arc::new(descriptor);
            Ok((TypeId::of::<T>(), shared, schema))
        }));
        self
    }

    /// Validate the configuration, open the pool and register every entity
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid config or a malformed entity, and any
    /// engine error raised while opening connections or creating tables.
    pub fn build(self) -> Result<DataStore> {
        let Self {
            config,
            registrations,
        } = self;
        config.validate()?;

        tracing::info!(
            component = module_path!(),
            url = %config.url,
            database = ?config.database,
            catalog = ?config.catalog,
            user = ?config.user,
            password = ?config.password,
            create_schema = config.create_schema,
            show_sql = config.show_sql,
            "opening data store"
        );

        let pool = ConnectionPool::new(&config)?;
        let locks = Arc::new(RowLockTable::new());
        let executor = TransactionExecutor::new(Arc::clone(&pool), locks);

        let mut descriptors = HashMap::new();
        let mut schemas = Vec::with_capacity(registrations.len());
        for register in registrations {
            let (type_id, descriptor, table) = register()?;
            if config.create_schema {
                let conn = pool.acquire()?;
                schema::recreate(&conn, &table)?;
            }
            tracing::debug!(
                component = module_path!(),
                entity = table.entity,
                table = table.table,
                "entity registered"
            );
            descriptors.insert(type_id, descriptor);
            schemas.push(table);
        }

        Ok(DataStore {
            config,
            pool,
            executor,
            descriptors: Mutex::new(descriptors),
            schemas,
        })
    }
}

/// Configured store over one SQLite database
pub struct DataStore {
    config: DbConfig,
    pool: Arc<ConnectionPool>,
    executor: TransactionExecutor,
    descriptors: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    schemas: Vec<TableSchema>,
}

impl DataStore {
    pub fn builder(config: DbConfig) -> DataStoreBuilder {
        DataStoreBuilder {
            config,
            registrations: Vec::new(),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    /// Tables registered with this store, in registration order
    pub fn schemas(&self) -> &[TableSchema] {
        &self.schemas
    }

    /// Repository for `T`, reusing the descriptor discovered at registration
    ///
    /// An unregistered entity is discovered on first use; its table must
    /// already exist.
    ///
    /// # Errors
    ///
    /// `Configuration` when `T`'s declaration is malformed.
    pub fn lookup_dao<T: Entity>(&self) -> Result<LookupDao<T>> {
        let mut descriptors = self.descriptors.lock();
        let shared = match descriptors.get(&TypeId::of::<T>()) {
            Some(shared) => Arc::clone(shared),
            None => {
                let shared: Arc<dyn Any + Send + Sync> =
                    Arc::new(EntityDescriptor::<T>::discover()?);
                descriptors.insert(TypeId::of::<T>(), Arc::clone(&shared));
                shared
            }
        };
        drop(descriptors);

        let descriptor = shared.downcast::<EntityDescriptor<T>>().map_err(|_| {
            DaoError::configuration(T::NAME, "registered descriptor has a different type")
        })?;
        Ok(LookupDao::with_descriptor(descriptor, self.executor.clone()))
    }

    /// Drop registered tables in create-drop mode and close the pool
    pub fn close(self) -> Result<()> {
        if self.config.create_schema {
            let conn = self.pool.acquire()?;
            schema::drop_all(&conn, &self.schemas)?;
        }
        self.pool.close();
        tracing::info!(component = module_path!(), url = %self.config.url, "data store closed");
        Ok(())
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("url", &self.config.url)
            .field("tables", &self.schemas.iter().map(|s| s.table).collect::<Vec<_>>())
            .finish()
    }
}
