//! Per-entity repository
//!
//! `LookupDao<T>` is built once per entity type over one store. Every
//! operation runs through the store's [`TransactionExecutor`]: reads in a
//! read-only unit of work, writes in a read-write one, and the `*_in` forms
//! inside a session the caller already holds.

use super::batch_locked::BatchLockedContext;
use super::locked::LockedContext;
use super::ops;
use crate::errors::Result;
use crate::locks::LockMode;
use crate::query::{self, QueryParams};
use crate::session::Session;
use crate::transaction::{Scope, TransactionExecutor};
use lookupdao_core::entity::{Entity, EntityDescriptor};
use lookupdao_core::errors::DaoError;
use lookupdao_core::Criteria;
use rusqlite::types::{FromSql, Value};
use std::sync::Arc;

/// Typed repository for entity `T`
pub struct LookupDao<T: Entity> {
    descriptor: Arc<EntityDescriptor<T>>,
    executor: TransactionExecutor,
}

impl<T: Entity> Clone for LookupDao<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            executor: self.executor.clone(),
        }
    }
}

impl<T: Entity> std::fmt::Debug for LookupDao<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupDao")
            .field("entity", &T::NAME)
            .field("table", &T::TABLE)
            .finish()
    }
}

impl<T: Entity> LookupDao<T> {
    /// Discover `T`'s descriptor and bind it to `executor`
    ///
    /// # Errors
    ///
    /// `Configuration` when the entity declaration is malformed.
    pub fn new(executor: TransactionExecutor) -> Result<Self> {
        let descriptor = EntityDescriptor::<T>::discover()?;
        Ok(Self::with_descriptor(Arc::new(descriptor), executor))
    }

    pub(crate) fn with_descriptor(
        descriptor: Arc<EntityDescriptor<T>>,
        executor: TransactionExecutor,
    ) -> Self {
        Self {
            descriptor,
            executor,
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor<T> {
        &self.descriptor
    }

    pub fn entity_name(&self) -> &'static str {
        T::NAME
    }

    /// Name of the identifier attribute
    pub fn id_attribute(&self) -> &'static str {
        self.descriptor.id_attribute().name()
    }

    /// Name of the lookup-key attribute
    pub fn key_attribute(&self) -> &'static str {
        self.descriptor.key_attribute().name()
    }

    pub(crate) fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    fn read<R, F>(&self, op: &'static str, operation: F) -> Result<R>
    where
        F: FnOnce(&mut Session, &EntityDescriptor<T>) -> Result<R>,
    {
        let d = &*self.descriptor;
        self.executor
            .execute(op, T::TABLE, Scope::read_only(), |s, ()| operation(s, d), (), Ok)
    }

    fn write<R, F>(&self, op: &'static str, scope: Scope<'_>, operation: F) -> Result<R>
    where
        F: FnOnce(&mut Session, &EntityDescriptor<T>) -> Result<R>,
    {
        let d = &*self.descriptor;
        self.executor
            .execute(op, T::TABLE, scope, |s, ()| operation(s, d), (), Ok)
    }

    // ---- reads by identifier ----

    /// Row with identifier `id`, if any
    pub fn get(&self, id: i64) -> Result<Option<T>> {
        self.get_with(id, |e| e)
    }

    pub fn get_with<U, F>(&self, id: i64, handler: F) -> Result<Option<U>>
    where
        F: FnOnce(T) -> U,
    {
        self.read("get", |s, d| ops::fetch(s, d, id, LockMode::Shared))
            .map(|found| found.map(handler))
    }

    /// Rows with the given identifiers, in requested order, without duplicates
    pub fn get_many(&self, ids: &[i64]) -> Result<Vec<T>> {
        self.get_many_with(ids, |rows| rows)
    }

    pub fn get_many_with<U, F>(&self, ids: &[i64], handler: F) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        self.read("get_many", |s, d| ops::fetch_many(s, d, ids, LockMode::Shared))
            .map(handler)
    }

    // ---- lookups by key ----

    fn key_criteria(&self, key: &str) -> Criteria {
        Criteria::new().eq(self.key_attribute(), key.to_string())
    }

    /// The single row whose lookup key equals `key`
    ///
    /// # Errors
    ///
    /// `NonUniqueResult` when more than one row carries the key.
    pub fn lookup(&self, key: &str) -> Result<Option<T>> {
        self.lookup_with(key, |e| e)
    }

    pub fn lookup_with<U, F>(&self, key: &str, handler: F) -> Result<Option<U>>
    where
        F: FnOnce(T) -> U,
    {
        self.select_single_with(&self.key_criteria(key), handler)
    }

    /// Every row whose lookup key equals `key`
    pub fn lookup_multi(&self, key: &str) -> Result<Vec<T>> {
        self.lookup_multi_with(key, |rows| rows)
    }

    pub fn lookup_multi_with<U, F>(&self, key: &str, handler: F) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        self.select_with(&self.key_criteria(key), handler)
    }

    // ---- criteria selects ----

    /// Rows matching `criteria`, ordered by identifier unless an order is given
    pub fn select(&self, criteria: &Criteria) -> Result<Vec<T>> {
        self.select_with(criteria, |rows| rows)
    }

    pub fn select_with<U, F>(&self, criteria: &Criteria, handler: F) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        self.read("select", |s, d| ops::select(s, d, criteria, None))
            .map(handler)
    }

    /// One page of rows matching `criteria`
    pub fn select_page(&self, criteria: &Criteria, limit: usize, offset: usize) -> Result<Vec<T>> {
        self.select_page_with(criteria, limit, offset, |rows| rows)
    }

    pub fn select_page_with<U, F>(
        &self,
        criteria: &Criteria,
        limit: usize,
        offset: usize,
        handler: F,
    ) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        self.read("select_page", |s, d| {
            ops::select(s, d, criteria, Some((limit, offset)))
        })
        .map(handler)
    }

    /// Every row matching `criteria`, fetched `page_size` rows at a time
    ///
    /// # Errors
    ///
    /// `Validation` when `page_size` is 0.
    pub fn select_paginated(&self, criteria: &Criteria, page_size: usize) -> Result<Vec<T>> {
        self.select_paginated_with(criteria, page_size, |rows| rows)
    }

    pub fn select_paginated_with<U, F>(
        &self,
        criteria: &Criteria,
        page_size: usize,
        handler: F,
    ) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        if page_size == 0 {
            return Err(DaoError::validation("page size must be at least 1"));
        }
        self.read("select_paginated", |s, d| {
            let mut rows = Vec::new();
            let mut offset = 0;
            loop {
                let page = ops::select(s, d, criteria, Some((page_size, offset)))?;
                let fetched = page.len();
                rows.extend(page);
                if fetched < page_size {
                    break;
                }
                offset += page_size;
            }
            Ok(rows)
        })
        .map(handler)
    }

    /// Zero or one row matching `criteria`
    ///
    /// # Errors
    ///
    /// `NonUniqueResult` when more than one row matches.
    pub fn select_single(&self, criteria: &Criteria) -> Result<Option<T>> {
        self.select_single_with(criteria, |e| e)
    }

    pub fn select_single_with<U, F>(&self, criteria: &Criteria, handler: F) -> Result<Option<U>>
    where
        F: FnOnce(T) -> U,
    {
        let rows = self.read("select_single", |s, d| {
            ops::select(s, d, criteria, Some((2, 0)))
        })?;
        if rows.len() > 1 {
            return Err(DaoError::NonUniqueResult {
                entity: T::NAME.to_string(),
            });
        }
        Ok(rows.into_iter().next().map(handler))
    }

    /// Rows returned by a managed (`native == false`) or native select
    pub fn select_query(&self, query: &str, params: &QueryParams, native: bool) -> Result<Vec<T>> {
        let sql = self.statement(query, native)?;
        self.read("select_query", |s, d| ops::query_named(s, d, &sql, params))
    }

    fn statement(&self, query: &str, native: bool) -> Result<String> {
        if native {
            Ok(query.to_string())
        } else {
            query::translate(query, &self.descriptor)
        }
    }

    // ---- existence and aggregates ----

    pub fn exists(&self, id: i64) -> Result<bool> {
        self.read("exists", |s, d| {
            ops::exists_by(s, d, d.id_attribute().column(), Value::Integer(id))
        })
    }

    pub fn exists_key(&self, key: &str) -> Result<bool> {
        self.read("exists_key", |s, d| {
            ops::exists_by(s, d, d.key_attribute().column(), Value::Text(key.to_string()))
        })
    }

    pub fn count(&self, criteria: &Criteria) -> Result<u64> {
        self.read("count", |s, d| ops::count(s, d, criteria))
    }

    /// Sum of `attribute` over matching rows; `None` when nothing matches
    pub fn sum<N: FromSql>(&self, criteria: &Criteria, attribute: &str) -> Result<Option<N>> {
        self.read("sum", |s, d| ops::aggregate(s, d, criteria, "SUM", attribute))
    }

    pub fn min<N: FromSql>(&self, criteria: &Criteria, attribute: &str) -> Result<Option<N>> {
        self.read("min", |s, d| ops::aggregate(s, d, criteria, "MIN", attribute))
    }

    pub fn max<N: FromSql>(&self, criteria: &Criteria, attribute: &str) -> Result<Option<N>> {
        self.read("max", |s, d| ops::aggregate(s, d, criteria, "MAX", attribute))
    }

    // ---- saves ----

    /// Insert or update `entity`, returning it with its identifier populated
    pub fn save(&self, entity: T) -> Result<T> {
        self.save_with(entity, |e| e)
    }

    pub fn save_with<U, F>(&self, entity: T, handler: F) -> Result<U>
    where
        F: FnOnce(T) -> U,
    {
        self.write("save", Scope::read_write(), |s, d| ops::upsert(s, d, entity))
            .map(handler)
    }

    pub fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.save_all_with(entities, |rows| rows)
    }

    pub fn save_all_with<U, F>(&self, entities: Vec<T>, handler: F) -> Result<U>
    where
        F: FnOnce(Vec<T>) -> U,
    {
        self.write("save_all", Scope::read_write(), |s, d| upsert_all(s, d, entities))
            .map(handler)
    }

    /// `save` inside an active session
    pub fn save_in(&self, session: &mut Session, entity: T) -> Result<T> {
        self.write("save", Scope::Join(session), |s, d| ops::upsert(s, d, entity))
    }

    pub fn save_all_in(&self, session: &mut Session, entities: Vec<T>) -> Result<Vec<T>> {
        self.write("save_all", Scope::Join(session), |s, d| {
            upsert_all(s, d, entities)
        })
    }

    // ---- updates ----

    /// Read `id`, pass it to `updater` and persist what it returns
    ///
    /// Returns `false` without writing when the row is absent or the updater
    /// returns `None`.
    pub fn update<F>(&self, id: i64, updater: F) -> Result<bool>
    where
        F: FnOnce(Option<T>) -> Option<T>,
    {
        self.write("update", Scope::read_write(), |s, d| {
            ops::update_with(s, d, id, LockMode::Shared, updater)
        })
    }

    /// `update` under an exclusive row lock that fails instead of waiting
    ///
    /// # Errors
    ///
    /// `LockNotAvailable` when another unit of work holds the row.
    pub fn update_in_lock<F>(&self, id: i64, updater: F) -> Result<bool>
    where
        F: FnOnce(Option<T>) -> Option<T>,
    {
        self.write("update_in_lock", Scope::read_write(), |s, d| {
            ops::update_with(s, d, id, LockMode::ExclusiveNoWait, updater)
        })
    }

    /// `update` inside an active session
    pub fn update_in<F>(&self, session: &mut Session, id: i64, updater: F) -> Result<bool>
    where
        F: FnOnce(Option<T>) -> Option<T>,
    {
        self.write("update", Scope::Join(session), |s, d| {
            ops::update_with(s, d, id, LockMode::Shared, updater)
        })
    }

    /// Bulk update in the managed dialect; returns the affected-row count
    pub fn update_query(&self, query: &str, params: &QueryParams) -> Result<usize> {
        let sql = self.statement(query, false)?;
        self.write("update_query", Scope::read_write(), |s, _| {
            ops::execute_update(s, &sql, params)
        })
    }

    /// Bulk update in native SQL; returns the affected-row count
    pub fn update_native(&self, query: &str, params: &QueryParams) -> Result<usize> {
        self.write("update_native", Scope::read_write(), |s, _| {
            ops::execute_update(s, query, params)
        })
    }

    /// `update_query` inside an active session
    pub fn update_query_in(
        &self,
        session: &mut Session,
        query: &str,
        params: &QueryParams,
    ) -> Result<usize> {
        let sql = self.statement(query, false)?;
        self.write("update_query", Scope::Join(session), |s, _| {
            ops::execute_update(s, &sql, params)
        })
    }

    // ---- locked workflows ----

    /// Workflow over the row `id`, locked exclusively when the workflow runs
    pub fn lock_and_get_executor(&self, id: i64) -> LockedContext<'_, T> {
        LockedContext::read(self, id)
    }

    /// Workflow over the rows `ids`, locked exclusively when the workflow runs
    pub fn lock_and_get_batch_executor(&self, ids: Vec<i64>) -> BatchLockedContext<'_, T> {
        BatchLockedContext::read(self, ids)
    }

    pub fn lock_and_get_batch_executor_from<F>(&self, supplier: F) -> BatchLockedContext<'_, T>
    where
        F: FnOnce() -> Vec<i64>,
    {
        BatchLockedContext::read(self, supplier())
    }

    /// Workflow that starts by persisting `entity`
    pub fn save_and_get_executor(&self, entity: T) -> LockedContext<'_, T> {
        LockedContext::insert(self, entity)
    }

    pub fn save_all_and_get_executor(&self, entities: Vec<T>) -> BatchLockedContext<'_, T> {
        BatchLockedContext::insert(self, entities)
    }
}

fn upsert_all<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    entities: Vec<T>,
) -> Result<Vec<T>> {
    entities
        .into_iter()
        .map(|entity| ops::upsert(session, d, entity))
        .collect()
}
