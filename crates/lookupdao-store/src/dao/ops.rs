//! Session-level repository operations
//!
//! These run inside whatever unit of work the caller supplies; the
//! repository decides whether that is a fresh lifecycle or a joined one.
//! Every row loaded or written is tracked on the session.

use crate::errors::{from_rusqlite, Result};
use crate::locks::{LockMode, RowKey};
use crate::query::QueryParams;
use crate::session::Session;
use lookupdao_core::entity::{quote_ident, Entity, EntityDescriptor, Marker};
use lookupdao_core::errors::DaoError;
use lookupdao_core::Criteria;
use rusqlite::types::{FromSql, Value};
use rusqlite::{params_from_iter, OptionalExtension};
use std::collections::{HashMap, HashSet};

pub(crate) fn row_key<T: Entity>(id: i64) -> RowKey {
    RowKey::new(T::TABLE, id)
}

fn select_by_id_sql<T: Entity>(d: &EntityDescriptor<T>) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?",
        d.select_list(),
        d.quoted_table(),
        d.quoted_id_column()
    )
}

/// Load one row by identifier, locking it first in exclusive mode
pub(crate) fn fetch<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    id: i64,
    mode: LockMode,
) -> Result<Option<T>> {
    let key = row_key::<T>(id);
    let already_held = session.holds_lock(key);
    session.lock(key, mode)?;

    let found = session
        .connection()?
        .query_row(&select_by_id_sql(d), [id], |row| d.from_row(row))
        .optional()
        .map_err(from_rusqlite("fetch"))?;

    match &found {
        Some(entity) => session.track(key, d.values(entity)),
        None if mode == LockMode::ExclusiveNoWait && !already_held => session.unlock(key),
        None => {}
    }
    Ok(found)
}

/// Load rows by identifier in requested order, skipping misses and duplicates
pub(crate) fn fetch_many<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    ids: &[i64],
    mode: LockMode,
) -> Result<Vec<T>> {
    let mut seen = HashSet::new();
    let unique: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let mut newly_locked = Vec::new();
    for id in &unique {
        let key = row_key::<T>(*id);
        if !session.holds_lock(key) {
            session.lock(key, mode)?;
            newly_locked.push(key);
        }
    }

    let sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        d.select_list(),
        d.quoted_table(),
        d.quoted_id_column(),
        vec!["?"; unique.len()].join(", ")
    );
    let mut by_id: HashMap<i64, T> = HashMap::with_capacity(unique.len());
    {
        let conn = session.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(from_rusqlite("fetch_many"))?;
        let rows = stmt
            .query_map(params_from_iter(unique.iter()), |row| d.from_row(row))
            .map_err(from_rusqlite("fetch_many"))?;
        for row in rows {
            let entity = row.map_err(from_rusqlite("fetch_many"))?;
            if let Some(id) = d.id_of(&entity) {
                by_id.insert(id, entity);
            }
        }
    }

    let mut found = Vec::with_capacity(by_id.len());
    for id in unique {
        let key = row_key::<T>(id);
        match by_id.remove(&id) {
            Some(entity) => {
                session.track(key, d.values(&entity));
                found.push(entity);
            }
            None if mode == LockMode::ExclusiveNoWait && newly_locked.contains(&key) => {
                session.unlock(key)
            }
            None => {}
        }
    }
    Ok(found)
}

/// Rows matching `criteria`, ordered by identifier unless an order is given
pub(crate) fn select<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    criteria: &Criteria,
    page: Option<(usize, usize)>,
) -> Result<Vec<T>> {
    let filter = criteria.render_where(d)?;
    let order = criteria.render_order(d, true)?;
    let mut params = filter.params;
    let mut sql = format!(
        "SELECT {} FROM {}{}{}",
        d.select_list(),
        d.quoted_table(),
        filter.sql,
        order
    );
    if let Some((limit, offset)) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));
    }
    query_rows(session, d, &sql, &params)
}

/// Run a positional-parameter select and map rows through the descriptor
pub(crate) fn query_rows<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    sql: &str,
    params: &[Value],
) -> Result<Vec<T>> {
    let entities = {
        let mut stmt = session
            .connection()?
            .prepare(sql)
            .map_err(from_rusqlite("select"))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| d.from_row(row))
            .map_err(from_rusqlite("select"))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(from_rusqlite("select"))?
    };
    track_all(session, d, &entities);
    Ok(entities)
}

/// Run a named-parameter select and map rows through the descriptor
pub(crate) fn query_named<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    sql: &str,
    params: &QueryParams,
) -> Result<Vec<T>> {
    let entities = {
        let mut stmt = session
            .connection()?
            .prepare(sql)
            .map_err(from_rusqlite("select_query"))?;
        let rows = stmt
            .query_map(params.bind().as_slice(), |row| d.from_row(row))
            .map_err(from_rusqlite("select_query"))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(from_rusqlite("select_query"))?
    };
    track_all(session, d, &entities);
    Ok(entities)
}

fn track_all<T: Entity>(session: &mut Session, d: &EntityDescriptor<T>, entities: &[T]) {
    for entity in entities {
        if let Some(id) = d.id_of(entity) {
            session.track(row_key::<T>(id), d.values(entity));
        }
    }
}

pub(crate) fn count<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    criteria: &Criteria,
) -> Result<u64> {
    let filter = criteria.render_where(d)?;
    let sql = format!("SELECT COUNT(*) FROM {}{}", d.quoted_table(), filter.sql);
    let count: i64 = session
        .connection()?
        .query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))
        .map_err(from_rusqlite("count"))?;
    Ok(count.max(0) as u64)
}

/// `SUM`, `MIN` or `MAX` over a numeric attribute; `None` when nothing matches
pub(crate) fn aggregate<T: Entity, N: FromSql>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    criteria: &Criteria,
    function: &str,
    attribute: &str,
) -> Result<Option<N>> {
    let attr = d.require(attribute)?;
    if !attr.sql_type().is_numeric() {
        return Err(DaoError::validation(format!(
            "cannot apply {} to non-numeric attribute '{}' of {}",
            function,
            attribute,
            T::NAME
        )));
    }

    let filter = criteria.render_where(d)?;
    let sql = format!(
        "SELECT {}({}) FROM {}{}",
        function,
        quote_ident(attr.column()),
        d.quoted_table(),
        filter.sql
    );
    session
        .connection()?
        .query_row(&sql, params_from_iter(filter.params.iter()), |row| {
            row.get::<_, Option<N>>(0)
        })
        .map_err(from_rusqlite("aggregate"))
}

/// Whether a row with `column = value` exists, projecting only the identifier
pub(crate) fn exists_by<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    column: &str,
    value: Value,
) -> Result<bool> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ? LIMIT 1",
        d.quoted_id_column(),
        d.quoted_table(),
        quote_ident(column)
    );
    let found: Option<i64> = session
        .connection()?
        .query_row(&sql, [value], |row| row.get(0))
        .optional()
        .map_err(from_rusqlite("exists"))?;
    Ok(found.is_some())
}

fn stored_values<T: Entity>(
    session: &Session,
    d: &EntityDescriptor<T>,
    id: i64,
) -> Result<Option<Vec<Value>>> {
    let width = d.attributes().len();
    session
        .connection()?
        .query_row(&select_by_id_sql(d), [id], |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect()
        })
        .optional()
        .map_err(from_rusqlite("refresh"))
}

/// Insert-or-update one entity, returning it with its identifier populated
pub(crate) fn upsert<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    mut entity: T,
) -> Result<T> {
    let Some(id) = d.id_of(&entity) else {
        return insert(session, d, entity);
    };

    let key = row_key::<T>(id);
    session.lock_for_write(key)?;

    match stored_values(session, d, id)? {
        None => entity.pre_persist(),
        Some(current) if session.is_tracked(key) => session.track(key, current),
        Some(_) => {}
    }

    let columns: Vec<&str> = d.attributes().iter().map(|a| a.column()).collect();
    let updates = d
        .attributes()
        .iter()
        .filter(|a| a.marker() != Some(Marker::Identifier))
        .map(|a| format!("{0} = excluded.{0}", quote_ident(a.column())))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        d.quoted_table(),
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        vec!["?"; columns.len()].join(", "),
        d.quoted_id_column(),
        updates
    );

    let values = d.values(&entity);
    session
        .connection()?
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(from_rusqlite("upsert"))?;
    session.track(key, values);
    Ok(entity)
}

fn insert<T: Entity>(session: &mut Session, d: &EntityDescriptor<T>, mut entity: T) -> Result<T> {
    entity.pre_persist();

    let (columns, values): (Vec<String>, Vec<Value>) = d
        .attributes()
        .iter()
        .filter(|a| a.marker() != Some(Marker::Identifier))
        .map(|a| (quote_ident(a.column()), a.get(&entity)))
        .unzip();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        d.quoted_table(),
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );

    let id = {
        let conn = session.connection()?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(from_rusqlite("insert"))?;
        conn.last_insert_rowid()
    };
    d.set_id(&mut entity, id)?;

    let key = row_key::<T>(id);
    session.lock_for_write(key)?;
    session.track(key, d.values(&entity));
    Ok(entity)
}

/// Overwrite the stored row `id` with `entity`
pub(crate) fn write_row<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    id: i64,
    mut entity: T,
) -> Result<T> {
    d.set_id(&mut entity, id)?;
    let key = row_key::<T>(id);
    session.lock_for_write(key)?;

    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for attr in d.attributes() {
        if attr.marker() != Some(Marker::Identifier) {
            assignments.push(format!("{} = ?", quote_ident(attr.column())));
            values.push(attr.get(&entity));
        }
    }
    values.push(Value::Integer(id));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        d.quoted_table(),
        assignments.join(", "),
        d.quoted_id_column()
    );

    session
        .connection()?
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(from_rusqlite("update"))?;
    session.track(key, d.values(&entity));
    Ok(entity)
}

/// Read `id`, hand it to `updater` and write back what it returns
pub(crate) fn update_with<T, F>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    id: i64,
    mode: LockMode,
    updater: F,
) -> Result<bool>
where
    T: Entity,
    F: FnOnce(Option<T>) -> Option<T>,
{
    // Row locks come before the first statement opens the write transaction
    if mode == LockMode::Shared {
        session.lock_for_write(row_key::<T>(id))?;
    }
    let Some(current) = fetch(session, d, id, mode)? else {
        return Ok(false);
    };
    match updater(Some(current)) {
        Some(updated) => {
            write_row(session, d, id, updated)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Persist `entity` if it differs from the session's snapshot of its row
pub(crate) fn flush_if_dirty<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    entity: &T,
) -> Result<bool> {
    let Some(id) = d.id_of(entity) else {
        return Ok(false);
    };
    let values = d.values(entity);
    if session.snapshot(row_key::<T>(id)) == Some(values.as_slice()) {
        return Ok(false);
    }
    write_row(session, d, id, entity.clone())?;
    Ok(true)
}

/// Execute a named-parameter statement, returning the affected-row count
pub(crate) fn execute_update(session: &mut Session, sql: &str, params: &QueryParams) -> Result<usize> {
    let mut stmt = session
        .connection()?
        .prepare(sql)
        .map_err(from_rusqlite("update_query"))?;
    stmt.execute(params.bind().as_slice())
        .map_err(from_rusqlite("update_query"))
}
