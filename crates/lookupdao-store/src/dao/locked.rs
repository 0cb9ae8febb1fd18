//! Single-entity locked workflow
//!
//! A [`LockedContext`] queues steps against one target row and runs them
//! all in a single read-write unit of work when [`LockedContext::execute`]
//! is called. The target is either read under an exclusive no-wait lock or
//! inserted first. Child writes join the same session, so the workflow is
//! all-or-nothing.

use super::lookup_dao::LookupDao;
use super::ops;
use crate::errors::Result;
use crate::locks::LockMode;
use crate::query::QueryParams;
use crate::session::Session;
use crate::transaction::Scope;
use lookupdao_core::entity::{Entity, EntityDescriptor};
use lookupdao_core::errors::DaoError;

type Step<'a, T> = Box<dyn FnOnce(&mut Session, &mut T) -> Result<()> + 'a>;

enum Target<T> {
    Read(i64),
    Insert(T),
}

/// Consuming builder for a workflow over one entity
#[must_use = "a workflow does nothing until `execute` is called"]
pub struct LockedContext<'a, T: Entity> {
    dao: &'a LookupDao<T>,
    target: Target<T>,
    steps: Vec<Step<'a, T>>,
}

impl<'a, T: Entity> LockedContext<'a, T> {
    pub(crate) fn read(dao: &'a LookupDao<T>, id: i64) -> Self {
        Self {
            dao,
            target: Target::Read(id),
            steps: Vec::new(),
        }
    }

    pub(crate) fn insert(dao: &'a LookupDao<T>, entity: T) -> Self {
        Self {
            dao,
            target: Target::Insert(entity),
            steps: Vec::new(),
        }
    }

    fn step<F>(mut self, step: F) -> Self
    where
        F: FnOnce(&mut Session, &mut T) -> Result<()> + 'a,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Change the target in place; persisted by the dirty check before commit
    pub fn mutate<F>(self, mutator: F) -> Self
    where
        F: FnOnce(&mut T) + 'a,
    {
        self.step(move |_, target| {
            mutator(target);
            Ok(())
        })
    }

    /// A step that may fail and abort the workflow
    pub fn apply<F>(self, handler: F) -> Self
    where
        F: FnOnce(&mut T) -> Result<()> + 'a,
    {
        self.step(move |_, target| handler(target))
    }

    /// Abort with `Validation("Predicate check failed")` unless `predicate` holds
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnOnce(&T) -> bool + 'a,
    {
        self.filter_or(predicate, DaoError::validation("Predicate check failed"))
    }

    /// Abort with `error` unless `predicate` holds
    pub fn filter_or<P>(self, predicate: P, error: DaoError) -> Self
    where
        P: FnOnce(&T) -> bool + 'a,
    {
        self.step(move |_, target| if predicate(&*target) { Ok(()) } else { Err(error) })
    }

    /// Persist a child generated from the target
    pub fn save<U, G>(self, child: &'a LookupDao<U>, generator: G) -> Self
    where
        U: Entity,
        G: FnOnce(&T) -> U + 'a,
    {
        self.step(move |session, target| {
            child.save_in(session, generator(&*target)).map(|_| ())
        })
    }

    /// Persist every child generated from the target
    pub fn save_all<U, G>(self, child: &'a LookupDao<U>, generator: G) -> Self
    where
        U: Entity,
        G: FnOnce(&T) -> Vec<U> + 'a,
    {
        self.step(move |session, target| {
            child.save_all_in(session, generator(&*target)).map(|_| ())
        })
    }

    /// Update the child row `id` under the workflow's session
    pub fn update<U, F>(self, child: &'a LookupDao<U>, id: i64, updater: F) -> Self
    where
        U: Entity,
        F: FnOnce(Option<U>) -> Option<U> + 'a,
    {
        self.step(move |session, _| child.update_in(session, id, updater).map(|_| ()))
    }

    /// Bulk-update child rows; fewer than one affected row aborts the workflow
    pub fn update_query<U>(
        self,
        child: &'a LookupDao<U>,
        query: impl Into<String>,
        params: QueryParams,
    ) -> Self
    where
        U: Entity,
    {
        let query = query.into();
        self.step(move |session, _| {
            let affected = child.update_query_in(session, &query, &params)?;
            if affected < 1 {
                return Err(DaoError::validation(format!(
                    "Update operation returned result {}",
                    affected
                )));
            }
            Ok(())
        })
    }

    /// Run the workflow and return the target as committed
    ///
    /// # Errors
    ///
    /// `NotFound` when a read target is missing, `LockNotAvailable` when it
    /// is held elsewhere, or the first error raised by a queued step. The
    /// unit of work is rolled back in every case but a constraint violation.
    pub fn execute(self) -> Result<T> {
        let Self { dao, target, steps } = self;
        let d = dao.descriptor();
        dao.executor().execute(
            "locked_workflow",
            T::TABLE,
            Scope::read_write(),
            |session, (target, steps)| run(session, d, target, steps),
            (target, steps),
            Ok,
        )
    }
}

fn run<T: Entity>(
    session: &mut Session,
    d: &EntityDescriptor<T>,
    target: Target<T>,
    steps: Vec<Step<'_, T>>,
) -> Result<T> {
    let mut entity = match target {
        Target::Read(id) => ops::fetch(session, d, id, LockMode::ExclusiveNoWait)?.ok_or_else(
            || DaoError::NotFound {
                entity: T::NAME.to_string(),
                keys: id.to_string(),
            },
        )?,
        Target::Insert(entity) => ops::upsert(session, d, entity)?,
    };

    for step in steps {
        step(session, &mut entity)?;
    }

    ops::flush_if_dirty(session, d, &entity)?;
    Ok(entity)
}

impl<T: Entity> std::fmt::Debug for LockedContext<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            Target::Read(id) => format!("read({})", id),
            Target::Insert(_) => "insert".to_string(),
        };
        f.debug_struct("LockedContext")
            .field("entity", &T::NAME)
            .field("target", &target)
            .field("steps", &self.steps.len())
            .finish()
    }
}
