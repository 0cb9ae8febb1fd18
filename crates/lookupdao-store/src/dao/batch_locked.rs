//! Batch locked workflow
//!
//! Like [`LockedContext`](super::LockedContext) but over a batch of rows.
//! Read targets are locked exclusively and must all exist.

use super::lookup_dao::LookupDao;
use super::ops;
use crate::errors::Result;
use crate::locks::LockMode;
use crate::session::Session;
use crate::transaction::Scope;
use lookupdao_core::entity::{Entity, EntityDescriptor};
use lookupdao_core::errors::DaoError;
use std::collections::HashSet;

type Step<'a, T> = Box<dyn FnOnce(&mut Session, &mut [T]) -> Result<()> + 'a>;

enum Target<T> {
    Read(Vec<i64>),
    Insert(Vec<T>),
}

/// Consuming builder for a workflow over several entities
#[must_use = "a workflow does nothing until `execute` is called"]
pub struct BatchLockedContext<'a, T: Entity> {
    dao: &'a LookupDao<T>,
    target: Target<T>,
    steps: Vec<Step<'a, T>>,
}

impl<'a, T: Entity> BatchLockedContext<'a, T> {
    pub(crate) fn read(dao: &'a LookupDao<T>, ids: Vec<i64>) -> Self {
        Self {
            dao,
            target: Target::Read(ids),
            steps: Vec::new(),
        }
    }

    pub(crate) fn insert(dao: &'a LookupDao<T>, entities: Vec<T>) -> Self {
        Self {
            dao,
            target: Target::Insert(entities),
            steps: Vec::new(),
        }
    }

    fn step<F>(mut self, step: F) -> Self
    where
        F: FnOnce(&mut Session, &mut [T]) -> Result<()> + 'a,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn mutate<F>(self, mutator: F) -> Self
    where
        F: FnOnce(&mut [T]) + 'a,
    {
        self.step(move |_, batch| {
            mutator(batch);
            Ok(())
        })
    }

    pub fn apply<F>(self, handler: F) -> Self
    where
        F: FnOnce(&mut [T]) -> Result<()> + 'a,
    {
        self.step(move |_, batch| handler(batch))
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnOnce(&[T]) -> bool + 'a,
    {
        self.filter_or(predicate, DaoError::validation("Predicate check failed"))
    }

    pub fn filter_or<P>(self, predicate: P, error: DaoError) -> Self
    where
        P: FnOnce(&[T]) -> bool + 'a,
    {
        self.step(move |_, batch| if predicate(&*batch) { Ok(()) } else { Err(error) })
    }

    /// Persist children generated from the batch, then hand them to `post_persist`
    ///
    /// Changes `post_persist` makes to the batch are flushed before commit.
    pub fn save_all<U, G, P>(self, child: &'a LookupDao<U>, generator: G, post_persist: P) -> Self
    where
        U: Entity,
        G: FnOnce(&[T]) -> Vec<U> + 'a,
        P: FnOnce(&[U], &mut [T]) + 'a,
    {
        self.step(move |session, batch| {
            let saved = child.save_all_in(session, generator(&*batch))?;
            post_persist(&saved, batch);
            Ok(())
        })
    }

    /// Persist at most one child generated from the batch
    pub fn save_single<U, G, P>(
        self,
        child: &'a LookupDao<U>,
        generator: G,
        post_persist: P,
    ) -> Self
    where
        U: Entity,
        G: FnOnce(&[T]) -> Option<U> + 'a,
        P: FnOnce(Option<&U>, &mut [T]) + 'a,
    {
        self.step(move |session, batch| {
            let saved = match generator(&*batch) {
                Some(entity) => Some(child.save_in(session, entity)?),
                None => None,
            };
            post_persist(saved.as_ref(), batch);
            Ok(())
        })
    }

    /// Run the workflow and return the batch as committed
    ///
    /// # Errors
    ///
    /// `NotFound` listing every missing identifier, `LockNotAvailable` when
    /// any row is held elsewhere, or the first error raised by a step.
    pub fn execute(self) -> Result<Vec<T>> {
        let Self { dao, target, steps } = self;
        let d = dao.descriptor();
        dao.executor().execute(
            "batch_locked_workflow",
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
) -> Result<Vec<T>> {
    let mut batch = match target {
        Target::Read(ids) => {
            let found = ops::fetch_many(session, d, &ids, LockMode::ExclusiveNoWait)?;
            let present: HashSet<i64> = found.iter().filter_map(|e| d.id_of(e)).collect();
            let mut reported = HashSet::new();
            let missing: Vec<i64> = ids
                .into_iter()
                .filter(|id| !present.contains(id) && reported.insert(*id))
                .collect();
            if !missing.is_empty() {
                return Err(DaoError::NotFound {
                    entity: T::NAME.to_string(),
                    keys: format!("{:?}", missing),
                });
            }
            found
        }
        Target::Insert(entities) => entities
            .into_iter()
            .map(|entity| ops::upsert(session, d, entity))
            .collect::<Result<Vec<T>>>()?,
    };

    for step in steps {
        step(session, &mut batch)?;
    }

    for entity in &batch {
        ops::flush_if_dirty(session, d, entity)?;
    }
    Ok(batch)
}

impl<T: Entity> std::fmt::Debug for BatchLockedContext<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            Target::Read(ids) => format!("read({:?})", ids),
            Target::Insert(entities) => format!("insert({})", entities.len()),
        };
        f.debug_struct("BatchLockedContext")
            .field("entity", &T::NAME)
            .field("target", &target)
            .field("steps", &self.steps.len())
            .finish()
    }
}
