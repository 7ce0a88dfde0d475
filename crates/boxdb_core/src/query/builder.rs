//! Query building and execution.

use super::Condition;
use crate::entity::Entity;
use crate::entity_box::EntityBox;
use crate::error::{BoxError, BoxResult};
use crate::id::Id;
use crate::transaction::Transaction;
use boxdb_engine::{PlanCondition, QueryPlan};
use std::fmt;
use tracing::debug;

/// Collects conditions for a [`Query`].
///
/// Conditions passed to separate [`filter`](Self::filter) calls must all
/// match; use [`Condition::or`] for alternatives.
pub struct QueryBuilder<E> {
    entities: EntityBox<E>,
    conditions: Vec<PlanCondition>,
}

impl<E: Entity> QueryBuilder<E> {
    pub(crate) fn new(entities: EntityBox<E>) -> Self {
        Self {
            entities,
            conditions: Vec::new(),
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn filter(mut self, condition: Condition<E>) -> Self {
        self.conditions.push(condition.into_plan());
        self
    }

    /// Compiles the conditions into a reusable query.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch for operands that do not fit their property
    /// and illegal-argument for properties missing from the model.
    pub fn build(mut self) -> BoxResult<Query<E>> {
        let root = match self.conditions.len() {
            0 => PlanCondition::All,
            1 => self.conditions.remove(0),
            _ => PlanCondition::And(self.conditions),
        };
        let plan = self
            .entities
            .store()
            .engine()
            .compile(E::DESCRIPTOR.id, &root)?;
        debug!(entity = E::DESCRIPTOR.name, condition = ?root, "query built");
        Ok(Query {
            entities: self.entities,
            plan,
        })
    }
}

impl<E: Entity> fmt::Debug for QueryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("entity", &E::DESCRIPTOR.name)
            .field("conditions", &self.conditions)
            .finish()
    }
}

/// A compiled query. The condition is evaluated by the engine; results are
/// returned in ascending id order.
///
/// Queries are immutable and can be run any number of times.
pub struct Query<E> {
    entities: EntityBox<E>,
    plan: QueryPlan,
}

impl<E: Entity> Query<E> {
    /// Returns every matching object.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started or a record cannot be
    /// decoded.
    pub fn find(&self) -> BoxResult<Vec<E>> {
        self.find_with_offset_limit(0, 0)
    }

    /// Returns matching objects as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be decoded.
    pub fn find_in(&self, txn: &Transaction) -> BoxResult<Vec<E>> {
        self.run(txn, 0, None)
    }

    /// Skips `offset` matches and returns at most `limit` (0 returns all).
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started or a record cannot be
    /// decoded.
    pub fn find_with_offset_limit(&self, offset: usize, limit: usize) -> BoxResult<Vec<E>> {
        let limit = (limit > 0).then_some(limit);
        self.entities
            .store()
            .read(|txn| self.run(txn, offset, limit))
    }

    /// Returns the first match, if any.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started or a record cannot be
    /// decoded.
    pub fn find_first(&self) -> BoxResult<Option<E>> {
        Ok(self.find_with_offset_limit(0, 1)?.into_iter().next())
    }

    /// Returns the only match, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::NonUniqueResult`] if more than one object
    /// matches.
    pub fn find_unique(&self) -> BoxResult<Option<E>> {
        let mut found = self.find_with_offset_limit(0, 2)?;
        if found.len() > 1 {
            return Err(BoxError::NonUniqueResult {
                message: format!(
                    "Query for {} has more than one result",
                    E::DESCRIPTOR.name
                ),
            });
        }
        Ok(found.pop())
    }

    /// Returns the ids of every match.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn find_ids(&self) -> BoxResult<Vec<Id<E>>> {
        self.entities.store().read(|txn| self.find_ids_in(txn))
    }

    /// Returns the ids of every match as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be read.
    pub fn find_ids_in(&self, txn: &Transaction) -> BoxResult<Vec<Id<E>>> {
        Ok(txn
            .raw()
            .query_ids(&self.plan)?
            .into_iter()
            .map(Id::new)
            .collect())
    }

    /// Returns the number of matches.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn count(&self) -> BoxResult<u64> {
        self.entities.store().read(|txn| self.count_in(txn))
    }

    /// Returns the number of matches as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be read.
    pub fn count_in(&self, txn: &Transaction) -> BoxResult<u64> {
        Ok(txn.raw().query_count(&self.plan)?)
    }

    /// Removes every match and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the error of the write transaction.
    pub fn remove(&self) -> BoxResult<u64> {
        self.entities.store().write(|txn| self.remove_in(txn))
    }

    /// Removes every match inside `txn`.
    ///
    /// # Errors
    ///
    /// Fails if `txn` is not an active write transaction.
    pub fn remove_in(&self, txn: &mut Transaction) -> BoxResult<u64> {
        let mut removed = 0;
        for id in self.find_ids_in(txn)? {
            if self.entities.remove_in(txn, id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn run(&self, txn: &Transaction, offset: usize, limit: Option<usize>) -> BoxResult<Vec<E>> {
        txn.raw()
            .query(&self.plan, offset, limit)?
            .iter()
            .map(|(_, bytes)| self.entities.decode(bytes))
            .collect()
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            plan: self.plan.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &E::DESCRIPTOR.name)
            .field("plan", &self.plan)
            .finish()
    }
}
