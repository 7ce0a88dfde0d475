//! Condition trees.

use boxdb_engine::PlanCondition;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

/// A condition over the properties of entity type `E`.
///
/// Conditions are created from [`Property`](crate::Property) operators and
/// combined with [`and`](Self::and), [`or`](Self::or) and `!`, or the
/// operators `&` and `|`:
///
/// ```rust,ignore
/// let condition = note::TEXT.contains("writing") & !note::AUTHOR.equals(peter.id);
/// ```
pub struct Condition<E> {
    plan: PlanCondition,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Condition<E> {
    pub(crate) fn new(plan: PlanCondition) -> Self {
        Self {
            plan,
            _marker: PhantomData,
        }
    }

    /// Matches if both conditions match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::new(match self.plan {
            PlanCondition::And(mut children) => {
                children.push(other.plan);
                PlanCondition::And(children)
            }
            plan => PlanCondition::And(vec![plan, other.plan]),
        })
    }

    /// Matches if either condition matches.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::new(match self.plan {
            PlanCondition::Or(mut children) => {
                children.push(other.plan);
                PlanCondition::Or(children)
            }
            plan => PlanCondition::Or(vec![plan, other.plan]),
        })
    }

    /// Returns the engine representation.
    #[must_use]
    pub fn plan(&self) -> &PlanCondition {
        &self.plan
    }

    pub(crate) fn into_plan(self) -> PlanCondition {
        self.plan
    }
}

impl<E> Clone for Condition<E> {
    fn clone(&self) -> Self {
        Self::new(self.plan.clone())
    }
}

impl<E> PartialEq for Condition<E> {
    fn eq(&self, other: &Self) -> bool {
        self.plan == other.plan
    }
}

impl<E> fmt::Debug for Condition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.plan, f)
    }
}

impl<E> BitAnd for Condition<E> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl<E> BitOr for Condition<E> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

/// Matches if the operand does not match. Absent fields fail every
/// comparison, so `!p.equals(x)` also matches objects where `p` is absent.
impl<E> Not for Condition<E> {
    type Output = Self;

    fn not(self) -> Self {
        Self::new(match self.plan {
            PlanCondition::Not(inner) => *inner,
            plan => PlanCondition::Not(Box::new(plan)),
        })
    }
}
