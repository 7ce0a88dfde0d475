//! Pushed-down query plans.
//!
//! A [`PlanCondition`] names properties by id and carries dynamic operands.
//! [`QueryPlan::compile`] resolves it against the model once, checking that
//! every property exists and every operand fits its type, and the result is
//! evaluated by the engine directly on raw record bytes.
//!
//! Absent fields only match `IsNull`; every comparison on an absent field is
//! false. `Not` is plain logical negation of its operand.

use crate::error::{EngineError, EngineResult};
use crate::model::{Model, ModelEntity, ModelProperty};
use boxdb_codec::{PropertyFlags, PropertyType, RecordReader, Value};
use std::cmp::Ordering;

/// String matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
}

/// An uncompiled condition over one entity's properties.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanCondition {
    /// Matches every record.
    All,
    /// `property == value`.
    Equal {
        /// Property id.
        property: u16,
        /// Operand.
        value: Value,
        /// Whether string comparison is case-sensitive.
        case_sensitive: bool,
    },
    /// `property != value` (absent fields do not match).
    NotEqual {
        /// Property id.
        property: u16,
        /// Operand.
        value: Value,
        /// Whether string comparison is case-sensitive.
        case_sensitive: bool,
    },
    /// `property < value`, or `<=` when inclusive.
    Less {
        /// Property id.
        property: u16,
        /// Operand.
        value: Value,
        /// Whether equality also matches.
        inclusive: bool,
    },
    /// `property > value`, or `>=` when inclusive.
    Greater {
        /// Property id.
        property: u16,
        /// Operand.
        value: Value,
        /// Whether equality also matches.
        inclusive: bool,
    },
    /// `low <= property <= high`.
    Between {
        /// Property id.
        property: u16,
        /// Lower bound, inclusive.
        low: Value,
        /// Upper bound, inclusive.
        high: Value,
    },
    /// String containment, prefix or suffix match.
    Text {
        /// Property id.
        property: u16,
        /// Operator.
        op: TextOp,
        /// Needle.
        value: String,
        /// Whether matching is case-sensitive.
        case_sensitive: bool,
    },
    /// Set membership.
    OneOf {
        /// Property id.
        property: u16,
        /// Candidate values.
        values: Vec<Value>,
        /// Whether string comparison is case-sensitive.
        case_sensitive: bool,
    },
    /// The property is absent.
    IsNull {
        /// Property id.
        property: u16,
    },
    /// The property is present.
    NotNull {
        /// Property id.
        property: u16,
    },
    /// All operands match.
    And(Vec<PlanCondition>),
    /// At least one operand matches.
    Or(Vec<PlanCondition>),
    /// The operand does not match.
    Not(Box<PlanCondition>),
}

#[derive(Debug, Clone, Copy)]
struct Target {
    offset: u16,
    property_type: PropertyType,
    flags: PropertyFlags,
}

#[derive(Debug, Clone)]
enum Node {
    All,
    Equal(Target, Value, bool),
    NotEqual(Target, Value, bool),
    Less(Target, Value, bool),
    Greater(Target, Value, bool),
    Between(Target, Value, Value),
    Text(Target, TextOp, String, bool),
    OneOf(Target, Vec<Value>, bool),
    IsNull(Target),
    NotNull(Target),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

/// A compiled, immutable, re-executable query plan for one entity.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    entity_id: u32,
    root: Node,
}

impl QueryPlan {
    /// Compiles `condition` for `entity_id` against `model`.
    ///
    /// # Errors
    ///
    /// Returns an illegal-argument error for unknown entities or properties
    /// and a type mismatch error for operands that do not fit.
    pub fn compile(model: &Model, entity_id: u32, condition: &PlanCondition) -> EngineResult<Self> {
        let entity = model.entity(entity_id).ok_or_else(|| {
            EngineError::illegal_argument(format!("Unknown entity id {entity_id}"))
        })?;
        let root = compile_node(entity, condition)?;
        Ok(Self { entity_id, root })
    }

    /// Returns the entity this plan queries.
    #[must_use]
    pub fn entity_id(&self) -> u32 {
        self.entity_id
    }

    /// Evaluates the plan against one record.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the record cannot be decoded.
    pub fn matches(&self, record: &RecordReader<'_>) -> EngineResult<bool> {
        evaluate(&self.root, record)
    }
}

fn compile_node(entity: &ModelEntity, condition: &PlanCondition) -> EngineResult<Node> {
    Ok(match condition {
        PlanCondition::All => Node::All,
        PlanCondition::Equal {
            property,
            value,
            case_sensitive,
        } => {
            let target = resolve(entity, *property, Some(value))?;
            Node::Equal(target, value.clone(), *case_sensitive)
        }
        PlanCondition::NotEqual {
            property,
            value,
            case_sensitive,
        } => {
            let target = resolve(entity, *property, Some(value))?;
            Node::NotEqual(target, value.clone(), *case_sensitive)
        }
        PlanCondition::Less {
            property,
            value,
            inclusive,
        } => {
            let target = resolve_ordered(entity, *property, value)?;
            Node::Less(target, value.clone(), *inclusive)
        }
        PlanCondition::Greater {
            property,
            value,
            inclusive,
        } => {
            let target = resolve_ordered(entity, *property, value)?;
            Node::Greater(target, value.clone(), *inclusive)
        }
        PlanCondition::Between {
            property,
            low,
            high,
        } => {
            let target = resolve_ordered(entity, *property, low)?;
            resolve_ordered(entity, *property, high)?;
            Node::Between(target, low.clone(), high.clone())
        }
        PlanCondition::Text {
            property,
            op,
            value,
            case_sensitive,
        } => {
            let target = resolve(entity, *property, None)?;
            if target.property_type != PropertyType::String {
                return Err(EngineError::type_mismatch(format!(
                    "String condition on {}.{} which is a {}",
                    entity.name,
                    property_name(entity, *property),
                    target.property_type
                )));
            }
            let needle = if *case_sensitive {
                value.clone()
            } else {
                value.to_lowercase()
            };
            Node::Text(target, *op, needle, *case_sensitive)
        }
        PlanCondition::OneOf {
            property,
            values,
            case_sensitive,
        } => {
            let target = resolve(entity, *property, None)?;
            for value in values {
                check_operand(entity, lookup(entity, *property)?, value)?;
            }
            Node::OneOf(target, values.clone(), *case_sensitive)
        }
        PlanCondition::IsNull { property } => Node::IsNull(resolve(entity, *property, None)?),
        PlanCondition::NotNull { property } => Node::NotNull(resolve(entity, *property, None)?),
        PlanCondition::And(children) => Node::And(
            children
                .iter()
                .map(|c| compile_node(entity, c))
                .collect::<EngineResult<_>>()?,
        ),
        PlanCondition::Or(children) => Node::Or(
            children
                .iter()
                .map(|c| compile_node(entity, c))
                .collect::<EngineResult<_>>()?,
        ),
        PlanCondition::Not(child) => Node::Not(Box::new(compile_node(entity, child)?)),
    })
}

fn lookup(entity: &ModelEntity, property: u16) -> EngineResult<&ModelProperty> {
    entity.property(property).ok_or_else(|| {
        EngineError::illegal_argument(format!(
            "Property id {property} not found in entity {}",
            entity.name
        ))
    })
}

fn property_name(entity: &ModelEntity, property: u16) -> &str {
    entity.property(property).map_or("?", |p| p.name.as_str())
}

fn resolve(entity: &ModelEntity, property: u16, operand: Option<&Value>) -> EngineResult<Target> {
    let p = lookup(entity, property)?;
    if let Some(value) = operand {
        check_operand(entity, p, value)?;
    }
    Ok(Target {
        offset: p.offset(),
        property_type: p.property_type,
        flags: p.flags,
    })
}

fn resolve_ordered(entity: &ModelEntity, property: u16, operand: &Value) -> EngineResult<Target> {
    let target = resolve(entity, property, Some(operand))?;
    if target.property_type == PropertyType::Bool {
        return Err(EngineError::type_mismatch(format!(
            "Ordering condition on bool property {}.{}",
            entity.name,
            property_name(entity, property)
        )));
    }
    Ok(target)
}

fn check_operand(entity: &ModelEntity, property: &ModelProperty, value: &Value) -> EngineResult<()> {
    let fits = match property.property_type {
        PropertyType::Bool => matches!(value, Value::Bool(_)),
        PropertyType::Float | PropertyType::Double => {
            matches!(value, Value::Float(_) | Value::Int(_) | Value::UInt(_))
        }
        PropertyType::String => matches!(value, Value::String(_)),
        PropertyType::ByteVector => matches!(value, Value::Bytes(_)),
        PropertyType::Byte
        | PropertyType::Short
        | PropertyType::Int
        | PropertyType::Long
        | PropertyType::Date
        | PropertyType::Relation => matches!(value, Value::Int(_) | Value::UInt(_)),
    };
    if fits {
        Ok(())
    } else {
        Err(EngineError::type_mismatch(format!(
            "Property {}.{} is a {} and cannot be compared with a {} value",
            entity.name,
            property.name,
            property.property_type,
            value.kind()
        )))
    }
}

fn read(target: &Target, record: &RecordReader<'_>) -> EngineResult<Option<Value>> {
    Ok(record.value(target.offset, target.property_type, target.flags)?)
}

fn equal(stored: &Value, operand: &Value, case_sensitive: bool) -> bool {
    match (stored, operand) {
        (Value::String(a), Value::String(b)) if !case_sensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        _ => stored.compare(operand) == Some(Ordering::Equal),
    }
}

fn evaluate(node: &Node, record: &RecordReader<'_>) -> EngineResult<bool> {
    Ok(match node {
        Node::All => true,
        Node::Equal(t, value, cs) => read(t, record)?.is_some_and(|v| equal(&v, value, *cs)),
        Node::NotEqual(t, value, cs) => read(t, record)?.is_some_and(|v| !equal(&v, value, *cs)),
        Node::Less(t, value, inclusive) => read(t, record)?.is_some_and(|v| {
            matches!(v.compare(value), Some(Ordering::Less))
                || (*inclusive && v.compare(value) == Some(Ordering::Equal))
        }),
        Node::Greater(t, value, inclusive) => read(t, record)?.is_some_and(|v| {
            matches!(v.compare(value), Some(Ordering::Greater))
                || (*inclusive && v.compare(value) == Some(Ordering::Equal))
        }),
        Node::Between(t, low, high) => read(t, record)?.is_some_and(|v| {
            matches!(v.compare(low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(v.compare(high), Some(Ordering::Less | Ordering::Equal))
        }),
        Node::Text(t, op, needle, cs) => match read(t, record)? {
            Some(Value::String(s)) => {
                let haystack = if *cs { s } else { s.to_lowercase() };
                match op {
                    TextOp::Contains => haystack.contains(needle.as_str()),
                    TextOp::StartsWith => haystack.starts_with(needle.as_str()),
                    TextOp::EndsWith => haystack.ends_with(needle.as_str()),
                }
            }
            _ => false,
        },
        Node::OneOf(t, values, cs) => {
            read(t, record)?.is_some_and(|v| values.iter().any(|candidate| equal(&v, candidate, *cs)))
        }
        Node::IsNull(t) => !record.is_present(t.offset)?,
        Node::NotNull(t) => record.is_present(t.offset)?,
        Node::And(children) => {
            for child in children {
                if !evaluate(child, record)? {
                    return Ok(false);
                }
            }
            true
        }
        Node::Or(children) => {
            for child in children {
                if evaluate(child, record)? {
                    return Ok(true);
                }
            }
            false
        }
        Node::Not(child) => !evaluate(child, record)?,
    })
}
