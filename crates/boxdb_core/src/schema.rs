//! Schema model: static entity descriptors and the per-store model registry.
//!
//! Descriptors are plain `const` data supplied by each entity's binding:
//!
//! ```
//! use boxdb_core::{EntityDescriptor, PropertyDescriptor, PropertyFlags, PropertyType};
//!
//! const NOTE: EntityDescriptor = EntityDescriptor {
//!     id: 1,
//!     name: "Note",
//!     properties: &[
//!         PropertyDescriptor::new(1, "id", PropertyType::Long)
//!             .flags(PropertyFlags::ID.with(PropertyFlags::UNSIGNED)),
//!         PropertyDescriptor::new(2, "text", PropertyType::String),
//!     ],
//!     relations: &[],
//! };
//!
//! assert_eq!(NOTE.property(2).unwrap().offset(), 6);
//! ```

use crate::entity::Entity;
use crate::error::{BoxError, BoxResult};
use boxdb_codec::{property_offset, PropertyFlags, PropertyType};
use boxdb_engine::{Model as EngineModel, ModelEntity, ModelProperty, ModelRelation};
use std::any::TypeId;
use std::collections::HashMap;

/// A property of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Stable id, unique within the entity. Never changed or reused.
    pub id: u16,
    /// Property name.
    pub name: &'static str,
    /// Storage type.
    pub property_type: PropertyType,
    /// Flags.
    pub flags: PropertyFlags,
}

impl PropertyDescriptor {
    /// Creates a descriptor without flags.
    #[must_use]
    pub const fn new(id: u16, name: &'static str, property_type: PropertyType) -> Self {
        Self {
            id,
            name,
            property_type,
            flags: PropertyFlags::NONE,
        }
    }

    /// Sets the flags.
    #[must_use]
    pub const fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns the record offset of this property.
    #[must_use]
    pub const fn offset(&self) -> u16 {
        property_offset(self.id)
    }

    /// Returns true if this is the primary key.
    #[must_use]
    pub const fn is_id(&self) -> bool {
        self.flags.contains(PropertyFlags::ID)
    }
}

/// A standalone many-to-many relation owned by its source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Stable relation id, unique within the model.
    pub id: u32,
    /// Relation name.
    pub name: &'static str,
    /// Entity id of the owner.
    pub source_entity: u32,
    /// Entity id of the targets.
    pub target_entity: u32,
}

/// Static metadata of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Stable entity id.
    pub id: u32,
    /// Type name.
    pub name: &'static str,
    /// Properties in declaration order.
    pub properties: &'static [PropertyDescriptor],
    /// Standalone relations owned by this entity.
    pub relations: &'static [RelationDescriptor],
}

impl EntityDescriptor {
    /// Looks up a property by id.
    #[must_use]
    pub fn property(&self, id: u16) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property_by_name(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the primary key property.
    #[must_use]
    pub fn id_property(&self) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.is_id())
    }

    fn to_engine(&self) -> ModelEntity {
        ModelEntity {
            id: self.id,
            name: self.name.to_string(),
            properties: self
                .properties
                .iter()
                .map(|p| ModelProperty {
                    id: p.id,
                    name: p.name.to_string(),
                    property_type: p.property_type,
                    flags: p.flags,
                })
                .collect(),
        }
    }
}

/// The set of entity types a store works with.
///
/// Built once, before opening the store:
///
/// ```ignore
/// let model = Model::builder().entity::<Note>().entity::<Author>().build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Model {
    by_type: HashMap<TypeId, &'static EntityDescriptor>,
    engine: EngineModel,
}

impl Model {
    /// Starts building a model.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Returns the descriptor registered for `E`.
    #[must_use]
    pub fn descriptor<E: Entity>(&self) -> Option<&'static EntityDescriptor> {
        self.by_type.get(&TypeId::of::<E>()).copied()
    }

    /// Returns true if `E` is part of the model.
    #[must_use]
    pub fn contains<E: Entity>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<E>())
    }

    /// Returns the number of entity types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns true if no entity type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub(crate) fn ensure<E: Entity>(&self) -> BoxResult<&'static EntityDescriptor> {
        self.descriptor::<E>().ok_or_else(|| {
            BoxError::illegal_argument(format!(
                "Entity {} is not part of the store's model",
                E::DESCRIPTOR.name
            ))
        })
    }

    pub(crate) fn engine_model(&self) -> &EngineModel {
        &self.engine
    }
}

/// Builder for [`Model`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<(TypeId, &'static EntityDescriptor)>,
}

impl ModelBuilder {
    /// Registers entity type `E`. Registering a type twice has no effect.
    #[must_use]
    pub fn entity<E: Entity>(mut self) -> Self {
        let type_id = TypeId::of::<E>();
        if !self.entities.iter().any(|(t, _)| *t == type_id) {
            self.entities.push((type_id, E::DESCRIPTOR));
        }
        self
    }

    /// Validates the descriptors and builds the model.
    ///
    /// # Errors
    ///
    /// Returns a schema error for duplicate entity or property ids, property
    /// ids of 0 or above 32000, a missing or non-`Long` primary key, and
    /// relations whose entities are not registered.
    pub fn build(self) -> BoxResult<Model> {
        let mut engine = EngineModel::default();
        for (_, descriptor) in &self.entities {
            engine.entities.push(descriptor.to_engine());
            for relation in descriptor.relations {
                if relation.source_entity != descriptor.id {
                    return Err(BoxError::schema(format!(
                        "Relation {} is declared on {} but owned by entity id {}",
                        relation.name, descriptor.name, relation.source_entity
                    )));
                }
                engine.relations.push(ModelRelation {
                    id: relation.id,
                    name: relation.name.to_string(),
                    source_entity: relation.source_entity,
                    target_entity: relation.target_entity,
                });
            }
        }
        engine.validate()?;

        Ok(Model {
            by_type: self.entities.into_iter().collect(),
            engine,
        })
    }
}
