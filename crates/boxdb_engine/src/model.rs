//! The persisted data model.
//!
//! The engine stores the model next to the data and checks every later
//! declaration against it on open. Ids are the identity of entities and
//! properties; names are informational.

use crate::error::{EngineError, EngineResult};
use boxdb_codec::{property_offset, PropertyFlags, PropertyType, MAX_PROPERTY_ID};
use serde::{Deserialize, Serialize};

/// A property as known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProperty {
    /// Stable id, unique within the entity, never reused.
    pub id: u16,
    /// Property name.
    pub name: String,
    /// Storage type.
    pub property_type: PropertyType,
    /// Flags such as `ID` and `UNIQUE`.
    pub flags: PropertyFlags,
}

impl ModelProperty {
    /// Returns the vtable offset of this property.
    #[must_use]
    pub fn offset(&self) -> u16 {
        property_offset(self.id)
    }
}

/// An entity as known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntity {
    /// Stable entity id.
    pub id: u32,
    /// Entity name.
    pub name: String,
    /// Properties in declaration order.
    pub properties: Vec<ModelProperty>,
}

impl ModelEntity {
    /// Looks up a property by id.
    #[must_use]
    pub fn property(&self, id: u16) -> Option<&ModelProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Returns the primary key property.
    #[must_use]
    pub fn id_property(&self) -> Option<&ModelProperty> {
        self.properties
            .iter()
            .find(|p| p.flags.contains(PropertyFlags::ID))
    }

    /// Returns all properties flagged `UNIQUE`.
    pub fn unique_properties(&self) -> impl Iterator<Item = &ModelProperty> {
        self.properties
            .iter()
            .filter(|p| p.flags.contains(PropertyFlags::UNIQUE))
    }
}

/// A standalone many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRelation {
    /// Stable relation id.
    pub id: u32,
    /// Relation name.
    pub name: String,
    /// Entity owning the relation.
    pub source_entity: u32,
    /// Entity the relation points to.
    pub target_entity: u32,
}

/// The complete model of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// All entities.
    pub entities: Vec<ModelEntity>,
    /// All standalone relations.
    pub relations: Vec<ModelRelation>,
}

impl Model {
    /// Looks up an entity by id.
    #[must_use]
    pub fn entity(&self, id: u32) -> Option<&ModelEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Looks up a relation by id.
    #[must_use]
    pub fn relation(&self, id: u32) -> Option<&ModelRelation> {
        self.relations.iter().find(|r| r.id == id)
    }

    /// Checks internal consistency of a declared model.
    ///
    /// # Errors
    ///
    /// Returns a schema error for duplicate ids, zero ids, a missing or
    /// non-64-bit primary key, or relations naming unknown entities.
    pub fn validate(&self) -> EngineResult<()> {
        for (index, entity) in self.entities.iter().enumerate() {
            if entity.id == 0 {
                return Err(EngineError::schema(format!(
                    "Entity {} must have a non-zero id",
                    entity.name
                )));
            }
            if self.entities[..index].iter().any(|e| e.id == entity.id) {
                return Err(EngineError::schema(format!(
                    "Duplicate entity id {} ({})",
                    entity.id, entity.name
                )));
            }
            for (p_index, property) in entity.properties.iter().enumerate() {
                if property.id == 0 || property.id > MAX_PROPERTY_ID {
                    return Err(EngineError::schema(format!(
                        "Property {}.{} has invalid id {}",
                        entity.name, property.name, property.id
                    )));
                }
                if entity.properties[..p_index].iter().any(|p| p.id == property.id) {
                    return Err(EngineError::schema(format!(
                        "Duplicate property id {} in entity {}",
                        property.id, entity.name
                    )));
                }
            }
            let ids: Vec<_> = entity
                .properties
                .iter()
                .filter(|p| p.flags.contains(PropertyFlags::ID))
                .collect();
            match ids.as_slice() {
                [id] if id.property_type == PropertyType::Long => {}
                [id] => {
                    return Err(EngineError::schema(format!(
                        "ID property {}.{} must be a long, not {}",
                        entity.name, id.name, id.property_type
                    )))
                }
                _ => {
                    return Err(EngineError::schema(format!(
                        "Entity {} must have exactly one ID property",
                        entity.name
                    )))
                }
            }
        }
        for relation in &self.relations {
            if self.entity(relation.source_entity).is_none()
                || self.entity(relation.target_entity).is_none()
            {
                return Err(EngineError::schema(format!(
                    "Relation {} refers to an unknown entity",
                    relation.name
                )));
            }
        }
        Ok(())
    }

    /// Reconciles a declared model with the stored one.
    ///
    /// Returns the union of both: stored entities, properties and relations
    /// that are no longer declared are retained so their ids stay reserved.
    ///
    /// # Errors
    ///
    /// Returns a schema error if an entity name moved to another id, or a
    /// property or relation id is declared with a different type or shape
    /// than stored.
    pub fn merge(stored: &Self, declared: &Self) -> EngineResult<Self> {
        let mut merged = stored.clone();

        for entity in &declared.entities {
            if let Some(other) = stored
                .entities
                .iter()
                .find(|e| e.name == entity.name && e.id != entity.id)
            {
                return Err(EngineError::schema(format!(
                    "Entity {} is declared with id {} but stored with id {}",
                    entity.name, entity.id, other.id
                )));
            }

            let Some(target) = merged.entities.iter_mut().find(|e| e.id == entity.id) else {
                merged.entities.push(entity.clone());
                continue;
            };
            target.name.clone_from(&entity.name);

            for property in &entity.properties {
                match target.properties.iter_mut().find(|p| p.id == property.id) {
                    Some(existing) => {
                        if existing.property_type != property.property_type {
                            return Err(EngineError::schema(format!(
                                "Property {}.{} (id {}) is declared as {} but stored as {}",
                                entity.name,
                                property.name,
                                property.id,
                                property.property_type,
                                existing.property_type
                            )));
                        }
                        let id_flag = PropertyFlags::ID;
                        if existing.flags.contains(id_flag) != property.flags.contains(id_flag) {
                            return Err(EngineError::schema(format!(
                                "Property {}.{} (id {}) changed its ID flag",
                                entity.name, property.name, property.id
                            )));
                        }
                        existing.name.clone_from(&property.name);
                        existing.flags = property.flags;
                    }
                    None => target.properties.push(property.clone()),
                }
            }
        }

        for relation in &declared.relations {
            match merged.relations.iter_mut().find(|r| r.id == relation.id) {
                Some(existing) => {
                    if existing.source_entity != relation.source_entity
                        || existing.target_entity != relation.target_entity
                    {
                        return Err(EngineError::schema(format!(
                            "Relation {} (id {}) connects different entities than stored",
                            relation.name, relation.id
                        )));
                    }
                    existing.name.clone_from(&relation.name);
                }
                None => merged.relations.push(relation.clone()),
            }
        }

        Ok(merged)
    }

    /// Serializes the model to CBOR.
    ///
    /// # Errors
    ///
    /// Returns a storage error if serialization fails.
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out)
            .map_err(|e| EngineError::storage_general(format!("Could not encode model: {e}")))?;
        Ok(out)
    }

    /// Deserializes a model from CBOR.
    ///
    /// # Errors
    ///
    /// Returns a file corruption error if the bytes are not a model.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| EngineError::file_corrupt(format!("Could not decode stored model: {e}")))
    }
}
