use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::EntitySchema;
use crate::validation::validate_entity_schema;

/// Entity resolved from its identifier.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub table_name: String,
    pub schema: EntitySchema,
}

/// Resolves entity identifiers to their live schema.
pub trait EntityRegistry: Send + Sync {
    /// Returns `None` when the entity is unknown.
    fn resolve(&self, entity: &str) -> Option<ResolvedEntity>;

    /// Identifiers of every known entity, sorted.
    fn entities(&self) -> Vec<String>;
}

/// Registry over a fixed set of validated schemas.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, validating every schema.
    pub fn from_schemas(schemas: Vec<EntitySchema>) -> Result<Self> {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<()> {
        validate_entity_schema(&schema)?;
        if self.schemas.contains_key(&schema.entity) {
            return Err(Error::InvalidSchema(format!(
                "duplicate entity: {}",
                schema.entity
            )));
        }
        self.schemas.insert(schema.entity.clone(), schema);
        Ok(())
    }
}

impl EntityRegistry for StaticRegistry {
    fn resolve(&self, entity: &str) -> Option<ResolvedEntity> {
        self.schemas.get(entity).map(|schema| ResolvedEntity {
            table_name: schema.table_name.clone(),
            schema: schema.clone(),
        })
    }

    fn entities(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }
}
