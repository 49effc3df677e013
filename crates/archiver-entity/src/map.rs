//! Entity registry keyed by `(entity_type, alias)`

use crate::entity::ArchiveEntity;
use crate::error::{EntityError, EntityResult};
use crate::report::{EntityReport, EntitySummary, TypeCounts};
use crate::types::EntityType;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Entities of one manifest, grouped by type in insertion order
///
/// At most one entity exists per `(type, alias)`; a later insert replaces
/// the earlier entity in place.
#[derive(Debug, Clone, Default)]
pub struct EntityMap {
    entities: IndexMap<EntityType, IndexMap<String, ArchiveEntity>>,
}

impl EntityMap {
    /// Create empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, returning the one it replaced
    pub fn insert(&mut self, entity: ArchiveEntity) -> Option<ArchiveEntity> {
        self.entities
            .entry(entity.entity_type)
            .or_default()
            .insert(entity.id.clone(), entity)
    }

    /// Insert several entities in order
    pub fn extend(&mut self, entities: impl IntoIterator<Item = ArchiveEntity>) {
        for entity in entities {
            self.insert(entity);
        }
    }

    /// Entity by type and alias
    #[must_use]
    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<&ArchiveEntity> {
        self.entities.get(&entity_type)?.get(id)
    }

    /// Mutable entity by type and alias
    pub fn get_mut(&mut self, entity_type: EntityType, id: &str) -> Option<&mut ArchiveEntity> {
        self.entities.get_mut(&entity_type)?.get_mut(id)
    }

    /// Entity by alias, searching every type
    #[must_use]
    pub fn find_by_alias(&self, alias: &str) -> Option<&ArchiveEntity> {
        self.entities.values().find_map(|group| group.get(alias))
    }

    /// Mutable entity by alias, searching every type
    pub fn find_by_alias_mut(&mut self, alias: &str) -> Option<&mut ArchiveEntity> {
        self.entities.values_mut().find_map(|group| group.get_mut(alias))
    }

    /// Set the accession of the entity with this alias
    ///
    /// # Errors
    /// `EntityError::NotFound` if no entity has the alias
    pub fn set_accession(&mut self, alias: &str, accession: Option<String>) -> EntityResult<()> {
        let entity = self
            .find_by_alias_mut(alias)
            .ok_or_else(|| EntityError::NotFound(alias.to_string()))?;
        entity.accession = accession;
        Ok(())
    }

    /// Entities of one type in insertion order
    pub fn entities_of(&self, entity_type: EntityType) -> impl Iterator<Item = &ArchiveEntity> {
        self.entities
            .get(&entity_type)
            .into_iter()
            .flat_map(|group| group.values())
    }

    /// Mutable entities of one type in insertion order
    pub fn entities_of_mut(&mut self, entity_type: EntityType) -> impl Iterator<Item = &mut ArchiveEntity> {
        self.entities
            .get_mut(&entity_type)
            .into_iter()
            .flat_map(|group| group.values_mut())
    }

    /// All entities, grouped by type in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntity> {
        self.entities.values().flat_map(|group| group.values())
    }

    /// All entities, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ArchiveEntity> {
        self.entities.values_mut().flat_map(|group| group.values_mut())
    }

    /// Types with at least one registered entity
    pub fn types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.entities
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(t, _)| *t)
    }

    /// Total number of entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().map(IndexMap::len).sum()
    }

    /// True when no entity is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities with a payload and no errors
    pub fn convertible(&self) -> impl Iterator<Item = &ArchiveEntity> {
        self.iter().filter(|e| e.is_convertible())
    }

    /// Aliases of convertible entities of the given types, in map order
    #[must_use]
    pub fn convertible_aliases(&self, types: &[EntityType]) -> Vec<String> {
        self.convertible()
            .filter(|e| types.contains(&e.entity_type))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Number of convertible entities
    #[must_use]
    pub fn convertible_count(&self) -> usize {
        self.convertible().count()
    }

    /// Per-type totals
    #[must_use]
    pub fn counts_by_type(&self) -> BTreeMap<EntityType, TypeCounts> {
        let mut counts: BTreeMap<EntityType, TypeCounts> = BTreeMap::new();
        for entity in self.iter() {
            counts.entry(entity.entity_type).or_default().record(entity);
        }
        counts
    }

    /// Entities carrying errors or warnings
    pub fn entities_with_issues(&self) -> impl Iterator<Item = &ArchiveEntity> {
        self.iter().filter(|e| e.has_issues())
    }

    /// Flat report of the whole map
    #[must_use]
    pub fn report(&self) -> EntityReport {
        EntityReport {
            counts: self.counts_by_type(),
            entities: self.iter().map(EntitySummary::from).collect(),
        }
    }
}

impl FromIterator<ArchiveEntity> for EntityMap {
    fn from_iter<I: IntoIterator<Item = ArchiveEntity>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}
