//! Mention extraction from decoded documents.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
  document::{Document, EntityRecord, InlineRange},
  entity::{EntityId, EntityKind, EntityLabel, EntityRef},
};

/// Entities mentioned by one or more documents, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mentions {
  entries: Vec<EntityLabel>,
  /// Position in `entries` of each entity.
  index:   HashMap<EntityRef, usize>,
}

impl Mentions {
  /// Cached label of the first mention of `entity`.
  pub fn get(&self, entity: EntityRef) -> Option<&str> {
    self.index.get(&entity).map(|&i| self.entries[i].label.as_str())
  }

  pub fn contains(&self, entity: EntityRef) -> bool { self.index.contains_key(&entity) }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &EntityLabel> { self.entries.iter() }

  /// Ids of the mentioned entities of `kind`.
  pub fn ids(&self, kind: EntityKind) -> BTreeSet<EntityId> {
    self
      .entries
      .iter()
      .filter(|m| m.entity.kind == kind)
      .map(|m| m.entity.id)
      .collect()
  }

  /// Append the mentions of `other` that are not already present.
  pub fn merge(&mut self, other: Mentions) {
    for mention in other.entries {
      self.insert(mention);
    }
  }

  fn insert(&mut self, mention: EntityLabel) -> bool {
    if self.contains(mention.entity) {
      return false;
    }
    self.index.insert(mention.entity, self.entries.len());
    self.entries.push(mention);
    true
  }
}

/// Collect the entities `document` mentions, optionally restricted to `kind`.
///
/// Ranges are visited block by block in offset order, followed by entity-map
/// records no range refers to (in key order). The first occurrence of a
/// `(kind, id)` pair supplies its label.
pub fn extract(document: &Document, kind: Option<EntityKind>) -> Mentions {
  let accepts = |record: &EntityRecord| kind.is_none_or(|k| k == record.kind);
  let mut mentions = Mentions::default();
  let mut visited_keys: HashSet<&str> = HashSet::new();

  for block in &document.blocks {
    let mut ranges: Vec<&InlineRange> = block.ranges.iter().collect();
    ranges.sort_by_key(|r| r.offset);
    for range in ranges {
      let Some(record) = document.entity_map.get(&range.key) else {
        continue;
      };
      visited_keys.insert(range.key.as_str());
      if accepts(record) {
        mentions.insert(EntityLabel::new(record.entity_ref(), &record.cached_label));
      }
    }
  }

  for (key, record) in &document.entity_map {
    if !visited_keys.contains(key.as_str()) && accepts(record) {
      mentions.insert(EntityLabel::new(record.entity_ref(), &record.cached_label));
    }
  }

  mentions
}
