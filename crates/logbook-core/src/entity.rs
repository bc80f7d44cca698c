//! Entity kinds, references and the document-owning entities themselves.
//!
//! Every entity kind implements [`Mentionable`]: it owns one or more document
//! fields and participates in the backlink graph. Kind-specific behaviour is
//! selected through the tagged [`Entity`] enum, never by inspecting shapes.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Result, document::Document, ordering::OrderingScope, session::Session};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Row identifier. Negative values are virtual (unsaved) identities.
pub type EntityId = i64;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  Topic,
  Entry,
  Structure,
}

impl EntityKind {
  pub const ALL: [EntityKind; 3] =
    [EntityKind::Topic, EntityKind::Entry, EntityKind::Structure];
}

/// A `(kind, id)` pair naming one entity.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id:   EntityId,
}

impl EntityRef {
  pub fn new(kind: EntityKind, id: EntityId) -> Self { Self { kind, id } }

  pub fn topic(id: EntityId) -> Self { Self::new(EntityKind::Topic, id) }

  pub fn entry(id: EntityId) -> Self { Self::new(EntityKind::Entry, id) }

  pub fn structure(id: EntityId) -> Self { Self::new(EntityKind::Structure, id) }

  /// True until the entity has been assigned a real id by a save.
  pub fn is_virtual(&self) -> bool { self.id <= 0 }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.kind, self.id)
  }
}

/// An entity together with the display label its mentions should carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLabel {
  pub entity: EntityRef,
  pub label:  String,
}

impl EntityLabel {
  pub fn new(entity: EntityRef, label: impl Into<String>) -> Self {
    Self { entity, label: label.into() }
  }
}

// ─── Capability ──────────────────────────────────────────────────────────────

/// Names of the document-typed fields across all kinds.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentField {
  Title,
  Details,
  TitleTemplate,
}

/// The capability shared by every kind that owns documents and takes part in
/// the backlink graph, as source and as target.
pub trait Mentionable {
  fn kind(&self) -> EntityKind;

  fn id(&self) -> EntityId;

  fn set_id(&mut self, id: EntityId);

  /// The label other documents cache when they mention this entity.
  fn label(&self) -> String;

  /// Document fields owned by this kind, in scan order.
  fn document_fields(&self) -> &'static [DocumentField];

  /// Raw stored value of a document field; `None` if the kind lacks it.
  fn document(&self, field: DocumentField) -> Option<&str>;

  fn document_mut(&mut self, field: DocumentField) -> Option<&mut String>;

  /// Sibling scope this entity is ordered within.
  fn ordering_scope(&self) -> OrderingScope;

  fn ordering_index(&self) -> Option<i64>;

  fn set_ordering_index(&mut self, index: i64);

  /// Recompute fields derived from documents. Called before every write.
  fn refresh_derived(&mut self) -> Result<()> { Ok(()) }

  fn entity_ref(&self) -> EntityRef { EntityRef::new(self.kind(), self.id()) }
}

// ─── Topic ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
  pub id:             EntityId,
  pub parent_id:      Option<EntityId>,
  pub name:           String,
  /// Raw document.
  pub details:        String,
  pub pinned:         bool,
  pub has_structure:  bool,
  pub ordering_index: Option<i64>,
}

impl Topic {
  pub fn new_virtual(
    session: &Session,
    name: impl Into<String>,
    parent_id: Option<EntityId>,
  ) -> Self {
    Self {
      id: session.next_virtual_id(),
      parent_id,
      name: name.into(),
      details: String::new(),
      pinned: false,
      has_structure: false,
      ordering_index: None,
    }
  }
}

impl Mentionable for Topic {
  fn kind(&self) -> EntityKind { EntityKind::Topic }

  fn id(&self) -> EntityId { self.id }

  fn set_id(&mut self, id: EntityId) { self.id = id; }

  fn label(&self) -> String { self.name.clone() }

  fn document_fields(&self) -> &'static [DocumentField] { &[DocumentField::Details] }

  fn document(&self, field: DocumentField) -> Option<&str> {
    match field {
      DocumentField::Details => Some(&self.details),
      _ => None,
    }
  }

  fn document_mut(&mut self, field: DocumentField) -> Option<&mut String> {
    match field {
      DocumentField::Details => Some(&mut self.details),
      _ => None,
    }
  }

  fn ordering_scope(&self) -> OrderingScope {
    OrderingScope::Topics { parent: self.parent_id }
  }

  fn ordering_index(&self) -> Option<i64> { self.ordering_index }

  fn set_ordering_index(&mut self, index: i64) { self.ordering_index = Some(index); }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub id:             EntityId,
  pub date:           Option<NaiveDate>,
  /// Plain text of `title`; derived, never edited directly.
  pub name:           String,
  /// Raw document.
  pub title:          String,
  /// Raw document.
  pub details:        String,
  pub is_complete:    bool,
  pub ordering_index: Option<i64>,
}

impl Entry {
  pub fn new_virtual(
    session: &Session,
    title: impl Into<String>,
    date: Option<NaiveDate>,
  ) -> Self {
    Self {
      id: session.next_virtual_id(),
      date,
      name: String::new(),
      title: title.into(),
      details: String::new(),
      is_complete: true,
      ordering_index: None,
    }
  }
}

impl Mentionable for Entry {
  fn kind(&self) -> EntityKind { EntityKind::Entry }

  fn id(&self) -> EntityId { self.id }

  fn set_id(&mut self, id: EntityId) { self.id = id; }

  fn label(&self) -> String { self.name.clone() }

  fn document_fields(&self) -> &'static [DocumentField] {
    &[DocumentField::Title, DocumentField::Details]
  }

  fn document(&self, field: DocumentField) -> Option<&str> {
    match field {
      DocumentField::Title => Some(&self.title),
      DocumentField::Details => Some(&self.details),
      DocumentField::TitleTemplate => None,
    }
  }

  fn document_mut(&mut self, field: DocumentField) -> Option<&mut String> {
    match field {
      DocumentField::Title => Some(&mut self.title),
      DocumentField::Details => Some(&mut self.details),
      DocumentField::TitleTemplate => None,
    }
  }

  fn ordering_scope(&self) -> OrderingScope {
    OrderingScope::Entries { date: self.date, complete: self.is_complete }
  }

  fn ordering_index(&self) -> Option<i64> { self.ordering_index }

  fn set_ordering_index(&mut self, index: i64) { self.ordering_index = Some(index); }

  fn refresh_derived(&mut self) -> Result<()> {
    self.name = Document::decode(&self.title)?.plain_text();
    Ok(())
  }
}

// ─── Structure ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
  pub id:             EntityId,
  pub name:           String,
  /// Raw document.
  pub title_template: String,
  pub ordering_index: Option<i64>,
}

impl Structure {
  pub fn new_virtual(session: &Session, name: impl Into<String>) -> Self {
    Self {
      id: session.next_virtual_id(),
      name: name.into(),
      title_template: String::new(),
      ordering_index: None,
    }
  }
}

impl Mentionable for Structure {
  fn kind(&self) -> EntityKind { EntityKind::Structure }

  fn id(&self) -> EntityId { self.id }

  fn set_id(&mut self, id: EntityId) { self.id = id; }

  fn label(&self) -> String { self.name.clone() }

  fn document_fields(&self) -> &'static [DocumentField] {
    &[DocumentField::TitleTemplate]
  }

  fn document(&self, field: DocumentField) -> Option<&str> {
    match field {
      DocumentField::TitleTemplate => Some(&self.title_template),
      _ => None,
    }
  }

  fn document_mut(&mut self, field: DocumentField) -> Option<&mut String> {
    match field {
      DocumentField::TitleTemplate => Some(&mut self.title_template),
      _ => None,
    }
  }

  fn ordering_scope(&self) -> OrderingScope { OrderingScope::Structures }

  fn ordering_index(&self) -> Option<i64> { self.ordering_index }

  fn set_ordering_index(&mut self, index: i64) { self.ordering_index = Some(index); }
}

// ─── Tagged union ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
  Topic(Topic),
  Entry(Entry),
  Structure(Structure),
}

impl Entity {
  pub fn as_mentionable(&self) -> &dyn Mentionable {
    match self {
      Entity::Topic(t) => t,
      Entity::Entry(e) => e,
      Entity::Structure(s) => s,
    }
  }

  pub fn as_mentionable_mut(&mut self) -> &mut dyn Mentionable {
    match self {
      Entity::Topic(t) => t,
      Entity::Entry(e) => e,
      Entity::Structure(s) => s,
    }
  }

  pub fn kind(&self) -> EntityKind { self.as_mentionable().kind() }

  pub fn entity_ref(&self) -> EntityRef { self.as_mentionable().entity_ref() }

  pub fn label(&self) -> String { self.as_mentionable().label() }

  pub fn into_topic(self) -> Option<Topic> {
    match self {
      Entity::Topic(t) => Some(t),
      _ => None,
    }
  }

  pub fn into_entry(self) -> Option<Entry> {
    match self {
      Entity::Entry(e) => Some(e),
      _ => None,
    }
  }

  pub fn into_structure(self) -> Option<Structure> {
    match self {
      Entity::Structure(s) => Some(s),
      _ => None,
    }
  }
}

impl From<Topic> for Entity {
  fn from(t: Topic) -> Self { Entity::Topic(t) }
}

impl From<Entry> for Entity {
  fn from(e: Entry) -> Self { Entity::Entry(e) }
}

impl From<Structure> for Entity {
  fn from(s: Structure) -> Self { Entity::Structure(s) }
}
