//! Document codec: conversion between stored raw strings and [`Document`].
//!
//! A raw value is one of:
//!
//! | Form            | Raw value                              |
//! |-----------------|----------------------------------------|
//! | canonical empty | `""`                                   |
//! | plain text      | `"plaintext:"` + UTF-8 text            |
//! | structured      | `"structured:"` + JSON payload         |
//!
//! Both tagged forms decode to the same block + entity-map representation.
//! Encoding always produces either the canonical empty value or the
//! structured form, so a plain-text value canonicalizes on its first write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{EntityId, EntityKind, EntityRef},
};

pub const PLAIN_TEXT_PREFIX: &str = "plaintext:";
pub const STRUCTURED_PREFIX: &str = "structured:";

// ─── Types ───────────────────────────────────────────────────────────────────

/// Decoded document: ordered blocks plus the entities their ranges mention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
  pub blocks:     Vec<Block>,
  #[serde(default)]
  pub entity_map: BTreeMap<String, EntityRecord>,
}

/// One line of text with its inline entity ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
  pub text:   String,
  #[serde(default)]
  pub ranges: Vec<InlineRange>,
}

/// A span of a block's text bound to an entity-map key.
///
/// `offset` and `length` count Unicode scalar values, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineRange {
  pub offset: usize,
  pub length: usize,
  pub key:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
  pub kind:          EntityKind,
  pub referenced_id: EntityId,
  pub cached_label:  String,
}

impl EntityRecord {
  pub fn entity_ref(&self) -> EntityRef {
    EntityRef::new(self.kind, self.referenced_id)
  }
}

impl Block {
  pub fn plain(text: &str) -> Self {
    Self { text: text.to_owned(), ranges: vec![] }
  }

  fn char_len(&self) -> usize { self.text.chars().count() }
}

// ─── Codec ───────────────────────────────────────────────────────────────────

impl Document {
  /// The canonical empty document.
  pub fn new() -> Self { Self::default() }

  /// Decode a raw stored value. Unknown discriminators are rejected.
  pub fn decode(raw: &str) -> Result<Self> {
    if raw.is_empty() {
      return Ok(Self::new());
    }
    if let Some(text) = raw.strip_prefix(PLAIN_TEXT_PREFIX) {
      return Ok(Self::from_plain_text(text));
    }
    if let Some(payload) = raw.strip_prefix(STRUCTURED_PREFIX) {
      let document: Document = serde_json::from_str(payload)
        .map_err(|e| Error::Format(format!("invalid structured payload: {e}")))?;
      document.validate()?;
      return Ok(document);
    }
    let preview: String = raw.chars().take(24).collect();
    Err(Error::Format(format!("unrecognized discriminator in {preview:?}")))
  }

  /// Encode to the raw stored form.
  pub fn encode(&self) -> Result<String> {
    if self.is_empty() {
      return Ok(String::new());
    }
    self.validate()?;
    Ok(format!("{STRUCTURED_PREFIX}{}", serde_json::to_string(self)?))
  }

  /// Plain text is stored without an entity map; one block per line.
  pub fn from_plain_text(text: &str) -> Self {
    Self {
      blocks:     text.split('\n').map(Block::plain).collect(),
      entity_map: BTreeMap::new(),
    }
  }

  /// Logically empty: no blocks, or a single block with no text.
  pub fn is_empty(&self) -> bool {
    match self.blocks.as_slice() {
      [] => true,
      [only] => only.text.is_empty(),
      _ => false,
    }
  }

  pub fn plain_text(&self) -> String {
    self
      .blocks
      .iter()
      .map(|b| b.text.as_str())
      .collect::<Vec<_>>()
      .join("\n")
  }

  /// Check that every range is bound to a known key and fits its block.
  pub fn validate(&self) -> Result<()> {
    for (index, block) in self.blocks.iter().enumerate() {
      let len = block.char_len();
      for range in &block.ranges {
        if !self.entity_map.contains_key(&range.key) {
          return Err(Error::Format(format!(
            "block {index}: range key {:?} missing from entity map",
            range.key
          )));
        }
        let end = range.offset.checked_add(range.length);
        if end.is_none_or(|end| end > len) {
          return Err(Error::Format(format!(
            "block {index}: range {}+{} exceeds text length {len}",
            range.offset, range.length
          )));
        }
      }
    }
    Ok(())
  }

  // ── Builders ──────────────────────────────────────────────────────────────

  /// Append text to the last block; each `\n` starts a new block.
  pub fn text(mut self, text: &str) -> Self {
    let mut lines = text.split('\n');
    if let Some(first) = lines.next() {
      self.last_block_mut().text.push_str(first);
    }
    for line in lines {
      self.blocks.push(Block::plain(line));
    }
    self
  }

  /// Append a mention of `entity` rendered as `label` to the last block.
  pub fn mention(mut self, entity: EntityRef, label: &str) -> Self {
    let key = self.unused_key();
    self.entity_map.insert(key.clone(), EntityRecord {
      kind:          entity.kind,
      referenced_id: entity.id,
      cached_label:  label.to_owned(),
    });
    let block = self.last_block_mut();
    let offset = block.char_len();
    block.text.push_str(label);
    block.ranges.push(InlineRange { offset, length: label.chars().count(), key });
    self
  }

  fn last_block_mut(&mut self) -> &mut Block {
    if self.blocks.is_empty() {
      self.blocks.push(Block::default());
    }
    let last = self.blocks.len() - 1;
    &mut self.blocks[last]
  }

  fn unused_key(&self) -> String {
    let mut n = self.entity_map.len();
    while self.entity_map.contains_key(&n.to_string()) {
      n += 1;
    }
    n.to_string()
  }
}

/// `encode(decode(raw))`: the form a raw value takes after one write.
pub fn canonicalize(raw: &str) -> Result<String> { Document::decode(raw)?.encode() }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_raw_decodes_to_canonical_empty() {
    let doc = Document::decode("").unwrap();
    assert!(doc.blocks.is_empty());
    assert!(doc.entity_map.is_empty());
    assert_eq!(doc.encode().unwrap(), "");
  }

  #[test]
  fn single_empty_block_normalizes_to_empty() {
    let doc = Document { blocks: vec![Block::default()], ..Default::default() };
    assert_eq!(doc.encode().unwrap(), "");
    assert_eq!(canonicalize("plaintext:").unwrap(), "");
  }

  #[test]
  fn plain_text_splits_lines() {
    let doc = Document::decode("plaintext:first\nsecond").unwrap();
    assert_eq!(doc.blocks.len(), 2);
    assert_eq!(doc.blocks[1].text, "second");
    assert!(doc.entity_map.is_empty());
    assert_eq!(doc.plain_text(), "first\nsecond");
  }

  #[test]
  fn unknown_discriminator_is_format_error() {
    let err = Document::decode("draft:{\"blocks\":[]}").unwrap_err();
    assert!(matches!(err, Error::Format(_)), "{err}");
    assert!(matches!(Document::decode("just words"), Err(Error::Format(_))));
  }

  #[test]
  fn corrupt_payload_is_format_error() {
    assert!(matches!(
      Document::decode("structured:{not json"),
      Err(Error::Format(_))
    ));
  }

  #[test]
  fn dangling_range_key_is_rejected() {
    let raw = r#"structured:{"blocks":[{"text":"Foo","ranges":[{"offset":0,"length":3,"key":"7"}]}],"entityMap":{}}"#;
    assert!(matches!(Document::decode(raw), Err(Error::Format(_))));
  }

  #[test]
  fn out_of_bounds_range_is_rejected() {
    let raw = r#"structured:{"blocks":[{"text":"Fo","ranges":[{"offset":1,"length":3,"key":"0"}]}],"entityMap":{"0":{"kind":"topic","referencedId":1,"cachedLabel":"Foo"}}}"#;
    assert!(matches!(Document::decode(raw), Err(Error::Format(_))));
  }

  #[test]
  fn structured_round_trip_is_canonical() {
    let doc = Document::new()
      .text("Read ")
      .mention(EntityRef::topic(10), "Foo")
      .text(" today\nand ")
      .mention(EntityRef::topic(11), "Bär");
    let raw = doc.encode().unwrap();
    assert!(raw.starts_with(STRUCTURED_PREFIX));
    let decoded = Document::decode(&raw).unwrap();
    assert_eq!(decoded, doc);
    assert_eq!(decoded.encode().unwrap(), raw);
    assert_eq!(canonicalize(&raw).unwrap(), raw);
  }

  #[test]
  fn canonicalize_is_idempotent_for_plain_text() {
    let once = canonicalize("plaintext:hello\nworld").unwrap();
    assert!(once.starts_with(STRUCTURED_PREFIX));
    assert_eq!(canonicalize(&once).unwrap(), once);
  }

  #[test]
  fn builder_offsets_count_chars() {
    let doc = Document::new().text("Café ").mention(EntityRef::topic(1), "Zoë");
    let range = &doc.blocks[0].ranges[0];
    assert_eq!(range.offset, 5);
    assert_eq!(range.length, 3);
    assert!(doc.validate().is_ok());
  }

  #[test]
  fn wire_format_field_names() {
    let raw = Document::new()
      .mention(EntityRef::topic(10), "Foo")
      .encode()
      .unwrap();
    assert_eq!(
      raw,
      r#"structured:{"blocks":[{"text":"Foo","ranges":[{"offset":0,"length":3,"key":"0"}]}],"entityMap":{"0":{"kind":"topic","referencedId":10,"cachedLabel":"Foo"}}}"#
    );
  }
}
