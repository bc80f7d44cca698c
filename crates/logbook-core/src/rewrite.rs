//! Content rewriter: relabel mentions without changing what they reference.
//!
//! Every range bound to a listed entity ends up reading as its listed label,
//! whatever it read before, and so does the entity map's cached label. The
//! result depends only on the document's structure and the final labels, so
//! relabeling in steps matches relabeling once. Blocks whose ranges overlap
//! or run past the block text keep their text untouched.

use std::collections::HashMap;

use crate::{
  Error, Result,
  document::{Block, Document},
  entity::{EntityLabel, EntityRef},
};

/// Replace the labels of `old` entities with their counterparts in `new`,
/// paired by [`EntityRef`].
pub fn rewrite(
  document: &Document,
  old: &[EntityLabel],
  new: &[EntityLabel],
) -> Result<Document> {
  let targets = old
    .iter()
    .map(|o| {
      new
        .iter()
        .find(|n| n.entity == o.entity)
        .cloned()
        .ok_or(Error::RelabelMismatch(o.entity))
    })
    .collect::<Result<Vec<_>>>()?;
  Ok(relabel(document, &targets))
}

/// Give every mention of the listed entities its listed label.
pub fn relabel(document: &Document, labels: &[EntityLabel]) -> Document {
  let wanted: HashMap<EntityRef, &str> = labels
    .iter()
    .map(|l| (l.entity, l.label.as_str()))
    .collect();

  let mut out = document.clone();
  let mut labels_by_key: HashMap<String, String> = HashMap::new();
  for (key, record) in out.entity_map.iter_mut() {
    if let Some(&label) = wanted.get(&record.entity_ref()) {
      label.clone_into(&mut record.cached_label);
      labels_by_key.insert(key.clone(), label.to_owned());
    }
  }

  if !labels_by_key.is_empty() {
    for block in &mut out.blocks {
      relabel_block(block, &labels_by_key);
    }
  }
  out
}

fn relabel_block(block: &mut Block, labels_by_key: &HashMap<String, String>) {
  if !block.ranges.iter().any(|r| labels_by_key.contains_key(&r.key)) {
    return;
  }

  let chars: Vec<char> = block.text.chars().collect();
  let mut order: Vec<usize> = (0..block.ranges.len()).collect();
  order.sort_by_key(|&i| (block.ranges[i].offset, block.ranges[i].length));

  let in_bounds = block.ranges.iter().all(|r| r.offset + r.length <= chars.len());
  let overlapping = order.windows(2).any(|w| {
    let a = &block.ranges[w[0]];
    a.offset + a.length > block.ranges[w[1]].offset
  });
  if !in_bounds || overlapping {
    return;
  }

  let mut text = String::with_capacity(block.text.len());
  let mut cursor = 0;
  let mut emitted = 0;
  for i in order {
    let range = &mut block.ranges[i];
    let start = range.offset;
    let end = start + range.length;

    text.extend(&chars[cursor..start]);
    emitted += start - cursor;

    range.offset = emitted;
    match labels_by_key.get(&range.key) {
      Some(next) => {
        text.push_str(next);
        range.length = next.chars().count();
      }
      None => text.extend(&chars[start..end]),
    }
    emitted += range.length;
    cursor = end;
  }
  text.extend(&chars[cursor..]);
  block.text = text;
}
