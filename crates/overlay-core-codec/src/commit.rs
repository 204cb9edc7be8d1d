//! Commit payloads: the collected overlay diff as sent to the server, and the server-side merge
//! of such a payload into a widget descriptor file.
//!
//! ```text
//! widget record*  |  0x00  |  (base u32 | offset i8)*
//! ```

use crate::descriptor::{DescriptorReader, Record, WidgetRecord, encode_widgets};
use crate::error::{CodecError, Result};
use crate::wire::{ByteReader, WireKey};
use overlay_core::{Collected, ItemKind};
use tracing::debug;

/// A decoded commit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    /// Widgets to add.
    pub added: Vec<WidgetRecord>,
    /// Keys of the widgets to delete.
    pub deleted: Vec<WireKey>,
}

impl Commit {
    /// Build a commit from collected overlay edits.
    ///
    /// Only widgets can be committed; an added or deleted image is rejected.
    pub fn from_collected(collected: &Collected) -> Result<Self> {
        let added = collected
            .added
            .iter()
            .map(WidgetRecord::from_item)
            .collect::<Result<Vec<_>>>()?;
        let deleted = collected
            .deleted
            .iter()
            .map(|tombstone| match tombstone.kind {
                ItemKind::Widget => WireKey::from_key(tombstone.key),
                ItemKind::Image => Err(CodecError::NotAWidget { key: tombstone.key }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { added, deleted })
    }

    /// Encode the payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = encode_widgets(&self.added)?;
        out.reserve(1 + self.deleted.len() * WireKey::SIZE);
        out.push(0);
        for key in &self.deleted {
            key.write(&mut out);
        }
        Ok(out)
    }

    /// Decode a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = ByteReader::new(bytes);
        let mut added = Vec::new();
        loop {
            match input.peek() {
                None => return Err(CodecError::MissingSeparator),
                Some(0) => {
                    input.u8()?;
                    break;
                }
                Some(_) => added.push(WidgetRecord::read(&mut input)?),
            }
        }
        let mut deleted = Vec::with_capacity(input.remaining() / WireKey::SIZE);
        while !input.is_empty() {
            deleted.push(WireKey::read(&mut input)?);
        }
        Ok(Self { added, deleted })
    }
}

/// Encode collected overlay edits into a commit payload.
pub fn encode_commit(collected: &Collected) -> Result<Vec<u8>> {
    Commit::from_collected(collected)?.encode()
}

/// Decode a commit payload.
pub fn decode_commit(bytes: &[u8]) -> Result<Commit> {
    Commit::decode(bytes)
}

/// Merge a commit payload into a widget descriptor file and return the new file.
///
/// Additions are merged by key; a record is dropped when its key equals the next pending
/// deletion. A deletion that matches no record fails the whole merge. Afterwards the offsets
/// inside every one-second group are renumbered to `-n..=-1` followed by `1..=m`, keeping the
/// records' order.
pub fn apply_commit(descriptor: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let mut commit = Commit::decode(payload)?;
    commit.added.sort_by_key(|record| record.key);
    commit.deleted.sort();

    let mut existing = Vec::new();
    for chunk in DescriptorReader::<WidgetRecord>::new(descriptor) {
        existing.extend(chunk?);
    }
    let kept_before = existing.len();
    let (added, deleted) = (commit.added.len(), commit.deleted.len());

    let mut merged = Vec::with_capacity(existing.len() + added);
    let mut adds = commit.added.into_iter().peekable();
    let mut dels = commit.deleted.into_iter().peekable();
    for record in existing {
        while let Some(add) = adds.next_if(|add| add.key < record.key) {
            merged.push(add);
        }
        match dels.peek() {
            Some(&del) if del == record.key => {
                dels.next();
            }
            Some(&del) if del < record.key => {
                return Err(CodecError::UnmatchedDeletion { key: del.to_key() });
            }
            _ => merged.push(record),
        }
    }
    if let Some(del) = dels.next() {
        return Err(CodecError::UnmatchedDeletion { key: del.to_key() });
    }
    merged.extend(adds);

    renumber_offsets(&mut merged)?;
    debug!(
        before = kept_before,
        added,
        deleted,
        after = merged.len(),
        "applied commit"
    );
    encode_widgets(&merged)
}

fn renumber_offsets(records: &mut [WidgetRecord]) -> Result<()> {
    for group in records.chunk_by_mut(|a, b| a.key.base == b.key.base) {
        let negatives = group.iter().filter(|r| r.key.offset < 0).count();
        let positives = group.len() - negatives;
        if negatives > 128 || positives > 127 {
            return Err(CodecError::GroupTooLarge {
                base: group[0].key.base,
                len: group.len(),
            });
        }
        for (i, record) in group.iter_mut().enumerate() {
            let rank = i as i64 - negatives as i64;
            let offset = if i < negatives { rank } else { rank + 1 };
            record.key.offset = offset as i8;
        }
    }
    Ok(())
}
