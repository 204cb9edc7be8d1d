//! Media descriptor files: flat arrays of fixed-layout image or widget records.
//!
//! ```text
//! image:  pid u24 | dt u32 (seconds) | height u8 | width u8            (9 bytes)
//! widget: type u8 | base u32 (seconds) | offset i8 | text_len u16 | text (8 + text_len)
//! ```
//!
//! All integers are big-endian.

use crate::error::{CodecError, Result};
use crate::wire::{ByteReader, WireKey, put_u24};
use overlay_core::{Item, Payload, SortKey};
use std::marker::PhantomData;
use tracing::trace;

/// Records per chunk yielded by [`DescriptorReader`] unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A fixed-layout descriptor record.
pub trait Record: Sized {
    /// Read one record.
    fn read(input: &mut ByteReader<'_>) -> Result<Self>;

    /// Append the encoded record to `out`.
    fn write(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Convert into a timeline item.
    fn into_item(self) -> Item;
}

/// One photo of `images.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRecord {
    /// Photo id (24 bits).
    pub pid: u32,
    /// Timestamp in whole seconds.
    pub dt: u32,
    /// Thumbnail height.
    pub height: u8,
    /// Thumbnail width.
    pub width: u8,
}

impl ImageRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = 9;

    /// Record for an image item. The key is truncated to its coarse second.
    pub fn from_item(item: &Item) -> Result<Self> {
        let Payload::Image { pid, height, width } = item.payload else {
            return Err(CodecError::NotAnImage { key: item.key });
        };
        let dt = u32::try_from(item.key.dt()).map_err(|_| CodecError::KeyOutOfRange {
            key: item.key,
        })?;
        Ok(Self {
            pid,
            dt,
            height,
            width,
        })
    }
}

impl Record for ImageRecord {
    fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let pid = input.u24()?;
        let dt = input.u32()?;
        let height = input.u8()?;
        let width = input.u8()?;
        Ok(Self {
            pid,
            dt,
            height,
            width,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u24(out, "pid", self.pid)?;
        out.extend_from_slice(&self.dt.to_be_bytes());
        out.push(self.height);
        out.push(self.width);
        Ok(())
    }

    fn into_item(self) -> Item {
        Item::image(
            SortKey::from_parts(self.dt.into(), 0),
            self.pid,
            self.height,
            self.width,
        )
    }
}

/// One text widget of `widgets.bin` (also the addition record of a commit payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRecord {
    /// One-byte widget type.
    pub widget_type: u8,
    /// Position on the timeline.
    pub key: WireKey,
    /// Widget text.
    pub text: String,
}

impl WidgetRecord {
    /// Size of the fixed header preceding the text.
    pub const HEADER_SIZE: usize = 8;

    /// Record for a widget item.
    pub fn from_item(item: &Item) -> Result<Self> {
        let Payload::Widget { widget_type, text } = &item.payload else {
            return Err(CodecError::NotAWidget { key: item.key });
        };
        let widget_type = match u8::try_from(*widget_type) {
            Ok(byte) if byte != 0 => byte,
            _ => return Err(CodecError::InvalidWidgetType(*widget_type)),
        };
        Ok(Self {
            widget_type,
            key: WireKey::from_key(item.key)?,
            text: text.clone(),
        })
    }
}

impl Record for WidgetRecord {
    fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let widget_type = input.u8()?;
        let key = WireKey::read(input)?;
        let len = input.u16()?;
        let text = String::from_utf8_lossy(input.bytes(len.into())?).into_owned();
        Ok(Self {
            widget_type,
            key,
            text,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = u16::try_from(self.text.len()).map_err(|_| CodecError::FieldOverflow {
            field: "text_len",
            value: self.text.len() as u64,
        })?;
        out.push(self.widget_type);
        self.key.write(out);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(self.text.as_bytes());
        Ok(())
    }

    fn into_item(self) -> Item {
        Item::widget(self.key.to_key(), char::from(self.widget_type), self.text)
    }
}

/// Streaming decoder yielding descriptor records in chunks.
///
/// After the first error the reader is exhausted.
#[derive(Debug, Clone)]
pub struct DescriptorReader<'a, R> {
    input: ByteReader<'a>,
    chunk_size: usize,
    failed: bool,
    _record: PhantomData<R>,
}

impl<'a, R: Record> DescriptorReader<'a, R> {
    /// Read records from `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            input: ByteReader::new(bytes),
            chunk_size: DEFAULT_CHUNK_SIZE,
            failed: false,
            _record: PhantomData,
        }
    }

    /// Set the number of records per chunk (at least one).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Whether every byte has been consumed (or reading failed).
    pub fn is_done(&self) -> bool {
        self.failed || self.input.is_empty()
    }

    /// Byte offset of the next record.
    pub fn position(&self) -> usize {
        self.input.position()
    }
}

impl<R: Record> Iterator for DescriptorReader<'_, R> {
    type Item = Result<Vec<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_done() {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size.min(self.input.remaining()));
        while chunk.len() < self.chunk_size && !self.input.is_empty() {
            match R::read(&mut self.input) {
                Ok(record) => chunk.push(record),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        trace!(
            records = chunk.len(),
            position = self.input.position(),
            "decoded descriptor chunk"
        );
        Some(Ok(chunk))
    }
}

fn decode<R: Record>(bytes: &[u8]) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for chunk in DescriptorReader::<R>::new(bytes) {
        items.extend(chunk?.into_iter().map(R::into_item));
    }
    Ok(items)
}

/// Decode a whole image descriptor file into items.
pub fn decode_images(bytes: &[u8]) -> Result<Vec<Item>> {
    decode::<ImageRecord>(bytes)
}

/// Decode a whole widget descriptor file into items.
pub fn decode_widgets(bytes: &[u8]) -> Result<Vec<Item>> {
    decode::<WidgetRecord>(bytes)
}

/// Encode image items into a descriptor file.
pub fn encode_images(items: &[Item]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len() * ImageRecord::SIZE);
    for item in items {
        ImageRecord::from_item(item)?.write(&mut out)?;
    }
    Ok(out)
}

/// Encode widget records into a descriptor file.
pub fn encode_widgets(records: &[WidgetRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        record.write(&mut out)?;
    }
    Ok(out)
}
