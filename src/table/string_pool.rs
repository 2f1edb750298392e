use binrw::{binrw, BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom, Write};

use crate::table::chunk::{align4, ChunkHeader, ChunkType, ChunkWriter};
use crate::table::TableError;

const SPAN_END: u32 = 0xffff_ffff;

#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StringPoolHeader {
    pub string_count: u32,
    pub style_count: u32,
    pub flags: u32,
    pub strings_start: u32,
    pub styles_start: u32,
}

impl StringPoolHeader {
    pub const SORTED_FLAG: u32 = 1 << 0;
    pub const UTF8_FLAG: u32 = 1 << 8;

    pub fn is_utf8(&self) -> bool {
        self.flags & Self::UTF8_FLAG != 0
    }
}

/// Markup applied to a range of characters of a styled string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StringSpan {
    pub name: u32,
    pub first: u32,
    pub last: u32,
}

/// An indexed pool of strings. Values refer to strings by their index, so strings are only
/// ever appended.
#[derive(Clone, Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
    styles: Vec<Vec<StringSpan>>,
    utf8: bool,
    lookup: HashMap<String, u32>,
}

impl StringPool {
    pub fn new(utf8: bool) -> Self {
        Self {
            utf8,
            ..Default::default()
        }
    }

    /// Builds an unstyled pool out of `strings`, keeping their order.
    pub fn from_strings<I: IntoIterator<Item = S>, S: Into<String>>(strings: I, utf8: bool) -> Self {
        let mut pool = StringPool::new(utf8);
        for string in strings {
            pool.push(string.into());
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn spans(&self, index: u32) -> &[StringSpan] {
        self.styles
            .get(index as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Index of an unstyled occurrence of `value`.
    pub fn index_of(&self, value: &str) -> Option<u32> {
        self.lookup.get(value).copied()
    }

    /// Returns the index of `value`, appending it when the pool doesn't contain it yet.
    pub fn get_or_insert(&mut self, value: &str) -> u32 {
        match self.index_of(value) {
            Some(index) => index,
            None => self.push(value.to_string()),
        }
    }

    pub(crate) fn push(&mut self, value: String) -> u32 {
        let index = self.strings.len() as u32;
        self.lookup.entry(value.clone()).or_insert(index);
        self.strings.push(value);
        index
    }

    fn is_styled(&self, index: usize) -> bool {
        self.styles.get(index).is_some_and(|spans| !spans.is_empty())
    }

    /// Parses a string pool chunk. `data` must start at the chunk header.
    pub fn read(data: &[u8]) -> Result<Self, TableError> {
        let mut reader = Cursor::new(data);
        let chunk = ChunkHeader::read(&mut reader)?;
        chunk.expect(ChunkType::StringPool)?;
        let header = StringPoolHeader::read(&mut reader)?;
        reader.seek(SeekFrom::Start(chunk.header_size as u64))?;

        let mut string_offsets = Vec::with_capacity(header.string_count as usize);
        for _ in 0..header.string_count {
            string_offsets.push(reader.read_u32::<LittleEndian>()?);
        }
        let mut style_offsets = Vec::with_capacity(header.style_count as usize);
        for _ in 0..header.style_count {
            style_offsets.push(reader.read_u32::<LittleEndian>()?);
        }

        let data = &data[..(chunk.size as usize).min(data.len())];
        let mut pool = StringPool::new(header.is_utf8());
        for offset in string_offsets {
            let position = header.strings_start as usize + offset as usize;
            let string = if pool.utf8 {
                read_utf8(data, position)?
            } else {
                read_utf16(data, position)?
            };
            pool.strings.push(string);
        }

        for offset in style_offsets {
            reader.seek(SeekFrom::Start(header.styles_start as u64 + offset as u64))?;
            let mut spans = vec![];
            loop {
                let name = reader.read_u32::<LittleEndian>()?;
                if name == SPAN_END {
                    break;
                }
                spans.push(StringSpan {
                    name,
                    first: reader.read_u32::<LittleEndian>()?,
                    last: reader.read_u32::<LittleEndian>()?,
                });
            }
            pool.styles.push(spans);
        }

        for index in (0..pool.strings.len()).rev() {
            if !pool.is_styled(index) {
                pool.lookup.insert(pool.strings[index].clone(), index as u32);
            }
        }
        Ok(pool)
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), TableError> {
        let mut chunk = ChunkWriter::start(ChunkType::StringPool, writer)?;
        StringPoolHeader::default().write(writer)?;
        chunk.end_header(writer)?;

        let offsets_start = writer.stream_position()?;
        for _ in 0..self.strings.len() + self.styles.len() {
            writer.write_u32::<LittleEndian>(0)?;
        }

        let mut offsets = Vec::with_capacity(self.strings.len() + self.styles.len());
        let strings_start = writer.stream_position()?;
        for string in &self.strings {
            offsets.push((writer.stream_position()? - strings_start) as u32);
            if self.utf8 {
                write_utf8(writer, string)?;
            } else {
                write_utf16(writer, string)?;
            }
        }
        align4(writer)?;

        let styles_start = writer.stream_position()?;
        for spans in &self.styles {
            offsets.push((writer.stream_position()? - styles_start) as u32);
            for span in spans {
                writer.write_u32::<LittleEndian>(span.name)?;
                writer.write_u32::<LittleEndian>(span.first)?;
                writer.write_u32::<LittleEndian>(span.last)?;
            }
            writer.write_u32::<LittleEndian>(SPAN_END)?;
        }
        if !self.styles.is_empty() {
            writer.write_u32::<LittleEndian>(SPAN_END)?;
            writer.write_u32::<LittleEndian>(SPAN_END)?;
        }

        let (start, end) = chunk.finish(writer)?;
        let header = StringPoolHeader {
            string_count: self.strings.len() as u32,
            style_count: self.styles.len() as u32,
            flags: if self.utf8 {
                StringPoolHeader::UTF8_FLAG
            } else {
                0
            },
            strings_start: if self.strings.is_empty() {
                0
            } else {
                (strings_start - start) as u32
            },
            styles_start: if self.styles.is_empty() {
                0
            } else {
                (styles_start - start) as u32
            },
        };
        writer.seek(SeekFrom::Start(start + 8))?;
        header.write(writer)?;
        writer.seek(SeekFrom::Start(offsets_start))?;
        for offset in offsets {
            writer.write_u32::<LittleEndian>(offset)?;
        }
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

fn byte_at(data: &[u8], position: usize) -> Result<u8, TableError> {
    data.get(position)
        .copied()
        .ok_or_else(|| TableError::InvalidString(format!("string data ends at {position:#x}")))
}

fn utf8_length(data: &[u8], position: usize) -> Result<(usize, usize), TableError> {
    let first = byte_at(data, position)? as usize;
    if first & 0x80 != 0 {
        let second = byte_at(data, position + 1)? as usize;
        Ok((((first & 0x7f) << 8) | second, 2))
    } else {
        Ok((first, 1))
    }
}

fn read_utf8(data: &[u8], position: usize) -> Result<String, TableError> {
    let (_, skip) = utf8_length(data, position)?;
    let (length, skip2) = utf8_length(data, position + skip)?;
    let start = position + skip + skip2;
    let bytes = data
        .get(start..start + length)
        .ok_or_else(|| TableError::InvalidString(format!("string at {position:#x} is truncated")))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf16(data: &[u8], position: usize) -> Result<String, TableError> {
    let mut reader = Cursor::new(data);
    reader.set_position(position as u64);
    let first = reader.read_u16::<LittleEndian>()? as usize;
    let length = if first & 0x8000 != 0 {
        ((first & 0x7fff) << 16) | reader.read_u16::<LittleEndian>()? as usize
    } else {
        first
    };
    let mut units = Vec::with_capacity(length);
    for _ in 0..length {
        units.push(reader.read_u16::<LittleEndian>()?);
    }
    Ok(String::from_utf16_lossy(&units))
}

fn write_utf8_length<W: Write>(writer: &mut W, length: usize) -> Result<(), TableError> {
    if length > 0x7fff {
        return Err(TableError::InvalidString(format!(
            "{length} units do not fit a UTF-8 pool string"
        )));
    }
    if length > 0x7f {
        writer.write_u8(((length >> 8) | 0x80) as u8)?;
    }
    writer.write_u8(length as u8)?;
    Ok(())
}

fn write_utf8<W: Write>(writer: &mut W, value: &str) -> Result<(), TableError> {
    write_utf8_length(writer, value.encode_utf16().count())?;
    write_utf8_length(writer, value.len())?;
    writer.write_all(value.as_bytes())?;
    writer.write_u8(0)?;
    Ok(())
}

fn write_utf16<W: Write>(writer: &mut W, value: &str) -> Result<(), TableError> {
    let units: Vec<u16> = value.encode_utf16().collect();
    if units.len() > 0x7fff {
        writer.write_u16::<LittleEndian>(((units.len() >> 16) | 0x8000) as u16)?;
    }
    writer.write_u16::<LittleEndian>(units.len() as u16)?;
    for unit in units {
        writer.write_u16::<LittleEndian>(unit)?;
    }
    writer.write_u16::<LittleEndian>(0)?;
    Ok(())
}
