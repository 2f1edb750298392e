//! Chunk headers shared by the resource table and binary XML formats, and the writer
//! helpers that patch chunk sizes once the contents are known.

use binrw::{binrw, BinResult, BinWrite};
use std::io::{Seek, SeekFrom, Write};

use crate::table::TableError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum ChunkType {
    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlResourceMap = 0x0180,
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
    TableOverlayable = 0x0204,
    TableOverlayablePolicy = 0x0205,
    TableStagedAlias = 0x0206,
}

impl ChunkType {
    pub fn from_u16(ty: u16) -> Option<Self> {
        Some(match ty {
            0x0000 => ChunkType::Null,
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCdata,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            0x0203 => ChunkType::TableLibrary,
            0x0204 => ChunkType::TableOverlayable,
            0x0205 => ChunkType::TableOverlayablePolicy,
            0x0206 => ChunkType::TableStagedAlias,
            _ => return None,
        })
    }
}

#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChunkHeader {
    /// Type identifier for this chunk.
    pub ty: u16,
    /// Size of the chunk header in bytes. The chunk data starts right after it.
    pub header_size: u16,
    /// Total size of this chunk in bytes, header and children included.
    pub size: u32,
}

impl ChunkHeader {
    pub const SIZE: u16 = 8;

    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.ty)
    }

    pub fn expect(&self, ty: ChunkType) -> Result<(), TableError> {
        if self.ty != ty as u16 {
            return Err(TableError::UnexpectedChunk {
                expected: ty as u16,
                found: self.ty,
            });
        }
        Ok(())
    }
}

#[binrw]
#[brw(little)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageHeader {
    pub id: u32,
    pub name: [u16; 128],
    pub type_strings: u32,
    pub last_public_type: u32,
    pub key_strings: u32,
    pub last_public_key: u32,
    pub type_id_offset: u32,
}

impl PackageHeader {
    pub const SIZE: u16 = ChunkHeader::SIZE + 4 + 256 + 5 * 4;

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|c| *c == 0).unwrap_or(self.name.len());
        String::from_utf16_lossy(&self.name[..end])
    }

    pub fn encode_name(name: &str) -> [u16; 128] {
        let mut encoded = [0u16; 128];
        for (slot, unit) in encoded.iter_mut().take(127).zip(name.encode_utf16()) {
            *slot = unit;
        }
        encoded
    }
}

#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TypeSpecHeader {
    pub id: u8,
    pub res0: u8,
    pub types_count: u16,
    pub entry_count: u32,
}

/// Header of a type chunk, up to (excluding) its configuration.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TypeHeader {
    pub id: u8,
    pub flags: u8,
    pub reserved: u16,
    pub entry_count: u32,
    pub entries_start: u32,
}

impl TypeHeader {
    pub const FLAG_SPARSE: u8 = 0x01;
    pub const FLAG_OFFSET16: u8 = 0x02;
}

pub const NO_ENTRY: u32 = 0xffff_ffff;

/// Writes a chunk header placeholder and fills it in once the chunk is complete.
pub(crate) struct ChunkWriter {
    ty: ChunkType,
    start: u64,
    header_end: Option<u64>,
}

impl ChunkWriter {
    pub fn start<W: Write + Seek>(ty: ChunkType, writer: &mut W) -> BinResult<Self> {
        let start = writer.stream_position()?;
        ChunkHeader::default().write(writer)?;
        Ok(Self {
            ty,
            start,
            header_end: None,
        })
    }

    pub fn start_position(&self) -> u64 {
        self.start
    }

    pub fn end_header<W: Write + Seek>(&mut self, writer: &mut W) -> BinResult<()> {
        self.header_end = Some(writer.stream_position()?);
        Ok(())
    }

    /// Patches the header and returns the start and end offsets of the chunk.
    pub fn finish<W: Write + Seek>(self, writer: &mut W) -> BinResult<(u64, u64)> {
        let end = writer.stream_position()?;
        let header_end = self.header_end.unwrap_or(end);
        let header = ChunkHeader {
            ty: self.ty as u16,
            header_size: (header_end - self.start) as u16,
            size: (end - self.start) as u32,
        };
        writer.seek(SeekFrom::Start(self.start))?;
        header.write(writer)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok((self.start, end))
    }
}

/// Pads the stream with zeroes up to the next 4 byte boundary.
pub(crate) fn align4<W: Write + Seek>(writer: &mut W) -> std::io::Result<()> {
    while writer.stream_position()? % 4 != 0 {
        writer.write_all(&[0])?;
    }
    Ok(())
}

/// Overwrites a little endian `u32` at `offset` and returns to the previous position.
pub(crate) fn backpatch_u32<W: Write + Seek>(
    writer: &mut W,
    offset: u64,
    value: u32,
) -> std::io::Result<()> {
    let current = writer.stream_position()?;
    writer.seek(SeekFrom::Start(offset))?;
    writer.write_all(&value.to_le_bytes())?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}
