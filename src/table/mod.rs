//! In-memory model of the binary resource table (`resources.arsc`) and its codec.
//!
//! A [ResourceTable] owns a global value string pool and one or more [Package]s. A package
//! holds one [TypeSpec] per resource type (`string`, `drawable`, `id`, ...), and every type
//! holds one [TypeBlock] per device configuration. Entry names live on the type spec, so the
//! same entry index names the same resource in every configuration.

pub mod chunk;
pub mod config;
pub mod res_value;
pub mod resource_id;
pub mod string_pool;

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom, Write};
use thiserror::Error;

use crate::table::chunk::{
    backpatch_u32, ChunkHeader, ChunkType, ChunkWriter, PackageHeader, TypeHeader,
    TypeSpecHeader, NO_ENTRY,
};
use crate::table::config::{ConfigError, ResConfig};
use crate::table::res_value::{EntryFlags, ResValue, ValueType};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    ParsingError(#[from] binrw::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Unexpected chunk {found:#06x} where {expected:#06x} was expected")]
    UnexpectedChunk { expected: u16, found: u16 },

    #[error("Chunk at {0:#x} is truncated")]
    Truncated(usize),

    #[error("Invalid string pool data: {0}")]
    InvalidString(String),

    #[error("Type {0} cannot hold more entries")]
    TooManyEntries(String),

    #[error("Type id {0:#04x} is not defined in package {1:#04x}")]
    UnknownType(u8, u8),

    #[error("Resource table does not contain any package")]
    NoPackage,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryValue {
    Simple(ResValue),
    /// A bag of `(key, value)` items with an optional parent (style parents, attr metadata).
    Complex {
        parent: u32,
        items: Vec<(u32, ResValue)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub flags: EntryFlags,
    pub value: EntryValue,
}

impl Entry {
    pub fn simple(value: ResValue) -> Self {
        Self {
            flags: EntryFlags::new(),
            value: EntryValue::Simple(value),
        }
    }

    pub fn complex(parent: u32, items: Vec<(u32, ResValue)>) -> Self {
        Self {
            flags: EntryFlags::new().with_complex(true),
            value: EntryValue::Complex { parent, items },
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.value, EntryValue::Complex { .. })
    }

    /// The value of a simple entry.
    pub fn value(&self) -> Option<&ResValue> {
        match &self.value {
            EntryValue::Simple(value) => Some(value),
            EntryValue::Complex { .. } => None,
        }
    }

    /// The bag items of a complex entry.
    pub fn items(&self) -> &[(u32, ResValue)] {
        match &self.value {
            EntryValue::Complex { items, .. } => items,
            EntryValue::Simple(_) => &[],
        }
    }

    pub fn parent(&self) -> Option<u32> {
        match &self.value {
            EntryValue::Complex { parent, .. } if *parent != 0 => Some(*parent),
            _ => None,
        }
    }

    /// Replaces the value, keeping the public and weak flags.
    pub fn replace(&mut self, value: EntryValue) {
        let complex = matches!(value, EntryValue::Complex { .. });
        self.flags = self.flags.with_complex(complex).with_compact(false);
        self.value = value;
    }
}

/// The entries of one type for one configuration.
#[derive(Clone, Debug)]
pub struct TypeBlock {
    pub config: ResConfig,
    entries: Vec<Option<Entry>>,
}

impl TypeBlock {
    pub fn new(config: ResConfig) -> Self {
        Self {
            config,
            entries: vec![],
        }
    }

    pub fn entry(&self, index: u16) -> Option<&Entry> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    pub fn entry_mut(&mut self, index: u16) -> Option<&mut Entry> {
        self.entries.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub fn set(&mut self, index: u16, entry: Entry) {
        if self.entries.len() <= index as usize {
            self.entries.resize(index as usize + 1, None);
        }
        self.entries[index as usize] = Some(entry);
    }

    pub fn remove(&mut self, index: u16) -> Option<Entry> {
        self.entries.get_mut(index as usize).and_then(Option::take)
    }

    /// Iterates over the present entries with their index.
    pub fn entries(&self) -> impl Iterator<Item = (u16, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|entry| (index as u16, entry)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}

/// A resource type: entry names, spec flags and one block per configuration.
#[derive(Clone, Debug)]
pub struct TypeSpec {
    pub id: u8,
    pub name: String,
    names: Vec<String>,
    flags: Vec<u32>,
    blocks: Vec<TypeBlock>,
    index: HashMap<String, u16>,
}

impl TypeSpec {
    pub const SPEC_PUBLIC: u32 = 0x4000_0000;

    pub fn new(id: u8, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            names: vec![],
            flags: vec![],
            blocks: vec![],
            index: HashMap::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    pub fn entry_name(&self, index: u16) -> Option<&str> {
        self.names
            .get(index as usize)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn entry_index(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn spec_flags(&self, index: u16) -> u32 {
        self.flags.get(index as usize).copied().unwrap_or_default()
    }

    /// Allocates an entry index for `name`, never below `min_index`.
    pub fn add_entry(&mut self, name: &str, min_index: u16) -> Result<u16, TableError> {
        if let Some(index) = self.entry_index(name) {
            return Ok(index);
        }
        let index = self.names.len().max(min_index as usize);
        if index > u16::MAX as usize {
            return Err(TableError::TooManyEntries(self.name.clone()));
        }
        self.names.resize(index, String::new());
        self.names.push(name.to_string());
        self.flags.resize(index + 1, 0);
        self.index.insert(name.to_string(), index as u16);
        Ok(index as u16)
    }

    fn name_entry(&mut self, index: u16, name: &str) {
        let slot = index as usize;
        if self.names.len() <= slot {
            self.names.resize(slot + 1, String::new());
        }
        if self.names[slot].is_empty() && !name.is_empty() {
            self.names[slot] = name.to_string();
            self.index.entry(name.to_string()).or_insert(index);
        }
    }

    pub fn blocks(&self) -> &[TypeBlock] {
        &self.blocks
    }

    pub fn block(&self, config: &ResConfig) -> Option<&TypeBlock> {
        self.blocks.iter().find(|block| block.config == *config)
    }

    /// Every block carrying `config`. Malformed tables may carry more than one.
    pub fn blocks_for<'a, 'c>(&'a self, config: &'c ResConfig) -> impl Iterator<Item = &'a TypeBlock> + 'c
    where
        'a: 'c,
    {
        self.blocks.iter().filter(move |block| block.config == *config)
    }

    pub fn block_mut(&mut self, config: &ResConfig) -> Option<&mut TypeBlock> {
        self.blocks.iter_mut().find(|block| block.config == *config)
    }

    pub fn get_or_create_block(&mut self, config: &ResConfig) -> &mut TypeBlock {
        let position = match self.blocks.iter().position(|block| block.config == *config) {
            Some(position) => position,
            None => {
                self.blocks.push(TypeBlock::new(config.clone()));
                self.blocks.len() - 1
            }
        };
        &mut self.blocks[position]
    }
}

/// Where a new entry should be placed so its id does not collide with ids of tables
/// sharing the package id.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocationHint {
    pub type_id: Option<u8>,
    pub min_entry: u16,
}

#[derive(Clone, Debug)]
pub struct Package {
    pub id: u8,
    pub name: String,
    types: Vec<TypeSpec>,
    type_id_offset: u32,
    /// Library, overlayable and staged alias chunks, kept verbatim.
    extra_chunks: Vec<Vec<u8>>,
}

impl Package {
    pub fn new(id: u8, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            types: vec![],
            type_id_offset: 0,
            extra_chunks: vec![],
        }
    }

    pub fn types(&self) -> &[TypeSpec] {
        &self.types
    }

    pub fn type_spec(&self, name: &str) -> Option<&TypeSpec> {
        self.types.iter().find(|spec| spec.name == name)
    }

    pub fn type_spec_mut(&mut self, name: &str) -> Option<&mut TypeSpec> {
        self.types.iter_mut().find(|spec| spec.name == name)
    }

    pub fn type_spec_by_id(&self, id: u8) -> Option<&TypeSpec> {
        self.types.iter().find(|spec| spec.id == id)
    }

    fn type_spec_by_id_mut(&mut self, id: u8) -> Option<&mut TypeSpec> {
        self.types.iter_mut().find(|spec| spec.id == id)
    }

    /// Returns the type named `name`, creating it with `id_hint` (or the next free id).
    pub fn get_or_create_type(&mut self, name: &str, id_hint: Option<u8>) -> &mut TypeSpec {
        let position = match self.types.iter().position(|spec| spec.name == name) {
            Some(position) => position,
            None => {
                let next = self.types.iter().map(|spec| spec.id).max().unwrap_or(0) + 1;
                let id = id_hint
                    .filter(|id| *id != 0 && self.type_spec_by_id(*id).is_none())
                    .unwrap_or(next);
                self.types.push(TypeSpec::new(id, name));
                self.types.sort_by_key(|spec| spec.id);
                self.types
                    .iter()
                    .position(|spec| spec.id == id)
                    .unwrap_or(self.types.len() - 1)
            }
        };
        &mut self.types[position]
    }

    /// Looks up the id of `type_name/name` without creating anything.
    pub fn find(&self, type_name: &str, name: &str) -> Option<ResourceId> {
        let spec = self.type_spec(type_name)?;
        let index = spec.entry_index(name)?;
        Some(ResourceId::new(self.id, spec.id, index))
    }

    /// The type and entry name of `id`.
    pub fn name_of(&self, id: ResourceId) -> Option<(&str, &str)> {
        if id.package() != self.id {
            return None;
        }
        let spec = self.type_spec_by_id(id.type_id())?;
        Some((spec.name.as_str(), spec.entry_name(id.entry())?))
    }

    pub fn entry(&self, id: ResourceId, config: &ResConfig) -> Option<&Entry> {
        self.type_spec_by_id(id.type_id())?
            .block(config)?
            .entry(id.entry())
    }

    pub fn entry_mut(&mut self, id: ResourceId, config: &ResConfig) -> Option<&mut Entry> {
        self.type_spec_by_id_mut(id.type_id())?
            .block_mut(config)?
            .entry_mut(id.entry())
    }

    /// Every configuration `id` has a value for.
    pub fn entry_configs(&self, id: ResourceId) -> Vec<(&ResConfig, &Entry)> {
        self.type_spec_by_id(id.type_id())
            .map(|spec| {
                spec.blocks()
                    .iter()
                    .filter_map(|block| block.entry(id.entry()).map(|entry| (&block.config, entry)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The present entries of `type_name` in the `config` block, with their ids.
    pub fn entries_of(&self, type_name: &str, config: &ResConfig) -> Vec<(ResourceId, &Entry)> {
        let Some(spec) = self.type_spec(type_name) else {
            return vec![];
        };
        spec.blocks_for(config)
            .flat_map(|block| block.entries())
            .map(|(index, entry)| (ResourceId::new(self.id, spec.id, index), entry))
            .collect()
    }

    pub fn get_or_create(
        &mut self,
        config: &ResConfig,
        type_name: &str,
        name: &str,
    ) -> Result<ResourceId, TableError> {
        self.get_or_create_with(config, type_name, name, AllocationHint::default())
    }

    /// Returns the id of `type_name/name`, creating the type, the entry name and an
    /// undefined entry in the `config` block where missing.
    pub fn get_or_create_with(
        &mut self,
        config: &ResConfig,
        type_name: &str,
        name: &str,
        hint: AllocationHint,
    ) -> Result<ResourceId, TableError> {
        let package_id = self.id;
        let spec = self.get_or_create_type(type_name, hint.type_id);
        let index = spec.add_entry(name, hint.min_entry)?;
        let block = spec.get_or_create_block(config);
        if block.entry(index).is_none() {
            block.set(index, Entry::simple(ResValue::null()));
        }
        Ok(ResourceId::new(package_id, spec.id, index))
    }

    /// Stores `value` for `id` in the `config` block.
    pub fn set_entry(
        &mut self,
        id: ResourceId,
        config: &ResConfig,
        value: EntryValue,
    ) -> Result<(), TableError> {
        let package_id = self.id;
        let spec = self
            .type_spec_by_id_mut(id.type_id())
            .ok_or(TableError::UnknownType(id.type_id(), package_id))?;
        let block = spec.get_or_create_block(config);
        match block.entry_mut(id.entry()) {
            Some(entry) => entry.replace(value),
            None => block.set(
                id.entry(),
                Entry {
                    flags: EntryFlags::new().with_complex(matches!(value, EntryValue::Complex { .. })),
                    value,
                },
            ),
        }
        Ok(())
    }

    fn read(data: &[u8]) -> Result<Self, TableError> {
        let mut reader = Cursor::new(data);
        let chunk = ChunkHeader::read(&mut reader)?;
        let header = PackageHeader::read(&mut reader)?;
        let type_id_offset = if chunk.header_size >= PackageHeader::SIZE {
            header.type_id_offset
        } else {
            0
        };

        let pool_at = |offset: u32| -> Result<StringPool, TableError> {
            let slice = data
                .get(offset as usize..)
                .ok_or(TableError::Truncated(offset as usize))?;
            StringPool::read(slice)
        };
        let type_names = pool_at(header.type_strings)?;
        let key_names = pool_at(header.key_strings)?;

        let mut package = Package::new(header.id as u8, &header.name());
        package.type_id_offset = type_id_offset;

        let end = (chunk.size as usize).min(data.len());
        let mut position = chunk.header_size as usize;
        while position + ChunkHeader::SIZE as usize <= end {
            let child = ChunkHeader::read(&mut Cursor::new(&data[position..]))?;
            if child.size < ChunkHeader::SIZE as u32 {
                return Err(TableError::Truncated(position));
            }
            let slice = data
                .get(position..position + child.size as usize)
                .ok_or(TableError::Truncated(position))?;

            match child.chunk_type() {
                Some(ChunkType::StringPool) => {}
                Some(ChunkType::TableTypeSpec) => {
                    package.read_type_spec(slice, &type_names)?;
                }
                Some(ChunkType::TableType) => {
                    package.read_type(slice, &type_names, &key_names)?;
                }
                _ => package.extra_chunks.push(slice.to_vec()),
            }
            position += child.size as usize;
        }

        Ok(package)
    }

    fn type_name(&self, type_names: &StringPool, id: u8) -> String {
        let index = (id as u32).saturating_sub(1 + self.type_id_offset);
        type_names.get(index).unwrap_or_default().to_string()
    }

    fn read_type_spec(&mut self, data: &[u8], type_names: &StringPool) -> Result<(), TableError> {
        let mut reader = Cursor::new(data);
        let chunk = ChunkHeader::read(&mut reader)?;
        let header = TypeSpecHeader::read(&mut reader)?;
        reader.seek(SeekFrom::Start(chunk.header_size as u64))?;

        let name = self.type_name(type_names, header.id);
        let spec = self.get_or_create_type(&name, Some(header.id));
        spec.flags = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            spec.flags.push(reader.read_u32::<LittleEndian>()?);
        }
        if spec.names.len() < header.entry_count as usize {
            spec.names.resize(header.entry_count as usize, String::new());
        }
        Ok(())
    }

    fn read_type(
        &mut self,
        data: &[u8],
        type_names: &StringPool,
        key_names: &StringPool,
    ) -> Result<(), TableError> {
        let mut reader = Cursor::new(data);
        let chunk = ChunkHeader::read(&mut reader)?;
        let header = TypeHeader::read(&mut reader)?;
        let config = ResConfig::read(&mut reader)?;
        reader.seek(SeekFrom::Start(chunk.header_size as u64))?;

        let mut offsets: Vec<(u16, u32)> = Vec::with_capacity(header.entry_count as usize);
        if header.flags & TypeHeader::FLAG_SPARSE != 0 {
            for _ in 0..header.entry_count {
                let index = reader.read_u16::<LittleEndian>()?;
                let offset = reader.read_u16::<LittleEndian>()? as u32 * 4;
                offsets.push((index, offset));
            }
        } else if header.flags & TypeHeader::FLAG_OFFSET16 != 0 {
            for index in 0..header.entry_count {
                let offset = reader.read_u16::<LittleEndian>()?;
                if offset != 0xffff {
                    offsets.push((index as u16, offset as u32 * 4));
                }
            }
        } else {
            for index in 0..header.entry_count {
                let offset = reader.read_u32::<LittleEndian>()?;
                if offset != NO_ENTRY {
                    offsets.push((index as u16, offset));
                }
            }
        }

        let name = self.type_name(type_names, header.id);
        let spec = self.get_or_create_type(&name, Some(header.id));
        let mut block = TypeBlock::new(config);
        for (index, offset) in offsets {
            reader.seek(SeekFrom::Start(header.entries_start as u64 + offset as u64))?;
            let (key, entry) = read_entry(&mut reader)?;
            spec.name_entry(index, key_names.get(key).unwrap_or_default());
            block.set(index, entry);
        }
        spec.blocks.push(block);
        Ok(())
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), TableError> {
        let mut chunk = ChunkWriter::start(ChunkType::TablePackage, writer)?;
        let start = chunk.start_position();
        let header_start = writer.stream_position()?;

        let max_id = self.types.iter().map(|spec| spec.id as u32).max().unwrap_or(0);
        let type_names: Vec<String> = (self.type_id_offset + 1..=max_id)
            .map(|id| {
                self.type_spec_by_id(id as u8)
                    .map(|spec| spec.name.clone())
                    .unwrap_or_default()
            })
            .collect();
        let keys: IndexSet<&str> = self
            .types
            .iter()
            .flat_map(|spec| spec.names.iter())
            .filter(|name| !name.is_empty())
            .map(String::as_str)
            .collect();

        PackageHeader {
            id: self.id as u32,
            name: PackageHeader::encode_name(&self.name),
            type_strings: 0,
            last_public_type: type_names.len() as u32,
            key_strings: 0,
            last_public_key: keys.len() as u32,
            type_id_offset: self.type_id_offset,
        }
        .write(writer)?;
        chunk.end_header(writer)?;

        let type_strings = writer.stream_position()? - start;
        StringPool::from_strings(type_names, true).write(writer)?;
        let key_strings = writer.stream_position()? - start;
        StringPool::from_strings(keys.iter().copied(), true).write(writer)?;

        for spec in &self.types {
            write_type_spec(writer, spec)?;
            for block in &spec.blocks {
                write_type(writer, spec, block, &keys)?;
            }
        }
        for extra in &self.extra_chunks {
            writer.write_all(extra)?;
        }
        chunk.finish(writer)?;

        // type_strings and key_strings follow the id and the 256 byte name.
        backpatch_u32(writer, header_start + 260, type_strings as u32)?;
        backpatch_u32(writer, header_start + 268, key_strings as u32)?;
        Ok(())
    }
}

fn read_entry(reader: &mut Cursor<&[u8]>) -> Result<(u32, Entry), TableError> {
    let size = reader.read_u16::<LittleEndian>()?;
    let raw_flags = reader.read_u16::<LittleEndian>()?;
    let flags = EntryFlags::from_bits(raw_flags & 0x00ff);

    if flags.compact() {
        // Compact entries store the key in the size slot and the value type in the flags.
        let data = reader.read_u32::<LittleEndian>()?;
        let data_type = ValueType::from((raw_flags >> 8) as u8);
        return Ok((
            size as u32,
            Entry {
                flags: flags.with_compact(false),
                value: EntryValue::Simple(ResValue::new(data_type, data)),
            },
        ));
    }

    let key = reader.read_u32::<LittleEndian>()?;
    if flags.complex() {
        let parent = reader.read_u32::<LittleEndian>()?;
        let count = reader.read_u32::<LittleEndian>()?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.read_u32::<LittleEndian>()?;
            items.push((name, ResValue::read(reader)?));
        }
        Ok((key, Entry {
            flags,
            value: EntryValue::Complex { parent, items },
        }))
    } else {
        Ok((key, Entry {
            flags,
            value: EntryValue::Simple(ResValue::read(reader)?),
        }))
    }
}

fn write_type_spec<W: Write + Seek>(writer: &mut W, spec: &TypeSpec) -> Result<(), TableError> {
    let mut chunk = ChunkWriter::start(ChunkType::TableTypeSpec, writer)?;
    TypeSpecHeader {
        id: spec.id,
        res0: 0,
        types_count: 0,
        entry_count: spec.entry_count() as u32,
    }
    .write(writer)?;
    chunk.end_header(writer)?;
    for index in 0..spec.entry_count() {
        writer.write_u32::<LittleEndian>(spec.spec_flags(index as u16))?;
    }
    chunk.finish(writer)?;
    Ok(())
}

fn write_type<W: Write + Seek>(
    writer: &mut W,
    spec: &TypeSpec,
    block: &TypeBlock,
    keys: &IndexSet<&str>,
) -> Result<(), TableError> {
    let mut chunk = ChunkWriter::start(ChunkType::TableType, writer)?;
    let start = chunk.start_position();
    let entry_count = spec.entry_count();
    TypeHeader {
        id: spec.id,
        flags: 0,
        reserved: 0,
        entry_count: entry_count as u32,
        entries_start: 0,
    }
    .write(writer)?;
    block.config.write(writer)?;
    chunk.end_header(writer)?;

    let offsets_start = writer.stream_position()?;
    for _ in 0..entry_count {
        writer.write_u32::<LittleEndian>(NO_ENTRY)?;
    }
    let entries_start = writer.stream_position()?;

    for (index, entry) in block.entries() {
        if index as usize >= entry_count {
            continue;
        }
        let key = spec
            .entry_name(index)
            .and_then(|name| keys.get_index_of(name))
            .unwrap_or_default() as u32;
        let offset = (writer.stream_position()? - entries_start) as u32;
        backpatch_u32(writer, offsets_start + index as u64 * 4, offset)?;

        let flags = entry.flags.with_compact(false);
        match &entry.value {
            EntryValue::Simple(value) => {
                writer.write_u16::<LittleEndian>(8)?;
                writer.write_u16::<LittleEndian>(flags.with_complex(false).into_bits())?;
                writer.write_u32::<LittleEndian>(key)?;
                value.write(writer)?;
            }
            EntryValue::Complex { parent, items } => {
                writer.write_u16::<LittleEndian>(16)?;
                writer.write_u16::<LittleEndian>(flags.with_complex(true).into_bits())?;
                writer.write_u32::<LittleEndian>(key)?;
                writer.write_u32::<LittleEndian>(*parent)?;
                writer.write_u32::<LittleEndian>(items.len() as u32)?;
                for (name, value) in items {
                    writer.write_u32::<LittleEndian>(*name)?;
                    value.write(writer)?;
                }
            }
        }
    }
    chunk.finish(writer)?;
    // entries_start sits after the chunk header, id, flags, reserved and entry count.
    backpatch_u32(writer, start + 16, (entries_start - start) as u32)?;
    Ok(())
}

/// A complete resource table.
#[derive(Clone, Debug)]
pub struct ResourceTable {
    strings: StringPool,
    packages: Vec<Package>,
}

impl ResourceTable {
    /// Creates a table with a single empty package.
    pub fn new(package_id: u8, package_name: &str) -> Self {
        Self {
            strings: StringPool::new(true),
            packages: vec![Package::new(package_id, package_name)],
        }
    }

    pub fn read(data: &[u8]) -> Result<Self, TableError> {
        let mut reader = Cursor::new(data);
        let chunk = ChunkHeader::read(&mut reader)?;
        chunk.expect(ChunkType::Table)?;

        let mut strings = None;
        let mut packages = vec![];
        let end = (chunk.size as usize).min(data.len());
        let mut position = chunk.header_size as usize;
        while position + ChunkHeader::SIZE as usize <= end {
            let child = ChunkHeader::read(&mut Cursor::new(&data[position..]))?;
            if child.size < ChunkHeader::SIZE as u32 {
                return Err(TableError::Truncated(position));
            }
            let slice = data
                .get(position..position + child.size as usize)
                .ok_or(TableError::Truncated(position))?;
            match child.chunk_type() {
                Some(ChunkType::StringPool) if strings.is_none() => {
                    strings = Some(StringPool::read(slice)?)
                }
                Some(ChunkType::TablePackage) => packages.push(Package::read(slice)?),
                _ => log::debug!("Skipping table chunk {:#06x} at {:#x}", child.ty, position),
            }
            position += child.size as usize;
        }

        if packages.is_empty() {
            return Err(TableError::NoPackage);
        }
        Ok(Self {
            strings: strings.unwrap_or_else(|| StringPool::new(true)),
            packages,
        })
    }

    pub fn write(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = Cursor::new(Vec::new());
        let mut chunk = ChunkWriter::start(ChunkType::Table, &mut writer)?;
        writer.write_u32::<LittleEndian>(self.packages.len() as u32)?;
        chunk.end_header(&mut writer)?;
        self.strings.write(&mut writer)?;
        for package in &self.packages {
            package.write(&mut writer)?;
        }
        chunk.finish(&mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn packages_mut(&mut self) -> &mut [Package] {
        &mut self.packages
    }

    pub fn package(&self, id: u8) -> Option<&Package> {
        self.packages.iter().find(|package| package.id == id)
    }

    /// Index of the package that represents the app: the only package, or the one named
    /// `package_name`.
    pub fn pick(&self, package_name: Option<&str>) -> Option<usize> {
        if self.packages.len() == 1 {
            return Some(0);
        }
        let name = package_name?;
        self.packages.iter().position(|package| package.name == name)
    }

    /// Decodes the string value of a simple entry.
    pub fn string_value(&self, value: &ResValue) -> Option<&str> {
        match value.data_type {
            ValueType::String => self.strings.get(value.data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Result<ResourceTable, TableError> {
        let mut table = ResourceTable::new(0x7f, "com.example");
        let hello = table.strings_mut().get_or_insert("Hello");
        let hallo = table.strings_mut().get_or_insert("Hallo");
        let icon = table.strings_mut().get_or_insert("res/a0.png");

        let default = ResConfig::default();
        let german = ResConfig::parse("de")?;
        let hdpi = ResConfig::parse("hdpi")?;
        let package = &mut table.packages_mut()[0];

        let greeting = package.get_or_create(&default, "string", "greeting")?;
        package.set_entry(greeting, &default, EntryValue::Simple(ResValue::string(hello)))?;
        package.set_entry(greeting, &german, EntryValue::Simple(ResValue::string(hallo)))?;

        let drawable = package.get_or_create(&hdpi, "drawable", "icon")?;
        package.set_entry(drawable, &hdpi, EntryValue::Simple(ResValue::string(icon)))?;

        let style = package.get_or_create(&default, "style", "AppTheme")?;
        package.set_entry(
            style,
            &default,
            EntryValue::Complex {
                parent: 0x0103000c,
                items: vec![(0x01010098, ResValue::new(ValueType::ColorArgb8, 0xff00ff00))],
            },
        )?;
        Ok(table)
    }

    #[test]
    fn test_table_write_read() -> Result<(), Box<dyn std::error::Error>> {
        let table = sample_table()?;
        let bytes = table.write()?;
        let read = ResourceTable::read(&bytes)?;
        let package = &read.packages()[0];

        assert_eq!(package.id, 0x7f);
        assert_eq!(package.name, "com.example");

        let greeting = package.find("string", "greeting").ok_or("greeting missing")?;
        assert_eq!(greeting, ResourceId::new(0x7f, 1, 0));
        let german = package
            .entry(greeting, &ResConfig::parse("de")?)
            .and_then(Entry::value)
            .and_then(|value| read.string_value(value));
        assert_eq!(german, Some("Hallo"));

        let icon = package.find("drawable", "icon").ok_or("icon missing")?;
        assert!(package.entry(icon, &ResConfig::default()).is_none());
        assert_eq!(package.entry_configs(icon).len(), 1);

        let style = package.find("style", "AppTheme").ok_or("style missing")?;
        let entry = package.entry(style, &ResConfig::default()).ok_or("no style")?;
        assert!(entry.is_complex());
        assert_eq!(entry.parent(), Some(0x0103000c));
        assert_eq!(entry.items().len(), 1);

        assert_eq!(read.write()?, bytes, "rewriting an unmodified table changed it");
        Ok(())
    }

    #[test]
    fn test_allocation_hint() -> Result<(), Box<dyn std::error::Error>> {
        let mut table = ResourceTable::new(0x7f, "com.example");
        let package = &mut table.packages_mut()[0];
        let id = package.get_or_create_with(
            &ResConfig::default(),
            "id",
            "late",
            AllocationHint {
                type_id: Some(5),
                min_entry: 3,
            },
        )?;
        assert_eq!(id, ResourceId::new(0x7f, 5, 3));
        assert_eq!(package.get_or_create(&ResConfig::default(), "id", "late")?, id);
        assert_eq!(package.name_of(id), Some(("id", "late")));

        let bytes = table.write()?;
        let read = ResourceTable::read(&bytes)?;
        assert_eq!(read.packages()[0].find("id", "late"), Some(id));
        Ok(())
    }
}
