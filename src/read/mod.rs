use nom::number::Endianness;
use nom::IResult;

use crate::error::{Error, Result};
use crate::fixup::{Offset, Pointer};
use crate::layout::Architecture;
use crate::Vector;

pub(crate) mod utilities;

use utilities::*;

pub trait DeserializeEndian: Sized {
    fn parse(i: &[u8], endian: Endianness) -> IResult<&[u8], Self>;
}

/// Byte buffer every loaded structure points into.
///
/// Pointer fields are stored as offsets from the start of the arena, so a
/// loaded animation never holds raw addresses.
#[derive(Debug, Clone)]
pub struct Arena {
    bytes: Vec<u8>,
    endian: Endianness,
}

impl Arena {
    pub fn new(bytes: Vec<u8>, endian: Endianness) -> Self {
        Self { bytes, endian }
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn is_big_endian(&self) -> bool {
        self.endian == Endianness::Big
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn slice(&self, offset: Offset, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(Error::OutOfBounds {
                offset,
                len,
                size: self.bytes.len(),
            })
    }

    pub fn record(&self, offset: Offset, size: usize) -> Result<Record<'_>> {
        let bytes = self.slice(offset, size)?;
        Ok(Record {
            arena: self,
            base: offset,
            bytes,
        })
    }

    /// Parses a `T` at `offset`.
    pub fn parse_at<T: DeserializeEndian>(&self, offset: Offset) -> Result<T> {
        let i = self.slice(offset, 0).map(|_| &self.bytes[offset..])?;
        let (_, v) = T::parse(i, self.endian)?;
        Ok(v)
    }

    /// Parses `count` consecutive `T`s starting at `offset`.
    pub fn parse_many<T: DeserializeEndian>(&self, offset: Offset, count: usize) -> Result<Vec<T>> {
        let mut i = self.slice(offset, 0).map(|_| &self.bytes[offset..])?;
        let mut res = Vec::with_capacity(count.min(i.len()));
        for _ in 0..count {
            let (rest, v) = T::parse(i, self.endian)?;
            i = rest;
            res.push(v);
        }
        Ok(res)
    }
}

/// Fixed-size view of one record inside an [`Arena`].
///
/// Field accessors take offsets relative to the record start, as found in a
/// layout descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    arena: &'a Arena,
    base: Offset,
    bytes: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn base(&self) -> Offset {
        self.base
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    fn at(&self, field: usize, len: usize) -> Result<&'a [u8]> {
        self.bytes
            .get(field..field + len)
            .ok_or(Error::OutOfBounds {
                offset: self.base + field,
                len,
                size: self.arena.len(),
            })
    }

    pub fn bytes(&self, field: usize, len: usize) -> Result<&'a [u8]> {
        self.at(field, len)
    }

    pub fn u8(&self, field: usize) -> Result<u8> {
        Ok(self.at(field, 1)?[0])
    }

    pub fn u16(&self, field: usize) -> Result<u16> {
        let (_, v) = u16(self.arena.endian)(self.at(field, 2)?)?;
        Ok(v)
    }

    pub fn u32(&self, field: usize) -> Result<u32> {
        let (_, v) = u32(self.arena.endian)(self.at(field, 4)?)?;
        Ok(v)
    }

    pub fn i32(&self, field: usize) -> Result<i32> {
        let (_, v) = i32(self.arena.endian)(self.at(field, 4)?)?;
        Ok(v)
    }

    pub fn u64(&self, field: usize) -> Result<u64> {
        let (_, v) = u64(self.arena.endian)(self.at(field, 8)?)?;
        Ok(v)
    }

    pub fn f32(&self, field: usize) -> Result<f32> {
        let (_, v) = f32(self.arena.endian)(self.at(field, 4)?)?;
        Ok(v)
    }

    pub fn vector(&self, field: usize) -> Result<Vector> {
        let (_, v) = vector(self.arena.endian)(self.at(field, 16)?)?;
        Ok(v)
    }

    /// Raw pointer field, as stored on disk.
    pub fn pointer(&self, field: usize, arch: Architecture) -> Result<Pointer> {
        use nom::number::complete::{le_u32, le_u64};
        let i = self.at(field, arch.pointer_size())?;
        let raw = match arch {
            Architecture::X86 => le_u32(i).map(|(_, v)| u64::from(v))?,
            Architecture::X64 => le_u64(i).map(|(_, v)| v)?,
        };
        Ok(Pointer::Unresolved { raw, arch })
    }

    /// Reads and resolves a pointer field in one step.
    pub fn offset(&self, field: usize, arch: Architecture) -> Result<Option<Offset>> {
        let mut ptr = self.pointer(field, arch)?;
        ptr.fixup(self.arena)
    }
}
