use std::io::Cursor;

use cookie_factory::bytes::*;
use cookie_factory::combinator::slice;
use cookie_factory::gen_simple;
use nom::number::Endianness;

use crate::error::{Error, Result};
use crate::fixup::FixupStorage;
use crate::layout::Architecture;
use crate::Vector;

macro_rules! endian_writer {
    ($name:ident, $ty:ty, $le:ident, $be:ident) => {
        pub fn $name(&mut self, v: $ty) -> Result<()> {
            match self.endian {
                Endianness::Big => gen_simple($be(v), &mut self.out)?,
                _ => gen_simple($le(v), &mut self.out)?,
            };
            Ok(())
        }
    };
}

macro_rules! endian_putter {
    ($name:ident, $ty:ty, $le:ident, $be:ident) => {
        pub fn $name(&mut self, field: usize, v: $ty) -> Result<()> {
            let size = self.bytes.len();
            let out = self.bytes.get_mut(field..).ok_or(Error::OutOfBounds {
                offset: field,
                len: std::mem::size_of::<$ty>(),
                size,
            })?;
            match self.endian {
                Endianness::Big => gen_simple($be(v), out)?,
                _ => gen_simple($le(v), out)?,
            };
            Ok(())
        }
    };
}

/// Seekable output stream with a fixed byte order.
#[derive(Debug)]
pub struct BinWriter {
    out: Cursor<Vec<u8>>,
    endian: Endianness,
}

impl BinWriter {
    pub fn new(endian: Endianness) -> Self {
        Self {
            out: Cursor::new(Vec::new()),
            endian,
        }
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn is_big_endian(&self) -> bool {
        self.endian == Endianness::Big
    }

    pub fn tell(&self) -> u64 {
        self.out.position()
    }

    pub fn seek(&mut self, pos: u64) {
        self.out.set_position(pos);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.out.into_inner()
    }

    endian_writer!(write_u16, u16, le_u16, be_u16);
    endian_writer!(write_u32, u32, le_u32, be_u32);
    endian_writer!(write_u64, u64, le_u64, be_u64);
    endian_writer!(write_i32, i32, le_i32, be_i32);
    endian_writer!(write_f32, f32, le_f32, be_f32);

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        gen_simple(slice(bytes), &mut self.out)?;
        Ok(())
    }

    pub fn write_vector(&mut self, v: Vector) -> Result<()> {
        self.write_f32(v.x)?;
        self.write_f32(v.y)?;
        self.write_f32(v.z)?;
        self.write_f32(v.w)
    }

    pub fn write_pointer(&mut self, value: u64, arch: Architecture) -> Result<()> {
        match arch {
            Architecture::X86 => self.write_u32(value as u32),
            Architecture::X64 => self.write_u64(value),
        }
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.write_bytes(&vec![0; len])
    }

    /// Zero fills up to the next multiple of `align`.
    pub fn pad(&mut self, align: u64) -> Result<()> {
        let pos = self.tell();
        let pad = (align - pos % align) % align;
        self.skip(pad as usize)
    }

    /// Writes `record`, registering its pointer fields with `fixups` in the
    /// order they were put.
    pub fn write_record(&mut self, record: &RecordWriter, fixups: &mut FixupStorage) -> Result<()> {
        let start = self.tell();
        for field in &record.pointers {
            fixups.save_from(start + *field as u64);
        }
        self.write_bytes(&record.bytes)
    }
}

/// Zero initialised record that gets filled field by field.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    bytes: Vec<u8>,
    pointers: Vec<usize>,
    endian: Endianness,
}

impl RecordWriter {
    pub fn new(size: usize, endian: Endianness) -> Self {
        Self {
            bytes: vec![0; size],
            pointers: Vec::new(),
            endian,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    endian_putter!(put_u16, u16, le_u16, be_u16);
    endian_putter!(put_u32, u32, le_u32, be_u32);
    endian_putter!(put_i32, i32, le_i32, be_i32);
    endian_putter!(put_u64, u64, le_u64, be_u64);
    endian_putter!(put_f32, f32, le_f32, be_f32);

    pub fn put_bytes(&mut self, field: usize, bytes: &[u8]) -> Result<()> {
        let size = self.bytes.len();
        let out = self
            .bytes
            .get_mut(field..field + bytes.len())
            .ok_or(Error::OutOfBounds {
                offset: field,
                len: bytes.len(),
                size,
            })?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    pub fn put_u8(&mut self, field: usize, v: u8) -> Result<()> {
        self.put_bytes(field, &[v])
    }

    pub fn put_vector(&mut self, field: usize, v: Vector) -> Result<()> {
        self.put_f32(field, v.x)?;
        self.put_f32(field + 4, v.y)?;
        self.put_f32(field + 8, v.z)?;
        self.put_f32(field + 12, v.w)
    }

    /// Leaves the field null and queues it for a later fixup.
    pub fn put_pointer(&mut self, field: usize) {
        self.pointers.push(field);
    }
}
