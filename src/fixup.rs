//! Pointer relocation for both directions.
//!
//! On load every pointer field starts out as the raw integer found on disk
//! and is resolved once into an offset inside the [`Arena`]. On save,
//! [`FixupStorage`] remembers where pointer fields were written and patches
//! them once their targets have been laid out.

use std::convert::TryFrom;

use log::trace;

use crate::error::{Error, Result};
use crate::layout::Architecture;
use crate::read::Arena;
use crate::write::BinWriter;

/// Byte offset from the start of an arena.
pub type Offset = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    /// Raw little-endian read of the stored field.
    Unresolved { raw: u64, arch: Architecture },
    Resolved(Option<Offset>),
}

impl Pointer {
    pub fn null() -> Self {
        Pointer::Resolved(None)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Pointer::Resolved(_))
    }

    /// Resolved target, `None` while unresolved or null.
    pub fn offset(&self) -> Option<Offset> {
        match self {
            Pointer::Resolved(o) => *o,
            Pointer::Unresolved { .. } => None,
        }
    }

    /// Resolves the pointer against `arena`. Resolving twice is a no-op.
    pub fn fixup(&mut self, arena: &Arena) -> Result<Option<Offset>> {
        let (raw, arch) = match *self {
            Pointer::Resolved(o) => return Ok(o),
            Pointer::Unresolved { raw, arch } => (raw, arch),
        };
        let value = match (arena.is_big_endian(), arch) {
            (false, _) => raw,
            (true, Architecture::X86) => u64::from((raw as u32).swap_bytes()),
            (true, Architecture::X64) => raw.swap_bytes(),
        };
        let resolved = if value == 0 {
            None
        } else {
            let offset = usize::try_from(value)
                .ok()
                .filter(|o| *o <= arena.len())
                .ok_or(Error::OutOfBounds {
                    offset: value as usize,
                    len: arch.pointer_size(),
                    size: arena.len(),
                })?;
            Some(offset)
        };
        *self = Pointer::Resolved(resolved);
        Ok(resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    pub from: u64,
    pub to: Option<u64>,
}

/// Deferred pointer patches, paired first in first out.
#[derive(Debug, Default)]
pub struct FixupStorage {
    records: Vec<Fixup>,
    cursor: usize,
}

impl FixupStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Fixup] {
        &self.records
    }

    /// Marks a pointer field at `from` for patching.
    pub fn save_from(&mut self, from: u64) {
        self.records.push(Fixup { from, to: None });
    }

    /// Points the oldest pending field at the writer's current position.
    pub fn save_to(&mut self, writer: &BinWriter) -> Result<()> {
        let to = writer.tell();
        let rec = self
            .records
            .get_mut(self.cursor)
            .ok_or(Error::UnbalancedFixups)?;
        rec.to = Some(to);
        self.cursor += 1;
        Ok(())
    }

    /// Leaves the oldest pending field null.
    pub fn skip_to(&mut self) -> Result<()> {
        if self.cursor >= self.records.len() {
            return Err(Error::UnbalancedFixups);
        }
        self.cursor += 1;
        Ok(())
    }

    pub fn fixup_pointers(&self, writer: &mut BinWriter, arch: Architecture) -> Result<()> {
        if self.cursor != self.records.len() {
            return Err(Error::UnbalancedFixups);
        }
        let end = writer.tell();
        for rec in &self.records {
            if let Some(to) = rec.to {
                trace!("fixup {:#x} -> {:#x}", rec.from, to);
                writer.seek(rec.from);
                writer.write_pointer(to, arch)?;
            }
        }
        writer.seek(end);
        Ok(())
    }
}
