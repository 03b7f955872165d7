//! Single animation files.
//!
//! A 16 byte header (`MTMI`, layout key, total size) is followed by one
//! animation whose pointers are relative to the start of the file.

use log::debug;
use nom::number::Endianness;

use crate::animation::Animation;
use crate::error::{Error, Properties, Result};
use crate::fixup::FixupStorage;
use crate::layout::{Architecture, LayoutKey, LayoutRegistry};
use crate::read::Arena;
use crate::write::BinWriter;

const MAGIC: [u8; 4] = *b"MTMI";
const DATA_START: usize = 16;

impl Animation {
    pub fn save_standalone(&self, endian: Endianness) -> Result<Vec<u8>> {
        let mut w = BinWriter::new(endian);
        let mut magic = MAGIC;
        if w.is_big_endian() {
            magic.reverse();
        }
        w.write_bytes(&magic)?;
        w.write_u16(self.layout().key().0)?;

        let mut fixups = FixupStorage::new();
        fixups.save_from(w.tell());
        w.write_u32(0)?;
        w.pad(16)?;
        self.write(&mut w)?;

        fixups.save_to(&w)?;
        fixups.fixup_pointers(&mut w, Architecture::X86)?;
        debug!("saved standalone {} animation, {} bytes", self.properties(), w.tell());
        Ok(w.into_inner())
    }

    /// Loads a standalone file, checking it holds an `expected` animation
    /// when given.
    pub fn load_standalone(
        registry: &LayoutRegistry,
        bytes: &[u8],
        expected: Option<Properties>,
    ) -> Result<Self> {
        let mut magic = [0; 4];
        magic.copy_from_slice(bytes.get(..4).ok_or(Error::InvalidHeader(0))?);
        let endian = if magic == MAGIC {
            Endianness::Little
        } else if magic.iter().rev().eq(MAGIC.iter()) {
            Endianness::Big
        } else {
            return Err(Error::InvalidHeader(u32::from_le_bytes(magic)));
        };

        let head = Arena::new(bytes.get(..DATA_START).unwrap_or(bytes).to_vec(), endian);
        let rec = head.record(0, 10)?;
        let key = LayoutKey(rec.u16(4)?);
        let size = rec.u32(6)? as usize;
        if size == 0 {
            return Err(Error::TruncatedBuffer);
        }

        let found = key.properties().ok_or_else(|| key.invalid())?;
        let layout = registry.animation(found)?;
        if let Some(expected) = expected {
            if expected != found {
                return Err(Error::ArchitectureMismatch { expected, found });
            }
        }

        let data = bytes.get(..size).ok_or(Error::OutOfBounds {
            offset: 0,
            len: size,
            size: bytes.len(),
        })?;
        debug!("loading standalone {} animation, {} bytes", found, size);
        let arena = Arena::new(data.to_vec(), endian);
        Animation::load(layout, &arena, DATA_START)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::CodecKind;
    use crate::Vector;

    fn sample(version: u16, arch: Architecture) -> Animation {
        let reg = LayoutRegistry::default();
        let mut anim = reg.create_animation(Properties::new(version, arch)).unwrap();
        let mut track = anim.create_track();
        track
            .encode(
                CodecKind::StepRotationQuat3,
                &[(0, Vector::new(0.0, 0.0, 0.0, 1.0)), (1, Vector::new(0.0, 0.6, 0.0, 0.8))],
                None,
            )
            .unwrap();
        anim.add_track(track);
        anim.sanitize();
        anim
    }

    #[test]
    fn header_layout() {
        let anim = sample(49, Architecture::X64);
        let bytes = anim.save_standalone(Endianness::Little).unwrap();
        assert_eq!(&bytes[..4], b"MTMI");
        assert_eq!(&bytes[4..6], &0x3108u16.to_le_bytes());
        assert_eq!(&bytes[6..10], &(bytes.len() as u32).to_le_bytes());

        let be = anim.save_standalone(Endianness::Big).unwrap();
        assert_eq!(&be[..4], b"IMTM");
        assert_eq!(be.len(), bytes.len());
    }

    #[test]
    fn round_trip() {
        let reg = LayoutRegistry::default();
        for &endian in &[Endianness::Little, Endianness::Big] {
            let anim = sample(40, Architecture::X86);
            let bytes = anim.save_standalone(endian).unwrap();
            let loaded =
                Animation::load_standalone(&reg, &bytes, Some(Properties::new(40, Architecture::X86)))
                    .unwrap();
            assert_eq!(loaded, anim);
        }
    }

    #[test]
    fn rejects_bad_files() {
        let reg = LayoutRegistry::default();
        let mut bytes = sample(57, Architecture::X86)
            .save_standalone(Endianness::Little)
            .unwrap();

        assert!(matches!(
            Animation::load_standalone(&reg, &bytes, Some(Properties::new(57, Architecture::X64))),
            Err(Error::ArchitectureMismatch { expected, found })
                if expected.architecture == Architecture::X64 && found.architecture == Architecture::X86
        ));
        assert!(matches!(
            Animation::load_standalone(&reg, &bytes[..bytes.len() - 1], None),
            Err(Error::OutOfBounds { .. })
        ));

        let mut unknown = bytes.clone();
        unknown[5] = 60;
        assert!(matches!(
            Animation::load_standalone(&reg, &unknown, None),
            Err(Error::InvalidVersion(_))
        ));

        bytes[6..10].copy_from_slice(&[0; 4]);
        assert!(matches!(
            Animation::load_standalone(&reg, &bytes, None),
            Err(Error::TruncatedBuffer)
        ));
        bytes[0] = b'X';
        assert!(matches!(
            Animation::load_standalone(&reg, &bytes, None),
            Err(Error::InvalidHeader(_))
        ));
    }
}
