//! The `LMT` container: a header, a table of animation offsets and the
//! animations themselves.

use std::convert::TryFrom;

use log::{debug, trace};
use nom::number::Endianness;

use crate::animation::Animation;
use crate::config::{ExportSettings, Settings};
use crate::error::{Error, Properties, Result};
use crate::fixup::{FixupStorage, Offset};
use crate::layout::{align_to, AnimationLayout, Architecture, EventPlacement, LayoutRegistry};
use crate::read::utilities::{skip_while_eq, u32 as parse_u32};
use crate::read::Arena;
use crate::write::BinWriter;

const MAGIC: [u8; 4] = *b"LMT\0";
const TAG_VERSION: u16 = 92;
const TAG: u32 = 0x1701_1700;

/// Offset of the first table entry for a stored version.
fn table_start(version: u16) -> usize {
    if version >= TAG_VERSION {
        16
    } else {
        8
    }
}

/// Offset of the first animation when the table uses `arch` pointers.
fn table_end(version: u16, slots: usize, arch: Architecture) -> usize {
    align_to(table_start(version) + slots * arch.pointer_size(), 16)
}

#[derive(Debug, Clone)]
pub struct Container {
    layout: AnimationLayout,
    animations: Vec<Option<Animation>>,
    offsets: Vec<Option<Offset>>,
    arena: Option<Arena>,
}

impl Container {
    pub fn new(registry: &LayoutRegistry, props: Properties) -> Result<Self> {
        Ok(Self {
            layout: *registry.animation(props)?,
            animations: Vec::new(),
            offsets: Vec::new(),
            arena: None,
        })
    }

    pub fn load(registry: &LayoutRegistry, bytes: Vec<u8>) -> Result<Self> {
        Self::load_with(registry, bytes, &Settings::default())
    }

    pub fn load_with(registry: &LayoutRegistry, bytes: Vec<u8>, settings: &Settings) -> Result<Self> {
        let endian = match bytes.get(..4) {
            Some(m) if m == MAGIC => Endianness::Little,
            Some(m) if m.iter().rev().eq(MAGIC.iter()) => Endianness::Big,
            Some(m) => {
                let mut raw = [0; 4];
                raw.copy_from_slice(m);
                return Err(Error::InvalidHeader(u32::from_le_bytes(raw)));
            }
            None => return Err(Error::InvalidHeader(0)),
        };
        let arena = Arena::new(bytes, endian);
        let head = arena.record(0, 8)?;
        let stored = head.u16(4)?;
        let slots = head.u16(6)? as usize;
        let version = settings.import.version.unwrap_or(stored);

        let arch = match settings.import.architecture {
            Some(arch) => {
                debug!("architecture forced to {}", arch);
                arch
            }
            None => detect_architecture(registry, &arena, stored, version, slots)?,
        };
        let props = Properties::new(version, arch);
        let layout = *registry.animation(props)?;
        debug!(
            "loading {} container ({:?} endian), {} slots",
            props, endian, slots
        );

        let start = table_start(stored);
        let mut animations = Vec::with_capacity(slots);
        let mut offsets = Vec::with_capacity(slots);
        for i in 0..slots {
            let slot = arena.record(start + i * arch.pointer_size(), arch.pointer_size())?;
            match slot.offset(0, arch)? {
                Some(at) => {
                    trace!("slot {} @{:#x}", i, at);
                    let mut anim = Animation::load(&layout, &arena, at)?;
                    anim.set_frame_rate(settings.frame_rate);
                    animations.push(Some(anim));
                    offsets.push(Some(at));
                }
                None => {
                    trace!("slot {} is empty", i);
                    animations.push(None);
                    offsets.push(None);
                }
            }
        }

        Ok(Self {
            layout,
            animations,
            offsets,
            arena: Some(arena),
        })
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        self.save_with(&ExportSettings::default())
    }

    pub fn save_with(&self, settings: &ExportSettings) -> Result<Vec<u8>> {
        let endian = if settings.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        };
        let props = self.properties();
        let arch = props.architecture;
        let slots = u16::try_from(self.animations.len())
            .map_err(|_| Error::Serialize(format!("{} slots", self.animations.len())))?;

        let mut w = BinWriter::new(endian);
        let mut magic = MAGIC;
        if w.is_big_endian() {
            magic.reverse();
        }
        w.write_bytes(&magic)?;
        w.write_u16(props.version)?;
        w.write_u16(slots)?;
        if props.version >= TAG_VERSION {
            w.write_u32(TAG)?;
            w.write_u32(0)?;
        }

        let mut fixups = FixupStorage::new();
        for _ in &self.animations {
            fixups.save_from(w.tell());
            w.skip(arch.pointer_size())?;
        }
        for anim in &self.animations {
            match anim {
                Some(anim) => {
                    w.pad(16)?;
                    fixups.save_to(&w)?;
                    trace!("animation @{:#x}", w.tell());
                    anim.write(&mut w)?;
                }
                None => fixups.skip_to()?,
            }
        }
        fixups.fixup_pointers(&mut w, arch)?;
        debug!(
            "saved {} container ({:?} endian), {} slots, {} bytes",
            props,
            endian,
            slots,
            w.tell()
        );
        Ok(w.into_inner())
    }

    pub fn properties(&self) -> Properties {
        self.layout.properties
    }

    /// Retargets an empty, authored container.
    pub fn set_properties(&mut self, registry: &LayoutRegistry, props: Properties) -> Result<()> {
        if self.arena.is_some() || !self.animations.is_empty() {
            return Err(Error::Locked);
        }
        self.layout = *registry.animation(props)?;
        Ok(())
    }

    pub fn create_animation(&self) -> Animation {
        Animation::new(self.layout)
    }

    pub fn append_animation(&mut self, anim: Animation) -> Result<usize> {
        let at = self.animations.len();
        self.insert_animation(anim, at, false)?;
        Ok(at)
    }

    /// Places `anim` at slot `at`, either shifting later slots or
    /// replacing the slot. Missing slots up to `at` are created empty.
    pub fn insert_animation(&mut self, anim: Animation, at: usize, replace: bool) -> Result<()> {
        let found = anim.properties();
        if found != self.properties() {
            return Err(Error::PropertiesMismatch {
                expected: self.properties(),
                found,
            });
        }
        if at >= self.animations.len() {
            self.animations.resize_with(at, || None);
            self.animations.push(Some(anim));
        } else if replace {
            self.animations[at] = Some(anim);
        } else {
            self.animations.insert(at, Some(anim));
        }
        Ok(())
    }

    pub fn remove_animation(&mut self, at: usize) -> Option<Animation> {
        if at < self.animations.len() {
            self.animations.remove(at)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    pub fn animations(&self) -> &[Option<Animation>] {
        &self.animations
    }

    pub fn animation(&self, at: usize) -> Option<&Animation> {
        self.animations.get(at)?.as_ref()
    }

    pub fn animation_mut(&mut self, at: usize) -> Option<&mut Animation> {
        self.animations.get_mut(at)?.as_mut()
    }

    /// Slot offsets as found when loading.
    pub fn offsets(&self) -> &[Option<Offset>] {
        &self.offsets
    }

    /// The bytes this container was loaded from.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.arena.as_ref().map(Arena::as_bytes)
    }
}

/// Works out the pointer width of a stored container.
///
/// The first animation follows the padded table, so when the table sizes
/// for both widths differ the first offset decides. Otherwise the first
/// header is read with the 64 bit layout; any pointer field with its high
/// half set means the fields are really 32 bit. This is a heuristic.
fn detect_architecture(
    registry: &LayoutRegistry,
    arena: &Arena,
    stored: u16,
    version: u16,
    slots: usize,
) -> Result<Architecture> {
    // Only the table itself; its widest form covers the 32-bit one too.
    let start = table_start(stored);
    let bytes = arena.as_bytes();
    let end = (start + slots * Architecture::X64.pointer_size()).min(bytes.len());
    let table = bytes.get(start..end).unwrap_or(&[]);
    let first = match skip_while_eq(parse_u32(arena.endian()), 0)(table) {
        Ok((_, Some(first))) => first as usize,
        _ => {
            debug!("no animations stored, assuming x64");
            return Ok(Architecture::X64);
        }
    };

    let x86 = table_end(stored, slots, Architecture::X86);
    let x64 = table_end(stored, slots, Architecture::X64);
    if x86 != x64 {
        let arch = if first == x64 {
            Architecture::X64
        } else {
            Architecture::X86
        };
        debug!("table ends at {:#x}, detected {}", first, arch);
        return Ok(arch);
    }

    let layout = match registry.animation(Properties::new(version, Architecture::X64)) {
        Ok(layout) => layout,
        Err(_) => return Ok(Architecture::X86),
    };
    let rec = match arena.record(first, layout.size) {
        Ok(rec) => rec,
        Err(_) => return Ok(Architecture::X86),
    };
    let mut fields = vec![layout.tracks];
    if let EventPlacement::Pointer { offset, .. } = layout.events {
        fields.push(offset);
    }
    if let Some((offset, _)) = layout.float_tracks {
        fields.push(offset);
    }
    for field in fields {
        if rec.u64(field)? >> 32 != 0 {
            debug!("pointer at {:#x} exceeds 32 bits, detected x86", first + field);
            return Ok(Architecture::X86);
        }
    }
    debug!("header pointers fit 32 bits, detected x64");
    Ok(Architecture::X64)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::CodecKind;
    use crate::Vector;

    fn animation(container: &Container, frames: i32) -> Animation {
        let mut anim = container.create_animation();
        let mut track = anim.create_track();
        track
            .encode(
                CodecKind::LinearVector3,
                &[(0, Vector::new(0.0, 1.0, 2.0, 0.0)), (frames, Vector::new(3.0, 4.0, 5.0, 0.0))],
                None,
            )
            .unwrap();
        anim.add_track(track);
        anim.sanitize();
        anim
    }

    #[test]
    fn header_bytes() {
        let reg = LayoutRegistry::default();
        let mut c = Container::new(&reg, Properties::new(92, Architecture::X64)).unwrap();
        let anim = animation(&c, 4);
        c.append_animation(anim).unwrap();
        let bytes = c.save().unwrap();
        assert_eq!(&bytes[..4], b"LMT\0");
        assert_eq!(&bytes[4..8], &[92, 0, 1, 0]);
        assert_eq!(&bytes[8..16], &[0x00, 0x17, 0x01, 0x17, 0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &32u64.to_le_bytes());

        let be = c.save_with(&ExportSettings { big_endian: true }).unwrap();
        assert_eq!(&be[..8], &[0, b'T', b'M', b'L', 0, 92, 0, 1]);
    }

    #[test]
    fn table_sizes() {
        assert_eq!(table_end(67, 1, Architecture::X86), 16);
        assert_eq!(table_end(67, 1, Architecture::X64), 16);
        assert_eq!(table_end(67, 2, Architecture::X64), 32);
        assert_eq!(table_end(92, 3, Architecture::X86), 32);
        assert_eq!(table_end(92, 3, Architecture::X64), 48);
    }

    #[test]
    fn slot_editing() {
        let reg = LayoutRegistry::default();
        let mut c = Container::new(&reg, Properties::new(67, Architecture::X86)).unwrap();
        let a = animation(&c, 2);
        let b = animation(&c, 8);
        c.insert_animation(a, 2, false).unwrap();
        assert_eq!(c.len(), 3);
        assert!(c.animation(0).is_none());
        c.insert_animation(b, 0, true).unwrap();
        // v67 tracks carry a reference frame
        assert_eq!(c.animation(0).unwrap().num_frames(), 9);
        assert_eq!(c.animation(2).unwrap().num_frames(), 3);

        let extra = animation(&c, 3);
        c.insert_animation(extra, 1, false).unwrap();
        assert_eq!(c.len(), 4);
        assert_eq!(c.animation(1).unwrap().num_frames(), 4);
        assert!(c.remove_animation(1).is_some());
        assert!(c.remove_animation(7).is_none());
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn properties_are_checked() {
        let reg = LayoutRegistry::default();
        let mut c = Container::new(&reg, Properties::new(67, Architecture::X86)).unwrap();
        let other = reg
            .create_animation(Properties::new(67, Architecture::X64))
            .unwrap();
        assert!(matches!(
            c.append_animation(other),
            Err(Error::PropertiesMismatch { .. })
        ));

        c.set_properties(&reg, Properties::new(57, Architecture::X64)).unwrap();
        assert_eq!(c.properties(), Properties::new(57, Architecture::X64));
        assert!(matches!(
            c.set_properties(&reg, Properties::new(58, Architecture::X64)),
            Err(Error::InvalidVersion(_))
        ));
        let anim = c.create_animation();
        c.append_animation(anim).unwrap();
        assert!(matches!(
            c.set_properties(&reg, Properties::new(67, Architecture::X64)),
            Err(Error::Locked)
        ));
    }

    #[test]
    fn bad_magic() {
        let reg = LayoutRegistry::default();
        assert!(matches!(
            Container::load(&reg, b"LMX\0\x43\0\0\0".to_vec()),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            Container::load(&reg, b"LM".to_vec()),
            Err(Error::InvalidHeader(0))
        ));
    }

    #[test]
    fn empty_container() {
        let reg = LayoutRegistry::default();
        let c = Container::new(&reg, Properties::new(67, Architecture::X86)).unwrap();
        let bytes = c.save().unwrap();
        assert_eq!(bytes.len(), 8);
        let loaded = Container::load(&reg, bytes).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.properties().architecture, Architecture::X64);
    }

    #[test]
    fn detection_stops_at_the_table() {
        let reg = LayoutRegistry::default();
        let mut bytes = b"LMT\0".to_vec();
        bytes.extend_from_slice(&67u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&[0; 16]);
        bytes.extend_from_slice(&[0x40, 0, 0, 0, 0x11, 0x22, 0x33, 0x44]);
        let arena = Arena::new(bytes, Endianness::Little);
        let arch = detect_architecture(&reg, &arena, 67, 67, 2).unwrap();
        assert_eq!(arch, Architecture::X64);
    }
}
