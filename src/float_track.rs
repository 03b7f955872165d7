use nom::number::Endianness;
use nom::IResult;

use crate::error::Result;
use crate::fixup::{FixupStorage, Offset};
use crate::layout::FloatTrackLayout;
use crate::read::utilities::{f32 as parse_f32, u32 as parse_u32};
use crate::read::{Arena, DeserializeEndian};
use crate::write::{BinWriter, RecordWriter};

pub const NUM_GROUPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatComponent {
    None,
    X,
    Y,
    Z,
    Unknown(u8),
}

impl Default for FloatComponent {
    fn default() -> Self {
        FloatComponent::None
    }
}

impl From<u8> for FloatComponent {
    fn from(v: u8) -> Self {
        match v {
            0 => FloatComponent::None,
            1 => FloatComponent::X,
            2 => FloatComponent::Y,
            3 => FloatComponent::Z,
            v => FloatComponent::Unknown(v),
        }
    }
}

impl From<FloatComponent> for u8 {
    fn from(c: FloatComponent) -> Self {
        match c {
            FloatComponent::None => 0,
            FloatComponent::X => 1,
            FloatComponent::Y => 2,
            FloatComponent::Z => 3,
            FloatComponent::Unknown(v) => v,
        }
    }
}

/// Keyframe of an auxiliary float curve.
///
/// `data` packs the component count in the low byte and a signed frame in
/// the next 16 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FloatFrame {
    pub data: u32,
    pub value: [f32; 3],
}

impl FloatFrame {
    const SIZE: usize = 16;

    pub fn new(frame: i16, value: &[f32]) -> Self {
        let mut f = Self::default();
        f.set_frame(frame);
        f.set_num_components(value.len().min(3) as u8);
        for (dst, src) in f.value.iter_mut().zip(value) {
            *dst = *src;
        }
        f
    }

    pub fn frame(&self) -> i16 {
        (self.data >> 8) as i16
    }

    pub fn set_frame(&mut self, frame: i16) {
        self.data = (self.data & 0xff00_00ff) | (u32::from(frame as u16) << 8);
    }

    pub fn num_components(&self) -> u8 {
        self.data as u8
    }

    pub fn set_num_components(&mut self, n: u8) {
        self.data = (self.data & 0xffff_ff00) | u32::from(n);
    }
}

impl DeserializeEndian for FloatFrame {
    fn parse(i: &[u8], endian: Endianness) -> IResult<&[u8], Self> {
        let (i, data) = parse_u32(endian)(i)?;
        let (i, x) = parse_f32(endian)(i)?;
        let (i, y) = parse_f32(endian)(i)?;
        let (i, z) = parse_f32(endian)(i)?;
        Ok((i, Self { data, value: [x, y, z] }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatTrackGroup {
    pub remaps: [FloatComponent; 4],
    pub frames: Vec<FloatFrame>,
}

/// The four float curve groups of an animation.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatTracks {
    layout: FloatTrackLayout,
    pub groups: [FloatTrackGroup; NUM_GROUPS],
}

impl FloatTracks {
    pub fn new(layout: FloatTrackLayout) -> Self {
        Self {
            layout,
            groups: Default::default(),
        }
    }

    pub fn load(layout: &FloatTrackLayout, arena: &Arena, offset: Offset) -> Result<Self> {
        let mut tracks = Self::new(*layout);
        for (i, g) in tracks.groups.iter_mut().enumerate() {
            let rec = arena.record(offset + i * layout.size, layout.size)?;
            for (c, r) in g.remaps.iter_mut().enumerate() {
                *r = rec.u8(layout.remaps + c)?.into();
            }
            let count = rec.u32(layout.num_floats)? as usize;
            if let Some(at) = rec.offset(layout.frames, layout.arch)? {
                g.frames = arena.parse_many(at, count)?;
            }
        }
        Ok(tracks)
    }

    pub fn num_groups(&self) -> usize {
        NUM_GROUPS
    }

    pub fn group_frame_count(&self, group: usize) -> Option<usize> {
        self.groups.get(group).map(|g| g.frames.len())
    }

    /// Writes the group records and their frames at the current position.
    pub(crate) fn write(&self, w: &mut BinWriter) -> Result<()> {
        let l = &self.layout;
        let mut fixups = FixupStorage::new();
        for g in &self.groups {
            let mut rec = RecordWriter::new(l.size, w.endian());
            for (c, r) in g.remaps.iter().enumerate() {
                rec.put_u8(l.remaps + c, (*r).into())?;
            }
            rec.put_u32(l.num_floats, g.frames.len() as u32)?;
            rec.put_pointer(l.frames);
            w.write_record(&rec, &mut fixups)?;
        }
        for g in &self.groups {
            if g.frames.is_empty() {
                fixups.skip_to()?;
                continue;
            }
            w.pad(16)?;
            fixups.save_to(w)?;
            for f in &g.frames {
                let mut rec = RecordWriter::new(FloatFrame::SIZE, w.endian());
                rec.put_u32(0, f.data)?;
                for (c, v) in f.value.iter().enumerate() {
                    rec.put_f32(4 + c * 4, *v)?;
                }
                w.write_bytes(rec.as_bytes())?;
            }
        }
        fixups.fixup_pointers(w, l.arch)
    }
}
