use log::{trace, warn};

use crate::codec::{lerp, Codec, CodecKind, MinMax};
use crate::error::{Error, Result};
use crate::fixup::{FixupStorage, Offset};
use crate::layout::{BoneIdField, TrackLayout};
use crate::read::{Arena, Record};
use crate::write::{BinWriter, RecordWriter};
use crate::Vector;

pub const DEFAULT_FRAME_RATE: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    LocalRotation,
    LocalPosition,
    LocalScale,
    AbsoluteRotation,
    AbsolutePosition,
    Unknown(u8),
}

impl From<u8> for TrackType {
    fn from(v: u8) -> Self {
        match v {
            0 => TrackType::LocalRotation,
            1 => TrackType::LocalPosition,
            2 => TrackType::LocalScale,
            3 => TrackType::AbsoluteRotation,
            4 => TrackType::AbsolutePosition,
            v => TrackType::Unknown(v),
        }
    }
}

impl From<TrackType> for u8 {
    fn from(t: TrackType) -> Self {
        match t {
            TrackType::LocalRotation => 0,
            TrackType::LocalPosition => 1,
            TrackType::LocalScale => 2,
            TrackType::AbsoluteRotation => 3,
            TrackType::AbsolutePosition => 4,
            TrackType::Unknown(v) => v,
        }
    }
}

/// One animated channel of a bone.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    layout: TrackLayout,
    pub codec: Option<Codec>,
    /// Bounds for the bilinear codecs; identity when absent.
    pub min_max: Option<MinMax>,
    /// Implicit frame 0 on layouts that store one.
    pub reference: Vector,
    /// `-1` for no bone.
    pub bone_index: i32,
    pub mirror_bone: i32,
    pub bone_type: u8,
    pub track_type: TrackType,
    pub weight: f32,
    pub frame_rate: f32,
    compression: u8,
}

fn bone_byte(id: u8) -> i32 {
    if id == 0xff {
        -1
    } else {
        i32::from(id)
    }
}

/// `-1` is stored as `0xff`; anything else must fit below it.
fn to_bone_byte(id: i32) -> Result<u8> {
    match id {
        -1 => Ok(0xff),
        0..=0xfe => Ok(id as u8),
        _ => Err(Error::BoneOutOfRange(id)),
    }
}

/// Byte fields of the packed leading word, undoing the big-endian word order.
struct Header<'a> {
    word: [u8; 4],
    rec: Record<'a>,
}

impl<'a> Header<'a> {
    fn read(rec: Record<'a>, swapped: bool) -> Result<Self> {
        let mut word = [0; 4];
        word.copy_from_slice(rec.bytes(0, 4)?);
        if swapped {
            word.reverse();
        }
        Ok(Self { word, rec })
    }

    fn u8(&self, field: usize) -> Result<u8> {
        match self.word.get(field) {
            Some(b) => Ok(*b),
            None => self.rec.u8(field),
        }
    }
}

impl Track {
    pub fn new(layout: TrackLayout) -> Self {
        Self {
            layout,
            codec: None,
            min_max: None,
            reference: Vector::new(0.0, 0.0, 0.0, 1.0),
            bone_index: -1,
            mirror_bone: -1,
            bone_type: 0,
            track_type: TrackType::LocalRotation,
            weight: 1.0,
            frame_rate: DEFAULT_FRAME_RATE,
            compression: 0,
        }
    }

    pub fn load(layout: &TrackLayout, arena: &Arena, offset: Offset) -> Result<Self> {
        let rec = arena.record(offset, layout.size)?;
        let head = Header::read(rec, layout.packed_header && arena.is_big_endian())?;

        let compression = head.u8(layout.compression)?;
        let kind = layout.table().kind(compression);
        if kind == CodecKind::None && compression != 0 {
            warn!("track @{:#x}: unknown compression code {}", offset, compression);
        }

        let bone_index = match layout.bone_id {
            BoneIdField::Byte(at) => bone_byte(head.u8(at)?),
            BoneIdField::Int(at) => rec.i32(at)?,
        };
        let mirror_bone = match layout.mirror_bone {
            Some(at) => bone_byte(head.u8(at)?),
            None => -1,
        };

        let buffer_size = rec.u32(layout.buffer_size)? as usize;
        let codec = match rec.offset(layout.buffer, layout.arch)? {
            Some(at) if buffer_size > 0 => {
                Codec::parse(kind, arena.slice(at, buffer_size)?, arena.is_big_endian())?
            }
            _ => Codec::new(kind),
        };
        let min_max = match layout.extremes {
            Some(field) => match rec.offset(field, layout.arch)? {
                Some(at) => Some(arena.parse_at::<MinMax>(at)?),
                None => None,
            },
            None => None,
        };
        let reference = match layout.reference {
            Some(field) => rec.vector(field)?,
            None => Vector::new(0.0, 0.0, 0.0, 1.0),
        };

        trace!(
            "track @{:#x}: {:?}, {} keys, bone {}",
            offset,
            kind,
            codec.as_ref().map_or(0, Codec::len),
            bone_index
        );
        Ok(Self {
            layout: *layout,
            codec,
            min_max,
            reference,
            bone_index,
            mirror_bone,
            bone_type: head.u8(layout.bone_type)?,
            track_type: head.u8(layout.track_type)?.into(),
            weight: rec.f32(layout.weight)?,
            frame_rate: DEFAULT_FRAME_RATE,
            compression,
        })
    }

    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: TrackLayout) {
        self.layout = layout;
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn codec_kind(&self) -> CodecKind {
        self.codec.as_ref().map_or(CodecKind::None, Codec::kind)
    }

    /// Raw compression code as stored on disk.
    pub fn compression(&self) -> u8 {
        self.compression
    }

    pub fn use_ref_frame(&self) -> bool {
        self.layout.uses_reference_frame()
    }

    pub fn bounds(&self) -> MinMax {
        self.min_max.unwrap_or_default()
    }

    /// Replaces the codec with `kind` built from `(frame, value)` keys.
    ///
    /// Bilinear codecs store values relative to `bounds`, computed from the
    /// keys when not given.
    pub fn encode(&mut self, kind: CodecKind, keys: &[(i32, Vector)], bounds: Option<MinMax>) -> Result<()> {
        let compression = self.layout.table().code(kind).ok_or(Error::UnsupportedCodec {
            kind,
            revision: self.layout.revision,
        })?;
        if kind.is_bilinear() {
            let bounds = bounds.unwrap_or_else(|| {
                let values: Vec<Vector> = keys.iter().map(|(_, v)| *v).collect();
                MinMax::from_values(&values)
            });
            let normalized: Vec<(i32, Vector)> =
                keys.iter().map(|(f, v)| (*f, bounds.normalize(*v))).collect();
            self.codec = Codec::from_keys(kind, &normalized)?;
            self.min_max = Some(bounds);
        } else {
            self.codec = Codec::from_keys(kind, keys)?;
            self.min_max = None;
        }
        self.compression = compression;
        Ok(())
    }

    fn rescale(&self, codec: &Codec, v: Vector) -> Vector {
        if codec.kind().is_bilinear() {
            self.bounds().apply(v)
        } else {
            v
        }
    }

    fn keys(&self) -> Option<&Codec> {
        self.codec.as_ref().filter(|c| !c.is_empty())
    }

    /// Keyframes including the reference frame.
    pub fn num_frames(&self) -> usize {
        self.keys().map_or(0, Codec::len) + self.use_ref_frame() as usize
    }

    /// Absolute frame of keyframe `i`.
    pub fn frame(&self, i: usize) -> Option<i32> {
        let shift = self.use_ref_frame() as usize;
        if i < shift {
            return Some(0);
        }
        let codec = self.keys()?;
        codec.frame(i - shift).map(|f| f + shift as i32)
    }

    /// Value of keyframe `i` in engine units.
    pub fn evaluate(&self, i: usize) -> Option<Vector> {
        let shift = self.use_ref_frame() as usize;
        if i < shift {
            return Some(self.reference);
        }
        let codec = self.keys()?;
        let v = codec.evaluate(i - shift)?;
        Some(self.rescale(codec, v))
    }

    pub fn is_cubic(&self) -> bool {
        self.codec.as_ref().map_or(false, Codec::is_cubic)
    }

    /// Hermite tangents of keyframe `i`.
    pub fn tangents(&self, i: usize) -> Option<(Vector, Vector)> {
        let shift = self.use_ref_frame() as usize;
        let i = i.checked_sub(shift)?;
        self.codec.as_ref()?.tangents(i)
    }

    /// Last codec frame, the track's contribution to the animation length.
    pub fn last_frame(&self) -> Option<i32> {
        self.keys().and_then(|c| c.frame(c.len() - 1))
    }

    /// Samples the track at `time` seconds.
    pub fn get_value(&self, time: f32) -> Option<Vector> {
        let use_ref = self.use_ref_frame();
        let codec = match self.keys() {
            Some(c) => c,
            None if use_ref => return Some(self.reference),
            None => return None,
        };
        let frame = time * self.frame_rate;
        let first = self.rescale(codec, codec.evaluate(0)?);
        if use_ref && frame < 1.0 {
            return Some(lerp(self.reference, first, frame.max(0.0)));
        }

        let target = if use_ref { frame - 1.0 } else { frame };
        if target <= codec.frame(0)? as f32 {
            return Some(first);
        }
        let bounds = self.bounds();
        let last = codec.len() - 1;
        for f in 0..last {
            let (a, b) = (codec.frame(f)? as f32, codec.frame(f + 1)? as f32);
            if a <= target && target < b {
                let delta = (target - a) / (b - a);
                return codec.interpolate(f, delta, &bounds);
            }
        }
        Some(self.rescale(codec, codec.evaluate(last)?))
    }

    /// Codec as it will be saved, with its compression code.
    fn stored_codec(&self) -> Result<Option<(&Codec, u8)>> {
        let codec = match &self.codec {
            Some(codec) => codec,
            None => return Ok(None),
        };
        let table = self.layout.table();
        if table.kind(self.compression) == codec.kind() {
            return Ok(Some((codec, self.compression)));
        }
        match table.code(codec.kind()) {
            Some(code) => Ok(Some((codec, code))),
            None => Err(Error::UnsupportedCodec {
                kind: codec.kind(),
                revision: self.layout.revision,
            }),
        }
    }

    pub(crate) fn write_record(&self, w: &mut BinWriter, fixups: &mut FixupStorage) -> Result<()> {
        let l = &self.layout;
        let mut rec = RecordWriter::new(l.size, w.endian());
        let stored = self.stored_codec()?;

        rec.put_u8(l.compression, stored.map_or(0, |(_, code)| code))?;
        rec.put_u8(l.track_type, self.track_type.into())?;
        rec.put_u8(l.bone_type, self.bone_type)?;
        match l.bone_id {
            BoneIdField::Byte(at) => rec.put_u8(at, to_bone_byte(self.bone_index)?)?,
            BoneIdField::Int(at) => rec.put_i32(at, self.bone_index)?,
        }
        if let Some(at) = l.mirror_bone {
            rec.put_u8(at, to_bone_byte(self.mirror_bone)?)?;
        }
        if l.packed_header && w.is_big_endian() {
            let mut word = [0; 4];
            word.copy_from_slice(&rec.as_bytes()[..4]);
            word.reverse();
            rec.put_bytes(0, &word)?;
        }

        rec.put_f32(l.weight, self.weight)?;
        let size = stored.map_or(0, |(c, _)| c.byte_size());
        rec.put_u32(l.buffer_size, size as u32)?;
        rec.put_pointer(l.buffer);
        if let Some(at) = l.reference {
            rec.put_vector(at, self.reference)?;
        }
        if let Some(at) = l.extremes {
            rec.put_pointer(at);
        }
        w.write_record(&rec, fixups)
    }

    /// Writes the keys and bounds the record's pointers refer to.
    pub(crate) fn write_buffers(&self, w: &mut BinWriter, fixups: &mut FixupStorage) -> Result<()> {
        match self.stored_codec()? {
            Some((codec, _)) if !codec.is_empty() => {
                w.pad(16)?;
                fixups.save_to(w)?;
                codec.write(w)?;
            }
            _ => fixups.skip_to()?,
        }
        match (self.layout.extremes, &self.min_max) {
            (Some(_), Some(mm)) => {
                w.pad(16)?;
                fixups.save_to(w)?;
                mm.write(w)?;
            }
            (Some(_), None) => fixups.skip_to()?,
            (None, Some(_)) => warn!(
                "{:?} tracks cannot store bounds, dropping them",
                self.layout.revision
            ),
            (None, None) => {}
        }
        Ok(())
    }
}
