//! Track codecs.
//!
//! A codec is a list of packed frames plus a table of absolute frame
//! indices. Every frame type implements [`CodecFrame`], and [`Buffer`] turns
//! that per-frame behaviour into the per-track operations the rest of the
//! crate uses. [`Codec`] is the closed set of buffers a track can own.

#![allow(non_camel_case_types)]

use cgmath::{ElementWise, InnerSpace, VectorSpace};
use nom::number::Endianness;
use nom::IResult;

use crate::error::{Error, Result};
use crate::read::utilities::vector as parse_vector;
use crate::read::DeserializeEndian;
use crate::write::BinWriter;
use crate::Vector;

mod rotation;
mod vector;

pub use self::rotation::*;
pub use self::vector::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    None,
    SingleVector3,
    StepRotationQuat3,
    LinearVector3,
    HermiteVector3,
    SphericalRotation,
    BiLinearVector3_16bit,
    BiLinearVector3_8bit,
    LinearRotationQuat4_14bit,
    BiLinearRotationQuat4_7bit,
    BiLinearRotationQuat4_9bit,
    BiLinearRotationQuat4_11bit,
    BiLinearRotationQuatXW_14bit,
    BiLinearRotationQuatYW_14bit,
    BiLinearRotationQuatZW_14bit,
}

impl CodecKind {
    /// Largest error a devaluate/evaluate pair may introduce per component.
    pub fn epsilon(self) -> f32 {
        use CodecKind::*;
        match self {
            None | SingleVector3 | LinearVector3 | HermiteVector3 => 1e-6,
            StepRotationQuat3 => 1e-5,
            SphericalRotation => 2e-5,
            BiLinearVector3_16bit => 1e-5,
            BiLinearVector3_8bit => 5e-3,
            LinearRotationQuat4_14bit => 1.8e-4,
            BiLinearRotationQuat4_7bit => 5e-3,
            BiLinearRotationQuat4_9bit => 2e-3,
            BiLinearRotationQuat4_11bit => 5e-4,
            BiLinearRotationQuatXW_14bit
            | BiLinearRotationQuatYW_14bit
            | BiLinearRotationQuatZW_14bit => 1e-4,
        }
    }

    /// Output lives in `[0, 1]` and is rescaled by the track bounds.
    pub fn is_bilinear(self) -> bool {
        use CodecKind::*;
        matches!(
            self,
            BiLinearVector3_16bit
                | BiLinearVector3_8bit
                | BiLinearRotationQuat4_7bit
                | BiLinearRotationQuat4_9bit
                | BiLinearRotationQuat4_11bit
                | BiLinearRotationQuatXW_14bit
                | BiLinearRotationQuatYW_14bit
                | BiLinearRotationQuatZW_14bit
        )
    }
}

/// Compression code to codec mapping, one per track generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionTable {
    Legacy,
    Transitional,
    Current,
}

const LEGACY: [CodecKind; 10] = [
    CodecKind::None,
    CodecKind::SingleVector3,
    CodecKind::SingleVector3,
    CodecKind::None,
    CodecKind::StepRotationQuat3,
    CodecKind::HermiteVector3,
    CodecKind::SphericalRotation,
    CodecKind::None,
    CodecKind::None,
    CodecKind::LinearVector3,
];

const TRANSITIONAL: [CodecKind; 10] = [
    CodecKind::None,
    CodecKind::SingleVector3,
    CodecKind::SingleVector3,
    CodecKind::None,
    CodecKind::StepRotationQuat3,
    CodecKind::HermiteVector3,
    CodecKind::LinearRotationQuat4_14bit,
    CodecKind::None,
    CodecKind::None,
    CodecKind::LinearVector3,
];

const CURRENT: [CodecKind; 16] = [
    CodecKind::None,
    CodecKind::SingleVector3,
    CodecKind::StepRotationQuat3,
    CodecKind::LinearVector3,
    CodecKind::BiLinearVector3_16bit,
    CodecKind::BiLinearVector3_8bit,
    CodecKind::LinearRotationQuat4_14bit,
    CodecKind::BiLinearRotationQuat4_7bit,
    CodecKind::None,
    CodecKind::None,
    CodecKind::None,
    CodecKind::BiLinearRotationQuatXW_14bit,
    CodecKind::BiLinearRotationQuatYW_14bit,
    CodecKind::BiLinearRotationQuatZW_14bit,
    CodecKind::BiLinearRotationQuat4_11bit,
    CodecKind::BiLinearRotationQuat4_9bit,
];

impl CompressionTable {
    fn entries(self) -> &'static [CodecKind] {
        match self {
            CompressionTable::Legacy => &LEGACY,
            CompressionTable::Transitional => &TRANSITIONAL,
            CompressionTable::Current => &CURRENT,
        }
    }

    /// Unknown codes map to [`CodecKind::None`].
    pub fn kind(self, code: u8) -> CodecKind {
        self.entries()
            .get(code as usize)
            .copied()
            .unwrap_or(CodecKind::None)
    }

    /// First code that maps to `kind`.
    pub fn code(self, kind: CodecKind) -> Option<u8> {
        self.entries()
            .iter()
            .position(|k| *k == kind)
            .map(|c| c as u8)
    }
}

/// Per-track affine bounds, stored as two vectors.
///
/// Decoding computes `max + min * code`: `max` holds the offset and `min`
/// the per component range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: Vector,
    pub max: Vector,
}

impl Default for MinMax {
    fn default() -> Self {
        Self {
            min: Vector::new(1.0, 1.0, 1.0, 1.0),
            max: Vector::new(0.0, 0.0, 0.0, 0.0),
        }
    }
}

impl MinMax {
    pub const SIZE: usize = 32;

    /// Bounds that map the componentwise extremes of `values` onto `[0, 1]`.
    pub fn from_values(values: &[Vector]) -> Self {
        let mut iter = values.iter();
        let first = match iter.next() {
            Some(v) => *v,
            None => return Self::default(),
        };
        let (lo, hi) = iter.fold((first, first), |(lo, hi), v| {
            (
                Vector::new(lo.x.min(v.x), lo.y.min(v.y), lo.z.min(v.z), lo.w.min(v.w)),
                Vector::new(hi.x.max(v.x), hi.y.max(v.y), hi.z.max(v.z), hi.w.max(v.w)),
            )
        });
        Self {
            min: hi - lo,
            max: lo,
        }
    }

    pub fn apply(&self, v: Vector) -> Vector {
        self.max + self.min.mul_element_wise(v)
    }

    /// Inverse of [`MinMax::apply`]; zero range components map to 0.
    pub fn normalize(&self, v: Vector) -> Vector {
        let d = v - self.max;
        let div = |n: f32, r: f32| if r == 0.0 { 0.0 } else { n / r };
        Vector::new(
            div(d.x, self.min.x),
            div(d.y, self.min.y),
            div(d.z, self.min.z),
            div(d.w, self.min.w),
        )
    }

    pub fn write(&self, w: &mut BinWriter) -> Result<()> {
        w.write_vector(self.min)?;
        w.write_vector(self.max)
    }
}

impl DeserializeEndian for MinMax {
    fn parse(i: &[u8], endian: Endianness) -> IResult<&[u8], Self> {
        let (i, min) = parse_vector(endian)(i)?;
        let (i, max) = parse_vector(endian)(i)?;
        Ok((i, Self { min, max }))
    }
}

pub fn lerp(a: Vector, b: Vector, t: f32) -> Vector {
    a.lerp(b, t)
}

/// Shortest path spherical interpolation, falling back to a normalized lerp
/// for nearly parallel inputs.
pub fn slerp(a: Vector, b: Vector, t: f32) -> Vector {
    let mut b = b;
    let mut dot = a.dot(b);
    if dot < 0.0 {
        b = -b;
        dot = -dot;
    }
    if dot > 0.9995 {
        return (a + (b - a) * t).normalize();
    }
    let theta = dot.min(1.0).acos();
    let sin_theta = theta.sin();
    let s1 = (theta * t).sin() / sin_theta;
    let s0 = (theta * t).cos() - dot * s1;
    a * s0 + b * s1
}

pub fn blerp(a: Vector, b: Vector, bounds: &MinMax, t: f32) -> Vector {
    lerp(bounds.apply(a), bounds.apply(b), t)
}

pub fn bslerp(a: Vector, b: Vector, bounds: &MinMax, t: f32) -> Vector {
    slerp(bounds.apply(a), bounds.apply(b), t)
}

/// `round(value * scale)` clamped to `0..=mask`.
pub(crate) fn quantize(value: f32, scale: f32, mask: u64) -> u64 {
    let code = (value * scale).round();
    if code >= mask as f32 {
        mask
    } else if code > 0.0 {
        code as u64
    } else {
        0
    }
}

pub(crate) fn swap_f32(v: f32) -> f32 {
    f32::from_bits(v.to_bits().swap_bytes())
}

/// One packed keyframe of a codec.
///
/// `parse` and `serialize` use the in-memory little-endian image;
/// big-endian data is converted with `swap_endian`.
pub trait CodecFrame: Clone + Default + std::fmt::Debug {
    const KIND: CodecKind;
    /// Frames advance by one without a stored step.
    const IMPLICIT: bool = false;
    const MAX_STEP: u32;

    fn parse(i: &[u8]) -> IResult<&[u8], Self>;
    fn serialize(&self, out: &mut Vec<u8>) -> Result<()>;
    fn size(&self) -> usize;
    fn evaluate(&self) -> Vector;
    fn devaluate(&mut self, value: Vector);
    /// Frames between this keyframe and the next.
    fn step(&self) -> u32;
    fn set_step(&mut self, step: u32);
    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector;
    fn swap_endian(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer<F> {
    frames: Vec<F>,
    table: Vec<i32>,
}

impl<F> Default for Buffer<F> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            table: Vec::new(),
        }
    }
}

impl<F: CodecFrame> Buffer<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<F>) -> Self {
        let mut table = Vec::with_capacity(frames.len());
        let mut current = 0i32;
        for f in &frames {
            table.push(current);
            current = current.saturating_add(f.step() as i32);
        }
        Self { frames, table }
    }

    /// Encodes `(frame, value)` keys. The first key must sit on frame 0 and
    /// frames may not decrease.
    pub fn from_keys(keys: &[(i32, Vector)]) -> Result<Self> {
        let mut buf = Self::new();
        if let Some(&(first, _)) = keys.first() {
            if first != 0 {
                return Err(Error::FrameOutOfRange {
                    kind: F::KIND,
                    step: i64::from(first),
                });
            }
        }
        for (idx, &(frame, value)) in keys.iter().enumerate() {
            let step = match keys.get(idx + 1) {
                Some(&(next, _)) => i64::from(next) - i64::from(frame),
                None if F::IMPLICIT => 1,
                None => 0,
            };
            buf.push(value, step)?;
        }
        Ok(buf)
    }

    pub(crate) fn parse(bytes: &[u8], swap: bool) -> Result<Self> {
        let mut i = bytes;
        let mut frames = Vec::new();
        while !i.is_empty() {
            let (rest, mut f) = F::parse(i)?;
            if swap {
                f.swap_endian();
            }
            frames.push(f);
            i = rest;
        }
        Ok(Self::from_frames(frames))
    }

    pub(crate) fn write(&self, w: &mut BinWriter) -> Result<()> {
        let mut out = Vec::with_capacity(self.byte_size());
        for f in &self.frames {
            if w.is_big_endian() {
                let mut f = f.clone();
                f.swap_endian();
                f.serialize(&mut out)?;
            } else {
                f.serialize(&mut out)?;
            }
        }
        w.write_bytes(&out)
    }

    pub fn frames(&self) -> &[F] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.frames.iter().map(CodecFrame::size).sum()
    }

    /// Absolute frame index of keyframe `i`.
    pub fn frame(&self, i: usize) -> Option<i32> {
        self.table.get(i).copied()
    }

    pub fn evaluate(&self, i: usize) -> Option<Vector> {
        self.frames.get(i).map(CodecFrame::evaluate)
    }

    pub fn devaluate(&mut self, i: usize, value: Vector) -> Result<()> {
        let len = self.frames.len();
        let f = self
            .frames
            .get_mut(i)
            .ok_or(Error::KeyframeOutOfRange { index: i, len })?;
        f.devaluate(value);
        Ok(())
    }

    /// Blends keyframe `i` towards `i + 1`; the last keyframe evaluates as is.
    pub fn interpolate(&self, i: usize, delta: f32, bounds: &MinMax) -> Option<Vector> {
        let left = self.frames.get(i)?;
        Some(match self.frames.get(i + 1) {
            Some(right) => left.interpolate(right, delta, bounds),
            None => left.evaluate(),
        })
    }

    pub fn set_step(&mut self, i: usize, step: i64) -> Result<()> {
        let step = check_step::<F>(step)?;
        let len = self.frames.len();
        self.frames
            .get_mut(i)
            .ok_or(Error::KeyframeOutOfRange { index: i, len })?
            .set_step(step);
        *self = Self::from_frames(std::mem::take(&mut self.frames));
        Ok(())
    }

    pub fn push(&mut self, value: Vector, step: i64) -> Result<()> {
        let step = check_step::<F>(step)?;
        let start = match (self.table.last(), self.frames.last()) {
            (Some(t), Some(f)) => t.saturating_add(f.step() as i32),
            _ => 0,
        };
        let mut f = F::default();
        f.devaluate(value);
        f.set_step(step);
        self.frames.push(f);
        self.table.push(start);
        Ok(())
    }

    pub fn swap_endian(&mut self) {
        self.frames.iter_mut().for_each(CodecFrame::swap_endian);
    }
}

fn check_step<F: CodecFrame>(step: i64) -> Result<u32> {
    let valid = if F::IMPLICIT {
        step == 1
    } else {
        step >= 0 && step <= i64::from(F::MAX_STEP)
    };
    if valid {
        Ok(step as u32)
    } else {
        Err(Error::FrameOutOfRange {
            kind: F::KIND,
            step,
        })
    }
}

macro_rules! codec_set {
    ($($name:ident),+ $(,)?) => {
        /// Codec owned by a track, one variant per storage format.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Codec {
            $($name(Buffer<$name>),)+
        }

        impl Codec {
            /// Empty codec of `kind`, `None` for [`CodecKind::None`].
            pub fn new(kind: CodecKind) -> Option<Self> {
                match kind {
                    $(CodecKind::$name => Some(Codec::$name(Buffer::new())),)+
                    CodecKind::None => None,
                }
            }

            pub fn from_keys(kind: CodecKind, keys: &[(i32, Vector)]) -> Result<Option<Self>> {
                match kind {
                    $(CodecKind::$name => Buffer::from_keys(keys).map(|b| Some(Codec::$name(b))),)+
                    CodecKind::None => Ok(None),
                }
            }

            pub(crate) fn parse(kind: CodecKind, bytes: &[u8], swap: bool) -> Result<Option<Self>> {
                match kind {
                    $(CodecKind::$name => Buffer::parse(bytes, swap).map(|b| Some(Codec::$name(b))),)+
                    CodecKind::None => Ok(None),
                }
            }

            pub fn kind(&self) -> CodecKind {
                match self {
                    $(Codec::$name(_) => CodecKind::$name,)+
                }
            }

            pub(crate) fn write(&self, w: &mut BinWriter) -> Result<()> {
                match self {
                    $(Codec::$name(b) => b.write(w),)+
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Codec::$name(b) => b.len(),)+
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn byte_size(&self) -> usize {
                match self {
                    $(Codec::$name(b) => b.byte_size(),)+
                }
            }

            pub fn frame(&self, i: usize) -> Option<i32> {
                match self {
                    $(Codec::$name(b) => b.frame(i),)+
                }
            }

            pub fn evaluate(&self, i: usize) -> Option<Vector> {
                match self {
                    $(Codec::$name(b) => b.evaluate(i),)+
                }
            }

            pub fn devaluate(&mut self, i: usize, value: Vector) -> Result<()> {
                match self {
                    $(Codec::$name(b) => b.devaluate(i, value),)+
                }
            }

            pub fn interpolate(&self, i: usize, delta: f32, bounds: &MinMax) -> Option<Vector> {
                match self {
                    $(Codec::$name(b) => b.interpolate(i, delta, bounds),)+
                }
            }

            pub fn set_step(&mut self, i: usize, step: i64) -> Result<()> {
                match self {
                    $(Codec::$name(b) => b.set_step(i, step),)+
                }
            }

            pub fn push(&mut self, value: Vector, step: i64) -> Result<()> {
                match self {
                    $(Codec::$name(b) => b.push(value, step),)+
                }
            }

            pub fn swap_endian(&mut self) {
                match self {
                    $(Codec::$name(b) => b.swap_endian(),)+
                }
            }
        }
    };
}

codec_set!(
    SingleVector3,
    StepRotationQuat3,
    LinearVector3,
    HermiteVector3,
    SphericalRotation,
    BiLinearVector3_16bit,
    BiLinearVector3_8bit,
    LinearRotationQuat4_14bit,
    BiLinearRotationQuat4_7bit,
    BiLinearRotationQuat4_9bit,
    BiLinearRotationQuat4_11bit,
    BiLinearRotationQuatXW_14bit,
    BiLinearRotationQuatYW_14bit,
    BiLinearRotationQuatZW_14bit,
);

impl Codec {
    pub fn is_cubic(&self) -> bool {
        matches!(self, Codec::HermiteVector3(_))
    }

    /// In and out tangents of keyframe `i`, only for Hermite data.
    pub fn tangents(&self, i: usize) -> Option<(Vector, Vector)> {
        match self {
            Codec::HermiteVector3(b) => b.frames().get(i).map(HermiteVector3::tangents),
            _ => None,
        }
    }
}
