use std::f32::consts::FRAC_PI_2;

use cookie_factory::bytes::{le_u16, le_u32, le_u64};
use cookie_factory::combinator::slice;
use cookie_factory::gen_simple;
use cookie_factory::sequence::tuple;
use nom::bytes::complete::take;
use nom::number::complete::{le_u16 as u16_le, le_u32 as u32_le, le_u64 as u64_le};
use nom::IResult;

use super::vector::{parse_xyz, write_xyz};
use super::*;

/// Quaternion with the w component rebuilt from the unit constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRotationQuat3 {
    pub data: [f32; 3],
}

impl CodecFrame for StepRotationQuat3 {
    const KIND: CodecKind = CodecKind::StepRotationQuat3;
    const IMPLICIT: bool = true;
    const MAX_STEP: u32 = 1;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, data) = parse_xyz(i)?;
        Ok((i, Self { data }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        write_xyz(&self.data, out)
    }

    fn size(&self) -> usize {
        12
    }

    fn evaluate(&self) -> Vector {
        let [x, y, z] = self.data;
        let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
        Vector::new(x, y, z, w)
    }

    fn devaluate(&mut self, value: Vector) {
        let q = if value.w < 0.0 { -value } else { value };
        self.data = [q.x, q.y, q.z];
    }

    fn step(&self) -> u32 {
        1
    }

    fn set_step(&mut self, _step: u32) {}

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        slerp(self.evaluate(), right.evaluate(), delta)
    }

    fn swap_endian(&mut self) {
        self.data.iter_mut().for_each(|v| *v = swap_f32(*v));
    }
}

fn packed_step(data: u64, shift: u32, mask: u64) -> u32 {
    ((data >> shift) & mask) as u32
}

fn with_step(data: u64, step: u32, shift: u32, mask: u64) -> u64 {
    (data & !(mask << shift)) | ((u64::from(step) & mask) << shift)
}

/// Quaternion as two angles and a w magnitude, signs kept separately.
///
/// Bits 0-16 hold theta, 17-33 phi, 34-52 the w code, 53-55 the signs of
/// x, y and z, and 56-63 the frame step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SphericalRotation {
    pub data: u64,
}

impl SphericalRotation {
    const ANGLE_MASK: u64 = 0x1_ffff;
    const W_MASK: u64 = 0x7_ffff;
    const DATA_FIELD: u64 = (1 << 56) - 1;

    fn angle_scale() -> f32 {
        Self::ANGLE_MASK as f32 / FRAC_PI_2
    }
}

impl CodecFrame for SphericalRotation {
    const KIND: CodecKind = CodecKind::SphericalRotation;
    const MAX_STEP: u32 = 0xff;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, data) = u64_le(i)?;
        Ok((i, Self { data }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(le_u64(self.data), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        8
    }

    fn evaluate(&self) -> Vector {
        let scale = Self::angle_scale();
        let theta = (self.data & Self::ANGLE_MASK) as f32 / scale;
        let phi = ((self.data >> 17) & Self::ANGLE_MASK) as f32 / scale;
        let w_code = ((self.data >> 34) & Self::W_MASK) as f32 / Self::W_MASK as f32;

        let w = 1.0 - w_code * w_code;
        let magnitude = (1.0 - w * w).max(0.0).sqrt();
        let mut out = Vector::new(
            theta.sin() * phi.cos() * magnitude,
            phi.sin() * magnitude,
            theta.cos() * phi.cos() * magnitude,
            w,
        );
        if self.data >> 53 & 1 != 0 {
            out.x = -out.x;
        }
        if self.data >> 54 & 1 != 0 {
            out.y = -out.y;
        }
        if self.data >> 55 & 1 != 0 {
            out.z = -out.z;
        }
        out
    }

    fn devaluate(&mut self, value: Vector) {
        let mut q = if value.w < 0.0 { -value } else { value };
        let mut data = self.data & !Self::DATA_FIELD;
        if q.x < 0.0 {
            q.x = -q.x;
            data |= 1 << 53;
        }
        if q.y < 0.0 {
            q.y = -q.y;
            data |= 1 << 54;
        }
        if q.z < 0.0 {
            q.z = -q.z;
            data |= 1 << 55;
        }

        let r = (1.0 - q.w).max(0.0).sqrt();
        let magnitude = (1.0 - q.w * q.w).max(0.0).sqrt();
        let magnitude = if magnitude < 0.001 { 1.0 } else { magnitude };
        let phi = (q.y / magnitude).max(-1.0).min(1.0).asin();
        let theta = (q.x / (phi.cos() * magnitude)).max(-1.0).min(1.0).asin();

        let scale = Self::angle_scale();
        data |= quantize(theta, scale, Self::ANGLE_MASK);
        data |= quantize(phi, scale, Self::ANGLE_MASK) << 17;
        data |= quantize(r, Self::W_MASK as f32, Self::W_MASK) << 34;
        self.data = data;
    }

    fn step(&self) -> u32 {
        packed_step(self.data, 56, 0xff)
    }

    fn set_step(&mut self, step: u32) {
        self.data = with_step(self.data, step, 56, 0xff);
    }

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        slerp(self.evaluate(), right.evaluate(), delta)
    }

    fn swap_endian(&mut self) {
        self.data = self.data.swap_bytes();
    }
}

/// Four signed 14-bit components covering `[-2, 2]`.
///
/// x sits at bit 42, y at 28, z at 14 and w at 0; bits 56-63 hold the step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearRotationQuat4_14bit {
    pub data: u64,
}

impl LinearRotationQuat4_14bit {
    const MASK: u64 = 0x3fff;
    const DATA_FIELD: u64 = (1 << 56) - 1;

    fn scale() -> f32 {
        Self::MASK as f32 / 4.0
    }

    fn decode(code: u64) -> f32 {
        let code = code & Self::MASK;
        if code > Self::MASK / 2 {
            -((Self::MASK - code) as f32) / Self::scale()
        } else {
            code as f32 / Self::scale()
        }
    }

    fn encode(value: f32) -> u64 {
        let half = Self::MASK / 2;
        if value < 0.0 {
            Self::MASK - quantize(-value, Self::scale(), half)
        } else {
            quantize(value, Self::scale(), half)
        }
    }
}

impl CodecFrame for LinearRotationQuat4_14bit {
    const KIND: CodecKind = CodecKind::LinearRotationQuat4_14bit;
    const MAX_STEP: u32 = 0xff;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, data) = u64_le(i)?;
        Ok((i, Self { data }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(le_u64(self.data), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        8
    }

    fn evaluate(&self) -> Vector {
        Vector::new(
            Self::decode(self.data >> 42),
            Self::decode(self.data >> 28),
            Self::decode(self.data >> 14),
            Self::decode(self.data),
        )
    }

    fn devaluate(&mut self, value: Vector) {
        self.data = (self.data & !Self::DATA_FIELD)
            | Self::encode(value.x) << 42
            | Self::encode(value.y) << 28
            | Self::encode(value.z) << 14
            | Self::encode(value.w);
    }

    fn step(&self) -> u32 {
        packed_step(self.data, 56, 0xff)
    }

    fn set_step(&mut self, step: u32) {
        self.data = with_step(self.data, step, 56, 0xff);
    }

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        slerp(self.evaluate(), right.evaluate(), delta)
    }

    fn swap_endian(&mut self) {
        self.data = self.data.swap_bytes();
    }
}

/// Four normalized 7-bit components, x at bit 21 down to w at bit 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiLinearRotationQuat4_7bit {
    pub data: u32,
}

impl BiLinearRotationQuat4_7bit {
    const MASK: u64 = 0x7f;
}

impl CodecFrame for BiLinearRotationQuat4_7bit {
    const KIND: CodecKind = CodecKind::BiLinearRotationQuat4_7bit;
    const MAX_STEP: u32 = 0xf;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, data) = u32_le(i)?;
        Ok((i, Self { data }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(le_u32(self.data), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        4
    }

    fn evaluate(&self) -> Vector {
        let d = u64::from(self.data);
        let c = |shift: u32| ((d >> shift) & Self::MASK) as f32 / Self::MASK as f32;
        Vector::new(c(21), c(14), c(7), c(0))
    }

    fn devaluate(&mut self, value: Vector) {
        let m = Self::MASK as f32;
        let q = |v: f32| quantize(v, m, Self::MASK);
        let packed = q(value.x) << 21 | q(value.y) << 14 | q(value.z) << 7 | q(value.w);
        self.data = (self.data & 0xf000_0000) | packed as u32;
    }

    fn step(&self) -> u32 {
        packed_step(u64::from(self.data), 28, 0xf)
    }

    fn set_step(&mut self, step: u32) {
        self.data = with_step(u64::from(self.data), step, 28, 0xf) as u32;
    }

    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
        bslerp(self.evaluate(), right.evaluate(), bounds, delta)
    }

    fn swap_endian(&mut self) {
        self.data = self.data.swap_bytes();
    }
}

macro_rules! axis_w_14bit {
    ($name:ident, $axis:ident) => {
        /// One axis and w at 14 bits each, the other axes are zero.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub data: u32,
        }

        impl CodecFrame for $name {
            const KIND: CodecKind = CodecKind::$name;
            const MAX_STEP: u32 = 0xf;

            fn parse(i: &[u8]) -> IResult<&[u8], Self> {
                let (i, data) = u32_le(i)?;
                Ok((i, Self { data }))
            }

            fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
                gen_simple(le_u32(self.data), out)?;
                Ok(())
            }

            fn size(&self) -> usize {
                4
            }

            fn evaluate(&self) -> Vector {
                let m = AXIS_MASK as f32;
                let mut out = Vector::new(0.0, 0.0, 0.0, 0.0);
                out.$axis = (self.data & AXIS_MASK as u32) as f32 / m;
                out.w = ((self.data >> 14) & AXIS_MASK as u32) as f32 / m;
                out
            }

            fn devaluate(&mut self, value: Vector) {
                let m = AXIS_MASK as f32;
                let packed = quantize(value.$axis, m, AXIS_MASK) | quantize(value.w, m, AXIS_MASK) << 14;
                self.data = (self.data & 0xf000_0000) | packed as u32;
            }

            fn step(&self) -> u32 {
                packed_step(u64::from(self.data), 28, 0xf)
            }

            fn set_step(&mut self, step: u32) {
                self.data = with_step(u64::from(self.data), step, 28, 0xf) as u32;
            }

            fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
                bslerp(self.evaluate(), right.evaluate(), bounds, delta)
            }

            fn swap_endian(&mut self) {
                self.data = self.data.swap_bytes();
            }
        }
    };
}

const AXIS_MASK: u64 = 0x3fff;

axis_w_14bit!(BiLinearRotationQuatXW_14bit, x);
axis_w_14bit!(BiLinearRotationQuatYW_14bit, y);
axis_w_14bit!(BiLinearRotationQuatZW_14bit, z);

/// Four normalized 11-bit components in three 16-bit words.
///
/// y and z straddle word boundaries, so their low bits are stored rotated
/// into the next word. Bits 44-47 hold the step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiLinearRotationQuat4_11bit {
    pub data: [u16; 3],
}

impl BiLinearRotationQuat4_11bit {
    const MASK: u64 = 0x7ff;
    const DATA_FIELD: u64 = 0xfff_ffff_ffff;

    fn raw(&self) -> u64 {
        u64::from(self.data[0]) | u64::from(self.data[1]) << 16 | u64::from(self.data[2]) << 32
    }

    fn set_raw(&mut self, r: u64) {
        self.data = [r as u16, (r >> 16) as u16, (r >> 32) as u16];
    }
}

impl CodecFrame for BiLinearRotationQuat4_11bit {
    const KIND: CodecKind = CodecKind::BiLinearRotationQuat4_11bit;
    const MAX_STEP: u32 = 0xf;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, a) = u16_le(i)?;
        let (i, b) = u16_le(i)?;
        let (i, c) = u16_le(i)?;
        Ok((i, Self { data: [a, b, c] }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(
            tuple((le_u16(self.data[0]), le_u16(self.data[1]), le_u16(self.data[2]))),
            out,
        )?;
        Ok(())
    }

    fn size(&self) -> usize {
        6
    }

    fn evaluate(&self) -> Vector {
        let r = self.raw();
        let x = r & Self::MASK;
        let y = ((r >> 11) << 6 | (r >> 16) & 0x3f) & Self::MASK;
        let z = ((r >> 22) << 1 | (r >> 32) & 1) & Self::MASK;
        let w = (r >> 33) & Self::MASK;
        let m = Self::MASK as f32;
        Vector::new(x as f32 / m, y as f32 / m, z as f32 / m, w as f32 / m)
    }

    fn devaluate(&mut self, value: Vector) {
        let m = Self::MASK as f32;
        let x = quantize(value.x, m, Self::MASK);
        let y = quantize(value.y, m, Self::MASK);
        let z = quantize(value.z, m, Self::MASK);
        let w = quantize(value.w, m, Self::MASK);
        let r = (self.raw() & !Self::DATA_FIELD)
            | x
            | (y >> 6 | (y & 0x3f) << 5) << 11
            | (z >> 1 | (z & 1) << 10) << 22
            | w << 33;
        self.set_raw(r);
    }

    fn step(&self) -> u32 {
        packed_step(self.raw(), 44, 0xf)
    }

    fn set_step(&mut self, step: u32) {
        let r = with_step(self.raw(), step, 44, 0xf);
        self.set_raw(r);
    }

    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
        bslerp(self.evaluate(), right.evaluate(), bounds, delta)
    }

    fn swap_endian(&mut self) {
        self.data.iter_mut().for_each(|v| *v = v.swap_bytes());
    }
}

/// Four normalized 9-bit components in five bytes, step in the top nibble.
///
/// Each component keeps its low bits rotated above its high bits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiLinearRotationQuat4_9bit {
    pub data: [u8; 5],
}

impl BiLinearRotationQuat4_9bit {
    const MASK: u64 = 0x1ff;
    const DATA_FIELD: u64 = 0xf_ffff_ffff;

    fn raw(&self) -> u64 {
        self.data
            .iter()
            .enumerate()
            .fold(0, |r, (i, b)| r | u64::from(*b) << (8 * i))
    }

    fn set_raw(&mut self, r: u64) {
        for (i, b) in self.data.iter_mut().enumerate() {
            *b = (r >> (8 * i)) as u8;
        }
    }
}

impl CodecFrame for BiLinearRotationQuat4_9bit {
    const KIND: CodecKind = CodecKind::BiLinearRotationQuat4_9bit;
    const MAX_STEP: u32 = 0xf;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, bytes) = take(5usize)(i)?;
        let mut data = [0; 5];
        data.copy_from_slice(bytes);
        Ok((i, Self { data }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(slice(self.data), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        5
    }

    fn evaluate(&self) -> Vector {
        let r = self.raw();
        let x = (r << 1 | (r >> 8) & 1) & Self::MASK;
        let y = ((r >> 9) << 2 | (r >> 16) & 3) & Self::MASK;
        let z = ((r >> 18) << 3 | (r >> 24) & 7) & Self::MASK;
        let w = ((r >> 27) << 4 | (r >> 32) & 0xf) & Self::MASK;
        let m = Self::MASK as f32;
        Vector::new(x as f32 / m, y as f32 / m, z as f32 / m, w as f32 / m)
    }

    fn devaluate(&mut self, value: Vector) {
        let m = Self::MASK as f32;
        let x = quantize(value.x, m, Self::MASK);
        let y = quantize(value.y, m, Self::MASK);
        let z = quantize(value.z, m, Self::MASK);
        let w = quantize(value.w, m, Self::MASK);
        let r = (self.raw() & !Self::DATA_FIELD)
            | (x >> 1 | (x & 1) << 8)
            | (y >> 2 | (y & 3) << 7) << 9
            | (z >> 3 | (z & 7) << 6) << 18
            | (w >> 4 | (w & 0xf) << 5) << 27;
        self.set_raw(r);
    }

    fn step(&self) -> u32 {
        u32::from(self.data[4] >> 4)
    }

    fn set_step(&mut self, step: u32) {
        self.data[4] = (self.data[4] & 0xf) | ((step as u8 & 0xf) << 4);
    }

    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
        bslerp(self.evaluate(), right.evaluate(), bounds, delta)
    }

    fn swap_endian(&mut self) {}
}
