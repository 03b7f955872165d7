use cookie_factory::bytes::{le_f32, le_u16, le_u32, le_u8};
use cookie_factory::combinator::slice;
use cookie_factory::gen_simple;
use cookie_factory::sequence::tuple;
use nom::bytes::complete::take;
use nom::number::complete::{le_f32 as f32_le, le_u16 as u16_le, le_u32 as u32_le, le_u8 as u8_le};
use nom::IResult;

use super::*;

pub(super) fn parse_xyz(i: &[u8]) -> IResult<&[u8], [f32; 3]> {
    let (i, x) = f32_le(i)?;
    let (i, y) = f32_le(i)?;
    let (i, z) = f32_le(i)?;
    Ok((i, [x, y, z]))
}

pub(super) fn write_xyz(data: &[f32; 3], out: &mut Vec<u8>) -> Result<()> {
    gen_simple(tuple((le_f32(data[0]), le_f32(data[1]), le_f32(data[2]))), out)?;
    Ok(())
}

fn xyz1(data: &[f32; 3]) -> Vector {
    Vector::new(data[0], data[1], data[2], 1.0)
}

/// Full precision vector, one per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleVector3 {
    pub data: [f32; 3],
}

impl CodecFrame for SingleVector3 {
    const KIND: CodecKind = CodecKind::SingleVector3;
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
        xyz1(&self.data)
    }

    fn devaluate(&mut self, value: Vector) {
        self.data = [value.x, value.y, value.z];
    }

    fn step(&self) -> u32 {
        1
    }

    fn set_step(&mut self, _step: u32) {}

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        lerp(self.evaluate(), right.evaluate(), delta)
    }

    fn swap_endian(&mut self) {
        self.data.iter_mut().for_each(|v| *v = swap_f32(*v));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearVector3 {
    pub data: [f32; 3],
    pub step: u32,
}

impl CodecFrame for LinearVector3 {
    const KIND: CodecKind = CodecKind::LinearVector3;
    const MAX_STEP: u32 = i32::MAX as u32;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, data) = parse_xyz(i)?;
        let (i, step) = u32_le(i)?;
        Ok((i, Self { data, step }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        write_xyz(&self.data, out)?;
        gen_simple(le_u32(self.step), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        16
    }

    fn evaluate(&self) -> Vector {
        xyz1(&self.data)
    }

    fn devaluate(&mut self, value: Vector) {
        self.data = [value.x, value.y, value.z];
    }

    fn step(&self) -> u32 {
        self.step
    }

    fn set_step(&mut self, step: u32) {
        self.step = step;
    }

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        lerp(self.evaluate(), right.evaluate(), delta)
    }

    fn swap_endian(&mut self) {
        self.data.iter_mut().for_each(|v| *v = swap_f32(*v));
        self.step = self.step.swap_bytes();
    }
}

/// Cubic keyframe with optional per axis tangents.
///
/// Flag bits 0 to 2 mark stored in tangents for x, y, z and bits 3 to 5 the
/// out tangents. Missing tangents evaluate as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HermiteVector3 {
    pub step: u16,
    pub data: [f32; 3],
    pub in_tangent: [Option<f32>; 3],
    pub out_tangent: [Option<f32>; 3],
}

impl HermiteVector3 {
    const HEADER: usize = 16;

    pub fn flags(&self) -> u8 {
        self.in_tangent
            .iter()
            .chain(self.out_tangent.iter())
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .fold(0, |flags, (bit, _)| flags | 1 << bit)
    }

    fn stored_tangents(&self) -> impl Iterator<Item = f32> + '_ {
        self.in_tangent
            .iter()
            .chain(self.out_tangent.iter())
            .filter_map(|t| *t)
    }

    pub fn tangents(&self) -> (Vector, Vector) {
        let t = |v: &[Option<f32>; 3]| {
            Vector::new(
                v[0].unwrap_or(0.0),
                v[1].unwrap_or(0.0),
                v[2].unwrap_or(0.0),
                0.0,
            )
        };
        (t(&self.in_tangent), t(&self.out_tangent))
    }
}

impl CodecFrame for HermiteVector3 {
    const KIND: CodecKind = CodecKind::HermiteVector3;
    const MAX_STEP: u32 = i16::MAX as u32;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (_, size) = u8_le(i)?;
        let (rest, body) = take(size as usize)(i)?;
        let (b, _) = u8_le(body)?;
        let (b, flags) = u8_le(b)?;
        let (b, step) = u16_le(b)?;
        let (mut b, data) = parse_xyz(b)?;
        let mut tangents = [None; 6];
        for (bit, t) in tangents.iter_mut().enumerate() {
            if flags & (1 << bit) != 0 {
                let (b1, v) = f32_le(b)?;
                b = b1;
                *t = Some(v);
            }
        }
        Ok((
            rest,
            Self {
                step,
                data,
                in_tangent: [tangents[0], tangents[1], tangents[2]],
                out_tangent: [tangents[3], tangents[4], tangents[5]],
            },
        ))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(
            tuple((le_u8(self.size() as u8), le_u8(self.flags()), le_u16(self.step))),
            &mut *out,
        )?;
        write_xyz(&self.data, out)?;
        let tangents: Vec<u8> = self.stored_tangents().flat_map(|t| t.to_le_bytes().to_vec()).collect();
        gen_simple(slice(tangents), out)?;
        Ok(())
    }

    fn size(&self) -> usize {
        Self::HEADER + 4 * self.stored_tangents().count()
    }

    fn evaluate(&self) -> Vector {
        xyz1(&self.data)
    }

    fn devaluate(&mut self, value: Vector) {
        self.data = [value.x, value.y, value.z];
    }

    fn step(&self) -> u32 {
        u32::from(self.step)
    }

    fn set_step(&mut self, step: u32) {
        self.step = step as u16;
    }

    fn interpolate(&self, right: &Self, delta: f32, _bounds: &MinMax) -> Vector {
        let (start_tangent, end_tangent) = self.tangents();
        let d2 = delta * delta;
        let d3 = d2 * delta;
        let h1 = 2.0 * d3 - 3.0 * d2 + 1.0;
        let h2 = -2.0 * d3 + 3.0 * d2;
        let h3 = d3 - 2.0 * d2 + delta;
        let h4 = d3 - d2;
        self.evaluate() * h1 + right.evaluate() * h2 + start_tangent * h3 + end_tangent * h4
    }

    fn swap_endian(&mut self) {
        self.step = self.step.swap_bytes();
        self.data.iter_mut().for_each(|v| *v = swap_f32(*v));
        for t in self.in_tangent.iter_mut().chain(self.out_tangent.iter_mut()) {
            if let Some(v) = t {
                *v = swap_f32(*v);
            }
        }
    }
}

/// Normalized vector, 16 bits per component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiLinearVector3_16bit {
    pub data: [u16; 3],
    pub step: u16,
}

impl BiLinearVector3_16bit {
    const MASK: u64 = 0xffff;
}

impl CodecFrame for BiLinearVector3_16bit {
    const KIND: CodecKind = CodecKind::BiLinearVector3_16bit;
    const MAX_STEP: u32 = 0xffff;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, x) = u16_le(i)?;
        let (i, y) = u16_le(i)?;
        let (i, z) = u16_le(i)?;
        let (i, step) = u16_le(i)?;
        Ok((i, Self { data: [x, y, z], step }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(
            tuple((
                le_u16(self.data[0]),
                le_u16(self.data[1]),
                le_u16(self.data[2]),
                le_u16(self.step),
            )),
            out,
        )?;
        Ok(())
    }

    fn size(&self) -> usize {
        8
    }

    fn evaluate(&self) -> Vector {
        let m = Self::MASK as f32;
        Vector::new(
            f32::from(self.data[0]) / m,
            f32::from(self.data[1]) / m,
            f32::from(self.data[2]) / m,
            1.0,
        )
    }

    fn devaluate(&mut self, value: Vector) {
        let m = Self::MASK as f32;
        let q = |v: f32| quantize(v, m, Self::MASK) as u16;
        self.data = [q(value.x), q(value.y), q(value.z)];
    }

    fn step(&self) -> u32 {
        u32::from(self.step)
    }

    fn set_step(&mut self, step: u32) {
        self.step = step as u16;
    }

    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
        blerp(self.evaluate(), right.evaluate(), bounds, delta)
    }

    fn swap_endian(&mut self) {
        self.data.iter_mut().for_each(|v| *v = v.swap_bytes());
        self.step = self.step.swap_bytes();
    }
}

/// Normalized vector, 8 bits per component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiLinearVector3_8bit {
    pub data: [u8; 3],
    pub step: u8,
}

impl BiLinearVector3_8bit {
    const MASK: u64 = 0xff;
}

impl CodecFrame for BiLinearVector3_8bit {
    const KIND: CodecKind = CodecKind::BiLinearVector3_8bit;
    const MAX_STEP: u32 = 0xff;

    fn parse(i: &[u8]) -> IResult<&[u8], Self> {
        let (i, x) = u8_le(i)?;
        let (i, y) = u8_le(i)?;
        let (i, z) = u8_le(i)?;
        let (i, step) = u8_le(i)?;
        Ok((i, Self { data: [x, y, z], step }))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        gen_simple(
            slice([self.data[0], self.data[1], self.data[2], self.step]),
            out,
        )?;
        Ok(())
    }

    fn size(&self) -> usize {
        4
    }

    fn evaluate(&self) -> Vector {
        let m = Self::MASK as f32;
        Vector::new(
            f32::from(self.data[0]) / m,
            f32::from(self.data[1]) / m,
            f32::from(self.data[2]) / m,
            1.0,
        )
    }

    fn devaluate(&mut self, value: Vector) {
        let m = Self::MASK as f32;
        let q = |v: f32| quantize(v, m, Self::MASK) as u8;
        self.data = [q(value.x), q(value.y), q(value.z)];
    }

    fn step(&self) -> u32 {
        u32::from(self.step)
    }

    fn set_step(&mut self, step: u32) {
        self.step = step as u8;
    }

    fn interpolate(&self, right: &Self, delta: f32, bounds: &MinMax) -> Vector {
        blerp(self.evaluate(), right.evaluate(), bounds, delta)
    }

    fn swap_endian(&mut self) {}
}
