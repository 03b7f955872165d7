use nom::number::complete::*;
use nom::number::Endianness;
use nom::IResult;

use crate::Vector;

macro_rules! endian_parser {
    ($name:ident, $ty:ty, $le:ident, $be:ident) => {
        pub(crate) fn $name(endian: Endianness) -> impl Fn(&[u8]) -> IResult<&[u8], $ty> {
            move |i: &[u8]| match endian {
                Endianness::Big => $be(i),
                _ => $le(i),
            }
        }
    };
}

endian_parser!(u16, u16, le_u16, be_u16);
endian_parser!(u32, u32, le_u32, be_u32);
endian_parser!(u64, u64, le_u64, be_u64);
endian_parser!(i32, i32, le_i32, be_i32);
endian_parser!(f32, f32, le_f32, be_f32);

pub(crate) fn vector(endian: Endianness) -> impl Fn(&[u8]) -> IResult<&[u8], Vector> {
    move |i: &[u8]| {
        let (i, x) = f32(endian)(i)?;
        let (i, y) = f32(endian)(i)?;
        let (i, z) = f32(endian)(i)?;
        let (i, w) = f32(endian)(i)?;
        Ok((i, Vector::new(x, y, z, w)))
    }
}

/// Collects words until the first one that differs from `v`.
pub(crate) fn skip_while_eq<I, O, F>(f: F, v: O) -> impl Fn(I) -> IResult<I, Option<O>>
where
    I: Clone,
    O: PartialEq,
    F: Fn(I) -> IResult<I, O>,
{
    move |i: I| {
        let mut i = i;
        loop {
            match f(i.clone()) {
                Ok((i1, val)) => {
                    i = i1;
                    if val != v {
                        return Ok((i, Some(val)));
                    }
                }
                Err(nom::Err::Error(_)) => return Ok((i, None)),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn endian_dispatch() {
        let i = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(u32(Endianness::Little)(&i[..]).unwrap().1, 0x0403_0201);
        assert_eq!(u32(Endianness::Big)(&i[..]).unwrap().1, 0x0102_0304);
        assert_eq!(u16(Endianness::Big)(&i[..]).unwrap().1, 0x0102);
    }

    #[test]
    fn first_nonzero_word() {
        let buf = [0u8, 0, 0, 0, 0, 0, 0, 0, 0x30, 0, 0, 0];
        let (_, v) = skip_while_eq(u32(Endianness::Little), 0)(&buf[..]).unwrap();
        assert_eq!(v, Some(0x30));
        let (_, v) = skip_while_eq(u32(Endianness::Little), 0)(&buf[..8]).unwrap();
        assert_eq!(v, None);
    }
}
