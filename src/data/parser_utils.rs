//! Shared winnow-based readers for the MDL1 format.
//!
//! MDL1 has no offset tables: every structure is read front to back through a
//! [`ByteCursor`] that only moves forward. Each reader consumes exactly the
//! encoded width of its field and fails with [`LoadError::TruncatedInput`]
//! instead of reading past the end of the buffer.

use std::borrow::Cow;
use std::fmt;

use winnow::Parser;
use winnow::binary::{le_f32, le_i32, le_u8, le_u32};
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{LoadError, LoadResult};

/// Storage size of a decoded [`FixedString`], including the NUL terminator.
pub const FIXED_STRING_CAPACITY: usize = 64;

/// Hash a name into the stable 64-bit key used by material and entity lookups.
pub fn hash_name(name: &[u8]) -> u64 {
    xxh3_64(name)
}

/// A four character chunk tag such as `MDL1` or `MESH`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const MODEL: FourCC = FourCC(*b"MDL1");
    pub const MESH: FourCC = FourCC(*b"MESH");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

/// Three packed little-endian `f32`s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for glam::Vec3 {
    fn from(v: Vec3) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

/// Affine transform stored as three basis vectors plus a translation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mat4x3 {
    pub base_x: Vec3,
    pub base_y: Vec3,
    pub base_z: Vec3,
    pub translation: Vec3,
}

impl Mat4x3 {
    pub const IDENTITY: Mat4x3 = Mat4x3 {
        base_x: Vec3::new(1.0, 0.0, 0.0),
        base_y: Vec3::new(0.0, 1.0, 0.0),
        base_z: Vec3::new(0.0, 0.0, 1.0),
        translation: Vec3::new(0.0, 0.0, 0.0),
    };

    /// Expand to a column-major 4x4 matrix with an implicit `(0, 0, 0, 1)` row.
    pub fn to_mat4(&self) -> glam::Mat4 {
        glam::Mat4::from_cols(
            glam::Vec3::from(self.base_x).extend(0.0),
            glam::Vec3::from(self.base_y).extend(0.0),
            glam::Vec3::from(self.base_z).extend(0.0),
            glam::Vec3::from(self.translation).extend(1.0),
        )
    }
}

/// Length-prefixed string truncated into a fixed 64 byte buffer.
///
/// `declared_len` keeps the length found on disk so callers can tell when the
/// stored copy was cut short.
#[derive(Clone, PartialEq, Eq)]
pub struct FixedString {
    data: [u8; FIXED_STRING_CAPACITY],
    len: usize,
    declared_len: usize,
}

impl FixedString {
    /// Build from raw bytes, keeping at most `FIXED_STRING_CAPACITY - 1` of them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(FIXED_STRING_CAPACITY - 1);
        let mut data = [0u8; FIXED_STRING_CAPACITY];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len,
            declared_len: bytes.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    pub fn is_truncated(&self) -> bool {
        self.declared_len > self.len
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Stable hash of the stored (possibly truncated) bytes.
    pub fn hash(&self) -> u64 {
        hash_name(self.as_bytes())
    }
}

impl fmt::Display for FixedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for FixedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Forward-only reader over a loaded file.
///
/// Slices handed out by [`ByteCursor::take`] borrow the original buffer, so the
/// file bytes must stay alive for as long as anything decoded from them.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    input: &'a [u8],
    len: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            input: data,
            len: data.len(),
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.len - self.input.len()
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn parse_with<O, P>(&mut self, width: usize, mut parser: P) -> LoadResult<O>
    where
        P: Parser<&'a [u8], O, ErrMode<ContextError>>,
    {
        let offset = self.offset();
        let available = self.remaining();
        parser
            .parse_next(&mut self.input)
            .map_err(|_| LoadError::TruncatedInput {
                offset,
                needed: width,
                available,
            })
    }

    /// Borrow the next `count` bytes without copying them.
    pub fn take(&mut self, count: usize) -> LoadResult<&'a [u8]> {
        self.parse_with(count, take(count))
    }

    pub fn skip(&mut self, count: usize) -> LoadResult<()> {
        self.take(count).map(|_| ())
    }

    pub fn i32(&mut self) -> LoadResult<i32> {
        self.parse_with(4, le_i32)
    }

    pub fn u32(&mut self) -> LoadResult<u32> {
        self.parse_with(4, le_u32)
    }

    pub fn f32(&mut self) -> LoadResult<f32> {
        self.parse_with(4, le_f32)
    }

    pub fn u8(&mut self) -> LoadResult<u8> {
        self.parse_with(1, le_u8)
    }

    pub fn four_cc(&mut self) -> LoadResult<FourCC> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.take(4)?);
        Ok(FourCC(tag))
    }

    /// Read a tag and fail with `BadMagic` unless it equals `expected`.
    ///
    /// Only the four tag bytes are consumed on failure.
    pub fn expect_four_cc(&mut self, expected: FourCC) -> LoadResult<()> {
        let offset = self.offset();
        let got = self.four_cc()?;
        if got != expected {
            return Err(LoadError::BadMagic {
                offset,
                expected,
                got,
            });
        }
        Ok(())
    }

    /// Read an `i32` length followed by that many bytes.
    ///
    /// The cursor always advances by the declared length, even when the stored
    /// copy is truncated to fit the fixed buffer.
    pub fn fixed_string(&mut self) -> LoadResult<FixedString> {
        let offset = self.offset();
        let length = self.i32()?;
        if length < 0 {
            return Err(LoadError::InvalidLength { offset, length });
        }
        let bytes = self.take(length as usize)?;
        Ok(FixedString::from_bytes(bytes))
    }

    pub fn vec3(&mut self) -> LoadResult<Vec3> {
        let x = self.f32()?;
        let y = self.f32()?;
        let z = self.f32()?;
        Ok(Vec3 { x, y, z })
    }

    pub fn mat4x3(&mut self) -> LoadResult<Mat4x3> {
        let base_x = self.vec3()?;
        let base_y = self.vec3()?;
        let base_z = self.vec3()?;
        let translation = self.vec3()?;
        Ok(Mat4x3 {
            base_x,
            base_y,
            base_z,
            translation,
        })
    }
}
