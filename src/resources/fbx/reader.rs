//! Binary FBX record reader.
//!
//! A binary FBX file is a 27 byte header followed by a list of node records.
//! Each record carries its own end offset, a list of typed properties and an
//! optional nested record list that is terminated by an all-zero record. From
//! version 7500 on the three record header fields are 64 bits wide.

use std::io::Read;

use flate2::read::ZlibDecoder;

use super::FbxError;

pub const MAGIC: &[u8] = b"Kaydara FBX Binary  \0";
const HEADER_LEN: usize = 27;
const MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
    String(String),
    Raw(Vec<u8>),
}

impl Property {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::Bool(v) => Some(v as i64),
            Property::I16(v) => Some(v as i64),
            Property::I32(v) => Some(v as i64),
            Property::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::F32(v) => Some(v as f64),
            Property::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Property::Raw(b) => Some(b),
            Property::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Any numeric array widened to `f64`.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Property::F64Array(v) => Some(v.clone()),
            Property::F32Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Property::I32Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Property::I64Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    /// Any integer array widened to `i64`.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            Property::I64Array(v) => Some(v.clone()),
            Property::I32Array(v) => Some(v.iter().map(|&x| x as i64).collect()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FbxNode {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<FbxNode>,
}

impl FbxNode {
    pub fn child(&self, name: &str) -> Option<&FbxNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FbxNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn prop(&self, idx: usize) -> Option<&Property> {
        self.properties.get(idx)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Document {
    pub version: u32,
    pub nodes: Vec<FbxNode>,
}

impl Document {
    pub fn node(&self, name: &str) -> Option<&FbxNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

pub fn read_document(bytes: &[u8]) -> Result<Document, FbxError> {
    if !bytes.starts_with(MAGIC) {
        return Err(FbxError::BadMagic);
    }
    let mut reader = Reader::new(bytes);
    reader.pos = MAGIC.len() + 2;
    let version = reader.u32()?;
    if !(7000..8000).contains(&version) {
        return Err(FbxError::UnsupportedVersion(version));
    }
    debug_assert_eq!(reader.pos, HEADER_LEN);
    reader.wide = version >= 7500;

    let mut nodes = Vec::new();
    while reader.remaining() >= reader.record_header_len() {
        match reader.node(0)? {
            Some(node) => nodes.push(node),
            None => break,
        }
    }
    Ok(Document { version, nodes })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    wide: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            wide: false,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn record_header_len(&self) -> usize {
        if self.wide { 25 } else { 13 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FbxError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(FbxError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FbxError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FbxError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, FbxError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// A record header field: 32 bits before 7500, 64 bits after.
    fn offset(&mut self) -> Result<u64, FbxError> {
        if self.wide {
            Ok(u64::from_le_bytes(self.array()?))
        } else {
            Ok(self.u32()? as u64)
        }
    }

    /// Reads one record. `None` marks the null record closing a list.
    fn node(&mut self, depth: usize) -> Result<Option<FbxNode>, FbxError> {
        if depth > MAX_DEPTH {
            return Err(FbxError::TooDeep);
        }
        let start = self.pos;
        let end_offset = self.offset()?;
        let num_properties = self.offset()?;
        let _property_list_len = self.offset()?;
        let name_len = self.u8()? as usize;
        if end_offset == 0 {
            return Ok(None);
        }
        let end = usize::try_from(end_offset)
            .ok()
            .filter(|&end| end > start && end <= self.bytes.len())
            .ok_or(FbxError::BadOffset {
                offset: start,
                end: end_offset,
            })?;
        let name = String::from_utf8_lossy(self.take(name_len)?).into_owned();

        let mut properties = Vec::new();
        for _ in 0..num_properties {
            properties.push(self.property()?);
        }

        let mut children = Vec::new();
        while self.pos < end {
            match self.node(depth + 1)? {
                Some(child) => children.push(child),
                None => break,
            }
        }
        if self.pos > end {
            return Err(FbxError::BadOffset {
                offset: start,
                end: end_offset,
            });
        }
        self.pos = end;

        Ok(Some(FbxNode {
            name,
            properties,
            children,
        }))
    }

    fn property(&mut self) -> Result<Property, FbxError> {
        let offset = self.pos;
        let type_code = self.u8()?;
        let property = match type_code {
            b'C' => Property::Bool(self.u8()? != 0),
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'S' => {
                let len = self.u32()? as usize;
                Property::String(String::from_utf8_lossy(self.take(len)?).into_owned())
            }
            b'R' => {
                let len = self.u32()? as usize;
                Property::Raw(self.take(len)?.to_vec())
            }
            b'f' => Property::F32Array(self.array_property(4, |c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))?),
            b'd' => Property::F64Array(self.array_property(8, |c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })?),
            b'i' => Property::I32Array(self.array_property(4, |c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))?),
            b'l' => Property::I64Array(self.array_property(8, |c| {
                i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })?),
            b'b' => Property::BoolArray(self.array_property(1, |c| c[0] != 0)?),
            other => {
                return Err(FbxError::UnknownProperty {
                    type_code: other,
                    offset,
                });
            }
        };
        Ok(property)
    }

    fn array_property<T>(&mut self, width: usize, decode: impl Fn(&[u8]) -> T) -> Result<Vec<T>, FbxError> {
        let offset = self.pos;
        let len = self.u32()? as usize;
        let encoding = self.u32()?;
        let compressed_len = self.u32()? as usize;
        let payload = self.take(compressed_len)?;
        let expected = len
            .checked_mul(width)
            .ok_or(FbxError::UnexpectedEof { offset })?;

        let data = match encoding {
            0 => std::borrow::Cow::Borrowed(payload),
            1 => {
                // The declared length is untrusted; let the output grow with
                // what the stream actually inflates to.
                let mut out = Vec::new();
                ZlibDecoder::new(payload)
                    .take(expected as u64)
                    .read_to_end(&mut out)
                    .map_err(|e| FbxError::Decompress {
                        offset,
                        reason: e.to_string(),
                    })?;
                std::borrow::Cow::Owned(out)
            }
            other => return Err(FbxError::UnknownEncoding { encoding: other, offset }),
        };
        if data.len() < expected {
            return Err(FbxError::UnexpectedEof { offset });
        }
        Ok(data[..expected].chunks_exact(width).map(decode).collect())
    }
}
