// Copyright 2024. The Pebble Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Consensus binary encoding.
//!
//! The wire format every node must agree on, byte for byte: varints for integers, raw bytes for
//! hashes, keys and signatures, a count-prefixed list for vectors. Structural errors surface as
//! `io::Error` with `InvalidData` and never touch chain state.

use std::io::{self, Read, Write};

use integer_encoding::{VarIntReader, VarIntWriter};

/// Upper bound on any decoded list length. Prevents memory exhaustion from a malformed blob
/// before the semantic size limits kick in.
pub const MAX_DECODED_VEC_LEN: u64 = 100_000;

pub trait ConsensusEncoding {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error>;

    /// Serializes to a fresh byte vector.
    fn to_consensus_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail
        self.consensus_encode(&mut buf).expect("writing to Vec<u8> is infallible");
        buf
    }
}

pub trait ConsensusDecoding: Sized {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error>;

    /// Deserializes from a blob, rejecting trailing bytes.
    fn from_consensus_bytes(bytes: &[u8]) -> Result<Self, io::Error> {
        let mut cursor = io::Cursor::new(bytes);
        let value = Self::consensus_decode(&mut cursor)?;
        if cursor.position() != bytes.len() as u64 {
            return Err(invalid_data("trailing bytes after decoded object"));
        }
        Ok(value)
    }
}

pub fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> Result<(), io::Error> {
    writer.write_varint(value)?;
    Ok(())
}

pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64, io::Error> {
    reader.read_varint::<u64>()
}

pub fn read_vec_len<R: Read>(reader: &mut R) -> Result<usize, io::Error> {
    let len = read_varint(reader)?;
    if len > MAX_DECODED_VEC_LEN {
        return Err(invalid_data("decoded vector length exceeds sanity limit"));
    }
    Ok(len as usize)
}

pub fn write_fixed_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), io::Error> {
    writer.write_all(bytes)
}

pub fn read_fixed_bytes<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N], io::Error> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_byte_vec<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), io::Error> {
    write_varint(writer, bytes.len() as u64)?;
    writer.write_all(bytes)
}

pub fn read_byte_vec<R: Read>(reader: &mut R) -> Result<Vec<u8>, io::Error> {
    let len = read_vec_len(reader)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            let mut cursor = io::Cursor::new(buf.as_slice());
            assert_eq!(read_varint(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn oversize_vec_len_is_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, MAX_DECODED_VEC_LEN + 1).unwrap();
        let mut cursor = io::Cursor::new(buf.as_slice());
        assert!(read_vec_len(&mut cursor).is_err());
    }

    #[test]
    fn byte_vec_round_trip() {
        let data = vec![1u8, 2, 3, 4, 5];
        let mut buf = Vec::new();
        write_byte_vec(&mut buf, &data).unwrap();
        let mut cursor = io::Cursor::new(buf.as_slice());
        assert_eq!(read_byte_vec(&mut cursor).unwrap(), data);
    }
}
