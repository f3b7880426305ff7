use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use crate::codec::{self, CodecError};

pub const BLOCK_MAGIC: u32 = 0xFEEDA1E5;
pub const BLOCK_HEADER_SIZE: usize = 16;
/// Largest uncompressed payload a single block may carry (512 KiB).
pub const MAX_BLOCK_SIZE: usize = 0x80000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub magic: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub padding: u32,
}

impl BlockHeader {
    pub fn new(compressed_size: u32, uncompressed_size: u32) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            compressed_size,
            uncompressed_size,
            padding: 0,
        }
    }
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u32::<LittleEndian>(self.padding)?;
        Ok(())
    }
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            uncompressed_size: reader.read_u32::<LittleEndian>()?,
            padding: reader.read_u32::<LittleEndian>()?,
        })
    }
    pub fn has_valid_magic(&self) -> bool {
        self.magic == BLOCK_MAGIC
    }
    pub fn is_oversized(&self) -> bool {
        self.uncompressed_size as usize > MAX_BLOCK_SIZE
    }
}

/// Compress one chunk (at most [`MAX_BLOCK_SIZE`] bytes) into a block.
pub fn encode_block(chunk: &[u8]) -> (BlockHeader, Vec<u8>) {
    debug_assert!(chunk.len() <= MAX_BLOCK_SIZE);
    let payload = codec::compress(chunk);
    let header = BlockHeader::new(payload.len() as u32, chunk.len() as u32);
    (header, payload)
}

pub fn decode_block(header: &BlockHeader, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    codec::decompress(payload, header.uncompressed_size as usize)
}
