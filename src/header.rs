//! Container header: 4-byte magic followed by 14 bytes of version/length
//! metadata.  The metadata is opaque to this crate; it is carried through
//! a decode/encode cycle unchanged.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub const HEADER_MAGIC: [u8; 4] = [0xE5, 0xA1, 0xED, 0xFE];
pub const METADATA_LEN: usize = 14;
pub const HEADER_SIZE: usize = HEADER_MAGIC.len() + METADATA_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub metadata: [u8; METADATA_LEN],
}

impl Header {
    pub fn new(metadata: [u8; METADATA_LEN]) -> Self {
        Self { metadata }
    }

    /// First metadata word, read little-endian.  Diagnostics only.
    pub fn version_word(&self) -> u32 {
        (&self.metadata[..4])
            .read_u32::<LittleEndian>()
            .unwrap_or_default()
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&HEADER_MAGIC)?;
        writer.write_all(&self.metadata)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(short_header)?;
        if magic != HEADER_MAGIC {
            return Err(Error::ContainerFormat(format!(
                "header magic {} does not match {}",
                hex::encode(magic),
                hex::encode(HEADER_MAGIC),
            )));
        }
        let mut metadata = [0u8; METADATA_LEN];
        reader.read_exact(&mut metadata).map_err(short_header)?;
        Ok(Self { metadata })
    }
}

fn short_header(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::TruncatedContainer(format!("input shorter than the {HEADER_SIZE}-byte header"))
    } else {
        Error::Io(e)
    }
}
