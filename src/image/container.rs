/// 2IMG container header
///
/// Layout (little-endian):
/// - 0x00: "2IMG"
/// - 0x04: creator code
/// - 0x08: header length (u16)
/// - 0x0A: version (u16)
/// - 0x0C: image format (u32; 0 = DOS order, 1 = ProDOS order, 2 = nibble)
/// - 0x10: flags (u32)
/// - 0x14: ProDOS block count (u32)
/// - 0x18: data offset (u32)
/// - 0x1C: data length (u32)

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::format::SectorOrder;

/// Parsed 2IMG header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoImgHeader {
    /// Creator code
    pub creator: [u8; 4],
    /// Header length in bytes
    pub header_size: usize,
    /// Format version
    pub version: u16,
    /// Declared ordering (None for nibble or unknown formats)
    pub order: Option<SectorOrder>,
    /// Raw format code
    pub format_code: u32,
    /// Flags (bit 31 = locked, bit 8 = volume number valid)
    pub flags: u32,
    /// Declared ProDOS block count
    pub blocks: u32,
    /// Offset of the disk data
    pub data_offset: usize,
    /// Length of the disk data
    pub data_length: usize,
    /// Raw header bytes, preserved on save
    pub raw: Vec<u8>,
}

fn le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Check for the 2IMG magic at the start of a file
pub fn has_two_img_signature(data: &[u8]) -> bool {
    data.len() >= TWO_IMG_HEADER_SIZE && data.starts_with(TWO_IMG_SIGNATURE)
}

impl TwoImgHeader {
    /// Parse a header from the start of an image file
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !has_two_img_signature(data) {
            return Err(DiskError::invalid_format("Missing 2IMG signature"));
        }

        let header_size = le16(data, TWO_IMG_HEADER_SIZE_OFFSET) as usize;
        let format_code = le32(data, TWO_IMG_FORMAT_OFFSET);
        let mut data_offset = le32(data, TWO_IMG_DATA_OFFSET_OFFSET) as usize;
        if data_offset == 0 {
            data_offset = header_size.max(TWO_IMG_HEADER_SIZE);
        }
        if data_offset > data.len() {
            return Err(DiskError::invalid_format(format!(
                "2IMG data offset {} beyond end of file ({} bytes)",
                data_offset,
                data.len()
            )));
        }

        let mut data_length = le32(data, TWO_IMG_DATA_LENGTH_OFFSET) as usize;
        let available = data.len() - data_offset;
        if data_length == 0 || data_length > available {
            data_length = available;
        }

        let order = match format_code {
            0 => Some(SectorOrder::Dos),
            1 => Some(SectorOrder::Prodos),
            _ => None,
        };

        let mut creator = [0u8; 4];
        creator.copy_from_slice(&data[4..8]);

        Ok(Self {
            creator,
            header_size,
            version: le16(data, TWO_IMG_VERSION_OFFSET),
            order,
            format_code,
            flags: le32(data, TWO_IMG_FLAGS_OFFSET),
            blocks: le32(data, TWO_IMG_BLOCKS_OFFSET),
            data_offset,
            data_length,
            raw: data[..data_offset].to_vec(),
        })
    }

    /// Build a fresh header for data of the given size and ordering
    pub fn new(order: SectorOrder, data_length: usize) -> Self {
        let format_code: u32 = match order {
            SectorOrder::Dos => 0,
            SectorOrder::Prodos => 1,
        };
        let blocks = match order {
            SectorOrder::Prodos => (data_length / BLOCK_SIZE) as u32,
            SectorOrder::Dos => 0,
        };

        let mut raw = vec![0u8; TWO_IMG_HEADER_SIZE];
        raw[..4].copy_from_slice(TWO_IMG_SIGNATURE);
        raw[4..8].copy_from_slice(TWO_IMG_CREATOR);
        raw[TWO_IMG_HEADER_SIZE_OFFSET..TWO_IMG_HEADER_SIZE_OFFSET + 2]
            .copy_from_slice(&(TWO_IMG_HEADER_SIZE as u16).to_le_bytes());
        raw[TWO_IMG_VERSION_OFFSET..TWO_IMG_VERSION_OFFSET + 2].copy_from_slice(&1u16.to_le_bytes());
        raw[TWO_IMG_FORMAT_OFFSET..TWO_IMG_FORMAT_OFFSET + 4]
            .copy_from_slice(&format_code.to_le_bytes());
        raw[TWO_IMG_BLOCKS_OFFSET..TWO_IMG_BLOCKS_OFFSET + 4].copy_from_slice(&blocks.to_le_bytes());
        raw[TWO_IMG_DATA_OFFSET_OFFSET..TWO_IMG_DATA_OFFSET_OFFSET + 4]
            .copy_from_slice(&(TWO_IMG_HEADER_SIZE as u32).to_le_bytes());
        raw[TWO_IMG_DATA_LENGTH_OFFSET..TWO_IMG_DATA_LENGTH_OFFSET + 4]
            .copy_from_slice(&(data_length as u32).to_le_bytes());

        let mut creator = [0u8; 4];
        creator.copy_from_slice(TWO_IMG_CREATOR);

        Self {
            creator,
            header_size: TWO_IMG_HEADER_SIZE,
            version: 1,
            order: Some(order),
            format_code,
            flags: 0,
            blocks,
            data_offset: TWO_IMG_HEADER_SIZE,
            data_length,
            raw,
        }
    }

    /// Rewrite the format field after the data has been reordered
    pub fn set_order(&mut self, order: SectorOrder) {
        let format_code: u32 = match order {
            SectorOrder::Dos => 0,
            SectorOrder::Prodos => 1,
        };
        self.order = Some(order);
        self.format_code = format_code;
        if self.raw.len() >= TWO_IMG_FORMAT_OFFSET + 4 {
            self.raw[TWO_IMG_FORMAT_OFFSET..TWO_IMG_FORMAT_OFFSET + 4]
                .copy_from_slice(&format_code.to_le_bytes());
        }
    }

    /// Whether the locked flag is set
    pub fn is_locked(&self) -> bool {
        self.flags & 0x8000_0000 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_header_parses_back() {
        let header = TwoImgHeader::new(SectorOrder::Prodos, 280 * 512);
        let mut file = header.raw.clone();
        file.extend(vec![0u8; 280 * 512]);

        let parsed = TwoImgHeader::parse(&file).unwrap();
        assert_eq!(parsed.data_offset, 64);
        assert_eq!(parsed.data_length, 280 * 512);
        assert_eq!(parsed.blocks, 280);
        assert_eq!(parsed.order, Some(SectorOrder::Prodos));
        assert_eq!(&parsed.creator, b"A2DK");
    }

    #[test]
    fn test_new_header_format_code() {
        for (order, code) in [(SectorOrder::Dos, 0u32), (SectorOrder::Prodos, 1u32)] {
            let header = TwoImgHeader::new(order, 140 * 1024);
            assert_eq!(header.format_code, code);
            assert_eq!(le32(&header.raw, TWO_IMG_FORMAT_OFFSET), code);
        }
    }

    #[test]
    fn test_missing_signature() {
        let data = vec![0u8; 128];
        assert!(TwoImgHeader::parse(&data).is_err());
        assert!(!has_two_img_signature(&data));
    }

    #[test]
    fn test_data_length_clamped() {
        let mut header = TwoImgHeader::new(SectorOrder::Dos, 1_000_000);
        header.raw[TWO_IMG_FORMAT_OFFSET] = 0;
        let mut file = header.raw.clone();
        file.extend(vec![0u8; 4096]);
        let parsed = TwoImgHeader::parse(&file).unwrap();
        assert_eq!(parsed.data_length, 4096);
        assert_eq!(parsed.order, Some(SectorOrder::Dos));
    }
}
