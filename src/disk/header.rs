//! On-disk file header (spec §4.H, §6).

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;

pub const MAGIC: u32 = 0x5552_4249;
pub const VERSION: u32 = 1;
/// Header region size; 4 KiB aligned per spec §4.H.
pub const HEADER_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_count: u32,
    pub track_count: u32,
    pub object_count: u64,
    pub bounds: Mbr,
    pub created_time: u64,
    pub modified_time: u64,
    pub page_size: u32,
    pub pages_per_track: u32,
    pub index_offset: u64,
    pub data_offset: u64,
}

impl FileHeader {
    pub fn new(page_size: u32, pages_per_track: u32, created_time: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_count: 0,
            track_count: 0,
            object_count: 0,
            bounds: Mbr::empty(),
            created_time,
            modified_time: created_time,
            page_size,
            pages_per_track,
            // One reserved page slot for the index region (spec §4.H).
            index_offset: HEADER_BYTES as u64,
            data_offset: HEADER_BYTES as u64 + page_size as u64,
        }
    }

    /// Offset of page slot `page_id` (`k ≥ 1`) in the data region.
    pub fn page_offset(&self, page_id: u64) -> u64 {
        self.data_offset + (page_id - 1) * self.page_size as u64
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_BYTES);
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.page_count.to_le_bytes());
        buf.extend_from_slice(&self.track_count.to_le_bytes());
        buf.extend_from_slice(&self.object_count.to_le_bytes());
        for v in [
            self.bounds.min_x,
            self.bounds.min_y,
            self.bounds.max_x,
            self.bounds.max_y,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&self.created_time.to_le_bytes());
        buf.extend_from_slice(&self.modified_time.to_le_bytes());
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.pages_per_track.to_le_bytes());
        buf.extend_from_slice(&self.index_offset.to_le_bytes());
        buf.extend_from_slice(&self.data_offset.to_le_bytes());
        buf.resize(buf.len() + 64, 0); // reserved[64]
        buf.resize(HEADER_BYTES, 0);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> IndexResult<Self> {
        if buf.len() < HEADER_BYTES {
            return Err(IndexError::Corrupt("header shorter than 4 KiB".into()));
        }
        let mut pos = 0;
        let take4 = |buf: &[u8], pos: &mut usize| -> [u8; 4] {
            let s: [u8; 4] = buf[*pos..*pos + 4].try_into().unwrap();
            *pos += 4;
            s
        };
        let take8 = |buf: &[u8], pos: &mut usize| -> [u8; 8] {
            let s: [u8; 8] = buf[*pos..*pos + 8].try_into().unwrap();
            *pos += 8;
            s
        };
        let magic = u32::from_le_bytes(take4(buf, &mut pos));
        if magic != MAGIC {
            return Err(IndexError::Corrupt(format!(
                "bad magic: expected {MAGIC:#x}, found {magic:#x}"
            )));
        }
        let version = u32::from_le_bytes(take4(buf, &mut pos));
        if version > VERSION {
            return Err(IndexError::Version(format!(
                "file version {version} newer than supported {VERSION}"
            )));
        }
        let page_count = u32::from_le_bytes(take4(buf, &mut pos));
        let track_count = u32::from_le_bytes(take4(buf, &mut pos));
        let object_count = u64::from_le_bytes(take8(buf, &mut pos));
        let bounds = Mbr::new(
            f64::from_le_bytes(take8(buf, &mut pos)),
            f64::from_le_bytes(take8(buf, &mut pos)),
            f64::from_le_bytes(take8(buf, &mut pos)),
            f64::from_le_bytes(take8(buf, &mut pos)),
        );
        let created_time = u64::from_le_bytes(take8(buf, &mut pos));
        let modified_time = u64::from_le_bytes(take8(buf, &mut pos));
        let page_size = u32::from_le_bytes(take4(buf, &mut pos));
        let pages_per_track = u32::from_le_bytes(take4(buf, &mut pos));
        let index_offset = u64::from_le_bytes(take8(buf, &mut pos));
        let data_offset = u64::from_le_bytes(take8(buf, &mut pos));
        Ok(Self {
            magic,
            version,
            page_count,
            track_count,
            object_count,
            bounds,
            created_time,
            modified_time,
            page_size,
            pages_per_track,
            index_offset,
            data_offset,
        })
    }
}
