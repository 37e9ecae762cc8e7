//! Fixed-capacity page: the unit of I/O (spec §3, §4.C).

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;
use crate::object::{Geometry, GeometryType, SpatialObject};
use crate::point::Point;

/// Default objects per page (`C_page`), a header constant per spec §3.
pub const DEFAULT_PAGE_CAPACITY: usize = 64;

/// Default fixed page slot size in bytes (`P_bytes`).
pub const DEFAULT_PAGE_BYTES: usize = 4096;

bitflags::bitflags! {
    /// Orthogonal status bits; `FREE` is the absence of all bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const ALLOCATED = 0b0001;
        const FULL      = 0b0010;
        const DIRTY     = 0b0100;
        const PINNED    = 0b1000;
    }
}

/// Fixed-capacity container of spatial objects.
#[derive(Debug, Clone)]
pub struct Page {
    page_id: u64,
    track_id: u64,
    capacity: usize,
    objects: Vec<SpatialObject>,
    extent: Mbr,
    centroid: Point,
    flags: PageFlags,
}

impl Page {
    pub fn new(page_id: u64, capacity: usize) -> Self {
        Self {
            page_id,
            track_id: 0,
            capacity,
            objects: Vec::new(),
            extent: Mbr::empty(),
            centroid: Point::new(0.0, 0.0),
            flags: PageFlags::ALLOCATED,
        }
    }

    pub fn page_id(&self) -> u64 {
        self.page_id
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub(crate) fn set_track_id(&mut self, track_id: u64) {
        self.track_id = track_id;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn objects(&self) -> &[SpatialObject] {
        &self.objects
    }

    pub fn extent(&self) -> Mbr {
        self.extent
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn flags(&self) -> PageFlags {
        self.flags
    }

    pub fn is_full(&self) -> bool {
        self.flags.contains(PageFlags::FULL)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PageFlags::DIRTY)
    }

    pub fn is_pinned(&self) -> bool {
        self.flags.contains(PageFlags::PINNED)
    }

    pub fn pin(&mut self) {
        self.flags.insert(PageFlags::PINNED);
    }

    pub fn unpin(&mut self) {
        self.flags.remove(PageFlags::PINNED);
    }

    pub fn mark_dirty(&mut self) {
        self.flags.insert(PageFlags::DIRTY);
    }

    /// Clears DIRTY after a successful flush (spec §4.E). Not part of the
    /// page's own mutation surface — only the cache calls this, right
    /// after persisting the page.
    pub(crate) fn clear_dirty_for_flush(&mut self) {
        self.flags.remove(PageFlags::DIRTY);
    }

    pub fn utilization(&self) -> f64 {
        self.objects.len() as f64 / self.capacity as f64
    }

    /// Deep-copies `obj` into the page. Fails `Full` at capacity; the
    /// object is not partially inserted on failure (spec §7).
    pub fn add(&mut self, obj: SpatialObject) -> IndexResult<()> {
        if self.objects.len() >= self.capacity {
            return Err(IndexError::Full(format!(
                "page {} is at capacity {}",
                self.page_id, self.capacity
            )));
        }
        self.extent.expand_mbr(&obj.mbr());
        self.objects.push(obj);
        self.flags.insert(PageFlags::DIRTY);
        if self.objects.len() == self.capacity {
            self.flags.insert(PageFlags::FULL);
        }
        self.recompute_centroid();
        Ok(())
    }

    /// O(n) search; on hit, shifts the tail left (spec §4.C).
    pub fn remove(&mut self, id: u64) -> IndexResult<SpatialObject> {
        let idx = self
            .objects
            .iter()
            .position(|o| o.id() == id)
            .ok_or_else(|| {
                IndexError::NotFound(format!("object {id} not in page {}", self.page_id))
            })?;
        let removed = self.objects.remove(idx);
        self.flags.remove(PageFlags::FULL);
        self.flags.insert(PageFlags::DIRTY);
        self.update_derived();
        Ok(removed)
    }

    pub fn find(&self, id: u64) -> Option<&SpatialObject> {
        self.objects.iter().find(|o| o.id() == id)
    }

    /// Full re-union of extent and centroid from current objects.
    pub fn update_derived(&mut self) {
        self.extent = Mbr::empty();
        for o in &self.objects {
            self.extent.expand_mbr(&o.mbr());
        }
        self.recompute_centroid();
    }

    fn recompute_centroid(&mut self) {
        if self.objects.is_empty() {
            self.centroid = Point::new(0.0, 0.0);
            return;
        }
        let (mut sx, mut sy) = (0.0, 0.0);
        for o in &self.objects {
            let c = o.centroid();
            sx += c.x;
            sy += c.y;
        }
        let n = self.objects.len() as f64;
        self.centroid = Point::new(sx / n, sy / n);
    }

    /// FNV-1a checksum over `(page_id, track_id, object_count, per-object
    /// (id, centroid))` (spec §3).
    pub fn checksum(&self) -> u64 {
        let mut hasher = Fnv1a::new();
        hasher.write_u64(self.page_id);
        hasher.write_u64(self.track_id);
        hasher.write_u64(self.objects.len() as u64);
        for o in &self.objects {
            hasher.write_u64(o.id());
            let c = o.centroid();
            hasher.write_f64(c.x);
            hasher.write_f64(c.y);
        }
        hasher.finish()
    }

    pub fn verify(&self, expected: u64) -> bool {
        self.checksum() == expected
    }

    /// Serializes into a fixed `page_bytes`-length buffer per spec §4.C's
    /// layout. Errors if the per-object records would overflow the slot.
    pub fn serialize(&self, page_bytes: usize) -> IndexResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(page_bytes);
        buf.extend_from_slice(&(self.page_id as u32).to_le_bytes());
        buf.extend_from_slice(&(self.track_id as u32).to_le_bytes());
        buf.extend_from_slice(&(self.objects.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        for v in [
            self.extent.min_x,
            self.extent.min_y,
            self.extent.max_x,
            self.extent.max_y,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&self.centroid.x.to_le_bytes());
        buf.extend_from_slice(&self.centroid.y.to_le_bytes());
        buf.extend_from_slice(&self.checksum().to_le_bytes());

        for o in &self.objects {
            buf.extend_from_slice(&o.id().to_le_bytes());
            buf.push(o.geometry().kind() as u8);
            buf.extend_from_slice(&[0u8; 3]);
            let c = o.centroid();
            buf.extend_from_slice(&c.x.to_le_bytes());
            buf.extend_from_slice(&c.y.to_le_bytes());
            let m = o.mbr();
            for v in [m.min_x, m.min_y, m.max_x, m.max_y] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        if buf.len() > page_bytes {
            return Err(IndexError::Alloc(format!(
                "page {} serializes to {} bytes, exceeds slot size {page_bytes}",
                self.page_id,
                buf.len()
            )));
        }
        buf.resize(page_bytes, 0);
        Ok(buf)
    }

    /// Deserializes a page record written purely from its indexing tuples
    /// (id, type, centroid, MBR) — full geometry is not round-tripped, per
    /// the open question in spec §9. Objects recovered this way carry a
    /// degenerate [`Geometry::Point`] at the stored centroid so that MBR
    /// and centroid queries keep working against a reopened file.
    pub fn deserialize(buf: &[u8], capacity: usize) -> IndexResult<PageRecord> {
        if buf.len() < 48 {
            return Err(IndexError::Corrupt("page slot too short for header".into()));
        }
        let mut r = Reader::new(buf);
        let page_id = r.read_u32()? as u64;
        let track_id = r.read_u32()? as u64;
        let object_count = r.read_u32()? as usize;
        let flags_bits = r.read_u32()?;
        let extent = Mbr::new(r.read_f64()?, r.read_f64()?, r.read_f64()?, r.read_f64()?);
        let centroid = Point::new(r.read_f64()?, r.read_f64()?);
        let checksum = r.read_u64()?;

        if object_count > capacity {
            return Err(IndexError::Corrupt(format!(
                "page {page_id} claims {object_count} objects, capacity is {capacity}"
            )));
        }

        let mut entries = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            let id = r.read_u64()?;
            let kind = r.read_u8()?;
            r.skip(3)?;
            let c = Point::new(r.read_f64()?, r.read_f64()?);
            let m = Mbr::new(r.read_f64()?, r.read_f64()?, r.read_f64()?, r.read_f64()?);
            let kind = match kind {
                0 => GeometryType::Point,
                1 => GeometryType::Polyline,
                2 => GeometryType::Polygon,
                other => {
                    return Err(IndexError::Corrupt(format!(
                        "unknown geometry type tag {other}"
                    )))
                }
            };
            entries.push(PageObjectRecord {
                id,
                kind,
                centroid: c,
                mbr: m,
            });
        }

        Ok(PageRecord {
            page_id,
            track_id,
            flags: PageFlags::from_bits_truncate(flags_bits),
            extent,
            centroid,
            checksum,
            entries,
        })
    }

    /// Rehydrates a [`Page`] from a deserialized record, using a degenerate
    /// point geometry per object (see [`Page::deserialize`]).
    pub fn from_record(record: PageRecord, capacity: usize) -> Self {
        let mut objects = Vec::with_capacity(record.entries.len());
        for e in record.entries {
            let mut obj = SpatialObject::new(Geometry::Point(e.centroid));
            obj.assign_id(e.id).expect("record ids are non-zero");
            objects.push(obj);
        }
        Self {
            page_id: record.page_id,
            track_id: record.track_id,
            capacity,
            objects,
            extent: record.extent,
            centroid: record.centroid,
            flags: record.flags,
        }
    }
}

/// The raw fields recovered by [`Page::deserialize`], before rehydration
/// into a [`Page`].
pub struct PageRecord {
    pub page_id: u64,
    pub track_id: u64,
    pub flags: PageFlags,
    pub extent: Mbr,
    pub centroid: Point,
    pub checksum: u64,
    pub entries: Vec<PageObjectRecord>,
}

pub struct PageObjectRecord {
    pub id: u64,
    pub kind: GeometryType,
    pub centroid: Point,
    pub mbr: Mbr,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> IndexResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(IndexError::Corrupt("page slot truncated".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> IndexResult<()> {
        self.take(n).map(|_| ())
    }

    fn read_u8(&mut self) -> IndexResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> IndexResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> IndexResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> IndexResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

/// Minimal 64-bit FNV-1a, used for page checksums (spec §3).
struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    fn write_u64(&mut self, v: u64) {
        for b in v.to_le_bytes() {
            self.0 = (self.0 ^ b as u64).wrapping_mul(Self::PRIME);
        }
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_until_full_sets_flag() {
        let mut page = Page::new(1, 2);
        page.add(SpatialObject::point(0.0, 0.0)).unwrap();
        assert!(!page.is_full());
        page.add(SpatialObject::point(1.0, 1.0)).unwrap();
        assert!(page.is_full());
        assert!(page.add(SpatialObject::point(2.0, 2.0)).is_err());
    }

    #[test]
    fn remove_shifts_and_clears_full() {
        let mut page = Page::new(1, 2);
        let mut a = SpatialObject::point(0.0, 0.0);
        a.assign_id(1).unwrap();
        let mut b = SpatialObject::point(1.0, 1.0);
        b.assign_id(2).unwrap();
        page.add(a).unwrap();
        page.add(b).unwrap();
        page.remove(1).unwrap();
        assert!(!page.is_full());
        assert_eq!(page.object_count(), 1);
        assert_eq!(page.extent(), Mbr::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn serialize_round_trip_preserves_indexing_tuples() {
        let mut page = Page::new(7, 4);
        let mut o1 = SpatialObject::point(1.0, 2.0);
        o1.assign_id(10).unwrap();
        page.add(o1).unwrap();
        page.set_track_id(3);

        let bytes = page.serialize(DEFAULT_PAGE_BYTES).unwrap();
        assert_eq!(bytes.len(), DEFAULT_PAGE_BYTES);
        let record = Page::deserialize(&bytes, 4).unwrap();
        assert_eq!(record.page_id, 7);
        assert_eq!(record.track_id, 3);
        assert_eq!(record.checksum, page.checksum());
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].id, 10);
        assert_eq!(record.entries[0].centroid, Point::new(1.0, 2.0));
    }

    #[test]
    fn deserialize_rejects_overcapacity_object_count() {
        let mut buf = vec![0u8; DEFAULT_PAGE_BYTES];
        buf[8..12].copy_from_slice(&999u32.to_le_bytes());
        assert!(Page::deserialize(&buf, 64).is_err());
    }
}
