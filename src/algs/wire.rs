//! Fixed, versioned, little-endian wire types for the collective paths.
//!
//! Buffers are assembled with [`WireWriter`] and decoded with [`WireReader`].
//! The reader never assumes alignment of the received bytes and reports a
//! short or malformed buffer as `None` instead of panicking.

use bytemuck::{Pod, Zeroable};
use static_assertions::{assert_eq_align, assert_eq_size};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds carried in [`WireHdr::kind`].
pub mod kind {
    pub const GRAPH_SHARD: u16 = 1;
    pub const GHOST_GET: u16 = 3;
    pub const GHOST_PUT: u16 = 4;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// One vertex of a graph shard.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireVertex {
    pub id_le: u64,
    pub degree_le: u64,
    pub computation_le: u64,
    pub migration_le: u64,
}

impl WireVertex {
    pub fn new(id: usize, degree: usize, computation: f64, migration: f64) -> Self {
        Self {
            id_le: (id as u64).to_le(),
            degree_le: (degree as u64).to_le(),
            computation_le: computation.to_bits().to_le(),
            migration_le: migration.to_bits().to_le(),
        }
    }
    pub fn id(&self) -> usize {
        u64::from_le(self.id_le) as usize
    }
    pub fn degree(&self) -> usize {
        u64::from_le(self.degree_le) as usize
    }
    pub fn computation(&self) -> f64 {
        f64::from_bits(u64::from_le(self.computation_le))
    }
    pub fn migration(&self) -> f64 {
        f64::from_bits(u64::from_le(self.migration_le))
    }
}

/// One adjacency entry `(neighbor, weight)` of a graph shard.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEdge {
    pub nbr_le: u64,
    pub weight_le: u64,
}

impl WireEdge {
    pub fn new(nbr: usize, weight: f64) -> Self {
        Self {
            nbr_le: (nbr as u64).to_le(),
            weight_le: weight.to_bits().to_le(),
        }
    }
    pub fn nbr(&self) -> usize {
        u64::from_le(self.nbr_le) as usize
    }
    pub fn weight(&self) -> f64 {
        f64::from_bits(u64::from_le(self.weight_le))
    }
}

assert_eq_size!(WireHdr, u64);
assert_eq_size!(WireCount, u64);
assert_eq_size!(WireVertex, [u64; 4]);
assert_eq_size!(WireEdge, [u64; 2]);
assert_eq_align!(WireVertex, u64);

/// Append-only message builder.
#[derive(Default, Debug)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn with_header(kind: u16) -> Self {
        let mut w = Self::default();
        w.put(&WireHdr::new(kind));
        w
    }

    pub fn put<T: Pod>(&mut self, v: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(v));
    }

    pub fn put_slice<T: Pod>(&mut self, v: &[T]) {
        self.buf.extend_from_slice(bytemuck::cast_slice(v));
    }

    pub fn put_count(&mut self, n: usize) {
        self.put(&WireCount::new(n));
    }

    pub fn put_f64(&mut self, x: f64) {
        self.put(&x.to_bits().to_le());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received message.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read and check the header; `None` on kind or version mismatch.
    pub fn expect_header(buf: &'a [u8], kind: u16) -> Option<Self> {
        let mut r = Self::new(buf);
        let hdr: WireHdr = r.get()?;
        (hdr.version() == WIRE_VERSION && hdr.kind() == kind).then_some(r)
    }

    pub fn get<T: Pod>(&mut self) -> Option<T> {
        let n = std::mem::size_of::<T>();
        let bytes = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn get_count(&mut self) -> Option<usize> {
        self.get::<WireCount>().map(|c| c.get())
    }

    pub fn get_f64(&mut self) -> Option<f64> {
        self.get::<u64>().map(|b| f64::from_bits(u64::from_le(b)))
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_agree() {
        let mut w = WireWriter::with_header(kind::GRAPH_SHARD);
        w.put_count(2);
        w.put(&WireVertex::new(7, 3, 1.5, 3.0));
        w.put_slice(&[WireEdge::new(8, 0.25), WireEdge::new(6, 1.0)]);
        w.put_f64(-2.5);
        let bytes = w.finish();

        // decode from an odd offset to exercise unaligned reads
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        let mut r = WireReader::expect_header(&shifted[1..], kind::GRAPH_SHARD).unwrap();
        assert_eq!(r.get_count(), Some(2));
        let v: WireVertex = r.get().unwrap();
        assert_eq!((v.id(), v.degree(), v.computation(), v.migration()), (7, 3, 1.5, 3.0));
        let e: WireEdge = r.get().unwrap();
        assert_eq!((e.nbr(), e.weight()), (8, 0.25));
        let _: WireEdge = r.get().unwrap();
        assert_eq!(r.get_f64(), Some(-2.5));
        assert!(r.is_exhausted());
        assert!(r.get::<WireCount>().is_none());
    }

    #[test]
    fn header_guard() {
        let bytes = WireWriter::with_header(kind::GRAPH_SHARD).finish();
        assert!(WireReader::expect_header(&bytes, kind::GHOST_GET).is_none());
        assert_eq!(WireHdr::new(1).version(), WIRE_VERSION);
    }
}
