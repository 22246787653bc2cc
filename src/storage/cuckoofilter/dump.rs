//! Chunked dump and restore of a filter chain
//!
//! A dump is a header chunk followed by the raw bucket memory of every
//! sub-filter in chain order. Cursors are opaque integers:
//!
//! - `0` starts a dump, and is returned again once everything was sent
//! - `1` tags the header chunk
//! - anything larger is `1 + end offset` of a bucket chunk within the
//!   concatenated bucket memory
//!
//! Bucket chunks never span two sub-filters. All integers are little endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::CuckooError;
use super::filter::CuckooFilter;
use super::scalable::{
    CuckooFilterConfig, MAX_BUCKET_SIZE, MAX_EXPANSION, MAX_FILTER_MEMORY, ScalableCuckooFilter,
    filter_memory,
};

/// Cursor returned with, and expected for, the header chunk
pub const HEADER_CURSOR: u64 = 1;

/// Largest bucket chunk handed out by a single scandump call
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

const DUMP_VERSION: u8 = 1;

// version, bucket size, max iterations, expansion, max filters, capacity,
// filter count, items, deletes
const HEADER_FIXED_LEN: usize = 1 + 2 + 4 + 4 + 4 + 8 + 4 + 8 + 8;
// buckets, items, deletes
const HEADER_FILTER_LEN: usize = 8 + 8 + 8;

/// Decoded form of a dump cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpCursor {
    /// Nothing sent yet; next chunk is the header
    Start,
    /// Next chunk starts at `offset` within sub-filter `filter`
    Data { filter: usize, offset: usize },
    /// All bucket memory has been sent
    Done,
}

impl DumpCursor {
    /// Decode an opaque cursor against a filter chain
    pub fn decode(cursor: u64, filters: &[CuckooFilter]) -> Self {
        match cursor {
            0 => Self::Start,
            c => Self::at_offset(c - HEADER_CURSOR, filters),
        }
    }

    fn at_offset(mut offset: u64, filters: &[CuckooFilter]) -> Self {
        for (filter, f) in filters.iter().enumerate() {
            let len = f.data().len() as u64;
            if offset < len {
                return Self::Data {
                    filter,
                    offset: offset as usize,
                };
            }
            offset -= len;
        }
        Self::Done
    }

    /// Encode back into the opaque integer form
    pub fn encode(self, filters: &[CuckooFilter]) -> u64 {
        match self {
            Self::Start | Self::Done => 0,
            Self::Data { filter, offset } => {
                let before: u64 = filters[..filter]
                    .iter()
                    .map(|f| f.data().len() as u64)
                    .sum();
                HEADER_CURSOR + before + offset as u64
            }
        }
    }
}

impl ScalableCuckooFilter {
    /// Total length of the bucket memory of all sub-filters
    pub(super) fn dump_len(&self) -> u64 {
        self.filters.iter().map(|f| f.data().len() as u64).sum()
    }

    /// Encode filter-level metadata and the layout of every sub-filter
    pub fn header(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(HEADER_FIXED_LEN + HEADER_FILTER_LEN * self.filters.len());

        buf.put_u8(DUMP_VERSION);
        buf.put_u16_le(self.config.bucket_size as u16);
        buf.put_u32_le(self.config.max_iterations as u32);
        buf.put_u32_le(self.config.expansion);
        buf.put_u32_le(self.config.max_filters as u32);
        buf.put_u64_le(self.config.capacity as u64);
        buf.put_u32_le(self.filters.len() as u32);
        buf.put_u64_le(self.num_items);
        buf.put_u64_le(self.num_deletes);

        for filter in &self.filters {
            buf.put_u64_le(filter.num_buckets());
            buf.put_u64_le(filter.num_items());
            buf.put_u64_le(filter.num_deletes());
        }

        buf.freeze()
    }

    /// Produce the chunk following `cursor`.
    ///
    /// Returns the cursor to pass on the next call together with the chunk.
    /// `(0, empty)` signals the end of the dump.
    pub fn scandump(&self, cursor: u64, chunk_size: usize) -> (u64, Bytes) {
        match DumpCursor::decode(cursor, &self.filters) {
            DumpCursor::Start => (HEADER_CURSOR, self.header()),
            DumpCursor::Data { filter, offset } => {
                let data = self.filters[filter].data();
                let len = chunk_size.max(1).min(data.len() - offset);
                let next = DumpCursor::Data {
                    filter,
                    offset: offset + len,
                }
                .encode(&self.filters);
                (next, Bytes::copy_from_slice(&data[offset..offset + len]))
            }
            DumpCursor::Done => (0, Bytes::new()),
        }
    }

    /// Rebuild an empty chain from a header chunk.
    ///
    /// The returned filter expects its bucket memory through
    /// [`load_chunk`](Self::load_chunk), in dump order.
    pub fn from_header(data: &[u8]) -> Result<Self, CuckooError> {
        let mut buf = data;
        let mut filter = Self::read_header(&mut buf)?;
        if buf.has_remaining() {
            return Err(CuckooError::BadHeader("trailing bytes"));
        }
        filter.loading = Some(0);
        Ok(filter)
    }

    fn read_header(buf: &mut &[u8]) -> Result<Self, CuckooError> {
        if buf.remaining() < HEADER_FIXED_LEN {
            return Err(CuckooError::BadHeader("truncated"));
        }
        if buf.get_u8() != DUMP_VERSION {
            return Err(CuckooError::BadHeader("unsupported version"));
        }

        let bucket_size = buf.get_u16_le() as usize;
        let max_iterations = buf.get_u32_le() as usize;
        let expansion = buf.get_u32_le();
        let max_filters = buf.get_u32_le() as usize;
        let capacity = buf.get_u64_le() as usize;
        let num_filters = buf.get_u32_le() as usize;
        let num_items = buf.get_u64_le();
        let num_deletes = buf.get_u64_le();

        if bucket_size == 0 || bucket_size > MAX_BUCKET_SIZE {
            return Err(CuckooError::BadHeader("bucket size"));
        }
        if max_iterations == 0 {
            return Err(CuckooError::BadHeader("max iterations"));
        }
        if expansion > MAX_EXPANSION {
            return Err(CuckooError::BadHeader("expansion"));
        }
        if num_filters == 0 || num_filters > max_filters {
            return Err(CuckooError::BadHeader("filter count"));
        }
        if buf.remaining() < num_filters * HEADER_FILTER_LEN {
            return Err(CuckooError::BadHeader("truncated"));
        }

        // Validate the whole layout before allocating any bucket memory
        let mut layout = Vec::with_capacity(num_filters);
        let mut memory = 0u64;
        for _ in 0..num_filters {
            let num_buckets = buf.get_u64_le();
            let items = buf.get_u64_le();
            let deletes = buf.get_u64_le();

            if !num_buckets.is_power_of_two() {
                return Err(CuckooError::BadHeader("bucket count"));
            }
            let slots = filter_memory(num_buckets, bucket_size)
                .ok_or(CuckooError::BadHeader("bucket memory"))?;
            memory = memory
                .checked_add(slots)
                .filter(|&total| total <= MAX_FILTER_MEMORY)
                .ok_or(CuckooError::BadHeader("bucket memory"))?;
            if items > slots {
                return Err(CuckooError::BadHeader("item count"));
            }
            layout.push((num_buckets, items, deletes));
        }

        let mut filters = Vec::with_capacity(num_filters);
        let (mut items_sum, mut deletes_sum) = (0u64, 0u64);
        for (num_buckets, items, deletes) in layout {
            items_sum += items;
            deletes_sum = deletes_sum.saturating_add(deletes);
            filters.push(CuckooFilter::with_counters(
                num_buckets,
                bucket_size,
                max_iterations,
                items,
                deletes,
            ));
        }

        if items_sum != num_items || deletes_sum != num_deletes {
            return Err(CuckooError::BadHeader("counters"));
        }

        Ok(Self {
            filters,
            config: CuckooFilterConfig {
                capacity,
                bucket_size,
                max_iterations,
                expansion,
                max_filters,
            },
            num_items,
            num_deletes,
            loading: None,
        })
    }

    /// Apply one bucket chunk produced by [`scandump`](Self::scandump).
    ///
    /// `cursor` is the value that was returned together with `data`.
    pub fn load_chunk(&mut self, cursor: u64, data: &[u8]) -> Result<(), CuckooError> {
        let expected = self.loading.ok_or(CuckooError::OutOfOrder)?;
        if data.is_empty() {
            return Err(CuckooError::BadChunk("empty chunk"));
        }

        let start = cursor
            .checked_sub(HEADER_CURSOR + data.len() as u64)
            .ok_or(CuckooError::BadChunk("position"))?;
        if start != expected {
            return Err(CuckooError::OutOfOrder);
        }

        let DumpCursor::Data { filter, offset } = DumpCursor::at_offset(start, &self.filters)
        else {
            return Err(CuckooError::BadChunk("position past end of filter"));
        };

        let target = self.filters[filter].data_mut();
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= target.len())
            .ok_or(CuckooError::BadChunk("chunk crosses sub-filter boundary"))?;
        target[offset..end].copy_from_slice(data);

        let next = start + data.len() as u64;
        if next == self.dump_len() {
            log::debug!(
                "cuckoo filter load complete: {} sub-filters, {} items",
                self.filters.len(),
                self.num_items
            );
            self.loading = None;
        } else {
            self.loading = Some(next);
        }
        Ok(())
    }

    /// Serialize the complete state (header plus all bucket memory) for persistence
    pub fn to_bytes(&self) -> Bytes {
        let header = self.header();
        let mut buf = BytesMut::with_capacity(header.len() + self.dump_len() as usize);
        buf.put_slice(&header);
        for filter in &self.filters {
            buf.put_slice(filter.data());
        }
        buf.freeze()
    }

    /// Deserialize from bytes produced by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(data: &[u8]) -> Result<Self, CuckooError> {
        let mut buf = data;
        let mut scf = Self::read_header(&mut buf)?;

        if buf.remaining() as u64 != scf.dump_len() {
            return Err(CuckooError::BadChunk("bucket memory length"));
        }

        for filter in &mut scf.filters {
            let len = filter.data().len();
            filter.data_mut().copy_from_slice(&buf[..len]);
            buf.advance(len);

            let occupied = filter.data().iter().filter(|&&fp| fp != 0).count() as u64;
            if occupied != filter.num_items() {
                return Err(CuckooError::BadChunk("item count does not match buckets"));
            }
        }

        Ok(scf)
    }
}
