//! Endian-safe byte buffer: a single read cursor over an owned `Vec<u8>`
//! with an append-only write cursor at the end. Every codec in this crate
//! (RLE, ESF, ESFS) is built on top of this primitive.

use crate::error::BufferError;

/// Byte order used for multi-byte reads/writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Native,
    Little,
    Big,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Little
    }
}

/// An endian-aware, growable byte buffer with a single read cursor.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    cursor: usize,
    order: ByteOrder,
}

macro_rules! impl_read_write {
    ($ty:ty, $write_fn:ident, $read_fn:ident, $peek_fn:ident, $size:expr) => {
        pub fn $write_fn(&mut self, value: $ty) {
            let bytes = self.encode_bytes(value.to_ne_bytes());
            self.data.extend_from_slice(&bytes);
        }

        pub fn $read_fn(&mut self) -> Result<$ty, BufferError> {
            let bytes = self.read_raw_array::<$size>()?;
            Ok(self.decode_bytes::<$ty, $size>(bytes))
        }

        pub fn $peek_fn(&self) -> Option<$ty> {
            if self.cursor + $size > self.data.len() {
                return None;
            }
            let mut arr = [0u8; $size];
            arr.copy_from_slice(&self.data[self.cursor..self.cursor + $size]);
            Some(self.decode_bytes::<$ty, $size>(arr))
        }
    };
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::with_order(ByteOrder::default())
    }

    pub fn with_order(order: ByteOrder) -> Self {
        Self {
            data: Vec::new(),
            cursor: 0,
            order,
        }
    }

    pub fn from_vec(data: Vec<u8>, order: ByteOrder) -> Self {
        Self {
            data,
            cursor: 0,
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Hand ownership of the backing vector to the caller.
    pub fn release(self) -> Vec<u8> {
        self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BufferError> {
        if self.cursor + count > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: count,
            });
        }
        self.cursor += count;
        Ok(())
    }

    pub fn rewind(&mut self, count: usize) {
        self.cursor = self.cursor.saturating_sub(count);
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), BufferError> {
        if pos > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: pos,
            });
        }
        self.cursor = pos;
        Ok(())
    }

    /// Drop already-consumed bytes, shifting the cursor back to zero.
    pub fn compact(&mut self) {
        self.data.drain(0..self.cursor);
        self.cursor = 0;
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(if value { 1 } else { 0 });
    }

    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        let arr = self.read_raw_array::<1>()?;
        Ok(arr[0])
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn read_i8(&mut self) -> Result<i8, BufferError> {
        Ok(self.read_u8()? as i8)
    }

    impl_read_write!(u16, write_u16, read_u16, peek_u16, 2);
    impl_read_write!(i16, write_i16, read_i16, peek_i16, 2);
    impl_read_write!(u32, write_u32, read_u32, peek_u32, 4);
    impl_read_write!(i32, write_i32, read_i32, peek_i32, 4);
    impl_read_write!(u64, write_u64, read_u64, peek_u64, 8);
    impl_read_write!(i64, write_i64, read_i64, peek_i64, 8);

    /// Floats are byte-swapped by bit-punning through a same-width unsigned
    /// integer; we never reinterpret float bytes directly.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn peek_f32(&self) -> Option<f32> {
        self.peek_u32().map(f32::from_bits)
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub fn read_f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn peek_f64(&self) -> Option<f64> {
        self.peek_u64().map(f64::from_bits)
    }

    /// Append raw bytes verbatim (no endian conversion).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BufferError> {
        if self.cursor + count > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: count,
            });
        }
        let out = self.data[self.cursor..self.cursor + count].to_vec();
        self.cursor += count;
        Ok(out)
    }

    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        let count = out.len();
        if self.cursor + count > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: count,
            });
        }
        out.copy_from_slice(&self.data[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(())
    }

    pub fn write_string_u32(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.data.extend_from_slice(s.as_bytes());
    }

    pub fn read_string_u32(&mut self) -> Result<String, BufferError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_string_u16(&mut self, s: &str) {
        self.write_u16(s.len() as u16);
        self.data.extend_from_slice(s.as_bytes());
    }

    pub fn read_string_u16(&mut self) -> Result<String, BufferError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
    }

    pub fn read_cstring(&mut self) -> Result<String, BufferError> {
        let start = self.cursor;
        let mut end = start;
        while end < self.data.len() && self.data[end] != 0 {
            end += 1;
        }
        if end >= self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: 1,
            });
        }
        let s = String::from_utf8_lossy(&self.data[start..end]).into_owned();
        self.cursor = end + 1;
        Ok(s)
    }

    /// Overwrite `size` bytes at an arbitrary offset without moving the
    /// read cursor. Used by codecs that patch a header after the fact
    /// (e.g. ESF's region header CRC/timestamp).
    pub fn overwrite_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        if offset + bytes.len() > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: offset,
                size: self.data.len(),
                requested: bytes.len(),
            });
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_raw_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        if self.cursor + N > self.data.len() {
            return Err(BufferError::Underflow {
                cursor: self.cursor,
                size: self.data.len(),
                requested: N,
            });
        }
        let mut arr = [0u8; N];
        arr.copy_from_slice(&self.data[self.cursor..self.cursor + N]);
        self.cursor += N;
        Ok(arr)
    }

    fn encode_bytes<const N: usize>(&self, native: [u8; N]) -> [u8; N] {
        match self.order {
            ByteOrder::Native => native,
            ByteOrder::Little => {
                if cfg!(target_endian = "little") {
                    native
                } else {
                    let mut out = native;
                    out.reverse();
                    out
                }
            }
            ByteOrder::Big => {
                if cfg!(target_endian = "big") {
                    native
                } else {
                    let mut out = native;
                    out.reverse();
                    out
                }
            }
        }
    }

    fn decode_bytes<T, const N: usize>(&self, mut bytes: [u8; N]) -> T
    where
        T: FromNeBytes<N>,
    {
        let want_swap = match self.order {
            ByteOrder::Native => false,
            ByteOrder::Little => cfg!(target_endian = "big"),
            ByteOrder::Big => cfg!(target_endian = "little"),
        };
        if want_swap {
            bytes.reverse();
        }
        T::from_ne_bytes(bytes)
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges the per-type `from_ne_bytes` constructors so the read macro can
/// stay generic over the integer width.
trait FromNeBytes<const N: usize> {
    fn from_ne_bytes(bytes: [u8; N]) -> Self;
}

macro_rules! impl_from_ne_bytes {
    ($ty:ty, $n:expr) => {
        impl FromNeBytes<$n> for $ty {
            fn from_ne_bytes(bytes: [u8; $n]) -> Self {
                <$ty>::from_ne_bytes(bytes)
            }
        }
    };
}

impl_from_ne_bytes!(u16, 2);
impl_from_ne_bytes!(i16, 2);
impl_from_ne_bytes!(u32, 4);
impl_from_ne_bytes!(i32, 4);
impl_from_ne_bytes!(u64, 8);
impl_from_ne_bytes!(i64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_integers_little_endian() {
        let mut buf = ByteBuffer::with_order(ByteOrder::Little);
        buf.write_u32(0xDEAD_BEEF);
        buf.write_i16(-1234);
        buf.write_u8(200);

        assert_eq!(buf.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(buf.read_i16().unwrap(), -1234);
        assert_eq!(buf.read_u8().unwrap(), 200);
    }

    #[test]
    fn round_trips_floats_via_bit_pun() {
        let mut buf = ByteBuffer::new();
        buf.write_f32(3.5);
        buf.write_f64(-12.25);

        assert_eq!(buf.read_f32().unwrap(), 3.5);
        assert_eq!(buf.read_f64().unwrap(), -12.25);
    }

    #[test]
    fn underflow_reports_cursor_size_requested() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(1);
        let _ = buf.read_u8().unwrap();
        match buf.read_u32() {
            Err(BufferError::Underflow {
                cursor,
                size,
                requested,
            }) => {
                assert_eq!(cursor, 1);
                assert_eq!(size, 1);
                assert_eq!(requested, 4);
            }
            other => panic!("expected underflow, got {other:?}"),
        }
    }

    #[test]
    fn strings_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.write_string_u32("hello region");
        buf.write_string_u16("short");
        buf.write_cstring("terminated");

        assert_eq!(buf.read_string_u32().unwrap(), "hello region");
        assert_eq!(buf.read_string_u16().unwrap(), "short");
        assert_eq!(buf.read_cstring().unwrap(), "terminated");
    }

    #[test]
    fn peek_does_not_advance_cursor() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(77);
        assert_eq!(buf.peek_u32(), Some(77));
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.read_u32().unwrap(), 77);
    }

    #[test]
    fn compact_drops_consumed_prefix() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        let _ = buf.read_u8().unwrap();
        buf.compact();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.read_u8().unwrap(), 2);
    }

    #[test]
    fn big_endian_round_trip() {
        let mut buf = ByteBuffer::with_order(ByteOrder::Big);
        buf.write_u32(0x0102_0304);
        assert_eq!(&buf.as_slice()[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(buf.read_u32().unwrap(), 0x0102_0304);
    }
}
