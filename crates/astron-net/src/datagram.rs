//! Little-endian datagram writer and bounds-checked reader.
//!
//! Wire shapes:
//!
//! ```text
//! bool        1 byte (0 or 1)
//! char        1 byte
//! intN/uintN  N/8 bytes, little-endian
//! float32/64  4/8 bytes, IEEE-754 little-endian
//! string/blob u16 length prefix, then raw bytes
//! ```

/// Largest string or blob that fits behind a `u16` length prefix.
pub const MAX_SIZED_LENGTH: usize = u16::MAX as usize;

/// Errors from writing or reading datagram values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatagramError {
    #[error("integer {value} does not fit in {bits} bits")]
    IntOutOfRange { value: i128, bits: u32 },

    #[error("`{input}` is not a single one-byte character")]
    CharOutOfRange { input: String },

    #[error("string of {len} bytes exceeds the u16 length prefix")]
    StringOutOfRange { len: usize },

    #[error("blob of {len} bytes exceeds the u16 length prefix")]
    BlobOutOfRange { len: usize },

    #[error("read of {requested} bytes at offset {offset} exceeds datagram length {len}")]
    ReadOutOfRange {
        requested: usize,
        offset: usize,
        len: usize,
    },

    #[error("string of {len} bytes at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize, len: usize },
}

/// Integer width used by the sign-inferring writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    fn signed_min(self) -> i128 {
        -(1i128 << (self.bits() - 1))
    }

    fn unsigned_max(self) -> i128 {
        (1i128 << self.bits()) - 1
    }
}

/// A growable outbound buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datagram {
    buf: Vec<u8>,
}

impl Datagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Reader positioned at the start of this datagram.
    pub fn iter(&self) -> DatagramIterator<'_> {
        DatagramIterator::new(&self.buf)
    }

    pub fn add_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Append exactly one character that fits in a byte.
    pub fn add_char(&mut self, value: &str) -> Result<(), DatagramError> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if (c as u32) <= 0xFF => {
                self.buf.push(c as u8);
                Ok(())
            }
            _ => Err(DatagramError::CharOutOfRange {
                input: value.to_string(),
            }),
        }
    }

    pub fn add_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i8(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an integer of the given width, signed when `value` is negative.
    ///
    /// Accepts `[-2^(bits-1), 2^bits - 1]`; anything else is rejected rather
    /// than truncated.
    pub fn add_int(&mut self, width: IntWidth, value: i128) -> Result<(), DatagramError> {
        if value < width.signed_min() || value > width.unsigned_max() {
            return Err(DatagramError::IntOutOfRange {
                value,
                bits: width.bits(),
            });
        }
        // Two's complement keeps the low bytes correct for both signs.
        let bytes = value.to_le_bytes();
        self.buf.extend_from_slice(&bytes[..width.bytes()]);
        Ok(())
    }

    pub fn add_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_channel(&mut self, channel: u64) {
        self.add_u64(channel);
    }

    pub fn add_string(&mut self, value: &str) -> Result<(), DatagramError> {
        if value.len() > MAX_SIZED_LENGTH {
            return Err(DatagramError::StringOutOfRange { len: value.len() });
        }
        self.add_u16(value.len() as u16);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn add_blob(&mut self, value: &[u8]) -> Result<(), DatagramError> {
        if value.len() > MAX_SIZED_LENGTH {
            return Err(DatagramError::BlobOutOfRange { len: value.len() });
        }
        self.add_u16(value.len() as u16);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Append raw bytes with no prefix.
    pub fn add_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn add_datagram(&mut self, other: &Datagram) {
        self.buf.extend_from_slice(&other.buf);
    }
}

impl From<Vec<u8>> for Datagram {
    fn from(buf: Vec<u8>) -> Self {
        Self::from_bytes(buf)
    }
}

impl AsRef<[u8]> for Datagram {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

/// Cursor over a finished datagram.
#[derive(Debug, Clone)]
pub struct DatagramIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> DatagramIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn tell(&self) -> usize {
        self.offset
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), DatagramError> {
        if offset > self.data.len() {
            return Err(DatagramError::ReadOutOfRange {
                requested: offset,
                offset: 0,
                len: self.data.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DatagramError> {
        self.read_data(count).map(|_| ())
    }

    /// Borrow the next `count` bytes.
    pub fn read_data(&mut self, count: usize) -> Result<&'a [u8], DatagramError> {
        if count > self.remaining() {
            return Err(DatagramError::ReadOutOfRange {
                requested: count,
                offset: self.offset,
                len: self.data.len(),
            });
        }
        let start = self.offset;
        self.offset += count;
        Ok(&self.data[start..self.offset])
    }

    /// Everything after the cursor.
    pub fn read_remainder(&mut self) -> &'a [u8] {
        let rest = &self.data[self.offset..];
        self.offset = self.data.len();
        rest
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DatagramError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_data(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool, DatagramError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_char(&mut self) -> Result<char, DatagramError> {
        Ok(char::from(self.read_u8()?))
    }

    pub fn read_u8(&mut self) -> Result<u8, DatagramError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DatagramError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DatagramError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, DatagramError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i8(&mut self) -> Result<i8, DatagramError> {
        self.read_array().map(i8::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, DatagramError> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DatagramError> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, DatagramError> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, DatagramError> {
        self.read_array().map(f32::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, DatagramError> {
        self.read_array().map(f64::from_le_bytes)
    }

    pub fn read_channel(&mut self) -> Result<u64, DatagramError> {
        self.read_u64()
    }

    /// Length-prefixed string. Invalid UTF-8 is replaced, not rejected.
    pub fn read_string(&mut self) -> Result<String, DatagramError> {
        let len = usize::from(self.read_u16()?);
        let offset = self.tell();
        let bytes = self.read_data(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DatagramError::InvalidUtf8 { offset, len })
    }

    pub fn read_blob(&mut self) -> Result<Vec<u8>, DatagramError> {
        let len = usize::from(self.read_u16()?);
        Ok(self.read_data(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_boundaries() {
        for width in [IntWidth::W8, IntWidth::W16, IntWidth::W32, IntWidth::W64] {
            let max = (1i128 << width.bits()) - 1;
            let mut dg = Datagram::new();
            dg.add_int(width, 0).unwrap();
            dg.add_int(width, max).unwrap();
            assert_eq!(dg.len(), 2 * width.bytes());
            assert!(matches!(
                dg.add_int(width, max + 1),
                Err(DatagramError::IntOutOfRange { .. })
            ));
            // A rejected write leaves the buffer untouched.
            assert_eq!(dg.len(), 2 * width.bytes());
        }
    }

    #[test]
    fn test_signed_boundaries() {
        for width in [IntWidth::W8, IntWidth::W16, IntWidth::W32, IntWidth::W64] {
            let min = -(1i128 << (width.bits() - 1));
            let mut dg = Datagram::new();
            assert!(dg.add_int(width, min).is_ok());
            assert!(matches!(
                dg.add_int(width, min - 1),
                Err(DatagramError::IntOutOfRange { bits, .. }) if bits == width.bits()
            ));
        }
    }

    #[test]
    fn test_sign_inferred_ints_read_back() {
        let mut dg = Datagram::new();
        dg.add_int(IntWidth::W8, -128).unwrap();
        dg.add_int(IntWidth::W8, 255).unwrap();
        dg.add_int(IntWidth::W16, -2).unwrap();
        dg.add_int(IntWidth::W32, i128::from(u32::MAX)).unwrap();
        dg.add_int(IntWidth::W64, i128::from(i64::MIN)).unwrap();
        dg.add_int(IntWidth::W64, i128::from(u64::MAX)).unwrap();

        let mut it = dg.iter();
        assert_eq!(it.read_i8().unwrap(), -128);
        assert_eq!(it.read_u8().unwrap(), 255);
        assert_eq!(it.read_i16().unwrap(), -2);
        assert_eq!(it.read_u32().unwrap(), u32::MAX);
        assert_eq!(it.read_i64().unwrap(), i64::MIN);
        assert_eq!(it.read_u64().unwrap(), u64::MAX);
        assert_eq!(it.remaining(), 0);
    }

    #[test]
    fn test_typed_values_read_back() {
        let mut dg = Datagram::new();
        dg.add_bool(true);
        dg.add_char("A").unwrap();
        dg.add_u16(0xBEEF);
        dg.add_i32(-70_000);
        dg.add_f32(1.5);
        dg.add_f64(-0.25);
        dg.add_string("hello").unwrap();
        dg.add_blob(&[1, 2, 3]).unwrap();

        let mut it = dg.iter();
        assert!(it.read_bool().unwrap());
        assert_eq!(it.read_char().unwrap(), 'A');
        assert_eq!(it.read_u16().unwrap(), 0xBEEF);
        assert_eq!(it.read_i32().unwrap(), -70_000);
        assert_eq!(it.read_f32().unwrap(), 1.5);
        assert_eq!(it.read_f64().unwrap(), -0.25);
        assert_eq!(it.read_string().unwrap(), "hello");
        assert_eq!(it.read_blob().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut dg = Datagram::new();
        dg.add_u32(0x0102_0304);
        dg.add_string("ab").unwrap();
        assert_eq!(dg.as_bytes(), &[0x04, 0x03, 0x02, 0x01, 0x02, 0x00, b'a', b'b']);
    }

    #[test]
    fn test_char_must_be_single_byte_character() {
        let mut dg = Datagram::new();
        assert!(matches!(dg.add_char(""), Err(DatagramError::CharOutOfRange { .. })));
        assert!(matches!(dg.add_char("ab"), Err(DatagramError::CharOutOfRange { .. })));
        assert!(matches!(dg.add_char("€"), Err(DatagramError::CharOutOfRange { .. })));
        assert!(dg.is_empty());
    }

    #[test]
    fn test_sized_values_limited_to_u16() {
        let mut dg = Datagram::new();
        let long = "x".repeat(MAX_SIZED_LENGTH + 1);
        assert!(matches!(
            dg.add_string(&long),
            Err(DatagramError::StringOutOfRange { len }) if len == MAX_SIZED_LENGTH + 1
        ));
        assert!(matches!(
            dg.add_blob(long.as_bytes()),
            Err(DatagramError::BlobOutOfRange { .. })
        ));
        assert!(dg.add_blob(&long.as_bytes()[1..]).is_ok());
    }

    #[test]
    fn test_read_past_end() {
        let dg = Datagram::from_bytes(vec![1, 2, 3]);
        let mut it = dg.iter();
        assert!(matches!(
            it.read_u32(),
            Err(DatagramError::ReadOutOfRange {
                requested: 4,
                offset: 0,
                len: 3
            })
        ));
        // The failed read does not move the cursor.
        assert_eq!(it.tell(), 0);
        assert_eq!(it.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_truncated_string_prefix() {
        let dg = Datagram::from_bytes(vec![10, 0, b'a']);
        assert!(matches!(
            dg.iter().read_string(),
            Err(DatagramError::ReadOutOfRange { requested: 10, .. })
        ));
    }

    #[test]
    fn test_string_must_be_utf8() {
        let dg = Datagram::from_bytes(vec![1, 0, b'x', 2, 0, 0xC3, 0x28]);
        let mut it = dg.iter();
        it.skip(3).unwrap();
        assert!(matches!(
            it.read_string(),
            Err(DatagramError::InvalidUtf8 { offset: 5, len: 2 })
        ));

        let dg = Datagram::from_bytes(vec![2, 0, 0xC3, 0xA9]);
        assert_eq!(dg.iter().read_string().unwrap(), "\u{e9}");
    }

    #[test]
    fn test_seek_skip_and_tell() {
        let mut dg = Datagram::new();
        dg.add_u16(7);
        dg.add_u32(99);
        let mut it = dg.iter();
        it.skip(2).unwrap();
        assert_eq!(it.tell(), 2);
        assert_eq!(it.read_u32().unwrap(), 99);
        it.seek(0).unwrap();
        assert_eq!(it.read_u16().unwrap(), 7);
        assert!(it.seek(7).is_err());
        assert!(it.skip(5).is_err());
    }

    #[test]
    fn test_add_datagram_and_remainder() {
        let mut header = Datagram::new();
        header.add_u8(1);
        let mut body = Datagram::new();
        body.add_data(&[9, 8, 7]);
        header.add_datagram(&body);

        let mut it = header.iter();
        it.read_u8().unwrap();
        assert_eq!(it.read_remainder(), &[9, 8, 7]);
        assert_eq!(it.remaining(), 0);
    }
}
