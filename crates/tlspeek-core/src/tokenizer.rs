use tracing::trace;

use crate::error::ParseError;

/// A cursor over an immutable byte buffer.
///
/// Extraction methods take a field name used only in diagnostics. When the
/// buffer is too short they fail with `ParseError::InsufficientInput`, or with
/// `ParseError::Truncated` for a tokenizer built over `complete` input. The
/// cursor is not restored on failure: callers `rollback()` (or resume from
/// `sync_point()`) before retrying with more data.
#[derive(Debug, Clone)]
pub struct BinaryTokenizer<'a> {
    data: &'a [u8],
    /// Bytes consumed so far.
    parsed: usize,
    /// Position restored by `rollback()`.
    sync_point: usize,
    /// Whether a shortage may be cured by more input.
    expecting_more: bool,
}

impl<'a> BinaryTokenizer<'a> {
    /// Tokenizer over a prefix of a stream that may still grow.
    pub fn new(data: &'a [u8]) -> Self {
        Self::resume(data, 0)
    }

    /// Tokenizer over input that will never grow, such as a message body
    /// whose length was already framed.
    pub fn complete(data: &'a [u8]) -> Self {
        Self {
            expecting_more: false,
            ..Self::new(data)
        }
    }

    /// Continue over a (possibly longer) buffer from a previously committed
    /// position. Positions past the end of `data` are clamped.
    pub fn resume(data: &'a [u8], sync_point: usize) -> Self {
        let sync_point = sync_point.min(data.len());
        Self {
            data,
            parsed: sync_point,
            sync_point,
            expecting_more: true,
        }
    }

    /// Mark the current position as the rollback target.
    pub fn commit(&mut self) {
        self.sync_point = self.parsed;
    }

    /// Return to the last committed position.
    pub fn rollback(&mut self) {
        self.parsed = self.sync_point;
    }

    pub fn sync_point(&self) -> usize {
        self.sync_point
    }

    pub fn parsed(&self) -> usize {
        self.parsed
    }

    pub fn at_end(&self) -> bool {
        self.parsed >= self.data.len()
    }

    /// Unparsed bytes.
    pub fn leftovers(&self) -> &'a [u8] {
        &self.data[self.parsed..]
    }

    fn want(&self, needed: usize, field: &'static str) -> Result<(), ParseError> {
        let available = self.data.len() - self.parsed;
        if needed <= available {
            return Ok(());
        }
        if self.expecting_more {
            trace!(field, needed, available, "insufficient input");
            Err(ParseError::InsufficientInput {
                field,
                needed,
                available,
            })
        } else {
            Err(ParseError::Truncated {
                field,
                needed,
                available,
            })
        }
    }

    fn octets(&mut self, size: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        self.want(size, field)?;
        let start = self.parsed;
        self.parsed += size;
        Ok(&self.data[start..self.parsed])
    }

    fn uint_be(&mut self, size: usize, field: &'static str) -> Result<u32, ParseError> {
        let bytes = self.octets(size, field)?;
        let value = bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        trace!(field, value, size, "parsed integer");
        Ok(value)
    }

    pub fn uint8(&mut self, field: &'static str) -> Result<u8, ParseError> {
        Ok(self.uint_be(1, field)? as u8)
    }

    pub fn uint16(&mut self, field: &'static str) -> Result<u16, ParseError> {
        Ok(self.uint_be(2, field)? as u16)
    }

    /// A 3-byte integer widened to 32 bits.
    pub fn uint24(&mut self, field: &'static str) -> Result<u32, ParseError> {
        self.uint_be(3, field)
    }

    pub fn uint32(&mut self, field: &'static str) -> Result<u32, ParseError> {
        self.uint_be(4, field)
    }

    /// A borrowed view of the next `size` bytes.
    pub fn area(&mut self, size: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        let bytes = self.octets(size, field)?;
        trace!(field, size, "parsed area");
        Ok(bytes)
    }

    pub fn skip(&mut self, size: usize, field: &'static str) -> Result<(), ParseError> {
        self.octets(size, field)?;
        trace!(field, size, "skipped");
        Ok(())
    }

    /// An 8-bit length followed by that many bytes.
    pub fn pstring8(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let length = self.uint8(field)?;
        self.area(usize::from(length), field)
    }

    /// A 16-bit length followed by that many bytes.
    pub fn pstring16(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let length = self.uint16(field)?;
        self.area(usize::from(length), field)
    }

    /// A 24-bit length followed by that many bytes.
    pub fn pstring24(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let length = self.uint24(field)?;
        self.area(length as usize, field)
    }
}
