/// Whether a 16-bit codepoint is a GREASE value (RFC 8701).
///
/// GREASE codepoints look like 0x?A?A with equal bytes: 0x0A0A, 0x1A1A, ...,
/// 0xFAFA. Clients sprinkle them into cipher, extension and version lists to
/// keep servers tolerant of unknown values.
pub fn is_grease_u16(val: u16) -> bool {
    let hi = (val >> 8) as u8;
    let lo = val as u8;
    hi == lo && (hi & 0x0F) == 0x0A
}

/// Copy `values`, dropping GREASE codepoints.
pub fn filter_grease_u16(values: &[u16]) -> Vec<u16> {
    values.iter().copied().filter(|v| !is_grease_u16(*v)).collect()
}
