/// Multipart boundary parsing helpers.
pub mod boundary;
/// Multipart part header parsing helpers.
pub mod headers;
/// Streaming multipart parser state machine.
pub mod stream;

pub use boundary::{extract_multipart_boundary, MAX_BOUNDARY_LEN};
pub use headers::{
    parse_content_disposition, parse_part_content_type, parse_part_headers, ContentDisposition,
    ParsedPartHeaders,
};
pub use stream::{MultipartStream, PartEvent, MAX_PART_HEADER_BYTES};

use crate::ParseError;

/// Decodes `%XX` escapes and requires the result to be UTF-8.
pub(crate) fn percent_decode_utf8(
    value: &str,
    invalid_encoding: &'static str,
    invalid_utf8: &'static str,
) -> Result<String, ParseError> {
    if !value.as_bytes().contains(&b'%') {
        return Ok(value.to_owned());
    }

    let raw = value.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut index = 0usize;

    while index < raw.len() {
        if raw[index] != b'%' {
            bytes.push(raw[index]);
            index += 1;
            continue;
        }

        let (Some(&hi), Some(&lo)) = (raw.get(index + 1), raw.get(index + 2)) else {
            return Err(ParseError::new(invalid_encoding));
        };
        let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) else {
            return Err(ParseError::new(invalid_encoding));
        };
        bytes.push((hi << 4) | lo);
        index += 3;
    }

    String::from_utf8(bytes).map_err(|_| ParseError::new(invalid_utf8))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
