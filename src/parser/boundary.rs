use super::percent_decode_utf8;
use crate::ParseError;

/// Longest boundary RFC 2046 permits.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Reads the boundary of a `multipart/form-data` request from its
/// `Content-Type` value.
///
/// Quoted and percent-encoded boundaries are accepted. The decoded value must
/// be 1 to 70 RFC 2046 `bchars` and must not end with a space.
pub fn extract_multipart_boundary(content_type: &str) -> Result<String, ParseError> {
    let mime: mime::Mime = content_type
        .parse()
        .map_err(|_| ParseError::new("invalid Content-Type header"))?;

    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return Err(ParseError::new(format!(
            "Content-Type must be multipart/form-data, got `{}`",
            mime.essence_str()
        )));
    }

    let Some(raw) = mime.get_param(mime::BOUNDARY) else {
        return Err(ParseError::new("missing multipart boundary parameter"));
    };

    let boundary = percent_decode_utf8(
        raw.as_str(),
        "invalid percent-encoding in multipart boundary",
        "multipart boundary percent-encoding is not valid UTF-8",
    )?;

    match boundary.len() {
        0 => return Err(ParseError::new("multipart boundary cannot be empty")),
        len if len > MAX_BOUNDARY_LEN => {
            return Err(ParseError::new(format!(
                "multipart boundary cannot exceed {MAX_BOUNDARY_LEN} characters"
            )))
        }
        _ => {}
    }

    if let Some(bad) = boundary.chars().find(|c| !is_bchar(*c)) {
        return Err(ParseError::new(format!(
            "multipart boundary contains invalid character {bad:?}"
        )));
    }
    if boundary.ends_with(' ') {
        return Err(ParseError::new("multipart boundary cannot end with a space"));
    }

    Ok(boundary)
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}
