use std::borrow::Cow;

use http::{header, HeaderMap};

use super::percent_decode_utf8;
use crate::ParseError;

/// `Content-Disposition` of one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased. `form-data` for browser forms.
    pub disposition: String,
    /// The `name` parameter.
    pub name: Option<String>,
    /// The `filename*` parameter, or `filename` when that is absent.
    pub filename: Option<String>,
}

impl ContentDisposition {
    /// Form field name, present only for `form-data` parts with a non-empty
    /// `name`.
    pub fn form_name(&self) -> Option<&str> {
        if self.disposition != "form-data" {
            return None;
        }
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Client file name with any directory components removed.
    pub fn file_name(&self) -> Option<&str> {
        self.filename.as_deref().map(base_name)
    }
}

/// Header values the form collector needs from one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPartHeaders {
    /// Form field name. Empty for parts that carry no form name; those parts
    /// are skipped by the form collector.
    pub field_name: String,
    /// File name, present only for file parts.
    pub file_name: Option<String>,
    /// Content type declared by the client.
    pub content_type: mime::Mime,
}

/// Parses a `Content-Disposition` value such as
/// `form-data; name="doc"; filename="a.txt"`.
///
/// Unknown parameters are ignored. `filename*` follows RFC 5987 and only the
/// UTF-8 charset is accepted.
pub fn parse_content_disposition(value: &str) -> Result<ContentDisposition, ParseError> {
    let (kind, params) = value.split_once(';').unwrap_or((value, ""));
    let disposition = kind.trim().to_ascii_lowercase();
    if disposition.is_empty() {
        return Err(ParseError::new("invalid Content-Disposition header"));
    }

    let mut parsed = ContentDisposition {
        disposition,
        name: None,
        filename: None,
    };
    let mut extended_filename = None;

    for param in Params::new(params) {
        let (key, value) = param?;
        if key.eq_ignore_ascii_case("name") {
            parsed.name = Some(value.into_owned());
        } else if key.eq_ignore_ascii_case("filename") {
            parsed.filename = Some(value.into_owned());
        } else if key.eq_ignore_ascii_case("filename*") {
            extended_filename = Some(decode_ext_value(&value)?);
        }
    }

    if extended_filename.is_some() {
        parsed.filename = extended_filename;
    }
    Ok(parsed)
}

/// Parses a part `Content-Type`, defaulting to `application/octet-stream`.
pub fn parse_part_content_type(value: Option<&str>) -> Result<mime::Mime, ParseError> {
    match value.map(str::trim) {
        None | Some("") => Ok(mime::APPLICATION_OCTET_STREAM),
        Some(raw) => raw
            .parse()
            .map_err(|_| ParseError::new(format!("invalid part Content-Type header `{raw}`"))),
    }
}

/// Parses the headers of one multipart part.
///
/// A part without `Content-Disposition` is not an error; it yields an empty
/// field name.
pub fn parse_part_headers(headers: &HeaderMap) -> Result<ParsedPartHeaders, ParseError> {
    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ParseError::new("Content-Disposition header must be ASCII"))
                .and_then(parse_content_disposition)
        })
        .transpose()?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ParseError::new("part Content-Type header must be ASCII"))
        })
        .transpose()?;

    let (field_name, file_name) = match &disposition {
        Some(disposition) => (
            disposition.form_name().unwrap_or_default().to_owned(),
            disposition.file_name().map(str::to_owned),
        ),
        None => (String::new(), None),
    };

    Ok(ParsedPartHeaders {
        field_name,
        file_name,
        content_type: parse_part_content_type(content_type)?,
    })
}

/// Iterator over `key=value` parameters separated by `;`.
///
/// Quoted values may contain `;` and backslash escapes.
struct Params<'a> {
    rest: &'a str,
}

impl<'a> Params<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn fail(&mut self, err: ParseError) -> Option<<Self as Iterator>::Item> {
        self.rest = "";
        Some(Err(err))
    }
}

impl<'a> Iterator for Params<'a> {
    type Item = Result<(&'a str, Cow<'a, str>), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest: &'a str = self
            .rest
            .trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }

        let Some((key, after_eq)) = rest
            .split_once('=')
            .filter(|(key, _)| !key.contains(';'))
        else {
            return self.fail(ParseError::new(
                "invalid Content-Disposition parameter format",
            ));
        };
        let key = key.trim();
        let after_eq = after_eq.trim_start();

        if let Some(quoted) = after_eq.strip_prefix('"') {
            return match unquote(quoted) {
                Ok((value, remainder)) => {
                    self.rest = remainder;
                    Some(Ok((key, value)))
                }
                Err(err) => self.fail(err),
            };
        }

        let end = after_eq.find(';').unwrap_or(after_eq.len());
        let value = after_eq[..end].trim_end();
        if value.contains('"') {
            return self.fail(ParseError::new("invalid quoted parameter value"));
        }
        self.rest = &after_eq[end..];
        Some(Ok((key, Cow::Borrowed(value))))
    }
}

/// Reads a quoted string whose opening quote was already consumed. Returns
/// the unescaped value and the input after the closing quote.
fn unquote(body: &str) -> Result<(Cow<'_, str>, &str), ParseError> {
    let mut owned: Option<String> = None;
    let mut chars = body.char_indices();

    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => {
                let value = owned.map_or(Cow::Borrowed(&body[..index]), Cow::Owned);
                return Ok((value, &body[index + 1..]));
            }
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or_else(|| ParseError::new("dangling escape in quoted parameter"))?;
                owned
                    .get_or_insert_with(|| body[..index].to_owned())
                    .push(escaped);
            }
            _ => {
                if let Some(text) = owned.as_mut() {
                    text.push(ch);
                }
            }
        }
    }

    Err(ParseError::new("unterminated quoted parameter"))
}

// RFC 5987 `charset'language'value`.
fn decode_ext_value(value: &str) -> Result<String, ParseError> {
    let mut pieces = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) =
        (pieces.next(), pieces.next(), pieces.next())
    else {
        return Err(ParseError::new("invalid filename* parameter encoding"));
    };

    if !charset.eq_ignore_ascii_case("utf-8") {
        return Err(ParseError::new(format!(
            "unsupported filename* charset `{charset}`"
        )));
    }

    percent_decode_utf8(
        encoded,
        "invalid percent-encoding in filename*",
        "filename* is not valid UTF-8",
    )
}

fn base_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}
