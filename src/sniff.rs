//! Content type detection from the leading bytes of a seekable reader.

use std::io::{self, SeekFrom};

use infer::MatcherType;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Number of leading bytes inspected when classifying content.
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

const HTML_PREFIXES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Detects the media type of `reader` without disturbing later reads.
///
/// The reader is rewound, up to [`SNIFF_LEN`] bytes are inspected, and the
/// reader is rewound again before returning. Parameters such as `charset` are
/// stripped, so UTF-8 text is reported as `text/plain`.
pub async fn detect_content_type<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    reader.seek(SeekFrom::Start(0)).await?;

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;

    reader.seek(SeekFrom::Start(0)).await?;

    Ok(essence(classify(&head)))
}

/// Classifies a byte prefix, returning a MIME type that may carry parameters.
pub fn classify(head: &[u8]) -> String {
    let head = &head[..head.len().min(SNIFF_LEN)];

    if head.starts_with(&[0xFE, 0xFF]) {
        return "text/plain; charset=utf-16be".to_owned();
    }
    if head.starts_with(&[0xFF, 0xFE]) {
        return "text/plain; charset=utf-16le".to_owned();
    }
    if head.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return TEXT_PLAIN_UTF8.to_owned();
    }

    let trimmed = trim_leading_whitespace(head);
    if HTML_PREFIXES
        .iter()
        .any(|prefix| matches_html_tag(trimmed, prefix))
    {
        return "text/html; charset=utf-8".to_owned();
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8".to_owned();
    }
    if head.starts_with(b"%!PS-Adobe-") {
        return "application/postscript".to_owned();
    }

    if let Some(kind) = infer::get(head).filter(is_signature_kind) {
        return kind.mime_type().to_owned();
    }

    if head.iter().copied().any(is_binary_byte) {
        OCTET_STREAM.to_owned()
    } else {
        TEXT_PLAIN_UTF8.to_owned()
    }
}

fn essence(raw: String) -> String {
    match raw.parse::<mime::Mime>() {
        Ok(parsed) => parsed.essence_str().to_owned(),
        Err(_) => raw
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or(OCTET_STREAM)
            .to_owned(),
    }
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|byte| !matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    if !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

// Text-like matches such as shell scripts stay plain text.
fn is_signature_kind(kind: &infer::Type) -> bool {
    matches!(
        kind.matcher_type(),
        MatcherType::Image
            | MatcherType::Audio
            | MatcherType::Video
            | MatcherType::Font
            | MatcherType::Archive
            | MatcherType::Doc
    )
}

fn is_binary_byte(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
