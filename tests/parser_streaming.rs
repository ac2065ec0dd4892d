#![allow(missing_docs)]

use bytes::{Bytes, BytesMut};
use futures::{channel::mpsc, stream, StreamExt};
use filemux::{
    parser::{MultipartStream, PartEvent, MAX_PART_HEADER_BYTES},
    UploadError,
};

#[tokio::test]
async fn parses_chunked_stream_into_part_events() {
    let body = concat!(
        "--XBOUND\r\n",
        "Content-Disposition: form-data; name=\"alpha\"\r\n",
        "\r\n",
        "one\r\n",
        "--XBOUND\r\n",
        "Content-Disposition: form-data; name=\"beta\"; filename=\"b.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "two\r\n",
        "--XBOUND--\r\n"
    );

    let chunks = split_bytes(body.as_bytes(), &[3, 2, 7, 1, 4, 9, 5, 8, 6, 64]);
    let stream = stream::iter(chunks.into_iter().map(Ok::<Bytes, UploadError>));
    let parts = collect_parts(MultipartStream::new("XBOUND", stream).expect("boundary should be valid"))
        .await
        .expect("stream should parse");

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0, "alpha");
    assert_eq!(parts[0].1, None);
    assert_eq!(parts[0].2, Bytes::from_static(b"one"));
    assert_eq!(parts[1].0, "beta");
    assert_eq!(parts[1].1.as_deref(), Some("b.txt"));
    assert_eq!(parts[1].2, Bytes::from_static(b"two"));
}

#[tokio::test]
async fn emits_headers_before_input_completes() {
    let first_chunk = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"first\"; filename=\"a.bin\"\r\n",
        "\r\n",
        "partial"
    );

    let (tx, rx) = mpsc::unbounded::<Result<Bytes, UploadError>>();
    let mut parser = MultipartStream::new("B", rx).expect("boundary should be valid");

    tx.unbounded_send(Ok(Bytes::from_static(first_chunk.as_bytes())))
        .expect("send first chunk");

    let event = parser
        .next()
        .await
        .expect("first event should exist")
        .expect("headers should parse");
    let headers = match event {
        PartEvent::Headers(headers) => headers,
        other => panic!("expected headers, got {other:?}"),
    };
    assert_eq!(headers.field_name, "first");

    // Bytes that cannot be part of the delimiter are forwarded right away.
    let chunk = parser
        .next()
        .await
        .expect("chunk event should exist")
        .expect("chunk should parse");
    assert!(matches!(chunk, PartEvent::Chunk(_)));

    tx.unbounded_send(Ok(Bytes::from_static(b"-data\r\n--B--\r\n")))
        .expect("send trailer");
    drop(tx);

    let mut body = BytesMut::new();
    if let PartEvent::Chunk(bytes) = chunk {
        body.extend_from_slice(&bytes);
    }
    loop {
        match parser.next().await {
            Some(Ok(PartEvent::Chunk(bytes))) => body.extend_from_slice(&bytes),
            Some(Ok(PartEvent::End)) => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(&body[..], b"partial-data");
    assert!(parser.next().await.is_none());
}

#[tokio::test]
async fn delimiter_split_across_chunks_is_not_leaked_into_body() {
    let body = concat!(
        "--SPLIT\r\n",
        "Content-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\n",
        "\r\n",
        "abc\r\n--SPL",
    );
    let chunks = vec![
        Ok::<Bytes, UploadError>(Bytes::from_static(body.as_bytes())),
        Ok(Bytes::from_static(b"IT--\r\n")),
    ];

    let parts = collect_parts(MultipartStream::new("SPLIT", stream::iter(chunks)).expect("valid"))
        .await
        .expect("stream should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].2, Bytes::from_static(b"abc"));
}

#[tokio::test]
async fn body_containing_boundary_like_text_is_kept() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n",
        "\r\n",
        "line\r\n--not-the-boundary\r\nmore\r\n",
        "--B--\r\n"
    );

    let parts = collect_parts(
        MultipartStream::new("B", single_chunk(body)).expect("boundary should be valid"),
    )
    .await
    .expect("stream should parse");
    assert_eq!(
        parts[0].2,
        Bytes::from_static(b"line\r\n--not-the-boundary\r\nmore")
    );
}

#[tokio::test]
async fn accepts_terminal_boundary_without_trailing_crlf() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"\r\n",
        "\r\n",
        "v\r\n",
        "--B--"
    );

    let parts = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect("stream should parse");
    assert_eq!(parts.len(), 1);
}

#[tokio::test]
async fn reports_incomplete_stream() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"\r\n",
        "\r\n",
        "unterminated"
    );

    let err = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect_err("stream must fail");
    assert!(matches!(err, UploadError::IncompleteStream));
}

#[tokio::test]
async fn skips_preamble_before_first_boundary() {
    let body = concat!(
        "This is the preamble.\r\n",
        "--Bogus line that only starts like a delimiter\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"\r\n",
        "\r\n",
        "v\r\n",
        "--B--\r\n"
    );

    let parts = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect("stream should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].0, "f");
    assert_eq!(parts[0].2, Bytes::from_static(b"v"));
}

#[tokio::test]
async fn body_with_only_close_delimiter_has_no_parts() {
    let parts = collect_parts(MultipartStream::new("B", single_chunk("--B--\r\n")).expect("valid"))
        .await
        .expect("stream should parse");
    assert!(parts.is_empty());
}

#[tokio::test]
async fn reports_missing_opening_boundary() {
    let body = "--WRONG\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nv\r\n";

    let err = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect_err("stream must fail");
    assert_err_contains(&err.to_string(), "missing opening boundary");
}

#[tokio::test]
async fn rejects_garbage_after_delimiter() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"\r\n",
        "\r\n",
        "v\r\n",
        "--Bxyz\r\n"
    );

    let err = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect_err("stream must fail");
    assert_err_contains(&err.to_string(), "malformed multipart boundary");
}

#[tokio::test]
async fn part_without_content_disposition_has_empty_field_name() {
    let body = "--B\r\nContent-Type: text/plain\r\n\r\nv\r\n--B--\r\n";

    let parts = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect("stream should parse");
    assert_eq!(parts.len(), 1);
    assert!(parts[0].0.is_empty());
    assert_eq!(parts[0].2, Bytes::from_static(b"v"));
}

#[tokio::test]
async fn transport_padding_after_delimiter_is_allowed() {
    let body = concat!(
        "--B \t\r\n",
        "Content-Disposition: form-data; name=\"f\"\r\n",
        "\r\n",
        "v\r\n",
        "--B--\r\n"
    );

    let parts = collect_parts(MultipartStream::new("B", single_chunk(body)).expect("valid"))
        .await
        .expect("stream should parse");
    assert_eq!(parts[0].2, Bytes::from_static(b"v"));
}

#[tokio::test]
async fn oversized_header_block_is_rejected() {
    let mut body = String::from("--B\r\nX-Filler: ");
    body.push_str(&"a".repeat(MAX_PART_HEADER_BYTES + 1));
    body.push_str("\r\n\r\nv\r\n--B--\r\n");
    let chunks = vec![Ok::<Bytes, UploadError>(Bytes::from(body))];

    let err = collect_parts(MultipartStream::new("B", stream::iter(chunks)).expect("valid"))
        .await
        .expect_err("stream must fail");
    assert_err_contains(&err.to_string(), "too large");
}

#[tokio::test]
async fn upstream_errors_pass_through_unchanged() {
    let chunks = vec![
        Ok::<Bytes, UploadError>(Bytes::from_static(b"--B\r\n")),
        Err(UploadError::FileSizeExceeded { limit: 4 }),
    ];

    let err = collect_parts(MultipartStream::new("B", stream::iter(chunks)).expect("valid"))
        .await
        .expect_err("stream must fail");
    assert!(matches!(err, UploadError::FileSizeExceeded { limit: 4 }));
}

#[test]
fn rejects_boundary_with_crlf() {
    let err = MultipartStream::new("a\r\nb", stream::empty::<Result<Bytes, UploadError>>())
        .expect_err("must fail");
    assert_err_contains(&err.to_string(), "CRLF");
}

type CollectedPart = (String, Option<String>, Bytes);

async fn collect_parts<S>(mut parser: MultipartStream<S>) -> Result<Vec<CollectedPart>, UploadError>
where
    S: futures::Stream<Item = Result<Bytes, UploadError>> + Unpin,
{
    let mut parts = Vec::new();
    let mut current: Option<(String, Option<String>, BytesMut)> = None;

    while let Some(event) = parser.next().await {
        match event? {
            PartEvent::Headers(headers) => {
                current = Some((headers.field_name, headers.file_name, BytesMut::new()));
            }
            PartEvent::Chunk(bytes) => {
                current
                    .as_mut()
                    .expect("chunk must follow headers")
                    .2
                    .extend_from_slice(&bytes);
            }
            PartEvent::End => {
                let (name, file_name, body) = current.take().expect("end must follow headers");
                parts.push((name, file_name, body.freeze()));
            }
        }
    }

    Ok(parts)
}

fn single_chunk(body: &'static str) -> stream::Iter<std::vec::IntoIter<Result<Bytes, UploadError>>> {
    stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))])
}

fn split_bytes(input: &[u8], sizes: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut offset = 0usize;
    for size in sizes {
        if offset >= input.len() {
            break;
        }
        let end = (offset + size).min(input.len());
        chunks.push(Bytes::copy_from_slice(&input[offset..end]));
        offset = end;
    }
    if offset < input.len() {
        chunks.push(Bytes::copy_from_slice(&input[offset..]));
    }
    chunks
}

fn assert_err_contains(actual: &str, expected_fragment: &str) {
    assert!(
        actual.contains(expected_fragment),
        "expected `{actual}` to contain `{expected_fragment}`"
    );
}
