#![allow(missing_docs)]

use bytes::Bytes;
use futures::stream;
use filemux::{FilePart, FormValues, Limits, MultipartForm, UploadError};
use tokio::io::AsyncReadExt;

#[tokio::test]
async fn groups_files_by_field_in_payload_order() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"docs\"; filename=\"one.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "first\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n",
        "Content-Type: image/png\r\n",
        "\r\n",
        "png\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"docs\"; filename=\"two.txt\"\r\n",
        "\r\n",
        "second\r\n",
        "--B--\r\n"
    );

    let form = parse(body).await.expect("form should parse");
    assert_eq!(form.file_count(), 3);

    let docs = form.files("docs").expect("docs field");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].file_name(), "one.txt");
    assert_eq!(docs[1].file_name(), "two.txt");
    assert_eq!(docs[1].content_type(), &mime::TEXT_PLAIN);
    assert_eq!(docs[0].size(), 5);

    let avatar = &form.files("avatar").expect("avatar field")[0];
    assert_eq!(avatar.field_name(), "avatar");
    assert_eq!(avatar.content_type(), &mime::IMAGE_PNG);

    let mut fields: Vec<&str> = form.file_fields().collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["avatar", "docs"]);
}

#[tokio::test]
async fn collects_text_values_separately() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n",
        "\r\n",
        "Holiday\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"tag\"\r\n",
        "\r\n",
        "beach\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"tag\"\r\n",
        "\r\n",
        "sun\r\n",
        "--B--\r\n"
    );

    let form = parse(body).await.expect("form should parse");
    assert_eq!(form.file_count(), 0);
    assert!(form.files("title").is_none());

    let values = form.values();
    assert_eq!(values.len(), 2);
    assert_eq!(values.get("title"), Some("Holiday"));
    assert_eq!(values.get("tag"), Some("beach"));
    assert_eq!(values.get_all("tag"), ["beach", "sun"]);
    assert!(values.get_all("missing").is_empty());
}

#[tokio::test]
async fn empty_filename_is_an_untouched_file_input() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"upload\"; filename=\"\"\r\n",
        "Content-Type: application/octet-stream\r\n",
        "\r\n",
        "\r\n",
        "--B--\r\n"
    );

    let form = parse(body).await.expect("form should parse");
    assert!(form.files("upload").is_none());
    assert_eq!(form.values().get("upload"), Some(""));
}

#[tokio::test]
async fn parts_without_a_form_name_are_skipped() {
    let body = concat!(
        "--B\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "orphan\r\n",
        "--B\r\n",
        "Content-Disposition: attachment; name=\"docs\"; filename=\"x.txt\"\r\n",
        "\r\n",
        "not form data\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; filename=\"nameless.txt\"\r\n",
        "\r\n",
        "nameless\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"docs\"; filename=\"dir/kept.txt\"\r\n",
        "\r\n",
        "kept\r\n",
        "--B--\r\n"
    );

    let form = parse(body).await.expect("form should parse");
    assert_eq!(form.file_count(), 1);
    assert!(form.values().is_empty());
    let docs = form.files("docs").expect("docs field");
    assert_eq!(docs[0].file_name(), "kept.txt");
    assert_eq!(docs[0].size(), 4);
}

#[tokio::test]
async fn missing_part_content_type_defaults_to_octet_stream() {
    let body = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"f\"; filename=\"a.bin\"\r\n",
        "\r\n",
        "raw\r\n",
        "--B--\r\n"
    );

    let form = parse(body).await.expect("form should parse");
    let part = &form.files("f").expect("f field")[0];
    assert_eq!(part.content_type(), &mime::APPLICATION_OCTET_STREAM);
}

#[tokio::test]
async fn non_utf8_text_value_is_a_parse_error() {
    let mut body = Vec::new();
    body.extend_from_slice(b"--B\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\n");
    body.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
    body.extend_from_slice(b"\r\n--B--\r\n");

    let err = MultipartForm::parse(
        "multipart/form-data; boundary=B",
        stream::iter(vec![Ok::<Bytes, UploadError>(Bytes::from(body))]),
        &Limits::new().max_body_size(1024),
    )
    .await
    .expect_err("invalid value must fail");
    assert!(matches!(err, UploadError::Parse(_)));
}

#[tokio::test]
async fn rejects_non_multipart_content_type() {
    let err = MultipartForm::parse(
        "application/json",
        stream::empty::<Result<Bytes, UploadError>>(),
        &Limits::new().max_body_size(1024),
    )
    .await
    .expect_err("json must be rejected");
    assert!(err.to_string().contains("multipart/form-data"));
}

#[tokio::test]
async fn opened_parts_are_independent_readers() {
    let part = FilePart::from_bytes("doc", "a.txt", mime::TEXT_PLAIN, Bytes::from_static(b"hello"));
    assert_eq!(part.size(), 5);
    assert!(!part.is_spooled());

    let mut first = part.open().await.expect("open");
    let mut buf = [0u8; 2];
    first.read_exact(&mut buf).await.expect("partial read");
    assert_eq!(&buf, b"he");

    let mut second = part.open().await.expect("reopen");
    let mut all = Vec::new();
    second.read_to_end(&mut all).await.expect("full read");
    assert_eq!(all, b"hello");
}

#[test]
fn hand_built_forms_are_supported() {
    let mut form = MultipartForm::new();
    form.push_file(FilePart::from_bytes("doc", "a.txt", mime::TEXT_PLAIN, "a"));
    form.push_file(FilePart::from_bytes("doc", "b.txt", mime::TEXT_PLAIN, "b"));
    form.push_value("title", "report");

    assert_eq!(form.files("doc").map(<[FilePart]>::len), Some(2));
    assert_eq!(form.values().get("title"), Some("report"));

    let mut values = FormValues::default();
    assert!(values.is_empty());
    values.insert("a", "1");
    assert_eq!(values.iter().count(), 1);
}

async fn parse(body: &'static str) -> Result<MultipartForm, UploadError> {
    MultipartForm::parse(
        "multipart/form-data; boundary=B",
        stream::iter(vec![Ok::<Bytes, UploadError>(Bytes::from_static(body.as_bytes()))]),
        &Limits::new().max_body_size(1 << 16),
    )
    .await
}
