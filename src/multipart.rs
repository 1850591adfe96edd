// Hand-rolled multipart/form-data encoder. The legacy storage bucket
// has a strict parser, so the framing here (boundary lines, per-part
// headers, CRLF placement, field order) must match the wire format
// exactly; reqwest's own multipart support emits different part
// headers and cannot be used.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::error::{Result, UploadError};

/// Where a file field's bytes come from. The encoder only borrows the
/// content for the duration of body construction.
pub enum FileContent<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

pub enum FieldValue<'a> {
    Text(&'a str),
    File {
        content: FileContent<'a>,
        content_type: &'a str,
        filename: &'a str,
        size: u64,
    },
}

/// One named field of the form body. Order of fields is meaningful and
/// preserved exactly by `encode`.
pub struct MultipartField<'a> {
    pub name: &'a str,
    pub value: FieldValue<'a>,
}

impl<'a> MultipartField<'a> {
    pub fn text(name: &'a str, value: &'a str) -> Self {
        MultipartField {
            name,
            value: FieldValue::Text(value),
        }
    }

    pub fn file(
        name: &'a str,
        content: FileContent<'a>,
        content_type: &'a str,
        filename: &'a str,
        size: u64,
    ) -> Self {
        MultipartField {
            name,
            value: FieldValue::File {
                content,
                content_type,
                filename,
                size,
            },
        }
    }
}

/// Generate a boundary token. Not expected to collide with field
/// content in practice; no escaping is performed, matching the
/// protocol's original simplicity.
pub fn random_boundary() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-form-boundary-{}",
        rng.gen_range(0..1_000_000u32),
        rng.gen_range(0..1_000_000u32)
    )
}

/// Percent-encode a field name. Letters, digits, `.`, `_` and `-` pass
/// through; every other byte becomes `%xx` with lowercase hex, the
/// form the legacy service expects.
pub fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02x}", b)),
        }
    }
    out
}

/// Build the multipart body for `fields` under `boundary`. Returns the
/// body bytes and the `Content-Type` header value to attach to the
/// request. A file field, if present, must be the last field; the
/// bucket's parser rejects anything after it.
pub fn encode(boundary: &str, fields: &[MultipartField]) -> Result<(Vec<u8>, String)> {
    for (i, field) in fields.iter().enumerate() {
        if matches!(field.value, FieldValue::File { .. }) && i + 1 != fields.len() {
            return Err(UploadError::FileFieldOrdering);
        }
    }

    let mut body: Vec<u8> = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match &field.value {
            FieldValue::Text(value) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        encode_name(field.name)
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FieldValue::File {
                content,
                content_type,
                filename,
                size,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        encode_name(field.name),
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
                body.extend_from_slice(format!("Content-Length: {}\r\n", size).as_bytes());
                body.extend_from_slice(b"Content-Transfer-Encoding: binary\r\n\r\n");
                match content {
                    FileContent::Bytes(bytes) => body.extend_from_slice(bytes),
                    FileContent::Path(path) => {
                        let bytes =
                            fs::read(path).map_err(|source| UploadError::SourceUnreadable {
                                path: path.to_path_buf(),
                                source,
                            })?;
                        body.extend_from_slice(&bytes);
                    }
                }
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--", boundary).as_bytes());

    let header = format!("multipart/form-data; boundary={}", boundary);
    Ok((body, header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Minimal conformant parser used to check the round-trip property:
    // splits the body on the boundary and recovers (name, payload)
    // pairs from each part.
    fn parse_body(body: &[u8], boundary: &str) -> Vec<(String, Vec<u8>)> {
        let delim = format!("--{}\r\n", boundary);
        let closing = format!("--{}--", boundary);
        let text = body;
        let mut parts = Vec::new();
        let mut rest = text;
        loop {
            let start = match find(rest, delim.as_bytes()) {
                Some(i) => i + delim.len(),
                None => break,
            };
            rest = &rest[start..];
            let end = find(rest, format!("--{}", boundary).as_bytes()).unwrap();
            let part = &rest[..end];
            rest = &rest[end..];

            let header_end = find(part, b"\r\n\r\n").unwrap();
            let headers = std::str::from_utf8(&part[..header_end]).unwrap();
            // payload runs to the CRLF that precedes the next boundary
            let payload = &part[header_end + 4..part.len() - 2];

            let name = headers
                .lines()
                .find(|l| l.starts_with("Content-Disposition"))
                .and_then(|l| l.split("name=\"").nth(1))
                .and_then(|l| l.split('"').next())
                .unwrap()
                .to_string();
            parts.push((name, payload.to_vec()));
        }
        assert!(find(text, closing.as_bytes()).is_some());
        parts
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn decode_name(encoded: &str) -> String {
        let bytes = encoded.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_part_framing_is_exact() {
        let fields = [MultipartField::text("key", "some/object")];
        let (body, header) = encode("BOUNDARY", &fields).unwrap();
        assert_eq!(header, "multipart/form-data; boundary=BOUNDARY");
        assert_eq!(
            body,
            b"--BOUNDARY\r\n\
              Content-Disposition: form-data; name=\"key\"\r\n\
              \r\n\
              some/object\r\n\
              --BOUNDARY--"
                .to_vec()
        );
    }

    #[test]
    fn file_part_carries_all_headers() {
        let fields = [MultipartField::file(
            "file",
            FileContent::Bytes(b"\x00\x01binary"),
            "application/octet-stream",
            "data.bin",
            8,
        )];
        let (body, _) = encode("B", &fields).unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"file\"; filename=\"data.bin\"\r\n"
        ));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: binary\r\n\r\n"));
    }

    #[test]
    fn round_trip_preserves_fields_and_file_bytes() {
        let payload = b"some non-utf8 bytes \xff\xfe here";
        let fields = [
            MultipartField::text("acl", "public-read"),
            MultipartField::text("success_action_status", "201"),
            MultipartField::file(
                "file",
                FileContent::Bytes(payload),
                "application/octet-stream",
                "blob.bin",
                payload.len() as u64,
            ),
        ];
        let (body, _) = encode("xyzzy", &fields).unwrap();
        let parts = parse_body(&body, "xyzzy");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ("acl".into(), b"public-read".to_vec()));
        assert_eq!(parts[1], ("success_action_status".into(), b"201".to_vec()));
        assert_eq!(parts[2].0, "file");
        assert_eq!(parts[2].1, payload.to_vec());
    }

    #[test]
    fn file_content_is_read_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"on disk").unwrap();
        let fields = [MultipartField::file(
            "file",
            FileContent::Path(tmp.path()),
            "text/plain",
            "tmp.txt",
            7,
        )];
        let (body, _) = encode("B", &fields).unwrap();
        let parts = parse_body(&body, "B");
        assert_eq!(parts[0].1, b"on disk".to_vec());
    }

    #[test]
    fn missing_file_is_source_unreadable() {
        let fields = [MultipartField::file(
            "file",
            FileContent::Path(Path::new("/no/such/file")),
            "text/plain",
            "gone.txt",
            0,
        )];
        match encode("B", &fields) {
            Err(UploadError::SourceUnreadable { path, .. }) => {
                assert_eq!(path, Path::new("/no/such/file"));
            }
            other => panic!("expected SourceUnreadable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn file_field_must_come_last() {
        let fields = [
            MultipartField::file("file", FileContent::Bytes(b"x"), "text/plain", "a", 1),
            MultipartField::text("acl", "private"),
        ];
        assert!(matches!(
            encode("B", &fields),
            Err(UploadError::FileFieldOrdering)
        ));
    }

    #[test]
    fn names_outside_allowlist_are_escaped_lowercase() {
        assert_eq!(encode_name("Content-Type"), "Content-Type");
        assert_eq!(encode_name("a b"), "a%20b");
        assert_eq!(encode_name("ümlaut/x"), "%c3%bcmlaut%2fx");
        for name in ["plain_name-1.2", "spaced out", "slash/colon:pct%"] {
            assert_eq!(decode_name(&encode_name(name)), name);
        }
    }
}
