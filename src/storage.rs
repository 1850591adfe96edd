// Storage endpoint transport. The multipart body is built elsewhere;
// this module only posts the finished bytes and interprets the
// bucket's XML replies.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::error::Result;

pub struct StorageReply {
    pub status: u16,
    pub body: String,
}

/// Seam over the storage POST so the workflow can run against fakes.
pub trait StorageTransport {
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<StorageReply>;
}

/// Blocking HTTP transport. The optional timeout bounds only this
/// binary-transfer step; registry calls keep the client default.
pub struct HttpStorage {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpStorage {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(HttpStorage { client, timeout })
    }
}

impl StorageTransport for HttpStorage {
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<StorageReply> {
        debug!("POST {} ({} bytes)", url, body.len());
        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let res = req.send()?;
        let status = res.status().as_u16();
        let body = res.text().unwrap_or_else(|_| "".into());
        Ok(StorageReply { status, body })
    }
}

#[derive(Deserialize)]
struct PostResponse {
    #[serde(rename = "Location")]
    location: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

/// Extract the stored object's URL from a success body like
/// `<PostResponse><Location>…</Location></PostResponse>`.
pub fn success_location(body: &str) -> Option<String> {
    quick_xml::de::from_str::<PostResponse>(body)
        .ok()
        .map(|r| r.location)
}

/// Extract (code, message) from an error body like
/// `<Error><Code>…</Code><Message>…</Message></Error>`.
pub fn error_details(body: &str) -> Option<(String, String)> {
    quick_xml::de::from_str::<ErrorResponse>(body)
        .ok()
        .map(|r| (r.code, r.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_extracted_from_success_body() {
        let body = "<PostResponse><Location>https://bucket/key123</Location></PostResponse>";
        assert_eq!(
            success_location(body),
            Some("https://bucket/key123".to_string())
        );
    }

    #[test]
    fn error_code_and_message_are_extracted() {
        let body = "<Error><Code>AccessDenied</Code><Message>bad sig</Message>\
                    <RequestId>r1</RequestId></Error>";
        assert_eq!(
            error_details(body),
            Some(("AccessDenied".to_string(), "bad sig".to_string()))
        );
    }

    #[test]
    fn malformed_bodies_yield_none() {
        assert_eq!(success_location("not xml"), None);
        assert_eq!(error_details("<Error></Error>"), None);
    }
}
