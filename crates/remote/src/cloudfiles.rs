// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cloud Files (OpenStack Swift) blob store over blocking HTTP

use crate::auth::TokenProvider;
use crate::objects::{
    ObjectBody, ObjectEntry, ObjectLister, ObjectMeta, ObjectReader, ObjectRef, ObjectUpload,
    ObjectWriter, PutReceipt,
};
use crate::{RemoteError, Result};
use diagnostics::*;
use reqwest::blocking::{Body, RequestBuilder, Response};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const AUTH_HEADER: &str = "X-Auth-Token";
const MANIFEST_HEADER: &str = "X-Object-Manifest";
const CONNECT_TIMEOUT_SECONDS: u64 = 30;
const IDENTITY_ENCODING: &str = "identity";

/// Swift returns at most this many names per listing request
pub const LISTING_PAGE_SIZE: usize = 10_000;

/// Cloud Files client bound to one storage account URL
pub struct CloudFilesClient {
    http: reqwest::blocking::Client,
    storage_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl CloudFilesClient {
    /// Create a client for `storage_url` (the `object-store` catalog endpoint,
    /// e.g. `https://storage101.dfw1.clouddrive.com/v1/MossoCloudFS_abc`).
    pub fn new(storage_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        // No overall timeout: object bodies can run to many gigabytes.
        // Bodies are hashed as stored, so they must never be decoded in transit.
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .timeout(None::<Duration>)
            .no_gzip()
            .build()?;
        Ok(Self {
            http,
            storage_url: Url::parse(storage_url)?,
            tokens,
        })
    }

    /// URL of a container, with the container name percent-encoded
    pub fn container_url(&self, container: &str) -> Result<Url> {
        self.url_for(&[container])
    }

    /// URL of an object. Each `/`-separated part of the name is encoded as
    /// its own path segment so the slashes survive.
    pub fn object_url(&self, object: &ObjectRef) -> Result<Url> {
        let mut parts = vec![object.container.as_str()];
        parts.extend(object.name.split('/'));
        self.url_for(&parts)
    }

    fn url_for(&self, parts: &[&str]) -> Result<Url> {
        let mut url = self.storage_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| RemoteError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty();
            for part in parts {
                segments.push(part);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.tokens.current_token()?;
        Ok(self.http.request(method, url).header(AUTH_HEADER, token))
    }

    /// Request for an object's stored bytes, never a content-coded variant
    fn object_request(&self, method: Method, object: &ObjectRef) -> Result<RequestBuilder> {
        let url = self.object_url(object)?;
        Ok(self.request(method, url)?.header(ACCEPT_ENCODING, IDENTITY_ENCODING))
    }

    /// Send a request, turning any non-success status into [`RemoteError::Status`]
    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate();
        }
        let url = response.url().to_string();
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            url,
            body,
        })
    }

    fn not_found_or(object: &ObjectRef, err: RemoteError) -> RemoteError {
        match err.status_code() {
            Some(404) => RemoteError::ObjectNotFound {
                container: object.container.clone(),
                name: object.name.clone(),
            },
            _ => err,
        }
    }
}

/// Extract the object headers the pipeline cares about
pub(crate) fn meta_from_headers(headers: &HeaderMap) -> ObjectMeta {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ObjectMeta {
        content_length: text(CONTENT_LENGTH.as_str()).and_then(|v| v.trim().parse().ok()),
        etag: text(ETAG.as_str()),
        manifest: text(MANIFEST_HEADER),
    }
}

impl ObjectLister for CloudFilesClient {
    fn list_objects(&self, container: &str, prefix: Option<&str>) -> Result<Vec<ObjectEntry>> {
        let url = self.container_url(container)?;
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![
                ("format", "json".to_string()),
                ("limit", LISTING_PAGE_SIZE.to_string()),
            ];
            if let Some(prefix) = prefix {
                query.push(("prefix", prefix.to_string()));
            }
            if let Some(marker) = &marker {
                query.push(("marker", marker.clone()));
            }

            let response = self.send(self.request(Method::GET, url.clone())?.query(&query))?;
            if response.status() == StatusCode::NO_CONTENT {
                break;
            }
            let text = response.text()?;
            if text.trim().is_empty() {
                break;
            }

            let page: Vec<ObjectEntry> = serde_json::from_str(&text)?;
            let short_page = page.len() < LISTING_PAGE_SIZE;
            marker = page.last().map(|e| e.name.clone());
            entries.extend(page);

            if short_page || marker.is_none() {
                break;
            }
        }

        let count = entries.len();
        debug!("Listed {count} objects in {container}", count: count, container: container);
        Ok(entries)
    }
}

impl ObjectReader for CloudFilesClient {
    fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let response = self
            .send(self.object_request(Method::GET, object)?)
            .map_err(|e| Self::not_found_or(object, e))?;
        let meta = meta_from_headers(response.headers());
        Ok(ObjectBody {
            reader: Box::new(response),
            meta,
        })
    }

    fn head_object(&self, object: &ObjectRef) -> Result<ObjectMeta> {
        let response = self
            .send(self.object_request(Method::HEAD, object)?)
            .map_err(|e| Self::not_found_or(object, e))?;
        Ok(meta_from_headers(response.headers()))
    }
}

impl ObjectWriter for CloudFilesClient {
    fn put_object(&self, object: &ObjectRef, upload: ObjectUpload) -> Result<PutReceipt> {
        let url = self.object_url(object)?;
        let mut request = self
            .request(Method::PUT, url.clone())?
            .header(CONTENT_TYPE, upload.content_type)
            .body(Body::sized(upload.reader, upload.content_length));
        if let Some(etag) = upload.etag {
            // Swift compares the request ETag against its own lowercase MD5
            request = request.header(ETAG, etag.to_ascii_lowercase());
        }

        let response = self.send(request)?;
        let etag = meta_from_headers(response.headers()).etag;
        if etag.is_none() {
            warn!("PUT to {url} returned no ETag", url: url.as_str());
        }
        Ok(PutReceipt { etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use reqwest::header::HeaderValue;

    fn client() -> CloudFilesClient {
        CloudFilesClient::new(
            "https://storage101.dfw1.clouddrive.com/v1/MossoCloudFS_abc",
            Arc::new(StaticToken("token".to_string())),
        )
        .expect("client")
    }

    #[test]
    fn test_object_url_keeps_slashes() {
        let url = client()
            .object_url(&ObjectRef::new("cloudbackup", "vault one/DB/12"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage101.dfw1.clouddrive.com/v1/MossoCloudFS_abc/cloudbackup/vault%20one/DB/12"
        );
    }

    #[test]
    fn test_object_requests_ask_for_stored_bytes() {
        let client = client();
        let object = ObjectRef::new("cloudbackup", "vault/DB/12");
        for method in [Method::GET, Method::HEAD] {
            let request = client
                .object_request(method, &object)
                .expect("request")
                .build()
                .expect("build");
            assert_eq!(
                request.headers().get(ACCEPT_ENCODING),
                Some(&HeaderValue::from_static("identity"))
            );
            assert_eq!(
                request.headers().get(AUTH_HEADER),
                Some(&HeaderValue::from_static("token"))
            );
        }
    }

    #[test]
    fn test_container_url_encodes_name() {
        let url = client().container_url("a?b").expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage101.dfw1.clouddrive.com/v1/MossoCloudFS_abc/a%3Fb"
        );
    }

    #[test]
    fn test_trailing_slash_on_storage_url() {
        let c = CloudFilesClient::new(
            "https://storage.example.com/v1/acct/",
            Arc::new(StaticToken("t".to_string())),
        )
        .expect("client");
        let url = c
            .object_url(&ObjectRef::new("c", "v/BUNDLES/0000000001"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.example.com/v1/acct/c/v/BUNDLES/0000000001"
        );
    }

    #[test]
    fn test_meta_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5368709121"));
        headers.insert(ETAG, HeaderValue::from_static("\"d41d8cd98f00b204e9800998ecf8427e\""));
        headers.insert(MANIFEST_HEADER, HeaderValue::from_static("segments/vault/DB/9/"));

        let meta = meta_from_headers(&headers);
        assert_eq!(meta.content_length, Some(5_368_709_121));
        assert_eq!(
            meta.etag.as_deref(),
            Some("\"d41d8cd98f00b204e9800998ecf8427e\"")
        );
        assert_eq!(meta.manifest.as_deref(), Some("segments/vault/DB/9/"));
    }
}
