use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::debug;
use serde::Serialize;
use url::Url;

use crate::{
    error::{GenerationError, Result},
    request::ImageReference,
    session::Session,
    status::StatusEvent,
    transport::{Body, HttpRequest, Method},
};

/// Inline image part for `generateContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImagePart {
    pub inline_data: InlineImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Fails on the first local path that is not a regular file.
/// Runs before any request is sent.
pub async fn check_references(images: &[ImageReference]) -> Result<()> {
    for image in images {
        if let ImageReference::LocalPath(path) = image {
            let is_file = tokio::fs::metadata(path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(GenerationError::ImageNotFound(image.display_name()));
            }
        }
    }
    Ok(())
}

/// Turns every reference into a URL the job API can fetch, uploading local files.
pub(crate) async fn resolve_to_urls(
    session: &Session<'_>,
    images: &[ImageReference],
) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(images.len());
    for image in images {
        match image {
            ImageReference::Url(url) => urls.push(url.clone()),
            ImageReference::LocalPath(path) => {
                session.emit(StatusEvent::UploadingImage);
                urls.push(upload_file(session, path).await?);
            }
        }
    }
    Ok(urls)
}

/// Reads or downloads every reference and embeds it as base64.
pub(crate) async fn resolve_to_inline(
    session: &Session<'_>,
    images: &[ImageReference],
) -> Result<Vec<InlineImagePart>> {
    let mut parts = Vec::with_capacity(images.len());
    for image in images {
        session.emit(StatusEvent::LoadingImage);
        let (bytes, mime_type) = match image {
            ImageReference::Url(url) => {
                let req = HttpRequest::get(url.as_str(), session.config.transfer_timeout)
                    .accept("*/*");
                let resp = session.send(req).await?;
                (resp.body.to_vec(), guess_mime_type(url_path(url)))
            }
            ImageReference::LocalPath(path) => {
                let bytes = read_file(path).await?;
                (bytes, guess_mime_type(&path.to_string_lossy()))
            }
        };
        debug!("inlined {} ({mime_type}, {} bytes)", image.display_name(), bytes.len());
        parts.push(InlineImagePart {
            inline_data: InlineImage {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(bytes),
            },
        });
    }
    Ok(parts)
}

async fn upload_file(session: &Session<'_>, path: &Path) -> Result<String> {
    let bytes = read_file(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    let mime_type = guess_mime_type(&file_name).to_string();

    let req = HttpRequest {
        method: Method::Post,
        url: session.config.upload_url.clone(),
        bearer: None,
        accept: "text/plain",
        body: Some(Body::Multipart {
            field: "file",
            file_name,
            mime_type,
            bytes,
        }),
        timeout: session.config.transfer_timeout,
    };
    let resp = session.send(req).await?;
    let url = resp.text().trim().to_string();
    if !is_http_url(&url) {
        return Err(GenerationError::InvalidResponse(format!(
            "Unexpected upload response: {url}"
        )));
    }
    debug!("uploaded {} to {url}", path.display());
    Ok(url)
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(GenerationError::io(format!("reading {}", path.display())))
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn url_path(raw: &str) -> &str {
    raw.split(['?', '#']).next().unwrap_or(raw)
}

pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::{
        config::GenerationConfig,
        status::{CancelToken, status_channel},
        transport::testing::FakeTransport,
    };

    #[test]
    fn mime_types() {
        assert_eq!(guess_mime_type("cat.PNG"), "image/png");
        assert_eq!(guess_mime_type("dir.v2/cat.jpeg"), "image/jpeg");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
        assert_eq!(url_path("https://h/x.webp?sig=1"), "https://h/x.webp");
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let images = vec![
            ImageReference::Url("https://example.com/a.png".into()),
            ImageReference::LocalPath("/definitely/not/here.png".into()),
        ];
        let err = check_references(&images).await.unwrap_err();
        assert!(matches!(err, GenerationError::ImageNotFound(p) if p.contains("not/here.png")));
    }

    #[tokio::test]
    async fn directory_is_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![ImageReference::LocalPath(dir.path().to_path_buf())];
        assert!(check_references(&images).await.is_err());
    }

    #[tokio::test]
    async fn local_files_are_uploaded() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"pixels").unwrap();

        let transport = FakeTransport::new().respond(
            Method::Post,
            "0x0.st",
            200,
            "https://0x0.st/abc.png\n",
        );
        let config = GenerationConfig::default();
        let (tx, mut rx) = status_channel();
        let cancel = CancelToken::new();
        let session = Session::new(&config, "key", &transport, &tx, &cancel);

        let images = vec![
            ImageReference::Url("https://example.com/a.png".into()),
            ImageReference::LocalPath(file.path().to_path_buf()),
        ];
        let urls = resolve_to_urls(&session, &images).await.unwrap();
        assert_eq!(urls, ["https://example.com/a.png", "https://0x0.st/abc.png"]);
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::UploadingImage);

        let reqs = transport.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].bearer, None);
        match &reqs[0].body {
            Some(Body::Multipart {
                field,
                mime_type,
                bytes,
                ..
            }) => {
                assert_eq!(*field, "file");
                assert_eq!(mime_type, "image/png");
                assert_eq!(bytes, b"pixels");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_upload_reply() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"x").unwrap();

        let transport = FakeTransport::new().respond(Method::Post, "0x0.st", 200, "rate limited");
        let config = GenerationConfig::default();
        let (tx, _rx) = status_channel();
        let cancel = CancelToken::new();
        let session = Session::new(&config, "key", &transport, &tx, &cancel);

        let images = vec![ImageReference::LocalPath(file.path().to_path_buf())];
        let err = resolve_to_urls(&session, &images).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(m) if m.contains("rate limited")));
    }

    #[tokio::test]
    async fn inline_parts_from_file_and_url() {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"ABC").unwrap();

        let transport =
            FakeTransport::new().respond(Method::Get, "example.com/b.webp", 200, "XYZ");
        let config = GenerationConfig::default();
        let (tx, _rx) = status_channel();
        let cancel = CancelToken::new();
        let session = Session::new(&config, "key", &transport, &tx, &cancel);

        let images = vec![
            ImageReference::LocalPath(file.path().to_path_buf()),
            ImageReference::Url("https://example.com/b.webp".into()),
        ];
        let parts = resolve_to_inline(&session, &images).await.unwrap();
        assert_eq!(parts[0].inline_data.mime_type, "image/jpeg");
        assert_eq!(parts[0].inline_data.data, "QUJD");
        assert_eq!(parts[1].inline_data.mime_type, "image/webp");
        assert_eq!(parts[1].inline_data.data, "WFla");
    }
}
