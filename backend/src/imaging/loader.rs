use image::imageops::FilterType;
use image::RgbImage;
use std::io::Cursor;
use std::time::Duration;
use url::Url;

use crate::error::InputError;

pub const CANONICAL_SIZE: u32 = 640;
/// Single GET, no retry.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where an image comes from. The HTTP layer decides which variant applies.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// RGB raster of exactly `CANONICAL_SIZE` x `CANONICAL_SIZE` pixels.
#[derive(Debug, Clone)]
pub struct CanonicalImage(RgbImage);

impl CanonicalImage {
    pub fn from_encoded(data: &[u8]) -> Result<Self, InputError> {
        let decoded = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| InputError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| InputError::Decode(e.to_string()))?;

        // Aspect ratio is not preserved.
        let rgb = image::imageops::resize(
            &decoded.to_rgb8(),
            CANONICAL_SIZE,
            CANONICAL_SIZE,
            FilterType::CatmullRom,
        );
        Ok(Self(rgb))
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }
}

#[derive(Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
    timeout: Duration,
}

impl ImageLoader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Turns any supported source into a canonical image. URLs cost exactly one GET.
    pub async fn load(&self, source: ImageSource) -> Result<CanonicalImage, InputError> {
        let data = match source {
            ImageSource::Bytes(data) => data,
            ImageSource::Url(url) => self.fetch(&url).await?,
        };
        CanonicalImage::from_encoded(&data)
    }

    async fn fetch(&self, raw_url: &str) -> Result<Vec<u8>, InputError> {
        if !(raw_url.starts_with("http://") || raw_url.starts_with("https://")) {
            return Err(InputError::UnsupportedSource);
        }
        let url = Url::parse(raw_url).map_err(|e| InputError::Fetch {
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;

        log::debug!("Fetching image from {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {:?}", self.timeout)
            } else {
                e.to_string()
            };
            InputError::Fetch {
                url: raw_url.to_string(),
                reason,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InputError::HttpStatus {
                url: raw_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| InputError::Fetch {
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Fetched {} bytes from {}", body.len(), raw_url);
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encode_image, spawn_fixture_server};
    use image::{ImageFormat, Rgba, RgbaImage};

    fn loader() -> ImageLoader {
        ImageLoader::new(FETCH_TIMEOUT).unwrap()
    }

    #[actix_web::test]
    async fn bytes_of_any_shape_become_640_square_rgb() {
        let wide = RgbaImage::from_pixel(100, 30, Rgba([10, 200, 30, 128]));
        let png = encode_image(&image::DynamicImage::ImageRgba8(wide), ImageFormat::Png);

        let image = loader().load(ImageSource::Bytes(png)).await.unwrap();
        assert_eq!(image.as_rgb().dimensions(), (640, 640));
        assert_eq!(image.as_rgb().get_pixel(320, 15).0.len(), 3);
    }

    #[actix_web::test]
    async fn non_http_string_is_rejected_without_fetching() {
        for raw in ["ftp://example.com/a.png", "example.com/a.png", "/etc/passwd", ""] {
            let err = loader().load(ImageSource::Url(raw.into())).await.unwrap_err();
            assert!(matches!(err, InputError::UnsupportedSource), "{}", raw);
        }
    }

    #[actix_web::test]
    async fn undecodable_bytes_are_invalid_input() {
        let err = loader()
            .load(ImageSource::Bytes(b"definitely not an image".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::Decode(_)));
    }

    #[actix_web::test]
    async fn url_payload_is_fetched_and_canonicalised() {
        let server = spawn_fixture_server().await;

        let image = loader()
            .load(ImageSource::Url(server.url("/ok.jpg")))
            .await
            .unwrap();
        assert_eq!(image.as_rgb().dimensions(), (640, 640));

        let err = loader()
            .load(ImageSource::Url(server.url("/missing.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::HttpStatus { status: 404, .. }));

        let err = loader()
            .load(ImageSource::Url(server.url("/text")))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::Decode(_)));

        server.stop().await;
    }

    #[actix_web::test]
    async fn slow_host_hits_the_timeout() {
        let server = spawn_fixture_server().await;
        let loader = ImageLoader::new(Duration::from_millis(200)).unwrap();

        let err = loader
            .load(ImageSource::Url(server.url("/slow")))
            .await
            .unwrap_err();
        match err {
            InputError::Fetch { reason, .. } => assert!(reason.contains("timed out"), "{}", reason),
            other => panic!("unexpected error: {:?}", other),
        }

        server.stop().await;
    }

    #[actix_web::test]
    async fn refused_connection_is_a_fetch_error() {
        // Reserve a port, then free it so nothing is listening there.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let err = loader()
            .load(ImageSource::Url(format!("http://{}/x.png", addr)))
            .await
            .unwrap_err();
        match err {
            InputError::Fetch { reason, .. } => assert!(!reason.contains("timed out"), "{}", reason),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
