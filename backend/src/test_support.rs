//! Fixtures shared by the unit tests.

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpResponse, HttpServer, web};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::imaging::loader::{CanonicalImage, FETCH_TIMEOUT, ImageLoader};
use crate::inference::{InferenceError, ModelRegistry, Segmenter};
use crate::pipeline::PredictionService;
use crate::storage::artifact_store::ArtifactStore;

/// Returns the input frame unchanged and records how it was called.
#[derive(Default)]
pub struct StubSegmenter {
    pub calls: AtomicUsize,
    pub last_confidence: Mutex<Option<f32>>,
    pub last_dimensions: Mutex<Option<(u32, u32)>>,
    fail: bool,
}

impl StubSegmenter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl Segmenter for StubSegmenter {
    fn segment(&self, image: &CanonicalImage, confidence: f32) -> Result<RgbImage, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_confidence.lock().unwrap() = Some(confidence);
        *self.last_dimensions.lock().unwrap() = Some(image.as_rgb().dimensions());
        if self.fail {
            return Err(InferenceError::Runtime("stub failure".into()));
        }
        Ok(image.as_rgb().clone())
    }
}

pub fn service_from(
    root: &Path,
    soil: Arc<StubSegmenter>,
    vegetation: Arc<StubSegmenter>,
) -> PredictionService {
    let loader = ImageLoader::new(FETCH_TIMEOUT).unwrap();
    let store = Arc::new(ArtifactStore::open(root).unwrap());
    PredictionService::new(loader, ModelRegistry::new(soil, vegetation), store)
}

pub fn service_with(root: &Path) -> (PredictionService, Arc<StubSegmenter>, Arc<StubSegmenter>) {
    let soil = Arc::new(StubSegmenter::default());
    let vegetation = Arc::new(StubSegmenter::default());
    let service = service_from(root, soil.clone(), vegetation.clone());
    (service, soil, vegetation)
}

pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    });
    encode_image(&DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

/// Local HTTP server standing in for remote image hosts.
pub struct FixtureServer {
    addr: SocketAddr,
    handle: ServerHandle,
}

impl FixtureServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Serves `/ok.jpg` (a JPEG), `/text` (plain text) and `/slow` (a JPEG after
/// two seconds); everything else is 404.
pub async fn spawn_fixture_server() -> FixtureServer {
    let server = HttpServer::new(|| {
        App::new()
            .route(
                "/ok.jpg",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("image/jpeg")
                        .body(sample_jpeg(120, 80))
                }),
            )
            .route(
                "/text",
                web::get().to(|| async { HttpResponse::Ok().body("hello") }),
            )
            .route(
                "/slow",
                web::get().to(|| async {
                    actix_web::rt::time::sleep(Duration::from_secs(2)).await;
                    HttpResponse::Ok()
                        .content_type("image/jpeg")
                        .body(sample_jpeg(8, 8))
                }),
            )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);
    FixtureServer { addr, handle }
}
