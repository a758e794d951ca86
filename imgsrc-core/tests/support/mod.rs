#![allow(dead_code)]

use anyhow::Result;
use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use image::{ImageFormat, Rgba, RgbaImage};
use imgsrc_core::{Loader, LoaderConfig};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;
use url::Url;

pub const PNG_WIDTH: u32 = 24;
pub const PNG_HEIGHT: u32 = 12;
pub const TOKEN: &str = "Bearer poster-token";

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("imgsrc_core=debug"),
        )
        .is_test(true)
        .try_init();
    });
}

pub fn png_bytes() -> Vec<u8> {
    let image =
        RgbaImage::from_pixel(PNG_WIDTH, PNG_HEIGHT, Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

fn png_response() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], png_bytes())
}

async fn poster() -> impl IntoResponse {
    png_response()
}

async fn private_poster(headers: HeaderMap) -> axum::response::Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value == TOKEN);
    let accepts_images = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("image/*"));
    if authorized && accepts_images {
        png_response().into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn html_page() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<!doctype html><html><body>not an image</body></html>",
    )
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn slow_poster() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    png_response()
}

pub struct TestServer {
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        init_logging();
        let app = Router::new()
            .route("/poster.png", get(poster))
            .route("/private/poster.png", get(private_poster))
            .route("/page.html", get(html_page))
            .route("/missing.png", get(missing))
            .route("/slow.png", get(slow_poster));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                log::error!("test server stopped: {err}");
            }
        });
        Ok(Self { addr })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("http://{}/", self.addr))?)
    }

    pub fn loader(&self) -> Result<Loader> {
        self.loader_with(LoaderConfig {
            request_timeout: Duration::from_secs(10),
            ..LoaderConfig::default()
        })
    }

    pub fn loader_with(&self, config: LoaderConfig) -> Result<Loader> {
        Ok(Loader::new(config.with_base_url(self.base_url()?))?)
    }
}
