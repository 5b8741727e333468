//! Fixture server standing in for the module CDN and the photo host.

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use pamphlet::capability::{CdnModuleSource, DependencyLoader};
use pamphlet::{Capability, ExportConfig};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

pub const SLOW_IMAGE_MS: u64 = 300;

pub struct Fixture {
    pub base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    pdf_up: Arc<AtomicBool>,
}

impl Fixture {
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    pub fn set_pdf_available(&self, up: bool) {
        self.pdf_up.store(up, Ordering::SeqCst);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// CDN source whose three module URLs point at this server.
    pub fn module_source(&self) -> CdnModuleSource {
        CdnModuleSource::new(&ExportConfig::default())
            .unwrap()
            .with_url(Capability::BitmapSnapshot, self.url("/modules/html-to-image.js"))
            .with_url(Capability::PdfAuthor, self.url("/modules/jspdf.js"))
            .with_url(Capability::SlideAuthor, self.url("/modules/pptxgen.js"))
    }

    pub fn loader(&self) -> Arc<DependencyLoader> {
        Arc::new(DependencyLoader::new(Arc::new(self.module_source())))
    }

    pub fn config(&self) -> ExportConfig {
        ExportConfig {
            page_origin: Some(url::Url::parse(&self.base).unwrap()),
            ..Default::default()
        }
    }
}

pub fn photo_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(48, 48, |x, _| {
        if x < 24 {
            Rgba([200, 40, 40, 255])
        } else {
            Rgba([40, 40, 200, 255])
        }
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn header(s: &str) -> Header {
    s.parse::<Header>().unwrap()
}

fn js(body: &str) -> Response<Cursor<Vec<u8>>> {
    Response::from_string(body).with_header(header("Content-Type: application/javascript"))
}

/// Start a server on an ephemeral port.
///
/// Routes:
/// - `/modules/html-to-image.js`, `/modules/pptxgen.js`: valid modules
/// - `/modules/jspdf.js`: 503 until `set_pdf_available(true)`
/// - `/modules/empty.js`: a module without any of the entry points
/// - `/img/*.png`: a 48x48 photo; `/img/slow.png` answers after
///   `SLOW_IMAGE_MS`; `/img/missing.png` is a 404
pub fn start(pdf_available: bool) -> Fixture {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let hits = Arc::new(Mutex::new(HashMap::new()));
    let pdf_up = Arc::new(AtomicBool::new(pdf_available));

    let thread_hits = hits.clone();
    let thread_pdf_up = pdf_up.clone();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let path = request.url().to_string();
            *thread_hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

            match path.as_str() {
                "/modules/html-to-image.js" => {
                    let _ = request.respond(js("var n=async()=>'';export{n as toPng,t as toJpeg};"));
                }
                "/modules/jspdf.js" if thread_pdf_up.load(Ordering::SeqCst) => {
                    let _ = request.respond(js("var Ti=function(){};export{Ti as jsPDF,Ri as AcroForm};"));
                }
                "/modules/jspdf.js" => {
                    let _ = request.respond(Response::from_string("upstream down").with_status_code(503));
                }
                "/modules/pptxgen.js" => {
                    let _ = request.respond(js("class P{};export{P as default};"));
                }
                "/modules/empty.js" => {
                    let _ = request.respond(js("export const version = '1.0.0';"));
                }
                "/img/missing.png" => {
                    let _ = request.respond(Response::from_string("not found").with_status_code(404));
                }
                "/img/slow.png" => {
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(SLOW_IMAGE_MS));
                        let _ = request.respond(
                            Response::from_data(photo_png()).with_header(header("Content-Type: image/png")),
                        );
                    });
                }
                p if p.starts_with("/img/") => {
                    let _ = request.respond(
                        Response::from_data(photo_png()).with_header(header("Content-Type: image/png")),
                    );
                }
                _ => {
                    let _ = request.respond(Response::from_string("no route").with_status_code(404));
                }
            }
        }
    });

    Fixture {
        base: format!("http://127.0.0.1:{}", port),
        hits,
        pdf_up,
    }
}
