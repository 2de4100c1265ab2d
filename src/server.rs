//! Static feed server
//!
//! Serves the base directory (feed documents and the audio library) over
//! HTTP. Before binding, the host placeholder in every generated feed is
//! replaced with this machine's outbound address.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::publish::{INDEX_FILE, url_path};
use crate::store::write_atomic;
use crate::utils::{audio_mime_type, is_audio_file};
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Content type for feed documents
pub const FEED_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// Best-effort outbound address of this machine
///
/// Connecting a UDP socket sends nothing; it only asks the OS which local
/// address would route to `probe`. Falls back to loopback.
pub fn detect_host(probe: SocketAddr) -> IpAddr {
    let bind: SocketAddr = if probe.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let detected = UdpSocket::bind(bind)
        .and_then(|socket| {
            socket.connect(probe)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match detected {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            debug!(error = %e, "host detection failed, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Replace `from` with `to` in every feed document, returning how many changed
///
/// A missing feeds directory is not an error.
pub fn patch_feeds(feeds_dir: &Path, from: &str, to: &str) -> Result<usize> {
    let entries = match std::fs::read_dir(feeds_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut patched = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "xml") || !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        if !text.contains(from) {
            continue;
        }
        write_atomic(&path, text.replace(from, to).as_bytes())?;
        debug!(path = %path.display(), "patched feed host");
        patched += 1;
    }
    Ok(patched)
}

/// Content type override for a request path, if any
pub fn content_type_for(path: &str) -> Option<&'static str> {
    let path = Path::new(path);
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")) {
        Some(FEED_CONTENT_TYPE)
    } else if is_audio_file(path) {
        Some(audio_mime_type(path))
    } else {
        None
    }
}

async fn override_content_type(request: Request, next: Next) -> Response {
    let content_type = content_type_for(request.uri().path());
    let mut response = next.run(request).await;
    if let Some(value) = content_type
        && response.status().is_success()
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
    }
    response
}

/// Router serving `base_dir` as static files
pub fn router(base_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(base_dir))
        .layer(middleware::from_fn(override_content_type))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serving setup resolved before the listener is bound
#[derive(Debug, Clone)]
pub struct FeedServer {
    base_dir: PathBuf,
    feeds_dir: PathBuf,
    port: u16,
    host: IpAddr,
    placeholder: String,
}

impl FeedServer {
    /// Resolve the served directory and this machine's address
    ///
    /// A missing base directory is a fatal configuration error.
    pub fn new(config: &Config) -> Result<Self> {
        let base_dir = std::path::absolute(&config.paths.base_dir)?;
        if !base_dir.is_dir() {
            return Err(Error::config(
                format!("directory not found: {}", base_dir.display()),
                "paths.base_dir",
            ));
        }

        Ok(Self {
            feeds_dir: std::path::absolute(config.paths.feeds_root())?,
            base_dir,
            port: config.server.port,
            host: detect_host(config.server.probe_address),
            placeholder: config.publish.host_placeholder.clone(),
        })
    }

    /// Address substituted into feeds
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Public base URL, e.g. `http://192.168.1.10:8000`
    pub fn base_url(&self) -> String {
        match self.host {
            IpAddr::V6(ip) => format!("http://[{ip}]:{}", self.port),
            IpAddr::V4(ip) => format!("http://{ip}:{}", self.port),
        }
    }

    /// Substitute the host placeholder in every generated feed
    pub fn patch(&self) -> Result<usize> {
        let from = format!("http://{}:{}", self.placeholder, self.port);
        let patched = patch_feeds(&self.feeds_dir, &from, &self.base_url())?;
        info!(patched, host = %self.host, "feeds patched with serving address");
        Ok(patched)
    }

    /// Subscription URLs for every feed currently in the feeds directory
    pub fn feed_urls(&self) -> Vec<String> {
        let Ok(rel) = self.feeds_dir.strip_prefix(&self.base_dir) else {
            warn!(
                feeds_dir = %self.feeds_dir.display(),
                "feeds directory is outside the served directory"
            );
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(&self.feeds_dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".xml"))
            .collect();
        names.sort();
        names.push(INDEX_FILE.to_string());

        names
            .iter()
            .map(|name| format!("{}/{}", self.base_url(), url_path(&rel.join(name))))
            .collect()
    }

    /// Patch feeds, bind on all interfaces and serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.patch()?;

        if self.feeds_dir.is_dir() {
            for url in self.feed_urls() {
                info!(url = %url, "feed available");
            }
        } else {
            info!(
                feeds_dir = %self.feeds_dir.display(),
                "no feeds directory yet, run publish first"
            );
        }

        let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| Error::Server(format!("failed to bind {address}: {e}")))?;
        info!(
            address = %address,
            base_dir = %self.base_dir.display(),
            "feed server listening"
        );

        axum::serve(listener, router(&self.base_dir))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        info!("feed server stopped");
        Ok(())
    }
}
