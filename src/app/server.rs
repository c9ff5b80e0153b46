use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{OriginalUri, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;

use crate::app::envfs::{File, FileSystem};
use crate::app::formatter::OutputGenerator;
use crate::app::models::ServerOptions;

#[derive(Clone)]
pub struct AppState {
    pub fs: Arc<dyn FileSystem>,
    /// `/doc` when serving under a context, otherwise empty.
    pub prefix: String,
}

/// A fully loaded response body.
#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub content_length: u64,
}

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.content_type.to_string()),
                (header::CONTENT_LENGTH, self.content_length.to_string()),
            ],
            self.body,
        )
            .into_response()
    }
}

pub fn router(fs: Arc<dyn FileSystem>, options: &ServerOptions) -> Router {
    let prefix = options
        .context
        .as_deref()
        .map(|context| format!("/{}", context))
        .unwrap_or_default();

    let files = Router::new().fallback(serve_path).with_state(AppState {
        fs,
        prefix: prefix.clone(),
    });

    let mut app = if prefix.is_empty() {
        files
    } else {
        Router::new().nest_service(&prefix, files)
    };

    if options.https_promote {
        app = app.layer(middleware::from_fn(promote_https));
    }

    if options.enable_health {
        app = app.route("/health", get(health));
    }

    app
}

/// Binds `0.0.0.0:port` and serves until the process stops.
pub async fn run(options: ServerOptions, fs: Arc<dyn FileSystem>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!(
        "Listening at http://{} /{}",
        addr,
        options
            .context
            .as_deref()
            .map(|context| format!("{}/", context))
            .unwrap_or_default()
    );

    axum::serve(listener, router(fs, &options))
        .await
        .context("Server startup failed")?;
    Ok(())
}

async fn health() -> &'static str {
    log::debug!("Returning service health");
    "Ok"
}

/// Redirects requests a proxy reports as plain HTTP to their HTTPS twin.
async fn promote_https(request: Request, next: Next) -> Response {
    match https_location(request.headers(), request.uri()) {
        Some(location) => {
            log::debug!("{} {} -> 301 {}", request.method(), request.uri(), location);
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        None => next.run(request).await,
    }
}

pub fn https_location(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let proto = headers.get("x-forwarded-proto")?.to_str().ok()?;
    if proto != "http" {
        return None;
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    Some(format!("https://{}{}", host, target))
}

/// Decodes `%XX` escapes; `None` when the result is not UTF-8.
pub fn decode_path(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|path| path.into_owned())
}

async fn serve_path(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    OriginalUri(original): OriginalUri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    }

    let Some(path) = decode_path(uri.path()) else {
        log::debug!("{} {} -> 400: path is not UTF-8", method, original);
        return (StatusCode::BAD_REQUEST, "invalid path encoding").into_response();
    };
    log::debug!("{} {}", method, original);

    let fs = Arc::clone(&state.fs);
    let request_path = path.clone();
    let prefix = state.prefix.clone();
    match tokio::task::spawn_blocking(move || load(fs.as_ref(), &prefix, &request_path)).await {
        Ok(Ok(page)) => page.into_response(),
        Ok(Err(err)) => {
            let status = status_for(&err);
            log::debug!("{} {} -> {}: {}", method, path, status, err);
            (status, status.canonical_reason().unwrap_or("error")).into_response()
        }
        Err(err) => {
            log::error!("Request worker for {} failed: {}", path, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn status_for(err: &io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Opens `path` and loads the body to serve: the (rewritten) file, a
/// directory's `index.html`, or a generated listing. Listing links are
/// rooted at `prefix`.
pub fn load(fs: &dyn FileSystem, prefix: &str, path: &str) -> io::Result<Page> {
    let mut file = fs.open(path)?;
    if !file.is_dir() {
        return read_page(file, path);
    }

    let index_path = format!("{}/index.html", path.trim_end_matches('/'));
    match fs.open(&index_path) {
        Ok(index) if !index.is_dir() => {
            file.close()?;
            return read_page(index, &index_path);
        }
        Ok(mut index) => index.close()?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            file.close()?;
            return Err(err);
        }
    }

    let entries = file.read_dir()?;
    file.close()?;
    let listed = format!("{}{}", prefix, path);
    let body = OutputGenerator::generate_index_html(&listed, &entries).into_bytes();
    Ok(Page {
        content_length: body.len() as u64,
        body,
        content_type: "text/html; charset=utf-8",
    })
}

fn read_page(mut file: Box<dyn File>, path: &str) -> io::Result<Page> {
    let size = file.stat()?.size;
    let mut body = Vec::with_capacity(size as usize);
    file.read_to_end(&mut body)?;
    file.close()?;
    Ok(Page {
        body,
        content_type: content_type(path),
        content_length: size,
    })
}

pub fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "log" | "bak" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "yml" | "yaml" => "application/yaml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
