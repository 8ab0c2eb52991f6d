//! Static files for the player and admin pages.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::state::AppState;

pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") => "image/jpg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        _ => "text/plain",
    }
}

/// Map a request path onto a file under `root`. `None` if it would leave it.
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = match request_path {
        "" | "/" => "index.html",
        p => p.trim_start_matches('/'),
    };
    let relative = Path::new(relative);
    if relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Some(root.join(relative))
    } else {
        None
    }
}

pub async fn serve(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if uri.path() == "/favicon.ico" {
        return StatusCode::NO_CONTENT.into_response();
    }
    let Some(path) = resolve(&state.assets_dir, uri.path()) else {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type_for(&path))], body).into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to read asset");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Server Error: {}", err.kind()),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("js/app.js")), "text/javascript");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("README")), "text/plain");
        assert_eq!(content_type_for(Path::new("data.bin")), "text/plain");
    }

    #[test]
    fn resolve_stays_inside_root() {
        let root = Path::new("/srv/public");
        assert_eq!(resolve(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve(root, "/css/site.css"), Some(root.join("css/site.css")));
        assert_eq!(resolve(root, "/../secret"), None);
        assert_eq!(resolve(root, "/js/../../secret"), None);
        assert_eq!(resolve(root, "//etc/passwd"), Some(root.join("etc/passwd")));
    }
}
