//! Selection URI to local path resolution.

use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};

/// Resolves a `file://` URI to an absolute local path.
///
/// Remote and virtual locations (`sftp://`, `trash://`, host-qualified
/// `file://` URIs) have no local path and yield
/// [`Error::PathResolution`]; callers skip those URIs.
pub fn local_path(uri: &str) -> Result<PathBuf> {
    let parsed = Url::parse(uri).map_err(|_| Error::PathResolution {
        uri: uri.to_string(),
    })?;

    if parsed.scheme() != "file" {
        return Err(Error::PathResolution {
            uri: uri.to_string(),
        });
    }

    parsed.to_file_path().map_err(|_| Error::PathResolution {
        uri: uri.to_string(),
    })
}

/// Formats an absolute path back into a `file://` URI.
///
/// Used for the `uri` attribute handed to `AddMenuItem`. Relative paths
/// cannot be expressed as file URIs.
pub fn to_file_uri(path: &std::path::Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| Error::PathResolution {
            uri: path.display().to_string(),
        })
}
