//! Filesystem provider for ZVM.
//!
//! Registers the `file` scheme:
//! - a getter and a putter for each supported media type, reading and
//!   writing the document at the URL-decoded path
//! - a deleter, with an optional `missing_ok` parameter
//!
//! ```text
//! {"op": "get", "uri": "file:///tmp/config.json5", "mediaType": "application/json5"}
//! {"op": "del", "uri": "file:///tmp/config.json5", "missing_ok": true}
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Deserialize;
use zvm_core::{MediaType, Registry, Result, VmError};

pub const SCHEME: &str = "file";

// ---------------------------------------------------------------------------
// Request schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteRequest {
    #[serde(default)]
    missing_ok: bool,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// The local path named by a `file:` URI, percent-decoded.
pub fn path_of(uri: &str) -> Result<PathBuf> {
    let parsed = url::Url::parse(uri).map_err(|e| invalid(uri, e))?;
    if parsed.scheme() != SCHEME {
        return Err(invalid(uri, format!("expected a {SCHEME}: URI")));
    }
    let path = urlencoding::decode(parsed.path()).map_err(|e| invalid(uri, e))?;
    if path.is_empty() {
        return Err(invalid(uri, "empty path"));
    }
    Ok(PathBuf::from(path.into_owned()))
}

fn invalid(uri: &str, message: impl std::fmt::Display) -> VmError {
    VmError::InvalidUri {
        uri: uri.to_string(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Install the `file` getters, putters and deleter.
pub fn register(registry: &mut Registry) {
    for media_type in MediaType::ALL {
        registry.getter(&[SCHEME], Some(media_type.as_str()), move |state, uri, params| {
            state.no_params(&params)?;
            let path = path_of(uri)?;
            tracing::debug!(path = %path.display(), media_type = media_type.as_str(), "reading file");
            let text = std::fs::read_to_string(&path)
                .map_err(|e| VmError::provider(uri, format!("read failed: {e}")))?;
            media_type.decode(&text)
        });

        registry.putter(&[SCHEME], Some(media_type.as_str()), move |state, data, uri, params| {
            state.no_params(&params)?;
            let path = path_of(uri)?;
            tracing::debug!(path = %path.display(), media_type = media_type.as_str(), "writing file");
            let text = media_type.encode(&data)?;
            std::fs::write(&path, text)
                .map_err(|e| VmError::provider(uri, format!("write failed: {e}")))
        });
    }

    // Deleting does not depend on the content, so `del` works with or
    // without a mediaType.
    let keys = std::iter::once(None).chain(MediaType::ALL.map(|m| Some(m.as_str())));
    for media_type in keys {
        registry.deleter(&[SCHEME], media_type, |state, uri, params| {
            let request: DeleteRequest = state.decode(params)?;
            let path = path_of(uri)?;
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "deleted file");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound && request.missing_ok => Ok(()),
                Err(e) => Err(VmError::provider(uri, format!("delete failed: {e}"))),
            }
        });
    }
}

/// The path as a `file://` URI, percent-encoding each segment.
pub fn uri_for(path: &std::path::Path) -> String {
    let encoded: Vec<String> = path
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{SCHEME}://{}", encoded.join("/"))
}
