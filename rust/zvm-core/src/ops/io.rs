//! `get`, `put` and `del`: dispatch to the plugin registered for the URI's
//! scheme and the requested media type.

use serde::Deserialize;

use crate::error::{Result, VmError};
use crate::registry::{Params, Registry};

#[derive(Deserialize)]
struct UriParams {
    uri: String,
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    /// Everything else is forwarded to the plugin.
    #[serde(flatten)]
    extra: Params,
}

/// The scheme of `uri`, lower-cased.
pub(crate) fn scheme_of(uri: &str) -> Result<String> {
    url::Url::parse(uri)
        .map(|parsed| parsed.scheme().to_string())
        .map_err(|e| VmError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })
}

pub(super) fn install(registry: &mut Registry) {
    registry.op("get", |state, params| {
        let UriParams { uri, media_type, extra } = state.decode(params)?;
        let getter = state
            .registry()
            .lookup_getter(&scheme_of(&uri)?, media_type.as_deref())?;
        getter(state, &uri, extra)
    });

    registry.op("put", |state, params| {
        let UriParams { uri, media_type, extra } = state.decode(params)?;
        let putter = state
            .registry()
            .lookup_putter(&scheme_of(&uri)?, media_type.as_deref())?;
        let data = state.pop()?;
        putter(state, data, &uri, extra)
    });

    registry.op("del", |state, params| {
        let UriParams { uri, media_type, extra } = state.decode(params)?;
        let deleter = state
            .registry()
            .lookup_deleter(&scheme_of(&uri)?, media_type.as_deref())?;
        deleter(state, &uri, extra)
    });
}
