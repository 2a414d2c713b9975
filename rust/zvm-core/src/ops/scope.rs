//! The scheme-only `locals:` and `globals:` plugins. The variable name is
//! the URI path, so `locals:n` and `globals:total` address `n` and `total`.

use serde::Deserialize;

use crate::error::{Result, VmError};
use crate::registry::Registry;
use crate::value::Value;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetParams {
    #[serde(default)]
    default: Value,
}

/// Variable name addressed by a scope URI. `locals://n` names `n` too.
fn key_of(uri: &str) -> Result<String> {
    let parsed = url::Url::parse(uri).map_err(|e| VmError::InvalidUri {
        uri: uri.to_string(),
        message: e.to_string(),
    })?;
    let key = match (parsed.path(), parsed.host_str()) {
        ("", Some(host)) => host,
        (path, _) => path,
    };
    if key.is_empty() {
        return Err(VmError::InvalidUri {
            uri: uri.to_string(),
            message: "no variable name".to_string(),
        });
    }
    Ok(key.to_string())
}

pub(super) fn install(registry: &mut Registry) {
    registry
        .getter(&["locals"], None, |state, uri, params| {
            let GetParams { default } = state.decode(params)?;
            Ok(state.locals().get(&key_of(uri)?).cloned().unwrap_or(default))
        })
        .putter(&["locals"], None, |state, data, uri, params| {
            state.no_params(&params)?;
            state.set(&key_of(uri)?, data);
            Ok(())
        })
        .deleter(&["locals"], None, |state, uri, params| {
            state.no_params(&params)?;
            state.delete(&key_of(uri)?).map(drop)
        });

    registry
        .getter(&["globals"], None, |state, uri, params| {
            let GetParams { default } = state.decode(params)?;
            Ok(state.globals().get(&key_of(uri)?).cloned().unwrap_or(default))
        })
        .putter(&["globals"], None, |state, data, uri, params| {
            state.no_params(&params)?;
            state.set_global(&key_of(uri)?, data);
            Ok(())
        })
        .deleter(&["globals"], None, |state, uri, params| {
            state.no_params(&params)?;
            state.delete_global(&key_of(uri)?).map(drop)
        });
}
