use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{AppState, application::ApplicationError};

/// Operator keys accepted on data routes, held only as SHA-256 digests.
#[derive(Clone, Debug, Default)]
pub struct OperatorKeys {
    digests: HashSet<String>,
}

impl OperatorKeys {
    pub fn from_plain<S: AsRef<str>>(keys: &[S]) -> Self {
        let digests = keys
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(digest)
            .collect();
        Self { digests }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Short digest prefix identifying the key in logs, if it is accepted.
    fn matching(&self, presented: &str) -> Option<String> {
        let presented = digest(presented);
        self.digests
            .contains(&presented)
            .then(|| presented[..12].to_string())
    }
}

fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

// Operator context extracted from a valid key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedOperator {
    pub key_id: String,
}

/// Requires `Authorization: Bearer <operator key>`. With no keys configured
/// every request is refused.
pub async fn operator_auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApplicationError> {
    let api_key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let Some(key) = api_key else {
        warn!("Operator authentication failed: missing, empty, or invalid Authorization header.");
        return Err(ApplicationError::Unauthorized("missing operator key".into()));
    };

    if app_state.operator_keys.is_empty() {
        warn!("SUPPORT_API_KEYS is empty; refusing data request");
        return Err(ApplicationError::Unauthorized("no operator keys configured".into()));
    }

    match app_state.operator_keys.matching(key) {
        Some(key_id) => {
            debug!("operator key {} accepted for {}", key_id, req.uri().path());
            req.extensions_mut().insert(AuthenticatedOperator { key_id });
            Ok(next.run(req).await)
        }
        None => {
            warn!("Provided operator key is not recognised.");
            Err(ApplicationError::Unauthorized("unknown operator key".into()))
        }
    }
}
