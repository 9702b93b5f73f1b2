use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::settings::try_handle,
    handlers::auth::try_handle,
    handlers::intakes::try_handle,
    handlers::courses::try_handle,
    handlers::students::try_handle,
    handlers::enrollments::try_handle,
    handlers::marks::try_handle,
    handlers::imports::try_handle,
    handlers::reports::try_handle,
    handlers::notifications::try_handle,
    handlers::mcq::try_handle,
    handlers::groups::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "dispatch");
    for handle in HANDLERS {
        if let Some(resp) = handle(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
