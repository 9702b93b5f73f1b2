use crate::grading::GradingConfig;
use crate::ipc::helpers::{respond, to_json, with_conn, HandlerErr, HandlerResult, OrCode};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, ImportOptions, LoadError, Section, SystemSettings};
use rusqlite::Connection;
use serde_json::{Map, Value};

fn patch_of(req: &Request) -> Result<&Map<String, Value>, HandlerErr> {
    req.params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))
}

fn load<T: Section>(conn: &Connection) -> Result<T, HandlerErr> {
    Ok(settings::load::<T>(conn)?)
}

fn handle_settings_update(conn: &Connection, req: &Request) -> HandlerResult {
    let patch = patch_of(req)?;
    let current: SystemSettings = load(conn)?;
    let mut next = settings::apply_patch(&current, patch).map_err(HandlerErr::bad_params)?;

    // Each enable of the banner gets a fresh id so dismissed banners reappear.
    if patch.contains_key("globalNotification") {
        next.global_notification.id = if next.global_notification.enabled {
            format!("notif-{}", chrono::Utc::now().timestamp_millis())
        } else {
            current.global_notification.id.clone()
        };
    }

    settings::save(conn, &next).or_code("db_update_failed")?;
    to_json(&next)
}

fn handle_grading_get(conn: &Connection) -> HandlerResult {
    let cfg: GradingConfig = load(conn)?;
    to_json(&cfg)
}

fn handle_grading_update(conn: &Connection, req: &Request) -> HandlerResult {
    let patch = patch_of(req)?;
    // An unreadable saved section is replaced by the update.
    let current: GradingConfig = match settings::load(conn) {
        Ok(cfg) => cfg,
        Err(LoadError::Invalid { .. }) => GradingConfig::default(),
        Err(e) => return Err(e.into()),
    };
    let next = settings::apply_patch(&current, patch).map_err(HandlerErr::bad_params)?;
    settings::save(conn, &next).or_code("db_update_failed")?;
    tracing::info!(bands = next.scale.bands().len(), "grading configuration updated");
    to_json(&next)
}

fn handle_import_options_update(conn: &Connection, req: &Request) -> HandlerResult {
    let patch = patch_of(req)?;
    let current: ImportOptions = load(conn)?;
    let next = settings::apply_patch(&current, patch).map_err(HandlerErr::bad_params)?;
    if next.catalog.programmes.is_empty() || next.catalog.sessions.is_empty() {
        return Err(HandlerErr::bad_params(
            "programmes and sessions must each list at least one value",
        ));
    }
    settings::save(conn, &next).or_code("db_update_failed")?;
    to_json(&next)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.get" => with_conn(state, |c| to_json(&load::<SystemSettings>(c)?)),
        "settings.update" => with_conn(state, |c| handle_settings_update(c, req)),
        "grading.get" => with_conn(state, handle_grading_get),
        "grading.update" => with_conn(state, |c| handle_grading_update(c, req)),
        "imports.options.get" => with_conn(state, |c| to_json(&load::<ImportOptions>(c)?)),
        "imports.options.update" => with_conn(state, |c| handle_import_options_update(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
