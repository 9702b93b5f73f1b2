use crate::backup;
use crate::db;
use crate::ipc::helpers::{opt_text, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn target_workspace(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    opt_text(&req.params, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn io_failed(e: anyhow::Error, path: &str) -> HandlerErr {
    HandlerErr::new("io_failed", format!("{:#}", e)).with_details(json!({ "path": path }))
}

fn handle_export(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = opt_text(&req.params, "outPath")
        .ok_or_else(|| HandlerErr::bad_params("missing outPath"))?;
    let workspace = target_workspace(state, req)?;

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::debug!(error = %e, "checkpoint before export skipped");
        }
    }

    let summary = backup::export_workspace_bundle(&workspace, &PathBuf::from(&out_path))
        .map_err(|e| io_failed(e, &out_path))?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "bytesWritten": summary.bytes_written,
    }))
}

/// Replaces the workspace database with the bundle's copy and reopens it.
fn handle_import(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = opt_text(&req.params, "inPath")
        .ok_or_else(|| HandlerErr::bad_params("missing inPath"))?;
    let workspace = target_workspace(state, req)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The open handle must be gone before the file is swapped.
    state.db = None;

    let summary =
        backup::import_workspace_bundle(&src, &workspace).map_err(|e| io_failed(e, &in_path))?;
    let conn = db::open_db(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;
    state.db = Some(conn);
    state.workspace = Some(workspace.clone());

    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export(state, req),
        "backup.importWorkspaceBundle" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
