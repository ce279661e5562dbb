use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

use super::helpers::{load_config, with_conn, AppConfig, HandlerErr};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn config_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "years": config.years,
        "semesters": config.semesters,
        "internalsPerSemester": config.internals_per_semester,
    })
}

fn config_get(conn: &rusqlite::Connection) -> Result<serde_json::Value, HandlerErr> {
    let config = load_config(conn)?;
    Ok(json!({ "config": config_json(&config) }))
}

fn config_update(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let current = load_config(conn)?;
    let next = AppConfig {
        years: params
            .get("years")
            .and_then(|v| v.as_i64())
            .unwrap_or(current.years),
        semesters: params
            .get("semesters")
            .and_then(|v| v.as_i64())
            .unwrap_or(current.semesters),
        internals_per_semester: params
            .get("internalsPerSemester")
            .and_then(|v| v.as_i64())
            .unwrap_or(current.internals_per_semester),
    };
    if next.years < 1 || next.semesters < 1 || next.internals_per_semester < 1 {
        return Err(HandlerErr::bad_params(
            "years, semesters and internalsPerSemester must be positive",
        ));
    }
    db::settings_set_json(conn, "config", &config_json(&next))
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "config": config_json(&next) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(with_conn(state, req, |conn, _| config_get(conn))),
        "config.update" => Some(with_conn(state, req, config_update)),
        _ => None,
    }
}
