use crate::ipc::helpers::{
    opt_text, parse_param, req_str, req_text, require_student, respond, with_conn, HandlerErr,
    HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, GroupMember, GroupProfile};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashSet;

fn load_profile(conn: &Connection, leader_id: &str) -> Result<Option<GroupProfile>, HandlerErr> {
    let row: Option<(String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT group_name, project_brief, members_json, assignment_json
             FROM group_profiles WHERE leader_id = ?",
            [leader_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .or_code("db_query_failed")?;
    let Some((group_name, project_brief, members_json, assignment_json)) = row else {
        return Ok(None);
    };
    let members: Vec<GroupMember> =
        serde_json::from_str(&members_json).or_code("db_query_failed")?;
    let assignment: Option<Assignment> = match assignment_json {
        Some(raw) => serde_json::from_str(&raw).or_code("db_query_failed")?,
        None => None,
    };
    Ok(Some(GroupProfile {
        leader_id: leader_id.to_string(),
        group_name,
        project_brief,
        members,
        assignment,
    }))
}

/// Drops the leader and repeated registration numbers, keeping first
/// occurrences in order.
fn clean_members(leader: &GroupMember, members: Vec<GroupMember>) -> Vec<GroupMember> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(leader.registration_number.to_lowercase());
    members
        .into_iter()
        .filter(|m| m.id != leader.id)
        .filter(|m| seen.insert(m.registration_number.to_lowercase()))
        .collect()
}

fn handle_get(conn: &Connection, req: &Request) -> HandlerResult {
    let leader_id = req_str(&req.params, "leaderId")?;
    let profile = load_profile(conn, leader_id)?;
    Ok(json!({ "profile": profile }))
}

/// Saves the leader's profile. An absent `assignment` keeps the stored one,
/// `null` removes it.
fn handle_upsert(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let leader = require_student(conn, req_str(p, "leaderId")?)?;
    let leader_member = GroupMember {
        id: leader.id.clone(),
        full_name: leader.full_name.clone(),
        registration_number: leader.registration_number.clone(),
    };
    let members: Vec<GroupMember> = match p.get("members") {
        None | Some(Value::Null) => Vec::new(),
        Some(_) => parse_param(p, "members")?,
    };
    let assignment: Option<Assignment> = match p.get("assignment") {
        None => load_profile(conn, &leader.id)?.and_then(|existing| existing.assignment),
        Some(Value::Null) => None,
        Some(_) => Some(parse_param(p, "assignment")?),
    };

    let profile = GroupProfile {
        leader_id: leader.id.clone(),
        group_name: req_text(p, "groupName")?,
        project_brief: opt_text(p, "projectBrief").unwrap_or_default(),
        members: clean_members(&leader_member, members),
        assignment,
    };
    let members_json = serde_json::to_string(&profile.members).or_code("internal")?;
    let assignment_json = profile
        .assignment
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .or_code("internal")?;

    conn.execute(
        "INSERT INTO group_profiles(leader_id, group_name, project_brief, members_json, assignment_json)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(leader_id) DO UPDATE SET
           group_name = excluded.group_name,
           project_brief = excluded.project_brief,
           members_json = excluded.members_json,
           assignment_json = excluded.assignment_json",
        (
            &profile.leader_id,
            &profile.group_name,
            &profile.project_brief,
            &members_json,
            &assignment_json,
        ),
    )
    .or_code("db_update_failed")?;
    Ok(json!({ "profile": profile }))
}

fn handle_assignments_list(conn: &Connection) -> HandlerResult {
    let mut stmt = conn
        .prepare(
            "SELECT leader_id, group_name, project_brief
             FROM group_profiles
             WHERE assignment_json IS NOT NULL
             ORDER BY group_name, leader_id",
        )
        .or_code("db_query_failed")?;
    let assignments = stmt
        .query_map([], |r| {
            Ok(json!({
                "leaderId": r.get::<_, String>(0)?,
                "groupName": r.get::<_, String>(1)?,
                "projectBrief": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "assignments": assignments }))
}

fn handle_assignment_get(conn: &Connection, req: &Request) -> HandlerResult {
    let leader_id = req_str(&req.params, "leaderId")?;
    let assignment = load_profile(conn, leader_id)?.and_then(|p| p.assignment);
    Ok(json!({ "assignment": assignment }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.get" => with_conn(state, |c| handle_get(c, req)),
        "groups.upsert" => with_conn(state, |c| handle_upsert(c, req)),
        "groups.assignments.list" => with_conn(state, handle_assignments_list),
        "groups.assignment.get" => with_conn(state, |c| handle_assignment_get(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
