use crate::auth::{self, ResetToken};
use crate::ipc::helpers::{
    find_user, find_user_by_registration, opt_text, req_str, req_str_list, req_text, require_course,
    respond, with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, GroupRole, Role};
use crate::settings::{self, SystemSettings};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const MIN_PASSWORD_LEN: usize = 6;

fn check_new_password(password: &str) -> Result<(), HandlerErr> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerErr::bad_params(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn handle_ensure_default_admin(conn: &Connection) -> HandlerResult {
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    tx.execute(
        "DELETE FROM users WHERE lower(registration_number) = ?",
        [auth::DEFAULT_ADMIN_USERNAME],
    )
    .or_code("db_delete_failed")?;
    tx.execute(
        "INSERT INTO users(id, registration_number, full_name, email, password_hash, role, force_password_change)
         VALUES(?, ?, ?, ?, ?, 'admin', 0)",
        (
            auth::DEFAULT_ADMIN_ID,
            auth::DEFAULT_ADMIN_USERNAME,
            auth::DEFAULT_ADMIN_NAME,
            auth::DEFAULT_ADMIN_EMAIL,
            auth::hash_password(auth::DEFAULT_ADMIN_PASSWORD),
        ),
    )
    .or_code("db_insert_failed")?;
    tx.commit().or_code("db_tx_failed")?;
    tracing::info!("default admin account reset");
    Ok(json!({ "userId": auth::DEFAULT_ADMIN_ID }))
}

fn handle_login(conn: &Connection, req: &Request) -> HandlerResult {
    let registration_number = req_str(&req.params, "registrationNumber")?;
    let password = req_str(&req.params, "password")?;
    let role = match opt_text(&req.params, "role") {
        None => None,
        Some(r) => Some(Role::parse(&r).ok_or_else(|| HandlerErr::bad_params("unknown role"))?),
    };

    let rejected = || {
        tracing::warn!(registration_number = registration_number.trim(), "login rejected");
        HandlerErr::new("invalid_credentials", "Invalid registration number or password.")
    };

    let Some(user) = find_user_by_registration(conn, registration_number)? else {
        return Err(rejected());
    };
    if !auth::verify_password(password, &user.password_hash) {
        return Err(rejected());
    }
    // Admins may sign in through any portal.
    if let Some(r) = role {
        if user.role != r && user.role != Role::Admin {
            return Err(rejected());
        }
    }
    Ok(json!({ "user": user }))
}

fn handle_register(conn: &Connection, req: &Request) -> HandlerResult {
    let system: SystemSettings = settings::load(conn)?;
    if !system.allow_student_registration {
        return Err(HandlerErr::new(
            "registration_closed",
            "Student registration is currently disabled.",
        ));
    }

    let p = &req.params;
    let registration_number = req_text(p, "registrationNumber")?;
    if !auth::is_registration_number(&registration_number) {
        return Err(HandlerErr::bad_params(
            "Invalid registration number format. Use 20XX-XX-XXXXX.",
        ));
    }
    let full_name = req_text(p, "fullName")?;
    let email = req_text(p, "email")?;
    let password = req_str(p, "password")?;
    check_new_password(password)?;
    let group_role = match opt_text(p, "groupRole") {
        None => GroupRole::default(),
        Some(raw) => GroupRole::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("Invalid groupRole '{}'.", raw)))?,
    };
    let course_ids = req_str_list(p, "courseIds")?;
    if course_ids.is_empty() {
        return Err(HandlerErr::bad_params(
            "You must select at least one course to enroll in.",
        ));
    }
    for id in &course_ids {
        require_course(conn, id)?;
    }

    if find_user_by_registration(conn, &registration_number)?.is_some() {
        return Err(HandlerErr::new(
            "already_exists",
            "Registration number already exists.",
        ));
    }

    let user_id = new_id("user");
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    tx.execute(
        "INSERT INTO users(id, registration_number, full_name, email, password_hash, role,
                           course, session, year_of_study, semester, telephone, group_role,
                           force_password_change, intake_id)
         VALUES(?, ?, ?, ?, ?, 'student', ?, ?, ?, ?, ?, ?, 1, ?)",
        rusqlite::params![
            user_id,
            registration_number,
            full_name,
            email,
            auth::hash_password(password),
            opt_text(p, "course"),
            opt_text(p, "session"),
            opt_text(p, "yearOfStudy"),
            opt_text(p, "semester"),
            opt_text(p, "telephone"),
            group_role.as_str(),
            opt_text(p, "intakeId"),
        ],
    )
    .or_code("db_insert_failed")?;
    for course_id in &course_ids {
        tx.execute(
            "INSERT OR IGNORE INTO enrollments(id, student_id, course_id) VALUES(?, ?, ?)",
            (new_id("enrol"), &user_id, course_id),
        )
        .or_code("db_insert_failed")?;
    }
    tx.commit().or_code("db_tx_failed")?;

    tracing::info!(user_id = %user_id, courses = course_ids.len(), "student registered");
    let user = find_user(conn, &user_id)?;
    Ok(json!({ "user": user }))
}

fn handle_change_password(conn: &Connection, req: &Request) -> HandlerResult {
    let user_id = req_str(&req.params, "userId")?;
    let password = req_str(&req.params, "newPassword")?;
    check_new_password(password)?;
    let changed = conn
        .execute(
            "UPDATE users SET password_hash = ?, force_password_change = 0 WHERE id = ?",
            (auth::hash_password(password), user_id),
        )
        .or_code("db_update_failed")?;
    if changed == 0 {
        return Err(HandlerErr::not_found("user not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_request_password_reset(conn: &Connection, req: &Request) -> HandlerResult {
    let identifier = req_text(&req.params, "identifier")?.to_lowercase();
    let user_id: Option<String> = conn
        .query_row(
            "SELECT id FROM users
             WHERE lower(registration_number) = ? OR lower(email) = ?
             ORDER BY id LIMIT 1",
            (&identifier, &identifier),
            |r| r.get(0),
        )
        .optional()
        .or_code("db_query_failed")?;
    let Some(user_id) = user_id else {
        return Err(HandlerErr::not_found(
            "No account found with that registration number or email address.",
        ));
    };

    let token = ResetToken::issue(chrono::Utc::now());
    conn.execute(
        "UPDATE users SET password_reset_token = ?, password_reset_expires = ? WHERE id = ?",
        (&token.token, token.expires_at.to_rfc3339(), &user_id),
    )
    .or_code("db_update_failed")?;
    tracing::info!(user_id = %user_id, "password reset requested");
    // Delivery is the caller's job; the token is handed back to it.
    Ok(json!({ "token": token.token, "expiresAt": token.expires_at.to_rfc3339() }))
}

fn handle_reset_password(conn: &Connection, req: &Request) -> HandlerResult {
    let token = req_text(&req.params, "token")?;
    let password = req_str(&req.params, "newPassword")?;
    check_new_password(password)?;

    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, password_reset_expires FROM users WHERE password_reset_token = ?",
            [&token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .or_code("db_query_failed")?;
    let invalid = || {
        HandlerErr::new(
            "invalid_token",
            "Invalid or expired password reset token. Please request a new one.",
        )
    };
    let Some((user_id, expires)) = row else {
        return Err(invalid());
    };
    if auth::reset_token_expired(expires.as_deref().unwrap_or(""), chrono::Utc::now()) {
        return Err(invalid());
    }

    conn.execute(
        "UPDATE users
         SET password_hash = ?, password_reset_token = NULL, password_reset_expires = NULL
         WHERE id = ?",
        (auth::hash_password(password), &user_id),
    )
    .or_code("db_update_failed")?;
    Ok(json!({ "ok": true }))
}

fn handle_update_role(conn: &Connection, req: &Request) -> HandlerResult {
    let user_id = req_str(&req.params, "userId")?;
    let role = Role::parse(req_str(&req.params, "role")?)
        .ok_or_else(|| HandlerErr::bad_params("role must be one of: admin, coordinator, student"))?;
    let managed_course_id = opt_text(&req.params, "managedCourseId");
    if let Some(c) = &managed_course_id {
        require_course(conn, c)?;
    }
    let changed = conn
        .execute(
            "UPDATE users SET role = ?, managed_course_id = ?, managed_session = ? WHERE id = ?",
            (
                role.as_str(),
                managed_course_id,
                opt_text(&req.params, "managedSession"),
                user_id,
            ),
        )
        .or_code("db_update_failed")?;
    if changed == 0 {
        return Err(HandlerErr::not_found("user not found"));
    }
    Ok(json!({ "user": find_user(conn, user_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.ensureDefaultAdmin" => with_conn(state, handle_ensure_default_admin),
        "auth.login" => with_conn(state, |c| handle_login(c, req)),
        "auth.register" => with_conn(state, |c| handle_register(c, req)),
        "auth.changePassword" => with_conn(state, |c| handle_change_password(c, req)),
        "auth.requestPasswordReset" => with_conn(state, |c| handle_request_password_reset(c, req)),
        "auth.resetPassword" => with_conn(state, |c| handle_reset_password(c, req)),
        "users.updateRole" => with_conn(state, |c| handle_update_role(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
