use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Credential failures deliberately never say whether the id or the secret
/// was wrong.
pub fn invalid_credential(id: &str) -> serde_json::Value {
    err(id, "invalid_credential", "id or passcode is incorrect", None)
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

pub fn no_session(id: &str) -> serde_json::Value {
    err(id, "no_session", "sign in first", None)
}
