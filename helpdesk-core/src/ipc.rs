use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1.0";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HelpdeskRequest {
    Ping,
    Health,
    CreateSession,
    ProlongateSession { session_id: uuid::Uuid },
    DestroySession { session_id: uuid::Uuid },
    Status,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HelpdeskResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl HelpdeskResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Outcome of a create request, shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateSessionCode {
    Created,
    TooBusy,
    Failed,
}

/// Outcome of a prolong (keep-alive) or destroy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionActionCode {
    Success,
    Failed,
}

impl From<bool> for SessionActionCode {
    fn from(succeeded: bool) -> Self {
        if succeeded {
            SessionActionCode::Success
        } else {
            SessionActionCode::Failed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub code: CreateSessionCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<uuid::Uuid>,
}

impl CreateSessionResponse {
    pub fn from_outcome(session_id: Option<uuid::Uuid>) -> Self {
        match session_id {
            Some(id) => Self {
                code: CreateSessionCode::Created,
                session_id: Some(id),
            },
            None => Self {
                code: CreateSessionCode::TooBusy,
                session_id: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionActionResponse {
    pub code: SessionActionCode,
}

impl From<bool> for SessionActionResponse {
    fn from(succeeded: bool) -> Self {
        Self {
            code: succeeded.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdRequest {
    pub session_id: uuid::Uuid,
}
