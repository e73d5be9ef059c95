use helpdesk_core::ipc::{
    CreateSessionResponse, HelpdeskRequest, HelpdeskResponse, SessionActionResponse,
};
use helpdesk_core::SessionManager;

/// Dispatches one request against the session engine. Shared by the IPC socket
/// and the HTTP API.
pub fn handle_request(request: HelpdeskRequest, manager: &SessionManager) -> HelpdeskResponse {
    match request {
        HelpdeskRequest::Ping => HelpdeskResponse::pong(),
        HelpdeskRequest::Health => HelpdeskResponse::ok(serde_json::json!({
            "status": "healthy",
            "running": manager.is_running(),
            "capacity": manager.capacity(),
        })),
        HelpdeskRequest::CreateSession => {
            let outcome = CreateSessionResponse::from_outcome(manager.create_session());
            to_response(&outcome)
        }
        HelpdeskRequest::ProlongateSession { session_id } => {
            let outcome = SessionActionResponse::from(manager.prolongate_session(&session_id));
            to_response(&outcome)
        }
        HelpdeskRequest::DestroySession { session_id } => {
            let outcome = SessionActionResponse::from(manager.destroy_session(&session_id));
            to_response(&outcome)
        }
        HelpdeskRequest::Status => to_response(&manager.status()),
    }
}

fn to_response<T: serde::Serialize>(value: &T) -> HelpdeskResponse {
    match serde_json::to_value(value) {
        Ok(data) => HelpdeskResponse::ok(data),
        Err(e) => HelpdeskResponse::err(format!("Serialization failed: {}", e)),
    }
}
