//! Request observer that writes one audit entry per audited request.
//!
//! Two layers cooperate: [`capture_route_params`] runs after routing and
//! copies the matched path parameters onto the response, and [`audit_trail`]
//! wraps the whole router (fallback included) and builds the entry once the
//! response exists.
//!
//! Requests by privileged actors (moderator and above) get a generic entry
//! inferred from method, path and status. Handlers that know more attach a
//! [`PendingAudit`] instead; the middleware completes it with the request
//! details, timing and outcome and submits it in place of the generic one.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Query, RawPathParams, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, IntoResponseParts, Response, ResponseParts};
use serde_json::{json, Map, Value};

use crate::app::AppState;
use crate::audit::RequestContext;
use crate::errors::{AppError, ResponseErrorMessage};
use crate::jwt::AuthUser;
use crate::models::audit::{AuditAction, AuditResource, AuditStatus, NewAuditEntry};

/// Bodies of unknown length are buffered up to this size, the same ceiling
/// axum's own extractors apply by default.
const STREAMED_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Handler-built entry carried out on the response. The middleware takes it
/// off the response before it reaches the client.
#[derive(Debug, Clone)]
pub struct PendingAudit(pub NewAuditEntry);

impl IntoResponseParts for PendingAudit {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// Path parameters of the matched route, carried out on the response.
#[derive(Debug, Clone, Default)]
pub struct RouteParams(pub HashMap<String, String>);

pub async fn capture_route_params(params: Option<RawPathParams>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    if let Some(params) = params {
        let captured = params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        response.extensions_mut().insert(RouteParams(captured));
    }
    response
}

pub async fn audit_trail(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let actor = if state.audit_config.enabled {
        state
            .jwt
            .actor_from_headers(req.headers())
            .filter(|actor| actor.role.is_audited())
    } else {
        None
    };

    let started = Instant::now();
    let observed = ObservedRequest::capture(&req, actor);
    let sink = state.audit_sink.clone();

    let (req, body_id) = if observed.actor.is_some() {
        match read_body_id(req, state.audit_config.body_limit).await {
            Ok(read) => read,
            Err(mut response) => {
                if let Some(entry) = observed.into_entry(&mut response, None, started.elapsed()) {
                    sink.submit(entry);
                }
                return response;
            }
        }
    } else {
        (req, None)
    };

    // Detached so a client disconnect does not cancel the observation.
    let fallback = (observed.clone(), body_id.clone(), sink.clone());
    let task = tokio::spawn(async move {
        let mut response = next.run(req).await;
        if let Some(entry) = observed.into_entry(&mut response, body_id, started.elapsed()) {
            sink.submit(entry);
        }
        response
    });

    match task.await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "request handler task failed");
            let mut response = AppError::internal("request handler failed").into_response();
            let (observed, body_id, sink) = fallback;
            if let Some(entry) = observed.into_entry(&mut response, body_id, started.elapsed()) {
                sink.submit(entry);
            }
            response
        }
    }
}

/// What the entry needs from the request, captured before it is consumed.
#[derive(Debug, Clone)]
struct ObservedRequest {
    /// Set only when the caller is privileged and auditing is on.
    actor: Option<AuthUser>,
    method: Method,
    path: String,
    query: Map<String, Value>,
    context: RequestContext,
}

impl ObservedRequest {
    fn capture(req: &Request, actor: Option<AuthUser>) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map(|Query(params)| params)
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        Self {
            actor,
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            query,
            context: RequestContext::resolve(req.headers(), req.extensions()),
        }
    }

    /// The handler's entry when it attached one, otherwise a generic entry
    /// for privileged actors. Either way the request details, timing and
    /// outcome are filled in here.
    fn into_entry(self, response: &mut Response, body_id: Option<String>, elapsed: Duration) -> Option<NewAuditEntry> {
        let status = response.status();

        let mut entry = match response.extensions_mut().remove::<PendingAudit>() {
            Some(PendingAudit(entry)) => entry,
            None => {
                let actor = self.actor.as_ref()?;
                let action = infer_action(&self.method, status)?;
                let resource = infer_resource(&self.path);
                let entry = NewAuditEntry::new(actor.user_id, action, resource, describe(action, resource));
                match extract_resource_id(response.extensions().get::<RouteParams>(), body_id) {
                    Some(id) => entry.resource_id(id),
                    None => entry,
                }
            }
        };

        let mut details = json!({
            "method": self.method.as_str(),
            "path": self.path,
            "status_code": status.as_u16(),
            "query": Value::Object(self.query),
        });
        if let (Some(actor), Value::Object(map)) = (&self.actor, &mut details) {
            map.insert("role".into(), json!(actor.role));
        }
        if let (Value::Object(map), Value::Object(extra)) = (&mut details, entry.details) {
            map.extend(extra);
        }
        entry.details = details;

        if entry.ip_address.is_none() && entry.user_agent.is_none() {
            entry = entry.context(&self.context);
        }
        entry = entry.duration(elapsed);

        if !status.is_success() && entry.status != AuditStatus::Error {
            let message = response
                .extensions()
                .get::<ResponseErrorMessage>()
                .map(|message| message.0.clone())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            entry = entry.failed(message);
        }

        Some(entry)
    }
}

/// `None` for methods that are not audited (HEAD, OPTIONS, ...).
pub fn infer_action(method: &Method, status: StatusCode) -> Option<AuditAction> {
    if *method == Method::GET {
        Some(AuditAction::View)
    } else if *method == Method::POST {
        if status == StatusCode::CREATED {
            Some(AuditAction::Create)
        } else {
            Some(AuditAction::Update)
        }
    } else if *method == Method::PUT || *method == Method::PATCH {
        Some(AuditAction::Update)
    } else if *method == Method::DELETE {
        Some(AuditAction::Delete)
    } else {
        None
    }
}

/// First match wins, so more specific fragments come first.
const RESOURCE_FRAGMENTS: &[(&str, AuditResource)] = &[
    ("users", AuditResource::User),
    ("orders", AuditResource::Order),
    ("products", AuditResource::Product),
    ("courses", AuditResource::Course),
    ("training", AuditResource::Course),
    ("content", AuditResource::Content),
    ("articles", AuditResource::Content),
    ("settings", AuditResource::Settings),
    ("payments", AuditResource::Payment),
    ("messages", AuditResource::Message),
    ("contact", AuditResource::Message),
    ("quote-requests", AuditResource::QuoteRequest),
    ("quotes", AuditResource::QuoteRequest),
    ("job-applications", AuditResource::JobApplication),
    ("applications", AuditResource::JobApplication),
    ("chatbot-questions", AuditResource::ChatbotQuestion),
    ("tickets", AuditResource::Ticket),
    ("forum/comments", AuditResource::ForumComment),
    ("comments", AuditResource::ForumComment),
    ("forum", AuditResource::ForumPost),
    ("posts", AuditResource::ForumPost),
    ("permissions", AuditResource::Permission),
    ("roles", AuditResource::Role),
    ("backup", AuditResource::Backup),
];

/// Case-insensitive; anything unmatched is SYSTEM.
pub fn infer_resource(path: &str) -> AuditResource {
    let path = path.to_ascii_lowercase();
    RESOURCE_FRAGMENTS
        .iter()
        .find(|(fragment, _)| path.contains(fragment))
        .map(|(_, resource)| *resource)
        .unwrap_or(AuditResource::System)
}

const ID_PARAMS: &[&str] = &[
    "id",
    "userId",
    "user_id",
    "orderId",
    "order_id",
    "productId",
    "product_id",
    "courseId",
    "course_id",
];

/// Route parameters in priority order, then the `id` field of the JSON body.
pub fn extract_resource_id(params: Option<&RouteParams>, body_id: Option<String>) -> Option<String> {
    params
        .and_then(|RouteParams(params)| {
            ID_PARAMS
                .iter()
                .find_map(|key| params.get(*key).filter(|value| !value.is_empty()).cloned())
        })
        .or_else(|| body_id.filter(|id| !id.is_empty()))
}

pub fn describe(action: AuditAction, resource: AuditResource) -> String {
    let label = resource.label();
    match action {
        AuditAction::Create => format!("Creation of a {label}"),
        AuditAction::Update => format!("Update of a {label}"),
        AuditAction::Delete => format!("Deletion of a {label}"),
        AuditAction::View if label.ends_with('s') => format!("Listing of {label}"),
        AuditAction::View => format!("Listing of {label}s"),
        other => format!("{other} on {label}"),
    }
}

/// Buffers small JSON bodies to look for an `id`; everything else passes
/// through untouched. A body of unknown length that cannot be buffered is
/// answered here instead of reaching the handler half-read.
async fn read_body_id(req: Request, limit: usize) -> Result<(Request, Option<String>), Response> {
    let Some(cap) = buffer_cap(&req, limit) else {
        return Ok((req, None));
    };

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, cap).await {
        Ok(bytes) => {
            let id = body_id(&bytes);
            Ok((Request::from_parts(parts, Body::from(bytes)), id))
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not buffer request body for audit");
            Err(AppError::bad_request("request body could not be read").into_response())
        }
    }
}

/// How many bytes to buffer, or `None` to leave the body alone. Uses the
/// body's own size hint, so a missing `Content-Length` does not matter.
fn buffer_cap(req: &Request, limit: usize) -> Option<usize> {
    if !is_json(req.headers()) {
        return None;
    }

    let hint = req.body().size_hint();
    match hint.upper() {
        Some(0) => None,
        Some(len) if len <= limit as u64 => Some(limit),
        Some(_) => None,
        None => Some(STREAMED_BODY_LIMIT.max(limit)),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

fn body_id(bytes: &Bytes) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RouteParams {
        RouteParams(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn actions_follow_method_and_status() {
        assert_eq!(infer_action(&Method::GET, StatusCode::OK), Some(AuditAction::View));
        assert_eq!(infer_action(&Method::POST, StatusCode::CREATED), Some(AuditAction::Create));
        assert_eq!(infer_action(&Method::POST, StatusCode::OK), Some(AuditAction::Update));
        assert_eq!(infer_action(&Method::POST, StatusCode::BAD_REQUEST), Some(AuditAction::Update));
        assert_eq!(infer_action(&Method::PATCH, StatusCode::OK), Some(AuditAction::Update));
        assert_eq!(infer_action(&Method::DELETE, StatusCode::NO_CONTENT), Some(AuditAction::Delete));
        assert_eq!(infer_action(&Method::OPTIONS, StatusCode::OK), None);
    }

    #[test]
    fn resources_come_from_path_fragments() {
        assert_eq!(infer_resource("/api/users/42/profile"), AuditResource::User);
        assert_eq!(infer_resource("/api/quote-requests/9"), AuditResource::QuoteRequest);
        assert_eq!(infer_resource("/api/forum/comments/3"), AuditResource::ForumComment);
        assert_eq!(infer_resource("/api/forum/posts/3"), AuditResource::ForumPost);
        assert_eq!(infer_resource("/api/permissions/me"), AuditResource::Permission);
        assert_eq!(infer_resource("/api/admin/backup"), AuditResource::Backup);
        assert_eq!(infer_resource("/api/unknown-thing"), AuditResource::System);
    }

    #[test]
    fn resource_matching_ignores_case() {
        assert_eq!(infer_resource("/API/Users/507f/profile"), AuditResource::User);
        assert_eq!(infer_resource("/api/Forum/Comments/3"), AuditResource::ForumComment);
        assert_eq!(infer_resource("/Admin/BACKUP"), AuditResource::Backup);
    }

    #[test]
    fn resource_id_prefers_route_params_in_order() {
        let both = params(&[("user_id", "u-7"), ("id", "x-1")]);
        assert_eq!(extract_resource_id(Some(&both), None).as_deref(), Some("x-1"));

        let order = params(&[("orderId", "o-3")]);
        assert_eq!(extract_resource_id(Some(&order), Some("body".into())).as_deref(), Some("o-3"));

        let unrelated = params(&[("slug", "intro")]);
        assert_eq!(extract_resource_id(Some(&unrelated), Some("b-9".into())).as_deref(), Some("b-9"));
        assert_eq!(extract_resource_id(None, None), None);
    }

    #[test]
    fn body_id_accepts_strings_and_numbers() {
        assert_eq!(body_id(&Bytes::from_static(br#"{"id": "abc"}"#)).as_deref(), Some("abc"));
        assert_eq!(body_id(&Bytes::from_static(br#"{"id": 12}"#)).as_deref(), Some("12"));
        assert_eq!(body_id(&Bytes::from_static(br#"{"name": "x"}"#)), None);
        assert_eq!(body_id(&Bytes::from_static(b"not json")), None);
    }

    fn json_request(body: Body) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/api/things")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    #[test]
    fn small_json_bodies_are_buffered_without_content_length() {
        let req = json_request(Body::from(r#"{"id": "abc-123"}"#));
        assert!(req.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(buffer_cap(&req, 1024), Some(1024));
        assert_eq!(buffer_cap(&req, 4), None);

        assert_eq!(buffer_cap(&json_request(Body::empty()), 1024), None);

        let form = Request::builder()
            .method(Method::POST)
            .uri("/api/things")
            .header(header::CONTENT_TYPE, "multipart/form-data")
            .body(Body::from("--x"))
            .unwrap();
        assert_eq!(buffer_cap(&form, 1024), None);
    }

    #[tokio::test]
    async fn buffered_body_is_handed_on_intact() {
        let raw = r#"{"id": 12, "name": "x"}"#;
        let (req, id) = read_body_id(json_request(Body::from(raw)), 1024).await.unwrap();
        assert_eq!(id.as_deref(), Some("12"));

        let forwarded = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();
        assert_eq!(forwarded, Bytes::from_static(raw.as_bytes()));
    }

    fn observed(actor: Option<AuthUser>) -> ObservedRequest {
        ObservedRequest {
            actor,
            method: Method::PUT,
            path: "/api/users/u-1/role".into(),
            query: Map::new(),
            context: RequestContext::default(),
        }
    }

    #[test]
    fn handler_entry_is_completed_and_taken_off_the_response() {
        let actor_id = uuid::Uuid::new_v4();
        let handler_entry =
            NewAuditEntry::new(actor_id, AuditAction::RoleChange, AuditResource::User, "Role changed")
                .details(json!({ "note": "promotion" }));
        let mut response = (PendingAudit(handler_entry), StatusCode::OK).into_response();

        let entry = observed(None)
            .into_entry(&mut response, None, Duration::from_millis(7))
            .expect("handler entry is submitted even without a privileged bearer");

        assert!(response.extensions().get::<PendingAudit>().is_none());
        assert_eq!(entry.action, AuditAction::RoleChange);
        assert_eq!(entry.details["note"], "promotion");
        assert_eq!(entry.details["method"], "PUT");
        assert_eq!(entry.details["status_code"], 200);
        assert_eq!(entry.duration_ms, Some(7));
        assert_eq!(entry.status, AuditStatus::Success);
    }

    #[test]
    fn handler_entry_on_an_error_response_is_marked_failed() {
        let handler_entry =
            NewAuditEntry::new(uuid::Uuid::new_v4(), AuditAction::Delete, AuditResource::User, "Deletion of a user");
        let mut response = (PendingAudit(handler_entry), AppError::conflict("already gone")).into_response();

        let entry = observed(None)
            .into_entry(&mut response, None, Duration::ZERO)
            .expect("entry");
        assert_eq!(entry.status, AuditStatus::Error);
        assert_eq!(entry.error_message.as_deref(), Some("conflict: already gone"));
    }

    #[test]
    fn no_entry_without_a_handler_entry_or_privileged_actor() {
        let mut response = StatusCode::OK.into_response();
        assert!(observed(None).into_entry(&mut response, None, Duration::ZERO).is_none());

        let admin = AuthUser {
            user_id: uuid::Uuid::new_v4(),
            role: crate::authz::Role::Admin,
        };
        let entry = observed(Some(admin))
            .into_entry(&mut response, None, Duration::ZERO)
            .expect("generic entry");
        assert_eq!(entry.action, AuditAction::Update);
        assert_eq!(entry.details["role"], "admin");
    }

    #[test]
    fn descriptions_read_naturally() {
        assert_eq!(describe(AuditAction::Create, AuditResource::User), "Creation of a user");
        assert_eq!(describe(AuditAction::View, AuditResource::User), "Listing of users");
        assert_eq!(describe(AuditAction::View, AuditResource::Settings), "Listing of settings");
        assert_eq!(describe(AuditAction::Delete, AuditResource::QuoteRequest), "Deletion of a quote request");
    }
}
