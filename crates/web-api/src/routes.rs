use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use application::{
    ApplicationError, AuthSession, CreateRoomRequest, HistoryRequest, InviteMemberRequest,
    SigninRequest, SignupRequest,
};
use domain::{Chatroom, LivePresence, LiveStatus, MemberRole, Message, RoomMember, UserId};

use crate::{
    auth::{authenticate, bearer_token},
    error::ApiError,
    state::AppState,
    ws_connection,
};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user_id: UserId,
    username: String,
    token: String,
}

impl From<AuthSession> for SessionResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user_id: session.user_id,
            username: session.username.to_string(),
            token: session.token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
    #[serde(default = "default_public")]
    public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UpdateRoomPayload {
    public: bool,
}

#[derive(Debug, Deserialize)]
struct ListRoomsQuery {
    #[serde(default)]
    inactive: bool,
}

#[derive(Debug, Deserialize)]
struct InvitePayload {
    username: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct JoinPayload {
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct RoleResponse {
    role: MemberRole,
}

#[derive(Debug, Deserialize)]
struct RolePayload {
    role: MemberRole,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: LiveStatus,
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/signout", post(signout))
        .route("/auth/reactivate", post(reactivate_user))
        .route("/users/me/deactivate", post(deactivate_user))
        .route("/chatrooms", get(list_rooms).post(create_room))
        .route(
            "/chatrooms/{room}",
            get(get_room).put(update_room).delete(deactivate_room),
        )
        .route("/chatrooms/{room}/reactivate", post(reactivate_room))
        .route("/chatrooms/{room}/invitations", post(invite_member))
        .route("/chatrooms/{room}/join", post(join_room))
        .route("/chatrooms/{room}/members", get(list_members))
        .route(
            "/chatrooms/{room}/members/{user_id}",
            put(change_member_role).delete(remove_member),
        )
        .route(
            "/chatrooms/{room}/messages",
            get(message_history).post(send_message),
        )
        .route("/chatrooms/{room}/status", get(live_presence).put(update_status))
        .route("/chatrooms/{room}/ws", get(live_socket))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state
        .user_service
        .signup(SignupRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .user_service
        .signin(SigninRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(session.into()))
}

async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state.user_service.signout(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reactivate_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .user_service
        .reactivate(SigninRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(session.into()))
}

async fn deactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state.user_service.deactivate(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<Chatroom>>, ApiError> {
    authenticate(&state, &headers).await?;
    let rooms = if query.inactive {
        state.chat_service.list_inactive_rooms().await?
    } else {
        state.chat_service.list_public_rooms().await?
    };
    Ok(Json(rooms))
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<Chatroom>), ApiError> {
    let owner_id = authenticate(&state, &headers).await?;
    let room = state
        .chat_service
        .create_room(
            owner_id,
            CreateRoomRequest {
                name: payload.name,
                public: payload.public,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
) -> Result<Json<Chatroom>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.chat_service.get_room(&room).await?))
}

async fn update_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Json(payload): Json<UpdateRoomPayload>,
) -> Result<Json<Chatroom>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let updated = state
        .chat_service
        .update_room(user_id, &room, payload.public)
        .await?;
    Ok(Json(updated))
}

async fn deactivate_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state.chat_service.deactivate_room(user_id, &room).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reactivate_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state.chat_service.reactivate_room(user_id, &room).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invite_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Json(payload): Json<InvitePayload>,
) -> Result<StatusCode, ApiError> {
    let inviter_id = authenticate(&state, &headers).await?;
    state
        .chat_service
        .invite_member(InviteMemberRequest {
            room,
            inviter_id,
            invitee: payload.username,
            secret: payload.secret,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn join_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Json(payload): Json<JoinPayload>,
) -> Result<Json<RoleResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let role = state
        .chat_service
        .join_room(user_id, &room, payload.secret)
        .await?;
    Ok(Json(RoleResponse { role }))
}

async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
) -> Result<Json<Vec<RoomMember>>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    Ok(Json(state.chat_service.list_members(user_id, &room).await?))
}

async fn change_member_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((room, target)): Path<(String, String)>,
    Json(payload): Json<RolePayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let target = UserId::parse_str(&target)?;
    state
        .chat_service
        .change_member_role(user_id, &room, target, payload.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((room, target)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let target = UserId::parse_str(&target)?;
    state
        .chat_service
        .remove_member(user_id, &room, target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message = state
        .chat_service
        .send_message(user_id, &room, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// 响应体是存储记录直接拼接的 JSON 数组
async fn message_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let body = state
        .chat_service
        .message_history(HistoryRequest {
            room,
            user_id,
            page: query.page.unwrap_or(1),
            limit: query.limit.unwrap_or(1),
        })
        .await?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn live_presence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
) -> Result<Json<LivePresence>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.chat_service.live_presence(&room).await?))
}

async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<LivePresence>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let presence = state
        .chat_service
        .update_status(user_id, &room, payload.status)
        .await?;
    Ok(Json(presence))
}

/// 浏览器无法设置请求头，也接受 `?token=` 查询参数
async fn live_socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room): Path<String>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .map(str::to_owned)
        .or(query.token)
        .ok_or(ApplicationError::Authentication)?;
    let user_id = state.user_service.authenticate_token(&token).await?;
    state.chat_service.check_live_access(user_id, &room).await?;

    let read_limit = state.websocket.read_limit();
    Ok(ws
        .max_message_size(read_limit)
        .on_upgrade(move |socket| ws_connection::serve(socket, state, user_id, room)))
}
