//! Real-time channel endpoints.
//!
//! One WebSocket per user client (utterances in, session events out) and one
//! per module connection (`COMMAND` out, `COMMAND_RESULT` in). Module
//! connect/disconnect is reported to the user session as
//! `MODULE_CONNECTION`.

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use engine::events::{CommandPayload, CommandResultPayload, SessionEvent};
use engine::session::{SessionHandle, SessionMessage};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// What a user client may send over its channel.
#[derive(Debug, Deserialize, TS)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserChannelMessage {
    #[serde(rename_all = "camelCase")]
    Utterance { text: String },
    #[serde(rename_all = "camelCase")]
    SelectAmbiguityOption { id_module: i64, option_index: usize },
    #[serde(rename_all = "camelCase")]
    DismissAmbiguity { id_module: i64 },
    #[serde(rename_all = "camelCase")]
    AcknowledgeAmbiguity { id_module: i64 },
}

impl UserChannelMessage {
    fn into_session_message(self) -> SessionMessage {
        match self {
            UserChannelMessage::Utterance { text } => SessionMessage::Utterance { text },
            UserChannelMessage::SelectAmbiguityOption {
                id_module,
                option_index,
            } => SessionMessage::SelectAmbiguityOption {
                id_module,
                option_index,
            },
            UserChannelMessage::DismissAmbiguity { id_module } => {
                SessionMessage::DismissAmbiguity { id_module }
            }
            UserChannelMessage::AcknowledgeAmbiguity { id_module } => {
                SessionMessage::AcknowledgeAmbiguity { id_module }
            }
        }
    }
}

/// Envelope used on the module channel, in both directions.
#[derive(Debug, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data")]
pub enum ModuleChannelMessage {
    #[serde(rename = "COMMAND")]
    Command(CommandPayload),
    #[serde(rename = "COMMAND_RESULT")]
    CommandResult(CommandResultPayload),
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channel/user/{id_user}", get(user_channel))
        .route("/channel/module/{id_user}/{id_module}", get(module_channel))
}

async fn user_channel(
    ws: WebSocketUpgrade,
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_or_spawn(id_user).await?;
    Ok(ws.on_upgrade(move |socket| handle_user_socket(socket, session)))
}

async fn handle_user_socket(socket: WebSocket, session: SessionHandle) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, id_user = session.id_user(), "user channel connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = session.subscribe();

    // The client starts from the current history; everything else arrives as
    // events.
    let initial = SessionEvent::CommandHistory {
        commands: session.history().await,
    };
    if send_json(&mut sender, &initial).await.is_err() {
        return;
    }

    let forward_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if send_json(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "user channel lagging behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<UserChannelMessage>(&text) {
            Ok(message) => session.send(message.into_session_message()),
            Err(error) => debug!(%error, "ignoring malformed user channel message"),
        }
    }

    forward_task.abort();
    info!(%connection_id, id_user = session.id_user(), "user channel disconnected");
}

async fn module_channel(
    ws: WebSocketUpgrade,
    Path((id_user, id_module)): Path<(i64, i64)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_or_spawn(id_user).await?;
    Ok(ws.on_upgrade(move |socket| handle_module_socket(socket, session, id_module)))
}

async fn handle_module_socket(socket: WebSocket, session: SessionHandle, id_module: i64) {
    let connection_id = Uuid::new_v4();
    info!(
        %connection_id,
        id_user = session.id_user(),
        id_module,
        "module channel connected"
    );

    let (mut sender, mut receiver) = socket.split();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<CommandPayload>();
    session.send(SessionMessage::ModuleConnected {
        id_module,
        sender: command_tx,
    });

    let forward_task = tokio::spawn(async move {
        while let Some(payload) = command_rx.recv().await {
            let message = ModuleChannelMessage::Command(payload);
            if send_json(&mut sender, &message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ModuleChannelMessage>(&text) {
            Ok(ModuleChannelMessage::CommandResult(payload)) => {
                if payload.id_module != id_module {
                    debug!(
                        claimed = payload.id_module,
                        id_module, "ignoring result claiming another module"
                    );
                    continue;
                }
                session.send(SessionMessage::ModuleResult(payload));
            }
            Ok(_) => debug!("ignoring unexpected module channel event"),
            Err(error) => debug!(%error, "ignoring malformed module channel message"),
        }
    }

    session.send(SessionMessage::ModuleDisconnected { id_module });
    forward_task.abort();
    info!(
        %connection_id,
        id_user = session.id_user(),
        id_module,
        "module channel disconnected"
    );
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(value).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
