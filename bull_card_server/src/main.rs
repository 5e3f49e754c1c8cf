mod command;
mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::RwLock as P_RwLock;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bull_card_core::{
    ChannelId, ClientMessage, Engine, EngineError, Ledger, MemoryLedger, MemoryStore, Notifier, Participant,
    ParticipantId, ServerMessage,
};

use crate::command::Command;
use crate::config::ServerConfig;

// 服务器全局状态
struct AppState {
    engine: Arc<Engine>,
    ledger: Arc<MemoryLedger>,
    channels: Arc<DashMap<ChannelId, Arc<Channel>>>,
    config: ServerConfig,
}

// 单个频道
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// members -> host_id
// 两把锁都是同步锁，持有期间不允许 await
struct Channel {
    host_id: P_RwLock<ParticipantId>,
    // 将 ParticipantId 映射到具体的网络连接
    members: P_RwLock<HashMap<ParticipantId, MemberConnection>>,
}

// 成员的网络连接信息
struct MemberConnection {
    nickname: String,
    // 用于向该成员的 WebSocket 任务发送消息的通道
    sender: mpsc::Sender<ServerMessage>,
}

type SharedState = Arc<AppState>;

/// 把引擎的提示广播给频道内所有人
struct ChannelNotifier {
    channels: Arc<DashMap<ChannelId, Arc<Channel>>>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, channel_id: &str, text: String) {
        let Some(channel) = self.channels.get(channel_id).map(|c| c.clone()) else {
            warn!("频道 {} 不存在，丢弃提示", channel_id);
            return;
        };
        let msg = ServerMessage::Notice { text };
        broadcast(channel.members.read().iter(), &msg, None);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;

    let channels = Arc::new(DashMap::new());
    let ledger = Arc::new(MemoryLedger::new());
    let notifier = Arc::new(ChannelNotifier { channels: channels.clone() });
    let engine = Arc::new(Engine::new(
        config.game.clone(),
        Arc::new(MemoryStore::new()),
        Some(ledger.clone()),
        notifier,
    ));

    let listen = config.listen;
    info!(
        "斗牛模式：{}",
        if config.game.wager_mode_enabled { "金币局" } else { "娱乐局" }
    );
    let state = SharedState::new(AppState { engine, ledger, channels, config });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("无法监听 {}", listen))?;
    info!("服务器正在监听 {}", listen);
    axum::serve(listener, app).await?;
    Ok(())
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接的上下文信息，进入频道后填充
    let mut context: Option<(ChannelId, Participant)> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(client_msg, &state, &tx, &mut context).await,
                Err(e) => warn!("解析消息失败: {}", e),
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((channel_id, participant)) = context {
        handle_disconnect(&state, &channel_id, &participant.id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(ChannelId, Participant)>,
) {
    match msg {
        ClientMessage::EnterChannel { channel_id, nickname } => {
            if context.is_some() {
                let _ = tx.send(ServerMessage::Error { message: "你已经在一个频道里了".to_string() }).await;
                return;
            }
            let participant = Participant::new(Uuid::new_v4().to_string(), nickname.clone());
            let host_id = enter_channel(state, &channel_id, &participant, tx);

            if state.config.game.wager_mode_enabled {
                state
                    .ledger
                    .open_account(&participant.id, &state.config.game.currency_tag, state.config.starting_balance);
            }

            info!("{} ({}) 进入了频道 {}", nickname, participant.id, channel_id);
            let _ = tx
                .send(ServerMessage::Entered { your_id: participant.id.clone(), channel_id: channel_id.clone(), host_id })
                .await;
            *context = Some((channel_id, participant));
        }
        ClientMessage::Say(text) => {
            let Some((channel_id, participant)) = context.as_ref() else {
                let _ = tx.send(ServerMessage::Error { message: "请先进入频道".to_string() }).await;
                return;
            };
            handle_say(state, tx, channel_id, participant, text).await;
        }
    }
}

/// 加入（或创建）频道，返回房主 ID
fn enter_channel(
    state: &SharedState,
    channel_id: &str,
    participant: &Participant,
    tx: &mpsc::Sender<ServerMessage>,
) -> ParticipantId {
    let channel = state
        .channels
        .entry(channel_id.to_string())
        .or_insert_with(|| {
            info!("频道 {} 已创建，房主 {}", channel_id, participant.id);
            Arc::new(Channel {
                host_id: P_RwLock::new(participant.id.clone()),
                members: P_RwLock::new(HashMap::new()),
            })
        })
        .clone();

    let mut members = channel.members.write();
    let notice = ServerMessage::Notice { text: format!("{} 进入了频道", participant.name) };
    broadcast(members.iter(), &notice, None);
    members.insert(
        participant.id.clone(),
        MemberConnection { nickname: participant.name.clone(), sender: tx.clone() },
    );
    drop(members);
    channel.host_id.read().clone()
}

/// 频道内的发言：先转发给其他人，再按指令或加入请求处理
async fn handle_say(
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    channel_id: &str,
    participant: &Participant,
    text: String,
) {
    let Some(channel) = state.channels.get(channel_id).map(|c| c.clone()) else {
        let _ = tx.send(ServerMessage::Error { message: "频道不存在".to_string() }).await;
        return;
    };
    {
        let said = ServerMessage::Said { from: participant.name.clone(), text: text.clone() };
        broadcast(channel.members.read().iter(), &said, Some(&participant.id));
    }

    let engine = &state.engine;
    let result = match Command::parse(&text) {
        Command::Help => {
            broadcast_notice(&channel, engine.help_text());
            Ok(())
        }
        Command::Start => engine.start(channel_id, participant).await,
        Command::Leaderboard => engine.leaderboard_text().await.map(|text| broadcast_notice(&channel, text)),
        Command::ForceEnd => {
            let host_id = channel.host_id.read().clone();
            if participant.id != host_id {
                let _ = tx.send(ServerMessage::Error { message: "只有房主可以强制结束游戏".to_string() }).await;
                return;
            }
            engine
                .force_end(channel_id)
                .await
                .map(|_| broadcast_notice(&channel, "🛑 游戏已强制结束，赌注已退还。".to_string()))
        }
        Command::Balance => {
            if !state.config.game.wager_mode_enabled {
                let _ = tx.send(ServerMessage::Error { message: "娱乐局没有余额".to_string() }).await;
                return;
            }
            match state.ledger.balance(&participant.id, &state.config.game.currency_tag).await {
                Ok(balance) => {
                    let _ = tx.send(ServerMessage::Notice { text: format!("💰 你的余额：{}", balance) }).await;
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Chat(text) => engine.join(channel_id, participant, &text).await.map(|_| ()),
    };

    match result {
        Ok(()) => {}
        // 不是加入请求，只是普通聊天；其余两种已经在频道里提示过
        Err(EngineError::InvalidJoin | EngineError::Busy | EngineError::InsufficientFunds { .. }) => {}
        Err(EngineError::LedgerUnavailable) => {}
        Err(e) => {
            error!("处理 {} 在频道 {} 的发言失败: {}", participant.id, channel_id, e);
            let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
        }
    }
}

/// 成员断开连接后的处理
async fn handle_disconnect(state: &SharedState, channel_id: &str, participant_id: &str) {
    info!("{} 从频道 {} 断开连接", participant_id, channel_id);
    let Some(channel) = state.channels.get(channel_id).map(|c| c.clone()) else {
        return;
    };

    let empty = {
        // members write lock
        let mut members = channel.members.write();
        let left = members.remove(participant_id);
        if let Some(left) = left {
            let msg = ServerMessage::Notice { text: format!("{} 离开了频道", left.nickname) };
            broadcast(members.iter(), &msg, None);
        }

        // 如果房主断开，转移房主权限
        let is_host = *channel.host_id.read() == participant_id;
        if is_host {
            if let Some((new_host_id, conn)) = members.iter().next() {
                *channel.host_id.write() = new_host_id.clone();
                let msg = ServerMessage::Notice { text: format!("房主已断开，新房主是 {}", conn.nickname) };
                broadcast(members.iter(), &msg, None);
                info!("频道 {} 的房主已转移给 {}", channel_id, new_host_id);
            }
        }
        members.is_empty()
    };

    // 判断是否解散频道
    // 移除前再确认一次，期间可能有人进入
    if empty && state.channels.remove_if(channel_id, |_, c| c.members.read().is_empty()).is_some() {
        if let Err(e) = state.engine.close_channel(channel_id).await {
            error!("解散频道 {} 失败: {}", channel_id, e);
        }
        info!("频道 {} 已空，已被移除", channel_id);
    }
}

fn broadcast_notice(channel: &Channel, text: String) {
    broadcast(channel.members.read().iter(), &ServerMessage::Notice { text }, None);
}

/// 向频道内所有成员广播消息
///
/// 使用 try_send，不在持锁期间等待。队列满或已断开的连接直接跳过。
fn broadcast<'a>(
    members: impl Iterator<Item = (&'a ParticipantId, &'a MemberConnection)>,
    message: &ServerMessage,
    exclude: Option<&str>,
) {
    for (member_id, conn) in members {
        if exclude == Some(member_id.as_str()) {
            continue;
        }
        if conn.sender.try_send(message.clone()).is_err() {
            // 发送失败，说明该成员也断开了，后续由其自己的 handle_socket 任务处理
            warn!("向 {} 发送消息失败（可能已断开）", member_id);
        }
    }
}
