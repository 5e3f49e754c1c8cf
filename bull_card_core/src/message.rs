use crate::state::{ChannelId, ParticipantId};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// 进入一个频道（不存在则创建）
    EnterChannel { channel_id: ChannelId, nickname: String },
    /// 在频道里说一句话，游戏指令和加入暗号也通过它发送
    Say(String),
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// 成功进入频道后私密地发给该用户
    Entered {
        your_id: ParticipantId,
        channel_id: ChannelId,
        host_id: ParticipantId, // 频道房主，可以强制结束牌局
    },
    /// 频道内其他人的发言
    Said { from: String, text: String },
    /// 牌局提示
    Notice { text: String },
    Error { message: String },
}
