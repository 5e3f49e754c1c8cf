use crate::card::{evaluate, Hand, HandResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

pub type ChannelId = String;
pub type ParticipantId = String;

/// 发起请求的用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
}

/// 频道牌局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// 空闲，没有进行中的牌局
    #[default]
    Idle,
    /// 招募中，计时器已启动
    Recruiting,
    /// 发牌、结算中，不再接受加入
    Playing,
}

/// 每个频道唯一的一条牌局记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub channel_id: ChannelId,
    pub state: SessionState,
    // 按加入顺序排列，不会重复
    pub members: Vec<ParticipantId>,
    // 金币局的下注额，娱乐局为空
    pub stakes: HashMap<ParticipantId, u64>,
    pub updated_at: SystemTime,
}

/// 一局中某个参与者（含庄家）的手牌记录，每次发牌前清空重写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantHand {
    pub channel_id: ChannelId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub hand: Hand,
    pub result: HandResult,
    pub stake: u64,
}

/// 排行榜记录，跨牌局长期保存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub wins: u32,
    pub losses: u32,
    /// 金币局的净盈亏
    pub net_earnings: i64,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Participant { id: id.into(), name: name.into() }
    }
}

impl ParticipantHand {
    /// 记录一手牌并立即评估
    pub fn new(channel_id: &str, participant: &Participant, hand: Hand, stake: u64) -> Self {
        ParticipantHand {
            channel_id: channel_id.to_string(),
            participant_id: participant.id.clone(),
            display_name: participant.name.clone(),
            hand,
            result: evaluate(&hand),
            stake,
        }
    }
}

impl RankEntry {
    pub fn new(participant: &Participant) -> Self {
        let display_name = if participant.name.is_empty() {
            participant.id.clone()
        } else {
            participant.name.clone()
        };
        RankEntry {
            participant_id: participant.id.clone(),
            display_name,
            wins: 0,
            losses: 0,
            net_earnings: 0,
        }
    }
}
