use crate::error::EngineError;
use crate::state::*;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// 招募截止时的判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecruitOutcome {
    /// 人数足够，已进入 Playing
    Start,
    /// 人数不足，状态未变，调用方负责重置并退款
    Cancelled { members: usize, required: usize },
    /// 当前不在招募中（已被强制结束或已开局）
    Ignored,
}

// --- 牌局状态流转 ---
//
// 这里只做纯粹的状态修改，存储、账本、计时器由 Engine 负责。

impl Session {
    pub fn new(channel_id: impl Into<ChannelId>, now: SystemTime) -> Self {
        Session {
            channel_id: channel_id.into(),
            state: SessionState::Idle,
            members: Vec::new(),
            stakes: HashMap::new(),
            updated_at: now,
        }
    }

    /// 非空闲且超过 `window` 没有更新的牌局视为已失效
    pub fn is_stale(&self, now: SystemTime, window: Duration) -> bool {
        self.state != SessionState::Idle
            && now.duration_since(self.updated_at).is_ok_and(|age| age > window)
    }

    /// Idle -> Recruiting
    ///
    /// 清空成员与下注。娱乐局的发起人直接作为第一个成员。
    pub fn open_recruiting(&mut self, now: SystemTime, starter: Option<ParticipantId>) {
        self.state = SessionState::Recruiting;
        self.members = starter.into_iter().collect();
        self.stakes.clear();
        self.updated_at = now;
    }

    /// 检查某人当前能否加入
    pub fn check_join(&self, participant_id: &str) -> Result<(), EngineError> {
        if self.state != SessionState::Recruiting || self.members.iter().any(|m| m == participant_id) {
            return Err(EngineError::InvalidJoin);
        }
        Ok(())
    }

    /// Recruiting --join--> Recruiting，返回加入后的人数
    pub fn admit(&mut self, participant_id: ParticipantId, stake: u64, now: SystemTime) -> Result<usize, EngineError> {
        self.check_join(&participant_id)?;
        if stake > 0 {
            self.stakes.insert(participant_id.clone(), stake);
        }
        self.members.push(participant_id);
        self.updated_at = now;
        Ok(self.members.len())
    }

    /// Recruiting --timer--> Playing（人数足够时）
    pub fn close_recruiting(&mut self, min_players: usize, now: SystemTime) -> RecruitOutcome {
        if self.state != SessionState::Recruiting {
            return RecruitOutcome::Ignored;
        }
        if self.members.len() < min_players {
            return RecruitOutcome::Cancelled { members: self.members.len(), required: min_players };
        }
        self.state = SessionState::Playing;
        self.updated_at = now;
        RecruitOutcome::Start
    }

    /// 任意状态 -> Idle，取出尚未结算的下注，是否退还由调用方决定
    pub fn reset(&mut self, now: SystemTime) -> HashMap<ParticipantId, u64> {
        self.state = SessionState::Idle;
        self.members.clear();
        self.updated_at = now;
        std::mem::take(&mut self.stakes)
    }
}

// --- 单元测试 ---
