use crate::card::{compare, Tier};
use crate::config::Config;
use crate::notice;
use crate::state::{ParticipantHand, ParticipantId, RankEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 单个参与者的胜负判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Win,
    Loss,
    /// 与庄家完全相同，退还本金
    Push,
}

/// 一个参与者的结算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub verdict: Verdict,
    /// 赢时使用的牌型倍率，其他情况为 0
    pub multiplier: u32,
    /// 需要打回账户的金额（本金 + 利润，或退还的本金）
    pub credit: u64,
    /// 计入排行榜的净盈亏
    pub net: i64,
}

/// 结算策略
///
/// 娱乐局与金币局各自实现一份，在配置加载时选定，之后不会在单局内切换。
/// 除了结算本身，模式相关的规则（最少人数、是否有庄家、加入方式、榜单排序）
/// 也都由策略决定。
pub trait SettlementStrategy: Send + Sync {
    /// 开局所需的最少玩家数（不含庄家）
    fn min_players(&self) -> usize;

    /// 是否发一手庄家牌
    fn deals_dealer(&self) -> bool;

    /// 发起人是否自动加入
    fn starter_joins(&self) -> bool;

    /// 是否需要账本服务
    fn uses_ledger(&self) -> bool;

    /// 把一条聊天文本解析为加入请求，返回下注额（娱乐局为 0）。
    /// 不匹配时返回 `None`。
    fn entry_stake(&self, text: &str) -> Option<u64>;

    /// 结算所有玩家。`dealer` 只在金币局存在。
    fn settle(&self, players: &[ParticipantHand], dealer: Option<&ParticipantHand>) -> Vec<Settlement>;

    fn order_leaderboard(&self, entries: &mut [RankEntry]);

    fn recruiting_notice(&self, starter: &str, config: &Config) -> String;

    fn joined_notice(&self, name: &str, stake: u64, count: usize) -> String;

    fn summary_notice(&self, players: &[ParticipantHand], settlements: &[Settlement]) -> String;

    fn leaderboard_notice(&self, entries: &[RankEntry]) -> String;
}

/// 金币局的牌型倍率
pub fn multiplier(tier: Tier) -> u32 {
    match tier.value() {
        11.. => 4, // 五小牛、五花牛、四炸
        10 => 3,   // 牛牛
        7..=9 => 2,
        _ => 1,
    }
}

impl Settlement {
    fn new(seat: &ParticipantHand, verdict: Verdict) -> Self {
        Settlement {
            participant_id: seat.participant_id.clone(),
            display_name: seat.display_name.clone(),
            verdict,
            multiplier: 0,
            credit: 0,
            net: 0,
        }
    }
}

impl RankEntry {
    /// 把一次结算计入排行榜，平局不计胜负
    pub fn apply(&mut self, settlement: &Settlement) {
        match settlement.verdict {
            Verdict::Win => self.wins += 1,
            Verdict::Loss => self.losses += 1,
            Verdict::Push => {}
        }
        self.net_earnings = self.net_earnings.saturating_add(settlement.net);
    }
}

// --- 娱乐局：玩家之间比牌 ---

pub struct PeerSettlement {
    entry_keyword: String,
}

impl PeerSettlement {
    pub fn new(entry_keyword: impl Into<String>) -> Self {
        PeerSettlement { entry_keyword: entry_keyword.into() }
    }
}

impl SettlementStrategy for PeerSettlement {
    fn min_players(&self) -> usize {
        2
    }

    fn deals_dealer(&self) -> bool {
        false
    }

    fn starter_joins(&self) -> bool {
        true
    }

    fn uses_ledger(&self) -> bool {
        false
    }

    fn entry_stake(&self, text: &str) -> Option<u64> {
        (text.trim() == self.entry_keyword).then_some(0)
    }

    /// 与最大一手完全相同的都算赢家，其余都算输
    fn settle(&self, players: &[ParticipantHand], _dealer: Option<&ParticipantHand>) -> Vec<Settlement> {
        let mut ranked: Vec<&ParticipantHand> = players.iter().collect();
        ranked.sort_by(|a, b| compare(&b.result, &a.result));
        let Some(top) = ranked.first().map(|p| p.result) else {
            return Vec::new();
        };

        ranked
            .into_iter()
            .map(|seat| match compare(&seat.result, &top) {
                Ordering::Equal => Settlement::new(seat, Verdict::Win),
                _ => Settlement::new(seat, Verdict::Loss),
            })
            .collect()
    }

    fn order_leaderboard(&self, entries: &mut [RankEntry]) {
        entries.sort_by(|a, b| b.wins.cmp(&a.wins));
    }

    fn recruiting_notice(&self, starter: &str, config: &Config) -> String {
        notice::recruiting_peer(starter, config)
    }

    fn joined_notice(&self, name: &str, _stake: u64, count: usize) -> String {
        notice::joined_peer(name, count)
    }

    fn summary_notice(&self, players: &[ParticipantHand], settlements: &[Settlement]) -> String {
        let winners: Vec<&Settlement> = settlements.iter().filter(|s| s.verdict == Verdict::Win).collect();
        let top = winners
            .first()
            .and_then(|w| players.iter().find(|p| p.participant_id == w.participant_id));
        match top {
            Some(top) => notice::peer_summary(top, &winners),
            None => String::new(),
        }
    }

    fn leaderboard_notice(&self, entries: &[RankEntry]) -> String {
        notice::leaderboard_peer(entries)
    }
}

// --- 金币局：每位玩家与庄家比牌 ---

pub struct WagerSettlement;

impl WagerSettlement {
    fn against(seat: &ParticipantHand, dealer: &ParticipantHand) -> Settlement {
        match compare(&seat.result, &dealer.result) {
            Ordering::Greater => {
                let multiplier = multiplier(seat.result.tier);
                let profit = seat.stake.saturating_mul(u64::from(multiplier));
                Settlement {
                    multiplier,
                    credit: seat.stake.saturating_add(profit),
                    net: i64::try_from(profit).unwrap_or(i64::MAX),
                    ..Settlement::new(seat, Verdict::Win)
                }
            }
            // 本金在加入时已经扣除
            Ordering::Less => Settlement {
                net: -i64::try_from(seat.stake).unwrap_or(i64::MAX),
                ..Settlement::new(seat, Verdict::Loss)
            },
            Ordering::Equal => Self::refund(seat),
        }
    }

    fn refund(seat: &ParticipantHand) -> Settlement {
        Settlement {
            credit: seat.stake,
            ..Settlement::new(seat, Verdict::Push)
        }
    }
}

impl SettlementStrategy for WagerSettlement {
    fn min_players(&self) -> usize {
        1
    }

    fn deals_dealer(&self) -> bool {
        true
    }

    fn starter_joins(&self) -> bool {
        false
    }

    fn uses_ledger(&self) -> bool {
        true
    }

    /// 下注额必须是正整数
    fn entry_stake(&self, text: &str) -> Option<u64> {
        text.trim().parse::<u64>().ok().filter(|&stake| stake > 0)
    }

    /// 没有庄家牌（发牌失败）时所有人按平局退还本金
    fn settle(&self, players: &[ParticipantHand], dealer: Option<&ParticipantHand>) -> Vec<Settlement> {
        players
            .iter()
            .map(|seat| match dealer {
                Some(dealer) => Self::against(seat, dealer),
                None => Self::refund(seat),
            })
            .collect()
    }

    fn order_leaderboard(&self, entries: &mut [RankEntry]) {
        entries.sort_by(|a, b| b.net_earnings.cmp(&a.net_earnings));
    }

    fn recruiting_notice(&self, starter: &str, config: &Config) -> String {
        notice::recruiting_wager(starter, config)
    }

    fn joined_notice(&self, name: &str, stake: u64, count: usize) -> String {
        notice::joined_wager(name, stake, count)
    }

    fn summary_notice(&self, _players: &[ParticipantHand], settlements: &[Settlement]) -> String {
        notice::wager_summary(settlements)
    }

    fn leaderboard_notice(&self, entries: &[RankEntry]) -> String {
        notice::leaderboard_wager(entries)
    }
}

// --- 单元测试 ---
