//! 发往频道的提示文本

use crate::config::Config;
use crate::settlement::{Settlement, Verdict};
use crate::state::{ParticipantHand, RankEntry};

pub(crate) fn recruiting_peer(starter: &str, config: &Config) -> String {
    format!(
        "📢 斗牛【娱乐局】开始！\n发起人：{}\n请想玩的成员在 {} 秒内发送【{}】加入游戏！",
        starter, config.wait_timeout_seconds, config.entry_keyword
    )
}

pub(crate) fn recruiting_wager(starter: &str, config: &Config) -> String {
    format!(
        "📢 斗牛【金币局】开始！\n发起人：{}\n请在 {} 秒内发送【下注金额】(纯数字)加入挑战庄家！",
        starter, config.wait_timeout_seconds
    )
}

pub(crate) fn joined_peer(name: &str, count: usize) -> String {
    format!("{} 加入成功！当前人数：{}", name, count)
}

pub(crate) fn joined_wager(name: &str, stake: u64, count: usize) -> String {
    format!("{} 投入 {} 加入赌局！(当前 {} 人)", name, stake, count)
}

pub(crate) fn busy() -> String {
    "🚫 当前有游戏正在进行中，请稍后再试或输入【bullCard.强制结束】".to_string()
}

pub(crate) fn insufficient_funds(name: &str, stake: u64, balance: u64) -> String {
    format!("{} 你的钱不够下注 {}！当前余额：{}", name, stake, balance)
}

pub(crate) fn ledger_error() -> String {
    "无法获取余额信息。".to_string()
}

pub(crate) fn not_enough_players(required: usize) -> String {
    format!("👥 人数不足 {} 人，游戏取消。", required)
}

pub(crate) fn dealing(members: usize) -> String {
    format!("⏰ 截止！共 {} 人参与，正在发牌...", members)
}

pub(crate) fn reveal_one(seat: &ParticipantHand) -> String {
    format!("{} 亮牌...\n{}\n结果：【{}】", seat.display_name, seat.hand, seat.result.tier)
}

pub(crate) fn reveal_all(seats: &[&ParticipantHand]) -> String {
    let lines: Vec<String> = seats
        .iter()
        .map(|s| format!("{}：{} | 【{}】", s.display_name, s.hand, s.result.tier))
        .collect();
    format!("🃏 开牌结果：\n\n{}", lines.join("\n"))
}

pub(crate) fn peer_summary(top: &ParticipantHand, winners: &[&Settlement]) -> String {
    let names: Vec<&str> = winners.iter().map(|w| w.display_name.as_str()).collect();
    format!(
        "🎉 最终胜者：{}\n牌型：{} ({})",
        names.join(" "),
        top.result.tier,
        top.result.tie_break
    )
}

pub(crate) fn wager_summary(settlements: &[Settlement]) -> String {
    let lines: Vec<String> = settlements
        .iter()
        .map(|s| match s.verdict {
            Verdict::Win => format!("{} 胜 (x{})，赚取 {}", s.display_name, s.multiplier, s.net),
            Verdict::Loss => format!("{} 败，失去 {}", s.display_name, s.net.unsigned_abs()),
            Verdict::Push => format!("{} 平，退还 {}", s.display_name, s.credit),
        })
        .collect();
    format!("💰 结算清单 💰\n\n{}", lines.join("\n"))
}

pub(crate) fn leaderboard_peer(entries: &[RankEntry]) -> String {
    if entries.is_empty() {
        return "暂无数据。".to_string();
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. [胜:{}|负:{}] {}", i + 1, p.wins, p.losses, p.display_name))
        .collect();
    format!("🏆 斗牛胜负榜 🏆\n{}", lines.join("\n"))
}

pub(crate) fn leaderboard_wager(entries: &[RankEntry]) -> String {
    if entries.is_empty() {
        return "暂无数据。".to_string();
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let icon = if p.net_earnings >= 0 { "📈" } else { "📉" };
            format!("{}. {} : {} {}", i + 1, p.display_name, icon, p.net_earnings)
        })
        .collect();
    format!("💰 斗牛富豪榜 (净盈亏) 💰\n{}", lines.join("\n"))
}

pub(crate) fn help(config: &Config) -> String {
    let (mode, rules) = if config.wager_mode_enabled {
        (
            "💰 金币赌注模式",
            "💰 规则：系统坐庄，玩家下注后与庄家比牌。\n若玩家赢，获得本金 + 赌注 x 牌型倍率。\n倍率：五小牛/五花牛/四炸 x4，牛牛 x3，牛七~牛九 x2，其他 x1\n",
        )
    } else {
        ("🎮 纯娱乐模式", "📋 规则：玩家之间互相比牌，最大者胜。\n")
    };
    let balance = if config.wager_mode_enabled { "• bullCard.余额 - 查看余额\n" } else { "" };
    format!(
        "🎮 斗牛纸牌游戏指令列表 [{}]：\n\
         • bullCard.来一局 - 发起游戏\n\
         • bullCard.排行榜 - 查看榜单\n\
         • bullCard.强制结束 - 强制重置（退还赌注）\n\
         {}\n\
         {}\n\
         🎴 牌面计算规则：\n\
         • 每局五张牌，任选三张和为10的倍数\n\
         • 剩余两张和取余10为结果（牛几）\n\
         • JQK计10，A计1，其他按牌面计\n\
         • 剩余两张和亦为10倍数：牛牛（结果10）\n\
         • 无三张可组10倍数：没牛（结果0）\n\n\
         🌟 特殊牌型：\n\
         • 恰好四张同点：四炸\n\
         • 全为JQK：五花牛\n\
         • 全为小于5的牌且总和≤10：五小牛\n\n\
         📊 牌型大小：五小牛 > 五花牛 > 四炸 > 牛牛 > 牛九 > ... > 牛丁 > 没牛\n\
         同分时比较最大单牌（点数 > 花色）",
        mode, balance, rules
    )
}
