use crate::settlement::{PeerSettlement, SettlementStrategy, WagerSettlement};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 游戏配置，所有字段都有默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// 等待玩家加入的时间（秒）
    pub wait_timeout_seconds: u64,
    /// 娱乐局加入暗号
    pub entry_keyword: String,
    /// 开启金币局（需要账本服务）
    pub wager_mode_enabled: bool,
    pub currency_tag: String,
    /// 逐个亮牌的间隔（毫秒），0 表示一次性展示所有结果
    pub deal_reveal_delay_ms: u64,
    pub stale_session_window_minutes: u64,
    pub dealer_name: String,
    pub leaderboard_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            wait_timeout_seconds: 10,
            entry_keyword: "1".to_string(),
            wager_mode_enabled: false,
            currency_tag: "default".to_string(),
            deal_reveal_delay_ms: 2000,
            stale_session_window_minutes: 10,
            dealer_name: "庄家".to_string(),
            leaderboard_size: 10,
        }
    }
}

impl Config {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.deal_reveal_delay_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_session_window_minutes * 60)
    }

    /// 根据配置选定结算策略，整个引擎生命周期内不变
    pub fn strategy(&self) -> Box<dyn SettlementStrategy> {
        if self.wager_mode_enabled {
            Box::new(WagerSettlement)
        } else {
            Box::new(PeerSettlement::new(self.entry_keyword.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{ "wagerModeEnabled": true, "waitTimeoutSeconds": 30 }"#).unwrap();
        assert!(config.wager_mode_enabled);
        assert_eq!(config.wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.entry_keyword, "1");
        assert_eq!(config.stale_window(), Duration::from_secs(600));
        assert_eq!(config.reveal_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_strategy_follows_mode() {
        let peer = Config::default().strategy();
        assert_eq!(peer.min_players(), 2);
        assert!(!peer.deals_dealer());

        let wager = Config { wager_mode_enabled: true, ..Config::default() }.strategy();
        assert_eq!(wager.min_players(), 1);
        assert!(wager.deals_dealer());
        assert!(wager.uses_ledger());
    }
}
