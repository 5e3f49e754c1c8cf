use anyhow::Context;
use bull_card_core::Config;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// 服务器配置：监听地址、内存账本的初始余额，以及平铺展开的游戏配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// 金币局中新用户第一次进入频道时获得的余额
    pub starting_balance: u64,
    #[serde(flatten)]
    pub game: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], 25917)),
            starting_balance: 1000,
            game: Config::default(),
        }
    }
}

impl ServerConfig {
    /// 没有给出路径时使用默认配置
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(ServerConfig::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("配置文件 {} 格式错误", path.display()))
    }
}
