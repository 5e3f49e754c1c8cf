//! # 斗牛纸牌核心逻辑库
//!
//! 这个 `core` crate 包含斗牛游戏的牌型评估、频道牌局状态机、
//! 两种结算策略（娱乐局 / 金币局），以及宿主需要实现的协作接口
//! （记录存储、账本、消息通知）。
//! 它与具体的聊天传输层解耦，可以被任何上层应用复用。

mod card;
mod config;
mod engine;
mod error;
mod host;
mod logic;
mod memory;
mod message;
mod notice;
mod settlement;
mod state;

pub use card::*;

pub use config::*;

pub use engine::*;

pub use error::*;

pub use host::*;

pub use logic::*;

pub use memory::*;

pub use message::*;

pub use settlement::*;

pub use state::*;
