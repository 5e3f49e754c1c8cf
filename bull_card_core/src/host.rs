//! 宿主提供的协作接口
//!
//! 引擎只通过这些接口读写记录、操作账户和发送消息，
//! 不关心背后是数据库、远程服务还是内存实现。

use crate::error::{LedgerError, StoreError};
use crate::state::{ParticipantHand, RankEntry, Session};

/// 记录存储。三张表：
/// - Session：按频道
/// - ParticipantHand：按频道 + 参与者，每次发牌前清空
/// - RankEntry：按参与者，长期保存
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn session(&self, channel_id: &str) -> Result<Option<Session>, StoreError>;

    /// 不存在则创建，存在则覆盖
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn remove_session(&self, channel_id: &str) -> Result<(), StoreError>;

    async fn clear_hands(&self, channel_id: &str) -> Result<(), StoreError>;

    async fn insert_hand(&self, hand: &ParticipantHand) -> Result<(), StoreError>;

    async fn hands(&self, channel_id: &str) -> Result<Vec<ParticipantHand>, StoreError>;

    async fn rank(&self, participant_id: &str) -> Result<Option<RankEntry>, StoreError>;

    async fn save_rank(&self, entry: &RankEntry) -> Result<(), StoreError>;

    async fn ranks(&self) -> Result<Vec<RankEntry>, StoreError>;
}

/// 账本服务，持有每个用户各币种的余额
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// 预扣款。余额不足时返回 `LedgerError::InsufficientFunds`，且不做任何修改。
    async fn reserve(&self, account: &str, amount: u64, currency: &str) -> Result<(), LedgerError>;

    /// 入账，用于派彩和退款
    async fn credit(&self, account: &str, amount: u64, currency: &str) -> Result<(), LedgerError>;

    async fn balance(&self, account: &str, currency: &str) -> Result<u64, LedgerError>;
}

/// 向频道发送文本。发出即可，不等待送达。
pub trait Notifier: Send + Sync {
    fn notify(&self, channel_id: &str, text: String);
}
