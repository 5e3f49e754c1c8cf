use crate::error::{LedgerError, StoreError};
use crate::host::{Ledger, RecordStore};
use crate::state::*;
use dashmap::DashMap;

/// 基于内存的记录存储，进程退出即丢失
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<ChannelId, Session>,
    hands: DashMap<(ChannelId, ParticipantId), ParticipantHand>,
    ranks: DashMap<ParticipantId, RankEntry>,
}

/// 基于内存的账本，按 (账户, 币种) 记录余额
#[derive(Default)]
pub struct MemoryLedger {
    accounts: DashMap<(String, String), u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn session(&self, channel_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(channel_id).map(|s| s.clone()))
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions.insert(session.channel_id.clone(), session.clone());
        Ok(())
    }

    async fn remove_session(&self, channel_id: &str) -> Result<(), StoreError> {
        self.sessions.remove(channel_id);
        Ok(())
    }

    async fn clear_hands(&self, channel_id: &str) -> Result<(), StoreError> {
        self.hands.retain(|(channel, _), _| channel != channel_id);
        Ok(())
    }

    async fn insert_hand(&self, hand: &ParticipantHand) -> Result<(), StoreError> {
        let key = (hand.channel_id.clone(), hand.participant_id.clone());
        self.hands.insert(key, hand.clone());
        Ok(())
    }

    async fn hands(&self, channel_id: &str) -> Result<Vec<ParticipantHand>, StoreError> {
        Ok(self
            .hands
            .iter()
            .filter(|entry| entry.key().0 == channel_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn rank(&self, participant_id: &str) -> Result<Option<RankEntry>, StoreError> {
        Ok(self.ranks.get(participant_id).map(|r| r.clone()))
    }

    async fn save_rank(&self, entry: &RankEntry) -> Result<(), StoreError> {
        self.ranks.insert(entry.participant_id.clone(), entry.clone());
        Ok(())
    }

    async fn ranks(&self) -> Result<Vec<RankEntry>, StoreError> {
        Ok(self.ranks.iter().map(|r| r.value().clone()).collect())
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 账户不存在时以 `initial` 开户，返回当前余额
    pub fn open_account(&self, account: &str, currency: &str, initial: u64) -> u64 {
        *self
            .accounts
            .entry((account.to_string(), currency.to_string()))
            .or_insert(initial)
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn reserve(&self, account: &str, amount: u64, currency: &str) -> Result<(), LedgerError> {
        let mut balance = self
            .accounts
            .entry((account.to_string(), currency.to_string()))
            .or_insert(0);
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds { balance: *balance });
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit(&self, account: &str, amount: u64, currency: &str) -> Result<(), LedgerError> {
        let mut balance = self
            .accounts
            .entry((account.to_string(), currency.to_string()))
            .or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    async fn balance(&self, account: &str, currency: &str) -> Result<u64, LedgerError> {
        Ok(self
            .accounts
            .get(&(account.to_string(), currency.to_string()))
            .map_or(0, |b| *b))
    }
}
