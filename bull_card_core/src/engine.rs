use crate::card::{build_shuffled_deck, deal_hand, deck_count_for, Card};
use crate::config::Config;
use crate::error::{EngineError, LedgerError};
use crate::host::{Ledger, Notifier, RecordStore};
use crate::logic::RecruitOutcome;
use crate::notice;
use crate::settlement::{Settlement, SettlementStrategy};
use crate::state::*;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// 庄家在手牌记录中使用的保留 ID
pub const DEALER_ID: &str = "__dealer__";

/// 招募截止后一局的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// 频道当前不在招募中，什么都没做
    NotRecruiting,
    /// 人数不足，已取消并退款
    Cancelled,
    /// 已发牌并结算
    Settled(Vec<Settlement>),
}

/// 某个频道的招募计时器。`generation` 用来保证到点的计时器只移除自己。
struct RecruitTimer {
    generation: u64,
    handle: AbortHandle,
}

impl RecruitTimer {
    fn cancel(&self) {
        self.handle.abort();
    }
}

/// 斗牛牌局引擎
///
/// 每个频道同一时间只有一局。所有对牌局记录的"读-检查-写"都在该频道的锁内完成，
/// 发牌、亮牌、结算则在锁外进行，此时牌局处于 Playing，不会再有人加入。
pub struct Engine {
    config: Config,
    strategy: Box<dyn SettlementStrategy>,
    store: Arc<dyn RecordStore>,
    ledger: Option<Arc<dyn Ledger>>,
    notifier: Arc<dyn Notifier>,
    locks: DashMap<ChannelId, Arc<Mutex<()>>>,
    timers: DashMap<ChannelId, RecruitTimer>,
    generation: AtomicU64,
    ledger_warned: AtomicBool,
}

impl Engine {
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        ledger: Option<Arc<dyn Ledger>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let strategy = config.strategy();
        Engine {
            config,
            strategy,
            store,
            ledger,
            notifier,
            locks: DashMap::new(),
            timers: DashMap::new(),
            generation: AtomicU64::new(0),
            ledger_warned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategy(&self) -> &dyn SettlementStrategy {
        self.strategy.as_ref()
    }

    pub fn help_text(&self) -> String {
        notice::help(&self.config)
    }

    // --- 核心游戏流程函数 ---

    /// 发起一局：Idle -> Recruiting，并启动招募计时器
    ///
    /// 已有牌局时返回 `Busy`，除非该牌局已超过失效窗口未更新，
    /// 此时视为崩溃残局，先退款重置再开新局。
    pub async fn start(self: &Arc<Self>, channel_id: &str, starter: &Participant) -> Result<(), EngineError> {
        let lock = self.channel_lock(channel_id);
        let _guard = lock.lock().await;
        let now = SystemTime::now();

        let mut session = match self.store.session(channel_id).await? {
            Some(session) if session.state != SessionState::Idle => {
                if !session.is_stale(now, self.config.stale_window()) {
                    self.notifier.notify(channel_id, notice::busy());
                    return Err(EngineError::Busy);
                }
                warn!("频道 {} 的牌局长时间未更新 ({:?})，强制重置", channel_id, session.state);
                self.cancel_timer(channel_id);
                self.reset_session(session, true).await?
            }
            Some(session) => session,
            None => Session::new(channel_id, now),
        };

        self.cancel_timer(channel_id);
        let first_member = self.strategy.starter_joins().then(|| starter.id.clone());
        session.open_recruiting(now, first_member);
        self.store.save_session(&session).await?;
        self.arm_timer(channel_id);
        self.ensure_rank(starter).await;

        info!("{} 在频道 {} 发起了牌局", starter.id, channel_id);
        let display_name = self.display_name_of(starter);
        self.notifier
            .notify(channel_id, self.strategy.recruiting_notice(display_name, &self.config));
        Ok(())
    }

    /// 加入招募中的牌局，返回加入后的人数
    ///
    /// 不匹配的文本返回 `InvalidJoin`，调用方应当把它当作普通聊天忽略。
    /// 金币局先预扣下注额，预扣成功后才写入成员列表。
    pub async fn join(&self, channel_id: &str, participant: &Participant, text: &str) -> Result<usize, EngineError> {
        let lock = self.channel_lock(channel_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.store.session(channel_id).await? else {
            return Err(EngineError::InvalidJoin);
        };
        session.check_join(&participant.id)?;
        if self.strategy.uses_ledger() && self.ledger.is_none() {
            if !self.ledger_warned.swap(true, Ordering::Relaxed) {
                warn!("已开启金币模式，但没有可用的账本服务，所有加入请求都会被拒绝");
            }
            return Err(EngineError::LedgerUnavailable);
        }
        let stake = self.strategy.entry_stake(text).ok_or(EngineError::InvalidJoin)?;

        if stake > 0 {
            self.reserve(channel_id, participant, stake).await?;
        }
        let count = session.admit(participant.id.clone(), stake, SystemTime::now())?;
        if let Err(e) = self.store.save_session(&session).await {
            if stake > 0 {
                self.refund(channel_id, &participant.id, stake).await;
            }
            return Err(e.into());
        }
        self.ensure_rank(participant).await;

        debug!("{} 加入频道 {} 的牌局，下注 {}", participant.id, channel_id, stake);
        let display_name = self.display_name_of(participant);
        self.notifier
            .notify(channel_id, self.strategy.joined_notice(display_name, stake, count));
        Ok(count)
    }

    /// 招募截止（计时器到点时调用）
    ///
    /// 人数不足则取消并退款；否则进入 Playing，发牌、亮牌、结算，最后回到 Idle。
    /// 结算中个别参与者的失败只记录日志，不影响其他人，也不回滚已完成的入账。
    pub async fn close_recruiting(&self, channel_id: &str) -> Result<RoundOutcome, EngineError> {
        self.close_round(channel_id, None).await
    }

    /// `generation` 为计时器编号；手动截止时为 `None`，顺带取消计时器
    async fn close_round(&self, channel_id: &str, generation: Option<u64>) -> Result<RoundOutcome, EngineError> {
        let session = {
            let lock = self.channel_lock(channel_id);
            let _guard = lock.lock().await;

            match generation {
                // 计时器已被取消，或已被新一轮的计时器替换
                Some(g) if self.timers.remove_if(channel_id, |_, timer| timer.generation == g).is_none() => {
                    debug!("频道 {} 的过期计时器 #{} 被忽略", channel_id, g);
                    return Ok(RoundOutcome::NotRecruiting);
                }
                Some(_) => {}
                None => self.cancel_timer(channel_id),
            }

            let Some(mut session) = self.store.session(channel_id).await? else {
                return Ok(RoundOutcome::NotRecruiting);
            };
            match session.close_recruiting(self.strategy.min_players(), SystemTime::now()) {
                RecruitOutcome::Ignored => return Ok(RoundOutcome::NotRecruiting),
                RecruitOutcome::Cancelled { members, required } => {
                    info!("频道 {} 人数不足 ({}/{})，取消牌局", channel_id, members, required);
                    self.notifier.notify(channel_id, notice::not_enough_players(required));
                    self.reset_session(session, true).await?;
                    return Ok(RoundOutcome::Cancelled);
                }
                RecruitOutcome::Start => {
                    // 进入 Playing 后下注归结算处理，强制结束不再退还
                    let stakes = std::mem::take(&mut session.stakes);
                    self.store.save_session(&session).await?;
                    Session { stakes, ..session }
                }
            }
        };

        let settlements = self.play_round(&session).await;
        self.finish_round(channel_id).await?;
        Ok(RoundOutcome::Settled(settlements))
    }

    /// 强制结束：任意状态 -> Idle，退还所有尚未结算的下注
    pub async fn force_end(&self, channel_id: &str) -> Result<(), EngineError> {
        let lock = self.channel_lock(channel_id);
        let _guard = lock.lock().await;
        self.cancel_timer(channel_id);

        if let Some(session) = self.store.session(channel_id).await? {
            info!("频道 {} 的牌局被强制结束 ({:?})", channel_id, session.state);
            self.reset_session(session, true).await?;
        }
        Ok(())
    }

    /// 频道解散：结束当前牌局并清掉该频道的所有临时记录，排行榜保留
    pub async fn close_channel(&self, channel_id: &str) -> Result<(), EngineError> {
        self.force_end(channel_id).await?;
        {
            let lock = self.channel_lock(channel_id);
            let _guard = lock.lock().await;
            self.store.remove_session(channel_id).await?;
            self.store.clear_hands(channel_id).await?;
        }
        self.locks.remove(channel_id);
        debug!("频道 {} 已解散", channel_id);
        Ok(())
    }

    /// 排行榜前 N 名，排序方式由结算策略决定
    pub async fn leaderboard(&self) -> Result<Vec<RankEntry>, EngineError> {
        let mut entries = self.store.ranks().await?;
        self.strategy.order_leaderboard(&mut entries);
        entries.truncate(self.config.leaderboard_size);
        Ok(entries)
    }

    pub async fn leaderboard_text(&self) -> Result<String, EngineError> {
        let entries = self.leaderboard().await?;
        Ok(self.strategy.leaderboard_notice(&entries))
    }

    // --- 辅助逻辑函数 ---

    fn channel_lock(&self, channel_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(channel_id.to_string()).or_default().value().clone()
    }

    fn display_name_of<'a>(&self, participant: &'a Participant) -> &'a str {
        if participant.name.is_empty() { &participant.id } else { &participant.name }
    }

    fn arm_timer(self: &Arc<Self>, channel_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.config.wait_timeout();
        let engine = Arc::clone(self);
        let channel = channel_id.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // 结算一旦开始就不可取消，放到独立任务里，与计时器的 abort 脱钩
            tokio::spawn(async move {
                if let Err(e) = engine.close_round(&channel, Some(generation)).await {
                    error!("频道 {} 招募截止处理失败: {}", channel, e);
                }
            });
        });

        let timer = RecruitTimer { generation, handle: task.abort_handle() };
        if let Some(previous) = self.timers.insert(channel_id.to_string(), timer) {
            previous.cancel();
        }
    }

    fn cancel_timer(&self, channel_id: &str) {
        if let Some((_, timer)) = self.timers.remove(channel_id) {
            timer.cancel();
        }
    }

    async fn reserve(&self, channel_id: &str, participant: &Participant, stake: u64) -> Result<(), EngineError> {
        let Some(ledger) = &self.ledger else {
            return Err(EngineError::LedgerUnavailable);
        };
        match ledger.reserve(&participant.id, stake, &self.config.currency_tag).await {
            Ok(()) => Ok(()),
            Err(LedgerError::InsufficientFunds { balance }) => {
                let name = self.display_name_of(participant);
                self.notifier
                    .notify(channel_id, notice::insufficient_funds(name, stake, balance));
                Err(EngineError::InsufficientFunds { stake, balance })
            }
            Err(e) => {
                error!("为 {} 预扣 {} 失败: {}", participant.id, stake, e);
                self.notifier.notify(channel_id, notice::ledger_error());
                Err(e.into())
            }
        }
    }

    /// 退款失败只记录日志，不影响其他人
    async fn refund(&self, channel_id: &str, participant_id: &str, amount: u64) {
        let Some(ledger) = &self.ledger else {
            error!("频道 {} 需要向 {} 退还 {}，但账本服务不可用", channel_id, participant_id, amount);
            return;
        };
        match ledger.credit(participant_id, amount, &self.config.currency_tag).await {
            Ok(()) => info!("频道 {} 向 {} 退还 {}", channel_id, participant_id, amount),
            Err(e) => error!("频道 {} 向 {} 退还 {} 失败: {}", channel_id, participant_id, amount, e),
        }
    }

    /// 把牌局置为 Idle 并保存；`refund` 为真时退还取出的下注
    async fn reset_session(&self, mut session: Session, refund: bool) -> Result<Session, EngineError> {
        let stakes: HashMap<ParticipantId, u64> = session.reset(SystemTime::now());
        self.store.save_session(&session).await?;
        if refund {
            for (participant_id, amount) in stakes {
                if amount > 0 {
                    self.refund(&session.channel_id, &participant_id, amount).await;
                }
            }
        }
        Ok(session)
    }

    /// 确保排行榜里有这个人，顺便更新昵称。失败只记录日志，结算时会补建。
    async fn ensure_rank(&self, participant: &Participant) {
        let saved = match self.store.rank(&participant.id).await {
            Ok(None) => self.store.save_rank(&RankEntry::new(participant)).await,
            Ok(Some(mut entry)) if !participant.name.is_empty() && entry.display_name != participant.name => {
                entry.display_name = participant.name.clone();
                self.store.save_rank(&entry).await
            }
            Ok(Some(_)) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("更新 {} 的排行榜记录失败: {}", participant.id, e);
        }
    }

    async fn member_name(&self, participant_id: &str) -> String {
        match self.store.rank(participant_id).await {
            Ok(Some(entry)) => entry.display_name,
            Ok(None) => participant_id.to_string(),
            Err(e) => {
                warn!("读取 {} 的昵称失败: {}", participant_id, e);
                participant_id.to_string()
            }
        }
    }

    /// 发牌、亮牌、结算。这一步不会失败，个别问题只记录日志。
    async fn play_round(&self, session: &Session) -> Vec<Settlement> {
        let channel_id = session.channel_id.as_str();
        self.notifier.notify(channel_id, notice::dealing(session.members.len()));

        let seats = session.members.len() + usize::from(self.strategy.deals_dealer());
        let mut deck = build_shuffled_deck(deck_count_for(seats));
        if let Err(e) = self.store.clear_hands(channel_id).await {
            warn!("清理频道 {} 的旧手牌失败: {}", channel_id, e);
        }

        // 先给庄家发牌，保证庄家一定有牌
        let dealer = if self.strategy.deals_dealer() {
            let dealer = Participant::new(DEALER_ID, format!("👑 {}", self.config.dealer_name));
            self.deal_seat(channel_id, &dealer, 0, &mut deck).await
        } else {
            None
        };

        let mut players = Vec::with_capacity(session.members.len());
        for member in &session.members {
            let participant = Participant::new(member.clone(), self.member_name(member).await);
            let stake = session.stakes.get(member).copied().unwrap_or(0);
            match self.deal_seat(channel_id, &participant, stake, &mut deck).await {
                Some(seat) => players.push(seat),
                None if stake > 0 => self.refund(channel_id, member, stake).await,
                None => {}
            }
        }

        let table: Vec<&ParticipantHand> = players.iter().chain(dealer.iter()).collect();
        self.reveal(channel_id, &table).await;

        let settlements = self.strategy.settle(&players, dealer.as_ref());
        for settlement in &settlements {
            self.apply_settlement(channel_id, settlement).await;
        }
        self.notifier
            .notify(channel_id, self.strategy.summary_notice(&players, &settlements));
        info!("频道 {} 结算完成，共 {} 人", channel_id, settlements.len());
        settlements
    }

    /// 发 5 张牌并写入手牌记录。牌不够时跳过这个人。
    async fn deal_seat(
        &self,
        channel_id: &str,
        participant: &Participant,
        stake: u64,
        deck: &mut Vec<Card>,
    ) -> Option<ParticipantHand> {
        let hand = match deal_hand(deck) {
            Ok(hand) => hand,
            Err(e) => {
                warn!("频道 {} 为 {} 发牌失败，跳过: {}", channel_id, participant.id, e);
                return None;
            }
        };
        let seat = ParticipantHand::new(channel_id, participant, hand, stake);
        if let Err(e) = self.store.insert_hand(&seat).await {
            warn!("保存 {} 的手牌失败: {}", participant.id, e);
        }
        Some(seat)
    }

    /// 亮牌。间隔为 0 时一次性展示，否则逐个展示；两种方式的结算结果相同。
    async fn reveal(&self, channel_id: &str, table: &[&ParticipantHand]) {
        let delay = self.config.reveal_delay();
        if delay.is_zero() {
            self.notifier.notify(channel_id, notice::reveal_all(table));
            return;
        }
        for seat in table {
            self.notifier.notify(channel_id, notice::reveal_one(seat));
            tokio::time::sleep(delay).await;
        }
    }

    /// 入账并更新排行榜。入账失败时不更新该玩家的战绩。
    async fn apply_settlement(&self, channel_id: &str, settlement: &Settlement) {
        if settlement.credit > 0 {
            let credited = match &self.ledger {
                Some(ledger) => ledger
                    .credit(&settlement.participant_id, settlement.credit, &self.config.currency_tag)
                    .await
                    .map_err(EngineError::from),
                None => Err(EngineError::LedgerUnavailable),
            };
            if let Err(e) = credited {
                error!(
                    "频道 {} 向 {} 派发 {} 失败: {}",
                    channel_id, settlement.participant_id, settlement.credit, e
                );
                return;
            }
        }

        let entry = match self.store.rank(&settlement.participant_id).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("读取 {} 的战绩失败: {}", settlement.participant_id, e);
                return;
            }
        };
        let mut entry = entry.unwrap_or_else(|| {
            RankEntry::new(&Participant::new(settlement.participant_id.clone(), settlement.display_name.clone()))
        });
        entry.apply(settlement);
        if let Err(e) = self.store.save_rank(&entry).await {
            error!("保存 {} 的战绩失败: {}", settlement.participant_id, e);
        }
    }

    /// 一局结束后回到 Idle。期间被强制结束过的牌局保持原样。
    async fn finish_round(&self, channel_id: &str) -> Result<(), EngineError> {
        let lock = self.channel_lock(channel_id);
        let _guard = lock.lock().await;
        if let Some(session) = self.store.session(channel_id).await? {
            if session.state == SessionState::Playing {
                self.reset_session(session, false).await?;
            }
        }
        Ok(())
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryLedger, MemoryStore};
    use crate::settlement::Verdict;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    const GOLD: &str = "default";

    // 记录所有发出的提示
    #[derive(Default)]
    struct Inbox(SyncMutex<Vec<(String, String)>>);

    impl Notifier for Inbox {
        fn notify(&self, channel_id: &str, text: String) {
            self.0.lock().push((channel_id.to_string(), text));
        }
    }

    impl Inbox {
        fn contains(&self, needle: &str) -> bool {
            self.0.lock().iter().any(|(_, text)| text.contains(needle))
        }
    }

    // 排行榜写入总是失败的存储，其余委托给内存实现
    #[derive(Default)]
    struct RankWriteFails(MemoryStore);

    #[async_trait::async_trait]
    impl RecordStore for RankWriteFails {
        async fn session(&self, channel_id: &str) -> Result<Option<Session>, StoreError> {
            self.0.session(channel_id).await
        }

        async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
            self.0.save_session(session).await
        }

        async fn remove_session(&self, channel_id: &str) -> Result<(), StoreError> {
            self.0.remove_session(channel_id).await
        }

        async fn clear_hands(&self, channel_id: &str) -> Result<(), StoreError> {
            self.0.clear_hands(channel_id).await
        }

        async fn insert_hand(&self, hand: &ParticipantHand) -> Result<(), StoreError> {
            self.0.insert_hand(hand).await
        }

        async fn hands(&self, channel_id: &str) -> Result<Vec<ParticipantHand>, StoreError> {
            self.0.hands(channel_id).await
        }

        async fn rank(&self, participant_id: &str) -> Result<Option<RankEntry>, StoreError> {
            self.0.rank(participant_id).await
        }

        async fn save_rank(&self, _: &RankEntry) -> Result<(), StoreError> {
            Err(StoreError("disk full".to_string()))
        }

        async fn ranks(&self) -> Result<Vec<RankEntry>, StoreError> {
            self.0.ranks().await
        }
    }

    // 预扣正常，但入账总是失败的账本
    struct BrokenLedger(MemoryLedger);

    #[async_trait::async_trait]
    impl Ledger for BrokenLedger {
        async fn reserve(&self, account: &str, amount: u64, currency: &str) -> Result<(), LedgerError> {
            self.0.reserve(account, amount, currency).await
        }

        async fn credit(&self, _: &str, _: u64, _: &str) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("offline".to_string()))
        }

        async fn balance(&self, account: &str, currency: &str) -> Result<u64, LedgerError> {
            self.0.balance(account, currency).await
        }
    }

    struct Table {
        engine: Arc<Engine>,
        store: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        inbox: Arc<Inbox>,
    }

    fn config(wager: bool) -> Config {
        Config {
            wager_mode_enabled: wager,
            // 测试里手动调用 close_recruiting，计时器不会到点
            wait_timeout_seconds: 3600,
            deal_reveal_delay_ms: 0,
            ..Config::default()
        }
    }

    fn table(config: Config) -> Table {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let inbox = Arc::new(Inbox::default());
        let engine = Arc::new(Engine::new(config, store.clone(), Some(ledger.clone()), inbox.clone()));
        Table { engine, store, ledger, inbox }
    }

    fn player(id: &str) -> Participant {
        Participant::new(id, id.to_uppercase())
    }

    async fn state_of(table: &Table) -> SessionState {
        table.store.session("c").await.unwrap().unwrap().state
    }

    #[tokio::test]
    async fn test_peer_round_cancelled_with_one_member() {
        let t = table(config(false));
        t.engine.start("c", &player("alice")).await.unwrap();
        assert_eq!(state_of(&t).await, SessionState::Recruiting);

        assert_eq!(t.engine.close_recruiting("c").await, Ok(RoundOutcome::Cancelled));
        assert_eq!(state_of(&t).await, SessionState::Idle);
        assert!(t.store.hands("c").await.unwrap().is_empty());
        assert!(t.inbox.contains("人数不足 2 人"));
    }

    #[tokio::test]
    async fn test_peer_round_settles_and_returns_to_idle() {
        let t = table(config(false));
        t.engine.start("c", &player("alice")).await.unwrap();
        assert_eq!(t.engine.join("c", &player("bob"), "1").await, Ok(2));
        assert_eq!(t.engine.join("c", &player("carol"), "hello").await, Err(EngineError::InvalidJoin));
        assert_eq!(t.engine.join("c", &player("alice"), "1").await, Err(EngineError::InvalidJoin));

        let Ok(RoundOutcome::Settled(settlements)) = t.engine.close_recruiting("c").await else {
            panic!("round should settle");
        };
        assert_eq!(settlements.len(), 2);
        assert!(settlements.iter().any(|s| s.verdict == Verdict::Win));

        let session = t.store.session("c").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.members.is_empty());
        assert_eq!(t.store.hands("c").await.unwrap().len(), 2);

        for id in ["alice", "bob"] {
            let entry = t.store.rank(id).await.unwrap().unwrap();
            assert_eq!(entry.wins + entry.losses, 1);
            assert_eq!(entry.net_earnings, 0);
        }
        assert!(t.store.rank("carol").await.unwrap().is_none());
        assert!(t.inbox.contains("最终胜者"));
    }

    #[tokio::test]
    async fn test_wager_round_ledger_matches_net_earnings() {
        let t = table(config(true));
        t.ledger.open_account("alice", GOLD, 1000);
        t.ledger.open_account("bob", GOLD, 1000);

        t.engine.start("c", &player("host")).await.unwrap();
        // 金币局发起人不自动加入
        assert!(t.store.session("c").await.unwrap().unwrap().members.is_empty());
        t.engine.join("c", &player("alice"), "100").await.unwrap();
        t.engine.join("c", &player("bob"), "50").await.unwrap();
        assert_eq!(t.ledger.balance("alice", GOLD).await, Ok(900));
        assert_eq!(t.ledger.balance("bob", GOLD).await, Ok(950));

        let Ok(RoundOutcome::Settled(settlements)) = t.engine.close_recruiting("c").await else {
            panic!("round should settle");
        };
        assert_eq!(settlements.len(), 2);
        // 庄家也有一手牌
        assert_eq!(t.store.hands("c").await.unwrap().len(), 3);

        for id in ["alice", "bob"] {
            let entry = t.store.rank(id).await.unwrap().unwrap();
            let balance = t.ledger.balance(id, GOLD).await.unwrap();
            assert_eq!(balance as i64 - 1000, entry.net_earnings);
        }
        let session = t.store.session("c").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.stakes.is_empty());
        assert!(t.inbox.contains("结算清单"));
    }

    #[tokio::test]
    async fn test_wager_join_validation() {
        let t = table(config(true));
        t.ledger.open_account("alice", GOLD, 10);
        t.engine.start("c", &player("host")).await.unwrap();

        for text in ["abc", "0", "-5", "1.5"] {
            assert_eq!(t.engine.join("c", &player("alice"), text).await, Err(EngineError::InvalidJoin));
        }
        assert_eq!(
            t.engine.join("c", &player("alice"), "100").await,
            Err(EngineError::InsufficientFunds { stake: 100, balance: 10 })
        );
        // 没有任何状态变化
        assert!(t.store.session("c").await.unwrap().unwrap().members.is_empty());
        assert_eq!(t.ledger.balance("alice", GOLD).await, Ok(10));
        assert!(t.inbox.contains("你的钱不够下注 100"));
    }

    #[tokio::test]
    async fn test_wager_without_ledger_rejects_joins() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(config(true), store, None, Arc::new(Inbox::default())));
        engine.start("c", &player("host")).await.unwrap();
        assert_eq!(engine.join("c", &player("alice"), "100").await, Err(EngineError::LedgerUnavailable));
        assert_eq!(engine.join("c", &player("bob"), "100").await, Err(EngineError::LedgerUnavailable));
    }

    #[tokio::test]
    async fn test_wager_cancelled_without_players() {
        let t = table(config(true));
        t.engine.start("c", &player("host")).await.unwrap();
        assert_eq!(t.engine.close_recruiting("c").await, Ok(RoundOutcome::Cancelled));
        assert!(t.inbox.contains("人数不足 1 人"));
    }

    #[tokio::test]
    async fn test_force_end_refunds_stakes() {
        let t = table(config(true));
        t.ledger.open_account("alice", GOLD, 1000);
        t.engine.start("c", &player("host")).await.unwrap();
        t.engine.join("c", &player("alice"), "300").await.unwrap();
        assert_eq!(t.ledger.balance("alice", GOLD).await, Ok(700));

        t.engine.force_end("c").await.unwrap();
        assert_eq!(t.ledger.balance("alice", GOLD).await, Ok(1000));
        assert_eq!(state_of(&t).await, SessionState::Idle);
        // 计时器已取消，再截止也不会开局
        assert_eq!(t.engine.close_recruiting("c").await, Ok(RoundOutcome::NotRecruiting));
    }

    #[tokio::test]
    async fn test_start_while_recruiting_is_busy() {
        let t = table(config(false));
        t.engine.start("c", &player("alice")).await.unwrap();
        assert_eq!(t.engine.start("c", &player("bob")).await, Err(EngineError::Busy));
        assert!(t.inbox.contains("当前有游戏正在进行中"));
        // 原来的牌局不受影响
        let session = t.store.session("c").await.unwrap().unwrap();
        assert_eq!(session.members, vec!["alice".to_string()]);
        // 其他频道互不影响
        t.engine.start("other", &player("bob")).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_session_is_reset_with_refund() {
        let t = table(config(true));
        t.ledger.open_account("alice", GOLD, 900);

        let now = SystemTime::now();
        let mut stale = Session::new("c", now);
        stale.open_recruiting(now - Duration::from_secs(11 * 60), None);
        stale.admit("alice".into(), 100, now - Duration::from_secs(11 * 60)).unwrap();
        t.store.save_session(&stale).await.unwrap();

        t.engine.start("c", &player("host")).await.unwrap();
        assert_eq!(t.ledger.balance("alice", GOLD).await, Ok(1000));
        let session = t.store.session("c").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Recruiting);
        assert!(session.members.is_empty());
        assert!(session.stakes.is_empty());
    }

    #[tokio::test]
    async fn test_join_rejected_unless_recruiting() {
        let t = table(config(false));
        assert_eq!(t.engine.join("c", &player("bob"), "1").await, Err(EngineError::InvalidJoin));

        let mut playing = Session::new("c", SystemTime::now());
        playing.state = SessionState::Playing;
        t.store.save_session(&playing).await.unwrap();
        assert_eq!(t.engine.join("c", &player("bob"), "1").await, Err(EngineError::InvalidJoin));
    }

    #[tokio::test]
    async fn test_timer_closes_recruiting() {
        let t = table(Config { wait_timeout_seconds: 0, ..config(false) });
        t.engine.start("c", &player("alice")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state_of(&t).await, SessionState::Idle);
        assert!(t.inbox.contains("人数不足"));
    }

    #[tokio::test]
    async fn test_failed_payout_still_ends_round() {
        let store = Arc::new(MemoryStore::new());
        let inner = MemoryLedger::new();
        inner.open_account("alice", GOLD, 1000);
        let ledger = Arc::new(BrokenLedger(inner));
        let engine = Arc::new(Engine::new(config(true), store.clone(), Some(ledger), Arc::new(Inbox::default())));

        engine.start("c", &player("host")).await.unwrap();
        engine.join("c", &player("alice"), "100").await.unwrap();
        let outcome = engine.close_recruiting("c").await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Settled(ref s) if s.len() == 1));
        assert_eq!(store.session("c").await.unwrap().unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_leaderboard_and_display_name_refresh() {
        let t = table(config(false));
        t.engine.start("c", &Participant::new("alice", "Alice")).await.unwrap();
        t.engine.join("c", &Participant::new("bob", "Bob"), "1").await.unwrap();
        t.engine.close_recruiting("c").await.unwrap();

        t.engine.start("c", &Participant::new("alice", "Alice2")).await.unwrap();
        assert_eq!(t.store.rank("alice").await.unwrap().unwrap().display_name, "Alice2");

        let board = t.engine.leaderboard().await.unwrap();
        assert_eq!(board.len(), 2);
        assert!(board[0].wins >= board[1].wins);
        assert!(t.engine.leaderboard_text().await.unwrap().contains("斗牛胜负榜"));
    }

    #[tokio::test]
    async fn test_close_channel_keeps_ranks() {
        let t = table(config(false));
        t.engine.start("c", &player("alice")).await.unwrap();
        t.engine.join("c", &player("bob"), "1").await.unwrap();
        t.engine.close_channel("c").await.unwrap();

        assert!(t.store.session("c").await.unwrap().is_none());
        assert!(t.store.rank("alice").await.unwrap().is_some());
        // 同名频道可以重新开局
        t.engine.start("c", &player("alice")).await.unwrap();
        assert_eq!(state_of(&t).await, SessionState::Recruiting);
    }

    #[tokio::test]
    async fn test_force_end_while_playing_does_not_refund_twice() {
        let t = table(Config { deal_reveal_delay_ms: 200, ..config(true) });
        let players = ["a", "b", "c", "d"];
        t.engine.start("c", &player("host")).await.unwrap();
        for id in players {
            t.ledger.open_account(id, GOLD, 1000);
            t.engine.join("c", &player(id), "100").await.unwrap();
        }

        let engine = t.engine.clone();
        let round = tokio::spawn(async move { engine.close_recruiting("c").await });
        // 亮牌进行到一半时强制结束
        tokio::time::sleep(Duration::from_millis(50)).await;
        t.engine.force_end("c").await.unwrap();
        let Ok(RoundOutcome::Settled(settlements)) = round.await.unwrap() else {
            panic!("round should settle");
        };
        assert_eq!(settlements.len(), players.len());

        for id in players {
            let entry = t.store.rank(id).await.unwrap().unwrap();
            let balance = t.ledger.balance(id, GOLD).await.unwrap();
            assert_eq!(balance as i64 - 1000, entry.net_earnings, "{} 的余额与净盈亏不一致", id);
        }
        assert_eq!(state_of(&t).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_restart_cancels_previous_timer() {
        let t = table(Config { wait_timeout_seconds: 1, ..config(false) });
        t.engine.start("c", &player("alice")).await.unwrap();
        t.engine.force_end("c").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        t.engine.start("c", &player("alice")).await.unwrap();

        // 第一个计时器本该在这之前到点
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(state_of(&t).await, SessionState::Recruiting);
        assert!(!t.inbox.contains("人数不足"));

        // 第二个计时器到点
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(state_of(&t).await, SessionState::Idle);
        let cancelled = t.inbox.0.lock().iter().filter(|(_, text)| text.contains("人数不足")).count();
        assert_eq!(cancelled, 1);
    }

    #[tokio::test]
    async fn test_outdated_timer_does_not_close_new_round() {
        let t = table(config(false));
        t.engine.start("c", &player("alice")).await.unwrap();
        let old = t.engine.timers.get("c").unwrap().generation;
        t.engine.force_end("c").await.unwrap();
        t.engine.start("c", &player("alice")).await.unwrap();
        let current = t.engine.timers.get("c").unwrap().generation;
        assert_ne!(old, current);

        // 旧计时器已经触发但晚于新一轮拿到锁
        assert_eq!(t.engine.close_round("c", Some(old)).await, Ok(RoundOutcome::NotRecruiting));
        assert_eq!(state_of(&t).await, SessionState::Recruiting);

        assert_eq!(t.engine.close_round("c", Some(current)).await, Ok(RoundOutcome::Cancelled));
        assert!(t.engine.timers.get("c").is_none());
    }

    #[tokio::test]
    async fn test_rank_write_failure_keeps_timer_armed() {
        let store = Arc::new(RankWriteFails::default());
        let inbox = Arc::new(Inbox::default());
        let config = Config { wait_timeout_seconds: 1, ..config(false) };
        let engine = Arc::new(Engine::new(config, store.clone(), None, inbox.clone()));

        engine.start("c", &player("alice")).await.unwrap();
        assert_eq!(engine.join("c", &player("bob"), "1").await, Ok(2));
        tokio::time::sleep(Duration::from_millis(1300)).await;

        // 计时器照常到点，牌局结算后回到 Idle
        assert_eq!(store.session("c").await.unwrap().unwrap().state, SessionState::Idle);
        assert!(inbox.contains("最终胜者"));
    }

    #[tokio::test]
    async fn test_paced_reveal_matches_settlement_count() {
        let t = table(Config { deal_reveal_delay_ms: 1, ..config(false) });
        t.engine.start("c", &player("alice")).await.unwrap();
        t.engine.join("c", &player("bob"), "1").await.unwrap();
        let Ok(RoundOutcome::Settled(settlements)) = t.engine.close_recruiting("c").await else {
            panic!("round should settle");
        };
        assert_eq!(settlements.len(), 2);
        assert_eq!(t.inbox.0.lock().iter().filter(|(_, text)| text.contains("亮牌")).count(), 2);
    }
}
