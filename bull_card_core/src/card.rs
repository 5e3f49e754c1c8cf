use crate::error::EngineError;
use rand::Rng;
use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
// --- 核心数据结构定义 ---

/// 每手牌的张数
pub const HAND_SIZE: usize = 5;

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Spade,   // 黑桃 ♠
    Heart,   // 红心 ♥
    Club,    // 梅花 ♣
    Diamond, // 方块 ♦
}

/// 点数 (Rank)
/// 斗牛中 A 最小、K 最大，变体的顺序就是比较顺序
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

/// 单张扑克牌 (Card)
///
/// 牌的大小先比点数顺序 (A=1 … K=13)，再比花色权重 (♠ > ♥ > ♣ > ♦)。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

/// 一手牌，固定 5 张，评估后不再修改
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Hand([Card; HAND_SIZE]);

/// 牌型等级 (Tier)
/// 变体从小到大排列，派生的 `Ord` 即为牌型大小：
/// 没牛 < 牛丁 … 牛九 < 牛牛 < 四炸 < 五花牛 < 五小牛
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Tier {
    NoBull,
    /// 牛一 ~ 牛九，只取 1..=9。请用 `Tier::from_points` 构造。
    Bull(u8),
    BullBull,
    Bomb,
    FiveFlowerBull,
    FiveSmallBull,
}

/// 一手牌的评估结果
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct HandResult {
    pub tier: Tier,
    /// 手中最大的一张牌，同牌型时用于比较
    pub tie_break: Card,
}

// --- 实现辅助功能 ---

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond];

    /// 花色权重，仅在点数相同时使用
    pub fn weight(self) -> u8 {
        match self {
            Suit::Spade => 4,
            Suit::Heart => 3,
            Suit::Club => 2,
            Suit::Diamond => 1,
        }
    }
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King,
    ];

    /// 比较用的点数顺序，A=1 … K=13
    pub fn order(self) -> u8 {
        self as u8 + 1
    }

    /// 计分用的点数，J/Q/K 都计 10
    pub fn points(self) -> u8 {
        self.order().min(10)
    }

    pub fn is_face(self) -> bool {
        matches!(self, Rank::Jack | Rank::Queen | Rank::King)
    }
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    pub fn rank_order(&self) -> u8 {
        self.rank.order()
    }

    pub fn point_value(&self) -> u8 {
        self.rank.points()
    }

    pub fn suit_weight(&self) -> u8 {
        self.suit.weight()
    }
}

impl Ord for Card {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_order()
            .cmp(&other.rank_order())
            .then_with(|| self.suit_weight().cmp(&other.suit_weight()))
    }
}

impl PartialOrd for Card {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hand {
    pub fn new(cards: [Card; HAND_SIZE]) -> Hand {
        Hand(cards)
    }

    pub fn cards(&self) -> &[Card; HAND_SIZE] {
        &self.0
    }
}

impl TryFrom<Vec<Card>> for Hand {
    type Error = EngineError;

    fn try_from(cards: Vec<Card>) -> Result<Self, Self::Error> {
        let len = cards.len();
        <[Card; HAND_SIZE]>::try_from(cards)
            .map(Hand)
            .map_err(|_| EngineError::InvalidHandSize(len))
    }
}

impl Tier {
    /// 0(没牛) … 9(牛九), 10(牛牛), 11(四炸), 12(五花牛), 13(五小牛)
    pub fn value(self) -> u8 {
        match self {
            Tier::NoBull => 0,
            Tier::Bull(n) => {
                debug_assert!((1..=9).contains(&n), "牛几超出范围: {}", n);
                n
            }
            Tier::BullBull => 10,
            Tier::Bomb => 11,
            Tier::FiveFlowerBull => 12,
            Tier::FiveSmallBull => 13,
        }
    }

    /// 不随界面语言变化的标签
    pub fn label(self) -> String {
        match self {
            Tier::NoBull => "no bull".to_string(),
            Tier::Bull(n) => format!("bull-{}", n),
            Tier::BullBull => "bull-bull".to_string(),
            Tier::Bomb => "bomb".to_string(),
            Tier::FiveFlowerBull => "five-flower-bull".to_string(),
            Tier::FiveSmallBull => "five-small-bull".to_string(),
        }
    }

    /// 由牛几的点数得到牌型：0 为没牛，10 为牛牛，超出 0..=10 返回 `None`
    pub fn from_points(points: u8) -> Option<Tier> {
        match points {
            0 => Some(Tier::NoBull),
            1..=9 => Some(Tier::Bull(points)),
            10 => Some(Tier::BullBull),
            _ => None,
        }
    }
}

impl HandResult {
    pub fn label(&self) -> String {
        self.tier.label()
    }
}

impl Ord for HandResult {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for HandResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Club => "♣",
            Suit::Diamond => "♦",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.suit, self.rank)
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cards: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", cards.join(" "))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const BULLS: [&str; 10] = ["", "牛丁", "牛二", "牛三", "牛四", "牛五", "牛六", "牛七", "牛八", "牛九"];
        write!(f, "{}", match self {
            Tier::NoBull => "没牛",
            Tier::Bull(n) => BULLS.get(*n as usize).copied().unwrap_or("牛?"),
            Tier::BullBull => "牛牛",
            Tier::Bomb => "四炸",
            Tier::FiveFlowerBull => "五花牛",
            Tier::FiveSmallBull => "五小牛",
        })
    }
}

// --- 牌堆 ---

/// 创建一副完整的 52 张扑克牌
pub fn create_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for &suit in &Suit::ALL {
        for &rank in &Rank::ALL {
            deck.push(Card { rank, suit });
        }
    }
    deck
}

/// 参与人数（金币局含庄家）超过 5 人用 4 副牌，否则 2 副
pub fn deck_count_for(participants: usize) -> usize {
    if participants > 5 { 4 } else { 2 }
}

/// 把 `deck_count` 副牌合在一起并洗匀
pub fn build_shuffled_deck(deck_count: usize) -> Vec<Card> {
    build_shuffled_deck_with(deck_count, &mut rand::rng())
}

pub fn build_shuffled_deck_with<R: Rng + ?Sized>(deck_count: usize, rng: &mut R) -> Vec<Card> {
    let mut deck: Vec<Card> = (0..deck_count).flat_map(|_| create_deck()).collect();
    deck.shuffle(rng);
    deck
}

/// 从牌堆顶部取出 `n` 张牌。牌不够时牌堆保持不变。
pub fn deal(deck: &mut Vec<Card>, n: usize) -> Result<Vec<Card>, EngineError> {
    if deck.len() < n {
        return Err(EngineError::InsufficientCards { needed: n, remaining: deck.len() });
    }
    Ok(deck.drain(..n).collect())
}

pub fn deal_hand(deck: &mut Vec<Card>) -> Result<Hand, EngineError> {
    Hand::try_from(deal(deck, HAND_SIZE)?)
}

// --- 牌型评估逻辑 ---

/// 评估一手牌的牌型与最大单牌
///
/// 特殊牌型与牛几并不互斥，所以严格按以下顺序判定，先命中者为准：
/// 五小牛 → 五花牛 → 四炸 → 牛几 / 没牛。
pub fn evaluate(hand: &Hand) -> HandResult {
    HandResult {
        tier: score_tier(hand.cards()),
        tie_break: strongest_card(hand.cards()),
    }
}

/// 比较两手牌：先比牌型，再比最大单牌的点数，最后比花色。
/// 多副牌时两手牌可能完全相同，此时返回 `Equal`。
pub fn compare(a: &HandResult, b: &HandResult) -> Ordering {
    a.tier.cmp(&b.tier).then_with(|| a.tie_break.cmp(&b.tie_break))
}

fn score_tier(cards: &[Card; HAND_SIZE]) -> Tier {
    let points: Vec<u8> = cards.iter().map(|c| c.point_value()).collect();
    let sum: u8 = points.iter().sum();

    if is_five_small_bull(&points, sum) {
        return Tier::FiveSmallBull;
    }
    if cards.iter().all(|c| c.rank.is_face()) {
        return Tier::FiveFlowerBull;
    }
    if is_bomb(cards) {
        return Tier::Bomb;
    }

    // 任意两张之外的三张之和为 10 的倍数即"有牛"，牛几由这两张决定，取最大
    let mut best: Option<u8> = None;
    for i in 0..points.len() - 1 {
        for j in (i + 1)..points.len() {
            let pair = points[i] + points[j];
            if (sum - pair) % 10 == 0 {
                let bull = match pair % 10 {
                    0 => 10,
                    n => n,
                };
                best = best.max(Some(bull));
            }
        }
    }

    best.and_then(Tier::from_points).unwrap_or(Tier::NoBull)
}

fn is_five_small_bull(points: &[u8], sum: u8) -> bool {
    sum <= 10 && points.iter().all(|&p| p < 5)
}

/// 恰好四张同点。多副牌时的五张同点不算四炸，按牛几计算。
fn is_bomb(cards: &[Card; HAND_SIZE]) -> bool {
    let mut counts = [0u8; 13];
    for card in cards {
        counts[(card.rank_order() - 1) as usize] += 1;
    }
    counts.iter().any(|&c| c == 4)
}

fn strongest_card(cards: &[Card; HAND_SIZE]) -> Card {
    cards.iter().copied().fold(cards[0], Card::max)
}

// --- 单元测试 ---
