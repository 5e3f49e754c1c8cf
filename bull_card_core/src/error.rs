use std::fmt;

/// 牌局引擎的错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 加入请求不匹配（暗号不对、重复加入、金额非法、不在招募中）。
    /// 宿主应当把这段文本当作普通聊天继续处理。
    InvalidJoin,
    /// 余额不足以支付下注金额
    InsufficientFunds { stake: u64, balance: u64 },
    /// 开启了金币模式，但宿主没有提供账本服务
    LedgerUnavailable,
    /// 牌堆剩余的牌不够发
    InsufficientCards { needed: usize, remaining: usize },
    /// 一手牌必须正好 5 张
    InvalidHandSize(usize),
    /// 频道内已有进行中的牌局
    Busy,
    Store(StoreError),
    Ledger(LedgerError),
}

/// 记录存储的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

/// 账本服务的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientFunds { balance: u64 },
    Unavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::InvalidJoin => write!(f, "加入请求无效"),
            EngineError::InsufficientFunds { stake, balance } => {
                write!(f, "余额不足：需要 {}，当前 {}", stake, balance)
            }
            EngineError::LedgerUnavailable => write!(f, "金币模式已开启，但账本服务不可用"),
            EngineError::InsufficientCards { needed, remaining } => {
                write!(f, "牌堆不足：需要 {} 张，剩余 {} 张", needed, remaining)
            }
            EngineError::InvalidHandSize(n) => write!(f, "手牌必须是 5 张，实际 {} 张", n),
            EngineError::Busy => write!(f, "当前频道已有进行中的牌局"),
            EngineError::Store(e) => write!(f, "{}", e),
            EngineError::Ledger(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "记录存储错误: {}", self.0)
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::InsufficientFunds { balance } => write!(f, "账户余额不足（{}）", balance),
            LedgerError::Unavailable(reason) => write!(f, "账本服务错误: {}", reason),
        }
    }
}

impl std::error::Error for EngineError {}

impl std::error::Error for StoreError {}

impl std::error::Error for LedgerError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        EngineError::Ledger(e)
    }
}
