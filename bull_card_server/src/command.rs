/// 频道里的一句话被解析成的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Leaderboard,
    /// 只有房主可以执行
    ForceEnd,
    Balance,
    /// 普通聊天，同时尝试作为加入请求
    Chat(String),
}

const PREFIX: &str = "bullCard";

impl Command {
    pub fn parse(text: &str) -> Command {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix(PREFIX) else {
            return Command::Chat(text.to_string());
        };
        match rest {
            "" | ".help" | ".帮助" => Command::Help,
            ".start" | ".来一局" => Command::Start,
            ".rank" | ".排行榜" => Command::Leaderboard,
            ".end" | ".强制结束" => Command::ForceEnd,
            ".balance" | ".余额" => Command::Balance,
            _ => Command::Chat(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_aliases() {
        assert_eq!(Command::parse("bullCard"), Command::Help);
        assert_eq!(Command::parse("bullCard.help"), Command::Help);
        assert_eq!(Command::parse(" bullCard.来一局 "), Command::Start);
        assert_eq!(Command::parse("bullCard.start"), Command::Start);
        assert_eq!(Command::parse("bullCard.排行榜"), Command::Leaderboard);
        assert_eq!(Command::parse("bullCard.强制结束"), Command::ForceEnd);
        assert_eq!(Command::parse("bullCard.end"), Command::ForceEnd);
        assert_eq!(Command::parse("bullCard.余额"), Command::Balance);
    }

    #[test]
    fn test_everything_else_is_chat() {
        assert_eq!(Command::parse("1"), Command::Chat("1".to_string()));
        assert_eq!(Command::parse("100"), Command::Chat("100".to_string()));
        assert_eq!(Command::parse("bullCard.fly"), Command::Chat("bullCard.fly".to_string()));
        assert_eq!(Command::parse("bullCardx"), Command::Chat("bullCardx".to_string()));
    }
}
