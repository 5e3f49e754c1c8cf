use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use bull_card_core::{ClientMessage, ServerMessage};

const DEFAULT_SERVER: &str = "ws://127.0.0.1:25917/ws";

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn render(msg: ServerMessage) {
    match msg {
        ServerMessage::Entered { your_id, channel_id, host_id } => {
            let role = if your_id == host_id { "（你是房主）" } else { "" };
            println!("\n已进入频道 {}{}", channel_id, role);
        }
        ServerMessage::Said { from, text } => println!("\n[{}] {}", from, text),
        ServerMessage::Notice { text } => println!("\n{}\n", text),
        ServerMessage::Error { message } => println!("\n❌ {}", message),
    }
}

/// 把一行输入翻译成要发给服务器的消息。`None` 表示本地处理完毕。
fn parse_line(line: &str) -> Option<ClientMessage> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.first().copied() {
        Some("enter") => {
            if parts.len() < 3 {
                println!("用法: enter <频道> <昵称>");
                return None;
            }
            Some(ClientMessage::EnterChannel {
                channel_id: parts[1].to_string(),
                nickname: parts[2..].join(" "),
            })
        }
        None => None,
        _ => Some(ClientMessage::Say(line.trim().to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let url = Url::parse(&server)?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => {
                        render(server_msg);
                        prompt(); // 重新显示输入提示符
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 斗牛客户端 ---");
    println!("可用命令:");
    println!("  enter <频道> <昵称>       - 进入频道（不存在则创建）");
    println!("  bullCard                  - 查看游戏帮助");
    println!("  bullCard.来一局           - 发起一局");
    println!("  bullCard.排行榜           - 查看排行榜");
    println!("  bullCard.余额             - 查看余额（金币局）");
    println!("  bullCard.强制结束         - 强制结束 (仅房主)");
    println!("  exit                      - 退出");
    println!("其他输入都会作为聊天发送，招募期间发送暗号或下注金额即可加入。");

    loop {
        prompt();

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        if line.trim() == "exit" {
            println!("正在断开连接...");
            break;
        }

        if let Some(msg) = parse_line(&line) {
            let payload = serde_json::to_string(&msg)?;
            write.send(Message::Text(payload.into())).await?;
        }
    }

    Ok(())
}
