mod audio;
mod config;
mod controller;
mod events;
mod link;
mod protocol;
mod session;
mod state;

use config::Config;
use events::UiEvent;
use session::VoiceSession;
use state::SessionState;
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载编译期配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    println!("{} v{}", config.app_name, config.app_version);
    println!("Agent endpoint: {}", config.ws_url);

    log::debug!("session {}", SessionState::Idle);

    // UI事件通道，会话把转写、状态、情绪都发到这里
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    // 建立会话：设备打不开或连不上服务器都直接退出
    let session = VoiceSession::connect(&config, ui_tx).await?;
    println!("Session live. Speak when ready, Ctrl+C to quit.");

    // 主事件循环
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(event) = ui_rx.recv() => {
                match event {
                    UiEvent::Transcript { role, text } => {
                        println!("[{}] {}", role, text);
                    }
                    UiEvent::Speaking(true) => println!("... agent speaking ..."),
                    UiEvent::Speaking(false) => println!("... agent done ..."),
                    UiEvent::Sentiment(sentiment) => {
                        println!("(sentiment: {})", sentiment);
                    }
                    UiEvent::Fatal(reason) => {
                        eprintln!("Session lost: {}", reason);
                        break;
                    }
                }
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
