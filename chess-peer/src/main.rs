use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chess_peer::{cli, console, peer, LocalGame, Session};
use protocol::StandardRules;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志，输出到 stderr 以免干扰棋盘显示
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chess_peer=debug".parse()?))
        .init();

    let matches = cli::command().get_matches();
    let config = cli::config_from_matches(&matches)?;

    if let Some(path) = cli::save_if_requested(&matches, &config)? {
        println!("配置已保存到 {}", path.display());
    }

    info!("国际象棋对等端启动中，角色: {}", config.role);

    let engine = Arc::new(StandardRules::new());

    if !config.role.is_networked() {
        let mut game = LocalGame::new(engine);
        console::run_local(&mut game, config.orientation).await?;
        println!("{}", console::status_line(&game.snapshot()));
        info!("已退出");
        return Ok(());
    }

    // 连接失败时不启动对局
    let connection = match peer::establish(&config, |state| info!("连接状态: {:?}", state)).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    let (handle, session_task) =
        Session::spawn(engine, config.role, config.local_side(), connection);

    console::run(handle.clone(), config.orientation).await?;

    let snapshot = handle.snapshot();
    println!("{}", console::status_line(&snapshot));

    drop(handle);
    session_task.await?;

    info!("已退出");
    Ok(())
}
