//! 建立对端连接
//!
//! 主机在配置的地址上监听，只接受一个连接后立即释放监听器，
//! 之后的连接尝试会被拒绝。客户端只拨号一次，失败直接报错。

use anyhow::{bail, Context, Result};
use protocol::{
    Connection, ConnectionState, Connector, Listener, TcpConnection, TcpConnector, TcpListener,
};
use tracing::info;

use crate::config::{PeerConfig, Role};

/// 以主机身份等待对端
///
/// 开始监听时报告 `Listening`，对手连入后报告 `Connected`。
pub async fn host(
    addr: &str,
    mut on_state: impl FnMut(ConnectionState) + Send,
) -> Result<TcpConnection> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听地址: {}", addr))?;
    info!(
        "正在监听 {}，等待对手连接",
        listener.local_addr().unwrap_or_else(|| addr.to_string())
    );
    on_state(ConnectionState::Listening);

    let connection = accept_one(listener).await?;
    on_state(ConnectionState::Connected);
    Ok(connection)
}

/// 接受一个连接，然后关闭监听器
pub async fn accept_one(mut listener: TcpListener) -> Result<TcpConnection> {
    let connection = listener.accept().await.context("接受连接失败")?;
    drop(listener);

    info!("对手已连接: {}", connection.peer_addr().unwrap_or_default());
    Ok(connection)
}

/// 以客户端身份连接主机
pub async fn dial(
    addr: &str,
    mut on_state: impl FnMut(ConnectionState) + Send,
) -> Result<TcpConnection> {
    info!("正在连接 {}", addr);
    let connection = TcpConnector
        .connect(addr)
        .await
        .with_context(|| format!("无法连接到 {}", addr))?;
    info!("已连接到主机 {}", addr);
    on_state(ConnectionState::Connected);
    Ok(connection)
}

/// 按配置建立连接
pub async fn establish(
    config: &PeerConfig,
    on_state: impl FnMut(ConnectionState) + Send,
) -> Result<TcpConnection> {
    let addr = config.network.addr();
    match config.role {
        Role::Host => host(&addr, on_state).await,
        Role::Client => dial(&addr, on_state).await,
        Role::Local => bail!("本地对局不需要建立连接"),
    }
}
