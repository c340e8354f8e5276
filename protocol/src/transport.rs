//! 传输层抽象
//!
//! 提供 Connector/Connection/Listener traits 使上层协议与具体传输实现解耦。
//! 线上格式：每个走法令牌后跟一个换行符，没有握手、心跳和确认，
//! 顺序与可靠性完全依赖底层字节流。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadHalf, WriteHalf,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT, MAX_TOKEN_LEN, TOKEN_DELIMITER};

/// 网络配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

impl NetworkConfig {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// 连接生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// 未连接
    Unconnected,
    /// 正在监听（仅主机）
    Listening,
    /// 已连接
    Connected,
    /// 已关闭
    Closed,
}

/// 连接抽象 trait（核心抽象，用于业务层）
#[async_trait]
pub trait Connection: Send {
    /// 发送一个走法令牌
    async fn send(&mut self, token: &str) -> Result<()>;

    /// 接收一个走法令牌
    async fn recv(&mut self) -> Result<String>;

    /// 关闭连接
    async fn close(&mut self) -> Result<()>;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<String>;
}

/// 连接器 trait（客户端使用）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// 建立连接
    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 监听器 trait（主机使用）
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    /// 绑定地址
    async fn bind(addr: &str) -> Result<Self>;

    /// 接受连接
    async fn accept(&mut self) -> Result<Self::Conn>;

    /// 获取本地地址
    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// 字节流连接
// ============================================================================

/// 基于任意字节流的连接
pub struct StreamConnection<R, W> {
    reader: TokenReader<R>,
    writer: TokenWriter<W>,
    peer_addr: Option<String>,
}

impl<R, W> std::fmt::Debug for StreamConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// TCP 连接
pub type TcpConnection = StreamConnection<OwnedReadHalf, OwnedWriteHalf>;

/// 内存连接（同一进程内的两端，用于测试和本地桥接）
pub type MemoryConnection = StreamConnection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

impl<R, W> StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// 从读写两端创建
    pub fn new(reader: R, writer: W, peer_addr: Option<String>) -> Self {
        Self {
            reader: TokenReader::new(reader),
            writer: TokenWriter::new(writer),
            peer_addr,
        }
    }

    /// 分离读写端
    pub fn split(self) -> (TokenReader<R>, TokenWriter<W>) {
        (self.reader, self.writer)
    }
}

impl TcpConnection {
    /// 从 TcpStream 创建（主机使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        Ok(Self::new(read_half, write_half, peer_addr))
    }
}

impl MemoryConnection {
    /// 创建一对互相连通的内存连接
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(4096);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            Self::new(a_read, a_write, Some("memory".to_string())),
            Self::new(b_read, b_write, Some("memory".to_string())),
        )
    }
}

#[async_trait]
impl<R, W> Connection for StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, token: &str) -> Result<()> {
        self.writer.write_token(token).await
    }

    async fn recv(&mut self) -> Result<String> {
        self.reader.read_token().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        debug!("Connected to {}", addr);
        TcpConnection::from_stream(stream)
    }
}

/// TCP 监听器
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ProtocolError::Io)?;
        Ok(Self { listener })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        debug!("Accepted connection from {}", addr);
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// 令牌编解码
// ============================================================================

/// 令牌读取器
pub struct TokenReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> TokenReader<R> {
    /// 创建新的令牌读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(MAX_TOKEN_LEN + 2),
        }
    }

    /// 读取一个以换行结尾的令牌
    ///
    /// 对端关闭连接返回 `ConnectionClosed`，超长返回 `TokenTooLong`，
    /// 非 UTF-8 返回解码错误。
    pub async fn read_token(&mut self) -> Result<String> {
        self.buffer.clear();

        // 允许令牌 + 可选的 '\r' + 换行符
        let limit = (MAX_TOKEN_LEN + 2) as u64;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(TOKEN_DELIMITER, &mut self.buffer)
            .await?;

        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        if self.buffer.last() != Some(&TOKEN_DELIMITER) {
            if self.buffer.len() as u64 >= limit {
                return Err(ProtocolError::TokenTooLong { max: MAX_TOKEN_LEN });
            }
            // 令牌中途断开
            return Err(ProtocolError::ConnectionClosed);
        }

        self.buffer.pop();
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        if self.buffer.len() > MAX_TOKEN_LEN {
            return Err(ProtocolError::TokenTooLong { max: MAX_TOKEN_LEN });
        }

        String::from_utf8(self.buffer.clone())
            .map_err(|_| ProtocolError::Decode(crate::error::DecodeError::NotUtf8))
    }
}

/// 令牌写入器
pub struct TokenWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> TokenWriter<W> {
    /// 创建新的令牌写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一个令牌及其分隔符
    pub async fn write_token(&mut self, token: &str) -> Result<()> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(ProtocolError::TokenTooLong { max: MAX_TOKEN_LEN });
        }

        let mut frame = Vec::with_capacity(token.len() + 1);
        frame.extend_from_slice(token.as_bytes());
        frame.push(TOKEN_DELIMITER);

        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
