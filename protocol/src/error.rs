//! 错误类型定义

use thiserror::Error;

/// 对局规则错误（本地拒绝，不改变状态，不产生网络流量）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// 无效的走法（不在合法走法集合中，或起点不是己方棋子）
    #[error("Illegal move: {mv}")]
    IllegalMove { mv: String },

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 会话已因致命错误终止
    #[error("Session has failed")]
    SessionFailed,
}

/// 走法令牌解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// 长度错误（合法长度为 4 或 5）
    #[error("Wrong token length: {len}")]
    WrongLength { len: usize },

    /// 无法识别的格子
    #[error("Invalid square: {text:?}")]
    InvalidSquare { text: String },

    /// 无效的升变字母
    #[error("Invalid promotion letter: {letter:?}")]
    InvalidPromotion { letter: char },

    /// 含有非 ASCII 字符
    #[error("Token contains non-ASCII characters: {text:?}")]
    NonAscii { text: String },

    /// 非 UTF-8 字节
    #[error("Token is not valid UTF-8")]
    NotUtf8,
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 令牌解码失败（双方已失去同步）
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// 对端发送了违反协议的走法
    #[error("Peer protocol violation: {reason}")]
    PeerProtocolViolation { reason: String },

    /// 令牌超长
    #[error("Token too long: more than {max} bytes")]
    TokenTooLong { max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 对局规则错误
    #[error("Chess error: {0}")]
    Chess(#[from] ChessError),
}

impl ProtocolError {
    /// 构造协议违规错误
    pub fn violation(reason: impl Into<String>) -> Self {
        ProtocolError::PeerProtocolViolation {
            reason: reason.into(),
        }
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
