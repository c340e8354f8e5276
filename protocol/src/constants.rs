//! 协议常量定义

use std::time::Duration;

/// 棋盘边长（行数 = 列数）
pub const BOARD_SIZE: u8 = 8;

/// 默认监听/连接地址
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// 默认端口
pub const DEFAULT_PORT: u16 = 5000;

/// 单个走法令牌的最大字节数（不含换行符）
///
/// 最长的合法令牌是带升变的 5 字节，例如 `e7e8q`
pub const MAX_TOKEN_LEN: usize = 8;

/// 走法令牌分隔符
pub const TOKEN_DELIMITER: u8 = b'\n';

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
