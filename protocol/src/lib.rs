//! 国际象棋联机对战共享协议库
//!
//! 包含:
//! - 棋子、阵营、格子、走法等核心数据结构
//! - 规则引擎接口及基于 `chess` crate 的标准实现
//! - 棋盘状态（唯一的修改入口 `apply_move`）
//! - 走法令牌编解码
//! - 传输层抽象 (Connector, Connection, Listener traits)

mod board;
mod codec;
mod constants;
mod error;
mod moves;
mod piece;
mod rules;
mod transport;

pub use board::{BoardState, GameStatus};
pub use codec::MoveCodec;
pub use constants::*;
pub use error::{ChessError, DecodeError, ProtocolError, Result};
pub use moves::Move;
pub use piece::{Piece, PieceKind, Promotion, Side, Square};
pub use rules::{RulesEngine, StandardRules};
pub use transport::{
    Connection, ConnectionState, Connector, Listener, MemoryConnection, NetworkConfig,
    StreamConnection, TcpConnection, TcpConnector, TcpListener, TokenReader, TokenWriter,
};
