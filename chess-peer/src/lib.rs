//! 双人联机国际象棋对等端
//!
//! 包含:
//! - 回合协调器（双方棋盘同步的状态机）
//! - 对局会话（单一所有者任务 + 消息传递）
//! - 主机监听 / 客户端拨号
//! - 同一终端的本地对局
//! - 终端显示与输入
//! - 配置与命令行

pub mod cli;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod local;
pub mod peer;
pub mod session;

pub use config::{Orientation, PeerConfig, Role};
pub use coordinator::{Inbound, MoveRequest, Phase, TurnCoordinator};
pub use local::LocalGame;
pub use session::{Session, SessionHandle, Snapshot, SubmitError};
