//! 本地对局
//!
//! 双方在同一终端轮流走子，不建立连接。轮到谁就由谁走，
//! 棋盘仍然只由回合协调器修改。

use std::sync::Arc;

use protocol::{ChessError, ConnectionState, Move, RulesEngine, Square};
use tracing::info;

use crate::coordinator::{MoveRequest, Phase, TurnCoordinator};
use crate::session::Snapshot;

/// 单进程对局，双方共用一个协调器
pub struct LocalGame<E: RulesEngine> {
    coordinator: TurnCoordinator<E>,
}

impl<E: RulesEngine> LocalGame<E> {
    pub fn new(engine: Arc<E>) -> Self {
        info!("本地对局开始");
        Self {
            coordinator: TurnCoordinator::local_game(engine),
        }
    }

    /// 当前状态快照，连接状态恒为 `Unconnected`
    pub fn snapshot(&self) -> Snapshot<E> {
        Snapshot::capture(&self.coordinator, ConnectionState::Unconnected)
    }

    /// 当前走子方从指定格子发起的合法走法
    pub fn legal_moves(&self, square: Square) -> Vec<Move> {
        self.coordinator.legal_moves(square)
    }

    /// 以当前走子方的身份走子
    pub fn submit(&mut self, request: MoveRequest) -> Result<Move, ChessError> {
        self.coordinator.submit_local(request).map(|(mv, _)| mv)
    }

    pub fn is_over(&self) -> bool {
        self.coordinator.phase() == Phase::GameOver
    }
}
