//! 棋盘状态

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ChessError;
use crate::moves::Move;
use crate::piece::{Piece, Side, Square};
use crate::rules::RulesEngine;

/// 对局状态（由规则引擎推导，不允许直接设置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// 对局进行中
    InProgress,
    /// 将死
    Checkmate { winner: Side },
    /// 逼和
    Stalemate,
}

impl GameStatus {
    /// 是否终局
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

/// 完整的棋盘状态（局面、走子方、最后一步、终局状态）
///
/// `apply_move` 是唯一的修改入口，走子方与引擎的判断始终保持一致。
pub struct BoardState<E: RulesEngine> {
    engine: Arc<E>,
    /// 局面（对核心逻辑不透明）
    position: E::Position,
    /// 当前走子方
    side_to_move: Side,
    /// 最后一步走法（用于高亮）
    last_move: Option<Move>,
    /// 终局状态
    status: GameStatus,
    /// 走子方是否被将军
    in_check: bool,
    /// 已走的半回合数
    ply: u32,
}

impl<E: RulesEngine> BoardState<E> {
    /// 创建初始状态
    pub fn initial(engine: Arc<E>) -> Self {
        let position = engine.initial_position();
        Self::from_position(engine, position)
    }

    /// 从指定局面创建状态
    pub fn from_position(engine: Arc<E>, position: E::Position) -> Self {
        let mut state = Self {
            side_to_move: engine.side_to_move(&position),
            engine,
            position,
            last_move: None,
            status: GameStatus::InProgress,
            in_check: false,
            ply: 0,
        };
        state.refresh();
        state
    }

    /// 规则引擎
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// 当前局面
    pub fn position(&self) -> &E::Position {
        &self.position
    }

    /// 当前走子方
    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    /// 最后一步走法
    pub fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    /// 终局状态
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// 是否终局
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 走子方是否被将军
    pub fn is_check(&self) -> bool {
        self.in_check
    }

    /// 已走的半回合数
    pub fn ply(&self) -> u32 {
        self.ply
    }

    /// 获取指定格子上的棋子
    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.engine.piece_at(&self.position, square)
    }

    /// 当前局面的所有合法走法
    pub fn all_legal_moves(&self) -> Vec<Move> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.engine.legal_moves(&self.position)
    }

    /// 从指定格子出发的合法走法
    ///
    /// 格子上没有走子方的棋子时返回空
    pub fn legal_moves(&self, square: Square) -> Vec<Move> {
        match self.piece_at(square) {
            Some(piece) if piece.side == self.side_to_move => self
                .all_legal_moves()
                .into_iter()
                .filter(|mv| mv.from == square)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 指定阵营从指定格子出发的合法走法（本地走子路径）
    ///
    /// 不是该阵营的回合时返回空
    pub fn legal_moves_for(&self, square: Square, side: Side) -> Vec<Move> {
        if side != self.side_to_move {
            return Vec::new();
        }
        self.legal_moves(square)
    }

    /// 执行走法
    ///
    /// 终局后返回 `GameOver`，走法不在合法集合中返回 `IllegalMove`。
    /// 成功时同时更新局面、走子方、最后一步和终局状态。
    pub fn apply_move(&mut self, mv: Move) -> Result<(), ChessError> {
        if self.is_terminal() {
            return Err(ChessError::GameOver);
        }

        let next = self.engine.apply(&self.position, &mv)?;
        let next_side = self.engine.side_to_move(&next);
        debug_assert_eq!(next_side, self.side_to_move.opponent());

        self.position = next;
        self.side_to_move = next_side;
        self.last_move = Some(mv);
        self.ply += 1;
        self.refresh();
        Ok(())
    }

    /// 从规则引擎重新计算终局状态
    fn refresh(&mut self) {
        self.in_check = self.engine.is_check(&self.position);
        self.status = if self.engine.is_checkmate(&self.position) {
            let winner = self
                .engine
                .winner(&self.position)
                .unwrap_or_else(|| self.side_to_move.opponent());
            GameStatus::Checkmate { winner }
        } else if self.engine.is_stalemate(&self.position) {
            GameStatus::Stalemate
        } else {
            GameStatus::InProgress
        };
    }
}

impl<E: RulesEngine> Clone for BoardState<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            position: self.position.clone(),
            side_to_move: self.side_to_move,
            last_move: self.last_move,
            status: self.status,
            in_check: self.in_check,
            ply: self.ply,
        }
    }
}

impl<E: RulesEngine> std::fmt::Debug for BoardState<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardState")
            .field("position", &self.position)
            .field("side_to_move", &self.side_to_move)
            .field("last_move", &self.last_move)
            .field("status", &self.status)
            .field("in_check", &self.in_check)
            .field("ply", &self.ply)
            .finish()
    }
}
