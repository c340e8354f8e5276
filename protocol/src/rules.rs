//! 规则引擎
//!
//! 核心逻辑不实现国际象棋规则，只通过 [`RulesEngine`] 获取合法走法、
//! 执行走法并查询终局条件。[`StandardRules`] 使用 `chess` crate 实现该接口。

use chess::{Board, ChessMove, Color, MoveGen, EMPTY};

use crate::error::ChessError;
use crate::moves::Move;
use crate::piece::{Piece, PieceKind, Promotion, Side, Square};

/// 规则引擎接口
///
/// `Position` 对核心逻辑完全不透明，只在引擎调用之间传递。
pub trait RulesEngine: Send + Sync + 'static {
    /// 局面
    type Position: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static;

    /// 标准初始局面
    fn initial_position(&self) -> Self::Position;

    /// 当前局面的所有合法走法
    fn legal_moves(&self, position: &Self::Position) -> Vec<Move>;

    /// 执行走法，走法不合法时失败
    fn apply(&self, position: &Self::Position, mv: &Move) -> Result<Self::Position, ChessError>;

    /// 引擎认为的走子方
    fn side_to_move(&self, position: &Self::Position) -> Side;

    /// 指定格子上的棋子
    fn piece_at(&self, position: &Self::Position, square: Square) -> Option<Piece>;

    /// 走子方是否被将军
    fn is_check(&self, position: &Self::Position) -> bool;

    /// 走子方是否被将死
    fn is_checkmate(&self, position: &Self::Position) -> bool;

    /// 是否无子可动（逼和）
    fn is_stalemate(&self, position: &Self::Position) -> bool;

    /// 将死时的胜方
    fn winner(&self, position: &Self::Position) -> Option<Side> {
        if self.is_checkmate(position) {
            Some(self.side_to_move(position).opponent())
        } else {
            None
        }
    }
}

/// 基于 `chess` crate 的标准国际象棋规则
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl StandardRules {
    pub fn new() -> Self {
        Self
    }
}

impl RulesEngine for StandardRules {
    type Position = Board;

    fn initial_position(&self) -> Board {
        Board::default()
    }

    fn legal_moves(&self, position: &Board) -> Vec<Move> {
        MoveGen::new_legal(position).map(from_engine_move).collect()
    }

    fn apply(&self, position: &Board, mv: &Move) -> Result<Board, ChessError> {
        let engine_move = to_engine_move(mv);
        if !MoveGen::new_legal(position).any(|m| m == engine_move) {
            return Err(ChessError::IllegalMove { mv: mv.to_string() });
        }
        Ok(position.make_move_new(engine_move))
    }

    fn side_to_move(&self, position: &Board) -> Side {
        from_engine_color(position.side_to_move())
    }

    fn piece_at(&self, position: &Board, square: Square) -> Option<Piece> {
        let engine_square = to_engine_square(square);
        let kind = from_engine_piece(position.piece_on(engine_square)?);
        let side = from_engine_color(position.color_on(engine_square)?);
        Some(Piece::new(kind, side))
    }

    fn is_check(&self, position: &Board) -> bool {
        *position.checkers() != EMPTY
    }

    fn is_checkmate(&self, position: &Board) -> bool {
        position.status() == chess::BoardStatus::Checkmate
    }

    fn is_stalemate(&self, position: &Board) -> bool {
        position.status() == chess::BoardStatus::Stalemate
    }
}

fn to_engine_square(square: Square) -> chess::Square {
    chess::Square::make_square(
        chess::Rank::from_index(square.rank as usize),
        chess::File::from_index(square.file as usize),
    )
}

fn from_engine_square(square: chess::Square) -> Square {
    Square::new_unchecked(
        square.get_file().to_index() as u8,
        square.get_rank().to_index() as u8,
    )
}

fn from_engine_color(color: Color) -> Side {
    match color {
        Color::White => Side::First,
        Color::Black => Side::Second,
    }
}

fn from_engine_piece(piece: chess::Piece) -> PieceKind {
    match piece {
        chess::Piece::Pawn => PieceKind::Pawn,
        chess::Piece::Knight => PieceKind::Knight,
        chess::Piece::Bishop => PieceKind::Bishop,
        chess::Piece::Rook => PieceKind::Rook,
        chess::Piece::Queen => PieceKind::Queen,
        chess::Piece::King => PieceKind::King,
    }
}

fn to_engine_promotion(promotion: Promotion) -> chess::Piece {
    match promotion {
        Promotion::Queen => chess::Piece::Queen,
        Promotion::Rook => chess::Piece::Rook,
        Promotion::Bishop => chess::Piece::Bishop,
        Promotion::Knight => chess::Piece::Knight,
    }
}

fn from_engine_promotion(piece: chess::Piece) -> Option<Promotion> {
    match piece {
        chess::Piece::Queen => Some(Promotion::Queen),
        chess::Piece::Rook => Some(Promotion::Rook),
        chess::Piece::Bishop => Some(Promotion::Bishop),
        chess::Piece::Knight => Some(Promotion::Knight),
        chess::Piece::Pawn | chess::Piece::King => None,
    }
}

fn to_engine_move(mv: &Move) -> ChessMove {
    ChessMove::new(
        to_engine_square(mv.from),
        to_engine_square(mv.to),
        mv.promotion.map(to_engine_promotion),
    )
}

fn from_engine_move(mv: ChessMove) -> Move {
    Move {
        from: from_engine_square(mv.get_source()),
        to: from_engine_square(mv.get_dest()),
        promotion: mv.get_promotion().and_then(from_engine_promotion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    #[test]
    fn test_initial_moves() {
        let rules = StandardRules::new();
        let position = rules.initial_position();

        // 初始局面有 20 个合法走法
        assert_eq!(rules.legal_moves(&position).len(), 20);
        assert_eq!(rules.side_to_move(&position), Side::First);
        assert!(!rules.is_check(&position));
    }

    #[test]
    fn test_square_conversion() {
        for square in Square::all() {
            assert_eq!(from_engine_square(to_engine_square(square)), square);
        }
    }

    #[test]
    fn test_piece_at() {
        let rules = StandardRules::new();
        let position = rules.initial_position();

        assert_eq!(
            rules.piece_at(&position, sq("e1")),
            Some(Piece::new(PieceKind::King, Side::First))
        );
        assert_eq!(
            rules.piece_at(&position, sq("d8")),
            Some(Piece::new(PieceKind::Queen, Side::Second))
        );
        assert_eq!(rules.piece_at(&position, sq("e4")), None);
    }

    #[test]
    fn test_apply_rejects_illegal() {
        let rules = StandardRules::new();
        let position = rules.initial_position();

        let result = rules.apply(&position, &Move::new(sq("e2"), sq("e5")));
        assert_eq!(
            result,
            Err(ChessError::IllegalMove {
                mv: "e2e5".to_string()
            })
        );
    }

    #[test]
    fn test_apply_flips_side() {
        let rules = StandardRules::new();
        let position = rules.initial_position();

        let next = rules.apply(&position, &Move::new(sq("e2"), sq("e4"))).unwrap();
        assert_eq!(rules.side_to_move(&next), Side::Second);
        assert_eq!(
            rules.piece_at(&next, sq("e4")),
            Some(Piece::new(PieceKind::Pawn, Side::First))
        );
    }

    #[test]
    fn test_promotion_moves() {
        let rules = StandardRules::new();
        // 白兵在 a7，a8 为空
        let position = Board::from_str("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();

        let promotions: Vec<Move> = rules
            .legal_moves(&position)
            .into_iter()
            .filter(|m| m.from == sq("a7"))
            .collect();
        assert_eq!(promotions.len(), 4);
        assert!(promotions
            .iter()
            .all(|m| m.to == sq("a8") && m.promotion.is_some()));

        let next = rules
            .apply(&position, &Move::with_promotion(sq("a7"), sq("a8"), Promotion::Knight))
            .unwrap();
        assert_eq!(
            rules.piece_at(&next, sq("a8")),
            Some(Piece::new(PieceKind::Knight, Side::First))
        );
    }

    #[test]
    fn test_checkmate_and_winner() {
        let rules = StandardRules::new();
        let mut position = rules.initial_position();
        for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
            position = rules.apply(&position, &Move::new(sq(from), sq(to))).unwrap();
        }

        assert!(rules.is_check(&position));
        assert!(rules.is_checkmate(&position));
        assert!(!rules.is_stalemate(&position));
        assert_eq!(rules.winner(&position), Some(Side::Second));
    }

    #[test]
    fn test_stalemate() {
        let rules = StandardRules::new();
        let position = Board::from_str("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();

        assert!(rules.is_stalemate(&position));
        assert!(!rules.is_checkmate(&position));
        assert!(!rules.is_check(&position));
        assert_eq!(rules.winner(&position), None);
        assert!(rules.legal_moves(&position).is_empty());
    }
}
