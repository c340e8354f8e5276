//! 走法编解码
//!
//! 令牌格式为坐标记法：起点 + 终点 + 可选的小写升变字母，
//! 例如 `e2e4`、`e7e8q`。编码只依赖走法本身，与棋盘显示方向无关。

use crate::error::DecodeError;
use crate::moves::Move;
use crate::piece::{Promotion, Square};

/// 走法编解码器
pub struct MoveCodec;

impl MoveCodec {
    /// 编码走法
    pub fn encode(mv: &Move) -> String {
        mv.to_string()
    }

    /// 解码走法令牌
    pub fn decode(token: &str) -> Result<Move, DecodeError> {
        if !token.is_ascii() {
            return Err(DecodeError::NonAscii {
                text: token.to_string(),
            });
        }
        if token.len() != 4 && token.len() != 5 {
            return Err(DecodeError::WrongLength { len: token.len() });
        }

        let from = Self::decode_square(&token[0..2])?;
        let to = Self::decode_square(&token[2..4])?;

        let promotion = match token[4..].chars().next() {
            Some(letter) => {
                Some(Promotion::from_char(letter).ok_or(DecodeError::InvalidPromotion { letter })?)
            }
            None => None,
        };

        Ok(Move { from, to, promotion })
    }

    fn decode_square(text: &str) -> Result<Square, DecodeError> {
        Square::from_algebraic(text).ok_or_else(|| DecodeError::InvalidSquare {
            text: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RulesEngine, StandardRules};

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    #[test]
    fn test_encode() {
        assert_eq!(MoveCodec::encode(&Move::new(sq("e2"), sq("e4"))), "e2e4");
        assert_eq!(
            MoveCodec::encode(&Move::with_promotion(sq("e7"), sq("e8"), Promotion::Queen)),
            "e7e8q"
        );
        assert_eq!(
            MoveCodec::encode(&Move::with_promotion(sq("b2"), sq("a1"), Promotion::Knight)),
            "b2a1n"
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(MoveCodec::decode("e2e4"), Ok(Move::new(sq("e2"), sq("e4"))));
        assert_eq!(
            MoveCodec::decode("a7a8r"),
            Ok(Move::with_promotion(sq("a7"), sq("a8"), Promotion::Rook))
        );
        assert_eq!(MoveCodec::decode("g1f3"), Ok(Move::new(sq("g1"), sq("f3"))));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(MoveCodec::decode(""), Err(DecodeError::WrongLength { len: 0 }));
        assert_eq!(MoveCodec::decode("e2e"), Err(DecodeError::WrongLength { len: 3 }));
        assert_eq!(
            MoveCodec::decode("e2e4qq"),
            Err(DecodeError::WrongLength { len: 6 })
        );
        assert_eq!(
            MoveCodec::decode("z2e4"),
            Err(DecodeError::InvalidSquare {
                text: "z2".to_string()
            })
        );
        assert_eq!(
            MoveCodec::decode("e2e9"),
            Err(DecodeError::InvalidSquare {
                text: "e9".to_string()
            })
        );
        assert_eq!(
            MoveCodec::decode("e7e8k"),
            Err(DecodeError::InvalidPromotion { letter: 'k' })
        );
        assert_eq!(
            MoveCodec::decode("e7e8Q"),
            Err(DecodeError::InvalidPromotion { letter: 'Q' })
        );
    }

    #[test]
    fn test_decode_non_ascii() {
        // 四个字符但不是四个字节，不能当作长度错误
        assert_eq!(
            MoveCodec::decode("é2e4"),
            Err(DecodeError::NonAscii {
                text: "é2e4".to_string()
            })
        );
        assert_eq!(
            MoveCodec::decode("e2e４"),
            Err(DecodeError::NonAscii {
                text: "e2e４".to_string()
            })
        );
    }

    #[test]
    fn test_round_trip_over_played_games() {
        // 沿着固定走法序列遍历局面，每个局面的所有合法走法都必须能往返编解码
        let rules = StandardRules::new();
        let mut position = rules.initial_position();
        let line = [
            "e2e4", "d7d5", "e4d5", "g8f6", "f1b5", "c7c6", "d5c6", "d8d2", "b1d2", "e8d8",
            "c6b7", "a7a6", "b7a8q",
        ];

        for token in line {
            for mv in rules.legal_moves(&position) {
                assert_eq!(MoveCodec::decode(&MoveCodec::encode(&mv)), Ok(mv));
            }
            let mv = MoveCodec::decode(token).unwrap();
            position = rules.apply(&position, &mv).unwrap();
        }

        // 升变局面
        let promotion_position: chess::Board =
            "4k3/1P6/8/8/8/8/6p1/4K2R b K - 0 1".parse().unwrap();
        let moves = rules.legal_moves(&promotion_position);
        assert!(moves.iter().any(|m| m.promotion.is_some()));
        for mv in moves {
            assert_eq!(MoveCodec::decode(&MoveCodec::encode(&mv)), Ok(mv));
        }
    }
}
