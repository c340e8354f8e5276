//! 回合协调器
//!
//! 同步双方棋盘的状态机：只有走子方可以在本地发起走法，本地接受的每一步都
//! 产生一个待发送的令牌，对端发来的每一步按顺序恰好应用一次。
//! 协调器本身不做 IO，由 [`crate::session`] 负责收发。

use std::sync::Arc;

use protocol::{
    BoardState, ChessError, Move, MoveCodec, Promotion, ProtocolError, RulesEngine, Side, Square,
};
use tracing::{debug, info, warn};

use crate::config::Role;

/// 协调器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 等待本地走子
    WaitingLocal,
    /// 等待对端走子
    WaitingRemote,
    /// 对局结束
    GameOver,
    /// 致命错误，双方可能已失去同步
    Failed,
}

/// 本地走子请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(from: Square, to: Square, promotion: Promotion) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
        }
    }

    /// 在候选走法中找到与请求对应的走法
    ///
    /// 兵到达底线而未指定升变时默认升变为后
    pub fn resolve(&self, candidates: &[Move]) -> Option<Move> {
        let exact = Move {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        };
        if candidates.contains(&exact) {
            return Some(exact);
        }

        if self.promotion.is_none() {
            let queen = Move::with_promotion(self.from, self.to, Promotion::Queen);
            if candidates.contains(&queen) {
                return Some(queen);
            }
        }

        None
    }
}

impl From<Move> for MoveRequest {
    fn from(mv: Move) -> Self {
        Self {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion,
        }
    }
}

impl std::fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(promotion) = self.promotion {
            write!(f, "{}", promotion.to_char())?;
        }
        Ok(())
    }
}

/// 收到对端令牌的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// 已应用对端走法
    Applied(Move),
    /// 对局已结束或会话已失败，令牌被忽略
    Ignored,
}

/// 回合协调器
pub struct TurnCoordinator<E: RulesEngine> {
    role: Role,
    local_side: Side,
    board: BoardState<E>,
    phase: Phase,
    failure: Option<String>,
}

impl<E: RulesEngine> TurnCoordinator<E> {
    /// 从初始局面开始新对局，先手总是先走
    pub fn new(engine: Arc<E>, role: Role, local_side: Side) -> Self {
        Self::from_board(BoardState::initial(engine), role, local_side)
    }

    /// 同一终端上双方轮流走子，不需要网络连接
    pub fn local_game(engine: Arc<E>) -> Self {
        Self::from_board(BoardState::initial(engine), Role::Local, Side::First)
    }

    /// 从指定棋盘状态开始
    ///
    /// 本地对局中本方总是当前走子方，传入的 `local_side` 被忽略。
    pub fn from_board(board: BoardState<E>, role: Role, local_side: Side) -> Self {
        let local_side = if role == Role::Local {
            board.side_to_move()
        } else {
            local_side
        };
        let phase = if board.is_terminal() {
            Phase::GameOver
        } else if board.side_to_move() == local_side {
            Phase::WaitingLocal
        } else {
            Phase::WaitingRemote
        };

        Self {
            role,
            local_side,
            board,
            phase,
            failure: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_side(&self) -> Side {
        self.local_side
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn board(&self) -> &BoardState<E> {
        &self.board
    }

    /// 致命错误的描述
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// 本地可以从指定格子发起的走法（用于高亮）
    pub fn legal_moves(&self, square: Square) -> Vec<Move> {
        if self.phase != Phase::WaitingLocal {
            return Vec::new();
        }
        self.board.legal_moves_for(square, self.local_side)
    }

    /// 提交本地走法
    ///
    /// 成功时返回应用的走法和需要发送给对端的令牌。
    /// 失败时棋盘和阶段都不变，也不产生令牌。
    pub fn submit_local(&mut self, request: MoveRequest) -> Result<(Move, String), ChessError> {
        match self.phase {
            Phase::WaitingLocal | Phase::WaitingRemote => {}
            Phase::GameOver => return Err(ChessError::GameOver),
            Phase::Failed => return Err(ChessError::SessionFailed),
        }

        let illegal = || ChessError::IllegalMove {
            mv: request.to_string(),
        };

        // 先检查棋子归属：动对方的棋子无论是否轮到本方都是非法走法
        match self.board.piece_at(request.from) {
            Some(piece) if piece.side == self.local_side => {}
            _ => return Err(illegal()),
        }

        if self.phase == Phase::WaitingRemote {
            return Err(ChessError::NotYourTurn);
        }

        let candidates = self.board.legal_moves_for(request.from, self.local_side);
        let mv = request.resolve(&candidates).ok_or_else(illegal)?;

        self.board.apply_move(mv)?;
        if self.role == Role::Local {
            self.local_side = self.board.side_to_move();
            self.phase = self.phase_after_move(Phase::WaitingLocal);
        } else {
            self.phase = self.phase_after_move(Phase::WaitingRemote);
        }

        let token = MoveCodec::encode(&mv);
        debug!(role = %self.role, ply = self.board.ply(), "local move {}", token);
        Ok((mv, token))
    }

    /// 处理对端发来的令牌
    ///
    /// 对局结束后的令牌被忽略。解码失败、非对端回合或走法不合法都是致命错误，
    /// 协调器进入 `Failed` 且不修改棋盘。
    pub fn receive_remote(&mut self, token: &str) -> Result<Inbound, ProtocolError> {
        match self.phase {
            Phase::WaitingRemote => {}
            Phase::GameOver | Phase::Failed => {
                debug!(role = %self.role, "ignoring token {:?} after game end", token);
                return Ok(Inbound::Ignored);
            }
            Phase::WaitingLocal => {
                let err =
                    ProtocolError::violation(format!("token {:?} received out of turn", token));
                self.fail(err.to_string());
                return Err(err);
            }
        }

        let mv = match MoveCodec::decode(token) {
            Ok(mv) => mv,
            Err(e) => {
                let err = ProtocolError::Decode(e);
                self.fail(err.to_string());
                return Err(err);
            }
        };

        // 对端走法同样要经过合法性校验
        if let Err(e) = self.board.apply_move(mv) {
            let err = ProtocolError::violation(format!("peer move {} rejected: {}", mv, e));
            self.fail(err.to_string());
            return Err(err);
        }
        self.phase = self.phase_after_move(Phase::WaitingLocal);

        debug!(role = %self.role, ply = self.board.ply(), "remote move {}", token);
        Ok(Inbound::Applied(mv))
    }

    /// 进入致命错误状态
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.phase == Phase::Failed {
            return;
        }
        warn!(role = %self.role, "session failed: {}", reason);
        self.phase = Phase::Failed;
        self.failure = Some(reason);
    }

    fn phase_after_move(&self, next: Phase) -> Phase {
        if self.board.is_terminal() {
            info!(role = %self.role, status = ?self.board.status(), "game over");
            Phase::GameOver
        } else {
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{GameStatus, StandardRules};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::str::FromStr;

    type Coordinator = TurnCoordinator<StandardRules>;

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    fn request(token: &str) -> MoveRequest {
        MoveCodec::decode(token).unwrap().into()
    }

    /// 内存中的一对协调器：主机执先手，客户端执后手
    fn pair() -> (Coordinator, Coordinator) {
        let engine = Arc::new(StandardRules::new());
        (
            TurnCoordinator::new(Arc::clone(&engine), Role::Host, Side::First),
            TurnCoordinator::new(engine, Role::Client, Side::Second),
        )
    }

    /// 一方本地走子，令牌转交给另一方
    fn relay(mover: &mut Coordinator, receiver: &mut Coordinator, token: &str) -> String {
        let (_, sent) = mover.submit_local(request(token)).unwrap();
        let expected = Inbound::Applied(MoveCodec::decode(&sent).unwrap());
        assert_eq!(receiver.receive_remote(&sent).unwrap(), expected);
        sent
    }

    #[test]
    fn test_initial_phases() {
        let (host, client) = pair();
        assert_eq!(host.phase(), Phase::WaitingLocal);
        assert_eq!(client.phase(), Phase::WaitingRemote);

        // 客户端改执先手时也从本地开始
        let engine = Arc::new(StandardRules::new());
        let client_first = TurnCoordinator::new(engine, Role::Client, Side::First);
        assert_eq!(client_first.phase(), Phase::WaitingLocal);
    }

    #[test]
    fn test_first_move_is_relayed() {
        let (mut host, mut client) = pair();

        let (mv, token) = host.submit_local(request("e2e4")).unwrap();
        assert_eq!(token, "e2e4");
        assert_eq!(mv, Move::new(sq("e2"), sq("e4")));
        assert_eq!(host.board().side_to_move(), Side::Second);
        assert_eq!(host.phase(), Phase::WaitingRemote);

        assert_eq!(client.receive_remote(&token).unwrap(), Inbound::Applied(mv));
        assert_eq!(client.board().side_to_move(), Side::Second);
        assert_eq!(client.phase(), Phase::WaitingLocal);
        assert_eq!(client.board().last_move(), Some(mv));
        assert_eq!(host.board().position(), client.board().position());
    }

    #[test]
    fn test_fools_mate_ends_on_both_sides() {
        let (mut host, mut client) = pair();

        relay(&mut host, &mut client, "f2f3");
        relay(&mut client, &mut host, "e7e5");
        relay(&mut host, &mut client, "g2g4");
        relay(&mut client, &mut host, "d8h4");

        for side in [&host, &client] {
            assert_eq!(
                side.board().status(),
                GameStatus::Checkmate {
                    winner: Side::Second
                }
            );
            assert_eq!(side.phase(), Phase::GameOver);
        }

        let before = host.board().position().clone();
        assert_eq!(host.submit_local(request("a2a3")), Err(ChessError::GameOver));
        assert_eq!(host.board().position(), &before);

        let before = client.board().position().clone();
        assert_eq!(client.submit_local(request("a7a6")), Err(ChessError::GameOver));
        assert_eq!(client.board().position(), &before);
    }

    #[test]
    fn test_client_cannot_move_first_pieces() {
        let (mut host, mut client) = pair();
        relay(&mut host, &mut client, "e2e4");

        let before = client.board().position().clone();
        let result = client.submit_local(request("d2d4"));

        assert!(matches!(result, Err(ChessError::IllegalMove { .. })));
        assert_eq!(client.board().position(), &before);
        assert_eq!(client.phase(), Phase::WaitingLocal);
    }

    #[test]
    fn test_client_cannot_move_first_pieces_at_start() {
        let (_, mut client) = pair();
        let before = client.board().position().clone();

        let result = client.submit_local(request("e2e4"));

        assert!(matches!(result, Err(ChessError::IllegalMove { .. })));
        assert_eq!(client.board().position(), &before);
        assert_eq!(client.board().ply(), 0);
        assert_eq!(client.phase(), Phase::WaitingRemote);
    }

    #[test]
    fn test_local_game_alternates_sides() {
        let engine = Arc::new(StandardRules::new());
        let mut game = TurnCoordinator::local_game(engine);
        assert_eq!(game.phase(), Phase::WaitingLocal);
        assert_eq!(game.local_side(), Side::First);

        game.submit_local(request("e2e4")).unwrap();
        assert_eq!(game.phase(), Phase::WaitingLocal);
        assert_eq!(game.local_side(), Side::Second);
        assert_eq!(game.legal_moves(sq("b8")).len(), 2);

        // 轮到后手时先手的棋子不能动
        assert!(matches!(
            game.submit_local(request("d2d4")),
            Err(ChessError::IllegalMove { .. })
        ));

        for token in ["e7e5", "g1f3"] {
            game.submit_local(request(token)).unwrap();
        }
        assert_eq!(game.local_side(), Side::Second);
        assert_eq!(game.board().ply(), 3);

        // 本地对局不接受网络令牌
        assert!(game.receive_remote("b8c6").is_err());
        assert_eq!(game.phase(), Phase::Failed);
    }

    #[test]
    fn test_submit_out_of_turn_is_rejected() {
        let (_, mut client) = pair();
        let before = client.board().position().clone();

        assert_eq!(client.submit_local(request("e7e5")), Err(ChessError::NotYourTurn));
        assert_eq!(client.board().position(), &before);
        assert_eq!(client.board().last_move(), None);
        assert_eq!(client.phase(), Phase::WaitingRemote);
    }

    #[test]
    fn test_submit_illegal_move_is_rejected() {
        let (mut host, _) = pair();
        let before = host.board().position().clone();

        for token in ["e2e5", "g1g3", "e4e5", "a1a3"] {
            let result = host.submit_local(request(token));
            assert!(matches!(result, Err(ChessError::IllegalMove { .. })), "{}", token);
        }

        assert_eq!(host.board().position(), &before);
        assert_eq!(host.board().side_to_move(), Side::First);
        assert_eq!(host.phase(), Phase::WaitingLocal);
    }

    #[test]
    fn test_legal_moves_only_on_local_turn() {
        let (mut host, mut client) = pair();

        assert_eq!(host.legal_moves(sq("b1")).len(), 2);
        assert!(client.legal_moves(sq("b8")).is_empty());

        relay(&mut host, &mut client, "e2e4");

        assert!(host.legal_moves(sq("b1")).is_empty());
        assert_eq!(client.legal_moves(sq("b8")).len(), 2);
        assert!(client.legal_moves(sq("b1")).is_empty());
    }

    #[test]
    fn test_stray_token_after_game_over_is_ignored() {
        let (mut host, mut client) = pair();
        for (mover, token) in [(0, "f2f3"), (1, "e7e5"), (0, "g2g4"), (1, "d8h4")] {
            if mover == 0 {
                relay(&mut host, &mut client, token);
            } else {
                relay(&mut client, &mut host, token);
            }
        }

        let before = host.board().position().clone();
        assert_eq!(host.receive_remote("a2a3").unwrap(), Inbound::Ignored);
        assert_eq!(host.receive_remote("garbage").unwrap(), Inbound::Ignored);
        assert_eq!(host.board().position(), &before);
        assert_eq!(host.phase(), Phase::GameOver);
    }

    #[test]
    fn test_malformed_token_is_fatal() {
        let (_, mut client) = pair();
        let before = client.board().position().clone();

        let result = client.receive_remote("e2x4");

        assert!(matches!(result, Err(ProtocolError::Decode(_))));
        assert_eq!(client.phase(), Phase::Failed);
        assert!(client.failure().is_some());
        assert_eq!(client.board().position(), &before);
        assert_eq!(client.submit_local(request("e7e5")), Err(ChessError::SessionFailed));
        assert_eq!(client.receive_remote("e2e4").unwrap(), Inbound::Ignored);
    }

    #[test]
    fn test_illegal_peer_move_is_violation() {
        let (_, mut client) = pair();
        let before = client.board().position().clone();

        let result = client.receive_remote("e2e5");

        assert!(matches!(result, Err(ProtocolError::PeerProtocolViolation { .. })));
        assert_eq!(client.phase(), Phase::Failed);
        assert_eq!(client.board().position(), &before);
    }

    #[test]
    fn test_peer_move_out_of_turn_is_violation() {
        let (mut host, _) = pair();

        let result = host.receive_remote("e7e5");

        assert!(matches!(result, Err(ProtocolError::PeerProtocolViolation { .. })));
        assert_eq!(host.phase(), Phase::Failed);
        assert_eq!(host.board().ply(), 0);
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let engine = Arc::new(StandardRules::new());
        let position = chess::Board::from_str("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();

        let mut host = TurnCoordinator::from_board(
            BoardState::from_position(Arc::clone(&engine), position),
            Role::Host,
            Side::First,
        );
        let mut client = TurnCoordinator::from_board(
            BoardState::from_position(engine, position),
            Role::Client,
            Side::Second,
        );

        let (mv, token) = host.submit_local(MoveRequest::new(sq("a7"), sq("a8"))).unwrap();
        assert_eq!(mv.promotion, Some(Promotion::Queen));
        assert_eq!(token, "a7a8q");

        client.receive_remote(&token).unwrap();
        assert_eq!(host.board().position(), client.board().position());
    }

    #[test]
    fn test_underpromotion_is_relayed() {
        let engine = Arc::new(StandardRules::new());
        let position = chess::Board::from_str("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let mut host = TurnCoordinator::from_board(
            BoardState::from_position(engine, position),
            Role::Host,
            Side::First,
        );

        let (_, token) = host
            .submit_local(MoveRequest::with_promotion(sq("a7"), sq("a8"), Promotion::Knight))
            .unwrap();
        assert_eq!(token, "a7a8n");
    }

    #[test]
    fn test_random_games_stay_in_sync() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..8 {
            let (mut host, mut client) = pair();

            for _ in 0..120 {
                if host.phase() == Phase::GameOver {
                    break;
                }
                let (mover, receiver) = if host.phase() == Phase::WaitingLocal {
                    (&mut host, &mut client)
                } else {
                    (&mut client, &mut host)
                };

                let moves = mover.board().all_legal_moves();
                let mv = *moves.choose(&mut rng).unwrap();
                let (_, token) = mover.submit_local(mv.into()).unwrap();
                receiver.receive_remote(&token).unwrap();

                assert_eq!(host.board().position(), client.board().position());
                assert_eq!(host.board().side_to_move(), client.board().side_to_move());
                assert_eq!(host.board().status(), client.board().status());
            }

            // 双方阶段始终互补
            match host.phase() {
                Phase::GameOver => assert_eq!(client.phase(), Phase::GameOver),
                Phase::WaitingLocal => assert_eq!(client.phase(), Phase::WaitingRemote),
                Phase::WaitingRemote => assert_eq!(client.phase(), Phase::WaitingLocal),
                Phase::Failed => panic!("random game should never fail"),
            }
        }
    }
}
