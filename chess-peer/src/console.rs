//! 终端显示与输入
//!
//! 显示层只读取会话快照，从不直接修改棋盘；本地输入被解析成
//! [`MoveRequest`] 交给会话处理，被拒绝的走法只打印一行提示。

use anyhow::Result;
use protocol::{DecodeError, GameStatus, MoveCodec, RulesEngine, Side, Square, BOARD_SIZE};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::config::{Orientation, Role};
use crate::coordinator::{MoveRequest, Phase};
use crate::local::LocalGame;
use crate::session::{SessionHandle, Snapshot, SubmitError};

// ============================================================================
// 输入解析
// ============================================================================

/// 终端命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// 走子，例如 `e2e4`、`e7e8q`
    Move(MoveRequest),
    /// 列出某格的合法走法，例如 `moves e2`
    Moves(Square),
    /// 重新显示棋盘
    Board,
    /// 帮助
    Help,
    /// 退出
    Quit,
}

/// 输入解析错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("请输入命令")]
    Empty,

    #[error("无效的格子: {0}")]
    InvalidSquare(String),

    #[error("无法识别的输入 {input:?}: {source}")]
    InvalidMove {
        input: String,
        #[source]
        source: DecodeError,
    },
}

/// 解析一行输入
pub fn parse_command(line: &str) -> Result<ConsoleCommand, InputError> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Err(InputError::Empty);
    };

    match first.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "board" | "b" => Ok(ConsoleCommand::Board),
        "moves" | "m" => {
            let text = words.next().unwrap_or_default();
            Square::from_algebraic(text)
                .map(ConsoleCommand::Moves)
                .ok_or_else(|| InputError::InvalidSquare(text.to_string()))
        }
        _ => {
            // 允许 "e2 e4" 这样带空格的写法
            let compact: String = line.split_whitespace().collect::<String>().to_ascii_lowercase();
            MoveCodec::decode(&compact)
                .map(|mv| ConsoleCommand::Move(mv.into()))
                .map_err(|source| InputError::InvalidMove {
                    input: line.to_string(),
                    source,
                })
        }
    }
}

pub const HELP: &str = "\
命令:
  e2e4      走子（兵升变可加 q/r/b/n，默认升变为后）
  moves e2  列出该格的合法走法
  board     重新显示棋盘
  quit      退出";

// ============================================================================
// 渲染
// ============================================================================

/// 绘制棋盘
///
/// 上一步的起止格用 `[ ]` 标出，被将军的王用 `< >` 标出。
pub fn render_board<E: RulesEngine>(snapshot: &Snapshot<E>, orientation: Orientation) -> String {
    let board = &snapshot.board;
    let bottom = orientation.bottom_side(snapshot.local_side, board.side_to_move());

    let ranks: Vec<u8> = match bottom {
        Side::First => (0..BOARD_SIZE).rev().collect(),
        Side::Second => (0..BOARD_SIZE).collect(),
    };
    let files: Vec<u8> = match bottom {
        Side::First => (0..BOARD_SIZE).collect(),
        Side::Second => (0..BOARD_SIZE).rev().collect(),
    };

    let last = board.last_move();
    let checked_side = board.is_check().then(|| board.side_to_move());

    let file_labels: String = files
        .iter()
        .map(|&f| format!(" {} ", (b'a' + f) as char))
        .collect();

    let mut out = String::new();
    out.push_str(&format!("   {}\n", file_labels));
    for &rank in &ranks {
        out.push_str(&format!(" {} ", rank + 1));
        for &file in &files {
            let square = Square::new_unchecked(file, rank);
            let piece = board.piece_at(square);
            let symbol = piece.map(|p| p.to_fen_char()).unwrap_or('.');

            let in_check = matches!(
                (piece, checked_side),
                (Some(p), Some(side)) if p.kind == protocol::PieceKind::King && p.side == side
            );
            let highlighted = last.is_some_and(|mv| mv.from == square || mv.to == square);

            let cell = if in_check {
                format!("<{}>", symbol)
            } else if highlighted {
                format!("[{}]", symbol)
            } else {
                format!(" {} ", symbol)
            };
            out.push_str(&cell);
        }
        out.push_str(&format!(" {}\n", rank + 1));
    }
    out.push_str(&format!("   {}\n", file_labels));
    out
}

/// 对局结果文字
pub fn result_banner(status: GameStatus) -> Option<&'static str> {
    match status {
        GameStatus::InProgress => None,
        GameStatus::Checkmate {
            winner: Side::First,
        } => Some("白方胜！"),
        GameStatus::Checkmate {
            winner: Side::Second,
        } => Some("黑方胜！"),
        GameStatus::Stalemate => Some("和棋！"),
    }
}

/// 状态栏
pub fn status_line<E: RulesEngine>(snapshot: &Snapshot<E>) -> String {
    match snapshot.phase {
        Phase::Failed => format!(
            "对局中止: {}",
            snapshot.failure.as_deref().unwrap_or("连接错误")
        ),
        Phase::GameOver => result_banner(snapshot.board.status())
            .unwrap_or("对局结束")
            .to_string(),
        Phase::WaitingLocal | Phase::WaitingRemote => {
            let mut line = if snapshot.role == Role::Local {
                format!("轮到{}走子", snapshot.local_side.display_name())
            } else if snapshot.is_local_turn() {
                format!("轮到你走子（{}）", snapshot.local_side.display_name())
            } else {
                "等待对手走子...".to_string()
            };
            if snapshot.board.is_check() {
                line.push_str(" 将军！");
            }
            line
        }
    }
}

/// 列出合法走法
pub fn render_moves(square: Square, moves: &[protocol::Move]) -> String {
    if moves.is_empty() {
        return format!("{}: 没有可走的着法", square);
    }
    let tokens: Vec<String> = moves.iter().map(MoveCodec::encode).collect();
    format!("{}: {}", square, tokens.join(" "))
}

// ============================================================================
// 主循环
// ============================================================================

/// 终端交互主循环，对局结束、会话失败、输入结束或用户退出时返回
pub async fn run<E: RulesEngine>(
    mut handle: SessionHandle<E>,
    orientation: Orientation,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let snapshot = handle.snapshot();
    println!("你执{}", snapshot.local_side.display_name());
    println!("{}", HELP);
    redraw(&snapshot, orientation);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("标准输入已关闭");
                    return Ok(());
                };
                if !handle_line(&handle, &line, orientation).await {
                    return Ok(());
                }
            }
            alive = handle.changed() => {
                let snapshot = handle.snapshot();
                redraw(&snapshot, orientation);
                if !alive || matches!(snapshot.phase, Phase::GameOver | Phase::Failed) {
                    return Ok(());
                }
            }
        }
    }
}

fn redraw<E: RulesEngine>(snapshot: &Snapshot<E>, orientation: Orientation) {
    println!();
    print!("{}", render_board(snapshot, orientation));
    println!("{}", status_line(snapshot));
}

/// 处理一行输入，返回 false 表示退出
async fn handle_line<E: RulesEngine>(
    handle: &SessionHandle<E>,
    line: &str,
    orientation: Orientation,
) -> bool {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(InputError::Empty) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Board => redraw(&handle.snapshot(), orientation),
        ConsoleCommand::Moves(square) => {
            println!("{}", render_moves(square, &handle.legal_moves(square)))
        }
        ConsoleCommand::Move(request) => match handle.submit(request).await {
            // 成功后的重绘由状态变化触发
            Ok(_) => {}
            Err(SubmitError::Rejected(e)) => println!("走法未被接受: {}", e),
            Err(SubmitError::Closed) => return false,
        },
    }
    true
}

/// 本地对局主循环，对局结束、输入结束或用户退出时返回
pub async fn run_local<E: RulesEngine>(
    game: &mut LocalGame<E>,
    orientation: Orientation,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("本地对局，双方在此终端轮流走子");
    println!("{}", HELP);
    redraw(&game.snapshot(), orientation);

    while let Some(line) = lines.next_line().await? {
        if !handle_local_line(game, &line, orientation) || game.is_over() {
            return Ok(());
        }
    }
    debug!("标准输入已关闭");
    Ok(())
}

/// 处理本地对局的一行输入，返回 false 表示退出
fn handle_local_line<E: RulesEngine>(
    game: &mut LocalGame<E>,
    line: &str,
    orientation: Orientation,
) -> bool {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(InputError::Empty) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Board => redraw(&game.snapshot(), orientation),
        ConsoleCommand::Moves(square) => {
            println!("{}", render_moves(square, &game.legal_moves(square)))
        }
        ConsoleCommand::Move(request) => match game.submit(request) {
            Ok(_) => redraw(&game.snapshot(), orientation),
            Err(e) => println!("走法未被接受: {}", e),
        },
    }
    true
}
