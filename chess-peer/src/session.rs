//! 对局会话
//!
//! 会话任务独占回合协调器和连接写端，所有修改都在这个任务里串行发生：
//! - 本地走子通过 [`SessionHandle::submit`] 以命令形式送达
//! - 读取任务只负责从连接读取令牌并转发，不触碰棋盘
//! - 每次状态变化后发布一份 [`Snapshot`]，显示层只读快照

use std::sync::Arc;

use protocol::{
    BoardState, ChessError, ConnectionState, Move, ProtocolError, RulesEngine, Side, Square,
    StreamConnection, TokenReader, TokenWriter,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Role;
use crate::coordinator::{Inbound, MoveRequest, Phase, TurnCoordinator};

/// 命令通道容量
const COMMAND_BUFFER: usize = 16;

/// 入站令牌通道容量
const INBOUND_BUFFER: usize = 16;

/// 本地走子提交失败
#[derive(Debug, Error)]
pub enum SubmitError {
    /// 走法被拒绝，棋盘未改变
    #[error(transparent)]
    Rejected(#[from] ChessError),

    /// 会话任务已退出
    #[error("会话已关闭")]
    Closed,
}

/// 会话状态快照
pub struct Snapshot<E: RulesEngine> {
    pub board: BoardState<E>,
    pub phase: Phase,
    pub role: Role,
    pub local_side: Side,
    pub connection: ConnectionState,
    /// 致命错误描述
    pub failure: Option<String>,
}

impl<E: RulesEngine> Snapshot<E> {
    pub(crate) fn capture(coordinator: &TurnCoordinator<E>, connection: ConnectionState) -> Self {
        Self {
            board: coordinator.board().clone(),
            phase: coordinator.phase(),
            role: coordinator.role(),
            local_side: coordinator.local_side(),
            connection,
            failure: coordinator.failure().map(str::to_string),
        }
    }

    /// 是否轮到本地走子
    pub fn is_local_turn(&self) -> bool {
        self.phase == Phase::WaitingLocal
    }
}

impl<E: RulesEngine> Clone for Snapshot<E> {
    fn clone(&self) -> Self {
        Self {
            board: self.board.clone(),
            phase: self.phase,
            role: self.role,
            local_side: self.local_side,
            connection: self.connection,
            failure: self.failure.clone(),
        }
    }
}

impl<E: RulesEngine> std::fmt::Debug for Snapshot<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("board", &self.board)
            .field("phase", &self.phase)
            .field("role", &self.role)
            .field("local_side", &self.local_side)
            .field("connection", &self.connection)
            .field("failure", &self.failure)
            .finish()
    }
}

enum Command {
    Submit {
        request: MoveRequest,
        reply: oneshot::Sender<Result<Move, ChessError>>,
    },
}

/// 会话句柄，供显示层使用
pub struct SessionHandle<E: RulesEngine> {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Snapshot<E>>,
}

impl<E: RulesEngine> Clone for SessionHandle<E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            state: self.state.clone(),
        }
    }
}

impl<E: RulesEngine> SessionHandle<E> {
    /// 当前状态快照
    pub fn snapshot(&self) -> Snapshot<E> {
        self.state.borrow().clone()
    }

    /// 本地可以从指定格子发起的走法，非本地回合时为空
    pub fn legal_moves(&self, square: Square) -> Vec<Move> {
        let state = self.state.borrow();
        if !state.is_local_turn() {
            return Vec::new();
        }
        state.board.legal_moves_for(square, state.local_side)
    }

    /// 提交本地走法
    ///
    /// 走法被接受后才会发送给对端。发送失败时会话进入 `Failed`，
    /// 但本地已应用的走法仍然返回。
    pub async fn submit(&self, request: MoveRequest) -> Result<Move, SubmitError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| SubmitError::Closed)?;

        let result = response.await.map_err(|_| SubmitError::Closed)?;
        Ok(result?)
    }

    /// 等待下一次状态变化，会话任务退出后返回 false
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// 等待直到快照满足条件
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&Snapshot<E>) -> bool,
    ) -> Option<Snapshot<E>> {
        self.state
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}

/// 会话启动入口
pub struct Session;

impl Session {
    /// 从初始局面开始对局
    pub fn spawn<E, R, W>(
        engine: Arc<E>,
        role: Role,
        local_side: Side,
        connection: StreamConnection<R, W>,
    ) -> (SessionHandle<E>, JoinHandle<()>)
    where
        E: RulesEngine,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with(TurnCoordinator::new(engine, role, local_side), connection)
    }

    /// 使用已有的协调器启动会话
    pub fn spawn_with<E, R, W>(
        coordinator: TurnCoordinator<E>,
        connection: StreamConnection<R, W>,
    ) -> (SessionHandle<E>, JoinHandle<()>)
    where
        E: RulesEngine,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = connection.split();

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (state_tx, state_rx) =
            watch::channel(Snapshot::capture(&coordinator, ConnectionState::Connected));

        info!(
            role = %coordinator.role(),
            side = %coordinator.local_side(),
            "会话开始"
        );

        let reader_task = tokio::spawn(read_tokens(reader, inbound_tx));
        let actor = SessionActor {
            coordinator,
            writer: Some(writer),
            connection: ConnectionState::Connected,
            state: state_tx,
            reader_task,
            reading: true,
        };
        let task = tokio::spawn(actor.run(command_rx, inbound_rx));

        (
            SessionHandle {
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }
}

/// 读取任务：只在网络读取上挂起
async fn read_tokens<R>(
    mut reader: TokenReader<R>,
    inbound: mpsc::Sender<Result<String, ProtocolError>>,
) where
    R: AsyncRead + Unpin + Send,
{
    loop {
        match reader.read_token().await {
            Ok(token) => {
                if inbound.send(Ok(token)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = inbound.send(Err(e)).await;
                break;
            }
        }
    }
}

struct SessionActor<E: RulesEngine, W> {
    coordinator: TurnCoordinator<E>,
    writer: Option<TokenWriter<W>>,
    connection: ConnectionState,
    state: watch::Sender<Snapshot<E>>,
    reader_task: JoinHandle<()>,
    reading: bool,
}

impl<E, W> SessionActor<E, W>
where
    E: RulesEngine,
    W: AsyncWrite + Unpin + Send,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::Receiver<Result<String, ProtocolError>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { request, reply }) => {
                        let result = self.handle_submit(request).await;
                        let _ = reply.send(result);
                    }
                    // 所有句柄都已释放
                    None => break,
                },
                message = inbound.recv(), if self.reading => match message {
                    Some(Ok(token)) => self.handle_token(&token).await,
                    Some(Err(e)) => self.handle_read_error(e).await,
                    None => self.reading = false,
                },
            }
        }

        self.close().await;
        debug!(role = %self.coordinator.role(), "会话任务退出");
    }

    async fn handle_submit(&mut self, request: MoveRequest) -> Result<Move, ChessError> {
        let (mv, token) = self.coordinator.submit_local(request)?;

        let sent = match self.writer.as_mut() {
            Some(writer) => writer.write_token(&token).await,
            None => Err(ProtocolError::ConnectionClosed),
        };
        if let Err(e) = sent {
            error!(role = %self.coordinator.role(), "发送走法失败: {}", e);
            self.coordinator.fail(format!("发送走法失败: {}", e));
            self.close().await;
        } else if self.coordinator.phase() == Phase::GameOver {
            self.close().await;
        }

        self.publish();
        Ok(mv)
    }

    async fn handle_token(&mut self, token: &str) {
        match self.coordinator.receive_remote(token) {
            Ok(Inbound::Applied(_)) => {
                if self.coordinator.phase() == Phase::GameOver {
                    self.close().await;
                }
                self.publish();
            }
            Ok(Inbound::Ignored) => {}
            Err(e) => {
                error!(role = %self.coordinator.role(), "对端协议错误: {}", e);
                self.close().await;
                self.publish();
            }
        }
    }

    async fn handle_read_error(&mut self, e: ProtocolError) {
        self.reading = false;
        if self.coordinator.phase() == Phase::GameOver {
            debug!("对局结束后连接关闭: {}", e);
        } else {
            error!(role = %self.coordinator.role(), "连接错误: {}", e);
            self.coordinator.fail(e.to_string());
        }
        self.close().await;
        self.publish();
    }

    /// 关闭连接并停止读取任务，可重复调用
    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("关闭写端失败: {}", e);
            }
        }
        self.reader_task.abort();
        self.reading = false;
        if self.connection != ConnectionState::Closed {
            info!(role = %self.coordinator.role(), "连接已关闭");
            self.connection = ConnectionState::Closed;
        }
    }

    fn publish(&self) {
        self.state
            .send_replace(Snapshot::capture(&self.coordinator, self.connection));
    }
}
