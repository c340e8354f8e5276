//! 进程配置
//!
//! 配置在构造时确定，之后不可变。支持从 JSON 文件加载并由命令行覆盖。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use protocol::{NetworkConfig, Side};
use serde::{Deserialize, Serialize};

/// 本进程在连接中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    /// 监听并等待对端连接
    #[default]
    Host,
    /// 主动连接主机
    Client,
    /// 同一终端双方轮流走子，不建立连接
    Local,
}

impl Role {
    /// 角色的默认执棋方：主机先手，客户端后手，本地对局从先手开始
    pub fn default_side(self) -> Side {
        match self {
            Role::Host | Role::Local => Side::First,
            Role::Client => Side::Second,
        }
    }

    /// 是否需要网络连接
    pub fn is_networked(self) -> bool {
        self != Role::Local
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Client => write!(f, "client"),
            Role::Local => write!(f, "local"),
        }
    }
}

/// 棋盘显示方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Orientation {
    /// 本方在下
    #[default]
    LocalBottom,
    /// 先手在下
    FirstBottom,
    /// 后手在下
    SecondBottom,
    /// 每走一步翻转，走子方在下
    FlipEachMove,
}

impl Orientation {
    /// 在给定本方和走子方时，位于下方的阵营
    pub fn bottom_side(self, local_side: Side, side_to_move: Side) -> Side {
        match self {
            Orientation::LocalBottom => local_side,
            Orientation::FirstBottom => Side::First,
            Orientation::SecondBottom => Side::Second,
            Orientation::FlipEachMove => side_to_move,
        }
    }

    /// 从命令行参数解析
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "local" => Some(Orientation::LocalBottom),
            "first" => Some(Orientation::FirstBottom),
            "second" => Some(Orientation::SecondBottom),
            "flip" => Some(Orientation::FlipEachMove),
            _ => None,
        }
    }
}

/// 对等进程配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PeerConfig {
    /// 角色
    pub role: Role,
    /// 监听/连接地址
    pub network: NetworkConfig,
    /// 本方执棋（未指定时由角色决定）
    pub local_side: Option<Side>,
    /// 棋盘显示方向
    pub orientation: Orientation,
}

impl PeerConfig {
    /// 本方实际执棋
    pub fn local_side(&self) -> Side {
        self.local_side.unwrap_or_else(|| self.role.default_side())
    }

    /// 获取默认配置文件路径
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("chess-peer");
            path.push("config.json");
            path
        })
    }

    /// 从默认路径加载配置
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("无法获取配置目录，使用默认配置");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// 从指定文件加载配置，文件缺失或无效时使用默认配置
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    tracing::info!("已加载配置: {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("配置文件格式无效: {}，使用默认配置", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("无法读取配置文件: {}，使用默认配置", e);
                Self::default()
            }
        }
    }

    /// 保存配置到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        std::fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        tracing::info!("配置已保存: {:?}", path);
        Ok(())
    }
}
