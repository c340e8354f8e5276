//! 命令行参数

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{arg, ArgMatches, Command};
use protocol::Side;

use crate::config::{Orientation, PeerConfig, Role};

/// 构建命令行定义
pub fn command() -> Command {
    Command::new("chess-peer")
        .author(clap::crate_authors!())
        .version(clap::crate_version!())
        .about("双人联机国际象棋，一方主持对局，另一方连接加入")
        .subcommand_required(true)
        .subcommand(with_common_args(
            Command::new("host").about("监听端口并等待对手连接"),
        ))
        .subcommand(with_common_args(
            Command::new("join").about("连接到主持对局的一方"),
        ))
        .subcommand(with_display_args(
            Command::new("local").about("在同一终端上双方轮流走子"),
        ))
}

fn with_common_args(command: Command) -> Command {
    with_display_args(
        command
            .arg(arg!(-a --"addr" <host> "主机地址"))
            .arg(arg!(-p --"port" <port> "端口").value_parser(clap::value_parser!(u16)))
            .arg(arg!(-s --"side" <side> "本方执棋").value_parser(["first", "second"])),
    )
}

fn with_display_args(command: Command) -> Command {
    command
        .arg(
            arg!(-o --"orientation" <orientation> "棋盘方向")
                .value_parser(["local", "first", "second", "flip"]),
        )
        .arg(arg!(-c --"config" <file> "配置文件路径").value_parser(clap::value_parser!(PathBuf)))
        .arg(arg!(--"save" "把本次参数写回配置文件"))
}

/// 解析命令行并与配置文件合并，命令行优先
pub fn config_from_matches(matches: &ArgMatches) -> Result<PeerConfig> {
    let (role, sub_matches) = match matches.subcommand() {
        Some(("host", sub_matches)) => (Role::Host, sub_matches),
        Some(("join", sub_matches)) => (Role::Client, sub_matches),
        Some(("local", sub_matches)) => (Role::Local, sub_matches),
        _ => bail!("缺少子命令 host、join 或 local"),
    };

    let mut config = match sub_matches.get_one::<PathBuf>("config") {
        Some(path) => PeerConfig::load_from(path),
        None => PeerConfig::load(),
    };
    config.role = role;

    // local 子命令没有网络参数
    if role.is_networked() {
        if let Some(host) = sub_matches.get_one::<String>("addr") {
            config.network.host = host.clone();
        }
        if let Some(port) = sub_matches.get_one::<u16>("port") {
            config.network.port = *port;
        }
        if let Some(side) = sub_matches.get_one::<String>("side") {
            config.local_side = Some(match side.as_str() {
                "first" => Side::First,
                "second" => Side::Second,
                other => bail!("无效的执棋方: {}", other),
            });
        }
    }
    if let Some(orientation) = sub_matches.get_one::<String>("orientation") {
        config.orientation = Orientation::parse(orientation)
            .ok_or_else(|| anyhow::anyhow!("无效的棋盘方向: {}", orientation))?;
    }

    Ok(config)
}

/// 指定了 `--save` 时把合并后的配置写回配置文件，返回写入的路径
pub fn save_if_requested(matches: &ArgMatches, config: &PeerConfig) -> Result<Option<PathBuf>> {
    let Some((_, sub_matches)) = matches.subcommand() else {
        return Ok(None);
    };
    if !sub_matches.get_flag("save") {
        return Ok(None);
    }

    let path = match sub_matches.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => PeerConfig::config_path()
            .ok_or_else(|| anyhow::anyhow!("无法获取配置目录，配置未保存"))?,
    };
    config.save_to(&path)?;
    Ok(Some(path))
}
