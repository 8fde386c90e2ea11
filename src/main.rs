//! gssh 命令行入口
//! 输出（transcript）写到标准输出，日志写到标准错误

mod cli;

use anyhow::{anyhow, Context};
use clap::Parser;
use secrecy::ExposeSecret;
use std::process::ExitCode;

use cli::{Cli, Commands};
use gssh::{config::AppConfig, telemetry, ConnectionParameters, RemoteRunner, StdoutSink};

#[tokio::main]
async fn main() -> ExitCode {
    // .env 必须在解析参数之前加载，GSSH_PASSWORD 才能作为 --password 的后备
    cli::load_env_files(&std::env::current_dir().unwrap_or_default());
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "gssh failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    // 1. 加载配置
    let config = AppConfig::load().context("Failed to load configuration")?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    tracing::debug!(version = common::version(), "gssh starting");

    // 3. 组装连接参数
    let params = connection_parameters(&cli, &config)?;
    let runner = RemoteRunner::new(params, config.runner.clone());
    let mut sink = StdoutSink;

    // 4. 执行
    match cli.command {
        Commands::Test => Ok(runner.test_connection(&mut sink).await),
        Commands::Upload {
            local,
            remote_dir,
            name,
        } => {
            let file_name = match name {
                Some(name) => name,
                None => local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("cannot derive a file name from {}", local.display()))?,
            };
            let mut source = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("cannot open {}", local.display()))?;

            runner
                .upload_file(&mut sink, &file_name, &mut source, &remote_dir)
                .await?;
            Ok(true)
        }
        Commands::Download {
            remote_file,
            local_folder,
            name,
        } => {
            let file_name = match name {
                Some(name) => name,
                None => cli::file_name_of(&remote_file)
                    .ok_or_else(|| anyhow!("cannot derive a file name from {}", remote_file))?,
            };

            runner
                .download_file(&mut sink, &remote_file, &local_folder, &file_name)
                .await?;
            Ok(true)
        }
        Commands::Shell { script } => {
            let script = cli::read_payload(&script)
                .await
                .context("cannot read script")?;
            runner.execute_shell(&mut sink, &script).await?;
            Ok(true)
        }
        Commands::Exec { command } => {
            let command = cli::read_payload(&command)
                .await
                .context("cannot read command")?;
            runner.execute_command(&mut sink, &command).await?;
            Ok(true)
        }
    }
}

/// 命令行参数优先，其次是凭据组
fn connection_parameters(cli: &Cli, config: &AppConfig) -> anyhow::Result<ConnectionParameters> {
    let host = cli
        .host
        .clone()
        .ok_or_else(|| anyhow!("--host is required"))?;

    let group = match &cli.group {
        Some(name) => Some(config.group(name).map_err(|e| anyhow!("{}", e))?),
        None => None,
    };

    let port = cli.port.or(group.map(|g| g.port)).unwrap_or(22);
    let username = cli
        .user
        .clone()
        .or_else(|| group.map(|g| g.username.clone()))
        .ok_or_else(|| anyhow!("--user or --group is required"))?;
    let password = cli
        .password
        .clone()
        .or_else(|| group.map(|g| g.password.expose_secret().clone()))
        .ok_or_else(|| anyhow!("--password, GSSH_PASSWORD or --group is required"))?;

    let mut params = config.connection_for(ConnectionParameters::with_password(
        &host, port, &username, &password,
    ));
    if let Some(mode) = &cli.host_key_verification {
        params = params.with_host_key_verification(mode.clone());
    }
    if let Some(fingerprint) = &cli.fingerprint {
        params = params.with_known_host(fingerprint);
    }

    params.validate().map_err(|e| anyhow!(e))?;
    Ok(params)
}
