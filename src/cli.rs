// 命令行参数解析
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use gssh::HostKeyVerification;

#[derive(Parser, Debug)]
#[command(name = "gssh")]
#[command(about = "Run scripts and transfer files on remote hosts over SSH")]
#[command(version)]
pub struct Cli {
    /// SSH server hostname or IP address
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// SSH server port (defaults to the group's port, or 22)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// SSH username
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// SSH password
    #[arg(short = 'P', long, env = "GSSH_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Credential group from configuration (GSSH_GROUPS__<NAME>__...)
    #[arg(short, long, global = true)]
    pub group: Option<String>,

    /// Host key verification: strict (default), accept or disabled
    #[arg(long, global = true)]
    pub host_key_verification: Option<HostKeyVerification>,

    /// Expected SHA-256 host key fingerprint (hex)
    #[arg(long, global = true)]
    pub fingerprint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that a session can be established
    Test,
    /// Upload a local file into a remote directory
    Upload {
        /// Local file path
        local: PathBuf,
        /// Remote destination directory
        remote_dir: String,
        /// Remote file name (defaults to the local file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Download a remote file into a local folder
    Download {
        /// Remote file path
        remote_file: String,
        /// Local destination folder
        local_folder: PathBuf,
        /// Local file name (defaults to the remote file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Run a script through an interactive shell
    Shell {
        /// Script text, @file to read a file, or - for stdin
        script: String,
    },
    /// Run a command through an exec channel
    Exec {
        /// Command text, @file to read a file, or - for stdin
        command: String,
    },
}

/// 加载 .env 文件（开发环境）
///
/// 按优先级加载：.env.<GSSH_ENV> > .env.local > .env，已有的环境变量不会被覆盖
pub fn load_env_files(dir: &Path) {
    if let Ok(env) = std::env::var("GSSH_ENV") {
        dotenv::from_path(dir.join(format!(".env.{}", env))).ok();
    } else {
        dotenv::from_path(dir.join(".env.local")).ok();
        dotenv::from_path(dir.join(".env")).ok();
    }
}

/// 读取脚本参数：`@path` 读文件，`-` 读标准输入，其余原样返回
pub async fn read_payload(arg: &str) -> std::io::Result<String> {
    use tokio::io::AsyncReadExt;

    if arg == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        Ok(buf)
    } else if let Some(path) = arg.strip_prefix('@') {
        tokio::fs::read_to_string(path).await
    } else {
        Ok(arg.to_string())
    }
}

/// 取路径的最后一段作为文件名
pub fn file_name_of(path: &str) -> Option<String> {
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
