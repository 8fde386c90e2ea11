//! SFTP 文件传输
//!
//! 上传按固定大小分块写入远端文件；下载把远端文件流式写到本地。

use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use common::{AppError, Result, RunnerOptions};

use super::transport::FileChannel;

/// 传输明细
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    pub remote_path: String,
    pub local_path: String,
    pub bytes: u64,
}

/// 按块复制，返回复制的字节数
pub async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;

    Ok(total)
}

/// 上传到 `remote_dir/file_name`
pub async fn upload<R>(
    channel: &mut dyn FileChannel,
    file_name: &str,
    source: &mut R,
    remote_dir: &str,
    options: &RunnerOptions,
) -> Result<Transferred>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    if file_name.is_empty() || file_name.contains('/') {
        return Err(AppError::Validation(format!(
            "invalid remote file name: {:?}",
            file_name
        )));
    }

    channel.change_dir(remote_dir).await?;
    let remote_path = channel.resolve(file_name);

    let mut writer = channel.create(&remote_path, options.remote_file_mode).await?;
    let bytes = copy_chunked(source, &mut writer, options.chunk_size)
        .await
        .map_err(|e| AppError::SftpError(format!("write {} failed: {}", remote_path, e)))?;
    writer
        .shutdown()
        .await
        .map_err(|e| AppError::SftpError(format!("close {} failed: {}", remote_path, e)))?;

    debug!(remote_path = %remote_path, bytes, "Upload finished");
    Ok(Transferred {
        remote_path,
        local_path: file_name.to_string(),
        bytes,
    })
}

/// 下载 `remote_file` 到 `local_folder/file_name`
pub async fn download(
    channel: &mut dyn FileChannel,
    remote_file: &str,
    local_folder: &Path,
    file_name: &str,
    chunk_size: usize,
) -> Result<Transferred> {
    let local_path: PathBuf = local_folder.join(file_name);

    let mut reader = channel.open(remote_file).await?;
    let mut file = tokio::fs::File::create(&local_path).await.map_err(|e| {
        AppError::IoError(format!("cannot create {}: {}", local_path.display(), e))
    })?;
    let bytes = copy_chunked(&mut reader, &mut file, chunk_size)
        .await
        .map_err(|e| AppError::SftpError(format!("read {} failed: {}", remote_file, e)))?;

    debug!(remote_file = %remote_file, local = %local_path.display(), bytes, "Download finished");
    Ok(Transferred {
        remote_path: remote_file.to_string(),
        local_path: local_path.display().to_string(),
        bytes,
    })
}
