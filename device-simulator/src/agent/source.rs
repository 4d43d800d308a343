use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::Path;

/// 视频分块来源：文件内容循环，或合成数据
pub enum ChunkSource {
    File { data: Bytes, offset: usize },
    Synthetic { sequence: u32 },
}

impl ChunkSource {
    pub async fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read source file {:?}", path))?;
                anyhow::ensure!(!data.is_empty(), "source file {:?} is empty", path);
                Ok(Self::File {
                    data: Bytes::from(data),
                    offset: 0,
                })
            }
            None => Ok(Self::Synthetic { sequence: 0 }),
        }
    }

    /// 下一个分块，长度不超过 `chunk_size`
    pub fn next_chunk(&mut self, chunk_size: usize) -> Bytes {
        match self {
            Self::File { data, offset } => {
                let end = (*offset + chunk_size).min(data.len());
                let chunk = data.slice(*offset..end);
                *offset = if end == data.len() { 0 } else { end };
                chunk
            }
            Self::Synthetic { sequence } => {
                *sequence = sequence.wrapping_add(1);
                synthetic_chunk(*sequence, chunk_size)
            }
        }
    }
}

/// Annex-B 起始码 + NAL 头 + 序号，剩余部分填充
fn synthetic_chunk(sequence: u32, chunk_size: usize) -> Bytes {
    let mut chunk = Vec::with_capacity(chunk_size);
    chunk.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65]);
    chunk.extend_from_slice(&sequence.to_be_bytes());
    chunk.resize(chunk_size.max(chunk.len()), (sequence & 0xff) as u8);
    chunk.truncate(chunk_size);
    Bytes::from(chunk)
}
