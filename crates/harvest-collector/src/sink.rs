//! 완성 레코드 출력.

use async_trait::async_trait;
use harvest_core::{HarvestError, Record, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// 완성된 레코드를 받는 출력 계층.
///
/// 레코드마다 정확히 한 번 호출됩니다.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, record: Record) -> Result<()>;
}

/// JSON lines 파일 Sink (레코드당 한 줄, 추가 모드).
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// 피드 파일을 열거나 생성합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn accept(&self, record: Record) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| HarvestError::Sink(format!("{}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| HarvestError::Sink(format!("{}: {}", self.path.display(), e)))?;

        debug!(isin = %record.identity.isin, path = %self.path.display(), "레코드 기록");
        Ok(())
    }
}

/// 메모리 Sink (테스트와 임베딩용).
#[derive(Debug, Default)]
pub struct MemorySink {
    records: StdMutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 받은 레코드 복사본
    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&self, record: Record) -> Result<()> {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}
