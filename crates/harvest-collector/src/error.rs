//! 에러 타입 정의.

use harvest_core::HarvestError;
use std::fmt;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 수집 에러 (fetch, 링크 누락, sink 등)
    Harvest(HarvestError),
    /// 설정 에러 (환경 변수, 로깅 초기화)
    Config(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Harvest(e) => write!(f, "Harvest error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Harvest(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<HarvestError> for CollectorError {
    fn from(err: HarvestError) -> Self {
        Self::Harvest(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn open_feed() -> Result<()> {
        let opened: harvest_core::Result<()> =
            Err(HarvestError::Sink("permission denied".to_string()));
        opened?;
        Ok(())
    }

    #[test]
    fn test_harvest_error_converts_with_source() {
        let err = open_feed().unwrap_err();

        assert!(matches!(err, CollectorError::Harvest(HarvestError::Sink(_))));
        assert!(err.to_string().starts_with("Harvest error: "));
        assert!(err.source().is_some());
        assert!(CollectorError::Config("x".into()).source().is_none());
    }
}
