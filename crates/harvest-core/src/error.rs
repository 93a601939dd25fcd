//! 수집 에러 타입.
//!
//! 섹션 누락(SectionAbsent)과 빈 결과(EmptyResultSet)는 에러가 아니라
//! 추출 단계에서 빈 매핑/센티널 행으로 복구되므로 여기에 없습니다.

use thiserror::Error;

/// 수집 작업 에러.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Fetch 계층이 응답을 얻지 못함
    #[error("요청 실패 ({url}): {reason}")]
    FetchFailure { url: String, reason: String },

    /// 필수 링크(History, Frankfurt/Xetra 앵커)를 찾지 못함
    #[error("링크 누락 [{instrument}] {link} @ {url}")]
    MalformedLink {
        instrument: String,
        url: String,
        link: String,
    },

    /// 허용 도메인 밖으로의 후속 요청
    #[error("허용되지 않은 도메인 [{instrument}]: {url}")]
    OffsiteRequest { instrument: String, url: String },

    /// 이미 종료된 레코드에 대한 병합 시도
    #[error("이미 종료된 레코드: {instrument}")]
    RecordClosed { instrument: String },

    /// 대기 목록에 없는 요청의 응답
    #[error("대기 중이 아닌 요청 [{instrument}]: #{request}")]
    UnknownRequest { instrument: String, request: u32 },

    /// 현재 상태에서 처리할 수 없는 응답/전이
    #[error("잘못된 상태 [{instrument}]: {detail}")]
    InvalidState { instrument: String, detail: String },

    /// 잘못된 CSS 셀렉터
    #[error("셀렉터 오류: {0}")]
    Selector(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// Sink 에러
    #[error("Sink 에러: {0}")]
    Sink(String),

    /// 입출력 에러
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// 해당 레코드를 중단시키는 에러인지 확인합니다.
    ///
    /// `RecordClosed`/`UnknownRequest`는 중복 또는 늦게 도착한 응답이므로
    /// 레코드 자체는 계속 진행됩니다.
    pub fn is_record_fatal(&self) -> bool {
        !matches!(
            self,
            Self::RecordClosed { .. } | Self::UnknownRequest { .. }
        )
    }
}

impl From<config::ConfigError> for HarvestError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for HarvestError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("잘못된 URL: {}", err))
    }
}

/// 수집 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fatal_classification() {
        let missing = HarvestError::MalformedLink {
            instrument: "IE0031442068".to_string(),
            url: "http://en.boerse-frankfurt.de/etp/x".to_string(),
            link: "Frankfurt/Xetra".to_string(),
        };
        assert!(missing.is_record_fatal());

        let late = HarvestError::RecordClosed {
            instrument: "x".to_string(),
        };
        assert!(!late.is_record_fatal());
    }
}
