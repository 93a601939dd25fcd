//! 환경변수 기반 실행 설정 모듈.
//!
//! 사이트 프로파일은 `harvest_core::AppConfig`(TOML)에서, fetch/출력/데몬 같은
//! 실행 설정은 여기서 환경변수로 읽습니다.

use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 사이트 프로파일 TOML 경로
    pub config_path: PathBuf,
    /// fetch 계층 설정
    pub fetch: FetchConfig,
    /// 출력 설정
    pub output: OutputConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// fetch 계층 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 동시 요청 수 상한 (전체 종목 공유)
    pub max_concurrent: usize,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 요청 간 딜레이 (밀리초)
    pub request_delay_ms: u64,
    /// 네트워크 에러/5xx/429 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간격 (밀리초, 시도마다 선형 증가)
    pub retry_backoff_ms: u64,
    /// User-Agent 헤더
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            timeout_secs: 30,
            request_delay_ms: 250,
            max_retries: 2,
            retry_backoff_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// 출력 설정
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// JSON lines 피드 파일 경로
    pub feed_uri: PathBuf,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 수집 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = FetchConfig::default();
        let max_concurrent: usize = env_var_parse("FETCH_MAX_CONCURRENT", defaults.max_concurrent);
        if max_concurrent == 0 {
            return Err(crate::error::CollectorError::Config(
                "FETCH_MAX_CONCURRENT는 1 이상이어야 합니다".to_string(),
            ));
        }

        Ok(Self {
            config_path: std::env::var("HARVEST_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
            fetch: FetchConfig {
                max_concurrent,
                timeout_secs: env_var_parse("FETCH_TIMEOUT_SECS", defaults.timeout_secs),
                request_delay_ms: env_var_parse("FETCH_REQUEST_DELAY_MS", defaults.request_delay_ms),
                max_retries: env_var_parse("FETCH_MAX_RETRIES", defaults.max_retries),
                retry_backoff_ms: env_var_parse("FETCH_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
                user_agent: std::env::var("FETCH_USER_AGENT").unwrap_or(defaults.user_agent),
            },
            output: OutputConfig {
                feed_uri: std::env::var("FEED_URI")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("boersefrankfurt.jsonlines")),
            },
            daemon: DaemonConfig {
                interval_minutes: env_var_parse("DAEMON_INTERVAL_MINUTES", 24 * 60),
            },
        })
    }
}

impl FetchConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 요청 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// n번째 재시도 전 대기 시간
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl DaemonConfig {
    /// 수집 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
