//! ETP 시세 이력 수집기.
//!
//! 종목마다 상세 페이지 → 이력 탐색 페이지 → (시세 이력 1건 + 날짜별 호가 N건)을
//! 순서대로 요청하고, 부분 결과를 하나의 레코드로 합쳐 Sink에 한 번만 전달합니다.
//! - `controller`: 종목별 수집 상태 머신
//! - `router`: 응답을 요청 단계 태그에 맞는 전이로 분배
//! - `fetch`: HTTP fetch 계층 (동시성 제한, 재시도, 딜레이)
//! - `sink`: 완성 레코드 출력 (JSON lines)
//! - `engine`: 종목별 태스크 실행과 fan-out/fan-in

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod pages;
pub mod router;
pub mod sink;
pub mod stats;

pub use config::CollectorConfig;
pub use controller::{CrawlState, InstrumentCrawl, Transition};
pub use engine::{HarvestReport, Harvester, InstrumentOutcome};
pub use error::{CollectorError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use router::ResponseRouter;
pub use sink::{JsonLinesSink, MemorySink, RecordSink};
pub use stats::HarvestStats;
