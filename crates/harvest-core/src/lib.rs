//! ETP 시세 수집기 핵심 모듈.
//!
//! 이 crate는 다음을 제공합니다:
//! - 텍스트 정규화 (공백/NBSP 정리)
//! - 마크업 조회 어댑터 (scalar/list 구분 결과)
//! - 테이블 추출기 (key-value 섹션, 행 목록)
//! - 수집 레코드/요청 도메인 모델
//! - 사이트 프로파일 설정 및 로깅 초기화

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod markup;
pub mod normalize;
pub mod record;
pub mod request;

pub use config::{AppConfig, SiteConfig, SiteProfile};
pub use error::{HarvestError, Result};
pub use extract::{extract_rows, extract_section, pair_cells, CellMode};
pub use markup::{Extracted, Page};
pub use normalize::{normalize, normalize_text, Normalized};
pub use record::{Identity, Record, Row, Section, SectionName, Sections, Subline};
pub use request::{InstrumentKey, Method, Request, RequestId, Response, Stage};
