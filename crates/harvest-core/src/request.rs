//! 요청/응답 모델.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(0);

/// 종목 키 (시드 상세 페이지 URL + 수집 세대).
///
/// 요청이 어느 레코드에 속하는지 조회하기 위한 키일 뿐, 레코드를 소유하지 않습니다.
/// 같은 시드를 동시에 두 번 수집해도 `new`마다 세대가 달라 서로 구분됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    seed: String,
    generation: u64,
}

impl InstrumentKey {
    /// 새 세대의 키를 발급합니다.
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed: seed_url.into(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// 시드 URL
    pub fn as_str(&self) -> &str {
        &self.seed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.seed)
    }
}

/// 레코드 내 요청 ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// HTTP 메서드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// 조회
    Get,
    /// 폼 전송
    Post,
}

/// 요청을 만든 Controller 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// 시드 상세 페이지
    Detail,
    /// 이력 탐색 페이지
    History,
    /// 일별 시세 이력
    PriceHistory,
    /// 날짜별 호가 이력
    BidAsk,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detail => write!(f, "detail"),
            Self::History => write!(f, "history"),
            Self::PriceHistory => write!(f, "price_history"),
            Self::BidAsk => write!(f, "bid_ask"),
        }
    }
}

/// 단일 fetch 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub url: String,
    pub method: Method,
    /// 순서가 유지되는 폼 필드
    pub form: Option<Vec<(String, String)>>,
    pub stage: Stage,
    pub owner: InstrumentKey,
}

impl Request {
    /// GET 요청 생성.
    pub fn get(id: RequestId, url: impl Into<String>, stage: Stage, owner: InstrumentKey) -> Self {
        Self {
            id,
            url: url.into(),
            method: Method::Get,
            form: None,
            stage,
            owner,
        }
    }

    /// POST 요청 생성.
    pub fn post(
        id: RequestId,
        url: impl Into<String>,
        form: Option<Vec<(String, String)>>,
        stage: Stage,
        owner: InstrumentKey,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            method: Method::Post,
            form,
            stage,
            owner,
        }
    }

    /// 폼 필드 값 조회 (첫 번째 일치).
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 완료된 fetch 응답.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
    /// 응답을 만든 원 요청
    pub request: Request,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>, request: Request) -> Self {
        Self {
            status,
            body: body.into(),
            request,
        }
    }

    /// 2xx 여부.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
