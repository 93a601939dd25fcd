//! 종목별 수집 상태 머신.
//!
//! ```text
//! Seed ──on_detail──▶ Detail ──on_history──▶ Draining ──(pending 비움)──▶ Complete
//!   │                   │                       │
//!   └───────────────────┴──────── fail ─────────┴──────────────────────▶ Failed
//! ```
//!
//! 식별 정보, 결과 누적, 대기 요청 집합을 분리해 보관합니다. 대기 요청은
//! Sink로 전달되는 `Record`에 포함되지 않으며, 탐색 단계 이후로는 줄어들기만 합니다.
//! HTML 파싱은 잠금 밖에서 끝내고, 병합과 대기 집합 감소만 잠금 안에서 수행합니다.

use crate::pages::{self, parse_instrument_code, BidAskPage, DetailPage};
use chrono::{Datelike, Local, NaiveDate};
use harvest_core::{
    HarvestError, Identity, InstrumentKey, Record, Request, RequestId, Response, Result, Row,
    Sections, SiteProfile, Stage,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

/// 호가 이력 폼 필드 이름.
const BID_ASK_FORM_FIELD: &str = "d";

/// 수집 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    /// 시드 요청 발행 전/응답 대기
    Seed,
    /// 상세 페이지 처리 완료, 이력 탐색 응답 대기
    Detail,
    /// 하위 요청 응답 병합 중
    Draining,
    /// 레코드 전달 완료
    Complete,
    /// 실패로 중단
    Failed,
}

impl CrawlState {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::Detail => write!(f, "detail"),
            Self::Draining => write!(f, "draining"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 응답 처리 결과.
#[derive(Debug)]
pub enum Transition {
    /// 새로 발행할 요청
    Issue(Vec<Request>),
    /// 병합 완료, 아직 대기 중인 요청이 남음
    Pending { remaining: usize },
    /// 마지막 병합. 레코드는 이 전이로 단 한 번만 나옵니다.
    Complete(Box<Record>),
}

#[derive(Debug, Default)]
struct Results {
    sections: Sections,
    price_history: Option<Vec<Row>>,
    bid_ask_history: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug)]
struct CrawlInner {
    state: CrawlState,
    identity: Identity,
    results: Results,
    pending: HashMap<RequestId, Request>,
    /// Seed/Detail 단계에서 응답을 기다리는 단일 요청
    awaiting: Option<RequestId>,
    next_id: u32,
}

impl CrawlInner {
    fn allocate_id(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// 한 종목의 수집 진행 상황.
pub struct InstrumentCrawl {
    key: InstrumentKey,
    site: Arc<SiteProfile>,
    inner: Mutex<CrawlInner>,
}

impl fmt::Debug for InstrumentCrawl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentCrawl")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

impl InstrumentCrawl {
    /// 시드 URL로 새 수집 생성
    pub fn new(seed_url: impl Into<String>, site: Arc<SiteProfile>) -> Self {
        Self {
            key: InstrumentKey::new(seed_url),
            site,
            inner: Mutex::new(CrawlInner {
                state: CrawlState::Seed,
                identity: Identity::default(),
                results: Results::default(),
                pending: HashMap::new(),
                awaiting: None,
                next_id: 0,
            }),
        }
    }

    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    pub fn state(&self) -> CrawlState {
        self.lock().state
    }

    /// 남은 대기 요청 수
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// 현재까지의 식별 정보 스냅샷
    pub fn identity(&self) -> Identity {
        self.lock().identity.clone()
    }

    /// 시드 상세 페이지 요청을 발행합니다.
    pub fn seed_request(&self) -> Result<Request> {
        let url = self.resolve(self.key.as_str(), None, "seed")?;
        let mut inner = self.lock();
        if inner.state != CrawlState::Seed || inner.awaiting.is_some() {
            return Err(self.invalid_state(inner.state, "시드 요청은 한 번만 발행"));
        }
        let id = inner.allocate_id();
        inner.awaiting = Some(id);
        Ok(Request::get(id, url, Stage::Detail, self.key.clone()))
    }

    /// Seed → Detail: 상세 페이지 처리 후 이력 탐색 요청 1건 발행.
    pub fn on_detail(&self, response: &Response) -> Result<Transition> {
        let detail = pages::parse_detail(&self.site, &response.body);
        self.apply_detail(response, detail)
    }

    fn apply_detail(&self, response: &Response, detail: DetailPage) -> Result<Transition> {
        let mut inner = self.lock();
        self.accept_awaited(&mut inner, CrawlState::Seed, response)?;

        let DetailPage {
            name,
            subline,
            sections,
            history_href,
        } = detail;

        inner.identity.name = name;
        inner.identity.subline = subline;
        inner.results.sections = sections;

        let Some(href) = history_href else {
            return Err(self.fail_locked(&mut inner, self.malformed(response, "History")));
        };
        let url = match self.resolve(&href, Some(&response.request.url), "History") {
            Ok(url) => url,
            Err(err) => return Err(self.fail_locked(&mut inner, err)),
        };

        let id = inner.allocate_id();
        inner.awaiting = Some(id);
        inner.state = CrawlState::Detail;

        debug!(instrument = %self.key, name = %inner.identity.name, "상세 페이지 처리 완료");
        Ok(Transition::Issue(vec![Request::get(
            id,
            url,
            Stage::History,
            self.key.clone(),
        )]))
    }

    /// Detail → Draining: 시세 이력 1건 + 날짜별 호가 요청 N건 발행.
    pub fn on_history(&self, response: &Response) -> Result<Transition> {
        self.on_history_at(response, Local::now().date_naive())
    }

    /// 기준일을 지정해 이력 탐색 응답을 처리합니다.
    pub fn on_history_at(&self, response: &Response, today: NaiveDate) -> Result<Transition> {
        let history = pages::parse_history(&self.site, &response.body);

        let mut inner = self.lock();
        self.accept_awaited(&mut inner, CrawlState::Detail, response)?;

        let code = history
            .venue_href
            .as_deref()
            .and_then(|href| parse_instrument_code(href, &self.site.instrument_prefix));
        let Some(code) = code else {
            return Err(self.fail_locked(&mut inner, self.malformed(response, "Frankfurt/Xetra")));
        };

        inner.identity.isin = code.isin.clone();
        inner.identity.instrument_code = code.code.clone();

        let price_url = format!(
            "{}/{}/{}_{}",
            self.site.endpoint(&self.site.price_history_path),
            code.code,
            window_start(self.site.history_start),
            today.format("%d.%m.%Y"),
        );
        let bid_ask_url = format!(
            "{}/{}",
            self.site.endpoint(&self.site.bid_ask_path),
            code.listing
        );

        let mut planned = Vec::with_capacity(history.dates.len() + 1);
        planned.push((price_url, None, Stage::PriceHistory));
        for date in &history.dates {
            let form = vec![(
                BID_ASK_FORM_FIELD.to_string(),
                format!("{date} 00:00-{date} 23:59"),
            )];
            planned.push((bid_ask_url.clone(), Some(form), Stage::BidAsk));
        }

        let mut requests = Vec::with_capacity(planned.len());
        for (url, form, stage) in planned {
            let url = match self.resolve(&url, None, "sub-request") {
                Ok(url) => url,
                Err(err) => return Err(self.fail_locked(&mut inner, err)),
            };
            let id = inner.allocate_id();
            requests.push(Request::post(id, url, form, stage, self.key.clone()));
        }

        inner.pending = requests
            .iter()
            .map(|request| (request.id, request.clone()))
            .collect();
        inner.state = CrawlState::Draining;

        info!(
            instrument = %self.key,
            isin = %code.isin,
            dates = history.dates.len(),
            pending = inner.pending.len(),
            "하위 요청 발행"
        );
        Ok(Transition::Issue(requests))
    }

    /// 시세 이력 병합 (단일 할당).
    pub fn on_price_history(&self, response: &Response) -> Result<Transition> {
        let rows = pages::parse_price_history(&self.site, &response.body);

        let mut inner = self.lock();
        self.take_pending(&mut inner, response)?;
        if inner.results.price_history.is_some() {
            warn!(instrument = %self.key, "시세 이력 중복 응답 무시");
        } else {
            inner.results.price_history = Some(rows);
        }
        Ok(self.finish_merge(&mut inner))
    }

    /// 호가 이력 병합. 날짜는 요청 폼의 `d` 필드에서 복원합니다.
    pub fn on_bid_ask(&self, response: &Response) -> Result<Transition> {
        let page = pages::parse_bid_ask(&self.site, &response.body);

        let mut inner = self.lock();
        let request = self.take_pending(&mut inner, response)?;
        let date = request
            .form_value(BID_ASK_FORM_FIELD)
            .and_then(|d| d.split(' ').next())
            .unwrap_or_default()
            .to_string();

        if page == BidAskPage::NoResults {
            debug!(instrument = %self.key, date = %date, "호가 이력 없음");
        }
        inner.results.bid_ask_history.insert(date, page.into_rows());
        Ok(self.finish_merge(&mut inner))
    }

    /// 비종료 상태의 수집을 실패 처리합니다.
    ///
    /// 상태가 바뀌었으면 true.
    pub fn fail(&self, err: &HarvestError) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        debug!(instrument = %self.key, state = %inner.state, error = %err, "수집 중단");
        inner.state = CrawlState::Failed;
        inner.pending.clear();
        inner.awaiting = None;
        true
    }

    // ==================== 내부 헬퍼 ====================

    fn lock(&self) -> MutexGuard<'_, CrawlInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(instrument = %self.key, "수집 상태 Mutex poisoned, 복구 진행");
                poisoned.into_inner()
            }
        }
    }

    /// Seed/Detail 단계의 단일 응답을 검증하고 대기 표시를 해제합니다.
    fn accept_awaited(
        &self,
        inner: &mut CrawlInner,
        expected: CrawlState,
        response: &Response,
    ) -> Result<()> {
        if inner.state.is_terminal() {
            return Err(self.closed());
        }
        if inner.state != expected {
            return Err(self.invalid_state(
                inner.state,
                &format!("{} 응답을 처리할 수 없음", response.request.stage),
            ));
        }
        if inner.awaiting != Some(response.request.id) {
            return Err(HarvestError::UnknownRequest {
                instrument: self.key.to_string(),
                request: response.request.id.0,
            });
        }
        inner.awaiting = None;
        Ok(())
    }

    /// Draining 단계 응답의 요청을 대기 집합에서 제거합니다.
    fn take_pending(&self, inner: &mut CrawlInner, response: &Response) -> Result<Request> {
        if inner.state.is_terminal() {
            return Err(self.closed());
        }
        if inner.state != CrawlState::Draining {
            return Err(self.invalid_state(
                inner.state,
                &format!("{} 응답을 처리할 수 없음", response.request.stage),
            ));
        }
        inner
            .pending
            .remove(&response.request.id)
            .ok_or_else(|| HarvestError::UnknownRequest {
                instrument: self.key.to_string(),
                request: response.request.id.0,
            })
    }

    /// 대기 집합이 비었으면 Complete로 전이하고 레코드를 내보냅니다.
    fn finish_merge(&self, inner: &mut CrawlInner) -> Transition {
        let remaining = inner.pending.len();
        if remaining > 0 {
            return Transition::Pending { remaining };
        }

        inner.state = CrawlState::Complete;
        let results = std::mem::take(&mut inner.results);
        let record = Record {
            identity: inner.identity.clone(),
            sections: results.sections,
            price_history: results.price_history.unwrap_or_default(),
            bid_ask_history: results.bid_ask_history,
        };
        info!(
            instrument = %self.key,
            isin = %record.identity.isin,
            days = record.bid_ask_history.len(),
            "레코드 완성"
        );
        Transition::Complete(Box::new(record))
    }

    /// URL을 해석하고 허용 도메인을 확인합니다.
    fn resolve(&self, href: &str, base: Option<&str>, link: &str) -> Result<String> {
        let parsed = match base {
            Some(base) => Url::parse(base).and_then(|b| b.join(href)),
            None => Url::parse(href),
        };
        let url = parsed.map_err(|_| HarvestError::MalformedLink {
            instrument: self.key.to_string(),
            url: base.unwrap_or(href).to_string(),
            link: link.to_string(),
        })?;

        if !self.site.is_allowed(&url) {
            return Err(HarvestError::OffsiteRequest {
                instrument: self.key.to_string(),
                url: url.to_string(),
            });
        }
        Ok(url.to_string())
    }

    fn fail_locked(&self, inner: &mut CrawlInner, err: HarvestError) -> HarvestError {
        inner.state = CrawlState::Failed;
        inner.pending.clear();
        inner.awaiting = None;
        err
    }

    fn malformed(&self, response: &Response, link: &str) -> HarvestError {
        HarvestError::MalformedLink {
            instrument: self.key.to_string(),
            url: response.request.url.clone(),
            link: link.to_string(),
        }
    }

    fn closed(&self) -> HarvestError {
        HarvestError::RecordClosed {
            instrument: self.key.to_string(),
        }
    }

    fn invalid_state(&self, state: CrawlState, detail: &str) -> HarvestError {
        HarvestError::InvalidState {
            instrument: self.key.to_string(),
            detail: format!("{} ({})", detail, state),
        }
    }
}

/// 조회 구간 시작일 ("1.1.2014" 형식, 0 채움 없음)
fn window_start(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.day(), date.month(), date.year())
}
