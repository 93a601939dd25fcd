//! 응답 분배기.
//!
//! 응답의 `owner` 키로 종목 수집을 찾고, 요청 단계 태그에 맞는 전이를 호출합니다.

use crate::controller::{InstrumentCrawl, Transition};
use harvest_core::{HarvestError, InstrumentKey, Response, Result, Stage};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{trace, warn};

/// 진행 중인 종목 수집 레지스트리.
#[derive(Debug, Default)]
pub struct ResponseRouter {
    crawls: RwLock<HashMap<InstrumentKey, Arc<InstrumentCrawl>>>,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집을 등록합니다. 같은 키가 있으면 교체됩니다.
    pub fn register(&self, crawl: Arc<InstrumentCrawl>) {
        self.write().insert(crawl.key().clone(), crawl);
    }

    /// 수집을 등록 해제합니다.
    pub fn remove(&self, key: &InstrumentKey) -> Option<Arc<InstrumentCrawl>> {
        self.write().remove(key)
    }

    pub fn get(&self, key: &InstrumentKey) -> Option<Arc<InstrumentCrawl>> {
        self.read().get(key).cloned()
    }

    /// 등록된 수집 수
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 응답을 해당 종목의 전이로 분배합니다.
    ///
    /// 레지스트리에 없는 종목의 응답은 이미 종료된 것으로 보고 `RecordClosed`.
    pub fn route(&self, response: &Response) -> Result<Transition> {
        let owner = &response.request.owner;
        let Some(crawl) = self.get(owner) else {
            return Err(HarvestError::RecordClosed {
                instrument: owner.to_string(),
            });
        };

        trace!(
            instrument = %owner,
            stage = %response.request.stage,
            request = %response.request.id,
            "응답 분배"
        );

        match response.request.stage {
            Stage::Detail => crawl.on_detail(response),
            Stage::History => crawl.on_history(response),
            Stage::PriceHistory => crawl.on_price_history(response),
            Stage::BidAsk => crawl.on_bid_ask(response),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<InstrumentKey, Arc<InstrumentCrawl>>> {
        match self.crawls.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("라우터 RwLock poisoned (read), 복구 진행");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<InstrumentKey, Arc<InstrumentCrawl>>> {
        match self.crawls.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("라우터 RwLock poisoned (write), 복구 진행");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{Request, RequestId, SiteConfig};

    const SEED: &str = "http://en.boerse-frankfurt.de/etp/Lyxor-ETF-LU0908501215";

    #[test]
    fn test_route_dispatches_on_stage() {
        let site = Arc::new(SiteConfig::default().compile().unwrap());
        let crawl = Arc::new(InstrumentCrawl::new(SEED, site));
        let router = ResponseRouter::new();
        router.register(crawl.clone());
        assert_eq!(router.len(), 1);

        let seed = crawl.seed_request().unwrap();
        let body = r#"<a name="History" href="/etp/history/LU0908501215">History</a>"#;
        let transition = router.route(&Response::new(200, body, seed)).unwrap();

        match transition {
            Transition::Issue(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].stage, Stage::History);
            }
            other => panic!("expected Issue, got {:?}", other),
        }
    }

    #[test]
    fn test_same_seed_crawls_are_routed_separately() {
        let site = Arc::new(SiteConfig::default().compile().unwrap());
        let first = Arc::new(InstrumentCrawl::new(SEED, site.clone()));
        let second = Arc::new(InstrumentCrawl::new(SEED, site));
        let router = ResponseRouter::new();
        router.register(first.clone());
        router.register(second.clone());
        assert_eq!(router.len(), 2);

        let first_seed = first.seed_request().unwrap();
        let second_seed = second.seed_request().unwrap();

        // 먼저 끝난 수집을 해제해도 같은 시드의 다른 수집은 계속 분배됨
        router.remove(first.key());
        assert!(router.get(second.key()).is_some());

        let body = r#"<a name="History" href="/etp/history/LU0908501215">History</a>"#;
        let late = router
            .route(&Response::new(200, body, first_seed))
            .unwrap_err();
        assert!(matches!(late, HarvestError::RecordClosed { .. }));
        assert!(matches!(
            router.route(&Response::new(200, body, second_seed)).unwrap(),
            Transition::Issue(_)
        ));
    }

    #[test]
    fn test_route_unregistered_owner_is_closed() {
        let router = ResponseRouter::new();
        let request = Request::get(
            RequestId(0),
            SEED,
            Stage::Detail,
            InstrumentKey::new(SEED),
        );

        let err = router.route(&Response::new(200, "", request)).unwrap_err();
        assert!(matches!(err, HarvestError::RecordClosed { .. }));
        assert!(router.is_empty());
    }
}
