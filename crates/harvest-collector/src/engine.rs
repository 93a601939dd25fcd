//! 수집 실행 엔진.
//!
//! 종목마다 독립 태스크를 띄우고, 각 태스크는 상세 → 이력 탐색을 순서대로 처리한 뒤
//! 하위 요청을 동시에 발행합니다. 대기 집합을 비우는 마지막 병합만 레코드를 내보내므로
//! Sink 전달은 종목당 최대 한 번입니다.

use crate::controller::{InstrumentCrawl, Transition};
use crate::fetch::Fetcher;
use crate::router::ResponseRouter;
use crate::sink::RecordSink;
use crate::stats::HarvestStats;
use harvest_core::{
    HarvestError, Identity, InstrumentKey, Record, Request, Result, SiteProfile,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// 종목 1건의 최종 결과. 완료와 실패 중 정확히 하나입니다.
#[derive(Debug)]
pub enum InstrumentOutcome {
    /// Sink로 전달됨
    Completed {
        key: InstrumentKey,
        isin: String,
        tally: HarvestStats,
    },
    /// 실패로 중단됨 (Sink로 전달되지 않음)
    Failed {
        key: InstrumentKey,
        identity: Identity,
        sub_requests: usize,
        error: HarvestError,
    },
}

impl InstrumentOutcome {
    pub fn key(&self) -> &InstrumentKey {
        match self {
            Self::Completed { key, .. } | Self::Failed { key, .. } => key,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// 실행 결과 보고서.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub stats: HarvestStats,
    pub outcomes: Vec<InstrumentOutcome>,
}

/// 수집 실행기.
#[derive(Clone)]
pub struct Harvester {
    site: Arc<SiteProfile>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn RecordSink>,
    router: Arc<ResponseRouter>,
}

impl Harvester {
    pub fn new(
        site: Arc<SiteProfile>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            site,
            fetcher,
            sink,
            router: Arc::new(ResponseRouter::new()),
        }
    }

    /// 진행 중인 종목 레지스트리
    pub fn router(&self) -> &ResponseRouter {
        &self.router
    }

    /// 시드 목록 전체를 수집합니다.
    ///
    /// 반환된 future를 drop하면 진행 중인 종목 태스크는 모두 중단되고 버려집니다.
    pub async fn run(&self, seeds: &[String]) -> HarvestReport {
        let start = Instant::now();
        let mut report = HarvestReport::default();

        let mut seen = HashSet::new();
        let mut tasks = JoinSet::new();
        for seed in seeds {
            if !seen.insert(seed.as_str()) {
                tracing::warn!(seed = %seed, "중복 시드 건너뜀");
                continue;
            }
            report.stats.total += 1;
            let this = self.clone();
            let seed = seed.clone();
            tasks.spawn(async move { this.harvest_instrument(seed).await });
        }

        tracing::info!(instruments = report.stats.total, "수집 시작");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome {
                        InstrumentOutcome::Completed { tally, .. } => report.stats.absorb(tally),
                        InstrumentOutcome::Failed { sub_requests, .. } => {
                            report.stats.failed += 1;
                            report.stats.sub_requests += sub_requests;
                        }
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    report.stats.failed += 1;
                    tracing::error!(error = %e, "종목 태스크 비정상 종료");
                }
            }
        }

        report.stats.elapsed = start.elapsed();
        report
    }

    /// 종목 하나를 끝까지 수집합니다.
    pub async fn harvest_instrument(&self, seed: String) -> InstrumentOutcome {
        let crawl = Arc::new(InstrumentCrawl::new(seed, self.site.clone()));
        let key = crawl.key().clone();
        self.router.register(crawl.clone());

        let mut sub_requests = 0;
        let result = self.drive(&crawl, &mut sub_requests).await;
        self.router.remove(&key);

        let result = match result {
            Ok(record) => {
                let mut tally = HarvestStats::new();
                tally.sub_requests = sub_requests;
                tally.record_completed(&record);
                let isin = record.identity.isin.clone();
                self.sink.accept(*record).await.map(|()| (isin, tally))
            }
            Err(err) => Err(err),
        };

        match result {
            Ok((isin, tally)) => InstrumentOutcome::Completed { key, isin, tally },
            Err(error) => {
                crawl.fail(&error);
                let identity = crawl.identity();
                tracing::error!(
                    instrument = %key,
                    name = %identity.name,
                    isin = %identity.isin,
                    error = %error,
                    "종목 수집 실패"
                );
                InstrumentOutcome::Failed {
                    key,
                    identity,
                    sub_requests,
                    error,
                }
            }
        }
    }

    async fn drive(
        &self,
        crawl: &Arc<InstrumentCrawl>,
        sub_requests: &mut usize,
    ) -> Result<Box<Record>> {
        // 상세 → 이력 탐색은 순차
        let seed = crawl.seed_request()?;
        let history = expect_issue(crawl, self.exchange(seed).await?)?;
        let mut discovered = Vec::new();
        for request in history {
            discovered.extend(expect_issue(crawl, self.exchange(request).await?)?);
        }
        *sub_requests = discovered.len();

        // 하위 요청은 동시에 발행하고 도착 순서대로 병합
        let mut tasks = JoinSet::new();
        for request in discovered {
            let this = self.clone();
            tasks.spawn(async move { this.exchange(request).await });
        }

        while let Some(joined) = tasks.join_next().await {
            let transition = joined.map_err(|e| HarvestError::InvalidState {
                instrument: crawl.key().to_string(),
                detail: format!("하위 요청 태스크 비정상 종료: {}", e),
            })?;

            match transition {
                Ok(Transition::Complete(record)) => return Ok(record),
                Ok(Transition::Pending { remaining }) => {
                    tracing::trace!(instrument = %crawl.key(), remaining, "병합 완료");
                }
                Ok(Transition::Issue(extra)) => {
                    tasks.abort_all();
                    return Err(HarvestError::InvalidState {
                        instrument: crawl.key().to_string(),
                        detail: format!("병합 단계에서 추가 요청 {}건", extra.len()),
                    });
                }
                Err(err) if !err.is_record_fatal() => {
                    tracing::warn!(instrument = %crawl.key(), error = %err, "늦은 응답 무시");
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }

        Err(HarvestError::InvalidState {
            instrument: crawl.key().to_string(),
            detail: format!("대기 요청 {}건이 남은 채 종료", crawl.pending_count()),
        })
    }

    /// 요청 1건을 발행하고 응답을 전이로 분배합니다.
    async fn exchange(&self, request: Request) -> Result<Transition> {
        let response = self.fetcher.issue(request).await?;
        if !response.is_success() {
            return Err(HarvestError::FetchFailure {
                url: response.request.url,
                reason: format!("HTTP {}", response.status),
            });
        }
        self.router.route(&response)
    }
}

fn expect_issue(crawl: &InstrumentCrawl, transition: Transition) -> Result<Vec<Request>> {
    match transition {
        Transition::Issue(requests) => Ok(requests),
        other => Err(HarvestError::InvalidState {
            instrument: crawl.key().to_string(),
            detail: format!("요청 발행 전이가 필요함: {:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use harvest_core::{Response, SiteConfig, Stage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SEED: &str = "http://en.boerse-frankfurt.de/etp/db-x-trackers-DBLCI-OY-BALANCED-UCITS-ETF-1C-LU0292106167";

    /// 단계별 고정 응답 + 도착 순서를 뒤섞는 지연.
    struct ScriptedFetcher {
        dates: Vec<&'static str>,
        history_has_anchor: bool,
        issued: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(dates: Vec<&'static str>) -> Self {
            Self {
                dates,
                history_has_anchor: true,
                issued: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn issue(&self, request: Request) -> Result<Response> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            let body = match request.stage {
                Stage::Detail => r#"<h1 class="stock-headline">DBLCI</h1>
                    <a name="History" href="/etp/history/LU0292106167">History</a>"#
                    .to_string(),
                Stage::History if self.history_has_anchor => {
                    let options: String = self
                        .dates
                        .iter()
                        .map(|d| format!(r#"<option value="{d}">{d}</option>"#))
                        .collect();
                    format!(
                        r#"<a href="/etp/db-x-LU0292106167/ETR"><span>Xetra</span></a>
                           <select name="date">{options}</select>"#
                    )
                }
                Stage::History => "<p>no venues</p>".to_string(),
                Stage::PriceHistory => r#"<table class="table"><thead><tr><th>Date</th></tr></thead>
                    <tbody><tr><td>2020-01-01</td></tr></tbody></table>"#
                    .to_string(),
                Stage::BidAsk => "<strong>No results</strong>".to_string(),
            };
            // 나중에 발행된 요청이 먼저 끝나도록
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n as u64 * 5))).await;
            Ok(Response::new(200, body, request))
        }
    }

    fn harvester(fetcher: ScriptedFetcher, sink: Arc<MemorySink>) -> Harvester {
        let site = Arc::new(SiteConfig::default().compile().unwrap());
        Harvester::new(site, Arc::new(fetcher), sink)
    }

    #[tokio::test]
    async fn test_record_forwarded_once_after_all_merges() {
        let sink = Arc::new(MemorySink::new());
        let dates = vec!["13.10.2026", "14.10.2026", "15.10.2026"];
        let engine = harvester(ScriptedFetcher::new(dates.clone()), sink.clone());

        let report = engine.run(&[SEED.to_string()]).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity.isin, "LU0292106167");
        assert_eq!(records[0].bid_ask_history.len(), dates.len());
        assert_eq!(records[0].price_history.len(), 1);

        assert_eq!(report.stats.completed, 1);
        assert_eq!(report.stats.sub_requests, dates.len() + 1);
        assert_eq!(report.stats.empty_days, dates.len());
        assert!(engine.router().is_empty());
    }

    #[tokio::test]
    async fn test_missing_anchor_reports_failure_without_record() {
        let sink = Arc::new(MemorySink::new());
        let mut fetcher = ScriptedFetcher::new(vec![]);
        fetcher.history_has_anchor = false;
        let engine = harvester(fetcher, sink.clone());

        let report = engine.run(&[SEED.to_string()]).await;

        assert!(sink.records().is_empty());
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.outcomes.len(), 1);
        match &report.outcomes[0] {
            InstrumentOutcome::Failed {
                identity, error, ..
            } => {
                assert!(matches!(error, HarvestError::MalformedLink { .. }));
                assert_eq!(identity.name, "DBLCI");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_seeds_run_once() {
        let sink = Arc::new(MemorySink::new());
        let engine = harvester(ScriptedFetcher::new(vec![]), sink.clone());

        let report = engine.run(&[SEED.to_string(), SEED.to_string()]).await;

        assert_eq!(report.stats.total, 1);
        assert_eq!(sink.records().len(), 1);
        assert!(report.outcomes.iter().all(InstrumentOutcome::is_completed));
    }

    #[tokio::test]
    async fn test_overlapping_runs_of_same_seed_both_complete() {
        let sink = Arc::new(MemorySink::new());
        let dates = vec!["14.10.2026", "15.10.2026"];
        let engine = harvester(ScriptedFetcher::new(dates), sink.clone());
        let other = engine.clone();

        let seeds = [SEED.to_string()];
        let (a, b) = tokio::join!(engine.run(&seeds), other.run(&seeds));

        assert_eq!(a.stats.completed, 1, "outcomes: {:?}", a.outcomes);
        assert_eq!(b.stats.completed, 1, "outcomes: {:?}", b.outcomes);
        assert_ne!(a.outcomes[0].key(), b.outcomes[0].key());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.bid_ask_history.len() == 2));
        assert!(engine.router().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_merges_on_worker_threads_forward_one_record() {
        let sink = Arc::new(MemorySink::new());
        let dates = vec![
            "06.10.2026", "07.10.2026", "08.10.2026", "09.10.2026", "12.10.2026",
            "13.10.2026", "14.10.2026", "15.10.2026",
        ];
        let engine = harvester(ScriptedFetcher::new(dates.clone()), sink.clone());

        let report = engine.run(&[SEED.to_string()]).await;

        assert_eq!(report.stats.completed, 1, "outcomes: {:?}", report.outcomes);
        assert_eq!(report.stats.sub_requests, dates.len() + 1);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        let days: Vec<&str> = records[0].bid_ask_history.keys().map(String::as_str).collect();
        let mut expected = dates.clone();
        expected.sort();
        assert_eq!(days, expected);
    }
}
