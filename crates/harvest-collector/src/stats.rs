//! 수집 통계 구조체.

use harvest_core::Record;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 실행 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestStats {
    /// 시도한 종목 수
    pub total: usize,
    /// Sink로 전달된 레코드 수
    pub completed: usize,
    /// 실패한 종목 수
    pub failed: usize,
    /// 발행된 하위 요청 수 (시세 + 호가)
    pub sub_requests: usize,
    /// 수집된 호가 이력 일수
    pub bid_ask_days: usize,
    /// 결과 없는 호가 일수
    pub empty_days: usize,
    /// 저장된 시세 행 수
    pub price_rows: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl HarvestStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 완성 레코드 반영
    pub fn record_completed(&mut self, record: &Record) {
        self.completed += 1;
        self.price_rows += record.price_history.len();
        self.bid_ask_days += record.bid_ask_history.len();
        self.empty_days += record
            .bid_ask_history
            .values()
            .filter(|rows| is_no_results(rows))
            .count();
    }

    /// 종목별 집계를 합산합니다 (`total`, `elapsed` 제외).
    pub fn absorb(&mut self, other: &HarvestStats) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.sub_requests += other.sub_requests;
        self.bid_ask_days += other.bid_ask_days;
        self.empty_days += other.empty_days;
        self.price_rows += other.price_rows;
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            completed = self.completed,
            failed = self.failed,
            sub_requests = self.sub_requests,
            bid_ask_days = self.bid_ask_days,
            empty_days = self.empty_days,
            price_rows = self.price_rows,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}

fn is_no_results(rows: &[harvest_core::Row]) -> bool {
    rows.len() == 1
        && rows[0].len() == 1
        && rows[0].get(crate::pages::NO_RESULTS_KEY).map(String::as_str)
            == Some(crate::pages::NO_RESULTS_VALUE)
}
