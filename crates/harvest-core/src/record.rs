//! 수집 레코드 모델.
//!
//! 한 종목의 최종 결과물입니다. Sink는 완성된 `Record`만 받으며,
//! 대기 중인 요청 목록 같은 제어 데이터는 여기에 포함되지 않습니다.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 정적 섹션 (라벨 -> 값). 페이지에 나온 순서를 유지합니다.
pub type Section = IndexMap<String, String>;

/// 테이블 한 행 (헤더 -> 셀 값). 헤더 순서를 유지합니다.
pub type Row = IndexMap<String, String>;

/// 상세 페이지의 정적 섹션 이름.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionName {
    Benchmark,
    TradingParameters,
    Fees,
    Liquidity,
    Issuer,
    MasterData,
    Dates,
    PriceInformation,
}

impl SectionName {
    /// 모든 섹션 (페이지 배치 순서).
    pub const ALL: [SectionName; 8] = [
        Self::Benchmark,
        Self::TradingParameters,
        Self::Fees,
        Self::Liquidity,
        Self::Issuer,
        Self::MasterData,
        Self::Dates,
        Self::PriceInformation,
    ];

    /// 페이지에 표시되는 섹션 제목.
    pub fn heading(&self) -> &'static str {
        match self {
            Self::Benchmark => "Benchmark",
            Self::TradingParameters => "Trading Parameters",
            Self::Fees => "Fees",
            Self::Liquidity => "Liquidity",
            Self::Issuer => "Issuer",
            Self::MasterData => "Master Data",
            Self::Dates => "Dates",
            Self::PriceInformation => "Price Information",
        }
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.heading())
    }
}

/// 부제 (라벨과 정규화된 전체 텍스트).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subline {
    pub label: String,
    pub value: String,
}

/// 종목 식별 정보.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// 종목명
    pub name: String,
    /// 부제
    pub subline: Subline,
    /// ISIN (대문자)
    pub isin: String,
    /// 거래소 종목 코드 (`<slug>-<ISIN>/<거래소>`)
    pub instrument_code: String,
}

/// 정적 섹션 모음.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sections {
    pub benchmark: Section,
    pub trading_parameters: Section,
    pub fees: Section,
    pub liquidity: Section,
    pub issuer: Section,
    pub master_data: Section,
    pub dates: Section,
    pub price_information: Section,
}

impl Sections {
    /// 이름으로 섹션 조회.
    pub fn get(&self, name: SectionName) -> &Section {
        match name {
            SectionName::Benchmark => &self.benchmark,
            SectionName::TradingParameters => &self.trading_parameters,
            SectionName::Fees => &self.fees,
            SectionName::Liquidity => &self.liquidity,
            SectionName::Issuer => &self.issuer,
            SectionName::MasterData => &self.master_data,
            SectionName::Dates => &self.dates,
            SectionName::PriceInformation => &self.price_information,
        }
    }

    /// 이름으로 섹션 설정.
    pub fn set(&mut self, name: SectionName, section: Section) {
        let slot = match name {
            SectionName::Benchmark => &mut self.benchmark,
            SectionName::TradingParameters => &mut self.trading_parameters,
            SectionName::Fees => &mut self.fees,
            SectionName::Liquidity => &mut self.liquidity,
            SectionName::Issuer => &mut self.issuer,
            SectionName::MasterData => &mut self.master_data,
            SectionName::Dates => &mut self.dates,
            SectionName::PriceInformation => &mut self.price_information,
        };
        *slot = section;
    }
}

/// 한 종목의 완성된 수집 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identity: Identity,
    pub sections: Sections,
    /// 일별 시세 이력
    pub price_history: Vec<Row>,
    /// 날짜별 호가 이력
    pub bid_ask_history: BTreeMap<String, Vec<Row>>,
}
