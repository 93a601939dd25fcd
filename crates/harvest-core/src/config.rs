//! 설정 관리.
//!
//! 사이트 프로파일(URL, 허용 도메인, 셀렉터, 이력 구간)과 시드 목록을 정의합니다.
//! 파일(`config/default.toml`)에서 읽고 `HARVEST__` 환경 변수로 덮어씁니다.
//! Controller는 전역 상태 대신 컴파일된 `SiteProfile`을 생성 시점에 받습니다.

use crate::error::{HarvestError, Result};
use crate::markup::compile;
use chrono::NaiveDate;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// 사이트 설정
    #[serde(default)]
    pub site: SiteConfig,
    /// 시드 상세 페이지 URL 목록
    #[serde(default = "default_seeds")]
    pub seeds: Vec<String>,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            seeds: default_seeds(),
            logging: LoggingConfig::default(),
        }
    }
}

/// 사이트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// 사이트 기본 URL
    pub base_url: String,
    /// 허용 도메인 (비어 있으면 제한 없음)
    pub allowed_domains: Vec<String>,
    /// 이력 페이지에서 찾을 거래소 앵커 키워드
    pub venue_keywords: Vec<String>,
    /// 상세 페이지 링크의 종목 경로 접두사
    pub instrument_prefix: String,
    /// 시세 이력 엔드포인트 경로
    pub price_history_path: String,
    /// 호가 이력 엔드포인트 경로
    pub bid_ask_path: String,
    /// 시세 이력 구간 시작일 (YYYY-MM-DD)
    pub history_start: String,
    /// 셀렉터
    pub selectors: SelectorConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://en.boerse-frankfurt.de".to_string(),
            allowed_domains: vec!["en.boerse-frankfurt.de".to_string()],
            venue_keywords: vec!["Frankfurt".to_string(), "Xetra".to_string()],
            instrument_prefix: "/etp/".to_string(),
            price_history_path: "/Ajax/ETPController_HistoricPriceList".to_string(),
            bid_ask_path: "/ajax/ETPController_HistoricBidAskPriceList".to_string(),
            history_start: "2014-01-01".to_string(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS 셀렉터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub headline: String,
    pub subline_label: String,
    pub subline: String,
    pub section_heading: String,
    /// 섹션 컨테이너의 class 이름
    pub box_class: String,
    pub section_cell: String,
    pub history_link: String,
    pub venue_anchor: String,
    pub date_control: String,
    pub price_header: String,
    pub price_rows: String,
    pub bid_ask_header: String,
    pub bid_ask_rows: String,
    pub row_cell: String,
    pub no_results: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            headline: ".stock-headline".to_string(),
            subline_label: ".stock-subline h1".to_string(),
            subline: ".stock-subline".to_string(),
            section_heading: "h2".to_string(),
            box_class: "box".to_string(),
            section_cell: "td".to_string(),
            history_link: r#"[name="History"]"#.to_string(),
            venue_anchor: "a".to_string(),
            date_control: r#"[name="date"]"#.to_string(),
            price_header: ".table th".to_string(),
            price_rows: "tbody tr".to_string(),
            bid_ask_header: "thead th".to_string(),
            bid_ask_rows: ".table tbody tr".to_string(),
            row_cell: "td".to_string(),
            no_results: "strong".to_string(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_seeds() -> Vec<String> {
    [
        "http://en.boerse-frankfurt.de/etp/iShares-S&P-500-UCITS-ETF-Dist-IE0031442068/FSE",
        "http://en.boerse-frankfurt.de/etp/Multi-Units-Lux----Lyxor-ETF-S&P-500-D-EUR-LU0496786574/FSE",
        "http://en.boerse-frankfurt.de/etp/Lyxor-EURO-STOXX-50-DR---UCITS-ETF-C-EUR-LU0908501215",
        "http://en.boerse-frankfurt.de/etp/Amundi-CAC-40-UCITS-ETF-DR-EUR-C-Acc-LU1681046931/FSE",
        "http://en.boerse-frankfurt.de/etp/Commerzbank-CCBI-RQFII-Money-Market-UCITS-ETF-A-RMB-GB00BVJF7G73/ITF",
        "http://en.boerse-frankfurt.de/etp/BNPP-Kupfer-ETC-DE000PB8C0P8/ETR",
        "http://en.boerse-frankfurt.de/etp/iShares-OMX-Stockholm-Capped-UCITS-ETF-IE00BD3RYZ16/ITF",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("HARVEST")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("seeds")
                    .with_list_parse_key("site.allowed_domains")
                    .with_list_parse_key("site.venue_keywords")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self> {
        Self::load("config/default.toml")
    }
}

/// 컴파일된 셀렉터 모음.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub headline: Selector,
    pub subline_label: Selector,
    pub subline: Selector,
    pub section_heading: Selector,
    pub box_class: String,
    pub section_cell: Selector,
    pub history_link: Selector,
    pub venue_anchor: Selector,
    pub date_control: Selector,
    pub price_header: Selector,
    pub price_rows: Selector,
    pub bid_ask_header: Selector,
    pub bid_ask_rows: Selector,
    pub row_cell: Selector,
    pub no_results: Selector,
}

/// 검증/컴파일된 사이트 프로파일.
///
/// 종목별 Controller가 `Arc`로 공유합니다.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub base_url: Url,
    pub allowed_domains: Vec<String>,
    pub venue_keywords: Vec<String>,
    pub instrument_prefix: String,
    pub price_history_path: String,
    pub bid_ask_path: String,
    pub history_start: NaiveDate,
    pub selectors: Selectors,
}

impl SiteConfig {
    /// 설정을 검증하고 셀렉터를 컴파일합니다.
    pub fn compile(&self) -> Result<SiteProfile> {
        let base_url = Url::parse(&self.base_url)?;
        let history_start = NaiveDate::parse_from_str(&self.history_start, "%Y-%m-%d")
            .map_err(|e| {
                HarvestError::Config(format!("history_start `{}`: {}", self.history_start, e))
            })?;

        if self.venue_keywords.is_empty() {
            return Err(HarvestError::Config(
                "venue_keywords가 비어 있습니다".to_string(),
            ));
        }

        let s = &self.selectors;
        let selectors = Selectors {
            headline: compile(&s.headline)?,
            subline_label: compile(&s.subline_label)?,
            subline: compile(&s.subline)?,
            section_heading: compile(&s.section_heading)?,
            box_class: s.box_class.clone(),
            section_cell: compile(&s.section_cell)?,
            history_link: compile(&s.history_link)?,
            venue_anchor: compile(&s.venue_anchor)?,
            date_control: compile(&s.date_control)?,
            price_header: compile(&s.price_header)?,
            price_rows: compile(&s.price_rows)?,
            bid_ask_header: compile(&s.bid_ask_header)?,
            bid_ask_rows: compile(&s.bid_ask_rows)?,
            row_cell: compile(&s.row_cell)?,
            no_results: compile(&s.no_results)?,
        };

        Ok(SiteProfile {
            base_url,
            allowed_domains: self.allowed_domains.clone(),
            venue_keywords: self.venue_keywords.clone(),
            instrument_prefix: self.instrument_prefix.clone(),
            price_history_path: self.price_history_path.clone(),
            bid_ask_path: self.bid_ask_path.clone(),
            history_start,
            selectors,
        })
    }
}

impl SiteProfile {
    /// URL이 허용 도메인에 속하는지 확인합니다.
    ///
    /// 하위 도메인도 허용합니다. 허용 목록이 비어 있으면 항상 true.
    pub fn is_allowed(&self, url: &Url) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_domains.iter().any(|domain| {
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// 기본 URL에 경로를 붙입니다.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_site_compiles() {
        let profile = SiteConfig::default().compile().unwrap();
        assert_eq!(
            profile.history_start,
            NaiveDate::from_ymd_opt(2014, 1, 1).unwrap()
        );
        assert_eq!(
            profile.endpoint("/ajax/x"),
            "http://en.boerse-frankfurt.de/ajax/x"
        );
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut site = SiteConfig::default();
        site.selectors.price_rows = "tbody >> tr[".to_string();
        assert!(matches!(site.compile(), Err(HarvestError::Selector(_))));
    }

    #[test]
    fn test_invalid_history_start_rejected() {
        let site = SiteConfig {
            history_start: "1.1.2014".to_string(),
            ..Default::default()
        };
        assert!(matches!(site.compile(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_allowed_domains() {
        let profile = SiteConfig::default().compile().unwrap();
        let inside = Url::parse("http://en.boerse-frankfurt.de/etp/x").unwrap();
        let outside = Url::parse("http://example.com/etp/x").unwrap();
        assert!(profile.is_allowed(&inside));
        assert!(!profile.is_allowed(&outside));

        let open = SiteConfig {
            allowed_domains: Vec::new(),
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(open.is_allowed(&outside));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.seeds.len(), 7);
        assert_eq!(config.site.venue_keywords, vec!["Frankfurt", "Xetra"]);
        assert_eq!(config.logging.level, "info");
    }
}
