//! 페이지별 파서.
//!
//! 응답 본문을 파싱해 소유 타입으로 돌려줍니다. `Html`은 `Send`가 아니므로
//! 파싱은 여기서 끝내고, Controller는 결과 값만 잠금 안에서 병합합니다.
//!
//! ## 페이지
//! - 상세 페이지: 종목명, 부제, 정적 섹션 8개, `History` 링크
//! - 이력 탐색 페이지: Frankfurt/Xetra 앵커, 날짜 선택 컨트롤
//! - 시세 이력 (ajax): `.table` 헤더 + `tbody` 행
//! - 호가 이력 (ajax): `thead` 헤더 + 행, 또는 "No results"

use harvest_core::extract::CellMode;
use harvest_core::markup::deep_text;
use harvest_core::normalize::normalize_all;
use harvest_core::{
    extract_rows, extract_section, normalize, Page, Row, SectionName, Sections, SiteProfile,
    Subline,
};
use scraper::ElementRef;
use std::collections::HashSet;

/// "No results" 센티널 행의 키/값.
pub const NO_RESULTS_KEY: &str = "Time";
pub const NO_RESULTS_VALUE: &str = "No results";

/// 상세 페이지 파싱 결과.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub name: String,
    pub subline: Subline,
    pub sections: Sections,
    /// `History` 링크 (상대 경로일 수 있음)
    pub history_href: Option<String>,
}

/// 이력 탐색 페이지 파싱 결과.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// 첫 번째 거래소 앵커의 href
    pub venue_href: Option<String>,
    /// 날짜 선택 컨트롤의 값 (중복 제거, 순서 유지)
    pub dates: Vec<String>,
}

/// 호가 이력 페이지 파싱 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidAskPage {
    /// 해당 날짜 거래 없음
    NoResults,
    Rows(Vec<Row>),
}

impl BidAskPage {
    /// 저장할 행 목록. 결과 없음은 `[{"Time": "No results"}]`입니다.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::NoResults => {
                let mut row = Row::new();
                row.insert(NO_RESULTS_KEY.to_string(), NO_RESULTS_VALUE.to_string());
                vec![row]
            }
            Self::Rows(rows) => rows,
        }
    }
}

/// 종목 코드 (이력 탐색 앵커에서 유도).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentCode {
    /// `<slug>-<ISIN>/<거래소>`
    pub code: String,
    /// `<ISIN>/<거래소>` (대문자)
    pub listing: String,
    /// ISIN (대문자)
    pub isin: String,
}

/// 상세 페이지 파싱
pub fn parse_detail(site: &SiteProfile, body: &str) -> DetailPage {
    let page = Page::parse(body);
    let sel = &site.selectors;

    let mut sections = Sections::default();
    for name in SectionName::ALL {
        let mode = match name {
            SectionName::PriceInformation => CellMode::Visible,
            _ => CellMode::Own,
        };
        sections.set(name, extract_section(&page, sel, name.heading(), mode));
    }

    DetailPage {
        name: normalize(page.first_own_text(&sel.headline)).into_scalar(),
        subline: Subline {
            label: normalize(page.first_own_text(&sel.subline_label)).into_scalar(),
            value: normalize(page.first_text(&sel.subline)).into_scalar(),
        },
        sections,
        history_href: page
            .first(&sel.history_link)
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string),
    }
}

/// 이력 탐색 페이지 파싱
pub fn parse_history(site: &SiteProfile, body: &str) -> HistoryPage {
    let page = Page::parse(body);
    let sel = &site.selectors;

    // 문서 순서상 첫 번째 일치만 사용
    let venue_href = page
        .select(&sel.venue_anchor)
        .filter(|a| {
            let text = deep_text(*a);
            site.venue_keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .filter(|a| has_marker_child(*a))
        .find_map(|a| a.value().attr("href").map(str::to_string));

    let mut seen = HashSet::new();
    let values = page.descendant_attrs(&sel.date_control, "value");
    let dates = normalize_all(values.into_iter().map(Some))
        .into_iter()
        .filter(|d| seen.insert(d.clone()))
        .collect();

    HistoryPage { venue_href, dates }
}

/// 시세 이력 파싱
pub fn parse_price_history(site: &SiteProfile, body: &str) -> Vec<Row> {
    let page = Page::parse(body);
    let sel = &site.selectors;
    extract_rows(&page, &sel.price_rows, &sel.price_header, &sel.row_cell)
}

/// 호가 이력 파싱
pub fn parse_bid_ask(site: &SiteProfile, body: &str) -> BidAskPage {
    let page = Page::parse(body);
    let sel = &site.selectors;

    if page.any_contains(&sel.no_results, NO_RESULTS_VALUE) {
        return BidAskPage::NoResults;
    }
    BidAskPage::Rows(extract_rows(
        &page,
        &sel.bid_ask_rows,
        &sel.bid_ask_header,
        &sel.row_cell,
    ))
}

/// 앵커 href에서 종목 코드와 ISIN을 유도합니다.
///
/// "/etp/iShares-S&P-500-UCITS-ETF-Dist-IE0031442068/FSE"
///   -> code "iShares-S&P-500-UCITS-ETF-Dist-IE0031442068/FSE",
///      listing "IE0031442068/FSE", isin "IE0031442068"
pub fn parse_instrument_code(href: &str, prefix: &str) -> Option<InstrumentCode> {
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let code = path
        .strip_prefix(prefix)
        .unwrap_or_else(|| path.trim_start_matches('/'))
        .trim_end_matches('/')
        .to_string();

    let (_, listing) = code.rsplit_once('-')?;
    let listing = listing.to_uppercase();
    let (isin, venue) = listing.rsplit_once('/')?;
    if isin.is_empty() || venue.is_empty() {
        return None;
    }
    let isin = isin.to_string();

    Some(InstrumentCode {
        code,
        listing,
        isin,
    })
}

/// 앵커의 직속 자식에 표시용 `span`이 있는지 확인합니다.
fn has_marker_child(anchor: ElementRef<'_>) -> bool {
    anchor
        .children()
        .filter_map(ElementRef::wrap)
        .any(|child| child.value().name() == "span")
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::SiteConfig;

    fn site() -> SiteProfile {
        SiteConfig::default().compile().unwrap()
    }

    #[test]
    fn test_parse_instrument_code() {
        let code = parse_instrument_code(
            "/etp/iShares-S&P-500-UCITS-ETF-Dist-IE0031442068/FSE",
            "/etp/",
        )
        .unwrap();
        assert_eq!(code.code, "iShares-S&P-500-UCITS-ETF-Dist-IE0031442068/FSE");
        assert_eq!(code.listing, "IE0031442068/FSE");
        assert_eq!(code.isin, "IE0031442068");
    }

    #[test]
    fn test_parse_instrument_code_lowercase_and_absolute() {
        let code = parse_instrument_code(
            "http://en.boerse-frankfurt.de/etp/BNPP-Kupfer-ETC-de000pb8c0p8/etr",
            "/etp/",
        )
        .unwrap();
        assert_eq!(code.isin, "DE000PB8C0P8");
        assert_eq!(code.listing, "DE000PB8C0P8/ETR");
    }

    #[test]
    fn test_parse_instrument_code_without_venue() {
        assert!(parse_instrument_code("/etp/Lyxor-ETF-LU0908501215", "/etp/").is_none());
        assert!(parse_instrument_code("/etp/nodash/FSE", "/etp/").is_none());
    }

    #[test]
    fn test_parse_history_first_anchor_wins() {
        let html = r#"
            <a href="/etp/Plain-Frankfurt-IE1/FSE">Frankfurt without marker</a>
            <a href="/etp/X-IE0031442068/ETR"><span>Xetra</span></a>
            <a href="/etp/X-IE0031442068/FSE"><span>Frankfurt</span></a>
            <select name="date">
              <option value="15.10.2026">15.10.2026</option>
              <option value="16.10.2026">16.10.2026</option>
              <option value="16.10.2026">16.10.2026</option>
            </select>"#;
        let history = parse_history(&site(), html);

        assert_eq!(history.venue_href.as_deref(), Some("/etp/X-IE0031442068/ETR"));
        assert_eq!(history.dates, vec!["15.10.2026", "16.10.2026"]);
    }

    #[test]
    fn test_parse_history_without_anchor() {
        let history = parse_history(&site(), "<a href='/etp/x/FSE'><span>Stuttgart</span></a>");
        assert!(history.venue_href.is_none());
        assert!(history.dates.is_empty());
    }

    #[test]
    fn test_parse_bid_ask_no_results() {
        let page = parse_bid_ask(&site(), "<div><strong>No results found</strong></div>");
        assert_eq!(page, BidAskPage::NoResults);

        let rows = page.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Time").map(String::as_str), Some("No results"));
    }

    #[test]
    fn test_parse_detail_identity_and_link() {
        let html = r#"
            <h1 class="stock-headline">iShares S&amp;P 500 <small>ETF</small></h1>
            <div class="stock-subline"><h1>ISIN</h1> IE0031442068 | WKN 622391</div>
            <a name="History" href="/etp/history/x">History</a>
            <div class="box"><h2>Dates</h2>
              <table><tr><td>Launch</td><td>15.03.2002</td></tr></table>
            </div>"#;
        let detail = parse_detail(&site(), html);

        assert_eq!(detail.name, "iShares S&P 500");
        assert_eq!(detail.subline.label, "ISIN");
        assert_eq!(detail.subline.value, "ISIN IE0031442068 | WKN 622391");
        assert_eq!(detail.history_href.as_deref(), Some("/etp/history/x"));
        assert_eq!(
            detail.sections.dates.get("Launch").map(String::as_str),
            Some("15.03.2002")
        );
        assert!(detail.sections.fees.is_empty());
    }
}
