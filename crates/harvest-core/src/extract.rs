//! 테이블 추출기.
//!
//! 상세 페이지의 박스 섹션을 key-value 매핑으로, 이력 테이블을 행 목록으로 변환합니다.
//!
//! ## 섹션 구조
//! ```html
//! <div class="box">
//!   <h2>Fees</h2>
//!   <table>
//!     <tr><td>TER</td><td>0.07%</td></tr>
//!     <tr><td>Issuer site</td><td><a href="https://issuer.example"></a></td></tr>
//!   </table>
//! </div>
//! ```
//! 셀은 문서 순서로 평탄화된 뒤 `[키, 값, 키, 값, ...]`으로 짝지어집니다.

use crate::config::Selectors;
use crate::markup::{deep_text, link_target, own_text, visible_text, Page};
use crate::normalize::{normalize_all, normalize_text};
use crate::record::{Row, Section};
use scraper::{ElementRef, Selector};

/// 셀 값 계산 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMode {
    /// 셀의 직속 텍스트, 비어 있으면 링크 대상
    Own,
    /// 셀 하위 전체 텍스트, 비어 있으면 링크 대상
    Deep,
    /// 숨김 요소를 제외한 전체 텍스트 (빈 값은 목록에서 제거)
    Visible,
}

/// 셀에 표시되는 값을 계산합니다.
pub fn cell_value(cell: ElementRef<'_>, mode: CellMode) -> String {
    let text = match mode {
        CellMode::Visible => return normalize_text(&visible_text(cell)),
        CellMode::Own => normalize_text(&own_text(cell)),
        CellMode::Deep => normalize_text(&deep_text(cell)),
    };

    if text.is_empty() {
        link_target(cell).unwrap_or_default()
    } else {
        text
    }
}

/// 제목으로 섹션을 찾아 key-value 매핑으로 추출합니다.
///
/// 제목이 없거나 박스 컨테이너가 없으면 빈 매핑을 반환합니다 (에러 아님).
pub fn extract_section(
    page: &Page,
    selectors: &Selectors,
    heading: &str,
    mode: CellMode,
) -> Section {
    let Some(container) = find_box(page, selectors, heading) else {
        tracing::debug!(section = heading, "섹션 없음");
        return Section::new();
    };

    let values: Vec<String> = container
        .select(&selectors.section_cell)
        .map(|cell| cell_value(cell, mode))
        .collect();

    let values = match mode {
        CellMode::Visible => normalize_all(values.into_iter().map(Some)),
        CellMode::Own | CellMode::Deep => values,
    };

    pair_cells(values)
}

/// 평탄화된 셀 목록을 위치 기준으로 짝지어 매핑을 만듭니다.
///
/// 홀수 길이의 마지막 요소는 버려지고, 중복 키는 나중 값이 남습니다.
pub fn pair_cells<I>(values: I) -> Section
where
    I: IntoIterator<Item = String>,
{
    let mut section = Section::new();
    let mut iter = values.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        section.insert(key, value);
    }
    section
}

/// 헤더 행과 본문 행을 위치 기준으로 짝지어 행 목록을 만듭니다.
///
/// 각 행의 쌍 개수는 헤더와 셀 중 짧은 쪽을 따릅니다.
pub fn extract_rows(
    page: &Page,
    row_selector: &Selector,
    header_selector: &Selector,
    cell_selector: &Selector,
) -> Vec<Row> {
    let headers: Vec<String> = page
        .select(header_selector)
        .map(|th| cell_value(th, CellMode::Deep))
        .collect();

    page.select(row_selector)
        .map(|row| {
            row.select(cell_selector)
                .map(|td| cell_value(td, CellMode::Deep))
                .zip(headers.iter())
                .map(|(value, header)| (header.clone(), value))
                .collect()
        })
        .collect()
}

/// 제목 텍스트가 일치하는 heading의 가장 가까운 박스 조상을 찾습니다.
fn find_box<'a>(
    page: &'a Page,
    selectors: &'a Selectors,
    heading: &str,
) -> Option<ElementRef<'a>> {
    page.select(&selectors.section_heading)
        .filter(|h| normalize_text(&deep_text(*h)) == heading)
        .find_map(|h| {
            h.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().classes().any(|c| c == selectors.box_class))
        })
}
