//! 마크업 조회 어댑터.
//!
//! `scraper` 위에서 문서 조회를 감싸고, 조회 결과를 단일 값(`Scalar`)과
//! 목록(`List`)으로 명시적으로 구분해 돌려줍니다. 컬렉션을 반환하는 조회라도
//! "첫 번째 매칭 노드의 텍스트"는 항상 `Scalar`입니다.
//!
//! `Html`은 `Send`가 아니므로 `Page`는 동기 코드 안에서만 사용하고,
//! `.await` 지점을 넘기기 전에 필요한 값을 소유 타입으로 꺼내야 합니다.

use crate::error::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};

/// 조회 결과 (정규화 전).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// 단일 노드의 텍스트 (매칭 없음 = None)
    Scalar(Option<String>),
    /// 매칭된 모든 노드의 텍스트
    List(Vec<Option<String>>),
}

/// 파싱된 HTML 문서.
pub struct Page {
    html: Html,
}

impl Page {
    /// 문서 전체를 파싱합니다.
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// 내부 `Html` 참조.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// 셀렉터에 매칭되는 모든 요소 (문서 순서).
    pub fn select<'a>(
        &'a self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    /// 첫 번째 매칭 요소.
    pub fn first<'a>(&'a self, selector: &Selector) -> Option<ElementRef<'a>> {
        self.html.select(selector).next()
    }

    /// 첫 번째 매칭 요소의 직속 텍스트 (`::text` 의 첫 결과).
    pub fn first_own_text(&self, selector: &Selector) -> Extracted {
        Extracted::Scalar(self.first(selector).map(own_text))
    }

    /// 첫 번째 매칭 요소의 전체 텍스트.
    pub fn first_text(&self, selector: &Selector) -> Extracted {
        Extracted::Scalar(self.first(selector).map(deep_text))
    }

    /// 매칭된 모든 요소의 전체 텍스트.
    pub fn all_texts(&self, selector: &Selector) -> Extracted {
        Extracted::List(self.select(selector).map(|el| Some(deep_text(el))).collect())
    }

    /// 첫 번째 매칭 요소의 속성 값.
    pub fn first_attr(&self, selector: &Selector, attr: &str) -> Option<String> {
        self.select(selector)
            .find_map(|el| el.value().attr(attr).map(str::to_string))
    }

    /// 매칭된 요소와 그 하위 요소들에서 속성 값을 모두 수집합니다.
    ///
    /// `//*[@name="date"]//@value` 처럼 컨트롤 자신과 하위 옵션의 값을 함께 얻을 때 사용.
    pub fn descendant_attrs(&self, selector: &Selector, attr: &str) -> Vec<String> {
        let mut values = Vec::new();
        for el in self.select(selector) {
            for node in el.descendants() {
                if let Some(value) = ElementRef::wrap(node).and_then(|e| e.value().attr(attr)) {
                    values.push(value.to_string());
                }
            }
        }
        values
    }

    /// 매칭된 요소 중 텍스트에 `needle`을 포함하는 것이 있는지 확인합니다.
    pub fn any_contains(&self, selector: &Selector, needle: &str) -> bool {
        self.select(selector)
            .any(|el| el.text().collect::<String>().contains(needle))
    }
}

/// CSS 셀렉터를 컴파일합니다.
pub fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| HarvestError::Selector(format!("`{}`: {}", selector, e)))
}

/// 요소의 직속 텍스트 노드들을 이어붙입니다.
pub fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|child| child.value().as_text().map(|t| &**t))
        .collect()
}

/// 요소 하위의 모든 텍스트를 이어붙입니다.
pub fn deep_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// 숨김 셀(`td`) 아래에 있지 않은 텍스트 노드만 이어붙입니다.
///
/// 셀 자신부터 그 안쪽의 `td`만 확인하며, `hidden-xs` 같은 반응형 `span`의 텍스트는
/// 그대로 포함됩니다. 요소 자신이 숨김 셀이면 빈 문자열입니다.
pub fn visible_text(el: ElementRef<'_>) -> String {
    if is_hidden_cell(el) {
        return String::new();
    }

    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let mut hidden = false;
        for ancestor in node.ancestors() {
            if ancestor == *el {
                break;
            }
            if ElementRef::wrap(ancestor).is_some_and(is_hidden_cell) {
                hidden = true;
                break;
            }
        }

        if !hidden {
            out.push_str(text);
        }
    }
    out
}

/// 첫 번째 하위 링크의 `href`.
pub fn link_target(el: ElementRef<'_>) -> Option<String> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .find_map(|e| e.value().attr("href").map(str::to_string))
}

/// class 속성에 "hidden"이 들어간 `td`를 숨김 셀로 봅니다.
fn is_hidden_cell(el: ElementRef<'_>) -> bool {
    el.value().name() == "td"
        && el
            .value()
            .attr("class")
            .is_some_and(|class| class.contains("hidden"))
}
