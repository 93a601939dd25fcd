//! 텍스트 정규화.
//!
//! 마크업에서 추출한 텍스트의 공백/NBSP 노이즈를 정리합니다.
//! 단일 값과 목록을 `Extracted` 태그로 구분해 동일한 규칙으로 처리합니다.

use crate::markup::Extracted;

/// 정규화 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// 단일 값 (없던 값은 빈 문자열)
    Scalar(String),
    /// 빈 값이 제거된 목록 (원래 순서 유지)
    List(Vec<String>),
}

impl Normalized {
    /// 단일 값으로 변환합니다. 목록이면 첫 요소를 사용합니다.
    pub fn into_scalar(self) -> String {
        match self {
            Self::Scalar(s) => s,
            Self::List(items) => items.into_iter().next().unwrap_or_default(),
        }
    }

    /// 목록으로 변환합니다. 빈 단일 값은 빈 목록이 됩니다.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Scalar(s) if s.is_empty() => Vec::new(),
            Self::Scalar(s) => vec![s],
            Self::List(items) => items,
        }
    }
}

/// 추출 결과를 정규화합니다.
pub fn normalize(value: Extracted) -> Normalized {
    match value {
        Extracted::Scalar(s) => {
            Normalized::Scalar(s.as_deref().map(normalize_text).unwrap_or_default())
        }
        Extracted::List(items) => Normalized::List(normalize_all(items)),
    }
}

/// 공백 연속(NBSP 포함)을 ASCII 공백 하나로 합치고 앞뒤를 제거합니다.
///
/// "a\u{a0} \u{a0}b " -> "a b"
pub fn normalize_text(text: &str) -> String {
    // char::is_whitespace는 U+00A0도 공백으로 취급
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 목록의 각 요소를 정규화하고 비어 있는 요소를 제거합니다.
pub fn normalize_all<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .flatten()
        .map(|s| normalize_text(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_scalar_with_nbsp() {
        let result = normalize(Extracted::Scalar(Some("a\u{a0} \u{a0}b ".to_string())));
        assert_eq!(result, Normalized::Scalar("a b".to_string()));
    }

    #[test]
    fn test_normalize_absent_scalar_is_empty() {
        assert_eq!(
            normalize(Extracted::Scalar(None)),
            Normalized::Scalar(String::new())
        );
    }

    #[test]
    fn test_normalize_list_drops_empty_and_absent() {
        let result = normalize(Extracted::List(vec![
            Some(String::new()),
            Some(" x ".to_string()),
            None,
        ]));
        assert_eq!(result, Normalized::List(vec!["x".to_string()]));
    }

    #[test]
    fn test_normalize_list_keeps_order() {
        let result = normalize_all(vec![Some(" b"), Some("\n"), Some("a "), Some("c\t\td")]);
        assert_eq!(result, vec!["b", "a", "c d"]);
    }

    #[test]
    fn test_into_list_of_empty_scalar() {
        assert!(Normalized::Scalar(String::new()).into_list().is_empty());
        assert_eq!(
            Normalized::List(vec!["x".to_string()]).into_scalar(),
            "x".to_string()
        );
    }

    proptest! {
        #[test]
        fn prop_normalize_text_is_idempotent(s in "[ a-z\u{a0}\t\n]{0,40}") {
            let once = normalize_text(&s);
            prop_assert_eq!(normalize_text(&once), once.clone());
            prop_assert!(!once.contains("  "));
            prop_assert!(!once.contains('\u{00a0}'), "NBSP가 남아 있음: {:?}", once);
            prop_assert_eq!(once.trim(), once.as_str());
        }
    }
}
