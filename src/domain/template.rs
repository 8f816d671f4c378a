use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};

/// 日期格式标记与 chrono strftime 的对应关系，长标记在前
///
/// 单个字母 (`{d}`、`{M}`) 总是按标记处理，即不补零的日、月，不作为整体日期格式。
const DATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("dd", "%d"),
    ("d", "%-d"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("fff", "%3f"),
    ("tt", "%p"),
];

/// 展开输出路径模板中的 `{格式}` 日期标记
///
/// 例如 `report_{yyyy-MM-dd}.csv` 会被替换为 `report_2024-03-11.csv`。
/// 无法识别的格式保持原样 (包括花括号)，并继续处理后面的标记。
pub fn resolve<Tz>(template: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + len;
        let spec = &rest[start + 1..end];

        resolved.push_str(&rest[..start]);
        match format_spec(spec, now) {
            Some(formatted) => resolved.push_str(&formatted),
            None => resolved.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }

    resolved.push_str(rest);
    resolved
}

/// 按格式说明格式化时间，格式无效时返回 None
fn format_spec<Tz>(spec: &str, now: &DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let strftime = if spec.contains('%') {
        spec.to_string()
    } else {
        to_strftime(spec)?
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }

    let mut formatted = String::new();
    write!(formatted, "{}", now.format_with_items(items.iter())).ok()?;
    Some(formatted)
}

/// 将 `yyyy-MM-dd` 风格的格式转换为 strftime 格式
///
/// 支持单引号包裹的字面文本和 `\` 转义；未知字母或未闭合的引号视为无效。
fn to_strftime(spec: &str) -> Option<String> {
    let mut out = String::with_capacity(spec.len() * 2);
    let mut rest = spec;

    while let Some(ch) = rest.chars().next() {
        if ch == '\'' {
            let close = rest[1..].find('\'')?;
            push_literal(&mut out, &rest[1..1 + close]);
            rest = &rest[close + 2..];
        } else if ch == '\\' {
            let escaped = rest[1..].chars().next()?;
            push_literal(&mut out, escaped.encode_utf8(&mut [0; 4]));
            rest = &rest[1 + escaped.len_utf8()..];
        } else if ch.is_alphabetic() {
            let (token, strftime) = DATE_TOKENS
                .iter()
                .find(|(token, _)| rest.starts_with(token))?;
            out.push_str(strftime);
            rest = &rest[token.len()..];
        } else {
            push_literal(&mut out, ch.encode_utf8(&mut [0; 4]));
            rest = &rest[ch.len_utf8()..];
        }
    }

    Some(out)
}

fn push_literal(out: &mut String, text: &str) {
    for ch in text.chars() {
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_date_token_is_replaced() {
        assert_eq!(
            resolve("report_{yyyy-MM-dd}.csv", &fixed_now()),
            "report_2024-03-11.csv"
        );
    }

    #[test]
    fn test_template_without_braces_is_unchanged() {
        let template = "/tmp/out/report.csv";
        assert_eq!(resolve(template, &fixed_now()), template);
        assert_eq!(resolve(&resolve(template, &fixed_now()), &fixed_now()), template);
    }

    #[test]
    fn test_invalid_spec_is_left_verbatim() {
        assert_eq!(
            resolve("out_{zzz-invalid}.csv", &fixed_now()),
            "out_{zzz-invalid}.csv"
        );
    }

    #[test]
    fn test_multiple_spans_resolved_independently() {
        assert_eq!(
            resolve("{yyyy}/{bad}/{MM}_{dd}_{HHmmss}.csv", &fixed_now()),
            "2024/{bad}/03_11_140509.csv"
        );
    }

    #[test]
    fn test_unclosed_brace_stops_scan() {
        assert_eq!(resolve("a_{yyyy}_{MM", &fixed_now()), "a_2024_{MM");
        assert_eq!(resolve("a_}{", &fixed_now()), "a_}{");
    }

    #[test]
    fn test_quoted_and_escaped_literals() {
        assert_eq!(resolve("{yyyy'year'}", &fixed_now()), "2024year");
        assert_eq!(resolve("{\\y-yy}", &fixed_now()), "y-24");
        assert_eq!(resolve("{'unterminated}", &fixed_now()), "{'unterminated}");
        assert_eq!(resolve("{100%}", &fixed_now()), "{100%}");
    }

    #[test]
    fn test_twelve_hour_clock_and_names() {
        assert_eq!(resolve("{hh tt}", &fixed_now()), "02 PM");
        assert_eq!(resolve("{MMM d}", &fixed_now()), "Mar 11");
    }

    #[test]
    fn test_strftime_specifier() {
        assert_eq!(resolve("log_{%Y%m%d}.csv", &fixed_now()), "log_20240311.csv");
        assert_eq!(resolve("log_{%Q}.csv", &fixed_now()), "log_{%Q}.csv");
    }

    #[test]
    fn test_empty_braces_resolve_to_nothing() {
        assert_eq!(resolve("a{}b", &fixed_now()), "ab");
    }

    #[test]
    fn test_single_letter_spans_are_unpadded_fields() {
        assert_eq!(resolve("{d}", &fixed_now()), "11");
        assert_eq!(resolve("{M}", &fixed_now()), "3");
        assert_eq!(resolve("{h}:{m}:{s}", &fixed_now()), "2:5:9");
    }
}
