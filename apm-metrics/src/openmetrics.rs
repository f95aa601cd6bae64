//! Decoder for the Prometheus text exposition format.
//!
//! Produces a [`Snapshot`]: metric family name -> decoded sample lines. Sample
//! timestamps in the exposition are ignored, the poller stamps every sample of
//! one snapshot with its own capture instant.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{MetricEntry, MetricKind, Snapshot};

const HISTOGRAM_SUFFIXES: [&str; 3] = ["_bucket", "_sum", "_count"];
const SUMMARY_SUFFIXES: [&str; 2] = ["_sum", "_count"];

/// Decodes an exposition body into a snapshot.
pub fn parse_text(input: &str) -> Result<Snapshot> {
    let mut kinds: HashMap<String, MetricKind> = HashMap::new();
    let mut snapshot = Snapshot::new();

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            parse_comment(comment, line_no, &mut kinds, &snapshot)?;
            continue;
        }

        let (name, labels, value) = parse_sample(line).map_err(|msg| {
            Error::Decode(format!("line {}: {}", line_no, msg))
        })?;
        let (family, kind) = resolve_family(&name, &kinds);
        snapshot.entry(family).or_default().push(MetricEntry {
            labels,
            kind,
            value,
        });
    }

    Ok(snapshot)
}

fn parse_comment(
    comment: &str,
    line_no: usize,
    kinds: &mut HashMap<String, MetricKind>,
    snapshot: &Snapshot,
) -> Result<()> {
    let mut parts = comment.split_whitespace();
    if parts.next() != Some("TYPE") {
        // HELP lines and free-form comments carry nothing we cache.
        return Ok(());
    }

    let (Some(name), Some(kind)) = (parts.next(), parts.next()) else {
        return Err(Error::Decode(format!(
            "line {}: TYPE line needs a metric name and a type",
            line_no
        )));
    };
    let kind = match kind {
        "counter" => MetricKind::Counter,
        "gauge" => MetricKind::Gauge,
        "summary" => MetricKind::Summary,
        "histogram" => MetricKind::Histogram,
        "untyped" | "unknown" => MetricKind::Untyped,
        other => {
            return Err(Error::Decode(format!(
                "line {}: unknown metric type {:?}",
                line_no, other
            )));
        }
    };
    if kinds.contains_key(name) {
        return Err(Error::Decode(format!(
            "line {}: second TYPE line for metric {}",
            line_no, name
        )));
    }
    if snapshot.contains_key(name) {
        return Err(Error::Decode(format!(
            "line {}: TYPE line for {} after its samples",
            line_no, name
        )));
    }
    kinds.insert(name.to_string(), kind);
    Ok(())
}

/// Maps a sample name onto its family, folding histogram and summary series
/// (`_bucket`, `_sum`, `_count`) into the declared base family.
///
/// A `_total` sample under `# TYPE foo counter` is not folded: the 0.0.4 text
/// format names counters in full, so it becomes its own untyped family.
fn resolve_family(name: &str, kinds: &HashMap<String, MetricKind>) -> (String, MetricKind) {
    if let Some(kind) = kinds.get(name) {
        return (name.to_string(), *kind);
    }
    let folded = [
        (&HISTOGRAM_SUFFIXES[..], MetricKind::Histogram),
        (&SUMMARY_SUFFIXES[..], MetricKind::Summary),
    ]
    .into_iter()
    .flat_map(|(suffixes, kind)| suffixes.iter().map(move |suffix| (*suffix, kind)))
    .find_map(|(suffix, kind)| {
        let base = name.strip_suffix(suffix)?;
        (kinds.get(base) == Some(&kind)).then(|| (base.to_string(), kind))
    });
    folded.unwrap_or_else(|| (name.to_string(), MetricKind::Untyped))
}

type ParsedSample = (String, Vec<(String, String)>, f64);

fn parse_sample(line: &str) -> std::result::Result<ParsedSample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        return Err(format!("invalid metric name {:?}", name));
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(after_brace)?;
        labels = parsed;
        rest = remaining;
    }

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| format!("missing value for {}", name))?;
    let value = value
        .parse::<f64>()
        .map_err(|_| format!("invalid value {:?} for {}", value, name))?;
    if let Some(timestamp) = fields.next() {
        timestamp
            .parse::<i64>()
            .map_err(|_| format!("invalid timestamp {:?} for {}", timestamp, name))?;
    }
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected token {:?} after sample {}", extra, name));
    }

    Ok((name.to_string(), labels, value))
}

/// Parses `a="1",b="2"}` and returns the labels plus the text after `}`.
fn parse_labels(input: &str) -> std::result::Result<(Vec<(String, String)>, &str), String> {
    let mut labels = Vec::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .ok_or_else(|| "unterminated label set".to_string())?;
        let name = &rest[..name_end];
        if !is_valid_label_name(name) {
            return Err(format!("invalid label name {:?}", name));
        }
        rest = rest[name_end..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| format!("expected '=' after label {}", name))?
            .trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| format!("expected quoted value for label {}", name))?;

        let (value, after_value) = parse_label_value(rest)?;
        labels.push((name.to_string(), value));
        rest = after_value.trim_start();

        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else if !rest.starts_with('}') {
            return Err(format!("expected ',' or '}}' after label {}", name));
        }
    }
}

/// Reads an escaped label value up to its closing quote.
fn parse_label_value(input: &str) -> std::result::Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, other)) => return Err(format!("invalid escape sequence \\{}", other)),
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err("unterminated label value".to_string())
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn should_parse_typed_families() {
        // given
        let body = r#"
# HELP http_requests_total Total requests.
# TYPE http_requests_total counter
http_requests_total{method="GET",code="200"} 1027 1395066363000
http_requests_total{method="POST",code="400"} 3
# TYPE temperature gauge
temperature 21.5
"#;

        // when
        let snapshot = parse_text(body).unwrap();

        // then
        let requests = &snapshot["http_requests_total"];
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].kind, MetricKind::Counter);
        assert_eq!(requests[0].labels, labels(&[("method", "GET"), ("code", "200")]));
        assert_eq!(requests[0].value, 1027.0);
        assert_eq!(requests[1].value, 3.0);

        let temperature = &snapshot["temperature"];
        assert_eq!(temperature[0].kind, MetricKind::Gauge);
        assert!(temperature[0].labels.is_empty());
        assert_eq!(temperature[0].value, 21.5);
    }

    #[test]
    fn should_treat_undeclared_samples_as_untyped() {
        // when
        let snapshot = parse_text("some_metric 1\n").unwrap();

        // then
        assert_eq!(snapshot["some_metric"][0].kind, MetricKind::Untyped);
    }

    #[test]
    fn should_fold_histogram_series_into_family() {
        // given
        let body = r#"
# TYPE latency_seconds histogram
latency_seconds_bucket{le="0.1"} 3
latency_seconds_bucket{le="+Inf"} 5
latency_seconds_sum 1.2
latency_seconds_count 5
"#;

        // when
        let snapshot = parse_text(body).unwrap();

        // then
        assert_eq!(snapshot.len(), 1);
        let family = &snapshot["latency_seconds"];
        assert_eq!(family.len(), 4);
        assert!(family.iter().all(|e| e.kind == MetricKind::Histogram));
    }

    #[test]
    fn should_fold_summary_series_into_family() {
        // given
        let body = r#"
# TYPE rpc_seconds summary
rpc_seconds{quantile="0.5"} 0.2
rpc_seconds_sum 10
rpc_seconds_count 40
"#;

        // when
        let snapshot = parse_text(body).unwrap();

        // then
        assert_eq!(snapshot["rpc_seconds"].len(), 3);
        assert!(snapshot["rpc_seconds"].iter().all(|e| e.kind == MetricKind::Summary));
    }

    #[test]
    fn should_keep_openmetrics_counter_total_as_untyped_family() {
        // given
        let body = r#"
# TYPE jobs counter
jobs_total{queue="default"} 12
# EOF
"#;

        // when
        let snapshot = parse_text(body).unwrap();

        // then
        assert!(!snapshot.contains_key("jobs"));
        assert_eq!(snapshot["jobs_total"][0].kind, MetricKind::Untyped);
        assert_eq!(snapshot["jobs_total"][0].value, 12.0);
    }

    #[test]
    fn should_unescape_label_values() {
        // given
        let body = "msg{text=\"a \\\"quoted\\\" \\\\ line\\n\",} 1\n";

        // when
        let snapshot = parse_text(body).unwrap();

        // then
        assert_eq!(
            snapshot["msg"][0].labels,
            labels(&[("text", "a \"quoted\" \\ line\n")])
        );
    }

    #[rstest]
    #[case::positive_inf("+Inf", f64::INFINITY)]
    #[case::negative_inf("-Inf", f64::NEG_INFINITY)]
    #[case::exponent("1.5e3", 1500.0)]
    #[case::negative("-2", -2.0)]
    fn should_parse_special_values(#[case] raw: &str, #[case] expected: f64) {
        // when
        let snapshot = parse_text(&format!("m {}\n", raw)).unwrap();

        // then
        assert_eq!(snapshot["m"][0].value, expected);
    }

    #[test]
    fn should_parse_nan() {
        // when
        let snapshot = parse_text("m NaN\n").unwrap();

        // then
        assert!(snapshot["m"][0].value.is_nan());
    }

    #[rstest]
    #[case::missing_value("m\n")]
    #[case::bad_value("m abc\n")]
    #[case::bad_name("9m 1\n")]
    #[case::unterminated_labels("m{a=\"1\" 1\n")]
    #[case::unquoted_label("m{a=1} 1\n")]
    #[case::bad_timestamp("m 1 soon\n")]
    #[case::trailing_garbage("m 1 2 3\n")]
    #[case::unknown_type("# TYPE m matrix\nm 1\n")]
    #[case::duplicate_type("# TYPE m gauge\n# TYPE m gauge\nm 1\n")]
    #[case::type_after_samples("m 1\n# TYPE m gauge\n")]
    fn should_reject_malformed_input(#[case] body: &str) {
        // when
        let result = parse_text(body);

        // then
        assert!(matches!(result, Err(Error::Decode(_))), "{:?}", result);
    }

    #[test]
    fn should_report_line_number() {
        // when
        let err = parse_text("ok 1\nbroken\n").unwrap_err();

        // then
        assert!(err.to_string().contains("line 2"), "{}", err);
    }
}
