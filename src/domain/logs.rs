use chrono::DateTime;

pub const DEFAULT_LOG_LINES: usize = 100;
pub const LOG_DATE_FORMAT: &str = "%m-%d %H:%M:%S";

/// Rewrites the timestamp of a log line as `%m-%d %H:%M:%S`.
///
/// The container runtime prefixes lines with `<timestamp> `, compose with
/// `<container> | <timestamp> `. Lines without a parsable timestamp are returned unchanged.
pub fn recompose_log_line(line: &str) -> String {
    if let Some(recomposed) = recompose_at(line, 0) {
        return recomposed;
    }
    line.find('|')
        .and_then(|separator| recompose_at(line, separator + 1))
        .unwrap_or_else(|| line.to_string())
}

fn recompose_at(line: &str, start: usize) -> Option<String> {
    let rest = &line[start..];
    let stamp_start = start + rest.len() - rest.trim_start().len();
    let stamp_end = line[stamp_start..]
        .find(char::is_whitespace)
        .map(|i| stamp_start + i)
        .unwrap_or(line.len());
    let date = DateTime::parse_from_rfc3339(&line[stamp_start..stamp_end]).ok()?;
    Some(format!(
        "{}{}{}",
        &line[..stamp_start],
        date.format(LOG_DATE_FORMAT),
        &line[stamp_end..]
    ))
}

/// Splits raw log output into reformatted lines, dropping compose's attach banner.
pub fn format_log_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.starts_with("Attaching to "))
        .map(recompose_log_line)
        .collect()
}
