use unicode_width::UnicodeWidthChar;

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Percentage of `part` in `total`, rounded to the nearest integer; 0 when total is 0
pub fn percentage(part: usize, total: usize) -> u32 {
    match total {
        0 => 0,
        _ => ((part as f64 / total as f64) * 100.0).round() as u32,
    }
}

/// Cut `text` to at most `max_width` columns, appending `...` when something was removed
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();

    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            out.push_str("...");
            return out;
        }
        width += w;
        out.push(c);
    }

    out
}
