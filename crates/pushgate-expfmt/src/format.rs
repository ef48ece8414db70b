pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    OpenMetrics,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => TEXT_CONTENT_TYPE,
            Self::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
        }
    }

    /// Picks an encoding from an `Accept` header value.
    ///
    /// Media ranges are tried by descending `q` (ties keep header order);
    /// the first one this encoder can produce wins. Falls back to text.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Self::Text;
        };

        let mut candidates: Vec<(f32, Format)> = accept
            .split(',')
            .filter_map(parse_media_range)
            .filter(|(q, _)| *q > 0.0)
            .collect();
        candidates.sort_by(|left, right| right.0.total_cmp(&left.0));

        candidates
            .first()
            .map(|(_, format)| *format)
            .unwrap_or_default()
    }
}

fn parse_media_range(range: &str) -> Option<(f32, Format)> {
    let mut parts = range.split(';').map(str::trim);
    let media_type = parts.next()?.to_ascii_lowercase();

    let mut q = 1.0_f32;
    let mut version: Option<String> = None;
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "q" => q = value.parse().unwrap_or(0.0),
            "version" => version = Some(value.to_string()),
            _ => {}
        }
    }

    let format = match media_type.as_str() {
        "application/openmetrics-text" => match version.as_deref() {
            None | Some("1.0.0") | Some("0.0.1") => Format::OpenMetrics,
            Some(_) => return None,
        },
        "text/plain" => match version.as_deref() {
            None | Some("0.0.4") => Format::Text,
            Some(_) => return None,
        },
        "text/*" | "*/*" => Format::Text,
        _ => return None,
    };

    Some((q, format))
}
