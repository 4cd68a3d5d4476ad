//! Resolving which call an inbound telephony stream belongs to.
//!
//! Telephony providers deliver the call ID in whatever shape the stream URL
//! was configured with: as a query parameter, as a bare numeric path
//! segment, or as a percent-encoded `key=value` segment. Resolution never
//! fails; an unresolvable ID just means the session runs without
//! persistence.

use url::form_urlencoded;

const CALL_ID_QUERY_KEYS: [&str; 3] = ["call_id", "CallId", "call"];
const CALL_ID_SEGMENT_KEYS: [&str; 3] = ["call_id", "call", "id"];
const AGENT_QUERY_KEYS: [&str; 3] = ["agent", "Agent", "agent_name"];

/// Identity hints extracted from the connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub call_id: Option<i64>,
    /// Persona named in the query, used only when the call record has none.
    pub agent_hint: Option<String>,
}

impl CallTarget {
    /// Resolves the call ID and agent hint from a raw path and query.
    ///
    /// Query parameters win over the path. A `?` that only appears after
    /// percent-decoding the path is treated as a query of its own, consulted
    /// after the real one.
    pub fn resolve(path: &str, query: Option<&str>) -> Self {
        let decoded = urlencoding::decode(path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| path.to_string());
        let (decoded_path, embedded_query) = match decoded.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (decoded, None),
        };

        let mut pairs = query_pairs(query.unwrap_or_default());
        pairs.extend(query_pairs(embedded_query.as_deref().unwrap_or_default()));

        let call_id = call_id_from_query(&pairs).or_else(|| call_id_from_path(&decoded_path));
        let agent_hint = AGENT_QUERY_KEYS.iter().find_map(|key| {
            pairs
                .iter()
                .find(|(k, v)| k == key && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
        });

        Self {
            call_id,
            agent_hint,
        }
    }
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parses a strictly numeric identifier. Signs, spaces and overflow are
/// rejected.
fn parse_numeric(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn call_id_from_query(pairs: &[(String, String)]) -> Option<i64> {
    CALL_ID_QUERY_KEYS.iter().find_map(|key| {
        pairs
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| parse_numeric(v.trim()))
    })
}

fn call_id_from_path(path: &str) -> Option<i64> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next() != Some("ws") {
        return None;
    }
    let candidate = segments.next()?;

    match candidate.split_once('=') {
        Some((key, value)) => CALL_ID_SEGMENT_KEYS
            .iter()
            .any(|k| key.eq_ignore_ascii_case(k))
            .then(|| parse_numeric(value))
            .flatten(),
        None => parse_numeric(candidate),
    }
}
