//! Maps an HTTP response to a success body or a typed [`WallarmError`].
//!
//! Rules are evaluated top to bottom and the first match wins.

use bytes::Bytes;

use crate::WallarmError;

/// Resource tag of the "current user details" endpoint. Requests carrying it
/// never get a JSON content type.
pub const USER_DETAILS_TAG: &str = "userdetails";

/// Exact body the API returns when a node or application already exists.
pub const ALREADY_EXISTS_BODY: &str = r#"{"status":400,"body":"Already exists"}"#;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Verdict {
    Success,
    Unauthorized,
    Forbidden,
    Upstream,
    ExistingResource,
    Http,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum StatusMatch {
    Range(u16, u16),
    OneOf(&'static [u16]),
}

impl StatusMatch {
    fn matches(self, status: u16) -> bool {
        match self {
            Self::Range(low, high) => (low..=high).contains(&status),
            Self::OneOf(codes) => codes.contains(&status),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Rule {
    pub status: StatusMatch,
    /// Resource tags the rule is limited to; `None` matches every tag.
    pub tags: Option<&'static [&'static str]>,
    /// Exact response body the rule requires.
    pub body: Option<&'static str>,
    pub verdict: Verdict,
}

impl Rule {
    const fn status(status: StatusMatch, verdict: Verdict) -> Self {
        Self {
            status,
            tags: None,
            body: None,
            verdict,
        }
    }

    fn matches(&self, status: u16, tag: &str, body: &[u8]) -> bool {
        self.status.matches(status)
            && self.tags.map_or(true, |tags| tags.contains(&tag))
            && self.body.map_or(true, |expected| expected.as_bytes() == body)
    }
}

pub(crate) const RULES: &[Rule] = &[
    Rule::status(StatusMatch::Range(200, 299), Verdict::Success),
    Rule::status(StatusMatch::OneOf(&[401]), Verdict::Unauthorized),
    Rule::status(StatusMatch::OneOf(&[403]), Verdict::Forbidden),
    Rule::status(
        StatusMatch::OneOf(&[429, 502, 503, 504, 522, 523, 524]),
        Verdict::Upstream,
    ),
    Rule {
        status: StatusMatch::OneOf(&[400]),
        tags: Some(&["node", "app"]),
        body: Some(ALREADY_EXISTS_BODY),
        verdict: Verdict::ExistingResource,
    },
    Rule {
        status: StatusMatch::OneOf(&[409]),
        tags: Some(&["scanner", "user"]),
        body: None,
        verdict: Verdict::ExistingResource,
    },
];

pub(crate) fn verdict(status: u16, tag: &str, body: &[u8]) -> Verdict {
    RULES
        .iter()
        .find(|rule| rule.matches(status, tag, body))
        .map_or(Verdict::Http, |rule| rule.verdict)
}

/// Returns the body on success, or the classified error.
pub(crate) fn classify(status: u16, tag: &str, body: Bytes) -> Result<Bytes, WallarmError> {
    let verdict = verdict(status, tag, &body);
    if verdict == Verdict::Success {
        return Ok(body);
    }

    let body = String::from_utf8_lossy(&body).into_owned();
    Err(match verdict {
        Verdict::Unauthorized => WallarmError::Unauthorized { status, body },
        Verdict::Forbidden => WallarmError::Forbidden { status, body },
        Verdict::Upstream => WallarmError::Upstream { status, body },
        Verdict::ExistingResource => WallarmError::ExistingResource { status, body },
        Verdict::Success | Verdict::Http => WallarmError::Http { status, body },
    })
}

/// Whether a response status should trigger another attempt.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}
