//! Manual HTTP redirect handling

use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use url::Url;

/// Status codes that carry a `Location` to follow
pub fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a `Location` header against the URL that produced it.
///
/// Relative locations are joined onto `base`. Only http and https targets
/// are accepted.
pub fn resolve_location(base: &Url, location: Option<&HeaderValue>) -> Result<Url, String> {
    let location = location.ok_or_else(|| "redirect without Location header".to_string())?;
    let location = location
        .to_str()
        .map_err(|_| "Location header is not valid text".to_string())?
        .trim();
    if location.is_empty() {
        return Err("empty Location header".to_string());
    }

    let target = base
        .join(location)
        .map_err(|e| format!("invalid Location '{}': {}", location, e))?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(format!("unsupported redirect scheme '{}'", other)),
    }
}

/// Decision for one response in a redirect chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectStep {
    /// Request the contained URL next
    Follow(Url),
    /// Treat the current response as final
    Final,
    /// Treat the current response as final and record the note
    Rejected(String),
}

/// Tracks hops through a redirect chain
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    enabled: bool,
    max_redirects: u32,
    hops: u32,
}

impl RedirectResolver {
    pub fn new(enabled: bool, max_redirects: u32) -> Self {
        Self {
            enabled,
            max_redirects,
            hops: 0,
        }
    }

    /// Redirects followed so far
    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Decide what to do with a response from `current`
    pub fn next(
        &mut self,
        current: &Url,
        status: StatusCode,
        location: Option<&HeaderValue>,
    ) -> RedirectStep {
        if !self.enabled || !is_redirect(status) {
            return RedirectStep::Final;
        }
        if self.hops >= self.max_redirects {
            return RedirectStep::Rejected(format!(
                "redirect limit of {} reached at {}",
                self.max_redirects, current
            ));
        }

        match resolve_location(current, location) {
            Ok(target) => {
                self.hops += 1;
                RedirectStep::Follow(target)
            }
            Err(note) => RedirectStep::Rejected(note),
        }
    }
}
