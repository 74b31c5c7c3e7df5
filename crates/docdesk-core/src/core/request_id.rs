//! Request tokens for latest-only async results.
//!
//! Every fetch takes a fresh token and marks it current. A completion may
//! only commit while its token is still current; anything older is stale
//! no matter how it finished. Last *issued* wins, not last *completed*.

/// Opaque, monotonically increasing request token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Tracks the latest issued request and rejects stale completions.
#[derive(Debug, Default, Clone)]
pub struct LatestOnly {
    next: u64,
    active: Option<RequestToken>,
}

impl LatestOnly {
    /// Start a new request and mark it as current.
    pub fn begin(&mut self) -> RequestToken {
        self.next = self.next.wrapping_add(1);
        let token = RequestToken(self.next);
        self.active = Some(token);
        token
    }

    /// Forget the current request; every in-flight completion becomes stale.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    fn is_active(&self, token: RequestToken) -> bool {
        self.active == Some(token)
    }

    /// Finish the request if it's still current.
    pub fn finish_if_active(&mut self, token: RequestToken) -> bool {
        if self.is_active(token) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_increase() {
        let mut seq = LatestOnly::default();
        let a = seq.begin();
        let b = seq.begin();
        assert!(b > a);
        assert_eq!(b.value(), a.value() + 1);
    }

    #[test]
    fn test_older_token_is_stale() {
        let mut seq = LatestOnly::default();
        let first = seq.begin();
        let second = seq.begin();

        assert!(!seq.is_active(first));
        assert!(seq.is_active(second));
        assert!(!seq.finish_if_active(first));
        assert!(seq.finish_if_active(second));
        assert!(!seq.is_active(second));
    }

    #[test]
    fn test_finished_token_cannot_commit_twice() {
        let mut seq = LatestOnly::default();
        let token = seq.begin();
        assert!(seq.finish_if_active(token));
        assert!(!seq.finish_if_active(token));
    }

    #[test]
    fn test_cancel_invalidates_current() {
        let mut seq = LatestOnly::default();
        let token = seq.begin();
        seq.cancel();
        assert!(!seq.is_active(token));
    }
}
