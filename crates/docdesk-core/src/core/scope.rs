//! Lifetime guards for controllers whose owner can go away mid-request.
//!
//! A controller holds a [`Scope`]; every state commit that follows an
//! `.await` checks [`Scope::is_alive`] first. Closing the scope does not
//! abort in-flight requests, their results are simply never applied.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    token: CancellationToken,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that closes together with `self` but can also close alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn close(&self) {
        self.token.cancel();
    }
}
