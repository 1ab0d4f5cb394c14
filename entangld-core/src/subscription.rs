//! A link in a subscription chain. Every hop of one logical subscription — from the
//! store that holds the user callback down through however many mounts the path
//! crosses — shares a single [`CorrelationId`] and contributes exactly one `Subscription`
//! to its owning store's list.

use crate::message::CorrelationId;
use crate::value::Node;

/// Invoked with `(path, value)` whenever a set or event reaches a head link. Only head
/// links (`upstream.is_none()`) carry a callback; pass-through links forward instead.
pub type Callback = Box<dyn Fn(&str, &Node) + Send + Sync>;

/// One store's record of its participation in a subscription chain.
pub struct Subscription<R> {
    pub path: String,
    pub id: CorrelationId,

    /// The remote this link forwards `subscribe`/`unsubscribe` to and receives `event`s
    /// from. `None` means this store owns the data directly.
    pub downstream: Option<R>,

    /// The remote that installed this link via an incoming `subscribe`. `None` means the
    /// local caller is the head of the chain.
    pub upstream: Option<R>,

    /// Present only on head links (`upstream.is_none()`); absent on pass-through links,
    /// which are invisible to user code by design.
    pub callback: Option<Callback>,

    pub throttle: u32,
    counter: u32,
}

impl<R> Subscription<R> {
    pub fn new(path: String, id: CorrelationId, downstream: Option<R>, upstream: Option<R>, callback: Option<Callback>, throttle: u32) -> Self {
        Self {
            path,
            id,
            downstream,
            upstream,
            callback,
            throttle: throttle.max(1),
            counter: 0,
        }
    }

    /// No upstream: the local caller (or, for a wire `subscribe`, nobody further up than
    /// this store) owns the head of the chain.
    pub fn is_head(&self) -> bool {
        self.upstream.is_none()
    }

    /// Has an upstream: this link exists only to re-emit events back up the chain. It
    /// carries no user-visible callback and ignores throttling — the head applies its own.
    pub fn is_pass_through(&self) -> bool {
        self.upstream.is_some()
    }

    /// No downstream: this store holds the data (or receives wire `event`s) directly,
    /// rather than forwarding the subscribe further down a mount.
    pub fn is_terminal(&self) -> bool {
        self.downstream.is_none()
    }

    /// Head and terminal at once: a subscription entirely local to this store.
    pub fn is_local(&self) -> bool {
        self.is_head() && self.is_terminal()
    }

    /// Advances the throttle counter and reports whether this delivery should fire.
    /// The first call always fires; thereafter every Nth does. Only meaningful for
    /// terminal links — pass-through links must forward every event unthrottled so the
    /// head can apply its own throttle.
    pub fn tick(&mut self) -> bool {
        let fire = self.counter == 0;
        self.counter = (self.counter + 1) % self.throttle;
        fire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_one_fires_every_time() {
        let mut sub: Subscription<()> = Subscription::new("a".into(), CorrelationId::nil(), None, None, None, 1);
        for _ in 0..5 {
            assert!(sub.tick());
        }
    }

    #[test]
    fn throttle_n_fires_on_first_and_every_nth() {
        let mut sub: Subscription<()> = Subscription::new("a".into(), CorrelationId::nil(), None, None, None, 2);
        let fires: Vec<bool> = (0..4).map(|_| sub.tick()).collect();
        assert_eq!(fires, vec![true, false, true, false]);
    }

    #[test]
    fn role_classification() {
        let head_local: Subscription<&str> = Subscription::new("a".into(), CorrelationId::nil(), None, None, None, 1);
        assert!(head_local.is_head());
        assert!(head_local.is_terminal());
        assert!(head_local.is_local());

        let pass_through: Subscription<&str> = Subscription::new("a".into(), CorrelationId::nil(), Some("down"), Some("up"), None, 1);
        assert!(pass_through.is_pass_through());
        assert!(!pass_through.is_terminal());
        assert!(!pass_through.is_local());
    }
}
