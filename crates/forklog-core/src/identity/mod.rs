//! Identity monitoring and transition classification.
//!
//! The auth provider glue publishes every identity it observes into an
//! [`IdentityMonitor`]. The monitor classifies the change and notifies
//! subscribers; it never touches either store.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{AccountId, Identity};

/// An identity change that requires reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unauthenticated or anonymous to a real account.
    FirstSignIn { account: AccountId },
    /// One real account to a different real account.
    AccountSwitch { from: AccountId, to: AccountId },
    /// A real account to anonymous or unauthenticated.
    SignOut { from: AccountId },
}

/// Classify the change from `previous` to `current`.
///
/// Returns `None` when no store work is needed: the same account, or moves
/// between anonymous and unauthenticated (both local-only).
pub fn classify(previous: &Identity, current: &Identity) -> Option<Transition> {
    match (previous.account_id(), current.account_id()) {
        (None, Some(account)) => Some(Transition::FirstSignIn {
            account: account.clone(),
        }),
        (Some(from), Some(to)) if from != to => Some(Transition::AccountSwitch {
            from: from.clone(),
            to: to.clone(),
        }),
        (Some(from), None) => Some(Transition::SignOut { from: from.clone() }),
        _ => None,
    }
}

/// Synchronous read access to the current identity.
pub trait IdentitySource: Send + Sync {
    fn current_identity(&self) -> Identity;
}

/// A fixed identity, for callers that already resolved it.
impl IdentitySource for Identity {
    fn current_identity(&self) -> Identity {
        self.clone()
    }
}

/// Holds the current identity and broadcasts changes.
#[derive(Debug, Clone)]
pub struct IdentityMonitor {
    sender: Arc<watch::Sender<Identity>>,
}

impl Default for IdentityMonitor {
    fn default() -> Self {
        Self::new(Identity::Unauthenticated)
    }
}

impl IdentityMonitor {
    pub fn new(initial: Identity) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish the identity reported by the auth provider.
    ///
    /// Returns the classified transition; subscribers are only woken when the
    /// identity actually changed.
    pub fn set_identity(&self, identity: Identity) -> Option<Transition> {
        let mut transition = None;
        self.sender.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            transition = classify(current, &identity);
            tracing::info!(
                "Identity changed: {} -> {} ({:?})",
                current,
                identity,
                transition
            );
            *current = identity;
            true
        });
        transition
    }

    /// Subscribe to identity changes from this point on.
    pub fn subscribe(&self) -> IdentityChanges {
        let mut receiver = self.sender.subscribe();
        let last = receiver.borrow_and_update().clone();
        IdentityChanges { receiver, last }
    }
}

impl IdentitySource for IdentityMonitor {
    fn current_identity(&self) -> Identity {
        self.sender.borrow().clone()
    }
}

/// One observed identity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityChange {
    pub previous: Identity,
    pub current: Identity,
    pub transition: Option<Transition>,
}

/// Stream of identity changes. Changes published faster than they are
/// consumed collapse into one, classified from the last consumed identity.
#[derive(Debug)]
pub struct IdentityChanges {
    receiver: watch::Receiver<Identity>,
    last: Identity,
}

impl IdentityChanges {
    /// Wait for the next change. Returns `None` once the monitor is dropped.
    pub async fn next(&mut self) -> Option<IdentityChange> {
        loop {
            self.receiver.changed().await.ok()?;
            let current = self.receiver.borrow_and_update().clone();
            if current == self.last {
                continue;
            }
            let previous = std::mem::replace(&mut self.last, current.clone());
            return Some(IdentityChange {
                transition: classify(&previous, &current),
                previous,
                current,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn real(id: &str) -> Identity {
        Identity::real(id).unwrap()
    }

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    #[test]
    fn classifies_first_sign_in_from_none_and_anonymous() {
        let expected = Some(Transition::FirstSignIn {
            account: account("a"),
        });
        assert_eq!(classify(&Identity::Unauthenticated, &real("a")), expected);
        assert_eq!(classify(&Identity::Anonymous, &real("a")), expected);
    }

    #[test]
    fn classifies_account_switch() {
        assert_eq!(
            classify(&real("a"), &real("b")),
            Some(Transition::AccountSwitch {
                from: account("a"),
                to: account("b"),
            })
        );
        assert_eq!(classify(&real("a"), &real("a")), None);
    }

    #[test]
    fn classifies_sign_out_to_none_and_anonymous() {
        let expected = Some(Transition::SignOut { from: account("a") });
        assert_eq!(classify(&real("a"), &Identity::Unauthenticated), expected);
        assert_eq!(classify(&real("a"), &Identity::Anonymous), expected);
    }

    #[test]
    fn local_only_moves_need_no_work() {
        assert_eq!(classify(&Identity::Unauthenticated, &Identity::Anonymous), None);
        assert_eq!(classify(&Identity::Anonymous, &Identity::Unauthenticated), None);
    }

    #[test]
    fn set_identity_reports_transition_and_ignores_repeats() {
        let monitor = IdentityMonitor::default();
        assert_eq!(monitor.set_identity(Identity::Anonymous), None);
        assert_eq!(
            monitor.set_identity(real("a")),
            Some(Transition::FirstSignIn {
                account: account("a")
            })
        );
        assert_eq!(monitor.set_identity(real("a")), None);
        assert_eq!(monitor.current_identity(), real("a"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_classified_changes() {
        let monitor = IdentityMonitor::new(real("a"));
        let mut changes = monitor.subscribe();

        monitor.set_identity(real("b"));
        let change = changes.next().await.unwrap();
        assert_eq!(change.previous, real("a"));
        assert_eq!(change.current, real("b"));
        assert_eq!(
            change.transition,
            Some(Transition::AccountSwitch {
                from: account("a"),
                to: account("b"),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stream_ends_when_monitor_dropped() {
        let monitor = IdentityMonitor::default();
        let mut changes = monitor.subscribe();
        drop(monitor);
        assert_eq!(changes.next().await, None);
    }
}
