//! Password gate in front of every relay operation
//!
//! A caller moves from unauthenticated to awaiting-password with `/start`
//! and becomes authenticated after sending the shared secret. Membership
//! lasts until the process restarts.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Where a caller currently is in the authentication flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Never ran `/start`
    Unauthenticated,
    /// Ran `/start`, next text is compared to the secret
    AwaitingPassword,
    /// Passed the gate
    Authenticated,
}

/// Result of `/start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The caller was already authenticated
    AlreadyAuthenticated,
    /// The caller now has to send the secret
    PasswordRequested,
}

/// Result of a password submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordOutcome {
    /// Secret matched, caller is authenticated
    Accepted,
    /// Secret did not match, caller keeps awaiting the password
    Rejected,
    /// The caller never ran `/start`, nothing was compared
    NotRequested,
}

#[derive(Default)]
struct Members {
    authenticated: HashSet<i64>,
    awaiting_password: HashSet<i64>,
}

/// Process-wide authentication state shared by all handlers
///
/// Both sets live behind a single lock so a caller can never be observed
/// in both of them.
pub struct AuthGate {
    secret: String,
    members: Mutex<Members>,
}

impl AuthGate {
    /// Creates a gate guarding access with `secret`.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            members: Mutex::new(Members::default()),
        }
    }

    fn members(&self) -> MutexGuard<'_, Members> {
        // Every critical section leaves both sets consistent, so a poisoned
        // lock still holds valid data.
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of `user_id`.
    #[must_use]
    pub fn state(&self, user_id: i64) -> AuthState {
        let members = self.members();
        if members.authenticated.contains(&user_id) {
            AuthState::Authenticated
        } else if members.awaiting_password.contains(&user_id) {
            AuthState::AwaitingPassword
        } else {
            AuthState::Unauthenticated
        }
    }

    /// Returns `true` once `user_id` passed the gate.
    #[must_use]
    pub fn is_authenticated(&self, user_id: i64) -> bool {
        self.state(user_id) == AuthState::Authenticated
    }

    /// Handles `/start`: authenticated callers stay as they are, everyone
    /// else is asked for the password.
    pub fn start(&self, user_id: i64) -> StartOutcome {
        let mut members = self.members();
        if members.authenticated.contains(&user_id) {
            return StartOutcome::AlreadyAuthenticated;
        }
        members.awaiting_password.insert(user_id);
        StartOutcome::PasswordRequested
    }

    /// Compares `candidate` with the secret.
    ///
    /// Surrounding whitespace is ignored. There is no retry limit: a
    /// rejected caller keeps awaiting the password.
    pub fn submit_password(&self, user_id: i64, candidate: &str) -> PasswordOutcome {
        let mut members = self.members();
        if !members.awaiting_password.contains(&user_id) {
            return PasswordOutcome::NotRequested;
        }
        if candidate.trim() != self.secret {
            return PasswordOutcome::Rejected;
        }

        members.awaiting_password.remove(&user_id);
        members.authenticated.insert(user_id);
        drop(members);

        info!("User {user_id} authenticated successfully.");
        PasswordOutcome::Accepted
    }

    /// Number of authenticated callers.
    #[must_use]
    pub fn authenticated_count(&self) -> usize {
        self.members().authenticated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_flow() {
        let gate = AuthGate::new("s3cret");
        assert_eq!(gate.state(1), AuthState::Unauthenticated);

        assert_eq!(gate.start(1), StartOutcome::PasswordRequested);
        assert_eq!(gate.state(1), AuthState::AwaitingPassword);

        assert_eq!(gate.submit_password(1, "wrong"), PasswordOutcome::Rejected);
        assert_eq!(gate.state(1), AuthState::AwaitingPassword);

        assert_eq!(gate.submit_password(1, " s3cret\n"), PasswordOutcome::Accepted);
        assert_eq!(gate.state(1), AuthState::Authenticated);
        assert_eq!(gate.start(1), StartOutcome::AlreadyAuthenticated);
        assert_eq!(gate.authenticated_count(), 1);
    }

    #[test]
    fn test_users_are_independent() {
        let gate = AuthGate::new("pw");
        gate.start(1);
        gate.start(2);
        gate.submit_password(1, "pw");

        assert!(gate.is_authenticated(1));
        assert_eq!(gate.state(2), AuthState::AwaitingPassword);
        assert_eq!(gate.state(3), AuthState::Unauthenticated);
    }

    #[test]
    fn test_password_without_start_is_ignored() {
        let gate = AuthGate::new("pw");
        assert_eq!(gate.submit_password(9, "pw"), PasswordOutcome::NotRequested);
        assert_eq!(gate.state(9), AuthState::Unauthenticated);
    }

    #[test]
    fn test_secret_is_case_sensitive() {
        let gate = AuthGate::new("Secret");
        gate.start(5);
        assert_eq!(gate.submit_password(5, "secret"), PasswordOutcome::Rejected);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start(i64),
        Submit(i64, bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..8).prop_map(Op::Start),
            (0i64..8, any::<bool>()).prop_map(|(u, ok)| Op::Submit(u, ok)),
        ]
    }

    proptest! {
        #[test]
        fn membership_stays_disjoint(ops in prop::collection::vec(op(), 0..64)) {
            let gate = AuthGate::new("pw");
            for op in ops {
                match op {
                    Op::Start(user) => { gate.start(user); }
                    Op::Submit(user, correct) => {
                        let before = gate.state(user);
                        let outcome = gate.submit_password(user, if correct { "pw" } else { "nope" });
                        if before == AuthState::AwaitingPassword && !correct {
                            prop_assert_eq!(gate.state(user), AuthState::AwaitingPassword);
                        }
                        match before {
                            AuthState::AwaitingPassword if correct => {
                                prop_assert_eq!(outcome, PasswordOutcome::Accepted);
                                prop_assert_eq!(gate.state(user), AuthState::Authenticated);
                            }
                            AuthState::AwaitingPassword => {
                                prop_assert_eq!(outcome, PasswordOutcome::Rejected);
                            }
                            _ => {
                                prop_assert_eq!(outcome, PasswordOutcome::NotRequested);
                                prop_assert_eq!(gate.state(user), before);
                            }
                        }
                    }
                }
                let members = gate.members();
                prop_assert!(members.authenticated.is_disjoint(&members.awaiting_password));
            }
        }
    }
}
