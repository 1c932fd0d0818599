//! Two-tier subscription state machine.
//!
//! The machine decides which collection to listen to; it never talks to the
//! network. Callers feed it [`SubscriptionInput`]s and execute the returned
//! [`Command`]s in order.
//!
//! ```text
//! Idle ──identity──► ListeningRoot ──error / first snapshot empty──► ListeningUser
//!  ▲                      │                                             │
//!  └──────revoked─────────┴─────────────────revoked─────────────────────┘
//! ```
//!
//! Fallback to the per-user collection is sticky for the session: root
//! deliveries carry an epoch that is stale once the machine has moved on.

use crate::{Origin, UserId};
use serde::{Deserialize, Serialize};

/// Generation number attached to a subscription when it is created.
pub type Epoch = u64;

/// Which collection a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The shared collection
    Root,
    /// The per-user fallback collection
    User,
}

/// Collection paths for both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPaths {
    pub root: String,
    /// Per-user path, `{uid}` is replaced by the user id
    pub user_template: String,
}

impl Default for CollectionPaths {
    fn default() -> Self {
        Self {
            root: "rooms".to_string(),
            user_template: "users/{uid}/rooms".to_string(),
        }
    }
}

impl CollectionPaths {
    pub fn new(root: impl Into<String>, user_template: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            user_template: user_template.into(),
        }
    }

    pub fn for_tier(&self, tier: Tier, user: &str) -> String {
        match tier {
            Tier::Root => self.root.clone(),
            Tier::User => self.user_template.replace("{uid}", user),
        }
    }
}

/// Where the machine currently listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    ListeningRoot {
        user: UserId,
        epoch: Epoch,
        /// Whether a server snapshot has arrived on this subscription yet
        seen_snapshot: bool,
    },
    ListeningUser {
        user: UserId,
        epoch: Epoch,
    },
}

/// Something that happened to the engine or one of its subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionInput {
    IdentityAvailable(UserId),
    IdentityRevoked,
    BatchReceived {
        epoch: Epoch,
        origin: Origin,
        is_empty: bool,
    },
    SubscriptionFailed {
        epoch: Epoch,
        message: String,
    },
}

/// An action the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stop the subscription with this epoch
    Cancel { epoch: Epoch },
    /// Empty the local state store
    ClearState,
    /// Start listening to `path`
    Subscribe { epoch: Epoch, tier: Tier, path: String },
    /// Fold the batch that produced this command
    Deliver { epoch: Epoch },
    /// Surface an error to the user
    ReportError { message: String },
}

/// The subscription manager's decision logic.
#[derive(Debug, Clone)]
pub struct SubscriptionMachine {
    paths: CollectionPaths,
    state: SubscriptionState,
    last_epoch: Epoch,
}

impl SubscriptionMachine {
    pub fn new(paths: CollectionPaths) -> Self {
        Self {
            paths,
            state: SubscriptionState::Idle,
            last_epoch: 0,
        }
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub fn paths(&self) -> &CollectionPaths {
        &self.paths
    }

    /// Epoch of the active subscription.
    pub fn current_epoch(&self) -> Option<Epoch> {
        match &self.state {
            SubscriptionState::Idle => None,
            SubscriptionState::ListeningRoot { epoch, .. }
            | SubscriptionState::ListeningUser { epoch, .. } => Some(*epoch),
        }
    }

    /// Whether deliveries tagged with `epoch` may still be folded.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current_epoch() == Some(epoch)
    }

    pub fn tier(&self) -> Option<Tier> {
        match &self.state {
            SubscriptionState::Idle => None,
            SubscriptionState::ListeningRoot { .. } => Some(Tier::Root),
            SubscriptionState::ListeningUser { .. } => Some(Tier::User),
        }
    }

    pub fn user(&self) -> Option<&str> {
        match &self.state {
            SubscriptionState::Idle => None,
            SubscriptionState::ListeningRoot { user, .. }
            | SubscriptionState::ListeningUser { user, .. } => Some(user),
        }
    }

    /// Path of the collection currently listened to.
    pub fn active_path(&self) -> Option<String> {
        Some(self.paths.for_tier(self.tier()?, self.user()?))
    }

    pub fn is_listening(&self) -> bool {
        self.state != SubscriptionState::Idle
    }

    /// Advance the machine.
    pub fn handle(&mut self, input: SubscriptionInput) -> Vec<Command> {
        match input {
            SubscriptionInput::IdentityAvailable(user) => self.on_identity(user),
            SubscriptionInput::IdentityRevoked => self.on_revoked(),
            SubscriptionInput::BatchReceived {
                epoch,
                origin,
                is_empty,
            } => self.on_batch(epoch, origin, is_empty),
            SubscriptionInput::SubscriptionFailed { epoch, message } => {
                self.on_failure(epoch, message)
            }
        }
    }

    fn on_identity(&mut self, user: UserId) -> Vec<Command> {
        if self.user() == Some(user.as_str()) {
            return Vec::new();
        }

        let mut commands = self.teardown();
        let epoch = self.next_epoch();
        commands.push(Command::Subscribe {
            epoch,
            tier: Tier::Root,
            path: self.paths.for_tier(Tier::Root, &user),
        });
        tracing::info!(user = %user, epoch, "listening to root collection");
        self.state = SubscriptionState::ListeningRoot {
            user,
            epoch,
            seen_snapshot: false,
        };
        commands
    }

    fn on_revoked(&mut self) -> Vec<Command> {
        let commands = self.teardown();
        if !commands.is_empty() {
            tracing::info!("identity revoked, subscription stopped");
        }
        commands
    }

    fn on_batch(&mut self, epoch: Epoch, origin: Origin, is_empty: bool) -> Vec<Command> {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, "dropping batch from cancelled subscription");
            return Vec::new();
        }

        let promote = match &mut self.state {
            SubscriptionState::ListeningRoot { seen_snapshot, .. } if origin == Origin::FromServer => {
                let first = !*seen_snapshot;
                *seen_snapshot = true;
                first && is_empty
            }
            _ => false,
        };

        if promote {
            tracing::info!(epoch, "root collection is empty, falling back to user collection");
            return self.fall_back(epoch);
        }

        vec![Command::Deliver { epoch }]
    }

    fn on_failure(&mut self, epoch: Epoch, message: String) -> Vec<Command> {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, %message, "ignoring error from cancelled subscription");
            return Vec::new();
        }

        match self.tier() {
            Some(Tier::Root) => {
                tracing::warn!(epoch, %message, "root subscription failed, falling back to user collection");
                let mut commands = self.fall_back(epoch);
                // Rooms from the shared collection would never be removed by
                // the user collection's events.
                if !commands.is_empty() {
                    commands.insert(1, Command::ClearState);
                }
                commands
            }
            Some(Tier::User) => {
                tracing::warn!(epoch, %message, "user subscription failed");
                vec![Command::ReportError { message }]
            }
            None => Vec::new(),
        }
    }

    fn fall_back(&mut self, root_epoch: Epoch) -> Vec<Command> {
        let Some(user) = self.user().map(str::to_string) else {
            return Vec::new();
        };
        let epoch = self.next_epoch();
        let path = self.paths.for_tier(Tier::User, &user);
        self.state = SubscriptionState::ListeningUser { user, epoch };
        vec![
            Command::Cancel { epoch: root_epoch },
            Command::Subscribe {
                epoch,
                tier: Tier::User,
                path,
            },
        ]
    }

    fn teardown(&mut self) -> Vec<Command> {
        match self.current_epoch() {
            Some(epoch) => {
                self.state = SubscriptionState::Idle;
                vec![Command::Cancel { epoch }, Command::ClearState]
            }
            None => Vec::new(),
        }
    }

    fn next_epoch(&mut self) -> Epoch {
        self.last_epoch += 1;
        self.last_epoch
    }
}

impl Default for SubscriptionMachine {
    fn default() -> Self {
        Self::new(CollectionPaths::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_in(user: &str) -> (SubscriptionMachine, Epoch) {
        let mut machine = SubscriptionMachine::default();
        let commands = machine.handle(SubscriptionInput::IdentityAvailable(user.into()));
        let epoch = machine.current_epoch().unwrap();
        assert_eq!(
            commands,
            vec![Command::Subscribe {
                epoch,
                tier: Tier::Root,
                path: "rooms".into()
            }]
        );
        (machine, epoch)
    }

    fn server_batch(epoch: Epoch, is_empty: bool) -> SubscriptionInput {
        SubscriptionInput::BatchReceived {
            epoch,
            origin: Origin::FromServer,
            is_empty,
        }
    }

    #[test]
    fn user_path_from_template() {
        let paths = CollectionPaths::default();
        assert_eq!(paths.for_tier(Tier::User, "u-42"), "users/u-42/rooms");
        assert_eq!(paths.for_tier(Tier::Root, "u-42"), "rooms");
    }

    #[test]
    fn non_empty_root_keeps_listening() {
        let (mut machine, epoch) = signed_in("alice");
        let commands = machine.handle(server_batch(epoch, false));
        assert_eq!(commands, vec![Command::Deliver { epoch }]);

        // A later empty snapshot is not "first" any more
        let commands = machine.handle(server_batch(epoch, true));
        assert_eq!(commands, vec![Command::Deliver { epoch }]);
        assert_eq!(machine.tier(), Some(Tier::Root));
    }

    #[test]
    fn empty_first_snapshot_falls_back() {
        let (mut machine, root_epoch) = signed_in("alice");
        let commands = machine.handle(server_batch(root_epoch, true));

        let user_epoch = machine.current_epoch().unwrap();
        assert_ne!(user_epoch, root_epoch);
        assert_eq!(
            commands,
            vec![
                Command::Cancel { epoch: root_epoch },
                Command::Subscribe {
                    epoch: user_epoch,
                    tier: Tier::User,
                    path: "users/alice/rooms".into()
                }
            ]
        );
        assert_eq!(machine.active_path().as_deref(), Some("users/alice/rooms"));
    }

    #[test]
    fn empty_cache_snapshot_does_not_fall_back() {
        let (mut machine, epoch) = signed_in("alice");
        let commands = machine.handle(SubscriptionInput::BatchReceived {
            epoch,
            origin: Origin::FromCache,
            is_empty: true,
        });
        assert_eq!(commands, vec![Command::Deliver { epoch }]);
        assert_eq!(machine.tier(), Some(Tier::Root));
    }

    #[test]
    fn root_error_falls_back_and_clears() {
        let (mut machine, root_epoch) = signed_in("alice");
        machine.handle(server_batch(root_epoch, false));

        let commands = machine.handle(SubscriptionInput::SubscriptionFailed {
            epoch: root_epoch,
            message: "permission denied".into(),
        });
        assert_eq!(commands[0], Command::Cancel { epoch: root_epoch });
        assert_eq!(commands[1], Command::ClearState);
        assert!(matches!(
            commands[2],
            Command::Subscribe {
                tier: Tier::User,
                ..
            }
        ));
        assert!(!commands
            .iter()
            .any(|c| matches!(c, Command::ReportError { .. })));
    }

    #[test]
    fn fallback_is_sticky() {
        let (mut machine, root_epoch) = signed_in("alice");
        machine.handle(server_batch(root_epoch, true));
        let user_epoch = machine.current_epoch().unwrap();

        // Late root deliveries and errors are ignored
        assert!(machine.handle(server_batch(root_epoch, false)).is_empty());
        assert!(machine
            .handle(SubscriptionInput::SubscriptionFailed {
                epoch: root_epoch,
                message: "late".into()
            })
            .is_empty());
        // User-tier empties do not move the machine either
        assert_eq!(
            machine.handle(server_batch(user_epoch, true)),
            vec![Command::Deliver { epoch: user_epoch }]
        );
        // Repeated sign-in for the same user keeps the fallback
        assert!(machine
            .handle(SubscriptionInput::IdentityAvailable("alice".into()))
            .is_empty());
        assert_eq!(machine.tier(), Some(Tier::User));
    }

    #[test]
    fn user_error_is_reported_without_state_change() {
        let (mut machine, root_epoch) = signed_in("alice");
        machine.handle(server_batch(root_epoch, true));
        let user_epoch = machine.current_epoch().unwrap();

        let commands = machine.handle(SubscriptionInput::SubscriptionFailed {
            epoch: user_epoch,
            message: "unavailable".into(),
        });
        assert_eq!(
            commands,
            vec![Command::ReportError {
                message: "unavailable".into()
            }]
        );
        assert_eq!(machine.current_epoch(), Some(user_epoch));
    }

    #[test]
    fn revoke_cancels_and_clears() {
        let (mut machine, epoch) = signed_in("alice");
        let commands = machine.handle(SubscriptionInput::IdentityRevoked);
        assert_eq!(commands, vec![Command::Cancel { epoch }, Command::ClearState]);
        assert_eq!(machine.state(), &SubscriptionState::Idle);

        // Idempotent
        assert!(machine.handle(SubscriptionInput::IdentityRevoked).is_empty());
        assert!(machine.handle(server_batch(epoch, false)).is_empty());
    }

    #[test]
    fn new_session_starts_at_root() {
        let (mut machine, root_epoch) = signed_in("alice");
        machine.handle(server_batch(root_epoch, true));
        machine.handle(SubscriptionInput::IdentityRevoked);

        machine.handle(SubscriptionInput::IdentityAvailable("alice".into()));
        assert_eq!(machine.tier(), Some(Tier::Root));
    }

    #[test]
    fn switching_user_replaces_subscription() {
        let (mut machine, epoch) = signed_in("alice");
        let commands = machine.handle(SubscriptionInput::IdentityAvailable("bob".into()));
        let next = machine.current_epoch().unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Cancel { epoch },
                Command::ClearState,
                Command::Subscribe {
                    epoch: next,
                    tier: Tier::Root,
                    path: "rooms".into()
                }
            ]
        );
        assert_eq!(machine.user(), Some("bob"));
    }

    #[test]
    fn epochs_increase() {
        let (mut machine, first) = signed_in("alice");
        machine.handle(SubscriptionInput::IdentityRevoked);
        machine.handle(SubscriptionInput::IdentityAvailable("alice".into()));
        assert!(machine.current_epoch().unwrap() > first);
    }
}
