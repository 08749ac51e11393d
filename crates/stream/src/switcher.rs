use georebase_common::EntityId;
use serde::{Deserialize, Serialize};

/// Switcher policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitcherConfig {
    /// Wait for the target level to report loaded before making it current.
    pub require_loaded: bool,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            require_loaded: true,
        }
    }
}

/// Observable switcher bookkeeping changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitcherEvent {
    Registered(EntityId),
    Unregistered(EntityId),
    TargetChanged {
        old: Option<EntityId>,
        new: Option<EntityId>,
    },
    CurrentChanged {
        old: Option<EntityId>,
        new: Option<EntityId>,
    },
}

/// Result of one [`SubLevelSwitcher::update`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    /// Current already equals target.
    Idle,
    /// The previous current level was deactivated; nothing is current now.
    Deactivated(EntityId),
    /// Waiting for the target level to finish loading.
    WaitingForLoad(EntityId),
    /// The target became current.
    Activated(EntityId),
}

/// Tracks the sub-levels attached to one georeference and which of them is
/// current (its origin governs the georeference) versus targeted (about to
/// become current).
///
/// Switching happens in two steps so that there is always a window where
/// nothing is current and only the target is set.
#[derive(Debug, Default)]
pub struct SubLevelSwitcher {
    pub config: SwitcherConfig,
    registered: Vec<EntityId>,
    current: Option<EntityId>,
    target: Option<EntityId>,
    event_log: Vec<SwitcherEvent>,
}

impl SubLevelSwitcher {
    pub fn new(config: SwitcherConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Register a sub-level. Registering twice is a no-op.
    pub fn register_sub_level(&mut self, id: EntityId) {
        if self.registered.contains(&id) {
            return;
        }
        tracing::debug!(sub_level = %id.short(), "register sub-level");
        self.registered.push(id);
        self.event_log.push(SwitcherEvent::Registered(id));
    }

    /// Unregister a sub-level, clearing it from current and target.
    pub fn unregister_sub_level(&mut self, id: EntityId) {
        let Some(index) = self.registered.iter().position(|r| *r == id) else {
            return;
        };
        tracing::debug!(sub_level = %id.short(), "unregister sub-level");
        self.registered.remove(index);
        self.event_log.push(SwitcherEvent::Unregistered(id));

        if self.target == Some(id) {
            self.set_target_sub_level(None);
        }
        if self.current == Some(id) {
            self.set_current(None);
        }
    }

    pub fn registered(&self) -> &[EntityId] {
        &self.registered
    }

    pub fn is_registered(&self, id: EntityId) -> bool {
        self.registered.contains(&id)
    }

    pub fn current_sub_level(&self) -> Option<EntityId> {
        self.current
    }

    pub fn target_sub_level(&self) -> Option<EntityId> {
        self.target
    }

    /// Request a switch. The level need not be registered yet; newly created
    /// levels are targeted before their registration arrives.
    pub fn set_target_sub_level(&mut self, id: Option<EntityId>) {
        if self.target == id {
            return;
        }
        let old = self.target;
        self.target = id;
        tracing::debug!(?old, new = ?id, "switcher target changed");
        self.event_log
            .push(SwitcherEvent::TargetChanged { old, new: id });
    }

    fn set_current(&mut self, id: Option<EntityId>) {
        let old = self.current;
        self.current = id;
        self.event_log
            .push(SwitcherEvent::CurrentChanged { old, new: id });
    }

    /// Advance the transition by one step.
    ///
    /// `is_loaded` reports whether a level's content is streamed in.
    pub fn update(&mut self, is_loaded: impl Fn(EntityId) -> bool) -> SwitchPhase {
        let _span = tracing::debug_span!("switcher_update").entered();

        if self.current == self.target {
            return SwitchPhase::Idle;
        }

        if let Some(current) = self.current {
            tracing::info!(sub_level = %current.short(), "deactivating sub-level");
            self.set_current(None);
            return SwitchPhase::Deactivated(current);
        }

        let Some(target) = self.target else {
            return SwitchPhase::Idle;
        };

        if self.config.require_loaded && !is_loaded(target) {
            return SwitchPhase::WaitingForLoad(target);
        }

        tracing::info!(sub_level = %target.short(), "activating sub-level");
        self.set_current(Some(target));
        SwitchPhase::Activated(target)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SwitcherEvent] {
        &self.event_log
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SwitcherEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// How many times `id` was registered, per the event log.
    pub fn registration_count(&self, id: EntityId) -> usize {
        self.event_log
            .iter()
            .filter(|e| **e == SwitcherEvent::Registered(id))
            .count()
    }

    /// How many times `id` was unregistered, per the event log.
    pub fn unregistration_count(&self, id: EntityId) -> usize {
        self.event_log
            .iter()
            .filter(|e| **e == SwitcherEvent::Unregistered(id))
            .count()
    }
}
