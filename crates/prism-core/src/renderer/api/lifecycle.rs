// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The resource lifecycle state machine.
//!
//! Every GPU-backed resource moves through the same small set of states.
//! Declaring or mutating a resource only ever flips it back to
//! [`ResourceState::ToBeUpdated`]; the backend performs the actual allocation
//! the next time the render thread binds the resource ("realize on bind").
//!
//! The transitions are an explicit table ([`transition`]) rather than
//! behaviour spread over backend code, so the whole machine can be
//! enumerated and tested without a device.

use super::ids::{NativeHandle, ResourceKind};
use crate::renderer::error::LifecycleError;
use bitflags::bitflags;

/// The lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Declared or invalidated; the native object is missing or stale.
    ToBeUpdated,
    /// The native object exists and matches the declared data.
    Ready,
    /// Realization failed. The resource is non-functional until its inputs
    /// change again.
    Failed,
    /// Destruction was requested; the backend still owns a native object.
    Unloading,
    /// Terminal. The native object is gone.
    ToBeDeleted,
}

impl ResourceState {
    /// Every state, for table enumeration.
    pub const ALL: [ResourceState; 5] = [
        ResourceState::ToBeUpdated,
        ResourceState::Ready,
        ResourceState::Failed,
        ResourceState::Unloading,
        ResourceState::ToBeDeleted,
    ];

    /// Returns `true` once destruction has been requested.
    pub fn is_dying(&self) -> bool {
        matches!(self, ResourceState::Unloading | ResourceState::ToBeDeleted)
    }
}

/// Something that happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The declared inputs changed.
    Invalidate,
    /// The backend created the native object.
    Realized,
    /// The backend could not create the native object.
    RealizationFailed,
    /// The owner asked for the resource to go away.
    RequestDestroy,
    /// The backend released the native object.
    Destroyed,
}

impl LifecycleEvent {
    /// Every event, for table enumeration.
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::Invalidate,
        LifecycleEvent::Realized,
        LifecycleEvent::RealizationFailed,
        LifecycleEvent::RequestDestroy,
        LifecycleEvent::Destroyed,
    ];
}

bitflags! {
    /// Side effects the registry must carry out after a transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Effects: u8 {
        /// Every dependent resource must be invalidated too.
        const INVALIDATE_DEPENDENTS = 1 << 0;
        /// The backend must destroy the native object exactly once.
        const SCHEDULE_DESTROY = 1 << 1;
    }
}

/// The outcome of applying an event to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move to `next` and carry out `effects`.
    Move {
        /// The new state.
        next: ResourceState,
        /// What the registry must do about it.
        effects: Effects,
    },
    /// Nothing changes. Repeated declarations and repeated destroy requests
    /// land here.
    Stay,
    /// The event is illegal in this state.
    Rejected,
}

/// The lifecycle transition table.
pub fn transition(kind: ResourceKind, from: ResourceState, event: LifecycleEvent) -> Step {
    use LifecycleEvent as E;
    use ResourceState as S;

    let dependents = if kind == ResourceKind::Mesh {
        Effects::empty()
    } else {
        Effects::INVALIDATE_DEPENDENTS
    };

    // Native targets wrap a surface the abstraction does not own.
    if kind == ResourceKind::NativeRenderTarget {
        match (from, event) {
            (S::Ready, E::Invalidate) => return Step::Stay,
            (S::ToBeUpdated | S::Ready | S::Failed, E::RequestDestroy) => {
                return Step::Move {
                    next: S::ToBeDeleted,
                    effects: Effects::empty(),
                }
            }
            _ => {}
        }
    }

    match (from, event) {
        (S::ToBeUpdated, E::Invalidate) => Step::Stay,
        (S::ToBeUpdated, E::Realized) => Step::Move {
            next: S::Ready,
            effects: Effects::empty(),
        },
        (S::ToBeUpdated, E::RealizationFailed) => Step::Move {
            next: S::Failed,
            effects: Effects::empty(),
        },

        (S::Ready | S::Failed, E::Invalidate) => Step::Move {
            next: S::ToBeUpdated,
            effects: dependents,
        },
        (S::Ready, E::Realized) => Step::Stay,
        (S::Failed, E::RealizationFailed) => Step::Stay,

        (S::ToBeUpdated | S::Ready | S::Failed, E::RequestDestroy) => Step::Move {
            next: S::Unloading,
            effects: dependents | Effects::SCHEDULE_DESTROY,
        },

        (S::Unloading, E::Destroyed) => Step::Move {
            next: S::ToBeDeleted,
            effects: Effects::empty(),
        },
        (S::Unloading | S::ToBeDeleted, E::Invalidate | E::RequestDestroy) => Step::Stay,
        (S::ToBeDeleted, E::Destroyed) => Step::Stay,

        _ => Step::Rejected,
    }
}

/// Per-resource lifecycle bookkeeping kept by the registry.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    kind: ResourceKind,
    state: ResourceState,
    handle: Option<NativeHandle>,
    ref_count: u32,
    generation: u64,
}

impl Lifecycle {
    /// A freshly declared resource: `ToBeUpdated`, one reference, generation 0.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            state: ResourceState::ToBeUpdated,
            handle: None,
            ref_count: 1,
            generation: 0,
        }
    }

    /// The kind driving this lifecycle's table.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The current state.
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Number of times the resource was invalidated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The native handle. Always `None` unless the state is `Ready`.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        match self.state {
            ResourceState::Ready => self.handle,
            _ => None,
        }
    }

    /// Outstanding references.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Applies `event` and returns the effects to carry out.
    ///
    /// `Stay` yields no effects. `Rejected` is reported as an error and
    /// leaves the lifecycle untouched.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Effects, LifecycleError> {
        match transition(self.kind, self.state, event) {
            Step::Move { next, effects } => {
                if event == LifecycleEvent::Invalidate {
                    self.generation += 1;
                }
                if next != ResourceState::Ready {
                    self.handle = None;
                }
                self.state = next;
                Ok(effects)
            }
            Step::Stay => Ok(Effects::empty()),
            Step::Rejected => Err(LifecycleError {
                kind: self.kind,
                state: self.state,
                event,
            }),
        }
    }

    /// Records a successful realization with its handle.
    pub fn realize(&mut self, handle: NativeHandle) -> Result<(), LifecycleError> {
        self.apply(LifecycleEvent::Realized)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Adds a reference.
    pub fn retain(&mut self) {
        self.ref_count = self.ref_count.saturating_add(1);
    }

    /// Drops a reference. Returns `true` when it was the last one.
    pub fn release(&mut self) -> bool {
        if self.ref_count == 0 {
            return false;
        }
        self.ref_count -= 1;
        self.ref_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_total_and_never_leaves_deleted() {
        for kind in ResourceKind::ALL {
            for state in ResourceState::ALL {
                for event in LifecycleEvent::ALL {
                    let step = transition(kind, state, event);
                    if state == ResourceState::ToBeDeleted {
                        assert!(
                            !matches!(step, Step::Move { .. }),
                            "{kind:?} left ToBeDeleted on {event:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn realization_never_stays_in_to_be_updated() {
        for kind in ResourceKind::ALL {
            for event in [LifecycleEvent::Realized, LifecycleEvent::RealizationFailed] {
                match transition(kind, ResourceState::ToBeUpdated, event) {
                    Step::Move { next, .. } => assert_ne!(next, ResourceState::ToBeUpdated),
                    other => panic!("{kind:?} {event:?} gave {other:?}"),
                }
            }
        }
    }

    #[test]
    fn destroy_is_scheduled_exactly_once() {
        let mut lifecycle = Lifecycle::new(ResourceKind::Texture);
        lifecycle.realize(NativeHandle::new(7)).unwrap();

        let first = lifecycle.apply(LifecycleEvent::RequestDestroy).unwrap();
        assert!(first.contains(Effects::SCHEDULE_DESTROY));
        assert_eq!(lifecycle.state(), ResourceState::Unloading);

        let second = lifecycle.apply(LifecycleEvent::RequestDestroy).unwrap();
        assert!(second.is_empty());

        lifecycle.apply(LifecycleEvent::Destroyed).unwrap();
        assert_eq!(lifecycle.state(), ResourceState::ToBeDeleted);
        assert!(lifecycle
            .apply(LifecycleEvent::RequestDestroy)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn handle_is_hidden_outside_ready() {
        let mut lifecycle = Lifecycle::new(ResourceKind::Mesh);
        assert_eq!(lifecycle.native_handle(), None);
        lifecycle.realize(NativeHandle::new(3)).unwrap();
        assert_eq!(lifecycle.native_handle(), Some(NativeHandle::new(3)));

        lifecycle.apply(LifecycleEvent::Invalidate).unwrap();
        assert_eq!(lifecycle.state(), ResourceState::ToBeUpdated);
        assert_eq!(lifecycle.native_handle(), None);
        assert_eq!(lifecycle.generation(), 1);
    }

    #[test]
    fn failed_resources_recover_through_invalidation() {
        let mut lifecycle = Lifecycle::new(ResourceKind::Material);
        lifecycle.apply(LifecycleEvent::RealizationFailed).unwrap();
        assert_eq!(lifecycle.state(), ResourceState::Failed);
        assert!(lifecycle.apply(LifecycleEvent::Realized).is_err());

        let effects = lifecycle.apply(LifecycleEvent::Invalidate).unwrap();
        assert!(effects.contains(Effects::INVALIDATE_DEPENDENTS));
        assert_eq!(lifecycle.state(), ResourceState::ToBeUpdated);
    }

    #[test]
    fn native_targets_ignore_invalidation_and_skip_destruction() {
        let mut lifecycle = Lifecycle::new(ResourceKind::NativeRenderTarget);
        lifecycle.realize(NativeHandle::new(1)).unwrap();
        assert!(lifecycle
            .apply(LifecycleEvent::Invalidate)
            .unwrap()
            .is_empty());
        assert_eq!(lifecycle.state(), ResourceState::Ready);

        let effects = lifecycle.apply(LifecycleEvent::RequestDestroy).unwrap();
        assert!(!effects.contains(Effects::SCHEDULE_DESTROY));
        assert_eq!(lifecycle.state(), ResourceState::ToBeDeleted);
    }

    #[test]
    fn mesh_invalidation_has_no_dependents() {
        assert_eq!(
            transition(
                ResourceKind::Mesh,
                ResourceState::Ready,
                LifecycleEvent::Invalidate
            ),
            Step::Move {
                next: ResourceState::ToBeUpdated,
                effects: Effects::empty()
            }
        );
    }

    #[test]
    fn release_reports_last_reference() {
        let mut lifecycle = Lifecycle::new(ResourceKind::Texture);
        lifecycle.retain();
        assert!(!lifecycle.release());
        assert!(lifecycle.release());
        assert!(!lifecycle.release());
    }
}
