use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a watch loop is in its cycle.
///
/// `Idle -> Listing -> Diffing -> Notifying -> Idle`, with `Cancelling`
/// reachable from the first three on shutdown and `Terminated` final.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    #[default]
    Idle,
    Listing,
    Diffing,
    Notifying,
    Cancelling,
    Terminated,
}

impl WatchState {
    /// `true` once the loop will run no further cycles.
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }

    /// Whether a loop in this state may move to `next`. Staying put is
    /// always allowed, except that nothing leaves `Terminated`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use WatchState::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Terminated, _) => false,
            (Idle | Listing | Diffing | Notifying, Cancelling) => true,
            (Cancelling, Terminated) => true,
            (Idle, Listing) => true,
            (Listing, Diffing | Idle | Terminated) => true,
            (Diffing, Notifying | Idle) => true,
            (Notifying, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listing => "listing",
            Self::Diffing => "diffing",
            Self::Notifying => "notifying",
            Self::Cancelling => "cancelling",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::WatchState::*;

    #[test]
    fn cycle_path_is_allowed() {
        let path = [Idle, Listing, Diffing, Notifying, Idle];
        assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
    }

    #[test]
    fn shutdown_goes_through_cancelling() {
        for state in [Idle, Listing, Diffing, Notifying] {
            assert!(state.can_transition_to(Cancelling));
        }
        assert!(Cancelling.can_transition_to(Terminated));
        assert!(!Idle.can_transition_to(Terminated));
        assert!(!Notifying.can_transition_to(Terminated));
    }

    #[test]
    fn fatal_listing_terminates_directly() {
        assert!(Listing.can_transition_to(Terminated));
    }

    #[test]
    fn terminated_is_final() {
        assert!(Terminated.is_terminal());
        assert!(!Cancelling.is_terminal());
        for state in [Idle, Listing, Diffing, Notifying, Cancelling] {
            assert!(!Terminated.can_transition_to(state));
        }
        assert!(Terminated.can_transition_to(Terminated));
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Notifying).unwrap(), "\"notifying\"");
        assert_eq!(Cancelling.to_string(), "cancelling");
    }
}
