//! Explicit state machine for a bet's lifecycle.
//!
//! Mirrors the closed-form transition table in the design rather than
//! scattering `if status == "open"` checks through the engine: every
//! legal move is listed once in [`BetState::apply`], and anything else
//! returns [`TransitionError`].

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetState {
    Open,
    Closed,
    Resolving,
    Resolved,
    Cancelled,
}

impl BetState {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Some(match s {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "resolving" => Self::Resolving,
            "resolved" => Self::Resolved,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetEvent {
    /// `closesAt` has passed; no new buys accepted. Sells remain legal.
    Close,
    /// Admin triggered resolution; a payout job now owns settlement.
    Resolve,
    /// Admin cancelled the bet outright; all open positions refund.
    Cancel,
    /// The payout worker finished settlement successfully.
    WorkerSucceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: BetState,
    pub event: BetEvent,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal bet transition: {:?} + {:?}",
            self.from, self.event
        )
    }
}

impl std::error::Error for TransitionError {}

impl BetState {
    /// Apply `event`, returning the resulting state or the reason the
    /// transition is illegal from the current state.
    pub fn apply(self, event: BetEvent) -> Result<BetState, TransitionError> {
        use BetEvent::*;
        use BetState::*;

        let next = match (self, event) {
            (Open, Close) => Closed,
            (Open, Resolve) | (Closed, Resolve) => Resolving,
            (Open, Cancel) | (Closed, Cancel) => Cancelled,
            (Resolving, WorkerSucceeded) => Resolved,
            _ => return Err(TransitionError { from: self, event }),
        };
        Ok(next)
    }

    /// Bet is accepting new buys: only while `Open` and not past `closesAt`.
    /// Callers check the time bound separately; this only reflects status.
    pub fn buy_allowed(self) -> bool {
        matches!(self, BetState::Open)
    }

    /// Sell (early cash-out) is legal any time before resolution begins.
    pub fn sell_allowed(self) -> bool {
        matches!(self, BetState::Open | BetState::Closed)
    }

    /// Cancel is legal any time before resolution begins or completes.
    pub fn cancel_allowed(self) -> bool {
        matches!(self, BetState::Open | BetState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_from_open_enters_resolving() {
        assert_eq!(BetState::Open.apply(BetEvent::Resolve), Ok(BetState::Resolving));
    }

    #[test]
    fn sell_forbidden_once_resolving() {
        assert!(!BetState::Resolving.sell_allowed());
        assert!(BetState::Open.sell_allowed());
        assert!(BetState::Closed.sell_allowed());
    }

    #[test]
    fn cancel_from_resolved_is_illegal() {
        let err = BetState::Resolved.apply(BetEvent::Cancel).unwrap_err();
        assert_eq!(err.from, BetState::Resolved);
        assert_eq!(err.event, BetEvent::Cancel);
    }

    #[test]
    fn resolve_twice_is_illegal() {
        assert!(BetState::Resolving.apply(BetEvent::Resolve).is_err());
    }
}
