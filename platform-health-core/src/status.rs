use serde::{Deserialize, Serialize};

/// Health verdict for a single response node (§3 "Response").
///
/// Ordering follows the severity order of §3/§4.4: `Healthy < Unhealthy <=
/// LoopDetected`; `Unknown` carries no signal of its own but is treated as
/// `Unhealthy` when aggregating (§4.4 "Aggregation rules").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Healthy,
    Unhealthy,
    LoopDetected,
    Unknown,
}

impl Status {
    /// Numeric severity used by aggregation; higher wins. `Unknown` maps to
    /// the same severity as `Unhealthy` so it degrades a parent exactly like
    /// an ordinary failure, while still being distinguishable on the leaf
    /// itself (§3 invariant).
    pub fn severity(self) -> u8 {
        match self {
            Status::Healthy => 0,
            Status::Unhealthy => 1,
            Status::Unknown => 1,
            Status::LoopDetected => 2,
        }
    }

    /// Merge two sibling statuses, keeping the worst one (§4.4 "Aggregation
    /// rules"). `LoopDetected` always wins regardless of which side it's on,
    /// which falls directly out of comparing severities. `Unknown` is a
    /// leaf-only verdict (§3 invariant); a merge never surfaces it, so a
    /// winning `Unknown` is normalized to `Unhealthy` here.
    pub fn combine(self, other: Status) -> Status {
        let winner = if other.severity() > self.severity() {
            other
        } else {
            self
        };
        if winner == Status::Unknown {
            Status::Unhealthy
        } else {
            winner
        }
    }

    /// Fold a sequence of child statuses into a parent status, starting from
    /// `Healthy` as required by §4.4.
    pub fn aggregate(children: impl IntoIterator<Item = Status>) -> Status {
        children
            .into_iter()
            .fold(Status::Healthy, |acc, child| acc.combine(child))
    }

    /// Exit-code predicate for §6 "Exit code convention".
    pub fn is_success(self) -> bool {
        matches!(self, Status::Healthy)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Healthy => "HEALTHY",
            Status::Unhealthy => "UNHEALTHY",
            Status::LoopDetected => "LOOP_DETECTED",
            Status::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_keeps_worst() {
        assert_eq!(Status::Healthy.combine(Status::Unhealthy), Status::Unhealthy);
        assert_eq!(Status::Unhealthy.combine(Status::Healthy), Status::Unhealthy);
        assert_eq!(
            Status::Unhealthy.combine(Status::LoopDetected),
            Status::LoopDetected
        );
    }

    #[test]
    fn loop_detected_wins_regardless_of_position() {
        let first = Status::aggregate([Status::LoopDetected, Status::Healthy, Status::Unhealthy]);
        let last = Status::aggregate([Status::Healthy, Status::Unhealthy, Status::LoopDetected]);
        assert_eq!(first, Status::LoopDetected);
        assert_eq!(last, Status::LoopDetected);
    }

    #[test]
    fn aggregate_of_all_healthy_is_healthy() {
        assert_eq!(
            Status::aggregate([Status::Healthy, Status::Healthy]),
            Status::Healthy
        );
    }

    #[test]
    fn unknown_degrades_like_unhealthy() {
        assert_eq!(
            Status::aggregate([Status::Healthy, Status::Unknown]).severity(),
            Status::Unhealthy.severity()
        );
    }

    /// §4.4: "UNKNOWN is treated as UNHEALTHY for aggregation purposes but
    /// preserved on leaves" — an aggregated node must never surface the
    /// literal `Unknown` variant, only leaves may.
    #[test]
    fn aggregating_a_lone_unknown_normalizes_to_unhealthy() {
        assert_eq!(Status::aggregate([Status::Unknown]), Status::Unhealthy);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Healthy),
            Just(Status::Unhealthy),
            Just(Status::LoopDetected),
            Just(Status::Unknown),
        ]
    }

    proptest! {
        /// Aggregating a set of statuses can never come out "healthier" than
        /// its worst member (§4.4 "Aggregation rules").
        #[test]
        fn aggregate_is_never_milder_than_its_worst_input(
            statuses in proptest::collection::vec(arb_status(), 1..8)
        ) {
            let aggregated = Status::aggregate(statuses.iter().copied());
            let worst = statuses.iter().map(|s| s.severity()).max().unwrap();
            prop_assert_eq!(aggregated.severity(), worst);
        }

        /// `aggregate` folds pairwise via `combine`, which is commutative on
        /// severity, so the result does not depend on input order.
        #[test]
        fn aggregate_is_order_independent(
            mut statuses in proptest::collection::vec(arb_status(), 0..8)
        ) {
            let forward = Status::aggregate(statuses.iter().copied());
            statuses.reverse();
            let backward = Status::aggregate(statuses.iter().copied());
            prop_assert_eq!(forward, backward);
        }
    }
}
