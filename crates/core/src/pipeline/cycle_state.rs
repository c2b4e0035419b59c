/// Where the coordinator is within one perception cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CycleState {
    #[default]
    Idle,
    CapturingFrame,
    Inferring,
    Matching,
    Dispatching,
}

impl CycleState {
    /// The state a successful cycle moves to next.
    pub fn next(self) -> Self {
        match self {
            CycleState::Idle => CycleState::CapturingFrame,
            CycleState::CapturingFrame => CycleState::Inferring,
            CycleState::Inferring => CycleState::Matching,
            CycleState::Matching => CycleState::Dispatching,
            CycleState::Dispatching => CycleState::Idle,
        }
    }

    /// Stage name used for timings.
    pub fn stage(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::CapturingFrame => "capture",
            CycleState::Inferring => "inference",
            CycleState::Matching => "matching",
            CycleState::Dispatching => "dispatch",
        }
    }
}
