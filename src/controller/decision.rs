//! Diff & decision for one (program, target) pair
//!
//! Evaluated fresh on every pass from what bpfd reports, the program
//! resource and the node. Nothing about earlier passes is consulted except
//! whether the BpfProgram already records the id.

/// What the driver observed for one target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// bpfd reports a program under this id
    pub loaded: bool,
    /// The program resource or its BpfProgram is being deleted
    pub deleting: bool,
    /// The node matches the program's node selector
    pub selected: bool,
    /// The reported attach info equals the desired one.
    /// Only meaningful when `loaded` is true.
    pub matches: bool,
    /// The BpfProgram already records this id
    pub recorded: bool,
}

/// Action to take for one target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Nothing loaded and the program is going away: let the finalizer go
    ReleaseFinalizer,
    /// Nothing loaded and the node is not selected
    NotSelected,
    /// Load the program
    Load,
    /// Unload the program
    Unload,
    /// Loaded with different attach info: unload, then load
    Replace,
    /// Loaded and correct, but the BpfProgram lacks the entry
    RecordMaps,
    /// Loaded, correct and recorded
    Unchanged,
}

impl Decision {
    /// Returns true if the decision loads a program
    pub fn loads(self) -> bool {
        matches!(self, Self::Load | Self::Replace)
    }
}

/// Decide the action for one target
pub fn decide(o: Observation) -> Decision {
    let wanted = !o.deleting && o.selected;

    match (o.loaded, wanted) {
        (false, false) if o.deleting => Decision::ReleaseFinalizer,
        (false, false) => Decision::NotSelected,
        (false, true) => Decision::Load,
        (true, false) => Decision::Unload,
        (true, true) if !o.matches => Decision::Replace,
        (true, true) if !o.recorded => Decision::RecordMaps,
        (true, true) => Decision::Unchanged,
    }
}
