//! BpfProgram Custom Resource Definition
//!
//! A BpfProgram is the per-node record of one program resource. The agent on
//! each node creates one for every XdpProgram, TcProgram or TracepointProgram
//! it reconciles, named `<program>-<node>`, owned by the program resource.
//! It records the ids loaded through bpfd with their pinned maps, and a
//! single condition describing the last outcome on that node.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus};

/// Label holding the name of the program resource that owns a BpfProgram
pub const OWNING_CONFIG_LABEL: &str = "owningConfig";

/// Label holding the node a BpfProgram belongs to
///
/// Label values are limited to [`LABEL_VALUE_MAX`] characters, so the agent
/// only runs on nodes whose name fits.
pub const NODE_LABEL: &str = "kubernetes.io/hostname";

/// Longest value the API server accepts for a label
pub const LABEL_VALUE_MAX: usize = 63;

/// Label holding the program type (`xdp`, `tc`, `tracepoint`)
pub const PROGRAM_TYPE_LABEL: &str = "bpfd.io/programType";

/// Pinned maps of one loaded program, map name to pin path
pub type ProgramMaps = BTreeMap<String, String>;

/// Specification for a BpfProgram
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "bpfd.io",
    version = "v1alpha1",
    kind = "BpfProgram",
    plural = "bpfprograms",
    shortname = "bpfprog",
    status = "BpfProgramStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".spec.node"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[0].type"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct BpfProgramSpec {
    /// Node this record belongs to
    pub node: String,

    /// Program type (`xdp`, `tc`, `tracepoint`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Loaded programs keyed by bpfd id
    #[serde(default)]
    pub programs: BTreeMap<String, ProgramMaps>,
}

/// Status for a BpfProgram
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BpfProgramStatus {
    /// Holds exactly one condition once the agent has reconciled the record
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl BpfProgramStatus {
    /// Type of the current condition, if any
    pub fn current(&self) -> Option<BpfProgramCondition> {
        self.conditions
            .first()
            .and_then(|c| BpfProgramCondition::from_type(&c.type_))
    }

    /// Replace the condition, returning false when the type is unchanged
    ///
    /// The transition time of an unchanged condition is kept so that a pass
    /// with the same outcome does not produce a write.
    pub fn set(&mut self, condition: BpfProgramCondition) -> bool {
        if self.conditions.len() == 1 && self.current() == Some(condition) {
            return false;
        }
        self.conditions = vec![condition.to_condition()];
        true
    }
}

/// The outcome recorded on a BpfProgram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BpfProgramCondition {
    /// Every selected program is loaded
    Loaded,
    /// bpfd failed to load a program
    NotLoaded,
    /// bpfd failed to unload a program
    NotUnloaded,
    /// The node's labels do not match the program's node selector
    NotSelected,
}

impl BpfProgramCondition {
    /// Condition type string
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Loaded => "Loaded",
            Self::NotLoaded => "NotLoaded",
            Self::NotUnloaded => "NotUnloaded",
            Self::NotSelected => "NotSelected",
        }
    }

    /// Machine-readable reason
    pub fn reason(self) -> &'static str {
        match self {
            Self::Loaded => "bpfdLoaded",
            Self::NotLoaded => "bpfdNotLoaded",
            Self::NotUnloaded => "bpfdNotUnloaded",
            Self::NotSelected => "nodeNotSelected",
        }
    }

    /// Human-readable message
    pub fn message(self) -> &'static str {
        match self {
            Self::Loaded => "Successfully loaded bpfProgram",
            Self::NotLoaded => "Failed to load bpfProgram",
            Self::NotUnloaded => "Failed to unload bpfProgram",
            Self::NotSelected => "This node is not selected to run the bpfProgram",
        }
    }

    /// Parse a condition type string
    pub fn from_type(s: &str) -> Option<Self> {
        match s {
            "Loaded" => Some(Self::Loaded),
            "NotLoaded" => Some(Self::NotLoaded),
            "NotUnloaded" => Some(Self::NotUnloaded),
            "NotSelected" => Some(Self::NotSelected),
            _ => None,
        }
    }

    /// Build the status condition with the current timestamp
    pub fn to_condition(self) -> Condition {
        Condition::new(
            self.type_name(),
            ConditionStatus::True,
            self.reason(),
            self.message(),
        )
    }
}

impl std::fmt::Display for BpfProgramCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

impl BpfProgram {
    /// Name of the record for a program resource on a node
    pub fn name_for(program: &str, node: &str) -> String {
        format!("{program}-{node}")
    }

    /// Check that a node name can be used as the [`NODE_LABEL`] value
    pub fn validate_node_name(node: &str) -> crate::Result<()> {
        if node.len() > LABEL_VALUE_MAX {
            return Err(crate::Error::validation(format!(
                "node name {node} does not fit in the {NODE_LABEL} label, \
                 values are limited to {LABEL_VALUE_MAX} characters"
            )));
        }
        Ok(())
    }

    /// Name of the owning program resource, from the owningConfig label
    pub fn owning_config(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(OWNING_CONFIG_LABEL))
            .map(String::as_str)
    }

    /// Returns true if the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Add or remove a finalizer, returning true if the list changed
    pub fn set_finalizer(&mut self, finalizer: &str, present: bool) -> bool {
        if self.has_finalizer(finalizer) == present {
            return false;
        }
        let finalizers = self.metadata.finalizers.get_or_insert_with(Vec::new);
        if present {
            finalizers.push(finalizer.to_string());
        } else {
            finalizers.retain(|f| f != finalizer);
        }
        true
    }

    /// Returns true if deletion of this record has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINALIZER: &str = "bpfd.io.xdpProgramController/finalizer";

    fn sample() -> BpfProgram {
        BpfProgram::new(
            "xdp-pass-node-a",
            BpfProgramSpec {
                node: "node-a".to_string(),
                type_: "xdp".to_string(),
                programs: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn conditions_carry_fixed_reason_and_message() {
        let c = BpfProgramCondition::Loaded.to_condition();
        assert_eq!(c.type_, "Loaded");
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.reason, "bpfdLoaded");
        assert_eq!(c.message, "Successfully loaded bpfProgram");

        let c = BpfProgramCondition::NotUnloaded.to_condition();
        assert_eq!(c.reason, "bpfdNotUnloaded");
        assert_eq!(c.message, "Failed to unload bpfProgram");

        let c = BpfProgramCondition::NotSelected.to_condition();
        assert_eq!(c.reason, "nodeNotSelected");
    }

    #[test]
    fn condition_types_parse_back() {
        for c in [
            BpfProgramCondition::Loaded,
            BpfProgramCondition::NotLoaded,
            BpfProgramCondition::NotUnloaded,
            BpfProgramCondition::NotSelected,
        ] {
            assert_eq!(BpfProgramCondition::from_type(c.type_name()), Some(c));
        }
        assert_eq!(BpfProgramCondition::from_type("Ready"), None);
    }

    /// Story: the condition list only ever holds the latest outcome
    #[test]
    fn story_condition_is_single_valued() {
        let mut status = BpfProgramStatus::default();
        assert_eq!(status.current(), None);

        assert!(status.set(BpfProgramCondition::NotLoaded));
        assert!(status.set(BpfProgramCondition::Loaded));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.current(), Some(BpfProgramCondition::Loaded));

        // Same outcome again is not a change
        let before = status.conditions[0].last_transition_time;
        assert!(!status.set(BpfProgramCondition::Loaded));
        assert_eq!(status.conditions[0].last_transition_time, before);
    }

    #[test]
    fn finalizer_add_and_remove_report_changes() {
        let mut program = sample();
        assert!(!program.has_finalizer(FINALIZER));

        assert!(program.set_finalizer(FINALIZER, true));
        assert!(!program.set_finalizer(FINALIZER, true));
        assert!(program.has_finalizer(FINALIZER));

        assert!(program.set_finalizer(FINALIZER, false));
        assert!(!program.set_finalizer(FINALIZER, false));
        assert!(!program.has_finalizer(FINALIZER));
    }

    #[test]
    fn record_name_joins_program_and_node() {
        assert_eq!(BpfProgram::name_for("xdp-pass", "node-a"), "xdp-pass-node-a");
    }

    #[test]
    fn node_names_must_fit_in_a_label_value() {
        assert!(BpfProgram::validate_node_name("node-a").is_ok());
        assert!(BpfProgram::validate_node_name(&"n".repeat(LABEL_VALUE_MAX)).is_ok());

        let long = format!("{}.compute.internal", "ip-10-0-0-1".repeat(5));
        let err = BpfProgram::validate_node_name(&long).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("limited to 63"));
    }

    #[test]
    fn owning_config_comes_from_label() {
        let mut program = sample();
        assert_eq!(program.owning_config(), None);
        program.metadata.labels = Some(BTreeMap::from([(
            OWNING_CONFIG_LABEL.to_string(),
            "xdp-pass".to_string(),
        )]));
        assert_eq!(program.owning_config(), Some("xdp-pass"));
    }

    #[test]
    fn served_from_the_bpfd_group() {
        use kube::Resource;
        assert_eq!(BpfProgram::group(&()), "bpfd.io");
        assert_eq!(BpfProgram::version(&()), "v1alpha1");
    }
}
