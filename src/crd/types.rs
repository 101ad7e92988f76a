//! Supporting types shared by the program CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::ByteString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fields common to every program kind
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BpfProgramCommon {
    /// Where the program bytecode comes from
    pub bytecode: BytecodeSelector,

    /// ELF section of the program to load
    #[serde(rename = "sectionname")]
    pub section_name: String,

    /// Global variables to set before loading, base64 encoded
    #[serde(
        rename = "globaldata",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    #[schemars(with = "BTreeMap<String, String>")]
    pub global_data: BTreeMap<String, ByteString>,

    /// Nodes this program should be attached on. Empty selects every node.
    #[serde(rename = "nodeselector", default)]
    pub node_selector: LabelSelector,
}

/// Source of the program bytecode. Exactly one field must be set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BytecodeSelector {
    /// OCI image carrying the bytecode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<BytecodeImage>,

    /// Path to a bytecode file on the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// OCI image reference for bytecode
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BytecodeImage {
    /// Image URL
    pub url: String,

    /// When bpfd should pull the image
    #[serde(rename = "imagepullpolicy", default)]
    pub image_pull_policy: ImagePullPolicy,
}

/// Image pull policy, mirroring the container image semantics
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ImagePullPolicy {
    /// Always pull
    Always,
    /// Pull only if the image is not cached
    #[default]
    IfNotPresent,
    /// Never pull, fail if not cached
    Never,
}

impl ImagePullPolicy {
    /// Wire value understood by bpfd
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Always => 0,
            Self::IfNotPresent => 1,
            Self::Never => 2,
        }
    }
}

/// Selects the network interfaces a program attaches to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct InterfaceSelector {
    /// Attach to this interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Attach to the interface carrying the node's internal IP
    #[serde(
        rename = "primarynodeinterface",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_node_interface: Option<bool>,
}

/// Traffic direction for TC programs
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TcDirection {
    /// Not set. TC programs must pick a direction before they can load.
    #[default]
    None,
    /// Ingress traffic
    Ingress,
    /// Egress traffic
    Egress,
}

impl TcDirection {
    /// Direction string on the bpfd wire, `None` has no wire form
    pub fn wire_name(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Ingress => Some("ingress"),
            Self::Egress => Some("egress"),
        }
    }

    /// Parse a direction reported by bpfd
    ///
    /// Older daemons report the short tc(8) names.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ingress" | "in" => Some(Self::Ingress),
            "egress" | "eg" => Some(Self::Egress),
            _ => None,
        }
    }
}

impl std::fmt::Display for TcDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Ingress => write!(f, "INGRESS"),
            Self::Egress => write!(f, "EGRESS"),
        }
    }
}

/// XDP return codes on which the dispatcher proceeds to the next program
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum XdpProceedOn {
    /// XDP_ABORTED
    Aborted,
    /// XDP_DROP
    Drop,
    /// XDP_PASS
    Pass,
    /// XDP_TX
    Tx,
    /// XDP_REDIRECT
    Redirect,
    /// Return code used by the dispatcher itself
    DispatcherReturn,
}

impl XdpProceedOn {
    /// Chain applied by bpfd when none is configured
    pub const DEFAULT_CHAIN: [Self; 2] = [Self::Pass, Self::DispatcherReturn];

    /// Wire code understood by bpfd
    pub fn code(self) -> i32 {
        match self {
            Self::Aborted => 0,
            Self::Drop => 1,
            Self::Pass => 2,
            Self::Tx => 3,
            Self::Redirect => 4,
            Self::DispatcherReturn => 31,
        }
    }

    /// Inverse of [`XdpProceedOn::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Aborted),
            1 => Some(Self::Drop),
            2 => Some(Self::Pass),
            3 => Some(Self::Tx),
            4 => Some(Self::Redirect),
            31 => Some(Self::DispatcherReturn),
            _ => None,
        }
    }
}

impl std::str::FromStr for XdpProceedOn {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aborted" => Ok(Self::Aborted),
            "drop" => Ok(Self::Drop),
            "pass" => Ok(Self::Pass),
            "tx" => Ok(Self::Tx),
            "redirect" => Ok(Self::Redirect),
            "dispatcher_return" => Ok(Self::DispatcherReturn),
            _ => Err(crate::Error::validation(format!(
                "invalid xdp proceedon value: {s}, expected one of: aborted, drop, pass, tx, redirect, dispatcher_return"
            ))),
        }
    }
}

/// TC actions on which the dispatcher proceeds to the next program
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TcProceedOn {
    /// TC_ACT_UNSPEC
    Unspec,
    /// TC_ACT_OK
    Ok,
    /// TC_ACT_RECLASSIFY
    Reclassify,
    /// TC_ACT_SHOT
    Shot,
    /// TC_ACT_PIPE
    Pipe,
    /// TC_ACT_STOLEN
    Stolen,
    /// TC_ACT_QUEUED
    Queued,
    /// TC_ACT_REPEAT
    Repeat,
    /// TC_ACT_REDIRECT
    Redirect,
    /// TC_ACT_TRAP
    Trap,
    /// Return code used by the dispatcher itself
    DispatcherReturn,
}

impl TcProceedOn {
    /// Chain applied by bpfd when none is configured
    pub const DEFAULT_CHAIN: [Self; 2] = [Self::Pipe, Self::DispatcherReturn];

    /// Wire code understood by bpfd
    pub fn code(self) -> i32 {
        match self {
            Self::Unspec => -1,
            Self::Ok => 0,
            Self::Reclassify => 1,
            Self::Shot => 2,
            Self::Pipe => 3,
            Self::Stolen => 4,
            Self::Queued => 5,
            Self::Repeat => 6,
            Self::Redirect => 7,
            Self::Trap => 8,
            Self::DispatcherReturn => 31,
        }
    }

    /// Inverse of [`TcProceedOn::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unspec),
            0 => Some(Self::Ok),
            1 => Some(Self::Reclassify),
            2 => Some(Self::Shot),
            3 => Some(Self::Pipe),
            4 => Some(Self::Stolen),
            5 => Some(Self::Queued),
            6 => Some(Self::Repeat),
            7 => Some(Self::Redirect),
            8 => Some(Self::Trap),
            31 => Some(Self::DispatcherReturn),
            _ => None,
        }
    }
}

impl std::str::FromStr for TcProceedOn {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspec" => Ok(Self::Unspec),
            "ok" => Ok(Self::Ok),
            "reclassify" => Ok(Self::Reclassify),
            "shot" => Ok(Self::Shot),
            "pipe" => Ok(Self::Pipe),
            "stolen" => Ok(Self::Stolen),
            "queued" => Ok(Self::Queued),
            "repeat" => Ok(Self::Repeat),
            "redirect" => Ok(Self::Redirect),
            "trap" => Ok(Self::Trap),
            "dispatcher_return" => Ok(Self::DispatcherReturn),
            _ => Err(crate::Error::validation(format!(
                "invalid tc proceedon value: {s}"
            ))),
        }
    }
}

/// Status of a condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Loaded, NotSelected)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}
