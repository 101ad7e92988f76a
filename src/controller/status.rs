//! BpfProgram records: creation, outcome aggregation and persistence
//!
//! A pass executes one decision per target and collects an [`Outcome`] for
//! each id. [`aggregate`] folds those into what the record should say, and
//! [`persist`] writes only what changed: status first, then the program map
//! and finalizer.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use super::kind::ProgramKind;
use super::store::ProgramStore;
use crate::crd::{
    BpfProgram, BpfProgramCondition, BpfProgramSpec, ProgramMaps, NODE_LABEL, OWNING_CONFIG_LABEL,
    PROGRAM_TYPE_LABEL,
};
use crate::{Error, Result};

/// What happened to one id during a pass
#[derive(Debug)]
pub enum Outcome {
    /// Nothing loaded and nothing to do
    Absent,
    /// Already loaded and left alone
    Kept(ProgramMaps),
    /// Loaded during this pass
    Loaded(ProgramMaps),
    /// bpfd refused or failed the load
    LoadFailed(Error),
    /// Unloaded during this pass
    Unloaded,
    /// bpfd failed the unload; the program is still loaded with these maps
    UnloadFailed(Error, ProgramMaps),
}

/// What a record should say after a pass
#[derive(Debug, PartialEq)]
pub struct RecordUpdate {
    /// Ids still loaded, with their maps
    pub programs: BTreeMap<String, ProgramMaps>,
    /// The single condition to record
    pub condition: BpfProgramCondition,
    /// Whether the finalizer must stay
    pub keep_finalizer: bool,
    /// Whether a failure is worth retrying soon
    pub retry: bool,
}

/// Fold per-id outcomes into a record update
///
/// `wanted` is true when the program should run on this node, i.e. it is
/// selected and nothing is being deleted.
pub fn aggregate(outcomes: Vec<(String, Outcome)>, wanted: bool) -> RecordUpdate {
    let mut programs = BTreeMap::new();
    let mut load_failed = false;
    let mut unload_failed = false;
    let mut retry = false;

    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Absent | Outcome::Unloaded => {}
            Outcome::Kept(maps) | Outcome::Loaded(maps) => {
                programs.insert(id, maps);
            }
            Outcome::LoadFailed(e) => {
                load_failed = true;
                retry |= e.is_retryable();
            }
            Outcome::UnloadFailed(e, maps) => {
                unload_failed = true;
                retry |= e.is_retryable();
                programs.insert(id, maps);
            }
        }
    }

    let condition = if unload_failed {
        BpfProgramCondition::NotUnloaded
    } else if load_failed {
        BpfProgramCondition::NotLoaded
    } else if !wanted {
        BpfProgramCondition::NotSelected
    } else {
        BpfProgramCondition::Loaded
    };

    RecordUpdate {
        keep_finalizer: wanted || !programs.is_empty(),
        programs,
        condition,
        retry,
    }
}

/// Build the record for a program on a node
///
/// The record is labelled for lookup, owned by the program so it is garbage
/// collected with it, and carries the kind's finalizer from the start.
pub fn new_bpf_program<K: ProgramKind>(program: &K::Resource, node: &str) -> Result<BpfProgram> {
    let program_name = program.name_any();
    let owner = program.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation(format!("program {program_name} has no uid, cannot own a BpfProgram"))
    })?;

    let mut record = BpfProgram::new(
        &BpfProgram::name_for(&program_name, node),
        BpfProgramSpec {
            node: node.to_string(),
            type_: K::PROGRAM_TYPE.as_str().to_string(),
            programs: BTreeMap::new(),
        },
    );
    record.metadata.labels = Some(BTreeMap::from([
        (OWNING_CONFIG_LABEL.to_string(), program_name),
        (NODE_LABEL.to_string(), node.to_string()),
        (
            PROGRAM_TYPE_LABEL.to_string(),
            K::PROGRAM_TYPE.as_str().to_string(),
        ),
    ]));
    record.metadata.owner_references = Some(vec![owner]);
    record.metadata.finalizers = Some(vec![K::FINALIZER.to_string()]);

    Ok(record)
}

/// Make sure the finalizer is on the record before anything is loaded
pub async fn ensure_finalizer(
    store: &dyn ProgramStore,
    mut record: BpfProgram,
    finalizer: &str,
) -> Result<BpfProgram> {
    if !record.set_finalizer(finalizer, true) {
        return Ok(record);
    }
    debug!(bpf_program = %record.name_any(), "Adding finalizer");
    store.replace_bpf_program(&record).await
}

/// Write the update to the record, skipping unchanged parts
///
/// A record that disappeared in the meantime is not an error.
pub async fn persist(
    store: &dyn ProgramStore,
    mut record: BpfProgram,
    update: &RecordUpdate,
    finalizer: &str,
) -> Result<()> {
    let name = record.name_any();

    let mut status = record.status.clone().unwrap_or_default();
    if status.set(update.condition) {
        info!(bpf_program = %name, condition = %update.condition, "Updating BpfProgram status");
        record.status = Some(status);
        record = match store.replace_bpf_program_status(&record).await {
            Ok(updated) => updated,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
    }

    let mut changed = record.set_finalizer(finalizer, update.keep_finalizer);
    if record.spec.programs != update.programs {
        record.spec.programs = update.programs.clone();
        changed = true;
    }
    if !changed {
        return Ok(());
    }

    if !update.keep_finalizer {
        info!(bpf_program = %name, "Removing finalizer");
    }
    match store.replace_bpf_program(&record).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
