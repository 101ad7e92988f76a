//! The reconciliation pass
//!
//! One pass converges every program of a kind on this node:
//!
//! 1. List the program resources, the node's BpfPrograms and what bpfd has
//!    loaded (one `list` call per pass).
//! 2. For each program, decide per target and per stale id what to do.
//! 3. Execute the decisions against bpfd.
//! 4. Write the BpfProgram, skipping everything that did not change.
//!
//! A failing program does not stop the pass; the others are still
//! reconciled and the pass asks to be retried.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::decision::{decide, Decision, Observation};
use super::kind::ProgramKind;
use super::selector::is_node_selected;
use super::status::{self, aggregate, Outcome};
use crate::crd::{BpfProgram, ProgramMaps, PROGRAM_TYPE_LABEL};
use crate::daemon::{self, BpfdDaemon, LoadRequest, LoadedProgram, Snapshot};
use crate::{Error, Result};

/// How a pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassResult {
    /// Nothing to reconcile
    Idle,
    /// Everything converged or failed in a way retrying will not fix
    Settled,
    /// Something failed transiently and should be retried soon
    Retry,
}

/// Daemon work planned for one id
#[derive(Debug)]
enum Step {
    Nothing,
    Keep(ProgramMaps),
    Load(LoadRequest),
    Replace(LoadRequest),
    Unload,
}

impl Step {
    fn loads(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Replace(_))
    }

    fn from_decision(
        decision: Decision,
        request: Option<LoadRequest>,
        loaded: Option<&LoadedProgram>,
        recorded: Option<&ProgramMaps>,
    ) -> Self {
        match (decision, request) {
            (Decision::Load, Some(request)) => Self::Load(request),
            (Decision::Replace, Some(request)) => Self::Replace(request),
            (Decision::Unload, _) => Self::Unload,
            (Decision::RecordMaps, _) => {
                Self::Keep(loaded.map(|p| p.maps.clone()).unwrap_or_default())
            }
            (Decision::Unchanged, _) => Self::Keep(recorded.cloned().unwrap_or_default()),
            _ => Self::Nothing,
        }
    }
}

/// Run one pass over every program of kind `K`
#[instrument(skip(ctx), fields(program_type = %K::PROGRAM_TYPE, node = %ctx.node_name))]
pub async fn run_pass<K: ProgramKind>(ctx: &Context<K>) -> Result<PassResult> {
    let _pass = ctx.lock_pass().await;

    let programs = ctx.programs.list_programs().await?;
    if programs.is_empty() {
        debug!("No programs of this type");
        return Ok(PassResult::Idle);
    }

    let node = ctx.store.get_node(&ctx.node_name).await?;
    let records: BTreeMap<String, BpfProgram> = ctx
        .store
        .list_bpf_programs(&ctx.node_name, K::PROGRAM_TYPE)
        .await?
        .into_iter()
        .map(|r| (r.name_any(), r))
        .collect();
    let snapshot = daemon::snapshot(ctx.daemon.as_ref(), K::PROGRAM_TYPE).await?;

    debug!(
        programs = programs.len(),
        records = records.len(),
        loaded = snapshot.len(),
        "Starting pass"
    );

    let mut retry = false;
    for program in &programs {
        let name = program.name_any();
        let record = records
            .get(&BpfProgram::name_for(&name, &ctx.node_name))
            .cloned();

        match reconcile_program::<K>(ctx, program, record, &node, &snapshot).await {
            Ok(needs_retry) => retry |= needs_retry,
            Err(e) => {
                warn!(program = %name, error = %e, "Failed to reconcile program");
                retry = true;
            }
        }
    }

    Ok(if retry {
        PassResult::Retry
    } else {
        PassResult::Settled
    })
}

/// Reconcile one program, returning whether it needs a retry
async fn reconcile_program<K: ProgramKind>(
    ctx: &Context<K>,
    program: &K::Resource,
    record: Option<BpfProgram>,
    node: &Node,
    snapshot: &Snapshot,
) -> Result<bool> {
    let name = program.name_any();
    let program_deleting = program.meta().deletion_timestamp.is_some();

    // First sight of a program only creates its record, loading waits for
    // the next pass so the finalizer is in place before anything runs
    let Some(record) = record else {
        if !program_deleting {
            create_record::<K>(ctx, program).await?;
        }
        return Ok(false);
    };

    let deleting = program_deleting || record.is_deleting();
    let selected =
        !deleting && is_node_selected(&K::common(program).node_selector, node.labels())?;
    let wanted = selected && !deleting;

    let targets = match K::resolve_targets(program, node, ctx.interfaces.as_ref()) {
        Ok(targets) => targets,
        Err(e) if !wanted => {
            debug!(program = %name, error = %e, "Targets unresolved, releasing recorded ids only");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let mut plan: Vec<(String, Step)> = Vec::with_capacity(targets.len());
    for target in &targets {
        let id = K::id_for(program, target);
        let loaded = snapshot.get(&id);
        let request = if wanted {
            Some(K::load_request(program, target)?)
        } else {
            None
        };

        let matches = match (loaded, &request) {
            (Some(loaded), Some(request)) => loaded.attach.as_ref() == Some(&request.attach),
            _ => false,
        };
        let decision = decide(Observation {
            loaded: loaded.is_some(),
            deleting,
            selected,
            matches,
            recorded: record.spec.programs.contains_key(&id),
        });
        debug!(program = %name, %id, ?decision, "Planned target");

        let step = Step::from_decision(decision, request, loaded, record.spec.programs.get(&id));
        plan.push((id, step));
    }

    for id in record.spec.programs.keys() {
        if plan.iter().any(|(planned, _)| planned == id) {
            continue;
        }
        // A recorded id that is no longer a target is going away
        let decision = decide(Observation {
            loaded: snapshot.contains_key(id),
            deleting: true,
            ..Default::default()
        });
        debug!(program = %name, %id, ?decision, "Planned stale id");
        plan.push((id.clone(), Step::from_decision(decision, None, None, None)));
    }

    let mut record = record;
    if plan.iter().any(|(_, step)| step.loads()) {
        record = status::ensure_finalizer(ctx.store.as_ref(), record, K::FINALIZER).await?;
    }

    let mut outcomes = Vec::with_capacity(plan.len());
    for (id, step) in plan {
        let outcome = execute(ctx.daemon.as_ref(), &id, step, snapshot).await;
        outcomes.push((id, outcome));
    }

    let update = aggregate(outcomes, wanted);
    status::persist(ctx.store.as_ref(), record, &update, K::FINALIZER).await?;
    Ok(update.retry)
}

async fn create_record<K: ProgramKind>(ctx: &Context<K>, program: &K::Resource) -> Result<()> {
    let record = status::new_bpf_program::<K>(program, &ctx.node_name)?;
    info!(
        program = %program.name_any(),
        bpf_program = %record.name_any(),
        "Creating BpfProgram"
    );

    let conflict = match ctx.store.create_bpf_program(&record).await {
        Ok(_) => return Ok(()),
        Err(e) if e.is_conflict() => e,
        Err(e) => return Err(e),
    };

    // Created by a concurrent pass, or the name is taken by another record
    let Some(existing) = ctx.store.get_bpf_program(&record.name_any()).await? else {
        return Err(conflict);
    };
    if is_record_of::<K>(&existing, program) {
        debug!(bpf_program = %record.name_any(), "BpfProgram already exists");
        return Ok(());
    }
    Err(Error::validation(format!(
        "BpfProgram {} already exists for a {} program, cannot record {} program {}",
        record.name_any(),
        existing
            .labels()
            .get(PROGRAM_TYPE_LABEL)
            .map(String::as_str)
            .unwrap_or("different"),
        K::PROGRAM_TYPE,
        program.name_any(),
    )))
}

/// Returns true if the record belongs to this program and kind
fn is_record_of<K: ProgramKind>(record: &BpfProgram, program: &K::Resource) -> bool {
    let same_type = record.labels().get(PROGRAM_TYPE_LABEL).map(String::as_str)
        == Some(K::PROGRAM_TYPE.as_str());
    let same_owner = program.uid().is_some_and(|uid| {
        record
            .owner_references()
            .iter()
            .any(|owner| owner.uid == uid)
    });
    same_type && same_owner
}

async fn execute(daemon: &dyn BpfdDaemon, id: &str, step: Step, snapshot: &Snapshot) -> Outcome {
    match step {
        Step::Nothing => Outcome::Absent,
        Step::Keep(maps) => Outcome::Kept(maps),
        Step::Load(request) => load(daemon, &request).await,
        Step::Unload => unload(daemon, id, snapshot).await,
        Step::Replace(request) => match unload(daemon, id, snapshot).await {
            Outcome::Unloaded => load(daemon, &request).await,
            failed => failed,
        },
    }
}

async fn load(daemon: &dyn BpfdDaemon, request: &LoadRequest) -> Outcome {
    match daemon.load(request).await {
        Ok(maps) => {
            info!(id = %request.id, maps = maps.len(), "Loaded program");
            Outcome::Loaded(maps)
        }
        Err(e) => {
            warn!(id = %request.id, error = %e, "Failed to load program");
            Outcome::LoadFailed(e)
        }
    }
}

async fn unload(daemon: &dyn BpfdDaemon, id: &str, snapshot: &Snapshot) -> Outcome {
    match daemon.unload(id).await {
        Ok(()) => {
            info!(%id, "Unloaded program");
            Outcome::Unloaded
        }
        Err(e) => {
            warn!(%id, error = %e, "Failed to unload program");
            let maps = snapshot.get(id).map(|p| p.maps.clone()).unwrap_or_default();
            Outcome::UnloadFailed(e, maps)
        }
    }
}

/// Release a BpfProgram whose program resource no longer exists
///
/// Normally the pass unloads everything before the program resource goes
/// away. If it disappeared without a pass seeing it deleted, the record
/// still holds the finalizer and possibly loaded ids.
#[instrument(skip(ctx, record), fields(bpf_program = %record.name_any(), node = %ctx.node_name))]
pub async fn sweep_record<K: ProgramKind>(
    ctx: &Context<K>,
    record: &BpfProgram,
) -> Result<PassResult> {
    let _pass = ctx.lock_pass().await;

    if let Some(owner) = record.owning_config() {
        if ctx.programs.get_program(owner).await?.is_some() {
            return Ok(PassResult::Idle);
        }
    }
    if !record.has_finalizer(K::FINALIZER) && record.spec.programs.is_empty() {
        return Ok(PassResult::Idle);
    }

    info!(ids = record.spec.programs.len(), "Owning program is gone, releasing BpfProgram");
    let snapshot = daemon::snapshot(ctx.daemon.as_ref(), K::PROGRAM_TYPE).await?;

    let mut outcomes = Vec::with_capacity(record.spec.programs.len());
    for id in record.spec.programs.keys() {
        let outcome = if snapshot.contains_key(id) {
            unload(ctx.daemon.as_ref(), id, &snapshot).await
        } else {
            Outcome::Absent
        };
        outcomes.push((id.clone(), outcome));
    }

    let update = aggregate(outcomes, false);
    status::persist(ctx.store.as_ref(), record.clone(), &update, K::FINALIZER).await?;

    Ok(if update.retry {
        PassResult::Retry
    } else {
        PassResult::Settled
    })
}
