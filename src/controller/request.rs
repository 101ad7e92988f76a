//! Load request construction
//!
//! Pure helpers turning a program resource into what bpfd needs: the
//! bytecode location, global data and the encoded proceed-on chain. The
//! per-kind strategies combine them with their attach info.

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::warn;

use crate::crd::{BpfProgramCommon, BytecodeSelector, TcProceedOn, XdpProceedOn};
use crate::daemon::{AttachInfo, BytecodeLocation, LoadRequest, ProgramType};
use crate::{Error, Result};

/// Resolve the bytecode selector; exactly one source must be set
pub fn bytecode_location(selector: &BytecodeSelector) -> Result<BytecodeLocation> {
    match (&selector.image, &selector.path) {
        (Some(image), None) => Ok(BytecodeLocation::Image {
            url: image.url.clone(),
            pull_policy: image.image_pull_policy,
        }),
        (None, Some(path)) => Ok(BytecodeLocation::File(path.clone())),
        (Some(_), Some(_)) => Err(Error::validation(
            "bytecode must set only one of image or path",
        )),
        (None, None) => Err(Error::validation("bytecode must set image or path")),
    }
}

/// Build a load request from the common fields and kind-specific attach info
pub fn build_load_request(
    id: String,
    program_type: ProgramType,
    common: &BpfProgramCommon,
    attach: AttachInfo,
) -> Result<LoadRequest> {
    Ok(LoadRequest {
        id,
        program_type,
        location: bytecode_location(&common.bytecode)?,
        section_name: common.section_name.clone(),
        global_data: common
            .global_data
            .iter()
            .map(|(k, v)| (k.clone(), v.0.clone()))
            .collect::<BTreeMap<_, _>>(),
        attach,
    })
}

/// Parse proceed-on names, dropping names outside the table
///
/// Unknown names are logged and omitted rather than failing the program.
pub fn parse_proceed_on<T: FromStr>(program: &str, names: &[String]) -> Vec<T> {
    names
        .iter()
        .filter_map(|name| match name.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%program, proceed_on = %name, "Ignoring unknown proceedon value");
                None
            }
        })
        .collect()
}

/// Encoded XDP chain, falling back to bpfd's default when empty
///
/// Sending the default explicitly keeps the desired attach info comparable
/// with what bpfd reports back.
pub fn xdp_proceed_on(program: &str, names: &[String]) -> Vec<XdpProceedOn> {
    let chain = parse_proceed_on(program, names);
    if chain.is_empty() {
        XdpProceedOn::DEFAULT_CHAIN.to_vec()
    } else {
        chain
    }
}

/// Encoded TC chain, falling back to bpfd's default when empty
pub fn tc_proceed_on(program: &str, names: &[String]) -> Vec<TcProceedOn> {
    let chain = parse_proceed_on(program, names);
    if chain.is_empty() {
        TcProceedOn::DEFAULT_CHAIN.to_vec()
    } else {
        chain
    }
}
