//! Node selection
//!
//! A program resource's node selector is a standard label selector evaluated
//! against the local node's labels.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::{Selector, SelectorExt};

use crate::{Error, Result};

/// Returns true if the node's labels satisfy the selector
///
/// An empty selector selects every node. A selector that cannot be parsed is
/// an error, never a silent "not selected".
pub fn is_node_selected(
    selector: &LabelSelector,
    node_labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let selector =
        Selector::try_from(selector.clone()).map_err(|e| Error::selector(e.to_string()))?;
    Ok(selector.matches(node_labels))
}
