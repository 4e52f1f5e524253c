//! Template-inheritance resolution.
//!
//! A spec may name a template; the chain is walked root-first and each
//! child layer is applied on top: same-named resources shadow the
//! template's, new ones append. The result is a fully-materialized spec
//! with no remaining template reference.

use std::collections::{HashMap, HashSet};

use armada_types::ConfigSpec;

use crate::error::{SnapshotError, SnapshotResult};

/// Resolve a spec's template chain into a materialized spec.
pub fn resolve_spec(
    spec: &ConfigSpec,
    templates: &HashMap<String, ConfigSpec>,
) -> SnapshotResult<ConfigSpec> {
    // Collect the chain child-first, then fold from the root down.
    let mut chain: Vec<&ConfigSpec> = vec![spec];
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = spec.template.as_deref();

    while let Some(name) = current {
        if !visited.insert(name) {
            return Err(SnapshotError::TemplateCycle(name.to_string()));
        }
        let parent = templates
            .get(name)
            .ok_or_else(|| SnapshotError::TemplateMissing(name.to_string()))?;
        chain.push(parent);
        current = parent.template.as_deref();
    }

    let mut resolved = ConfigSpec::default();
    for layer in chain.iter().rev() {
        apply_layer(&mut resolved, layer);
    }
    resolved.template = None;
    Ok(resolved)
}

/// Apply one layer: same-named resources replace, new ones append.
fn apply_layer(base: &mut ConfigSpec, layer: &ConfigSpec) {
    merge_by_name(&mut base.listeners, &layer.listeners, |l| &l.name);
    merge_by_name(&mut base.routes, &layer.routes, |r| &r.name);
    merge_by_name(&mut base.clusters, &layer.clusters, |c| &c.name);
    merge_by_name(&mut base.secrets, &layer.secrets, |s| &s.name);
}

fn merge_by_name<T: Clone>(base: &mut Vec<T>, layer: &[T], name: impl Fn(&T) -> &String) {
    for item in layer {
        match base.iter_mut().find(|existing| name(existing) == name(item)) {
            Some(existing) => *existing = item.clone(),
            None => base.push(item.clone()),
        }
    }
}
