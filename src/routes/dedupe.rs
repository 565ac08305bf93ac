//! Collapses repeated traceroute captures into canonical routes.
//!
//! Captures of one destination whose addresses are covered by a more complete
//! capture are treated as observations of the same route. Only captures with
//! the current candidate's hop count can be promoted to candidate, but any
//! covered capture joins the route. This is a greedy first-seen heuristic, not
//! an optimal partition.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use log::debug;

use super::models::{CanonicalRoute, TracerouteCapture};

/// Reduces `captures` to canonical routes.
///
/// Captures are ordered by timestamp (ties keep input order) and grouped by
/// destination name in first-seen order. Every capture contributes exactly one
/// occurrence to exactly one route.
pub fn dedupe(captures: &[TracerouteCapture]) -> Vec<CanonicalRoute> {
    let mut ordered: Vec<&TracerouteCapture> = captures.iter().collect();
    ordered.sort_by_key(|c| c.timestamp);

    let mut groups: Vec<(&str, Vec<&TracerouteCapture>)> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    for capture in ordered {
        let name = capture.destination_name.as_str();
        let index = *group_index.entry(name).or_insert_with(|| {
            groups.push((name, Vec::new()));
            groups.len() - 1
        });
        groups[index].1.push(capture);
    }

    let mut routes = Vec::new();
    for (destination, members) in &groups {
        let before = routes.len();
        dedupe_destination(destination, members, &mut routes);
        debug!(
            "{}: {} capture(s) collapsed into {} route(s)",
            destination,
            members.len(),
            routes.len() - before
        );
    }
    routes
}

fn dedupe_destination(
    destination: &str,
    captures: &[&TracerouteCapture],
    routes: &mut Vec<CanonicalRoute>,
) {
    let address_sets: Vec<HashSet<IpAddr>> =
        captures.iter().map(|c| c.address_set()).collect();
    let mut processed = vec![false; captures.len()];

    while let Some(first) = processed.iter().position(|done| !done) {
        let hop_count = captures[first].hop_count();
        let mut candidate = first;
        let mut covered = address_sets[first].clone();

        for i in first + 1..captures.len() {
            if processed[i] || captures[i].hop_count() != hop_count {
                continue;
            }
            let addresses = &address_sets[i];
            if covered.len() < addresses.len() && covered.is_subset(addresses) {
                candidate = i;
                covered.extend(addresses.iter().copied());
            }
        }

        // The candidate itself always qualifies, so every round makes progress
        let mut occurrences = Vec::new();
        for i in first..captures.len() {
            if !processed[i] && address_sets[i].is_subset(&covered) {
                processed[i] = true;
                occurrences.push(captures[i].observed_at());
            }
        }

        routes.push(CanonicalRoute {
            id: routes.len() + 1,
            destination: destination.to_string(),
            hops: captures[candidate]
                .hops
                .iter()
                .map(|hop| hop.leading_probe().cloned())
                .collect(),
            occurrences,
        });
    }
}
