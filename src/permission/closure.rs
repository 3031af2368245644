//! Ancestor closure over the parent-code chain

use std::collections::{HashMap, HashSet};

use crate::entity::permission;

/// Return `seeds` plus every ancestor needed to connect them to a root.
///
/// The walk up from a seed stops at a root, at a parent code not present in
/// `all`, or at a code already in the result. The last rule also bounds the
/// walk on a cyclic chain.
pub fn close_ancestors<'a, I>(seeds: I, all: &[permission::Model]) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let parents: HashMap<&str, Option<&str>> = all
        .iter()
        .map(|node| (node.code.as_str(), node.parent()))
        .collect();

    let mut closed = HashSet::new();
    for seed in seeds {
        closed.insert(seed.to_string());

        let mut next = parents.get(seed).copied().flatten();
        while let Some(code) = next {
            let Some(parent_of_code) = parents.get(code) else {
                break;
            };
            if !closed.insert(code.to_string()) {
                break;
            }
            next = *parent_of_code;
        }
    }
    closed
}
