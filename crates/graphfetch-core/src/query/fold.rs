//! Result folder for rows multiplied by a to-many join.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Rows of one root after folding.
///
/// `rows[0]` is the first row seen for the root; every further row carries a
/// collection member not seen before for that root.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedGroup<R> {
    /// First row plus one row per additional distinct member.
    pub rows: Vec<R>,
}

impl<R> FoldedGroup<R> {
    /// The first row seen for this root.
    pub fn first(&self) -> &R {
        &self.rows[0]
    }
}

/// Fold joined rows back to one group per distinct root identity.
///
/// Groups keep the order in which their roots first appear. Within a group a
/// row is kept only if its member key is new; rows without a member (left
/// join without a match) contribute nothing beyond the root.
pub fn fold_rows<R, K, M>(
    rows: impl IntoIterator<Item = R>,
    root_key: impl Fn(&R) -> K,
    member_key: impl Fn(&R) -> Option<M>,
) -> Vec<FoldedGroup<R>>
where
    K: Eq + Hash,
    M: Eq + Hash,
{
    let mut groups: Vec<FoldedGroup<R>> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut members: Vec<HashSet<M>> = Vec::new();

    for row in rows {
        let key = root_key(&row);
        let member = member_key(&row);
        match index.get(&key) {
            Some(&i) => {
                if let Some(member) = member {
                    if members[i].insert(member) {
                        groups[i].rows.push(row);
                    }
                }
            }
            None => {
                let mut seen = HashSet::new();
                if let Some(member) = member {
                    seen.insert(member);
                }
                index.insert(key, groups.len());
                members.push(seen);
                groups.push(FoldedGroup { rows: vec![row] });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(rows: &[(i64, Option<i64>)]) -> Vec<FoldedGroup<(i64, Option<i64>)>> {
        fold_rows(rows.iter().copied(), |r| r.0, |r| r.1)
    }

    #[test]
    fn test_root_with_two_members() {
        let groups = fold(&[(4, Some(1)), (4, Some(2))]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rows.len(), 2);
        assert_eq!(*groups[0].first(), (4, Some(1)));
    }

    #[test]
    fn test_first_seen_order_is_preserved() {
        let groups = fold(&[(11, Some(3)), (4, Some(1)), (11, Some(5)), (4, Some(2))]);
        let roots: Vec<i64> = groups.iter().map(|g| g.first().0).collect();
        assert_eq!(roots, vec![11, 4]);
        assert_eq!(groups[0].rows, vec![(11, Some(3)), (11, Some(5))]);
    }

    #[test]
    fn test_duplicate_members_are_dropped() {
        let groups = fold(&[(4, Some(1)), (4, Some(1)), (4, Some(2)), (4, Some(2))]);
        assert_eq!(groups[0].rows, vec![(4, Some(1)), (4, Some(2))]);
    }

    #[test]
    fn test_root_without_members() {
        let groups = fold(&[(4, None), (11, Some(3))]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rows, vec![(4, None)]);
    }

    #[test]
    fn test_deduplicated_input_is_identity() {
        let input = vec![(1, None), (2, None), (3, None), (7, None)];
        let output: Vec<(i64, Option<i64>)> =
            fold(&input).into_iter().flat_map(|g| g.rows).collect();
        assert_eq!(output, input);
    }
}
