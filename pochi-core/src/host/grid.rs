//! Grid surgery on [`EditorLayout`] trees. Leaves are addressed by their
//! depth-first index, which is also the order of the main window groups.

use crate::geometry::{EditorLayout, GroupLayout, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Before,
    After,
}

fn orientation_at(root: Orientation, depth: usize) -> Orientation {
    if depth % 2 == 0 { root } else { root.flipped() }
}

fn find_leaf(
    groups: &[GroupLayout],
    target: usize,
    seen: &mut usize,
    path: &mut Vec<usize>,
) -> bool {
    for (position, group) in groups.iter().enumerate() {
        path.push(position);
        match &group.groups {
            Some(children) if !children.is_empty() => {
                if find_leaf(children, target, seen, path) {
                    return true;
                }
            }
            _ if *seen == target => return true,
            _ => *seen += 1,
        }
        path.pop();
    }
    false
}

fn leaf_path(layout: &EditorLayout, index: usize) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut seen = 0;
    find_leaf(&layout.groups, index, &mut seen, &mut path).then_some(path)
}

fn list_mut<'a>(
    layout: &'a mut EditorLayout,
    parents: &[usize],
) -> Option<&'a mut Vec<GroupLayout>> {
    let mut list = &mut layout.groups;
    for &position in parents {
        list = list.get_mut(position)?.groups.as_mut()?;
    }
    Some(list)
}

/// Adds a leaf next to leaf `index` and returns the index of the new leaf.
pub(crate) fn insert_leaf(
    layout: &mut EditorLayout,
    index: usize,
    orientation: Orientation,
    placement: Placement,
) -> Option<usize> {
    let path = leaf_path(layout, index)?;
    let (&position, parents) = path.split_last()?;

    // A lone root group adopts whatever direction it is split in.
    if parents.is_empty() && layout.groups.len() == 1 {
        layout.orientation = orientation;
    }
    let list_orientation = orientation_at(layout.orientation, parents.len());
    let list = list_mut(layout, parents)?;
    let leaf = list.get_mut(position)?;

    if list_orientation == orientation {
        let half = leaf.size / 2.0;
        leaf.size = half;
        let at = match placement {
            Placement::Before => position,
            Placement::After => position + 1,
        };
        list.insert(at, GroupLayout::leaf(half));
    } else {
        *leaf = GroupLayout::split(
            leaf.size,
            vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)],
        );
    }

    Some(match placement {
        Placement::Before => index,
        Placement::After => index + 1,
    })
}

/// Removes leaf `index`, handing its space to a sibling. The last remaining
/// leaf is never removed.
pub(crate) fn remove_leaf(layout: &mut EditorLayout, index: usize) -> bool {
    if layout.leaf_count() <= 1 {
        return false;
    }
    let Some(path) = leaf_path(layout, index) else {
        return false;
    };
    let Some((&position, parents)) = path.split_last() else {
        return false;
    };
    let Some(list) = list_mut(layout, parents) else {
        return false;
    };
    let removed = list.remove(position);
    if let Some(neighbour) = list.get_mut(position.saturating_sub(1)) {
        neighbour.size += removed.size;
    }
    normalize(layout);
    true
}

/// Collapses splits with a single child and turns empty splits into leaves.
pub(crate) fn normalize(layout: &mut EditorLayout) {
    collapse(&mut layout.groups);
    while let [only] = layout.groups.as_mut_slice() {
        let Some(children) = only.groups.take() else {
            break;
        };
        layout.orientation = layout.orientation.flipped();
        layout.groups = children;
    }
    if layout.groups.is_empty() {
        layout.groups.push(GroupLayout::leaf(1.0));
    }
}

fn collapse(groups: &mut Vec<GroupLayout>) {
    let mut collapsed = Vec::with_capacity(groups.len());
    for mut group in groups.drain(..) {
        let Some(mut children) = group.groups.take() else {
            collapsed.push(group);
            continue;
        };
        collapse(&mut children);
        match children.len() {
            0 => collapsed.push(GroupLayout::leaf(group.size)),
            1 => {
                let size = group.size;
                match children.pop().and_then(|child| child.groups) {
                    // The grandchildren run in this list's direction.
                    Some(grandchildren) => {
                        let total: f64 = grandchildren.iter().map(|child| child.size).sum();
                        let count = grandchildren.len() as f64;
                        collapsed.extend(grandchildren.into_iter().map(|mut child| {
                            child.size = if total > 0.0 {
                                size * child.size / total
                            } else {
                                size / count
                            };
                            child
                        }));
                    }
                    None => collapsed.push(GroupLayout::leaf(size)),
                }
            }
            _ => {
                group.groups = Some(children);
                collapsed.push(group);
            }
        }
    }
    *groups = collapsed;
}

/// Gives every top-level column the same share.
pub(crate) fn even_widths(layout: &mut EditorLayout) {
    let share = 1.0 / layout.groups.len().max(1) as f64;
    for group in &mut layout.groups {
        group.size = share;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(groups: &[GroupLayout]) -> Vec<f64> {
        groups.iter().map(|group| group.size).collect()
    }

    #[test]
    fn splitting_a_lone_group_sets_the_root_direction() {
        let mut layout = EditorLayout::single();
        assert_eq!(
            insert_leaf(&mut layout, 0, Orientation::Vertical, Placement::After),
            Some(1)
        );
        assert_eq!(layout.orientation, Orientation::Vertical);
        assert_eq!(layout.leaf_count(), 2);
        assert_eq!(sizes(&layout.groups), vec![0.5, 0.5]);
    }

    #[test]
    fn empty_splits_are_addressed_as_leaves() {
        let mut layout = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::split(0.5, vec![]), GroupLayout::leaf(0.5)],
        };
        assert_eq!(layout.leaf_count(), 2);
        assert_eq!(leaf_path(&layout, 0), Some(vec![0]));
        assert_eq!(leaf_path(&layout, 1), Some(vec![1]));

        normalize(&mut layout);
        assert_eq!(layout.leaf_count(), 2);
        assert!(layout.groups.iter().all(|group| group.groups.is_none()));
    }

    #[test]
    fn perpendicular_insert_wraps_the_leaf() {
        let mut layout = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)],
        };
        assert_eq!(
            insert_leaf(&mut layout, 1, Orientation::Vertical, Placement::After),
            Some(2)
        );
        assert_eq!(layout.leaf_count(), 3);
        assert!(layout.groups[0].is_leaf());
        assert_eq!(layout.groups[1].groups.as_ref().map(Vec::len), Some(2));

        assert_eq!(
            insert_leaf(&mut layout, 0, Orientation::Horizontal, Placement::Before),
            Some(0)
        );
        assert_eq!(layout.groups.len(), 3);
        assert_eq!(sizes(&layout.groups), vec![0.25, 0.25, 0.5]);
    }

    #[test]
    fn removing_leaves_collapses_the_tree() {
        let mut layout = EditorLayout::canonical();
        assert!(remove_leaf(&mut layout, 2));
        assert_eq!(layout.leaf_count(), 2);
        assert!(layout.groups.iter().all(GroupLayout::is_leaf));
        assert_eq!(layout.orientation, Orientation::Horizontal);

        assert!(remove_leaf(&mut layout, 0));
        assert_eq!(layout.leaf_count(), 1);
        assert!(!remove_leaf(&mut layout, 0));
    }

    #[test]
    fn removing_the_left_column_flips_the_root() {
        let mut layout = EditorLayout::canonical();
        assert!(remove_leaf(&mut layout, 0));
        assert_eq!(layout.orientation, Orientation::Vertical);
        assert_eq!(layout.groups.len(), 2);
        assert!(layout.groups.iter().all(GroupLayout::is_leaf));
    }

    #[test]
    fn splices_grandchildren_into_the_parent_list() {
        let mut layout = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::leaf(0.5),
                GroupLayout::split(
                    0.5,
                    vec![
                        GroupLayout::leaf(0.5),
                        GroupLayout::split(
                            0.5,
                            vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)],
                        ),
                    ],
                ),
            ],
        };
        assert!(remove_leaf(&mut layout, 1));
        assert_eq!(layout.groups.len(), 3);
        assert!(layout.groups.iter().all(GroupLayout::is_leaf));
        assert_eq!(sizes(&layout.groups), vec![0.5, 0.25, 0.25]);
    }

    #[test]
    fn even_widths_only_touches_top_level() {
        let mut layout = EditorLayout::canonical();
        even_widths(&mut layout);
        assert_eq!(sizes(&layout.groups), vec![0.5, 0.5]);
        let right = layout.groups[1].groups.as_deref().unwrap_or_default();
        assert_eq!(sizes(right), vec![0.7, 1.0 - 0.7]);
    }
}
