//! Editor grid geometry and the canonical Pochi proportions.

use serde::{Deserialize, Serialize};

/// Share of the window width taken by the task column.
pub const TASK_COLUMN_RATIO: f64 = 0.35;
/// Share of the right column height taken by the editor row.
pub const EDITOR_ROW_RATIO: f64 = 0.7;
/// Allowed deviation from the canonical ratios.
pub const SIZE_TOLERANCE: f64 = 0.1;

// Absorbs float noise so a deviation of exactly the tolerance still matches.
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }
}

/// One cell of the grid. Nested groups are laid out perpendicular to their
/// parent list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLayout {
    pub size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupLayout>>,
}

impl GroupLayout {
    pub fn leaf(size: f64) -> Self {
        Self { size, groups: None }
    }

    pub fn split(size: f64, groups: Vec<GroupLayout>) -> Self {
        Self {
            size,
            groups: Some(groups),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_leaf(&self) -> bool {
        self.groups.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Geometry of the editor area of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorLayout {
    pub orientation: Orientation,
    pub groups: Vec<GroupLayout>,
}

impl EditorLayout {
    /// `[task 0.35 | [editor 0.7 / terminal 0.3] 0.65]`
    pub fn canonical() -> Self {
        Self {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::leaf(TASK_COLUMN_RATIO),
                GroupLayout::split(
                    1.0 - TASK_COLUMN_RATIO,
                    vec![
                        GroupLayout::leaf(EDITOR_ROW_RATIO),
                        GroupLayout::leaf(1.0 - EDITOR_ROW_RATIO),
                    ],
                ),
            ],
        }
    }

    /// Single group filling the window.
    pub fn single() -> Self {
        Self {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::leaf(1.0)],
        }
    }

    pub fn leaf_count(&self) -> usize {
        count_groups_recursive(&self.groups)
    }

    /// Whether the proportions are close enough to [`EditorLayout::canonical`].
    pub fn matches_canonical_size(&self) -> bool {
        if self.orientation != Orientation::Horizontal {
            return false;
        }
        let [left, right] = self.groups.as_slice() else {
            return false;
        };
        if !ratio_matches(left.size, right.size, TASK_COLUMN_RATIO) {
            return false;
        }
        let Some([top, bottom]) = right.groups.as_deref() else {
            return false;
        };
        ratio_matches(top.size, bottom.size, EDITOR_ROW_RATIO)
    }
}

/// Number of leaf groups in a layout list.
pub fn count_groups_recursive(groups: &[GroupLayout]) -> usize {
    groups
        .iter()
        .map(|group| match &group.groups {
            Some(children) if !children.is_empty() => count_groups_recursive(children),
            _ => 1,
        })
        .sum()
}

fn ratio_matches(first: f64, second: f64, target: f64) -> bool {
    let total = first + second;
    if total <= 0.0 || !total.is_finite() {
        return false;
    }
    (first / total - target).abs() <= SIZE_TOLERANCE + RATIO_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(left: f64, right: f64, top: f64, bottom: f64) -> EditorLayout {
        EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::leaf(left),
                GroupLayout::split(right, vec![GroupLayout::leaf(top), GroupLayout::leaf(bottom)]),
            ],
        }
    }

    #[test]
    fn canonical_layout_matches_itself() {
        let canonical = EditorLayout::canonical();
        assert!(canonical.matches_canonical_size());
        assert_eq!(canonical.leaf_count(), 3);
    }

    #[test]
    fn ratios_are_relative() {
        assert!(layout(350.0, 650.0, 140.0, 60.0).matches_canonical_size());
    }

    #[test]
    fn tolerance_boundaries() {
        assert!(layout(0.45, 0.55, 0.7, 0.3).matches_canonical_size());
        assert!(layout(0.25, 0.75, 0.6, 0.4).matches_canonical_size());
        assert!(!layout(0.4501, 0.5499, 0.7, 0.3).matches_canonical_size());
        assert!(!layout(0.35, 0.65, 0.5999, 0.4001).matches_canonical_size());
    }

    #[test]
    fn structural_mismatches() {
        let mut vertical = EditorLayout::canonical();
        vertical.orientation = Orientation::Vertical;
        assert!(!vertical.matches_canonical_size());

        let three_columns = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::leaf(0.3); 3],
        };
        assert!(!three_columns.matches_canonical_size());

        let flat_right = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::leaf(0.35), GroupLayout::leaf(0.65)],
        };
        assert!(!flat_right.matches_canonical_size());
    }

    #[test]
    fn zero_sized_pairs_never_match() {
        assert!(!layout(0.0, 0.0, 0.7, 0.3).matches_canonical_size());
        assert!(!layout(0.35, 0.65, 0.0, 0.0).matches_canonical_size());
    }

    #[test]
    fn counts_nested_leaves() {
        let groups = vec![
            GroupLayout::leaf(0.5),
            GroupLayout::split(
                0.5,
                vec![
                    GroupLayout::leaf(0.5),
                    GroupLayout::split(0.5, vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)]),
                ],
            ),
        ];
        assert_eq!(count_groups_recursive(&groups), 4);
        assert_eq!(count_groups_recursive(&[GroupLayout::split(1.0, vec![])]), 1);
    }

    #[test]
    fn serializes_without_empty_groups() {
        let json = serde_json::to_string(&EditorLayout::single()).expect("serialize");
        assert_eq!(json, r#"{"orientation":"horizontal","groups":[{"size":1.0}]}"#);
    }
}
