use thiserror::Error;

use crate::geometry::{EditorLayout, Orientation, count_groups_recursive};
use crate::tabs::{GroupType, TabGroup};

/// Why the current arrangement is not the Pochi layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidLayout {
    #[error("Less than 3 groups.")]
    TooFewGroups,
    #[error("Has split windows")]
    SplitWindows,
    #[error("Root: not horizontal")]
    RootNotHorizontal,
    #[error("Root: not 2 column")]
    RootNotTwoColumns,
    #[error("Left: has sub groups")]
    LeftHasSubGroups,
    #[error("Right: not 2 row")]
    RightNotTwoRows,
    #[error("Right-Bottom: has sub groups")]
    RightBottomHasSubGroups,
    #[error("Left: not empty or pochi-task only")]
    LeftNotTaskOnly,
    #[error("Right-Bottom: not empty or terminal only")]
    RightBottomNotTerminalOnly,
    #[error("Layout view size mismatch")]
    SizeMismatch,
}

/// Checks `groups` (sorted by view column) against the main window `layout`.
pub fn validate_layout(groups: &[TabGroup], layout: &EditorLayout) -> Result<(), InvalidLayout> {
    if groups.len() < 3 {
        return Err(InvalidLayout::TooFewGroups);
    }
    if groups.len() > count_groups_recursive(&layout.groups) {
        return Err(InvalidLayout::SplitWindows);
    }
    if layout.orientation != Orientation::Horizontal {
        return Err(InvalidLayout::RootNotHorizontal);
    }
    let [left, right] = layout.groups.as_slice() else {
        return Err(InvalidLayout::RootNotTwoColumns);
    };
    if left.groups.is_some() {
        return Err(InvalidLayout::LeftHasSubGroups);
    }
    let Some([_, right_bottom]) = right.groups.as_deref() else {
        return Err(InvalidLayout::RightNotTwoRows);
    };
    if right_bottom.groups.is_some() {
        return Err(InvalidLayout::RightBottomHasSubGroups);
    }

    let left_type = groups.first().map(TabGroup::group_type);
    if !matches!(left_type, Some(GroupType::Empty | GroupType::Task)) {
        return Err(InvalidLayout::LeftNotTaskOnly);
    }
    let bottom_type = groups.last().map(TabGroup::group_type);
    if !matches!(bottom_type, Some(GroupType::Empty | GroupType::Terminal)) {
        return Err(InvalidLayout::RightBottomNotTerminalOnly);
    }

    if !layout.matches_canonical_size() {
        return Err(InvalidLayout::SizeMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GroupLayout;
    use crate::tabs::{GroupId, Tab, TabId, TabInput, TerminalId};

    fn group(index: usize, inputs: Vec<TabInput>) -> TabGroup {
        let tabs: Vec<Tab> = inputs
            .into_iter()
            .enumerate()
            .map(|(offset, input)| Tab {
                id: TabId((index * 10 + offset) as u64),
                label: String::new(),
                input,
            })
            .collect();
        TabGroup {
            id: GroupId(index as u64),
            view_column: index + 1,
            active_tab: tabs.first().map(|tab| tab.id),
            tabs,
            is_active: index == 0,
            is_locked: false,
        }
    }

    fn pochi_groups() -> Vec<TabGroup> {
        vec![
            group(0, vec![TabInput::task("pochi-task:///1")]),
            group(1, vec![TabInput::text("file:///src/main.rs")]),
            group(2, vec![TabInput::terminal(TerminalId(1))]),
        ]
    }

    #[test]
    fn canonical_arrangement_is_valid() {
        assert_eq!(validate_layout(&pochi_groups(), &EditorLayout::canonical()), Ok(()));

        let empty = vec![group(0, vec![]), group(1, vec![]), group(2, vec![])];
        assert_eq!(validate_layout(&empty, &EditorLayout::canonical()), Ok(()));
    }

    #[test]
    fn reports_first_failing_check() {
        let groups = pochi_groups();
        assert_eq!(
            validate_layout(&groups[..2], &EditorLayout::canonical()),
            Err(InvalidLayout::TooFewGroups)
        );

        let mut with_split = groups.clone();
        with_split.push(group(3, vec![TabInput::text("file:///b.rs")]));
        assert_eq!(
            validate_layout(&with_split, &EditorLayout::canonical()),
            Err(InvalidLayout::SplitWindows)
        );

        let mut vertical = EditorLayout::canonical();
        vertical.orientation = Orientation::Vertical;
        assert_eq!(
            validate_layout(&groups, &vertical),
            Err(InvalidLayout::RootNotHorizontal)
        );

        let columns = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![GroupLayout::leaf(0.3); 3],
        };
        assert_eq!(
            validate_layout(&groups, &columns),
            Err(InvalidLayout::RootNotTwoColumns)
        );

        let left_split = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::split(0.35, vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)]),
                GroupLayout::leaf(0.65),
            ],
        };
        assert_eq!(
            validate_layout(&groups, &left_split),
            Err(InvalidLayout::LeftHasSubGroups)
        );

        let flat_right = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::leaf(0.35),
                GroupLayout::split(
                    0.65,
                    vec![GroupLayout::leaf(0.3), GroupLayout::leaf(0.3), GroupLayout::leaf(0.4)],
                ),
            ],
        };
        assert_eq!(
            validate_layout(&groups, &flat_right),
            Err(InvalidLayout::RightNotTwoRows)
        );

        let nested_bottom = EditorLayout {
            orientation: Orientation::Horizontal,
            groups: vec![
                GroupLayout::leaf(0.35),
                GroupLayout::split(
                    0.65,
                    vec![
                        GroupLayout::leaf(0.7),
                        GroupLayout::split(
                            0.3,
                            vec![GroupLayout::leaf(0.5), GroupLayout::leaf(0.5)],
                        ),
                    ],
                ),
            ],
        };
        assert_eq!(
            validate_layout(&groups, &nested_bottom),
            Err(InvalidLayout::RightBottomHasSubGroups)
        );
    }

    #[test]
    fn checks_group_contents_and_size() {
        let mut groups = pochi_groups();
        groups.swap(0, 1);
        assert_eq!(
            validate_layout(&groups, &EditorLayout::canonical()),
            Err(InvalidLayout::LeftNotTaskOnly)
        );

        let mut groups = pochi_groups();
        groups[2] = group(2, vec![TabInput::terminal(TerminalId(1)), TabInput::text("file:///a")]);
        assert_eq!(
            validate_layout(&groups, &EditorLayout::canonical()),
            Err(InvalidLayout::RightBottomNotTerminalOnly)
        );

        let mut skewed = EditorLayout::canonical();
        skewed.groups[0].size = 0.8;
        skewed.groups[1].size = 0.2;
        assert_eq!(
            validate_layout(&pochi_groups(), &skewed),
            Err(InvalidLayout::SizeMismatch)
        );
    }

    #[test]
    fn reasons_render_as_log_messages() {
        assert_eq!(InvalidLayout::TooFewGroups.to_string(), "Less than 3 groups.");
        assert_eq!(
            InvalidLayout::RightBottomNotTerminalOnly.to_string(),
            "Right-Bottom: not empty or terminal only"
        );
    }
}
