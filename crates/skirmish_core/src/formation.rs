//! Formation generator.
//!
//! Pure geometry: turns an anchor (or a dragged line) and a unit count into
//! target positions and a shared facing. Selection state that a client UI
//! keeps (chosen shape, lock toggle) is passed in as [`FormationSettings`]
//! on every call instead of living in globals.

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, wrap_angle, yaw_towards, Fixed, Vec2Fixed, HALF_PI, TAU};

/// Shape used when generating fresh slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FormationKind {
    /// Single rank perpendicular to the facing.
    #[default]
    Line,
    /// Near-square grid, front rank first.
    Box,
    /// Leader in front, flanks trailing back on both sides.
    Wedge,
    /// Ring around the anchor.
    Circle,
}

/// Per-request formation input from the commanding client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationSettings {
    /// Shape for generated slots.
    pub kind: FormationKind,
    /// Keep the group's current relative layout instead of generating slots.
    pub locked: bool,
    /// Distance between neighbouring slots.
    #[serde(with = "decimal_serde")]
    pub spacing: Fixed,
}

impl Default for FormationSettings {
    fn default() -> Self {
        Self {
            kind: FormationKind::Line,
            locked: false,
            spacing: Fixed::from_num(1.5),
        }
    }
}

/// Target for one unit of a group move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationSlot {
    /// Index into the unit list passed to [`plan_group_move`].
    pub unit_index: usize,
    /// Destination.
    pub position: Vec2Fixed,
    /// Facing on arrival.
    #[serde(with = "crate::math::fixed_serde")]
    pub yaw: Fixed,
}

/// Slot offsets in formation space (+y is forward), centred on the anchor.
#[must_use]
pub fn local_offsets(kind: FormationKind, count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
    if count == 0 {
        return Vec::new();
    }

    match kind {
        FormationKind::Line => line_offsets(count, spacing),
        FormationKind::Box => box_offsets(count, spacing),
        FormationKind::Wedge => wedge_offsets(count, spacing),
        FormationKind::Circle => circle_offsets(count, spacing),
    }
}

fn centered(index: usize, count: usize, spacing: Fixed) -> Fixed {
    // (i - (n - 1) / 2) * spacing without leaving integer math for the index part
    (Fixed::from_num(index) - Fixed::from_num(count - 1) / Fixed::from_num(2)) * spacing
}

fn line_offsets(count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
    (0..count)
        .map(|i| Vec2Fixed::new(centered(i, count, spacing), Fixed::ZERO))
        .collect()
}

fn box_offsets(count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    let rows = count.div_ceil(cols);

    (0..count)
        .map(|i| {
            let row = i / cols;
            let col = i % cols;
            let in_row = if row + 1 == rows { count - row * cols } else { cols };
            Vec2Fixed::new(
                centered(col, in_row, spacing),
                -centered(row, rows, spacing),
            )
        })
        .collect()
}

fn wedge_offsets(count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
    (0..count)
        .map(|i| {
            let rank = Fixed::from_num(i.div_ceil(2));
            let side = if i % 2 == 1 { -Fixed::ONE } else { Fixed::ONE };
            Vec2Fixed::new(side * rank * spacing, -rank * spacing)
        })
        .collect()
}

fn circle_offsets(count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
    if count == 1 {
        return vec![Vec2Fixed::ZERO];
    }
    let circumference = Fixed::from_num(count) * spacing;
    let radius = (circumference / TAU).max(spacing);
    let step = TAU / Fixed::from_num(count);

    (0..count)
        .map(|i| {
            let angle = step * Fixed::from_num(i);
            Vec2Fixed::new(Fixed::ZERO, radius).rotate(angle)
        })
        .collect()
}

/// Generate world-space slots around `anchor` facing `yaw`.
#[must_use]
pub fn generate(
    kind: FormationKind,
    anchor: Vec2Fixed,
    yaw: Fixed,
    count: usize,
    spacing: Fixed,
) -> Vec<Vec2Fixed> {
    local_offsets(kind, count, spacing)
        .into_iter()
        .map(|offset| anchor + offset.rotate(yaw))
        .collect()
}

/// Spread `count` slots evenly along a dragged line from `start` to `end`.
///
/// A single unit goes to the midpoint. The returned facing is perpendicular
/// to the line, pointing to its left-hand side when walking from `start`.
#[must_use]
pub fn along_line(start: Vec2Fixed, end: Vec2Fixed, count: usize) -> (Vec<Vec2Fixed>, Fixed) {
    let yaw = wrap_angle(yaw_towards(end - start) - HALF_PI);
    let slots = match count {
        0 => Vec::new(),
        1 => vec![start.lerp(end, Fixed::from_num(0.5))],
        _ => {
            let last = Fixed::from_num(count - 1);
            (0..count)
                .map(|i| start.lerp(end, Fixed::from_num(i) / last))
                .collect()
        }
    };
    (slots, yaw)
}

/// Centroid of a set of positions, zero for an empty set.
#[must_use]
pub fn centroid(positions: &[Vec2Fixed]) -> Vec2Fixed {
    if positions.is_empty() {
        return Vec2Fixed::ZERO;
    }
    let n = Fixed::from_num(positions.len());
    let mut sum = Vec2Fixed::ZERO;
    for p in positions {
        sum += *p;
    }
    Vec2Fixed::new(sum.x / n, sum.y / n)
}

/// Keep the group's current layout and move it so its centroid lands on
/// `anchor`.
#[must_use]
pub fn locked(current: &[Vec2Fixed], anchor: Vec2Fixed) -> Vec<Vec2Fixed> {
    let center = centroid(current);
    current.iter().map(|p| anchor + (*p - center)).collect()
}

/// Match units to slots.
///
/// Greedy over all (unit, slot) pairs by ascending distance, ties broken by
/// unit index then slot index, so the result only depends on the inputs.
#[must_use]
pub fn assign_slots(units: &[Vec2Fixed], slots: &[Vec2Fixed]) -> Vec<usize> {
    let mut pairs: Vec<(Fixed, usize, usize)> = units
        .iter()
        .enumerate()
        .flat_map(|(u, up)| {
            slots
                .iter()
                .enumerate()
                .map(move |(s, sp)| (up.distance_squared(*sp), u, s))
        })
        .collect();
    pairs.sort_unstable();

    let mut assignment = vec![usize::MAX; units.len()];
    let mut taken = vec![false; slots.len()];
    for (_, u, s) in pairs {
        if assignment[u] == usize::MAX && !taken[s] {
            assignment[u] = s;
            taken[s] = true;
        }
    }
    assignment
}

/// Plan destinations for a group move.
///
/// With `drag_end` the slots are spread along the dragged line. Otherwise
/// the group faces from its centroid toward `anchor` and either keeps its
/// layout (`settings.locked`) or forms `settings.kind` there.
#[must_use]
pub fn plan_group_move(
    settings: &FormationSettings,
    units: &[Vec2Fixed],
    anchor: Vec2Fixed,
    drag_end: Option<Vec2Fixed>,
) -> Vec<FormationSlot> {
    if units.is_empty() {
        return Vec::new();
    }

    let (slots, yaw) = match drag_end {
        Some(end) if end != anchor => along_line(anchor, end, units.len()),
        _ => {
            let heading = anchor - centroid(units);
            let yaw = if heading == Vec2Fixed::ZERO {
                Fixed::ZERO
            } else {
                yaw_towards(heading)
            };
            let slots = if settings.locked {
                locked(units, anchor)
            } else {
                generate(settings.kind, anchor, yaw, units.len(), settings.spacing)
            };
            (slots, yaw)
        }
    };

    if settings.locked && drag_end.is_none() {
        // Locked groups keep their layout, so unit i keeps slot i.
        return slots
            .into_iter()
            .enumerate()
            .map(|(unit_index, position)| FormationSlot {
                unit_index,
                position,
                yaw,
            })
            .collect();
    }

    assign_slots(units, &slots)
        .into_iter()
        .enumerate()
        .map(|(unit_index, slot)| FormationSlot {
            unit_index,
            position: slots[slot],
            yaw,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    fn close(a: Vec2Fixed, b: Vec2Fixed) -> bool {
        a.distance_squared(b) < Fixed::from_num(1e-6)
    }

    #[test]
    fn test_line_is_centered() {
        let offsets = local_offsets(FormationKind::Line, 3, Fixed::from_num(2));
        assert_eq!(offsets, vec![v(-2.0, 0.0), v(0.0, 0.0), v(2.0, 0.0)]);
    }

    #[test]
    fn test_every_kind_yields_count_slots() {
        for kind in [
            FormationKind::Line,
            FormationKind::Box,
            FormationKind::Wedge,
            FormationKind::Circle,
        ] {
            for count in 0..12 {
                assert_eq!(local_offsets(kind, count, Fixed::ONE).len(), count);
            }
        }
    }

    #[test]
    fn test_box_slots_are_distinct() {
        let offsets = local_offsets(FormationKind::Box, 7, Fixed::ONE);
        for (i, a) in offsets.iter().enumerate() {
            for b in &offsets[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_wedge_leader_in_front() {
        let offsets = local_offsets(FormationKind::Wedge, 5, Fixed::ONE);
        assert_eq!(offsets[0], Vec2Fixed::ZERO);
        assert!(offsets[1..].iter().all(|o| o.y < Fixed::ZERO));
    }

    #[test]
    fn test_generate_rotates_with_yaw() {
        // Facing +x, a line runs along y.
        let slots = generate(FormationKind::Line, v(10.0, 0.0), HALF_PI, 2, Fixed::from_num(2));
        assert!(close(slots[0], v(10.0, 1.0)));
        assert!(close(slots[1], v(10.0, -1.0)));
    }

    #[test]
    fn test_along_line_endpoints_and_facing() {
        let (slots, yaw) = along_line(v(0.0, 0.0), v(4.0, 0.0), 3);
        assert_eq!(slots, vec![v(0.0, 0.0), v(2.0, 0.0), v(4.0, 0.0)]);
        assert!(yaw.abs() < Fixed::from_num(1e-3));

        let (single, _) = along_line(v(0.0, 0.0), v(4.0, 0.0), 1);
        assert_eq!(single, vec![v(2.0, 0.0)]);
    }

    #[test]
    fn test_locked_preserves_offsets() {
        let current = [v(0.0, 0.0), v(2.0, 0.0), v(1.0, 3.0)];
        let moved = locked(&current, v(11.0, 11.0));
        assert_eq!(moved[1] - moved[0], current[1] - current[0]);
        assert_eq!(moved[2] - moved[0], current[2] - current[0]);
        assert!(close(centroid(&moved), v(11.0, 11.0)));
    }

    #[test]
    fn test_assign_slots_avoids_crossing() {
        let units = [v(0.0, 0.0), v(10.0, 0.0)];
        let slots = [v(10.0, 5.0), v(0.0, 5.0)];
        assert_eq!(assign_slots(&units, &slots), vec![1, 0]);
    }

    #[test]
    fn test_plan_group_move_faces_anchor() {
        let units = [v(0.0, 0.0), v(1.0, 0.0)];
        let plan = plan_group_move(&FormationSettings::default(), &units, v(0.5, 10.0), None);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|s| s.yaw.abs() < Fixed::from_num(1e-3)));
        assert!(plan.iter().all(|s| s.position.y == Fixed::from_num(10)));
    }

    #[test]
    fn test_slot_survives_ron_round_trip() {
        let units = [v(0.0, 0.0), v(1.0, 0.0), v(2.0, 0.0)];
        let plan = plan_group_move(&FormationSettings::default(), &units, v(7.0, -3.0), None);
        let text = ron::to_string(&plan).unwrap();
        let restored: Vec<FormationSlot> = ron::from_str(&text).unwrap();
        assert_eq!(restored, plan);
    }
}
