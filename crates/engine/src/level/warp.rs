use std::collections::BTreeMap;

use crate::geom::{Delta, Orientation, Pos};

use super::{Level, LevelError, WarpZone};

/// Warp rectangle as placed in the level, in tile coordinates (inclusive).
/// The orientation's right vector points into the warp; its down vector
/// carries mirroring.
#[derive(Debug, Clone)]
pub(super) struct RawWarpZone {
    pub(super) name: String,
    pub(super) start_tile: Pos,
    pub(super) end_tile: Pos,
    pub(super) orientation: Orientation,
    pub(super) initial_state: bool,
}

impl RawWarpZone {
    /// Rectangle center in doubled tile coordinates.
    fn center2(&self) -> Pos {
        Pos::new(
            self.start_tile.x + self.end_tile.x,
            self.start_tile.y + self.end_tile.y,
        )
    }
}

/// Pairs warp rectangles by name and stores one directed edge per covered
/// tile on both legs.
pub(super) fn link_warp_zones(
    level: &mut Level,
    warp_zones: BTreeMap<String, Vec<RawWarpZone>>,
) -> Result<(), LevelError> {
    for (name, pair) in &warp_zones {
        if pair.len() != 2 {
            return Err(LevelError::UnpairedWarp {
                name: name.clone(),
                count: pair.len(),
            });
        }
        for a in 0..2 {
            link_leg(level, &pair[a], &pair[1 - a])?;
        }
        level
            .warp_initial_states
            .insert(name.clone(), pair.iter().all(|zone| zone.initial_state));
    }
    validate_warp_geometry(level)
}

fn link_leg(level: &mut Level, from: &RawWarpZone, to: &RawWarpZone) -> Result<(), LevelError> {
    // Walking in through `from` means walking out through `to`, hence the flip.
    let transform = to
        .orientation
        .concat(Orientation::flip_x())
        .concat(from.orientation.inverse());
    let from_center2 = from.center2();
    let to_center2 = to.center2();

    for y in from.start_tile.y..=from.end_tile.y {
        for x in from.start_tile.x..=from.end_tile.x {
            let from_pos = Pos::new(x, y);
            let prev_tile = from_pos + from.orientation.apply(Delta::west());
            let offset2 = from_pos.scale(2).delta(from_center2);
            let to_pos2 = to_center2 + transform.apply(offset2);
            let to_tile = to_pos2.div_floor(2) + to.orientation.apply(Delta::west());

            if level.tile(to_tile).is_none() {
                return Err(LevelError::OutOfBounds {
                    what: format!("destination of warp zone '{}'", from.name),
                    pos: to_tile,
                });
            }
            let Some(tile) = level.tile_mut(from_pos) else {
                return Err(LevelError::OutOfBounds {
                    what: format!("warp zone '{}'", from.name),
                    pos: from_pos,
                });
            };
            tile.warp_zones.push(WarpZone {
                name: from.name.clone(),
                initial_state: from.initial_state,
                prev_tile,
                to_tile,
                transform,
            });
        }
    }
    Ok(())
}

/// Every edge must be undone by an edge of the same name: stepping back out
/// of the destination must land on the tile the mover came from, with the
/// inverse transform.
fn validate_warp_geometry(level: &Level) -> Result<(), LevelError> {
    let mut result = Ok(());
    level.for_each_tile(|pos, tile| {
        if result.is_err() {
            return;
        }
        for warp in &tile.warp_zones {
            if let Err(reason) = check_reverse_edge(level, pos, warp) {
                result = Err(LevelError::InvalidWarpGeometry {
                    name: warp.name.clone(),
                    at: pos,
                    reason,
                });
                return;
            }
        }
    });
    result
}

fn check_reverse_edge(level: &Level, pos: Pos, warp: &WarpZone) -> Result<(), String> {
    let back_step = warp.transform.apply(warp.prev_tile.delta(pos));
    let back_tile = warp.to_tile + back_step;
    let reverse = level
        .warp_zones_at(back_tile)
        .iter()
        .find(|other| other.name == warp.name && other.prev_tile == warp.to_tile)
        .ok_or_else(|| format!("no reverse edge at {} entered from {}", back_tile, warp.to_tile))?;
    if reverse.to_tile != warp.prev_tile {
        return Err(format!(
            "reverse edge leads to {}, want {}",
            reverse.to_tile, warp.prev_tile
        ));
    }
    if warp.transform.concat(reverse.transform) != Orientation::identity() {
        return Err(format!(
            "transforms {} and {} do not cancel",
            warp.transform, reverse.transform
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::test_levels::{warp_room, WARP_ROOM};

    #[test]
    fn east_warp_pairs_with_rotated_partner() {
        let level = warp_room();

        let a = level.warp_zones_at(Pos::new(5, 5));
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].prev_tile, Pos::new(4, 5));
        assert_eq!(a[0].to_tile, Pos::new(9, 5));
        assert_eq!(a[0].transform, Orientation::turn_around());

        let b = level.warp_zones_at(Pos::new(10, 5));
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].prev_tile, Pos::new(9, 5));
        assert_eq!(b[0].to_tile, Pos::new(4, 5));
        assert_eq!(b[0].transform.concat(a[0].transform), Orientation::identity());
    }

    #[test]
    fn resolve_warp_moving_east_emerges_moving_west() {
        let level = warp_room();

        let (pos, transform) = level.resolve_warp(Pos::new(4, 5), Delta::east());
        assert_eq!(pos, Pos::new(9, 5));
        assert_eq!(transform.apply(Delta::east()), Delta::west());

        let (plain, identity) = level.resolve_warp(Pos::new(4, 4), Delta::east());
        assert_eq!(plain, Pos::new(5, 4));
        assert_eq!(identity, Orientation::identity());
    }

    #[test]
    fn crossing_then_crossing_back_round_trips() {
        let level = warp_room();
        let start = Pos::new(4, 5);
        let direction = Delta::east();

        let (arrived, forward) = level.resolve_warp(start, direction);
        let back_direction = forward.apply(-direction);
        let (returned, backward) = level.resolve_warp(arrived, back_direction);

        assert_eq!(returned, start);
        assert_eq!(backward.concat(forward), Orientation::identity());
    }

    #[test]
    fn multi_tile_warps_round_trip_every_cell() {
        let raw = WARP_ROOM
            .replace(
                r#"name="A" x="80" y="80" width="16" height="16""#,
                r#"name="A" x="80" y="64" width="16" height="32""#,
            )
            .replace(
                r#"name="A" x="160" y="80" width="16" height="16""#,
                r#"name="A" x="160" y="64" width="16" height="32""#,
            );
        let level = Level::parse("tall", &raw).expect("parse");

        for y in 4..=5 {
            let start = Pos::new(4, y);
            let (arrived, forward) = level.resolve_warp(start, Delta::east());
            assert_ne!(arrived, Pos::new(5, y));
            let (returned, backward) = level.resolve_warp(arrived, forward.apply(Delta::west()));
            assert_eq!(returned, start);
            assert_eq!(backward.concat(forward), Orientation::identity());
        }
        // Rotated by 180 degrees, so the top cell of A lands on the bottom row of B.
        assert_eq!(level.resolve_warp(Pos::new(4, 4), Delta::east()).0, Pos::new(9, 5));
    }

    #[test]
    fn unpaired_warp_is_rejected() {
        let raw = WARP_ROOM.replace(
            r#"<object id="3" type="WarpZone" name="A""#,
            r#"<object id="3" type="WarpZone" name="B""#,
        );
        let err = Level::parse("unpaired", &raw).expect_err("unpaired");
        assert!(matches!(err, LevelError::UnpairedWarp { ref name, count: 1 } if name == "A"));
    }

    #[test]
    fn mismatched_warp_sizes_are_rejected() {
        let raw = WARP_ROOM.replace(
            r#"name="A" x="80" y="80" width="16" height="16""#,
            r#"name="A" x="80" y="64" width="16" height="32""#,
        );
        let err = Level::parse("mismatch", &raw).expect_err("mismatch");
        assert!(matches!(err, LevelError::InvalidWarpGeometry { .. }), "{err}");
    }

    #[test]
    fn warp_leading_off_map_is_out_of_bounds() {
        let raw = WARP_ROOM.replace(
            r#"name="A" x="160" y="80" width="16" height="16">
      <property name="orientation" value="EN"/>"#,
            r#"name="A" x="0" y="80" width="16" height="16">
      <property name="orientation" value="ES"/>"#,
        );
        let err = Level::parse("edge", &raw).expect_err("edge");
        assert!(matches!(err, LevelError::OutOfBounds { .. }), "{err}");
    }
}
