use engine::{Quat, Transform, Vec3};

use super::decor::CellType;
use super::maze::{Cell, Side};
use super::pool::PoolKind;

/// Offsets in the layout table are authored for a 16-unit cell and scaled
/// to the configured cell size.
const AUTHORED_CELL_SIZE: f32 = 16.0;
const PILLAR_HEIGHT_PER_SCALE: f32 = 0.9;
const TREE_HEIGHT: f32 = 5.5;
const TREE_SCALE: f32 = 6.0;
const FLOOR_THICKNESS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CellGeometry {
    pub(crate) cell_size: f32,
    pub(crate) wall_thickness: f32,
    pub(crate) wall_height: f32,
}

impl Default for CellGeometry {
    fn default() -> Self {
        Self {
            cell_size: 16.0,
            wall_thickness: 5.0,
            wall_height: 5.0,
        }
    }
}

impl CellGeometry {
    /// World-space corner of grid cell `(x, y)`. The grid is shifted so that
    /// parcel (0,0) is cell `(cols/2, rows/2)`.
    pub(crate) fn cell_origin(&self, x: u32, y: u32, cols: u32, rows: u32) -> (f32, f32) {
        let base_x = (x as f32 - (cols / 2) as f32) * self.cell_size;
        let base_z = (y as f32 - (rows / 2) as f32) * self.cell_size;
        (base_x, base_z)
    }

    fn scale_factor(&self) -> f32 {
        self.cell_size / AUTHORED_CELL_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Placement {
    pub(crate) kind: PoolKind,
    pub(crate) transform: Transform,
}

#[derive(Debug, Clone, Copy)]
struct PillarSpot {
    offset: (f32, f32),
    scale: (f32, f32, f32),
}

const fn spot(x: f32, z: f32, sx: f32, sy: f32, sz: f32) -> PillarSpot {
    PillarSpot {
        offset: (x, z),
        scale: (sx, sy, sz),
    }
}

const SINGLE_PILLAR: [PillarSpot; 1] = [spot(10.0, 10.0, 2.0, 2.0, 2.0)];
const FOUR_PILLARS: [PillarSpot; 4] = [
    spot(4.0, 4.0, 2.0, 2.0, 2.0),
    spot(12.0, 4.0, 2.0, 2.0, 2.0),
    spot(4.0, 12.0, 2.0, 2.0, 2.0),
    spot(12.0, 12.0, 2.0, 2.0, 2.0),
];
const LARGE_PILLAR: [PillarSpot; 1] = [spot(8.0, 8.0, 4.0, 4.0, 4.0)];
const HUGE_PILLAR: [PillarSpot; 1] = [spot(8.0, 8.0, 6.0, 6.0, 6.0)];
// Thin partitions run along the open axis, lining the corridor.
const EAST_WEST_PARTITIONS: [PillarSpot; 2] = [
    spot(5.0, 4.0, 10.0, 2.0, 0.3),
    spot(11.0, 12.0, 10.0, 2.0, 0.3),
];
const NORTH_SOUTH_PARTITIONS: [PillarSpot; 2] = [
    spot(4.0, 5.0, 0.3, 2.0, 10.0),
    spot(12.0, 11.0, 0.3, 2.0, 10.0),
];

/// Largest pillar count any cell layout asks for.
pub(crate) const MAX_PILLARS_PER_CELL: usize = FOUR_PILLARS.len();

fn pillar_layout(kind: CellType) -> &'static [PillarSpot] {
    match kind {
        CellType(1) => &SINGLE_PILLAR,
        CellType(2) | CellType(3) => &FOUR_PILLARS,
        CellType(4) => &LARGE_PILLAR,
        CellType(5) => &HUGE_PILLAR,
        CellType::CORRIDOR_EAST_WEST => &EAST_WEST_PARTITIONS,
        CellType::CORRIDOR_NORTH_SOUTH => &NORTH_SOUTH_PARTITIONS,
        _ => &[],
    }
}

/// Every pooled entity a revealed cell needs, in checkout order: walls,
/// floors, pillars, then trees. Bottom and left walls are only emitted on the
/// grid's outer edge since the neighbour's top/right wall covers them.
pub(crate) fn cell_placements(cell: &Cell, origin: (f32, f32), geometry: &CellGeometry) -> Vec<Placement> {
    let (base_x, base_z) = origin;
    let length = geometry.cell_size;
    let thickness = geometry.wall_thickness;
    let height = geometry.wall_height;
    let wall_scale = Vec3::new(length, height, thickness);
    let mut placements = Vec::new();

    let wall = |position: Vec3, yaw_degrees: f32| Placement {
        kind: PoolKind::Wall,
        transform: Transform::at(position)
            .with_rotation(Quat::from_yaw_degrees(yaw_degrees))
            .with_scale(wall_scale),
    };
    if cell.has_wall(Side::Bottom) && cell.y == 0 {
        placements.push(wall(
            Vec3::new(base_x + length / 2.0, height / 2.0, base_z + thickness / 2.0),
            180.0,
        ));
    }
    if cell.has_wall(Side::Right) {
        placements.push(wall(
            Vec3::new(base_x + length - thickness / 2.0, height / 2.0, base_z + length / 2.0),
            90.0,
        ));
    }
    if cell.has_wall(Side::Top) {
        placements.push(wall(
            Vec3::new(base_x + length / 2.0, height / 2.0, base_z + length - thickness / 2.0),
            0.0,
        ));
    }
    if cell.has_wall(Side::Left) && cell.x == 0 {
        placements.push(wall(
            Vec3::new(base_x + thickness / 2.0, height / 2.0, base_z + length / 2.0),
            90.0,
        ));
    }

    let floor_length = length / 2.0;
    for i in 0..2 {
        for j in 0..2 {
            placements.push(Placement {
                kind: PoolKind::Floor,
                transform: Transform::at(Vec3::new(
                    base_x + floor_length / 2.0 + i as f32 * floor_length,
                    0.0,
                    base_z + floor_length / 2.0 + j as f32 * floor_length,
                ))
                .with_scale(Vec3::new(floor_length, FLOOR_THICKNESS, floor_length)),
            });
        }
    }

    let factor = geometry.scale_factor();
    for spot in pillar_layout(cell.kind) {
        let (sx, sy, sz) = spot.scale;
        placements.push(Placement {
            kind: PoolKind::Pillar,
            transform: Transform::at(Vec3::new(
                base_x + spot.offset.0 * factor,
                PILLAR_HEIGHT_PER_SCALE * sy,
                base_z + spot.offset.1 * factor,
            ))
            .with_scale(Vec3::new(sx, sy, sz)),
        });
    }

    if cell.kind == CellType::TREE {
        placements.push(Placement {
            kind: PoolKind::Tree,
            transform: Transform::at(Vec3::new(
                base_x + 8.0 * factor,
                TREE_HEIGHT,
                base_z + 8.0 * factor,
            ))
            .with_rotation(Quat::from_yaw_degrees(180.0))
            .with_scale(Vec3::splat(TREE_SCALE)),
        });
    }

    placements
}
