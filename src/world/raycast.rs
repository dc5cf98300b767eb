//! 3D DDA raycast against the voxel grid (Amanatides & Woo fast voxel
//! traversal), stepping a `BlockIterator` rather than recomputing chunk
//! coordinates from a world position at every step.

use glam::Vec3;

use crate::capability::BlockState;
use crate::chunk::{BlockIterator, Direction};
use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};

/// Result of a `raycast_vs_blocks` call. `impact_*` fields are only
/// meaningful when `did_impact` is true.
pub struct RaycastHit<S> {
    pub did_impact: bool,
    pub impact_iter: Option<BlockIterator>,
    pub impact_state: Option<S>,
    pub impact_normal: Option<Direction>,
    pub impact_position: Vec3,
    pub impact_distance: f32,
}

impl<S> RaycastHit<S> {
    fn miss() -> Self {
        Self {
            did_impact: false,
            impact_iter: None,
            impact_state: None,
            impact_normal: None,
            impact_position: Vec3::ZERO,
            impact_distance: f32::INFINITY,
        }
    }
}

fn world_to_iter(pos: Vec3) -> Option<BlockIterator> {
    let z = pos.z.floor();
    if z < 0.0 || z >= CHUNK_SIZE_Z as f32 {
        return None;
    }
    let chunk_x = (pos.x / CHUNK_SIZE_X as f32).floor() as i32;
    let chunk_y = (pos.y / CHUNK_SIZE_Y as f32).floor() as i32;
    let local_x = (pos.x - (chunk_x * CHUNK_SIZE_X as i32) as f32).floor() as usize;
    let local_y = (pos.y - (chunk_y * CHUNK_SIZE_Y as i32) as f32).floor() as usize;
    Some(BlockIterator::from_local(
        chunk_x,
        chunk_y,
        local_x.min(CHUNK_SIZE_X - 1),
        local_y.min(CHUNK_SIZE_Y - 1),
        z as usize,
    ))
}

/// Walk the grid from `origin` along `direction` (need not be normalised)
/// up to `max_len` world units, calling `block_at` to resolve whatever
/// block occupies an iterator (returning `None` stands for air/unloaded,
/// i.e. passable). Stops at the first block for which `block_at` returns
/// a full-opaque state.
pub fn raycast_vs_blocks<S, F>(
    origin: Vec3,
    direction: Vec3,
    max_len: f32,
    block_at: F,
) -> RaycastHit<S>
where
    S: BlockState,
    F: Fn(BlockIterator) -> Option<S>,
{
    let dir = if direction.length_squared() > 0.0 {
        direction.normalize()
    } else {
        return RaycastHit::miss();
    };

    let Some(mut iter) = world_to_iter(origin) else {
        return RaycastHit::miss();
    };

    if let Some(state) = block_at(iter) {
        if state.is_full_opaque() {
            return RaycastHit {
                did_impact: true,
                impact_iter: Some(iter),
                impact_state: Some(state),
                impact_normal: None,
                impact_position: origin,
                impact_distance: 0.0,
            };
        }
    }

    if max_len <= 0.0 {
        return RaycastHit::miss();
    }

    let step = [
        signum_step(dir.x),
        signum_step(dir.y),
        signum_step(dir.z),
    ];
    let t_delta = [
        safe_inv_abs(dir.x),
        safe_inv_abs(dir.y),
        safe_inv_abs(dir.z),
    ];

    let block_origin = origin.floor();
    let mut t_max = [0f32; 3];
    for axis in 0..3 {
        if step[axis] == 0 {
            t_max[axis] = f32::INFINITY;
            continue;
        }
        let boundary = if step[axis] > 0 {
            block_origin[axis] + 1.0
        } else {
            block_origin[axis]
        };
        t_max[axis] = (boundary - origin[axis]) / dir[axis];
    }

    let mut last_axis = 0usize;
    let mut distance = 0f32;

    while distance < max_len {
        let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
            0
        } else if t_max[1] <= t_max[2] {
            1
        } else {
            2
        };

        distance = t_max[axis];
        if distance > max_len {
            break;
        }

        let Some(next) = iter.neighbour(Direction::from_axis_step(axis, step[axis] > 0)) else {
            return RaycastHit::miss();
        };
        iter = next;
        last_axis = axis;
        t_max[axis] += t_delta[axis];

        if let Some(state) = block_at(iter) {
            if state.is_full_opaque() {
                return RaycastHit {
                    did_impact: true,
                    impact_iter: Some(iter),
                    impact_state: Some(state),
                    impact_normal: Some(Direction::from_axis_step(axis, step[axis] < 0)),
                    impact_position: origin + dir * distance,
                    impact_distance: distance,
                };
            }
        }
    }

    RaycastHit::miss()
}

fn signum_step(component: f32) -> i32 {
    if component > 0.0 {
        1
    } else if component < 0.0 {
        -1
    } else {
        0
    }
}

fn safe_inv_abs(component: f32) -> f32 {
    if component == 0.0 {
        f32::INFINITY
    } else {
        (1.0 / component).abs()
    }
}
