//! Gripper positioning for spectral measurement points
//!
//! The fruit is turned between points by rotating the gripper. When the
//! point count splits into four quarters, the last move of each quarter
//! completes the 90° and the gripper lets go, re-homes and grips again, so
//! stepper error does not accumulate over the full turn.

use crate::context::PipelineContext;

/// Gripper motion before measuring a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GripperMove {
    /// First point: close on the fruit
    Grip,
    /// Turn the fruit by a relative angle
    Rotate(f32),
    /// Turn by the closing angle, then release, home and grip again
    QuarterReset(f32),
}

/// Points per quarter turn, if `count` divides into four quarters
pub fn quarter_len(count: u32) -> Option<u32> {
    (count > 0 && count % 4 == 0).then_some(count / 4)
}

/// Angle that completes a quarter after `quarter - 1` regular steps
pub fn quarter_reset_angle(step_deg: f32, quarter: u32) -> f32 {
    90.0 - step_deg * (quarter as f32 - 1.0)
}

/// Motion for `point` (1-based) out of `count`
pub fn plan_move(point: u32, count: u32, step_deg: f32) -> GripperMove {
    if point <= 1 {
        return GripperMove::Grip;
    }

    match quarter_len(count) {
        Some(quarter) if quarter == 1 || point % quarter == 1 => {
            GripperMove::QuarterReset(quarter_reset_angle(step_deg, quarter))
        }
        _ => GripperMove::Rotate(step_deg),
    }
}

/// Drive the gripper for `point`
pub async fn position_fruit(ctx: &PipelineContext, point: u32) {
    let hw = &ctx.hardware;
    let mv = plan_move(
        point,
        ctx.preset.measure_point_count,
        ctx.settings.geometry.step_angle_deg,
    );

    match mv {
        GripperMove::Grip => {
            ctx.actuate("gripper grip", hw.gripper_grip()).await;
        }
        GripperMove::Rotate(angle) => {
            ctx.actuate("gripper rotate", hw.gripper_rotate(angle)).await;
        }
        GripperMove::QuarterReset(angle) => {
            ctx.actuate("gripper rotate", hw.gripper_rotate(angle)).await;
            hw.gripper_release(false);
            ctx.actuate("gripper home", hw.gripper_home()).await;
            ctx.actuate("gripper grip", hw.gripper_grip()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_points_reset_every_third() {
        let moves: Vec<GripperMove> = (1..=12).map(|p| plan_move(p, 12, 10.0)).collect();

        let resets: Vec<u32> = (1..=12)
            .filter(|p| matches!(moves[*p as usize - 1], GripperMove::QuarterReset(_)))
            .collect();
        assert_eq!(resets, vec![4, 7, 10]);
        assert_eq!(moves[0], GripperMove::Grip);
        assert_eq!(moves[1], GripperMove::Rotate(10.0));
        assert_eq!(moves[3], GripperMove::QuarterReset(70.0));
    }

    #[test]
    fn test_quarter_sums_to_ninety() {
        for count in [4u32, 8, 12, 16, 20] {
            let quarter = quarter_len(count).unwrap();
            let total = 7.5 * (quarter as f32 - 1.0) + quarter_reset_angle(7.5, quarter);
            assert!((total - 90.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_four_points_reset_each_time() {
        let moves: Vec<GripperMove> = (1..=4).map(|p| plan_move(p, 4, 10.0)).collect();
        assert_eq!(
            moves,
            vec![
                GripperMove::Grip,
                GripperMove::QuarterReset(90.0),
                GripperMove::QuarterReset(90.0),
                GripperMove::QuarterReset(90.0),
            ]
        );
    }

    #[test]
    fn test_uneven_count_only_rotates() {
        assert_eq!(quarter_len(10), None);
        assert!((2..=10).all(|p| plan_move(p, 10, 10.0) == GripperMove::Rotate(10.0)));
    }
}
