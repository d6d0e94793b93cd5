//! 朝向属性的编码与解码。
//!
//! 三种约定：绕 Z 的单一角度、带上下哨兵值的单一角度（-1 朝上，-2 朝下），
//! 以及 `yaw pitch roll` 欧拉角。欧拉角的回读分别从 XY、XZ 投影求 yaw 与 pitch，
//! 对复合旋转是有损近似，这里保持该行为。

use glam::{DQuat, DVec3};

use crate::geometry::{Axis, EPSILON, dominant_axis};
use crate::properties::{ANGLE_KEY, ANGLES_KEY, MANGLE_KEY, TARGET_KEY};

const LIGHT_PREFIX: &str = "light";
const UP_ANGLE: f64 = -1.0;
const DOWN_ANGLE: f64 = -2.0;
const VERTICAL_THRESHOLD: f64 = 0.9;

/// 朝向保存在哪个属性、按何种约定编码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationInfo {
    None,
    ZAngle(&'static str),
    ZAngleWithUpDown(&'static str),
    EulerAngles(&'static str),
}

impl RotationInfo {
    #[inline]
    pub fn key(&self) -> Option<&'static str> {
        match *self {
            RotationInfo::None => None,
            RotationInfo::ZAngle(key)
            | RotationInfo::ZAngleWithUpDown(key)
            | RotationInfo::EulerAngles(key) => Some(key),
        }
    }
}

/// 按优先级判定旋转约定。`point_centered` 仅在点实体分支中求值。
pub fn rotation_info(
    classname: Option<&str>,
    brush_entity: bool,
    has: impl Fn(&str) -> bool,
    point_centered: impl FnOnce() -> bool,
) -> RotationInfo {
    let Some(classname) = classname else {
        return RotationInfo::None;
    };
    if classname.starts_with(LIGHT_PREFIX) {
        if has(MANGLE_KEY) {
            RotationInfo::EulerAngles(MANGLE_KEY)
        } else if !has(TARGET_KEY) {
            angle_or_angles(&has)
        } else {
            // 带 target 的聚光灯，朝向由目标决定
            RotationInfo::None
        }
    } else if brush_entity {
        if has(ANGLES_KEY) {
            RotationInfo::EulerAngles(ANGLES_KEY)
        } else if has(ANGLE_KEY) {
            RotationInfo::ZAngleWithUpDown(ANGLE_KEY)
        } else {
            RotationInfo::None
        }
    } else if point_centered() {
        angle_or_angles(&has)
    } else {
        RotationInfo::None
    }
}

fn angle_or_angles(has: &impl Fn(&str) -> bool) -> RotationInfo {
    if has(ANGLES_KEY) {
        RotationInfo::EulerAngles(ANGLES_KEY)
    } else {
        RotationInfo::ZAngle(ANGLE_KEY)
    }
}

/// 把旋转作用到属性值上，返回新值；不适用时返回 `None`。
pub fn rotate_value(info: &RotationInfo, value: Option<&str>, rotation: DQuat) -> Option<String> {
    match info {
        RotationInfo::None => None,
        RotationInfo::ZAngle(_) => {
            if dominant_axis(rotation.xyz()) != Axis::Z {
                return None;
            }
            let direction = rotation * z_angle_direction(parse_angle(value));
            Some(format_number(direction_to_z_angle(direction)))
        }
        RotationInfo::ZAngleWithUpDown(_) => {
            let direction = rotation * up_down_direction(parse_angle(value));
            Some(format_number(direction_to_up_down(direction)))
        }
        RotationInfo::EulerAngles(_) => {
            let angles = value.and_then(parse_vec3).unwrap_or(DVec3::ZERO);
            let direction = rotation * euler_direction(angles);
            Some(format_vec3(direction_to_euler(direction)))
        }
    }
}

/// 镜像规则：X 轴 `a -> 180 - a`，Y 轴 `a -> 360 - a`，Z 轴交换上下哨兵或取反 roll。
pub fn flip_value(info: &RotationInfo, value: Option<&str>, axis: Axis) -> Option<String> {
    match info {
        RotationInfo::None => None,
        RotationInfo::ZAngle(_) => {
            let angle = parse_angle(value);
            let flipped = match axis {
                Axis::X => 180.0 - angle,
                Axis::Y => 360.0 - angle,
                Axis::Z => angle,
            };
            Some(format_number(flipped))
        }
        RotationInfo::ZAngleWithUpDown(_) => {
            let angle = parse_angle(value);
            let vertical = angle == UP_ANGLE || angle == DOWN_ANGLE;
            let flipped = match axis {
                Axis::X if !vertical => 180.0 - angle,
                Axis::Y if !vertical => 360.0 - angle,
                Axis::Z if angle == UP_ANGLE => DOWN_ANGLE,
                Axis::Z if angle == DOWN_ANGLE => UP_ANGLE,
                _ => angle,
            };
            Some(format_number(flipped))
        }
        RotationInfo::EulerAngles(_) => {
            let mut angles = value.and_then(parse_vec3).unwrap_or(DVec3::ZERO);
            match axis {
                Axis::X => angles.x = 180.0 - angles.x,
                Axis::Y => angles.x = 360.0 - angles.x,
                Axis::Z => angles.z = -angles.z,
            }
            Some(format_vec3(angles))
        }
    }
}

/// 属性值对应的朝向四元数。
pub fn orientation(info: &RotationInfo, value: Option<&str>) -> DQuat {
    match info {
        RotationInfo::None => DQuat::IDENTITY,
        RotationInfo::ZAngle(_) => z_rotation(parse_angle(value)),
        RotationInfo::ZAngleWithUpDown(_) => {
            let angle = parse_angle(value);
            if angle == UP_ANGLE {
                DQuat::from_axis_angle(DVec3::Y, -std::f64::consts::FRAC_PI_2)
            } else if angle == DOWN_ANGLE {
                DQuat::from_axis_angle(DVec3::Y, std::f64::consts::FRAC_PI_2)
            } else {
                z_rotation(angle)
            }
        }
        RotationInfo::EulerAngles(_) => {
            let angles = value.and_then(parse_vec3).unwrap_or(DVec3::ZERO);
            euler_rotation(angles)
        }
    }
}

#[inline]
fn z_rotation(degrees: f64) -> DQuat {
    DQuat::from_axis_angle(DVec3::Z, degrees.to_radians())
}

#[inline]
fn euler_rotation(angles: DVec3) -> DQuat {
    z_rotation(angles.x) * DQuat::from_axis_angle(DVec3::Y, (-angles.y).to_radians())
}

pub fn z_angle_direction(degrees: f64) -> DVec3 {
    let radians = degrees.to_radians();
    DVec3::new(radians.cos(), radians.sin(), 0.0)
}

/// 由 XY 投影求水平角，取整到度并归一到 `[0, 360)`。
pub fn direction_to_z_angle(direction: DVec3) -> f64 {
    let flat = DVec3::new(direction.x, direction.y, 0.0).normalize_or_zero();
    if flat == DVec3::ZERO {
        return 0.0;
    }
    let mut angle = flat.x.clamp(-1.0, 1.0).acos().to_degrees().round();
    if flat.y < 0.0 {
        angle = 360.0 - angle;
    }
    angle.rem_euclid(360.0)
}

pub fn up_down_direction(degrees: f64) -> DVec3 {
    if degrees == UP_ANGLE {
        DVec3::Z
    } else if degrees == DOWN_ANGLE {
        DVec3::NEG_Z
    } else {
        z_angle_direction(degrees)
    }
}

pub fn direction_to_up_down(direction: DVec3) -> f64 {
    if direction.z > VERTICAL_THRESHOLD {
        UP_ANGLE
    } else if direction.z < -VERTICAL_THRESHOLD {
        DOWN_ANGLE
    } else {
        direction_to_z_angle(direction)
    }
}

/// `angles = (yaw, pitch, roll)`，roll 不影响方向。
pub fn euler_direction(angles: DVec3) -> DVec3 {
    euler_rotation(angles) * DVec3::X
}

/// yaw 取自 XY 投影，pitch 取自 XZ 投影，roll 归零。
pub fn direction_to_euler(direction: DVec3) -> DVec3 {
    let yaw = if (direction.z.abs() - 1.0).abs() <= EPSILON {
        0.0
    } else {
        direction_to_z_angle(direction)
    };

    let pitch = if (direction.y.abs() - 1.0).abs() <= EPSILON {
        0.0
    } else {
        let xz = DVec3::new(direction.x, 0.0, direction.z).normalize_or_zero();
        if xz == DVec3::ZERO {
            0.0
        } else {
            let mut pitch = xz.x.clamp(-1.0, 1.0).acos().to_degrees().round();
            if xz.z < 0.0 {
                pitch = 360.0 - pitch;
            }
            pitch.rem_euclid(360.0)
        }
    };

    DVec3::new(yaw, pitch, 0.0)
}

/// 与 `atof` 一致：取第一个记号，无法解析时为 0。
pub fn parse_angle(value: Option<&str>) -> f64 {
    value
        .and_then(|value| value.split_whitespace().next())
        .and_then(|token| token.parse().ok())
        .unwrap_or(0.0)
}

/// 解析 `"x y z"`；缺失的分量为 0，任一记号非法时返回 `None`。
pub fn parse_vec3(value: &str) -> Option<DVec3> {
    let mut result = DVec3::ZERO;
    let mut count = 0;
    for (i, token) in value.split_whitespace().take(3).enumerate() {
        result[i] = token.parse().ok()?;
        count += 1;
    }
    if count == 0 { None } else { Some(result) }
}

/// 取整后以整数形式输出，例如 `90`、`-1`。
pub fn format_number(value: f64) -> String {
    format!("{}", value.round() as i64)
}

pub fn format_vec3(value: DVec3) -> String {
    format!(
        "{} {} {}",
        format_number(value.x),
        format_number(value.y),
        format_number(value.z)
    )
}
