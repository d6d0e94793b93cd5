use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::cache::Cached;
use crate::entity::EntityId;
use crate::errors::ModelError;
use crate::geometry::{Axis, BBox3, EPSILON, Plane3, Ray3, flipped, is_integer_point, rotated90};
use crate::pick::{Hit, HitObject, PickResult, Pickable};

static NEXT_BRUSH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrushId(u64);

impl BrushId {
    fn next() -> Self {
        Self(NEXT_BRUSH_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 贴图对齐参数。核心层只保存，不解释。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureAttributes {
    pub name: String,
    pub x_offset: f64,
    pub y_offset: f64,
    pub rotation: f64,
    pub x_scale: f64,
    pub y_scale: f64,
}

impl Default for TextureAttributes {
    fn default() -> Self {
        Self {
            name: String::new(),
            x_offset: 0.0,
            y_offset: 0.0,
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
        }
    }
}

/// 由三个参考点定义的笔刷面。法线朝向实体外侧。
#[derive(Debug, Clone)]
pub struct BrushFace {
    points: [DVec3; 3],
    plane: Plane3,
    pub texture: TextureAttributes,
    /// 面多边形，绕法线逆时针排列；由所属笔刷计算。
    vertices: Vec<DVec3>,
}

impl BrushFace {
    pub fn new(p0: DVec3, p1: DVec3, p2: DVec3) -> Result<Self, ModelError> {
        let plane = Plane3::from_points(p0, p1, p2).ok_or(ModelError::CollinearPoints)?;
        Ok(Self {
            points: [p0, p1, p2],
            plane,
            texture: TextureAttributes::default(),
            vertices: Vec::new(),
        })
    }

    #[inline]
    pub fn with_texture(mut self, texture: TextureAttributes) -> Self {
        self.texture = texture;
        self
    }

    #[inline]
    pub fn points(&self) -> &[DVec3; 3] {
        &self.points
    }

    #[inline]
    pub fn plane(&self) -> &Plane3 {
        &self.plane
    }

    #[inline]
    pub fn normal(&self) -> DVec3 {
        self.plane.normal
    }

    #[inline]
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn has_integer_points(&self) -> bool {
        self.points.iter().all(|point| is_integer_point(*point))
    }

    fn translate(&mut self, delta: DVec3) {
        for point in &mut self.points {
            *point += delta;
        }
        self.plane.distance = self.plane.normal.dot(self.points[0]);
    }

    /// 变换参考点；镜像时交换后两个点，使法线仍朝外。
    fn map_points(&mut self, transform: impl Fn(DVec3) -> DVec3, mirror: bool) -> Result<(), ModelError> {
        let mut points = self.points.map(transform);
        if mirror {
            points.swap(1, 2);
        }
        self.plane =
            Plane3::from_points(points[0], points[1], points[2]).ok_or(ModelError::CollinearPoints)?;
        self.points = points;
        Ok(())
    }

    /// 射线从外侧命中面多边形时返回距离。
    pub fn intersect_ray(&self, ray: &Ray3) -> Option<f64> {
        if ray.is_degenerate() || self.vertices.len() < 3 {
            return None;
        }
        let distance = self.plane.intersect_ray(ray)?;
        let point = ray.point_at(distance);
        if polygon_contains(&self.vertices, self.plane.normal, point) {
            Some(distance)
        } else {
            None
        }
    }
}

/// 凸笔刷：有序面列表，包围盒按需计算并缓存。
#[derive(Debug)]
pub struct Brush {
    id: BrushId,
    world_bounds: BBox3,
    faces: Vec<BrushFace>,
    entity: Option<EntityId>,
    bounds: Cached<BBox3>,
}

impl Brush {
    pub fn new(world_bounds: BBox3, faces: Vec<BrushFace>) -> Result<Self, ModelError> {
        if faces.is_empty() {
            return Err(ModelError::EmptyBrush);
        }
        let mut brush = Self {
            id: BrushId::next(),
            world_bounds,
            faces,
            entity: None,
            bounds: Cached::new(),
        };
        brush.rebuild_geometry();
        Ok(brush)
    }

    /// 轴对齐长方体，面顺序为 左、右、前、后、上、下。
    pub fn cuboid(world_bounds: BBox3, bounds: BBox3) -> Result<Self, ModelError> {
        let (min, max) = (bounds.min(), bounds.max());
        let faces = vec![
            BrushFace::new(min, DVec3::new(min.x, min.y + 1.0, min.z), DVec3::new(min.x, min.y, min.z + 1.0))?,
            BrushFace::new(max, DVec3::new(max.x, max.y, max.z - 1.0), DVec3::new(max.x, max.y - 1.0, max.z))?,
            BrushFace::new(min, DVec3::new(min.x, min.y, min.z + 1.0), DVec3::new(min.x + 1.0, min.y, min.z))?,
            BrushFace::new(max, DVec3::new(max.x - 1.0, max.y, max.z), DVec3::new(max.x, max.y, max.z - 1.0))?,
            BrushFace::new(max, DVec3::new(max.x, max.y - 1.0, max.z), DVec3::new(max.x - 1.0, max.y, max.z))?,
            BrushFace::new(min, DVec3::new(min.x + 1.0, min.y, min.z), DVec3::new(min.x, min.y + 1.0, min.z))?,
        ];
        Self::new(world_bounds, faces)
    }

    #[inline]
    pub fn id(&self) -> BrushId {
        self.id
    }

    #[inline]
    pub fn faces(&self) -> &[BrushFace] {
        &self.faces
    }

    /// 所属实体（非拥有的反向引用）。
    #[inline]
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    #[inline]
    pub(crate) fn set_entity(&mut self, entity: Option<EntityId>) {
        self.entity = entity;
    }

    pub fn set_faces(&mut self, faces: Vec<BrushFace>) -> Result<(), ModelError> {
        if faces.is_empty() {
            return Err(ModelError::EmptyBrush);
        }
        self.faces = faces;
        self.rebuild_geometry();
        Ok(())
    }

    pub fn translate(&mut self, delta: DVec3) {
        if delta == DVec3::ZERO {
            return;
        }
        for face in &mut self.faces {
            face.translate(delta);
        }
        self.rebuild_geometry();
    }

    pub fn rotate90(&mut self, axis: Axis, center: DVec3, clockwise: bool) -> Result<(), ModelError> {
        self.transform_faces(|point| rotated90(point, axis, center, clockwise), false)
    }

    pub fn flip(&mut self, axis: Axis, center: DVec3) -> Result<(), ModelError> {
        self.transform_faces(|point| flipped(point, axis, center), true)
    }

    fn transform_faces(&mut self, transform: impl Fn(DVec3) -> DVec3, mirror: bool) -> Result<(), ModelError> {
        let mut faces = self.faces.clone();
        for face in &mut faces {
            face.map_points(&transform, mirror)?;
        }
        self.faces = faces;
        self.rebuild_geometry();
        Ok(())
    }

    pub fn has_non_integer_points(&self) -> bool {
        self.faces.iter().any(|face| !face.has_integer_points())
    }

    /// 所有面多边形的并集。
    pub fn bounds(&self) -> BBox3 {
        self.bounds.get_or_compute(|| {
            BBox3::from_points(self.faces.iter().flat_map(|face| face.vertices.iter().copied()))
                .unwrap_or_else(|| BBox3::new(DVec3::ZERO, DVec3::ZERO))
        })
    }

    /// 最近的严格正距离命中：`(面索引, 距离)`。
    pub fn intersect(&self, ray: &Ray3) -> Option<(usize, f64)> {
        self.faces
            .iter()
            .enumerate()
            .filter_map(|(index, face)| face.intersect_ray(ray).map(|distance| (index, distance)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn rebuild_geometry(&mut self) {
        let polygons: Vec<Vec<DVec3>> = (0..self.faces.len())
            .map(|index| face_polygon(&self.faces, index, &self.world_bounds))
            .collect();
        for (face, polygon) in self.faces.iter_mut().zip(polygons) {
            face.vertices = polygon;
        }
        self.bounds.invalidate();
    }
}

impl Pickable for Brush {
    fn pick(&self, ray: &Ray3, result: &mut PickResult) {
        if let Some((face, distance)) = self.intersect(ray) {
            let object = HitObject::Face {
                entity: self.entity,
                brush: self.id,
                face,
            };
            result.add(Hit::new(object, ray.point_at(distance), distance));
        }
    }
}

/// 在面所在平面上铺一个覆盖整个世界范围的正方形，再用其余各面的半空间裁剪。
fn face_polygon(faces: &[BrushFace], index: usize, world_bounds: &BBox3) -> Vec<DVec3> {
    let plane = faces[index].plane;
    let normal = plane.normal;
    let u = normal.any_orthonormal_vector();
    let v = normal.cross(u);
    let world_center = world_bounds.center();
    let center = world_center - normal * plane.point_distance(world_center);
    let radius = world_bounds.size().length().max(1.0);

    let mut polygon = vec![
        center + (-u - v) * radius,
        center + (u - v) * radius,
        center + (u + v) * radius,
        center + (-u + v) * radius,
    ];
    for (other_index, other) in faces.iter().enumerate() {
        if other_index == index {
            continue;
        }
        polygon = clip_polygon(&polygon, &other.plane);
        if polygon.len() < 3 {
            return Vec::new();
        }
    }
    polygon
}

/// Sutherland-Hodgman：保留平面背面（含平面上）的部分，顶点顺序不变。
fn clip_polygon(polygon: &[DVec3], plane: &Plane3) -> Vec<DVec3> {
    let mut result = Vec::with_capacity(polygon.len() + 1);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let d_current = plane.point_distance(current);
        let d_next = plane.point_distance(next);
        let current_inside = d_current <= EPSILON;
        let next_inside = d_next <= EPSILON;
        if current_inside {
            push_distinct(&mut result, current);
        }
        if current_inside != next_inside {
            let t = d_current / (d_current - d_next);
            push_distinct(&mut result, current + (next - current) * t);
        }
    }
    if result.len() > 1 && result[0].distance(result[result.len() - 1]) <= EPSILON {
        result.pop();
    }
    result
}

fn push_distinct(points: &mut Vec<DVec3>, point: DVec3) {
    if points
        .last()
        .is_none_or(|last| last.distance(point) > EPSILON)
    {
        points.push(point);
    }
}

fn polygon_contains(vertices: &[DVec3], normal: DVec3, point: DVec3) -> bool {
    vertices.iter().enumerate().all(|(i, &start)| {
        let end = vertices[(i + 1) % vertices.len()];
        let edge = end - start;
        let length = edge.length();
        if length <= EPSILON {
            return true;
        }
        edge.cross(point - start).dot(normal) / length >= -EPSILON
    })
}
