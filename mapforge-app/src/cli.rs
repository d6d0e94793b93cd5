use glam::DVec3;
use mapforge_core::definition::DefinitionCatalog;
use mapforge_core::entity::Entity;
use mapforge_core::geometry::{Axis, BBox3, Ray3};
use mapforge_core::pick::HitObject;
use mapforge_engine::errors::EngineError;
use mapforge_engine::scene::Scene;
use tracing::info;

/// 简易 CLI 演示：构建内置示例地图，演示连接、拾取、旋转与问题检查。
pub fn run_demo(world_bounds: BBox3, catalog: DefinitionCatalog) -> Result<(), EngineError> {
    let mut scene = Scene::with_catalog(world_bounds, catalog);
    let ids = scene.populate_demo()?;
    info!(
        entity_count = scene.map().len(),
        definition_count = scene.definitions().len(),
        "CLI 演示地图统计"
    );

    println!("MapForge CLI 演示");
    println!("当前地图实体：");
    for entity in scene.map().entities() {
        print_entity(entity);
    }

    let ray = Ray3::new(DVec3::new(0.0, 0.0, 512.0), DVec3::NEG_Z);
    println!("自 (0, 0, 512) 向下拾取：");
    for hit in scene.pick(&ray).hits() {
        match hit.object {
            HitObject::Entity(id) => {
                println!("  - 实体 #{} 距离 {:.2}", id.get(), hit.distance);
            }
            HitObject::Face {
                entity,
                brush,
                face,
            } => {
                let owner = entity.map_or_else(|| "-".to_string(), |id| id.get().to_string());
                println!(
                    "  - 实体 #{} 笔刷 #{} 面 {} 距离 {:.2}",
                    owner,
                    brush.get(),
                    face,
                    hit.distance
                );
            }
        }
    }

    let pivot = scene.entity(ids.light).map_or(DVec3::ZERO, Entity::center);
    scene.rotate90_entity(ids.light, Axis::Z, pivot, false)?;
    if let Some(light) = scene.entity(ids.light) {
        println!(
            "旋转灯光后：angle={}, rotation_info={:?}",
            light.property("angle").unwrap_or("-"),
            light.rotation_info()
        );
    }

    let issues = scene.issues();
    if issues.is_empty() {
        println!("未发现问题。");
    } else {
        for issue in &issues {
            println!(
                "  - 实体 #{} 笔刷 #{}: {}",
                issue.entity.get(),
                issue.brush.get(),
                issue.description()
            );
        }
    }
    Ok(())
}

fn print_entity(entity: &Entity) {
    let id = entity.id().map_or(0, |id| id.get());
    let bounds = entity.bounds();
    println!(
        "  - #{} {} 笔刷={} 范围=({:.0}, {:.0}, {:.0})..({:.0}, {:.0}, {:.0})",
        id,
        entity.classname().unwrap_or("<无类名>"),
        entity.brushes().len(),
        bounds.min().x,
        bounds.min().y,
        bounds.min().z,
        bounds.max().x,
        bounds.max().y,
        bounds.max().z
    );
    let targets: Vec<String> = entity
        .link_targets()
        .iter()
        .map(|id| id.get().to_string())
        .collect();
    if !targets.is_empty() {
        println!("      target -> {}", targets.join(", "));
    }
    let sources: Vec<String> = entity
        .link_sources()
        .iter()
        .map(|id| id.get().to_string())
        .collect();
    if !sources.is_empty() {
        println!("      被 {} 触发", sources.join(", "));
    }
}
